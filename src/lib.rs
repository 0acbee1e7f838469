#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

//! # kms-overlay: zero-copy video presentation on drm overlay planes
//!
//! This crate takes frames produced by a hardware video decoder, shared as dma-buf
//! (PRIME) file descriptors, and shows them on a kms overlay plane without copying
//! them. Frames are scaled to the output keeping their aspect ratio, centered, and
//! swapped in lock-step with the display refresh.
//!
//! ## Structure of the crate
//!
//! - [`backend::allocator`] describes decoded frames ([`PrimeFrame`](backend::allocator::prime::PrimeFrame))
//!   and their pixel formats.
//! - [`backend::drm`] contains the display path: discovery of connector, crtc and plane,
//!   buffer import, framebuffer registration and atomic commits.
//! - [`utils`] holds the geometry types and the placement of frames on the output.
//! - [`presenter`] ties a frame source to a display session.
//!
//! ## Logging
//!
//! This crate makes extensive use of [`tracing`] for its internal logging.
//! Every display session opens a `drm_overlay` span carrying the device path, per frame
//! details are logged at `trace` level.
//!
//! For release builds it is recommended to limit the log level during compile time,
//! by adding a dependency to [`tracing`] and enabling the corresponding features:
//!
//! ```toml
//! [dependencies]
//! tracing = { version = "0.1", features = ["max_level_trace", "release_max_level_debug"] }
//! ```

pub mod backend;
pub mod presenter;
pub mod utils;

pub mod reexports;
