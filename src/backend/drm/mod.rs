//! Presentation of decoded frames on a drm overlay plane
//!
//! This module provides a [`DrmDevice`], representing one display session on a drm node.
//! It selects a connected output and an overlay plane able to scan out a given format,
//! and then presents frames on that plane with atomic commits, one per vblank.
//!
//! ## How to use it
//!
//! ### Initialization
//!
//! Open the node with [`DrmDeviceFd::open`] and create the [`DrmDevice`] with the fourcc of the
//! frames you are going to present. This enables atomic modesetting and runs [`discovery`],
//! which picks the first connected connector, its crtc and the first plane of that crtc
//! supporting the format.
//!
//! ### Presenting
//!
//! Every frame goes through the same steps:
//!
//! - its memory objects are imported into the device with [`import_frame`],
//! - the result is registered as a framebuffer with [`DisplayBuffer::new`],
//! - a destination is computed with [`resolve_destination`](crate::utils::resolve_destination),
//! - [`DrmDevice::commit`] submits the plane state and blocks until the page flip happened.
//!
//! ```rust,no_run
//! use kms_overlay::backend::drm::{import_frame, DisplayBuffer, DrmDevice, DrmDeviceFd};
//! use kms_overlay::utils::resolve_destination;
//! # fn frame() -> kms_overlay::backend::allocator::prime::PrimeFrame { unimplemented!() }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let frame = frame();
//! let fd = DrmDeviceFd::open("/dev/dri/card0")?;
//! let mut device = DrmDevice::new(fd.clone(), frame.code())?;
//!
//! let buffer = DisplayBuffer::new(&fd, import_frame(&fd, &frame, frame.code())?)?;
//! let dst = resolve_destination(frame.size(), frame.sample_aspect_ratio(), device.output_size())
//!     .expect("frame does not fit the output");
//! device.commit(buffer, dst)?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Buffer lifetime
//!
//! The device keeps the buffer on screen and the one before it. A buffer is released once
//! the commit following its replacement was confirmed by a page flip, so memory is never
//! freed while the display engine may still read it.

pub mod discovery;
pub(crate) mod device;
pub mod dumb;
pub mod error;
pub mod framebuffer;
pub mod import;
pub mod props;
pub mod ring;

pub use device::atomic::{to_fixed, PlaneConfig};
pub use device::{DrmDevice, DrmDeviceFd};
pub use error::{AccessError, Error};
pub use framebuffer::{DisplayBuffer, Framebuffer};
pub use import::{import_frame, GemHandle, ImportedBuffer};
pub use props::PropertyCache;
pub use ring::BufferRing;
