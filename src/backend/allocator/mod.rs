//! Buffer descriptions shared between decoders and the display path.
//!
//! - [`prime::PrimeFrame`] describes a decoded frame living in dma-buf memory
//! - [`format`] helps with fourcc codes decoders report

pub mod format;
pub mod prime;

pub use drm_fourcc::{
    DrmFormat as Format, DrmFourcc as Fourcc, DrmModifier as Modifier, DrmVendor as Vendor,
    UnrecognizedFourcc, UnrecognizedVendor,
};
