//! Backend helpers
//!
//! - [`allocator`] describes decoded frames shared as dma-buf file descriptors
//! - [`drm`] presents such frames on a drm overlay plane

pub mod allocator;
pub mod drm;
