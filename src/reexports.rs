//! Reexports of crates, that are part of the public api, for convenience

pub use drm;
pub use drm_fourcc;
