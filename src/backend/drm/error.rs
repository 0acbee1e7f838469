use drm::control::{connector, crtc, plane, RawResourceHandle};
use std::{io, path::PathBuf};

use crate::backend::allocator::format::FourccName;

/// Errors thrown by the [`DrmDevice`](crate::backend::drm::DrmDevice)
/// and the [`OverlayPresenter`](crate::presenter::OverlayPresenter).
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Unable to open the drm node
    #[error("Failed to open drm node `{path:?}`: {source}")]
    Open {
        /// Path of the node
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },
    /// The device does not support dumb buffers
    #[error("Device `{0:?}` has no dumb buffer support")]
    NoDumbBuffers(Option<PathBuf>),
    /// The device refused to enable atomic modesetting
    #[error("No atomic modesetting support on device `{dev:?}` ({source})")]
    NoAtomicModesetting {
        /// Device on which the error was generated
        dev: Option<PathBuf>,
        /// Underlying device error
        #[source]
        source: io::Error,
    },
    /// The device encountered an access error
    #[error(transparent)]
    Access(#[from] AccessError),
    /// No connector is connected and advertises a mode
    #[error("No connected connector with a valid mode found")]
    NoConnectedOutput,
    /// None of the connected connectors could be mapped to a crtc
    #[error("No crtc could be mapped to connector `{0:?}`")]
    NoCrtcMapping(connector::Handle),
    /// No plane of the crtc accepts the format
    #[error("No plane of crtc `{crtc:?}` supports format {format}")]
    NoCompatiblePlane {
        /// Crtc that was searched
        crtc: crtc::Handle,
        /// Required format
        format: FourccName,
    },
    /// A plane is missing a required property
    #[error("The plane `{handle:?}` is missing the required property '{name}'")]
    UnknownProperty {
        /// Plane handle
        handle: RawResourceHandle,
        /// Property name
        name: &'static str,
    },
    /// A frame could not be imported into the device
    #[error("Failed to import frame: {0}")]
    Import(#[source] AccessError),
    /// The frame has no plane that could be scanned out
    #[error("Frame of format {0} has no usable plane")]
    NoPlanes(FourccName),
    /// The planes of a frame use different modifiers
    #[error("Planes of frame with format {0} use different modifiers")]
    MixedModifiers(FourccName),
    /// The kernel rejected the framebuffer
    #[error("Failed to register framebuffer: {0}")]
    Registration(#[source] AccessError),
    /// The frame does not map onto the output
    #[error("Frame of size {width}x{height} has no destination on the output")]
    InvalidGeometry {
        /// Frame width
        width: u32,
        /// Frame height
        height: u32,
    },
    /// The kernel rejected the atomic commit
    #[error("Atomic commit on plane `{plane:?}` failed: {source}")]
    Commit {
        /// Plane that was committed
        plane: plane::Handle,
        /// Underlying error
        #[source]
        source: AccessError,
    },
    /// The page flip did not arrive in time
    #[error("No page flip event for crtc `{0:?}` within the configured timeout")]
    FlipTimeout(crtc::Handle),
}

impl Error {
    /// Returns true if the display session can not continue after this error
    ///
    /// Non-fatal errors only cost the frame that triggered them.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::Commit { .. } | Error::UnknownProperty { .. } | Error::InvalidGeometry { .. }
        )
    }
}

/// Raw drm access error
#[derive(thiserror::Error, Debug)]
#[error("DRM access error: {errmsg} on device `{dev:?}` ({source})")]
pub struct AccessError {
    /// Error message associated to the access error
    pub errmsg: &'static str,
    /// Device on which the error was generated
    pub dev: Option<PathBuf>,
    /// Underlying device error
    #[source]
    pub source: io::Error,
}
