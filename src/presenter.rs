//! Driving a display session from a stream of decoded frames
//!
//! A [`FrameSource`] hands out [`PrimeFrame`]s, an [`OverlayPresenter`] shows them.
//! The presenter sets up its [`DrmDevice`] lazily on the first frame, because the
//! plane to use depends on the format of the frames. [`run`] connects both and
//! applies the error policy: frames failing with a recoverable error are dropped,
//! anything else ends the session.

use std::{path::PathBuf, time::Duration};

use tracing::{debug, error, info, trace, warn};

use crate::backend::{
    allocator::{
        format::{self, FourccName},
        prime::PrimeFrame,
    },
    drm::{import_frame, DisplayBuffer, DrmDevice, DrmDeviceFd, Error},
};
use crate::utils::resolve_destination;

/// Node opened when no device is configured
pub const DEFAULT_DEVICE: &str = "/dev/dri/card0";

/// Configuration of an [`OverlayPresenter`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenterConfig {
    /// Drm node to present on
    pub device: PathBuf,
    /// Id of a plane to make transparent with the first commit
    pub blank_plane: Option<u32>,
    /// How long to wait for a page flip, `None` waits forever
    pub flip_timeout: Option<Duration>,
}

impl Default for PresenterConfig {
    fn default() -> Self {
        PresenterConfig {
            device: PathBuf::from(DEFAULT_DEVICE),
            blank_plane: None,
            flip_timeout: None,
        }
    }
}

/// Result of polling a [`FrameSource`]
#[derive(Debug)]
pub enum FramePoll {
    /// A decoded frame
    Frame(PrimeFrame),
    /// No frame is ready yet, poll again
    Again,
    /// The stream ended
    EndOfStream,
}

/// Something producing decoded frames, usually a hardware decoder
pub trait FrameSource {
    /// Error of the source
    type Error: std::error::Error + 'static;

    /// Poll the next frame
    fn next_frame(&mut self) -> Result<FramePoll, Self::Error>;
}

/// Presents frames on an overlay plane of one drm device
#[derive(Debug)]
pub struct OverlayPresenter {
    config: PresenterConfig,
    fd: Option<DrmDeviceFd>,
    device: Option<DrmDevice>,
    code: Option<u32>,
}

impl OverlayPresenter {
    /// Create a presenter, the device is opened with the first frame
    pub fn new(config: PresenterConfig) -> OverlayPresenter {
        OverlayPresenter {
            config,
            fd: None,
            device: None,
            code: None,
        }
    }

    /// Create a presenter using an already opened device
    ///
    /// Useful to become drm master before anything else opens the node.
    /// The configured device path is ignored.
    pub fn with_device(config: PresenterConfig, fd: DrmDeviceFd) -> OverlayPresenter {
        OverlayPresenter {
            config,
            fd: Some(fd),
            device: None,
            code: None,
        }
    }

    /// Configuration of the presenter
    pub fn config(&self) -> &PresenterConfig {
        &self.config
    }

    /// The display session, if a frame was presented already
    pub fn device(&self) -> Option<&DrmDevice> {
        self.device.as_ref()
    }

    fn open_device(config: &PresenterConfig, fd: Option<&DrmDeviceFd>, code: u32) -> Result<DrmDevice, Error> {
        let fd = match fd {
            Some(fd) => fd.clone(),
            None => DrmDeviceFd::open(&config.device)?,
        };
        info!(
            "Initializing display for {} ({:#x}) on {:?}",
            FourccName(code),
            code,
            fd.path()
        );
        let mut device = DrmDevice::new(fd, code)?;
        device.set_flip_timeout(config.flip_timeout);
        if let Some(id) = config.blank_plane {
            match drm::control::from_u32(id) {
                Some(plane) => device.request_blank(plane),
                None => warn!("Ignoring invalid plane id {} to blank", id),
            }
        }
        Ok(device)
    }

    /// Show `frame`, blocking until it is on screen
    ///
    /// The first frame opens the device and selects a plane for its format. A failed frame
    /// is dropped; if [`Error::is_fatal`] reports the error as fatal the presenter should
    /// be torn down.
    #[profiling::function]
    pub fn present(&mut self, frame: PrimeFrame) -> Result<(), Error> {
        let code = format::normalize(frame.code());
        if let Some(session) = self.code.filter(|session| *session != code) {
            warn!(
                "Frame format {} differs from the session format {}",
                FourccName(code),
                FourccName(session),
            );
        }
        let device = match self.device {
            Some(ref mut device) => device,
            None => {
                let device = Self::open_device(&self.config, self.fd.as_ref(), code)?;
                self.code = Some(code);
                self.device.insert(device)
            }
        };

        let fd = device.device_fd().clone();
        let imported = import_frame(&fd, &frame, code)?;
        let buffer = DisplayBuffer::new(&fd, imported)?;

        let (size, sar) = (frame.size(), frame.sample_aspect_ratio());
        // the imported handles keep the memory alive
        drop(frame);
        let dst = resolve_destination(size, sar, device.output_size()).ok_or(Error::InvalidGeometry {
            width: size.w,
            height: size.h,
        })?;
        trace!(?dst, "Presenting {}x{} frame", size.w, size.h);

        device.commit(buffer, dst)
    }

    /// Release all buffers and close the device
    ///
    /// The next frame sets up a new session.
    pub fn teardown(&mut self) {
        if let Some(device) = self.device.take() {
            debug!(crtc = ?device.crtc(), "Tearing down display session");
        }
        self.code = None;
    }
}

/// Counters of a finished [`run`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PresentStats {
    /// Frames that made it on screen
    pub presented: u64,
    /// Frames dropped because of a recoverable error
    pub dropped: u64,
}

/// Error ending a [`run`]
#[derive(thiserror::Error, Debug)]
pub enum RunError<E: std::error::Error + 'static> {
    /// The frame source failed
    #[error("Frame source failed: {0}")]
    Source(#[source] E),
    /// The display session failed
    #[error(transparent)]
    Display(#[from] Error),
}

/// Present every frame of `source` until it ends
///
/// Recoverable errors drop the frame and are logged, fatal ones end the session.
/// The presenter is torn down in any case.
pub fn run<S: FrameSource>(
    source: &mut S,
    presenter: &mut OverlayPresenter,
) -> Result<PresentStats, RunError<S::Error>> {
    let mut stats = PresentStats::default();
    let result = loop {
        let frame = match source.next_frame() {
            Ok(FramePoll::Frame(frame)) => frame,
            Ok(FramePoll::Again) => {
                trace!("No frame ready yet");
                continue;
            }
            Ok(FramePoll::EndOfStream) => break Ok(stats),
            Err(err) => break Err(RunError::Source(err)),
        };

        match presenter.present(frame) {
            Ok(()) => stats.presented += 1,
            Err(err) if !err.is_fatal() => {
                warn!("Dropping frame: {}", err);
                stats.dropped += 1;
            }
            Err(err) => {
                error!("Display session failed: {}", err);
                break Err(RunError::Display(err));
            }
        }
    };

    presenter.teardown();
    if let Ok(stats) = &result {
        info!(
            presented = stats.presented,
            dropped = stats.dropped,
            "End of stream"
        );
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::allocator::Modifier;
    use crate::utils::AspectRatio;
    use std::{collections::VecDeque, fs::File, io};

    struct Script(VecDeque<Result<FramePoll, io::Error>>);

    impl FrameSource for Script {
        type Error = io::Error;

        fn next_frame(&mut self) -> Result<FramePoll, io::Error> {
            self.0.pop_front().unwrap_or(Ok(FramePoll::EndOfStream))
        }
    }

    fn frame() -> PrimeFrame {
        let mut builder = PrimeFrame::builder((64, 64), 0x3231564e, AspectRatio::SQUARE);
        let obj = builder
            .add_object(File::open("/dev/null").unwrap().into(), Modifier::Linear)
            .unwrap();
        builder.add_plane(obj, 0, 64);
        builder.build().unwrap()
    }

    fn missing_device() -> PresenterConfig {
        PresenterConfig {
            device: PathBuf::from("/nonexistent/dri/card0"),
            ..PresenterConfig::default()
        }
    }

    #[test]
    fn default_config() {
        let config = PresenterConfig::default();
        assert_eq!(config.device, PathBuf::from("/dev/dri/card0"));
        assert_eq!(config.blank_plane, None);
        assert_eq!(config.flip_timeout, None);
    }

    #[test]
    fn empty_stream_never_opens_device() {
        let mut source = Script(VecDeque::from([Ok(FramePoll::Again), Ok(FramePoll::Again)]));
        let mut presenter = OverlayPresenter::new(missing_device());
        let stats = run(&mut source, &mut presenter).unwrap();
        assert_eq!(stats, PresentStats::default());
        assert!(presenter.device().is_none());
    }

    #[test]
    fn source_errors_end_the_run() {
        let mut source = Script(VecDeque::from([
            Ok(FramePoll::Again),
            Err(io::Error::new(io::ErrorKind::Other, "decoder failed")),
        ]));
        let mut presenter = OverlayPresenter::new(missing_device());
        match run(&mut source, &mut presenter) {
            Err(RunError::Source(err)) => assert_eq!(err.to_string(), "decoder failed"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn unopenable_device_is_fatal() {
        let mut source = Script(VecDeque::from([Ok(FramePoll::Frame(frame())), Ok(FramePoll::Frame(frame()))]));
        let mut presenter = OverlayPresenter::new(missing_device());
        match run(&mut source, &mut presenter) {
            Err(RunError::Display(Error::Open { path, .. })) => {
                assert_eq!(path, PathBuf::from("/nonexistent/dri/card0"))
            }
            other => panic!("unexpected result: {:?}", other),
        }
        // the second frame was never polled
        assert_eq!(source.0.len(), 1);
        assert!(presenter.device().is_none());
    }
}
