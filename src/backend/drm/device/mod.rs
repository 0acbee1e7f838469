use std::time::Duration;

use drm::control::{atomic::AtomicModeReq, connector, crtc, encoder, plane, Mode};
use drm::{ClientCapability, Device as BasicDevice, DriverCapability};
use tracing::{debug, info, info_span, instrument, trace, warn};

pub(super) mod atomic;
mod fd;
mod frame;
pub use self::fd::DrmDeviceFd;

use self::atomic::{add_plane_state, submit, wait_for_flip, PlaneConfig};
use self::frame::FrameState;
use super::{
    discovery::{self, DisplayPath},
    dumb::BlankBuffer,
    error::{AccessError, Error},
    framebuffer::DisplayBuffer,
    props::PropertyCache,
};
use crate::backend::allocator::format::FourccName;
use crate::utils::{Buffer as BufferCoords, DevPath, Physical, Rectangle, Size};

/// The display session of one drm device
///
/// Owns the device, the selected display path, the single open atomic request
/// and the buffers currently in use by the display engine.
#[derive(Debug)]
pub struct DrmDevice {
    fd: DrmDeviceFd,
    connector: connector::Handle,
    encoder: Option<encoder::Handle>,
    crtc: crtc::Handle,
    crtc_index: usize,
    plane: plane::Handle,
    mode: Mode,
    frame: FrameState<DisplayBuffer>,
    flip_timeout: Option<Duration>,
    span: tracing::Span,
}

impl DrmDevice {
    /// Prepare `fd` for atomic modesetting and find a display path for frames of format `code`
    ///
    /// Requires dumb buffer support, universal planes and atomic modesetting.
    pub fn new(fd: DrmDeviceFd, code: u32) -> Result<DrmDevice, Error> {
        let span = info_span!("drm_overlay", device = ?fd.path());
        let guard = span.enter();
        info!("DrmDevice initializing for {} frames", FourccName(code));

        let has_dumb = fd
            .get_driver_capability(DriverCapability::DumbBuffer)
            .map_err(|source| {
                Error::Access(AccessError {
                    errmsg: "Error querying driver capabilities",
                    dev: fd.dev_path(),
                    source,
                })
            })?;
        if has_dumb == 0 {
            return Err(Error::NoDumbBuffers(fd.dev_path()));
        }

        if let Err(err) = fd.set_client_capability(ClientCapability::UniversalPlanes, true) {
            warn!("Unable to enable universal planes: {}", err);
        }
        fd.set_client_capability(ClientCapability::Atomic, true)
            .map_err(|source| Error::NoAtomicModesetting {
                dev: fd.dev_path(),
                source,
            })?;

        let DisplayPath { output, plane, props } = discovery::discover(&fd, code)?;
        let (w, h) = output.mode.size();
        debug!(
            connector = ?output.connector,
            crtc = ?output.crtc,
            crtc_index = output.crtc_index,
            ?plane,
            "Using mode {}x{}@{}",
            w,
            h,
            output.mode.vrefresh(),
        );

        drop(guard);
        Ok(DrmDevice {
            fd,
            connector: output.connector,
            encoder: output.encoder,
            crtc: output.crtc,
            crtc_index: output.crtc_index,
            plane,
            mode: output.mode,
            frame: FrameState::new(output.crtc, props),
            flip_timeout: None,
            span,
        })
    }

    /// Give up waiting for a page flip after `timeout`, `None` waits forever
    pub fn set_flip_timeout(&mut self, timeout: Option<Duration>) {
        self.flip_timeout = timeout;
    }

    /// Blank `plane` with the next commit
    ///
    /// The request is consumed by the next call to [`DrmDevice::commit`] that gets to
    /// submit, whether blanking succeeds or not. The plane frames are shown on can not
    /// be blanked, such a request is logged and ignored.
    pub fn request_blank(&mut self, plane: plane::Handle) {
        self.frame.request_blank(plane);
    }

    /// The open device
    pub fn device_fd(&self) -> &DrmDeviceFd {
        &self.fd
    }

    /// Connector frames are shown on
    pub fn connector(&self) -> connector::Handle {
        self.connector
    }

    /// Encoder between connector and crtc, if the connector reported one
    pub fn encoder(&self) -> Option<encoder::Handle> {
        self.encoder
    }

    /// Crtc driving the connector
    pub fn crtc(&self) -> crtc::Handle {
        self.crtc
    }

    /// Index of the crtc in the device's crtc list
    pub fn crtc_index(&self) -> usize {
        self.crtc_index
    }

    /// Plane frames are shown on
    pub fn plane(&self) -> plane::Handle {
        self.plane
    }

    /// Active mode of the output
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Size of the active mode in pixels
    pub fn output_size(&self) -> Size<u32, Physical> {
        let (w, h) = self.mode.size();
        Size::from((w as u32, h as u32))
    }

    /// Amount of buffers held for the display engine, never more than two
    pub fn buffers_in_use(&self) -> usize {
        self.frame.buffers_in_use()
    }

    /// Show `buffer` at `dst` and wait for the flip
    ///
    /// On success the buffer is kept until the commit after the next one confirmed it is
    /// no longer scanned out. A rejected commit drops `buffer` and leaves the buffers on
    /// screen untouched.
    #[instrument(level = "trace", parent = &self.span, skip(self, buffer), fields(fb = ?buffer.framebuffer()))]
    pub fn commit(&mut self, buffer: DisplayBuffer, dst: Rectangle<u32, Physical>) -> Result<(), Error> {
        let config = PlaneConfig {
            fb: buffer.framebuffer(),
            src: Rectangle::<u32, BufferCoords>::from_loc_and_size((0, 0), buffer.size()),
            dst,
        };
        let (fd, crtc, plane, timeout) = (&self.fd, self.crtc, self.plane, self.flip_timeout);
        let size = self.output_size();

        let retired = self.frame.commit(
            buffer,
            &config,
            |req, blank| add_blank(fd, crtc, size, req, blank),
            |req| {
                submit(fd, req).map_err(|source| Error::Commit { plane, source })?;
                wait_for_flip(fd, crtc, timeout)
            },
        )?;
        if let Some(retired) = retired {
            trace!(fb = ?retired.framebuffer(), "Releasing retired buffer");
        }
        Ok(())
    }

    /// Release all buffers held for the display engine
    pub fn release_buffers(&mut self) {
        let _guard = self.span.enter();
        for buffer in self.frame.drain() {
            trace!(fb = ?buffer.framebuffer(), "Releasing buffer");
        }
    }
}

fn add_blank(
    fd: &DrmDeviceFd,
    crtc: crtc::Handle,
    size: Size<u32, Physical>,
    req: &mut AtomicModeReq,
    plane: plane::Handle,
) -> Result<BlankBuffer, Error> {
    let blank = BlankBuffer::new(fd, size)?;
    let props = PropertyCache::snapshot(fd, plane)?;

    let config = PlaneConfig {
        fb: blank.framebuffer(),
        src: Rectangle::<u32, BufferCoords>::from_loc_and_size((0, 0), (size.w, size.h)),
        dst: Rectangle::from_loc_and_size((0, 0), size),
    };
    add_plane_state(req, &props, crtc, &config)?;
    debug!(?plane, "Blanking plane with the next commit");
    Ok(blank)
}

impl Drop for DrmDevice {
    fn drop(&mut self) {
        self.release_buffers();
        info!(parent: &self.span, "Closing display session");
    }
}
