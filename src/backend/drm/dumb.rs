//! Fully transparent dumb buffers used to blank a plane.

use drm::{
    buffer::{Buffer as DrmBuffer, PlanarBuffer},
    control::{dumbbuffer::DumbBuffer, framebuffer, Device as ControlDevice, FbCmd2Flags},
};
use tracing::{trace, warn};

use super::{
    error::{AccessError, Error},
    framebuffer::Framebuffer,
    DrmDeviceFd,
};
use crate::backend::allocator::{Fourcc, Modifier};
use crate::utils::{DevPath, Physical, Size};

struct PlanarDumbBuffer<'a>(&'a DumbBuffer);

impl<'a> PlanarBuffer for PlanarDumbBuffer<'a> {
    fn size(&self) -> (u32, u32) {
        self.0.size()
    }

    fn format(&self) -> Fourcc {
        self.0.format()
    }

    fn modifier(&self) -> Option<Modifier> {
        None
    }

    fn pitches(&self) -> [u32; 4] {
        [self.0.pitch(), 0, 0, 0]
    }

    fn handles(&self) -> [Option<drm::buffer::Handle>; 4] {
        [Some(self.0.handle()), None, None, None]
    }

    fn offsets(&self) -> [u32; 4] {
        [0, 0, 0, 0]
    }
}

/// A zero filled `ARGB8888` framebuffer
///
/// Scanning it out on a plane makes the plane fully transparent.
#[derive(Debug)]
pub struct BlankBuffer {
    fb: Option<Framebuffer>,
    handle: framebuffer::Handle,
    buffer: Option<DumbBuffer>,
    drm: DrmDeviceFd,
}

impl BlankBuffer {
    /// Allocate a transparent buffer of `size`
    #[profiling::function]
    pub fn new(drm: &DrmDeviceFd, size: Size<u32, Physical>) -> Result<BlankBuffer, Error> {
        let mut buffer = drm
            .create_dumb_buffer((size.w, size.h), Fourcc::Argb8888, 32)
            .map_err(|source| access(drm, "Failed to create dumb buffer", source))?;

        if let Err(source) = drm.map_dumb_buffer(&mut buffer).map(|mut mapping| {
            let pixels: &mut [u8] = mapping.as_mut();
            pixels.fill(0);
        }) {
            destroy(drm, buffer);
            return Err(access(drm, "Failed to map dumb buffer", source));
        }

        let handle = match drm.add_planar_framebuffer(&PlanarDumbBuffer(&buffer), FbCmd2Flags::empty()) {
            Ok(handle) => handle,
            Err(source) => {
                destroy(drm, buffer);
                return Err(access(drm, "Failed to add blank framebuffer", source));
            }
        };
        trace!(fb = ?handle, "Allocated blank buffer {}x{}", size.w, size.h);

        Ok(BlankBuffer {
            fb: Some(Framebuffer::from_handle(drm, handle, Fourcc::Argb8888 as u32)),
            handle,
            buffer: Some(buffer),
            drm: drm.clone(),
        })
    }

    /// Framebuffer to scan out
    pub fn framebuffer(&self) -> framebuffer::Handle {
        self.handle
    }

    /// Size of the buffer in pixels
    pub fn size(&self) -> Size<u32, Physical> {
        self.buffer
            .as_ref()
            .map(|buffer| Size::from(buffer.size()))
            .unwrap_or_default()
    }
}

fn access(drm: &DrmDeviceFd, errmsg: &'static str, source: std::io::Error) -> Error {
    Error::Access(AccessError {
        errmsg,
        dev: drm.dev_path(),
        source,
    })
}

fn destroy(drm: &DrmDeviceFd, buffer: DumbBuffer) {
    if let Err(err) = drm.destroy_dumb_buffer(buffer) {
        warn!(?err, "failed to destroy dumb buffer");
    }
}

impl Drop for BlankBuffer {
    fn drop(&mut self) {
        // the framebuffer has to go before the memory backing it
        self.fb.take();
        if let Some(buffer) = self.buffer.take() {
            destroy(&self.drm, buffer);
        }
    }
}
