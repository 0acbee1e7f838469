//! Registration of imported buffers as framebuffers.

use drm::control::{framebuffer, Device as ControlDevice, FbCmd2Flags};
use std::os::unix::io::AsFd;
use tracing::{trace, warn};

use super::{
    error::{AccessError, Error},
    import::{ImportedBuffer, PlaneLayout},
    DrmDeviceFd,
};
use crate::backend::allocator::{format::FourccName, prime::MAX_PLANES, Modifier};
use crate::utils::{Buffer as BufferCoords, DevPath, Size};

/// Alignment of the framebuffer width in pixels
pub const WIDTH_ALIGNMENT: u32 = 8;

/// Round `width` up to the framebuffer width alignment
pub fn align_width(width: u32) -> u32 {
    width.saturating_add(WIDTH_ALIGNMENT - 1) & !(WIDTH_ALIGNMENT - 1)
}

/// Arguments of an `ADDFB2` call, per plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Fb2Planes {
    /// Buffer object handles, 0 for unused planes
    pub handles: [u32; MAX_PLANES],
    /// Row pitches
    pub pitches: [u32; MAX_PLANES],
    /// Offsets inside the buffer objects
    pub offsets: [u32; MAX_PLANES],
    /// Layout modifiers
    pub modifiers: [u64; MAX_PLANES],
}

impl Fb2Planes {
    /// Flatten a plane layout into the per plane arrays of `ADDFB2`
    ///
    /// Fails with [`Error::NoPlanes`] if no plane is used and with [`Error::MixedModifiers`]
    /// if the used planes disagree on their modifier.
    pub fn from_layout(code: u32, layout: &[Option<PlaneLayout>; MAX_PLANES]) -> Result<Fb2Planes, Error> {
        let mut args = Fb2Planes::default();
        let mut modifier: Option<Modifier> = None;
        for (idx, plane) in layout.iter().enumerate() {
            let Some(plane) = plane else {
                continue;
            };
            match modifier {
                Some(modifier) if modifier != plane.modifier => {
                    return Err(Error::MixedModifiers(FourccName(code)));
                }
                _ => modifier = Some(plane.modifier),
            }
            args.handles[idx] = plane.handle.into();
            args.pitches[idx] = plane.pitch;
            args.offsets[idx] = plane.offset;
            args.modifiers[idx] = plane.modifier.into();
        }

        if modifier.is_none() {
            return Err(Error::NoPlanes(FourccName(code)));
        }
        Ok(args)
    }
}

/// A framebuffer registered with the device, removed on drop
#[derive(Debug)]
pub struct Framebuffer {
    fb: framebuffer::Handle,
    code: u32,
    drm: DrmDeviceFd,
}

impl Framebuffer {
    /// Handle of the framebuffer
    pub fn handle(&self) -> framebuffer::Handle {
        self.fb
    }

    /// Fourcc code the framebuffer was registered with
    pub fn code(&self) -> u32 {
        self.code
    }

    pub(crate) fn from_handle(drm: &DrmDeviceFd, fb: framebuffer::Handle, code: u32) -> Framebuffer {
        Framebuffer {
            fb,
            code,
            drm: drm.clone(),
        }
    }
}

impl AsRef<framebuffer::Handle> for Framebuffer {
    fn as_ref(&self) -> &framebuffer::Handle {
        &self.fb
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        trace!(fb = ?self.fb, "destroying framebuffer");
        if let Err(err) = self.drm.destroy_framebuffer(self.fb) {
            warn!(fb = ?self.fb, ?err, "failed to destroy framebuffer");
        }
    }
}

/// Register `buffer` as a framebuffer of `drm`
///
/// The width is aligned up to [`WIDTH_ALIGNMENT`]. The fourcc is passed through unchecked,
/// so codes unknown to `drm-fourcc` (like `NV15`) can be registered.
#[profiling::function]
pub fn add_framebuffer(drm: &DrmDeviceFd, buffer: &ImportedBuffer) -> Result<Framebuffer, Error> {
    let code = buffer.code();
    let args = Fb2Planes::from_layout(code, buffer.planes())?;
    let size = buffer.size();
    let width = align_width(size.w);

    let info = drm_ffi::mode::add_fb2(
        drm.as_fd(),
        width,
        size.h,
        code,
        &args.handles,
        &args.pitches,
        &args.offsets,
        &args.modifiers,
        FbCmd2Flags::MODIFIERS.bits(),
    )
    .map_err(|source| registration_error(drm, "Failed to add framebuffer", source))?;

    let fb = drm::control::from_u32(info.fb_id).ok_or_else(|| {
        registration_error(
            drm,
            "Kernel returned an invalid framebuffer id",
            std::io::Error::from(std::io::ErrorKind::InvalidData),
        )
    })?;
    trace!(?fb, "Registered {} framebuffer {}x{}", FourccName(code), width, size.h);

    Ok(Framebuffer::from_handle(drm, fb, code))
}

fn registration_error(drm: &DrmDeviceFd, errmsg: &'static str, source: std::io::Error) -> Error {
    Error::Registration(AccessError {
        errmsg,
        dev: drm.dev_path(),
        source,
    })
}

/// A decoded frame ready for scanout
///
/// Removes the framebuffer before the buffer objects backing it are closed.
#[derive(Debug)]
pub struct DisplayBuffer {
    // field order is drop order
    fb: Framebuffer,
    buffer: ImportedBuffer,
}

impl DisplayBuffer {
    /// Register `buffer` and take ownership of it
    pub fn new(drm: &DrmDeviceFd, buffer: ImportedBuffer) -> Result<DisplayBuffer, Error> {
        let fb = add_framebuffer(drm, &buffer)?;
        Ok(DisplayBuffer { fb, buffer })
    }

    /// Framebuffer to scan out
    pub fn framebuffer(&self) -> framebuffer::Handle {
        self.fb.handle()
    }

    /// Size of the image in pixels
    pub fn size(&self) -> Size<u32, BufferCoords> {
        self.buffer.size()
    }

    /// Fourcc code of the framebuffer
    pub fn code(&self) -> u32 {
        self.fb.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drm::buffer;

    fn plane(id: u32, pitch: u32, offset: u32, modifier: Modifier) -> Option<PlaneLayout> {
        Some(PlaneLayout {
            handle: buffer::Handle::from(std::num::NonZeroU32::new(id).unwrap()),
            pitch,
            offset,
            modifier,
        })
    }

    #[test]
    fn width_alignment() {
        assert_eq!(align_width(0), 0);
        assert_eq!(align_width(1), 8);
        assert_eq!(align_width(8), 8);
        assert_eq!(align_width(1916), 1920);
        assert_eq!(align_width(1920), 1920);
        assert_eq!(align_width(1921), 1928);
        assert_eq!(align_width(u32::MAX), u32::MAX & !7);
    }

    #[test]
    fn flatten_keeps_plane_index() {
        let layout = [
            plane(5, 1920, 0, Modifier::Linear),
            None,
            plane(6, 1920, 2_073_600, Modifier::Linear),
            None,
        ];
        let args = Fb2Planes::from_layout(0x3231564e, &layout).unwrap();
        assert_eq!(args.handles, [5, 0, 6, 0]);
        assert_eq!(args.pitches, [1920, 0, 1920, 0]);
        assert_eq!(args.offsets, [0, 0, 2_073_600, 0]);
        assert_eq!(args.modifiers, [0, 0, 0, 0]);
    }

    #[test]
    fn modifiers_are_passed_per_plane() {
        let layout = [
            plane(5, 2048, 0, Modifier::I915_y_tiled),
            plane(5, 2048, 4096, Modifier::I915_y_tiled),
            None,
            None,
        ];
        let args = Fb2Planes::from_layout(0x3231564e, &layout).unwrap();
        let tiled: u64 = Modifier::I915_y_tiled.into();
        assert_eq!(args.modifiers, [tiled, tiled, 0, 0]);
    }

    #[test]
    fn rejects_empty_layout() {
        assert!(matches!(
            Fb2Planes::from_layout(0x3231564e, &[None; MAX_PLANES]),
            Err(Error::NoPlanes(_))
        ));
    }

    #[test]
    fn rejects_mixed_modifiers() {
        let layout = [
            plane(5, 2048, 0, Modifier::Linear),
            plane(6, 2048, 0, Modifier::I915_x_tiled),
            None,
            None,
        ];
        assert!(matches!(
            Fb2Planes::from_layout(0x3231564e, &layout),
            Err(Error::MixedModifiers(_))
        ));
    }
}
