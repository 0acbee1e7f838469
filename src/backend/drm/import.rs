//! Import of [`PrimeFrame`]s into buffer objects of a drm device.

use std::os::unix::io::AsFd;

use drm::{buffer, control::Device as ControlDevice};
use tracing::{trace, warn};

use super::{
    error::{AccessError, Error},
    DrmDeviceFd,
};
use crate::backend::allocator::{
    format::FourccName,
    prime::{PrimeFrame, PrimePlane, MAX_PLANES},
    Modifier,
};
use crate::utils::{Buffer as BufferCoords, DevPath, Size};

/// A buffer object handle owned by this process, closed on drop
#[derive(Debug)]
pub struct GemHandle {
    handle: buffer::Handle,
    drm: DrmDeviceFd,
}

impl GemHandle {
    /// Raw handle of the buffer object
    pub fn handle(&self) -> buffer::Handle {
        self.handle
    }
}

impl Drop for GemHandle {
    fn drop(&mut self) {
        trace!(handle = ?self.handle, "closing buffer object");
        if let Err(err) = self.drm.close_buffer(self.handle) {
            warn!(handle = ?self.handle, ?err, "failed to close buffer object");
        }
    }
}

/// Layout of one scanout plane of an [`ImportedBuffer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    /// Buffer object holding the plane
    pub handle: buffer::Handle,
    /// Row pitch in bytes
    pub pitch: u32,
    /// Offset inside the buffer object
    pub offset: u32,
    /// Layout modifier of the buffer object
    pub modifier: Modifier,
}

/// Compute the plane layout of a frame out of its planes and imported objects
///
/// Planes keep their index; planes with a zero pitch are left empty.
/// `objects` holds the imported handle and modifier of each frame object, by object index.
pub fn plane_layout(
    planes: &[PrimePlane],
    objects: &[(buffer::Handle, Modifier)],
) -> [Option<PlaneLayout>; MAX_PLANES] {
    let mut layout = [None; MAX_PLANES];
    for (slot, plane) in layout.iter_mut().zip(planes) {
        if plane.pitch == 0 {
            continue;
        }
        let Some((handle, modifier)) = objects.get(plane.object) else {
            continue;
        };
        *slot = Some(PlaneLayout {
            handle: *handle,
            pitch: plane.pitch,
            offset: plane.offset,
            modifier: *modifier,
        });
    }
    layout
}

/// A frame whose memory objects were imported into the device
///
/// Owns the buffer object handles. The frame's file descriptors are not needed anymore
/// once this exists.
#[derive(Debug)]
pub struct ImportedBuffer {
    code: u32,
    size: Size<u32, BufferCoords>,
    planes: [Option<PlaneLayout>; MAX_PLANES],
    handles: Vec<GemHandle>,
}

impl ImportedBuffer {
    /// Fourcc code the buffer will be presented with
    pub fn code(&self) -> u32 {
        self.code
    }

    /// Size of the image in pixels
    pub fn size(&self) -> Size<u32, BufferCoords> {
        self.size
    }

    /// Plane layout, indexed like the planes of the source frame
    pub fn planes(&self) -> &[Option<PlaneLayout>; MAX_PLANES] {
        &self.planes
    }

    /// Owned buffer object handles, one per frame object
    pub fn handles(&self) -> &[GemHandle] {
        &self.handles
    }
}

/// Import every memory object of `frame` into `drm`
///
/// Objects imported before a failing one are closed again.
#[profiling::function]
pub fn import_frame(drm: &DrmDeviceFd, frame: &PrimeFrame, code: u32) -> Result<ImportedBuffer, Error> {
    let mut handles = Vec::with_capacity(frame.objects().len());
    for object in frame.objects() {
        let handle = drm.prime_fd_to_buffer(object.as_fd()).map_err(|source| {
            Error::Import(AccessError {
                errmsg: "Failed to import prime fd",
                dev: drm.dev_path(),
                source,
            })
        })?;
        handles.push(GemHandle {
            handle,
            drm: drm.clone(),
        });
    }

    let objects = handles
        .iter()
        .zip(frame.objects())
        .map(|(handle, object)| (handle.handle(), object.modifier()))
        .collect::<Vec<_>>();
    let planes = plane_layout(frame.planes(), &objects);
    trace!(
        "Imported {} frame with {} objects: {:?}",
        FourccName(code),
        handles.len(),
        planes
    );

    Ok(ImportedBuffer {
        code,
        size: frame.size(),
        planes,
        handles,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(id: u32) -> buffer::Handle {
        // buffer handles are plain ids
        buffer::Handle::from(std::num::NonZeroU32::new(id).unwrap())
    }

    #[test]
    fn zero_pitch_planes_are_skipped() {
        let planes = [
            PrimePlane {
                object: 0,
                offset: 0,
                pitch: 1920,
            },
            PrimePlane {
                object: 0,
                offset: 1920 * 1080,
                pitch: 0,
            },
            PrimePlane {
                object: 1,
                offset: 64,
                pitch: 960,
            },
        ];
        let objects = [(handle(3), Modifier::Linear), (handle(4), Modifier::Linear)];

        let layout = plane_layout(&planes, &objects);
        assert_eq!(
            layout[0],
            Some(PlaneLayout {
                handle: handle(3),
                pitch: 1920,
                offset: 0,
                modifier: Modifier::Linear,
            })
        );
        assert_eq!(layout[1], None);
        assert_eq!(
            layout[2],
            Some(PlaneLayout {
                handle: handle(4),
                pitch: 960,
                offset: 64,
                modifier: Modifier::Linear,
            })
        );
        assert_eq!(layout[3], None);
    }

    #[test]
    fn modifier_follows_object() {
        let planes = [
            PrimePlane {
                object: 1,
                offset: 0,
                pitch: 256,
            },
            PrimePlane {
                object: 0,
                offset: 0,
                pitch: 256,
            },
        ];
        let objects = [
            (handle(7), Modifier::Linear),
            (handle(8), Modifier::I915_x_tiled),
        ];

        let layout = plane_layout(&planes, &objects);
        assert_eq!(layout[0].unwrap().handle, handle(8));
        assert_eq!(layout[0].unwrap().modifier, Modifier::I915_x_tiled);
        assert_eq!(layout[1].unwrap().modifier, Modifier::Linear);
    }

    #[test]
    fn dangling_object_index_yields_empty_plane() {
        let planes = [PrimePlane {
            object: 2,
            offset: 0,
            pitch: 64,
        }];
        let layout = plane_layout(&planes, &[(handle(1), Modifier::Linear)]);
        assert!(layout.iter().all(Option::is_none));
    }
}
