//! Decoded frames shared as PRIME (dma-buf) file descriptors.
//!
//! A [`PrimeFrame`] is what a hardware decoder hands to the display path: a set of backing
//! memory objects, each exported as a file descriptor with its layout modifier, and a list
//! of planes describing where each plane of the image lives inside those objects.
//!
//! Frames own their file descriptors. Once a frame has been imported into a display device
//! it may be dropped, the kernel keeps the memory alive through the imported handles.

use std::os::unix::io::{AsFd, BorrowedFd, OwnedFd};

use super::Modifier;
use crate::utils::{AspectRatio, Buffer as BufferCoords, Size};

/// Maximum amount of planes (and memory objects) a frame may have
pub const MAX_PLANES: usize = 4;

/// A backing memory object of a frame
#[derive(Debug)]
pub struct PrimeObject {
    fd: OwnedFd,
    modifier: Modifier,
}

impl PrimeObject {
    /// The layout modifier of the memory in this object
    pub fn modifier(&self) -> Modifier {
        self.modifier
    }
}

impl AsFd for PrimeObject {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

/// Location of one image plane inside the frame's memory objects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimePlane {
    /// Index of the backing object in [`PrimeFrame::objects`]
    pub object: usize,
    /// Offset from the start of the object
    pub offset: u32,
    /// Row pitch in bytes, zero marks an unused plane
    pub pitch: u32,
}

/// A decoded frame ready to be imported into a display device
#[derive(Debug)]
pub struct PrimeFrame {
    code: u32,
    size: Size<u32, BufferCoords>,
    sar: AspectRatio,
    objects: Vec<PrimeObject>,
    planes: Vec<PrimePlane>,
}

impl PrimeFrame {
    /// Create a new frame builder
    ///
    /// `code` is the raw fourcc of the frame as reported by the decoder.
    pub fn builder(size: impl Into<Size<u32, BufferCoords>>, code: u32, sar: AspectRatio) -> PrimeFrameBuilder {
        PrimeFrameBuilder {
            frame: PrimeFrame {
                code,
                size: size.into(),
                sar,
                objects: Vec::with_capacity(MAX_PLANES),
                planes: Vec::with_capacity(MAX_PLANES),
            },
        }
    }

    /// Raw fourcc code as reported by the decoder
    pub fn code(&self) -> u32 {
        self.code
    }

    /// Size of the image in pixels
    pub fn size(&self) -> Size<u32, BufferCoords> {
        self.size
    }

    /// Sample aspect ratio of the image
    pub fn sample_aspect_ratio(&self) -> AspectRatio {
        self.sar
    }

    /// Backing memory objects
    pub fn objects(&self) -> &[PrimeObject] {
        &self.objects
    }

    /// Image planes, in plane order
    pub fn planes(&self) -> &[PrimePlane] {
        &self.planes
    }
}

/// Builder for [`PrimeFrame`]s
#[derive(Debug)]
pub struct PrimeFrameBuilder {
    frame: PrimeFrame,
}

impl PrimeFrameBuilder {
    /// Add a backing memory object, returns its index or `None` if [`MAX_PLANES`] objects were added already
    pub fn add_object(&mut self, fd: OwnedFd, modifier: Modifier) -> Option<usize> {
        if self.frame.objects.len() == MAX_PLANES {
            return None;
        }
        self.frame.objects.push(PrimeObject { fd, modifier });
        Some(self.frame.objects.len() - 1)
    }

    /// Add an image plane living in object `object`
    ///
    /// Returns `false` if [`MAX_PLANES`] planes were added already.
    pub fn add_plane(&mut self, object: usize, offset: u32, pitch: u32) -> bool {
        if self.frame.planes.len() == MAX_PLANES {
            return false;
        }
        self.frame.planes.push(PrimePlane { object, offset, pitch });
        true
    }

    /// Build the frame
    ///
    /// Returns `None` if the frame has no object, no plane, or a plane refers to an object that was never added.
    pub fn build(self) -> Option<PrimeFrame> {
        let frame = self.frame;
        if frame.objects.is_empty() || frame.planes.is_empty() {
            return None;
        }
        if frame.planes.iter().any(|plane| plane.object >= frame.objects.len()) {
            return None;
        }
        Some(frame)
    }
}
