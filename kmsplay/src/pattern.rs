//! A frame source painting a moving test pattern into dumb buffers.

use std::{
    fs::{File, OpenOptions},
    io,
    os::unix::io::{AsFd, BorrowedFd},
    path::Path,
};

use clap::ValueEnum;
use kms_overlay::{
    backend::allocator::{prime::PrimeFrame, Fourcc, Modifier},
    presenter::{FramePoll, FrameSource},
    reexports::drm::{
        self,
        buffer::Buffer as _,
        control::{dumbbuffer::DumbBuffer, Device as ControlDevice},
    },
    utils::AspectRatio,
};
use tracing::{debug, trace, warn};

/// Buffers in flight: one on screen, one retiring, one being painted
const POOL_SIZE: usize = 3;

/// Pixel format of the generated frames
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternFormat {
    /// 32 bit RGB
    #[value(name = "xrgb8888")]
    Xrgb8888,
    /// 8 bit luma plane followed by an interleaved chroma plane
    #[value(name = "nv12")]
    Nv12,
}

impl PatternFormat {
    fn fourcc(self) -> Fourcc {
        match self {
            PatternFormat::Xrgb8888 => Fourcc::Xrgb8888,
            PatternFormat::Nv12 => Fourcc::Nv12,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PatternError {
    #[error("Failed to open {path}: {source}")]
    Open { path: String, source: io::Error },
    #[error("{what} failed: {source}")]
    Device { what: &'static str, source: io::Error },
    #[error("Frame size {0}x{1} is not supported")]
    Size(u32, u32),
}

// The source opens its own file description, so its buffer handles live in a separate
// namespace and frames really travel through prime fds.
#[derive(Debug)]
struct Card(File);

impl AsFd for Card {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}

impl drm::Device for Card {}
impl ControlDevice for Card {}

#[derive(Debug)]
pub struct TestPattern {
    card: Card,
    format: PatternFormat,
    size: (u32, u32),
    pool: Vec<DumbBuffer>,
    produced: u64,
    limit: Option<u64>,
}

impl TestPattern {
    pub fn new(
        device: &Path,
        format: PatternFormat,
        size: (u32, u32),
        limit: Option<u64>,
    ) -> Result<TestPattern, PatternError> {
        let (w, h) = size;
        // nv12 chroma is subsampled by two in both directions
        if w == 0 || h == 0 || (format == PatternFormat::Nv12 && (w % 2 != 0 || h % 2 != 0)) {
            return Err(PatternError::Size(w, h));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(device)
            .map_err(|source| PatternError::Open {
                path: device.display().to_string(),
                source,
            })?;
        let card = Card(file);

        let mut pool = Vec::with_capacity(POOL_SIZE);
        for _ in 0..POOL_SIZE {
            let buffer = match format {
                PatternFormat::Xrgb8888 => card.create_dumb_buffer(size, Fourcc::Xrgb8888, 32),
                PatternFormat::Nv12 => card.create_dumb_buffer((w, h * 3 / 2), Fourcc::Nv12, 8),
            };
            match buffer {
                Ok(buffer) => pool.push(buffer),
                Err(source) => {
                    release_all(pool, |buffer| card.destroy_dumb_buffer(buffer));
                    return Err(PatternError::Device {
                        what: "Creating dumb buffer",
                        source,
                    });
                }
            }
        }
        debug!(?format, "Allocated {} pattern buffers of {}x{}", POOL_SIZE, w, h);

        Ok(TestPattern {
            card,
            format,
            size,
            pool,
            produced: 0,
            limit,
        })
    }

    fn paint(&mut self, idx: usize) -> Result<(), PatternError> {
        let (w, h) = self.size;
        let offset = (self.produced * 8 % w as u64) as u32;
        let format = self.format;
        let buffer = &mut self.pool[idx];
        let pitch = buffer.pitch() as usize;
        let mut mapping = self
            .card
            .map_dumb_buffer(buffer)
            .map_err(|source| PatternError::Device {
                what: "Mapping dumb buffer",
                source,
            })?;
        let pixels: &mut [u8] = mapping.as_mut();

        match format {
            PatternFormat::Xrgb8888 => {
                for (y, row) in pixels.chunks_exact_mut(pitch).take(h as usize).enumerate() {
                    for (x, px) in row.chunks_exact_mut(4).take(w as usize).enumerate() {
                        let color = bar_color((x as u32 + offset) % w * 8 / w, y as u32 * 255 / h);
                        px.copy_from_slice(&color.to_le_bytes());
                    }
                }
            }
            PatternFormat::Nv12 => {
                let (luma, chroma) = pixels.split_at_mut(pitch * h as usize);
                for row in luma.chunks_exact_mut(pitch) {
                    for (x, px) in row.iter_mut().take(w as usize).enumerate() {
                        *px = (((x as u32 + offset) % w) * 255 / w) as u8;
                    }
                }
                chroma.fill(128);
            }
        }
        Ok(())
    }

    fn export(&self, idx: usize) -> Result<PrimeFrame, PatternError> {
        let buffer = &self.pool[idx];
        let fd = self
            .card
            .buffer_to_prime_fd(buffer.handle(), (libc::O_CLOEXEC | libc::O_RDWR) as u32)
            .map_err(|source| PatternError::Device {
                what: "Exporting dumb buffer",
                source,
            })?;

        let (w, h) = self.size;
        let pitch = buffer.pitch();
        let mut builder = PrimeFrame::builder(self.size, self.format.fourcc() as u32, AspectRatio::SQUARE);
        let object = builder.add_object(fd, Modifier::Linear).unwrap_or_default();
        builder.add_plane(object, 0, pitch);
        if self.format == PatternFormat::Nv12 {
            builder.add_plane(object, pitch * h, pitch);
        }
        builder.build().ok_or(PatternError::Size(w, h))
    }
}

fn bar_color(bar: u32, shade: u32) -> u32 {
    let shade = shade.min(255);
    let (r, g, b) = match bar {
        0 => (255, 255, 255),
        1 => (255, 255, 0),
        2 => (0, 255, 255),
        3 => (0, 255, 0),
        4 => (255, 0, 255),
        5 => (255, 0, 0),
        6 => (0, 0, 255),
        _ => (shade, shade, shade),
    };
    (r << 16) | (g << 8) | b
}

impl FrameSource for TestPattern {
    type Error = PatternError;

    fn next_frame(&mut self) -> Result<FramePoll, PatternError> {
        if self.limit.is_some_and(|limit| self.produced >= limit) {
            return Ok(FramePoll::EndOfStream);
        }

        // the presenter holds on to the last two frames, the third buffer is free
        let idx = (self.produced % POOL_SIZE as u64) as usize;
        self.paint(idx)?;
        let frame = self.export(idx)?;
        self.produced += 1;
        trace!(frame = self.produced, "Painted pattern frame");

        Ok(FramePoll::Frame(frame))
    }
}

/// Destroy every buffer of `pool`, returns how many could not be destroyed
fn release_all<B>(pool: impl IntoIterator<Item = B>, mut destroy: impl FnMut(B) -> io::Result<()>) -> usize {
    let mut failed = 0;
    for buffer in pool {
        if let Err(err) = destroy(buffer) {
            warn!(?err, "failed to destroy pattern buffer");
            failed += 1;
        }
    }
    failed
}

impl Drop for TestPattern {
    fn drop(&mut self) {
        let card = &self.card;
        release_all(self.pool.drain(..), |buffer| card.destroy_dumb_buffer(buffer));
    }
}
