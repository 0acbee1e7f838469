use std::time::{Duration, Instant};

use drm::control::{
    atomic::AtomicModeReq, crtc, framebuffer, property, AtomicCommitFlags, Device as ControlDevice, Event,
};
use rustix::event::{poll, PollFd, PollFlags};
use rustix::io::Errno;
use tracing::{instrument, trace};

use crate::backend::drm::{
    error::{AccessError, Error},
    props::PropertyCache,
};
use crate::utils::{Buffer as BufferCoords, DevPath, Physical, Rectangle};

/// Flags used for every frame commit
pub const COMMIT_FLAGS: AtomicCommitFlags = AtomicCommitFlags::PAGE_FLIP_EVENT.union(AtomicCommitFlags::ALLOW_MODESET);

/// Where a framebuffer goes on a plane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneConfig {
    /// Framebuffer to scan out
    pub fb: framebuffer::Handle,
    /// Part of the framebuffer to scan out
    pub src: Rectangle<u32, BufferCoords>,
    /// Destination on the crtc
    pub dst: Rectangle<u32, Physical>,
}

/// Convert to 16.16 fixed point
#[inline]
pub fn to_fixed(n: u32) -> u64 {
    (n as u64) << 16
}

/// Add the state of `config` on the plane of `props` to `req`
///
/// All property ids are resolved before anything is added, so a missing
/// property leaves `req` untouched.
#[profiling::function]
pub fn add_plane_state(
    req: &mut AtomicModeReq,
    props: &PropertyCache,
    crtc: crtc::Handle,
    config: &PlaneConfig,
) -> Result<(), Error> {
    let plane = props.plane();
    let state = [
        (props.get("FB_ID")?, property::Value::Framebuffer(Some(config.fb))),
        (props.get("CRTC_ID")?, property::Value::CRTC(Some(crtc))),
        // these are 16.16. fixed point
        (props.get("SRC_X")?, property::Value::UnsignedRange(to_fixed(config.src.loc.x))),
        (props.get("SRC_Y")?, property::Value::UnsignedRange(to_fixed(config.src.loc.y))),
        (props.get("SRC_W")?, property::Value::UnsignedRange(to_fixed(config.src.size.w))),
        (props.get("SRC_H")?, property::Value::UnsignedRange(to_fixed(config.src.size.h))),
        (props.get("CRTC_X")?, property::Value::SignedRange(config.dst.loc.x as i64)),
        (props.get("CRTC_Y")?, property::Value::SignedRange(config.dst.loc.y as i64)),
        (props.get("CRTC_W")?, property::Value::UnsignedRange(config.dst.size.w as u64)),
        (props.get("CRTC_H")?, property::Value::UnsignedRange(config.dst.size.h as u64)),
    ];

    for (prop, value) in state {
        req.add_property(plane, prop, value);
    }
    Ok(())
}

/// Submit `req` asking for a page flip event
#[instrument(level = "trace", skip_all)]
pub fn submit<D>(fd: &D, req: AtomicModeReq) -> Result<(), AccessError>
where
    D: DevPath + ControlDevice,
{
    fd.atomic_commit(COMMIT_FLAGS, req).map_err(|source| AccessError {
        errmsg: "Atomic commit failed",
        dev: fd.dev_path(),
        source,
    })
}

/// Block until the page flip event of `crtc` was read from `fd`
///
/// Waits forever without a `timeout`. Other events read in the meantime are dropped.
#[instrument(level = "trace", skip(fd))]
pub fn wait_for_flip<D>(fd: &D, crtc: crtc::Handle, timeout: Option<Duration>) -> Result<(), Error>
where
    D: DevPath + ControlDevice,
{
    let deadline = timeout.map(|timeout| Instant::now() + timeout);
    let access = |errmsg: &'static str, source: std::io::Error| {
        Error::Access(AccessError {
            errmsg,
            dev: fd.dev_path(),
            source,
        })
    };

    loop {
        let poll_timeout = match deadline {
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                i32::try_from(left.as_millis()).unwrap_or(i32::MAX)
            }
            None => -1,
        };

        let borrowed = fd.as_fd();
        let mut fds = [PollFd::new(&borrowed, PollFlags::IN)];
        match poll(&mut fds, poll_timeout) {
            Ok(0) => return Err(Error::FlipTimeout(crtc)),
            Ok(_) => {}
            Err(Errno::INTR) => continue,
            Err(errno) => return Err(access("Error waiting for drm events", errno.into())),
        }

        let events = fd
            .receive_events()
            .map_err(|source| access("Error processing drm events", source))?;
        let mut flipped = false;
        for event in events {
            match event {
                Event::PageFlip(event) if event.crtc == crtc => {
                    trace!(frame = event.frame, "Got a page-flip event for crtc ({:?})", event.crtc);
                    flipped = true;
                }
                Event::PageFlip(event) => {
                    trace!("Got a page-flip event for foreign crtc ({:?})", event.crtc);
                }
                _ => trace!("Got a non-page-flip event of device '{:?}'.", fd.dev_path()),
            }
        }
        if flipped {
            return Ok(());
        }
    }
}
