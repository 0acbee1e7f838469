//! Per frame bookkeeping of a display session.
//!
//! [`FrameState`] owns the open atomic request, the buffer ring and the pending blank
//! request. The device calls are passed in by [`DrmDevice`](super::DrmDevice), so the
//! ordering rules of a commit live in one place.

use drm::control::{atomic::AtomicModeReq, crtc, plane};
use tracing::{trace, warn};

use super::atomic::{add_plane_state, PlaneConfig};
use crate::backend::drm::{error::Error, props::PropertyCache, ring::BufferRing};

#[derive(Debug)]
pub struct FrameState<T> {
    crtc: crtc::Handle,
    props: PropertyCache,
    pending: AtomicModeReq,
    ring: BufferRing<T>,
    blank_request: Option<plane::Handle>,
}

impl<T> FrameState<T> {
    pub fn new(crtc: crtc::Handle, props: PropertyCache) -> FrameState<T> {
        FrameState {
            crtc,
            props,
            pending: AtomicModeReq::new(),
            ring: BufferRing::new(),
            blank_request: None,
        }
    }

    /// Plane frames are committed to
    pub fn plane(&self) -> plane::Handle {
        self.props.plane()
    }

    /// Remember `plane` to be blanked with the next commit
    ///
    /// Requests for the content plane are ignored, its state would replace the frame.
    pub fn request_blank(&mut self, plane: plane::Handle) {
        if plane == self.plane() {
            warn!(?plane, "Refusing to blank the plane frames are shown on");
            return;
        }
        self.blank_request = Some(plane);
    }

    #[cfg(test)]
    pub fn blank_request(&self) -> Option<plane::Handle> {
        self.blank_request
    }

    pub fn buffers_in_use(&self) -> usize {
        self.ring.len()
    }

    /// Commit `buffer` as described by `config`
    ///
    /// `add_blank` adds the state of a pending blank request to the request and returns
    /// whatever has to stay alive until the flip. `flip` submits the request and waits for
    /// the page flip.
    ///
    /// - If the plane state can not be built, nothing is submitted and a pending blank
    ///   request is kept for the next frame.
    /// - A blank request is consumed once the content state was added, even if blanking fails.
    /// - A failed `flip` drops `buffer` and leaves the ring untouched.
    ///
    /// On success returns the buffer retired by this commit.
    pub fn commit<B, A, F>(&mut self, buffer: T, config: &PlaneConfig, add_blank: A, flip: F) -> Result<Option<T>, Error>
    where
        A: FnOnce(&mut AtomicModeReq, plane::Handle) -> Result<B, Error>,
        F: FnOnce(AtomicModeReq) -> Result<(), Error>,
    {
        if let Err(err) = add_plane_state(&mut self.pending, &self.props, self.crtc, config) {
            self.pending = AtomicModeReq::new();
            return Err(err);
        }

        let blank = self.blank_request.take().and_then(|plane| {
            match add_blank(&mut self.pending, plane) {
                Ok(blank) => Some(blank),
                Err(err) => {
                    warn!(?plane, "Failed to blank plane: {}", err);
                    None
                }
            }
        });

        flip(std::mem::take(&mut self.pending))?;

        let retired = self.ring.advance(buffer);
        if blank.is_some() {
            trace!("Releasing blank buffer");
        }
        drop(blank);
        Ok(retired)
    }

    /// Take all buffers out of the ring
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.ring.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::drm::error::AccessError;
    use crate::utils::Rectangle;
    use drm::control::from_u32;
    use std::{cell::RefCell, io, rc::Rc};

    const PLANE_PROPS: [&str; 10] = [
        "FB_ID", "CRTC_ID", "SRC_X", "SRC_Y", "SRC_W", "SRC_H", "CRTC_X", "CRTC_Y", "CRTC_W", "CRTC_H",
    ];

    struct Tracked {
        id: usize,
        log: Rc<RefCell<Vec<usize>>>,
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.log.borrow_mut().push(self.id);
        }
    }

    fn props(plane: u32, names: &[&str]) -> PropertyCache {
        PropertyCache::from_ids(
            from_u32(plane).unwrap(),
            names
                .iter()
                .enumerate()
                .map(|(i, name)| (name.to_string(), from_u32(i as u32 + 1).unwrap())),
        )
    }

    fn state<T>(names: &[&str]) -> FrameState<T> {
        FrameState::new(from_u32(40).unwrap(), props(31, names))
    }

    fn config(fb: u32) -> PlaneConfig {
        PlaneConfig {
            fb: from_u32(fb).unwrap(),
            src: Rectangle::from_loc_and_size((0, 0), (1920, 1080)),
            dst: Rectangle::from_loc_and_size((240, 0), (1440, 1080)),
        }
    }

    fn no_blank(_: &mut AtomicModeReq, plane: plane::Handle) -> Result<(), Error> {
        panic!("unexpected blank of {:?}", plane)
    }

    fn rejected() -> Error {
        Error::Commit {
            plane: from_u32(31).unwrap(),
            source: AccessError {
                errmsg: "Atomic commit failed",
                dev: None,
                source: io::Error::from_raw_os_error(16),
            },
        }
    }

    #[test]
    fn successful_commits_retire_with_delay() {
        let mut state = state::<usize>(&PLANE_PROPS);
        for n in 0..5 {
            let retired = state.commit(n, &config(90), no_blank, |_| Ok(())).unwrap();
            assert_eq!(retired, n.checked_sub(2));
            assert_eq!(state.buffers_in_use(), (n + 1).min(2));
        }
    }

    #[test]
    fn submitted_request_holds_frame_state() {
        let mut state = state::<usize>(&PLANE_PROPS);
        let mut submitted = None;
        state
            .commit(0, &config(90), no_blank, |req| {
                submitted = Some(format!("{:?}", req));
                Ok(())
            })
            .unwrap();
        let submitted = submitted.unwrap();
        assert!(
            submitted.contains("values: [90, 40, 0, 0, 125829120, 70778880, 240, 0, 1440, 1080]"),
            "{}",
            submitted
        );
        // the next frame starts from an empty request
        assert_eq!(format!("{:?}", state.pending), format!("{:?}", AtomicModeReq::new()));
    }

    #[test]
    fn rejected_commit_keeps_ring() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let buffer = |id| Tracked { id, log: log.clone() };
        let mut state = state(&PLANE_PROPS);

        assert!(state.commit(buffer(0), &config(90), no_blank, |_| Ok(())).unwrap().is_none());
        match state.commit(buffer(1), &config(91), no_blank, |_| Err(rejected())) {
            Err(err) => assert!(!err.is_fatal()),
            Ok(_) => panic!("rejected commit succeeded"),
        }

        // the new buffer is gone, the one on screen is untouched
        assert_eq!(*log.borrow(), vec![1]);
        assert_eq!(state.buffers_in_use(), 1);
        assert_eq!(state.ring.current().map(|b| b.id), Some(0));
        assert_eq!(format!("{:?}", state.pending), format!("{:?}", AtomicModeReq::new()));
    }

    #[test]
    fn missing_property_submits_nothing() {
        let mut state = state::<usize>(&PLANE_PROPS[..2]);
        state.request_blank(from_u32(32).unwrap());

        match state.commit(0, &config(90), no_blank, |_| panic!("submitted incomplete request")) {
            Err(Error::UnknownProperty { name, .. }) => assert_eq!(name, "SRC_X"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(state.buffers_in_use(), 0);
        // blanking is retried with the next frame
        assert_eq!(state.blank_request(), Some(from_u32(32).unwrap()));
    }

    #[test]
    fn blank_request_is_consumed_on_failure() {
        let mut state = state::<usize>(&PLANE_PROPS);
        state.request_blank(from_u32(32).unwrap());

        let failing = |_: &mut AtomicModeReq, _: plane::Handle| -> Result<(), Error> {
            Err(Error::UnknownProperty {
                handle: from_u32::<plane::Handle>(32).unwrap().into(),
                name: "FB_ID",
            })
        };
        state.commit(0, &config(90), failing, |_| Ok(())).unwrap();
        assert_eq!(state.blank_request(), None);
        assert_eq!(state.buffers_in_use(), 1);
    }

    #[test]
    fn blank_lives_until_flip() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut state = state::<usize>(&PLANE_PROPS);
        state.request_blank(from_u32(32).unwrap());

        let blank_log = log.clone();
        let add_blank = move |req: &mut AtomicModeReq, plane: plane::Handle| -> Result<Tracked, Error> {
            let blank_props = props(plane_id(plane), &PLANE_PROPS);
            add_plane_state(req, &blank_props, from_u32(40).unwrap(), &config(91))?;
            Ok(Tracked { id: 91, log: blank_log })
        };
        let flip_log = log.clone();
        state
            .commit(0, &config(90), add_blank, |req| {
                let submitted = format!("{:?}", req);
                // both planes go out in the same request
                assert!(submitted.contains("objects: [31, 32]"), "{}", submitted);
                flip_log.borrow_mut().push(0);
                Ok(())
            })
            .unwrap();

        assert_eq!(*log.borrow(), vec![0, 91]);
        assert_eq!(state.blank_request(), None);
    }

    #[test]
    fn content_plane_is_never_blanked() {
        let mut state = state::<usize>(&PLANE_PROPS);
        state.request_blank(from_u32(31).unwrap());
        assert_eq!(state.blank_request(), None);

        let mut submitted = None;
        state
            .commit(0, &config(90), no_blank, |req| {
                submitted = Some(format!("{:?}", req));
                Ok(())
            })
            .unwrap();
        let submitted = submitted.unwrap();
        assert!(submitted.contains("values: [90, 40, 0, 0, 125829120, 70778880, 240, 0, 1440, 1080]"));
    }

    fn plane_id(plane: plane::Handle) -> u32 {
        drm::control::RawResourceHandle::from(plane).get()
    }
}
