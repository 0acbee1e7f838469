//! Retirement of scanned out buffers.

/// Holds the buffer on screen and the one it replaced
///
/// A buffer handed to [`BufferRing::advance`] becomes current once its commit was confirmed.
/// The previously current buffer may still be read by the display engine until the flip
/// completed, so it is kept one more commit and only released on the next advance.
/// The ring never holds more than two buffers.
#[derive(Debug)]
pub struct BufferRing<T> {
    current: Option<T>,
    previous: Option<T>,
}

impl<T> Default for BufferRing<T> {
    fn default() -> Self {
        BufferRing {
            current: None,
            previous: None,
        }
    }
}

impl<T> BufferRing<T> {
    /// Create an empty ring
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `buffer` current after a confirmed commit
    ///
    /// Returns the buffer that is no longer needed, which is the one that was shown two
    /// commits ago.
    pub fn advance(&mut self, buffer: T) -> Option<T> {
        let retired = self.previous.take();
        self.previous = self.current.replace(buffer);
        retired
    }

    /// The buffer currently on screen
    pub fn current(&self) -> Option<&T> {
        self.current.as_ref()
    }

    /// The buffer shown before the current one
    pub fn previous(&self) -> Option<&T> {
        self.previous.as_ref()
    }

    /// Amount of buffers held
    pub fn len(&self) -> usize {
        usize::from(self.current.is_some()) + usize::from(self.previous.is_some())
    }

    /// Returns true if no buffer is held
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take all buffers out of the ring, previous first
    pub fn drain(&mut self) -> impl Iterator<Item = T> {
        let previous = self.previous.take();
        let current = self.current.take();
        previous.into_iter().chain(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, rc::Rc};

    struct Tracked {
        id: usize,
        log: Rc<RefCell<Vec<usize>>>,
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.log.borrow_mut().push(self.id);
        }
    }

    #[test]
    fn holds_at_most_two() {
        let mut ring = BufferRing::new();
        assert!(ring.is_empty());
        assert_eq!(ring.advance(0), None);
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.advance(1), None);
        assert_eq!(ring.len(), 2);
        for n in 2..10 {
            assert_eq!(ring.advance(n), Some(n - 2));
            assert_eq!(ring.len(), 2);
            assert_eq!(ring.current(), Some(&n));
            assert_eq!(ring.previous(), Some(&(n - 1)));
        }
    }

    #[test]
    fn release_lags_one_commit() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut ring = BufferRing::new();
        let buffer = |id| Tracked { id, log: log.clone() };

        drop(ring.advance(buffer(0)));
        drop(ring.advance(buffer(1)));
        assert!(log.borrow().is_empty());

        // buffer 0 stays alive while 1 is shown, and goes once 2 is confirmed
        drop(ring.advance(buffer(2)));
        assert_eq!(*log.borrow(), vec![0]);
        drop(ring.advance(buffer(3)));
        assert_eq!(*log.borrow(), vec![0, 1]);
    }

    #[test]
    fn drain_releases_both() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut ring = BufferRing::new();
        let buffer = |id| Tracked { id, log: log.clone() };

        drop(ring.advance(buffer(0)));
        drop(ring.advance(buffer(1)));
        drop(ring.drain());
        // the iterator owns both buffers, dropping it releases them
        assert_eq!(*log.borrow(), vec![0, 1]);
        assert!(ring.is_empty());
    }
}
