//! Byte FIFO that turns arbitrarily sized pipeline buffers into fixed windows.
//!
//! Two consumption patterns are supported and yield identical bytes:
//!
//! - destination-driven: [`StreamAdapter::copy_to`] copies exactly
//!   `dest.len()` bytes and flushes them in the same step;
//! - view-then-flush: [`StreamAdapter::take_window`] borrows the first `n`
//!   bytes, the caller consumes them, then calls [`StreamAdapter::flush`].
//!
//! # Exemples
//!
//! ```
//! use pmocsound::StreamAdapter;
//!
//! let mut adapter = StreamAdapter::new();
//! adapter.push(&[1, 2, 3]);
//! adapter.push(&[4, 5]);
//!
//! let window = adapter.take_window(4).unwrap();
//! assert_eq!(window, &[1, 2, 3, 4]);
//! adapter.flush(4).unwrap();
//! assert_eq!(adapter.available(), 1);
//! ```

use bytes::{Buf, Bytes, BytesMut};

use crate::error::AdapterError;

#[derive(Debug, Default)]
pub struct StreamAdapter {
    queue: BytesMut,
}

impl StreamAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-allocates room for `capacity` bytes, typically a few frames.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: BytesMut::with_capacity(capacity),
        }
    }

    /// Appends `bytes` after everything already buffered.
    pub fn push(&mut self, bytes: &[u8]) {
        self.queue.extend_from_slice(bytes);
    }

    /// Number of buffered bytes.
    #[inline]
    pub fn available(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Borrows the first `n` buffered bytes without consuming them.
    ///
    /// The view lives as long as the shared borrow of the adapter, i.e. until
    /// the next mutating call.
    pub fn take_window(&self, n: usize) -> Result<&[u8], AdapterError> {
        self.ensure(n)?;
        Ok(&self.queue[..n])
    }

    /// Discards the first `n` bytes.
    pub fn flush(&mut self, n: usize) -> Result<(), AdapterError> {
        let available = self.available();
        if n > available {
            return Err(AdapterError::InvariantViolation {
                requested: n,
                available,
            });
        }
        self.queue.advance(n);
        Ok(())
    }

    /// Copies exactly `dest.len()` bytes into `dest` and flushes them.
    pub fn copy_to(&mut self, dest: &mut [u8]) -> Result<(), AdapterError> {
        let n = dest.len();
        self.ensure(n)?;
        dest.copy_from_slice(&self.queue[..n]);
        self.queue.advance(n);
        Ok(())
    }

    /// Splits the first `n` bytes off the queue without copying them.
    pub fn take(&mut self, n: usize) -> Result<Bytes, AdapterError> {
        self.ensure(n)?;
        Ok(self.queue.split_to(n).freeze())
    }

    /// Drops every buffered byte.
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    fn ensure(&self, n: usize) -> Result<(), AdapterError> {
        let available = self.available();
        if available < n {
            Err(AdapterError::InsufficientData {
                requested: n,
                available,
            })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks() -> Vec<Vec<u8>> {
        vec![
            (0u8..7).collect(),
            vec![],
            (7u8..8).collect(),
            (8u8..40).collect(),
            (40u8..43).collect(),
        ]
    }

    #[test]
    fn test_fifo_roundtrip_view_then_flush() {
        let mut adapter = StreamAdapter::new();
        let mut recovered = Vec::new();
        for chunk in chunks() {
            adapter.push(&chunk);
            while let Ok(window) = adapter.take_window(5) {
                recovered.extend_from_slice(window);
                adapter.flush(5).unwrap();
            }
        }
        let rest = adapter.available();
        recovered.extend_from_slice(adapter.take_window(rest).unwrap());
        adapter.flush(rest).unwrap();

        assert_eq!(recovered, (0u8..43).collect::<Vec<_>>());
        assert!(adapter.is_empty());
    }

    #[test]
    fn test_both_patterns_yield_identical_bytes() {
        let mut by_view = StreamAdapter::new();
        let mut by_copy = StreamAdapter::new();
        let mut a = Vec::new();
        let mut b = Vec::new();

        for chunk in chunks() {
            by_view.push(&chunk);
            by_copy.push(&chunk);

            while by_view.available() >= 6 {
                a.extend_from_slice(by_view.take_window(6).unwrap());
                by_view.flush(6).unwrap();
            }
            let mut dest = [0u8; 6];
            while by_copy.copy_to(&mut dest).is_ok() {
                b.extend_from_slice(&dest);
            }
        }

        assert_eq!(a, b);
        assert_eq!(by_view.available(), by_copy.available());
    }

    #[test]
    fn test_take_window_insufficient_data() {
        let mut adapter = StreamAdapter::new();
        adapter.push(&[1, 2, 3]);
        assert_eq!(
            adapter.take_window(4),
            Err(AdapterError::InsufficientData {
                requested: 4,
                available: 3
            })
        );
        // A failed copy must not consume anything.
        let mut dest = [0u8; 4];
        assert!(adapter.copy_to(&mut dest).is_err());
        assert_eq!(adapter.available(), 3);
    }

    #[test]
    fn test_flush_beyond_available() {
        let mut adapter = StreamAdapter::new();
        adapter.push(&[0; 8]);
        assert_eq!(
            adapter.flush(9),
            Err(AdapterError::InvariantViolation {
                requested: 9,
                available: 8
            })
        );
        assert_eq!(adapter.available(), 8);
    }

    #[test]
    fn test_take_splits_without_reordering() {
        let mut adapter = StreamAdapter::with_capacity(16);
        adapter.push(b"abcdef");
        let head = adapter.take(4).unwrap();
        adapter.push(b"gh");
        assert_eq!(&head[..], b"abcd");
        assert_eq!(adapter.take_window(4).unwrap(), b"efgh");
        adapter.clear();
        assert!(adapter.is_empty());
    }
}
