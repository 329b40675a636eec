//! Owned byte buffer exchanged with the host pipeline.

use bytes::Bytes;

use crate::clock::ClockTime;
use crate::error::{CsoundError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineBuffer {
    data: Vec<u8>,
    timestamp: Option<ClockTime>,
    duration: Option<ClockTime>,
}

impl PipelineBuffer {
    /// Allocates a zeroed buffer of `size` bytes.
    ///
    /// Fails with [`CsoundError::AllocationFailed`] instead of aborting when
    /// the memory cannot be reserved.
    pub fn allocate(size: usize) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|_| CsoundError::AllocationFailed { size })?;
        data.resize(size, 0);
        Ok(Self::from_vec(data))
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        Self {
            data,
            timestamp: None,
            duration: None,
        }
    }

    pub fn from_slice(data: &[u8]) -> Self {
        Self::from_vec(data.to_vec())
    }

    pub fn from_bytes(data: Bytes) -> Self {
        Self::from_vec(Vec::from(data))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn map_read(&self) -> &[u8] {
        &self.data
    }

    pub fn map_write(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Shrinks the buffer, or grows it with zeroes.
    pub fn set_size(&mut self, size: usize) {
        self.data.resize(size, 0);
    }

    pub fn timestamp(&self) -> Option<ClockTime> {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: Option<ClockTime>) {
        self.timestamp = timestamp;
    }

    pub fn duration(&self) -> Option<ClockTime> {
        self.duration
    }

    pub fn set_duration(&mut self, duration: Option<ClockTime>) {
        self.duration = duration;
    }

    /// Timestamp plus duration, when both are known.
    pub fn end_time(&self) -> Option<ClockTime> {
        Some(self.timestamp? + self.duration?)
    }

    /// Copies timestamp and duration from `other`.
    pub fn copy_metadata_from(&mut self, other: &PipelineBuffer) {
        self.timestamp = other.timestamp;
        self.duration = other.duration;
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

impl From<Vec<u8>> for PipelineBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self::from_vec(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_is_zeroed() {
        let buffer = PipelineBuffer::allocate(16).unwrap();
        assert_eq!(buffer.len(), 16);
        assert!(buffer.map_read().iter().all(|&b| b == 0));
        assert_eq!(buffer.timestamp(), None);
    }

    #[test]
    fn test_allocation_failure_is_reported() {
        let err = PipelineBuffer::allocate(usize::MAX).unwrap_err();
        assert!(matches!(err, CsoundError::AllocationFailed { size } if size == usize::MAX));
    }

    #[test]
    fn test_metadata_and_size() {
        let mut input = PipelineBuffer::from_slice(&[1, 2, 3, 4]);
        input.set_timestamp(Some(10));
        input.set_duration(Some(5));
        assert_eq!(input.end_time(), Some(15));

        let mut output = PipelineBuffer::allocate(8).unwrap();
        output.copy_metadata_from(&input);
        output.set_size(3);
        assert_eq!(output.len(), 3);
        assert_eq!(output.timestamp(), Some(10));
        assert_eq!(output.duration(), Some(5));
    }
}
