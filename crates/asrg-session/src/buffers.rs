//! The two PCM16 byte buffers a session maintains (spec §4.3 step 1):
//! a rolling, bounded `ctx_buf` fed to partial ticks, and an unbounded
//! (until cut) `full_buf` spanning the current segment.

use std::collections::VecDeque;

/// A bounded FIFO byte buffer. Pushing past `cap` evicts from the front.
#[derive(Debug, Clone)]
pub struct RollingBuffer {
    data: VecDeque<u8>,
    cap: usize,
}

impl RollingBuffer {
    #[must_use]
    pub fn new(cap: usize) -> Self {
        Self {
            data: VecDeque::with_capacity(cap),
            cap,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.data.extend(bytes.iter().copied());
        let excess = self.data.len().saturating_sub(self.cap);
        if excess > 0 {
            self.data.drain(..excess);
        }
    }

    /// Resize the cap, evicting from the front if the buffer is now over the
    /// new limit. Used when the sample rate changes mid-session.
    pub fn set_cap(&mut self, cap: usize) {
        self.cap = cap;
        let excess = self.data.len().saturating_sub(self.cap);
        if excess > 0 {
            self.data.drain(..excess);
        }
    }

    #[must_use]
    pub fn as_contiguous(&self) -> Vec<u8> {
        self.data.iter().copied().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Unbounded append-only buffer spanning the audio collected since the last
/// segmentation cut. `cut` splits off everything up to `end`, retaining the
/// trailing `overlap` bytes of the cut region as the new buffer's prefix.
#[derive(Debug, Clone, Default)]
pub struct SegmentBuffer {
    data: Vec<u8>,
}

impl SegmentBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Take the first `end` bytes out as the segment payload (spec §4.3:
    /// `full_buf[seg_start : end + overlap]`, but `seg_start` is always 0
    /// here since we drain on every cut), retaining the trailing `overlap`
    /// bytes as the new buffer's content.
    pub fn cut(&mut self, end: usize, overlap: usize) -> Vec<u8> {
        let end = end.min(self.data.len());
        let payload_end = (end + overlap).min(self.data.len());
        let payload = self.data[..payload_end].to_vec();
        let retained_start = payload_end.saturating_sub(overlap);
        self.data = self.data[retained_start..].to_vec();
        payload
    }

    /// Drain the whole buffer (terminal flush, spec §4.3 "Terminal flush").
    pub fn take_all(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_buffer_evicts_from_front() {
        let mut buf = RollingBuffer::new(4);
        buf.push(&[1, 2, 3]);
        buf.push(&[4, 5]);
        assert_eq!(buf.as_contiguous(), vec![2, 3, 4, 5]);
    }

    #[test]
    fn segment_buffer_cut_retains_overlap() {
        let mut buf = SegmentBuffer::new();
        buf.push(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let payload = buf.cut(6, 2);
        assert_eq!(payload, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(buf.as_slice(), &[7, 8]);
    }

    #[test]
    fn segment_buffer_take_all_empties_buffer() {
        let mut buf = SegmentBuffer::new();
        buf.push(&[9, 9, 9]);
        assert_eq!(buf.take_all(), vec![9, 9, 9]);
        assert!(buf.is_empty());
    }
}
