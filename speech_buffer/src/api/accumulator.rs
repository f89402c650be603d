use std::cmp::min;

use crate::api::error::Result;

/// A growable ring buffer of raw PCM bytes
///
/// Bytes are read back in the order they were written. The backing storage
/// only grows, so a steady stream of equally sized writes and reads settles
/// into a fixed allocation.
pub struct ByteAccumulator {
    buffer: Box<[u8]>,
    /// index of the first unread byte
    head: usize,
    /// number of unread bytes
    count: usize,
}

impl Default for ByteAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteAccumulator {
    pub fn new() -> Self {
        Self {
            buffer: Box::default(),
            head: 0,
            count: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: vec![0; capacity].into_boxed_slice(),
            head: 0,
            count: 0,
        }
    }

    /// Appends `bytes`, growing the buffer when they do not fit
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }

        self.reserve(self.count + bytes.len())?;

        let capacity = self.buffer.len();
        let tail = (self.head + self.count) % capacity;
        let first = min(bytes.len(), capacity - tail);

        self.buffer[tail..tail + first].copy_from_slice(&bytes[..first]);
        self.buffer[..bytes.len() - first].copy_from_slice(&bytes[first..]);

        self.count += bytes.len();
        Ok(())
    }

    /// Moves up to `destination.len()` bytes from the front of the buffer into `destination`
    ///
    /// Returns the number of bytes copied.
    pub fn read(&mut self, destination: &mut [u8]) -> usize {
        let len = min(destination.len(), self.count);

        if len == 0 {
            return 0;
        }

        let capacity = self.buffer.len();
        let first = min(len, capacity - self.head);

        destination[..first].copy_from_slice(&self.buffer[self.head..self.head + first]);
        destination[first..len].copy_from_slice(&self.buffer[..len - first]);

        self.count -= len;
        self.head = if self.count == 0 {
            0
        } else {
            (self.head + len) % capacity
        };

        len
    }

    /// The number of unread bytes
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Drops every unread byte, keeping the allocation
    pub fn clear(&mut self) {
        self.head = 0;
        self.count = 0;
    }

    /// the unread bytes as two slices in read order
    fn as_slices(&self) -> (&[u8], &[u8]) {
        if self.count == 0 {
            return (&[], &[]);
        }

        let first = min(self.count, self.buffer.len() - self.head);

        (
            &self.buffer[self.head..self.head + first],
            &self.buffer[..self.count - first],
        )
    }

    /// grows the buffer geometrically so that it holds at least `required` bytes
    fn reserve(&mut self, required: usize) -> Result<()> {
        if required <= self.buffer.len() {
            return Ok(());
        }

        let capacity = required
            .checked_next_power_of_two()
            .unwrap_or(required)
            .max(self.buffer.len() * 2);

        let mut grown: Vec<u8> = Vec::new();
        grown.try_reserve_exact(capacity)?;

        let (first, second) = self.as_slices();
        grown.extend_from_slice(first);
        grown.extend_from_slice(second);
        grown.resize(capacity, 0);

        self.buffer = grown.into_boxed_slice();
        self.head = 0;

        Ok(())
    }
}
