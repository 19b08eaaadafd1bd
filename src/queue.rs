//! Bounded outbound command queue.
//!
//! [`CommandQueue`] is a ring buffer of fixed-size [`Message`] blocks. Storage
//! is allocated once ([`CommandQueue::allocate`]) when an RGB device is set up
//! and released once ([`CommandQueue::release`]) at teardown. An unallocated
//! queue has capacity 0.
//!
//! Pushes are all-or-nothing: a batch that does not fit is rejected whole, so
//! a lighting frame is never split across a flush.

use crate::error::{Error, Result};
use std::fmt;

/// Size in bytes of one command report.
pub const MSG_SIZE: usize = 64;

/// One opaque, fixed-size command for the hardware.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Message(pub [u8; MSG_SIZE]);

impl Message {
    /// Build a message from up to [`MSG_SIZE`] bytes, zero-padding the rest.
    /// Extra bytes are ignored.
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut buf = [0u8; MSG_SIZE];
        let n = bytes.len().min(MSG_SIZE);
        buf[..n].copy_from_slice(&bytes[..n]);
        Self(buf)
    }

    pub fn as_bytes(&self) -> &[u8; MSG_SIZE] {
        &self.0
    }
}

impl Default for Message {
    fn default() -> Self {
        Self([0u8; MSG_SIZE])
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The header is enough to tell commands apart in logs.
        write!(f, "Message({:02x?}..)", &self.0[..4])
    }
}

#[derive(Debug, Default)]
pub struct CommandQueue {
    slots: Option<Box<[Message]>>,
    head: usize,
    len: usize,
}

impl CommandQueue {
    /// Empty, unallocated queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate backing storage for `capacity` messages and empty the queue.
    pub fn allocate(&mut self, capacity: usize) {
        self.slots = Some(vec![Message::default(); capacity].into_boxed_slice());
        self.head = 0;
        self.len = 0;
    }

    /// Free the backing storage. Queued messages are dropped.
    pub fn release(&mut self) {
        self.slots = None;
        self.head = 0;
        self.len = 0;
    }

    pub fn is_allocated(&self) -> bool {
        self.slots.is_some()
    }

    pub fn capacity(&self) -> usize {
        self.slots.as_ref().map_or(0, |s| s.len())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append every message in `batch`, or none of them.
    pub fn push_all(&mut self, batch: &[Message]) -> Result<()> {
        let capacity = self.capacity();
        if self.len + batch.len() > capacity {
            return Err(Error::QueueFull {
                queued: self.len,
                requested: batch.len(),
                capacity,
            });
        }
        let Some(slots) = self.slots.as_mut() else {
            // Only reachable with an empty batch on an unallocated queue.
            return Ok(());
        };
        for msg in batch {
            let tail = (self.head + self.len) % capacity;
            slots[tail] = *msg;
            self.len += 1;
        }
        Ok(())
    }

    /// Remove and return the oldest message.
    pub fn pop(&mut self) -> Option<Message> {
        if self.len == 0 {
            return None;
        }
        let slots = self.slots.as_ref()?;
        let msg = slots[self.head];
        self.head = (self.head + 1) % slots.len();
        self.len -= 1;
        Some(msg)
    }

    /// Drop every queued message, keeping the storage.
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn msg(tag: u8) -> Message {
        Message::from_slice(&[tag])
    }

    #[test]
    fn unallocated_queue_rejects_everything() {
        let mut q = CommandQueue::new();
        assert_eq!(q.capacity(), 0);
        assert!(matches!(
            q.push_all(&[msg(1)]),
            Err(Error::QueueFull { capacity: 0, .. })
        ));
        assert!(q.push_all(&[]).is_ok());
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn fifo_order_across_wraparound() {
        let mut q = CommandQueue::new();
        q.allocate(3);
        q.push_all(&[msg(1), msg(2)]).unwrap();
        assert_eq!(q.pop(), Some(msg(1)));
        q.push_all(&[msg(3), msg(4)]).unwrap();
        assert_eq!(q.len(), 3);
        assert_eq!(q.pop(), Some(msg(2)));
        assert_eq!(q.pop(), Some(msg(3)));
        assert_eq!(q.pop(), Some(msg(4)));
        assert!(q.is_empty());
    }

    #[test]
    fn batch_that_does_not_fit_is_rejected_whole() {
        let mut q = CommandQueue::new();
        q.allocate(4);
        q.push_all(&[msg(1), msg(2), msg(3)]).unwrap();
        let err = q.push_all(&[msg(4), msg(5)]).unwrap_err();
        assert!(matches!(
            err,
            Error::QueueFull {
                queued: 3,
                requested: 2,
                capacity: 4
            }
        ));
        assert_eq!(q.len(), 3);
        q.push_all(&[msg(4)]).unwrap();
        assert_eq!(q.len(), 4);
    }

    #[test]
    fn clear_and_release() {
        let mut q = CommandQueue::new();
        q.allocate(2);
        q.push_all(&[msg(1), msg(2)]).unwrap();
        q.clear();
        assert!(q.is_empty());
        assert!(q.is_allocated());
        q.release();
        assert!(!q.is_allocated());
        assert_eq!(q.capacity(), 0);
    }

    #[test]
    fn message_padding_and_truncation() {
        let short = Message::from_slice(&[0x07, 0x05]);
        assert_eq!(short.0[0], 0x07);
        assert_eq!(short.0[1], 0x05);
        assert!(short.0[2..].iter().all(|&b| b == 0));

        let long = Message::from_slice(&[0xaa; MSG_SIZE + 10]);
        assert!(long.0.iter().all(|&b| b == 0xaa));
    }

    proptest! {
        #[test]
        fn push_is_all_or_nothing(
            capacity in 1usize..16,
            batches in proptest::collection::vec(0usize..8, 0..24),
            pops in proptest::collection::vec(0usize..4, 0..24),
        ) {
            let mut q = CommandQueue::new();
            q.allocate(capacity);
            for (i, n) in batches.iter().enumerate() {
                let before = q.len();
                let batch = vec![Message::default(); *n];
                match q.push_all(&batch) {
                    Ok(()) => prop_assert_eq!(q.len(), before + n),
                    Err(Error::QueueFull { .. }) => {
                        prop_assert!(before + n > capacity);
                        prop_assert_eq!(q.len(), before);
                    }
                    Err(other) => prop_assert!(false, "unexpected error {other}"),
                }
                prop_assert!(q.len() <= capacity);
                for _ in 0..pops.get(i).copied().unwrap_or(0) {
                    q.pop();
                }
                prop_assert!(q.len() <= capacity);
            }
        }
    }
}
