//! Bounded single-producer/single-consumer queue bridging the transmitter's
//! control-rate stage and its line-rate stage.
//!
//! Head and tail are free-running counters, each written by exactly one side.
//! Entries pack into 32 bits so every slot is a plain `AtomicU32`, which keeps
//! the queue `Send + Sync` without any `unsafe`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::process::FRAME_ENTRIES;
use crate::structs::frame::{SAMPLE_MASK, UserBits};
use crate::utils::errors::ConfigError;

const HEADER_FLAG: u32 = 1 << 24;

pub const DEFAULT_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueEntry {
    /// Frame boundary carrying the frame's user bits.
    Header(UserBits),
    /// One 24-bit sample; its channel is implied by its position after the header.
    Sample(u32),
}

impl QueueEntry {
    #[inline(always)]
    fn pack(self) -> u32 {
        match self {
            Self::Header(user_bits) => HEADER_FLAG | user_bits.value() as u32,
            Self::Sample(value) => value & SAMPLE_MASK,
        }
    }

    #[inline(always)]
    fn unpack(raw: u32) -> Self {
        if raw & HEADER_FLAG != 0 {
            Self::Header(UserBits::new(raw as u8))
        } else {
            Self::Sample(raw & SAMPLE_MASK)
        }
    }
}

#[derive(Debug)]
struct Shared {
    slots: Box<[AtomicU32]>,
    head: AtomicUsize,
    tail: AtomicUsize,
}

impl Shared {
    #[inline(always)]
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline(always)]
    fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        head.wrapping_sub(tail)
    }
}

/// Creates a queue of `capacity` entries and returns its two halves.
///
/// The capacity must hold one whole frame (a header plus eight samples) with
/// at least one entry of headroom.
pub fn elastic_queue(capacity: usize) -> Result<(Producer, Consumer), ConfigError> {
    if capacity <= FRAME_ENTRIES {
        return Err(ConfigError::QueueTooSmall(capacity));
    }

    let shared = Arc::new(Shared {
        slots: (0..capacity).map(|_| AtomicU32::new(0)).collect(),
        head: AtomicUsize::new(0),
        tail: AtomicUsize::new(0),
    });

    Ok((
        Producer {
            shared: shared.clone(),
        },
        Consumer { shared },
    ))
}

/// Writing half. Not `Clone`: there is exactly one producer.
#[derive(Debug)]
pub struct Producer {
    shared: Arc<Shared>,
}

impl Producer {
    /// Appends an entry, handing it back if the queue is full.
    #[inline]
    pub fn push(&self, entry: QueueEntry) -> Result<(), QueueEntry> {
        let head = self.shared.head.load(Ordering::Relaxed);
        let tail = self.shared.tail.load(Ordering::Acquire);

        if head.wrapping_sub(tail) >= self.shared.capacity() {
            return Err(entry);
        }

        self.shared.slots[head % self.shared.capacity()].store(entry.pack(), Ordering::Relaxed);
        self.shared.head.store(head.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn free(&self) -> usize {
        self.capacity() - self.len()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }
}

/// Reading half. Not `Clone`: there is exactly one consumer.
#[derive(Debug)]
pub struct Consumer {
    shared: Arc<Shared>,
}

impl Consumer {
    #[inline]
    pub fn pop(&self) -> Option<QueueEntry> {
        let tail = self.shared.tail.load(Ordering::Relaxed);
        let head = self.shared.head.load(Ordering::Acquire);

        if head == tail {
            return None;
        }

        let raw = self.shared.slots[tail % self.shared.capacity()].load(Ordering::Relaxed);
        self.shared.tail.store(tail.wrapping_add(1), Ordering::Release);
        Some(QueueEntry::unpack(raw))
    }

    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
