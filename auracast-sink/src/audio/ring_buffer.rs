//! Lock-free audio block ring buffer
//!
//! Single-producer single-consumer ring of fixed-size stereo PCM blocks,
//! decoupling irregular network delivery (decode pipeline) from the fixed
//! hardware sample clock (output scheduler).
//!
//! Design:
//! - Indices are monotonically advancing sequence numbers; the slot is the
//!   sequence modulo capacity. Each sequence has exactly one writer side,
//!   with one exception: the producer adjusts the consume sequence when it
//!   laps the consumer (advancing it past the overwritten slot) and when
//!   the consumer has overrun it during an underrun (re-anchoring it so the
//!   next pop reads the freshly pushed block). Overwrite-on-overflow is
//!   the chosen overflow policy: stale unread blocks are silently discarded,
//!   trading audio correctness for bounded latency.
//! - `pop_next` always succeeds. It returns the next slot's contents even
//!   when the producer has not refilled it; freshness is the caller's
//!   responsibility via the streaming flag and the underrun counter.
//! - No blocking, no backpressure, no allocation after construction. Slot
//!   contents are unsynchronized beyond the index discipline; a block being
//!   overwritten while it is read tears, which the output path accepts.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

/// Log every Nth overwrite/underrun to avoid spamming the hot paths
const EVENT_LOG_INTERVAL: u64 = 1000;

struct RingShared {
    /// Contiguous slot storage, `capacity * block_len` samples
    storage: UnsafeCell<Box<[i16]>>,

    /// Capacity in blocks
    capacity: u64,

    /// Stereo samples per block
    block_len: usize,

    /// Next sequence the producer writes (producer-owned)
    produce_seq: AtomicU64,

    /// Next sequence the consumer reads (consumer-owned; bumped by the
    /// producer only when overwriting the oldest unread block)
    consume_seq: AtomicU64,

    /// Oldest-block overwrite counter
    overwrites: AtomicU64,

    /// Stale-read (underrun) counter
    underruns: AtomicU64,
}

// Slot storage is accessed from both halves without a lock. Soundness rests
// on the single-producer/single-consumer index protocol above; torn block
// reads under concurrent overwrite are the documented policy, and the index
// words themselves are atomics so reads never tear.
unsafe impl Send for RingShared {}
unsafe impl Sync for RingShared {}

/// Fixed-capacity ring buffer of equal-size PCM blocks
pub struct BlockRing {
    shared: Arc<RingShared>,
}

impl BlockRing {
    /// Create a ring holding `capacity` blocks of `block_len` stereo samples
    pub fn with_capacity(capacity: usize, block_len: usize) -> Self {
        assert!(capacity > 0 && block_len > 0);

        let storage = vec![0i16; capacity * block_len].into_boxed_slice();

        Self {
            shared: Arc::new(RingShared {
                storage: UnsafeCell::new(storage),
                capacity: capacity as u64,
                block_len,
                produce_seq: AtomicU64::new(0),
                consume_seq: AtomicU64::new(0),
                overwrites: AtomicU64::new(0),
                underruns: AtomicU64::new(0),
            }),
        }
    }

    /// Split into producer and consumer halves.
    ///
    /// The producer belongs to the decode pipeline, the consumer to the
    /// output scheduler. Each half can move to its own context.
    pub fn split(self) -> (BlockProducer, BlockConsumer) {
        let producer = BlockProducer {
            shared: Arc::clone(&self.shared),
        };
        let consumer = BlockConsumer {
            shared: self.shared,
        };
        (producer, consumer)
    }
}

/// Producer half (decode pipeline side)
pub struct BlockProducer {
    shared: Arc<RingShared>,
}

impl BlockProducer {
    /// Stereo samples per block slot
    pub fn block_len(&self) -> usize {
        self.shared.block_len
    }

    /// Unread blocks currently in the ring
    pub fn occupied(&self) -> usize {
        self.shared.occupied()
    }

    /// Write one block and advance the produce sequence.
    ///
    /// Never blocks. When the ring is full the oldest unread block is
    /// dropped by advancing the consume sequence past it. When the consumer
    /// has overrun the producer (stale reads during an underrun leave
    /// `consume_seq` ahead), the consume sequence is re-anchored to this
    /// block so fresh audio resumes in push order.
    pub fn push(&mut self, block: &[i16]) {
        let shared = &*self.shared;
        debug_assert_eq!(block.len(), shared.block_len);

        let p = shared.produce_seq.load(Ordering::Relaxed);
        let c = shared.consume_seq.load(Ordering::Acquire);

        if c > p {
            // Overrun consumer: staleness self-heals on the next pop
            shared.consume_seq.store(p, Ordering::Release);
        } else if p - c >= shared.capacity {
            // Lapped: discard the oldest unread block
            shared.consume_seq.fetch_add(1, Ordering::AcqRel);
            let count = shared.overwrites.fetch_add(1, Ordering::Relaxed) + 1;
            if count % EVENT_LOG_INTERVAL == 1 {
                warn!("Block ring overwrote oldest unread block (total: {})", count);
            }
        }

        let offset = (p % shared.capacity) as usize * shared.block_len;
        unsafe {
            let storage = &mut *shared.storage.get();
            storage[offset..offset + shared.block_len].copy_from_slice(block);
        }

        shared.produce_seq.store(p.wrapping_add(1), Ordering::Release);
    }

    /// Counter snapshot
    pub fn stats(&self) -> RingStats {
        self.shared.stats()
    }
}

/// Consumer half (output scheduler side)
pub struct BlockConsumer {
    shared: Arc<RingShared>,
}

impl BlockConsumer {
    /// Stereo samples per block slot
    pub fn block_len(&self) -> usize {
        self.shared.block_len
    }

    /// Unread blocks currently in the ring
    pub fn occupied(&self) -> usize {
        self.shared.occupied()
    }

    /// Advance to and return the next block slot.
    ///
    /// Always succeeds. When the producer has not caught up the returned
    /// slot holds stale data and the underrun counter is bumped; the caller
    /// decides what that means (the output scheduler only calls this while
    /// the streaming flag is set).
    pub fn pop_next(&mut self) -> &[i16] {
        let shared = &*self.shared;

        // fetch_add rather than load+store: the producer may bump this
        // sequence concurrently when overwriting the oldest block.
        let c = shared.consume_seq.fetch_add(1, Ordering::AcqRel);
        let p = shared.produce_seq.load(Ordering::Acquire);

        if c >= p {
            let count = shared.underruns.fetch_add(1, Ordering::Relaxed) + 1;
            if count % EVENT_LOG_INTERVAL == 1 {
                trace!("Block ring underrun, replaying stale block (total: {})", count);
            }
        }

        let offset = (c % shared.capacity) as usize * shared.block_len;
        unsafe {
            let storage = &*shared.storage.get();
            &storage[offset..offset + shared.block_len]
        }
    }

    /// Counter snapshot
    pub fn stats(&self) -> RingStats {
        self.shared.stats()
    }
}

impl RingShared {
    fn occupied(&self) -> usize {
        let p = self.produce_seq.load(Ordering::Acquire);
        let c = self.consume_seq.load(Ordering::Acquire);
        p.saturating_sub(c).min(self.capacity) as usize
    }

    fn stats(&self) -> RingStats {
        RingStats {
            capacity: self.capacity as usize,
            occupied: self.occupied(),
            overwrites: self.overwrites.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
        }
    }
}

/// Ring buffer counters
#[derive(Debug, Clone, Copy)]
pub struct RingStats {
    /// Capacity in blocks
    pub capacity: usize,

    /// Unread blocks
    pub occupied: usize,

    /// Oldest-block overwrites (producer lapped consumer)
    pub overwrites: u64,

    /// Stale reads (consumer caught up with producer)
    pub underruns: u64,
}
