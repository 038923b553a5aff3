//! Connection ID allocation.
//!
//! The client allocates IDs from a downward-counting sequence starting at
//! `0xFFFFFFFF`; the agent allocates from the bottom (upward from zero). The
//! two ranges are presumed never to meet in practice, but this allocator
//! additionally remembers the lowest value it has handed out so an inbound
//! `ACCEPTED` whose id falls in the already-claimed range can be rejected
//! rather than silently colliding.

use std::sync::atomic::{AtomicU32, Ordering};

const UNALLOCATED: u32 = 0;

pub struct IdAllocator {
    next: AtomicU32,
    lowest_allocated: AtomicU32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(0xFFFF_FFFF),
            lowest_allocated: AtomicU32::new(UNALLOCATED),
        }
    }

    /// Allocate the next id in the downward sequence.
    pub fn allocate(&self) -> u32 {
        let id = self.next.fetch_sub(1, Ordering::Relaxed);
        self.lowest_allocated.fetch_min(id, Ordering::Relaxed);
        id
    }

    /// Whether `id` falls within the range this allocator has already
    /// handed out (i.e. `[lowest_allocated, 0xFFFFFFFF]`).
    pub fn was_locally_allocated(&self, id: u32) -> bool {
        let lowest = self.lowest_allocated.load(Ordering::Relaxed);
        lowest != UNALLOCATED && id >= lowest
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_strictly_decreasing_from_max() {
        let alloc = IdAllocator::new();
        assert_eq!(alloc.allocate(), 0xFFFF_FFFF);
        assert_eq!(alloc.allocate(), 0xFFFF_FFFE);
        assert_eq!(alloc.allocate(), 0xFFFF_FFFD);
    }

    #[test]
    fn detects_collision_with_allocated_range() {
        let alloc = IdAllocator::new();
        alloc.allocate(); // 0xFFFFFFFF
        alloc.allocate(); // 0xFFFFFFFE
        assert!(alloc.was_locally_allocated(0xFFFF_FFFF));
        assert!(alloc.was_locally_allocated(0xFFFF_FFFE));
        assert!(!alloc.was_locally_allocated(0xFFFF_FFFD));
        assert!(!alloc.was_locally_allocated(0));
    }

    #[test]
    fn nothing_allocated_yet_collides_with_nothing() {
        let alloc = IdAllocator::new();
        assert!(!alloc.was_locally_allocated(0xFFFF_FFFF));
    }
}
