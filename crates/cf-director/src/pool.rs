//! Voice recycling
//!
//! Voices are pooled to avoid per-play allocation. The pool hands out
//! generation-checked handles: releasing a slot bumps its generation, so a
//! stale handle kept by a caller can never reach the slot's new occupant.
//! Exhaustion is not an error here; the director falls back to an unpooled
//! voice when `acquire` returns `None`.

use crate::voice::PlaybackVoice;
use cf_core::Handle;

/// Acquire/release contract for voice storage
pub trait VoicePool {
    /// Take a free voice slot; `None` when the pool is exhausted
    fn acquire(&mut self) -> Option<Handle>;

    /// Return a slot to the pool; false if the handle is stale or unpooled
    fn release(&mut self, handle: Handle) -> bool;

    fn get(&self, handle: Handle) -> Option<&PlaybackVoice>;

    fn get_mut(&mut self, handle: Handle) -> Option<&mut PlaybackVoice>;

    fn capacity(&self) -> usize;

    /// Number of slots currently acquired
    fn live_count(&self) -> usize;
}

struct Slot {
    voice: PlaybackVoice,
    generation: u32,
    in_use: bool,
}

/// Fixed-capacity slab of pre-allocated voices
pub struct SlabVoicePool {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl SlabVoicePool {
    /// Allocate every slot up front
    pub fn new(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| Slot {
                voice: PlaybackVoice::new(),
                generation: 1,
                in_use: false,
            })
            .collect();
        // Lower indices are preferred, so pop from the back.
        let free = (0..capacity as u32).rev().collect();
        Self { slots, free }
    }

    fn slot_for(&self, handle: Handle) -> Option<&Slot> {
        if handle.is_unpooled() {
            return None;
        }
        self.slots
            .get(handle.index() as usize)
            .filter(|s| s.in_use && s.generation == handle.generation())
    }

    /// Handles of every acquired slot, in index order
    pub fn live_handles(&self) -> Vec<Handle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.in_use)
            .map(|(i, s)| Handle::new(i as u32, s.generation))
            .collect()
    }

    /// Iterate acquired voices
    pub fn iter_live(&self) -> impl Iterator<Item = &PlaybackVoice> {
        self.slots.iter().filter(|s| s.in_use).map(|s| &s.voice)
    }
}

impl VoicePool for SlabVoicePool {
    fn acquire(&mut self) -> Option<Handle> {
        let index = self.free.pop()?;
        let slot = &mut self.slots[index as usize];
        slot.in_use = true;
        Some(Handle::new(index, slot.generation))
    }

    fn release(&mut self, handle: Handle) -> bool {
        if self.slot_for(handle).is_none() {
            return false;
        }
        let index = handle.index();
        let slot = &mut self.slots[index as usize];
        slot.in_use = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        true
    }

    fn get(&self, handle: Handle) -> Option<&PlaybackVoice> {
        self.slot_for(handle).map(|s| &s.voice)
    }

    fn get_mut(&mut self, handle: Handle) -> Option<&mut PlaybackVoice> {
        if handle.is_unpooled() {
            return None;
        }
        self.slots
            .get_mut(handle.index() as usize)
            .filter(|s| s.in_use && s.generation == handle.generation())
            .map(|s| &mut s.voice)
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn live_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_until_exhausted() {
        let mut pool = SlabVoicePool::new(2);

        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_ne!(a, b);
        assert!(pool.acquire().is_none());
        assert_eq!(pool.live_count(), 2);

        assert!(pool.release(a));
        assert_eq!(pool.live_count(), 1);
        assert!(pool.acquire().is_some());
    }

    #[test]
    fn test_stale_handle_rejected_after_reuse() {
        let mut pool = SlabVoicePool::new(1);

        let first = pool.acquire().unwrap();
        assert!(pool.release(first));

        let second = pool.acquire().unwrap();
        assert_eq!(first.index(), second.index());

        assert!(pool.get(first).is_none());
        assert!(pool.get(second).is_some());
        assert!(!pool.release(first));
    }

    #[test]
    fn test_double_release_is_rejected() {
        let mut pool = SlabVoicePool::new(1);
        let handle = pool.acquire().unwrap();

        assert!(pool.release(handle));
        assert!(!pool.release(handle));
        assert_eq!(pool.live_count(), 0);
    }

    #[test]
    fn test_unpooled_handles_never_resolve() {
        let mut pool = SlabVoicePool::new(1);
        let unpooled = Handle::unpooled(7);

        assert!(pool.get(unpooled).is_none());
        assert!(!pool.release(unpooled));
    }

    #[test]
    fn test_live_handles_track_acquired_slots() {
        let mut pool = SlabVoicePool::new(3);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        pool.release(a);

        let live = pool.live_handles();
        assert_eq!(live, vec![b]);
    }
}
