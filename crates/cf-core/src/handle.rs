//! Generation-checked handles
//!
//! Pooled objects are referenced by an index + generation pair. When a pool
//! slot is released and reused, its generation is bumped, so a stale handle
//! held by a caller can never be mistaken for the new occupant.

use serde::{Deserialize, Serialize};

/// Index + generation pair identifying a pooled object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handle {
    index: u32,
    generation: u32,
}

/// Slot index reserved for objects allocated outside a pool
pub const UNPOOLED_INDEX: u32 = u32::MAX;

impl Handle {
    /// Handle that matches no live object
    pub const INVALID: Handle = Handle {
        index: UNPOOLED_INDEX,
        generation: 0,
    };

    /// Create a handle for a pool slot
    #[inline]
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Create a handle for an object allocated outside the pool
    ///
    /// Uniqueness comes from the caller-supplied sequence number.
    #[inline]
    pub fn unpooled(sequence: u32) -> Self {
        Self {
            index: UNPOOLED_INDEX,
            generation: sequence,
        }
    }

    /// Pool slot index
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Slot generation (or sequence number for unpooled handles)
    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Whether this handle refers to a non-pooled object
    #[inline]
    pub fn is_unpooled(&self) -> bool {
        self.index == UNPOOLED_INDEX
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::INVALID
    }
}
