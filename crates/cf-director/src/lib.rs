//! CueFlow Playback Director
//!
//! Control-plane for game audio: resolves logical "play this sound" requests
//! into concrete, time-accurate, volume-correct clip-start commands.
//!
//! - Catalog of sound items with weighted alternatives and pick policies
//! - Per-sound re-trigger limiting and concurrency limits (oldest eviction)
//! - Two-slot voices for gapless crossfades and loop-sequence chaining
//! - Category volume hierarchy with live propagation to playing voices
//! - Single music voice with playlist, shuffle history, and crossfades
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     PLAYBACK CONTROL PLANE                        │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                   │
//! │   caller ──▶ SoundDirector.play(id, params)                       │
//! │                  │ catalog lookup, replay/instance checks         │
//! │                  ▼                                                │
//! │            SubItemSelector ──▶ weighted/sequential pick           │
//! │                  │                                                │
//! │                  ▼                                                │
//! │            PlaybackVoice (from VoicePool)                         │
//! │              primary/secondary slots, FadeTimeline each           │
//! │                  │                                                │
//! │   host ──▶ tick(dt) ─────────▶ Vec<RenderCommand>                 │
//! │            (advance clocks,     (StartClip / SetGain / StopClip)  │
//! │             chain sequences,                                      │
//! │             propagate gains)                                      │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The director never renders audio. Every `tick(dt)` returns the render
//! commands the host's audio primitive should apply, each `StartClip` fully
//! parameterized (resource, gain, pitch, pan, start offset, absolute start
//! time, spatial attachment passed through opaquely).

pub mod catalog;
pub mod director;
pub mod fader;
pub mod hierarchy;
pub mod playlist;
pub mod pool;
pub mod select;
pub mod voice;

// Re-exports
pub use catalog::{
    Catalog, CategoryDef, ClipRef, ItemRef, LoopMode, PickMode, SoundItem, SubItem,
};
pub use director::{Attachment, PlayParams, RenderCommand, SoundDirector};
pub use fader::{FadeTimeline, FadeValue};
pub use hierarchy::VolumeHierarchy;
pub use playlist::Playlist;
pub use pool::{SlabVoicePool, VoicePool};
pub use select::{ItemState, ResolvedPick};
pub use voice::{PlaybackVoice, SlotRole, VoiceState, VoiceStatus};

use thiserror::Error;

/// Director error types
///
/// Nothing here is fatal to the host: configuration errors surface as
/// warnings and a failed play request; everything else degrades per policy
/// (eviction, pool fallback, silent no-op).
#[derive(Debug, Error)]
pub enum DirectorError {
    #[error("unknown sound item: {0}")]
    UnknownItem(String),

    #[error("unknown category: {0}")]
    UnknownCategory(String),

    #[error("cyclic category parent chain at '{0}'")]
    CategoryCycle(String),

    #[error("cyclic item reference at '{0}'")]
    ItemCycle(String),

    #[error("item '{0}' has no valid alternatives")]
    NoValidAlternatives(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type DirectorResult<T> = Result<T, DirectorError>;

/// Maximum nesting depth when resolving item-reference alternatives
pub const MAX_ITEM_RECURSION: u8 = 8;

/// Default voice pool capacity
pub const DEFAULT_VOICE_POOL_CAPACITY: usize = 64;
