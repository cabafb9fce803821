//! Sound Catalog
//!
//! Configuration data model: categories, sound items, and their clip or
//! item-reference alternatives. The catalog is pure configuration — runtime
//! state (last chosen alternative, last played timestamp) lives in the
//! director, keyed by item id.

use crate::{DirectorError, DirectorResult, MAX_ITEM_RECURSION};
use cf_core::Seconds;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// How an item picks among its alternatives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickMode {
    /// Selection returns nothing; the item never plays
    Disabled,
    /// `(last + 1) mod N`, ignoring probability weights
    Sequence,
    /// First pick uniform random, then sequential
    SequenceWithRandomStart,
    /// Index 0 for a fresh voice, sequential for a continuing voice
    StartLoopSequenceWithFirst,
    /// Weighted random; repeats allowed
    #[default]
    Random,
    /// Weighted random excluding the previous pick
    RandomNotSameTwice,
    /// Every valid alternative at once
    AllSimultaneously,
    /// Two constrained-distinct random picks on the two voice slots
    TwoSimultaneously,
}

/// How playback continues after the chosen alternative ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    /// Play once
    #[default]
    None,
    /// Loop the chosen clip in place
    LoopChosen,
    /// Chain successive alternatives gaplessly, forever
    LoopSequence,
    /// Chain N alternatives, then let the last one loop in place
    PlayNThenLoopLast,
    /// Intro picks, a looping body, and an outro once finish is requested
    IntroLoopOutroSequence,
}

impl LoopMode {
    /// Whether this mode chains successive alternatives on a voice
    #[inline]
    pub fn is_sequence(&self) -> bool {
        matches!(
            self,
            LoopMode::LoopSequence | LoopMode::PlayNThenLoopLast | LoopMode::IntroLoopOutroSequence
        )
    }
}

/// One concrete clip alternative
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipRef {
    /// Resource identifier handed to the renderer; empty = invalid
    pub resource: String,
    /// Clip duration in seconds (resource metadata; 0 = unknown/endless)
    #[serde(default)]
    pub duration: f32,
    /// Own volume multiplier
    #[serde(default = "default_one")]
    pub volume: f32,
    /// Pitch shift in semitones
    #[serde(default)]
    pub pitch_shift: f32,
    /// Stereo pan (-1..1)
    #[serde(default)]
    pub pan: f32,
    /// Random pitch jitter range (± semitones per play)
    #[serde(default)]
    pub random_pitch: f32,
    /// Random volume jitter range (± multiplier per play)
    #[serde(default)]
    pub random_volume: f32,
    /// Random extra start delay range (0..range seconds per play)
    #[serde(default)]
    pub random_delay: f32,
    /// Clip-local start offset in seconds
    #[serde(default)]
    pub start_offset: f32,
    /// Clip-local stop offset (seconds trimmed from the end)
    #[serde(default)]
    pub stop_offset: f32,
    /// Fade-in applied when the clip starts
    #[serde(default)]
    pub fade_in_secs: f32,
    /// Fade-out applied when the clip is stopped
    #[serde(default)]
    pub fade_out_secs: f32,
    /// Selection weight; <= 0 = invalid
    #[serde(default = "default_one")]
    pub probability: f32,
    /// Start playback at a random position within the clip
    #[serde(default)]
    pub random_start: bool,
}

fn default_one() -> f32 {
    1.0
}

impl ClipRef {
    /// Create a clip reference with a known duration
    pub fn new(resource: impl Into<String>, duration: f32) -> Self {
        Self {
            resource: resource.into(),
            duration,
            volume: 1.0,
            pitch_shift: 0.0,
            pan: 0.0,
            random_pitch: 0.0,
            random_volume: 0.0,
            random_delay: 0.0,
            start_offset: 0.0,
            stop_offset: 0.0,
            fade_in_secs: 0.0,
            fade_out_secs: 0.0,
            probability: 1.0,
            random_start: false,
        }
    }

    /// Set own volume
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    /// Set selection weight
    pub fn with_probability(mut self, probability: f32) -> Self {
        self.probability = probability;
        self
    }

    /// Set fades
    pub fn with_fades(mut self, fade_in: f32, fade_out: f32) -> Self {
        self.fade_in_secs = fade_in.max(0.0);
        self.fade_out_secs = fade_out.max(0.0);
        self
    }

    /// Set per-play jitter ranges
    pub fn with_jitter(mut self, pitch: f32, volume: f32, delay: f32) -> Self {
        self.random_pitch = pitch.max(0.0);
        self.random_volume = volume.max(0.0);
        self.random_delay = delay.max(0.0);
        self
    }

    /// Set clip-local start/stop offsets
    pub fn with_offsets(mut self, start: f32, stop: f32) -> Self {
        self.start_offset = start.max(0.0);
        self.stop_offset = stop.max(0.0);
        self
    }

    /// Playable length after trimming offsets (0 if duration unknown)
    #[inline]
    pub fn effective_duration(&self) -> Seconds {
        if self.duration <= 0.0 {
            return 0.0;
        }
        f64::from((self.duration - self.start_offset - self.stop_offset).max(0.0))
    }
}

/// A nested reference to another sound item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRef {
    /// Target item id
    pub item: String,
    /// Selection weight; <= 0 = invalid
    #[serde(default = "default_one")]
    pub probability: f32,
}

/// One alternative within a sound item — a clip or a nested item reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubItem {
    Clip(ClipRef),
    Item(ItemRef),
}

impl SubItem {
    /// Selection weight
    #[inline]
    pub fn probability(&self) -> f32 {
        match self {
            SubItem::Clip(c) => c.probability,
            SubItem::Item(r) => r.probability,
        }
    }

    /// Valid alternatives take part in probability normalization
    #[inline]
    pub fn is_valid(&self) -> bool {
        match self {
            SubItem::Clip(c) => c.probability > 0.0 && !c.resource.is_empty(),
            SubItem::Item(r) => r.probability > 0.0 && !r.item.is_empty(),
        }
    }
}

/// A named, logical sound with alternatives and a pick policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoundItem {
    /// Unique key
    pub id: String,
    /// Weighted alternatives
    #[serde(default)]
    pub alternatives: Vec<SubItem>,
    /// Pick policy
    #[serde(default)]
    pub pick_mode: PickMode,
    /// Loop policy
    #[serde(default)]
    pub loop_mode: LoopMode,
    /// Number of picks in a bounded loop sequence (0 = unbounded/all)
    #[serde(default)]
    pub loop_sequence_count: u32,
    /// Crossfade overlap between chained clips; negative = gap
    #[serde(default)]
    pub loop_overlap: f32,
    /// Random extra delay range (0..range) added to each chained clip
    #[serde(default)]
    pub loop_random_delay: f32,
    /// Minimum seconds between immediate replays
    #[serde(default)]
    pub min_replay_interval: f32,
    /// Concurrency limit (0 = unlimited); excess evicts the oldest voice
    #[serde(default)]
    pub max_concurrent_instances: u32,
    /// Fixed delay before playback starts
    #[serde(default)]
    pub start_delay: f32,
    /// Item volume multiplier
    #[serde(default = "default_one")]
    pub own_volume: f32,
    /// Volume category this item belongs to
    #[serde(default)]
    pub category: Option<String>,
}

impl SoundItem {
    /// Create an item with defaults
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            alternatives: Vec::new(),
            pick_mode: PickMode::default(),
            loop_mode: LoopMode::default(),
            loop_sequence_count: 0,
            loop_overlap: 0.0,
            loop_random_delay: 0.0,
            min_replay_interval: 0.0,
            max_concurrent_instances: 0,
            start_delay: 0.0,
            own_volume: 1.0,
            category: None,
        }
    }

    /// Add a clip alternative
    pub fn with_clip(mut self, clip: ClipRef) -> Self {
        self.alternatives.push(SubItem::Clip(clip));
        self
    }

    /// Add a nested item reference alternative
    pub fn with_item_ref(mut self, item: impl Into<String>, probability: f32) -> Self {
        self.alternatives.push(SubItem::Item(ItemRef {
            item: item.into(),
            probability,
        }));
        self
    }

    /// Set pick policy
    pub fn with_pick_mode(mut self, mode: PickMode) -> Self {
        self.pick_mode = mode;
        self
    }

    /// Set loop policy
    pub fn with_loop_mode(mut self, mode: LoopMode) -> Self {
        self.loop_mode = mode;
        self
    }

    /// Set loop sequence shape (count, overlap, random delay)
    pub fn with_loop_sequence(mut self, count: u32, overlap: f32, random_delay: f32) -> Self {
        self.loop_sequence_count = count;
        self.loop_overlap = overlap;
        self.loop_random_delay = random_delay.max(0.0);
        self
    }

    /// Set replay/concurrency limits
    pub fn with_limits(mut self, min_replay_interval: f32, max_concurrent: u32) -> Self {
        self.min_replay_interval = min_replay_interval.max(0.0);
        self.max_concurrent_instances = max_concurrent;
        self
    }

    /// Set item volume
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.own_volume = volume;
        self
    }

    /// Set volume category
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Count of valid alternatives
    pub fn valid_alternative_count(&self) -> usize {
        self.alternatives.iter().filter(|a| a.is_valid()).count()
    }
}

/// A named volume category, optionally nested under a parent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryDef {
    /// Unique name
    pub name: String,
    /// Own gain multiplier (not clamped)
    #[serde(default = "default_one")]
    pub gain: f32,
    /// Parent category name, resolved lazily
    #[serde(default)]
    pub parent: Option<String>,
}

impl CategoryDef {
    /// Create a root category
    pub fn new(name: impl Into<String>, gain: f32) -> Self {
        Self {
            name: name.into(),
            gain,
            parent: None,
        }
    }

    /// Nest under a parent
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

/// The full sound configuration: items plus categories
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    items: HashMap<String, SoundItem>,
    #[serde(default)]
    categories: Vec<CategoryDef>,
}

impl Catalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an item, replacing any existing item with the same id
    pub fn add_item(&mut self, item: SoundItem) {
        self.items.insert(item.id.clone(), item);
    }

    /// Remove an item by id
    pub fn remove_item(&mut self, id: &str) -> Option<SoundItem> {
        self.items.remove(id)
    }

    /// Register a category definition
    pub fn add_category(&mut self, category: CategoryDef) {
        self.categories.retain(|c| c.name != category.name);
        self.categories.push(category);
    }

    /// Look up an item
    pub fn item(&self, id: &str) -> Option<&SoundItem> {
        self.items.get(id)
    }

    /// Iterate items
    pub fn items(&self) -> impl Iterator<Item = &SoundItem> {
        self.items.values()
    }

    /// Category definitions
    pub fn categories(&self) -> &[CategoryDef] {
        &self.categories
    }

    /// Parse a catalog from JSON
    pub fn from_json(json: &str) -> DirectorResult<Self> {
        let catalog: Catalog = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> DirectorResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate configuration invariants
    ///
    /// Checks item-reference targets and cycles, category parents and
    /// cycles, and that every non-disabled item has at least one valid
    /// alternative.
    pub fn validate(&self) -> DirectorResult<()> {
        // Category parents must exist and the parent chain must not cycle.
        let by_name: HashMap<&str, &CategoryDef> =
            self.categories.iter().map(|c| (c.name.as_str(), c)).collect();

        for category in &self.categories {
            let mut seen = HashSet::new();
            let mut current = category;
            seen.insert(current.name.as_str());

            while let Some(parent_name) = current.parent.as_deref() {
                let parent = by_name
                    .get(parent_name)
                    .ok_or_else(|| DirectorError::UnknownCategory(parent_name.to_string()))?;
                if !seen.insert(parent_name) {
                    return Err(DirectorError::CategoryCycle(category.name.clone()));
                }
                current = parent;
            }
        }

        for item in self.items.values() {
            if let Some(category) = item.category.as_deref() {
                if !by_name.contains_key(category) {
                    return Err(DirectorError::UnknownCategory(category.to_string()));
                }
            }

            if item.pick_mode != PickMode::Disabled && item.valid_alternative_count() == 0 {
                return Err(DirectorError::NoValidAlternatives(item.id.clone()));
            }

            // Item-reference targets must exist and must not cycle.
            for alt in &item.alternatives {
                if let SubItem::Item(r) = alt {
                    if !self.items.contains_key(&r.item) {
                        return Err(DirectorError::UnknownItem(r.item.clone()));
                    }
                }
            }
            self.check_item_cycle(&item.id, &item.id, MAX_ITEM_RECURSION)?;
        }

        Ok(())
    }

    fn check_item_cycle(&self, root: &str, current: &str, depth: u8) -> DirectorResult<()> {
        if depth == 0 {
            return Err(DirectorError::ItemCycle(root.to_string()));
        }
        let Some(item) = self.items.get(current) else {
            return Ok(());
        };
        for alt in &item.alternatives {
            if let SubItem::Item(r) = alt {
                if r.item == root {
                    return Err(DirectorError::ItemCycle(root.to_string()));
                }
                self.check_item_cycle(root, &r.item, depth - 1)?;
            }
        }
        Ok(())
    }
}
