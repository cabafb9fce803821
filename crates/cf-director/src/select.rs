//! Alternative selection
//!
//! Implements the pick modes of [`PickMode`]: sequential walks, weighted
//! random draws with optional no-repeat constraints, and the simultaneous
//! modes. Nested item references are resolved recursively with a depth
//! bound, accumulating the intermediate items' own volumes.
//!
//! "Last chosen" lives per item in [`ItemState`] for normal playback. A
//! voice that is continuing a loop sequence passes its own last-chosen index
//! instead, so concurrent voices of one item cannot corrupt each other's
//! sequencing.

use crate::catalog::{Catalog, PickMode, SoundItem, SubItem};
use crate::MAX_ITEM_RECURSION;
use cf_core::HostTime;
use log::warn;
use rand::Rng;
use smallvec::SmallVec;
use std::collections::HashMap;

/// Mutable per-item runtime state, kept outside the catalog
#[derive(Debug, Clone, Copy)]
pub struct ItemState {
    /// Index into `alternatives` of the most recent pick; -1 = never picked
    pub last_chosen: i32,
    /// Host time of the most recent successful play
    pub last_played_at: Option<HostTime>,
}

impl Default for ItemState {
    fn default() -> Self {
        Self {
            last_chosen: -1,
            last_played_at: None,
        }
    }
}

/// One selected, fully resolved clip
#[derive(Debug, Clone)]
pub struct ResolvedPick {
    /// Top-level alternative index this pick came from
    pub index: usize,
    /// The concrete clip to start
    pub clip: crate::catalog::ClipRef,
    /// Volume accumulated from intermediate item references
    pub volume_scale: f32,
}

/// Normalized cumulative probability sequence over the valid alternatives
///
/// Entries are non-decreasing and the final entry is 1 (given at least one
/// valid alternative). Invalid alternatives contribute nothing.
pub fn normalized_cumulative(alternatives: &[SubItem]) -> Vec<f32> {
    let total: f32 = alternatives
        .iter()
        .filter(|a| a.is_valid())
        .map(|a| a.probability())
        .sum();
    if total <= 0.0 {
        return Vec::new();
    }

    let mut cumulative = Vec::new();
    let mut acc = 0.0_f32;
    for alt in alternatives.iter().filter(|a| a.is_valid()) {
        acc += alt.probability() / total;
        cumulative.push(acc);
    }
    if let Some(last) = cumulative.last_mut() {
        *last = 1.0;
    }
    cumulative
}

/// Select alternative indices for one play of `item`
///
/// `voice_last` is the per-voice last-chosen index when a voice continues a
/// sequence; `None` uses (and updates) the per-item state.
pub fn pick_indices<R: Rng>(
    item: &SoundItem,
    states: &mut HashMap<String, ItemState>,
    voice_last: Option<i32>,
    rng: &mut R,
) -> SmallVec<[usize; 2]> {
    let valid: SmallVec<[usize; 8]> = item
        .alternatives
        .iter()
        .enumerate()
        .filter(|(_, a)| a.is_valid())
        .map(|(i, _)| i)
        .collect();
    if valid.is_empty() || item.pick_mode == PickMode::Disabled {
        return SmallVec::new();
    }

    let state = states.entry(item.id.clone()).or_default();
    let last = voice_last.unwrap_or(state.last_chosen);

    let mut picks: SmallVec<[usize; 2]> = SmallVec::new();
    match item.pick_mode {
        PickMode::Disabled => {}

        PickMode::Sequence => {
            picks.push(sequential_next(&valid, last));
        }

        PickMode::SequenceWithRandomStart => {
            if last < 0 {
                picks.push(valid[rng.random_range(0..valid.len())]);
            } else {
                picks.push(sequential_next(&valid, last));
            }
        }

        PickMode::StartLoopSequenceWithFirst => {
            // A fresh voice always begins at the first alternative.
            match voice_last {
                None => picks.push(valid[0]),
                Some(v) => picks.push(sequential_next(&valid, v)),
            }
        }

        PickMode::Random => {
            picks.push(weighted_draw(item, &valid, None, rng));
        }

        PickMode::RandomNotSameTwice => {
            picks.push(weighted_draw(item, &valid, exclude(last), rng));
        }

        PickMode::AllSimultaneously => {
            picks.extend(valid.iter().copied());
        }

        PickMode::TwoSimultaneously => {
            let first = weighted_draw(item, &valid, exclude(last), rng);
            let second = weighted_draw(item, &valid, Some(first), rng);
            picks.push(first);
            picks.push(second);
        }
    }

    if voice_last.is_none() {
        if let Some(&chosen) = picks.last() {
            state.last_chosen = chosen as i32;
        }
    }
    picks
}

/// Select and resolve alternatives for one play of `item`
///
/// Nested item references are resolved through their target's own pick mode,
/// bounded by [`MAX_ITEM_RECURSION`].
pub fn select<R: Rng>(
    catalog: &Catalog,
    item: &SoundItem,
    states: &mut HashMap<String, ItemState>,
    voice_last: Option<i32>,
    rng: &mut R,
) -> SmallVec<[ResolvedPick; 2]> {
    let indices = pick_indices(item, states, voice_last, rng);
    let mut out = SmallVec::new();
    for index in indices {
        resolve_alternative(
            catalog,
            item,
            index,
            index,
            1.0,
            MAX_ITEM_RECURSION,
            states,
            rng,
            &mut out,
        );
    }
    out
}

#[allow(clippy::too_many_arguments)]
fn resolve_alternative<R: Rng>(
    catalog: &Catalog,
    item: &SoundItem,
    index: usize,
    top_index: usize,
    volume_scale: f32,
    depth: u8,
    states: &mut HashMap<String, ItemState>,
    rng: &mut R,
    out: &mut SmallVec<[ResolvedPick; 2]>,
) {
    match &item.alternatives[index] {
        SubItem::Clip(clip) => out.push(ResolvedPick {
            index: top_index,
            clip: clip.clone(),
            volume_scale,
        }),
        SubItem::Item(r) => {
            if depth == 0 {
                warn!(
                    "item reference depth limit reached resolving '{}' from '{}'",
                    r.item, item.id
                );
                return;
            }
            let Some(target) = catalog.item(&r.item) else {
                warn!("item '{}' references unknown item '{}'", item.id, r.item);
                return;
            };
            let nested = pick_indices(target, states, None, rng);
            for nested_index in nested {
                resolve_alternative(
                    catalog,
                    target,
                    nested_index,
                    top_index,
                    volume_scale * target.own_volume,
                    depth - 1,
                    states,
                    rng,
                    out,
                );
            }
        }
    }
}

/// Next valid index after `last`, wrapping; index 0 when `last` is unknown
fn sequential_next(valid: &[usize], last: i32) -> usize {
    let position = valid
        .iter()
        .position(|&i| i as i32 == last)
        .map(|p| (p + 1) % valid.len());
    valid[position.unwrap_or(0)]
}

fn exclude(last: i32) -> Option<usize> {
    usize::try_from(last).ok()
}

/// Weighted draw over the valid alternatives, optionally excluding one index
///
/// Exclusion subtracts the excluded alternative's probability mass from the
/// sampled range; with a single valid alternative, repetition is allowed.
fn weighted_draw<R: Rng>(
    item: &SoundItem,
    valid: &[usize],
    excluded: Option<usize>,
    rng: &mut R,
) -> usize {
    let excluded = match excluded {
        Some(e) if valid.len() > 1 && valid.contains(&e) => Some(e),
        _ => None,
    };

    if excluded.is_none() {
        // Positions in the cumulative sequence line up with `valid`.
        let cumulative = normalized_cumulative(&item.alternatives);
        if cumulative.is_empty() {
            return valid[0];
        }
        let roll = rng.random::<f32>();
        let position = cumulative
            .iter()
            .position(|&threshold| roll < threshold)
            .unwrap_or(cumulative.len() - 1);
        return valid[position];
    }

    let total: f32 = valid
        .iter()
        .filter(|&&i| Some(i) != excluded)
        .map(|&i| item.alternatives[i].probability())
        .sum();
    if total <= 0.0 {
        return valid[0];
    }

    let target = rng.random::<f32>() * total;
    let mut acc = 0.0_f32;
    let mut chosen = valid[0];
    for &i in valid.iter().filter(|&&i| Some(i) != excluded) {
        acc += item.alternatives[i].probability();
        chosen = i;
        if target < acc {
            break;
        }
    }
    chosen
}
