//! Sound director
//!
//! The orchestrator: resolves logical play requests against the catalog,
//! enforces replay and concurrency limits, drives every live voice from
//! `tick(dt)`, and owns the single music voice and its playlist.
//!
//! The director is explicitly constructed and handed to callers; there is
//! no global instance. Everything happens on the thread that calls `tick`,
//! so no locking is involved anywhere. Commands produced between ticks
//! (by `play`, `stop`, gain changes) are buffered and drained, in order,
//! by the next `tick` call.

use crate::catalog::{Catalog, ClipRef, LoopMode, PickMode, SoundItem};
use crate::hierarchy::VolumeHierarchy;
use crate::playlist::Playlist;
use crate::pool::{SlabVoicePool, VoicePool};
use crate::select::{self, ItemState, ResolvedPick};
use crate::voice::{PlaybackVoice, SlotRole, VoiceStatus};
use crate::{DirectorResult, DEFAULT_VOICE_POOL_CAPACITY};
use cf_core::{FadeCurve, Handle, HostTime, Seconds};
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque spatial attachment, passed through to the renderer unmodified
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Attachment {
    pub position: [f32; 3],
    /// Scene-graph parent the position is relative to
    #[serde(default)]
    pub parent: Option<String>,
}

/// Instruction for the host's audio-rendering primitive
///
/// `StartClip` is fully parameterized and may carry a future `at` time; the
/// renderer is responsible for sample-accurate scheduling. `StopClip` on a
/// clip whose scheduled start has not elapsed cancels that start. `PauseClip`
/// on such a clip postpones the start until the matching `ResumeClip`.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    StartClip {
        clip_id: u64,
        resource: String,
        gain: f32,
        pitch_shift: f32,
        pan: f32,
        /// Clip-local offset to begin playback from
        start_offset: Seconds,
        /// Absolute host time at which the clip starts
        at: HostTime,
        looping: bool,
        attachment: Option<Attachment>,
    },
    SetGain {
        clip_id: u64,
        gain: f32,
    },
    StopClip {
        clip_id: u64,
    },
    PauseClip {
        clip_id: u64,
    },
    ResumeClip {
        clip_id: u64,
    },
}

/// Optional arguments for a play request
#[derive(Debug, Clone, PartialEq)]
pub struct PlayParams {
    /// Caller volume, multiplied into every other volume term
    pub volume: f32,
    pub attachment: Option<Attachment>,
    /// Extra delay before playback starts
    pub delay: Seconds,
    /// Absolute start time for sample-accurate scheduling; 0 = immediate
    pub start_time: HostTime,
}

impl Default for PlayParams {
    fn default() -> Self {
        Self {
            volume: 1.0,
            attachment: None,
            delay: 0.0,
            start_time: 0.0,
        }
    }
}

impl PlayParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    pub fn with_delay(mut self, delay: Seconds) -> Self {
        self.delay = delay.max(0.0);
        self
    }

    /// Schedule against an absolute host time
    pub fn starting_at(mut self, at: HostTime) -> Self {
        self.start_time = at;
        self
    }
}

/// Resolves play requests into voices and drives them tick by tick
pub struct SoundDirector {
    catalog: Catalog,
    hierarchy: VolumeHierarchy,
    /// Per-item selection and replay state
    states: HashMap<String, ItemState>,
    pool: SlabVoicePool,
    /// Fallback voices created while the pool was exhausted
    unpooled: Vec<PlaybackVoice>,
    unpooled_seq: u32,
    playlist: Playlist,
    music_voice: Option<Handle>,
    music_enabled: bool,
    clock: HostTime,
    next_clip_id: u64,
    rng: StdRng,
    /// Commands produced between ticks, drained by the next tick
    out: Vec<RenderCommand>,
    pool_exhausted_warned: bool,
}

impl SoundDirector {
    pub fn new(catalog: Catalog) -> DirectorResult<Self> {
        Self::with_capacity(catalog, DEFAULT_VOICE_POOL_CAPACITY)
    }

    pub fn with_capacity(catalog: Catalog, capacity: usize) -> DirectorResult<Self> {
        catalog.validate()?;
        let hierarchy = VolumeHierarchy::from_defs(catalog.categories())?;
        Ok(Self {
            catalog,
            hierarchy,
            states: HashMap::new(),
            pool: SlabVoicePool::new(capacity),
            unpooled: Vec::new(),
            unpooled_seq: 0,
            playlist: Playlist::default(),
            music_voice: None,
            music_enabled: true,
            clock: 0.0,
            next_clip_id: 1,
            rng: StdRng::from_os_rng(),
            out: Vec::new(),
            pool_exhausted_warned: false,
        })
    }

    /// Use a deterministic random sequence
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Current host-clock time
    #[inline]
    pub fn now(&self) -> HostTime {
        self.clock
    }

    #[inline]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Replace the catalog, revalidating and rebuilding the category tree
    ///
    /// Live voices keep playing; their category gains are re-resolved
    /// against the new tree.
    pub fn reload_catalog(&mut self, catalog: Catalog) -> DirectorResult<()> {
        catalog.validate()?;
        self.hierarchy = VolumeHierarchy::from_defs(catalog.categories())?;
        self.catalog = catalog;
        self.reapply_gains(None);
        Ok(())
    }

    // ─── Playback ───────────────────────────────────────────────────────

    /// Resolve and start a sound; `None` when nothing will play
    pub fn play(&mut self, id: &str, params: PlayParams) -> Option<Handle> {
        self.play_inner(id, params, None)
    }

    /// Start a sound at an absolute host time
    pub fn play_scheduled(&mut self, id: &str, at: HostTime, params: PlayParams) -> Option<Handle> {
        self.play_inner(id, params.starting_at(at), None)
    }

    fn play_inner(
        &mut self,
        id: &str,
        params: PlayParams,
        fade_in_override: Option<Seconds>,
    ) -> Option<Handle> {
        let Some(item) = self.catalog.item(id).cloned() else {
            warn!("play request for unknown item '{id}'");
            return None;
        };
        let now = self.clock;
        let scheduled = params.start_time > 0.0;

        // Rate limiting only applies to immediate plays; a scheduled play
        // was deliberately placed in time by the caller.
        if !scheduled && item.min_replay_interval > 0.0 {
            if let Some(last) = self.states.get(id).and_then(|s| s.last_played_at) {
                if now < last + f64::from(item.min_replay_interval) {
                    return None;
                }
            }
        }

        if item.max_concurrent_instances > 0 {
            self.enforce_instance_limit(&item, now);
        }

        let picks = select::select(&self.catalog, &item, &mut self.states, None, &mut self.rng);
        if picks.is_empty() {
            warn!("item '{id}' produced no playable alternative");
            return None;
        }
        self.states.entry(id.to_string()).or_default().last_played_at = Some(now);

        match item.pick_mode {
            PickMode::AllSimultaneously => {
                let mut first = None;
                for pick in &picks {
                    let handle = self.spawn_single(&item, pick, &params, fade_in_override, now);
                    first = first.or(handle);
                }
                first
            }
            PickMode::TwoSimultaneously if picks.len() == 2 => {
                self.spawn_pair(&item, &picks, &params, now)
            }
            _ => self.spawn_single(&item, &picks[0], &params, fade_in_override, now),
        }
    }

    fn spawn_single(
        &mut self,
        item: &SoundItem,
        pick: &ResolvedPick,
        params: &PlayParams,
        fade_in_override: Option<Seconds>,
        now: HostTime,
    ) -> Option<Handle> {
        let handle = self.acquire_voice(now);
        let category_gain = self.hierarchy.effective_gain(item.category.as_deref());
        let final_loops_in_place =
            item.loop_mode == LoopMode::PlayNThenLoopLast && item.loop_sequence_count <= 1;
        let sequence = item.loop_mode.is_sequence() && !final_loops_in_place;
        let looping = item.loop_mode == LoopMode::LoopChosen || final_loops_in_place;

        {
            let voice = self.voice_mut(handle)?;
            voice.prepare(
                handle,
                &item.id,
                item.category.as_deref(),
                category_gain,
                sequence,
                now,
            );
            voice.set_last_chosen(pick.index as i32);
            voice.set_default_stop_fade(f64::from(pick.clip.fade_out_secs));
            voice.set_caller_volume(params.volume);
            voice.set_attachment(params.attachment.clone());
        }

        let start_at = if params.start_time > 0.0 {
            params.start_time
        } else {
            now + params.delay + f64::from(item.start_delay)
        };
        let fade_in = fade_in_override.unwrap_or(f64::from(pick.clip.fade_in_secs));
        let curve = if fade_in_override.is_some() {
            FadeCurve::Sine
        } else {
            FadeCurve::Linear
        };
        self.start_clip(
            handle,
            SlotRole::Primary,
            &pick.clip,
            item.own_volume * pick.volume_scale * params.volume,
            pick.index as i32,
            start_at,
            looping,
            fade_in,
            curve,
        );
        Some(handle)
    }

    /// One voice, both slots, for the two-simultaneous pick mode
    fn spawn_pair(
        &mut self,
        item: &SoundItem,
        picks: &[ResolvedPick],
        params: &PlayParams,
        now: HostTime,
    ) -> Option<Handle> {
        let handle = self.acquire_voice(now);
        let category_gain = self.hierarchy.effective_gain(item.category.as_deref());
        {
            let voice = self.voice_mut(handle)?;
            voice.prepare(
                handle,
                &item.id,
                item.category.as_deref(),
                category_gain,
                false,
                now,
            );
            voice.set_last_chosen(picks[1].index as i32);
            voice.set_default_stop_fade(f64::from(picks[0].clip.fade_out_secs));
            voice.set_caller_volume(params.volume);
            voice.set_attachment(params.attachment.clone());
        }

        let start_at = if params.start_time > 0.0 {
            params.start_time
        } else {
            now + params.delay + f64::from(item.start_delay)
        };
        let looping = item.loop_mode == LoopMode::LoopChosen;
        for (role, pick) in [
            (SlotRole::Primary, &picks[0]),
            (SlotRole::Secondary, &picks[1]),
        ] {
            self.start_clip(
                handle,
                role,
                &pick.clip,
                item.own_volume * pick.volume_scale * params.volume,
                pick.index as i32,
                start_at,
                looping,
                f64::from(pick.clip.fade_in_secs),
                FadeCurve::Linear,
            );
        }
        Some(handle)
    }

    /// Configure a clip on a voice slot and emit its start command
    #[allow(clippy::too_many_arguments)]
    fn start_clip(
        &mut self,
        handle: Handle,
        role: SlotRole,
        clip: &ClipRef,
        volume_scale: f32,
        alternative_index: i32,
        mut start_at: HostTime,
        looping: bool,
        fade_in: Seconds,
        curve: FadeCurve,
    ) {
        if clip.random_delay > 0.0 {
            start_at += f64::from(self.rng.random_range(0.0..=clip.random_delay));
        }
        let pitch_shift = clip.pitch_shift
            + if clip.random_pitch > 0.0 {
                self.rng.random_range(-clip.random_pitch..=clip.random_pitch)
            } else {
                0.0
            };
        let volume_jitter = if clip.random_volume > 0.0 {
            self.rng.random_range(-clip.random_volume..=clip.random_volume)
        } else {
            0.0
        };
        let base_gain = (volume_scale * clip.volume * (1.0 + volume_jitter)).max(0.0);

        let full = clip.effective_duration();
        let mut start_offset = f64::from(clip.start_offset);
        let mut duration = full;
        if clip.random_start && full > 0.0 {
            let jump = self.rng.random_range(0.0..full);
            start_offset += jump;
            duration = full - jump;
        }

        let clip_id = self.next_clip_id;
        self.next_clip_id += 1;
        let now = self.clock;

        let (gain, attachment) = {
            let Some(voice) = self.voice_mut(handle) else {
                return;
            };
            voice.begin_slot(
                role,
                clip_id,
                base_gain,
                start_at,
                if looping { 0.0 } else { duration },
                looping,
                fade_in,
                curve,
                alternative_index,
                now,
            );
            (voice.slot_gain(role, start_at), voice.attachment().cloned())
        };
        self.out.push(RenderCommand::StartClip {
            clip_id,
            resource: clip.resource.clone(),
            gain,
            pitch_shift,
            pan: clip.pan,
            start_offset,
            at: start_at,
            looping,
            attachment,
        });
    }

    fn acquire_voice(&mut self, now: HostTime) -> Handle {
        if let Some(handle) = self.pool.acquire() {
            return handle;
        }
        if !self.pool_exhausted_warned {
            warn!(
                "voice pool exhausted (capacity {}); falling back to unpooled voices",
                self.pool.capacity()
            );
            self.pool_exhausted_warned = true;
        }
        self.unpooled_seq = self.unpooled_seq.wrapping_add(1);
        let handle = Handle::unpooled(self.unpooled_seq);
        let mut voice = PlaybackVoice::new();
        voice.prepare(handle, "", None, 1.0, false, now);
        self.unpooled.push(voice);
        handle
    }

    /// Evict the oldest instance of an item that is at its concurrency limit
    ///
    /// Every live voice counts toward the limit, fading ones included.
    /// Non-fading voices are preferred as victims; if everything is already
    /// fading out, the oldest overall is taken.
    fn enforce_instance_limit(&mut self, item: &SoundItem, now: HostTime) {
        let mut count = 0_u32;
        let mut oldest_steady: Option<(Handle, HostTime)> = None;
        let mut oldest_any: Option<(Handle, HostTime)> = None;

        for voice in self.pool.iter_live().chain(self.unpooled.iter()) {
            if voice.item_id() != item.id || !voice.is_live() {
                continue;
            }
            count += 1;
            let entry = (voice.handle(), voice.started_at());
            if oldest_any.is_none_or(|(_, t)| entry.1 < t) {
                oldest_any = Some(entry);
            }
            if !voice.is_fading_out() && oldest_steady.is_none_or(|(_, t)| entry.1 < t) {
                oldest_steady = Some(entry);
            }
        }

        if count >= item.max_concurrent_instances {
            if let Some((victim, _)) = oldest_steady.or(oldest_any) {
                debug!(
                    "instance limit {} reached for '{}', evicting oldest voice",
                    item.max_concurrent_instances, item.id
                );
                if let Some(voice) = self.voice_mut(victim) {
                    voice.stop(now, 0.0, 0.0);
                }
            }
        }
    }

    /// Stop every voice of an item; fade < 0 uses each clip's own fade-out
    pub fn stop(&mut self, id: &str, fade: Seconds) -> bool {
        let now = self.clock;
        let mut any = false;
        for handle in self.live_handles() {
            let Some(voice) = self.voice_mut(handle) else {
                continue;
            };
            if voice.item_id() == id && voice.is_live() {
                let fade = if fade < 0.0 {
                    voice.default_stop_fade()
                } else {
                    fade
                };
                voice.stop(now, fade, 0.0);
                any = true;
            }
        }
        any
    }

    pub fn stop_all(&mut self, fade: Seconds) {
        let now = self.clock;
        for handle in self.live_handles() {
            if let Some(voice) = self.voice_mut(handle) {
                if voice.is_live() {
                    let fade = if fade < 0.0 {
                        voice.default_stop_fade()
                    } else {
                        fade
                    };
                    voice.stop(now, fade, 0.0);
                }
            }
        }
    }

    pub fn pause_all(&mut self, fade: Seconds) {
        self.pause_where(fade, |_| true);
    }

    pub fn unpause_all(&mut self, fade: Seconds) {
        self.unpause_where(fade, |_| true);
    }

    /// Pause every voice whose category chain includes `name`
    pub fn pause_category(&mut self, name: &str, fade: Seconds) {
        let hierarchy = self.hierarchy.clone();
        self.pause_where(fade, |v| hierarchy.chain_contains(v.category(), name));
    }

    pub fn unpause_category(&mut self, name: &str, fade: Seconds) {
        let hierarchy = self.hierarchy.clone();
        self.unpause_where(fade, |v| hierarchy.chain_contains(v.category(), name));
    }

    fn pause_where<F: Fn(&PlaybackVoice) -> bool>(&mut self, fade: Seconds, filter: F) {
        let now = self.clock;
        let mut out = std::mem::take(&mut self.out);
        for handle in self.live_handles() {
            if let Some(voice) = self.voice_mut(handle) {
                if voice.is_live() && filter(voice) {
                    voice.pause(now, fade, &mut out);
                }
            }
        }
        self.out = out;
    }

    fn unpause_where<F: Fn(&PlaybackVoice) -> bool>(&mut self, fade: Seconds, filter: F) {
        let now = self.clock;
        let mut out = std::mem::take(&mut self.out);
        for handle in self.live_handles() {
            if let Some(voice) = self.voice_mut(handle) {
                if voice.is_live() && filter(voice) {
                    voice.unpause(now, fade, &mut out);
                }
            }
        }
        self.out = out;
    }

    /// Ask an intro-loop-outro voice to leave its loop and play the outro
    pub fn finish_sequence(&mut self, id: &str) {
        for handle in self.live_handles() {
            if let Some(voice) = self.voice_mut(handle) {
                if voice.item_id() == id && voice.sequence_enabled() {
                    voice.request_finish();
                }
            }
        }
    }

    // ─── Volume ─────────────────────────────────────────────────────────

    /// Set a category gain and immediately re-apply it to affected voices
    pub fn set_category_gain(&mut self, name: &str, value: f32) -> bool {
        if !self.hierarchy.set_gain(name, value) {
            return false;
        }
        self.reapply_gains(Some(name));
        true
    }

    pub fn category_gain(&self, name: &str) -> Option<f32> {
        self.hierarchy.gain(name)
    }

    pub fn set_global_gain(&mut self, value: f32) {
        self.hierarchy.set_global_gain(value);
        self.reapply_gains(None);
    }

    #[inline]
    pub fn hierarchy(&self) -> &VolumeHierarchy {
        &self.hierarchy
    }

    fn reapply_gains(&mut self, changed: Option<&str>) {
        for handle in self.live_handles() {
            let category = self
                .voice(handle)
                .and_then(|v| v.category().map(str::to_string));
            if let Some(changed) = changed {
                if !self.hierarchy.chain_contains(category.as_deref(), changed) {
                    continue;
                }
            }
            let gain = self.hierarchy.effective_gain(category.as_deref());
            if let Some(voice) = self.voice_mut(handle) {
                voice.set_category_gain(gain);
            }
        }
    }

    // ─── Music ──────────────────────────────────────────────────────────

    /// Make an item the single music voice, crossfading from the previous
    pub fn play_music(&mut self, id: &str, volume: f32, delay: Seconds) -> Option<Handle> {
        let now = self.clock;
        let crossfade = self.playlist.crossfade_secs();

        let mut was_playing = false;
        if let Some(current) = self.music_voice.take() {
            let live = self.voice(current).is_some_and(|v| v.is_live());
            let same = live && self.voice(current).is_some_and(|v| v.item_id() == id);
            if same {
                self.music_voice = Some(current);
                return Some(current);
            }
            if live {
                if let Some(voice) = self.voice_mut(current) {
                    // Both sides of a music crossfade are sine-shaped so the
                    // summed power stays near-constant.
                    voice.set_fade_out_curve(FadeCurve::Sine);
                    voice.stop(now, crossfade, 0.0);
                }
                was_playing = true;
            }
        }

        let fade_in = if was_playing { Some(crossfade) } else { None };
        let params = PlayParams::new().with_volume(volume).with_delay(delay);
        let handle = self.play_inner(id, params, fade_in)?;
        if let Some(voice) = self.voice_mut(handle) {
            voice.set_music(true);
        }
        self.music_voice = Some(handle);
        if !self.music_enabled {
            self.pause_music(0.0);
        }
        Some(handle)
    }

    /// Stop the music voice; fade < 0 uses the playlist crossfade
    pub fn stop_music(&mut self, fade: Seconds) {
        let now = self.clock;
        let fade = if fade < 0.0 {
            self.playlist.crossfade_secs()
        } else {
            fade
        };
        if let Some(handle) = self.music_voice.take() {
            if let Some(voice) = self.voice_mut(handle) {
                voice.stop(now, fade, 0.0);
            }
        }
    }

    pub fn pause_music(&mut self, fade: Seconds) {
        if let Some(handle) = self.music_voice {
            let now = self.clock;
            let mut out = std::mem::take(&mut self.out);
            if let Some(voice) = self.voice_mut(handle) {
                voice.pause(now, fade, &mut out);
            }
            self.out = out;
        }
    }

    pub fn unpause_music(&mut self, fade: Seconds) {
        if let Some(handle) = self.music_voice {
            let now = self.clock;
            let mut out = std::mem::take(&mut self.out);
            if let Some(voice) = self.voice_mut(handle) {
                voice.unpause(now, fade, &mut out);
            }
            self.out = out;
        }
    }

    /// Disabling music pauses the current voice so it can resume later
    pub fn set_music_enabled(&mut self, enabled: bool) {
        if self.music_enabled == enabled {
            return;
        }
        self.music_enabled = enabled;
        if enabled {
            self.unpause_music(0.0);
        } else {
            self.pause_music(0.0);
        }
    }

    #[inline]
    pub fn music_enabled(&self) -> bool {
        self.music_enabled
    }

    #[inline]
    pub fn music_voice(&self) -> Option<Handle> {
        self.music_voice
    }

    pub fn set_playlist(&mut self, playlist: Playlist) {
        self.playlist = playlist;
    }

    #[inline]
    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn enqueue_music(&mut self, id: impl Into<String>) {
        self.playlist.enqueue(id);
    }

    /// Advance the playlist and play the chosen track as music
    pub fn play_next_on_playlist(&mut self) -> Option<Handle> {
        self.playlist.next(&mut self.rng)?;
        let id = self.playlist.current()?.to_string();
        self.play_music(&id, 1.0, 0.0)
    }

    pub fn play_previous_on_playlist(&mut self) -> Option<Handle> {
        self.playlist.previous()?;
        let id = self.playlist.current()?.to_string();
        self.play_music(&id, 1.0, 0.0)
    }

    // ─── Tick ───────────────────────────────────────────────────────────

    /// Advance every voice by `dt` and collect the render commands
    pub fn tick(&mut self, dt: Seconds) -> Vec<RenderCommand> {
        self.clock += dt;
        let now = self.clock;
        let mut out = std::mem::take(&mut self.out);

        let mut finished = Vec::new();
        let mut advances = Vec::new();
        let mut outros = Vec::new();
        for handle in self.live_handles() {
            let Some(voice) = self.voice_mut(handle) else {
                continue;
            };
            match voice.tick(now, dt, &mut out) {
                VoiceStatus::Active => {
                    if voice.sequence_enabled()
                        && voice.finish_requested()
                        && voice.is_primary_looping()
                    {
                        outros.push(handle);
                    }
                }
                VoiceStatus::Finished => finished.push(handle),
                VoiceStatus::NeedsSequenceAdvance { end } => advances.push((handle, end)),
            }
        }

        for (handle, end) in advances {
            self.advance_sequence(handle, end);
        }
        for handle in outros {
            self.start_outro(handle);
        }

        let mut music_ended = false;
        for handle in finished {
            if self.music_voice == Some(handle) {
                self.music_voice = None;
                music_ended = true;
            }
            self.release_voice(handle);
        }
        if music_ended && self.music_enabled && !self.playlist.is_empty() {
            self.play_next_on_playlist();
        }

        // Commands produced by chaining and playlist advance this tick.
        out.extend(self.out.drain(..));
        out
    }

    /// Chain the next alternative of a loop-sequence voice
    ///
    /// The current primary ends at `end`; the continuation starts at
    /// `end - loopOverlap + random(0, loopRandomDelay)`, so a positive
    /// overlap crossfades and a negative one leaves a gap.
    fn advance_sequence(&mut self, handle: Handle, end: HostTime) {
        let Some(voice) = self.voice(handle) else {
            return;
        };
        let item_id = voice.item_id().to_string();
        let last = voice.last_chosen();
        let pick_number = voice.loop_progress() + 1;

        let Some(item) = self.catalog.item(&item_id).cloned() else {
            if let Some(voice) = self.voice_mut(handle) {
                voice.set_sequence_enabled(false);
            }
            return;
        };

        let bounded = item.loop_sequence_count > 0;
        if bounded
            && item.loop_mode != LoopMode::IntroLoopOutroSequence
            && pick_number >= item.loop_sequence_count
        {
            // The sequence has run its course; let the voice end naturally.
            if let Some(voice) = self.voice_mut(handle) {
                voice.set_sequence_enabled(false);
            }
            return;
        }

        let picks =
            select::select(&self.catalog, &item, &mut self.states, Some(last), &mut self.rng);
        let Some(pick) = picks.into_iter().next() else {
            if let Some(voice) = self.voice_mut(handle) {
                voice.set_sequence_enabled(false);
            }
            return;
        };

        let jitter = if item.loop_random_delay > 0.0 {
            f64::from(self.rng.random_range(0.0..=item.loop_random_delay))
        } else {
            0.0
        };
        let start_at = end - f64::from(item.loop_overlap) + jitter;
        let overlap_fade = f64::from(item.loop_overlap.max(0.0));

        let looping = match item.loop_mode {
            LoopMode::PlayNThenLoopLast => bounded && pick_number + 1 >= item.loop_sequence_count,
            LoopMode::IntroLoopOutroSequence => {
                pick_number >= item.loop_sequence_count.saturating_sub(2)
            }
            _ => false,
        };
        let fade_in = if overlap_fade > 0.0 {
            overlap_fade
        } else {
            f64::from(pick.clip.fade_in_secs)
        };

        let caller_volume = self
            .voice(handle)
            .map(|v| v.caller_volume())
            .unwrap_or(1.0);
        self.start_clip(
            handle,
            SlotRole::Secondary,
            &pick.clip,
            item.own_volume * pick.volume_scale * caller_volume,
            pick.index as i32,
            start_at,
            looping,
            fade_in,
            FadeCurve::Linear,
        );
        if let Some(voice) = self.voice_mut(handle) {
            voice.set_last_chosen(pick.index as i32);
            if looping && item.loop_mode == LoopMode::PlayNThenLoopLast {
                // Nothing left to chain after the final looping pick.
                voice.set_sequence_enabled(false);
            }
        }
    }

    /// Crossfade an intro-loop-outro voice out of its body into the outro
    fn start_outro(&mut self, handle: Handle) {
        let Some(voice) = self.voice(handle) else {
            return;
        };
        let item_id = voice.item_id().to_string();
        let last = voice.last_chosen();
        let caller_volume = voice.caller_volume();

        let Some(item) = self.catalog.item(&item_id).cloned() else {
            return;
        };
        if item.loop_mode != LoopMode::IntroLoopOutroSequence {
            return;
        }

        let picks =
            select::select(&self.catalog, &item, &mut self.states, Some(last), &mut self.rng);
        let now = self.clock;
        let overlap = f64::from(item.loop_overlap.max(0.0));

        let Some(pick) = picks.into_iter().next() else {
            if let Some(voice) = self.voice_mut(handle) {
                voice.stop(now, overlap, 0.0);
            }
            return;
        };

        if let Some(voice) = self.voice_mut(handle) {
            voice.fade_out_primary(now, overlap);
        }
        self.start_clip(
            handle,
            SlotRole::Secondary,
            &pick.clip,
            item.own_volume * pick.volume_scale * caller_volume,
            pick.index as i32,
            now,
            false,
            overlap,
            FadeCurve::Sine,
        );
        if let Some(voice) = self.voice_mut(handle) {
            voice.set_last_chosen(pick.index as i32);
            voice.set_sequence_enabled(false);
        }
    }

    fn release_voice(&mut self, handle: Handle) {
        if handle.is_unpooled() {
            self.unpooled.retain(|v| v.handle() != handle);
        } else {
            self.pool.release(handle);
        }
    }

    // ─── Queries ────────────────────────────────────────────────────────

    pub fn is_playing(&self, id: &str) -> bool {
        self.playing_count(id) > 0
    }

    /// Live, non-fading voices of an item
    pub fn playing_count(&self, id: &str) -> usize {
        self.pool
            .iter_live()
            .chain(self.unpooled.iter())
            .filter(|v| v.item_id() == id && v.is_live() && !v.is_fading_out())
            .count()
    }

    pub fn playing_voices(&self, id: &str) -> Vec<Handle> {
        self.pool
            .iter_live()
            .chain(self.unpooled.iter())
            .filter(|v| v.item_id() == id && v.is_live())
            .map(|v| v.handle())
            .collect()
    }

    /// Live voices whose category chain includes `name`
    pub fn playing_voices_in_category(&self, name: &str) -> Vec<Handle> {
        self.pool
            .iter_live()
            .chain(self.unpooled.iter())
            .filter(|v| v.is_live() && self.hierarchy.chain_contains(v.category(), name))
            .map(|v| v.handle())
            .collect()
    }

    /// Inspect a voice by handle; `None` for stale handles
    pub fn voice(&self, handle: Handle) -> Option<&PlaybackVoice> {
        if handle.is_unpooled() {
            self.unpooled.iter().find(|v| v.handle() == handle)
        } else {
            self.pool.get(handle)
        }
    }

    fn voice_mut(&mut self, handle: Handle) -> Option<&mut PlaybackVoice> {
        if handle.is_unpooled() {
            self.unpooled.iter_mut().find(|v| v.handle() == handle)
        } else {
            self.pool.get_mut(handle)
        }
    }

    fn live_handles(&self) -> Vec<Handle> {
        let mut handles = self.pool.live_handles();
        handles.extend(self.unpooled.iter().map(|v| v.handle()));
        handles
    }
}
