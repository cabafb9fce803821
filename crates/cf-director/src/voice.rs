//! Playback voice
//!
//! Per-sound-instance state machine. A voice owns two clip slots so that
//! loop-sequence chaining and crossfades can overlap the outgoing clip with
//! the incoming one; [`PlaybackVoice::swap_roles`] promotes the chained slot
//! once the old primary ends. The voice never talks to a renderer directly:
//! every externally visible change is pushed as a [`RenderCommand`].
//!
//! States: Idle → Scheduled → Playing ⇄ Paused → FadingOut → Stopped.

use crate::director::{Attachment, RenderCommand};
use crate::fader::FadeTimeline;
use cf_core::{FadeCurve, Handle, HostTime, Seconds, VirtualClock};

/// Minimum gain delta worth re-sending to the renderer
const GAIN_EPSILON: f32 = 1e-4;

/// Names for a voice's two clip slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotRole {
    Primary,
    Secondary,
}

/// Voice lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoiceState {
    /// Not configured; owned by the pool
    #[default]
    Idle,
    /// Configured, waiting for an absolute start time
    Scheduled,
    Playing,
    Paused,
    /// Stop requested, fade-out running
    FadingOut,
    /// Both slots silent; ready for release
    Stopped,
}

/// What the director should do with a voice after a tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VoiceStatus {
    Active,
    /// Both slots silent and nothing pending; release to the pool
    Finished,
    /// A sequence-loop voice wants its next alternative chained
    ///
    /// `end` is the host time at which the current primary clip ends; the
    /// director derives the chain start from it (overlap, random delay).
    NeedsSequenceAdvance { end: HostTime },
}

#[derive(Debug, Clone, Default)]
struct ClipSlot {
    active: bool,
    clip_id: u64,
    /// Item, sub-item, caller and jitter volume terms folded together
    base_gain: f32,
    fades: FadeTimeline,
    clock: VirtualClock,
    looping: bool,
    /// Effective clip length; 0 = unknown (no natural-end detection)
    duration: Seconds,
    /// Absolute host time the clip starts (or started)
    start_at: HostTime,
    last_sent_gain: f32,
    alternative_index: i32,
}

impl ClipSlot {
    fn stop_now(&mut self, out: &mut Vec<RenderCommand>) {
        if self.active {
            out.push(RenderCommand::StopClip {
                clip_id: self.clip_id,
            });
            self.active = false;
        }
    }

    fn clear(&mut self) {
        *self = ClipSlot::default();
    }
}

/// One playing instance of a sound item
#[derive(Debug, Clone, Default)]
pub struct PlaybackVoice {
    handle: Handle,
    item_id: String,
    category: Option<String>,
    state: VoiceState,
    primary: ClipSlot,
    secondary: ClipSlot,
    scheduled_at: Option<HostTime>,
    started_at: HostTime,
    pause_began: Option<HostTime>,
    /// Outstanding pause-with-fade requests not yet completed
    pending_pause_fades: u32,
    /// Deferred stop: (apply at, fade seconds)
    pending_stop: Option<(HostTime, Seconds)>,
    /// Whether this voice chains successive alternatives
    sequence_enabled: bool,
    /// The secondary slot already holds the next chained clip
    chain_armed: bool,
    loop_progress: u32,
    /// Per-voice last-chosen alternative for sequence continuation
    last_chosen: i32,
    finish_requested: bool,
    is_music: bool,
    /// Live category gain, re-applied by the director on hierarchy changes
    category_gain: f32,
    /// Fade used when a stop request does not name its own duration
    default_stop_fade: Seconds,
    /// Caller volume from the original play request, reused for chained clips
    caller_volume: f32,
    /// Spatial attachment passed through to every clip this voice starts
    attachment: Option<Attachment>,
}

impl PlaybackVoice {
    pub fn new() -> Self {
        Self {
            category_gain: 1.0,
            caller_volume: 1.0,
            last_chosen: -1,
            ..Self::default()
        }
    }

    /// Configure a pooled (or fresh) voice for an item
    pub fn prepare(
        &mut self,
        handle: Handle,
        item_id: &str,
        category: Option<&str>,
        category_gain: f32,
        sequence_enabled: bool,
        now: HostTime,
    ) {
        self.handle = handle;
        self.item_id = item_id.to_string();
        self.category = category.map(str::to_string);
        self.state = VoiceState::Idle;
        self.primary.clear();
        self.secondary.clear();
        self.scheduled_at = None;
        self.started_at = now;
        self.pause_began = None;
        self.pending_pause_fades = 0;
        self.pending_stop = None;
        self.sequence_enabled = sequence_enabled;
        self.chain_armed = false;
        self.loop_progress = 0;
        self.last_chosen = -1;
        self.finish_requested = false;
        self.is_music = false;
        self.category_gain = category_gain;
        self.default_stop_fade = 0.0;
        self.caller_volume = 1.0;
        self.attachment = None;
    }

    /// Begin a clip on a slot
    ///
    /// Starting on the primary of an idle voice transitions to Scheduled or
    /// Playing; starting on the secondary of a playing voice arms a chained
    /// or crossfaded continuation without touching the voice state.
    #[allow(clippy::too_many_arguments)]
    pub fn begin_slot(
        &mut self,
        role: SlotRole,
        clip_id: u64,
        base_gain: f32,
        start_at: HostTime,
        duration: Seconds,
        looping: bool,
        fade_in: Seconds,
        fade_curve: FadeCurve,
        alternative_index: i32,
        now: HostTime,
    ) {
        let slot = self.slot_mut(role);
        slot.clear();
        slot.active = true;
        slot.clip_id = clip_id;
        slot.base_gain = base_gain;
        slot.start_at = start_at;
        slot.duration = duration;
        slot.looping = looping;
        slot.alternative_index = alternative_index;
        slot.fades.set_curves(fade_curve, fade_curve);
        if fade_in > 0.0 {
            slot.fades.start_fade_in(now, fade_in, start_at, false);
        }
        slot.last_sent_gain = f32::NAN; // force a SetGain on the first tick

        if self.state == VoiceState::Idle {
            if start_at > now {
                self.scheduled_at = Some(start_at);
                self.state = VoiceState::Scheduled;
            } else {
                self.state = VoiceState::Playing;
            }
        }
        if role == SlotRole::Secondary && self.sequence_enabled {
            self.chain_armed = true;
        }
    }

    /// Swap the primary and secondary slots
    pub fn swap_roles(&mut self) {
        std::mem::swap(&mut self.primary, &mut self.secondary);
    }

    /// Gain a slot would render at the given host time
    pub fn slot_gain(&self, role: SlotRole, now: HostTime) -> f32 {
        let slot = self.slot(role);
        slot.base_gain * self.category_gain * slot.fades.value(now).gain
    }

    /// Re-apply a changed category gain; picked up on the next tick
    pub fn set_category_gain(&mut self, gain: f32) {
        self.category_gain = gain;
    }

    /// Request a pause, optionally fading out first
    ///
    /// With a fade, the clock keeps running until the fade completes; the
    /// counter tolerates overlapping pause requests. Pausing a scheduled
    /// voice postpones its start by the paused duration.
    pub fn pause(&mut self, now: HostTime, fade: Seconds, out: &mut Vec<RenderCommand>) {
        match self.state {
            VoiceState::Playing | VoiceState::FadingOut => {
                if fade > 0.0 {
                    self.pending_pause_fades += 1;
                    for slot in [&mut self.primary, &mut self.secondary] {
                        if slot.active {
                            slot.fades.start_fade_out(now, fade, 0.0);
                        }
                    }
                } else {
                    self.enter_paused(now, out);
                }
            }
            VoiceState::Scheduled => self.enter_paused(now, out),
            _ => {}
        }
    }

    /// Resume a paused voice, optionally fading back in
    ///
    /// Calling this on a voice that is not paused cancels any pending
    /// pause-fade instead; otherwise it is a no-op.
    pub fn unpause(&mut self, now: HostTime, fade: Seconds, out: &mut Vec<RenderCommand>) {
        if self.state != VoiceState::Paused {
            if self.pending_pause_fades > 0 {
                self.pending_pause_fades = 0;
                for slot in [&mut self.primary, &mut self.secondary] {
                    if slot.active {
                        slot.fades
                            .start_fade_in(now, fade.max(0.0), now, true);
                    }
                }
            }
            return;
        }

        let shift = now - self.pause_began.take().unwrap_or(now);
        self.scheduled_at = self.scheduled_at.map(|t| t + shift);
        for slot in [&mut self.primary, &mut self.secondary] {
            if !slot.active {
                continue;
            }
            slot.start_at += shift;
            out.push(RenderCommand::ResumeClip {
                clip_id: slot.clip_id,
            });
            if now >= slot.start_at {
                slot.clock.resume();
            }
            if fade > 0.0 {
                slot.fades.start_fade_in(now, fade, now, false);
            }
        }
        self.state = if self.scheduled_at.is_some() {
            VoiceState::Scheduled
        } else {
            VoiceState::Playing
        };
    }

    /// Request a stop, optionally fading out, optionally deferred
    pub fn stop(&mut self, now: HostTime, fade: Seconds, start_delay: Seconds) {
        if start_delay > 0.0 {
            let at = now + start_delay;
            match self.pending_stop {
                Some((existing, _)) if existing <= at => {}
                _ => self.pending_stop = Some((at, fade)),
            }
            return;
        }
        self.apply_stop(now, fade);
    }

    fn apply_stop(&mut self, now: HostTime, fade: Seconds) {
        self.sequence_enabled = false;
        self.pending_pause_fades = 0;
        if self.state == VoiceState::Paused {
            // Nothing audible to fade; silenced on the next tick.
            for slot in [&mut self.primary, &mut self.secondary] {
                if slot.active {
                    slot.fades.start_fade_out(now, 0.0, 0.0);
                }
            }
            self.pause_began = None;
        } else {
            for slot in [&mut self.primary, &mut self.secondary] {
                if slot.active {
                    slot.fades.start_fade_out(now, fade.max(0.0), 0.0);
                }
            }
        }
        self.state = VoiceState::FadingOut;
    }

    /// Force immediate silence and mark the voice stopped; safe in any state
    pub fn destroy(&mut self, out: &mut Vec<RenderCommand>) {
        self.primary.stop_now(out);
        self.secondary.stop_now(out);
        self.sequence_enabled = false;
        self.chain_armed = false;
        self.pending_stop = None;
        self.pending_pause_fades = 0;
        self.state = VoiceState::Stopped;
    }

    /// Ask an intro-loop-outro voice to leave its looping body
    pub fn request_finish(&mut self) {
        self.finish_requested = true;
    }

    /// Advance the voice by one host tick
    pub fn tick(&mut self, now: HostTime, dt: Seconds, out: &mut Vec<RenderCommand>) -> VoiceStatus {
        match self.state {
            VoiceState::Idle | VoiceState::Paused => return VoiceStatus::Active,
            VoiceState::Stopped => return VoiceStatus::Finished,
            _ => {}
        }

        if let Some((at, fade)) = self.pending_stop {
            if now >= at {
                self.pending_stop = None;
                self.apply_stop(now, fade);
            }
        }

        if self.state == VoiceState::Scheduled {
            match self.scheduled_at {
                Some(at) if now >= at => {
                    self.scheduled_at = None;
                    self.state = VoiceState::Playing;
                }
                _ => return VoiceStatus::Active,
            }
        }

        // Advance clocks and re-evaluate fades on both slots.
        let mut all_faded = true;
        for slot in [&mut self.primary, &mut self.secondary] {
            if !slot.active {
                continue;
            }
            if slot.clock.is_running() {
                slot.clock.advance(dt);
            } else if now >= slot.start_at {
                slot.clock.start_at(now - slot.start_at);
            }

            let value = slot.fades.value(now);
            let gain = slot.base_gain * self.category_gain * value.gain;
            if slot.last_sent_gain.is_nan()
                || (gain - slot.last_sent_gain).abs() > GAIN_EPSILON
            {
                out.push(RenderCommand::SetGain {
                    clip_id: slot.clip_id,
                    gain,
                });
                slot.last_sent_gain = gain;
            }
            if !value.fade_out_completed {
                all_faded = false;
            }
        }

        if self.pending_pause_fades > 0 {
            if all_faded {
                self.enter_paused(now, out);
            }
            return VoiceStatus::Active;
        }

        for slot in [&mut self.primary, &mut self.secondary] {
            if !slot.active {
                continue;
            }
            let value = slot.fades.value(now);
            if value.fade_out_completed {
                slot.stop_now(out);
            } else if !slot.looping && slot.duration > 0.0 && slot.clock.elapsed() >= slot.duration
            {
                // Natural end; the renderer stops on its own.
                slot.active = false;
            }
        }

        // Promote a chained clip once the outgoing primary has ended.
        if self.chain_armed && !self.primary.active && self.secondary.active {
            self.swap_roles();
            self.chain_armed = false;
            self.loop_progress += 1;
        }

        if self.sequence_enabled
            && !self.chain_armed
            && self.state == VoiceState::Playing
            && self.primary.active
            && !self.primary.looping
            && self.primary.duration > 0.0
        {
            return VoiceStatus::NeedsSequenceAdvance {
                end: self.primary.start_at + self.primary.duration,
            };
        }

        if !self.primary.active && !self.secondary.active {
            if self.sequence_enabled && self.state == VoiceState::Playing {
                // Underrun: both slots ended before a chain was armed.
                return VoiceStatus::NeedsSequenceAdvance { end: now };
            }
            self.state = VoiceState::Stopped;
            return VoiceStatus::Finished;
        }

        VoiceStatus::Active
    }

    fn enter_paused(&mut self, now: HostTime, out: &mut Vec<RenderCommand>) {
        for slot in [&mut self.primary, &mut self.secondary] {
            if slot.active {
                slot.clock.suspend();
                slot.fades.clear_fade_out();
                out.push(RenderCommand::PauseClip {
                    clip_id: slot.clip_id,
                });
            }
        }
        self.pending_pause_fades = 0;
        self.pause_began = Some(now);
        self.state = VoiceState::Paused;
    }

    fn slot(&self, role: SlotRole) -> &ClipSlot {
        match role {
            SlotRole::Primary => &self.primary,
            SlotRole::Secondary => &self.secondary,
        }
    }

    fn slot_mut(&mut self, role: SlotRole) -> &mut ClipSlot {
        match role {
            SlotRole::Primary => &mut self.primary,
            SlotRole::Secondary => &mut self.secondary,
        }
    }

    // Accessors

    #[inline]
    pub fn handle(&self) -> Handle {
        self.handle
    }

    #[inline]
    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    #[inline]
    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    #[inline]
    pub fn state(&self) -> VoiceState {
        self.state
    }

    #[inline]
    pub fn started_at(&self) -> HostTime {
        self.started_at
    }

    /// Whether a stop fade-out is in progress
    #[inline]
    pub fn is_fading_out(&self) -> bool {
        self.state == VoiceState::FadingOut
    }

    /// Whether the voice still occupies a renderer clip
    #[inline]
    pub fn is_live(&self) -> bool {
        !matches!(self.state, VoiceState::Idle | VoiceState::Stopped)
    }

    #[inline]
    pub fn loop_progress(&self) -> u32 {
        self.loop_progress
    }

    #[inline]
    pub fn last_chosen(&self) -> i32 {
        self.last_chosen
    }

    pub fn set_last_chosen(&mut self, index: i32) {
        self.last_chosen = index;
    }

    #[inline]
    pub fn finish_requested(&self) -> bool {
        self.finish_requested
    }

    #[inline]
    pub fn is_music(&self) -> bool {
        self.is_music
    }

    pub fn set_music(&mut self, music: bool) {
        self.is_music = music;
    }

    #[inline]
    pub fn sequence_enabled(&self) -> bool {
        self.sequence_enabled
    }

    pub fn set_sequence_enabled(&mut self, enabled: bool) {
        self.sequence_enabled = enabled;
    }

    #[inline]
    pub fn default_stop_fade(&self) -> Seconds {
        self.default_stop_fade
    }

    pub fn set_default_stop_fade(&mut self, fade: Seconds) {
        self.default_stop_fade = fade.max(0.0);
    }

    #[inline]
    pub fn caller_volume(&self) -> f32 {
        self.caller_volume
    }

    pub fn set_caller_volume(&mut self, volume: f32) {
        self.caller_volume = volume;
    }

    #[inline]
    pub fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    pub fn set_attachment(&mut self, attachment: Option<Attachment>) {
        self.attachment = attachment;
    }

    /// Whether the current primary clip loops in place
    #[inline]
    pub fn is_primary_looping(&self) -> bool {
        self.primary.active && self.primary.looping
    }

    /// Fade out only the primary slot, leaving the secondary untouched
    ///
    /// Used when an outro is chained while the looping body winds down.
    pub fn fade_out_primary(&mut self, now: HostTime, fade: Seconds) {
        if self.primary.active {
            self.primary.looping = false;
            self.primary.fades.start_fade_out(now, fade.max(0.0), 0.0);
        }
    }

    /// Mark the current primary slot as looping in place
    pub fn set_primary_looping(&mut self, looping: bool) {
        self.primary.looping = looping;
    }

    /// Shape subsequent fade-outs of both active slots with `curve`
    pub fn set_fade_out_curve(&mut self, curve: FadeCurve) {
        for slot in [&mut self.primary, &mut self.secondary] {
            if slot.active {
                slot.fades.set_fade_out_curve(curve);
            }
        }
    }

    /// Renderer clip id of the primary slot, if active
    pub fn primary_clip_id(&self) -> Option<u64> {
        self.primary.active.then_some(self.primary.clip_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started_voice(duration: Seconds, now: HostTime) -> PlaybackVoice {
        let mut voice = PlaybackVoice::new();
        voice.prepare(Handle::new(0, 1), "hit", None, 1.0, false, now);
        voice.begin_slot(
            SlotRole::Primary,
            1,
            0.8,
            now,
            duration,
            false,
            0.0,
            FadeCurve::Linear,
            0,
            now,
        );
        voice
    }

    fn tick_until(
        voice: &mut PlaybackVoice,
        from: HostTime,
        to: HostTime,
        dt: Seconds,
    ) -> (VoiceStatus, Vec<RenderCommand>) {
        let mut out = Vec::new();
        let mut status = VoiceStatus::Active;
        let mut now = from;
        while now < to {
            now += dt;
            status = voice.tick(now, dt, &mut out);
        }
        (status, out)
    }

    #[test]
    fn test_plays_then_finishes_naturally() {
        let mut voice = started_voice(1.0, 0.0);
        assert_eq!(voice.state(), VoiceState::Playing);

        let (status, _) = tick_until(&mut voice, 0.0, 1.1, 0.05);
        assert_eq!(status, VoiceStatus::Finished);
        assert_eq!(voice.state(), VoiceState::Stopped);
    }

    #[test]
    fn test_scheduled_start_waits() {
        let mut voice = PlaybackVoice::new();
        voice.prepare(Handle::new(0, 1), "hit", None, 1.0, false, 0.0);
        voice.begin_slot(
            SlotRole::Primary,
            1,
            1.0,
            2.0,
            1.0,
            false,
            0.0,
            FadeCurve::Linear,
            0,
            0.0,
        );
        assert_eq!(voice.state(), VoiceState::Scheduled);

        let mut out = Vec::new();
        assert_eq!(voice.tick(1.0, 0.5, &mut out), VoiceStatus::Active);
        assert_eq!(voice.state(), VoiceState::Scheduled);

        voice.tick(2.0, 0.5, &mut out);
        assert_eq!(voice.state(), VoiceState::Playing);
    }

    #[test]
    fn test_stop_with_fade_reaches_silence() {
        let mut voice = started_voice(10.0, 0.0);
        let mut out = Vec::new();
        voice.tick(0.1, 0.1, &mut out);

        voice.stop(0.1, 0.5, 0.0);
        assert!(voice.is_fading_out());

        let (status, out) = tick_until(&mut voice, 0.1, 1.0, 0.1);
        assert_eq!(status, VoiceStatus::Finished);
        assert!(out
            .iter()
            .any(|c| matches!(c, RenderCommand::StopClip { clip_id: 1 })));
    }

    #[test]
    fn test_deferred_stop() {
        let mut voice = started_voice(10.0, 0.0);
        voice.stop(0.0, 0.0, 1.0);

        let (status, _) = tick_until(&mut voice, 0.0, 0.9, 0.1);
        assert_eq!(status, VoiceStatus::Active);

        let (status, _) = tick_until(&mut voice, 0.9, 1.3, 0.1);
        assert_eq!(status, VoiceStatus::Finished);
    }

    #[test]
    fn test_pause_suspends_and_unpause_restores() {
        let mut voice = started_voice(1.0, 0.0);
        let mut out = Vec::new();
        voice.tick(0.5, 0.5, &mut out);

        voice.pause(0.5, 0.0, &mut out);
        assert_eq!(voice.state(), VoiceState::Paused);
        assert!(out
            .iter()
            .any(|c| matches!(c, RenderCommand::PauseClip { clip_id: 1 })));

        // Time passes while paused; the clip must not end.
        assert_eq!(voice.tick(5.0, 4.5, &mut out), VoiceStatus::Active);

        voice.unpause(5.0, 0.0, &mut out);
        assert_eq!(voice.state(), VoiceState::Playing);
        assert!(out
            .iter()
            .any(|c| matches!(c, RenderCommand::ResumeClip { clip_id: 1 })));

        // Remaining half second still plays out.
        let (status, _) = tick_until(&mut voice, 5.0, 5.4, 0.1);
        assert_eq!(status, VoiceStatus::Active);
        let (status, _) = tick_until(&mut voice, 5.4, 5.7, 0.1);
        assert_eq!(status, VoiceStatus::Finished);
    }

    #[test]
    fn test_pause_with_fade_waits_for_fade() {
        let mut voice = started_voice(10.0, 0.0);
        let mut out = Vec::new();
        voice.tick(0.1, 0.1, &mut out);

        voice.pause(0.1, 0.4, &mut out);
        assert_eq!(voice.state(), VoiceState::Playing);

        voice.tick(0.3, 0.2, &mut out);
        assert_eq!(voice.state(), VoiceState::Playing);

        voice.tick(0.6, 0.3, &mut out);
        assert_eq!(voice.state(), VoiceState::Paused);
    }

    #[test]
    fn test_pause_postpones_scheduled_start() {
        let mut voice = PlaybackVoice::new();
        voice.prepare(Handle::new(0, 1), "hit", None, 1.0, false, 0.0);
        voice.begin_slot(
            SlotRole::Primary,
            1,
            1.0,
            1.0,
            2.0,
            false,
            0.0,
            FadeCurve::Linear,
            0,
            0.0,
        );

        let mut out = Vec::new();
        voice.pause(0.5, 0.0, &mut out);
        voice.unpause(3.5, 0.0, &mut out);
        assert_eq!(voice.state(), VoiceState::Scheduled);

        // Original start 1.0, postponed by the 3-second pause.
        voice.tick(3.9, 0.1, &mut out);
        assert_eq!(voice.state(), VoiceState::Scheduled);
        voice.tick(4.1, 0.2, &mut out);
        assert_eq!(voice.state(), VoiceState::Playing);
    }

    #[test]
    fn test_category_gain_reapplied_next_tick() {
        let mut voice = started_voice(10.0, 0.0);
        let mut out = Vec::new();
        voice.tick(0.1, 0.1, &mut out);
        out.clear();

        voice.set_category_gain(0.5);
        voice.tick(0.2, 0.1, &mut out);

        let gain = out.iter().find_map(|c| match c {
            RenderCommand::SetGain { clip_id: 1, gain } => Some(*gain),
            _ => None,
        });
        assert!((gain.unwrap() - 0.4).abs() < 1e-5); // 0.8 base × 0.5
    }

    #[test]
    fn test_sequence_requests_advance_and_swaps() {
        let mut voice = PlaybackVoice::new();
        voice.prepare(Handle::new(0, 1), "steps", None, 1.0, true, 0.0);
        voice.begin_slot(
            SlotRole::Primary,
            1,
            1.0,
            0.0,
            1.0,
            false,
            0.0,
            FadeCurve::Linear,
            0,
            0.0,
        );

        let mut out = Vec::new();
        let status = voice.tick(0.1, 0.1, &mut out);
        assert_eq!(status, VoiceStatus::NeedsSequenceAdvance { end: 1.0 });

        // Director arms the continuation on the secondary slot.
        voice.begin_slot(
            SlotRole::Secondary,
            2,
            1.0,
            1.0,
            1.0,
            false,
            0.0,
            FadeCurve::Linear,
            1,
            0.1,
        );
        assert_eq!(voice.tick(0.2, 0.1, &mut out), VoiceStatus::Active);

        // Primary ends; chained slot takes over and a new advance is wanted.
        let (status, _) = tick_until(&mut voice, 0.2, 1.2, 0.1);
        assert_eq!(voice.loop_progress(), 1);
        assert_eq!(voice.primary_clip_id(), Some(2));
        assert_eq!(status, VoiceStatus::NeedsSequenceAdvance { end: 2.0 });
    }

    #[test]
    fn test_destroy_from_any_state() {
        let mut voice = started_voice(10.0, 0.0);
        let mut out = Vec::new();
        voice.tick(0.1, 0.1, &mut out);
        out.clear();

        voice.destroy(&mut out);
        assert_eq!(voice.state(), VoiceState::Stopped);
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], RenderCommand::StopClip { clip_id: 1 }));
        assert_eq!(voice.tick(0.2, 0.1, &mut out), VoiceStatus::Finished);
    }
}
