use super::event_queue::{EventQueue, Listeners};
use super::slot_timeline::slot_bone_active;
use super::timeline::signum;
use crate::{
    Animation, AnimationStateEvent, AnimationStateListener, AttachmentTimeline, BoneTimeline,
    Error, Event, ListenerId, MixBlend, MixDirection, PropertyId, Skeleton, SkeletonData,
    Timeline,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const EMPTY_ANIMATION_NAME: &str = "<empty>";

/// Slot `attachment_state` offsets from the per-apply unkeyed base.
const SETUP: i32 = 1;
const CURRENT: i32 = 2;

/// How a timeline of an entry being mixed out is applied, recomputed whenever the set of
/// entries changes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TimelineMode {
    /// A lower entry already keys the property; mix from the current pose.
    Subsequent,
    /// First to key the property; mix from setup.
    First,
    /// Like `Subsequent`, held at full weight while the next entry mixes in.
    HoldSubsequent,
    /// Like `First`, held at full weight while the next entry mixes in.
    HoldFirst,
    /// Held at full weight, then faded as a later entry that does not key the property mixes
    /// in.
    HoldMix,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct EntryId {
    index: usize,
    generation: u32,
}

#[derive(Debug)]
struct EntrySlot {
    generation: u32,
    entry: Option<TrackEntry>,
}

fn validate_mix_duration(duration: f32) -> Result<(), Error> {
    if !duration.is_finite() || duration < 0.0 {
        return Err(Error::InvalidValue {
            message: format!("mix duration must be finite and >= 0, got {duration}"),
        });
    }
    Ok(())
}

/// Mix durations between animations of one skeleton.
#[derive(Clone, Debug)]
pub struct AnimationStateData {
    skeleton_data: Arc<SkeletonData>,
    default_mix: f32,
    // Keyed from name, then to name, so lookups take `&str`.
    mixes: HashMap<String, HashMap<String, f32>>,
}

impl AnimationStateData {
    pub fn new(skeleton_data: Arc<SkeletonData>) -> Self {
        Self {
            skeleton_data,
            default_mix: 0.0,
            mixes: HashMap::new(),
        }
    }

    pub fn skeleton_data(&self) -> &Arc<SkeletonData> {
        &self.skeleton_data
    }

    pub fn default_mix(&self) -> f32 {
        self.default_mix
    }

    /// Mix duration used when no pair has been set.
    pub fn set_default_mix(&mut self, duration: f32) -> Result<(), Error> {
        validate_mix_duration(duration)?;
        self.default_mix = duration;
        Ok(())
    }

    /// Sets the mix duration when changing from `from` to `to`. Both must name animations of
    /// the skeleton data.
    pub fn set_mix(&mut self, from: &str, to: &str, duration: f32) -> Result<(), Error> {
        validate_mix_duration(duration)?;
        let from = self.skeleton_data.find_animation(from)?;
        let to = self.skeleton_data.find_animation(to)?;
        self.mixes
            .entry(from.name().to_string())
            .or_default()
            .insert(to.name().to_string(), duration);
        Ok(())
    }

    /// Mix duration from `from` to `to`, or the default mix.
    pub fn mix(&self, from: &Animation, to: &Animation) -> f32 {
        self.mixes
            .get(from.name())
            .and_then(|to_mixes| to_mixes.get(to.name()))
            .copied()
            .unwrap_or(self.default_mix)
    }
}

/// One scheduled or playing animation on a track. Obtained through
/// [`AnimationState::track_entry`] with the handle returned when it was set or queued.
pub struct TrackEntry {
    animation: Arc<Animation>,
    track_index: usize,
    previous: Option<EntryId>,
    next: Option<EntryId>,
    mixing_from: Option<EntryId>,
    mixing_to: Option<EntryId>,
    listener: Option<Box<dyn AnimationStateListener>>,
    // Bumped by set_listener and clear_listener so delivery can tell whether the callback
    // replaced or cleared its own listener.
    listener_generation: u32,

    pub looped: bool,
    /// Plays the animation backwards. Events are not fired.
    pub reverse: bool,
    /// Mixes rotations the short way every frame instead of tracking the direction taken.
    pub shortest_rotation: bool,
    /// Applies the previous entry's timelines at full weight while this one mixes in.
    pub hold_previous: bool,

    /// Events are fired while mixing out until the mix reaches this percentage.
    pub event_threshold: f32,
    /// Attachment keys of the mixing out entry are applied until the mix reaches this.
    pub mix_attachment_threshold: f32,
    /// Attachment keys are applied only while `alpha` is at least this.
    pub alpha_attachment_threshold: f32,
    /// Draw order keys of the mixing out entry are applied until the mix reaches this.
    pub mix_draw_order_threshold: f32,

    pub animation_start: f32,
    pub animation_end: f32,
    animation_last: f32,
    next_animation_last: f32,

    /// Seconds before this entry becomes current, once queued.
    pub delay: f32,
    pub track_time: f32,
    track_last: f32,
    next_track_last: f32,
    /// Track time at which the entry is ended when nothing is queued after it.
    pub track_end: f32,
    pub time_scale: f32,
    pub alpha: f32,

    pub mix_time: f32,
    /// Seconds to mix from the previous entry. Setting it directly does not adjust the delay,
    /// see [`TrackEntryHandle::set_mix_duration_with_delay`].
    pub mix_duration: f32,
    interrupt_alpha: f32,
    total_alpha: f32,
    pub mix_blend: MixBlend,

    timeline_mode: Vec<TimelineMode>,
    timeline_hold_mix: Vec<Option<EntryId>>,
    timelines_rotation: Vec<f32>,
}

impl std::fmt::Debug for TrackEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackEntry")
            .field("animation", &self.animation.name())
            .field("track_index", &self.track_index)
            .field("looped", &self.looped)
            .field("delay", &self.delay)
            .field("track_time", &self.track_time)
            .field("track_end", &self.track_end)
            .field("mix_time", &self.mix_time)
            .field("mix_duration", &self.mix_duration)
            .field("mix_blend", &self.mix_blend)
            .field("mixing_from", &self.mixing_from)
            .field("next", &self.next)
            .finish()
    }
}

impl TrackEntry {
    fn new(track_index: usize, animation: Arc<Animation>, looped: bool, mix_duration: f32) -> Self {
        let animation_end = animation.duration();
        Self {
            animation,
            track_index,
            previous: None,
            next: None,
            mixing_from: None,
            mixing_to: None,
            listener: None,
            listener_generation: 0,
            looped,
            reverse: false,
            shortest_rotation: false,
            hold_previous: false,
            event_threshold: 0.0,
            mix_attachment_threshold: 0.0,
            alpha_attachment_threshold: 0.0,
            mix_draw_order_threshold: 0.0,
            animation_start: 0.0,
            animation_end,
            animation_last: -1.0,
            next_animation_last: -1.0,
            delay: 0.0,
            track_time: 0.0,
            track_last: -1.0,
            next_track_last: -1.0,
            track_end: f32::MAX,
            time_scale: 1.0,
            alpha: 1.0,
            mix_time: 0.0,
            mix_duration,
            interrupt_alpha: 1.0,
            total_alpha: 0.0,
            mix_blend: MixBlend::Replace,
            timeline_mode: Vec::new(),
            timeline_hold_mix: Vec::new(),
            timelines_rotation: Vec::new(),
        }
    }

    pub fn animation(&self) -> &Arc<Animation> {
        &self.animation
    }

    pub fn track_index(&self) -> usize {
        self.track_index
    }

    /// The entry queued to play after this one.
    pub fn next(&self) -> Option<TrackEntryHandle> {
        self.next.map(TrackEntryHandle::new)
    }

    /// The entry this one was queued after.
    pub fn previous(&self) -> Option<TrackEntryHandle> {
        self.previous.map(TrackEntryHandle::new)
    }

    /// The entry being mixed out while this one mixes in.
    pub fn mixing_from(&self) -> Option<TrackEntryHandle> {
        self.mixing_from.map(TrackEntryHandle::new)
    }

    /// The entry mixing in while this one mixes out.
    pub fn mixing_to(&self) -> Option<TrackEntryHandle> {
        self.mixing_to.map(TrackEntryHandle::new)
    }

    /// Replaces the listener notified for this entry only, before the global listeners.
    pub fn set_listener<L: AnimationStateListener + 'static>(&mut self, listener: L) {
        self.listener = Some(Box::new(listener));
        self.listener_generation = self.listener_generation.wrapping_add(1);
    }

    pub fn clear_listener(&mut self) {
        self.listener = None;
        self.listener_generation = self.listener_generation.wrapping_add(1);
    }

    /// Animation time at the last apply, `-1` before the first.
    pub fn animation_last(&self) -> f32 {
        self.animation_last
    }

    /// Sets the time events are fired from on the next apply.
    pub fn set_animation_last(&mut self, animation_last: f32) {
        self.animation_last = animation_last;
        self.next_animation_last = animation_last;
    }

    /// Track time at the last update, `-1` before the first.
    pub fn track_last(&self) -> f32 {
        self.track_last
    }

    pub fn interrupt_alpha(&self) -> f32 {
        self.interrupt_alpha
    }

    /// Sum of the alphas applied to this entry's timelines while it was last mixed out.
    pub fn total_alpha(&self) -> f32 {
        self.total_alpha
    }

    pub fn timeline_modes(&self) -> &[TimelineMode] {
        &self.timeline_mode
    }

    /// Forgets the rotation directions tracked while mixing, so the next mix takes the
    /// shortest way.
    pub fn reset_rotation_directions(&mut self) {
        self.timelines_rotation.clear();
    }

    /// Track time mapped into the animation, wrapped when looping and clamped to
    /// `animation_end` otherwise.
    pub fn animation_time(&self) -> f32 {
        if self.looped {
            let duration = self.animation_end - self.animation_start;
            if duration == 0.0 {
                return self.animation_start;
            }
            return self.track_time % duration + self.animation_start;
        }
        let animation_time = self.track_time + self.animation_start;
        if self.animation_end >= self.animation.duration() {
            animation_time
        } else {
            animation_time.min(self.animation_end)
        }
    }

    /// Track time at which the animation completes: the end of the current loop, or the end of
    /// the animation.
    pub fn track_complete(&self) -> f32 {
        let duration = self.animation_end - self.animation_start;
        if duration != 0.0 {
            if self.looped {
                return duration * (1.0 + (self.track_time / duration).trunc());
            }
            if self.track_time < duration {
                return duration;
            }
        }
        self.track_time
    }

    /// True once at least one full pass has played.
    pub fn is_complete(&self) -> bool {
        self.track_time >= self.animation_end - self.animation_start
    }

    /// True once the entry has been applied at least once.
    pub fn was_applied(&self) -> bool {
        self.next_track_last != -1.0
    }
}

/// Stable reference to a [`TrackEntry`]. Handles of disposed entries resolve to `None`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TrackEntryHandle {
    id: EntryId,
}

impl TrackEntryHandle {
    fn new(id: EntryId) -> Self {
        Self { id }
    }

    /// True if a queued next entry would become current on the next update.
    pub fn is_next_ready(self, state: &AnimationState) -> bool {
        let Some(entry) = state.entry(self.id) else {
            return false;
        };
        entry
            .next
            .and_then(|next| state.entry(next))
            .is_some_and(|next| entry.next_track_last - next.delay >= 0.0)
    }

    /// Sets the mix duration and recomputes the delay the way [`AnimationState::add_animation`]
    /// does when `delay <= 0`.
    pub fn set_mix_duration_with_delay(
        self,
        state: &mut AnimationState,
        mix_duration: f32,
        delay: f32,
    ) {
        let Some(entry) = state.entry(self.id) else {
            return;
        };
        let previous_complete = entry
            .previous
            .and_then(|p| state.entry(p))
            .map(TrackEntry::track_complete);
        let mut delay = delay;
        if delay <= 0.0 {
            delay = match previous_complete {
                Some(complete) => (delay + complete - mix_duration).max(0.0),
                None => 0.0,
            };
        }
        if let Some(entry) = state.entry_mut(self.id) {
            entry.mix_duration = mix_duration;
            entry.delay = delay;
        }
    }
}

/// Applies animations over time, queues animations for later playback, mixes (crossfades)
/// between animations, and layers animations on top of each other across tracks.
pub struct AnimationState {
    data: AnimationStateData,
    tracks: Vec<Option<EntryId>>,
    entries: Vec<EntrySlot>,
    free_list: Vec<usize>,
    events: Vec<Event>,
    queue: EventQueue,
    listeners: Listeners,
    property_ids: HashSet<PropertyId>,
    animations_changed: bool,
    time_scale: f32,
    unkeyed_state: i32,
    empty_animation: Arc<Animation>,
}

impl std::fmt::Debug for AnimationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimationState")
            .field("tracks", &self.tracks)
            .field("time_scale", &self.time_scale)
            .field("listeners", &self.listeners)
            .finish()
    }
}

impl AnimationState {
    pub fn new(data: AnimationStateData) -> Self {
        Self {
            data,
            tracks: Vec::new(),
            entries: Vec::new(),
            free_list: Vec::new(),
            events: Vec::new(),
            queue: EventQueue::default(),
            listeners: Listeners::default(),
            property_ids: HashSet::new(),
            animations_changed: false,
            time_scale: 1.0,
            unkeyed_state: 0,
            empty_animation: Arc::new(Animation::with_duration(
                EMPTY_ANIMATION_NAME,
                Vec::new(),
                0.0,
            )),
        }
    }

    pub fn data(&self) -> &AnimationStateData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut AnimationStateData {
        &mut self.data
    }

    /// Multiplier for the delta of every update.
    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    pub fn set_time_scale(&mut self, time_scale: f32) {
        self.time_scale = time_scale;
    }

    /// The keyless animation used by the empty animation operations.
    pub fn empty_animation(&self) -> &Arc<Animation> {
        &self.empty_animation
    }

    pub fn tracks_len(&self) -> usize {
        self.tracks.len()
    }

    /// The entry currently playing on a track.
    pub fn current(&self, track_index: usize) -> Option<TrackEntryHandle> {
        self.tracks
            .get(track_index)
            .copied()
            .flatten()
            .map(TrackEntryHandle::new)
    }

    pub fn track_entry(&self, handle: TrackEntryHandle) -> Option<&TrackEntry> {
        self.entry(handle.id)
    }

    pub fn track_entry_mut(&mut self, handle: TrackEntryHandle) -> Option<&mut TrackEntry> {
        self.entry_mut(handle.id)
    }

    pub fn add_listener<L: AnimationStateListener + 'static>(&mut self, listener: L) -> ListenerId {
        self.listeners.add(Box::new(listener))
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn clear_listeners(&mut self) {
        self.listeners.clear();
    }

    /// Drops every notification not yet delivered. Entries waiting on their dispose
    /// notification are still freed.
    pub fn clear_listener_notifications(&mut self) {
        let pending = self.queue.pending_disposals();
        self.queue.clear();
        for id in pending {
            self.free_entry(id);
        }
    }

    /// Sets the current animation for a track, discarding any queued animations. If a
    /// previous entry was current it is mixed out over the new entry's mix duration, unless
    /// it was never applied, in which case it is replaced outright.
    pub fn set_animation(
        &mut self,
        track_index: usize,
        animation: Arc<Animation>,
        looped: bool,
    ) -> TrackEntryHandle {
        let mut interrupt = true;
        let mut current = self.expand_to_index(track_index);
        if let Some(cur) = current {
            let (was_applied, mixing_from) = match self.entry(cur) {
                Some(entry) => (entry.was_applied(), entry.mixing_from),
                None => (true, None),
            };
            if !was_applied {
                log::debug!("track {track_index}: replacing entry that was never applied");
                self.tracks[track_index] = mixing_from;
                self.queue_event(cur, AnimationStateEvent::Interrupt);
                self.queue_event(cur, AnimationStateEvent::End);
                self.clear_next(cur);
                current = mixing_from;
                interrupt = false;
            } else {
                self.clear_next(cur);
            }
        }
        log::debug!("track {track_index}: set animation {}", animation.name());
        let entry = self.new_entry(track_index, animation, looped, current);
        self.set_current(track_index, entry, interrupt);
        self.drain();
        TrackEntryHandle::new(entry)
    }

    pub fn set_animation_by_name(
        &mut self,
        track_index: usize,
        animation_name: &str,
        looped: bool,
    ) -> Result<TrackEntryHandle, Error> {
        let animation = self.data.skeleton_data.find_animation(animation_name)?;
        Ok(self.set_animation(track_index, animation, looped))
    }

    /// Queues an animation after the last entry of a track, or sets it when the track is empty.
    /// A `delay <= 0` is relative to the end of the previous entry minus the mix duration.
    pub fn add_animation(
        &mut self,
        track_index: usize,
        animation: Arc<Animation>,
        looped: bool,
        delay: f32,
    ) -> TrackEntryHandle {
        let mut last = self.expand_to_index(track_index);
        while let Some(next) = last.and_then(|l| self.entry(l)).and_then(|e| e.next) {
            last = Some(next);
        }

        log::debug!("track {track_index}: queue animation {}", animation.name());
        let entry = self.new_entry(track_index, animation, looped, last);
        let mut delay = delay;
        match last {
            None => {
                self.set_current(track_index, entry, true);
                self.drain();
                if delay < 0.0 {
                    delay = 0.0;
                }
            }
            Some(last) => {
                let last_complete = self.entry(last).map_or(0.0, TrackEntry::track_complete);
                if let Some(l) = self.entry_mut(last) {
                    l.next = Some(entry);
                }
                if let Some(e) = self.entry_mut(entry) {
                    e.previous = Some(last);
                    if delay <= 0.0 {
                        delay = (delay + last_complete - e.mix_duration).max(0.0);
                    }
                }
            }
        }
        if let Some(e) = self.entry_mut(entry) {
            e.delay = delay;
        }
        TrackEntryHandle::new(entry)
    }

    pub fn add_animation_by_name(
        &mut self,
        track_index: usize,
        animation_name: &str,
        looped: bool,
        delay: f32,
    ) -> Result<TrackEntryHandle, Error> {
        let animation = self.data.skeleton_data.find_animation(animation_name)?;
        Ok(self.add_animation(track_index, animation, looped, delay))
    }

    /// Mixes the track out to the setup pose over `mix_duration`.
    pub fn set_empty_animation(&mut self, track_index: usize, mix_duration: f32) -> TrackEntryHandle {
        let empty = Arc::clone(&self.empty_animation);
        let handle = self.set_animation(track_index, empty, false);
        if let Some(entry) = self.entry_mut(handle.id) {
            entry.mix_duration = mix_duration;
            entry.track_end = mix_duration;
        }
        handle
    }

    /// Queues a mix out to the setup pose. A `delay <= 0` is relative to the end of the
    /// previous entry minus `mix_duration`.
    pub fn add_empty_animation(
        &mut self,
        track_index: usize,
        mix_duration: f32,
        delay: f32,
    ) -> TrackEntryHandle {
        let empty = Arc::clone(&self.empty_animation);
        let handle = self.add_animation(track_index, empty, false, delay);
        if let Some(entry) = self.entry_mut(handle.id) {
            if delay <= 0.0 {
                entry.delay = (entry.delay + entry.mix_duration - mix_duration).max(0.0);
            }
            entry.mix_duration = mix_duration;
            entry.track_end = mix_duration;
        }
        handle
    }

    /// Sets an empty animation on every track that has a current entry.
    pub fn set_empty_animations(&mut self, mix_duration: f32) {
        let old_drain_disabled = self.queue.drain_disabled;
        self.queue.drain_disabled = true;
        for track_index in 0..self.tracks.len() {
            if self.tracks[track_index].is_some() {
                self.set_empty_animation(track_index, mix_duration);
            }
        }
        self.queue.drain_disabled = old_drain_disabled;
        self.drain();
    }

    /// Removes every animation from every track, leaving the pose as it is.
    pub fn clear_tracks(&mut self) {
        let old_drain_disabled = self.queue.drain_disabled;
        self.queue.drain_disabled = true;
        for track_index in 0..self.tracks.len() {
            self.clear_track_entries(track_index);
        }
        self.tracks.clear();
        self.queue.drain_disabled = old_drain_disabled;
        self.drain();
    }

    /// Removes every animation from a track, leaving the pose as it is.
    pub fn clear_track(&mut self, track_index: usize) {
        self.clear_track_entries(track_index);
        self.drain();
    }

    /// Advances every track by `delta` seconds, promoting queued entries and ending finished
    /// mixes.
    pub fn update(&mut self, delta: f32) {
        let delta = delta * self.time_scale;
        for track_index in 0..self.tracks.len() {
            let Some(current) = self.tracks[track_index] else {
                continue;
            };
            let Some(cur) = self.entry_mut(current) else {
                continue;
            };
            cur.animation_last = cur.next_animation_last;
            cur.track_last = cur.next_track_last;

            let mut current_delta = delta * cur.time_scale;
            if cur.delay > 0.0 {
                cur.delay -= current_delta;
                if cur.delay > 0.0 {
                    continue;
                }
                current_delta = -cur.delay;
                cur.delay = 0.0;
            }
            let (next, track_last, time_scale, track_end, mixing_from) = (
                cur.next,
                cur.track_last,
                cur.time_scale,
                cur.track_end,
                cur.mixing_from,
            );

            if let Some(next) = next {
                // When the next entry's delay is passed, change to it.
                let next_delay = self.entry(next).map_or(0.0, |n| n.delay);
                let next_time = track_last - next_delay;
                if next_time >= 0.0 {
                    if let Some(n) = self.entry_mut(next) {
                        n.delay = 0.0;
                        n.track_time += if time_scale == 0.0 {
                            0.0
                        } else {
                            (next_time / time_scale + delta) * n.time_scale
                        };
                    }
                    if let Some(cur) = self.entry_mut(current) {
                        cur.track_time += current_delta;
                    }
                    log::debug!("track {track_index}: queued entry became current");
                    self.set_current(track_index, next, true);
                    let mut entry = next;
                    while let Some(from) = self.entry(entry).and_then(|e| e.mixing_from) {
                        if let Some(e) = self.entry_mut(entry) {
                            e.mix_time += delta;
                        }
                        entry = from;
                    }
                    continue;
                }
            } else if track_last >= track_end && mixing_from.is_none() {
                log::debug!("track {track_index}: track end reached");
                self.tracks[track_index] = None;
                self.queue_event(current, AnimationStateEvent::End);
                self.clear_next(current);
                continue;
            }

            if mixing_from.is_some() && self.update_mixing_from(current, delta) {
                log::debug!("track {track_index}: mix complete");
                let mut from = self.entry_mut(current).and_then(|e| e.mixing_from.take());
                if let Some(f) = from.and_then(|f| self.entry_mut(f)) {
                    f.mixing_to = None;
                }
                while let Some(f) = from {
                    self.queue_event(f, AnimationStateEvent::End);
                    from = self.entry(f).and_then(|e| e.mixing_from);
                }
            }

            if let Some(cur) = self.entry_mut(current) {
                cur.track_time += current_delta;
            }
        }
        self.drain();
    }

    /// Poses the skeleton using every track's current entry and the entries it mixes from.
    /// Returns true if any entry was applied.
    pub fn apply(&mut self, skeleton: &mut Skeleton) -> bool {
        if self.animations_changed {
            self.animations_changed();
        }

        let mut applied = false;
        for track_index in 0..self.tracks.len() {
            let Some(current) = self.tracks[track_index] else {
                continue;
            };
            let Some(cur) = self.entry(current) else {
                continue;
            };
            if cur.delay > 0.0 {
                continue;
            }
            applied = true;

            // Track 0 animations aren't for layering, so never use current values before the
            // first key.
            let blend = if track_index == 0 {
                MixBlend::First
            } else {
                cur.mix_blend
            };

            let mut alpha = cur.alpha;
            if cur.mixing_from.is_some() {
                alpha *= self.apply_mixing_from(current, skeleton, blend);
            } else if cur.track_time >= cur.track_end && cur.next.is_none() {
                alpha = 0.0;
            }

            let unkeyed_state = self.unkeyed_state;
            let mut events = std::mem::take(&mut self.events);
            let Some(cur) = self.entry_mut(current) else {
                continue;
            };
            let mut attachments = alpha >= cur.alpha_attachment_threshold;
            let animation = Arc::clone(&cur.animation);
            let animation_last = cur.animation_last;
            let animation_time = cur.animation_time();
            let track_time = cur.track_time;
            let shortest_rotation = cur.shortest_rotation;
            let reverse = cur.reverse;
            let apply_time = if reverse {
                animation.duration() - animation_time
            } else {
                animation_time
            };
            let timelines = animation.timelines();

            if (track_index == 0 && alpha == 1.0) || blend == MixBlend::Add {
                if track_index == 0 {
                    attachments = true;
                }
                for timeline in timelines {
                    match timeline {
                        Timeline::Attachment(t) => apply_attachment_timeline(
                            t,
                            skeleton,
                            apply_time,
                            blend,
                            attachments,
                            unkeyed_state,
                        ),
                        _ => timeline.apply(
                            skeleton,
                            animation_last,
                            apply_time,
                            (!reverse).then_some(&mut events),
                            alpha,
                            blend,
                            MixDirection::In,
                        ),
                    }
                }
            } else {
                let modes = std::mem::take(&mut cur.timeline_mode);
                let mut rotations = std::mem::take(&mut cur.timelines_rotation);
                let first_frame = !shortest_rotation && rotations.len() != timelines.len() << 1;
                if first_frame {
                    rotations.resize(timelines.len() << 1, 0.0);
                }
                for (ii, timeline) in timelines.iter().enumerate() {
                    let mode = modes.get(ii).copied().unwrap_or(TimelineMode::Subsequent);
                    let timeline_blend = if mode == TimelineMode::Subsequent {
                        blend
                    } else {
                        MixBlend::Setup
                    };
                    if !shortest_rotation {
                        if let Some(rotate) = timeline.as_rotate() {
                            apply_rotate_timeline(
                                rotate,
                                skeleton,
                                apply_time,
                                alpha,
                                timeline_blend,
                                &mut rotations,
                                ii << 1,
                                first_frame,
                            );
                            continue;
                        }
                    }
                    match timeline {
                        Timeline::Attachment(t) => apply_attachment_timeline(
                            t,
                            skeleton,
                            apply_time,
                            blend,
                            attachments,
                            unkeyed_state,
                        ),
                        _ => timeline.apply(
                            skeleton,
                            animation_last,
                            apply_time,
                            (!reverse).then_some(&mut events),
                            alpha,
                            timeline_blend,
                            MixDirection::In,
                        ),
                    }
                }
                if let Some(cur) = self.entry_mut(current) {
                    cur.timeline_mode = modes;
                    cur.timelines_rotation = rotations;
                }
            }

            self.queue_track_events(current, animation_time, &events);
            events.clear();
            self.events = events;
            if let Some(cur) = self.entry_mut(current) {
                cur.next_animation_last = animation_time;
                cur.next_track_last = track_time;
            }
        }

        // Slots keyed by an entry that was mixed out without setting an attachment go back
        // to setup.
        let setup_state = self.unkeyed_state + SETUP;
        for slot_index in 0..skeleton.slots.len() {
            if skeleton.slots[slot_index].attachment_state == setup_state {
                skeleton.set_slot_to_setup_attachment(slot_index);
            }
        }
        self.unkeyed_state += 2;

        self.drain();
        applied
    }

    fn apply_mixing_from(&mut self, to: EntryId, skeleton: &mut Skeleton, blend: MixBlend) -> f32 {
        let Some(from) = self.entry(to).and_then(|e| e.mixing_from) else {
            return 1.0;
        };
        if self.entry(from).is_some_and(|f| f.mixing_from.is_some()) {
            self.apply_mixing_from(from, skeleton, blend);
        }

        let Some(to_entry) = self.entry(to) else {
            return 1.0;
        };
        let (to_mix_duration, to_mix_time, to_interrupt_alpha) = (
            to_entry.mix_duration,
            to_entry.mix_time,
            to_entry.interrupt_alpha,
        );

        // Hold mixes read the mix progress of later entries.
        let hold_mix_factors: Vec<f32> = match self.entry(from) {
            Some(f) => f
                .timeline_hold_mix
                .iter()
                .map(|hold| {
                    hold.and_then(|h| self.entry(h)).map_or(0.0, |h| {
                        (1.0 - h.mix_time / h.mix_duration).max(0.0)
                    })
                })
                .collect(),
            None => return 1.0,
        };

        let unkeyed_state = self.unkeyed_state;
        let mut events = std::mem::take(&mut self.events);
        let Some(f) = self.entry_mut(from) else {
            self.events = events;
            return 1.0;
        };

        let mut blend = blend;
        let mix = if to_mix_duration == 0.0 {
            // Single frame mix to undo the mixing out entry's changes.
            if blend == MixBlend::First {
                blend = MixBlend::Setup;
            }
            1.0
        } else {
            if blend != MixBlend::First {
                blend = f.mix_blend;
            }
            (to_mix_time / to_mix_duration).min(1.0)
        };

        let attachments = mix < f.mix_attachment_threshold;
        let draw_order = mix < f.mix_draw_order_threshold;
        let animation = Arc::clone(&f.animation);
        let timelines = animation.timelines();
        let alpha_hold = f.alpha * to_interrupt_alpha;
        let alpha_mix = alpha_hold * (1.0 - mix);
        let animation_last = f.animation_last;
        let animation_time = f.animation_time();
        let track_time = f.track_time;
        let alpha_attachment_threshold = f.alpha_attachment_threshold;
        let collect_events = !f.reverse && mix < f.event_threshold;
        let apply_time = if f.reverse {
            animation.duration() - animation_time
        } else {
            animation_time
        };

        if blend == MixBlend::Add {
            for timeline in timelines {
                timeline.apply(
                    skeleton,
                    animation_last,
                    apply_time,
                    collect_events.then_some(&mut events),
                    alpha_mix,
                    blend,
                    MixDirection::Out,
                );
            }
        } else {
            let shortest_rotation = f.shortest_rotation;
            let modes = std::mem::take(&mut f.timeline_mode);
            let mut rotations = std::mem::take(&mut f.timelines_rotation);
            let first_frame = !shortest_rotation && rotations.len() != timelines.len() << 1;
            if first_frame {
                rotations.resize(timelines.len() << 1, 0.0);
            }

            let mut total_alpha = 0.0;
            for (i, timeline) in timelines.iter().enumerate() {
                let mode = modes.get(i).copied().unwrap_or(TimelineMode::Subsequent);
                let (timeline_blend, alpha) = match mode {
                    TimelineMode::Subsequent => {
                        if !draw_order && matches!(timeline, Timeline::DrawOrder(_)) {
                            continue;
                        }
                        (blend, alpha_mix)
                    }
                    TimelineMode::First => (MixBlend::Setup, alpha_mix),
                    TimelineMode::HoldSubsequent => (blend, alpha_hold),
                    TimelineMode::HoldFirst => (MixBlend::Setup, alpha_hold),
                    TimelineMode::HoldMix => (
                        MixBlend::Setup,
                        alpha_hold * hold_mix_factors.get(i).copied().unwrap_or(0.0),
                    ),
                };
                total_alpha += alpha;

                if !shortest_rotation {
                    if let Some(rotate) = timeline.as_rotate() {
                        apply_rotate_timeline(
                            rotate,
                            skeleton,
                            apply_time,
                            alpha,
                            timeline_blend,
                            &mut rotations,
                            i << 1,
                            first_frame,
                        );
                        continue;
                    }
                }
                match timeline {
                    Timeline::Attachment(t) => apply_attachment_timeline(
                        t,
                        skeleton,
                        apply_time,
                        timeline_blend,
                        attachments && alpha >= alpha_attachment_threshold,
                        unkeyed_state,
                    ),
                    _ => {
                        let direction = if draw_order
                            && matches!(timeline, Timeline::DrawOrder(_))
                            && timeline_blend == MixBlend::Setup
                        {
                            MixDirection::In
                        } else {
                            MixDirection::Out
                        };
                        timeline.apply(
                            skeleton,
                            animation_last,
                            apply_time,
                            collect_events.then_some(&mut events),
                            alpha,
                            timeline_blend,
                            direction,
                        );
                    }
                }
            }

            if let Some(f) = self.entry_mut(from) {
                f.timeline_mode = modes;
                f.timelines_rotation = rotations;
                f.total_alpha = total_alpha;
            }
        }

        if to_mix_duration > 0.0 {
            self.queue_track_events(from, animation_time, &events);
        }
        events.clear();
        self.events = events;
        if let Some(f) = self.entry_mut(from) {
            f.next_animation_last = animation_time;
            f.next_track_last = track_time;
        }
        mix
    }

    /// Returns true when every entry `to` mixes from has finished mixing out.
    fn update_mixing_from(&mut self, to: EntryId, delta: f32) -> bool {
        let Some(from) = self.entry(to).and_then(|e| e.mixing_from) else {
            return true;
        };
        let finished = self.update_mixing_from(from, delta);

        let Some(f) = self.entry_mut(from) else {
            return finished;
        };
        f.animation_last = f.next_animation_last;
        f.track_last = f.next_track_last;
        let (from_total_alpha, from_interrupt_alpha, from_mixing_from, from_time_scale) = (
            f.total_alpha,
            f.interrupt_alpha,
            f.mixing_from,
            f.time_scale,
        );

        let Some(t) = self.entry_mut(to) else {
            return finished;
        };
        // The from entry was applied at least once and the mix is complete.
        if t.next_track_last != -1.0 && t.mix_time >= t.mix_duration {
            // Mixing is complete for every entry before the from entry, or the mix is
            // instantaneous.
            if from_total_alpha == 0.0 || t.mix_duration == 0.0 {
                t.mixing_from = from_mixing_from;
                t.interrupt_alpha = from_interrupt_alpha;
                if let Some(ff) = from_mixing_from.and_then(|ff| self.entry_mut(ff)) {
                    ff.mixing_to = Some(to);
                }
                self.queue_event(from, AnimationStateEvent::End);
            }
            return finished;
        }

        t.mix_time += delta;
        if let Some(f) = self.entry_mut(from) {
            f.track_time += delta * from_time_scale;
        }
        false
    }

    /// Queues the events fired by an apply, with `complete` between events before and after the
    /// loop boundary.
    fn queue_track_events(&mut self, id: EntryId, animation_time: f32, events: &[Event]) {
        let Some(entry) = self.entry(id) else {
            return;
        };
        let animation_start = entry.animation_start;
        let animation_end = entry.animation_end;
        let duration = animation_end - animation_start;
        let track_last_wrapped = entry.track_last % duration;

        let complete = if entry.looped {
            if duration == 0.0 {
                true
            } else {
                let cycles = (entry.track_time / duration).floor();
                cycles > 0.0 && cycles > (entry.track_last / duration).floor()
            }
        } else {
            animation_time >= animation_end && entry.animation_last < animation_end
        };

        let mut i = 0;
        while i < events.len() {
            let event = &events[i];
            if event.time < track_last_wrapped {
                break;
            }
            i += 1;
            if event.time > animation_end {
                continue;
            }
            self.queue_event(id, AnimationStateEvent::Event(event.clone()));
        }

        if complete {
            self.queue_event(id, AnimationStateEvent::Complete);
        }

        for event in &events[i..] {
            if event.time < animation_start {
                continue;
            }
            self.queue_event(id, AnimationStateEvent::Event(event.clone()));
        }
    }

    fn set_current(&mut self, track_index: usize, current: EntryId, interrupt: bool) {
        let from = self.expand_to_index(track_index);
        self.tracks[track_index] = Some(current);
        if let Some(entry) = self.entry_mut(current) {
            entry.previous = None;
        }

        if let Some(from) = from {
            if interrupt {
                self.queue_event(from, AnimationStateEvent::Interrupt);
            }
            let (from_mixing, from_mix_time, from_mix_duration) = match self.entry_mut(from) {
                Some(f) => {
                    f.mixing_to = Some(current);
                    f.timelines_rotation.clear();
                    (f.mixing_from.is_some(), f.mix_time, f.mix_duration)
                }
                None => (false, 0.0, 0.0),
            };
            if let Some(entry) = self.entry_mut(current) {
                entry.mixing_from = Some(from);
                entry.mix_time = 0.0;
                // Store the interrupted mix percentage.
                if from_mixing && from_mix_duration > 0.0 {
                    entry.interrupt_alpha *= (from_mix_time / from_mix_duration).min(1.0);
                }
            }
        }

        self.queue_event(current, AnimationStateEvent::Start);
    }

    fn clear_track_entries(&mut self, track_index: usize) {
        let Some(current) = self.tracks.get(track_index).copied().flatten() else {
            return;
        };
        log::debug!("track {track_index}: cleared");
        self.queue_event(current, AnimationStateEvent::End);
        self.clear_next(current);

        let mut entry = current;
        while let Some(from) = self.entry(entry).and_then(|e| e.mixing_from) {
            self.queue_event(from, AnimationStateEvent::End);
            if let Some(e) = self.entry_mut(entry) {
                e.mixing_from = None;
                e.mixing_to = None;
            }
            if let Some(f) = self.entry_mut(from) {
                f.mixing_to = None;
            }
            entry = from;
        }
        self.tracks[track_index] = None;
    }

    /// Disposes every entry queued after `id`.
    fn clear_next(&mut self, id: EntryId) {
        let mut next = self.entry_mut(id).and_then(|e| e.next.take());
        while let Some(n) = next {
            next = self.entry(n).and_then(|e| e.next);
            self.queue_event(n, AnimationStateEvent::Dispose);
        }
    }

    fn new_entry(
        &mut self,
        track_index: usize,
        animation: Arc<Animation>,
        looped: bool,
        last: Option<EntryId>,
    ) -> EntryId {
        let mix_duration = match last.and_then(|l| self.entry(l)) {
            Some(last) => self.data.mix(&last.animation, &animation),
            None => 0.0,
        };
        self.alloc_entry(TrackEntry::new(track_index, animation, looped, mix_duration))
    }

    fn expand_to_index(&mut self, track_index: usize) -> Option<EntryId> {
        if track_index >= self.tracks.len() {
            self.tracks.resize(track_index + 1, None);
        }
        self.tracks[track_index]
    }

    fn animations_changed(&mut self) {
        self.animations_changed = false;
        self.property_ids.clear();
        for track_index in 0..self.tracks.len() {
            let Some(mut entry) = self.tracks[track_index] else {
                continue;
            };
            while let Some(from) = self.entry(entry).and_then(|e| e.mixing_from) {
                entry = from;
            }
            loop {
                let Some(e) = self.entry(entry) else {
                    break;
                };
                let (mixing_to, mix_blend) = (e.mixing_to, e.mix_blend);
                if mixing_to.is_none() || mix_blend != MixBlend::Add {
                    self.compute_hold(entry);
                }
                match mixing_to {
                    Some(next) => entry = next,
                    None => break,
                }
            }
        }
        log::trace!("timeline modes recomputed for {} properties", self.property_ids.len());
    }

    /// Returns true if any of `ids` was not yet claimed by a lower entry.
    fn add_property_ids(&mut self, ids: &[PropertyId]) -> bool {
        let mut added = false;
        for id in ids {
            added |= self.property_ids.insert(*id);
        }
        added
    }

    fn compute_hold(&mut self, id: EntryId) {
        let Some(entry) = self.entry(id) else {
            return;
        };
        let to = entry.mixing_to;
        let animation = Arc::clone(&entry.animation);
        let timelines = animation.timelines();
        let mut modes = Vec::with_capacity(timelines.len());
        let mut hold_mix = vec![None; timelines.len()];

        if to.and_then(|t| self.entry(t)).is_some_and(|t| t.hold_previous) {
            for ii in 0..timelines.len() {
                let ids = animation.timeline_property_ids(ii);
                modes.push(if self.add_property_ids(ids) {
                    TimelineMode::HoldFirst
                } else {
                    TimelineMode::HoldSubsequent
                });
            }
        } else {
            'outer: for (ii, timeline) in timelines.iter().enumerate() {
                let ids = animation.timeline_property_ids(ii);
                if !self.add_property_ids(ids) {
                    modes.push(TimelineMode::Subsequent);
                    continue;
                }
                let to_entry = to.and_then(|t| self.entry(t));
                let discrete = matches!(
                    timeline,
                    Timeline::Attachment(_) | Timeline::DrawOrder(_) | Timeline::Event(_)
                );
                let Some(to_entry) = to_entry.filter(|t| !discrete && t.animation.has_timeline(ids))
                else {
                    modes.push(TimelineMode::First);
                    continue;
                };
                let mut next = to_entry.mixing_to;
                while let Some(n) = next.and_then(|n| self.entry(n).map(|e| (n, e))) {
                    let (next_id, next_entry) = n;
                    if next_entry.animation.has_timeline(ids) {
                        next = next_entry.mixing_to;
                        continue;
                    }
                    if next_entry.mix_duration > 0.0 {
                        modes.push(TimelineMode::HoldMix);
                        hold_mix[ii] = Some(next_id);
                        continue 'outer;
                    }
                    break;
                }
                modes.push(TimelineMode::HoldFirst);
            }
        }

        if let Some(entry) = self.entry_mut(id) {
            entry.timeline_mode = modes;
            entry.timeline_hold_mix = hold_mix;
        }
    }

    fn queue_event(&mut self, id: EntryId, event: AnimationStateEvent) {
        if matches!(
            event,
            AnimationStateEvent::Start | AnimationStateEvent::End
        ) {
            self.animations_changed = true;
        }
        self.queue.push(id, event);
    }

    /// Delivers queued notifications. Notifications queued by listeners during delivery are
    /// delivered by the same call.
    fn drain(&mut self) {
        if self.queue.drain_disabled {
            return;
        }
        self.queue.drain_disabled = true;
        log::trace!("draining {} notifications", self.queue.len());

        let mut i = 0;
        while let Some(queued) = self.queue.get(i).cloned() {
            i += 1;
            let id = queued.entry;
            match queued.event {
                AnimationStateEvent::End => {
                    self.deliver(id, &AnimationStateEvent::End);
                    self.deliver(id, &AnimationStateEvent::Dispose);
                    self.free_entry(id);
                }
                AnimationStateEvent::Dispose => {
                    self.deliver(id, &AnimationStateEvent::Dispose);
                    self.free_entry(id);
                }
                event => self.deliver(id, &event),
            }
        }

        self.queue.clear();
        self.queue.drain_disabled = false;
    }

    fn deliver(&mut self, id: EntryId, event: &AnimationStateEvent) {
        if self.entry(id).is_none() {
            return;
        }
        let handle = TrackEntryHandle::new(id);

        let taken = self
            .entry_mut(id)
            .and_then(|e| e.listener.take().map(|l| (l, e.listener_generation)));
        if let Some((mut listener, generation)) = taken {
            listener.on_event(self, handle, event);
            // Restore only if the callback left its listener alone.
            if let Some(entry) = self.entry_mut(id) {
                if entry.listener_generation == generation {
                    entry.listener = Some(listener);
                }
            }
        }

        let mut listeners = self.listeners.lend();
        for (listener_id, listener) in listeners.iter_mut() {
            if self.listeners.is_removed(*listener_id) {
                continue;
            }
            listener.on_event(self, handle, event);
        }
        self.listeners.restore(listeners);
    }

    fn alloc_entry(&mut self, entry: TrackEntry) -> EntryId {
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.entries[index];
            slot.entry = Some(entry);
            EntryId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.entries.len();
            self.entries.push(EntrySlot {
                generation: 0,
                entry: Some(entry),
            });
            EntryId {
                index,
                generation: 0,
            }
        }
    }

    fn entry(&self, id: EntryId) -> Option<&TrackEntry> {
        let slot = self.entries.get(id.index)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    fn entry_mut(&mut self, id: EntryId) -> Option<&mut TrackEntry> {
        let slot = self.entries.get_mut(id.index)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_mut()
    }

    fn free_entry(&mut self, id: EntryId) {
        let Some(slot) = self.entries.get_mut(id.index) else {
            return;
        };
        if slot.generation != id.generation || slot.entry.is_none() {
            return;
        }
        slot.entry = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(id.index);
    }

    /// Number of entries alive in the pool.
    #[cfg(test)]
    pub(crate) fn live_entries(&self) -> usize {
        self.entries.iter().filter(|s| s.entry.is_some()).count()
    }
}

/// Attachment keys applied by the track engine. Slots keyed this apply are marked so that
/// slots only keyed by mixed out entries can be restored to setup afterwards.
fn apply_attachment_timeline(
    timeline: &AttachmentTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    blend: MixBlend,
    attachments: bool,
    unkeyed_state: i32,
) {
    let slot_index = timeline.slot_index();
    if !slot_bone_active(skeleton, slot_index) {
        return;
    }

    match timeline.keyed_attachment(time) {
        Some(name) => {
            set_attachment(skeleton, slot_index, name, attachments, unkeyed_state);
        }
        None => {
            if matches!(blend, MixBlend::Setup | MixBlend::First) {
                let data = Arc::clone(&skeleton.data);
                let name = data
                    .slots
                    .get(slot_index)
                    .and_then(|s| s.attachment.as_deref());
                set_attachment(skeleton, slot_index, name, attachments, unkeyed_state);
            }
        }
    }

    if let Some(slot) = skeleton.slots.get_mut(slot_index) {
        if slot.attachment_state <= unkeyed_state {
            slot.attachment_state = unkeyed_state + SETUP;
        }
    }
}

fn set_attachment(
    skeleton: &mut Skeleton,
    slot_index: usize,
    name: Option<&str>,
    attachments: bool,
    unkeyed_state: i32,
) {
    skeleton.set_slot_attachment(slot_index, name);
    if attachments {
        if let Some(slot) = skeleton.slots.get_mut(slot_index) {
            slot.attachment_state = unkeyed_state + CURRENT;
        }
    }
}

/// Mixes a rotation, remembering per timeline which way it was turning so the mix does not
/// flip direction when the shortest way crosses 180 degrees. `rotations[i]` holds the total
/// applied so far and `rotations[i + 1]` the last difference.
#[allow(clippy::too_many_arguments)]
fn apply_rotate_timeline(
    timeline: &BoneTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
    rotations: &mut [f32],
    i: usize,
    first_frame: bool,
) {
    if first_frame {
        rotations[i] = 0.0;
    }
    if alpha == 1.0 {
        timeline.apply(skeleton, time, 1.0, blend, MixDirection::In);
        return;
    }

    let bone_index = timeline.bone_index();
    let Some(setup_rotation) = skeleton.data.bones.get(bone_index).map(|b| b.rotation) else {
        return;
    };
    let Some(bone) = skeleton.bones.get_mut(bone_index) else {
        return;
    };
    if !bone.active {
        return;
    }
    let frames = timeline.frames();
    let Some(first) = frames.first_time() else {
        return;
    };

    let (r1, r2) = if time < first {
        match blend {
            MixBlend::Setup => {
                bone.rotation = setup_rotation;
                return;
            }
            MixBlend::First => (bone.rotation, setup_rotation),
            _ => return,
        }
    } else {
        let r1 = if blend == MixBlend::Setup {
            setup_rotation
        } else {
            bone.rotation
        };
        (r1, setup_rotation + frames.curve_value(time))
    };

    let mut diff = r2 - r1;
    diff -= (diff / 360.0 - 0.5).ceil() * 360.0;
    let total = if diff == 0.0 {
        rotations[i]
    } else {
        let (last_total, last_diff) = if first_frame {
            (0.0, diff)
        } else {
            (rotations[i], rotations[i + 1])
        };
        let loops = last_total - last_total % 360.0;
        let mut total = diff + loops;
        let current = diff >= 0.0;
        let mut dir = last_total >= 0.0;
        if last_diff.abs() <= 90.0 && signum(last_diff) != signum(diff) {
            if (last_total - loops).abs() > 180.0 {
                total += 360.0 * signum(last_total);
                dir = current;
            } else if loops != 0.0 {
                total -= 360.0 * signum(last_total);
            } else {
                dir = current;
            }
        }
        if dir != current {
            total += 360.0 * signum(last_total);
        }
        rotations[i] = total;
        total
    };
    rotations[i + 1] = diff;
    bone.rotation = r1 + total * alpha;
}
