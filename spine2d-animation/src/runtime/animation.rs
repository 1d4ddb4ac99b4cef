use crate::{Event, PropertyId, Skeleton, Timeline};
use std::collections::HashSet;

/// How a timeline's keyed value combines with the current pose.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum MixBlend {
    /// Mix from the setup value. Before the first key the setup value is set.
    Setup,
    /// Like `Replace`, but before the first key the pose mixes back toward setup.
    First,
    /// Mix from the current value. Before the first key the pose is left alone.
    #[default]
    Replace,
    /// Add the keyed offset from setup to the current value.
    Add,
}

/// Whether the timeline is being mixed in or out. Only discrete timelines care.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum MixDirection {
    In,
    Out,
}

/// A named, immutable set of timelines. Shared between track entries and skeletons through
/// `Arc`.
#[derive(Clone, Debug)]
pub struct Animation {
    name: String,
    timelines: Vec<Timeline>,
    timeline_ids: Vec<Vec<PropertyId>>,
    property_ids: HashSet<PropertyId>,
    duration: f32,
}

impl Animation {
    /// The duration is the time of the last key of any timeline.
    pub fn new(name: impl Into<String>, timelines: Vec<Timeline>) -> Self {
        let duration = timelines
            .iter()
            .map(Timeline::duration)
            .fold(0.0f32, f32::max);
        Self::with_duration(name, timelines, duration)
    }

    pub fn with_duration(name: impl Into<String>, timelines: Vec<Timeline>, duration: f32) -> Self {
        let timeline_ids: Vec<Vec<PropertyId>> =
            timelines.iter().map(Timeline::property_ids).collect();
        let property_ids = timeline_ids.iter().flatten().copied().collect();
        Self {
            name: name.into(),
            timelines,
            timeline_ids,
            property_ids,
            duration,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn duration(&self) -> f32 {
        self.duration
    }

    pub fn timelines(&self) -> &[Timeline] {
        &self.timelines
    }

    /// Every property any timeline of this animation writes.
    pub fn property_ids(&self) -> &HashSet<PropertyId> {
        &self.property_ids
    }

    /// Property ids of the timeline at `index`.
    pub fn timeline_property_ids(&self, index: usize) -> &[PropertyId] {
        self.timeline_ids.get(index).map_or(&[], Vec::as_slice)
    }

    /// True if any of `ids` is keyed by this animation.
    pub fn has_timeline(&self, ids: &[PropertyId]) -> bool {
        ids.iter().any(|id| self.property_ids.contains(id))
    }

    /// Applies every timeline at `time`. When `looped` and the duration is non-zero, both times
    /// wrap into the animation. Events keyed in `(last_time, time]` are pushed to `events`.
    #[allow(clippy::too_many_arguments)]
    pub fn apply(
        &self,
        skeleton: &mut Skeleton,
        last_time: f32,
        time: f32,
        looped: bool,
        mut events: Option<&mut Vec<Event>>,
        alpha: f32,
        blend: MixBlend,
        direction: MixDirection,
    ) {
        let (mut last_time, mut time) = (last_time, time);
        if looped && self.duration != 0.0 {
            time %= self.duration;
            if last_time > 0.0 {
                last_time %= self.duration;
            }
        }
        for timeline in &self.timelines {
            timeline.apply(
                skeleton,
                last_time,
                time,
                events.as_deref_mut(),
                alpha,
                blend,
                direction,
            );
        }
    }
}
