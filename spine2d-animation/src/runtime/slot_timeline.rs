use super::curve::{CurveFrames, search};
use super::skeleton::slot_attachment_data;
use crate::{Error, Event, MixBlend, MixDirection, SequenceData, Skeleton, VertexAttachmentData};
use std::sync::Arc;

/// Small bias added to sequence frame arithmetic so a time landing exactly on a frame boundary
/// does not truncate to the previous frame.
const SEQUENCE_EPSILON: f32 = 0.0001;

pub(crate) fn slot_bone_active(skeleton: &Skeleton, slot_index: usize) -> bool {
    skeleton
        .slots
        .get(slot_index)
        .and_then(|slot| skeleton.bones.get(slot.bone))
        .is_some_and(|bone| bone.active)
}

fn clamp01(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ColorTimelineKind {
    Rgba,
    Rgb,
    Alpha,
    /// Light RGBA plus dark RGB.
    Rgba2,
    /// Light RGB plus dark RGB.
    Rgb2,
}

impl ColorTimelineKind {
    fn light_channels(self) -> &'static [usize] {
        match self {
            ColorTimelineKind::Rgba | ColorTimelineKind::Rgba2 => &[0, 1, 2, 3],
            ColorTimelineKind::Rgb | ColorTimelineKind::Rgb2 => &[0, 1, 2],
            ColorTimelineKind::Alpha => &[3],
        }
    }

    fn has_dark(self) -> bool {
        matches!(self, ColorTimelineKind::Rgba2 | ColorTimelineKind::Rgb2)
    }

    fn value_count(self) -> usize {
        self.light_channels().len() + if self.has_dark() { 3 } else { 0 }
    }
}

/// Keys a slot's light color and, for the two-color kinds, its dark color. Values are in
/// `0..=1`; light channels are clamped when written.
#[derive(Clone, Debug)]
pub struct ColorTimeline {
    kind: ColorTimelineKind,
    slot_index: usize,
    frames: CurveFrames,
}

impl ColorTimeline {
    pub fn new(
        kind: ColorTimelineKind,
        frame_count: usize,
        bezier_count: usize,
        slot_index: usize,
    ) -> Self {
        Self {
            kind,
            slot_index,
            frames: CurveFrames::new(frame_count, bezier_count, 1 + kind.value_count()),
        }
    }

    pub fn kind(&self) -> ColorTimelineKind {
        self.kind
    }

    pub fn slot_index(&self) -> usize {
        self.slot_index
    }

    pub fn frames(&self) -> &CurveFrames {
        &self.frames
    }

    pub fn frames_mut(&mut self) -> &mut CurveFrames {
        &mut self.frames
    }

    /// Light channels first, then dark `r, g, b` for the two-color kinds.
    ///
    /// Panics if `frame` is not below the frame count.
    pub fn set_frame(&mut self, frame: usize, time: f32, values: &[f32]) {
        self.frames.set_frame(frame, time, values);
    }

    pub(crate) fn property_ids(&self) -> Vec<crate::PropertyId> {
        use crate::{Property, PropertyId};
        let s = self.slot_index;
        match self.kind {
            ColorTimelineKind::Rgba => vec![
                PropertyId::new(Property::Rgb, s),
                PropertyId::new(Property::Alpha, s),
            ],
            ColorTimelineKind::Rgb => vec![PropertyId::new(Property::Rgb, s)],
            ColorTimelineKind::Alpha => vec![PropertyId::new(Property::Alpha, s)],
            ColorTimelineKind::Rgba2 => vec![
                PropertyId::new(Property::Rgb, s),
                PropertyId::new(Property::Alpha, s),
                PropertyId::new(Property::Rgb2, s),
            ],
            ColorTimelineKind::Rgb2 => vec![
                PropertyId::new(Property::Rgb, s),
                PropertyId::new(Property::Rgb2, s),
            ],
        }
    }

    pub(crate) fn apply(&self, skeleton: &mut Skeleton, time: f32, alpha: f32, blend: MixBlend) {
        if !slot_bone_active(skeleton, self.slot_index) {
            return;
        }
        let Some(setup) = skeleton.data.slots.get(self.slot_index) else {
            return;
        };
        let Some(slot) = skeleton.slots.get_mut(self.slot_index) else {
            return;
        };
        let Some(first) = self.frames.first_time() else {
            return;
        };
        let light = self.kind.light_channels();
        let dark = self.kind.has_dark();

        if time < first {
            match blend {
                MixBlend::Setup => {
                    for &c in light {
                        slot.color[c] = setup.color[c];
                    }
                    if dark {
                        slot.dark_color = setup.dark_color;
                    }
                }
                MixBlend::First => {
                    for &c in light {
                        slot.color[c] =
                            clamp01(slot.color[c] + (setup.color[c] - slot.color[c]) * alpha);
                    }
                    if dark {
                        for c in 0..3 {
                            slot.dark_color[c] +=
                                (setup.dark_color[c] - slot.dark_color[c]) * alpha;
                        }
                    }
                }
                _ => {}
            }
            return;
        }

        let i = search(self.frames.frames(), time, self.frames.entries());
        let mut values = [0.0f32; 7];
        for (offset, value) in values.iter_mut().take(self.kind.value_count()).enumerate() {
            *value = self.frames.value_at(time, i, offset + 1);
        }
        let (light_values, dark_values) = values.split_at(light.len());

        if alpha == 1.0 {
            for (&c, v) in light.iter().zip(light_values) {
                slot.color[c] = clamp01(*v);
            }
            if dark {
                slot.dark_color.copy_from_slice(&dark_values[..3]);
            }
            return;
        }

        if blend == MixBlend::Setup {
            for &c in light {
                slot.color[c] = setup.color[c];
            }
            if dark {
                slot.dark_color = setup.dark_color;
            }
        }
        for (&c, v) in light.iter().zip(light_values) {
            slot.color[c] = clamp01(slot.color[c] + (*v - slot.color[c]) * alpha);
        }
        if dark {
            for (c, v) in dark_values.iter().take(3).enumerate() {
                slot.dark_color[c] += (*v - slot.dark_color[c]) * alpha;
            }
        }
    }
}

/// Keys which attachment a slot shows. `None` keys hide the slot's attachment.
#[derive(Clone, Debug)]
pub struct AttachmentTimeline {
    slot_index: usize,
    frames: Vec<f32>,
    attachment_names: Vec<Option<String>>,
}

impl AttachmentTimeline {
    pub fn new(frame_count: usize, slot_index: usize) -> Self {
        Self {
            slot_index,
            frames: vec![0.0; frame_count],
            attachment_names: vec![None; frame_count],
        }
    }

    pub fn slot_index(&self) -> usize {
        self.slot_index
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[f32] {
        &self.frames
    }

    pub fn duration(&self) -> f32 {
        self.frames.last().copied().unwrap_or(0.0)
    }

    /// Panics if `frame` is not below the frame count.
    pub fn set_frame(&mut self, frame: usize, time: f32, attachment_name: Option<&str>) {
        self.frames[frame] = time;
        self.attachment_names[frame] = attachment_name.map(str::to_string);
    }

    /// Attachment keyed at or before `time`; `None` before the first key.
    pub(crate) fn keyed_attachment(&self, time: f32) -> Option<Option<&str>> {
        let first = *self.frames.first()?;
        if time < first {
            return None;
        }
        let i = search(&self.frames, time, 1);
        Some(self.attachment_names[i].as_deref())
    }

    pub(crate) fn apply(
        &self,
        skeleton: &mut Skeleton,
        time: f32,
        blend: MixBlend,
        direction: MixDirection,
    ) {
        if !slot_bone_active(skeleton, self.slot_index) {
            return;
        }
        if direction == MixDirection::Out {
            if blend == MixBlend::Setup {
                skeleton.set_slot_to_setup_attachment(self.slot_index);
            }
            return;
        }
        match self.keyed_attachment(time) {
            Some(name) => skeleton.set_slot_attachment(self.slot_index, name),
            None => {
                if matches!(blend, MixBlend::Setup | MixBlend::First) {
                    skeleton.set_slot_to_setup_attachment(self.slot_index);
                }
            }
        }
    }
}

/// Keys a vertex attachment's deform buffer. Unweighted attachments key absolute positions and
/// mix toward their setup vertices; weighted attachments key offsets and mix toward zero.
#[derive(Clone, Debug)]
pub struct DeformTimeline {
    slot_index: usize,
    attachment: u32,
    vertex_count: usize,
    frames: CurveFrames,
    vertices: Vec<Vec<f32>>,
}

impl DeformTimeline {
    /// Bezier segments map time to a `0..1` percent (`value1 = 0`, `value2 = 1`).
    pub fn new(
        frame_count: usize,
        bezier_count: usize,
        slot_index: usize,
        attachment: &VertexAttachmentData,
    ) -> Self {
        let vertex_count = attachment.deform_len();
        Self {
            slot_index,
            attachment: attachment.timeline_attachment,
            vertex_count,
            frames: CurveFrames::new(frame_count, bezier_count, 1),
            vertices: vec![vec![0.0; vertex_count]; frame_count],
        }
    }

    pub fn slot_index(&self) -> usize {
        self.slot_index
    }

    /// Timeline attachment id the keys apply to.
    pub fn attachment(&self) -> u32 {
        self.attachment
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn frames(&self) -> &CurveFrames {
        &self.frames
    }

    pub fn frames_mut(&mut self) -> &mut CurveFrames {
        &mut self.frames
    }

    pub fn set_frame(&mut self, frame: usize, time: f32, vertices: Vec<f32>) -> Result<(), Error> {
        if vertices.len() != self.vertex_count {
            return Err(Error::InvalidFrameData {
                timeline: "deform",
                message: format!(
                    "frame {frame} has {} vertex values, expected {}",
                    vertices.len(),
                    self.vertex_count
                ),
            });
        }
        let Some(slot) = self.vertices.get_mut(frame) else {
            return Err(Error::InvalidFrameData {
                timeline: "deform",
                message: format!("frame {frame} out of range"),
            });
        };
        *slot = vertices;
        self.frames.set_frame(frame, time, &[]);
        Ok(())
    }

    pub(crate) fn apply(&self, skeleton: &mut Skeleton, time: f32, alpha: f32, blend: MixBlend) {
        if !slot_bone_active(skeleton, self.slot_index) {
            return;
        }
        let data = Arc::clone(&skeleton.data);
        let Some(slot) = skeleton.slots.get_mut(self.slot_index) else {
            return;
        };
        let Some(vertex) = slot_attachment_data(&data, self.slot_index, slot)
            .and_then(|attachment| attachment.vertex_data())
        else {
            return;
        };
        if vertex.timeline_attachment != self.attachment {
            return;
        }
        let Some(first) = self.frames.first_time() else {
            return;
        };
        let vertex_count = self.vertex_count;
        let setup = vertex.setup_vertices();
        if setup.is_some_and(|s| s.len() < vertex_count) {
            log::warn!(
                "deform timeline for slot {} keys {} values but the attachment has {}",
                self.slot_index,
                vertex_count,
                setup.map_or(0, <[f32]>::len)
            );
            return;
        }

        let blend = if slot.deform.is_empty() {
            MixBlend::Setup
        } else {
            blend
        };
        let deform = &mut slot.deform;

        if time < first {
            match blend {
                MixBlend::Setup => deform.clear(),
                MixBlend::First => {
                    if alpha == 1.0 {
                        deform.clear();
                        return;
                    }
                    deform.resize(vertex_count, 0.0);
                    match setup {
                        Some(setup) => {
                            for (d, s) in deform.iter_mut().zip(setup) {
                                *d += (*s - *d) * alpha;
                            }
                        }
                        None => {
                            let keep = 1.0 - alpha;
                            for d in deform.iter_mut() {
                                *d *= keep;
                            }
                        }
                    }
                }
                _ => {}
            }
            return;
        }

        deform.resize(vertex_count, 0.0);
        let frame_count = self.frames.frame_count();
        if time >= self.frames.duration() {
            let last = &self.vertices[frame_count - 1];
            blend_deform(deform, setup, alpha, blend, |i| last[i]);
            return;
        }

        let frame = search(self.frames.frames(), time, 1);
        let percent = self.frames.curve_percent(time, frame);
        let prev = &self.vertices[frame];
        let next = &self.vertices[frame + 1];
        blend_deform(deform, setup, alpha, blend, |i| {
            prev[i] + (next[i] - prev[i]) * percent
        });
    }
}

fn blend_deform(
    deform: &mut [f32],
    setup: Option<&[f32]>,
    alpha: f32,
    blend: MixBlend,
    value: impl Fn(usize) -> f32,
) {
    if alpha == 1.0 {
        match (blend, setup) {
            (MixBlend::Add, Some(setup)) => {
                for (i, d) in deform.iter_mut().enumerate() {
                    *d += value(i) - setup[i];
                }
            }
            (MixBlend::Add, None) => {
                for (i, d) in deform.iter_mut().enumerate() {
                    *d += value(i);
                }
            }
            _ => {
                for (i, d) in deform.iter_mut().enumerate() {
                    *d = value(i);
                }
            }
        }
        return;
    }

    match (blend, setup) {
        (MixBlend::Setup, Some(setup)) => {
            for (i, d) in deform.iter_mut().enumerate() {
                *d = setup[i] + (value(i) - setup[i]) * alpha;
            }
        }
        (MixBlend::Setup, None) => {
            for (i, d) in deform.iter_mut().enumerate() {
                *d = value(i) * alpha;
            }
        }
        (MixBlend::First | MixBlend::Replace, _) => {
            for (i, d) in deform.iter_mut().enumerate() {
                *d += (value(i) - *d) * alpha;
            }
        }
        (MixBlend::Add, Some(setup)) => {
            for (i, d) in deform.iter_mut().enumerate() {
                *d += (value(i) - setup[i]) * alpha;
            }
        }
        (MixBlend::Add, None) => {
            for (i, d) in deform.iter_mut().enumerate() {
                *d += value(i) * alpha;
            }
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SequenceMode {
    Hold,
    Once,
    Loop,
    Pingpong,
    OnceReverse,
    LoopReverse,
    PingpongReverse,
}

impl SequenceMode {
    const ALL: [SequenceMode; 7] = [
        SequenceMode::Hold,
        SequenceMode::Once,
        SequenceMode::Loop,
        SequenceMode::Pingpong,
        SequenceMode::OnceReverse,
        SequenceMode::LoopReverse,
        SequenceMode::PingpongReverse,
    ];

    fn from_ordinal(ordinal: usize) -> Option<Self> {
        Self::ALL.get(ordinal).copied()
    }

    /// Region index after `elapsed` frames from `start` in a sequence of `count` regions.
    fn index(self, start: i64, elapsed: f32, count: i64) -> i64 {
        if self == SequenceMode::Hold {
            return start;
        }
        let index = (start as f32 + elapsed + SEQUENCE_EPSILON) as i64;
        match self {
            SequenceMode::Hold => start,
            SequenceMode::Once => index.min(count - 1),
            SequenceMode::Loop => index % count,
            SequenceMode::Pingpong => {
                let n = (count << 1) - 2;
                let index = if n == 0 { 0 } else { index % n };
                if index >= count { n - index } else { index }
            }
            SequenceMode::OnceReverse => (count - 1 - index).max(0),
            SequenceMode::LoopReverse => count - 1 - (index % count),
            SequenceMode::PingpongReverse => {
                let n = (count << 1) - 2;
                let index = if n == 0 { 0 } else { (index + count - 1) % n };
                if index >= count { n - index } else { index }
            }
        }
    }
}

/// Keys which region of an attachment's sequence a slot shows.
#[derive(Clone, Debug)]
pub struct SequenceTimeline {
    slot_index: usize,
    sequence_id: u32,
    frames: Vec<f32>,
}

impl SequenceTimeline {
    pub const ENTRIES: usize = 3;
    const MODE: usize = 1;
    const DELAY: usize = 2;

    pub fn new(frame_count: usize, slot_index: usize, sequence: &SequenceData) -> Self {
        Self {
            slot_index,
            sequence_id: sequence.id,
            frames: vec![0.0; frame_count * Self::ENTRIES],
        }
    }

    pub fn slot_index(&self) -> usize {
        self.slot_index
    }

    pub fn sequence_id(&self) -> u32 {
        self.sequence_id
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len() / Self::ENTRIES
    }

    pub fn duration(&self) -> f32 {
        self.frames
            .len()
            .checked_sub(Self::ENTRIES)
            .map_or(0.0, |i| self.frames[i])
    }

    /// `delay` is the time each region is shown for.
    ///
    /// Panics if `frame` is not below the frame count.
    pub fn set_frame(&mut self, frame: usize, time: f32, mode: SequenceMode, index: i32, delay: f32) {
        let i = frame * Self::ENTRIES;
        self.frames[i] = time;
        self.frames[i + Self::MODE] = ((mode as i32) | (index << 4)) as f32;
        self.frames[i + Self::DELAY] = delay;
    }

    pub(crate) fn apply(
        &self,
        skeleton: &mut Skeleton,
        time: f32,
        blend: MixBlend,
        direction: MixDirection,
    ) {
        if !slot_bone_active(skeleton, self.slot_index) {
            return;
        }
        let data = Arc::clone(&skeleton.data);
        let Some(slot) = skeleton.slots.get_mut(self.slot_index) else {
            return;
        };
        let Some(sequence) = slot_attachment_data(&data, self.slot_index, slot)
            .and_then(|attachment| attachment.sequence())
        else {
            return;
        };
        if sequence.id != self.sequence_id {
            return;
        }

        if direction == MixDirection::Out {
            if blend == MixBlend::Setup {
                slot.sequence_index = -1;
            }
            return;
        }
        let Some(&first) = self.frames.first() else {
            return;
        };
        if time < first {
            if matches!(blend, MixBlend::Setup | MixBlend::First) {
                slot.sequence_index = -1;
            }
            return;
        }

        let i = search(&self.frames, time, Self::ENTRIES);
        let before = self.frames[i];
        let mode_and_index = self.frames[i + Self::MODE] as i32;
        let delay = self.frames[i + Self::DELAY];
        let start = i64::from(mode_and_index >> 4);
        let mode = SequenceMode::from_ordinal((mode_and_index & 0xf) as usize)
            .unwrap_or(SequenceMode::Hold);
        let count = sequence.count as i64;
        if count == 0 && mode != SequenceMode::Hold {
            return;
        }
        let index = mode.index(start, (time - before) / delay, count);
        slot.sequence_index = index.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
    }
}

/// Fires keyed events. Never touches the pose.
#[derive(Clone, Debug)]
pub struct EventTimeline {
    frames: Vec<f32>,
    events: Vec<Event>,
}

impl EventTimeline {
    /// Keys are ordered by event time; events sharing a time keep their given order.
    pub fn new(mut events: Vec<Event>) -> Self {
        events.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self {
            frames: events.iter().map(|e| e.time).collect(),
            events,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn duration(&self) -> f32 {
        self.frames.last().copied().unwrap_or(0.0)
    }

    /// Pushes every event keyed in `(last_time, time]`. When `last_time > time` the animation
    /// looped: events after `last_time` fire first, then those up to `time`.
    pub fn apply(&self, last_time: f32, time: f32, out: &mut Vec<Event>) {
        let frames = &self.frames;
        let Some(&last_frame) = frames.last() else {
            return;
        };
        let mut last_time = last_time;
        if last_time > time {
            self.apply(last_time, f32::MAX, out);
            last_time = -1.0;
        } else if last_time >= last_frame {
            return;
        }
        if time < frames[0] {
            return;
        }
        let mut i = if last_time < frames[0] {
            0
        } else {
            search(frames, last_time, 1) + 1
        };
        while i < frames.len() && time >= frames[i] {
            out.push(self.events[i].clone());
            i += 1;
        }
    }
}

/// Keys slot render order. `None` keys restore the setup order.
#[derive(Clone, Debug)]
pub struct DrawOrderTimeline {
    frames: Vec<f32>,
    draw_orders: Vec<Option<Vec<usize>>>,
}

impl DrawOrderTimeline {
    pub fn new(frame_count: usize) -> Self {
        Self {
            frames: vec![0.0; frame_count],
            draw_orders: vec![None; frame_count],
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn duration(&self) -> f32 {
        self.frames.last().copied().unwrap_or(0.0)
    }

    /// `draw_order[i]` is the setup index of the slot drawn at position `i`.
    ///
    /// Panics if `frame` is not below the frame count.
    pub fn set_frame(&mut self, frame: usize, time: f32, draw_order: Option<Vec<usize>>) {
        self.frames[frame] = time;
        self.draw_orders[frame] = draw_order;
    }

    pub(crate) fn apply(
        &self,
        skeleton: &mut Skeleton,
        time: f32,
        blend: MixBlend,
        direction: MixDirection,
    ) {
        let setup_order = |skeleton: &mut Skeleton| {
            let n = skeleton.slots.len();
            skeleton.draw_order.clear();
            skeleton.draw_order.extend(0..n);
        };
        if direction == MixDirection::Out {
            if blend == MixBlend::Setup {
                setup_order(skeleton);
            }
            return;
        }
        let Some(&first) = self.frames.first() else {
            return;
        };
        if time < first {
            if matches!(blend, MixBlend::Setup | MixBlend::First) {
                setup_order(skeleton);
            }
            return;
        }
        match &self.draw_orders[search(&self.frames, time, 1)] {
            None => setup_order(skeleton),
            Some(order) => {
                skeleton.draw_order.clear();
                skeleton.draw_order.extend_from_slice(order);
            }
        }
    }
}
