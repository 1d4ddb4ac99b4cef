use super::curve::{CurveFrames, search};
use crate::{
    AttachmentTimeline, ColorTimeline, ColorTimelineKind, DeformTimeline, DrawOrderTimeline,
    Event, EventTimeline, Inherit, MixBlend, MixDirection, SequenceTimeline, Skeleton,
};
use std::fmt;

/// Pose property families a timeline can write.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum Property {
    Rotate,
    X,
    Y,
    ScaleX,
    ScaleY,
    ShearX,
    ShearY,
    Inherit,
    Rgb,
    Alpha,
    Rgb2,
    Attachment,
    Deform,
    Event,
    DrawOrder,
    IkConstraint,
    TransformConstraint,
    PathConstraintPosition,
    PathConstraintSpacing,
    PathConstraintMix,
    Sequence,
}

impl Property {
    pub fn name(self) -> &'static str {
        match self {
            Property::Rotate => "rotate",
            Property::X => "x",
            Property::Y => "y",
            Property::ScaleX => "scaleX",
            Property::ScaleY => "scaleY",
            Property::ShearX => "shearX",
            Property::ShearY => "shearY",
            Property::Inherit => "inherit",
            Property::Rgb => "rgb",
            Property::Alpha => "alpha",
            Property::Rgb2 => "rgb2",
            Property::Attachment => "attachment",
            Property::Deform => "deform",
            Property::Event => "event",
            Property::DrawOrder => "drawOrder",
            Property::IkConstraint => "ikConstraint",
            Property::TransformConstraint => "transformConstraint",
            Property::PathConstraintPosition => "pathConstraintPosition",
            Property::PathConstraintSpacing => "pathConstraintSpacing",
            Property::PathConstraintMix => "pathConstraintMix",
            Property::Sequence => "sequence",
        }
    }
}

/// Identifies one pose property, eg. the rotation of bone 3 (`rotate|3`). Two timelines with a
/// shared id conflict when layered.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct PropertyId {
    pub property: Property,
    pub index: Option<usize>,
    /// Attachment or sequence id for deform and sequence timelines.
    pub target: Option<u32>,
}

impl PropertyId {
    pub fn new(property: Property, index: usize) -> Self {
        Self {
            property,
            index: Some(index),
            target: None,
        }
    }

    pub fn global(property: Property) -> Self {
        Self {
            property,
            index: None,
            target: None,
        }
    }

    pub fn with_target(property: Property, index: usize, target: u32) -> Self {
        Self {
            property,
            index: Some(index),
            target: Some(target),
        }
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.property.name())?;
        if let Some(index) = self.index {
            write!(f, "|{index}")?;
        }
        if let Some(target) = self.target {
            write!(f, "|{target}")?;
        }
        Ok(())
    }
}

/// Tag of every timeline variant.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TimelineKind {
    Rotate,
    Translate,
    TranslateX,
    TranslateY,
    Scale,
    ScaleX,
    ScaleY,
    Shear,
    ShearX,
    ShearY,
    Inherit,
    Rgba,
    Rgb,
    Alpha,
    Rgba2,
    Rgb2,
    Attachment,
    Deform,
    Sequence,
    Event,
    DrawOrder,
    IkConstraint,
    TransformConstraint,
    PathConstraintPosition,
    PathConstraintSpacing,
    PathConstraintMix,
}

/// A keyframed property track. Timelines are immutable once built and may be applied to any
/// number of skeletons.
#[derive(Clone, Debug)]
pub enum Timeline {
    Bone(BoneTimeline),
    Inherit(InheritTimeline),
    Color(ColorTimeline),
    Attachment(AttachmentTimeline),
    Deform(DeformTimeline),
    Sequence(SequenceTimeline),
    Event(EventTimeline),
    DrawOrder(DrawOrderTimeline),
    IkConstraint(IkConstraintTimeline),
    TransformConstraint(TransformConstraintTimeline),
    PathConstraint(PathConstraintTimeline),
}

impl Timeline {
    pub fn kind(&self) -> TimelineKind {
        match self {
            Timeline::Bone(t) => match t.kind {
                BoneTimelineKind::Rotate => TimelineKind::Rotate,
                BoneTimelineKind::Translate => TimelineKind::Translate,
                BoneTimelineKind::TranslateX => TimelineKind::TranslateX,
                BoneTimelineKind::TranslateY => TimelineKind::TranslateY,
                BoneTimelineKind::Scale => TimelineKind::Scale,
                BoneTimelineKind::ScaleX => TimelineKind::ScaleX,
                BoneTimelineKind::ScaleY => TimelineKind::ScaleY,
                BoneTimelineKind::Shear => TimelineKind::Shear,
                BoneTimelineKind::ShearX => TimelineKind::ShearX,
                BoneTimelineKind::ShearY => TimelineKind::ShearY,
            },
            Timeline::Inherit(_) => TimelineKind::Inherit,
            Timeline::Color(t) => match t.kind() {
                ColorTimelineKind::Rgba => TimelineKind::Rgba,
                ColorTimelineKind::Rgb => TimelineKind::Rgb,
                ColorTimelineKind::Alpha => TimelineKind::Alpha,
                ColorTimelineKind::Rgba2 => TimelineKind::Rgba2,
                ColorTimelineKind::Rgb2 => TimelineKind::Rgb2,
            },
            Timeline::Attachment(_) => TimelineKind::Attachment,
            Timeline::Deform(_) => TimelineKind::Deform,
            Timeline::Sequence(_) => TimelineKind::Sequence,
            Timeline::Event(_) => TimelineKind::Event,
            Timeline::DrawOrder(_) => TimelineKind::DrawOrder,
            Timeline::IkConstraint(_) => TimelineKind::IkConstraint,
            Timeline::TransformConstraint(_) => TimelineKind::TransformConstraint,
            Timeline::PathConstraint(t) => match t.kind {
                PathConstraintTimelineKind::Position => TimelineKind::PathConstraintPosition,
                PathConstraintTimelineKind::Spacing => TimelineKind::PathConstraintSpacing,
                PathConstraintTimelineKind::Mix => TimelineKind::PathConstraintMix,
            },
        }
    }

    pub fn property_ids(&self) -> Vec<PropertyId> {
        match self {
            Timeline::Bone(t) => t.property_ids(),
            Timeline::Inherit(t) => vec![PropertyId::new(Property::Inherit, t.bone_index)],
            Timeline::Color(t) => t.property_ids(),
            Timeline::Attachment(t) => {
                vec![PropertyId::new(Property::Attachment, t.slot_index())]
            }
            Timeline::Deform(t) => vec![PropertyId::with_target(
                Property::Deform,
                t.slot_index(),
                t.attachment(),
            )],
            Timeline::Sequence(t) => vec![PropertyId::with_target(
                Property::Sequence,
                t.slot_index(),
                t.sequence_id(),
            )],
            Timeline::Event(_) => vec![PropertyId::global(Property::Event)],
            Timeline::DrawOrder(_) => vec![PropertyId::global(Property::DrawOrder)],
            Timeline::IkConstraint(t) => {
                vec![PropertyId::new(Property::IkConstraint, t.constraint_index)]
            }
            Timeline::TransformConstraint(t) => vec![PropertyId::new(
                Property::TransformConstraint,
                t.constraint_index,
            )],
            Timeline::PathConstraint(t) => {
                let property = match t.kind {
                    PathConstraintTimelineKind::Position => Property::PathConstraintPosition,
                    PathConstraintTimelineKind::Spacing => Property::PathConstraintSpacing,
                    PathConstraintTimelineKind::Mix => Property::PathConstraintMix,
                };
                vec![PropertyId::new(property, t.constraint_index)]
            }
        }
    }

    pub fn frame_count(&self) -> usize {
        match self {
            Timeline::Bone(t) => t.frames.frame_count(),
            Timeline::Inherit(t) => t.frames.len() / InheritTimeline::ENTRIES,
            Timeline::Color(t) => t.frames().frame_count(),
            Timeline::Attachment(t) => t.frame_count(),
            Timeline::Deform(t) => t.frames().frame_count(),
            Timeline::Sequence(t) => t.frame_count(),
            Timeline::Event(t) => t.frame_count(),
            Timeline::DrawOrder(t) => t.frame_count(),
            Timeline::IkConstraint(t) => t.frames.frame_count(),
            Timeline::TransformConstraint(t) => t.frames.frame_count(),
            Timeline::PathConstraint(t) => t.frames.frame_count(),
        }
    }

    /// Floats per key in the packed frame array, time included.
    pub fn frame_entries(&self) -> usize {
        match self {
            Timeline::Bone(t) => t.frames.entries(),
            Timeline::Inherit(_) => InheritTimeline::ENTRIES,
            Timeline::Color(t) => t.frames().entries(),
            Timeline::Attachment(_) => 1,
            Timeline::Deform(t) => t.frames().entries(),
            Timeline::Sequence(_) => SequenceTimeline::ENTRIES,
            Timeline::Event(_) => 1,
            Timeline::DrawOrder(_) => 1,
            Timeline::IkConstraint(t) => t.frames.entries(),
            Timeline::TransformConstraint(t) => t.frames.entries(),
            Timeline::PathConstraint(t) => t.frames.entries(),
        }
    }

    /// Time of the last key.
    pub fn duration(&self) -> f32 {
        match self {
            Timeline::Bone(t) => t.frames.duration(),
            Timeline::Inherit(t) => t
                .frames
                .len()
                .checked_sub(InheritTimeline::ENTRIES)
                .map_or(0.0, |i| t.frames[i]),
            Timeline::Color(t) => t.frames().duration(),
            Timeline::Attachment(t) => t.duration(),
            Timeline::Deform(t) => t.frames().duration(),
            Timeline::Sequence(t) => t.duration(),
            Timeline::Event(t) => t.duration(),
            Timeline::DrawOrder(t) => t.duration(),
            Timeline::IkConstraint(t) => t.frames.duration(),
            Timeline::TransformConstraint(t) => t.frames.duration(),
            Timeline::PathConstraint(t) => t.frames.duration(),
        }
    }

    /// Applies the timeline at `time`, mixing by `alpha` according to `blend`. `last_time` and
    /// `events` are only used by event timelines, which push every key in `(last_time, time]`.
    #[allow(clippy::too_many_arguments)]
    pub fn apply(
        &self,
        skeleton: &mut Skeleton,
        last_time: f32,
        time: f32,
        events: Option<&mut Vec<Event>>,
        alpha: f32,
        blend: MixBlend,
        direction: MixDirection,
    ) {
        match self {
            Timeline::Bone(t) => t.apply(skeleton, time, alpha, blend, direction),
            Timeline::Inherit(t) => t.apply(skeleton, time, blend, direction),
            Timeline::Color(t) => t.apply(skeleton, time, alpha, blend),
            Timeline::Attachment(t) => t.apply(skeleton, time, blend, direction),
            Timeline::Deform(t) => t.apply(skeleton, time, alpha, blend),
            Timeline::Sequence(t) => t.apply(skeleton, time, blend, direction),
            Timeline::Event(t) => {
                if let Some(events) = events {
                    t.apply(last_time, time, events);
                }
            }
            Timeline::DrawOrder(t) => t.apply(skeleton, time, blend, direction),
            Timeline::IkConstraint(t) => t.apply(skeleton, time, alpha, blend, direction),
            Timeline::TransformConstraint(t) => t.apply(skeleton, time, alpha, blend),
            Timeline::PathConstraint(t) => t.apply(skeleton, time, alpha, blend),
        }
    }

    /// The rotate timeline, if this is one.
    pub fn as_rotate(&self) -> Option<&BoneTimeline> {
        match self {
            Timeline::Bone(t) if t.kind == BoneTimelineKind::Rotate => Some(t),
            _ => None,
        }
    }
}

impl From<BoneTimeline> for Timeline {
    fn from(t: BoneTimeline) -> Self {
        Timeline::Bone(t)
    }
}

impl From<InheritTimeline> for Timeline {
    fn from(t: InheritTimeline) -> Self {
        Timeline::Inherit(t)
    }
}

impl From<ColorTimeline> for Timeline {
    fn from(t: ColorTimeline) -> Self {
        Timeline::Color(t)
    }
}

impl From<AttachmentTimeline> for Timeline {
    fn from(t: AttachmentTimeline) -> Self {
        Timeline::Attachment(t)
    }
}

impl From<DeformTimeline> for Timeline {
    fn from(t: DeformTimeline) -> Self {
        Timeline::Deform(t)
    }
}

impl From<SequenceTimeline> for Timeline {
    fn from(t: SequenceTimeline) -> Self {
        Timeline::Sequence(t)
    }
}

impl From<EventTimeline> for Timeline {
    fn from(t: EventTimeline) -> Self {
        Timeline::Event(t)
    }
}

impl From<DrawOrderTimeline> for Timeline {
    fn from(t: DrawOrderTimeline) -> Self {
        Timeline::DrawOrder(t)
    }
}

impl From<IkConstraintTimeline> for Timeline {
    fn from(t: IkConstraintTimeline) -> Self {
        Timeline::IkConstraint(t)
    }
}

impl From<TransformConstraintTimeline> for Timeline {
    fn from(t: TransformConstraintTimeline) -> Self {
        Timeline::TransformConstraint(t)
    }
}

impl From<PathConstraintTimeline> for Timeline {
    fn from(t: PathConstraintTimeline) -> Self {
        Timeline::PathConstraint(t)
    }
}

/// Sign that treats zero as zero (unlike `f32::signum`).
pub(crate) fn signum(value: f32) -> f32 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Value for a property keyed as an offset from setup (rotation, translation, shear).
pub(crate) fn relative_value(
    frames: &CurveFrames,
    time: f32,
    alpha: f32,
    blend: MixBlend,
    current: f32,
    setup: f32,
) -> f32 {
    let Some(first) = frames.first_time() else {
        return current;
    };
    if time < first {
        return match blend {
            MixBlend::Setup => setup,
            MixBlend::First => current + (setup - current) * alpha,
            _ => current,
        };
    }
    let mut value = frames.curve_value(time);
    match blend {
        MixBlend::Setup => setup + value * alpha,
        MixBlend::First | MixBlend::Replace => {
            value += setup - current;
            current + value * alpha
        }
        MixBlend::Add => current + value * alpha,
    }
}

/// Value for a property keyed as an absolute value (constraint mixes, path position/spacing).
pub(crate) fn absolute_value(
    frames: &CurveFrames,
    time: f32,
    alpha: f32,
    blend: MixBlend,
    current: f32,
    setup: f32,
) -> f32 {
    let Some(first) = frames.first_time() else {
        return current;
    };
    if time < first {
        return match blend {
            MixBlend::Setup => setup,
            MixBlend::First => current + (setup - current) * alpha,
            _ => current,
        };
    }
    let value = frames.curve_value(time);
    if blend == MixBlend::Setup {
        setup + (value - setup) * alpha
    } else {
        current + (value - current) * alpha
    }
}

/// Value for a scale keyed as a multiplier of setup. Mixing keeps the sign of the pose being
/// mixed toward so flips do not shrink through zero.
pub(crate) fn scale_value(
    frames: &CurveFrames,
    time: f32,
    alpha: f32,
    blend: MixBlend,
    direction: MixDirection,
    current: f32,
    setup: f32,
) -> f32 {
    let Some(first) = frames.first_time() else {
        return current;
    };
    if time < first {
        return match blend {
            MixBlend::Setup => setup,
            MixBlend::First => current + (setup - current) * alpha,
            _ => current,
        };
    }
    let value = frames.curve_value(time) * setup;
    if alpha == 1.0 {
        return if blend == MixBlend::Add {
            current + value - setup
        } else {
            value
        };
    }
    mix_scale(value, alpha, blend, direction, current, setup)
}

fn mix_scale(
    value: f32,
    alpha: f32,
    blend: MixBlend,
    direction: MixDirection,
    current: f32,
    setup: f32,
) -> f32 {
    match (direction, blend) {
        (_, MixBlend::Add) => current + (value - setup) * alpha,
        (MixDirection::Out, MixBlend::Setup) => {
            setup + (value.abs() * signum(setup) - setup) * alpha
        }
        (MixDirection::Out, _) => current + (value.abs() * signum(current) - current) * alpha,
        (MixDirection::In, MixBlend::Setup) => {
            let s = setup.abs() * signum(value);
            s + (value - s) * alpha
        }
        (MixDirection::In, _) => {
            let s = current.abs() * signum(value);
            s + (value - s) * alpha
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BoneTimelineKind {
    Rotate,
    Translate,
    TranslateX,
    TranslateY,
    Scale,
    ScaleX,
    ScaleY,
    Shear,
    ShearX,
    ShearY,
}

impl BoneTimelineKind {
    pub fn value_count(self) -> usize {
        match self {
            BoneTimelineKind::Translate | BoneTimelineKind::Scale | BoneTimelineKind::Shear => 2,
            _ => 1,
        }
    }
}

/// Keys one or two local transform values of a bone.
#[derive(Clone, Debug)]
pub struct BoneTimeline {
    kind: BoneTimelineKind,
    bone_index: usize,
    frames: CurveFrames,
}

impl BoneTimeline {
    pub fn new(
        kind: BoneTimelineKind,
        frame_count: usize,
        bezier_count: usize,
        bone_index: usize,
    ) -> Self {
        Self {
            kind,
            bone_index,
            frames: CurveFrames::new(frame_count, bezier_count, 1 + kind.value_count()),
        }
    }

    pub fn kind(&self) -> BoneTimelineKind {
        self.kind
    }

    pub fn bone_index(&self) -> usize {
        self.bone_index
    }

    pub fn frames(&self) -> &CurveFrames {
        &self.frames
    }

    pub fn frames_mut(&mut self) -> &mut CurveFrames {
        &mut self.frames
    }

    /// Panics if `frame` is not below the frame count.
    pub fn set_frame(&mut self, frame: usize, time: f32, values: &[f32]) {
        self.frames.set_frame(frame, time, values);
    }

    /// Keyed value of a single-value timeline at `time`.
    pub fn curve_value(&self, time: f32) -> f32 {
        self.frames.curve_value(time)
    }

    fn property_ids(&self) -> Vec<PropertyId> {
        let b = self.bone_index;
        match self.kind {
            BoneTimelineKind::Rotate => vec![PropertyId::new(Property::Rotate, b)],
            BoneTimelineKind::Translate => vec![
                PropertyId::new(Property::X, b),
                PropertyId::new(Property::Y, b),
            ],
            BoneTimelineKind::TranslateX => vec![PropertyId::new(Property::X, b)],
            BoneTimelineKind::TranslateY => vec![PropertyId::new(Property::Y, b)],
            BoneTimelineKind::Scale => vec![
                PropertyId::new(Property::ScaleX, b),
                PropertyId::new(Property::ScaleY, b),
            ],
            BoneTimelineKind::ScaleX => vec![PropertyId::new(Property::ScaleX, b)],
            BoneTimelineKind::ScaleY => vec![PropertyId::new(Property::ScaleY, b)],
            BoneTimelineKind::Shear => vec![
                PropertyId::new(Property::ShearX, b),
                PropertyId::new(Property::ShearY, b),
            ],
            BoneTimelineKind::ShearX => vec![PropertyId::new(Property::ShearX, b)],
            BoneTimelineKind::ShearY => vec![PropertyId::new(Property::ShearY, b)],
        }
    }

    pub(crate) fn apply(
        &self,
        skeleton: &mut Skeleton,
        time: f32,
        alpha: f32,
        blend: MixBlend,
        direction: MixDirection,
    ) {
        let Some(setup) = skeleton.data.bones.get(self.bone_index) else {
            return;
        };
        let Some(bone) = skeleton.bones.get_mut(self.bone_index) else {
            return;
        };
        if !bone.active {
            return;
        }
        let frames = &self.frames;

        match self.kind {
            BoneTimelineKind::Rotate => {
                bone.rotation =
                    relative_value(frames, time, alpha, blend, bone.rotation, setup.rotation);
            }
            BoneTimelineKind::TranslateX => {
                bone.x = relative_value(frames, time, alpha, blend, bone.x, setup.x);
            }
            BoneTimelineKind::TranslateY => {
                bone.y = relative_value(frames, time, alpha, blend, bone.y, setup.y);
            }
            BoneTimelineKind::ShearX => {
                bone.shear_x =
                    relative_value(frames, time, alpha, blend, bone.shear_x, setup.shear_x);
            }
            BoneTimelineKind::ShearY => {
                bone.shear_y =
                    relative_value(frames, time, alpha, blend, bone.shear_y, setup.shear_y);
            }
            BoneTimelineKind::ScaleX => {
                bone.scale_x = scale_value(
                    frames,
                    time,
                    alpha,
                    blend,
                    direction,
                    bone.scale_x,
                    setup.scale_x,
                );
            }
            BoneTimelineKind::ScaleY => {
                bone.scale_y = scale_value(
                    frames,
                    time,
                    alpha,
                    blend,
                    direction,
                    bone.scale_y,
                    setup.scale_y,
                );
            }
            BoneTimelineKind::Translate => {
                let (x, y) = (&mut bone.x, &mut bone.y);
                apply_relative_pair(frames, time, alpha, blend, x, y, setup.x, setup.y);
            }
            BoneTimelineKind::Shear => {
                let (x, y) = (&mut bone.shear_x, &mut bone.shear_y);
                let (sx, sy) = (setup.shear_x, setup.shear_y);
                apply_relative_pair(frames, time, alpha, blend, x, y, sx, sy);
            }
            BoneTimelineKind::Scale => {
                let Some(first) = frames.first_time() else {
                    return;
                };
                if time < first {
                    match blend {
                        MixBlend::Setup => {
                            bone.scale_x = setup.scale_x;
                            bone.scale_y = setup.scale_y;
                        }
                        MixBlend::First => {
                            bone.scale_x += (setup.scale_x - bone.scale_x) * alpha;
                            bone.scale_y += (setup.scale_y - bone.scale_y) * alpha;
                        }
                        _ => {}
                    }
                    return;
                }
                let i = search(frames.frames(), time, frames.entries());
                let x = frames.value_at(time, i, 1) * setup.scale_x;
                let y = frames.value_at(time, i, 2) * setup.scale_y;
                if alpha == 1.0 {
                    if blend == MixBlend::Add {
                        bone.scale_x += x - setup.scale_x;
                        bone.scale_y += y - setup.scale_y;
                    } else {
                        bone.scale_x = x;
                        bone.scale_y = y;
                    }
                    return;
                }
                bone.scale_x = mix_scale(x, alpha, blend, direction, bone.scale_x, setup.scale_x);
                bone.scale_y = mix_scale(y, alpha, blend, direction, bone.scale_y, setup.scale_y);
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_relative_pair(
    frames: &CurveFrames,
    time: f32,
    alpha: f32,
    blend: MixBlend,
    x: &mut f32,
    y: &mut f32,
    setup_x: f32,
    setup_y: f32,
) {
    let Some(first) = frames.first_time() else {
        return;
    };
    if time < first {
        match blend {
            MixBlend::Setup => {
                *x = setup_x;
                *y = setup_y;
            }
            MixBlend::First => {
                *x += (setup_x - *x) * alpha;
                *y += (setup_y - *y) * alpha;
            }
            _ => {}
        }
        return;
    }
    let i = search(frames.frames(), time, frames.entries());
    let vx = frames.value_at(time, i, 1);
    let vy = frames.value_at(time, i, 2);
    match blend {
        MixBlend::Setup => {
            *x = setup_x + vx * alpha;
            *y = setup_y + vy * alpha;
        }
        MixBlend::First | MixBlend::Replace => {
            *x += (setup_x + vx - *x) * alpha;
            *y += (setup_y + vy - *y) * alpha;
        }
        MixBlend::Add => {
            *x += vx * alpha;
            *y += vy * alpha;
        }
    }
}

/// Keys a bone's transform inheritance. Discrete: keys are never interpolated.
#[derive(Clone, Debug)]
pub struct InheritTimeline {
    bone_index: usize,
    frames: Vec<f32>,
}

impl InheritTimeline {
    pub const ENTRIES: usize = 2;

    pub fn new(frame_count: usize, bone_index: usize) -> Self {
        Self {
            bone_index,
            frames: vec![0.0; frame_count * Self::ENTRIES],
        }
    }

    pub fn bone_index(&self) -> usize {
        self.bone_index
    }

    /// Panics if `frame` is not below the frame count.
    pub fn set_frame(&mut self, frame: usize, time: f32, inherit: Inherit) {
        let i = frame * Self::ENTRIES;
        self.frames[i] = time;
        self.frames[i + 1] = inherit.ordinal() as f32;
    }

    fn apply(&self, skeleton: &mut Skeleton, time: f32, blend: MixBlend, direction: MixDirection) {
        let Some(setup) = skeleton.data.bones.get(self.bone_index) else {
            return;
        };
        let Some(bone) = skeleton.bones.get_mut(self.bone_index) else {
            return;
        };
        if !bone.active {
            return;
        }
        if direction == MixDirection::Out {
            if blend == MixBlend::Setup {
                bone.inherit = setup.inherit;
            }
            return;
        }
        let Some(&first) = self.frames.first() else {
            return;
        };
        if time < first {
            if matches!(blend, MixBlend::Setup | MixBlend::First) {
                bone.inherit = setup.inherit;
            }
            return;
        }
        let i = search(&self.frames, time, Self::ENTRIES);
        if let Some(inherit) = Inherit::from_ordinal(self.frames[i + 1] as usize) {
            bone.inherit = inherit;
        }
    }
}

/// Keys an IK constraint's mix and softness (interpolated) plus bend direction, compress and
/// stretch (discrete).
#[derive(Clone, Debug)]
pub struct IkConstraintTimeline {
    constraint_index: usize,
    frames: CurveFrames,
}

impl IkConstraintTimeline {
    pub const ENTRIES: usize = 6;
    const MIX: usize = 1;
    const SOFTNESS: usize = 2;
    const BEND_DIRECTION: usize = 3;
    const COMPRESS: usize = 4;
    const STRETCH: usize = 5;

    /// Bezier segments are laid out mix first, then softness.
    pub fn new(frame_count: usize, bezier_count: usize, constraint_index: usize) -> Self {
        Self {
            constraint_index,
            frames: CurveFrames::new(frame_count, bezier_count, Self::ENTRIES),
        }
    }

    pub fn constraint_index(&self) -> usize {
        self.constraint_index
    }

    pub fn frames_mut(&mut self) -> &mut CurveFrames {
        &mut self.frames
    }

    /// Panics if `frame` is not below the frame count.
    #[allow(clippy::too_many_arguments)]
    pub fn set_frame(
        &mut self,
        frame: usize,
        time: f32,
        mix: f32,
        softness: f32,
        bend_direction: i32,
        compress: bool,
        stretch: bool,
    ) {
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        self.frames.set_frame(
            frame,
            time,
            &[mix, softness, bend_direction as f32, flag(compress), flag(stretch)],
        );
    }

    fn apply(
        &self,
        skeleton: &mut Skeleton,
        time: f32,
        alpha: f32,
        blend: MixBlend,
        direction: MixDirection,
    ) {
        let Some(setup) = skeleton.data.ik_constraints.get(self.constraint_index) else {
            return;
        };
        let Some(c) = skeleton.ik_constraints.get_mut(self.constraint_index) else {
            return;
        };
        if !c.active {
            return;
        }
        let Some(first) = self.frames.first_time() else {
            return;
        };
        if time < first {
            match blend {
                MixBlend::Setup => {
                    c.mix = setup.mix;
                    c.softness = setup.softness;
                    c.bend_direction = setup.bend_direction;
                    c.compress = setup.compress;
                    c.stretch = setup.stretch;
                }
                MixBlend::First => {
                    c.mix += (setup.mix - c.mix) * alpha;
                    c.softness += (setup.softness - c.softness) * alpha;
                    c.bend_direction = setup.bend_direction;
                    c.compress = setup.compress;
                    c.stretch = setup.stretch;
                }
                _ => {}
            }
            return;
        }

        let frames = &self.frames;
        let i = search(frames.frames(), time, Self::ENTRIES);
        let mix = frames.value_at(time, i, Self::MIX);
        let softness = frames.value_at(time, i, Self::SOFTNESS);
        let raw = frames.frames();

        if blend == MixBlend::Setup {
            c.mix = setup.mix + (mix - setup.mix) * alpha;
            c.softness = setup.softness + (softness - setup.softness) * alpha;
            if direction == MixDirection::Out {
                c.bend_direction = setup.bend_direction;
                c.compress = setup.compress;
                c.stretch = setup.stretch;
                return;
            }
        } else {
            c.mix += (mix - c.mix) * alpha;
            c.softness += (softness - c.softness) * alpha;
            if direction == MixDirection::Out {
                return;
            }
        }
        c.bend_direction = raw[i + Self::BEND_DIRECTION] as i32;
        c.compress = raw[i + Self::COMPRESS] != 0.0;
        c.stretch = raw[i + Self::STRETCH] != 0.0;
    }
}

/// Keys a transform constraint's six mixes: rotate, x, y, scale x, scale y, shear y.
#[derive(Clone, Debug)]
pub struct TransformConstraintTimeline {
    constraint_index: usize,
    frames: CurveFrames,
}

impl TransformConstraintTimeline {
    pub const ENTRIES: usize = 7;

    pub fn new(frame_count: usize, bezier_count: usize, constraint_index: usize) -> Self {
        Self {
            constraint_index,
            frames: CurveFrames::new(frame_count, bezier_count, Self::ENTRIES),
        }
    }

    pub fn constraint_index(&self) -> usize {
        self.constraint_index
    }

    pub fn frames_mut(&mut self) -> &mut CurveFrames {
        &mut self.frames
    }

    /// `mixes` is `[rotate, x, y, scale_x, scale_y, shear_y]`.
    ///
    /// Panics if `frame` is not below the frame count.
    pub fn set_frame(&mut self, frame: usize, time: f32, mixes: [f32; 6]) {
        self.frames.set_frame(frame, time, &mixes);
    }

    fn apply(&self, skeleton: &mut Skeleton, time: f32, alpha: f32, blend: MixBlend) {
        let Some(setup) = skeleton.data.transform_constraints.get(self.constraint_index) else {
            return;
        };
        let Some(c) = skeleton.transform_constraints.get_mut(self.constraint_index) else {
            return;
        };
        if !c.active {
            return;
        }
        let setup_values = [
            setup.mix_rotate,
            setup.mix_x,
            setup.mix_y,
            setup.mix_scale_x,
            setup.mix_scale_y,
            setup.mix_shear_y,
        ];
        let mut pose = [
            &mut c.mix_rotate,
            &mut c.mix_x,
            &mut c.mix_y,
            &mut c.mix_scale_x,
            &mut c.mix_scale_y,
            &mut c.mix_shear_y,
        ];
        apply_absolute_channels(&self.frames, time, alpha, blend, &mut pose, &setup_values);
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PathConstraintTimelineKind {
    Position,
    Spacing,
    /// Rotate, x and y mixes.
    Mix,
}

/// Keys a path constraint's position, spacing, or mixes.
#[derive(Clone, Debug)]
pub struct PathConstraintTimeline {
    kind: PathConstraintTimelineKind,
    constraint_index: usize,
    frames: CurveFrames,
}

impl PathConstraintTimeline {
    pub fn new(
        kind: PathConstraintTimelineKind,
        frame_count: usize,
        bezier_count: usize,
        constraint_index: usize,
    ) -> Self {
        let entries = match kind {
            PathConstraintTimelineKind::Mix => 4,
            _ => 2,
        };
        Self {
            kind,
            constraint_index,
            frames: CurveFrames::new(frame_count, bezier_count, entries),
        }
    }

    pub fn kind(&self) -> PathConstraintTimelineKind {
        self.kind
    }

    pub fn constraint_index(&self) -> usize {
        self.constraint_index
    }

    pub fn frames_mut(&mut self) -> &mut CurveFrames {
        &mut self.frames
    }

    /// Panics if `frame` is not below the frame count.
    pub fn set_frame(&mut self, frame: usize, time: f32, values: &[f32]) {
        self.frames.set_frame(frame, time, values);
    }

    fn apply(&self, skeleton: &mut Skeleton, time: f32, alpha: f32, blend: MixBlend) {
        let Some(setup) = skeleton.data.path_constraints.get(self.constraint_index) else {
            return;
        };
        let Some(c) = skeleton.path_constraints.get_mut(self.constraint_index) else {
            return;
        };
        if !c.active {
            return;
        }
        let frames = &self.frames;
        match self.kind {
            PathConstraintTimelineKind::Position => {
                c.position = absolute_value(frames, time, alpha, blend, c.position, setup.position);
            }
            PathConstraintTimelineKind::Spacing => {
                c.spacing = absolute_value(frames, time, alpha, blend, c.spacing, setup.spacing);
            }
            PathConstraintTimelineKind::Mix => {
                let setup_values = [setup.mix_rotate, setup.mix_x, setup.mix_y];
                let mut pose = [&mut c.mix_rotate, &mut c.mix_x, &mut c.mix_y];
                apply_absolute_channels(frames, time, alpha, blend, &mut pose, &setup_values);
            }
        }
    }
}

/// Shared by the multi-channel constraint mix timelines.
fn apply_absolute_channels(
    frames: &CurveFrames,
    time: f32,
    alpha: f32,
    blend: MixBlend,
    pose: &mut [&mut f32],
    setup: &[f32],
) {
    let Some(first) = frames.first_time() else {
        return;
    };
    if time < first {
        match blend {
            MixBlend::Setup => {
                for (p, s) in pose.iter_mut().zip(setup) {
                    **p = *s;
                }
            }
            MixBlend::First => {
                for (p, s) in pose.iter_mut().zip(setup) {
                    **p += (*s - **p) * alpha;
                }
            }
            _ => {}
        }
        return;
    }
    let i = search(frames.frames(), time, frames.entries());
    for (channel, (p, s)) in pose.iter_mut().zip(setup).enumerate() {
        let value = frames.value_at(time, i, channel + 1);
        if blend == MixBlend::Setup {
            **p = *s + (value - *s) * alpha;
        } else {
            **p += (value - **p) * alpha;
        }
    }
}
