use crate::{Animation, Error};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct BoneData {
    pub name: String,
    pub parent: Option<usize>,
    pub length: f32,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub shear_x: f32,
    pub shear_y: f32,
    pub inherit: Inherit,
    pub skin_required: bool,
}

impl BoneData {
    pub fn new(name: impl Into<String>, parent: Option<usize>) -> Self {
        Self {
            name: name.into(),
            parent,
            length: 0.0,
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            shear_x: 0.0,
            shear_y: 0.0,
            inherit: Inherit::Normal,
            skin_required: false,
        }
    }
}

/// How a bone inherits its parent's transform. Keyed by [`crate::InheritTimeline`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum Inherit {
    #[default]
    Normal,
    OnlyTranslation,
    NoRotationOrReflection,
    NoScale,
    NoScaleOrReflection,
}

impl Inherit {
    pub const ALL: [Inherit; 5] = [
        Inherit::Normal,
        Inherit::OnlyTranslation,
        Inherit::NoRotationOrReflection,
        Inherit::NoScale,
        Inherit::NoScaleOrReflection,
    ];

    pub fn ordinal(self) -> usize {
        self as usize
    }

    pub fn from_ordinal(ordinal: usize) -> Option<Self> {
        Self::ALL.get(ordinal).copied()
    }
}

#[derive(Clone, Debug)]
pub struct SlotData {
    pub name: String,
    pub bone: usize,
    pub attachment: Option<String>,
    pub color: [f32; 4],
    pub has_dark: bool,
    pub dark_color: [f32; 3],
}

impl SlotData {
    pub fn new(name: impl Into<String>, bone: usize) -> Self {
        Self {
            name: name.into(),
            bone,
            attachment: None,
            color: [1.0, 1.0, 1.0, 1.0],
            has_dark: false,
            dark_color: [0.0, 0.0, 0.0],
        }
    }
}

#[derive(Clone, Debug)]
pub struct IkConstraintData {
    pub name: String,
    pub skin_required: bool,
    pub bones: Vec<usize>,
    pub target: usize,
    pub mix: f32,
    pub softness: f32,
    pub bend_direction: i32,
    pub compress: bool,
    pub stretch: bool,
}

#[derive(Clone, Debug)]
pub struct TransformConstraintData {
    pub name: String,
    pub skin_required: bool,
    pub bones: Vec<usize>,
    pub source: usize,
    pub mix_rotate: f32,
    pub mix_x: f32,
    pub mix_y: f32,
    pub mix_scale_x: f32,
    pub mix_scale_y: f32,
    pub mix_shear_y: f32,
}

#[derive(Clone, Debug)]
pub struct PathConstraintData {
    pub name: String,
    pub skin_required: bool,
    pub bones: Vec<usize>,
    pub target: usize,
    pub position: f32,
    pub spacing: f32,
    pub mix_rotate: f32,
    pub mix_x: f32,
    pub mix_y: f32,
}

/// Frame-by-frame region sequence. `id` is shared by every attachment that plays the same
/// sequence (eg. linked meshes), which is what sequence timelines key on.
#[derive(Clone, Debug)]
pub struct SequenceData {
    pub id: u32,
    pub count: usize,
    pub setup_index: i32,
}

impl SequenceData {
    pub fn new(count: usize) -> Self {
        Self {
            id: crate::ids::SEQUENCE_IDS.next(),
            count,
            setup_index: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct VertexWeight {
    pub bone: usize,
    pub x: f32,
    pub y: f32,
    pub weight: f32,
}

#[derive(Clone, Debug)]
pub enum MeshVertices {
    /// Flattened `x, y` setup positions.
    Unweighted(Vec<f32>),
    /// Per vertex bone influences; deform keys store offsets, one `x, y` pair per influence.
    Weighted(Vec<Vec<VertexWeight>>),
}

/// Shared part of every attachment whose vertices can be keyed by a deform timeline.
#[derive(Clone, Debug)]
pub struct VertexAttachmentData {
    pub id: u32,
    /// Id deform timelines match against. Equal to `id` unless the attachment is a linked mesh,
    /// in which case it is the parent mesh's id.
    pub timeline_attachment: u32,
    pub vertices: MeshVertices,
}

impl VertexAttachmentData {
    pub fn new(vertices: MeshVertices) -> Self {
        let id = crate::ids::VERTEX_ATTACHMENT_IDS.next();
        Self {
            id,
            timeline_attachment: id,
            vertices,
        }
    }

    /// A linked copy that shares this attachment's deform keys.
    pub fn linked(&self) -> Self {
        Self {
            id: crate::ids::VERTEX_ATTACHMENT_IDS.next(),
            timeline_attachment: self.timeline_attachment,
            vertices: self.vertices.clone(),
        }
    }

    pub fn is_weighted(&self) -> bool {
        matches!(self.vertices, MeshVertices::Weighted(_))
    }

    /// Setup positions, `None` for weighted attachments (whose deform blends toward zero).
    pub fn setup_vertices(&self) -> Option<&[f32]> {
        match &self.vertices {
            MeshVertices::Unweighted(v) => Some(v.as_slice()),
            MeshVertices::Weighted(_) => None,
        }
    }

    /// Length of the slot deform buffer this attachment expects.
    pub fn deform_len(&self) -> usize {
        match &self.vertices {
            MeshVertices::Unweighted(v) => v.len(),
            MeshVertices::Weighted(v) => v.iter().map(|w| w.len() * 2).sum(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RegionAttachmentData {
    pub name: String,
    pub path: String,
    pub sequence: Option<SequenceData>,
    pub color: [f32; 4],
}

#[derive(Clone, Debug)]
pub struct MeshAttachmentData {
    pub name: String,
    pub path: String,
    pub vertex: VertexAttachmentData,
    pub sequence: Option<SequenceData>,
    pub color: [f32; 4],
}

#[derive(Clone, Debug)]
pub struct PointAttachmentData {
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
}

#[derive(Clone, Debug)]
pub struct PathAttachmentData {
    pub name: String,
    pub vertex: VertexAttachmentData,
    pub closed: bool,
    pub constant_speed: bool,
}

#[derive(Clone, Debug)]
pub struct BoundingBoxAttachmentData {
    pub name: String,
    pub vertex: VertexAttachmentData,
}

#[derive(Clone, Debug)]
pub struct ClippingAttachmentData {
    pub name: String,
    pub vertex: VertexAttachmentData,
    pub end_slot: Option<usize>,
}

#[derive(Clone, Debug)]
pub enum AttachmentData {
    Region(RegionAttachmentData),
    Mesh(MeshAttachmentData),
    Point(PointAttachmentData),
    Path(PathAttachmentData),
    BoundingBox(BoundingBoxAttachmentData),
    Clipping(ClippingAttachmentData),
}

impl AttachmentData {
    pub fn name(&self) -> &str {
        match self {
            AttachmentData::Region(a) => a.name.as_str(),
            AttachmentData::Mesh(a) => a.name.as_str(),
            AttachmentData::Point(a) => a.name.as_str(),
            AttachmentData::Path(a) => a.name.as_str(),
            AttachmentData::BoundingBox(a) => a.name.as_str(),
            AttachmentData::Clipping(a) => a.name.as_str(),
        }
    }

    pub fn vertex_data(&self) -> Option<&VertexAttachmentData> {
        match self {
            AttachmentData::Mesh(a) => Some(&a.vertex),
            AttachmentData::Path(a) => Some(&a.vertex),
            AttachmentData::BoundingBox(a) => Some(&a.vertex),
            AttachmentData::Clipping(a) => Some(&a.vertex),
            AttachmentData::Region(_) | AttachmentData::Point(_) => None,
        }
    }

    pub fn sequence(&self) -> Option<&SequenceData> {
        match self {
            AttachmentData::Region(a) => a.sequence.as_ref(),
            AttachmentData::Mesh(a) => a.sequence.as_ref(),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SkinData {
    pub name: String,
    pub attachments: Vec<HashMap<String, AttachmentData>>,
    pub bones: Vec<usize>,
    pub ik_constraints: Vec<usize>,
    pub transform_constraints: Vec<usize>,
    pub path_constraints: Vec<usize>,
}

impl SkinData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attachments: Vec::new(),
            bones: Vec::new(),
            ik_constraints: Vec::new(),
            transform_constraints: Vec::new(),
            path_constraints: Vec::new(),
        }
    }

    pub fn attachment(&self, slot_index: usize, attachment_name: &str) -> Option<&AttachmentData> {
        self.attachments
            .get(slot_index)
            .and_then(|slot_map| slot_map.get(attachment_name))
    }

    pub fn set_attachment(
        &mut self,
        slot_index: usize,
        attachment_name: impl Into<String>,
        attachment: AttachmentData,
    ) {
        if self.attachments.len() <= slot_index {
            self.attachments.resize_with(slot_index + 1, HashMap::new);
        }
        self.attachments[slot_index].insert(attachment_name.into(), attachment);
    }
}

#[derive(Clone, Debug)]
pub struct EventData {
    pub name: String,
    pub int_value: i32,
    pub float_value: f32,
    pub string: String,
    pub audio_path: String,
    pub volume: f32,
    pub balance: f32,
}

impl EventData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            int_value: 0,
            float_value: 0.0,
            string: String::new(),
            audio_path: String::new(),
            volume: 1.0,
            balance: 0.0,
        }
    }
}

/// A keyed event instance. Values start from the [`EventData`] defaults and may be overridden
/// per key.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub time: f32,
    pub name: String,
    pub int_value: i32,
    pub float_value: f32,
    pub string: String,
    pub audio_path: String,
    pub volume: f32,
    pub balance: f32,
}

impl Event {
    pub fn new(time: f32, data: &EventData) -> Self {
        Self {
            time,
            name: data.name.clone(),
            int_value: data.int_value,
            float_value: data.float_value,
            string: data.string.clone(),
            audio_path: data.audio_path.clone(),
            volume: data.volume,
            balance: data.balance,
        }
    }
}

/// Setup data shared by every [`crate::Skeleton`] instance, plus the animations authored for it.
#[derive(Clone, Debug, Default)]
pub struct SkeletonData {
    pub name: String,
    pub bones: Vec<BoneData>,
    pub slots: Vec<SlotData>,
    pub skins: HashMap<String, SkinData>,
    pub events: HashMap<String, EventData>,
    pub ik_constraints: Vec<IkConstraintData>,
    pub transform_constraints: Vec<TransformConstraintData>,
    pub path_constraints: Vec<PathConstraintData>,
    animations: Vec<Arc<Animation>>,
    animation_index: HashMap<String, usize>,
}

impl SkeletonData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Registers an animation, replacing any previous animation with the same name.
    pub fn add_animation(&mut self, animation: Animation) -> Arc<Animation> {
        let animation = Arc::new(animation);
        match self.animation_index.get(animation.name()) {
            Some(&index) => self.animations[index] = Arc::clone(&animation),
            None => {
                self.animation_index
                    .insert(animation.name().to_string(), self.animations.len());
                self.animations.push(Arc::clone(&animation));
            }
        }
        animation
    }

    pub fn animations(&self) -> &[Arc<Animation>] {
        &self.animations
    }

    pub fn animation(&self, name: &str) -> Option<&Arc<Animation>> {
        let index = *self.animation_index.get(name)?;
        self.animations.get(index)
    }

    pub fn find_animation(&self, name: &str) -> Result<Arc<Animation>, Error> {
        self.animation(name)
            .cloned()
            .ok_or_else(|| Error::UnknownAnimation {
                name: name.to_string(),
            })
    }

    pub fn skin(&self, name: &str) -> Option<&SkinData> {
        self.skins.get(name)
    }

    pub fn bone_index(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    pub fn slot_index(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.name == name)
    }
}
