use crate::{AttachmentData, Inherit, SkeletonData};
use std::sync::Arc;

/// Local (unconstrained) bone pose. Timelines write these fields; world transforms are computed
/// downstream.
#[derive(Clone, Debug)]
pub struct Bone {
    data_index: usize,
    parent: Option<usize>,

    pub inherit: Inherit,
    pub active: bool,

    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub shear_x: f32,
    pub shear_y: f32,
}

impl Bone {
    pub fn data_index(&self) -> usize {
        self.data_index
    }

    pub fn parent_index(&self) -> Option<usize> {
        self.parent
    }
}

#[derive(Clone, Debug)]
pub struct Slot {
    data_index: usize,
    pub bone: usize,
    attachment: Option<String>,
    attachment_skin: Option<String>,
    pub(crate) attachment_state: i32,
    pub sequence_index: i32,
    pub deform: Vec<f32>,
    pub color: [f32; 4],
    pub dark_color: [f32; 3],
}

impl Slot {
    pub fn data_index(&self) -> usize {
        self.data_index
    }

    /// Name of the active attachment, if any.
    pub fn attachment(&self) -> Option<&str> {
        self.attachment.as_deref()
    }

    /// Skin the active attachment was resolved from.
    pub fn attachment_skin(&self) -> Option<&str> {
        self.attachment_skin.as_deref()
    }
}

#[derive(Clone, Debug)]
pub struct IkConstraint {
    data_index: usize,
    pub mix: f32,
    pub softness: f32,
    pub bend_direction: i32,
    pub compress: bool,
    pub stretch: bool,
    pub active: bool,
}

impl IkConstraint {
    pub fn data_index(&self) -> usize {
        self.data_index
    }
}

#[derive(Clone, Debug)]
pub struct TransformConstraint {
    data_index: usize,
    pub mix_rotate: f32,
    pub mix_x: f32,
    pub mix_y: f32,
    pub mix_scale_x: f32,
    pub mix_scale_y: f32,
    pub mix_shear_y: f32,
    pub active: bool,
}

impl TransformConstraint {
    pub fn data_index(&self) -> usize {
        self.data_index
    }
}

#[derive(Clone, Debug)]
pub struct PathConstraint {
    data_index: usize,
    pub position: f32,
    pub spacing: f32,
    pub mix_rotate: f32,
    pub mix_x: f32,
    pub mix_y: f32,
    pub active: bool,
}

impl PathConstraint {
    pub fn data_index(&self) -> usize {
        self.data_index
    }
}

/// The mutable pose that timelines and [`crate::AnimationState`] write into.
#[derive(Clone, Debug)]
pub struct Skeleton {
    pub data: Arc<SkeletonData>,
    pub bones: Vec<Bone>,
    pub slots: Vec<Slot>,
    /// Slot indices in render order.
    pub draw_order: Vec<usize>,
    pub ik_constraints: Vec<IkConstraint>,
    pub transform_constraints: Vec<TransformConstraint>,
    pub path_constraints: Vec<PathConstraint>,
    skin: Option<String>,
}

impl Skeleton {
    pub fn new(data: Arc<SkeletonData>) -> Self {
        let bones = data
            .bones
            .iter()
            .enumerate()
            .map(|(i, b)| Bone {
                data_index: i,
                parent: b.parent,
                inherit: b.inherit,
                active: true,
                x: b.x,
                y: b.y,
                rotation: b.rotation,
                scale_x: b.scale_x,
                scale_y: b.scale_y,
                shear_x: b.shear_x,
                shear_y: b.shear_y,
            })
            .collect();

        let slots = data
            .slots
            .iter()
            .enumerate()
            .map(|(i, s)| Slot {
                data_index: i,
                bone: s.bone,
                attachment: None,
                attachment_skin: None,
                attachment_state: 0,
                sequence_index: -1,
                deform: Vec::new(),
                color: s.color,
                dark_color: s.dark_color,
            })
            .collect();

        let ik_constraints = data
            .ik_constraints
            .iter()
            .enumerate()
            .map(|(i, c)| IkConstraint {
                data_index: i,
                mix: c.mix,
                softness: c.softness,
                bend_direction: c.bend_direction,
                compress: c.compress,
                stretch: c.stretch,
                active: true,
            })
            .collect();

        let transform_constraints = data
            .transform_constraints
            .iter()
            .enumerate()
            .map(|(i, c)| TransformConstraint {
                data_index: i,
                mix_rotate: c.mix_rotate,
                mix_x: c.mix_x,
                mix_y: c.mix_y,
                mix_scale_x: c.mix_scale_x,
                mix_scale_y: c.mix_scale_y,
                mix_shear_y: c.mix_shear_y,
                active: true,
            })
            .collect();

        let path_constraints = data
            .path_constraints
            .iter()
            .enumerate()
            .map(|(i, c)| PathConstraint {
                data_index: i,
                position: c.position,
                spacing: c.spacing,
                mix_rotate: c.mix_rotate,
                mix_x: c.mix_x,
                mix_y: c.mix_y,
                active: true,
            })
            .collect();

        let mut skeleton = Self {
            draw_order: (0..data.slots.len()).collect(),
            data,
            bones,
            slots,
            ik_constraints,
            transform_constraints,
            path_constraints,
            skin: None,
        };
        skeleton.update_cache();
        skeleton.set_slots_to_setup_pose();
        skeleton
    }

    pub fn skin(&self) -> Option<&str> {
        self.skin.as_deref()
    }

    /// Switches skins. Slots showing an attachment from the old skin pick up the attachment with
    /// the same name from the new one; with no previous skin, setup attachments are applied.
    pub fn set_skin(&mut self, skin_name: Option<&str>) -> Result<(), crate::Error> {
        if let Some(name) = skin_name {
            if self.data.skin(name).is_none() {
                return Err(crate::Error::UnknownSkin {
                    name: name.to_string(),
                });
            }
        }
        let old_skin = self.skin.take();
        self.skin = skin_name.map(str::to_string);

        let data = Arc::clone(&self.data);
        if let Some(new_name) = skin_name {
            let Some(new_skin) = data.skin(new_name) else {
                return Ok(());
            };
            for (slot_index, slot) in self.slots.iter_mut().enumerate() {
                let key = match &old_skin {
                    None => data.slots.get(slot_index).and_then(|s| s.attachment.as_deref()),
                    Some(old) if slot.attachment_skin.as_deref() == Some(old.as_str()) => {
                        slot.attachment.as_deref()
                    }
                    Some(_) => None,
                };
                let Some(key) = key.map(str::to_string) else {
                    continue;
                };
                if new_skin.attachment(slot_index, &key).is_some() {
                    slot.attachment = Some(key);
                    slot.attachment_skin = Some(new_name.to_string());
                    slot.deform.clear();
                    slot.sequence_index = -1;
                }
            }
        }

        self.update_cache();
        Ok(())
    }

    /// Recomputes `active` for skin-required bones and constraints.
    pub fn update_cache(&mut self) {
        let skin = self.skin.as_deref().and_then(|n| self.data.skin(n));
        for (i, bone) in self.bones.iter_mut().enumerate() {
            let required = self.data.bones.get(i).is_some_and(|b| b.skin_required);
            bone.active = !required || skin.is_some_and(|s| s.bones.contains(&i));
        }
        for (i, c) in self.ik_constraints.iter_mut().enumerate() {
            let required = self.data.ik_constraints.get(i).is_some_and(|d| d.skin_required);
            c.active = !required || skin.is_some_and(|s| s.ik_constraints.contains(&i));
        }
        for (i, c) in self.transform_constraints.iter_mut().enumerate() {
            let required = self
                .data
                .transform_constraints
                .get(i)
                .is_some_and(|d| d.skin_required);
            c.active = !required || skin.is_some_and(|s| s.transform_constraints.contains(&i));
        }
        for (i, c) in self.path_constraints.iter_mut().enumerate() {
            let required = self
                .data
                .path_constraints
                .get(i)
                .is_some_and(|d| d.skin_required);
            c.active = !required || skin.is_some_and(|s| s.path_constraints.contains(&i));
        }
    }

    pub fn set_to_setup_pose(&mut self) {
        self.set_bones_to_setup_pose();
        self.set_slots_to_setup_pose();
    }

    /// Resets bones and constraint mixes.
    pub fn set_bones_to_setup_pose(&mut self) {
        let data = &self.data;
        for bone in &mut self.bones {
            let Some(setup) = data.bones.get(bone.data_index) else {
                continue;
            };
            bone.inherit = setup.inherit;
            bone.x = setup.x;
            bone.y = setup.y;
            bone.rotation = setup.rotation;
            bone.scale_x = setup.scale_x;
            bone.scale_y = setup.scale_y;
            bone.shear_x = setup.shear_x;
            bone.shear_y = setup.shear_y;
        }

        for c in &mut self.ik_constraints {
            if let Some(setup) = data.ik_constraints.get(c.data_index) {
                c.mix = setup.mix;
                c.softness = setup.softness;
                c.bend_direction = setup.bend_direction;
                c.compress = setup.compress;
                c.stretch = setup.stretch;
            }
        }

        for c in &mut self.transform_constraints {
            if let Some(setup) = data.transform_constraints.get(c.data_index) {
                c.mix_rotate = setup.mix_rotate;
                c.mix_x = setup.mix_x;
                c.mix_y = setup.mix_y;
                c.mix_scale_x = setup.mix_scale_x;
                c.mix_scale_y = setup.mix_scale_y;
                c.mix_shear_y = setup.mix_shear_y;
            }
        }

        for c in &mut self.path_constraints {
            if let Some(setup) = data.path_constraints.get(c.data_index) {
                c.position = setup.position;
                c.spacing = setup.spacing;
                c.mix_rotate = setup.mix_rotate;
                c.mix_x = setup.mix_x;
                c.mix_y = setup.mix_y;
            }
        }
    }

    /// Resets slot colors, setup attachments and the draw order.
    pub fn set_slots_to_setup_pose(&mut self) {
        self.draw_order = (0..self.slots.len()).collect();
        for slot_index in 0..self.slots.len() {
            let Some(setup) = self.data.slots.get(slot_index) else {
                continue;
            };
            let color = setup.color;
            let dark_color = setup.dark_color;
            let setup_name = setup.attachment.clone();

            let slot = &mut self.slots[slot_index];
            slot.color = color;
            slot.dark_color = dark_color;
            // Setup always re-resolves, so the sequence restarts even for the same attachment.
            slot.attachment = None;
            slot.attachment_skin = None;
            slot.sequence_index = -1;
            slot.deform.clear();
            self.set_slot_attachment(slot_index, setup_name.as_deref());
        }
    }

    /// Looks an attachment up in the active skin, then in the `default` skin.
    pub fn attachment(&self, slot_index: usize, attachment_name: &str) -> Option<&AttachmentData> {
        resolve_attachment(&self.data, self.skin.as_deref(), slot_index, attachment_name)
            .map(|(_, attachment)| attachment)
    }

    /// The attachment currently shown by a slot.
    pub fn slot_attachment(&self, slot_index: usize) -> Option<&AttachmentData> {
        let slot = self.slots.get(slot_index)?;
        slot_attachment_data(&self.data, slot_index, slot)
    }

    /// Sets a slot's attachment by name, resolving it through the skins. Names that do not
    /// resolve clear the slot. Changing the attachment restarts its sequence and clears the
    /// deform buffer, unless both attachments share deform keys.
    pub fn set_slot_attachment(&mut self, slot_index: usize, attachment_name: Option<&str>) {
        let data = Arc::clone(&self.data);
        let Some(slot) = self.slots.get_mut(slot_index) else {
            return;
        };

        let resolved = attachment_name.and_then(|name| {
            resolve_attachment(&data, self.skin.as_deref(), slot_index, name)
                .map(|(skin, attachment)| (name, skin, attachment))
        });

        let current = slot_attachment_data(&data, slot_index, slot);
        match resolved {
            None => {
                if slot.attachment.is_none() {
                    return;
                }
                slot.attachment = None;
                slot.attachment_skin = None;
                slot.deform.clear();
            }
            Some((name, skin, attachment)) => {
                if slot.attachment.as_deref() == Some(name)
                    && slot.attachment_skin.as_deref() == Some(skin)
                {
                    return;
                }
                let same_deform_target = matches!(
                    (current.and_then(|a| a.vertex_data()), attachment.vertex_data()),
                    (Some(old), Some(new)) if old.timeline_attachment == new.timeline_attachment
                );
                if !same_deform_target {
                    slot.deform.clear();
                }
                slot.attachment = Some(name.to_string());
                slot.attachment_skin = Some(skin.to_string());
            }
        }
        slot.sequence_index = -1;
    }

    /// Restores the slot's setup attachment.
    pub fn set_slot_to_setup_attachment(&mut self, slot_index: usize) {
        let data = Arc::clone(&self.data);
        let name = data
            .slots
            .get(slot_index)
            .and_then(|s| s.attachment.as_deref());
        self.set_slot_attachment(slot_index, name);
    }

    pub fn find_bone(&self, name: &str) -> Option<usize> {
        self.data.bone_index(name)
    }

    pub fn find_slot(&self, name: &str) -> Option<usize> {
        self.data.slot_index(name)
    }
}

fn resolve_attachment<'a>(
    data: &'a SkeletonData,
    skin_name: Option<&str>,
    slot_index: usize,
    attachment_name: &str,
) -> Option<(&'a str, &'a AttachmentData)> {
    if let Some((key, skin)) = skin_name.and_then(|n| data.skins.get_key_value(n)) {
        if let Some(attachment) = skin.attachment(slot_index, attachment_name) {
            return Some((key.as_str(), attachment));
        }
    }
    if skin_name == Some("default") {
        return None;
    }
    let (key, default_skin) = data.skins.get_key_value("default")?;
    default_skin
        .attachment(slot_index, attachment_name)
        .map(|attachment| (key.as_str(), attachment))
}

pub(crate) fn slot_attachment_data<'a>(
    data: &'a SkeletonData,
    slot_index: usize,
    slot: &Slot,
) -> Option<&'a AttachmentData> {
    let name = slot.attachment.as_deref()?;
    let skin = slot.attachment_skin.as_deref()?;
    data.skin(skin)?.attachment(slot_index, name)
}
