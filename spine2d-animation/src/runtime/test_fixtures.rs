use crate::{
    Animation, AnimationState, AnimationStateData, AttachmentData, AttachmentTimeline, BoneData,
    BoneTimeline, BoneTimelineKind, Event, EventData, EventTimeline, MeshAttachmentData,
    MeshVertices, RegionAttachmentData, SequenceData, Skeleton, SkeletonData, SkinData, SlotData,
    Timeline, VertexAttachmentData,
};
use std::sync::Arc;

pub(crate) fn assert_approx(actual: f32, expected: f32) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= 1.0e-4,
        "expected {expected}, got {actual} (diff {diff})"
    );
}

pub(crate) const ROOT: usize = 0;
pub(crate) const ARM: usize = 1;
pub(crate) const BODY_SLOT: usize = 0;
pub(crate) const MESH_SLOT: usize = 1;

/// Two bones (`root`, `arm` rotated 10 degrees at setup) and two slots. `body` shows the
/// `body` region at setup and can switch to `body-alt` or the sequenced `body-seq`; `mesh`
/// shows an unweighted four-vertex mesh.
pub(crate) fn skeleton_data() -> SkeletonData {
    let mut data = SkeletonData::new("fixture");
    data.bones.push(BoneData::new("root", None));
    let mut arm = BoneData::new("arm", Some(ROOT));
    arm.rotation = 10.0;
    arm.x = 5.0;
    data.bones.push(arm);

    let mut body = SlotData::new("body", ROOT);
    body.attachment = Some("body".to_string());
    data.slots.push(body);
    let mut mesh = SlotData::new("mesh", ARM);
    mesh.attachment = Some("mesh".to_string());
    data.slots.push(mesh);

    let mut skin = SkinData::new("default");
    for name in ["body", "body-alt"] {
        skin.set_attachment(BODY_SLOT, name, region(name, None));
    }
    skin.set_attachment(BODY_SLOT, "body-seq", region("body-seq", Some(SequenceData::new(4))));
    skin.set_attachment(
        MESH_SLOT,
        "mesh",
        AttachmentData::Mesh(MeshAttachmentData {
            name: "mesh".to_string(),
            path: "mesh".to_string(),
            vertex: VertexAttachmentData::new(MeshVertices::Unweighted(vec![
                0.0, 0.0, 10.0, 0.0, 10.0, 10.0, 0.0, 10.0,
            ])),
            sequence: None,
            color: [1.0; 4],
        }),
    );
    data.skins.insert("default".to_string(), skin);
    data.events
        .insert("footstep".to_string(), EventData::new("footstep"));
    data
}

fn region(name: &str, sequence: Option<SequenceData>) -> AttachmentData {
    AttachmentData::Region(RegionAttachmentData {
        name: name.to_string(),
        path: name.to_string(),
        sequence,
        color: [1.0; 4],
    })
}

/// The vertex data of the fixture mesh attachment.
pub(crate) fn mesh_vertex_data(data: &SkeletonData) -> VertexAttachmentData {
    match data.skin("default").and_then(|s| s.attachment(MESH_SLOT, "mesh")) {
        Some(AttachmentData::Mesh(mesh)) => mesh.vertex.clone(),
        other => panic!("fixture mesh missing: {other:?}"),
    }
}

/// The sequence of the fixture `body-seq` region.
pub(crate) fn body_sequence(data: &SkeletonData) -> SequenceData {
    data.skin("default")
        .and_then(|s| s.attachment(BODY_SLOT, "body-seq"))
        .and_then(AttachmentData::sequence)
        .cloned()
        .expect("fixture sequence")
}

/// Linear single-value bone timeline.
pub(crate) fn bone_timeline(kind: BoneTimelineKind, bone: usize, keys: &[(f32, f32)]) -> Timeline {
    let mut timeline = BoneTimeline::new(kind, keys.len(), 0, bone);
    for (frame, (time, value)) in keys.iter().enumerate() {
        timeline.set_frame(frame, *time, &[*value]);
    }
    timeline.into()
}

pub(crate) fn rotate(bone: usize, keys: &[(f32, f32)]) -> Timeline {
    bone_timeline(BoneTimelineKind::Rotate, bone, keys)
}

pub(crate) fn translate_x(bone: usize, keys: &[(f32, f32)]) -> Timeline {
    bone_timeline(BoneTimelineKind::TranslateX, bone, keys)
}

pub(crate) fn attachments(slot: usize, keys: &[(f32, Option<&str>)]) -> Timeline {
    let mut timeline = AttachmentTimeline::new(keys.len(), slot);
    for (frame, (time, name)) in keys.iter().enumerate() {
        timeline.set_frame(frame, *time, *name);
    }
    timeline.into()
}

/// Event timeline whose events carry their key time as the string payload.
pub(crate) fn events(times: &[f32]) -> Timeline {
    let data = EventData::new("footstep");
    let events = times
        .iter()
        .map(|&time| {
            let mut event = Event::new(time, &data);
            event.string = format!("{time}");
            event
        })
        .collect();
    EventTimeline::new(events).into()
}

/// A state and skeleton over the fixture data with `animations` registered.
pub(crate) fn state_with(animations: Vec<Animation>) -> (AnimationState, Skeleton) {
    let mut data = skeleton_data();
    for animation in animations {
        data.add_animation(animation);
    }
    let data = Arc::new(data);
    let state = AnimationState::new(AnimationStateData::new(Arc::clone(&data)));
    (state, Skeleton::new(data))
}
