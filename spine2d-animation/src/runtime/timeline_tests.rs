use super::test_fixtures::{ARM, ROOT, assert_approx, bone_timeline, rotate, skeleton_data};
use crate::{
    BoneTimelineKind, IkConstraintData, IkConstraintTimeline, Inherit, InheritTimeline, MixBlend,
    MixDirection, PathConstraintData, PathConstraintTimeline, PathConstraintTimelineKind,
    Property, PropertyId, Skeleton, Timeline, TimelineKind, TransformConstraintData,
    TransformConstraintTimeline,
};
use std::sync::Arc;

fn apply(
    timeline: &Timeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
    direction: MixDirection,
) {
    timeline.apply(skeleton, -1.0, time, None, alpha, blend, direction);
}

fn skeleton() -> Skeleton {
    Skeleton::new(Arc::new(skeleton_data()))
}

#[test]
fn setup_blend_apply_is_idempotent() {
    let mut skeleton = skeleton();
    let zero = rotate(ARM, &[(0.0, 0.0), (1.0, 0.0)]);
    apply(&zero, &mut skeleton, 0.5, 1.0, MixBlend::Setup, MixDirection::In);
    assert_approx(skeleton.bones[ARM].rotation, 10.0);

    let keyed = rotate(ARM, &[(0.0, 20.0), (1.0, 40.0)]);
    apply(&keyed, &mut skeleton, 0.5, 1.0, MixBlend::Setup, MixDirection::In);
    let once = skeleton.bones[ARM].rotation;
    apply(&keyed, &mut skeleton, 0.5, 1.0, MixBlend::Setup, MixDirection::In);
    assert_approx(skeleton.bones[ARM].rotation, once);
    assert_approx(once, 40.0);
}

#[test]
fn rotate_keys_are_offsets_from_setup() {
    let mut skeleton = skeleton();
    let timeline = rotate(ARM, &[(0.0, 0.0), (1.0, 90.0)]);

    apply(&timeline, &mut skeleton, 0.5, 1.0, MixBlend::Replace, MixDirection::In);
    assert_approx(skeleton.bones[ARM].rotation, 55.0);

    skeleton.set_to_setup_pose();
    apply(&timeline, &mut skeleton, 0.5, 0.5, MixBlend::Replace, MixDirection::In);
    assert_approx(skeleton.bones[ARM].rotation, 32.5);

    skeleton.set_to_setup_pose();
    apply(&timeline, &mut skeleton, 1.0, 0.5, MixBlend::Add, MixDirection::In);
    assert_approx(skeleton.bones[ARM].rotation, 55.0);
}

#[test]
fn before_first_key_depends_on_blend() {
    let timeline = translate_x_from(1.0);
    let mut skeleton = skeleton();

    skeleton.bones[ARM].x = 25.0;
    apply(&timeline, &mut skeleton, 0.5, 1.0, MixBlend::Replace, MixDirection::In);
    assert_approx(skeleton.bones[ARM].x, 25.0);

    apply(&timeline, &mut skeleton, 0.5, 0.5, MixBlend::First, MixDirection::In);
    assert_approx(skeleton.bones[ARM].x, 15.0);

    apply(&timeline, &mut skeleton, 0.5, 0.5, MixBlend::Setup, MixDirection::In);
    assert_approx(skeleton.bones[ARM].x, 5.0);
}

fn translate_x_from(start: f32) -> Timeline {
    bone_timeline(BoneTimelineKind::TranslateX, ARM, &[(start, 10.0), (start + 1.0, 20.0)])
}

#[test]
fn scale_mix_takes_sign_of_target_when_mixing_in() {
    let timeline = bone_timeline(BoneTimelineKind::ScaleX, ROOT, &[(0.0, -1.0)]);
    let mut skeleton = skeleton();

    apply(&timeline, &mut skeleton, 0.0, 0.5, MixBlend::Replace, MixDirection::In);
    assert_approx(skeleton.bones[ROOT].scale_x, -1.0);

    skeleton.set_to_setup_pose();
    apply(&timeline, &mut skeleton, 0.0, 0.5, MixBlend::Replace, MixDirection::Out);
    assert_approx(skeleton.bones[ROOT].scale_x, 1.0);
}

#[test]
fn scale_timeline_multiplies_setup() {
    let mut data = skeleton_data();
    data.bones[ROOT].scale_x = 2.0;
    data.bones[ROOT].scale_y = 3.0;
    let mut skeleton = Skeleton::new(Arc::new(data));
    let mut timeline = crate::BoneTimeline::new(BoneTimelineKind::Scale, 1, 0, ROOT);
    timeline.set_frame(0, 0.0, &[1.5, 0.5]);
    let timeline = Timeline::from(timeline);

    apply(&timeline, &mut skeleton, 0.0, 1.0, MixBlend::Replace, MixDirection::In);
    assert_approx(skeleton.bones[ROOT].scale_x, 3.0);
    assert_approx(skeleton.bones[ROOT].scale_y, 1.5);
}

#[test]
fn inactive_bones_are_left_alone() {
    let mut skeleton = skeleton();
    skeleton.bones[ARM].active = false;
    let timeline = rotate(ARM, &[(0.0, 45.0)]);
    apply(&timeline, &mut skeleton, 0.0, 1.0, MixBlend::Setup, MixDirection::In);
    assert_approx(skeleton.bones[ARM].rotation, 10.0);
}

#[test]
fn inherit_is_discrete_and_restored_on_mix_out() {
    let mut skeleton = skeleton();
    let mut timeline = InheritTimeline::new(1, ARM);
    timeline.set_frame(0, 0.5, Inherit::NoScale);
    let timeline = Timeline::from(timeline);

    apply(&timeline, &mut skeleton, 1.0, 0.1, MixBlend::Replace, MixDirection::In);
    assert_eq!(skeleton.bones[ARM].inherit, Inherit::NoScale);

    apply(&timeline, &mut skeleton, 1.0, 0.1, MixBlend::Setup, MixDirection::Out);
    assert_eq!(skeleton.bones[ARM].inherit, Inherit::Normal);
}

fn constrained_skeleton() -> Skeleton {
    let mut data = skeleton_data();
    data.ik_constraints.push(IkConstraintData {
        name: "ik".to_string(),
        skin_required: false,
        bones: vec![ARM],
        target: ROOT,
        mix: 1.0,
        softness: 0.0,
        bend_direction: 1,
        compress: false,
        stretch: false,
    });
    data.transform_constraints.push(TransformConstraintData {
        name: "transform".to_string(),
        skin_required: false,
        bones: vec![ARM],
        source: ROOT,
        mix_rotate: 1.0,
        mix_x: 1.0,
        mix_y: 1.0,
        mix_scale_x: 1.0,
        mix_scale_y: 1.0,
        mix_shear_y: 1.0,
    });
    data.path_constraints.push(PathConstraintData {
        name: "path".to_string(),
        skin_required: false,
        bones: vec![ARM],
        target: 0,
        position: 0.0,
        spacing: 10.0,
        mix_rotate: 1.0,
        mix_x: 1.0,
        mix_y: 1.0,
    });
    Skeleton::new(Arc::new(data))
}

#[test]
fn ik_mix_interpolates_and_flags_are_discrete() {
    let mut skeleton = constrained_skeleton();
    let mut timeline = IkConstraintTimeline::new(1, 0, 0);
    timeline.set_frame(0, 0.0, 0.0, 2.0, -1, true, false);
    let timeline = Timeline::from(timeline);

    apply(&timeline, &mut skeleton, 0.0, 0.5, MixBlend::Setup, MixDirection::Out);
    let ik = &skeleton.ik_constraints[0];
    assert_approx(ik.mix, 0.5);
    assert_approx(ik.softness, 1.0);
    assert_eq!(ik.bend_direction, 1);
    assert!(!ik.compress);

    apply(&timeline, &mut skeleton, 0.0, 1.0, MixBlend::Replace, MixDirection::In);
    let ik = &skeleton.ik_constraints[0];
    assert_approx(ik.mix, 0.0);
    assert_eq!(ik.bend_direction, -1);
    assert!(ik.compress);
}

#[test]
fn transform_and_path_mixes_are_absolute() {
    let mut skeleton = constrained_skeleton();
    let mut transform = TransformConstraintTimeline::new(1, 0, 0);
    transform.set_frame(0, 0.0, [0.0, 0.5, 0.5, 0.0, 0.0, 0.25]);
    let transform = Timeline::from(transform);
    apply(&transform, &mut skeleton, 0.0, 1.0, MixBlend::Replace, MixDirection::In);
    let c = &skeleton.transform_constraints[0];
    assert_approx(c.mix_rotate, 0.0);
    assert_approx(c.mix_x, 0.5);
    assert_approx(c.mix_shear_y, 0.25);

    let mut position = PathConstraintTimeline::new(PathConstraintTimelineKind::Position, 2, 0, 0);
    position.set_frame(0, 0.0, &[0.0]);
    position.set_frame(1, 1.0, &[1.0]);
    let position = Timeline::from(position);
    apply(&position, &mut skeleton, 0.5, 0.5, MixBlend::Setup, MixDirection::In);
    assert_approx(skeleton.path_constraints[0].position, 0.25);

    let mut mix = PathConstraintTimeline::new(PathConstraintTimelineKind::Mix, 1, 0, 0);
    mix.set_frame(0, 0.0, &[0.0, 0.5, 1.0]);
    let mix = Timeline::from(mix);
    apply(&mix, &mut skeleton, 0.0, 1.0, MixBlend::Replace, MixDirection::In);
    let c = &skeleton.path_constraints[0];
    assert_approx(c.mix_rotate, 0.0);
    assert_approx(c.mix_x, 0.5);
    assert_approx(c.mix_y, 1.0);
}

#[test]
fn property_ids_identify_property_and_target() {
    assert_eq!(PropertyId::new(Property::Rotate, 3).to_string(), "rotate|3");
    assert_eq!(PropertyId::global(Property::DrawOrder).to_string(), "drawOrder");
    assert_eq!(
        PropertyId::with_target(Property::Deform, 1, 7).to_string(),
        "deform|1|7"
    );

    let translate = bone_timeline(BoneTimelineKind::Translate, ARM, &[]);
    assert_eq!(translate.kind(), TimelineKind::Translate);
    assert_eq!(
        translate.property_ids(),
        vec![
            PropertyId::new(Property::X, ARM),
            PropertyId::new(Property::Y, ARM)
        ]
    );
    assert!(translate.as_rotate().is_none());
    assert!(rotate(ARM, &[]).as_rotate().is_some());
}
