use super::test_fixtures::{ARM, ROOT, assert_approx, events, rotate, state_with, translate_x};
use crate::{
    Animation, AnimationState, AnimationStateEvent, AnimationStateListener, Error, ListenerId,
    Skeleton, TrackEntryHandle,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

type Rows = Rc<RefCell<Vec<String>>>;

struct RecordingListener {
    rows: Rows,
}

impl AnimationStateListener for RecordingListener {
    fn on_event(
        &mut self,
        state: &mut AnimationState,
        entry: TrackEntryHandle,
        event: &AnimationStateEvent,
    ) {
        self.rows.borrow_mut().push(describe(state, entry, event));
    }
}

fn describe(state: &AnimationState, entry: TrackEntryHandle, event: &AnimationStateEvent) -> String {
    let name = state
        .track_entry(entry)
        .map_or("?".to_string(), |e| e.animation().name().to_string());
    let event = match event {
        AnimationStateEvent::Start => "start".to_string(),
        AnimationStateEvent::Interrupt => "interrupt".to_string(),
        AnimationStateEvent::End => "end".to_string(),
        AnimationStateEvent::Dispose => "dispose".to_string(),
        AnimationStateEvent::Complete => "complete".to_string(),
        AnimationStateEvent::Event(e) => format!("event {}", e.string),
    };
    format!("{name} {event}")
}

fn record(state: &mut AnimationState) -> Rows {
    let rows = Rows::default();
    state.add_listener(RecordingListener { rows: rows.clone() });
    rows
}

fn take(rows: &Rows) -> Vec<String> {
    std::mem::take(&mut *rows.borrow_mut())
}

/// Applies once, then updates and applies every `step` until `end_time`.
fn run(state: &mut AnimationState, skeleton: &mut Skeleton, step: f32, end_time: f32) {
    state.apply(skeleton);
    let mut time = 0.0;
    while time < end_time {
        time += step;
        state.update(step);
        state.apply(skeleton);
    }
}

fn one_second(name: &str) -> Animation {
    Animation::new(name, vec![rotate(ARM, &[(0.0, 0.0), (1.0, 40.0)])])
}

#[test]
fn replacing_an_applied_entry_interrupts_then_ends_it() {
    let (mut state, mut skeleton) = state_with(vec![one_second("a"), one_second("b")]);
    let rows = record(&mut state);

    state.set_animation_by_name(0, "a", false).unwrap();
    state.apply(&mut skeleton);
    state.update(0.25);
    state.set_animation_by_name(0, "b", false).unwrap();
    state.apply(&mut skeleton);
    state.update(0.25);

    assert_eq!(
        take(&rows),
        vec!["a start", "a interrupt", "b start", "a end", "a dispose"]
    );
}

#[test]
fn replacing_an_entry_never_applied_skips_the_mix() {
    let (mut state, _skeleton) = state_with(vec![one_second("a"), one_second("b")]);
    let rows = record(&mut state);

    state.set_animation_by_name(0, "a", false).unwrap();
    let b = state.set_animation_by_name(0, "b", false).unwrap();

    assert_eq!(
        take(&rows),
        vec!["a start", "a interrupt", "a end", "a dispose", "b start"]
    );
    assert!(state.track_entry(b).unwrap().mixing_from().is_none());
    assert_eq!(state.live_entries(), 1);
}

#[test]
fn track_end_completes_then_ends_and_disposes() {
    let (mut state, mut skeleton) = state_with(vec![one_second("a")]);
    let rows = record(&mut state);

    let entry = state.set_animation_by_name(0, "a", false).unwrap();
    state.track_entry_mut(entry).unwrap().track_end = 1.0;
    run(&mut state, &mut skeleton, 0.25, 1.5);

    assert_eq!(take(&rows), vec!["a start", "a complete", "a end", "a dispose"]);
    assert!(state.current(0).is_none());
    assert!(state.track_entry(entry).is_none());
}

fn stepping() -> Animation {
    Animation::with_duration("steps", vec![events(&[0.5, 1.8])], 2.0)
}

#[test]
fn loop_wrap_fires_tail_event_then_complete_then_head_event() {
    let (mut state, mut skeleton) = state_with(vec![stepping()]);
    let rows = record(&mut state);
    state.set_animation_by_name(0, "steps", true).unwrap();
    state.apply(&mut skeleton);
    state.update(1.7);
    state.apply(&mut skeleton);
    assert_eq!(take(&rows), vec!["steps start", "steps event 0.5"]);

    state.update(0.9);
    state.apply(&mut skeleton);
    assert_eq!(
        take(&rows),
        vec!["steps event 1.8", "steps complete", "steps event 0.5"]
    );
}

#[test]
fn loop_wrap_without_events_in_range_only_completes() {
    let (mut state, mut skeleton) = state_with(vec![stepping()]);
    let rows = record(&mut state);
    state.set_animation_by_name(0, "steps", true).unwrap();
    state.apply(&mut skeleton);
    state.update(1.7);
    state.apply(&mut skeleton);
    state.update(0.2);
    state.apply(&mut skeleton);
    assert_eq!(
        take(&rows),
        vec!["steps start", "steps event 0.5", "steps event 1.8"]
    );

    // 1.9 -> 2.3: the 1.8 key already fired and 0.3 is before 0.5.
    state.update(0.4);
    state.apply(&mut skeleton);
    assert_eq!(take(&rows), vec!["steps complete"]);
}

#[test]
fn updates_without_apply_keep_the_last_applied_time_for_events() {
    let (mut state, mut skeleton) = state_with(vec![stepping()]);
    let rows = record(&mut state);
    state.set_animation_by_name(0, "steps", true).unwrap();
    state.apply(&mut skeleton);
    state.update(1.7);
    state.apply(&mut skeleton);
    assert_eq!(take(&rows), vec!["steps start", "steps event 0.5"]);

    // Nothing applied at 1.9, so the next apply covers 1.7 -> 2.3 and the 1.8 key sits
    // before the loop boundary.
    state.update(0.2);
    state.update(0.4);
    state.apply(&mut skeleton);
    assert_eq!(take(&rows), vec!["steps event 1.8", "steps complete"]);
}

#[test]
fn reversed_entries_fire_no_events() {
    let (mut state, mut skeleton) = state_with(vec![stepping()]);
    let rows = record(&mut state);
    let entry = state.set_animation_by_name(0, "steps", true).unwrap();
    state.track_entry_mut(entry).unwrap().reverse = true;
    run(&mut state, &mut skeleton, 0.25, 1.0);
    assert_eq!(take(&rows), vec!["steps start"]);
}

#[test]
fn add_animation_delay_is_relative_to_previous_end_minus_mix() {
    let (mut state, _skeleton) = state_with(vec![one_second("a"), one_second("b")]);
    state.data_mut().set_default_mix(0.25).unwrap();

    state.set_animation_by_name(0, "a", false).unwrap();
    let b = state.add_animation_by_name(0, "b", false, 0.0).unwrap();
    let entry = state.track_entry(b).unwrap();
    assert_approx(entry.mix_duration, 0.25);
    assert_approx(entry.delay, 0.75);

    let empty = state.add_empty_animation(0, 0.5, 0.0);
    let entry = state.track_entry(empty).unwrap();
    assert_approx(entry.delay, 0.5);
    assert_approx(entry.mix_duration, 0.5);
    assert_approx(entry.track_end, 0.5);
    assert!(Arc::ptr_eq(entry.animation(), state.empty_animation()));
    assert_eq!(
        state.track_entry(b).unwrap().next(),
        Some(empty),
        "queued entries are linked in order"
    );
    assert_eq!(state.track_entry(empty).unwrap().previous(), Some(b));
}

#[test]
fn add_animation_on_empty_track_starts_immediately() {
    let (mut state, _skeleton) = state_with(vec![one_second("a")]);
    let rows = record(&mut state);
    let entry = state.add_animation_by_name(2, "a", false, -1.0).unwrap();
    assert_eq!(take(&rows), vec!["a start"]);
    assert_eq!(state.current(2), Some(entry));
    assert_eq!(state.tracks_len(), 3);
    assert_approx(state.track_entry(entry).unwrap().delay, 0.0);
}

#[test]
fn queued_entry_becomes_current_when_delay_elapses() {
    let (mut state, mut skeleton) = state_with(vec![one_second("a"), one_second("b")]);
    let rows = record(&mut state);

    let a = state.set_animation_by_name(0, "a", false).unwrap();
    let b = state.add_animation_by_name(0, "b", false, 0.0).unwrap();
    assert_approx(state.track_entry(b).unwrap().delay, 1.0);

    state.apply(&mut skeleton);
    for _ in 0..4 {
        assert!(!a.is_next_ready(&state));
        state.update(0.25);
        state.apply(&mut skeleton);
    }
    assert!(a.is_next_ready(&state));
    state.update(0.25);
    assert_eq!(state.current(0), Some(b));
    assert_approx(state.track_entry(b).unwrap().track_time, 0.25);
    state.apply(&mut skeleton);
    state.update(0.25);

    assert_eq!(
        take(&rows),
        vec![
            "a start",
            "a complete",
            "a interrupt",
            "b start",
            "a end",
            "a dispose"
        ]
    );
}

#[test]
fn clearing_a_track_unlinks_and_frees_every_entry() {
    let (mut state, mut skeleton) =
        state_with(vec![one_second("a"), one_second("b"), one_second("c")]);
    state.data_mut().set_default_mix(0.5).unwrap();
    let rows = record(&mut state);

    let a = state.set_animation_by_name(0, "a", false).unwrap();
    state.apply(&mut skeleton);
    state.update(0.25);
    let b = state.set_animation_by_name(0, "b", false).unwrap();
    let c = state.add_animation_by_name(0, "c", false, 0.0).unwrap();
    state.apply(&mut skeleton);
    take(&rows);

    state.clear_track(0);
    assert_eq!(
        take(&rows),
        vec!["b end", "b dispose", "c dispose", "a end", "a dispose"]
    );
    assert!(state.current(0).is_none());
    for handle in [a, b, c] {
        assert!(state.track_entry(handle).is_none());
    }
    assert_eq!(state.live_entries(), 0);

    // Freed slots are reused without resurrecting old handles.
    let d = state.set_animation_by_name(0, "a", false).unwrap();
    let entry = state.track_entry(d).unwrap();
    assert!(entry.mixing_from().is_none() && entry.next().is_none());
    for handle in [a, b, c] {
        assert!(state.track_entry(handle).is_none());
    }
}

#[test]
fn clear_tracks_empties_every_track() {
    let (mut state, mut skeleton) = state_with(vec![one_second("a")]);
    let rows = record(&mut state);
    state.set_animation_by_name(0, "a", true).unwrap();
    state.set_animation_by_name(3, "a", true).unwrap();
    state.apply(&mut skeleton);
    take(&rows);

    state.clear_tracks();
    assert_eq!(take(&rows), vec!["a end", "a dispose", "a end", "a dispose"]);
    assert_eq!(state.tracks_len(), 0);
    assert!(!state.apply(&mut skeleton));
}

#[test]
fn set_empty_animations_mixes_every_track_back_to_setup() {
    let (mut state, mut skeleton) = state_with(vec![
        Animation::new("arm", vec![rotate(ARM, &[(0.0, 0.0), (1.0, 90.0)])]),
        Animation::new("root", vec![translate_x(ROOT, &[(0.0, 0.0), (1.0, 20.0)])]),
    ]);
    state.set_animation_by_name(0, "arm", true).unwrap();
    state.set_animation_by_name(1, "root", true).unwrap();
    state.apply(&mut skeleton);
    state.update(0.25);
    state.apply(&mut skeleton);
    assert_approx(skeleton.bones[ARM].rotation, 32.5);
    assert_approx(skeleton.bones[ROOT].x, 5.0);

    state.set_empty_animations(0.5);
    for track in 0..2 {
        let current = state.current(track).unwrap();
        let entry = state.track_entry(current).unwrap();
        assert_eq!(entry.animation().name(), "<empty>");
        assert_approx(entry.mix_duration, 0.5);
    }

    for _ in 0..6 {
        state.update(0.25);
        state.apply(&mut skeleton);
    }
    assert_approx(skeleton.bones[ARM].rotation, 10.0);
    assert_approx(skeleton.bones[ROOT].x, 0.0);
    assert!(state.current(0).is_none() && state.current(1).is_none());
    assert_eq!(state.live_entries(), 0);
}

#[test]
fn empty_animation_is_owned_per_state() {
    let (a, _) = state_with(Vec::new());
    let (b, _) = state_with(Vec::new());
    assert!(!Arc::ptr_eq(a.empty_animation(), b.empty_animation()));
    assert_eq!(a.empty_animation().name(), "<empty>");
    assert_approx(a.empty_animation().duration(), 0.0);
}

#[test]
fn unknown_animation_names_are_errors() {
    let (mut state, _) = state_with(vec![one_second("a")]);
    let err = state.set_animation_by_name(0, "missing", false).unwrap_err();
    assert!(matches!(err, Error::UnknownAnimation { ref name } if name == "missing"));
    assert!(state.add_animation_by_name(0, "missing", false, 0.0).is_err());
    assert_eq!(state.tracks_len(), 0);
}

#[test]
fn listeners_may_change_animations_while_notified() {
    let (mut state, mut skeleton) = state_with(vec![one_second("a"), one_second("b")]);
    let b = state.data().skeleton_data().find_animation("b").unwrap();
    let rows = record(&mut state);
    state.add_listener(
        move |state: &mut AnimationState, entry: TrackEntryHandle, event: &AnimationStateEvent| {
            let is_a = state
                .track_entry(entry)
                .is_some_and(|e| e.animation().name() == "a");
            if is_a && *event == AnimationStateEvent::Complete {
                state.set_animation(0, Arc::clone(&b), false);
            }
        },
    );

    state.set_animation_by_name(0, "a", false).unwrap();
    run(&mut state, &mut skeleton, 0.25, 1.0);

    assert_eq!(
        take(&rows),
        vec!["a start", "a complete", "a interrupt", "b start"]
    );
    let current = state.current(0).unwrap();
    assert_eq!(state.track_entry(current).unwrap().animation().name(), "b");
}

#[test]
fn entry_listener_runs_before_global_listeners() {
    let (mut state, _) = state_with(vec![one_second("a"), one_second("b")]);
    let rows = record(&mut state);

    state.set_animation_by_name(0, "a", false).unwrap();
    let b = state.add_animation_by_name(0, "b", false, 0.0).unwrap();
    let entry_rows = rows.clone();
    state.track_entry_mut(b).unwrap().set_listener(
        move |state: &mut AnimationState, entry: TrackEntryHandle, event: &AnimationStateEvent| {
            entry_rows
                .borrow_mut()
                .push(format!("entry: {}", describe(state, entry, event)));
        },
    );
    take(&rows);

    state.clear_track(0);
    assert_eq!(
        take(&rows),
        vec![
            "a end",
            "a dispose",
            "entry: b dispose",
            "b dispose",
        ]
    );
}

#[test]
fn removing_a_listener_during_delivery_skips_it() {
    let (mut state, _) = state_with(vec![one_second("a")]);
    let victim: Rc<Cell<Option<ListenerId>>> = Rc::default();
    let removed = Rc::new(Cell::new(false));

    let victim_id = victim.clone();
    let removed_flag = removed.clone();
    state.add_listener(
        move |state: &mut AnimationState, _: TrackEntryHandle, _: &AnimationStateEvent| {
            if let Some(id) = victim_id.take() {
                removed_flag.set(state.remove_listener(id));
            }
        },
    );
    let rows = record(&mut state);
    victim.set(Some(state.add_listener(RecordingListener { rows: rows.clone() })));

    state.set_animation_by_name(0, "a", false).unwrap();
    assert!(removed.get());
    // Only the listener that was never removed saw the start.
    assert_eq!(take(&rows), vec!["a start"]);

    state.clear_track(0);
    assert_eq!(take(&rows), vec!["a end", "a dispose"]);
}

#[test]
fn entry_listener_that_clears_itself_stays_cleared() {
    let (mut state, mut skeleton) = state_with(vec![one_second("a")]);
    let completes = Rc::new(Cell::new(0u32));

    let entry = state.set_animation_by_name(0, "a", true).unwrap();
    let count = completes.clone();
    state.track_entry_mut(entry).unwrap().set_listener(
        move |state: &mut AnimationState, entry: TrackEntryHandle, event: &AnimationStateEvent| {
            if matches!(event, AnimationStateEvent::Complete) {
                count.set(count.get() + 1);
                state.track_entry_mut(entry).unwrap().clear_listener();
            }
        },
    );
    run(&mut state, &mut skeleton, 0.5, 3.0);

    // Completions at 1, 2 and 3 seconds; only the first reached the listener.
    assert_eq!(completes.get(), 1);
}

#[test]
fn removed_and_cleared_listeners_stop_receiving() {
    let (mut state, _) = state_with(vec![one_second("a")]);
    let rows = record(&mut state);
    let other = Rows::default();
    let id = state.add_listener(RecordingListener { rows: other.clone() });

    assert!(state.remove_listener(id));
    assert!(!state.remove_listener(id));
    state.set_animation_by_name(0, "a", false).unwrap();
    assert_eq!(take(&rows), vec!["a start"]);
    assert!(other.borrow().is_empty());

    state.clear_listeners();
    state.clear_track(0);
    assert!(rows.borrow().is_empty());
}

#[test]
fn clearing_notifications_still_frees_ended_entries() {
    let (mut state, mut skeleton) =
        state_with(vec![one_second("a"), one_second("b"), one_second("c")]);
    state.data_mut().set_default_mix(0.5).unwrap();
    let rows = record(&mut state);
    state.add_listener(
        |state: &mut AnimationState, _: TrackEntryHandle, event: &AnimationStateEvent| {
            if *event == AnimationStateEvent::End {
                state.clear_listener_notifications();
            }
        },
    );

    state.set_animation_by_name(0, "a", false).unwrap();
    state.apply(&mut skeleton);
    state.update(0.25);
    state.set_animation_by_name(0, "b", false).unwrap();
    state.add_animation_by_name(0, "c", false, 0.0).unwrap();
    state.apply(&mut skeleton);
    take(&rows);

    state.clear_track(0);
    // The recording listener runs first and sees the end of b, then the queue is dropped.
    assert_eq!(take(&rows), vec!["b end"]);
    assert_eq!(state.live_entries(), 0);
}

#[test]
fn apply_reports_whether_anything_was_applied() {
    let (mut state, mut skeleton) = state_with(vec![one_second("a")]);
    assert!(!state.apply(&mut skeleton));

    state.add_animation_by_name(0, "a", false, 0.0).unwrap();
    assert!(state.apply(&mut skeleton));

    let (mut state, mut skeleton) = state_with(vec![one_second("a")]);
    let entry = state.set_animation_by_name(0, "a", false).unwrap();
    state.track_entry_mut(entry).unwrap().delay = 0.5;
    assert!(!state.apply(&mut skeleton));
    state.update(0.5);
    assert!(state.apply(&mut skeleton));
}

#[test]
fn time_scales_multiply() {
    let (mut state, _) = state_with(vec![one_second("a")]);
    let entry = state.set_animation_by_name(0, "a", true).unwrap();
    state.set_time_scale(2.0);
    state.track_entry_mut(entry).unwrap().time_scale = 0.5;
    state.update(0.25);
    assert_approx(state.track_entry(entry).unwrap().track_time, 0.25);
    assert_approx(state.time_scale(), 2.0);
}

#[test]
fn track_entry_times() {
    let (mut state, mut skeleton) = state_with(vec![Animation::with_duration(
        "long",
        Vec::new(),
        4.0,
    )]);
    let entry = state.set_animation_by_name(0, "long", true).unwrap();
    {
        let e = state.track_entry_mut(entry).unwrap();
        e.animation_start = 1.0;
        e.animation_end = 3.0;
        e.track_time = 5.0;
        assert_approx(e.animation_time(), 2.0);
        assert_approx(e.track_complete(), 6.0);
        assert!(e.is_complete());
        assert!(!e.was_applied());

        e.looped = false;
        e.track_time = 0.5;
        assert_approx(e.animation_time(), 1.5);
        assert_approx(e.track_complete(), 2.0);
        assert!(!e.is_complete());
        e.track_time = 3.0;
        assert_approx(e.animation_time(), 3.0);
    }
    state.apply(&mut skeleton);
    assert!(state.track_entry(entry).unwrap().was_applied());
}

#[test]
fn mix_pairs_are_directional_and_overwritable() {
    let (mut state, _) = state_with(vec![one_second("a"), one_second("b"), one_second("c")]);
    let data = state.data_mut();
    data.set_default_mix(0.2).unwrap();
    data.set_mix("a", "b", 0.4).unwrap();
    data.set_mix("a", "c", 0.3).unwrap();
    data.set_mix("a", "b", 0.5).unwrap();

    let skeleton_data = Arc::clone(data.skeleton_data());
    let [a, b, c] = ["a", "b", "c"].map(|name| skeleton_data.find_animation(name).unwrap());
    assert_approx(data.mix(&a, &b), 0.5);
    assert_approx(data.mix(&a, &c), 0.3);
    assert_approx(data.mix(&b, &a), 0.2);
    assert_approx(data.mix(&c, &c), 0.2);

    state.set_animation_by_name(0, "a", false).unwrap();
    let b = state.add_animation_by_name(0, "b", false, 0.0).unwrap();
    assert_approx(state.track_entry(b).unwrap().mix_duration, 0.5);
}

#[test]
fn set_mix_duration_with_delay_recomputes_queue_delay() {
    let (mut state, _) = state_with(vec![one_second("a"), one_second("b")]);
    state.set_animation_by_name(0, "a", false).unwrap();
    let b = state.add_animation_by_name(0, "b", false, 0.0).unwrap();
    assert_approx(state.track_entry(b).unwrap().delay, 1.0);

    b.set_mix_duration_with_delay(&mut state, 0.4, 0.0);
    let entry = state.track_entry(b).unwrap();
    assert_approx(entry.mix_duration, 0.4);
    assert_approx(entry.delay, 0.6);

    b.set_mix_duration_with_delay(&mut state, 0.4, 2.0);
    assert_approx(state.track_entry(b).unwrap().delay, 2.0);
}
