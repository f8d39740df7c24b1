//! scenario_revision_and_freeze
//!
//! Validates:
//! 1) `5,5,9,5,5` under BOUNDED_DELTA(1) emits `5,5,5,5,5`.
//! 2) `5,5,7,7,7` revises the transitional frame and makes 7 the baseline.
//! 3) Frames are emitted incrementally and never revised after closing.
//! 4) A terminal value freezes every field from that frame on.

use gsr_reconcile::{FieldModel, FieldModelSet};
use gsr_schemas::{FieldValue, FrameIndex, Provenance, RawFrame};
use gsr_timeline::{assemble, SessionState, TimelineBuilder};

fn gold_stream(values: &[i64]) -> Vec<RawFrame> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| RawFrame::new(i as u64, 0.0).with_reading("gold", Some(FieldValue::Int(*v))))
        .collect()
}

fn gold_models() -> FieldModelSet {
    FieldModelSet::new(vec![FieldModel::bounded_delta("gold", 1)]).unwrap()
}

fn ints(series: Vec<Option<FieldValue>>) -> Vec<i64> {
    series.into_iter().flatten().filter_map(|v| v.as_int()).collect()
}

#[test]
fn transient_noise_is_suppressed() {
    let (timeline, quality) = assemble(gold_models(), &gold_stream(&[5, 5, 9, 5, 5])).unwrap();
    assert_eq!(ints(timeline.series("gold")), vec![5, 5, 5, 5, 5]);
    assert_eq!(timeline.frames()[2].provenance["gold"], Provenance::Held);
    assert_eq!(quality.field("gold").unwrap().suspect_superseded, 1);
}

#[test]
fn corroborated_change_revises_transitional_frame() {
    let (timeline, quality) = assemble(gold_models(), &gold_stream(&[5, 5, 7, 7, 7])).unwrap();
    assert_eq!(ints(timeline.series("gold")), vec![5, 5, 7, 7, 7]);
    assert_eq!(timeline.frames()[2].provenance["gold"], Provenance::Revised);
    assert_eq!(timeline.frames()[3].provenance["gold"], Provenance::Observed);
    assert_eq!(quality.field("gold").unwrap().revised_frames, 1);
}

#[test]
fn closed_frames_are_never_revised() {
    let mut builder = TimelineBuilder::new(gold_models());
    let mut emitted = Vec::new();
    for raw in gold_stream(&[5, 5, 40, 40, 41, 41]) {
        let closed = builder.push(&raw).unwrap();
        for state in &closed {
            // Nothing that is already closed may appear again.
            assert!(emitted.iter().all(|f: &FrameIndex| *f < state.frame));
            emitted.push(state.frame);
        }
    }
    // Frame 2 was held open while 40 was under suspicion.
    assert_eq!(builder.closed().len(), 6);
    let (timeline, _) = builder.finish().unwrap();
    assert_eq!(ints(timeline.series("gold")), vec![5, 5, 40, 40, 41, 41]);
}

#[test]
fn terminal_flag_freezes_remaining_frames() {
    let models = FieldModelSet::new(vec![
        FieldModel::counter("kills"),
        FieldModel::bounded_delta("gold", 10),
        FieldModel::terminal_flag("game_over"),
    ])
    .unwrap();
    let frame = |i: FrameIndex, kills: i64, gold: i64, over: bool| {
        RawFrame::new(i, i as f64)
            .with_reading("kills", Some(FieldValue::Int(kills)))
            .with_reading("gold", Some(FieldValue::Int(gold)))
            .with_reading("game_over", Some(FieldValue::Flag(over)))
    };
    let raw = vec![
        frame(0, 1, 100, false),
        frame(1, 2, 105, false),
        frame(2, 2, 110, true),
        // Post-game screens show unrelated numbers.
        frame(3, 0, 0, false),
        frame(4, 77, 9999, false),
    ];

    let mut builder = TimelineBuilder::new(models);
    for r in &raw {
        builder.push(r).unwrap();
    }
    assert!(builder.state().is_frozen());
    assert!(matches!(builder.state(), SessionState::Frozen { at: 2, .. }));

    let (timeline, quality) = builder.finish().unwrap();
    assert_eq!(timeline.len(), 5);
    let terminal = timeline.get(2).unwrap().fields.clone();
    for f in [3, 4] {
        let state = timeline.get(f).unwrap();
        assert_eq!(state.fields, terminal);
        assert!(state.provenance.values().all(|p| *p == Provenance::Frozen));
    }
    assert_eq!(quality.frozen_at, Some(2));
    assert_eq!(quality.field("kills").unwrap().ignored_after_freeze, 2);
    assert_eq!(quality.field("game_over").unwrap().ignored_after_freeze, 2);
}

#[test]
fn freeze_expires_pending_suspects_and_closes_open_frames() {
    let models = FieldModelSet::new(vec![
        FieldModel::bounded_delta("gold", 1),
        FieldModel::terminal_flag("game_over"),
    ])
    .unwrap();
    let frame = |i: FrameIndex, gold: i64, over: bool| {
        RawFrame::new(i, 0.0)
            .with_reading("gold", Some(FieldValue::Int(gold)))
            .with_reading("game_over", Some(FieldValue::Flag(over)))
    };
    let mut builder = TimelineBuilder::new(models);
    builder.push(&frame(0, 5, false)).unwrap();
    assert!(builder.push(&frame(1, 90, false)).unwrap().is_empty());
    let closed = builder.push(&frame(2, 90, true)).unwrap();
    // gold's 90 was confirmed on the terminal frame; both frames close.
    assert_eq!(closed.len(), 2);
    assert_eq!(closed[1].value("gold"), Some(&FieldValue::Int(90)));
    assert_eq!(builder.open_frames().count(), 0);
}
