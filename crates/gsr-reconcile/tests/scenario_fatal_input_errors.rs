use gsr_reconcile::*;
use gsr_schemas::{FieldValue, RawFrame};

/// scenario_fatal_input_errors
///
/// Structural problems abort the step and leave the reconciler unchanged;
/// configuration problems are caught before any frame is processed.

fn config(yaml: &str) -> ReconcileConfig {
    let doc: serde_json::Value = serde_yaml::from_str(yaml).expect("yaml must parse");
    ReconcileConfig::from_config_json(&doc).expect("config sections must deserialize")
}

#[test]
fn reconciler_builds_from_yaml_config() {
    let cfg = config(
        r#"
reconcile:
  suspect_window: 5
fields:
  - name: kills
    domain: { kind: non_negative_int }
    monotonicity: non_decreasing
  - name: gold
    domain: { kind: non_negative_int }
    monotonicity: bounded_delta
    max_delta_per_frame: 40
    suspect_window: 3
  - name: game_over
    domain: { kind: flag }
    monotonicity: non_decreasing
    terminal_value: true
"#,
    );
    let r = Reconciler::from_config(&cfg).expect("valid config");
    assert_eq!(r.models().names(), vec!["game_over", "gold", "kills"]);
    assert_eq!(r.models().get("kills").unwrap().suspect_window(), 5);
    assert_eq!(r.models().get("kills").unwrap().majority(), 3);
    assert_eq!(r.models().get("gold").unwrap().majority(), 2);
    assert!(r
        .models()
        .get("game_over")
        .unwrap()
        .is_terminal(&FieldValue::Flag(true)));
}

#[test]
fn inconsistent_config_is_refused() {
    let cfg = config(
        r#"
fields:
  - name: gold
    domain: { kind: non_negative_int }
    monotonicity: bounded_delta
"#,
    );
    assert_eq!(
        Reconciler::from_config(&cfg).unwrap_err(),
        ConfigurationError::MissingDeltaBound {
            field: "gold".into()
        }
    );

    let empty = config("reconcile: { suspect_window: 3 }\n");
    assert_eq!(
        Reconciler::from_config(&empty).unwrap_err(),
        ConfigurationError::NoFields
    );
}

#[test]
fn unknown_field_key_in_config_is_malformed() {
    let doc: serde_json::Value = serde_yaml::from_str(
        r#"
fields:
  - name: gold
    domain: { kind: non_negative_int }
    max_delta: 4
"#,
    )
    .unwrap();
    assert!(matches!(
        ReconcileConfig::from_config_json(&doc),
        Err(ConfigurationError::Malformed(_))
    ));
}

#[test]
fn out_of_order_frame_aborts_without_side_effects() {
    let mut r = Reconciler::new(FieldModelSet::new(vec![FieldModel::bounded_delta("gold", 1)]).unwrap());
    r.step(&RawFrame::new(4, 0.0).with_reading("gold", Some(FieldValue::Int(5))))
        .unwrap();
    r.step(&RawFrame::new(5, 0.0).with_reading("gold", Some(FieldValue::Int(50))))
        .unwrap();
    let before = r.clone();

    let err = r
        .step(&RawFrame::new(3, 0.0).with_reading("gold", Some(FieldValue::Int(50))))
        .unwrap_err();
    assert_eq!(err, ReconcileError::OutOfOrderInput { previous: 5, got: 3 });
    assert_eq!(r.last_frame(), before.last_frame());
    assert_eq!(r.belief("gold"), before.belief("gold"));
    assert!(err.to_string().contains("frame 3"));
}

#[test]
fn reading_for_unmodelled_field_is_fatal() {
    let mut r = Reconciler::new(FieldModelSet::new(vec![FieldModel::counter("kills")]).unwrap());
    let raw = RawFrame::new(0, 0.0)
        .with_reading("kills", Some(FieldValue::Int(1)))
        .with_reading("dragons", Some(FieldValue::Int(1)));
    let err = r.step(&raw).unwrap_err();
    assert_eq!(
        err,
        ReconcileError::Configuration(ConfigurationError::UnknownField {
            field: "dragons".into(),
            frame: 0,
        })
    );
    assert!(r.belief("kills").is_none());
    assert_eq!(r.last_frame(), None);
}
