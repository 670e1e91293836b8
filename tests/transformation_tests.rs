//! Transformation Tests
//!
//! Runs every operator through the engine, plus the fixture definitions.

use std::path::Path;
use std::sync::Arc;

use model_bridge::transformation::PadDirection;
use model_bridge::{
    BridgeError, DynamicModel, FieldKind, Model, TransformationDescription, TransformationEngine, TypeDescriptor,
    TypeRegistry, TypeResolver, Value,
};

fn types() -> Arc<TypeRegistry> {
    let registry = Arc::new(TypeRegistry::new());
    registry.register(
        TypeDescriptor::new("Contact")
            .field("first", FieldKind::String)
            .field("last", FieldKind::String)
            .field("phone", FieldKind::String)
            .field("path", FieldKind::String)
            .field("flag", FieldKind::String)
            .field("count", FieldKind::Integer)
            .field("tags", FieldKind::list(FieldKind::String)),
    );
    registry.register(
        TypeDescriptor::new("Card")
            .field("out", FieldKind::String)
            .field("other", FieldKind::String)
            .field("number", FieldKind::Integer)
            .field("active", FieldKind::Boolean),
    );
    registry
}

fn contact(types: &TypeRegistry) -> DynamicModel {
    DynamicModel::new(types.resolve("Contact").unwrap())
        .with("first", "Ada")
        .unwrap()
        .with("last", "Lovelace")
        .unwrap()
        .with("phone", "00043-1234-5678")
        .unwrap()
        .with("path", "usr/local/bin")
        .unwrap()
        .with("flag", "true")
        .unwrap()
        .with("tags", Value::List(vec!["a".into(), "b".into(), "c".into()]))
        .unwrap()
}

/// Run a single description built by `build` and return the target
fn run<F>(build: F) -> Box<dyn Model>
where
    F: FnOnce(&mut TransformationDescription),
{
    let types = types();
    let engine = TransformationEngine::new(types.clone());
    let mut desc = TransformationDescription::new("Contact", "Card");
    build(&mut desc);
    engine.save_description(desc);
    engine
        .perform_transformation("Contact", "Card", &contact(&types))
        .unwrap()
}

fn out(target: &dyn Model) -> Option<Value> {
    target.get("out")
}

// =============================================================================
// Operators
// =============================================================================

#[test]
fn test_forward() {
    let target = run(|d| {
        d.forward_field("first", "out");
    });
    assert_eq!(out(target.as_ref()), Some(Value::from("Ada")));
}

#[test]
fn test_concat() {
    let target = run(|d| {
        d.concat_field("out", " ", &["first", "last"]);
    });
    assert_eq!(out(target.as_ref()), Some(Value::from("Ada Lovelace")));
}

#[test]
fn test_concat_omits_unreadable_fields() {
    let target = run(|d| {
        d.concat_field("out", "#", &["first", "count", "nope", "last"]);
    });
    assert_eq!(out(target.as_ref()), Some(Value::from("Ada#Lovelace")));
}

#[test]
fn test_split() {
    let target = run(|d| {
        d.split_field("path", "out", "/", 1).split_field("path", "other", "/", 7);
    });
    assert_eq!(out(target.as_ref()), Some(Value::from("local")));
    assert_eq!(target.get("other"), Some(Value::from("")));
}

#[test]
fn test_split_regex() {
    let target = run(|d| {
        d.split_regex_field("phone", "out", "[0-9]+", 2);
    });
    assert_eq!(out(target.as_ref()), Some(Value::from("5678")));
}

#[test]
fn test_map() {
    let target = run(|d| {
        d.map_field("first", "out", [("Ada", "Countess"), ("Bob", "Builder")])
            .map_field("last", "other", [("Nobody", "x")]);
    });
    assert_eq!(out(target.as_ref()), Some(Value::from("Countess")));
    assert_eq!(target.get("other"), Some(Value::from("Lovelace")));
}

#[test]
fn test_substring_clamps_end() {
    let target = run(|d| {
        d.substring_field("last", "out", 4, 100).substring_field("last", "other", 0, 3);
    });
    assert_eq!(out(target.as_ref()), Some(Value::from("lace")));
    assert_eq!(target.get("other"), Some(Value::from("Lov")));
}

#[test]
fn test_value() {
    let target = run(|d| {
        d.value_field("out", "constant").value_field("number", "42");
    });
    assert_eq!(out(target.as_ref()), Some(Value::from("constant")));
    assert_eq!(target.get("number"), Some(Value::Integer(42)));
}

#[test]
fn test_length() {
    let target = run(|d| {
        d.length_field("last", "number", None)
            .length_field("tags", "out", Some("size"))
            .length_field("last", "other", Some("weight"));
    });
    assert_eq!(target.get("number"), Some(Value::Integer(8)));
    assert_eq!(out(target.as_ref()), Some(Value::from("3")));
    assert_eq!(target.get("other"), Some(Value::from("0")));
}

#[test]
fn test_string_operations() {
    let target = run(|d| {
        d.to_upper_field("first", "temp.upper")
            .concat_field("temp.joined", "-", &["temp.upper", "last"])
            .to_lower_field("temp.joined", "out")
            .reverse_field("first", "other");
    });
    assert_eq!(out(target.as_ref()), Some(Value::from("ada-lovelace")));
    assert_eq!(target.get("other"), Some(Value::from("adA")));
}

#[test]
fn test_trim_and_replace() {
    let target = run(|d| {
        d.replace_field("phone", "temp.spaced", "-", " ")
            .trim_field("temp.spaced", "out");
    });
    assert_eq!(out(target.as_ref()), Some(Value::from("00043 1234 5678")));
}

#[test]
fn test_pad() {
    let types = types();
    let engine = TransformationEngine::new(types.clone());
    let mut desc = TransformationDescription::new("Contact", "Card");
    desc.pad_field("temp.seven", "out", 5, '0', PadDirection::Start)
        .pad_field("first", "other", 6, '.', PadDirection::End);
    desc.steps.insert(
        0,
        model_bridge::TransformationStep::new(model_bridge::TransformationOperation::Value)
            .target("temp.seven")
            .param("value", "7"),
    );
    engine.save_description(desc);

    let target = engine
        .perform_transformation("Contact", "Card", &contact(&types))
        .unwrap();
    assert_eq!(target.get("out"), Some(Value::from("00007")));
    assert_eq!(target.get("other"), Some(Value::from("Ada...")));
}

#[test]
fn test_remove_leading() {
    let target = run(|d| {
        d.remove_leading_field("phone", "out", "[0]+", 0)
            .remove_leading_field("phone", "other", "[0-9]+", 3);
    });
    assert_eq!(out(target.as_ref()), Some(Value::from("43-1234-5678")));
    assert_eq!(target.get("other"), Some(Value::from("43-1234-5678")));
}

#[test]
fn test_instantiate() {
    let target = run(|d| {
        d.instantiate_field("flag", "active", "boolean");
    });
    assert_eq!(target.get("active"), Some(Value::Boolean(true)));
}

// =============================================================================
// Failure Policy
// =============================================================================

#[test]
fn test_partial_failure_still_yields_target() {
    let target = run(|d| {
        d.forward_field("nope", "out")
            .split_regex_field("first", "other", "[0-9]+", 0)
            .instantiate_field("first", "number", "integer")
            .forward_field("last", "out");
    });
    assert_eq!(out(target.as_ref()), Some(Value::from("Lovelace")));
    assert_eq!(target.get("other"), None);
    assert_eq!(target.get("number"), None);
}

#[test]
fn test_no_description_is_an_error() {
    let types = types();
    let engine = TransformationEngine::new(types.clone());
    match engine.perform_transformation("Card", "Contact", &contact(&types)) {
        Err(BridgeError::NoTransformationFound { source_type, target_type }) => {
            assert_eq!(source_type, "Card");
            assert_eq!(target_type, "Contact");
        }
        other => panic!("Expected NoTransformationFound, got {:?}", other.map(|m| m.model_type().to_string())),
    }
}

// =============================================================================
// Fixture Definitions
// =============================================================================

fn fixture_types() -> Arc<TypeRegistry> {
    let registry = Arc::new(TypeRegistry::new());
    registry.load_json(include_str!("fixtures/types.json")).unwrap();
    registry
}

#[test]
fn test_fixture_definitions_round_trip() {
    let types = fixture_types();
    let engine = TransformationEngine::new(types.clone());
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/issue_to_ticket.transformation");
    assert_eq!(engine.add_descriptions_from_file(&path).unwrap(), 2);

    let issue = DynamicModel::new(types.resolve("Issue").unwrap())
        .with("project", "CORE")
        .unwrap()
        .with("number", "42")
        .unwrap()
        .with("summary", "  crash on start ")
        .unwrap()
        .with("priority", Value::Enum("HIGH".to_string()))
        .unwrap();

    let ticket = engine.perform_transformation("Issue", "Ticket", &issue).unwrap();
    assert_eq!(ticket.get("key"), Some(Value::from("CORE-42")));
    assert_eq!(ticket.get("title"), Some(Value::from("CRASH ON START")));
    assert_eq!(ticket.get("summaryLength"), Some(Value::Integer(17)));
    assert_eq!(ticket.get("code"), Some(Value::from("00042")));
    assert_eq!(ticket.get("priority"), Some(Value::from("major")));
    assert_eq!(ticket.get("origin"), Some(Value::from("issue tracker")));

    let back = engine.perform_transformation("Ticket", "Issue", ticket.as_ref()).unwrap();
    assert_eq!(back.get("project"), Some(Value::from("CORE")));
    assert_eq!(back.get("number"), Some(Value::from("42")));
    assert_eq!(back.get("summary"), Some(Value::from("crash on start")));
}

#[test]
fn test_transform_by_id() {
    let types = fixture_types();
    let engine = TransformationEngine::new(types.clone());
    let descriptions = engine
        .load_descriptions(include_str!("fixtures/issue_to_ticket.transformation"))
        .unwrap();
    engine.save_descriptions(descriptions);

    let issue = DynamicModel::new(types.resolve("Issue").unwrap())
        .with("project", "CORE")
        .unwrap();
    let ticket = engine
        .perform_transformation_with_ids("Issue", "Ticket", &["issue-to-ticket".to_string()], &issue)
        .unwrap();
    assert_eq!(ticket.get("origin"), Some(Value::from("issue tracker")));

    assert!(engine
        .perform_transformation_with_ids("Issue", "Ticket", &["missing".to_string()], &issue)
        .is_err());
}
