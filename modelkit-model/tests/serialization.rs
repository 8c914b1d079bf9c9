//! JSON interop: `create` on the way in, `drop`/`map`/`flat` on the way
//! out, and the disabled-field export contract.

use assertr::prelude::*;
use modelkit_model::prelude::*;
use serde_json::json;

fn account_schema() -> Schema {
    Schema::new()
        .field(
            "username",
            FieldDef::new().default_value("").of_type(Prototype::String),
        )
        .field(
            "password",
            FieldDef::new().default_value("").drop_on(true),
        )
        .field(
            "profile",
            FieldDef::new()
                .default_with(|| Value::Object(Record::new()))
                .drop_on(true)
                .create(|data, _, value| {
                    if value.as_object().is_some() {
                        return Some(value.clone());
                    }
                    let first = data.get("firstName").cloned();
                    let last = data.get("lastName").cloned();
                    match (first, last) {
                        (None, None) => None,
                        (first, last) => Some(Value::Object(record([
                            ("f", first.unwrap_or(Value::Null)),
                            ("l", last.unwrap_or(Value::Null)),
                        ]))),
                    }
                })
                .flat(|value, _, _| match value {
                    Value::Object(inner) => record([
                        ("firstName", inner.get("f").cloned().unwrap_or(Value::Null)),
                        ("lastName", inner.get("l").cloned().unwrap_or(Value::Null)),
                    ]),
                    _ => Record::new(),
                }),
        )
}

#[test]
fn to_json_omits_dropped_fields_and_inlines_flattened_ones() {
    let model = Model::builder(account_schema())
        .input(record([
            ("username", Value::from("tomy")),
            ("password", Value::from("hunter2")),
            (
                "profile",
                Value::Object(record([("f", Value::from("To")), ("l", Value::from("My"))])),
            ),
        ]))
        .build()
        .expect("build");

    let json = model.to_json();

    assert_that(json.get("password").is_none()).is_true();
    assert_that(json.get("username").cloned()).is_equal_to(Some(json!("tomy")));
    assert_that(json.get("firstName").cloned()).is_equal_to(Some(json!("To")));
    assert_that(json.get("lastName").cloned()).is_equal_to(Some(json!("My")));
}

#[test]
fn from_json_round_trips_through_declared_transforms() {
    let model = Model::new(account_schema()).expect("build");

    model.from_json(json!({
        "username": "tomy",
        "firstName": "To",
        "lastName": "My",
    }));

    assert_that(model.get("username")).is_equal_to(Value::from("tomy"));
    let profile = model.get("profile");
    assert_that(profile.as_object().and_then(|o| o.get("f")).cloned())
        .is_equal_to(Some(Value::from("To")));

    let out = model.to_json();
    assert_that(out.get("firstName").cloned()).is_equal_to(Some(json!("To")));
    assert_that(out.get("username").cloned()).is_equal_to(Some(json!("tomy")));
}

#[test]
fn identity_fields_round_trip_unchanged() {
    let schema = Schema::new()
        .field("a", FieldDef::new().default_value(0))
        .field("b", FieldDef::new().default_value(""));
    let model = Model::new(schema).expect("build");
    let source = json!({"a": 7, "b": "text"});

    model.from_json(source.clone());

    assert_that(model.to_json()).is_equal_to(source);
}

#[test]
fn disabled_fields_are_omitted_from_export() {
    let schema = Schema::new()
        .field("visible", FieldDef::new().default_value(1))
        .field("ghost", FieldDef::new().default_value(2).disabled(true));
    let model = Model::new(schema).expect("build");

    let json = model.to_json();

    assert_that(json.get("visible").cloned()).is_equal_to(Some(json!(1)));
    assert_that(json.get("ghost").is_none()).is_true();
}

#[test]
fn export_hooks_shape_the_final_record() {
    let schema = Schema::new().field("name", FieldDef::new().default_value("tomy"));
    let model = Model::builder(schema)
        .on_export(|out| {
            out.insert("exported".to_string(), Value::from(true));
        })
        .on_parse(|incoming| {
            incoming.insert("name".to_string(), Value::from("parsed"));
        })
        .build()
        .expect("build");

    let json = model.to_json();
    assert_that(json.get("exported").cloned()).is_equal_to(Some(json!(true)));

    model.from_json(json!({}));
    assert_that(model.get("name")).is_equal_to(Value::from("parsed"));
}
