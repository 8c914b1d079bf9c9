//! The classic form-model shape: coercing setters, a range field, a
//! nullable field hidden for minors, and validator aggregation.

use assertr::prelude::*;
use modelkit_model::prelude::*;
use modelkit_schema::HiddenMeta;
use modelkit_ty::{nullable, range};

fn form_schema() -> Schema {
    Schema::new()
        .field(
            "name",
            FieldDef::new()
                .default_value("")
                .of_type(Prototype::String)
                .validator(Validator::check(
                    |v| v.as_string().map(|s| s.len() < 12).unwrap_or(true),
                    "too long",
                )),
        )
        .field(
            "age",
            FieldDef::new()
                .default_value(0)
                .of_type(Prototype::Int)
                .setter(|value, _| match value {
                    Value::String(s) => s
                        .parse::<i64>()
                        .map(Value::Int)
                        .unwrap_or_else(|_| value.clone()),
                    other => other.clone(),
                })
                .getter(|value, _| match value {
                    Value::Int(i) if *i != 0 => Value::String(i.to_string()),
                    _ => Value::String(String::new()),
                }),
        )
        .field(
            "sex",
            FieldDef::new().default_value(1).of_type(range(1.0, 2.0)),
        )
        .field(
            "married",
            FieldDef::new()
                .default_value(Value::Null)
                .of_type(nullable(Prototype::Bool))
                .hidden(HiddenMeta::decide(|ctx| {
                    ctx.raw_data()
                        .get("age")
                        .and_then(Value::as_int)
                        .unwrap_or(0)
                        < 20
                })),
        )
}

#[test]
fn setters_shape_input_and_getters_project_state() {
    let model = Model::builder(form_schema())
        .input(record([("name", Value::from("")), ("age", Value::from("14"))]))
        .build()
        .expect("build");

    assert_that(model.data().get("age").cloned()).is_equal_to(Some(Value::from(14)));
    assert_that(model.state().get("age").cloned()).is_equal_to(Some(Value::from("14")));
}

#[test]
fn hidden_views_follow_their_deciding_meta() {
    let model = Model::builder(form_schema())
        .input(record([("age", Value::from("14"))]))
        .build()
        .expect("build");

    let views = model.views();
    let married = views.field("married").expect("view");
    assert_that(married.hidden()).is_true();

    model.set("age", 30);
    assert_that(married.hidden()).is_false();
}

#[test]
fn defaults_validate_cleanly_on_a_fresh_model() {
    let model = Model::new(form_schema()).expect("build");

    assert_that(model.validate_all().len()).is_equal_to(0);
}

#[test]
fn validator_findings_carry_key_index_and_message() {
    let model = Model::new(form_schema()).expect("build");
    model.set("name", "abcdefghijklmn");

    let issues = model.validate("name");

    assert_that(issues.len()).is_equal_to(1);
    assert_that(issues[0].key.clone()).is_equal_to("name".to_string());
    assert_that(issues[0].at).is_equal_to(Some(0));
    assert_that(issues[0].message.clone()).is_equal_to("too long".to_string());
}

#[test]
fn view_errors_are_validator_only_and_aggregate() {
    let schema = Schema::new().field(
        "name",
        FieldDef::new()
            .default_value("")
            .of_type(Prototype::String)
            .required(true)
            .validator(Validator::check(
                |v| v.as_string().map(|s| s.len() < 5).unwrap_or(true),
                "too long",
            )),
    );
    let model = Model::new(schema).expect("build");

    // Empty and required: a validation finding, but not a view error.
    assert_that(model.validate("name").len()).is_equal_to(1);
    let views = model.views();
    assert_that(views.field("name").expect("view").errors().len()).is_equal_to(0);

    model.set("name", "abcdefgh");
    assert_that(views.field("name").expect("view").errors().len()).is_equal_to(1);
    assert_that(views.errors().len()).is_equal_to(1);
}

#[test]
fn setter_getter_round_trip_is_idempotent() {
    let model = Model::builder(form_schema())
        .input(record([("age", Value::from("14"))]))
        .build()
        .expect("build");
    let before = model.data();

    let projected = model.get("age");
    model.set("age", projected);

    assert_that(model.data()).is_equal_to(before);
}

#[test]
fn range_fields_reject_out_of_bounds_values_in_validation() {
    let model = Model::new(form_schema()).expect("build");
    model.set_force("sex", 3);

    let issues = model.validate("sex");

    assert_that(issues.len()).is_equal_to(1);
    assert_that(issues[0].kind).is_equal_to(ErrorKind::Unexcepted);
}

#[test]
fn changed_flags_flip_on_write_and_clear_on_restore() {
    let model = Model::new(form_schema()).expect("build");
    let views = model.views();

    assert_that(views.field("name").expect("view").changed()).is_false();
    model.set("name", "tomy");
    assert_that(views.field("name").expect("view").changed()).is_true();

    model.restore(record([("name", Value::from("fresh"))]));
    assert_that(views.field("name").expect("view").changed()).is_false();
}

#[test]
fn allowed_metas_surface_on_views() {
    let schema = Schema::new().field(
        "name",
        FieldDef::new()
            .default_value("")
            .meta("label", "Full name")
            .meta("internal", "hidden detail"),
    );
    let model = Model::builder(schema)
        .metas(MetaPolicy::Names(vec!["label".to_string()]))
        .build()
        .expect("build");

    let views = model.views();
    let view = views.field("name").expect("view");
    assert_that(view.meta("label")).is_equal_to(Some(Value::from("Full name")));
    assert_that(view.meta("internal")).is_equal_to(None);
}

#[test]
fn meta_defaults_fill_only_when_declared_non_null() {
    let schema = Schema::new()
        .field("a", FieldDef::new().meta("unit", "kg"))
        .field("b", FieldDef::new());
    let model = Model::builder(schema)
        .metas(MetaPolicy::Defaults(record([
            ("unit", Value::from("m")),
            ("placeholder", Value::Null),
        ])))
        .build()
        .expect("build");

    let views = model.views();
    assert_that(views.field("a").expect("view").meta("unit"))
        .is_equal_to(Some(Value::from("kg")));
    assert_that(views.field("b").expect("view").meta("unit"))
        .is_equal_to(Some(Value::from("m")));
    assert_that(views.field("b").expect("view").meta("placeholder")).is_equal_to(None);
}
