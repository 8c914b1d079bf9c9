use crate::error::{ErrorKind, TyError};
use crate::pattern::Pattern;
use crate::types::{Mode, check_pattern};
use crate::value::{Record, Value, ValueKind};
use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// The key a bare (non-member) rule check files its value under, so that
/// `(data, key)` hooks see a uniform shape.
const BARE_KEY: &str = "value";

type DataFn<T> = Arc<dyn Fn(&Record, &str) -> T + Send + Sync>;
type MutateFn = Arc<dyn Fn(&mut Record, &str) + Send + Sync>;
type ValidateFn = Arc<dyn Fn(&Record, &str, &Pattern) -> Option<TyError> + Send + Sync>;

#[derive(Clone)]
pub enum RuleMessage {
    Text(String),
    Make(DataFn<String>),
}

/// A first-class conditional/combinator pattern.
///
/// Rules run in the `(data, key)` idiom because they frequently depend on
/// sibling members. Hooks, all optional:
///
/// - `shouldcheck` gates the whole check,
/// - `use` produces the pattern dynamically (and is the lazy thunk that
///   breaks self-referential cycles),
/// - `validate` replaces the structural check entirely,
/// - `override`/`decorate` mutate the parent record on mismatch/match and
///   only run through the coercion pass, never through `assert`,
/// - `message` replaces the rendered error text.
#[derive(Clone)]
pub struct Rule {
    name: Cow<'static, str>,
    pattern: Option<Pattern>,
    shouldcheck: Option<DataFn<bool>>,
    use_pattern: Option<DataFn<Pattern>>,
    validate: Option<ValidateFn>,
    override_hook: Option<MutateFn>,
    decorate_hook: Option<MutateFn>,
    message: Option<RuleMessage>,
}

impl Rule {
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Rule {
            name: name.into(),
            pattern: None,
            shouldcheck: None,
            use_pattern: None,
            validate: None,
            override_hook: None,
            decorate_hook: None,
            message: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_pattern(mut self, pattern: impl Into<Pattern>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_shouldcheck(
        mut self,
        gate: impl Fn(&Record, &str) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.shouldcheck = Some(Arc::new(gate));
        self
    }

    pub fn with_use(
        mut self,
        produce: impl Fn(&Record, &str) -> Pattern + Send + Sync + 'static,
    ) -> Self {
        self.use_pattern = Some(Arc::new(produce));
        self
    }

    pub fn with_validate(
        mut self,
        validate: impl Fn(&Record, &str, &Pattern) -> Option<TyError> + Send + Sync + 'static,
    ) -> Self {
        self.validate = Some(Arc::new(validate));
        self
    }

    pub fn with_override(
        mut self,
        correct: impl Fn(&mut Record, &str) + Send + Sync + 'static,
    ) -> Self {
        self.override_hook = Some(Arc::new(correct));
        self
    }

    pub fn with_decorate(
        mut self,
        decorate: impl Fn(&mut Record, &str) + Send + Sync + 'static,
    ) -> Self {
        self.decorate_hook = Some(Arc::new(decorate));
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(RuleMessage::Text(message.into()));
        self
    }

    pub fn with_message_fn(
        mut self,
        make: impl Fn(&Record, &str) -> String + Send + Sync + 'static,
    ) -> Self {
        self.message = Some(RuleMessage::Make(Arc::new(make)));
        self
    }

    fn effective_pattern(&self, data: &Record, key: &str) -> Pattern {
        if let Some(produce) = &self.use_pattern {
            return produce(data, key);
        }
        self.pattern.clone().unwrap_or(Pattern::Any)
    }

    fn apply_message(&self, err: TyError, data: &Record, key: &str) -> TyError {
        match &self.message {
            Some(RuleMessage::Text(text)) => err.with_message(text.clone()),
            Some(RuleMessage::Make(make)) => {
                let text = make(data, key);
                err.with_message(text)
            }
            None => err,
        }
    }

    /// Checks this rule for `data[key]`. Errors are relative to the member
    /// (callers add the key segment).
    pub fn check_in(&self, data: &Record, key: &str, mode: Mode) -> Result<(), TyError> {
        if let Some(gate) = &self.shouldcheck {
            if !gate(data, key) {
                return Ok(());
            }
        }
        let pattern = self.effective_pattern(data, key);
        if let Some(validate) = &self.validate {
            return match validate(data, key, &pattern) {
                None => Ok(()),
                Some(err) => Err(self.apply_message(err, data, key)),
            };
        }
        match data.get(key) {
            Some(value) => check_pattern(&pattern, value, mode, Some((data, key)))
                .map_err(|err| self.apply_message(err, data, key)),
            None => {
                let err = TyError::new(ErrorKind::Missing, &Value::Null, pattern.name());
                Err(self.apply_message(err, data, key))
            }
        }
    }

    /// Checks this rule against a bare value (no parent record); the value
    /// is filed under a synthetic key so hooks see the usual shape.
    pub fn check_value(&self, value: &Value, mode: Mode) -> Result<(), TyError> {
        let mut data = Record::new();
        data.insert(BARE_KEY.to_string(), value.clone());
        self.check_in(&data, BARE_KEY, mode)
    }

    /// The coercion pass: `override` on mismatch, `decorate` on match.
    pub(crate) fn coerce(&self, data: &mut Record, key: &str) {
        if let Some(gate) = &self.shouldcheck {
            if !gate(data, key) {
                return;
            }
        }
        let pattern = self.effective_pattern(data, key);
        let matched = {
            let view: &Record = &*data;
            match view.get(key) {
                Some(value) => {
                    check_pattern(&pattern, value, Mode::Default, Some((view, key))).is_ok()
                }
                None => false,
            }
        };
        if matched {
            if let Some(decorate) = &self.decorate_hook {
                decorate(data, key);
            }
        } else if let Some(correct) = &self.override_hook {
            correct(data, key);
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        out.debug_struct("Rule").field("name", &self.name).finish()
    }
}

// ============================================================================
// Rule factories
// ============================================================================

/// Member may be absent; when present it must match.
pub fn if_exist(pattern: impl Into<Pattern>) -> Rule {
    Rule::named("ifexist")
        .with_pattern(pattern)
        .with_shouldcheck(|data, key| data.contains_key(key))
}

/// Never fails; the coercion pass replaces a mismatching member with the
/// fallback instead.
pub fn if_not_match(pattern: impl Into<Pattern>, fallback: Value) -> Rule {
    Rule::named("ifnotmatch")
        .with_pattern(pattern)
        .with_validate(|_, _, _| None)
        .with_override(move |data, key| {
            data.insert(key.to_string(), fallback.clone());
        })
}

/// Checks normally; the coercion pass additionally runs `decorate` on
/// matching members.
pub fn if_match(
    pattern: impl Into<Pattern>,
    decorate: impl Fn(&mut Record, &str) + Send + Sync + 'static,
) -> Rule {
    Rule::named("ifmatch")
        .with_pattern(pattern)
        .with_decorate(decorate)
}

/// Member must exist (and match) iff `determine(data)` holds; otherwise it
/// is optional but still type-checked when present.
pub fn should_exist(
    determine: impl Fn(&Record) -> bool + Send + Sync + 'static,
    pattern: impl Into<Pattern>,
) -> Rule {
    Rule::named("shouldexist")
        .with_pattern(pattern)
        .with_validate(move |data, key, pattern| match data.get(key) {
            Some(value) => check_pattern(pattern, value, Mode::Default, Some((data, key))).err(),
            None if determine(data) => {
                Some(TyError::new(ErrorKind::Missing, &Value::Null, pattern.name()))
            }
            None => None,
        })
}

/// Member must be absent iff `determine(data)` holds.
pub fn should_not_exist(determine: impl Fn(&Record) -> bool + Send + Sync + 'static) -> Rule {
    Rule::named("shouldnotexist").with_validate(move |data, key, _| {
        match (determine(data), data.get(key)) {
            (true, Some(value)) => Some(TyError::new(ErrorKind::Overflow, value, "nothing")),
            _ => None,
        }
    })
}

/// Null or a match.
pub fn nullable(pattern: impl Into<Pattern>) -> Rule {
    Rule::named("nullable")
        .with_pattern(pattern)
        .with_validate(|data, key, pattern| match data.get(key) {
            None | Some(Value::Null) => None,
            Some(value) => check_pattern(pattern, value, Mode::Default, Some((data, key))).err(),
        })
}

/// Value must match every listed pattern.
pub fn match_all(patterns: impl IntoIterator<Item = impl Into<Pattern>>) -> Rule {
    let patterns: Vec<Pattern> = patterns.into_iter().map(Into::into).collect();
    Rule::named("match").with_validate(move |data, key, _| match data.get(key) {
        None => Some(TyError::new(ErrorKind::Missing, &Value::Null, "match")),
        Some(value) => patterns
            .iter()
            .find_map(|pattern| check_pattern(pattern, value, Mode::Default, Some((data, key))).err()),
    })
}

/// The pattern is chosen per check from the sibling data.
pub fn determine(choose: impl Fn(&Record) -> Pattern + Send + Sync + 'static) -> Rule {
    Rule::named("determine").with_use(move |data, _| choose(data))
}

/// A match with a custom failure message.
pub fn should_match(pattern: impl Into<Pattern>, message: impl Into<String>) -> Rule {
    Rule::named("shouldmatch")
        .with_pattern(pattern)
        .with_message(message)
}

/// Fails (with the given message) when the value matches.
pub fn should_not_match(pattern: impl Into<Pattern>, message: impl Into<String>) -> Rule {
    Rule::named("shouldnotmatch")
        .with_pattern(pattern)
        .with_validate(|data, key, pattern| match data.get(key) {
            Some(value) if check_pattern(pattern, value, Mode::Default, Some((data, key))).is_ok() => {
                Some(TyError::new(ErrorKind::Exception, value, pattern.name()))
            }
            _ => None,
        })
        .with_message(message)
}

/// Runtime kind check against a `ValueKind`.
pub fn instance_of(kind: ValueKind) -> Rule {
    Rule::named("instance").with_validate(move |data, key, _| match data.get(key) {
        None => Some(TyError::new(ErrorKind::Missing, &Value::Null, format!("{kind:?}"))),
        Some(value) if value.kind() == kind => None,
        Some(value) => Some(TyError::new(ErrorKind::Mistaken, value, format!("{kind:?}"))),
    })
}

/// Literal equality as a rule.
pub fn equal(value: impl Into<Value>) -> Rule {
    Rule::named("equal").with_pattern(Pattern::Equal(value.into()))
}

/// An ad-hoc predicate; rejection surfaces as an `exception` error.
pub fn lambda(check: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Rule {
    Rule::named("lambda").with_validate(move |data, key, _| match data.get(key) {
        None => Some(TyError::new(ErrorKind::Missing, &Value::Null, "lambda")),
        Some(value) if check(value) => None,
        Some(value) => Some(TyError::new(ErrorKind::Exception, value, "lambda")),
    })
}

/// A deferred pattern: the thunk runs once, on first use. Checks reaching
/// the rule before anything forced it would see `Any`.
pub fn asynch(load: impl Fn() -> Pattern + Send + Sync + 'static) -> Rule {
    let cell: Arc<OnceLock<Pattern>> = Arc::new(OnceLock::new());
    Rule::named("asynch").with_use(move |_, _| cell.get_or_init(&load).clone())
}

/// A lazily re-entered pattern thunk, for self-referential shapes. The
/// thunk is evaluated per nesting level, so recursion is bounded by value
/// depth.
pub fn self_ref(build: impl Fn() -> Pattern + Send + Sync + 'static) -> Rule {
    Rule::named("SelfRef").with_use(move |_, _| build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prototype::Prototype;
    use crate::types::Mode;
    use crate::value::record;
    use assertr::prelude::*;

    fn data() -> Record {
        record([("name", Value::from("tomy")), ("age", Value::from(10))])
    }

    #[test]
    fn if_exist_gates_on_presence() {
        let rule = if_exist(Prototype::String);

        assert_that(rule.check_in(&data(), "name", Mode::Default).is_ok()).is_true();
        assert_that(rule.check_in(&data(), "nickname", Mode::Default).is_ok()).is_true();
        assert_that(rule.check_in(&data(), "age", Mode::Default).is_err()).is_true();
    }

    #[test]
    fn nullable_accepts_null_and_the_pattern() {
        let rule = nullable(Prototype::Bool);
        let mut d = data();
        d.insert("married".to_string(), Value::Null);

        assert_that(rule.check_in(&d, "married", Mode::Default).is_ok()).is_true();
        d.insert("married".to_string(), Value::from(true));
        assert_that(rule.check_in(&d, "married", Mode::Default).is_ok()).is_true();
        d.insert("married".to_string(), Value::from("yes"));
        assert_that(rule.check_in(&d, "married", Mode::Default).is_err()).is_true();
    }

    #[test]
    fn should_exist_requires_only_when_determined() {
        let rule = should_exist(
            |data| data.get("age").and_then(Value::as_int).unwrap_or(0) >= 18,
            Prototype::String,
        );

        let minor = data();
        assert_that(rule.check_in(&minor, "job", Mode::Default).is_ok()).is_true();

        let mut adult = data();
        adult.insert("age".to_string(), Value::from(30));
        let err = rule.check_in(&adult, "job", Mode::Default).unwrap_err();
        assert_that(err.kind()).is_equal_to(ErrorKind::Missing);
    }

    #[test]
    fn should_not_match_rejects_matches_with_message() {
        let rule = should_not_match(Prototype::Number, "numbers not welcome");

        let err = rule.check_in(&data(), "age", Mode::Default).unwrap_err();
        assert_that(err.to_string()).is_equal_to("numbers not welcome".to_string());
        assert_that(rule.check_in(&data(), "name", Mode::Default).is_ok()).is_true();
    }

    #[test]
    fn if_not_match_corrects_through_coerce() {
        let rule = if_not_match(Prototype::Int, Value::from(0));
        let mut d = data();
        d.insert("age".to_string(), Value::from("old"));

        assert_that(rule.check_in(&d, "age", Mode::Default).is_ok()).is_true();
        rule.coerce(&mut d, "age");
        assert_that(d.get("age").cloned()).is_equal_to(Some(Value::from(0)));
    }

    #[test]
    fn lambda_flags_exceptions() {
        let rule = lambda(|v| v.as_int().map(|i| i > 0).unwrap_or(false));
        let mut d = data();
        d.insert("age".to_string(), Value::from(-1));

        let err = rule.check_in(&d, "age", Mode::Default).unwrap_err();
        assert_that(err.kind()).is_equal_to(ErrorKind::Exception);
    }

    #[test]
    fn asynch_resolves_once() {
        let rule = asynch(|| Pattern::Proto(Prototype::Int));

        assert_that(rule.check_in(&data(), "age", Mode::Default).is_ok()).is_true();
        assert_that(rule.check_in(&data(), "name", Mode::Default).is_err()).is_true();
    }
}
