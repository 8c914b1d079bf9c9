use crate::error::TyError;
use crate::pattern::Pattern;
use crate::types::Type;
use crate::value::Value;

/// The checking facade.
///
/// `expect(..).to_match(..)` propagates the error, `catch(..).by(..)` never
/// fails, `is(..).type_of(..)` is the boolean view, and `trace`/`track`
/// return deferred handles with `then`/`catch` continuations.
pub struct Ty;

impl Ty {
    pub fn expect(value: &Value) -> Expectation<'_> {
        Expectation { value }
    }

    pub fn catch(value: &Value) -> Catcher<'_> {
        Catcher { value }
    }

    pub fn is(pattern: impl Into<Pattern>) -> IsCheck {
        IsCheck {
            ty: Type::new(pattern),
        }
    }

    /// A deferred check that evaluates when a continuation is attached.
    pub fn trace(value: &Value) -> Deferred<'_> {
        Deferred { value }
    }

    /// Alias surface for tracked (eager) checks; the handle itself is the
    /// same, evaluation happens at `by`.
    pub fn track(value: &Value) -> Deferred<'_> {
        Deferred { value }
    }
}

pub struct Expectation<'v> {
    value: &'v Value,
}

impl Expectation<'_> {
    pub fn to_match(&self, pattern: impl Into<Pattern>) -> Result<(), TyError> {
        Type::new(pattern).assert(self.value)
    }
}

pub struct Catcher<'v> {
    value: &'v Value,
}

impl Catcher<'_> {
    pub fn by(&self, pattern: impl Into<Pattern>) -> Option<TyError> {
        Type::new(pattern).catch(self.value)
    }
}

pub struct IsCheck {
    ty: Type,
}

impl IsCheck {
    pub fn type_of(&self, value: &Value) -> bool {
        self.ty.test(value)
    }
}

pub struct Deferred<'v> {
    value: &'v Value,
}

impl Deferred<'_> {
    pub fn by(self, pattern: impl Into<Pattern>) -> TraceHandle {
        TraceHandle {
            result: Type::new(pattern).assert(self.value),
        }
    }
}

/// A settled check usable with a promise-like chain: `then` runs on match,
/// `catch` receives the `TyError` on mismatch.
pub struct TraceHandle {
    result: Result<(), TyError>,
}

impl TraceHandle {
    pub fn then(self, continuation: impl FnOnce()) -> Self {
        if self.result.is_ok() {
            continuation();
        }
        self
    }

    pub fn catch(self, continuation: impl FnOnce(&TyError)) -> Self {
        if let Err(err) = &self.result {
            continuation(err);
        }
        self
    }

    pub fn into_result(self) -> Result<(), TyError> {
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prototype::Prototype;
    use assertr::prelude::*;

    #[test]
    fn catch_is_null_iff_expect_passes() {
        let values = [
            Value::from("abc"),
            Value::from(3),
            Value::from(true),
            Value::Null,
            Value::Array(vec![Value::from(1)]),
        ];
        for value in values {
            let caught = Ty::catch(&value).by(Prototype::String).is_none();
            let expected = Ty::expect(&value).to_match(Prototype::String).is_ok();
            assert_that(caught).is_equal_to(expected);
        }
    }

    #[test]
    fn trace_invokes_the_catch_continuation() {
        let mut seen = None;
        Ty::trace(&Value::from(3)).by(Prototype::String).catch(|err| {
            seen = Some(err.to_string());
        });

        assert_that(seen.is_some()).is_true();
    }

    #[test]
    fn track_then_runs_on_match() {
        let mut ran = false;
        Ty::track(&Value::from("a")).by(Prototype::String).then(|| {
            ran = true;
        });

        assert_that(ran).is_true();
    }
}
