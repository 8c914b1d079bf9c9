use crate::model::{Model, ModelError};
use modelkit_store::WatchId;
use modelkit_ty::{Path, Record, Value};
use std::collections::{HashMap, VecDeque};
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::warn;

/// The reserved snapshot tag holding the construction-time state.
pub const ORIGIN_TAG: &str = "$origin";

const HISTORY_LIMIT: usize = 128;

#[derive(Clone)]
struct Mutation {
    path: Path,
    prev: Value,
    next: Value,
}

struct TraceState {
    commits: HashMap<String, Record>,
    undos: VecDeque<Mutation>,
    redos: Vec<Mutation>,
    recording: bool,
    limit: usize,
}

/// A model with snapshot and linear-history capability.
///
/// Named commits are deep copies of the raw record; `undo`/`redo` walk a
/// bounded ring of inverse patches recorded from the store's notification
/// stream. History and named commits are independent.
pub struct TraceModel {
    model: Model,
    trace: Arc<Mutex<TraceState>>,
    recorder: WatchId,
}

impl TraceModel {
    pub fn new(model: Model) -> Self {
        let mut commits = HashMap::new();
        commits.insert(ORIGIN_TAG.to_string(), model.data());
        let trace = Arc::new(Mutex::new(TraceState {
            commits,
            undos: VecDeque::new(),
            redos: Vec::new(),
            recording: true,
            limit: HISTORY_LIMIT,
        }));
        let weak: Weak<Mutex<TraceState>> = Arc::downgrade(&trace);
        let recorder = model.watch("*", move |change| {
            let Some(trace) = weak.upgrade() else {
                return;
            };
            let mut state = trace.lock().unwrap_or_else(PoisonError::into_inner);
            if !state.recording {
                return;
            }
            // Any organic write invalidates the redo tail.
            state.redos.clear();
            if state.undos.len() == state.limit {
                state.undos.pop_front();
            }
            state.undos.push_back(Mutation {
                path: change.path.clone(),
                prev: change.prev.clone(),
                next: change.value.clone(),
            });
        });
        TraceModel {
            model,
            trace,
            recorder,
        }
    }

    fn lock_trace(&self) -> MutexGuard<'_, TraceState> {
        self.trace.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores a deep copy of the current raw record under `tag`, replacing
    /// any earlier commit with the same tag. The origin tag is reserved.
    pub fn commit(&self, tag: &str) -> Result<(), ModelError> {
        if tag == ORIGIN_TAG {
            return Err(ModelError::ReservedTag(tag.to_string()));
        }
        let snapshot = self.model.data();
        self.lock_trace().commits.insert(tag.to_string(), snapshot);
        Ok(())
    }

    /// Restores the record committed under `tag`. Stale inverse patches
    /// cannot survive a wholesale swap, so history drops; named commits
    /// stay.
    pub fn reset(&self, tag: &str) -> bool {
        let snapshot = match self.lock_trace().commits.get(tag) {
            Some(snapshot) => snapshot.clone(),
            None => return false,
        };
        self.model.restore(snapshot);
        let mut state = self.lock_trace();
        state.undos.clear();
        state.redos.clear();
        true
    }

    /// Reverts the most recent recorded mutation. Returns false when the
    /// history is empty.
    pub fn undo(&self) -> bool {
        let mutation = {
            let mut state = self.lock_trace();
            match state.undos.pop_back() {
                Some(mutation) => {
                    state.recording = false;
                    mutation
                }
                None => return false,
            }
        };
        self.apply(&mutation.path, mutation.prev.clone());
        let mut state = self.lock_trace();
        state.recording = true;
        state.redos.push(mutation);
        true
    }

    /// Re-applies the most recently undone mutation.
    pub fn redo(&self) -> bool {
        let mutation = {
            let mut state = self.lock_trace();
            match state.redos.pop() {
                Some(mutation) => {
                    state.recording = false;
                    mutation
                }
                None => return false,
            }
        };
        self.apply(&mutation.path, mutation.next.clone());
        let mut state = self.lock_trace();
        state.recording = true;
        state.undos.push_back(mutation);
        true
    }

    /// Drops the undo/redo history; named commits are retained.
    pub fn clear(&self) {
        let mut state = self.lock_trace();
        state.undos.clear();
        state.redos.clear();
    }

    pub fn history_len(&self) -> usize {
        self.lock_trace().undos.len()
    }

    pub fn into_model(self) -> Model {
        self.model.clone()
    }

    /// History application writes the raw stored value back directly; the
    /// schema already shaped it on the way in.
    fn apply(&self, path: &Path, value: Value) {
        if let Err(err) = self.model.store().set(path.clone(), value) {
            warn!(path = %path, %err, "history write skipped");
        }
    }
}

impl Deref for TraceModel {
    type Target = Model;

    fn deref(&self) -> &Self::Target {
        &self.model
    }
}

impl Drop for TraceModel {
    fn drop(&mut self) {
        self.model.unwatch(self.recorder);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelkit_schema::{FieldDef, Schema};
    use modelkit_ty::record;

    use assertr::prelude::*;

    fn traced() -> TraceModel {
        let schema = Schema::new()
            .field("name", FieldDef::new().default_value(""))
            .field("age", FieldDef::new().default_value(0));
        TraceModel::new(Model::new(schema).expect("build"))
    }

    #[test]
    fn commit_and_reset_round_trip() {
        let model = traced();
        model.set("name", "before");
        model.commit("edit").expect("commit");
        let snapshot = model.data();

        model.set("name", "after");
        assert_that(model.reset("edit")).is_true();

        assert_that(model.data()).is_equal_to(snapshot);
    }

    #[test]
    fn origin_tag_is_reserved_but_resettable() {
        let model = traced();

        assert_that(model.commit(ORIGIN_TAG).is_err()).is_true();

        model.set("name", "dirty");
        assert_that(model.reset(ORIGIN_TAG)).is_true();
        assert_that(model.get("name")).is_equal_to(Value::from(""));
    }

    #[test]
    fn undo_reverts_and_redo_reapplies() {
        let model = traced();
        model.set("name", "first");
        model.set("name", "second");

        assert_that(model.undo()).is_true();
        assert_that(model.get("name")).is_equal_to(Value::from("first"));

        assert_that(model.redo()).is_true();
        assert_that(model.get("name")).is_equal_to(Value::from("second"));
    }

    #[test]
    fn undo_redo_is_identity_without_intervening_writes() {
        let model = traced();
        model.set("name", "x");
        let before = model.data();

        assert_that(model.undo()).is_true();
        assert_that(model.redo()).is_true();

        assert_that(model.data()).is_equal_to(before);
    }

    #[test]
    fn a_write_after_undo_truncates_the_redo_tail() {
        let model = traced();
        model.set("name", "first");
        model.set("name", "second");

        assert_that(model.undo()).is_true();
        model.set("name", "forked");

        assert_that(model.redo()).is_false();
        assert_that(model.get("name")).is_equal_to(Value::from("forked"));
    }

    #[test]
    fn clear_drops_history_but_keeps_commits() {
        let model = traced();
        model.set("name", "kept");
        model.commit("mark").expect("commit");
        model.set("name", "later");

        model.clear();

        assert_that(model.undo()).is_false();
        assert_that(model.reset("mark")).is_true();
        assert_that(model.get("name")).is_equal_to(Value::from("kept"));
    }

    #[test]
    fn commits_replace_under_the_same_tag() {
        let model = traced();
        model.set("name", "v1");
        model.commit("tag").expect("commit");
        model.set("name", "v2");
        model.commit("tag").expect("commit");
        model.set("name", "v3");

        assert_that(model.reset("tag")).is_true();
        assert_that(model.get("name")).is_equal_to(Value::from("v2"));
    }

    #[test]
    fn restore_swaps_data_without_recording_history() {
        let model = traced();
        model.restore(record([("name", Value::from("swapped"))]));

        // A restore does not notify, so the recorder stays empty.
        assert_that(model.undo()).is_false();
        assert_that(model.get("name")).is_equal_to(Value::from("swapped"));
    }
}
