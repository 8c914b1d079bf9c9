use modelkit_ty::{Path, Record, Segment, Value};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// One applied write, as seen by watchers.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    /// The rendered path, convenient for keying handlers.
    pub key: String,
    pub path: Path,
    pub value: Value,
    /// The value replaced by this write; `Null` for fresh keys.
    pub prev: Value,
}

/// What a watcher listens to: everything, or one path.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchSpec {
    Any,
    Path(Path),
}

impl From<&str> for WatchSpec {
    fn from(value: &str) -> Self {
        if value == "*" {
            WatchSpec::Any
        } else {
            WatchSpec::Path(Path::from(value))
        }
    }
}

impl From<Path> for WatchSpec {
    fn from(value: Path) -> Self {
        WatchSpec::Path(value)
    }
}

/// Registration token returned by `watch`, consumed by `unwatch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("path '{0}' does not address into the stored data")]
    InvalidPath(Path),

    #[error("index [{index}] at '{path}' is past the end of the array")]
    IndexOutOfBounds { path: Path, index: usize },
}

type Handler = Arc<dyn Fn(&Change) + Send + Sync>;

/// A batch hook: given the paths changed in this batch, returns follow-up
/// writes that join the same notification turn. Computed-field
/// re-evaluation plugs in here.
type Reactor = Arc<dyn Fn(&[Path]) -> Vec<(Path, Value)> + Send + Sync>;

#[derive(Clone)]
struct Watcher {
    id: WatchId,
    spec: WatchSpec,
    deep: bool,
    handler: Handler,
}

#[derive(Default)]
struct State {
    data: Record,
    watchers: Vec<Watcher>,
    reactors: Vec<Reactor>,
    next_watch_id: u64,
    silent: bool,
    dispatching: bool,
    queue: VecDeque<Change>,
    emitted: Vec<(Path, Value)>,
    trackers: Vec<HashSet<Path>>,
}

/// The reactive store. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct Store {
    inner: Arc<Mutex<State>>,
}

impl Store {
    pub fn new() -> Self {
        Store::default()
    }

    pub fn with_data(data: Record) -> Self {
        let store = Store::new();
        store.lock().data = data;
        store
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // === Reads ===

    /// Reads the value at a path, recording a dependency when a tracker
    /// frame is active.
    pub fn get(&self, path: impl Into<Path>) -> Option<Value> {
        let path = path.into();
        let mut state = self.lock();
        if let Some(frame) = state.trackers.last_mut() {
            frame.insert(path.clone());
        }
        read_at(&state.data, &path).cloned()
    }

    /// A full snapshot of the stored record.
    pub fn data(&self) -> Record {
        self.lock().data.clone()
    }

    /// Runs `f` under a tracker frame and returns its result together with
    /// the set of paths it read.
    pub fn track<T>(&self, f: impl FnOnce() -> T) -> (T, Vec<Path>) {
        self.lock().trackers.push(HashSet::new());
        let result = f();
        let frame = self.lock().trackers.pop().unwrap_or_default();
        (result, frame.into_iter().collect())
    }

    // === Writes ===

    pub fn set(&self, path: impl Into<Path>, value: impl Into<Value>) -> Result<(), StoreError> {
        self.set_with(path.into(), value.into(), false)
    }

    /// A write that skips watcher dispatch entirely.
    pub fn set_silent(
        &self,
        path: impl Into<Path>,
        value: impl Into<Value>,
    ) -> Result<(), StoreError> {
        self.set_with(path.into(), value.into(), true)
    }

    fn set_with(&self, path: Path, value: Value, silent: bool) -> Result<(), StoreError> {
        let change = {
            let mut state = self.lock();
            let prev = write_at(&mut state.data, &path, value.clone())?;
            if silent || state.silent {
                return Ok(());
            }
            Change {
                key: path.to_string(),
                path,
                value,
                prev: prev.unwrap_or(Value::Null),
            }
        };
        self.ingest(vec![change]);
        Ok(())
    }

    /// Applies a whole patch of top-level writes, then notifies once: all
    /// writes land before any watcher fires.
    pub fn update(&self, patch: Record) {
        self.update_with(patch, false)
    }

    pub fn update_silent(&self, patch: Record) {
        self.update_with(patch, true)
    }

    fn update_with(&self, patch: Record, silent: bool) {
        let changes = {
            let mut state = self.lock();
            let muted = silent || state.silent;
            let mut changes = Vec::with_capacity(patch.len());
            for (key, value) in patch {
                let prev = state.data.insert(key.clone(), value.clone());
                if !muted {
                    changes.push(Change {
                        path: Path::key(key.clone()),
                        key,
                        value,
                        prev: prev.unwrap_or(Value::Null),
                    });
                }
            }
            changes
        };
        self.ingest(changes);
    }

    /// Deletes the value at a path; watchers see a `Null` value.
    pub fn del(&self, path: impl Into<Path>) -> Result<(), StoreError> {
        let path = path.into();
        let change = {
            let mut state = self.lock();
            let prev = delete_at(&mut state.data, &path)?;
            if state.silent {
                return Ok(());
            }
            Change {
                key: path.to_string(),
                path,
                value: Value::Null,
                prev: prev.unwrap_or(Value::Null),
            }
        };
        self.ingest(vec![change]);
        Ok(())
    }

    /// Replaces the stored record wholesale without any notification.
    pub fn replace(&self, data: Record) {
        self.lock().data = data;
    }

    /// Session-wide mute flag: while set, every write skips notification.
    pub fn silent(&self, on: bool) {
        self.lock().silent = on;
    }

    // === Watchers & reactors ===

    pub fn watch(
        &self,
        spec: impl Into<WatchSpec>,
        handler: impl Fn(&Change) + Send + Sync + 'static,
    ) -> WatchId {
        self.register(spec.into(), false, Arc::new(handler))
    }

    /// A deep watch additionally fires for descendant writes.
    pub fn watch_deep(
        &self,
        spec: impl Into<WatchSpec>,
        handler: impl Fn(&Change) + Send + Sync + 'static,
    ) -> WatchId {
        self.register(spec.into(), true, Arc::new(handler))
    }

    fn register(&self, spec: WatchSpec, deep: bool, handler: Handler) -> WatchId {
        let mut state = self.lock();
        state.next_watch_id += 1;
        let id = WatchId(state.next_watch_id);
        state.watchers.push(Watcher {
            id,
            spec,
            deep,
            handler,
        });
        id
    }

    pub fn unwatch(&self, id: WatchId) -> bool {
        let mut state = self.lock();
        let before = state.watchers.len();
        state.watchers.retain(|watcher| watcher.id != id);
        state.watchers.len() != before
    }

    /// Registers a batch reactor. Reactors run after the writes of a batch
    /// and before its watchers; their writes join the same turn.
    pub fn react(&self, reactor: impl Fn(&[Path]) -> Vec<(Path, Value)> + Send + Sync + 'static) {
        self.lock().reactors.push(Arc::new(reactor));
    }

    // === Dispatch ===

    fn ingest(&self, initial: Vec<Change>) {
        if initial.is_empty() {
            return;
        }
        let mut pending = initial;
        let mut round_paths: Vec<Path> = pending.iter().map(|c| c.path.clone()).collect();
        // Reactors run to a fixpoint; each round only sees the paths the
        // previous round produced, so one batch recomputes a field once.
        for _round in 0..MAX_REACT_ROUNDS {
            let reactors: Vec<Reactor> = self.lock().reactors.clone();
            if reactors.is_empty() {
                break;
            }
            let mut produced: Vec<Change> = Vec::new();
            for reactor in reactors {
                for (path, value) in reactor(&round_paths) {
                    let mut state = self.lock();
                    if read_at(&state.data, &path) == Some(&value) {
                        continue;
                    }
                    match write_at(&mut state.data, &path, value.clone()) {
                        Ok(prev) => produced.push(Change {
                            key: path.to_string(),
                            path,
                            value,
                            prev: prev.unwrap_or(Value::Null),
                        }),
                        Err(err) => trace!(%err, "reactor write skipped"),
                    }
                }
            }
            if produced.is_empty() {
                break;
            }
            round_paths = produced.iter().map(|c| c.path.clone()).collect();
            pending.extend(produced);
        }
        self.dispatch(pending);
    }

    fn dispatch(&self, changes: Vec<Change>) {
        {
            let mut state = self.lock();
            for change in changes {
                let repeated = state.dispatching
                    && state
                        .emitted
                        .iter()
                        .any(|(path, value)| path == &change.path && value == &change.value);
                if repeated {
                    trace!(path = %change.path, "re-emission deduped");
                    continue;
                }
                state.queue.push_back(change);
            }
            if state.dispatching {
                return;
            }
            state.dispatching = true;
        }
        loop {
            let batch: Vec<Change> = {
                let mut state = self.lock();
                let batch: Vec<Change> = state.queue.drain(..).collect();
                for change in &batch {
                    state.emitted.push((change.path.clone(), change.value.clone()));
                }
                batch
            };
            if batch.is_empty() {
                break;
            }
            let watchers: Vec<Watcher> = self.lock().watchers.clone();
            for change in &batch {
                for watcher in &watchers {
                    if matches!(&watcher.spec, WatchSpec::Path(path) if *path == change.path) {
                        (watcher.handler)(change);
                    }
                }
                for watcher in &watchers {
                    if let WatchSpec::Path(path) = &watcher.spec {
                        if watcher.deep && *path != change.path && change.path.starts_with(path) {
                            (watcher.handler)(change);
                        }
                    }
                }
                for watcher in &watchers {
                    if matches!(watcher.spec, WatchSpec::Any) {
                        (watcher.handler)(change);
                    }
                }
            }
        }
        let mut state = self.lock();
        state.dispatching = false;
        state.emitted.clear();
    }
}

const MAX_REACT_ROUNDS: usize = 16;

// ============================================================================
// Path walking
// ============================================================================

fn read_at<'a>(data: &'a Record, path: &Path) -> Option<&'a Value> {
    let mut segments = path.segments().iter();
    let mut current = match segments.next()? {
        Segment::Key(key) => data.get(key)?,
        Segment::Index(_) => return None,
    };
    for segment in segments {
        current = match (current, segment) {
            (Value::Object(record), Segment::Key(key)) => record.get(key)?,
            (Value::Array(items), Segment::Index(index)) => items.get(*index)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Writes through a path, creating intermediate objects for key segments on
/// demand. Returns the replaced value.
fn write_at(data: &mut Record, path: &Path, value: Value) -> Result<Option<Value>, StoreError> {
    let segments = path.segments();
    let Some(Segment::Key(first)) = segments.first() else {
        return Err(StoreError::InvalidPath(path.clone()));
    };
    if segments.len() == 1 {
        return Ok(data.insert(first.clone(), value));
    }
    let mut current: &mut Value = data
        .entry(first.clone())
        .or_insert_with(|| Value::Object(Record::new()));
    for (i, segment) in segments.iter().enumerate().skip(1) {
        let last = i + 1 == segments.len();
        match segment {
            Segment::Key(key) => {
                let record = match current {
                    Value::Object(record) => record,
                    _ => return Err(StoreError::InvalidPath(path.clone())),
                };
                if last {
                    return Ok(record.insert(key.clone(), value));
                }
                current = record
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(Record::new()));
            }
            Segment::Index(index) => {
                let items = match current {
                    Value::Array(items) => items,
                    _ => return Err(StoreError::InvalidPath(path.clone())),
                };
                if last {
                    return if *index < items.len() {
                        Ok(Some(std::mem::replace(&mut items[*index], value)))
                    } else if *index == items.len() {
                        items.push(value);
                        Ok(None)
                    } else {
                        Err(StoreError::IndexOutOfBounds {
                            path: path.clone(),
                            index: *index,
                        })
                    };
                }
                current = items.get_mut(*index).ok_or(StoreError::IndexOutOfBounds {
                    path: path.clone(),
                    index: *index,
                })?;
            }
        }
    }
    Err(StoreError::InvalidPath(path.clone()))
}

fn delete_at(data: &mut Record, path: &Path) -> Result<Option<Value>, StoreError> {
    let segments = path.segments();
    let Some(Segment::Key(first)) = segments.first() else {
        return Err(StoreError::InvalidPath(path.clone()));
    };
    if segments.len() == 1 {
        return Ok(data.shift_remove(first));
    }
    let parent: Path = segments[..segments.len() - 1]
        .iter()
        .cloned()
        .collect();
    let container = match read_at_mut(data, &parent) {
        Some(container) => container,
        None => return Ok(None),
    };
    match (container, &segments[segments.len() - 1]) {
        (Value::Object(record), Segment::Key(key)) => Ok(record.shift_remove(key)),
        (Value::Array(items), Segment::Index(index)) if *index < items.len() => {
            Ok(Some(items.remove(*index)))
        }
        _ => Ok(None),
    }
}

fn read_at_mut<'a>(data: &'a mut Record, path: &Path) -> Option<&'a mut Value> {
    let mut segments = path.segments().iter();
    let mut current = match segments.next()? {
        Segment::Key(key) => data.get_mut(key)?,
        Segment::Index(_) => return None,
    };
    for segment in segments {
        current = match (current, segment) {
            (Value::Object(record), Segment::Key(key)) => record.get_mut(key)?,
            (Value::Array(items), Segment::Index(index)) => items.get_mut(*index)?,
            _ => return None,
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelkit_ty::record;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assertr::prelude::*;

    #[test]
    fn reads_and_writes_through_nested_paths() {
        let store = Store::new();
        store.set("profile.name", Value::from("tomy")).expect("write");

        assert_that(store.get("profile.name")).is_equal_to(Some(Value::from("tomy")));
        assert_that(store.get("profile.age")).is_equal_to(None);
    }

    #[test]
    fn array_writes_may_append_but_not_skip() {
        let store = Store::new();
        store.set("tags", Value::Array(vec![])).expect("write");
        store.set("tags.0", Value::from("a")).expect("append");

        assert_that(store.set("tags.5", Value::from("x")).is_err()).is_true();
        assert_that(store.get("tags.0")).is_equal_to(Some(Value::from("a")));
    }

    #[test]
    fn watchers_fire_with_value_and_prev() {
        let store = Store::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        store.watch("name", move |change: &Change| {
            sink.lock().expect("lock").push((change.prev.clone(), change.value.clone()));
        });

        store.set("name", Value::from("a")).expect("write");
        store.set("name", Value::from("b")).expect("write");

        let seen = seen.lock().expect("lock");
        assert_that(seen.len()).is_equal_to(2);
        assert_that(seen[0].clone()).is_equal_to((Value::Null, Value::from("a")));
        assert_that(seen[1].clone()).is_equal_to((Value::from("a"), Value::from("b")));
    }

    #[test]
    fn silent_writes_skip_dispatch() {
        let store = Store::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        store.watch("name", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.set_silent("name", Value::from("a")).expect("write");
        assert_that(fired.load(Ordering::SeqCst)).is_equal_to(0);

        store.silent(true);
        store.set("name", Value::from("b")).expect("write");
        assert_that(fired.load(Ordering::SeqCst)).is_equal_to(0);

        store.silent(false);
        store.set("name", Value::from("c")).expect("write");
        assert_that(fired.load(Ordering::SeqCst)).is_equal_to(1);
    }

    #[test]
    fn update_applies_all_writes_before_any_watcher() {
        let store = Store::new();
        store.set("a", Value::from(1)).expect("write");
        let observed = Arc::new(Mutex::new(None));
        let sink = observed.clone();
        let reader = store.clone();
        store.watch("a", move |_| {
            *sink.lock().expect("lock") = reader.get("b");
        });

        store.update(record([("a", Value::from(2)), ("b", Value::from(3))]));

        assert_that(observed.lock().expect("lock").clone()).is_equal_to(Some(Value::from(3)));
    }

    #[test]
    fn wildcards_fire_after_specific_watchers() {
        let store = Store::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let o1 = order.clone();
        let o2 = order.clone();
        store.watch("*", move |_| o1.lock().expect("lock").push("any"));
        store.watch("name", move |_| o2.lock().expect("lock").push("specific"));

        store.set("name", Value::from("a")).expect("write");

        assert_that(order.lock().expect("lock").clone())
            .is_equal_to(vec!["specific", "any"]);
    }

    #[test]
    fn deep_watchers_see_descendant_writes() {
        let store = Store::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        store.watch_deep("profile", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.set("profile.name", Value::from("tomy")).expect("write");
        store.set("other", Value::from(1)).expect("write");

        assert_that(fired.load(Ordering::SeqCst)).is_equal_to(1);
    }

    #[test]
    fn reentrant_writes_terminate_via_dedupe() {
        let store = Store::new();
        let echo = store.clone();
        store.watch("a", move |change: &Change| {
            // Writes the same value back; the dedupe must stop the loop.
            echo.set("a", change.value.clone()).expect("write");
        });

        store.set("a", Value::from(1)).expect("write");

        assert_that(store.get("a")).is_equal_to(Some(Value::from(1)));
    }

    #[test]
    fn track_records_read_paths() {
        let store = Store::new();
        store.set("first", Value::from("A")).expect("write");
        store.set("last", Value::from("B")).expect("write");

        let reader = store.clone();
        let (joined, mut deps) = store.track(|| {
            let first = reader.get("first").unwrap_or_default();
            let last = reader.get("last").unwrap_or_default();
            format!("{first:?} {last:?}")
        });
        deps.sort_by_key(|p| p.to_string());

        assert_that(joined.is_empty()).is_false();
        assert_that(deps.len()).is_equal_to(2);
    }

    #[test]
    fn reactors_join_the_same_turn() {
        let store = Store::new();
        store.set_silent("a", Value::from(1)).expect("write");
        store.set_silent("sum", Value::from(1)).expect("write");
        let source = store.clone();
        store.react(move |paths| {
            if paths.iter().any(|p| p.first_key() == Some("a")) {
                let a = source.get("a").and_then(|v| v.as_int()).unwrap_or(0);
                vec![(Path::from("sum"), Value::from(a + 1))]
            } else {
                vec![]
            }
        });
        let order = Arc::new(Mutex::new(Vec::new()));
        let o1 = order.clone();
        let o2 = order.clone();
        store.watch("a", move |_| o1.lock().expect("lock").push("a"));
        store.watch("sum", move |_| o2.lock().expect("lock").push("sum"));

        store.set("a", Value::from(4)).expect("write");

        assert_that(store.get("sum")).is_equal_to(Some(Value::from(5)));
        assert_that(order.lock().expect("lock").clone()).is_equal_to(vec!["a", "sum"]);
    }

    #[test]
    fn replace_swaps_without_notifying() {
        let store = Store::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        store.watch("*", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.replace(record([("name", Value::from("fresh"))]));

        assert_that(fired.load(Ordering::SeqCst)).is_equal_to(0);
        assert_that(store.get("name")).is_equal_to(Some(Value::from("fresh")));
    }

    #[test]
    fn unwatch_detaches_by_token() {
        let store = Store::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let id = store.watch("name", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.set("name", Value::from("a")).expect("write");
        assert_that(store.unwatch(id)).is_true();
        store.set("name", Value::from("b")).expect("write");

        assert_that(fired.load(Ordering::SeqCst)).is_equal_to(1);
    }
}
