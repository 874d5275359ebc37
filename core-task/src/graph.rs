//! # Task Graph
//!
//! Node table and state machine behind [`TaskGraph`].
//!
//! ## Overview
//!
//! Every task lives as a node in a single table guarded by one mutex, so
//! sibling completions racing from different tokio tasks serialize their
//! counter updates. State transitions collect side effects (futures to
//! spawn, completion callbacks to fire) while the lock is held and apply
//! them after it is released, which keeps the callbacks free to call back
//! into the graph.
//!
//! A task moves through five states:
//!
//! ```text
//! WaitingToStart -> WaitingForSupertasks -> Running
//!     Running -> WaitingForSubtasks -> Finished
//! ```
//!
//! `start` on a task whose parents are still running parks it in
//! `WaitingForSupertasks`; the last parent to finish dispatching releases
//! it. `done` means "finished dispatching subtasks", so a parent sits in
//! `WaitingForSubtasks` until the join counter catches up. Calls that are
//! invalid for the current state are logged and ignored rather than
//! panicking; a mis-sequenced branch must never take down the whole pass.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tracing::{debug, warn};

/// The work body of a task: a closure producing the future to run.
///
/// The closure receives a [`TaskHandle`] through which the body spawns
/// subtasks and eventually calls [`TaskHandle::done`] or
/// [`TaskHandle::fail`]. Returning from the future without either call
/// leaves the task open forever, mirroring a dispatch that forgot to
/// signal.
pub type TaskWork<E> = Box<dyn FnOnce(TaskHandle<E>) -> BoxFuture<'static, ()> + Send>;

type CompletionFn<E> = Box<dyn FnOnce(Vec<E>) + Send>;

/// Opaque identifier for a node in a [`TaskGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Lifecycle state of a task node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Created, `start` not yet called.
    WaitingToStart,
    /// Started, but some supertask has not finished dispatching yet.
    WaitingForSupertasks,
    /// Work future is executing (or spawned and pending).
    Running,
    /// Finished dispatching; waiting for subtasks to complete.
    WaitingForSubtasks,
    /// Completed; errors aggregated and completion callback fired.
    Finished,
}

struct Node<E> {
    state: TaskState,
    subtasks: Vec<TaskId>,
    supertasks: Vec<TaskId>,
    subtasks_completed: usize,
    supertasks_completed: usize,
    /// Error reported by this task's own `fail`, if any.
    error: Option<E>,
    /// Aggregated errors (own + all subtasks'), valid once `Finished`.
    errors: Vec<E>,
    work: Option<TaskWork<E>>,
    completion: Option<CompletionFn<E>>,
}

impl<E> Node<E> {
    fn new(work: TaskWork<E>) -> Self {
        Self {
            state: TaskState::WaitingToStart,
            subtasks: Vec::new(),
            supertasks: Vec::new(),
            subtasks_completed: 0,
            supertasks_completed: 0,
            error: None,
            errors: Vec::new(),
            work: Some(work),
            completion: None,
        }
    }
}

struct Registry<E> {
    nodes: HashMap<u64, Node<E>>,
    next_id: u64,
}

/// Side effects gathered under the lock, dispatched after release.
struct Effects<E> {
    to_spawn: Vec<(TaskId, TaskWork<E>)>,
    callbacks: Vec<(CompletionFn<E>, Vec<E>)>,
}

impl<E> Effects<E> {
    fn new() -> Self {
        Self {
            to_spawn: Vec::new(),
            callbacks: Vec::new(),
        }
    }
}

/// Deferred fork-join scheduler over a table of task nodes.
///
/// Cloning is cheap; all clones share the same node table. A graph is
/// built per pass: nodes are retained until the graph is dropped so that
/// parents can read their children's aggregated errors.
///
/// Work futures are spawned on the ambient tokio runtime, so graph
/// methods that release work (`start`, `done`, `fail`) must be called
/// from within a runtime context.
pub struct TaskGraph<E> {
    inner: Arc<Mutex<Registry<E>>>,
}

impl<E> Clone for TaskGraph<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> Default for TaskGraph<E>
where
    E: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> TaskGraph<E>
where
    E: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                nodes: HashMap::new(),
                next_id: 0,
            })),
        }
    }

    /// Registers a task without starting it.
    pub fn add_task<F>(&self, work: F) -> TaskId
    where
        F: FnOnce(TaskHandle<E>) -> BoxFuture<'static, ()> + Send + 'static,
    {
        let mut registry = self.lock();
        let id = TaskId(registry.next_id);
        registry.next_id += 1;
        registry.nodes.insert(id.0, Node::new(Box::new(work)));
        debug!(task = %id, "task registered");
        id
    }

    /// Installs the completion callback for `id`.
    ///
    /// The callback fires exactly once, after the task and all of its
    /// subtasks have completed, with the aggregated error list. When the
    /// task is already `Finished` the callback fires immediately.
    pub fn on_finished<F>(&self, id: TaskId, callback: F)
    where
        F: FnOnce(Vec<E>) + Send + 'static,
    {
        let mut callback: Option<CompletionFn<E>> = Some(Box::new(callback));
        let errors = {
            let mut registry = self.lock();
            let Some(node) = registry.nodes.get_mut(&id.0) else {
                warn!(task = %id, "on_finished for unknown task");
                return;
            };
            if node.state != TaskState::Finished {
                node.completion = callback.take();
                return;
            }
            node.errors.clone()
        };
        if let Some(callback) = callback {
            callback(errors);
        }
    }

    /// Declares `child` a subtask of `parent`.
    ///
    /// Valid only before `child` has started and while `parent` is still
    /// dispatching (not yet `done`). Invalid calls are ignored; linking a
    /// child under a parent that already signalled `done` would leave the
    /// child waiting forever, so the link is refused instead.
    pub fn add_child(&self, parent: TaskId, child: TaskId) {
        let mut registry = self.lock();
        let Some(parent_node) = registry.nodes.get(&parent.0) else {
            warn!(task = %parent, "add_child on unknown parent");
            return;
        };
        if matches!(
            parent_node.state,
            TaskState::WaitingForSubtasks | TaskState::Finished
        ) {
            warn!(parent = %parent, child = %child, "add_child after parent finished dispatching; ignored");
            return;
        }
        let Some(child_node) = registry.nodes.get_mut(&child.0) else {
            warn!(task = %child, "add_child on unknown child");
            return;
        };
        if child_node.state != TaskState::WaitingToStart {
            warn!(parent = %parent, child = %child, state = ?child_node.state, "add_child on already-started child; ignored");
            return;
        }
        child_node.supertasks.push(parent);
        if let Some(parent_node) = registry.nodes.get_mut(&parent.0) {
            parent_node.subtasks.push(child);
        }
    }

    /// Starts `id`, or parks it until its supertasks finish dispatching.
    pub fn start(&self, id: TaskId) {
        let mut effects = Effects::new();
        {
            let mut registry = self.lock();
            start_locked(&mut registry, id, &mut effects);
        }
        self.apply(effects);
    }

    /// Marks `id` as finished dispatching, with no error of its own.
    pub fn done(&self, id: TaskId) {
        self.complete(id, None);
    }

    /// Marks `id` as finished dispatching with an error.
    ///
    /// The error joins the aggregated error lists of `id` and of every
    /// ancestor, but does not cancel siblings; the rest of the tree runs
    /// to completion.
    pub fn fail(&self, id: TaskId, error: E) {
        self.complete(id, Some(error));
    }

    /// Current state of `id`, or `None` for an unknown id.
    pub fn state(&self, id: TaskId) -> Option<TaskState> {
        self.lock().nodes.get(&id.0).map(|n| n.state)
    }

    /// Aggregated errors of `id`. Empty until the task reaches `Finished`.
    pub fn errors(&self, id: TaskId) -> Vec<E> {
        self.lock()
            .nodes
            .get(&id.0)
            .map(|n| n.errors.clone())
            .unwrap_or_default()
    }

    fn complete(&self, id: TaskId, error: Option<E>) {
        let mut effects = Effects::new();
        {
            let mut registry = self.lock();
            complete_locked(&mut registry, id, error, &mut effects);
        }
        self.apply(effects);
    }

    fn apply(&self, effects: Effects<E>) {
        for (id, work) in effects.to_spawn {
            let handle = TaskHandle {
                graph: self.clone(),
                id,
            };
            tokio::spawn(work(handle));
        }
        for (callback, errors) in effects.callbacks {
            callback(errors);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry<E>> {
        self.inner.lock().expect("task graph lock poisoned")
    }
}

// ============================================================================
// State transitions (registry lock held)
// ============================================================================

fn start_locked<E: Clone>(registry: &mut Registry<E>, id: TaskId, effects: &mut Effects<E>) {
    let Some(node) = registry.nodes.get_mut(&id.0) else {
        warn!(task = %id, "start on unknown task");
        return;
    };
    if node.state != TaskState::WaitingToStart {
        warn!(task = %id, state = ?node.state, "start on already-started task; ignored");
        return;
    }
    if node.supertasks_completed == node.supertasks.len() {
        run_locked(registry, id, effects);
    } else {
        node.state = TaskState::WaitingForSupertasks;
        debug!(task = %id, "waiting for supertasks");
    }
}

fn run_locked<E: Clone>(registry: &mut Registry<E>, id: TaskId, effects: &mut Effects<E>) {
    let Some(node) = registry.nodes.get_mut(&id.0) else {
        return;
    };
    node.state = TaskState::Running;
    if let Some(work) = node.work.take() {
        debug!(task = %id, "task running");
        effects.to_spawn.push((id, work));
    }
}

fn complete_locked<E: Clone>(
    registry: &mut Registry<E>,
    id: TaskId,
    error: Option<E>,
    effects: &mut Effects<E>,
) {
    let subtasks = {
        let Some(node) = registry.nodes.get_mut(&id.0) else {
            warn!(task = %id, "done/fail on unknown task");
            return;
        };
        if node.state != TaskState::Running {
            warn!(task = %id, state = ?node.state, "done/fail on non-running task; ignored");
            return;
        }
        node.state = TaskState::WaitingForSubtasks;
        node.error = error;
        node.subtasks.clone()
    };

    // Children parked behind this parent may run now.
    for child in &subtasks {
        supertask_did_complete(registry, *child, effects);
    }

    let all_subtasks_done = registry
        .nodes
        .get(&id.0)
        .map(|n| n.subtasks_completed == n.subtasks.len())
        .unwrap_or(false);
    if all_subtasks_done {
        finalize_locked(registry, id, effects);
    }
}

fn supertask_did_complete<E: Clone>(
    registry: &mut Registry<E>,
    id: TaskId,
    effects: &mut Effects<E>,
) {
    let ready = {
        let Some(node) = registry.nodes.get_mut(&id.0) else {
            return;
        };
        match node.state {
            // Not started yet: remember the completion so a later start
            // does not wait for a notification that already happened.
            TaskState::WaitingToStart => {
                node.supertasks_completed += 1;
                false
            }
            TaskState::WaitingForSupertasks => {
                node.supertasks_completed += 1;
                node.supertasks_completed == node.supertasks.len()
            }
            _ => false,
        }
    };
    if ready {
        run_locked(registry, id, effects);
    }
}

fn subtask_did_complete<E: Clone>(
    registry: &mut Registry<E>,
    id: TaskId,
    effects: &mut Effects<E>,
) {
    let ready = {
        let Some(node) = registry.nodes.get_mut(&id.0) else {
            return;
        };
        if node.state != TaskState::WaitingForSubtasks {
            return;
        }
        node.subtasks_completed += 1;
        node.subtasks_completed == node.subtasks.len()
    };
    if ready {
        finalize_locked(registry, id, effects);
    }
}

fn finalize_locked<E: Clone>(registry: &mut Registry<E>, id: TaskId, effects: &mut Effects<E>) {
    let (own_error, subtasks, supertasks, completion) = {
        let Some(node) = registry.nodes.get_mut(&id.0) else {
            return;
        };
        node.state = TaskState::Finished;
        (
            node.error.clone(),
            node.subtasks.clone(),
            node.supertasks.clone(),
            node.completion.take(),
        )
    };

    // Own error first, then each subtask's aggregated list in dispatch
    // order. Subtasks are all Finished here, so their lists are final.
    let mut errors: Vec<E> = own_error.into_iter().collect();
    for child in &subtasks {
        if let Some(child_node) = registry.nodes.get(&child.0) {
            errors.extend(child_node.errors.iter().cloned());
        }
    }
    if let Some(node) = registry.nodes.get_mut(&id.0) {
        node.errors = errors.clone();
    }
    debug!(task = %id, errors = errors.len(), "task finished");

    for supertask in supertasks {
        subtask_did_complete(registry, supertask, effects);
    }
    if let Some(callback) = completion {
        effects.callbacks.push((callback, errors));
    }
}

// ============================================================================
// Task Handle
// ============================================================================

/// Capability handed to a running task's work future.
///
/// Everything a task body can do to the graph goes through its handle:
/// spawn subtasks, then signal `done` or `fail` when dispatching is over.
pub struct TaskHandle<E> {
    graph: TaskGraph<E>,
    id: TaskId,
}

impl<E> Clone for TaskHandle<E> {
    fn clone(&self) -> Self {
        Self {
            graph: self.graph.clone(),
            id: self.id,
        }
    }
}

impl<E> TaskHandle<E>
where
    E: Clone + Send + 'static,
{
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn graph(&self) -> &TaskGraph<E> {
        &self.graph
    }

    /// Registers `work` as a subtask of this task without starting it.
    pub fn add_subtask<F>(&self, work: F) -> TaskId
    where
        F: FnOnce(TaskHandle<E>) -> BoxFuture<'static, ()> + Send + 'static,
    {
        let child = self.graph.add_task(work);
        self.graph.add_child(self.id, child);
        child
    }

    /// Registers and starts `work` as a subtask of this task.
    ///
    /// The subtask still waits for this task's `done` before running, so
    /// a parent can spawn its whole batch and release it at once.
    pub fn spawn_subtask<F>(&self, work: F) -> TaskId
    where
        F: FnOnce(TaskHandle<E>) -> BoxFuture<'static, ()> + Send + 'static,
    {
        let child = self.add_subtask(work);
        self.graph.start(child);
        child
    }

    /// Signals that this task has finished dispatching.
    pub fn done(&self) {
        self.graph.done(self.id);
    }

    /// Signals that this task has finished dispatching, with an error.
    pub fn fail(&self, error: E) {
        self.graph.fail(self.id, error);
    }
}

// ============================================================================
// Tests
// ============================================================================
