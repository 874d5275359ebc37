//! # Core Task
//!
//! Deferred fork-join task scheduling for multi-step sync work.
//!
//! ## Overview
//!
//! A reconciliation pass is a tree of small units of work whose shape is
//! only discovered while running: listing the remote catalog decides how
//! many downloads and uploads to spawn. [`TaskGraph`] tracks that tree.
//! A parent signals that it has finished *dispatching* (not that its
//! descendants are done), and the graph holds the parent open until every
//! subtask has completed, then aggregates subtask errors upward and fires
//! the parent's completion callback exactly once.
//!
//! - **TaskGraph**: owns the node table and drives state transitions
//! - **TaskHandle**: passed into each work future; used to spawn
//!   subtasks and to report completion or failure
//!
//! ## Example
//!
//! ```rust
//! use core_task::TaskGraph;
//! use futures::FutureExt;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let graph = TaskGraph::<String>::new();
//! let root = graph.add_task(|handle| {
//!     async move {
//!         handle.spawn_subtask(|child| async move { child.done() }.boxed());
//!         handle.done();
//!     }
//!     .boxed()
//! });
//! let (tx, rx) = tokio::sync::oneshot::channel();
//! graph.on_finished(root, move |errors| {
//!     tx.send(errors).ok();
//! });
//! graph.start(root);
//! assert!(rx.await.unwrap().is_empty());
//! # }
//! ```

pub mod graph;

pub use graph::{TaskGraph, TaskHandle, TaskId, TaskState};
