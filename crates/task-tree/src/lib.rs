//! Frame-driven behavior tree runtime.
//!
//! Trees are built in a [`TaskTree`] arena and driven by a [`TaskEntry`], one
//! `update(frame)` call per tick. Everything runs synchronously on the
//! caller's thread: "parallel" nodes advance several children within the
//! same tick, and completion is pushed up the tree as it happens.
//!
//! - **Reentrant completion**: a child completing may synchronously complete,
//!   reset or re-enter its controller. Every controller re-validates its own
//!   reentry id after running a child before touching its state again.
//! - **Cooperative cancellation**: [`CancelToken`]s are checked at fixed
//!   checkpoints; stopping a task stops its live subtree first.
//! - **Caller-owned context**: the blackboard `B` is threaded through every
//!   leaf and never interpreted by the runtime.
//!
//! # Architecture
//!
//! - [`Action`]: user logic at the leaves, see [`leaf`] for stock actions
//! - [`TaskTree`]: the arena, with constructors for every node kind
//! - [`TaskEntry`]: the root and tick driver
//! - [`JoinPolicy`]: pluggable completion rule of `Join` branches
//! - [`DelayedCompressList`]: child storage that tolerates mutation during
//!   reentrant iteration
//! - [`def`]: declarative trees (`serde` feature)

pub mod action;
pub mod builder;
pub mod cancel;
mod composite;
pub mod compress_list;
pub mod config;
pub mod decorator;
#[cfg(feature = "serde")]
pub mod def;
pub mod entry;
pub mod error;
pub mod fsm;
pub mod join;
pub mod leaf;
pub mod loader;
mod parallel;
mod scheduler;
pub mod status;
mod task;
pub mod tree;

pub use action::{Action, ChildEdit, LeafContext};
pub use cancel::CancelToken;
pub use compress_list::DelayedCompressList;
pub use config::TreeConfig;
pub use decorator::RepeatMode;
pub use entry::TaskEntry;
pub use error::{LoadError, Result, TaskError};
pub use fsm::{StateChange, StateMachineHandler};
pub use join::{
    JoinAnyOf, JoinEventAction, JoinMain, JoinPolicy, JoinProgress, JoinSelector, JoinSelectorN,
    JoinSequence, JoinWaitAll,
};
pub use loader::{NoopLoader, TreeLoader};
pub use status::{Status, codes};
pub use task::TaskId;
pub use tree::{TaskTree, TaskType};
