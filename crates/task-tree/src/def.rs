//! Declarative tree definitions.
//!
//! A [`NodeDef`] describes a subtree purely as configuration: node kinds,
//! their parameters, guards and named leaves. [`TaskTree::instantiate`] turns
//! it into live tasks, with every run-time field at its default. Leaves are
//! looked up by name in a [`LeafRegistry`], which is how user actions enter a
//! tree built from data.
//!
//! ```
//! use task_tree::def::{LeafRegistry, NodeDef};
//! use task_tree::{leaf::Success, TaskEntry, TaskTree, Status};
//!
//! let def: NodeDef = serde_json::from_str(r#"{
//!     "type": "sequence",
//!     "children": [
//!         { "type": "leaf", "name": "ok" },
//!         { "type": "inverter", "child": { "type": "leaf", "name": "fail" } }
//!     ]
//! }"#).unwrap();
//!
//! let mut leaves = LeafRegistry::new();
//! leaves.register("ok", || Success);
//! leaves.register("fail", || task_tree::leaf::Failure::default());
//!
//! let mut tree: TaskTree<()> = TaskTree::new();
//! let root = tree.instantiate(&def, &leaves).unwrap();
//! assert_eq!(TaskEntry::new(tree, root, ()).update(0), Status::Success);
//! ```

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    Action, JoinAnyOf, JoinMain, JoinPolicy, JoinSelector, JoinSelectorN, JoinSequence,
    JoinWaitAll, LoadError, RepeatMode, Status, TaskId, TaskTree, TreeLoader,
};

/// A node with its optional label and guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
    /// Name given to the task, see [`TaskTree::find_by_name`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<Box<NodeDef>>,
    #[serde(flatten)]
    pub task: TaskDef,
}

impl NodeDef {
    pub fn new(task: TaskDef) -> Self {
        Self {
            label: None,
            guard: None,
            task,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_guard(mut self, guard: NodeDef) -> Self {
        self.guard = Some(Box::new(guard));
        self
    }

    fn display_name(&self) -> String {
        self.label.clone().unwrap_or_else(|| self.task.kind_name().to_owned())
    }
}

impl From<TaskDef> for NodeDef {
    fn from(task: TaskDef) -> Self {
        Self::new(task)
    }
}

/// Node kinds with their configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskDef {
    /// A leaf created by the registry entry `name`.
    Leaf { name: String },

    Sequence { children: Vec<NodeDef> },
    Selector { children: Vec<NodeDef> },
    SelectorN { required: u32, children: Vec<NodeDef> },
    Foreach { children: Vec<NodeDef> },
    Switch { children: Vec<NodeDef> },
    ActiveSelector { children: Vec<NodeDef> },
    /// The first child is the main task.
    SimpleParallel { children: Vec<NodeDef> },
    /// The first child is the main task.
    ServiceParallel { children: Vec<NodeDef> },
    Join { policy: JoinPolicyDef, children: Vec<NodeDef> },

    Inverter { child: Box<NodeDef> },
    AlwaysSuccess { child: Box<NodeDef> },
    AlwaysFail { child: Box<NodeDef> },
    AlwaysRunning {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        child: Option<Box<NodeDef>>,
    },
    OnlyOnce { child: Box<NodeDef> },
    Repeat {
        #[serde(default)]
        mode: RepeatMode,
        required: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_loop_per_frame: Option<u32>,
        child: Box<NodeDef>,
    },
    UntilSuccess {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_loop_per_frame: Option<u32>,
        child: Box<NodeDef>,
    },
    UntilFail {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_loop_per_frame: Option<u32>,
        child: Box<NodeDef>,
    },
    UntilCond {
        cond: Box<NodeDef>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_loop_per_frame: Option<u32>,
        child: Box<NodeDef>,
    },
    AlwaysCheckGuard { child: Box<NodeDef> },
    SubtreeRef { name: String },

    StateMachine {
        #[serde(default)]
        states: Vec<NodeDef>,
        /// Index into `states`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        initial: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        history_capacity: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        no_state_result: Option<Status>,
    },
}

impl TaskDef {
    fn kind_name(&self) -> &'static str {
        match self {
            TaskDef::Leaf { .. } => "leaf",
            TaskDef::Sequence { .. } => "sequence",
            TaskDef::Selector { .. } => "selector",
            TaskDef::SelectorN { .. } => "selector_n",
            TaskDef::Foreach { .. } => "foreach",
            TaskDef::Switch { .. } => "switch",
            TaskDef::ActiveSelector { .. } => "active_selector",
            TaskDef::SimpleParallel { .. } => "simple_parallel",
            TaskDef::ServiceParallel { .. } => "service_parallel",
            TaskDef::Join { .. } => "join",
            TaskDef::Inverter { .. } => "inverter",
            TaskDef::AlwaysSuccess { .. } => "always_success",
            TaskDef::AlwaysFail { .. } => "always_fail",
            TaskDef::AlwaysRunning { .. } => "always_running",
            TaskDef::OnlyOnce { .. } => "only_once",
            TaskDef::Repeat { .. } => "repeat",
            TaskDef::UntilSuccess { .. } => "until_success",
            TaskDef::UntilFail { .. } => "until_fail",
            TaskDef::UntilCond { .. } => "until_cond",
            TaskDef::AlwaysCheckGuard { .. } => "always_check_guard",
            TaskDef::SubtreeRef { .. } => "subtree_ref",
            TaskDef::StateMachine { .. } => "state_machine",
        }
    }
}

/// Stock join policies by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JoinPolicyDef {
    WaitAll,
    AnyOf,
    Main,
    Selector,
    Sequence,
    SelectorN { required: u32 },
}

impl JoinPolicyDef {
    pub fn build(self) -> Box<dyn JoinPolicy> {
        match self {
            JoinPolicyDef::WaitAll => Box::new(JoinWaitAll),
            JoinPolicyDef::AnyOf => Box::new(JoinAnyOf),
            JoinPolicyDef::Main => Box::new(JoinMain),
            JoinPolicyDef::Selector => Box::new(JoinSelector),
            JoinPolicyDef::Sequence => Box::new(JoinSequence),
            JoinPolicyDef::SelectorN { required } => Box::new(JoinSelectorN::new(required)),
        }
    }
}

type LeafFactory<B> = Box<dyn Fn() -> Box<dyn Action<B>> + Send + Sync>;

/// Named leaf factories.
pub struct LeafRegistry<B> {
    factories: HashMap<String, LeafFactory<B>>,
}

impl<B> LeafRegistry<B> {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registers `factory` under `name`, replacing any previous entry.
    pub fn register<A, F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        A: Action<B> + 'static,
        F: Fn() -> A + Send + Sync + 'static,
    {
        let factory: LeafFactory<B> = Box::new(move || Box::new(factory()) as Box<dyn Action<B>>);
        self.factories.insert(name.into(), factory);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn Action<B>>, LoadError> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| LoadError::UnknownLeaf(name.to_owned()))
    }
}

impl<B> Default for LeafRegistry<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B> fmt::Debug for LeafRegistry<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeafRegistry")
            .field("leaves", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<B> TaskTree<B> {
    /// Builds the tasks described by `def` and returns the root.
    ///
    /// # Errors
    ///
    /// Fails on leaves missing from `leaves` and on definitions that cannot
    /// run, such as a parallel without a main task. Tasks created before the
    /// error stay in the arena, unattached.
    pub fn instantiate(&mut self, def: &NodeDef, leaves: &LeafRegistry<B>) -> Result<TaskId, LoadError> {
        let id = self.instantiate_task(def, leaves)?;
        if let Some(label) = &def.label {
            self.set_name(id, label.clone());
        }
        if let Some(guard) = &def.guard {
            let guard = self.instantiate(guard, leaves)?;
            self.set_guard(id, Some(guard));
        }
        Ok(id)
    }

    fn instantiate_all(&mut self, defs: &[NodeDef], leaves: &LeafRegistry<B>) -> Result<Vec<TaskId>, LoadError> {
        defs.iter().map(|def| self.instantiate(def, leaves)).collect()
    }

    fn instantiate_task(&mut self, def: &NodeDef, leaves: &LeafRegistry<B>) -> Result<TaskId, LoadError> {
        let invalid = |reason: &str| LoadError::InvalidDefinition {
            name: def.display_name(),
            reason: reason.to_owned(),
        };

        let id = match &def.task {
            TaskDef::Leaf { name } => {
                let action = leaves.create(name)?;
                self.leaf_boxed(action)
            }

            TaskDef::Sequence { children } => {
                let children = self.instantiate_all(children, leaves)?;
                self.sequence(children)
            }
            TaskDef::Selector { children } => {
                let children = self.instantiate_all(children, leaves)?;
                self.selector(children)
            }
            TaskDef::SelectorN { required, children } => {
                let children = self.instantiate_all(children, leaves)?;
                self.selector_n(*required, children)
            }
            TaskDef::Foreach { children } => {
                let children = self.instantiate_all(children, leaves)?;
                self.foreach(children)
            }
            TaskDef::Switch { children } => {
                let children = self.instantiate_all(children, leaves)?;
                self.switch(children)
            }
            TaskDef::ActiveSelector { children } => {
                let children = self.instantiate_all(children, leaves)?;
                self.active_selector(children)
            }
            TaskDef::SimpleParallel { children } | TaskDef::ServiceParallel { children } => {
                let mut children = self.instantiate_all(children, leaves)?.into_iter();
                let main = children.next().ok_or_else(|| invalid("parallel needs a main task"))?;
                if matches!(def.task, TaskDef::SimpleParallel { .. }) {
                    self.simple_parallel(main, children)
                } else {
                    self.service_parallel(main, children)
                }
            }
            TaskDef::Join { policy, children } => {
                let children = self.instantiate_all(children, leaves)?;
                self.join_boxed(policy.build(), children)
            }

            TaskDef::Inverter { child } => {
                let child = self.instantiate(child, leaves)?;
                self.inverter(child)
            }
            TaskDef::AlwaysSuccess { child } => {
                let child = self.instantiate(child, leaves)?;
                self.always_success(child)
            }
            TaskDef::AlwaysFail { child } => {
                let child = self.instantiate(child, leaves)?;
                self.always_fail(child)
            }
            TaskDef::AlwaysRunning { child } => {
                let child = match child {
                    Some(child) => Some(self.instantiate(child, leaves)?),
                    None => None,
                };
                self.always_running(child)
            }
            TaskDef::OnlyOnce { child } => {
                let child = self.instantiate(child, leaves)?;
                self.only_once(child)
            }
            TaskDef::Repeat {
                mode,
                required,
                max_loop_per_frame,
                child,
            } => {
                let child = self.instantiate(child, leaves)?;
                let id = self.repeat(*mode, *required, child);
                self.apply_loop_bound(id, *max_loop_per_frame);
                id
            }
            TaskDef::UntilSuccess {
                max_loop_per_frame,
                child,
            } => {
                let child = self.instantiate(child, leaves)?;
                let id = self.until_success(child);
                self.apply_loop_bound(id, *max_loop_per_frame);
                id
            }
            TaskDef::UntilFail {
                max_loop_per_frame,
                child,
            } => {
                let child = self.instantiate(child, leaves)?;
                let id = self.until_fail(child);
                self.apply_loop_bound(id, *max_loop_per_frame);
                id
            }
            TaskDef::UntilCond {
                cond,
                max_loop_per_frame,
                child,
            } => {
                let cond = self.instantiate(cond, leaves)?;
                let child = self.instantiate(child, leaves)?;
                let id = self.until_cond(cond, child);
                self.apply_loop_bound(id, *max_loop_per_frame);
                id
            }
            TaskDef::AlwaysCheckGuard { child } => {
                let child = self.instantiate(child, leaves)?;
                self.always_check_guard(child)
            }
            TaskDef::SubtreeRef { name } => self.subtree_ref(name.clone()),

            TaskDef::StateMachine {
                states,
                initial,
                history_capacity,
                no_state_result,
            } => {
                let states = self.instantiate_all(states, leaves)?;
                let initial = match initial {
                    Some(index) => Some(
                        *states
                            .get(*index)
                            .ok_or_else(|| invalid("initial state index out of range"))?,
                    ),
                    None => None,
                };
                if *no_state_result == Some(Status::New) {
                    return Err(invalid("no-state result cannot be `new`"));
                }
                let id = self.state_machine(states, initial);
                if let Some(capacity) = history_capacity {
                    self.set_history_capacity(id, *capacity);
                }
                if let Some(result) = no_state_result {
                    self.set_no_state_result(id, *result);
                }
                id
            }
        };
        Ok(id)
    }

    fn apply_loop_bound(&mut self, id: TaskId, max_loop_per_frame: Option<u32>) {
        if let Some(max_loop_per_frame) = max_loop_per_frame {
            self.set_max_loop_per_frame(id, max_loop_per_frame);
        }
    }
}

/// Loader resolving subtree names against a set of definitions.
///
/// Each load instantiates a fresh copy of the definition. References inside
/// a definition are resolved lazily, on their first entry, so a subtree may
/// refer to itself.
pub struct SubtreeLibrary<B> {
    defs: HashMap<String, NodeDef>,
    leaves: LeafRegistry<B>,
}

impl<B> SubtreeLibrary<B> {
    pub fn new(leaves: LeafRegistry<B>) -> Self {
        Self {
            defs: HashMap::new(),
            leaves,
        }
    }

    pub fn with_defs(mut self, defs: impl IntoIterator<Item = (String, NodeDef)>) -> Self {
        self.defs.extend(defs);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, def: NodeDef) -> Option<NodeDef> {
        self.defs.insert(name.into(), def)
    }

    pub fn get(&self, name: &str) -> Option<&NodeDef> {
        self.defs.get(name)
    }

    pub fn leaves(&self) -> &LeafRegistry<B> {
        &self.leaves
    }
}

impl<B> fmt::Debug for SubtreeLibrary<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubtreeLibrary")
            .field("subtrees", &self.defs.keys().collect::<Vec<_>>())
            .field("leaves", &self.leaves)
            .finish()
    }
}

impl<B> TreeLoader<B> for SubtreeLibrary<B> {
    fn load_root_task(&mut self, name: &str, tree: &mut TaskTree<B>) -> Result<TaskId, LoadError> {
        let def = self
            .defs
            .get(name)
            .ok_or_else(|| LoadError::NotFound(name.to_owned()))?;
        tree.instantiate(def, &self.leaves)
    }
}
