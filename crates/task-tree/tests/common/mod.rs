#![allow(dead_code)]

use std::collections::HashMap;

use task_tree::{Action, LeafContext, Status, TaskId, TaskTree};

/// Blackboard shared by the integration tests.
#[derive(Debug, Default)]
pub struct Board {
    /// Number of `execute` calls per leaf label.
    pub runs: HashMap<&'static str, u32>,
    /// Labels of leaves in the order they were entered.
    pub entered: Vec<&'static str>,
    /// Labels of leaves in the order they exited.
    pub exited: Vec<&'static str>,
    pub alert: bool,
}

impl Board {
    pub fn runs(&self, label: &str) -> u32 {
        self.runs.get(label).copied().unwrap_or(0)
    }
}

/// Leaf that records its lifecycle under `label` and always reports
/// `status` from `execute`.
pub struct Probe {
    label: &'static str,
    status: Status,
}

impl Probe {
    pub fn new(label: &'static str, status: Status) -> Self {
        Self { label, status }
    }
}

impl Action<Board> for Probe {
    fn enter(&mut self, ctx: &mut LeafContext<'_, Board>) {
        ctx.blackboard().entered.push(self.label);
    }

    fn execute(&mut self, ctx: &mut LeafContext<'_, Board>) -> Status {
        *ctx.blackboard().runs.entry(self.label).or_default() += 1;
        self.status
    }

    fn exit(&mut self, ctx: &mut LeafContext<'_, Board>) {
        ctx.blackboard().exited.push(self.label);
    }
}

pub fn probe(tree: &mut TaskTree<Board>, label: &'static str, status: Status) -> TaskId {
    tree.leaf(Probe::new(label, status))
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
