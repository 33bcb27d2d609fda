//! Main-task parallels.
//!
//! Child 0 is the main task, every other child is a hook ticked alongside it.
//! The branch completes with the main task's status; hooks still running at
//! that point are stopped.

use crate::TaskId;
use crate::scheduler::Scheduler;

impl<B> Scheduler<'_, B> {
    fn main_task(&self, id: TaskId) -> TaskId {
        self.tree
            .child_at(id, 0)
            .unwrap_or_else(|| panic!("parallel {id} has no main task"))
    }

    /// Captures each child's reentry id so this run can tell which children
    /// it already completed.
    pub(crate) fn capture_entry_ids(&mut self, id: TaskId) {
        let entry_ids: Vec<(TaskId, u32)> = self
            .tree
            .children(id)
            .map(|child| (child, self.tree.reentry_id(child)))
            .collect();
        self.tree.branch_mut(id).entry_ids = entry_ids;
    }

    /// Entry id of `child` in the current run, captured on first sight for
    /// children attached after the run started.
    pub(crate) fn ensure_entry_id(&mut self, id: TaskId, child: TaskId) -> u32 {
        if let Some(entry_id) = self.tree.branch(id).entry_id(child) {
            return entry_id;
        }
        let entry_id = self.tree.reentry_id(child);
        self.tree.branch_mut(id).entry_ids.push((child, entry_id));
        entry_id
    }

    pub(crate) fn enter_parallel(&mut self, id: TaskId) {
        self.main_task(id);
        self.capture_entry_ids(id);
    }

    pub(crate) fn execute_simple_parallel(&mut self, id: TaskId) {
        let reentry_id = self.reentry_id(id);
        let main = self.main_task(id);
        self.run_child(id, main);
        if self.check_cancel(id, reentry_id) {
            return;
        }
        self.run_hooks(id, reentry_id, true);
    }

    pub(crate) fn execute_service_parallel(&mut self, id: TaskId) {
        let reentry_id = self.reentry_id(id);
        if !self.run_hooks(id, reentry_id, false) {
            return;
        }

        let main = self.main_task(id);
        let entry_id = self.ensure_entry_id(id, main);
        if self.completed_since(main, entry_id) {
            let status = self.status(main).outward();
            self.set_completed(id, status);
            return;
        }
        self.run_child(id, main);
        self.check_cancel(id, reentry_id);
    }

    /// Ticks every hook once. With `once_per_run`, hooks that already
    /// completed during this run are left alone.
    ///
    /// Returns `false` if the branch exited while the hooks ran.
    fn run_hooks(&mut self, id: TaskId, reentry_id: u32, once_per_run: bool) -> bool {
        self.with_children_iter(id, |this| {
            let len = this.tree.branch(id).children.len();
            for index in 1..len {
                let Some(hook) = this.tree.child_at(id, index) else {
                    continue;
                };
                if once_per_run {
                    let entry_id = this.ensure_entry_id(id, hook);
                    if this.completed_since(hook, entry_id) {
                        continue;
                    }
                }
                this.run_child(id, hook);
                if this.check_cancel(id, reentry_id) {
                    return false;
                }
            }
            true
        })
    }

    pub(crate) fn parallel_child_completed(&mut self, id: TaskId, child: TaskId) {
        let status = self.status(child);
        self.tree.branch_mut(id).count(status);
        if self.tree.child_at(id, 0) == Some(child) {
            self.set_completed(id, status.outward());
        }
    }
}
