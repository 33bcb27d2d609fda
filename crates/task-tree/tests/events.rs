mod common;

use std::any::Any;

use common::{Board, probe};
use task_tree::leaf::WaitFrame;
use task_tree::{
    Action, CancelToken, JoinEventAction, JoinPolicy, JoinProgress, LeafContext, Result, Status,
    TaskEntry, TaskError, TaskTree,
};

#[derive(Debug)]
struct Ping;

#[derive(Debug)]
struct Reject;

/// Runs until it receives a `Ping`; rejects `Reject`.
struct AwaitPing {
    label: &'static str,
}

impl Action<Board> for AwaitPing {
    fn execute(&mut self, _ctx: &mut LeafContext<'_, Board>) -> Status {
        Status::Running
    }

    fn on_event(&mut self, ctx: &mut LeafContext<'_, Board>, event: &dyn Any) -> Result<Status> {
        *ctx.blackboard().runs.entry(self.label).or_default() += 1;
        if event.is::<Reject>() {
            return Err(TaskError::rejected(ctx.task(), "not now"));
        }
        if event.is::<Ping>() {
            return Ok(Status::Success);
        }
        Ok(Status::Running)
    }
}

fn await_ping(tree: &mut TaskTree<Board>, label: &'static str) -> task_tree::TaskId {
    tree.leaf(AwaitPing { label })
}

#[test]
fn event_completion_continues_the_sequence() {
    let mut tree = TaskTree::new();
    let wait = await_ping(&mut tree, "wait");
    let next = probe(&mut tree, "next", Status::Running);
    let root = tree.sequence([wait, next]);

    let mut entry = TaskEntry::new(tree, root, Board::default());
    assert_eq!(entry.update(0), Status::Running);
    entry.on_event(&Ping).unwrap();

    assert_eq!(entry.tree().status(wait), Status::Success);
    // The sequence moved on without waiting for the next tick.
    assert_eq!(entry.blackboard().runs("next"), 1);
}

#[test]
fn event_completion_finishes_the_root() {
    let mut tree = TaskTree::new();
    let wait = await_ping(&mut tree, "wait");
    let root = tree.inverter(wait);

    let mut entry = TaskEntry::new(tree, root, Board::default());
    entry.update(0);
    entry.on_event(&Ping).unwrap();
    assert_eq!(entry.status(), Status::ERROR);
}

#[test]
fn rejected_event_leaves_tree_running() {
    let mut tree = TaskTree::new();
    let wait = await_ping(&mut tree, "wait");
    let root = tree.sequence([wait]);

    let mut entry = TaskEntry::new(tree, root, Board::default());
    entry.update(0);
    let err = entry.on_event(&Reject).unwrap_err();
    assert!(matches!(err, TaskError::EventRejected { task, .. } if task == wait));
    assert!(entry.is_running());

    assert_eq!(entry.update(1), Status::Running);
    entry.on_event(&Ping).unwrap();
    assert_eq!(entry.status(), Status::Success);
}

#[test]
fn events_only_reach_the_active_path() {
    let mut tree = TaskTree::new();
    let first = await_ping(&mut tree, "first");
    let second = await_ping(&mut tree, "second");
    let root = tree.sequence([first, second]);

    let mut entry = TaskEntry::new(tree, root, Board::default());
    entry.on_event(&Ping).unwrap();
    assert!(entry.blackboard().runs.is_empty());

    entry.update(0);
    entry.on_event(&"unrelated").unwrap();
    assert_eq!(entry.blackboard().runs("first"), 1);
    assert_eq!(entry.blackboard().runs("second"), 0);
}

#[test]
fn parallel_routes_events_to_main() {
    let mut tree = TaskTree::new();
    let main = await_ping(&mut tree, "main");
    let hook = await_ping(&mut tree, "hook");
    let root = tree.simple_parallel(main, [hook]);

    let mut entry = TaskEntry::new(tree, root, Board::default());
    entry.update(0);
    entry.on_event(&Ping).unwrap();
    assert_eq!(entry.status(), Status::Success);
    assert_eq!(entry.blackboard().runs("hook"), 0);
    assert_eq!(entry.tree().status(hook), Status::Cancelled);
}

/// Forwards events to the child named by the event, or completes on `Ping`.
struct Router;

impl JoinPolicy for Router {
    fn on_child_completed(&mut self, _: &JoinProgress, _: usize, _: Status) -> Option<Status> {
        None
    }

    fn on_event(&mut self, _: &JoinProgress, event: &dyn Any) -> Result<JoinEventAction> {
        if let Some(&index) = event.downcast_ref::<usize>() {
            Ok(JoinEventAction::Forward(index))
        } else if event.is::<Ping>() {
            Ok(JoinEventAction::Complete(Status::Failed(44)))
        } else {
            Ok(JoinEventAction::Ignore)
        }
    }
}

#[test]
fn join_policy_routes_events() {
    let mut tree = TaskTree::new();
    let a = await_ping(&mut tree, "a");
    let b = await_ping(&mut tree, "b");
    let root = tree.join(Router, [a, b]);

    let mut entry = TaskEntry::new(tree, root, Board::default());
    entry.update(0);
    entry.on_event(&1usize).unwrap();
    assert_eq!(entry.blackboard().runs("a"), 0);
    assert_eq!(entry.blackboard().runs("b"), 1);

    entry.on_event(&"ignored").unwrap();
    assert_eq!(entry.blackboard().runs("b"), 1);

    entry.on_event(&Ping).unwrap();
    assert_eq!(entry.status(), Status::Failed(44));
    assert_eq!(entry.tree().status(a), Status::Cancelled);
}

#[test]
fn cancellation_is_observed_on_next_update() {
    let mut tree = TaskTree::new();
    let busy = probe(&mut tree, "busy", Status::Running);
    let root = tree.sequence([busy]);

    let mut entry = TaskEntry::new(tree, root, Board::default());
    assert_eq!(entry.update(0), Status::Running);
    entry.cancel(7);
    assert!(entry.is_running());

    assert_eq!(entry.update(1), Status::Cancelled);
    assert_eq!(entry.tree().status(busy), Status::Cancelled);
    assert_eq!(entry.blackboard().exited, ["busy"]);
    assert_eq!(entry.cancel_token().code(), 7);
    assert_eq!(entry.blackboard().runs("busy"), 1);
}

#[test]
fn cancelled_before_start() {
    let mut tree = TaskTree::new();
    let busy = probe(&mut tree, "busy", Status::Running);

    let mut entry = TaskEntry::new(tree, busy, Board::default());
    entry.cancel(2);
    assert_eq!(entry.update(0), Status::Cancelled);
    assert_eq!(entry.blackboard().entered, ["busy"]);
    assert_eq!(entry.blackboard().runs("busy"), 0);

    entry.reset_for_restart();
    assert_eq!(entry.update(1), Status::Running);
}

#[test]
fn parent_token_cancels_entry() {
    let parent = CancelToken::new();
    let mut tree = TaskTree::new();
    let wait = tree.leaf(WaitFrame::new(100));
    let root = tree.sequence([wait]);

    let mut entry =
        TaskEntry::new(tree, root, Board::default()).with_cancel_token(parent.new_child());
    assert_eq!(entry.update(0), Status::Running);
    parent.cancel_default();
    assert_eq!(entry.update(1), Status::Cancelled);
}

#[test]
fn stop_cancels_without_waiting() {
    let mut tree = TaskTree::new();
    let busy = probe(&mut tree, "busy", Status::Running);
    let root = tree.sequence([busy]);

    let mut entry = TaskEntry::new(tree, root, Board::default());
    entry.update(0);
    entry.stop();
    assert_eq!(entry.status(), Status::Cancelled);
    assert_eq!(entry.tree().status(busy), Status::Cancelled);
    assert!(!entry.cancel_token().is_cancelling());
}
