mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use common::{Board, probe};
use task_tree::leaf::Running;
use task_tree::{
    LeafContext, LoadError, RepeatMode, Status, TaskEntry, TaskId, TaskTree, TreeConfig, codes,
};

/// Leaf that reports `outcomes[n]` on its n-th run, repeating the last one.
fn scripted(tree: &mut TaskTree<Board>, label: &'static str, outcomes: Vec<Status>) -> TaskId {
    tree.action(move |ctx: &mut LeafContext<'_, Board>| {
        let runs = ctx.blackboard().runs.entry(label).or_default();
        let index = (*runs as usize).min(outcomes.len() - 1);
        *runs += 1;
        outcomes[index]
    })
}

fn looping_tree(max_loop_per_frame: u32) -> TaskTree<Board> {
    TaskTree::with_config(TreeConfig::new().with_max_loop_per_frame(max_loop_per_frame))
}

#[test]
fn inverter_swaps_outcomes() {
    let mut tree = TaskTree::new();
    let ok = probe(&mut tree, "ok", Status::Success);
    let root = tree.inverter(ok);
    assert_eq!(TaskEntry::new(tree, root, Board::default()).update(0), Status::ERROR);

    let mut tree = TaskTree::new();
    let failing = probe(&mut tree, "failing", Status::Failed(30));
    let root = tree.inverter(failing);
    assert_eq!(TaskEntry::new(tree, root, Board::default()).update(0), Status::Success);
}

#[test]
fn always_success_and_always_fail() {
    let mut tree = TaskTree::new();
    let failing = probe(&mut tree, "failing", Status::Failed(30));
    let root = tree.always_success(failing);
    assert_eq!(TaskEntry::new(tree, root, Board::default()).update(0), Status::Success);

    let mut tree = TaskTree::new();
    let ok = probe(&mut tree, "ok", Status::Success);
    let root = tree.always_fail(ok);
    assert_eq!(TaskEntry::new(tree, root, Board::default()).update(0), Status::ERROR);

    let mut tree = TaskTree::new();
    let failing = probe(&mut tree, "failing", Status::Failed(33));
    let root = tree.always_fail(failing);
    assert_eq!(TaskEntry::new(tree, root, Board::default()).update(0), Status::Failed(33));
}

#[test]
fn always_running_never_terminates() {
    let mut tree = TaskTree::new();
    let once = probe(&mut tree, "once", Status::Success);
    let root = tree.always_running(Some(once));

    let mut entry = TaskEntry::new(tree, root, Board::default());
    for frame in 0..20 {
        assert_eq!(entry.update(frame), Status::Running);
    }
    assert_eq!(entry.blackboard().runs("once"), 1);

    let mut tree: TaskTree<Board> = TaskTree::new();
    let root = tree.always_running(None);
    let mut entry = TaskEntry::new(tree, root, Board::default());
    for frame in 0..5 {
        assert_eq!(entry.update(frame), Status::Running);
    }
}

#[test]
fn always_running_keeps_ticking_running_child() {
    let mut tree = TaskTree::new();
    let busy = probe(&mut tree, "busy", Status::Running);
    let root = tree.always_running(Some(busy));

    let mut entry = TaskEntry::new(tree, root, Board::default());
    for frame in 0..3 {
        entry.update(frame);
    }
    assert_eq!(entry.blackboard().runs("busy"), 3);
    assert_eq!(entry.blackboard().entered, ["busy"]);
}

#[test]
fn only_once_runs_child_once_under_repeat() {
    let mut tree = looping_tree(20);
    let work = probe(&mut tree, "work", Status::Success);
    let once = tree.only_once(work);
    let root = tree.repeat(RepeatMode::Always, 11, once);

    let mut entry = TaskEntry::new(tree, root, Board::default());
    assert_eq!(entry.update(0), Status::Success);
    assert_eq!(entry.blackboard().runs("work"), 1);
}

#[test]
fn only_once_replays_failure() {
    let mut tree = looping_tree(3);
    let work = probe(&mut tree, "work", Status::Failed(12));
    let once = tree.only_once(work);
    let root = tree.until_success(once);

    let mut entry = TaskEntry::new(tree, root, Board::default());
    assert_eq!(entry.update(0), Status::Running);
    assert_eq!(entry.update(1), Status::Running);
    assert_eq!(entry.blackboard().runs("work"), 1);
    assert_eq!(entry.tree().status(once), Status::Failed(12));

    // A restart forgets the cached outcome.
    entry.reset_for_restart();
    assert_eq!(entry.update(2), Status::Running);
    assert_eq!(entry.blackboard().runs("work"), 2);
}

#[test]
fn repeat_runs_once_per_tick_by_default() {
    let mut tree = TaskTree::new();
    let work = probe(&mut tree, "work", Status::Success);
    let root = tree.repeat(RepeatMode::Always, 3, work);

    let mut entry = TaskEntry::new(tree, root, Board::default());
    assert_eq!(entry.update(0), Status::Running);
    assert_eq!(entry.update(1), Status::Running);
    assert_eq!(entry.update(2), Status::Success);
    assert_eq!(entry.blackboard().runs("work"), 3);
}

#[test]
fn repeat_counts_only_selected_outcomes() {
    let mut tree = looping_tree(10);
    let work = scripted(
        &mut tree,
        "work",
        vec![Status::Success, Status::ERROR, Status::ERROR, Status::Success],
    );
    let root = tree.repeat(RepeatMode::OnlySuccess, 2, work);

    let mut entry = TaskEntry::new(tree, root, Board::default());
    assert_eq!(entry.update(0), Status::Success);
    assert_eq!(entry.blackboard().runs("work"), 4);
}

#[test]
fn repeat_zero_succeeds_without_running_child() {
    let mut tree = TaskTree::new();
    let work = probe(&mut tree, "work", Status::Success);
    let root = tree.repeat(RepeatMode::Always, 0, work);

    let mut entry = TaskEntry::new(tree, root, Board::default());
    assert_eq!(entry.update(0), Status::Success);
    assert_eq!(entry.blackboard().runs("work"), 0);
}

#[test]
fn repeat_never_loops_until_stopped() {
    let mut tree = looping_tree(4);
    let work = probe(&mut tree, "work", Status::Success);
    let root = tree.repeat(RepeatMode::Never, 1, work);

    let mut entry = TaskEntry::new(tree, root, Board::default());
    assert_eq!(entry.update(0), Status::Running);
    assert_eq!(entry.update(1), Status::Running);
    assert_eq!(entry.blackboard().runs("work"), 8);
    entry.stop();
    assert_eq!(entry.status(), Status::Cancelled);
}

#[test]
fn until_success_respects_loop_bound() {
    let outcomes = vec![Status::ERROR, Status::ERROR, Status::Success];

    let mut tree = looping_tree(10);
    let work = scripted(&mut tree, "work", outcomes.clone());
    let root = tree.until_success(work);
    let mut entry = TaskEntry::new(tree, root, Board::default());
    assert_eq!(entry.update(0), Status::Success);
    assert_eq!(entry.blackboard().runs("work"), 3);

    let mut tree = TaskTree::new();
    let work = scripted(&mut tree, "work", outcomes);
    let root = tree.until_success(work);
    let mut entry = TaskEntry::new(tree, root, Board::default());
    assert_eq!(entry.update(0), Status::Running);
    assert_eq!(entry.update(1), Status::Running);
    assert_eq!(entry.update(2), Status::Success);
}

#[test]
fn until_fail_succeeds_on_failure() {
    let mut tree = looping_tree(10);
    let work = scripted(&mut tree, "work", vec![Status::Success, Status::Failed(8)]);
    let root = tree.until_fail(work);

    let mut entry = TaskEntry::new(tree, root, Board::default());
    assert_eq!(entry.update(0), Status::Success);
    assert_eq!(entry.blackboard().runs("work"), 2);
}

#[test]
fn per_tree_loop_bound_can_be_overridden() {
    let mut tree = TaskTree::new();
    let work = scripted(&mut tree, "work", vec![Status::ERROR, Status::Success]);
    let root = tree.until_success(work);
    tree.set_max_loop_per_frame(root, 2);

    let mut entry = TaskEntry::new(tree, root, Board::default());
    assert_eq!(entry.update(0), Status::Success);
}

#[test]
fn until_cond_finishes_with_child_status() {
    let mut tree = looping_tree(5);
    let work = probe(&mut tree, "work", Status::Failed(7));
    let cond = tree.condition(|board: &Board| board.runs("work") >= 3);
    let root = tree.until_cond(cond, work);

    let mut entry = TaskEntry::new(tree, root, Board::default());
    assert_eq!(entry.update(0), Status::Failed(7));
    assert_eq!(entry.blackboard().runs("work"), 3);
}

#[test]
fn always_check_guard_stops_child_when_guard_turns() {
    let mut tree = TaskTree::new();
    let work = probe(&mut tree, "work", Status::Running);
    let guard = tree.condition(|board: &Board| !board.alert);
    tree.set_guard(work, Some(guard));
    let root = tree.always_check_guard(work);

    let mut entry = TaskEntry::new(tree, root, Board::default());
    assert_eq!(entry.update(0), Status::Running);
    assert_eq!(entry.update(1), Status::Running);

    entry.blackboard_mut().alert = true;
    assert_eq!(entry.update(2), Status::GuardFailed);
    assert_eq!(entry.tree().status(work), Status::Cancelled);
    assert_eq!(entry.blackboard().exited, ["work"]);
    assert_eq!(entry.blackboard().runs("work"), 2);
}

#[test]
fn missing_subtree_fails_with_load_code() {
    let mut tree: TaskTree<Board> = TaskTree::new();
    let root = tree.subtree_ref("patrol");

    let mut entry = TaskEntry::new(tree, root, Board::default());
    assert_eq!(entry.update(0), Status::Failed(codes::SUBTREE_LOAD_FAILED));
}

#[test]
fn subtree_is_loaded_once() {
    let loads = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&loads);
    let loader = move |name: &str, tree: &mut TaskTree<Board>| -> Result<TaskId, LoadError> {
        counter.fetch_add(1, Ordering::Relaxed);
        match name {
            "patrol" => Ok(probe(tree, "patrol", Status::Success)),
            other => Err(LoadError::NotFound(other.to_owned())),
        }
    };

    let mut tree = TaskTree::new();
    let root = tree.subtree_ref("patrol");
    let mut entry = TaskEntry::new(tree, root, Board::default()).with_loader(loader);

    assert_eq!(entry.update(0), Status::Success);
    let loaded = entry.tree().decorated(root);
    assert!(loaded.is_some());

    entry.reset_for_restart();
    assert_eq!(entry.update(1), Status::Success);
    assert_eq!(entry.tree().decorated(root), loaded);
    assert_eq!(loads.load(Ordering::Relaxed), 1);
    assert_eq!(entry.blackboard().runs("patrol"), 2);
}

#[test]
#[should_panic(expected = "has no child")]
fn loop_without_child_panics() {
    let mut tree = TaskTree::new();
    let leaf = tree.leaf(Running);
    let root = tree.until_success(leaf);
    tree.set_decorated(root, None);
    let _ = TaskEntry::new(tree, root, Board::default()).update(0);
}
