mod common;

use common::{Board, probe};
use task_tree::{LeafContext, StateChange, Status, TaskEntry, TaskId, TaskTree};

fn running_states(tree: &mut TaskTree<Board>) -> Vec<TaskId> {
    ["s0", "s1", "s2", "s3", "s4", "s5"]
        .into_iter()
        .map(|label| probe(tree, label, Status::Running))
        .collect()
}

fn undo_history(entry: &TaskEntry<Board>, fsm: TaskId) -> Vec<TaskId> {
    entry.tree().undo_history(fsm).collect()
}

fn redo_history(entry: &TaskEntry<Board>, fsm: TaskId) -> Vec<TaskId> {
    entry.tree().redo_history(fsm).collect()
}

#[test]
fn undo_and_redo_walk_the_history() {
    let mut tree = TaskTree::new();
    let s = running_states(&mut tree);
    let fsm = tree.state_machine(s.clone(), Some(s[0]));
    tree.set_history_capacity(fsm, 5);

    let mut entry = TaskEntry::new(tree, fsm, Board::default());
    assert_eq!(entry.update(0), Status::Running);
    assert_eq!(entry.tree().current_state(fsm), Some(s[0]));

    for &state in &s[1..] {
        entry.change_state(fsm, state);
        assert_eq!(entry.tree().current_state(fsm), Some(state));
    }
    assert_eq!(undo_history(&entry, fsm), s[..5]);

    let mut visited = Vec::new();
    while entry.undo_change_state(fsm) {
        visited.push(entry.tree().current_state(fsm).unwrap());
    }
    assert_eq!(visited, [s[4], s[3], s[2], s[1], s[0]]);
    assert_eq!(redo_history(&entry, fsm), s[1..]);
    assert!(undo_history(&entry, fsm).is_empty());

    assert!(entry.redo_change_state(fsm));
    assert!(entry.redo_change_state(fsm));
    assert_eq!(entry.tree().current_state(fsm), Some(s[2]));
    assert_eq!(undo_history(&entry, fsm), [s[0], s[1]]);
    assert_eq!(redo_history(&entry, fsm), s[3..]);

    // A regular change forgets what could be redone.
    entry.change_state(fsm, s[5]);
    assert!(redo_history(&entry, fsm).is_empty());
    assert!(!entry.redo_change_state(fsm));
    assert_eq!(entry.status(), Status::Running);
}

#[test]
fn history_drops_oldest_entries() {
    let mut tree = TaskTree::new();
    let s = running_states(&mut tree);
    let fsm = tree.state_machine(s.clone(), Some(s[0]));
    tree.set_history_capacity(fsm, 2);

    let mut entry = TaskEntry::new(tree, fsm, Board::default());
    entry.update(0);
    for &state in &s[1..4] {
        entry.change_state(fsm, state);
    }
    assert_eq!(undo_history(&entry, fsm), [s[1], s[2]]);
}

#[test]
fn leaving_a_state_stops_it() {
    let mut tree = TaskTree::new();
    let s = running_states(&mut tree);
    let fsm = tree.state_machine(s.clone(), Some(s[0]));

    let mut entry = TaskEntry::new(tree, fsm, Board::default());
    entry.update(0);
    entry.change_state(fsm, s[1]);

    assert_eq!(entry.tree().status(s[0]), Status::Cancelled);
    assert!(entry.tree().is_running(s[1]));
    assert_eq!(entry.blackboard().exited, ["s0"]);
    assert_eq!(entry.blackboard().entered, ["s0", "s1"]);
}

#[test]
fn handler_follow_up_is_applied_in_the_same_change() {
    let mut tree = TaskTree::new();
    let s = running_states(&mut tree);
    let fsm = tree.state_machine(s.clone(), Some(s[0]));
    let (redirect, target) = (s[1], s[2]);
    tree.set_state_handler(
        fsm,
        move |_: &mut Board, _: Option<TaskId>, current: Option<TaskId>| {
            (current == Some(redirect)).then_some(StateChange::Enter(target))
        },
    );

    let mut entry = TaskEntry::new(tree, fsm, Board::default());
    entry.update(0);
    entry.change_state(fsm, s[1]);

    assert_eq!(entry.tree().current_state(fsm), Some(s[2]));
    assert_eq!(undo_history(&entry, fsm), [s[0], s[1]]);
    assert_eq!(entry.blackboard().entered, ["s0", "s2"]);
}

#[test]
fn leaf_request_takes_effect_on_next_tick() {
    let mut tree = TaskTree::new();
    let attack = probe(&mut tree, "attack", Status::Running);
    let idle = tree.action(move |ctx: &mut LeafContext<'_, Board>| {
        let runs = ctx.blackboard().runs.entry("idle").or_default();
        *runs += 1;
        if *runs >= 2 {
            ctx.change_state(attack);
        }
        Status::Running
    });
    let fsm = tree.state_machine([idle, attack], Some(idle));

    let mut entry = TaskEntry::new(tree, fsm, Board::default());
    entry.update(0);
    entry.update(1);
    assert_eq!(entry.tree().current_state(fsm), Some(attack));
    assert_eq!(entry.tree().status(idle), Status::Cancelled);
    assert_eq!(entry.blackboard().runs("attack"), 0);

    entry.update(2);
    assert_eq!(entry.blackboard().runs("attack"), 1);
    assert_eq!(entry.blackboard().runs("idle"), 2);
}

#[test]
fn nested_leaf_reaches_enclosing_machine() {
    let mut tree = TaskTree::new();
    let done = probe(&mut tree, "done", Status::Success);
    let trigger = tree.action(move |ctx: &mut LeafContext<'_, Board>| {
        ctx.change_state(done);
        Status::Running
    });
    let busy = probe(&mut tree, "busy", Status::Running);
    let walking = tree.sequence([trigger, busy]);
    let fsm = tree.state_machine([walking, done], Some(walking));

    let mut entry = TaskEntry::new(tree, fsm, Board::default());
    assert_eq!(entry.update(0), Status::Running);
    assert_eq!(entry.tree().current_state(fsm), Some(done));
    assert_eq!(entry.update(1), Status::Success);
}

#[test]
fn completed_state_completes_machine() {
    let mut tree = TaskTree::new();
    let failing = probe(&mut tree, "failing", Status::Failed(14));
    let fsm = tree.state_machine([failing], Some(failing));
    assert_eq!(TaskEntry::new(tree, fsm, Board::default()).update(0), Status::Failed(14));
}

#[test]
fn machine_without_state_uses_no_state_result() {
    let mut tree: TaskTree<Board> = TaskTree::new();
    let fsm = tree.state_machine([], None);
    assert_eq!(TaskEntry::new(tree, fsm, Board::default()).update(0), Status::Success);

    let mut tree = TaskTree::new();
    let work = probe(&mut tree, "work", Status::Success);
    let fsm = tree.state_machine([work], None);
    tree.set_no_state_result(fsm, Status::Running);

    let mut entry = TaskEntry::new(tree, fsm, Board::default());
    assert_eq!(entry.update(0), Status::Running);
    assert_eq!(entry.update(1), Status::Running);

    entry.change_state(fsm, work);
    assert_eq!(entry.status(), Status::Success);
    assert_eq!(entry.blackboard().runs("work"), 1);
}

#[test]
fn clear_state_leaves_machine_idle() {
    let mut tree = TaskTree::new();
    let s = running_states(&mut tree);
    let fsm = tree.state_machine(s.clone(), Some(s[0]));
    tree.set_no_state_result(fsm, Status::Running);

    let mut entry = TaskEntry::new(tree, fsm, Board::default());
    entry.update(0);
    entry.clear_state(fsm);
    assert_eq!(entry.tree().current_state(fsm), None);
    assert_eq!(undo_history(&entry, fsm), [s[0]]);
    assert_eq!(entry.update(1), Status::Running);

    assert!(entry.undo_change_state(fsm));
    assert_eq!(entry.tree().current_state(fsm), Some(s[0]));
}

#[test]
fn request_before_start_replaces_initial_state() {
    let mut tree = TaskTree::new();
    let s = running_states(&mut tree);
    let fsm = tree.state_machine(s.clone(), Some(s[0]));

    let mut entry = TaskEntry::new(tree, fsm, Board::default());
    entry.change_state(fsm, s[3]);
    entry.update(0);
    assert_eq!(entry.tree().current_state(fsm), Some(s[3]));
    assert_eq!(entry.blackboard().entered, ["s3"]);
}

#[test]
fn restart_clears_history_and_states() {
    let mut tree = TaskTree::new();
    let s = running_states(&mut tree);
    let fsm = tree.state_machine(s.clone(), Some(s[0]));

    let mut entry = TaskEntry::new(tree, fsm, Board::default());
    entry.update(0);
    entry.change_state(fsm, s[1]);
    entry.change_state(fsm, s[2]);

    entry.reset_for_restart();
    assert_eq!(entry.tree().current_state(fsm), None);
    assert!(undo_history(&entry, fsm).is_empty());
    for &state in &s {
        assert_eq!(entry.tree().status(state), Status::New);
    }

    entry.update(1);
    assert_eq!(entry.tree().current_state(fsm), Some(s[0]));
}

#[test]
#[should_panic(expected = "is not a state machine")]
fn state_change_on_other_kind_panics() {
    let mut tree = TaskTree::new();
    let leaf = probe(&mut tree, "leaf", Status::Running);
    let root = tree.sequence([leaf]);
    let mut entry = TaskEntry::new(tree, root, Board::default());
    entry.change_state(root, leaf);
}
