use crate::{LoadError, TaskId, TaskTree};

/// Resolves named subtrees for `SubtreeRef` nodes.
///
/// The loader builds the subtree inside the tree that references it and
/// returns its root, which the reference then adopts as its child.
pub trait TreeLoader<B>: Send {
    fn load_root_task(&mut self, name: &str, tree: &mut TaskTree<B>) -> Result<TaskId, LoadError>;
}

/// Loader for trees without external subtrees. Every lookup fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLoader;

impl<B> TreeLoader<B> for NoopLoader {
    fn load_root_task(&mut self, name: &str, _tree: &mut TaskTree<B>) -> Result<TaskId, LoadError> {
        Err(LoadError::NotFound(name.to_owned()))
    }
}

impl<B, F> TreeLoader<B> for F
where
    F: FnMut(&str, &mut TaskTree<B>) -> Result<TaskId, LoadError> + Send,
{
    fn load_root_task(&mut self, name: &str, tree: &mut TaskTree<B>) -> Result<TaskId, LoadError> {
        self(name, tree)
    }
}
