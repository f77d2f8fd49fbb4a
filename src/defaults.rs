//! Default-target registry (spec §4.6): the top-level list of targets to
//! build when the caller requests nothing explicit.

use crate::graph::{FileId, Graph};

#[derive(Default)]
pub struct DefaultTargets {
    targets: Vec<FileId>,
}

impl DefaultTargets {
    pub fn push(&mut self, id: FileId) {
        self.targets.push(id);
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = FileId> + '_ {
        self.targets.iter().copied()
    }

    /// Apply `f` to every declared default target, in declaration order. If
    /// no `default` statement appeared anywhere in the manifest, apply `f`
    /// to every root of the dependency DAG instead: a node that is itself a
    /// build output and that no other edge consumes as an input.
    pub fn defaultnodes(&self, graph: &Graph, mut f: impl FnMut(FileId)) {
        if !self.targets.is_empty() {
            for &id in &self.targets {
                f(id);
            }
            return;
        }
        for (id, node) in graph.all_nodes() {
            if node.gen.is_some() && node.uses.is_empty() {
                f(id);
            }
        }
    }
}
