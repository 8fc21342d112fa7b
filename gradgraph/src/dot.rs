//! Graphviz dump of a recorded computation, for debugging.
//!
//! Values are drawn as records `{v:value|d:gradient|g:generation}`,
//! operations as filled boxes. Edges run operand → operation → result.

use std::fmt;

use num_traits::Float;

use crate::tape::{Graph, Origin, Tape};
use crate::var::Var;

/// Renders the sub-graph that `root` depends on.
pub struct Dot<'a, T: Float> {
    tape: &'a Tape<T>,
    root: usize,
}

impl<T: Float + fmt::Display> fmt::Display for Dot<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tape = self.tape;
        let mut reachable = vec![false; self.root + 1];
        let mut stack = vec![self.root];
        while let Some(index) = stack.pop() {
            if std::mem::replace(&mut reachable[index], true) {
                continue;
            }
            if let Origin::Op(op) = tape.origins[index] {
                stack.extend(op.operands().map(|operand| operand.index()));
            }
        }

        writeln!(f, "digraph g {{")?;
        for index in (0..=self.root).filter(|&i| reachable[i]) {
            writeln!(
                f,
                "  v{index} [shape=record, label=\"{{v:{:.3}|d:{:.3}|g:{}}}\"]",
                tape.vals[index], tape.grads[index], tape.generations[index]
            )?;
            if let Origin::Op(op) = tape.origins[index] {
                writeln!(
                    f,
                    "  f{index} [shape=box, label=\"{}\", style=filled, color=lightblue]",
                    op.name()
                )?;
            }
        }
        for index in (0..=self.root).filter(|&i| reachable[i]) {
            if let Origin::Op(op) = tape.origins[index] {
                writeln!(f, "  f{index} -> v{index}")?;
                for operand in op.operands() {
                    writeln!(f, "  v{} -> f{index}", operand.index())?;
                }
            }
        }
        writeln!(f, "}}")
    }
}

impl<T: Float + fmt::Display> Graph<T> {
    /// DOT source for everything `root` depends on.
    ///
    /// ```
    /// use gradgraph::Graph;
    ///
    /// let graph = Graph::new();
    /// let x = graph.var(2.0);
    /// let y = x.exp();
    /// let dot = graph.to_dot(&y);
    ///
    /// assert!(dot.starts_with("digraph g {"));
    /// assert!(dot.contains("label=\"Exp\""));
    /// assert!(dot.contains("v0 -> f1"));
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `root` belongs to another graph.
    pub fn to_dot(&self, root: &Var<T>) -> String {
        assert!(
            root.graph().ptr_eq(self),
            "Var does not belong to this graph"
        );
        let tape = self.tape.borrow();
        Dot {
            tape: &tape,
            root: root.id().index(),
        }
        .to_string()
    }
}
