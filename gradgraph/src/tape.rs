//! The recording arena for reverse-mode AD.
//!
//! A [`Tape`] stores every value of a computation in insertion order,
//! one slot per node, with the per-node data split across parallel
//! vectors. A node is either a leaf or the result of exactly one
//! [`Operation`] whose operands were recorded earlier, so indices
//! double as a topological order and the arena can never contain a
//! cycle.
//!
//! Users work with the shared [`Graph`] handle and the [`Var`] values
//! it hands out; the tape itself is internal.

use std::cell::RefCell;
use std::rc::Rc;

use num_traits::Float;

use crate::error::AdError;
use crate::op::{BinaryOp, Operation, UnaryOp};
use crate::var::Var;

/// Stable index of a value in its graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueId(usize);

impl ValueId {
    pub(crate) fn new(index: usize) -> Self {
        ValueId(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// How a value came to exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    /// A declared input or constant.
    Leaf,
    /// The output of a recorded operation.
    Op(Operation),
}

/// The arena behind a [`Graph`].
pub struct Tape<T: Float> {
    pub(crate) vals: Vec<T>,
    pub(crate) grads: Vec<T>,
    pub(crate) generations: Vec<usize>,
    pub(crate) origins: Vec<Origin>,
}

impl<T: Float> Tape<T> {
    fn new() -> Self {
        Self {
            vals: Vec::new(),
            grads: Vec::new(),
            generations: Vec::new(),
            origins: Vec::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.vals.len()
    }

    fn push(&mut self, value: T, generation: usize, origin: Origin) -> ValueId {
        let id = ValueId(self.vals.len());
        self.vals.push(value);
        self.grads.push(T::zero());
        self.generations.push(generation);
        self.origins.push(origin);
        id
    }

    pub(crate) fn push_leaf(&mut self, value: T) -> ValueId {
        self.push(value, 0, Origin::Leaf)
    }

    pub(crate) fn push_unary(&mut self, op: UnaryOp, arg: ValueId) -> ValueId {
        let value = op.forward(self.vals[arg.0]);
        let generation = self.generations[arg.0] + 1;
        self.push(value, generation, Origin::Op(Operation::Unary { op, arg }))
    }

    pub(crate) fn push_binary(&mut self, op: BinaryOp, lhs: ValueId, rhs: ValueId) -> ValueId {
        let value = op.forward(self.vals[lhs.0], self.vals[rhs.0]);
        let generation = self.generations[lhs.0].max(self.generations[rhs.0]) + 1;
        self.push(
            value,
            generation,
            Origin::Op(Operation::Binary { op, lhs, rhs }),
        )
    }

    pub(crate) fn check(&self, id: ValueId) -> Result<(), AdError> {
        if id.0 < self.len() {
            Ok(())
        } else {
            Err(AdError::UnknownValue {
                index: id.0,
                len: self.len(),
            })
        }
    }

    fn zero_grad(&mut self) {
        for g in &mut self.grads {
            *g = T::zero();
        }
    }

    fn validate(&self) -> Result<(), AdError> {
        for (index, origin) in self.origins.iter().enumerate() {
            let broken = |reason: String| AdError::BrokenInvariant { index, reason };
            let generation = self.generations[index];
            match origin {
                Origin::Leaf => {
                    if generation != 0 {
                        return Err(broken(format!("leaf has generation {generation}")));
                    }
                }
                Origin::Op(op) => {
                    let mut deepest = 0;
                    for operand in op.operands() {
                        if operand.0 >= index {
                            return Err(broken(format!(
                                "operand #{} does not precede its consumer",
                                operand.0
                            )));
                        }
                        deepest = deepest.max(self.generations[operand.0]);
                    }
                    if generation != deepest + 1 {
                        return Err(broken(format!(
                            "generation {generation}, expected {}",
                            deepest + 1
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn evaluate(&self, out: ValueId, overrides: &[(ValueId, T)]) -> Result<T, AdError> {
        self.check(out)?;
        let mut scratch = self.vals[..=out.0].to_vec();
        for &(id, value) in overrides {
            self.check(id)?;
            if self.origins[id.0] != Origin::Leaf {
                return Err(AdError::NotALeaf { index: id.0 });
            }
            if let Some(slot) = scratch.get_mut(id.0) {
                *slot = value;
            }
        }
        for index in 0..scratch.len() {
            if let Origin::Op(op) = self.origins[index] {
                let value = op.forward(&scratch);
                scratch[index] = value;
            }
        }
        Ok(scratch[out.0])
    }
}

/// A shared handle to a computation graph.
///
/// Cloning a `Graph` yields another handle to the same arena. Values
/// are created with [`Graph::var`] and combined through the operators
/// on [`Var`].
///
/// # Examples
///
/// ```
/// use gradgraph::Graph;
///
/// let graph = Graph::new();
/// let x = graph.var(3.0);
/// let y = &x * &x; // y = x²
/// y.backward();
///
/// assert_eq!(y.value(), 9.0);
/// assert_eq!(x.grad(), 6.0); // dy/dx = 2x
/// assert_eq!(graph.len(), 2);
/// ```
pub struct Graph<T: Float = f64> {
    pub(crate) tape: Rc<RefCell<Tape<T>>>,
}

impl<T: Float> Clone for Graph<T> {
    fn clone(&self) -> Self {
        Self {
            tape: Rc::clone(&self.tape),
        }
    }
}

impl<T: Float> Default for Graph<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Float> Graph<T> {
    pub fn new() -> Self {
        Self {
            tape: Rc::new(RefCell::new(Tape::new())),
        }
    }

    /// Declares an input of the computation.
    pub fn var(&self, value: T) -> Var<T> {
        let id = self.tape.borrow_mut().push_leaf(value);
        Var::from_parts(Rc::clone(&self.tape), id)
    }

    /// Records a constant. Constants are leaves like any input; their
    /// gradient is simply never read.
    pub fn constant(&self, value: T) -> Var<T> {
        self.var(value)
    }

    /// Number of recorded values, leaves included.
    pub fn len(&self) -> usize {
        self.tape.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resets every gradient accumulator to zero.
    ///
    /// Backward passes add into the accumulators; call this between
    /// passes that should not see each other's contributions.
    pub fn zero_grad(&self) {
        self.tape.borrow_mut().zero_grad()
    }

    /// Checks the structural invariants of the arena: every operand
    /// precedes its consumer, leaves sit at generation 0, and every
    /// other value sits one generation above its deepest operand.
    pub fn validate(&self) -> Result<(), AdError> {
        self.tape.borrow().validate()
    }

    /// Recomputes the forward value of `out` from the leaves, without
    /// writing to the graph.
    ///
    /// Each `(leaf, value)` pair in `overrides` replaces that leaf's
    /// recorded scalar for this evaluation only, so the recorded
    /// expression can be evaluated at another point.
    ///
    /// # Examples
    ///
    /// ```
    /// use gradgraph::Graph;
    ///
    /// let graph = Graph::new();
    /// let x = graph.var(2.0);
    /// let y = x.square().exp();
    ///
    /// assert_eq!(graph.evaluate(y.id(), &[]), Ok(y.value()));
    /// assert_eq!(graph.evaluate(y.id(), &[(x.id(), 0.0)]), Ok(1.0));
    /// ```
    pub fn evaluate(&self, out: ValueId, overrides: &[(ValueId, T)]) -> Result<T, AdError> {
        self.tape.borrow().evaluate(out, overrides)
    }

    pub fn value_of(&self, id: ValueId) -> Result<T, AdError> {
        let tape = self.tape.borrow();
        tape.check(id)?;
        Ok(tape.vals[id.0])
    }

    /// Accumulated gradient of `id`; zero until a backward pass
    /// reaches it.
    pub fn gradient_of(&self, id: ValueId) -> Result<T, AdError> {
        let tape = self.tape.borrow();
        tape.check(id)?;
        Ok(tape.grads[id.0])
    }

    pub fn generation_of(&self, id: ValueId) -> Result<usize, AdError> {
        let tape = self.tape.borrow();
        tape.check(id)?;
        Ok(tape.generations[id.0])
    }

    pub fn origin_of(&self, id: ValueId) -> Result<Origin, AdError> {
        let tape = self.tape.borrow();
        tape.check(id)?;
        Ok(tape.origins[id.0])
    }

    /// Whether `self` and `other` are handles to the same arena.
    pub fn ptr_eq(&self, other: &Graph<T>) -> bool {
        Rc::ptr_eq(&self.tape, &other.tape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_start_at_generation_zero() {
        let graph = Graph::new();
        let x = graph.var(1.5);

        assert_eq!(graph.generation_of(x.id()), Ok(0));
        assert_eq!(graph.origin_of(x.id()), Ok(Origin::Leaf));
        assert_eq!(graph.gradient_of(x.id()), Ok(0.0));
        assert_eq!(graph.value_of(x.id()), Ok(1.5));
    }

    #[test]
    fn generation_is_longest_path_from_a_leaf() {
        let graph = Graph::new();
        let x = graph.var(1.0);
        let y = graph.var(2.0);
        let a = x.square(); // 1
        let b = a.exp(); // 2
        let c = &b + &y; // max(2, 0) + 1

        assert_eq!(a.generation(), 1);
        assert_eq!(b.generation(), 2);
        assert_eq!(c.generation(), 3);
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn operands_precede_consumers() {
        let graph = Graph::new();
        let x = graph.var(1.4);
        let a = x.square();
        let y = &a.exp() + &a.square();

        let tape = graph.tape.borrow();
        for (index, origin) in tape.origins.iter().enumerate() {
            if let Origin::Op(op) = origin {
                assert!(op.operands().all(|operand| operand.index() < index));
            }
        }
        assert_eq!(y.id().index(), tape.len() - 1);
    }

    #[test]
    fn validate_reports_a_tampered_generation() {
        let graph = Graph::new();
        let x = graph.var(1.0);
        let y = x.square();
        graph.tape.borrow_mut().generations[y.id().index()] = 7;

        assert_eq!(
            graph.validate(),
            Err(AdError::BrokenInvariant {
                index: 1,
                reason: "generation 7, expected 1".to_string(),
            })
        );
    }

    #[test]
    fn unknown_ids_are_rejected() {
        let graph = Graph::<f64>::new();
        let other = Graph::new();
        let _ = other.var(1.0);
        let stray = other.var(2.0).id();

        assert_eq!(
            graph.gradient_of(stray),
            Err(AdError::UnknownValue { index: 1, len: 0 })
        );
    }

    #[test]
    fn evaluate_rejects_internal_overrides() {
        let graph = Graph::new();
        let x = graph.var(1.0);
        let y = x.exp();
        let z = y.square();

        assert_eq!(
            graph.evaluate(z.id(), &[(y.id(), 3.0)]),
            Err(AdError::NotALeaf { index: 1 })
        );
    }

    #[test]
    fn evaluate_does_not_touch_the_graph() {
        let graph = Graph::new();
        let x = graph.var(1.4);
        let a = x.square();
        let y = &a.exp() + &a.square();

        let before: Vec<f64> = graph.tape.borrow().vals.clone();
        assert_eq!(graph.evaluate(y.id(), &[]), Ok(y.value()));
        let moved = graph.evaluate(y.id(), &[(x.id(), 0.5)]).unwrap();
        let expected = 0.25_f64.exp() + 0.0625;
        assert!((moved - expected).abs() < 1e-12);

        let tape = graph.tape.borrow();
        assert_eq!(tape.vals, before);
        assert!(tape.grads.iter().all(|&g| g == 0.0));
    }

    #[test]
    fn zero_grad_resets_all_accumulators() {
        let graph = Graph::new();
        let x = graph.var(3.0);
        let y = &x * &x;
        y.backward();
        assert_eq!(x.grad(), 6.0);

        graph.zero_grad();
        assert_eq!(x.grad(), 0.0);
        assert_eq!(y.grad(), 0.0);
    }

    #[test]
    fn handles_share_one_arena() {
        let graph = Graph::<f64>::new();
        let alias = graph.clone();
        let _ = alias.var(1.0);

        assert!(graph.ptr_eq(&alias));
        assert!(!graph.ptr_eq(&Graph::new()));
        assert_eq!(graph.len(), 1);
        assert!(!graph.is_empty());
    }
}
