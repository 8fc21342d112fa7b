//! The reverse-mode scheduler.
//!
//! A value may feed any number of operations, so its adjoint is only
//! complete once every consumer has contributed. Every consumer sits
//! at a strictly higher generation than its operands; popping values
//! in decreasing generation order therefore finishes all consumers of
//! a value before the value itself propagates.
//!
//! Each pass accumulates into pass-local adjoints and commits them to
//! the graph's gradient accumulators at the end, so running `backward`
//! twice leaves every gradient equal to the sum of both passes.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};

use num_traits::Float;
use tracing::{debug, debug_span, trace};

use crate::tape::{Origin, Tape, ValueId};

/// Worklist structure used to order a backward pass.
///
/// Both schedules pop the highest generation first and break ties by
/// insertion order; they differ only in bookkeeping cost.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Schedule {
    /// One FIFO bucket per generation.
    #[default]
    Buckets,
    /// A binary heap keyed by `(generation, insertion order)`.
    Heap,
}

/// What a backward pass did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Internal values in the order their operations were
    /// back-propagated. Each appears once.
    pub order: Vec<ValueId>,
    /// Number of leaves that received a contribution.
    pub leaves: usize,
}

trait Worklist {
    fn push(&mut self, id: ValueId, generation: usize);
    fn pop(&mut self) -> Option<ValueId>;
}

struct GenerationBuckets {
    buckets: Vec<VecDeque<ValueId>>,
    top: usize,
}

impl GenerationBuckets {
    fn new(max_generation: usize) -> Self {
        Self {
            buckets: vec![VecDeque::new(); max_generation + 1],
            top: 0,
        }
    }
}

impl Worklist for GenerationBuckets {
    fn push(&mut self, id: ValueId, generation: usize) {
        if generation >= self.buckets.len() {
            self.buckets.resize_with(generation + 1, VecDeque::new);
        }
        self.buckets[generation].push_back(id);
        self.top = self.top.max(generation);
    }

    fn pop(&mut self) -> Option<ValueId> {
        loop {
            if let Some(id) = self.buckets[self.top].pop_front() {
                return Some(id);
            }
            if self.top == 0 {
                return None;
            }
            self.top -= 1;
        }
    }
}

#[derive(Default)]
struct GenerationHeap {
    heap: BinaryHeap<(usize, Reverse<u64>, ValueId)>,
    pushed: u64,
}

impl Worklist for GenerationHeap {
    fn push(&mut self, id: ValueId, generation: usize) {
        self.heap.push((generation, Reverse(self.pushed), id));
        self.pushed += 1;
    }

    fn pop(&mut self) -> Option<ValueId> {
        self.heap.pop().map(|(_, _, id)| id)
    }
}

/// Adjoints gathered by one pass, indexed like the tape prefix that
/// ends at the output.
struct Adjoints<T> {
    values: Vec<T>,
    touched: Vec<bool>,
}

impl<T: Float> Tape<T> {
    pub(crate) fn backward_from(&mut self, out: ValueId, schedule: Schedule) -> PassSummary {
        let _span = debug_span!("backward", output = out.index(), ?schedule).entered();

        let generation = self.generations[out.index()];
        let (adjoints, order) = match schedule {
            Schedule::Buckets => self.propagate(out, GenerationBuckets::new(generation)),
            Schedule::Heap => self.propagate(out, GenerationHeap::default()),
        };

        let mut leaves = 0;
        for (index, adjoint) in adjoints.values.into_iter().enumerate() {
            if !adjoints.touched[index] {
                continue;
            }
            self.grads[index] = self.grads[index] + adjoint;
            if self.origins[index] == Origin::Leaf {
                leaves += 1;
            }
        }

        debug!(processed = order.len(), leaves, "backward pass complete");
        PassSummary { order, leaves }
    }

    fn propagate<W: Worklist>(&self, out: ValueId, mut worklist: W) -> (Adjoints<T>, Vec<ValueId>) {
        let n = out.index() + 1;
        let mut adjoints = Adjoints {
            values: vec![T::zero(); n],
            touched: vec![false; n],
        };
        let mut processed = vec![false; n];
        let mut order = Vec::new();

        adjoints.values[out.index()] = T::one();
        adjoints.touched[out.index()] = true;
        worklist.push(out, self.generations[out.index()]);

        while let Some(id) = worklist.pop() {
            let index = id.index();
            let op = match self.origins[index] {
                Origin::Leaf => continue,
                Origin::Op(op) => op,
            };
            if processed[index] {
                continue;
            }
            processed[index] = true;
            order.push(id);

            let upstream = adjoints.values[index];
            trace!(
                value = index,
                generation = self.generations[index],
                op = op.name(),
                "propagate"
            );
            op.backward(&self.vals, self.vals[index], upstream)
                .for_each(|operand, partial| {
                    let slot = operand.index();
                    adjoints.values[slot] = adjoints.values[slot] + partial;
                    adjoints.touched[slot] = true;
                    worklist.push(operand, self.generations[slot]);
                });
        }

        (adjoints, order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::Operation;
    use crate::{Graph, Var};

    fn diamond(x: &Var<f64>) -> Var<f64> {
        let a = x.square();
        let b = a.exp();
        let c = a.square();
        &b + &c
    }

    fn diamond_derivative(x: f64) -> f64 {
        2.0 * x * (x * x).exp() + 4.0 * x.powi(3)
    }

    /// Backward pass that propagates a node's accumulated adjoint every
    /// time one of its consumers reaches it.
    fn eager_recursive(graph: &Graph<f64>, out: ValueId) -> Vec<f64> {
        fn visit(tape: &Tape<f64>, id: ValueId, incoming: f64, grads: &mut [f64]) {
            grads[id.index()] += incoming;
            if let Origin::Op(op) = tape.origins[id.index()] {
                let accumulated = grads[id.index()];
                let mut partials = Vec::new();
                op.backward(&tape.vals, tape.vals[id.index()], accumulated)
                    .for_each(|operand, d| partials.push((operand, d)));
                for (operand, d) in partials {
                    visit(tape, operand, d, grads);
                }
            }
        }
        let tape = graph.tape.borrow();
        let mut grads = vec![0.0; tape.len()];
        visit(&tape, out, 1.0, &mut grads);
        grads
    }

    #[test]
    fn diamond_matches_closed_form() {
        for schedule in [Schedule::Buckets, Schedule::Heap] {
            let graph = Graph::new();
            let x = graph.var(1.4);
            let y = diamond(&x);
            y.backward_with(schedule);

            let expected = diamond_derivative(1.4);
            assert!(
                (x.grad() - expected).abs() < 1e-12 * expected,
                "{schedule:?}: {} vs {expected}",
                x.grad()
            );
        }
    }

    #[test]
    fn eager_recursion_overcounts_shared_nodes() {
        let graph = Graph::new();
        let x = graph.var(1.4);
        let y = diamond(&x);

        let naive = eager_recursive(&graph, y.id())[x.id().index()];
        y.backward();

        let expected = diamond_derivative(1.4);
        assert!((x.grad() - expected).abs() < 1e-12 * expected);
        assert!((naive - expected).abs() > 1.0);
    }

    #[test]
    fn each_operation_runs_once() {
        let graph = Graph::new();
        let x = graph.var(1.4);
        let y = diamond(&x);
        let summary = y.backward_with(Schedule::Buckets);

        // a, b, c and y are the internal values.
        assert_eq!(summary.order.len(), 4);
        let mut unique = summary.order.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 4);
        assert_eq!(summary.leaves, 1);
    }

    #[test]
    fn pops_never_precede_a_consumer() {
        let graph = Graph::new();
        let x = graph.var(0.3);
        let w = graph.var(-1.2);
        let a = &x * &w;
        let b = a.exp();
        let c = &a + &x;
        let d = &b * &c;
        let e = d.square();
        let y = &(&e + &a) + &(&c * &b);

        for schedule in [Schedule::Buckets, Schedule::Heap] {
            graph.zero_grad();
            let summary = y.backward_with(schedule);
            let tape = graph.tape.borrow();
            let position = |id: ValueId| summary.order.iter().position(|&p| p == id);

            let generations: Vec<usize> = summary
                .order
                .iter()
                .map(|id| tape.generations[id.index()])
                .collect();
            assert!(generations.windows(2).all(|w| w[0] >= w[1]));

            for &consumer in &summary.order {
                if let Origin::Op(op) = tape.origins[consumer.index()] {
                    for operand in op.operands() {
                        if let Some(at) = position(operand) {
                            assert!(position(consumer).unwrap() < at);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn schedules_agree() {
        let build = || {
            let graph = Graph::new();
            let x = graph.var(0.7);
            let y = graph.var(1.9);
            let p = &x * &y;
            let q = (&p / &y).ln();
            let out = &(&p.sin() * &q) - &(&x.sqrt() + &p.cos().recip());
            (graph, x, y, out)
        };

        let (_g1, x1, y1, out1) = build();
        out1.backward_with(Schedule::Buckets);
        let (_g2, x2, y2, out2) = build();
        out2.backward_with(Schedule::Heap);

        assert_eq!(x1.grad(), x2.grad());
        assert_eq!(y1.grad(), y2.grad());
    }

    #[test]
    fn leaf_output_seeds_itself() {
        let graph = Graph::new();
        let x = graph.var(5.0);
        let summary = x.backward_with(Schedule::Buckets);

        assert_eq!(x.grad(), 1.0);
        assert!(summary.order.is_empty());
        assert_eq!(summary.leaves, 1);
    }

    #[test]
    fn heap_breaks_ties_by_insertion_order() {
        let mut heap = GenerationHeap::default();
        heap.push(ValueId::new(3), 1);
        heap.push(ValueId::new(1), 2);
        heap.push(ValueId::new(2), 1);

        assert_eq!(heap.pop(), Some(ValueId::new(1)));
        assert_eq!(heap.pop(), Some(ValueId::new(3)));
        assert_eq!(heap.pop(), Some(ValueId::new(2)));
        assert_eq!(heap.pop(), None);
    }

    #[test]
    fn buckets_pop_highest_generation_first() {
        let mut buckets = GenerationBuckets::new(1);
        buckets.push(ValueId::new(0), 0);
        buckets.push(ValueId::new(5), 3);
        buckets.push(ValueId::new(2), 1);

        assert_eq!(buckets.pop(), Some(ValueId::new(5)));
        assert_eq!(buckets.pop(), Some(ValueId::new(2)));
        assert_eq!(buckets.pop(), Some(ValueId::new(0)));
        assert_eq!(buckets.pop(), None);
    }

    #[test]
    fn unary_operations_name_one_operand() {
        let graph = Graph::new();
        let x = graph.var(2.0);
        let y = x.exp();
        match graph.origin_of(y.id()) {
            Ok(Origin::Op(op @ Operation::Unary { .. })) => assert_eq!(op.operands().count(), 1),
            other => panic!("unexpected origin {other:?}"),
        }
    }
}
