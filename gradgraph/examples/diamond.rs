//! Shared sub-expressions in both differentiation modes.
//!
//! Every expression below reuses an intermediate value, which is the
//! case a naive backward pass gets wrong. Each derivative is computed
//! in reverse mode (recorded graph) and forward mode (dual numbers).
//!
//! Run with: `cargo run --example diamond`

use std::time::Instant;

use gradgraph::{Dual, Graph, Schedule};

fn main() {
    println!("=== Shared sub-expressions ===\n");

    // f(x) = e^(x·x) at x = 1.2
    println!("Example 1: f(x) = e^(x·x) at x = 1.2");
    let graph = Graph::new();
    let x = graph.var(1.2);
    let y = (&x * &x).exp();
    y.backward();
    let d = (Dual::variable(1.2, 0) * Dual::variable(1.2, 0)).exp();
    println!("  reverse: {:.6}", x.grad());
    println!("  forward: {:.6}", d.derivs[0]);
    println!();

    // f(x) = x·x + x·x at x = 1.4, x feeds four multiplications
    println!("Example 2: f(x) = x·x + x·x at x = 1.4");
    let graph = Graph::new();
    let x = graph.var(1.4);
    let y = &x * &x + &x * &x;
    y.backward();
    let dx = Dual::variable(1.4, 0);
    let d = dx * dx + dx * dx;
    println!("  reverse: {:.6}", x.grad());
    println!("  forward: {:.6} (expected: 4x = 5.6)", d.derivs[0]);
    println!();

    // a = x², f(x) = e^a / a² at x = 1.4, a feeds two operations
    println!("Example 3: a = x², f(x) = e^a / a² at x = 1.4");
    let graph = Graph::new();
    let x = graph.var(1.4);
    let a = x.square();
    let y = &a.exp() / &a.square();
    let summary = y.backward_with(Schedule::Buckets);
    let dx = Dual::variable(1.4, 0);
    let da = dx * dx;
    let d = da.exp() / (da * da);
    println!("  reverse: {:.6}", x.grad());
    println!("  forward: {:.6}", d.derivs[0]);
    println!("  operations back-propagated: {}", summary.order.len());
    println!();

    println!("Example 4: the graph of example 3 in Graphviz format");
    print!("{}", graph.to_dot(&y));
    println!();

    println!("Example 5: schedule timing on a deep chain of shared values");
    for schedule in [Schedule::Buckets, Schedule::Heap] {
        let graph = Graph::new();
        let x = graph.var(0.5);
        let mut acc = x.clone();
        for _ in 0..10_000 {
            let shared = acc.sin();
            acc = &shared * &shared + &shared;
        }
        let start = Instant::now();
        let summary = acc.backward_with(schedule);
        println!(
            "  {:?}: {} operations in {:?}, dy/dx = {:.6e}",
            schedule,
            summary.order.len(),
            start.elapsed(),
            x.grad()
        );
    }
}
