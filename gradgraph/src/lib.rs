//! Automatic differentiation of scalar expressions, in two modes that
//! are expected to agree.
//!
//! - **Reverse-mode AD**: operations on [`Var`] are recorded in a
//!   [`Graph`]; [`Var::backward`] walks the graph once and leaves
//!   `∂output/∂v` in every value `v` the output depends on.
//! - **Forward-mode AD**: [`MultiDual`] carries a value together with
//!   N partial derivatives; nothing is recorded.
//!
//! # Reverse mode and shared sub-expressions
//!
//! A value may feed more than one operation. Its gradient is then the
//! sum of what every consumer sends back, and it must not pass its
//! gradient on before that sum is complete. The scheduler guarantees
//! this by back-propagating in decreasing *generation* order, where a
//! value's generation is the length of the longest path from a leaf
//! to it.
//!
//! ```
//! use gradgraph::Graph;
//!
//! let graph = Graph::new();
//! let x = graph.var(1.4);
//! let a = x.square();           // shared by the next two lines
//! let b = a.exp();
//! let c = a.square();
//! let y = &b + &c;              // y = e^(x²) + x⁴
//! y.backward();
//!
//! let expected = 2.0 * 1.4 * (1.4_f64 * 1.4).exp() + 4.0 * 1.4_f64.powi(3);
//! assert!((x.grad() - expected).abs() < 1e-12);
//! ```
//!
//! [`reverse_diff`] and [`reverse_gradient`] differentiate a closure
//! in one call, [`gradient`] does the same in forward mode:
//!
//! ```
//! use gradgraph::{gradient, reverse_gradient, MultiDual, Var};
//!
//! // f(p, q) = p·q + p² at (3, -1)
//! let reverse = reverse_gradient(|[p, q]: [Var<f64>; 2]| &p * &q + p.square(), [3.0, -1.0]);
//! let forward = gradient(|[p, q]: [MultiDual<f64, 2>; 2]| p * q + p.square(), [3.0, -1.0]);
//!
//! assert_eq!(reverse, (6.0, [5.0, 3.0]));
//! assert_eq!(reverse, forward);
//! ```
//!
//! # Features
//!
//! - **`dot`** *(enabled by default)*: [`Graph::to_dot`] renders a
//!   graph in Graphviz format for debugging.
//!
//! Backward passes emit `tracing` events (a `backward` span, one
//! `trace` event per back-propagated operation and a `debug` summary);
//! install a subscriber to see them.

pub mod backward;
#[cfg(feature = "dot")]
pub mod dot;
pub mod error;
pub mod multidual;
pub mod op;
pub mod tape;
pub mod var;

pub use backward::{PassSummary, Schedule};
pub use error::AdError;
pub use multidual::{gradient, Dual, MultiDual};
pub use op::{BinaryOp, Operation, UnaryOp};
pub use tape::{Graph, Origin, ValueId};
pub use var::{reverse_diff, reverse_gradient, Var};
