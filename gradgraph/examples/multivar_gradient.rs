//! Gradients of a few functions of several inputs, computed once with
//! dual numbers and once by back-propagation, side by side.
//!
//! `cargo run --example multivar_gradient`

use gradgraph::{gradient, reverse_gradient, MultiDual, Var};

fn report<const N: usize>(label: &str, forward: (f64, [f64; N]), reverse: (f64, [f64; N])) {
    let drift = forward
        .1
        .iter()
        .zip(reverse.1.iter())
        .map(|(f, r)| (f - r).abs())
        .fold(0.0, f64::max);
    println!("{label}");
    println!("  value   {:.6}", forward.0);
    println!("  forward {:?}", forward.1);
    println!("  reverse {:?}", reverse.1);
    println!("  largest difference {drift:e}\n");
}

fn main() {
    // Rosenbrock's valley, away from its minimum.
    let at = [-0.5, 1.5];
    report(
        "(1 - p)² + 100 (q - p²)²  at (-0.5, 1.5)",
        gradient(
            |[p, q]: [MultiDual<f64, 2>; 2]| {
                (MultiDual::constant(1.0) - p).square()
                    + MultiDual::constant(100.0) * (q - p.square()).square()
            },
            at,
        ),
        reverse_gradient(
            |[p, q]: [Var<f64>; 2]| {
                let one = p.graph().constant(1.0);
                (one - &p).square() + (q - p.square()).square() * 100.0
            },
            at,
        ),
    );

    let at = [1.0, 2.0, 2.0];
    report(
        "distance from the origin  at (1, 2, 2)",
        gradient(
            |[a, b, c]: [MultiDual<f64, 3>; 3]| (a.square() + b.square() + c.square()).sqrt(),
            at,
        ),
        reverse_gradient(
            |[a, b, c]: [Var<f64>; 3]| (a.square() + b.square() + c.square()).sqrt(),
            at,
        ),
    );

    // The shared product feeds three consumers.
    let at = [0.7, 1.3];
    report(
        "m = uv;  cos(m) + m·e^m - ln(m)  at (0.7, 1.3)",
        gradient(
            |[u, v]: [MultiDual<f64, 2>; 2]| {
                let m = u * v;
                m.cos() + m * m.exp() - m.ln()
            },
            at,
        ),
        reverse_gradient(
            |[u, v]: [Var<f64>; 2]| {
                let m = &u * &v;
                m.cos() + &m * m.exp() - m.ln()
            },
            at,
        ),
    );

    let at = [2.0, 6.0];
    report(
        "u / (u + v) - 1/v  at (2, 6)",
        gradient(
            |[u, v]: [MultiDual<f64, 2>; 2]| u / (u + v) - v.recip(),
            at,
        ),
        reverse_gradient(|[u, v]: [Var<f64>; 2]| &u / (&u + &v) - v.recip(), at),
    );
}
