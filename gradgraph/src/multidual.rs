//! Forward-mode differentiation with dual numbers.
//!
//! [`MultiDual<T, N>`] pairs a value with its partials against N seeded
//! inputs. Nothing is recorded: every operator combines its operands'
//! partials on the spot, so the derivative of a result is known as soon
//! as its value is. Reverse-mode results are checked against it.
//!
//! An operator `g` with local partials `∂g/∂a`, `∂g/∂b` maps
//!
//! - `(a, ∇a) ↦ (g(a), ∂g/∂a · ∇a)` when unary,
//! - `(a, ∇a), (b, ∇b) ↦ (g(a, b), ∂g/∂a · ∇a + ∂g/∂b · ∇b)` when binary.
//!
//! The local partials come from the operator table in [`crate::op`],
//! the same one the reverse-mode scheduler reads.
//!
//! ```
//! use gradgraph::{gradient, MultiDual};
//!
//! // f(u, v) = u·v + v² at (2, 5)
//! let (value, grad) = gradient(
//!     |[u, v]: [MultiDual<f64, 2>; 2]| u * v + v.square(),
//!     [2.0, 5.0],
//! );
//! assert_eq!(value, 35.0);
//! assert_eq!(grad, [5.0, 12.0]);
//! ```

use std::ops::{Add, Div, Mul, Neg, Sub};

use num_traits::Float;

use crate::error::AdError;
use crate::op::{BinaryOp, UnaryOp};

/// A value together with its partial derivatives against `N` inputs.
///
/// ```
/// use gradgraph::MultiDual;
///
/// let u = MultiDual::<f64, 2>::variable(1.5, 0);
/// let v = MultiDual::<f64, 2>::variable(-2.0, 1);
/// let w = u * v - u;
///
/// assert_eq!(w.value, -4.5);
/// assert_eq!(w.derivs, [-3.0, 1.5]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MultiDual<T, const N: usize> {
    pub value: T,
    /// `derivs[i]` is the partial against input `i`.
    pub derivs: [T; N],
}

/// Dual number with a single seeded input.
pub type Dual<T> = MultiDual<T, 1>;

impl<T: Float, const N: usize> MultiDual<T, N> {
    pub fn new(value: T, derivs: [T; N]) -> Self {
        Self { value, derivs }
    }

    /// A value that depends on no input.
    pub fn constant(value: T) -> Self {
        Self {
            value,
            derivs: [T::zero(); N],
        }
    }

    /// Seeds input `index`: its own partial is one, the rest zero.
    ///
    /// # Panics
    ///
    /// Panics if `index >= N`. [`MultiDual::try_variable`] reports the
    /// same condition as an error.
    pub fn variable(value: T, index: usize) -> Self {
        assert!(
            index < N,
            "Variable index {} out of bounds for N={}",
            index,
            N
        );
        let mut derivs = [T::zero(); N];
        derivs[index] = T::one();
        Self { value, derivs }
    }

    /// ```
    /// use gradgraph::{AdError, MultiDual};
    ///
    /// assert!(MultiDual::<f64, 2>::try_variable(1.0, 1).is_ok());
    /// assert_eq!(
    ///     MultiDual::<f64, 2>::try_variable(1.0, 2),
    ///     Err(AdError::VariableIndex { index: 2, n: 2 })
    /// );
    /// ```
    pub fn try_variable(value: T, index: usize) -> Result<Self, AdError> {
        if index < N {
            Ok(Self::variable(value, index))
        } else {
            Err(AdError::VariableIndex { index, n: N })
        }
    }

    pub fn partial(&self, index: usize) -> T {
        self.derivs[index]
    }

    fn unary(self, op: UnaryOp) -> Self {
        let value = op.forward(self.value);
        let d = op.derivative(self.value, value);
        let mut derivs = self.derivs;
        for deriv in &mut derivs {
            *deriv = *deriv * d;
        }
        Self { value, derivs }
    }

    fn binary(self, rhs: Self, op: BinaryOp) -> Self {
        let (dx, dy) = op.derivatives(self.value, rhs.value);
        let mut derivs = self.derivs;
        for (deriv, rhs_deriv) in derivs.iter_mut().zip(rhs.derivs.iter()) {
            *deriv = *deriv * dx + *rhs_deriv * dy;
        }
        Self {
            value: op.forward(self.value, rhs.value),
            derivs,
        }
    }

    pub fn square(self) -> Self {
        self.unary(UnaryOp::Square)
    }

    /// ```
    /// use gradgraph::Dual;
    ///
    /// let t = Dual::variable(0.0, 0).exp();
    /// assert_eq!((t.value, t.derivs[0]), (1.0, 1.0));
    /// ```
    pub fn exp(self) -> Self {
        self.unary(UnaryOp::Exp)
    }

    pub fn recip(self) -> Self {
        self.unary(UnaryOp::Recip)
    }

    /// NaN below zero, as for `T::ln`.
    pub fn ln(self) -> Self {
        self.unary(UnaryOp::Ln)
    }

    pub fn sqrt(self) -> Self {
        self.unary(UnaryOp::Sqrt)
    }

    pub fn sin(self) -> Self {
        self.unary(UnaryOp::Sin)
    }

    pub fn cos(self) -> Self {
        self.unary(UnaryOp::Cos)
    }
}

impl<T: Float, const N: usize> Add for MultiDual<T, N> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.binary(rhs, BinaryOp::Add)
    }
}

impl<T: Float, const N: usize> Sub for MultiDual<T, N> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self.binary(rhs, BinaryOp::Sub)
    }
}

/// Product rule: `(ab, b∇a + a∇b)`.
impl<T: Float, const N: usize> Mul for MultiDual<T, N> {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        self.binary(rhs, BinaryOp::Mul)
    }
}

impl<T: Float, const N: usize> Div for MultiDual<T, N> {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        self.binary(rhs, BinaryOp::Div)
    }
}

impl<T: Float, const N: usize> Neg for MultiDual<T, N> {
    type Output = Self;

    fn neg(self) -> Self {
        self.unary(UnaryOp::Neg)
    }
}

/// Value and gradient of `f` at `point` from one forward evaluation,
/// with `point[i]` seeded as input `i`.
///
/// ```
/// use gradgraph::{gradient, MultiDual};
///
/// // f(a, b, c) = a·b·c at (1, 2, 3)
/// let (value, grad) = gradient(|[a, b, c]: [MultiDual<f64, 3>; 3]| a * b * c, [1.0, 2.0, 3.0]);
/// assert_eq!(value, 6.0);
/// assert_eq!(grad, [6.0, 3.0, 2.0]);
/// ```
pub fn gradient<T, F, const N: usize>(f: F, point: [T; N]) -> (T, [T; N])
where
    T: Float,
    F: Fn([MultiDual<T, N>; N]) -> MultiDual<T, N>,
{
    let seeded = std::array::from_fn(|i| MultiDual::variable(point[i], i));
    let result = f(seeded);
    (result.value, result.derivs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeding() {
        let c = MultiDual::<f64, 2>::constant(-1.0);
        assert_eq!(c.derivs, [0.0, 0.0]);

        let b = MultiDual::<f64, 4>::variable(0.5, 3);
        assert_eq!(b.value, 0.5);
        assert_eq!(b.derivs, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(b.partial(3), 1.0);
    }

    #[test]
    #[should_panic(expected = "Variable index 2 out of bounds for N=2")]
    fn seeding_past_the_end_panics() {
        let _ = MultiDual::<f64, 2>::variable(1.0, 2);
    }

    #[test]
    fn try_variable_reports_index() {
        assert_eq!(
            Dual::<f64>::try_variable(0.0, 4),
            Err(AdError::VariableIndex { index: 4, n: 1 })
        );
    }

    #[test]
    fn arithmetic_partials() {
        let u = MultiDual::<f64, 2>::variable(6.0, 0);
        let v = MultiDual::<f64, 2>::variable(2.0, 1);

        assert_eq!((u * v).derivs, [2.0, 6.0]);
        assert_eq!((u / v).value, 3.0);
        assert_eq!((u / v).derivs, [0.5, -1.5]);
        assert_eq!((u - v).derivs, [1.0, -1.0]);
        assert_eq!((-u).derivs, [-1.0, 0.0]);
    }

    #[test]
    fn partials_scale_incoming_derivatives() {
        let p = MultiDual::new(7.0, [2.0, 3.0]);
        let q = MultiDual::new(4.0, [1.0, 2.0]);

        assert_eq!((p + q).derivs, [3.0, 5.0]);
        // d(pq) = q·dp + p·dq
        assert_eq!((p * q).derivs, [15.0, 26.0]);
    }

    #[test]
    fn square_matches_self_product() {
        let t = Dual::variable(1.4, 0);
        assert_eq!(t.square(), t * t);
    }

    #[test]
    fn diamond_expression() {
        // a = t², y = e^a + a² at t = 1.4
        let t = Dual::variable(1.4, 0);
        let a = t.square();
        let y = a.exp() + a.square();

        let expected = 2.0 * 1.4 * 1.96_f64.exp() + 4.0 * 1.4_f64.powi(3);
        assert!((y.derivs[0] - expected).abs() < 1e-12 * expected);
    }

    #[test]
    fn shared_products() {
        let t = Dual::variable(1.4, 0);
        let y = t * t + t * t;
        assert!((y.derivs[0] - 5.6).abs() < 1e-12);
    }

    #[test]
    fn transcendentals() {
        let s = MultiDual::<f64, 2>::variable(4.0, 0);
        assert_eq!(s.sqrt().derivs, [0.25, 0.0]);
        assert_eq!(s.ln().derivs, [0.25, 0.0]);
        assert_eq!(s.recip().derivs, [-0.0625, 0.0]);

        let origin = MultiDual::<f64, 2>::variable(0.0, 1);
        assert_eq!(origin.sin().derivs, [0.0, 1.0]);
        assert_eq!(origin.cos().value, 1.0);
        assert_eq!(origin.cos().derivs[1], 0.0);
    }

    #[test]
    fn overflow_propagates_infinity() {
        let y = Dual::variable(30.0, 0).square().exp();
        assert!(y.value.is_infinite());
        assert!(y.derivs[0].is_infinite());
    }

    #[test]
    fn rosenbrock_minimum_and_origin() {
        let rosenbrock = |[p, q]: [MultiDual<f64, 2>; 2]| {
            (MultiDual::constant(1.0) - p).square()
                + MultiDual::constant(100.0) * (q - p.square()).square()
        };

        assert_eq!(gradient(rosenbrock, [1.0, 1.0]), (0.0, [0.0, 0.0]));
        assert_eq!(gradient(rosenbrock, [0.0, 0.0]), (1.0, [-2.0, 0.0]));
    }

    #[test]
    fn gradient_of_many_inputs() {
        // Σ i·xᵢ has gradient [0, 1, 2, ...]
        let weighted = |xs: [MultiDual<f64, 6>; 6]| {
            xs.iter()
                .enumerate()
                .fold(MultiDual::constant(0.0), |acc, (i, &x)| {
                    acc + MultiDual::constant(i as f64) * x
                })
        };

        let (value, grad) = gradient(weighted, [1.0; 6]);
        assert_eq!(value, 15.0);
        assert_eq!(grad, [0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    }
}
