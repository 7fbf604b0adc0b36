//! Second-order forward-mode automatic differentiation.
//!
//! A [`HyperDual`] carries a value together with two independent first-order
//! perturbations and their cross term: `re + e1·ε₁ + e2·ε₂ + e12·ε₁ε₂` with
//! `ε₁² = ε₂² = 0`. Seeding `ε₁` along `x_i` and `ε₂` along `x_j` yields
//! `∂f/∂x_i` in `e1` and `∂²f/∂x_i∂x_j` in `e12` from a single evaluation.

use num_traits::{Float, FromPrimitive, Num, NumCast, One, ToPrimitive, Zero};
use std::cmp::Ordering;
use std::fmt::Debug;
use std::ops::{
    Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Rem, RemAssign, Sub, SubAssign,
};

/// Numeric types an objective can be evaluated over.
pub trait Scalar: Float + FromPrimitive + Debug + Send + Sync + 'static {}

impl<T: Float + FromPrimitive + Debug + Send + Sync + 'static> Scalar for T {}

/// Lifts an `f64` constant into any [`Scalar`].
pub fn lift<T: Scalar>(value: f64) -> T {
    T::from_f64(value).unwrap_or_else(T::nan)
}

/// Hyper-dual number for exact gradients and Hessians.
///
/// Equality and ordering look at `re` only, so a branch in a generic
/// objective takes the same path over hyper-duals as over plain `f64`.
#[derive(Debug, Clone, Copy)]
pub struct HyperDual {
    pub re: f64,
    pub e1: f64,
    pub e2: f64,
    pub e12: f64,
}

impl PartialEq for HyperDual {
    fn eq(&self, other: &Self) -> bool {
        self.re == other.re
    }
}

impl PartialOrd for HyperDual {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.re.partial_cmp(&other.re)
    }
}

impl HyperDual {
    pub fn new(re: f64, e1: f64, e2: f64, e12: f64) -> Self {
        Self { re, e1, e2, e12 }
    }

    /// A constant with no perturbation.
    pub fn constant(re: f64) -> Self {
        Self::new(re, 0.0, 0.0, 0.0)
    }

    /// Applies a scalar function given its value and first two derivatives at `re`.
    fn chain(self, g0: f64, g1: f64, g2: f64) -> Self {
        Self::new(
            g0,
            g1 * self.e1,
            g1 * self.e2,
            g1 * self.e12 + g2 * self.e1 * self.e2,
        )
    }
}

impl Zero for HyperDual {
    fn zero() -> Self {
        Self::constant(0.0)
    }
    fn is_zero(&self) -> bool {
        self.re == 0.0 && self.e1 == 0.0 && self.e2 == 0.0 && self.e12 == 0.0
    }
}

impl One for HyperDual {
    fn one() -> Self {
        Self::constant(1.0)
    }
}

impl Add for HyperDual {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(
            self.re + rhs.re,
            self.e1 + rhs.e1,
            self.e2 + rhs.e2,
            self.e12 + rhs.e12,
        )
    }
}

impl Sub for HyperDual {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(
            self.re - rhs.re,
            self.e1 - rhs.e1,
            self.e2 - rhs.e2,
            self.e12 - rhs.e12,
        )
    }
}

impl Mul for HyperDual {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.re * rhs.re,
            self.re * rhs.e1 + self.e1 * rhs.re,
            self.re * rhs.e2 + self.e2 * rhs.re,
            self.re * rhs.e12 + self.e1 * rhs.e2 + self.e2 * rhs.e1 + self.e12 * rhs.re,
        )
    }
}

impl Div for HyperDual {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        self * rhs.recip()
    }
}

impl Neg for HyperDual {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.re, -self.e1, -self.e2, -self.e12)
    }
}

impl Rem for HyperDual {
    type Output = Self;
    fn rem(self, rhs: Self) -> Self {
        // x - trunc(x / y) * y with the quotient held piecewise constant.
        self - rhs * Self::constant((self.re / rhs.re).trunc())
    }
}

impl AddAssign for HyperDual {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}
impl SubAssign for HyperDual {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}
impl MulAssign for HyperDual {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}
impl DivAssign for HyperDual {
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}
impl RemAssign for HyperDual {
    fn rem_assign(&mut self, rhs: Self) {
        *self = *self % rhs;
    }
}

impl Num for HyperDual {
    type FromStrRadixErr = ();
    fn from_str_radix(str: &str, radix: u32) -> Result<Self, Self::FromStrRadixErr> {
        f64::from_str_radix(str, radix)
            .map(Self::constant)
            .map_err(|_| ())
    }
}

impl ToPrimitive for HyperDual {
    fn to_i64(&self) -> Option<i64> {
        self.re.to_i64()
    }
    fn to_u64(&self) -> Option<u64> {
        self.re.to_u64()
    }
    fn to_f64(&self) -> Option<f64> {
        Some(self.re)
    }
}

impl FromPrimitive for HyperDual {
    fn from_i64(n: i64) -> Option<Self> {
        Some(Self::constant(n as f64))
    }
    fn from_u64(n: u64) -> Option<Self> {
        Some(Self::constant(n as f64))
    }
    fn from_f64(n: f64) -> Option<Self> {
        Some(Self::constant(n))
    }
}

impl NumCast for HyperDual {
    fn from<T: ToPrimitive>(n: T) -> Option<Self> {
        n.to_f64().map(Self::constant)
    }
}

impl Float for HyperDual {
    fn nan() -> Self {
        Self::constant(f64::NAN)
    }
    fn infinity() -> Self {
        Self::constant(f64::INFINITY)
    }
    fn neg_infinity() -> Self {
        Self::constant(f64::NEG_INFINITY)
    }
    fn neg_zero() -> Self {
        Self::constant(-0.0)
    }
    fn min_value() -> Self {
        Self::constant(f64::MIN)
    }
    fn min_positive_value() -> Self {
        Self::constant(f64::MIN_POSITIVE)
    }
    fn max_value() -> Self {
        Self::constant(f64::MAX)
    }
    fn is_nan(self) -> bool {
        self.re.is_nan()
    }
    fn is_infinite(self) -> bool {
        self.re.is_infinite()
    }
    fn is_finite(self) -> bool {
        self.re.is_finite()
    }
    fn is_normal(self) -> bool {
        self.re.is_normal()
    }
    fn classify(self) -> std::num::FpCategory {
        self.re.classify()
    }
    fn floor(self) -> Self {
        Self::constant(self.re.floor())
    }
    fn ceil(self) -> Self {
        Self::constant(self.re.ceil())
    }
    fn round(self) -> Self {
        Self::constant(self.re.round())
    }
    fn trunc(self) -> Self {
        Self::constant(self.re.trunc())
    }
    fn fract(self) -> Self {
        Self::new(self.re.fract(), self.e1, self.e2, self.e12)
    }
    fn abs(self) -> Self {
        if self.re >= 0.0 {
            self
        } else {
            -self
        }
    }
    fn signum(self) -> Self {
        Self::constant(self.re.signum())
    }
    fn is_sign_positive(self) -> bool {
        self.re.is_sign_positive()
    }
    fn is_sign_negative(self) -> bool {
        self.re.is_sign_negative()
    }
    fn mul_add(self, a: Self, b: Self) -> Self {
        self * a + b
    }
    fn recip(self) -> Self {
        let inv = 1.0 / self.re;
        self.chain(inv, -inv * inv, 2.0 * inv * inv * inv)
    }

    fn powi(self, n: i32) -> Self {
        match n {
            0 => Self::one(),
            1 => self,
            _ => {
                let p = n as f64;
                self.chain(
                    self.re.powi(n),
                    p * self.re.powi(n - 1),
                    p * (p - 1.0) * self.re.powi(n - 2),
                )
            }
        }
    }

    fn powf(self, n: Self) -> Self {
        if n.e1 == 0.0 && n.e2 == 0.0 && n.e12 == 0.0 {
            let p = n.re;
            return self.chain(
                self.re.powf(p),
                p * self.re.powf(p - 1.0),
                p * (p - 1.0) * self.re.powf(p - 2.0),
            );
        }
        (n * self.ln()).exp()
    }

    fn sqrt(self) -> Self {
        let s = self.re.sqrt();
        self.chain(s, 0.5 / s, -0.25 / (s * self.re))
    }

    fn exp(self) -> Self {
        let e = self.re.exp();
        self.chain(e, e, e)
    }

    fn exp2(self) -> Self {
        let e = self.re.exp2();
        let ln2 = std::f64::consts::LN_2;
        self.chain(e, ln2 * e, ln2 * ln2 * e)
    }
    fn ln(self) -> Self {
        let inv = 1.0 / self.re;
        self.chain(self.re.ln(), inv, -inv * inv)
    }
    fn log(self, base: Self) -> Self {
        self.ln() / base.ln()
    }
    fn log2(self) -> Self {
        let scale = 1.0 / std::f64::consts::LN_2;
        let inv = 1.0 / self.re;
        self.chain(self.re.log2(), scale * inv, -scale * inv * inv)
    }
    fn log10(self) -> Self {
        let scale = 1.0 / std::f64::consts::LN_10;
        let inv = 1.0 / self.re;
        self.chain(self.re.log10(), scale * inv, -scale * inv * inv)
    }

    fn max(self, other: Self) -> Self {
        if self.re > other.re {
            self
        } else {
            other
        }
    }
    fn min(self, other: Self) -> Self {
        if self.re < other.re {
            self
        } else {
            other
        }
    }

    #[allow(deprecated)]
    fn abs_sub(self, other: Self) -> Self {
        if self.re > other.re {
            self - other
        } else {
            Self::zero()
        }
    }

    fn cbrt(self) -> Self {
        let c = self.re.cbrt();
        self.chain(
            c,
            c / (3.0 * self.re),
            -2.0 * c / (9.0 * self.re * self.re),
        )
    }
    fn hypot(self, other: Self) -> Self {
        (self * self + other * other).sqrt()
    }

    fn sin(self) -> Self {
        let (s, c) = self.re.sin_cos();
        self.chain(s, c, -s)
    }
    fn cos(self) -> Self {
        let (s, c) = self.re.sin_cos();
        self.chain(c, -s, -c)
    }
    fn tan(self) -> Self {
        let t = self.re.tan();
        let sec2 = 1.0 + t * t;
        self.chain(t, sec2, 2.0 * t * sec2)
    }
    fn asin(self) -> Self {
        let q = 1.0 - self.re * self.re;
        self.chain(self.re.asin(), 1.0 / q.sqrt(), self.re / (q * q.sqrt()))
    }
    fn acos(self) -> Self {
        let q = 1.0 - self.re * self.re;
        self.chain(self.re.acos(), -1.0 / q.sqrt(), -self.re / (q * q.sqrt()))
    }
    fn atan(self) -> Self {
        let q = 1.0 + self.re * self.re;
        self.chain(self.re.atan(), 1.0 / q, -2.0 * self.re / (q * q))
    }
    fn atan2(self, other: Self) -> Self {
        // Derivatives of atan(y / x) agree with atan2 away from the branch cut.
        let local = if other.re.abs() >= self.re.abs() {
            (self / other).atan()
        } else {
            -(other / self).atan()
        };
        Self::new(self.re.atan2(other.re), local.e1, local.e2, local.e12)
    }
    fn sin_cos(self) -> (Self, Self) {
        (self.sin(), self.cos())
    }

    fn exp_m1(self) -> Self {
        let e = self.re.exp();
        self.chain(self.re.exp_m1(), e, e)
    }
    fn ln_1p(self) -> Self {
        let inv = 1.0 / (1.0 + self.re);
        self.chain(self.re.ln_1p(), inv, -inv * inv)
    }
    fn sinh(self) -> Self {
        let (sh, ch) = (self.re.sinh(), self.re.cosh());
        self.chain(sh, ch, sh)
    }
    fn cosh(self) -> Self {
        let (sh, ch) = (self.re.sinh(), self.re.cosh());
        self.chain(ch, sh, ch)
    }
    fn tanh(self) -> Self {
        let t = self.re.tanh();
        let sech2 = 1.0 - t * t;
        self.chain(t, sech2, -2.0 * t * sech2)
    }
    fn asinh(self) -> Self {
        let q = self.re * self.re + 1.0;
        self.chain(self.re.asinh(), 1.0 / q.sqrt(), -self.re / (q * q.sqrt()))
    }
    fn acosh(self) -> Self {
        let q = self.re * self.re - 1.0;
        self.chain(self.re.acosh(), 1.0 / q.sqrt(), -self.re / (q * q.sqrt()))
    }
    fn atanh(self) -> Self {
        let q = 1.0 - self.re * self.re;
        self.chain(self.re.atanh(), 1.0 / q, 2.0 * self.re / (q * q))
    }

    fn integer_decode(self) -> (u64, i16, i8) {
        self.re.integer_decode()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn seeded(x: f64) -> HyperDual {
        HyperDual::new(x, 1.0, 1.0, 0.0)
    }

    #[test]
    fn product_rule_second_order() {
        // d²/dx² (x³) = 6x
        let x = seeded(2.0);
        let y = x * x * x;
        assert_relative_eq!(y.re, 8.0);
        assert_relative_eq!(y.e1, 12.0);
        assert_relative_eq!(y.e12, 12.0);
    }

    #[test]
    fn elementary_functions_match_closed_form() {
        let x = 0.7;
        let s = seeded(x).sin();
        assert_relative_eq!(s.e1, x.cos(), epsilon = 1e-14);
        assert_relative_eq!(s.e12, -x.sin(), epsilon = 1e-14);

        let e = seeded(x).exp();
        assert_relative_eq!(e.e12, x.exp(), epsilon = 1e-14);

        let l = seeded(x).ln();
        assert_relative_eq!(l.e12, -1.0 / (x * x), epsilon = 1e-12);

        let r = seeded(x).sqrt();
        assert_relative_eq!(r.e12, -0.25 * x.powf(-1.5), epsilon = 1e-12);

        let q = seeded(x) / (seeded(x) + HyperDual::one());
        // d²/dx² x/(1+x) = -2/(1+x)³
        assert_relative_eq!(q.e12, -2.0 / (1.0 + x).powi(3), epsilon = 1e-12);
    }

    #[test]
    fn mixed_partial_from_independent_seeds() {
        // f(x, y) = x² y, ∂²f/∂x∂y = 2x
        let x = HyperDual::new(1.5, 1.0, 0.0, 0.0);
        let y = HyperDual::new(-2.0, 0.0, 1.0, 0.0);
        let f = x * x * y;
        assert_relative_eq!(f.e1, 2.0 * 1.5 * -2.0);
        assert_relative_eq!(f.e2, 1.5 * 1.5);
        assert_relative_eq!(f.e12, 3.0);
    }

    #[test]
    fn comparisons_ignore_perturbations() {
        let rising = HyperDual::new(1.0, 1.0, 0.0, 0.0);
        let falling = HyperDual::new(1.0, -1.0, 0.0, 0.0);
        assert_eq!(rising, falling);
        assert_eq!(rising.partial_cmp(&falling), Some(Ordering::Equal));
        assert!(!(rising < falling) && !(falling < rising));
        assert!(HyperDual::constant(0.5) < falling);
    }

    #[test]
    fn kink_branch_matches_plain_evaluation() {
        // f(x) = x if x > 1 else 2x - 1: both branches meet at x = 1.
        fn kinked<T: Scalar>(x: T) -> T {
            if x > T::one() {
                x
            } else {
                lift::<T>(2.0) * x - T::one()
            }
        }
        for slope in [1.0, -1.0] {
            let y = kinked(HyperDual::new(1.0, slope, 0.0, 0.0));
            assert_eq!(y.re, kinked(1.0_f64));
            assert_eq!(y.e1, 2.0 * slope);
        }
    }

    #[test]
    fn powi_handles_small_exponents_at_zero() {
        let x = seeded(0.0);
        let sq = x.powi(2);
        assert_eq!(sq.e1, 0.0);
        assert_eq!(sq.e12, 2.0);
        assert_eq!(x.powi(0), HyperDual::one());
    }
}
