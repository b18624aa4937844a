//! Semirings used across the decipherment pipeline.
//!
//! Three weight types are provided, mirroring the three semirings a
//! decipherment cascade is built and trained in:
//!
//! - [`TropicalWeight`]: `(min, +)`, used for decoding and shortest-path.
//! - [`LogWeight`]: `(logsumexp, +)` in single precision, used while
//!   composing and running forward/backward during training.
//! - [`Log64Weight`]: the same semiring at `f64` precision, used for the
//!   expectation accumulators where repeated summation would otherwise
//!   lose too much precision in `f32`.

use std::cmp::Ordering;
use std::fmt;

/// Common interface implemented by every weight type in this crate.
///
/// `plus` and `times` are the semiring operations; `divide` undoes `times`
/// (used during the M-step to renormalize expectation tables). `less` is
/// the semiring's natural order, used only to give composition and
/// pruning a total order to make scheduling decisions with; for the
/// non-idempotent log semirings this is plain numeric comparison of the
/// underlying value, matching how these weights are ordered in practice
/// when used as shortest-distance keys.
pub trait Semiring:
    Copy + Clone + PartialEq + fmt::Debug + Default + Send + Sync + 'static
{
    /// The additive identity (`⊕`-zero).
    fn zero() -> Self;
    /// The multiplicative identity (`⊗`-one).
    fn one() -> Self;
    /// Semiring addition.
    fn plus(self, other: Self) -> Self;
    /// Semiring multiplication.
    fn times(self, other: Self) -> Self;
    /// Semiring division (`self` divided by `other`); used only in the
    /// M-step, where `other` is never zero by construction.
    fn divide(self, other: Self) -> Self;
    /// True if `self` is the additive identity.
    fn is_zero(self) -> bool {
        self == Self::zero()
    }
    /// True if `self` is the multiplicative identity.
    fn is_one(self) -> bool {
        self == Self::one()
    }
    /// True if the underlying value is NaN (can arise from `0/0` during
    /// degenerate M-steps; the cascade treats this the same as zero mass).
    fn is_nan(self) -> bool;
    /// Natural order used for priority-queue and pruning comparisons.
    fn less(self, other: Self) -> bool;
    /// The underlying `f64` value, for logging and serialization.
    fn value(self) -> f64;
    /// Build a weight from a raw `f64` value.
    fn from_value(v: f64) -> Self;
}

macro_rules! impl_common_f64 {
    ($ty:ident) => {
        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                self.0 == other.0 || (self.0.is_nan() && other.0.is_nan())
            }
        }
        impl PartialOrd for $ty {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                self.0.partial_cmp(&other.0)
            }
        }
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($ty), self.0)
            }
        }
    };
}

/// The tropical `(min, +)` semiring. Weights are `-log` probabilities, so
/// the identity for `plus` is `+∞` ("impossible") and `one` is `0.0`
/// ("certain").
#[derive(Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct TropicalWeight(pub f64);

impl_common_f64!(TropicalWeight);

impl Default for TropicalWeight {
    fn default() -> Self {
        Self::zero()
    }
}

impl Semiring for TropicalWeight {
    fn zero() -> Self {
        TropicalWeight(f64::INFINITY)
    }
    fn one() -> Self {
        TropicalWeight(0.0)
    }
    fn plus(self, other: Self) -> Self {
        TropicalWeight(self.0.min(other.0))
    }
    fn times(self, other: Self) -> Self {
        TropicalWeight(self.0 + other.0)
    }
    fn divide(self, other: Self) -> Self {
        TropicalWeight(self.0 - other.0)
    }
    fn is_nan(self) -> bool {
        self.0.is_nan()
    }
    fn less(self, other: Self) -> bool {
        self.0 < other.0
    }
    fn value(self) -> f64 {
        self.0
    }
    fn from_value(v: f64) -> Self {
        TropicalWeight(v)
    }
}

/// Stable `logsumexp` of two `-log` values: `-log(exp(-a) + exp(-b))`.
fn log_add(a: f64, b: f64) -> f64 {
    if a == f64::INFINITY {
        return b;
    }
    if b == f64::INFINITY {
        return a;
    }
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    lo - (1.0 + (-(hi - lo)).exp()).ln()
}

/// The log semiring `(logsumexp, +)` at single precision. Used for the
/// composed training lattice, where arc counts stay small enough that
/// `f32` underflow is not a practical concern.
#[derive(Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct LogWeight(pub f64);

impl_common_f64!(LogWeight);

impl Default for LogWeight {
    fn default() -> Self {
        Self::zero()
    }
}

impl Semiring for LogWeight {
    fn zero() -> Self {
        LogWeight(f64::INFINITY)
    }
    fn one() -> Self {
        LogWeight(0.0)
    }
    fn plus(self, other: Self) -> Self {
        LogWeight(log_add(self.0, other.0))
    }
    fn times(self, other: Self) -> Self {
        LogWeight(self.0 + other.0)
    }
    fn divide(self, other: Self) -> Self {
        LogWeight(self.0 - other.0)
    }
    fn is_nan(self) -> bool {
        self.0.is_nan()
    }
    fn less(self, other: Self) -> bool {
        self.0 < other.0
    }
    fn value(self) -> f64 {
        self.0
    }
    fn from_value(v: f64) -> Self {
        LogWeight(v)
    }
}

/// The log semiring at `f64` precision, used by the expectation
/// accumulators. Distinct type from [`LogWeight`] so the accumulation
/// precision is a type-level decision rather than a runtime one.
#[derive(Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct Log64Weight(pub f64);

impl_common_f64!(Log64Weight);

impl Default for Log64Weight {
    fn default() -> Self {
        Self::zero()
    }
}

impl Semiring for Log64Weight {
    fn zero() -> Self {
        Log64Weight(f64::INFINITY)
    }
    fn one() -> Self {
        Log64Weight(0.0)
    }
    fn plus(self, other: Self) -> Self {
        Log64Weight(log_add(self.0, other.0))
    }
    fn times(self, other: Self) -> Self {
        Log64Weight(self.0 + other.0)
    }
    fn divide(self, other: Self) -> Self {
        Log64Weight(self.0 - other.0)
    }
    fn is_nan(self) -> bool {
        self.0.is_nan()
    }
    fn less(self, other: Self) -> bool {
        self.0 < other.0
    }
    fn value(self) -> f64 {
        self.0
    }
    fn from_value(v: f64) -> Self {
        Log64Weight(v)
    }
}

impl From<LogWeight> for Log64Weight {
    fn from(w: LogWeight) -> Self {
        Log64Weight(w.0)
    }
}

impl From<Log64Weight> for LogWeight {
    fn from(w: Log64Weight) -> Self {
        LogWeight(w.0)
    }
}

/// Casts a tropical weight into the log semiring (a no-op on the
/// underlying value: both are `-log` costs, they differ only in how
/// `plus` combines competing paths).
pub fn tropical_to_log(w: TropicalWeight) -> LogWeight {
    LogWeight(w.0)
}

/// Casts a log-semiring weight back to tropical, used once EM training
/// has converged and the cascade is written back out for decoding.
pub fn log_to_tropical(w: LogWeight) -> TropicalWeight {
    TropicalWeight(w.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tropical_plus_is_min() {
        let a = TropicalWeight(1.0);
        let b = TropicalWeight(2.0);
        assert_eq!(a.plus(b).value(), 1.0);
    }

    #[test]
    fn tropical_times_is_add() {
        let a = TropicalWeight(1.0);
        let b = TropicalWeight(2.0);
        assert_eq!(a.times(b).value(), 3.0);
    }

    #[test]
    fn log_plus_matches_probability_sum() {
        // -log(0.5) + combine with itself should equal -log(1.0) = 0.
        let half = LogWeight(2.0_f64.ln());
        let combined = half.plus(half);
        assert!((combined.value() - 0.0).abs() < 1e-9);
    }

    #[test]
    fn zero_is_additive_identity() {
        let a = LogWeight(0.75);
        assert_eq!(a.plus(LogWeight::zero()).value(), a.value());
    }

    #[test]
    fn one_is_multiplicative_identity() {
        let a = TropicalWeight(0.75);
        assert_eq!(a.times(TropicalWeight::one()).value(), a.value());
    }

    #[test]
    fn divide_undoes_times() {
        let a = LogWeight(1.3);
        let b = LogWeight(0.4);
        let undone = a.times(b).divide(b);
        assert!((undone.value() - a.value()).abs() < 1e-9);
    }
}
