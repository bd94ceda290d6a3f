//! # Fixed-Point Tick Time
//!
//! Scheduler time is measured in ticks, stored as signed 16.16 fixed point.
//! Whole ticks live in the upper 16 bits, fractions of a tick in the lower.
//!
//! ## Why Fixed-Point?
//!
//! - Deterministic: a replay produces the same wake-ups on any hardware
//! - Frame deltas accumulate without drift
//! - Negative values are free to mean "hold until woken"

use std::fmt;
use std::ops::{Add, AddAssign, Sub};

/// Number of fractional bits.
pub const FRACTION_BITS: u32 = 16;

/// Raw value of one whole tick.
const ONE_RAW: i32 = 1 << FRACTION_BITS;

/// A signed 16.16 fixed-point tick count.
///
/// # Range
///
/// - Minimum: -32768.0 ticks
/// - Maximum: 32767.99998 ticks
///
/// # Example
///
/// ```rust,ignore
/// let delay = Fixed16::from_ticks(10);
/// let left = delay.sub_clamped(Fixed16::from_ticks(4)); // 6.0
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Fixed16(i32);

impl Fixed16 {
    /// Zero ticks: ready to run.
    pub const ZERO: Self = Self(0);

    /// One tick.
    pub const ONE: Self = Self(ONE_RAW);

    /// Indefinite hold: never resumes on its own.
    pub const HOLD: Self = Self(-ONE_RAW);

    /// Largest representable delay.
    pub const MAX: Self = Self(i32::MAX);

    /// Creates from a whole number of ticks, saturating at the range ends.
    #[inline]
    #[must_use]
    pub const fn from_ticks(ticks: i32) -> Self {
        Self(ticks.saturating_mul(ONE_RAW))
    }

    /// Creates from a raw 16.16 value (no conversion).
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    /// Creates from fractional ticks, rounding to the nearest step and
    /// saturating at the range ends.
    #[inline]
    #[must_use]
    pub fn from_f64(ticks: f64) -> Self {
        let raw = (ticks * f64::from(ONE_RAW)).round();
        Self(raw.clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32)
    }

    /// Returns the raw 16.16 value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Returns the whole ticks, rounded towards negative infinity.
    #[inline]
    #[must_use]
    pub const fn whole_ticks(self) -> i32 {
        self.0 >> FRACTION_BITS
    }

    /// Converts to floating-point ticks (display and logging only).
    #[inline]
    #[must_use]
    pub fn to_f64(self) -> f64 {
        f64::from(self.0) / f64::from(ONE_RAW)
    }

    /// Whether this is a hold (negative) value.
    #[inline]
    #[must_use]
    pub const fn is_hold(self) -> bool {
        self.0 < 0
    }

    /// Whether this is exactly zero.
    #[inline]
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Counts a delay down by `dt`, stopping at zero.
    ///
    /// Holds are returned unchanged.
    #[inline]
    #[must_use]
    pub const fn sub_clamped(self, dt: Self) -> Self {
        if self.is_hold() {
            return self;
        }
        let left = self.0.saturating_sub(dt.0);
        Self(if left < 0 { 0 } else { left })
    }

    /// Saturating addition.
    #[inline]
    #[must_use]
    pub const fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Add for Fixed16 {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        self.saturating_add(rhs)
    }
}

impl AddAssign for Fixed16 {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Fixed16 {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Debug for Fixed16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fixed16({self})")
    }
}

impl fmt::Display for Fixed16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_hold() {
            return write!(f, "hold({:.4})", self.to_f64());
        }
        write!(f, "{:.4}", self.to_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_ticks() {
        assert_eq!(Fixed16::from_ticks(3).raw(), 3 << 16);
        assert_eq!(Fixed16::from_ticks(3).whole_ticks(), 3);
        assert_eq!(Fixed16::from_ticks(i32::MAX), Fixed16::MAX);
    }

    #[test]
    fn test_fractional_ticks() {
        let half = Fixed16::from_f64(0.5);
        assert_eq!(half.raw(), 1 << 15);
        assert_eq!((half + half), Fixed16::ONE);
        assert_eq!(half.whole_ticks(), 0);
    }

    #[test]
    fn test_sub_clamped_stops_at_zero() {
        let delay = Fixed16::from_ticks(2);
        assert_eq!(delay.sub_clamped(Fixed16::ONE), Fixed16::ONE);
        assert_eq!(delay.sub_clamped(Fixed16::from_ticks(5)), Fixed16::ZERO);
        assert!(delay.sub_clamped(delay).is_zero());
    }

    #[test]
    fn test_hold_is_never_counted_down() {
        assert!(Fixed16::HOLD.is_hold());
        assert_eq!(Fixed16::HOLD.sub_clamped(Fixed16::from_ticks(100)), Fixed16::HOLD);
        assert!(!Fixed16::ZERO.is_hold());
    }

    #[test]
    fn test_display() {
        assert_eq!(Fixed16::from_f64(1.25).to_string(), "1.2500");
        assert_eq!(Fixed16::HOLD.to_string(), "hold(-1.0000)");
    }
}
