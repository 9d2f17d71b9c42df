//! # Amount Module
//!
//! Rounding and comparison of monetary amounts and percentages.
//!
//! ## Why compare in minor units?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │    0.1 + 0.2 = 0.30000000000000004   ❌  != 0.3                          │
//! │                                                                         │
//! │  Line totals are stored as REAL and recomputed on every save, so the   │
//! │  stored and recomputed values almost never match bit for bit.          │
//! │                                                                         │
//! │  OUR RULE: scale both by 10^decimals, round half away from zero,       │
//! │  compare the integers.                                                  │
//! │    0.30000000000000004 → 30 cents == 0.3 → 30 cents  ✅                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tally_core::amount::{amounts_match, round_to};
//!
//! assert!(amounts_match(0.1 + 0.2, 0.3, 2));
//! assert!(!amounts_match(27.0, 25.0, 2));
//! assert_eq!(round_to(2.345, 2), 2.35);
//! ```

/// Decimals used when no configuration says otherwise.
pub const DEFAULT_AMOUNT_DECIMALS: u32 = 2;

/// Absorbs representation error such as `2.345 * 100 = 234.49999999999997`.
const SCALE_NUDGE: f64 = 1e-7;

/// Converts an amount to integer minor units at the given precision.
///
/// ## Example
/// ```rust
/// use tally_core::amount::to_minor_units;
///
/// assert_eq!(to_minor_units(10.99, 2), 1099);
/// assert_eq!(to_minor_units(-5.505, 2), -551);
/// ```
pub fn to_minor_units(value: f64, decimals: u32) -> i64 {
    let scaled = value * 10f64.powi(decimals as i32);
    (scaled + scaled.signum() * SCALE_NUDGE).round() as i64
}

/// Rounds an amount to `decimals` places, half away from zero.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    to_minor_units(value, decimals) as f64 / 10f64.powi(decimals as i32)
}

/// Returns true when both amounts are equal once rounded to `decimals`.
///
/// NaN and infinities never match anything.
pub fn amounts_match(a: f64, b: f64, decimals: u32) -> bool {
    a.is_finite() && b.is_finite() && to_minor_units(a, decimals) == to_minor_units(b, decimals)
}

/// Applies a percentage discount: `amount * (100 - pct) / 100`.
#[inline]
pub fn apply_discount(amount: f64, pct: f64) -> f64 {
    amount * (100.0 - pct) / 100.0
}

/// Applies a percentage surcharge: `amount * (100 + pct) / 100`.
#[inline]
pub fn apply_rate(amount: f64, pct: f64) -> f64 {
    amount * (100.0 + pct) / 100.0
}

// =============================================================================
// Unit Tests
// =============================================================================
