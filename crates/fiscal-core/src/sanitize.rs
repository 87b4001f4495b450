//! Clamping of raw user-entered numbers before they reach the engine.
//!
//! The computation modules assume already-validated values; callers (the CLI,
//! the bindings) pass their records through these helpers first.

use rust_decimal::Decimal;

use crate::types::{Percent, Rate};

pub const MIN_AGE: u32 = 18;
pub const MAX_AGE: u32 = 120;
pub const MIN_DURATION_YEARS: u32 = 1;
pub const MAX_DURATION_YEARS: u32 = 50;

pub fn clamp_age(age: u32) -> u32 {
    age.clamp(MIN_AGE, MAX_AGE)
}

pub fn clamp_duration(years: u32) -> u32 {
    years.clamp(MIN_DURATION_YEARS, MAX_DURATION_YEARS)
}

/// Percentage in [0, 100].
pub fn clamp_percent(pct: Percent) -> Percent {
    pct.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED)
}

/// Rate in [0, 1].
pub fn clamp_unit_rate(rate: Rate) -> Rate {
    rate.clamp(Decimal::ZERO, Decimal::ONE)
}

pub fn non_negative(value: Decimal) -> Decimal {
    value.max(Decimal::ZERO)
}

/// Clamp `value` and record a warning naming `field` when it moved.
pub fn clamp_with_warning<T: PartialEq + Copy + std::fmt::Display>(
    field: &str,
    value: T,
    clamp: impl Fn(T) -> T,
    warnings: &mut Vec<String>,
) -> T {
    let clamped = clamp(value);
    if clamped != value {
        warnings.push(format!("{field} {value} clamped to {clamped}"));
    }
    clamped
}
