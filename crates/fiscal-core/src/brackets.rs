use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{pct_to_rate, Money, Percent};

/// One slice of a progressive scale. `to = None` marks the open top bracket.
///
/// Missing `from` / `rate` deserialize to zero so that a malformed settings
/// entry degrades to no tax instead of failing the whole computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxBracket {
    #[serde(default)]
    pub from: Money,
    #[serde(default)]
    pub to: Option<Money>,
    #[serde(default)]
    pub rate: Percent,
}

impl TaxBracket {
    pub fn new(from: Money, to: Option<Money>, rate: Percent) -> Self {
        Self { from, to, rate }
    }

    /// Width of the bracket, `None` for the open top bracket.
    pub fn width(&self) -> Option<Money> {
        self.to.map(|to| (to - self.from).max(Decimal::ZERO))
    }

    fn contains(&self, base: Money) -> bool {
        base >= self.from && self.to.map_or(true, |to| base < to)
    }
}

/// Amount of tax accrued in a single bracket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BracketSlice {
    pub from: Money,
    pub to: Option<Money>,
    pub rate: Percent,
    pub base: Money,
    pub tax: Money,
}

/// Integrate a progressive scale against `base`.
///
/// Brackets are walked in the order given; each bracket whose lower bound is
/// below `base` accrues `(min(base, to) - from) * rate / 100`. The walk stops
/// at the first bracket whose upper bound reaches `base`. Inverted or
/// zero-width brackets contribute nothing.
pub fn tax_at(scale: &[TaxBracket], base: Money) -> Money {
    bracket_breakdown(scale, base).iter().map(|s| s.tax).sum()
}

/// Same walk as [`tax_at`], returning the per-bracket slices.
pub fn bracket_breakdown(scale: &[TaxBracket], base: Money) -> Vec<BracketSlice> {
    let mut slices = Vec::new();
    if base <= Decimal::ZERO {
        return slices;
    }

    for bracket in scale {
        if base <= bracket.from {
            continue;
        }
        let upper = match bracket.to {
            Some(to) => base.min(to),
            None => base,
        };
        let slice_base = (upper - bracket.from).max(Decimal::ZERO);
        slices.push(BracketSlice {
            from: bracket.from,
            to: bracket.to,
            rate: bracket.rate,
            base: slice_base,
            tax: slice_base * pct_to_rate(bracket.rate),
        });
        if bracket.to.map_or(true, |to| base <= to) {
            break;
        }
    }

    slices
}

/// Locate the bracket containing `base` (the first bracket when `base` is
/// below the scale).
pub fn bracket_for(scale: &[TaxBracket], base: Money) -> Option<&TaxBracket> {
    scale
        .iter()
        .find(|b| b.contains(base))
        .or_else(|| scale.first().filter(|b| base < b.from))
}

/// Highest rate appearing in the scale.
pub fn max_rate(scale: &[TaxBracket]) -> Percent {
    scale
        .iter()
        .map(|b| b.rate)
        .max()
        .unwrap_or(Decimal::ZERO)
}
