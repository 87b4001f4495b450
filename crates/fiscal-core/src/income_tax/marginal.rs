//! Marginal rate (TMI) recovery on the capped income tax.
//!
//! Once the quotient familial cap binds, the tax paid is no longer a plain
//! composition of brackets, so the marginal rate is read off the capped tax
//! function itself with a one-euro discrete derivative, and thresholds are
//! located by step doubling followed by integer bisection.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::brackets::{bracket_for, TaxBracket};
use crate::settings::QuotientFamilialSettings;
use crate::types::{Money, Percent};

use super::quotient::{apply_quotient_cap, FoyerDescription};

/// Income delta used for the discrete derivative.
pub const MARGINAL_PROBE_STEP: Decimal = Decimal::ONE;
/// Largest income delta explored by the threshold searches.
pub const MAX_SEARCH_SPAN: Decimal = dec!(100_000_000);
/// Upper bound on step doublings (2^40 is far above `MAX_SEARCH_SPAN`).
pub const MAX_DOUBLING_STEPS: u32 = 40;
/// Upper bound on bisection iterations.
pub const MAX_BISECTION_STEPS: u32 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchDirection {
    Up,
    Down,
}

/// What moves the displayed marginal rate first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateChangeKind {
    Bracket,
    QfCapActivation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TmiInfo {
    pub rate: Percent,
    /// Share of the global income already taxed in the marginal bracket.
    pub base_global: Money,
    /// Income increase before the marginal rate changes; `None` when no
    /// change is reachable (top bracket, no pending cap activation).
    pub margin_before_change: Option<Money>,
    pub change_kind: Option<RateChangeKind>,
    pub qf_is_capped: bool,
}

/// Capped income tax as a function of taxable income, for a fixed household.
#[derive(Debug, Clone, Copy)]
pub struct CappedTax<'a> {
    pub foyer: &'a FoyerDescription,
    pub scale: &'a [TaxBracket],
    pub qf: &'a QuotientFamilialSettings,
}

impl<'a> CappedTax<'a> {
    pub fn new(
        foyer: &'a FoyerDescription,
        scale: &'a [TaxBracket],
        qf: &'a QuotientFamilialSettings,
    ) -> Self {
        Self { foyer, scale, qf }
    }

    pub fn ir(&self, income: Money) -> Money {
        apply_quotient_cap(income, self.foyer, self.scale, self.qf).ir_after_qf
    }

    pub fn is_capped(&self, income: Money) -> bool {
        apply_quotient_cap(income, self.foyer, self.scale, self.qf).qf_is_capped
    }

    /// Marginal rate in percent, snapped to a rate present in the scale.
    pub fn marginal_rate(&self, income: Money) -> Percent {
        if income <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let raw = (self.ir(income + MARGINAL_PROBE_STEP) - self.ir(income))
            / MARGINAL_PROBE_STEP
            * Decimal::ONE_HUNDRED;
        snap_to_scale(self.scale, raw)
    }

    /// First income, moving in `direction` from `from_income`, whose marginal
    /// rate differs from the rate at `from_income`.
    pub fn find_rate_change_threshold(
        &self,
        from_income: Money,
        direction: SearchDirection,
    ) -> Option<Money> {
        let origin = from_income.floor().max(Decimal::ZERO);
        let reference = self.marginal_rate(origin);
        let moved = |delta: Decimal| match direction {
            SearchDirection::Up => origin + delta,
            SearchDirection::Down => (origin - delta).max(Decimal::ZERO),
        };
        let differs = |delta: Decimal| self.marginal_rate(moved(delta)) != reference;

        let max_span = match direction {
            SearchDirection::Up => MAX_SEARCH_SPAN,
            SearchDirection::Down => origin.min(MAX_SEARCH_SPAN),
        };
        let (lo, hi) = bracket_search(max_span, &differs)?;
        let delta = bisect(lo, hi, &differs);
        Some(moved(delta))
    }

    /// Smallest income increase at which the quotient cap starts to bind.
    /// `None` when already capped or when the cap never binds within
    /// `MAX_SEARCH_SPAN`.
    pub fn find_delta_to_qf_cap_activation(&self, income: Money) -> Option<Money> {
        let origin = income.max(Decimal::ZERO);
        if self.is_capped(origin) {
            return None;
        }
        let activates = |delta: Decimal| self.is_capped(origin + delta);
        let (lo, hi) = bracket_search(MAX_SEARCH_SPAN, &activates)?;
        Some(bisect(lo, hi, &activates))
    }

    /// Marginal rate, position in the bracket and margin before the next
    /// change of displayed rate.
    pub fn resolve_tmi(&self, income: Money) -> TmiInfo {
        if income <= Decimal::ZERO {
            return TmiInfo {
                rate: Decimal::ZERO,
                base_global: Decimal::ZERO,
                margin_before_change: None,
                change_kind: None,
                qf_is_capped: false,
            };
        }

        let rate = self.marginal_rate(income);
        let qf_is_capped = self.is_capped(income);

        let bracket_delta = self
            .find_rate_change_threshold(income, SearchDirection::Up)
            .map(|threshold| (threshold - income).max(Decimal::ZERO));
        let cap_delta = self.find_delta_to_qf_cap_activation(income);

        let (margin_before_change, change_kind) = match (bracket_delta, cap_delta) {
            (Some(b), Some(c)) if c < b => (Some(c), Some(RateChangeKind::QfCapActivation)),
            (Some(b), _) => (Some(b), Some(RateChangeKind::Bracket)),
            (None, Some(c)) => (Some(c), Some(RateChangeKind::QfCapActivation)),
            (None, None) => (None, None),
        };

        // The divisor that governs the displayed bracket flips with the cap.
        let divisor = if qf_is_capped {
            self.foyer.base_parts_for_qf
        } else {
            self.foyer.parts_nb
        }
        .max(dec!(0.5));
        let per_part = income / divisor;
        let base_global = bracket_for(self.scale, per_part)
            .map(|b| (per_part - b.from).max(Decimal::ZERO) * divisor)
            .unwrap_or(Decimal::ZERO);

        TmiInfo {
            rate,
            base_global,
            margin_before_change,
            change_kind,
            qf_is_capped,
        }
    }
}

/// Marginal rate at `income`, in percent.
pub fn marginal_rate(
    income: Money,
    foyer: &FoyerDescription,
    scale: &[TaxBracket],
    qf: &QuotientFamilialSettings,
) -> Percent {
    CappedTax::new(foyer, scale, qf).marginal_rate(income)
}

/// See [`CappedTax::find_rate_change_threshold`].
pub fn find_rate_change_threshold(
    from_income: Money,
    direction: SearchDirection,
    foyer: &FoyerDescription,
    scale: &[TaxBracket],
    qf: &QuotientFamilialSettings,
) -> Option<Money> {
    CappedTax::new(foyer, scale, qf).find_rate_change_threshold(from_income, direction)
}

/// See [`CappedTax::find_delta_to_qf_cap_activation`].
pub fn find_delta_to_qf_cap_activation(
    income: Money,
    foyer: &FoyerDescription,
    scale: &[TaxBracket],
    qf: &QuotientFamilialSettings,
) -> Option<Money> {
    CappedTax::new(foyer, scale, qf).find_delta_to_qf_cap_activation(income)
}

/// See [`CappedTax::resolve_tmi`].
pub fn resolve_tmi(
    income: Money,
    foyer: &FoyerDescription,
    scale: &[TaxBracket],
    qf: &QuotientFamilialSettings,
) -> TmiInfo {
    CappedTax::new(foyer, scale, qf).resolve_tmi(income)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Snap a raw derivative to the closest rate that exists in the scale.
fn snap_to_scale(scale: &[TaxBracket], raw: Percent) -> Percent {
    scale
        .iter()
        .map(|b| b.rate)
        .min_by_key(|rate| (*rate - raw).abs())
        .unwrap_or(Decimal::ZERO)
        .max(Decimal::ZERO)
}

/// Double the step from 1 until `hit` holds or `max_span` is exceeded.
/// Returns `(lo, hi)` with `hit(lo)` false (or `lo = 0`) and `hit(hi)` true.
fn bracket_search(max_span: Decimal, hit: impl Fn(Decimal) -> bool) -> Option<(Decimal, Decimal)> {
    if max_span < Decimal::ONE {
        return None;
    }
    let mut lo = Decimal::ZERO;
    let mut step = Decimal::ONE;
    for _ in 0..MAX_DOUBLING_STEPS {
        let probe = step.min(max_span);
        if hit(probe) {
            return Some((lo, probe));
        }
        if probe >= max_span {
            return None;
        }
        lo = probe;
        step *= dec!(2);
    }
    None
}

/// Integer bisection keeping `hit(lo)` false and `hit(hi)` true.
fn bisect(mut lo: Decimal, mut hi: Decimal, hit: impl Fn(Decimal) -> bool) -> Decimal {
    for _ in 0..MAX_BISECTION_STEPS {
        if hi - lo <= Decimal::ONE {
            break;
        }
        let mid = ((lo + hi) / dec!(2)).floor();
        if hit(mid) {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    hi
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::income_tax::quotient::{compute_parts, ChildCustody};
    use crate::settings::TaxSettings;
    use crate::types::{HouseholdStatus, TaxYear};

    fn oracle_scale(middle_rate: Decimal) -> Vec<TaxBracket> {
        vec![
            TaxBracket::new(dec!(0), Some(dec!(10_000)), dec!(0)),
            TaxBracket::new(dec!(10_000), Some(dec!(20_000)), middle_rate),
            TaxBracket::new(dec!(20_000), None, dec!(45)),
        ]
    }

    fn no_qf() -> QuotientFamilialSettings {
        QuotientFamilialSettings {
            plafond_demi_part: dec!(1_791),
            plafond_parent_isole: dec!(4_224),
        }
    }

    #[test]
    fn test_marginal_rate_follows_middle_bracket() {
        let foyer = FoyerDescription::simple(HouseholdStatus::Single);
        let qf = no_qf();
        assert_eq!(
            marginal_rate(dec!(15_000), &foyer, &oracle_scale(dec!(30)), &qf),
            dec!(30)
        );
        assert_eq!(
            marginal_rate(dec!(15_000), &foyer, &oracle_scale(dec!(33)), &qf),
            dec!(33)
        );
    }

    #[test]
    fn test_zero_income_has_no_rate_and_no_margin() {
        let foyer = FoyerDescription::simple(HouseholdStatus::Single);
        let tmi = resolve_tmi(Decimal::ZERO, &foyer, &oracle_scale(dec!(30)), &no_qf());
        assert_eq!(tmi.rate, Decimal::ZERO);
        assert!(tmi.margin_before_change.is_none());
    }

    #[test]
    fn test_threshold_found_at_bracket_end() {
        let foyer = FoyerDescription::simple(HouseholdStatus::Single);
        let scale = oracle_scale(dec!(30));
        let threshold =
            find_rate_change_threshold(dec!(15_000), SearchDirection::Up, &foyer, &scale, &no_qf())
                .unwrap();
        assert_eq!(threshold, dec!(20_000));

        let down = find_rate_change_threshold(
            dec!(15_000),
            SearchDirection::Down,
            &foyer,
            &scale,
            &no_qf(),
        )
        .unwrap();
        assert_eq!(marginal_rate(down, &foyer, &scale, &no_qf()), Decimal::ZERO);
        assert_eq!(down, dec!(9_999));
    }

    #[test]
    fn test_top_bracket_margin_is_none() {
        let foyer = FoyerDescription::simple(HouseholdStatus::Single);
        let tmi = resolve_tmi(dec!(5_000_000), &foyer, &oracle_scale(dec!(30)), &no_qf());
        assert_eq!(tmi.rate, dec!(45));
        assert!(tmi.margin_before_change.is_none());
        assert!(tmi.change_kind.is_none());
    }

    #[test]
    fn test_margin_within_bracket() {
        let foyer = FoyerDescription::simple(HouseholdStatus::Single);
        let tmi = resolve_tmi(dec!(15_000), &foyer, &oracle_scale(dec!(30)), &no_qf());
        assert_eq!(tmi.margin_before_change, Some(dec!(5_000)));
        assert_eq!(tmi.change_kind, Some(RateChangeKind::Bracket));
        assert_eq!(tmi.base_global, dec!(5_000));
    }

    #[test]
    fn test_qf_cap_activation_is_located() {
        let settings = TaxSettings::default();
        let year = settings.income_tax.get(TaxYear::Current);
        let foyer = compute_parts(
            HouseholdStatus::Couple,
            false,
            &[ChildCustody::Charge, ChildCustody::Charge],
            0,
        );
        let tax = CappedTax::new(&foyer, &year.scale, &year.quotient_familial);
        let income = dec!(60_000);
        assert!(!tax.is_capped(income));
        let delta = tax.find_delta_to_qf_cap_activation(income).unwrap();
        assert!(tax.is_capped(income + delta));
        assert!(!tax.is_capped(income + delta - Decimal::ONE));
    }

    #[test]
    fn test_already_capped_has_no_pending_activation() {
        let settings = TaxSettings::default();
        let year = settings.income_tax.get(TaxYear::Current);
        let foyer = compute_parts(HouseholdStatus::Couple, false, &[ChildCustody::Charge], 0);
        let tax = CappedTax::new(&foyer, &year.scale, &year.quotient_familial);
        assert!(tax.is_capped(dec!(400_000)));
        assert!(tax.find_delta_to_qf_cap_activation(dec!(400_000)).is_none());
    }

    #[test]
    fn test_empty_scale_terminates() {
        let foyer = FoyerDescription::simple(HouseholdStatus::Single);
        let tmi = resolve_tmi(dec!(50_000), &foyer, &[], &no_qf());
        assert_eq!(tmi.rate, Decimal::ZERO);
        assert!(tmi.margin_before_change.is_none());
    }

    #[test]
    fn test_zero_width_brackets_terminate() {
        let foyer = FoyerDescription::simple(HouseholdStatus::Single);
        let scale = vec![
            TaxBracket::new(dec!(0), Some(dec!(0)), dec!(10)),
            TaxBracket::new(dec!(0), Some(dec!(0)), dec!(20)),
        ];
        let tmi = resolve_tmi(dec!(50_000), &foyer, &scale, &no_qf());
        assert!(tmi.margin_before_change.is_none());
    }
}
