use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::brackets::{tax_at, TaxBracket};
use crate::error::FiscalError;
use crate::settings::QuotientFamilialSettings;
use crate::types::{HouseholdStatus, Money};
use crate::FiscalResult;

/// Tolerance below which an advantage is not considered above its cap.
pub const QF_CAP_EPSILON: Decimal = dec!(0.000000001);

const HALF: Decimal = dec!(0.5);
const QUARTER: Decimal = dec!(0.25);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Custody mode of a child counted in the household.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildCustody {
    /// Child exclusively dependent on the household.
    Charge,
    /// Child in alternating (shared) custody.
    Partagee,
}

/// Household as seen by the quotient familial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoyerDescription {
    pub status: HouseholdStatus,
    /// True only when the isolated-parent increment was actually granted.
    pub is_isolated: bool,
    pub parts_nb: Decimal,
    pub base_parts_for_qf: Decimal,
    pub extra_parts: Decimal,
    pub extra_half_parts: u32,
}

impl FoyerDescription {
    /// Household without children or extra half parts.
    pub fn simple(status: HouseholdStatus) -> Self {
        compute_parts(status, false, &[], 0)
    }

    pub fn validate(&self) -> FiscalResult<()> {
        if self.parts_nb < HALF {
            return Err(FiscalError::InvalidInput {
                field: "parts_nb".into(),
                reason: "A household counts at least half a part".into(),
            });
        }
        if self.parts_nb < self.base_parts_for_qf {
            return Err(FiscalError::InvalidInput {
                field: "parts_nb".into(),
                reason: "parts_nb cannot be lower than base_parts_for_qf".into(),
            });
        }
        Ok(())
    }

    fn uses_isolated_cap(&self, qf: &QuotientFamilialSettings) -> bool {
        self.is_isolated
            && self.status == HouseholdStatus::Single
            && qf.plafond_parent_isole > Decimal::ZERO
    }
}

/// Result of the quotient familial computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotientResult {
    /// IR computed on the base parts only (before the family advantage).
    pub ir_before_qf: Money,
    /// Raw advantage procured by the extra parts.
    pub qf_advantage: Money,
    /// Statutory cap on that advantage.
    pub max_advantage: Money,
    pub ir_after_qf: Money,
    pub qf_is_capped: bool,
}

// ---------------------------------------------------------------------------
// Parts
// ---------------------------------------------------------------------------

/// Count the household's parts.
///
/// Dependent children rank first (half a part each for the first two, a full
/// part from the third), shared-custody children rank after them at half
/// those values. An isolated single parent gets an extra half part with at
/// least one dependent child; with shared-custody children only, a quarter
/// part for one child and a half part for two or more.
pub fn compute_parts(
    status: HouseholdStatus,
    is_isolated: bool,
    children: &[ChildCustody],
    extra_half_parts: u32,
) -> FoyerDescription {
    let base_parts = match status {
        HouseholdStatus::Single => Decimal::ONE,
        HouseholdStatus::Couple => dec!(2),
    };

    let dependents = children
        .iter()
        .filter(|c| matches!(c, ChildCustody::Charge))
        .count();
    let shared = children.len() - dependents;

    let mut child_parts = Decimal::ZERO;
    for rank in 1..=dependents {
        child_parts += if rank <= 2 { HALF } else { Decimal::ONE };
    }
    for rank in (dependents + 1)..=(dependents + shared) {
        child_parts += if rank <= 2 { QUARTER } else { HALF };
    }

    let isolated_bonus = if status == HouseholdStatus::Single && is_isolated {
        match (dependents, shared) {
            (d, _) if d > 0 => HALF,
            (_, 1) => QUARTER,
            (_, s) if s >= 2 => HALF,
            _ => Decimal::ZERO,
        }
    } else {
        Decimal::ZERO
    };

    let parts_nb =
        base_parts + child_parts + isolated_bonus + HALF * Decimal::from(extra_half_parts);

    FoyerDescription {
        status,
        is_isolated: isolated_bonus > Decimal::ZERO,
        parts_nb,
        base_parts_for_qf: base_parts,
        extra_parts: parts_nb - base_parts,
        extra_half_parts,
    }
}

// ---------------------------------------------------------------------------
// Cap
// ---------------------------------------------------------------------------

/// Statutory cap on the quotient familial advantage.
pub fn max_qf_advantage(foyer: &FoyerDescription, qf: &QuotientFamilialSettings) -> Money {
    let two = dec!(2);
    let cap = if foyer.uses_isolated_cap(qf) {
        if foyer.parts_nb <= two {
            (foyer.parts_nb - Decimal::ONE) * qf.plafond_parent_isole
        } else {
            qf.plafond_parent_isole + (foyer.parts_nb - two) * two * qf.plafond_demi_part
        }
    } else {
        foyer.extra_parts * two * qf.plafond_demi_part
    };
    cap.max(Decimal::ZERO)
}

fn divided_tax(scale: &[TaxBracket], income: Money, parts: Decimal) -> Money {
    if parts <= Decimal::ZERO {
        return tax_at(scale, income);
    }
    tax_at(scale, income / parts) * parts
}

/// Apply the quotient familial and its cap to `taxable_income`.
pub fn apply_quotient_cap(
    taxable_income: Money,
    foyer: &FoyerDescription,
    scale: &[TaxBracket],
    qf: &QuotientFamilialSettings,
) -> QuotientResult {
    let ir_all_parts = divided_tax(scale, taxable_income, foyer.parts_nb);
    let ir_base_parts = divided_tax(scale, taxable_income, foyer.base_parts_for_qf);

    let qf_advantage = (ir_base_parts - ir_all_parts).max(Decimal::ZERO);
    let max_advantage = max_qf_advantage(foyer, qf);

    QuotientResult {
        ir_before_qf: ir_base_parts,
        qf_advantage,
        max_advantage,
        ir_after_qf: ir_base_parts - qf_advantage.min(max_advantage),
        qf_is_capped: qf_advantage > max_advantage + QF_CAP_EPSILON,
    }
}
