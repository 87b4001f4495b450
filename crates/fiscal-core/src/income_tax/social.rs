use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::settings::RetirementPs;
use crate::types::{pct_to_rate, Money, Percent};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialContributionsInput {
    pub patrimony_rate: Percent,
    pub foncier_base: Money,
    pub capital_with_ps_base: Money,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SocialContributions {
    pub ps_foncier: Money,
    pub ps_dividends: Money,
    pub ps_total: Money,
}

/// Flat-rate PS on property and financial income. Negative bases (deficits)
/// carry no contribution.
pub fn compute_social_contributions(input: &SocialContributionsInput) -> SocialContributions {
    let rate = pct_to_rate(input.patrimony_rate);
    let ps_foncier = input.foncier_base.max(Decimal::ZERO) * rate;
    let ps_dividends = input.capital_with_ps_base.max(Decimal::ZERO) * rate;
    SocialContributions {
        ps_foncier,
        ps_dividends,
        ps_total: ps_foncier + ps_dividends,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PensionPs {
    pub bracket: String,
    pub rate: Percent,
    pub amount: Money,
}

/// PS on retirement pensions. The bracket is the first whose RFR ceiling,
/// raised by the household's extra quarter parts, is not exceeded.
pub fn compute_pension_ps(
    pensions: Money,
    rfr: Money,
    parts_nb: Decimal,
    settings: &RetirementPs,
) -> PensionPs {
    let quarter_parts = ((parts_nb - Decimal::ONE) / dec!(0.25)).max(Decimal::ZERO);

    let selected = settings.brackets.iter().find(|b| match b.rfr_max_one_part {
        Some(ceiling) => rfr <= ceiling + quarter_parts * b.rfr_per_quarter_part,
        None => true,
    });

    match selected {
        Some(b) => PensionPs {
            bracket: b.label.clone(),
            rate: b.total_rate,
            amount: pensions.max(Decimal::ZERO) * pct_to_rate(b.total_rate),
        },
        None => PensionPs {
            bracket: "none".into(),
            rate: Decimal::ZERO,
            amount: Decimal::ZERO,
        },
    }
}
