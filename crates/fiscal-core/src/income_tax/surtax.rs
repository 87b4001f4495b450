use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::brackets::tax_at;
use crate::settings::{CdhrSettings, CehrSettings};
use crate::types::{pct_to_rate, HouseholdStatus, Money};

/// Contribution exceptionnelle sur les hauts revenus: bracket walk on RFR.
pub fn compute_cehr(rfr: Money, status: HouseholdStatus, settings: &CehrSettings) -> Money {
    tax_at(settings.scale_for(status), rfr)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdhrInput {
    pub rfr: Money,
    pub status: HouseholdStatus,
    pub dependents: u32,
    pub ir_net: Money,
    pub pfu_ir: Money,
    pub cehr: Money,
}

/// Eligibility threshold, raised per dependent person.
pub fn cdhr_threshold(status: HouseholdStatus, dependents: u32, settings: &CdhrSettings) -> Money {
    let base = match status {
        HouseholdStatus::Single => settings.threshold_single,
        HouseholdStatus::Couple => settings.threshold_couple,
    };
    base + Decimal::from(dependents) * settings.majoration_par_personne
}

/// Contribution différentielle sur les hauts revenus: the shortfall between
/// a minimum effective rate on RFR and the IR, PFU and CEHR already due.
pub fn compute_cdhr(input: &CdhrInput, settings: &CdhrSettings) -> Money {
    if input.rfr <= cdhr_threshold(input.status, input.dependents, settings) {
        return Decimal::ZERO;
    }
    let floor = input.rfr * pct_to_rate(settings.min_rate);
    let already_paid = input.ir_net + input.pfu_ir + input.cehr;
    (floor - already_paid).max(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::TaxSettings;
    use crate::types::TaxYear;
    use rust_decimal_macros::dec;

    #[test]
    fn test_cehr_single_and_couple() {
        let settings = TaxSettings::default();
        let cehr = &settings.income_tax.get(TaxYear::Current).cehr;
        // 3% on 250k-500k, 4% on 100k above
        assert_eq!(compute_cehr(dec!(600_000), HouseholdStatus::Single, cehr), dec!(11_500));
        // Couple: 3% on 100k above 500k
        assert_eq!(compute_cehr(dec!(600_000), HouseholdStatus::Couple, cehr), dec!(3_000));
        assert_eq!(compute_cehr(dec!(200_000), HouseholdStatus::Single, cehr), Decimal::ZERO);
    }

    #[test]
    fn test_cdhr_charges_shortfall() {
        let settings = TaxSettings::default();
        let cdhr = &settings.income_tax.get(TaxYear::Current).cdhr;
        let input = CdhrInput {
            rfr: dec!(400_000),
            status: HouseholdStatus::Single,
            dependents: 0,
            ir_net: dec!(50_000),
            pfu_ir: dec!(10_000),
            cehr: dec!(4_500),
        };
        // 20% x 400k = 80k floor, 64.5k already paid
        assert_eq!(compute_cdhr(&input, cdhr), dec!(15_500));
    }

    #[test]
    fn test_cdhr_floor_at_zero_and_dependents_threshold() {
        let settings = TaxSettings::default();
        let cdhr = &settings.income_tax.get(TaxYear::Current).cdhr;
        let mut input = CdhrInput {
            rfr: dec!(300_000),
            status: HouseholdStatus::Single,
            dependents: 0,
            ir_net: dec!(90_000),
            pfu_ir: Decimal::ZERO,
            cehr: dec!(1_500),
        };
        assert_eq!(compute_cdhr(&input, cdhr), Decimal::ZERO);

        input.ir_net = dec!(20_000);
        assert!(compute_cdhr(&input, cdhr) > Decimal::ZERO);

        // Four dependents push the threshold to 300k: not eligible anymore.
        input.dependents = 4;
        assert_eq!(compute_cdhr(&input, cdhr), Decimal::ZERO);
    }
}
