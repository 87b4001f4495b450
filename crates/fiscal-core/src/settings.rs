//! Tax and social-contribution settings consumed by every engine component.
//!
//! Settings are plain data handed in by the caller. The defaults embed the
//! published scales for the current and previous income years so the engine
//! is usable without any external configuration.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::brackets::TaxBracket;
use crate::types::{HouseholdStatus, Money, Percent, TaxYear, YearKeyed};

// ---------------------------------------------------------------------------
// Income tax settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotientFamilialSettings {
    /// Cap on the advantage per extra half part.
    pub plafond_demi_part: Money,
    /// Cap on the advantage of the first part granted to an isolated parent.
    /// Zero disables the isolated-parent cap formula.
    #[serde(default)]
    pub plafond_parent_isole: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecoteSettings {
    pub trigger_single: Money,
    pub trigger_couple: Money,
    pub amount_single: Money,
    pub amount_couple: Money,
    pub rate: Percent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbatementBounds {
    pub rate: Percent,
    pub plancher: Money,
    pub plafond: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Abat10Settings {
    pub salaries: AbatementBounds,
    pub retirees: AbatementBounds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomRebate {
    pub rate: Percent,
    pub cap: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomSettings {
    /// Guadeloupe, Martinique, La Réunion.
    pub gmr: DomRebate,
    /// Guyane, Mayotte.
    pub guyane: DomRebate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CehrSettings {
    pub single: Vec<TaxBracket>,
    pub couple: Vec<TaxBracket>,
}

impl CehrSettings {
    pub fn scale_for(&self, status: HouseholdStatus) -> &[TaxBracket] {
        match status {
            HouseholdStatus::Single => &self.single,
            HouseholdStatus::Couple => &self.couple,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CdhrSettings {
    /// Minimum effective rate on RFR.
    pub min_rate: Percent,
    pub threshold_single: Money,
    pub threshold_couple: Money,
    /// Increase of the eligibility threshold per dependent person.
    #[serde(default)]
    pub majoration_par_personne: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PfuSettings {
    pub rate_ir: Percent,
    pub rate_ps: Percent,
    pub rate_total: Percent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeTaxYear {
    pub label: String,
    /// Calendar year whose income this scale taxes.
    #[serde(default)]
    pub income_year: Option<i32>,
    pub scale: Vec<TaxBracket>,
    pub quotient_familial: QuotientFamilialSettings,
    pub decote: DecoteSettings,
    pub abat10: Abat10Settings,
    pub dom: DomSettings,
    pub cehr: CehrSettings,
    pub cdhr: CdhrSettings,
    /// Abatement on dividends taxed under the progressive scale.
    pub dividend_abatement: Percent,
}

/// Heir category for DMTG purposes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeirCategory {
    #[default]
    LigneDirecte,
    FrereSoeur,
    NeveuNiece,
    Autre,
    Conjoint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DmtgCategory {
    pub abattement: Money,
    pub scale: Vec<TaxBracket>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DmtgSettings {
    pub ligne_directe: DmtgCategory,
    pub frere_soeur: DmtgCategory,
    pub neveu_niece: DmtgCategory,
    pub autre: DmtgCategory,
}

impl DmtgSettings {
    /// Spouse and PACS partner are exempt: no scale, unlimited abatement is
    /// modelled as an empty scale.
    pub fn category(&self, heir: HeirCategory) -> DmtgCategory {
        match heir {
            HeirCategory::LigneDirecte => self.ligne_directe.clone(),
            HeirCategory::FrereSoeur => self.frere_soeur.clone(),
            HeirCategory::NeveuNiece => self.neveu_niece.clone(),
            HeirCategory::Autre => self.autre.clone(),
            HeirCategory::Conjoint => DmtgCategory {
                abattement: Decimal::ZERO,
                scale: Vec::new(),
            },
        }
    }
}

/// Assurance-vie death-benefit constants (articles 990 I and 757 B).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssuranceVieDeathSettings {
    pub abattement_990i: Money,
    pub taux_990i_1: Percent,
    pub seuil_990i: Money,
    pub taux_990i_2: Percent,
    pub abattement_757b: Money,
    pub age_limite_primes: u32,
}

/// Assurance-vie withdrawal constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssuranceVieExitSettings {
    pub abattement_single: Money,
    pub abattement_couple: Money,
    pub taux_reduit: Percent,
    pub seuil_primes: Money,
    pub duree_fiscale: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxSettings {
    pub income_tax: YearKeyed<IncomeTaxYear>,
    pub pfu: YearKeyed<PfuSettings>,
    pub dmtg: DmtgSettings,
    pub assurance_vie_exit: AssuranceVieExitSettings,
    pub assurance_vie_death: AssuranceVieDeathSettings,
}

impl TaxSettings {
    /// Year-keyed settings applicable at `date`. Dates before the current
    /// scale's income year use the previous one; without a date, or when the
    /// current scale carries no income year, the current one.
    pub fn tax_year_at(&self, date: Option<NaiveDate>) -> TaxYear {
        match (date, self.income_tax.current.income_year) {
            (Some(d), Some(year)) if d.year() < year => TaxYear::Previous,
            _ => TaxYear::Current,
        }
    }
}

// ---------------------------------------------------------------------------
// Social contribution settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatrimonyPs {
    pub total_rate: Percent,
    pub csg_deductible_rate: Percent,
}

/// One retirement-pension PS bracket. A household falls in the first bracket
/// whose threshold for its parts count is not exceeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PensionPsBracket {
    pub label: String,
    /// RFR ceiling for one part; `None` for the last bracket.
    pub rfr_max_one_part: Option<Money>,
    /// Ceiling increase per additional quarter part.
    #[serde(default)]
    pub rfr_per_quarter_part: Money,
    pub total_rate: Percent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetirementPs {
    pub brackets: Vec<PensionPsBracket>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PsSettings {
    pub patrimony: YearKeyed<PatrimonyPs>,
    pub retirement: YearKeyed<RetirementPs>,
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn bracket(from: Money, to: Option<Money>, rate: Percent) -> TaxBracket {
    TaxBracket::new(from, to, rate)
}

fn cehr_settings() -> CehrSettings {
    CehrSettings {
        single: vec![
            bracket(dec!(0), Some(dec!(250_000)), dec!(0)),
            bracket(dec!(250_000), Some(dec!(500_000)), dec!(3)),
            bracket(dec!(500_000), None, dec!(4)),
        ],
        couple: vec![
            bracket(dec!(0), Some(dec!(500_000)), dec!(0)),
            bracket(dec!(500_000), Some(dec!(1_000_000)), dec!(3)),
            bracket(dec!(1_000_000), None, dec!(4)),
        ],
    }
}

fn dom_settings() -> DomSettings {
    DomSettings {
        gmr: DomRebate {
            rate: dec!(30),
            cap: dec!(2_450),
        },
        guyane: DomRebate {
            rate: dec!(40),
            cap: dec!(4_050),
        },
    }
}

fn income_tax_current() -> IncomeTaxYear {
    IncomeTaxYear {
        label: "Revenus 2024".into(),
        income_year: Some(2024),
        scale: vec![
            bracket(dec!(0), Some(dec!(11_497)), dec!(0)),
            bracket(dec!(11_497), Some(dec!(29_315)), dec!(11)),
            bracket(dec!(29_315), Some(dec!(83_823)), dec!(30)),
            bracket(dec!(83_823), Some(dec!(180_294)), dec!(41)),
            bracket(dec!(180_294), None, dec!(45)),
        ],
        quotient_familial: QuotientFamilialSettings {
            plafond_demi_part: dec!(1_791),
            plafond_parent_isole: dec!(4_224),
        },
        decote: DecoteSettings {
            trigger_single: dec!(1_964),
            trigger_couple: dec!(3_249),
            amount_single: dec!(889),
            amount_couple: dec!(1_470),
            rate: dec!(45.25),
        },
        abat10: Abat10Settings {
            salaries: AbatementBounds {
                rate: dec!(10),
                plancher: dec!(504),
                plafond: dec!(14_426),
            },
            retirees: AbatementBounds {
                rate: dec!(10),
                plancher: dec!(442),
                plafond: dec!(4_399),
            },
        },
        dom: dom_settings(),
        cehr: cehr_settings(),
        cdhr: CdhrSettings {
            min_rate: dec!(20),
            threshold_single: dec!(250_000),
            threshold_couple: dec!(500_000),
            majoration_par_personne: dec!(12_500),
        },
        dividend_abatement: dec!(40),
    }
}

fn income_tax_previous() -> IncomeTaxYear {
    IncomeTaxYear {
        label: "Revenus 2023".into(),
        income_year: Some(2023),
        scale: vec![
            bracket(dec!(0), Some(dec!(11_294)), dec!(0)),
            bracket(dec!(11_294), Some(dec!(28_797)), dec!(11)),
            bracket(dec!(28_797), Some(dec!(82_341)), dec!(30)),
            bracket(dec!(82_341), Some(dec!(177_106)), dec!(41)),
            bracket(dec!(177_106), None, dec!(45)),
        ],
        quotient_familial: QuotientFamilialSettings {
            plafond_demi_part: dec!(1_759),
            plafond_parent_isole: dec!(4_149),
        },
        decote: DecoteSettings {
            trigger_single: dec!(1_929),
            trigger_couple: dec!(3_191),
            amount_single: dec!(873),
            amount_couple: dec!(1_444),
            rate: dec!(45.25),
        },
        abat10: Abat10Settings {
            salaries: AbatementBounds {
                rate: dec!(10),
                plancher: dec!(495),
                plafond: dec!(14_171),
            },
            retirees: AbatementBounds {
                rate: dec!(10),
                plancher: dec!(422),
                plafond: dec!(4_321),
            },
        },
        dom: dom_settings(),
        cehr: cehr_settings(),
        cdhr: CdhrSettings {
            min_rate: dec!(20),
            threshold_single: dec!(250_000),
            threshold_couple: dec!(500_000),
            majoration_par_personne: dec!(12_500),
        },
        dividend_abatement: dec!(40),
    }
}

fn pfu() -> PfuSettings {
    PfuSettings {
        rate_ir: dec!(12.8),
        rate_ps: dec!(17.2),
        rate_total: dec!(30),
    }
}

fn dmtg_settings() -> DmtgSettings {
    DmtgSettings {
        ligne_directe: DmtgCategory {
            abattement: dec!(100_000),
            scale: vec![
                bracket(dec!(0), Some(dec!(8_072)), dec!(5)),
                bracket(dec!(8_072), Some(dec!(12_109)), dec!(10)),
                bracket(dec!(12_109), Some(dec!(15_932)), dec!(15)),
                bracket(dec!(15_932), Some(dec!(552_324)), dec!(20)),
                bracket(dec!(552_324), Some(dec!(902_838)), dec!(30)),
                bracket(dec!(902_838), Some(dec!(1_805_677)), dec!(40)),
                bracket(dec!(1_805_677), None, dec!(45)),
            ],
        },
        frere_soeur: DmtgCategory {
            abattement: dec!(15_932),
            scale: vec![
                bracket(dec!(0), Some(dec!(24_430)), dec!(35)),
                bracket(dec!(24_430), None, dec!(45)),
            ],
        },
        neveu_niece: DmtgCategory {
            abattement: dec!(7_967),
            scale: vec![bracket(dec!(0), None, dec!(55))],
        },
        autre: DmtgCategory {
            abattement: dec!(1_594),
            scale: vec![bracket(dec!(0), None, dec!(60))],
        },
    }
}

impl Default for TaxSettings {
    fn default() -> Self {
        Self {
            income_tax: YearKeyed {
                current: income_tax_current(),
                previous: income_tax_previous(),
            },
            pfu: YearKeyed {
                current: pfu(),
                previous: pfu(),
            },
            dmtg: dmtg_settings(),
            assurance_vie_exit: AssuranceVieExitSettings {
                abattement_single: dec!(4_600),
                abattement_couple: dec!(9_200),
                taux_reduit: dec!(7.5),
                seuil_primes: dec!(150_000),
                duree_fiscale: 8,
            },
            assurance_vie_death: AssuranceVieDeathSettings {
                abattement_990i: dec!(152_500),
                taux_990i_1: dec!(20),
                seuil_990i: dec!(700_000),
                taux_990i_2: dec!(31.25),
                abattement_757b: dec!(30_500),
                age_limite_primes: 70,
            },
        }
    }
}

fn retirement_ps(thresholds: [Money; 3], per_quarter: [Money; 3]) -> RetirementPs {
    RetirementPs {
        brackets: vec![
            PensionPsBracket {
                label: "exonere".into(),
                rfr_max_one_part: Some(thresholds[0]),
                rfr_per_quarter_part: per_quarter[0],
                total_rate: dec!(0),
            },
            PensionPsBracket {
                label: "taux_reduit".into(),
                rfr_max_one_part: Some(thresholds[1]),
                rfr_per_quarter_part: per_quarter[1],
                total_rate: dec!(4.3),
            },
            PensionPsBracket {
                label: "taux_median".into(),
                rfr_max_one_part: Some(thresholds[2]),
                rfr_per_quarter_part: per_quarter[2],
                total_rate: dec!(7.4),
            },
            PensionPsBracket {
                label: "taux_normal".into(),
                rfr_max_one_part: None,
                rfr_per_quarter_part: Decimal::ZERO,
                total_rate: dec!(9.1),
            },
        ],
    }
}

impl Default for PsSettings {
    fn default() -> Self {
        let patrimony = PatrimonyPs {
            total_rate: dec!(17.2),
            csg_deductible_rate: dec!(6.8),
        };
        Self {
            patrimony: YearKeyed {
                current: patrimony.clone(),
                previous: patrimony,
            },
            retirement: YearKeyed {
                current: retirement_ps(
                    [dec!(12_817), dec!(16_755), dec!(26_004)],
                    [dec!(1_711), dec!(2_237), dec!(3_471)],
                ),
                previous: retirement_ps(
                    [dec!(12_455), dec!(16_281), dec!(25_269)],
                    [dec!(1_663), dec!(2_174), dec!(3_373)],
                ),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scales_are_contiguous() {
        let settings = TaxSettings::default();
        for year in [TaxYear::Current, TaxYear::Previous] {
            let scale = &settings.income_tax.get(year).scale;
            for pair in scale.windows(2) {
                assert_eq!(pair[0].to, Some(pair[1].from));
            }
            assert!(scale.last().unwrap().to.is_none());
        }
    }

    #[test]
    fn test_settings_roundtrip_through_json() {
        let settings = TaxSettings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let back: TaxSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn test_tax_year_follows_date() {
        let settings = TaxSettings::default();
        let date = |y| NaiveDate::from_ymd_opt(y, 6, 1).unwrap();
        assert_eq!(settings.tax_year_at(None), TaxYear::Current);
        assert_eq!(settings.tax_year_at(Some(date(2024))), TaxYear::Current);
        assert_eq!(settings.tax_year_at(Some(date(2030))), TaxYear::Current);
        assert_eq!(settings.tax_year_at(Some(date(2023))), TaxYear::Previous);

        let mut unlabelled = settings.clone();
        unlabelled.income_tax.current.income_year = None;
        assert_eq!(unlabelled.tax_year_at(Some(date(2010))), TaxYear::Current);
    }

    #[test]
    fn test_conjoint_is_exempt() {
        let dmtg = TaxSettings::default().dmtg;
        assert!(dmtg.category(HeirCategory::Conjoint).scale.is_empty());
        assert_eq!(dmtg.category(HeirCategory::LigneDirecte).abattement, dec!(100_000));
    }
}
