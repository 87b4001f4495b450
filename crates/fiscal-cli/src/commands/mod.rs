pub mod income_tax;
pub mod placement;
pub mod rules;
pub mod succession;

use clap::ValueEnum;
use fiscal_core::settings::HeirCategory;
use fiscal_core::{HouseholdStatus, TaxYear};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StatusArg {
    Single,
    Couple,
}

impl From<StatusArg> for HouseholdStatus {
    fn from(s: StatusArg) -> Self {
        match s {
            StatusArg::Single => HouseholdStatus::Single,
            StatusArg::Couple => HouseholdStatus::Couple,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum YearArg {
    Current,
    Previous,
}

impl From<YearArg> for TaxYear {
    fn from(y: YearArg) -> Self {
        match y {
            YearArg::Current => TaxYear::Current,
            YearArg::Previous => TaxYear::Previous,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum HeirArg {
    LigneDirecte,
    FrereSoeur,
    NeveuNiece,
    Autre,
    Conjoint,
}

impl From<HeirArg> for HeirCategory {
    fn from(h: HeirArg) -> Self {
        match h {
            HeirArg::LigneDirecte => HeirCategory::LigneDirecte,
            HeirArg::FrereSoeur => HeirCategory::FrereSoeur,
            HeirArg::NeveuNiece => HeirCategory::NeveuNiece,
            HeirArg::Autre => HeirCategory::Autre,
            HeirArg::Conjoint => HeirCategory::Conjoint,
        }
    }
}
