use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::rules::resolver::{
    PRODUCT_ASSURANCE_VIE, PRODUCT_CTO, PRODUCT_PEA, PRODUCT_PER, PRODUCT_SCPI,
};
use crate::settings::HeirCategory;
use crate::succession::dmtg::TransmissionResult;
use crate::types::{HouseholdStatus, Money, Percent, Rate};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Savings wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Envelope {
    #[serde(alias = "av")]
    AssuranceVie,
    Per,
    Cto,
    Pea,
    Scpi,
}

impl Envelope {
    /// Catalog id of the product governing this envelope.
    pub fn product_id(self) -> &'static str {
        match self {
            Envelope::AssuranceVie => PRODUCT_ASSURANCE_VIE,
            Envelope::Per => PRODUCT_PER,
            Envelope::Cto => PRODUCT_CTO,
            Envelope::Pea => PRODUCT_PEA,
            Envelope::Scpi => PRODUCT_SCPI,
        }
    }

    /// Income paid inside the wrapper is not taxed when it arises.
    pub fn is_wrapper(self) -> bool {
        matches!(self, Envelope::AssuranceVie | Envelope::Per | Envelope::Pea)
    }
}

/// What happens to the distribution pocket's income.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionStrategy {
    /// Kept in a non-yielding cash stock inside the product.
    #[default]
    Stocker,
    /// Paid out to the client, net of tax.
    Apprehender,
    /// Net income reinvested in the capitalisation pocket.
    ReinvestirCapi,
}

/// One payment. `pct_capitalisation + pct_distribution = 100` once
/// normalized; both absent means everything goes to capitalisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versement {
    #[serde(default)]
    pub montant: Money,
    /// Entry fee as a rate of the gross payment.
    #[serde(default)]
    pub frais_entree: Rate,
    #[serde(default)]
    pub pct_capitalisation: Percent,
    #[serde(default)]
    pub pct_distribution: Percent,
    /// Savings year (1-based) of a one-off payment.
    #[serde(default)]
    pub annee: Option<u32>,
}

impl Default for Versement {
    fn default() -> Self {
        Self {
            montant: Decimal::ZERO,
            frais_entree: Decimal::ZERO,
            pct_capitalisation: Decimal::ONE_HUNDRED,
            pct_distribution: Decimal::ZERO,
            annee: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapitalisationConfig {
    #[serde(default)]
    pub rendement_annuel: Rate,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistributionConfig {
    /// Revaluation of the pocket's value.
    #[serde(default)]
    pub rendement_annuel: Rate,
    /// Income distributed each year, as a rate of the pocket's value.
    #[serde(default)]
    pub taux_distribution: Rate,
    #[serde(default)]
    pub strategie: DistributionStrategy,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersementConfig {
    #[serde(default)]
    pub initial: Versement,
    #[serde(default)]
    pub annuel: Versement,
    #[serde(default)]
    pub ponctuels: Vec<Versement>,
    #[serde(default)]
    pub capitalisation: CapitalisationConfig,
    #[serde(default)]
    pub distribution: DistributionConfig,
}

/// How a withdrawal splits between principal and gain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalOrdering {
    #[default]
    Prorata,
    GainsFirst,
    CapitalFirst,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductConfig {
    pub envelope: Envelope,
    #[serde(default)]
    pub label: String,
    /// Savings phase length, in years.
    pub duree_epargne: u32,
    /// Years the contract has already been open when the simulation starts.
    #[serde(default)]
    pub anciennete: u32,
    pub versements: VersementConfig,
    #[serde(default)]
    pub ordre_retrait: WithdrawalOrdering,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientProfile {
    pub age_actuel: u32,
    #[serde(default)]
    pub status: HouseholdStatus,
    /// Marginal rate during the savings phase.
    #[serde(default)]
    pub tmi_epargne: Rate,
    /// Marginal rate once retired.
    #[serde(default)]
    pub tmi_retraite: Rate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiquidationStrategy {
    /// Exhaust the capital over `duree_retraits` years.
    #[default]
    Epuiser,
    /// Withdraw a target gross monthly amount until exhausted.
    Mensualite,
    /// Withdraw everything in the first liquidation year.
    Unique,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationParams {
    #[serde(default)]
    pub strategie: LiquidationStrategy,
    #[serde(default = "default_withdrawal_years")]
    pub duree_retraits: u32,
    #[serde(default)]
    pub mensualite_cible: Money,
    /// Progressive-scale option instead of the flat tax on gains.
    #[serde(default)]
    pub option_bareme: bool,
}

fn default_withdrawal_years() -> u32 {
    20
}

impl Default for LiquidationParams {
    fn default() -> Self {
        Self {
            strategie: LiquidationStrategy::Epuiser,
            duree_retraits: default_withdrawal_years(),
            mensualite_cible: Decimal::ZERO,
            option_bareme: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransmissionParams {
    pub age_deces: u32,
    pub nb_beneficiaires: u32,
    #[serde(default)]
    pub heir: HeirCategory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationInput {
    pub product: ProductConfig,
    pub client: ClientProfile,
    #[serde(default)]
    pub liquidation: LiquidationParams,
    pub transmission: TransmissionParams,
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// One savings-phase year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpargneRow {
    pub annee: u32,
    pub age: u32,
    pub capital_debut: Money,
    pub versement_brut: Money,
    pub frais: Money,
    pub versement_net: Money,
    pub gains_capitalisation: Money,
    pub revalorisation_distribution: Money,
    pub distributions_brutes: Money,
    pub fiscalite_distributions: Money,
    /// Net distributions paid out to the client (`apprehender`).
    pub distributions_percues: Money,
    pub capital_capitalisation: Money,
    pub capital_distribution: Money,
    pub stock: Money,
    pub capital_fin: Money,
    /// Remaining untaxed principal.
    pub capital_non_impose: Money,
    pub economie_impot: Money,
}

/// One liquidation-phase year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidationRow {
    pub annee: u32,
    pub age: u32,
    pub capital_debut: Money,
    pub retrait_brut: Money,
    pub part_capital: Money,
    pub part_gains: Money,
    pub impot_revenu: Money,
    pub prelevements_sociaux: Money,
    pub retrait_net: Money,
    pub distributions_brutes: Money,
    pub fiscalite_distributions: Money,
    pub distributions_percues: Money,
    pub capital_fin: Money,
    pub capital_non_impose: Money,
    pub gains_latents: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementTransmission {
    pub age_deces: u32,
    pub heir: HeirCategory,
    /// Part of the capital from premiums paid before the age limit (AV/PER).
    pub capital_990i: Money,
    /// Premiums paid after the age limit and subject to DMTG (AV/PER).
    pub primes_757b: Money,
    pub result: TransmissionResult,
    pub consumption_ratio: Decimal,
    pub show_dmtg_disclaimer: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationTotals {
    pub total_verse: Money,
    pub total_frais: Money,
    pub economie_impot: Money,
    pub capital_fin_epargne: Money,
    pub distributions_percues: Money,
    pub fiscalite_distributions: Money,
    pub total_retraits_bruts: Money,
    pub total_retraits_nets: Money,
    pub impot_retraits: Money,
    pub ps_retraits: Money,
    pub capital_transmis_net: Money,
    /// Everything the client and heirs receive, plus tax savings, minus payments.
    pub gain_net: Money,
    pub roi: Rate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub label: String,
    pub envelope: Envelope,
    pub epargne: Vec<EpargneRow>,
    pub liquidation: Vec<LiquidationRow>,
    pub transmission: PlacementTransmission,
    pub totaux: SimulationTotals,
}
