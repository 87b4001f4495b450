use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::rules::resolver::FiscalParams;
use crate::types::{with_metadata, ComputationOutput, Money, Rate};
use crate::FiscalResult;

use super::engine::run_simulation;
use super::types::{
    ClientProfile, LiquidationParams, ProductConfig, SimulationInput, SimulationResult,
    SimulationTotals, TransmissionParams,
};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Two products simulated for the same client and horizon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonInput {
    pub client: ClientProfile,
    #[serde(default)]
    pub liquidation: LiquidationParams,
    pub transmission: TransmissionParams,
    pub product_a: ProductConfig,
    pub product_b: ProductConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub label: String,
    pub total_verse: Money,
    pub capital_fin_epargne: Money,
    pub total_retraits_nets: Money,
    pub distributions_percues: Money,
    pub capital_transmis_net: Money,
    pub economie_impot: Money,
    pub impots_totaux: Money,
    pub gain_net: Money,
    pub roi: Rate,
}

/// `b - a` for each headline figure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonDeltas {
    pub capital_fin_epargne: Money,
    pub total_retraits_nets: Money,
    pub capital_transmis_net: Money,
    pub impots_totaux: Money,
    pub gain_net: Money,
    pub roi: Rate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comparison {
    pub summary_a: ProductSummary,
    pub summary_b: ProductSummary,
    pub deltas: ComparisonDeltas,
    /// Label of the product with the higher net gain; `None` on a tie.
    pub meilleur: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonOutput {
    pub product_a: SimulationResult,
    pub product_b: SimulationResult,
    pub comparison: Comparison,
}

// ---------------------------------------------------------------------------
// Core functions
// ---------------------------------------------------------------------------

fn total_taxes(t: &SimulationTotals, result: &SimulationResult) -> Money {
    let tr = &result.transmission.result;
    t.fiscalite_distributions + t.impot_retraits + t.ps_retraits + tr.ps_deces
        + tr.taxe_forfaitaire
        + tr.taxe_dmtg
}

pub fn summarize(result: &SimulationResult) -> ProductSummary {
    let t = &result.totaux;
    ProductSummary {
        label: result.label.clone(),
        total_verse: t.total_verse,
        capital_fin_epargne: t.capital_fin_epargne,
        total_retraits_nets: t.total_retraits_nets,
        distributions_percues: t.distributions_percues,
        capital_transmis_net: t.capital_transmis_net,
        economie_impot: t.economie_impot,
        impots_totaux: total_taxes(t, result),
        gain_net: t.gain_net,
        roi: t.roi,
    }
}

/// Side-by-side summary of two simulations.
pub fn compare_products(a: &SimulationResult, b: &SimulationResult) -> Comparison {
    let summary_a = summarize(a);
    let summary_b = summarize(b);
    let deltas = ComparisonDeltas {
        capital_fin_epargne: summary_b.capital_fin_epargne - summary_a.capital_fin_epargne,
        total_retraits_nets: summary_b.total_retraits_nets - summary_a.total_retraits_nets,
        capital_transmis_net: summary_b.capital_transmis_net - summary_a.capital_transmis_net,
        impots_totaux: summary_b.impots_totaux - summary_a.impots_totaux,
        gain_net: summary_b.gain_net - summary_a.gain_net,
        roi: summary_b.roi - summary_a.roi,
    };
    let meilleur = if deltas.gain_net > Decimal::ZERO {
        Some(summary_b.label.clone())
    } else if deltas.gain_net < Decimal::ZERO {
        Some(summary_a.label.clone())
    } else {
        None
    };
    Comparison {
        summary_a,
        summary_b,
        deltas,
        meilleur,
    }
}

/// Simulate both products under the same client, liquidation and
/// transmission assumptions, then compare them.
pub fn simulate_comparison(
    input: &ComparisonInput,
    params: &FiscalParams,
) -> FiscalResult<ComputationOutput<ComparisonOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let mut run = |product: &ProductConfig| -> FiscalResult<SimulationResult> {
        let sim_input = SimulationInput {
            product: product.clone(),
            client: input.client.clone(),
            liquidation: input.liquidation.clone(),
            transmission: input.transmission.clone(),
        };
        let (result, w) = run_simulation(&sim_input, params)?;
        warnings.extend(w.into_iter().map(|msg| format!("{}: {msg}", result.label)));
        Ok(result)
    };
    let product_a = run(&input.product_a)?;
    let product_b = run(&input.product_b)?;

    let comparison = compare_products(&product_a, &product_b);

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Two envelope simulations under shared assumptions, deltas b - a",
        &serde_json::json!({
            "product_a": input.product_a.envelope,
            "product_b": input.product_b.envelope,
            "liquidation": input.liquidation.strategie,
        }),
        warnings,
        elapsed,
        ComparisonOutput {
            product_a,
            product_b,
            comparison,
        },
    ))
}
