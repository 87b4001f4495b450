//! Per-envelope taxation of income, withdrawals and principal/gain splits.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::rules::resolver::FiscalParams;
use crate::types::{HouseholdStatus, Money, Rate};

use super::types::{Envelope, WithdrawalOrdering};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalSplit {
    pub principal: Money,
    pub gain: Money,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExitTax {
    pub ir: Money,
    pub ps: Money,
    /// Part of the annual assurance-vie abatement consumed.
    pub abattement_utilise: Money,
}

/// Taxation context of one withdrawal.
#[derive(Debug, Clone, Copy)]
pub struct ExitContext<'a> {
    pub envelope: Envelope,
    pub years_held: u32,
    pub status: HouseholdStatus,
    pub tmi: Rate,
    pub option_bareme: bool,
    /// Untaxed principal before the withdrawal.
    pub premiums_outstanding: Money,
    pub params: &'a FiscalParams,
}

/// Decompose `amount` taken from a product worth `value` with untaxed
/// principal `basis`.
pub fn split_withdrawal(
    amount: Money,
    value: Money,
    basis: Money,
    ordering: WithdrawalOrdering,
) -> WithdrawalSplit {
    if amount <= Decimal::ZERO || value <= Decimal::ZERO {
        return WithdrawalSplit::default();
    }
    let basis = basis.max(Decimal::ZERO).min(value);
    let gain_total = value - basis;
    let principal = match ordering {
        WithdrawalOrdering::Prorata => amount * basis / value,
        WithdrawalOrdering::GainsFirst => (amount - gain_total).max(Decimal::ZERO),
        WithdrawalOrdering::CapitalFirst => amount.min(basis),
    };
    WithdrawalSplit {
        principal,
        gain: amount - principal,
    }
}

pub fn av_annual_abatement(status: HouseholdStatus, params: &FiscalParams) -> Money {
    match status {
        HouseholdStatus::Single => params.av_abattement_single,
        HouseholdStatus::Couple => params.av_abattement_couple,
    }
}

/// Social contributions on income and gains of `envelope`.
fn ps_rate(envelope: Envelope, params: &FiscalParams) -> Rate {
    match envelope {
        Envelope::Cto => params.ps_rate_cto,
        _ => params.ps_rate,
    }
}

/// Flat rate on gains, or the marginal rate under the progressive option.
fn gain_rate(ctx: &ExitContext<'_>, flat: Rate) -> Rate {
    if ctx.option_bareme {
        ctx.tmi
    } else {
        flat
    }
}

/// Income tax and PS on one withdrawal. `abatement_available` is what is
/// left of the year's assurance-vie abatement.
pub fn withdrawal_tax(
    ctx: &ExitContext<'_>,
    split: WithdrawalSplit,
    abatement_available: Money,
) -> ExitTax {
    let p = ctx.params;
    let gain = split.gain.max(Decimal::ZERO);
    let ps = gain * ps_rate(ctx.envelope, p);

    match ctx.envelope {
        Envelope::AssuranceVie => {
            if ctx.years_held < p.av_duree_fiscale {
                return ExitTax {
                    ir: gain * gain_rate(ctx, p.pfu_rate_ir),
                    ps,
                    abattement_utilise: Decimal::ZERO,
                };
            }
            let abattement_utilise = abatement_available.max(Decimal::ZERO).min(gain);
            let taxable = gain - abattement_utilise;
            let rate = if ctx.option_bareme {
                ctx.tmi
            } else if ctx.premiums_outstanding <= p.av_seuil_primes {
                p.av_taux_reduit
            } else {
                // Reduced rate on the share of gains tied to premiums under the threshold.
                let share = p.av_seuil_primes / ctx.premiums_outstanding;
                share * p.av_taux_reduit + (Decimal::ONE - share) * p.pfu_rate_ir
            };
            ExitTax {
                ir: taxable * rate,
                ps,
                abattement_utilise,
            }
        }
        Envelope::Per => ExitTax {
            ir: split.principal.max(Decimal::ZERO) * ctx.tmi
                + gain * gain_rate(ctx, p.per_gain_rate_ir),
            ps,
            abattement_utilise: Decimal::ZERO,
        },
        Envelope::Cto => ExitTax {
            ir: gain * gain_rate(ctx, p.pfu_rate_ir),
            ps,
            abattement_utilise: Decimal::ZERO,
        },
        Envelope::Pea => {
            let ir = if ctx.years_held >= p.pea_duree_exoneration {
                Decimal::ZERO
            } else {
                gain * gain_rate(ctx, p.pfu_rate_ir)
            };
            ExitTax {
                ir,
                ps,
                abattement_utilise: Decimal::ZERO,
            }
        }
        Envelope::Scpi => ExitTax {
            ir: gain * p.scpi_pv_rate_ir,
            ps,
            abattement_utilise: Decimal::ZERO,
        },
    }
}

/// Tax on income distributed outside a wrapper: dividends at the flat tax
/// (or the scale after the dividend abatement), SCPI rents at the marginal
/// rate plus PS.
pub fn distribution_tax(
    envelope: Envelope,
    amount: Money,
    tmi: Rate,
    option_bareme: bool,
    params: &FiscalParams,
) -> Money {
    if amount <= Decimal::ZERO || envelope.is_wrapper() {
        return Decimal::ZERO;
    }
    match envelope {
        Envelope::Cto if option_bareme => {
            amount * (Decimal::ONE - params.dividend_abatement) * tmi + amount * params.ps_rate_cto
        }
        Envelope::Cto => amount * (params.pfu_rate_ir + params.ps_rate_cto),
        Envelope::Scpi => amount * (tmi + params.ps_rate),
        Envelope::AssuranceVie | Envelope::Per | Envelope::Pea => Decimal::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ctx(envelope: Envelope, years_held: u32, premiums: Money, params: &FiscalParams) -> ExitContext<'_> {
        ExitContext {
            envelope,
            years_held,
            status: HouseholdStatus::Single,
            tmi: dec!(0.30),
            option_bareme: false,
            premiums_outstanding: premiums,
            params,
        }
    }

    #[test]
    fn test_split_orderings() {
        let v = dec!(1_000);
        let b = dec!(600);
        let pro = split_withdrawal(dec!(100), v, b, WithdrawalOrdering::Prorata);
        assert_eq!(pro, WithdrawalSplit { principal: dec!(60), gain: dec!(40) });
        let gf = split_withdrawal(dec!(500), v, b, WithdrawalOrdering::GainsFirst);
        assert_eq!(gf, WithdrawalSplit { principal: dec!(100), gain: dec!(400) });
        let cf = split_withdrawal(dec!(700), v, b, WithdrawalOrdering::CapitalFirst);
        assert_eq!(cf, WithdrawalSplit { principal: dec!(600), gain: dec!(100) });
        assert_eq!(
            split_withdrawal(dec!(10), Decimal::ZERO, b, WithdrawalOrdering::Prorata),
            WithdrawalSplit::default()
        );
    }

    #[test]
    fn test_av_before_eight_years_flat_tax() {
        let params = FiscalParams::default();
        let split = WithdrawalSplit { principal: dec!(9_000), gain: dec!(1_000) };
        let tax = withdrawal_tax(&ctx(Envelope::AssuranceVie, 5, dec!(100_000), &params), split, dec!(4_600));
        assert_eq!(tax.ir, dec!(128));
        assert_eq!(tax.ps, dec!(172));
        assert_eq!(tax.abattement_utilise, Decimal::ZERO);
    }

    #[test]
    fn test_av_after_eight_years_abatement_and_reduced_rate() {
        let params = FiscalParams::default();
        let split = WithdrawalSplit { principal: dec!(10_000), gain: dec!(6_000) };
        let tax = withdrawal_tax(&ctx(Envelope::AssuranceVie, 8, dec!(100_000), &params), split, dec!(4_600));
        assert_eq!(tax.abattement_utilise, dec!(4_600));
        assert_eq!(tax.ir, dec!(1_400) * dec!(0.075));
        assert_eq!(tax.ps, dec!(6_000) * dec!(0.172));
    }

    #[test]
    fn test_av_premiums_above_threshold_blend() {
        let params = FiscalParams::default();
        let split = WithdrawalSplit { principal: Decimal::ZERO, gain: dec!(10_000) };
        let tax = withdrawal_tax(&ctx(Envelope::AssuranceVie, 10, dec!(300_000), &params), split, Decimal::ZERO);
        // half the premiums under 150,000: 0.5 x 7.5% + 0.5 x 12.8%
        assert_eq!(tax.ir, dec!(10_000) * dec!(0.1015));
    }

    #[test]
    fn test_pea_exempt_after_holding_period() {
        let params = FiscalParams::default();
        let split = WithdrawalSplit { principal: dec!(500), gain: dec!(500) };
        let early = withdrawal_tax(&ctx(Envelope::Pea, 3, dec!(1_000), &params), split, Decimal::ZERO);
        let late = withdrawal_tax(&ctx(Envelope::Pea, 5, dec!(1_000), &params), split, Decimal::ZERO);
        assert_eq!(early.ir, dec!(64));
        assert_eq!(late.ir, Decimal::ZERO);
        assert_eq!(late.ps, dec!(86));
    }

    #[test]
    fn test_per_principal_at_marginal_rate() {
        let params = FiscalParams::default();
        let split = WithdrawalSplit { principal: dec!(1_000), gain: dec!(500) };
        let tax = withdrawal_tax(&ctx(Envelope::Per, 20, dec!(50_000), &params), split, Decimal::ZERO);
        assert_eq!(tax.ir, dec!(300) + dec!(64));
    }

    #[test]
    fn test_cto_ps_rate_is_separate() {
        let params = FiscalParams {
            ps_rate_cto: dec!(0.186),
            ..FiscalParams::default()
        };
        let split = WithdrawalSplit { principal: dec!(500), gain: dec!(500) };
        let cto = withdrawal_tax(&ctx(Envelope::Cto, 3, dec!(1_000), &params), split, Decimal::ZERO);
        let pea = withdrawal_tax(&ctx(Envelope::Pea, 3, dec!(1_000), &params), split, Decimal::ZERO);
        assert_eq!(cto.ps, dec!(93));
        assert_eq!(pea.ps, dec!(86));
        assert_eq!(distribution_tax(Envelope::Cto, dec!(1_000), dec!(0.3), false, &params), dec!(314));
    }

    #[test]
    fn test_distribution_tax_by_envelope() {
        let params = FiscalParams::default();
        assert_eq!(distribution_tax(Envelope::AssuranceVie, dec!(1_000), dec!(0.3), false, &params), Decimal::ZERO);
        assert_eq!(distribution_tax(Envelope::Cto, dec!(1_000), dec!(0.3), false, &params), dec!(300));
        assert_eq!(distribution_tax(Envelope::Scpi, dec!(1_000), dec!(0.3), false, &params), dec!(472));
        // 1,000 x 60% x 30% + 172
        assert_eq!(distribution_tax(Envelope::Cto, dec!(1_000), dec!(0.3), true, &params), dec!(352));
    }
}
