//! Tax and totals calculator.
//!
//! Pure functions over subtrip financial fields and a counterparty tax
//! profile. Customer invoicing and payout settlements use different total
//! formulas on purpose: an invoice shows shortage separately without
//! subtracting it, while driver/transporter payouts subtract it.

use crate::models::{
    AdditionalCharge, SettlementKind, SettlementSummary, Subtrip, TaxBreakup, TaxLine, TaxProfile,
};
use rust_decimal::Decimal;
use service_core::error::AppError;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Per-subtrip money facts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerSubtripTotals {
    pub freight_amount: Decimal,
    pub shortage_amount: Decimal,
    pub total_amount: Decimal,
}

/// `freight = rate × loading_weight`, `shortage = shortage_weight ×
/// shortage_rate`. The total keeps or subtracts the shortage depending on
/// the settlement kind.
pub fn per_subtrip_totals(subtrip: &Subtrip, kind: SettlementKind) -> PerSubtripTotals {
    let freight_amount =
        subtrip.rate.unwrap_or(Decimal::ZERO) * subtrip.loading_weight.unwrap_or(Decimal::ZERO);
    let shortage_amount = subtrip.shortage_weight.unwrap_or(Decimal::ZERO)
        * subtrip.shortage_rate.unwrap_or(Decimal::ZERO);

    let total_amount = match kind {
        SettlementKind::Invoice => freight_amount,
        SettlementKind::DriverSalary | SettlementKind::TransporterPayment => {
            freight_amount - shortage_amount
        }
    };

    PerSubtripTotals {
        freight_amount,
        shortage_amount,
        total_amount,
    }
}

/// Jurisdiction-aware GST breakup plus TDS for transporter profiles.
///
/// TDS is charged whenever the profile carries a `tds_percentage`,
/// independent of the GST-enabled flag. A missing state on either side of an
/// enabled GST comparison is fatal — never defaulted.
pub fn tax_breakup(
    profile: &TaxProfile,
    amount_before_tax: Decimal,
    own_state: &str,
    default_gst_rate: Decimal,
) -> Result<TaxBreakup, AppError> {
    let mut breakup = TaxBreakup::zero();

    if profile.gst_enabled {
        let own = own_state.trim();
        if own.is_empty() {
            return Err(AppError::ValidationError(anyhow::anyhow!(
                "tenant registered state is required for GST computation"
            )));
        }
        let counterparty_state = profile
            .state
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                AppError::ValidationError(anyhow::anyhow!(
                    "counterparty state is required for GST computation"
                ))
            })?;

        let base_rate = profile.gst_rate.unwrap_or(default_gst_rate);
        if own.eq_ignore_ascii_case(counterparty_state) {
            let amount = amount_before_tax * base_rate / HUNDRED;
            breakup.cgst = TaxLine {
                rate: base_rate,
                amount,
            };
            breakup.sgst = TaxLine {
                rate: base_rate,
                amount,
            };
            breakup.total_tax += amount + amount;
        } else {
            let rate = base_rate + base_rate;
            let amount = amount_before_tax * rate / HUNDRED;
            breakup.igst = TaxLine { rate, amount };
            breakup.total_tax += amount;
        }
    }

    if let Some(tds_rate) = profile.tds_percentage {
        let amount = amount_before_tax * tds_rate / HUNDRED;
        breakup.tds = Some(TaxLine {
            rate: tds_rate,
            amount,
        });
        breakup.total_tax += amount;
    }

    Ok(breakup)
}

fn charges_total(charges: &[AdditionalCharge]) -> Decimal {
    charges.iter().map(|c| c.amount).sum()
}

/// Customer invoice aggregate: `net_total = subtotal + tax + charges`.
/// Shortage is carried for display only.
pub fn invoice_summary(
    per_subtrip: &[PerSubtripTotals],
    tax: &TaxBreakup,
    additional_charges: &[AdditionalCharge],
) -> SettlementSummary {
    if per_subtrip.is_empty() && additional_charges.is_empty() {
        return SettlementSummary::zero();
    }

    let subtotal: Decimal = per_subtrip.iter().map(|t| t.total_amount).sum();
    let shortage_total: Decimal = per_subtrip.iter().map(|t| t.shortage_amount).sum();
    let additional_total = charges_total(additional_charges);

    SettlementSummary {
        subtotal,
        shortage_total,
        expense_total: Decimal::ZERO,
        taxable_amount: subtotal,
        total_tax: tax.total_tax,
        additional_total,
        net_total: subtotal + tax.total_tax + additional_total,
    }
}

/// Payout aggregate (driver salary / transporter payment):
/// `pre_tax = Σ(freight − shortage) − expenses`,
/// `net_total = pre_tax − tax − charges`.
pub fn payout_summary(
    per_subtrip: &[PerSubtripTotals],
    expense_total: Decimal,
    tax: &TaxBreakup,
    additional_charges: &[AdditionalCharge],
) -> SettlementSummary {
    if per_subtrip.is_empty() && additional_charges.is_empty() {
        return SettlementSummary::zero();
    }

    let subtotal: Decimal = per_subtrip.iter().map(|t| t.total_amount).sum();
    let shortage_total: Decimal = per_subtrip.iter().map(|t| t.shortage_amount).sum();
    let additional_total = charges_total(additional_charges);
    let pre_tax_income = subtotal - expense_total;

    SettlementSummary {
        subtotal,
        shortage_total,
        expense_total,
        taxable_amount: pre_tax_income,
        total_tax: tax.total_tax,
        additional_total,
        net_total: pre_tax_income - tax.total_tax - additional_total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    fn subtrip(rate: i64, weight: i64, shortage_weight: i64, shortage_rate: i64) -> Subtrip {
        Subtrip {
            subtrip_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            subtrip_no: "st-1".to_string(),
            trip_id: None,
            is_empty: false,
            status: "received".to_string(),
            customer_id: Uuid::new_v4(),
            vehicle_id: Uuid::new_v4(),
            driver_id: Uuid::new_v4(),
            route_id: Uuid::new_v4(),
            loading_point: "A".to_string(),
            unloading_point: "B".to_string(),
            start_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            end_date: None,
            material_name: Some("Coal".to_string()),
            loading_weight: Some(Decimal::from(weight)),
            unloading_weight: None,
            rate: Some(Decimal::from(rate)),
            shortage_weight: Some(Decimal::from(shortage_weight)),
            shortage_rate: Some(Decimal::from(shortage_rate)),
            has_error: false,
            error_remarks: None,
            invoice_id: None,
            driver_salary_id: None,
            transporter_payment_id: None,
            remarks: None,
            created_utc: Utc::now(),
        }
    }

    fn gst_profile(state: &str, rate: i64) -> TaxProfile {
        TaxProfile {
            gst_enabled: true,
            state: Some(state.to_string()),
            gst_rate: Some(Decimal::from(rate)),
            tds_percentage: None,
        }
    }

    #[test]
    fn invoice_total_keeps_shortage_separate() {
        let totals = per_subtrip_totals(&subtrip(500, 20, 2, 100), SettlementKind::Invoice);
        assert_eq!(totals.freight_amount, Decimal::from(10_000));
        assert_eq!(totals.shortage_amount, Decimal::from(200));
        assert_eq!(totals.total_amount, Decimal::from(10_000));
    }

    #[test]
    fn payout_total_subtracts_shortage() {
        for kind in [SettlementKind::DriverSalary, SettlementKind::TransporterPayment] {
            let totals = per_subtrip_totals(&subtrip(500, 20, 2, 100), kind);
            assert_eq!(totals.total_amount, Decimal::from(9_800));
        }
    }

    #[test]
    fn missing_financials_default_to_zero() {
        let mut st = subtrip(0, 0, 0, 0);
        st.rate = None;
        st.loading_weight = None;
        st.shortage_weight = None;
        st.shortage_rate = None;
        let totals = per_subtrip_totals(&st, SettlementKind::Invoice);
        assert_eq!(totals.total_amount, Decimal::ZERO);
    }

    #[test]
    fn intra_state_splits_into_cgst_and_sgst() {
        let breakup = tax_breakup(
            &gst_profile("Rajasthan", 6),
            Decimal::from(10_000),
            "Rajasthan",
            Decimal::from(6),
        )
        .unwrap();

        assert_eq!(breakup.cgst.amount, Decimal::from(600));
        assert_eq!(breakup.sgst.amount, Decimal::from(600));
        assert_eq!(breakup.igst.amount, Decimal::ZERO);
        assert_eq!(breakup.total_tax, Decimal::from(1_200));
    }

    #[test]
    fn inter_state_charges_igst_at_double_rate() {
        let breakup = tax_breakup(
            &gst_profile("Gujarat", 6),
            Decimal::from(10_000),
            "Rajasthan",
            Decimal::from(6),
        )
        .unwrap();

        assert_eq!(breakup.cgst.amount, Decimal::ZERO);
        assert_eq!(breakup.sgst.amount, Decimal::ZERO);
        assert_eq!(breakup.igst.rate, Decimal::from(12));
        assert_eq!(breakup.igst.amount, Decimal::from(1_200));
        assert_eq!(breakup.total_tax, Decimal::from(1_200));
    }

    #[test]
    fn state_comparison_is_trimmed_and_case_insensitive() {
        let breakup = tax_breakup(
            &gst_profile("  rajasthan ", 6),
            Decimal::from(1_000),
            "RAJASTHAN",
            Decimal::from(6),
        )
        .unwrap();
        assert_eq!(breakup.igst.amount, Decimal::ZERO);
        assert_eq!(breakup.cgst.amount, Decimal::from(60));
    }

    #[test]
    fn missing_state_is_fatal_not_defaulted() {
        let mut profile = gst_profile("Rajasthan", 6);
        profile.state = None;
        let err = tax_breakup(&profile, Decimal::from(1_000), "Rajasthan", Decimal::from(6));
        assert!(matches!(err, Err(AppError::ValidationError(_))));

        let err = tax_breakup(
            &gst_profile("Rajasthan", 6),
            Decimal::from(1_000),
            "   ",
            Decimal::from(6),
        );
        assert!(matches!(err, Err(AppError::ValidationError(_))));
    }

    #[test]
    fn gst_disabled_zeroes_gst_but_keeps_tds() {
        let profile = TaxProfile {
            gst_enabled: false,
            state: None,
            gst_rate: None,
            tds_percentage: Some(Decimal::from(2)),
        };
        let breakup = tax_breakup(&profile, Decimal::from(10_000), "Rajasthan", Decimal::from(6))
            .unwrap();

        assert_eq!(breakup.cgst.amount, Decimal::ZERO);
        assert_eq!(breakup.igst.amount, Decimal::ZERO);
        assert_eq!(breakup.tds.unwrap().amount, Decimal::from(200));
        assert_eq!(breakup.total_tax, Decimal::from(200));
    }

    #[test]
    fn tds_applies_on_top_of_gst() {
        let profile = TaxProfile {
            gst_enabled: true,
            state: Some("Gujarat".to_string()),
            gst_rate: Some(Decimal::from(6)),
            tds_percentage: Some(Decimal::from(1)),
        };
        let breakup = tax_breakup(&profile, Decimal::from(10_000), "Rajasthan", Decimal::from(6))
            .unwrap();

        assert_eq!(breakup.igst.amount, Decimal::from(1_200));
        assert_eq!(breakup.tds.unwrap().amount, Decimal::from(100));
        assert_eq!(breakup.total_tax, Decimal::from(1_300));
    }

    #[test]
    fn default_rate_used_when_profile_has_none() {
        let mut profile = gst_profile("Rajasthan", 0);
        profile.gst_rate = None;
        let breakup = tax_breakup(&profile, Decimal::from(1_000), "Rajasthan", Decimal::from(9))
            .unwrap();
        assert_eq!(breakup.cgst.rate, Decimal::from(9));
        assert_eq!(breakup.cgst.amount, Decimal::from(90));
    }

    #[test]
    fn invoice_summary_adds_tax_and_charges() {
        let per = vec![
            per_subtrip_totals(&subtrip(500, 20, 2, 100), SettlementKind::Invoice),
            per_subtrip_totals(&subtrip(400, 10, 0, 0), SettlementKind::Invoice),
        ];
        let tax = tax_breakup(
            &gst_profile("Rajasthan", 6),
            Decimal::from(14_000),
            "Rajasthan",
            Decimal::from(6),
        )
        .unwrap();
        let charges = vec![AdditionalCharge {
            label: "detention".to_string(),
            amount: Decimal::from(500),
        }];

        let summary = invoice_summary(&per, &tax, &charges);
        assert_eq!(summary.subtotal, Decimal::from(14_000));
        assert_eq!(summary.shortage_total, Decimal::from(200));
        assert_eq!(summary.total_tax, Decimal::from(1_680));
        assert_eq!(summary.net_total, Decimal::from(16_180));
    }

    #[test]
    fn payout_summary_subtracts_expenses_tax_and_charges() {
        let per = vec![per_subtrip_totals(
            &subtrip(500, 20, 2, 100),
            SettlementKind::TransporterPayment,
        )];
        let profile = TaxProfile {
            gst_enabled: false,
            state: None,
            gst_rate: None,
            tds_percentage: Some(Decimal::from(2)),
        };
        let expense_total = Decimal::from(800);
        let pre_tax = Decimal::from(9_800) - expense_total;
        let tax = tax_breakup(&profile, pre_tax, "Rajasthan", Decimal::from(6)).unwrap();
        let charges = vec![AdditionalCharge {
            label: "loan installment".to_string(),
            amount: Decimal::from(1_000),
        }];

        let summary = payout_summary(&per, expense_total, &tax, &charges);
        assert_eq!(summary.taxable_amount, Decimal::from(9_000));
        assert_eq!(summary.total_tax, Decimal::from(180));
        assert_eq!(summary.net_total, Decimal::from(7_820));
    }

    #[test]
    fn empty_input_yields_all_zero_summary() {
        let tax = TaxBreakup::zero();
        assert_eq!(invoice_summary(&[], &tax, &[]), SettlementSummary::zero());
        assert_eq!(
            payout_summary(&[], Decimal::ZERO, &tax, &[]),
            SettlementSummary::zero()
        );
    }
}
