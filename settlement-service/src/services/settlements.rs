//! Settlement document engine: customer invoices, driver salary receipts
//! and transporter payment receipts.
//!
//! All three kinds share one claim protocol: lock the requested subtrips,
//! re-check eligibility under the lock, freeze a financial snapshot, write
//! the document and stamp the claim column — in a single transaction.
//! Anything less than full coverage of the request aborts with a partial
//! eligibility error and no writes.

use crate::models::{
    CreateInvoice, CreatePayout, EventType, Invoice, InvoicePayment, InvoiceStatus,
    ListSettlementsFilter, PayoutReceipt, ReceiptStatus, SettlementKind, Subtrip, SubtripSnapshot,
    TaxProfile,
};
use crate::services::database::{Database, SUBTRIP_COLUMNS};
use crate::services::metrics::{DB_QUERY_DURATION, SETTLED_AMOUNT_TOTAL, SETTLEMENTS_TOTAL};
use crate::services::tax;
use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::types::Json;
use sqlx::{Postgres, Transaction};
use std::collections::HashMap;
use tracing::{info, instrument};
use uuid::Uuid;

const INVOICE_COLUMNS: &str = "invoice_id, tenant_id, invoice_no, customer_id, customer_name, \
    associated_subtrips, subtrip_snapshot, tax, additional_charges, subtotal, shortage_total, \
    total_tax, additional_total, net_total, total_received, status, issue_date, due_date, \
    created_utc, cancelled_utc";

const PAYOUT_COLUMNS: &str = "receipt_id, tenant_id, receipt_no, counterparty_id, \
    counterparty_name, associated_subtrips, subtrip_snapshot, tax, additional_charges, subtotal, \
    shortage_total, expense_total, total_tax, additional_total, net_total, status, paid_date, \
    payment_mode, created_utc, cancelled_utc";

const DEFAULT_INVOICE_PREFIX: &str = "INV-";

/// The two payout instantiations of the settlement engine. They differ only
/// in the claim column, the counterparty and the eligibility gate; the claim
/// protocol itself is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayoutKind {
    DriverSalary,
    TransporterPayment,
}

impl PayoutKind {
    pub fn settlement_kind(&self) -> SettlementKind {
        match self {
            PayoutKind::DriverSalary => SettlementKind::DriverSalary,
            PayoutKind::TransporterPayment => SettlementKind::TransporterPayment,
        }
    }

    pub(crate) fn table(&self) -> &'static str {
        match self {
            PayoutKind::DriverSalary => "driver_salary_receipts",
            PayoutKind::TransporterPayment => "transporter_payment_receipts",
        }
    }

    pub(crate) fn claim_column(&self) -> &'static str {
        match self {
            PayoutKind::DriverSalary => "driver_salary_id",
            PayoutKind::TransporterPayment => "transporter_payment_id",
        }
    }

    pub(crate) fn receipt_prefix(&self) -> &'static str {
        match self {
            PayoutKind::DriverSalary => "DSR-",
            PayoutKind::TransporterPayment => "TPR-",
        }
    }

    pub(crate) fn sequence_model(&self) -> &'static str {
        match self {
            PayoutKind::DriverSalary => "driver_salary",
            PayoutKind::TransporterPayment => "transporter_payment",
        }
    }

    fn generated_event(&self) -> EventType {
        match self {
            PayoutKind::DriverSalary => EventType::DriverSalaryGenerated,
            PayoutKind::TransporterPayment => EventType::TransporterPaymentGenerated,
        }
    }

    fn deleted_event(&self) -> EventType {
        match self {
            PayoutKind::DriverSalary => EventType::DriverSalaryDeleted,
            PayoutKind::TransporterPayment => EventType::TransporterPaymentDeleted,
        }
    }
}

fn aliased_subtrip_columns(alias: &str) -> String {
    SUBTRIP_COLUMNS
        .split(", ")
        .map(|column| format!("{alias}.{column}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Fails with `PartialEligibility` (naming the exact ineligible IDs) unless
/// every requested subtrip came back from the locked eligibility query.
fn ensure_full_coverage(requested: &[Uuid], eligible: &[Subtrip]) -> Result<(), AppError> {
    if eligible.len() == requested.len() {
        return Ok(());
    }
    let missing: Vec<Uuid> = requested
        .iter()
        .filter(|id| !eligible.iter().any(|s| s.subtrip_id == **id))
        .copied()
        .collect();
    Err(AppError::PartialEligibility {
        requested: requested.len(),
        eligible: eligible.len(),
        missing,
    })
}

fn validate_subtrip_ids(subtrip_ids: &[Uuid]) -> Result<Vec<Uuid>, AppError> {
    let mut ids = subtrip_ids.to_vec();
    ids.sort();
    ids.dedup();
    if ids.is_empty() {
        return Err(AppError::ValidationError(anyhow::anyhow!(
            "at least one subtrip is required"
        )));
    }
    Ok(ids)
}

fn build_snapshots(
    subtrips: &[Subtrip],
    kind: SettlementKind,
    vehicle_numbers: &HashMap<Uuid, String>,
    expense_totals: &HashMap<Uuid, Decimal>,
) -> (Vec<SubtripSnapshot>, Vec<tax::PerSubtripTotals>) {
    let mut snapshots = Vec::with_capacity(subtrips.len());
    let mut per_totals = Vec::with_capacity(subtrips.len());

    for subtrip in subtrips {
        let totals = tax::per_subtrip_totals(subtrip, kind);
        snapshots.push(SubtripSnapshot {
            subtrip_id: subtrip.subtrip_id,
            subtrip_no: subtrip.subtrip_no.clone(),
            vehicle_no: vehicle_numbers
                .get(&subtrip.vehicle_id)
                .cloned()
                .unwrap_or_default(),
            loading_point: subtrip.loading_point.clone(),
            unloading_point: subtrip.unloading_point.clone(),
            start_date: subtrip.start_date,
            material_name: subtrip.material_name.clone(),
            loading_weight: subtrip.loading_weight.unwrap_or(Decimal::ZERO),
            unloading_weight: subtrip.unloading_weight,
            rate: subtrip.rate.unwrap_or(Decimal::ZERO),
            freight_amount: totals.freight_amount,
            shortage_amount: totals.shortage_amount,
            expense_total: expense_totals
                .get(&subtrip.subtrip_id)
                .copied()
                .unwrap_or(Decimal::ZERO),
            total_amount: totals.total_amount,
        });
        per_totals.push(totals);
    }

    (snapshots, per_totals)
}

impl Database {
    // -------------------------------------------------------------------------
    // Claim protocol helpers
    // -------------------------------------------------------------------------

    /// Lock the requested subtrips and return only those eligible for
    /// invoicing: received, unclaimed for invoicing, belonging to the
    /// invoice's customer.
    async fn lock_eligible_for_invoice(
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: Uuid,
        customer_id: Uuid,
        subtrip_ids: &[Uuid],
    ) -> Result<Vec<Subtrip>, AppError> {
        sqlx::query_as::<_, Subtrip>(&format!(
            r#"
            SELECT {SUBTRIP_COLUMNS}
            FROM subtrips
            WHERE tenant_id = $1 AND subtrip_id = ANY($2)
              AND status = 'received' AND invoice_id IS NULL AND customer_id = $3
            ORDER BY subtrip_id
            FOR UPDATE
            "#,
        ))
        .bind(tenant_id)
        .bind(subtrip_ids)
        .bind(customer_id)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to lock subtrips: {}", e))
        })
    }

    /// Lock the requested subtrips and return only those eligible for the
    /// payout kind. Driver salaries require tenant-owned vehicles;
    /// transporter payments require market vehicles of that transporter.
    /// Both accept received and already-billed subtrips.
    async fn lock_eligible_for_payout(
        tx: &mut Transaction<'_, Postgres>,
        kind: PayoutKind,
        tenant_id: Uuid,
        counterparty_id: Uuid,
        subtrip_ids: &[Uuid],
    ) -> Result<Vec<Subtrip>, AppError> {
        let columns = aliased_subtrip_columns("s");
        let claim = kind.claim_column();
        let gate = match kind {
            PayoutKind::DriverSalary => "s.driver_id = $3 AND v.is_own = TRUE",
            PayoutKind::TransporterPayment => "v.is_own = FALSE AND v.transporter_id = $3",
        };

        sqlx::query_as::<_, Subtrip>(&format!(
            r#"
            SELECT {columns}
            FROM subtrips s
            JOIN vehicles v ON v.tenant_id = s.tenant_id AND v.vehicle_id = s.vehicle_id
            WHERE s.tenant_id = $1 AND s.subtrip_id = ANY($2)
              AND s.status IN ('received', 'billed') AND s.{claim} IS NULL
              AND {gate}
            ORDER BY s.subtrip_id
            FOR UPDATE OF s
            "#,
        ))
        .bind(tenant_id)
        .bind(subtrip_ids)
        .bind(counterparty_id)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to lock subtrips: {}", e))
        })
    }

    async fn expense_totals_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: Uuid,
        subtrip_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Decimal>, AppError> {
        let rows: Vec<(Uuid, Decimal)> = sqlx::query_as(
            r#"
            SELECT subtrip_id, COALESCE(SUM(amount), 0) AS total
            FROM expenses
            WHERE tenant_id = $1 AND subtrip_id = ANY($2)
            GROUP BY subtrip_id
            "#,
        )
        .bind(tenant_id)
        .bind(subtrip_ids)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to sum expenses: {}", e))
        })?;
        Ok(rows.into_iter().collect())
    }

    async fn vehicle_numbers_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: Uuid,
        subtrips: &[Subtrip],
    ) -> Result<HashMap<Uuid, String>, AppError> {
        let vehicle_ids: Vec<Uuid> = subtrips.iter().map(|s| s.vehicle_id).collect();
        let rows: Vec<(Uuid, String)> = sqlx::query_as(
            "SELECT vehicle_id, vehicle_no FROM vehicles \
             WHERE tenant_id = $1 AND vehicle_id = ANY($2)",
        )
        .bind(tenant_id)
        .bind(&vehicle_ids)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load vehicles: {}", e))
        })?;
        Ok(rows.into_iter().collect())
    }

    // -------------------------------------------------------------------------
    // Invoices
    // -------------------------------------------------------------------------

    /// Create one invoice as its own transaction.
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id, customer_id = %input.customer_id))]
    pub async fn create_invoice(
        &self,
        input: &CreateInvoice,
        default_gst_rate: Decimal,
        user_id: Option<Uuid>,
    ) -> Result<Invoice, AppError> {
        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;
        let invoice = self
            .create_invoice_in_tx(&mut tx, input, default_gst_rate, user_id)
            .await?;
        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;
        Ok(invoice)
    }

    /// Create several invoices atomically: one failure rolls back the whole
    /// batch.
    #[instrument(skip(self, inputs), fields(count = inputs.len()))]
    pub async fn create_invoices_bulk(
        &self,
        inputs: &[CreateInvoice],
        default_gst_rate: Decimal,
        user_id: Option<Uuid>,
    ) -> Result<Vec<Invoice>, AppError> {
        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;
        let mut invoices = Vec::with_capacity(inputs.len());
        for input in inputs {
            invoices.push(
                self.create_invoice_in_tx(&mut tx, input, default_gst_rate, user_id)
                    .await?,
            );
        }
        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;
        Ok(invoices)
    }

    async fn create_invoice_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        input: &CreateInvoice,
        default_gst_rate: Decimal,
        user_id: Option<Uuid>,
    ) -> Result<Invoice, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_invoice"])
            .start_timer();

        let subtrip_ids = validate_subtrip_ids(&input.subtrip_ids)?;

        let tenant = self
            .get_tenant(input.tenant_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("tenant not found")))?;
        let customer = self
            .get_customer(input.tenant_id, input.customer_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("customer {} not found", input.customer_id))
            })?;

        let eligible =
            Self::lock_eligible_for_invoice(tx, input.tenant_id, input.customer_id, &subtrip_ids)
                .await?;
        ensure_full_coverage(&subtrip_ids, &eligible)?;

        let expense_totals =
            Self::expense_totals_in_tx(tx, input.tenant_id, &subtrip_ids).await?;
        let vehicle_numbers =
            Self::vehicle_numbers_in_tx(tx, input.tenant_id, &eligible).await?;
        let (snapshots, per_totals) = build_snapshots(
            &eligible,
            SettlementKind::Invoice,
            &vehicle_numbers,
            &expense_totals,
        );

        let subtotal: Decimal = per_totals.iter().map(|t| t.total_amount).sum();
        let own_state = tenant.state.unwrap_or_default();
        let breakup = tax::tax_breakup(
            &TaxProfile::of_customer(&customer),
            subtotal,
            &own_state,
            default_gst_rate,
        )?;
        let summary = tax::invoice_summary(&per_totals, &breakup, &input.additional_charges);

        let seq = Self::next_sequence_on(&mut **tx, input.tenant_id, "invoice").await?;
        let invoice_no = format!(
            "{}{}{}",
            customer
                .invoice_prefix
                .as_deref()
                .unwrap_or(DEFAULT_INVOICE_PREFIX),
            seq,
            customer.invoice_suffix.as_deref().unwrap_or("")
        );
        let due_date = customer
            .invoice_pay_within
            .map(|days| input.issue_date + Duration::days(days as i64));

        let invoice_id = Uuid::new_v4();
        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            INSERT INTO invoices (
                invoice_id, tenant_id, invoice_no, customer_id, customer_name,
                associated_subtrips, subtrip_snapshot, tax, additional_charges,
                subtotal, shortage_total, total_tax, additional_total, net_total,
                total_received, status, issue_date, due_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, 0, 'pending', $15, $16)
            RETURNING {INVOICE_COLUMNS}
            "#,
        ))
        .bind(invoice_id)
        .bind(input.tenant_id)
        .bind(&invoice_no)
        .bind(customer.customer_id)
        .bind(&customer.name)
        .bind(&subtrip_ids)
        .bind(Json(&snapshots))
        .bind(Json(&breakup))
        .bind(Json(&input.additional_charges))
        .bind(summary.subtotal)
        .bind(summary.shortage_total)
        .bind(summary.total_tax)
        .bind(summary.additional_total)
        .bind(summary.net_total)
        .bind(input.issue_date)
        .bind(due_date)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create invoice: {}", e)))?;

        // Invoicing is the terminal claim: it also moves the subtrips to
        // billed.
        sqlx::query(
            "UPDATE subtrips SET invoice_id = $3, status = 'billed' \
             WHERE tenant_id = $1 AND subtrip_id = ANY($2)",
        )
        .bind(input.tenant_id)
        .bind(&subtrip_ids)
        .bind(invoice_id)
        .execute(&mut **tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to claim subtrips: {}", e)))?;

        for subtrip_id in &subtrip_ids {
            Self::record_event_on(
                &mut **tx,
                input.tenant_id,
                *subtrip_id,
                EventType::InvoiceGenerated,
                serde_json::json!({ "invoice_no": invoice_no }),
                user_id,
            )
            .await?;
        }

        timer.observe_duration();
        SETTLEMENTS_TOTAL
            .with_label_values(&["invoice", "created"])
            .inc();
        SETTLED_AMOUNT_TOTAL
            .with_label_values(&["invoice"])
            .inc_by(summary.net_total.to_f64().unwrap_or(0.0));

        info!(invoice_no = %invoice.invoice_no, net_total = %invoice.net_total, "Invoice created");

        Ok(invoice)
    }

    /// Get an invoice by ID.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    pub async fn get_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE tenant_id = $1 AND invoice_id = $2",
        ))
        .bind(tenant_id)
        .bind(invoice_id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?;
        Ok(invoice)
    }

    /// List invoices for a tenant.
    #[instrument(skip(self, filter), fields(tenant_id = %tenant_id))]
    pub async fn list_invoices(
        &self,
        tenant_id: Uuid,
        filter: &ListSettlementsFilter,
    ) -> Result<Vec<Invoice>, AppError> {
        let limit = filter.page_size.clamp(1, 100) as i64;
        let cursor = filter.page_token.unwrap_or(Uuid::nil());

        let invoices = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            SELECT {INVOICE_COLUMNS}
            FROM invoices
            WHERE tenant_id = $1
              AND ($2::varchar IS NULL OR status = $2)
              AND ($3::uuid IS NULL OR customer_id = $3)
              AND ($4::date IS NULL OR issue_date >= $4)
              AND ($5::date IS NULL OR issue_date <= $5)
              AND invoice_id > $6
            ORDER BY invoice_id
            LIMIT $7
            "#,
        ))
        .bind(tenant_id)
        .bind(&filter.status)
        .bind(filter.counterparty_id)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(cursor)
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list invoices: {}", e)))?;
        Ok(invoices)
    }

    /// Payments recorded against an invoice, oldest first.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    pub async fn list_invoice_payments(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Vec<InvoicePayment>, AppError> {
        let payments = sqlx::query_as::<_, InvoicePayment>(
            r#"
            SELECT payment_id, tenant_id, invoice_id, amount, payment_date, payment_mode,
                payment_reference, created_utc
            FROM invoice_payments
            WHERE tenant_id = $1 AND invoice_id = $2
            ORDER BY created_utc, payment_id
            "#,
        )
        .bind(tenant_id)
        .bind(invoice_id)
        .fetch_all(self.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list payments: {}", e)))?;
        Ok(payments)
    }

    /// Record a partial or full payment against an invoice. Overpayment is
    /// rejected against the outstanding balance under the row lock.
    #[instrument(skip(self, user_id), fields(tenant_id = %tenant_id, invoice_id = %invoice_id, amount = %amount))]
    pub async fn record_payment(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        amount: Decimal,
        payment_date: NaiveDate,
        payment_mode: &str,
        payment_reference: Option<String>,
        user_id: Option<Uuid>,
    ) -> Result<(Invoice, InvoicePayment), AppError> {
        if amount <= Decimal::ZERO {
            return Err(AppError::ValidationError(anyhow::anyhow!(
                "payment amount must be positive"
            )));
        }

        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices \
             WHERE tenant_id = $1 AND invoice_id = $2 FOR UPDATE",
        ))
        .bind(tenant_id)
        .bind(invoice_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch invoice: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("invoice {} not found", invoice_id)))?;

        if invoice.status() == InvoiceStatus::Cancelled {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "invoice {} is cancelled",
                invoice.invoice_no
            )));
        }

        let outstanding = invoice.outstanding();
        if amount > outstanding {
            return Err(AppError::Overpayment {
                attempted: amount,
                outstanding,
            });
        }

        let payment = sqlx::query_as::<_, InvoicePayment>(
            r#"
            INSERT INTO invoice_payments (
                payment_id, tenant_id, invoice_id, amount, payment_date, payment_mode,
                payment_reference
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING payment_id, tenant_id, invoice_id, amount, payment_date, payment_mode,
                payment_reference, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(invoice_id)
        .bind(amount)
        .bind(payment_date)
        .bind(payment_mode)
        .bind(&payment_reference)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to record payment: {}", e)))?;

        let next_status = InvoiceStatus::after_payment(outstanding - amount);
        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            UPDATE invoices
            SET total_received = total_received + $3, status = $4
            WHERE tenant_id = $1 AND invoice_id = $2
            RETURNING {INVOICE_COLUMNS}
            "#,
        ))
        .bind(tenant_id)
        .bind(invoice_id)
        .bind(amount)
        .bind(next_status.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update invoice: {}", e)))?;

        for subtrip_id in &invoice.associated_subtrips {
            Self::record_event_on(
                &mut *tx,
                tenant_id,
                *subtrip_id,
                EventType::InvoicePaid,
                serde_json::json!({ "invoice_no": invoice.invoice_no, "amount": amount }),
                user_id,
            )
            .await?;
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        SETTLEMENTS_TOTAL
            .with_label_values(&["invoice", "paid"])
            .inc();

        info!(invoice_no = %invoice.invoice_no, amount = %amount, "Payment recorded");

        Ok((invoice, payment))
    }

    /// Sweep pending and partially paid invoices past their due date into
    /// `overdue`. Returns the number of invoices marked.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn mark_overdue_invoices(
        &self,
        tenant_id: Uuid,
        as_of: NaiveDate,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET status = 'overdue'
            WHERE tenant_id = $1
              AND status IN ('pending', 'partial_received')
              AND due_date IS NOT NULL AND due_date < $2
            "#,
        )
        .bind(tenant_id)
        .bind(as_of)
        .execute(self.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to mark overdue: {}", e)))?;

        if result.rows_affected() > 0 {
            info!(count = result.rows_affected(), "Invoices marked overdue");
        }

        Ok(result.rows_affected())
    }

    /// Cancel an invoice, keeping the row and its payment history for the
    /// books. Releases the claimed subtrips back to `received`.
    #[instrument(skip(self, user_id), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    pub async fn cancel_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        user_id: Option<Uuid>,
    ) -> Result<Invoice, AppError> {
        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let invoice = Self::fetch_invoice_for_release(&mut tx, tenant_id, invoice_id).await?;

        let cancelled = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            UPDATE invoices
            SET status = 'cancelled', cancelled_utc = $3
            WHERE tenant_id = $1 AND invoice_id = $2
            RETURNING {INVOICE_COLUMNS}
            "#,
        ))
        .bind(tenant_id)
        .bind(invoice_id)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to cancel invoice: {}", e)))?;

        Self::release_invoice_claims(&mut tx, tenant_id, invoice_id, &invoice, user_id).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        SETTLEMENTS_TOTAL
            .with_label_values(&["invoice", "cancelled"])
            .inc();

        info!(invoice_no = %cancelled.invoice_no, "Invoice cancelled");

        Ok(cancelled)
    }

    /// Delete an invoice outright. Same payment gate as cancellation; the
    /// claimed subtrips return to `received` as if the invoice never existed.
    #[instrument(skip(self, user_id), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    pub async fn delete_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        user_id: Option<Uuid>,
    ) -> Result<bool, AppError> {
        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let invoice = match sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices \
             WHERE tenant_id = $1 AND invoice_id = $2 FOR UPDATE",
        ))
        .bind(tenant_id)
        .bind(invoice_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch invoice: {}", e)))?
        {
            Some(invoice) => invoice,
            None => return Ok(false),
        };

        if invoice.total_received > Decimal::ZERO {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "invoice {} has received payments",
                invoice.invoice_no
            )));
        }

        sqlx::query("DELETE FROM invoices WHERE tenant_id = $1 AND invoice_id = $2")
            .bind(tenant_id)
            .bind(invoice_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete invoice: {}", e))
            })?;

        Self::release_invoice_claims(&mut tx, tenant_id, invoice_id, &invoice, user_id).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        SETTLEMENTS_TOTAL
            .with_label_values(&["invoice", "deleted"])
            .inc();

        info!(invoice_no = %invoice.invoice_no, "Invoice deleted");

        Ok(true)
    }

    async fn fetch_invoice_for_release(
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Invoice, AppError> {
        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices \
             WHERE tenant_id = $1 AND invoice_id = $2 FOR UPDATE",
        ))
        .bind(tenant_id)
        .bind(invoice_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch invoice: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("invoice {} not found", invoice_id)))?;

        // Payments do not block cancellation: cancelling a paid invoice is a
        // status change that keeps the payment history.
        if invoice.status() == InvoiceStatus::Cancelled {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "invoice {} is already cancelled",
                invoice.invoice_no
            )));
        }

        Ok(invoice)
    }

    async fn release_invoice_claims(
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: Uuid,
        invoice_id: Uuid,
        invoice: &Invoice,
        user_id: Option<Uuid>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE subtrips SET invoice_id = NULL, status = 'received' \
             WHERE tenant_id = $1 AND invoice_id = $2",
        )
        .bind(tenant_id)
        .bind(invoice_id)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to release subtrips: {}", e))
        })?;

        for subtrip_id in &invoice.associated_subtrips {
            Self::record_event_on(
                &mut **tx,
                tenant_id,
                *subtrip_id,
                EventType::InvoiceDeleted,
                serde_json::json!({ "invoice_no": invoice.invoice_no }),
                user_id,
            )
            .await?;
        }

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Payout receipts (driver salary / transporter payment)
    // -------------------------------------------------------------------------

    /// Create one payout receipt as its own transaction.
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id, counterparty_id = %input.counterparty_id))]
    pub async fn create_payout(
        &self,
        kind: PayoutKind,
        input: &CreatePayout,
        default_gst_rate: Decimal,
        user_id: Option<Uuid>,
    ) -> Result<PayoutReceipt, AppError> {
        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;
        let receipt = self
            .create_payout_in_tx(&mut tx, kind, input, default_gst_rate, user_id)
            .await?;
        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;
        Ok(receipt)
    }

    /// Create several payout receipts atomically.
    #[instrument(skip(self, inputs), fields(count = inputs.len()))]
    pub async fn create_payouts_bulk(
        &self,
        kind: PayoutKind,
        inputs: &[CreatePayout],
        default_gst_rate: Decimal,
        user_id: Option<Uuid>,
    ) -> Result<Vec<PayoutReceipt>, AppError> {
        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;
        let mut receipts = Vec::with_capacity(inputs.len());
        for input in inputs {
            receipts.push(
                self.create_payout_in_tx(&mut tx, kind, input, default_gst_rate, user_id)
                    .await?,
            );
        }
        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;
        Ok(receipts)
    }

    async fn create_payout_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        kind: PayoutKind,
        input: &CreatePayout,
        default_gst_rate: Decimal,
        user_id: Option<Uuid>,
    ) -> Result<PayoutReceipt, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_payout"])
            .start_timer();

        let subtrip_ids = validate_subtrip_ids(&input.subtrip_ids)?;

        let tenant = self
            .get_tenant(input.tenant_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("tenant not found")))?;

        let (counterparty_name, profile) = match kind {
            PayoutKind::DriverSalary => {
                let driver = self
                    .get_driver(input.tenant_id, input.counterparty_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::NotFound(anyhow::anyhow!(
                            "driver {} not found",
                            input.counterparty_id
                        ))
                    })?;
                (driver.name, TaxProfile::of_driver())
            }
            PayoutKind::TransporterPayment => {
                let transporter = self
                    .get_transporter(input.tenant_id, input.counterparty_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::NotFound(anyhow::anyhow!(
                            "transporter {} not found",
                            input.counterparty_id
                        ))
                    })?;
                let profile = TaxProfile::of_transporter(&transporter);
                (transporter.name, profile)
            }
        };

        let eligible = Self::lock_eligible_for_payout(
            tx,
            kind,
            input.tenant_id,
            input.counterparty_id,
            &subtrip_ids,
        )
        .await?;
        ensure_full_coverage(&subtrip_ids, &eligible)?;

        let expense_totals =
            Self::expense_totals_in_tx(tx, input.tenant_id, &subtrip_ids).await?;
        let vehicle_numbers =
            Self::vehicle_numbers_in_tx(tx, input.tenant_id, &eligible).await?;
        let (snapshots, per_totals) = build_snapshots(
            &eligible,
            kind.settlement_kind(),
            &vehicle_numbers,
            &expense_totals,
        );

        let expense_total: Decimal = expense_totals.values().copied().sum();
        let subtotal: Decimal = per_totals.iter().map(|t| t.total_amount).sum();
        let pre_tax_income = subtotal - expense_total;
        let own_state = tenant.state.unwrap_or_default();
        let breakup = tax::tax_breakup(&profile, pre_tax_income, &own_state, default_gst_rate)?;
        let summary = tax::payout_summary(
            &per_totals,
            expense_total,
            &breakup,
            &input.additional_charges,
        );

        let seq = Self::next_sequence_on(&mut **tx, input.tenant_id, kind.sequence_model()).await?;
        let receipt_no = format!("{}{}", kind.receipt_prefix(), seq);
        let receipt_id = Uuid::new_v4();
        let table = kind.table();

        let receipt = sqlx::query_as::<_, PayoutReceipt>(&format!(
            r#"
            INSERT INTO {table} (
                receipt_id, tenant_id, receipt_no, counterparty_id, counterparty_name,
                associated_subtrips, subtrip_snapshot, tax, additional_charges,
                subtotal, shortage_total, expense_total, total_tax, additional_total, net_total,
                status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, 'generated')
            RETURNING {PAYOUT_COLUMNS}
            "#,
        ))
        .bind(receipt_id)
        .bind(input.tenant_id)
        .bind(&receipt_no)
        .bind(input.counterparty_id)
        .bind(&counterparty_name)
        .bind(&subtrip_ids)
        .bind(Json(&snapshots))
        .bind(Json(&breakup))
        .bind(Json(&input.additional_charges))
        .bind(summary.subtotal)
        .bind(summary.shortage_total)
        .bind(summary.expense_total)
        .bind(summary.total_tax)
        .bind(summary.additional_total)
        .bind(summary.net_total)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create receipt: {}", e)))?;

        // Payout claims stamp their column only; the subtrip status is owned
        // by invoicing and the empty-leg close.
        sqlx::query(&format!(
            "UPDATE subtrips SET {} = $3 WHERE tenant_id = $1 AND subtrip_id = ANY($2)",
            kind.claim_column()
        ))
        .bind(input.tenant_id)
        .bind(&subtrip_ids)
        .bind(receipt_id)
        .execute(&mut **tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to claim subtrips: {}", e)))?;

        for subtrip_id in &subtrip_ids {
            Self::record_event_on(
                &mut **tx,
                input.tenant_id,
                *subtrip_id,
                kind.generated_event(),
                serde_json::json!({ "receipt_no": receipt_no }),
                user_id,
            )
            .await?;
        }

        timer.observe_duration();
        SETTLEMENTS_TOTAL
            .with_label_values(&[kind.settlement_kind().as_str(), "created"])
            .inc();
        SETTLED_AMOUNT_TOTAL
            .with_label_values(&[kind.settlement_kind().as_str()])
            .inc_by(summary.net_total.to_f64().unwrap_or(0.0));

        info!(receipt_no = %receipt.receipt_no, net_total = %receipt.net_total, "Payout receipt created");

        Ok(receipt)
    }

    /// Get a payout receipt by ID.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, receipt_id = %receipt_id))]
    pub async fn get_payout(
        &self,
        kind: PayoutKind,
        tenant_id: Uuid,
        receipt_id: Uuid,
    ) -> Result<Option<PayoutReceipt>, AppError> {
        let receipt = sqlx::query_as::<_, PayoutReceipt>(&format!(
            "SELECT {PAYOUT_COLUMNS} FROM {} WHERE tenant_id = $1 AND receipt_id = $2",
            kind.table()
        ))
        .bind(tenant_id)
        .bind(receipt_id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get receipt: {}", e)))?;
        Ok(receipt)
    }

    /// List payout receipts for a tenant.
    #[instrument(skip(self, filter), fields(tenant_id = %tenant_id))]
    pub async fn list_payouts(
        &self,
        kind: PayoutKind,
        tenant_id: Uuid,
        filter: &ListSettlementsFilter,
    ) -> Result<Vec<PayoutReceipt>, AppError> {
        let limit = filter.page_size.clamp(1, 100) as i64;
        let cursor = filter.page_token.unwrap_or(Uuid::nil());

        let receipts = sqlx::query_as::<_, PayoutReceipt>(&format!(
            r#"
            SELECT {PAYOUT_COLUMNS}
            FROM {}
            WHERE tenant_id = $1
              AND ($2::varchar IS NULL OR status = $2)
              AND ($3::uuid IS NULL OR counterparty_id = $3)
              AND ($4::date IS NULL OR created_utc::date >= $4)
              AND ($5::date IS NULL OR created_utc::date <= $5)
              AND receipt_id > $6
            ORDER BY receipt_id
            LIMIT $7
            "#,
            kind.table()
        ))
        .bind(tenant_id)
        .bind(&filter.status)
        .bind(filter.counterparty_id)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(cursor)
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list receipts: {}", e)))?;
        Ok(receipts)
    }

    /// Mark a generated payout receipt as paid out.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, receipt_id = %receipt_id))]
    pub async fn mark_payout_paid(
        &self,
        kind: PayoutKind,
        tenant_id: Uuid,
        receipt_id: Uuid,
        paid_date: NaiveDate,
        payment_mode: &str,
    ) -> Result<PayoutReceipt, AppError> {
        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let receipt = Self::fetch_payout_for_update(&mut tx, kind, tenant_id, receipt_id).await?;
        if receipt.status() != ReceiptStatus::Generated {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "receipt {} is {} and cannot be paid",
                receipt.receipt_no,
                receipt.status
            )));
        }

        let paid = sqlx::query_as::<_, PayoutReceipt>(&format!(
            r#"
            UPDATE {}
            SET status = 'paid', paid_date = $3, payment_mode = $4
            WHERE tenant_id = $1 AND receipt_id = $2
            RETURNING {PAYOUT_COLUMNS}
            "#,
            kind.table()
        ))
        .bind(tenant_id)
        .bind(receipt_id)
        .bind(paid_date)
        .bind(payment_mode)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to mark paid: {}", e)))?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        SETTLEMENTS_TOTAL
            .with_label_values(&[kind.settlement_kind().as_str(), "paid"])
            .inc();

        info!(receipt_no = %paid.receipt_no, "Payout receipt paid");

        Ok(paid)
    }

    /// Cancel a payout receipt, releasing its claim column. Refused once
    /// paid.
    #[instrument(skip(self, user_id), fields(tenant_id = %tenant_id, receipt_id = %receipt_id))]
    pub async fn cancel_payout(
        &self,
        kind: PayoutKind,
        tenant_id: Uuid,
        receipt_id: Uuid,
        user_id: Option<Uuid>,
    ) -> Result<PayoutReceipt, AppError> {
        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let receipt = Self::fetch_payout_for_update(&mut tx, kind, tenant_id, receipt_id).await?;
        if receipt.status() != ReceiptStatus::Generated {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "receipt {} is {} and cannot be cancelled",
                receipt.receipt_no,
                receipt.status
            )));
        }

        let cancelled = sqlx::query_as::<_, PayoutReceipt>(&format!(
            r#"
            UPDATE {}
            SET status = 'cancelled', cancelled_utc = $3
            WHERE tenant_id = $1 AND receipt_id = $2
            RETURNING {PAYOUT_COLUMNS}
            "#,
            kind.table()
        ))
        .bind(tenant_id)
        .bind(receipt_id)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to cancel receipt: {}", e)))?;

        Self::release_payout_claims(&mut tx, kind, tenant_id, receipt_id, &cancelled, user_id)
            .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        SETTLEMENTS_TOTAL
            .with_label_values(&[kind.settlement_kind().as_str(), "cancelled"])
            .inc();

        info!(receipt_no = %cancelled.receipt_no, "Payout receipt cancelled");

        Ok(cancelled)
    }

    /// Delete a payout receipt outright. Same paid gate as cancellation.
    #[instrument(skip(self, user_id), fields(tenant_id = %tenant_id, receipt_id = %receipt_id))]
    pub async fn delete_payout(
        &self,
        kind: PayoutKind,
        tenant_id: Uuid,
        receipt_id: Uuid,
        user_id: Option<Uuid>,
    ) -> Result<bool, AppError> {
        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let receipt = match sqlx::query_as::<_, PayoutReceipt>(&format!(
            "SELECT {PAYOUT_COLUMNS} FROM {} \
             WHERE tenant_id = $1 AND receipt_id = $2 FOR UPDATE",
            kind.table()
        ))
        .bind(tenant_id)
        .bind(receipt_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch receipt: {}", e)))?
        {
            Some(receipt) => receipt,
            None => return Ok(false),
        };

        if receipt.status() == ReceiptStatus::Paid {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "receipt {} has been paid out",
                receipt.receipt_no
            )));
        }

        sqlx::query(&format!(
            "DELETE FROM {} WHERE tenant_id = $1 AND receipt_id = $2",
            kind.table()
        ))
        .bind(tenant_id)
        .bind(receipt_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete receipt: {}", e)))?;

        Self::release_payout_claims(&mut tx, kind, tenant_id, receipt_id, &receipt, user_id)
            .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        SETTLEMENTS_TOTAL
            .with_label_values(&[kind.settlement_kind().as_str(), "deleted"])
            .inc();

        info!(receipt_no = %receipt.receipt_no, "Payout receipt deleted");

        Ok(true)
    }

    async fn fetch_payout_for_update(
        tx: &mut Transaction<'_, Postgres>,
        kind: PayoutKind,
        tenant_id: Uuid,
        receipt_id: Uuid,
    ) -> Result<PayoutReceipt, AppError> {
        sqlx::query_as::<_, PayoutReceipt>(&format!(
            "SELECT {PAYOUT_COLUMNS} FROM {} \
             WHERE tenant_id = $1 AND receipt_id = $2 FOR UPDATE",
            kind.table()
        ))
        .bind(tenant_id)
        .bind(receipt_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch receipt: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("receipt {} not found", receipt_id)))
    }

    async fn release_payout_claims(
        tx: &mut Transaction<'_, Postgres>,
        kind: PayoutKind,
        tenant_id: Uuid,
        receipt_id: Uuid,
        receipt: &PayoutReceipt,
        user_id: Option<Uuid>,
    ) -> Result<(), AppError> {
        let claim = kind.claim_column();
        sqlx::query(&format!(
            "UPDATE subtrips SET {claim} = NULL WHERE tenant_id = $1 AND {claim} = $2",
        ))
        .bind(tenant_id)
        .bind(receipt_id)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to release subtrips: {}", e))
        })?;

        for subtrip_id in &receipt.associated_subtrips {
            Self::record_event_on(
                &mut **tx,
                tenant_id,
                *subtrip_id,
                kind.deleted_event(),
                serde_json::json!({ "receipt_no": receipt.receipt_no }),
                user_id,
            )
            .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payout_kinds_map_to_distinct_claim_columns() {
        assert_eq!(
            PayoutKind::DriverSalary.claim_column(),
            "driver_salary_id"
        );
        assert_eq!(
            PayoutKind::TransporterPayment.claim_column(),
            "transporter_payment_id"
        );
        assert_ne!(
            PayoutKind::DriverSalary.table(),
            PayoutKind::TransporterPayment.table()
        );
    }

    #[test]
    fn partial_coverage_names_the_missing_ids() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let requested = vec![a, b];

        let err = ensure_full_coverage(&requested, &[]).unwrap_err();
        match err {
            AppError::PartialEligibility {
                requested,
                eligible,
                missing,
            } => {
                assert_eq!(requested, 2);
                assert_eq!(eligible, 0);
                assert_eq!(missing.len(), 2);
                assert!(missing.contains(&a) && missing.contains(&b));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_subtrip_set_is_rejected() {
        assert!(matches!(
            validate_subtrip_ids(&[]),
            Err(AppError::ValidationError(_))
        ));
    }

    #[test]
    fn duplicate_subtrip_ids_collapse() {
        let id = Uuid::new_v4();
        let ids = validate_subtrip_ids(&[id, id]).unwrap();
        assert_eq!(ids, vec![id]);
    }

    #[test]
    fn aliased_columns_prefix_every_column() {
        let columns = aliased_subtrip_columns("s");
        assert!(columns.starts_with("s.subtrip_id"));
        assert!(columns.contains("s.status"));
        assert!(!columns.contains(", subtrip_no"));
    }
}
