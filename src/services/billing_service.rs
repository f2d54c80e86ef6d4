// src/services/billing_service.rs
//
// Motor de alocação de pagamentos e aplicação de créditos. Cada operação
// roda em UMA transação: ou tudo entra (pagamento + aplicações + crédito),
// ou nada entra. A serialização por cliente vem dos locks de linha
// (FOR UPDATE) adquiridos sempre na mesma ordem canônica.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    common::error::{AppError, map_lock_error},
    db::BillingRepository,
    models::{
        billing::{Credit, CreditStatus, Invoice, InvoiceStatus, PaymentMethod},
        ledger::{AllocationSummary, BackfillSummary, CreditApplicationSummary},
    },
    services::{
        allocation::{AllocationPreview, plan_allocation},
        audit::{AuditRecord, AuditSink},
    },
};

// Conflito de lock é esperado sob contenção; tentamos de novo algumas
// vezes antes de devolver 409 para o chamador.
const MAX_CONFLICT_ATTEMPTS: u32 = 3;
// Espera de lock limitada: melhor falhar com erro retryable do que
// segurar a requisição presa num deadlock.
const TX_LOCK_TIMEOUT: &str = "SET LOCAL lock_timeout = '5s'";

/// Requisição tipada de RecordPayment (validada antes da transação abrir).
#[derive(Debug, Clone)]
pub struct RecordPaymentRequest {
    pub customer_id: Uuid,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_date: NaiveDate,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
    // Quando presente, restringe a alocação a essas faturas.
    pub invoice_ids: Option<Vec<Uuid>>,
    pub actor_id: Uuid,
}

/// Requisição tipada de ApplyCredit.
#[derive(Debug, Clone)]
pub struct ApplyCreditRequest {
    pub credit_id: Uuid,
    pub invoice_id: Uuid,
    pub amount: Decimal,
    pub actor_id: Uuid,
}

#[derive(Clone)]
pub struct BillingService {
    repo: BillingRepository,
    audit: Arc<dyn AuditSink>,
}

impl BillingService {
    pub fn new(repo: BillingRepository, audit: Arc<dyn AuditSink>) -> Self {
        Self { repo, audit }
    }

    // --- RECORD PAYMENT (Alocação) ---

    pub async fn record_payment(
        &self,
        request: RecordPaymentRequest,
    ) -> Result<AllocationSummary, AppError> {
        if request.amount <= Decimal::ZERO {
            return Err(AppError::InvalidArgument(
                "O valor do pagamento deve ser maior que zero.".to_string(),
            ));
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_record_payment(&request).await {
                Err(e) if e.is_retryable() && attempt < MAX_CONFLICT_ATTEMPTS => {
                    tracing::warn!(
                        customer_id = %request.customer_id,
                        attempt,
                        "Conflito de lock na alocação, tentando de novo"
                    );
                    tokio::time::sleep(Duration::from_millis(50 * attempt as u64)).await;
                }
                result => return result,
            }
        }
    }

    async fn try_record_payment(
        &self,
        request: &RecordPaymentRequest,
    ) -> Result<AllocationSummary, AppError> {
        let today = Utc::now().date_naive();

        let mut tx = self.repo.pool().begin().await?;
        sqlx::query(TX_LOCK_TIMEOUT).execute(&mut *tx).await?;

        self.repo
            .get_customer(&mut *tx, request.customer_id)
            .await?
            .ok_or(AppError::CustomerNotFound(request.customer_id))?;

        // Carrega e trava o conjunto alvo já na ordem canônica.
        let invoices = match &request.invoice_ids {
            Some(ids) => {
                self.repo
                    .get_invoices_by_ids_for_update(&mut *tx, request.customer_id, ids)
                    .await?
            }
            None => {
                self.repo
                    .get_payable_invoices_for_update(&mut *tx, request.customer_id)
                    .await?
            }
        };

        let plan = plan_allocation(&invoices, request.amount);

        // O pagamento só existe junto com suas aplicações/crédito.
        let payment = self
            .repo
            .create_payment(
                &mut *tx,
                request.customer_id,
                request.amount,
                request.payment_method,
                request.payment_date,
                request.reference_number.as_deref(),
                request.notes.as_deref(),
            )
            .await?;

        let mut invoices_affected = Vec::with_capacity(plan.applications.len());
        for application in &plan.applications {
            let invoice = invoices
                .iter()
                .find(|i| i.id == application.invoice_id)
                .ok_or_else(|| {
                    AppError::InternalServerError(anyhow::anyhow!(
                        "Plano de alocação referenciou fatura fora do conjunto travado"
                    ))
                })?;

            self.repo
                .create_payment_application(
                    &mut *tx,
                    payment.id,
                    invoice.id,
                    application.amount,
                )
                .await?;

            let new_balance = invoice.balance - application.amount;
            let new_status =
                InvoiceStatus::derive(new_balance, invoice.total_amount, invoice.due_date, today);
            self.repo
                .update_invoice_balance(&mut *tx, invoice.id, new_balance, new_status)
                .await?;

            invoices_affected.push(invoice.id);
        }

        // Sobra vira um crédito reutilizável ("dinheiro guardado").
        let credit_id = if plan.credit_remainder > Decimal::ZERO {
            let credit = self
                .repo
                .create_credit(
                    &mut *tx,
                    request.customer_id,
                    payment.id,
                    plan.credit_remainder,
                )
                .await?;
            Some(credit.id)
        } else {
            None
        };

        tx.commit().await.map_err(map_lock_error)?;

        let summary = AllocationSummary {
            payment_id: payment.id,
            total_allocated: plan.total_allocated(),
            total_credit: plan.credit_remainder,
            credit_id,
            invoices_affected,
        };

        tracing::info!(
            payment_id = %payment.id,
            customer_id = %request.customer_id,
            total_allocated = %summary.total_allocated,
            total_credit = %summary.total_credit,
            "Pagamento registrado e alocado"
        );

        // Pós-commit, melhor-esforço: nunca desfaz a transação financeira.
        self.audit
            .record(AuditRecord {
                actor_id: request.actor_id,
                action: "RECORD_PAYMENT",
                entity_type: "customer_payment",
                entity_id: payment.id,
                before_snapshot: None,
                after_snapshot: serde_json::to_value(&summary).unwrap_or(Value::Null),
            })
            .await;

        Ok(summary)
    }

    // --- PREVIEW (mesma política, zero escrita) ---

    pub async fn preview_allocation(
        &self,
        customer_id: Uuid,
        amount: Decimal,
        invoice_ids: Option<Vec<Uuid>>,
    ) -> Result<AllocationPreview, AppError> {
        if amount <= Decimal::ZERO {
            return Err(AppError::InvalidArgument(
                "O valor do pagamento deve ser maior que zero.".to_string(),
            ));
        }

        let pool = self.repo.pool();
        self.repo
            .get_customer(pool, customer_id)
            .await?
            .ok_or(AppError::CustomerNotFound(customer_id))?;

        let invoices = self
            .repo
            .get_payable_invoices(pool, customer_id, invoice_ids.as_deref())
            .await?;

        let plan = plan_allocation(&invoices, amount);

        Ok(AllocationPreview {
            total_allocated: plan.total_allocated(),
            total_credit: plan.credit_remainder,
            applications: plan.applications,
        })
    }

    // --- APPLY CREDIT ---

    pub async fn apply_credit(
        &self,
        request: ApplyCreditRequest,
    ) -> Result<CreditApplicationSummary, AppError> {
        if request.amount <= Decimal::ZERO {
            return Err(AppError::InvalidArgument(
                "O valor a aplicar deve ser maior que zero.".to_string(),
            ));
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_apply_credit(&request).await {
                Err(e) if e.is_retryable() && attempt < MAX_CONFLICT_ATTEMPTS => {
                    tracing::warn!(
                        credit_id = %request.credit_id,
                        attempt,
                        "Conflito de lock na aplicação de crédito, tentando de novo"
                    );
                    tokio::time::sleep(Duration::from_millis(50 * attempt as u64)).await;
                }
                result => return result,
            }
        }
    }

    async fn try_apply_credit(
        &self,
        request: &ApplyCreditRequest,
    ) -> Result<CreditApplicationSummary, AppError> {
        let today = Utc::now().date_naive();

        let mut tx = self.repo.pool().begin().await?;
        sqlx::query(TX_LOCK_TIMEOUT).execute(&mut *tx).await?;

        // Ordem fixa de locks: crédito primeiro, fatura depois.
        let credit = self
            .repo
            .get_credit_for_update(&mut *tx, request.credit_id)
            .await?
            .ok_or(AppError::CreditNotFound(request.credit_id))?;

        let invoice = self
            .repo
            .get_invoice_for_update(&mut *tx, request.invoice_id)
            .await?
            .ok_or(AppError::InvoiceNotFound(request.invoice_id))?;

        let target = credit_application_target(&credit, &invoice, request.amount, today)?;

        self.repo
            .create_credit_application(
                &mut *tx,
                credit.id,
                invoice.id,
                request.amount,
                today,
            )
            .await?;

        self.repo
            .update_credit_available(
                &mut *tx,
                credit.id,
                target.credit_available,
                target.credit_status,
            )
            .await?;

        self.repo
            .update_invoice_balance(
                &mut *tx,
                invoice.id,
                target.invoice_balance,
                target.invoice_status,
            )
            .await?;

        tx.commit().await.map_err(map_lock_error)?;

        let summary = CreditApplicationSummary {
            amount_applied: request.amount,
            credit_remaining: target.credit_available,
            invoice_new_balance: target.invoice_balance,
        };

        tracing::info!(
            credit_id = %credit.id,
            invoice_id = %invoice.id,
            amount_applied = %request.amount,
            credit_remaining = %summary.credit_remaining,
            "Crédito aplicado"
        );

        self.audit
            .record(AuditRecord {
                actor_id: request.actor_id,
                action: "APPLY_CREDIT",
                entity_type: "credit",
                entity_id: credit.id,
                before_snapshot: serde_json::to_value(&credit).ok(),
                after_snapshot: serde_json::to_value(&summary).unwrap_or(Value::Null),
            })
            .await;

        Ok(summary)
    }

    // --- BACKFILL DE SALDOS ---
    // Ferramenta de operador para faturas criadas antes do rastreamento de
    // saldo. Recalcula balance = total - aplicações e o status derivado.
    // Idempotente: rodar duas vezes seguidas atualiza zero na segunda.

    pub async fn initialize_balances(&self) -> Result<BackfillSummary, AppError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_initialize_balances().await {
                Err(e) if e.is_retryable() && attempt < MAX_CONFLICT_ATTEMPTS => {
                    tracing::warn!(attempt, "Conflito de lock no backfill, tentando de novo");
                    tokio::time::sleep(Duration::from_millis(50 * attempt as u64)).await;
                }
                result => return result,
            }
        }
    }

    async fn try_initialize_balances(&self) -> Result<BackfillSummary, AppError> {
        let today = Utc::now().date_naive();

        let mut tx = self.repo.pool().begin().await?;
        sqlx::query(TX_LOCK_TIMEOUT).execute(&mut *tx).await?;

        let invoices = self.repo.get_all_billable_invoices_for_update(&mut *tx).await?;

        let mut applied_by_invoice: HashMap<Uuid, Decimal> = HashMap::new();
        for row in self.repo.sum_payment_applications_by_invoice(&mut *tx).await? {
            *applied_by_invoice.entry(row.invoice_id).or_default() += row.total;
        }
        for row in self.repo.sum_credit_applications_by_invoice(&mut *tx).await? {
            *applied_by_invoice.entry(row.invoice_id).or_default() += row.total;
        }

        let mut updated_count: u64 = 0;
        for invoice in &invoices {
            let applied = applied_by_invoice
                .get(&invoice.id)
                .copied()
                .unwrap_or(Decimal::ZERO);

            if let Some((new_balance, new_status)) = backfill_target(invoice, applied, today)? {
                self.repo
                    .update_invoice_balance(&mut *tx, invoice.id, new_balance, new_status)
                    .await?;
                updated_count += 1;
            }
        }

        tx.commit().await.map_err(map_lock_error)?;

        tracing::info!(updated_count, "Backfill de saldos de faturas concluído");

        Ok(BackfillSummary { updated_count })
    }
}

/// Novos estados do crédito e da fatura após uma aplicação.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CreditApplicationTarget {
    credit_available: Decimal,
    credit_status: CreditStatus,
    invoice_balance: Decimal,
    invoice_status: InvoiceStatus,
}

/// Valida a aplicação de um crédito numa fatura e calcula os novos estados
/// de ambos. Puro para poder ser testado sem banco.
fn credit_application_target(
    credit: &Credit,
    invoice: &Invoice,
    amount: Decimal,
    today: NaiveDate,
) -> Result<CreditApplicationTarget, AppError> {
    if credit.status != CreditStatus::Active {
        return Err(AppError::InvalidOperation(format!(
            "Crédito {} não está ativo (status atual: {:?}).",
            credit.id, credit.status
        )));
    }
    if credit.available_amount < amount {
        return Err(AppError::InvalidOperation(format!(
            "Crédito {} tem apenas {} disponível; pedido foi {}.",
            credit.id, credit.available_amount, amount
        )));
    }
    if invoice.customer_id != credit.customer_id {
        return Err(AppError::InvalidOperation(format!(
            "Fatura {} pertence a outro cliente; o crédito é de {}.",
            invoice.id, credit.customer_id
        )));
    }
    if !invoice.status.is_payable() {
        return Err(AppError::InvalidOperation(format!(
            "Fatura {} não aceita pagamento (status: {:?}).",
            invoice.id, invoice.status
        )));
    }
    // Sem arredondar para baixo em silêncio: pedir mais do que o saldo
    // da fatura é erro do chamador e deve aparecer como tal.
    if invoice.balance < amount {
        return Err(AppError::InvalidOperation(format!(
            "Fatura {} tem saldo de apenas {}; pedido foi {}.",
            invoice.id, invoice.balance, amount
        )));
    }

    let credit_available = credit.available_amount - amount;
    let credit_status = if credit_available == Decimal::ZERO {
        CreditStatus::Exhausted
    } else {
        CreditStatus::Active
    };

    let invoice_balance = invoice.balance - amount;
    let invoice_status =
        InvoiceStatus::derive(invoice_balance, invoice.total_amount, invoice.due_date, today);

    Ok(CreditApplicationTarget {
        credit_available,
        credit_status,
        invoice_balance,
        invoice_status,
    })
}

/// Decide se uma fatura precisa de correção no backfill. Puro para poder
/// ser testado sem banco.
fn backfill_target(
    invoice: &Invoice,
    applied: Decimal,
    today: NaiveDate,
) -> Result<Option<(Decimal, InvoiceStatus)>, AppError> {
    let expected_balance = invoice.total_amount - applied;
    if expected_balance < Decimal::ZERO {
        return Err(AppError::InvalidOperation(format!(
            "Fatura {} tem {} aplicados para um total de {}; dados inconsistentes.",
            invoice.id, applied, invoice.total_amount
        )));
    }

    let expected_status = InvoiceStatus::derive(
        expected_balance,
        invoice.total_amount,
        invoice.due_date,
        today,
    );

    if expected_balance != invoice.balance || expected_status != invoice.status {
        Ok(Some((expected_balance, expected_status)))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    fn invoice(balance: Decimal, total: Decimal, status: InvoiceStatus) -> Invoice {
        Invoice {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            total_amount: total,
            balance,
            status,
            due_date: None,
            invoice_date: day(1),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn credit(available: Decimal, amount: Decimal, status: CreditStatus) -> Credit {
        Credit {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            source_payment_id: Uuid::new_v4(),
            amount,
            available_amount: available,
            status,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn aplicar_o_credito_inteiro_esgota() {
        // Crédito de 300 aplicado inteiro numa fatura de saldo 500:
        // fatura fica com 200 e o crédito vira EXHAUSTED com zero disponível.
        let cred = credit(dec!(300), dec!(300), CreditStatus::Active);
        let mut inv = invoice(dec!(500), dec!(500), InvoiceStatus::Open);
        inv.customer_id = cred.customer_id;

        let target = credit_application_target(&cred, &inv, dec!(300), day(10)).unwrap();

        assert_eq!(target.credit_available, dec!(0));
        assert_eq!(target.credit_status, CreditStatus::Exhausted);
        assert_eq!(target.invoice_balance, dec!(200));
        assert_eq!(target.invoice_status, InvoiceStatus::Partial);
    }

    #[test]
    fn credito_esgotado_nao_aplica_de_novo() {
        let cred = credit(dec!(0), dec!(300), CreditStatus::Exhausted);
        let mut inv = invoice(dec!(500), dec!(500), InvoiceStatus::Open);
        inv.customer_id = cred.customer_id;

        let result = credit_application_target(&cred, &inv, dec!(100), day(10));
        assert!(matches!(result, Err(AppError::InvalidOperation(_))));
    }

    #[test]
    fn aplicacao_parcial_mantem_o_credito_ativo() {
        let cred = credit(dec!(300), dec!(300), CreditStatus::Active);
        let mut inv = invoice(dec!(500), dec!(500), InvoiceStatus::Open);
        inv.customer_id = cred.customer_id;

        let target = credit_application_target(&cred, &inv, dec!(100), day(10)).unwrap();

        assert_eq!(target.credit_available, dec!(200));
        assert_eq!(target.credit_status, CreditStatus::Active);
        assert_eq!(target.invoice_balance, dec!(400));
    }

    #[test]
    fn credito_de_outro_cliente_e_rejeitado() {
        // customer_id do helper é sempre novo, então crédito e fatura
        // pertencem a clientes diferentes.
        let cred = credit(dec!(300), dec!(300), CreditStatus::Active);
        let inv = invoice(dec!(500), dec!(500), InvoiceStatus::Open);

        let result = credit_application_target(&cred, &inv, dec!(100), day(10));
        assert!(matches!(result, Err(AppError::InvalidOperation(_))));
    }

    #[test]
    fn pedido_acima_do_saldo_da_fatura_e_rejeitado() {
        // Nada de arredondar para baixo: o valor tem de caber na fatura.
        let cred = credit(dec!(300), dec!(300), CreditStatus::Active);
        let mut inv = invoice(dec!(200), dec!(200), InvoiceStatus::Open);
        inv.customer_id = cred.customer_id;

        let result = credit_application_target(&cred, &inv, dec!(250), day(10));
        assert!(matches!(result, Err(AppError::InvalidOperation(_))));
    }

    #[test]
    fn pedido_acima_do_disponivel_e_rejeitado() {
        let cred = credit(dec!(50), dec!(300), CreditStatus::Active);
        let mut inv = invoice(dec!(500), dec!(500), InvoiceStatus::Open);
        inv.customer_id = cred.customer_id;

        let result = credit_application_target(&cred, &inv, dec!(100), day(10));
        assert!(matches!(result, Err(AppError::InvalidOperation(_))));
    }

    #[test]
    fn backfill_corrige_saldo_desatualizado() {
        // Fatura antiga gravada com saldo cheio, mas 300 já foram aplicados.
        let inv = invoice(dec!(1000), dec!(1000), InvoiceStatus::Open);

        let target = backfill_target(&inv, dec!(300), day(10)).unwrap();
        assert_eq!(target, Some((dec!(700), InvoiceStatus::Partial)));
    }

    #[test]
    fn backfill_e_idempotente() {
        let mut inv = invoice(dec!(1000), dec!(1000), InvoiceStatus::Open);

        let (new_balance, new_status) = backfill_target(&inv, dec!(300), day(10))
            .unwrap()
            .unwrap();
        inv.balance = new_balance;
        inv.status = new_status;

        // Segunda passada com os mesmos dados: nada a fazer.
        assert_eq!(backfill_target(&inv, dec!(300), day(10)).unwrap(), None);
    }

    #[test]
    fn backfill_quitada_vira_paid() {
        let inv = invoice(dec!(500), dec!(500), InvoiceStatus::Open);

        let target = backfill_target(&inv, dec!(500), day(10)).unwrap();
        assert_eq!(target, Some((dec!(0), InvoiceStatus::Paid)));
    }

    #[test]
    fn backfill_rejeita_aplicacao_maior_que_o_total() {
        let inv = invoice(dec!(100), dec!(100), InvoiceStatus::Open);

        let result = backfill_target(&inv, dec!(150), day(10));
        assert!(matches!(result, Err(AppError::InvalidOperation(_))));
    }
}
