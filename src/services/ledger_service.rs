// src/services/ledger_service.rs
//
// Reconstrução do extrato do cliente: lista cronológica de débitos
// (faturas) e créditos (aplicações de pagamento/crédito) com saldo
// acumulado, conciliada com o saldo de abertura armazenado. Nunca muta
// estado; lê tudo de um único snapshot para não fotografar um pagamento
// sem as suas aplicações.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{
        LedgerRepository,
        ledger_repo::{CreditApplicationRow, PaymentApplicationRow},
    },
    models::{
        billing::Invoice,
        ledger::{CustomerLedger, LedgerEntry, LedgerEntryKind},
    },
};

#[derive(Clone)]
pub struct LedgerService {
    repo: LedgerRepository,
}

impl LedgerService {
    pub fn new(repo: LedgerRepository) -> Self {
        Self { repo }
    }

    pub async fn get_ledger(
        &self,
        customer_id: Uuid,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<CustomerLedger, AppError> {
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if start > end {
                return Err(AppError::InvalidArgument(
                    "A data inicial não pode ser posterior à final.".to_string(),
                ));
            }
        }

        let mut tx = self.repo.pool().begin().await?;
        // Snapshot único para todas as leituras do extrato.
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let customer = self
            .repo
            .get_customer(&mut *tx, customer_id)
            .await?
            .ok_or(AppError::CustomerNotFound(customer_id))?;

        // Abertura = baseline armazenado + efeito líquido de tudo que
        // aconteceu estritamente antes do início do período.
        let mut opening_balance = customer.opening_balance;
        if let Some(start) = start_date {
            let invoiced = self.repo.sum_invoices_before(&mut *tx, customer_id, start).await?;
            let paid = self
                .repo
                .sum_payment_applications_before(&mut *tx, customer_id, start)
                .await?;
            let credited = self
                .repo
                .sum_credit_applications_before(&mut *tx, customer_id, start)
                .await?;
            opening_balance += invoiced - paid - credited;
        }

        let invoices = self
            .repo
            .get_invoices_in_range(&mut *tx, customer_id, start_date, end_date)
            .await?;
        let payment_applications = self
            .repo
            .get_payment_applications_in_range(&mut *tx, customer_id, start_date, end_date)
            .await?;
        let credit_applications = self
            .repo
            .get_credit_applications_in_range(&mut *tx, customer_id, start_date, end_date)
            .await?;

        tx.commit().await?;

        let (transactions, closing_balance) = assemble_ledger(
            opening_balance,
            &invoices,
            &payment_applications,
            &credit_applications,
        );

        Ok(CustomerLedger {
            customer_id,
            opening_balance,
            transactions,
            closing_balance,
        })
    }
}

/// Monta os lançamentos em ordem cronológica e calcula o saldo acumulado.
/// Puro: recebe os dados já lidos e não toca no banco.
///
/// Convenção de desempate num mesmo dia: fatura antes de pagamento antes
/// de aplicação de crédito (cobrança nova aparece antes do dinheiro
/// recebido contra ela). Créditos "parados" não aparecem; só a aplicação
/// deles, na data em que acontece.
pub fn assemble_ledger(
    opening_balance: Decimal,
    invoices: &[Invoice],
    payment_applications: &[PaymentApplicationRow],
    credit_applications: &[CreditApplicationRow],
) -> (Vec<LedgerEntry>, Decimal) {
    let mut entries: Vec<LedgerEntry> = Vec::with_capacity(
        invoices.len() + payment_applications.len() + credit_applications.len(),
    );

    for invoice in invoices {
        entries.push(LedgerEntry {
            date: invoice.invoice_date,
            kind: LedgerEntryKind::Invoice,
            document_id: invoice.id,
            description: "Fatura emitida".to_string(),
            debit: Some(invoice.total_amount),
            credit: None,
            balance: Decimal::ZERO,
        });
    }

    for application in payment_applications {
        entries.push(LedgerEntry {
            // Atribuído à data do pagamento de origem.
            date: application.payment_date,
            kind: LedgerEntryKind::Payment,
            document_id: application.payment_id,
            description: "Pagamento recebido".to_string(),
            debit: None,
            credit: Some(application.amount_applied),
            balance: Decimal::ZERO,
        });
    }

    for application in credit_applications {
        entries.push(LedgerEntry {
            date: application.applied_date,
            kind: LedgerEntryKind::CreditApplication,
            document_id: application.credit_id,
            description: "Crédito aplicado".to_string(),
            debit: None,
            credit: Some(application.amount_applied),
            balance: Decimal::ZERO,
        });
    }

    // sort estável: dentro do mesmo dia e tipo, preserva a ordem de leitura.
    entries.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.kind.cmp(&b.kind)));

    let mut running = opening_balance;
    for entry in &mut entries {
        running += entry.debit.unwrap_or(Decimal::ZERO);
        running -= entry.credit.unwrap_or(Decimal::ZERO);
        entry.balance = running;
    }

    (entries, running)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::billing::InvoiceStatus;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    fn invoice(total: Decimal, date: NaiveDate) -> Invoice {
        Invoice {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            total_amount: total,
            balance: total,
            status: InvoiceStatus::Open,
            due_date: None,
            invoice_date: date,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn payment_app(amount: Decimal, date: NaiveDate) -> PaymentApplicationRow {
        PaymentApplicationRow {
            payment_id: Uuid::new_v4(),
            amount_applied: amount,
            payment_date: date,
        }
    }

    fn credit_app(amount: Decimal, date: NaiveDate) -> CreditApplicationRow {
        CreditApplicationRow {
            credit_id: Uuid::new_v4(),
            amount_applied: amount,
            applied_date: date,
        }
    }

    #[test]
    fn extrato_fecha_em_zero_apos_quitar() {
        // Abertura 0, fatura de 1000 no dia 1, pagamento de 1000 no dia 5:
        // dois lançamentos, saldos 1000 e depois 0.
        let invoices = [invoice(dec!(1000), day(1))];
        let payments = [payment_app(dec!(1000), day(5))];

        let (entries, closing) = assemble_ledger(dec!(0), &invoices, &payments, &[]);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, LedgerEntryKind::Invoice);
        assert_eq!(entries[0].balance, dec!(1000));
        assert_eq!(entries[1].kind, LedgerEntryKind::Payment);
        assert_eq!(entries[1].balance, dec!(0));
        assert_eq!(closing, dec!(0));
    }

    #[test]
    fn no_mesmo_dia_fatura_vem_antes_do_pagamento() {
        let invoices = [invoice(dec!(500), day(3))];
        let payments = [payment_app(dec!(500), day(3))];
        let credits = [credit_app(dec!(100), day(3))];
        let extra = [invoice(dec!(100), day(3))];

        let all_invoices = [invoices[0].clone(), extra[0].clone()];
        let (entries, _) = assemble_ledger(dec!(0), &all_invoices, &payments, &credits);

        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].kind, LedgerEntryKind::Invoice);
        assert_eq!(entries[1].kind, LedgerEntryKind::Invoice);
        assert_eq!(entries[2].kind, LedgerEntryKind::Payment);
        assert_eq!(entries[3].kind, LedgerEntryKind::CreditApplication);
    }

    #[test]
    fn fechamento_e_abertura_mais_debitos_menos_creditos() {
        let invoices = [
            invoice(dec!(250), day(1)),
            invoice(dec!(750.50), day(4)),
            invoice(dec!(19.99), day(9)),
        ];
        let payments = [
            payment_app(dec!(250), day(2)),
            payment_app(dec!(100.25), day(8)),
        ];
        let credits = [credit_app(dec!(50), day(10))];

        let opening = dec!(120);
        let (entries, closing) = assemble_ledger(opening, &invoices, &payments, &credits);

        let debits: Decimal = entries.iter().filter_map(|e| e.debit).sum();
        let credits_sum: Decimal = entries.iter().filter_map(|e| e.credit).sum();
        assert_eq!(closing, opening + debits - credits_sum);
        // Último saldo acumulado é o fechamento.
        assert_eq!(entries.last().unwrap().balance, closing);
    }

    #[test]
    fn credito_so_aparece_quando_aplicado() {
        // O troco que gerou o crédito não entra como lançamento próprio;
        // o que entra é a aplicação, na data em que ela acontece.
        let invoices = [invoice(dec!(200), day(1))];
        let credits = [credit_app(dec!(200), day(15))];

        let (entries, closing) = assemble_ledger(dec!(0), &invoices, &[], &credits);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].kind, LedgerEntryKind::CreditApplication);
        assert_eq!(entries[1].date, day(15));
        assert_eq!(closing, dec!(0));
    }

    #[test]
    fn sem_lancamentos_fechamento_e_a_abertura() {
        let (entries, closing) = assemble_ledger(dec!(77.70), &[], &[], &[]);
        assert!(entries.is_empty());
        assert_eq!(closing, dec!(77.70));
    }
}
