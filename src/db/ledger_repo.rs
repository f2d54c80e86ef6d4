// src/db/ledger_repo.rs

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{Executor, FromRow, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::billing::{Customer, Invoice},
};

/// Aplicação de pagamento já junta com a data do pagamento de origem.
/// No extrato, o crédito é lançado na data em que o dinheiro entrou.
#[derive(Debug, Clone, FromRow)]
pub struct PaymentApplicationRow {
    pub payment_id: Uuid,
    pub amount_applied: Decimal,
    pub payment_date: NaiveDate,
}

/// Aplicação de crédito, lançada na data da aplicação (não na do pagamento
/// que gerou o crédito): crédito parado é dinheiro guardado, não gasto.
#[derive(Debug, Clone, FromRow)]
pub struct CreditApplicationRow {
    pub credit_id: Uuid,
    pub amount_applied: Decimal,
    pub applied_date: NaiveDate,
}

/// Repositório somente leitura usado pela reconstrução do extrato.
#[derive(Clone)]
pub struct LedgerRepository {
    pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn get_customer<'e, E>(
        &self,
        executor: E,
        customer_id: Uuid,
    ) -> Result<Option<Customer>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let customer = sqlx::query_as::<_, Customer>(
            "SELECT id, full_name, opening_balance, created_at FROM customers WHERE id = $1",
        )
        .bind(customer_id)
        .fetch_optional(executor)
        .await?;

        Ok(customer)
    }

    // ---
    // Eventos dentro do período
    // ---
    // Rascunhos e faturas canceladas ficam fora do extrato: nunca foram
    // obrigação do cliente.

    pub async fn get_invoices_in_range<'e, E>(
        &self,
        executor: E,
        customer_id: Uuid,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<Invoice>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let invoices = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT id, customer_id, total_amount, balance, status, due_date, invoice_date, created_at, updated_at
            FROM invoices
            WHERE customer_id = $1
              AND status NOT IN ('DRAFT', 'CANCELLED')
              AND ($2::date IS NULL OR invoice_date >= $2)
              AND ($3::date IS NULL OR invoice_date <= $3)
            ORDER BY invoice_date ASC, created_at ASC
            "#,
        )
        .bind(customer_id)
        .bind(start_date)
        .bind(end_date)
        .fetch_all(executor)
        .await?;

        Ok(invoices)
    }

    pub async fn get_payment_applications_in_range<'e, E>(
        &self,
        executor: E,
        customer_id: Uuid,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<PaymentApplicationRow>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let rows = sqlx::query_as::<_, PaymentApplicationRow>(
            r#"
            SELECT pa.payment_id, pa.amount_applied, p.payment_date
            FROM payment_applications pa
            JOIN customer_payments p ON p.id = pa.payment_id
            WHERE p.customer_id = $1
              AND p.status = 'COMPLETED'
              AND ($2::date IS NULL OR p.payment_date >= $2)
              AND ($3::date IS NULL OR p.payment_date <= $3)
            ORDER BY p.payment_date ASC, pa.created_at ASC
            "#,
        )
        .bind(customer_id)
        .bind(start_date)
        .bind(end_date)
        .fetch_all(executor)
        .await?;

        Ok(rows)
    }

    pub async fn get_credit_applications_in_range<'e, E>(
        &self,
        executor: E,
        customer_id: Uuid,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<CreditApplicationRow>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let rows = sqlx::query_as::<_, CreditApplicationRow>(
            r#"
            SELECT ca.credit_id, ca.amount_applied, ca.applied_date
            FROM credit_applications ca
            JOIN credits c ON c.id = ca.credit_id
            WHERE c.customer_id = $1
              AND ($2::date IS NULL OR ca.applied_date >= $2)
              AND ($3::date IS NULL OR ca.applied_date <= $3)
            ORDER BY ca.applied_date ASC, ca.created_at ASC
            "#,
        )
        .bind(customer_id)
        .bind(start_date)
        .bind(end_date)
        .fetch_all(executor)
        .await?;

        Ok(rows)
    }

    // ---
    // Efeito líquido anterior ao início do período (compõe o saldo de abertura)
    // ---

    pub async fn sum_invoices_before<'e, E>(
        &self,
        executor: E,
        customer_id: Uuid,
        before: NaiveDate,
    ) -> Result<Decimal, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let total: Decimal = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(total_amount), 0)
            FROM invoices
            WHERE customer_id = $1
              AND status NOT IN ('DRAFT', 'CANCELLED')
              AND invoice_date < $2
            "#,
        )
        .bind(customer_id)
        .bind(before)
        .fetch_one(executor)
        .await?;

        Ok(total)
    }

    pub async fn sum_payment_applications_before<'e, E>(
        &self,
        executor: E,
        customer_id: Uuid,
        before: NaiveDate,
    ) -> Result<Decimal, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let total: Decimal = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(pa.amount_applied), 0)
            FROM payment_applications pa
            JOIN customer_payments p ON p.id = pa.payment_id
            WHERE p.customer_id = $1
              AND p.status = 'COMPLETED'
              AND p.payment_date < $2
            "#,
        )
        .bind(customer_id)
        .bind(before)
        .fetch_one(executor)
        .await?;

        Ok(total)
    }

    pub async fn sum_credit_applications_before<'e, E>(
        &self,
        executor: E,
        customer_id: Uuid,
        before: NaiveDate,
    ) -> Result<Decimal, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let total: Decimal = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(ca.amount_applied), 0)
            FROM credit_applications ca
            JOIN credits c ON c.id = ca.credit_id
            WHERE c.customer_id = $1
              AND ca.applied_date < $2
            "#,
        )
        .bind(customer_id)
        .bind(before)
        .fetch_one(executor)
        .await?;

        Ok(total)
    }
}
