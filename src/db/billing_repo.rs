// src/db/billing_repo.rs

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{Executor, FromRow, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::{AppError, map_lock_error},
    models::billing::{
        Credit, CreditApplication, CreditStatus, Customer, CustomerPayment, Invoice, InvoiceStatus,
        PaymentApplication, PaymentMethod,
    },
};

/// Soma de aplicações agrupada por fatura (usada no backfill de saldos).
#[derive(Debug, FromRow)]
pub struct AppliedTotal {
    pub invoice_id: Uuid,
    pub total: Decimal,
}

#[derive(Clone)]
pub struct BillingRepository {
    pool: PgPool,
}

impl BillingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ---
    // Clientes
    // ---

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
    // Faturas (leituras com lock para a seção crítica da alocação)
    // ---
    // O ORDER BY espelha a ordem canônica de alocação. Isso também fixa a
    // ordem de aquisição dos locks: duas alocações do mesmo cliente travam
    // as linhas na mesma sequência e não se enroscam em deadlock.

    /// Faturas do cliente elegíveis para alocação, travadas com FOR UPDATE.
    pub async fn get_payable_invoices_for_update<'e, E>(
        &self,
        executor: E,
        customer_id: Uuid,
    ) -> Result<Vec<Invoice>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let invoices = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT id, customer_id, total_amount, balance, status, due_date, invoice_date, created_at, updated_at
            FROM invoices
            WHERE customer_id = $1
              AND balance > 0
              AND status NOT IN ('DRAFT', 'CANCELLED')
            ORDER BY due_date ASC NULLS LAST, invoice_date ASC, id ASC
            FOR UPDATE
            "#,
        )
        .bind(customer_id)
        .fetch_all(executor)
        .await
        .map_err(map_lock_error)?;

        Ok(invoices)
    }

    /// Versão restrita a uma lista explícita de faturas (mesmo lock e ordem).
    pub async fn get_invoices_by_ids_for_update<'e, E>(
        &self,
        executor: E,
        customer_id: Uuid,
        invoice_ids: &[Uuid],
    ) -> Result<Vec<Invoice>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let invoices = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT id, customer_id, total_amount, balance, status, due_date, invoice_date, created_at, updated_at
            FROM invoices
            WHERE customer_id = $1
              AND id = ANY($2)
              AND balance > 0
              AND status NOT IN ('DRAFT', 'CANCELLED')
            ORDER BY due_date ASC NULLS LAST, invoice_date ASC, id ASC
            FOR UPDATE
            "#,
        )
        .bind(customer_id)
        .bind(invoice_ids)
        .fetch_all(executor)
        .await
        .map_err(map_lock_error)?;

        Ok(invoices)
    }

    /// Leituras sem lock, para o preview de alocação (nunca escreve).
    pub async fn get_payable_invoices<'e, E>(
        &self,
        executor: E,
        customer_id: Uuid,
        invoice_ids: Option<&[Uuid]>,
    ) -> Result<Vec<Invoice>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let invoices = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT id, customer_id, total_amount, balance, status, due_date, invoice_date, created_at, updated_at
            FROM invoices
            WHERE customer_id = $1
              AND ($2::uuid[] IS NULL OR id = ANY($2))
              AND balance > 0
              AND status NOT IN ('DRAFT', 'CANCELLED')
            ORDER BY due_date ASC NULLS LAST, invoice_date ASC, id ASC
            "#,
        )
        .bind(customer_id)
        .bind(invoice_ids)
        .fetch_all(executor)
        .await?;

        Ok(invoices)
    }

    pub async fn get_invoice_for_update<'e, E>(
        &self,
        executor: E,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT id, customer_id, total_amount, balance, status, due_date, invoice_date, created_at, updated_at
            FROM invoices
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(invoice_id)
        .fetch_optional(executor)
        .await
        .map_err(map_lock_error)?;

        Ok(invoice)
    }

    /// Todas as faturas dentro do fluxo de cobrança, travadas para o backfill.
    /// Mesma ordem de aquisição de locks das alocações, para um backfill
    /// concorrente com uma alocação não se enroscar em deadlock.
    pub async fn get_all_billable_invoices_for_update<'e, E>(
        &self,
        executor: E,
    ) -> Result<Vec<Invoice>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let invoices = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT id, customer_id, total_amount, balance, status, due_date, invoice_date, created_at, updated_at
            FROM invoices
            WHERE status NOT IN ('DRAFT', 'CANCELLED')
            ORDER BY due_date ASC NULLS LAST, invoice_date ASC, id ASC
            FOR UPDATE
            "#,
        )
        .fetch_all(executor)
        .await
        .map_err(map_lock_error)?;

        Ok(invoices)
    }

    /// Grava saldo + status recalculado. O status nunca é atualizado sozinho.
    pub async fn update_invoice_balance<'e, E>(
        &self,
        executor: E,
        invoice_id: Uuid,
        new_balance: Decimal,
        new_status: InvoiceStatus,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            UPDATE invoices
            SET balance = $2, status = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(invoice_id)
        .bind(new_balance)
        .bind(new_status)
        .execute(executor)
        .await?;

        Ok(())
    }

    // ---
    // Pagamentos e aplicações
    // ---

    pub async fn create_payment<'e, E>(
        &self,
        executor: E,
        customer_id: Uuid,
        amount: Decimal,
        payment_method: PaymentMethod,
        payment_date: NaiveDate,
        reference_number: Option<&str>,
        notes: Option<&str>,
    ) -> Result<CustomerPayment, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let payment = sqlx::query_as::<_, CustomerPayment>(
            r#"
            INSERT INTO customer_payments (customer_id, amount, payment_method, payment_date, reference_number, notes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, customer_id, amount, payment_method, payment_date, reference_number, notes, status, created_at
            "#,
        )
        .bind(customer_id)
        .bind(amount)
        .bind(payment_method)
        .bind(payment_date)
        .bind(reference_number)
        .bind(notes)
        .fetch_one(executor)
        .await?;

        Ok(payment)
    }

    pub async fn create_payment_application<'e, E>(
        &self,
        executor: E,
        payment_id: Uuid,
        invoice_id: Uuid,
        amount_applied: Decimal,
    ) -> Result<PaymentApplication, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let application = sqlx::query_as::<_, PaymentApplication>(
            r#"
            INSERT INTO payment_applications (payment_id, invoice_id, amount_applied)
            VALUES ($1, $2, $3)
            RETURNING id, payment_id, invoice_id, amount_applied, created_at
            "#,
        )
        .bind(payment_id)
        .bind(invoice_id)
        .bind(amount_applied)
        .fetch_one(executor)
        .await?;

        Ok(application)
    }

    // ---
    // Créditos
    // ---

    pub async fn create_credit<'e, E>(
        &self,
        executor: E,
        customer_id: Uuid,
        source_payment_id: Uuid,
        amount: Decimal,
    ) -> Result<Credit, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        // Nasce com available_amount = amount: nada foi consumido ainda.
        let credit = sqlx::query_as::<_, Credit>(
            r#"
            INSERT INTO credits (customer_id, source_payment_id, amount, available_amount)
            VALUES ($1, $2, $3, $3)
            RETURNING id, customer_id, source_payment_id, amount, available_amount, status, created_at
            "#,
        )
        .bind(customer_id)
        .bind(source_payment_id)
        .bind(amount)
        .fetch_one(executor)
        .await?;

        Ok(credit)
    }

    pub async fn get_credit_for_update<'e, E>(
        &self,
        executor: E,
        credit_id: Uuid,
    ) -> Result<Option<Credit>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let credit = sqlx::query_as::<_, Credit>(
            r#"
            SELECT id, customer_id, source_payment_id, amount, available_amount, status, created_at
            FROM credits
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(credit_id)
        .fetch_optional(executor)
        .await
        .map_err(map_lock_error)?;

        Ok(credit)
    }

    pub async fn update_credit_available<'e, E>(
        &self,
        executor: E,
        credit_id: Uuid,
        new_available: Decimal,
        new_status: CreditStatus,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("UPDATE credits SET available_amount = $2, status = $3 WHERE id = $1")
            .bind(credit_id)
            .bind(new_available)
            .bind(new_status)
            .execute(executor)
            .await?;

        Ok(())
    }

    pub async fn create_credit_application<'e, E>(
        &self,
        executor: E,
        credit_id: Uuid,
        invoice_id: Uuid,
        amount_applied: Decimal,
        applied_date: NaiveDate,
    ) -> Result<CreditApplication, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let application = sqlx::query_as::<_, CreditApplication>(
            r#"
            INSERT INTO credit_applications (credit_id, invoice_id, amount_applied, applied_date)
            VALUES ($1, $2, $3, $4)
            RETURNING id, credit_id, invoice_id, amount_applied, applied_date, created_at
            "#,
        )
        .bind(credit_id)
        .bind(invoice_id)
        .bind(amount_applied)
        .bind(applied_date)
        .fetch_one(executor)
        .await?;

        Ok(application)
    }

    // ---
    // Agregados para o backfill de saldos
    // ---

    pub async fn sum_payment_applications_by_invoice<'e, E>(
        &self,
        executor: E,
    ) -> Result<Vec<AppliedTotal>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let totals = sqlx::query_as::<_, AppliedTotal>(
            r#"
            SELECT invoice_id, COALESCE(SUM(amount_applied), 0) AS total
            FROM payment_applications
            GROUP BY invoice_id
            "#,
        )
        .fetch_all(executor)
        .await?;

        Ok(totals)
    }

    pub async fn sum_credit_applications_by_invoice<'e, E>(
        &self,
        executor: E,
    ) -> Result<Vec<AppliedTotal>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let totals = sqlx::query_as::<_, AppliedTotal>(
            r#"
            SELECT invoice_id, COALESCE(SUM(amount_applied), 0) AS total
            FROM credit_applications
            GROUP BY invoice_id
            "#,
        )
        .fetch_all(executor)
        .await?;

        Ok(totals)
    }
}
