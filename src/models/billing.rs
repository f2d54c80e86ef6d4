// src/models/billing.rs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Enums (Mapeando o Postgres) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "invoice_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Draft,     // Rascunho (fora do fluxo de cobrança)
    Open,      // Em aberto
    Partial,   // Pago parcialmente
    Paid,      // Quitada
    Overdue,   // Vencida
    Cancelled, // Cancelada
}

impl InvoiceStatus {
    /// Deriva o status a partir do saldo. O status NUNCA é editado à mão:
    /// toda mutação de saldo recalcula aqui, então ele não pode divergir.
    ///
    /// Draft e Cancelled são estados explícitos, não derivados; esta função
    /// só se aplica a faturas dentro do fluxo de cobrança.
    pub fn derive(
        balance: Decimal,
        total_amount: Decimal,
        due_date: Option<NaiveDate>,
        today: NaiveDate,
    ) -> InvoiceStatus {
        if balance <= Decimal::ZERO {
            return InvoiceStatus::Paid;
        }
        if let Some(due) = due_date {
            if due < today {
                return InvoiceStatus::Overdue;
            }
        }
        if balance < total_amount {
            InvoiceStatus::Partial
        } else {
            InvoiceStatus::Open
        }
    }

    /// Fatura elegível para receber alocação de pagamento/crédito?
    pub fn is_payable(self) -> bool {
        !matches!(self, InvoiceStatus::Draft | InvoiceStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "payment_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "payment_method", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    Pix,
    BankTransfer,
    CreditCard,
    DebitCard,
    Cheque,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "credit_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreditStatus {
    Active,
    Exhausted,
    Cancelled,
}

// --- Structs ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: Uuid,

    #[schema(example = "Maria da Silva")]
    pub full_name: String,

    // Saldo devedor anterior ao primeiro lançamento rastreado.
    // Definido na criação do cliente e imutável depois.
    #[schema(example = "0.00")]
    pub opening_balance: Decimal,

    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: Uuid,
    pub customer_id: Uuid,

    // Valor original, fixado na emissão
    #[schema(example = "500.00")]
    pub total_amount: Decimal,
    // Quanto falta pagar. Só diminui, nunca fica negativo.
    #[schema(example = "500.00")]
    pub balance: Decimal,

    pub status: InvoiceStatus,

    #[schema(value_type = Option<String>, format = Date, example = "2025-12-31")]
    pub due_date: Option<NaiveDate>,
    #[schema(value_type = String, format = Date, example = "2025-12-01")]
    pub invoice_date: NaiveDate,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomerPayment {
    pub id: Uuid,
    pub customer_id: Uuid,

    // Imutável depois de registrado; estornos viram registros novos.
    #[schema(example = "1000.00")]
    pub amount: Decimal,

    pub payment_method: PaymentMethod,

    #[schema(value_type = String, format = Date, example = "2025-12-05")]
    pub payment_date: NaiveDate,

    #[schema(example = "PIX-8842")]
    pub reference_number: Option<String>,
    pub notes: Option<String>,

    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentApplication {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub invoice_id: Uuid,

    #[schema(example = "500.00")]
    pub amount_applied: Decimal,

    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Credit {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub source_payment_id: Uuid,

    // Valor do troco que originou o crédito (fixo)
    #[schema(example = "300.00")]
    pub amount: Decimal,
    // Quanto ainda pode ser consumido. Zerou => EXHAUSTED.
    #[schema(example = "300.00")]
    pub available_amount: Decimal,

    pub status: CreditStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreditApplication {
    pub id: Uuid,
    pub credit_id: Uuid,
    pub invoice_id: Uuid,

    #[schema(example = "300.00")]
    pub amount_applied: Decimal,

    #[schema(value_type = String, format = Date, example = "2025-12-10")]
    pub applied_date: NaiveDate,

    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    #[test]
    fn saldo_zerado_vira_paid() {
        let status = InvoiceStatus::derive(dec!(0), dec!(100), Some(day(1)), day(10));
        assert_eq!(status, InvoiceStatus::Paid);
    }

    #[test]
    fn vencida_com_saldo_vira_overdue() {
        let status = InvoiceStatus::derive(dec!(40), dec!(100), Some(day(5)), day(10));
        assert_eq!(status, InvoiceStatus::Overdue);
    }

    #[test]
    fn vencimento_hoje_ainda_nao_e_overdue() {
        let status = InvoiceStatus::derive(dec!(100), dec!(100), Some(day(10)), day(10));
        assert_eq!(status, InvoiceStatus::Open);
    }

    #[test]
    fn saldo_parcial_vira_partial() {
        let status = InvoiceStatus::derive(dec!(40), dec!(100), None, day(10));
        assert_eq!(status, InvoiceStatus::Partial);
    }

    #[test]
    fn saldo_cheio_sem_vencimento_vira_open() {
        let status = InvoiceStatus::derive(dec!(100), dec!(100), None, day(10));
        assert_eq!(status, InvoiceStatus::Open);
    }
}
