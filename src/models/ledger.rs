// src/models/ledger.rs

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

// --- Extrato do cliente (somente leitura) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerEntryKind {
    // A ordem dos variantes define o desempate no mesmo dia:
    // cobranças novas aparecem antes do dinheiro recebido contra elas.
    Invoice,
    Payment,
    CreditApplication,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    #[schema(value_type = String, format = Date, example = "2025-12-01")]
    pub date: NaiveDate,

    pub kind: LedgerEntryKind,

    // ID do documento de origem (fatura, pagamento ou crédito)
    pub document_id: Uuid,

    #[schema(example = "Fatura emitida")]
    pub description: String,

    #[schema(example = "1000.00")]
    pub debit: Option<Decimal>,
    #[schema(example = "1000.00")]
    pub credit: Option<Decimal>,

    // Saldo acumulado após este lançamento
    #[schema(example = "0.00")]
    pub balance: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomerLedger {
    pub customer_id: Uuid,

    #[schema(example = "0.00")]
    pub opening_balance: Decimal,

    pub transactions: Vec<LedgerEntry>,

    #[schema(example = "0.00")]
    pub closing_balance: Decimal,
}

// --- Resultados das operações de escrita ---

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AllocationSummary {
    pub payment_id: Uuid,

    #[schema(example = "700.00")]
    pub total_allocated: Decimal,
    // Sobra que virou crédito reutilizável. O chamador precisa ver isso
    // explicitamente: quem paga 1000 pode não esperar que 300 virem troco.
    #[schema(example = "300.00")]
    pub total_credit: Decimal,

    pub credit_id: Option<Uuid>,
    pub invoices_affected: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreditApplicationSummary {
    #[schema(example = "300.00")]
    pub amount_applied: Decimal,
    #[schema(example = "0.00")]
    pub credit_remaining: Decimal,
    #[schema(example = "200.00")]
    pub invoice_new_balance: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackfillSummary {
    #[schema(example = 12)]
    pub updated_count: u64,
}
