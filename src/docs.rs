// src/docs.rs

use utoipa::OpenApi;

use crate::handlers;
use crate::models;
use crate::services;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Billing ---
        handlers::billing::record_payment,
        handlers::billing::preview_payment,
        handlers::billing::apply_credit,
        handlers::billing::initialize_balances,

        // --- Ledger ---
        handlers::ledger::get_customer_ledger,
    ),
    components(
        schemas(
            // --- Billing ---
            models::billing::InvoiceStatus,
            models::billing::PaymentStatus,
            models::billing::PaymentMethod,
            models::billing::CreditStatus,
            models::billing::Customer,
            models::billing::Invoice,
            models::billing::CustomerPayment,
            models::billing::PaymentApplication,
            models::billing::Credit,
            models::billing::CreditApplication,

            // --- Resultados ---
            models::ledger::AllocationSummary,
            models::ledger::CreditApplicationSummary,
            models::ledger::BackfillSummary,
            models::ledger::LedgerEntryKind,
            models::ledger::LedgerEntry,
            models::ledger::CustomerLedger,
            services::allocation::PlannedApplication,
            services::allocation::AllocationPreview,

            // --- Payloads ---
            handlers::billing::RecordPaymentPayload,
            handlers::billing::PreviewPaymentPayload,
            handlers::billing::ApplyCreditPayload,
        )
    ),
    tags(
        (name = "Billing", description = "Registro de pagamentos, alocação e créditos"),
        (name = "Ledger", description = "Extrato do cliente com saldo acumulado")
    )
)]
pub struct ApiDoc;
