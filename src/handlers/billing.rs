// src/handlers/billing.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::actor::ActorContext,
    models::{
        billing::PaymentMethod,
        ledger::{AllocationSummary, BackfillSummary, CreditApplicationSummary},
    },
    services::allocation::AllocationPreview,
    services::billing_service::{ApplyCreditRequest, RecordPaymentRequest},
};

// =============================================================================
//  ÁREA 1: PAGAMENTOS (Alocação)
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordPaymentPayload {
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub customer_id: Uuid,

    // Validação de positividade acontece no serviço, antes da transação.
    #[schema(example = "1000.00")]
    pub amount: Decimal,

    #[schema(example = "PIX")]
    pub payment_method: PaymentMethod,

    #[schema(value_type = String, format = Date, example = "2025-12-05")]
    pub payment_date: NaiveDate,

    #[validate(length(max = 64, message = "max_64"))]
    #[schema(example = "PIX-8842")]
    pub reference_number: Option<String>,

    #[validate(length(max = 500, message = "max_500"))]
    pub notes: Option<String>,

    // Se presente, restringe a alocação a estas faturas.
    pub invoice_ids: Option<Vec<Uuid>>,
}

// POST /api/billing/payments
#[utoipa::path(
    post,
    path = "/api/billing/payments",
    tag = "Billing",
    request_body = RecordPaymentPayload,
    responses(
        (status = 201, description = "Pagamento registrado e alocado", body = AllocationSummary),
        (status = 400, description = "Dados inválidos"),
        (status = 404, description = "Cliente não encontrado"),
        (status = 409, description = "Conflito de concorrência (vale tentar de novo)")
    ),
    params(
        ("x-actor-id" = Uuid, Header, description = "Usuário responsável pela operação")
    )
)]
pub async fn record_payment(
    State(app_state): State<AppState>,
    actor: ActorContext,
    Json(payload): Json<RecordPaymentPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let summary = app_state
        .billing_service
        .record_payment(RecordPaymentRequest {
            customer_id: payload.customer_id,
            amount: payload.amount,
            payment_method: payload.payment_method,
            payment_date: payload.payment_date,
            reference_number: payload.reference_number,
            notes: payload.notes,
            invoice_ids: payload.invoice_ids,
            actor_id: actor.0,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(summary)))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PreviewPaymentPayload {
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub customer_id: Uuid,

    #[schema(example = "1000.00")]
    pub amount: Decimal,

    pub invoice_ids: Option<Vec<Uuid>>,
}

// POST /api/billing/payments/preview
#[utoipa::path(
    post,
    path = "/api/billing/payments/preview",
    tag = "Billing",
    request_body = PreviewPaymentPayload,
    responses(
        (status = 200, description = "Simulação da alocação (nada é gravado)", body = AllocationPreview),
        (status = 404, description = "Cliente não encontrado")
    )
)]
pub async fn preview_payment(
    State(app_state): State<AppState>,
    Json(payload): Json<PreviewPaymentPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let preview = app_state
        .billing_service
        .preview_allocation(payload.customer_id, payload.amount, payload.invoice_ids)
        .await?;

    Ok((StatusCode::OK, Json(preview)))
}

// =============================================================================
//  ÁREA 2: CRÉDITOS
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplyCreditPayload {
    #[schema(example = "550e8400-e29b-41d4-a716-446655440001")]
    pub invoice_id: Uuid,

    #[schema(example = "300.00")]
    pub amount: Decimal,
}

// POST /api/billing/credits/{credit_id}/apply
#[utoipa::path(
    post,
    path = "/api/billing/credits/{credit_id}/apply",
    tag = "Billing",
    request_body = ApplyCreditPayload,
    responses(
        (status = 200, description = "Crédito aplicado à fatura", body = CreditApplicationSummary),
        (status = 404, description = "Crédito ou fatura não encontrados"),
        (status = 422, description = "Saldo de crédito ou de fatura insuficiente"),
        (status = 409, description = "Conflito de concorrência (vale tentar de novo)")
    ),
    params(
        ("credit_id" = Uuid, Path, description = "ID do crédito"),
        ("x-actor-id" = Uuid, Header, description = "Usuário responsável pela operação")
    )
)]
pub async fn apply_credit(
    State(app_state): State<AppState>,
    actor: ActorContext,
    Path(credit_id): Path<Uuid>,
    Json(payload): Json<ApplyCreditPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let summary = app_state
        .billing_service
        .apply_credit(ApplyCreditRequest {
            credit_id,
            invoice_id: payload.invoice_id,
            amount: payload.amount,
            actor_id: actor.0,
        })
        .await?;

    Ok((StatusCode::OK, Json(summary)))
}

// =============================================================================
//  ÁREA 3: MANUTENÇÃO (Backfill)
// =============================================================================

// POST /api/billing/maintenance/initialize-balances
#[utoipa::path(
    post,
    path = "/api/billing/maintenance/initialize-balances",
    tag = "Billing",
    responses(
        (status = 200, description = "Saldos recalculados a partir das aplicações", body = BackfillSummary)
    ),
    params(
        ("x-actor-id" = Uuid, Header, description = "Operador que disparou o backfill")
    )
)]
pub async fn initialize_balances(
    State(app_state): State<AppState>,
    actor: ActorContext,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!(actor_id = %actor.0, "Backfill de saldos disparado manualmente");

    let summary = app_state
        .billing_service
        .initialize_balances()
        .await?;

    Ok((StatusCode::OK, Json(summary)))
}
