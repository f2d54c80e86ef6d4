// src/handlers/ledger.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{common::error::AppError, config::AppState, models::ledger::CustomerLedger};

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct LedgerQuery {
    /// Início do período (inclusivo). Sem ele, o extrato começa do baseline.
    #[param(value_type = Option<String>, format = Date, example = "2025-01-01")]
    pub start_date: Option<NaiveDate>,

    /// Fim do período (inclusivo).
    #[param(value_type = Option<String>, format = Date, example = "2025-12-31")]
    pub end_date: Option<NaiveDate>,
}

// GET /api/billing/customers/{customer_id}/ledger
#[utoipa::path(
    get,
    path = "/api/billing/customers/{customer_id}/ledger",
    tag = "Ledger",
    responses(
        (status = 200, description = "Extrato cronológico com saldo acumulado", body = CustomerLedger),
        (status = 400, description = "Intervalo de datas inválido"),
        (status = 404, description = "Cliente não encontrado")
    ),
    params(
        ("customer_id" = Uuid, Path, description = "ID do cliente"),
        LedgerQuery
    )
)]
pub async fn get_customer_ledger(
    State(app_state): State<AppState>,
    Path(customer_id): Path<Uuid>,
    Query(query): Query<LedgerQuery>,
) -> Result<impl IntoResponse, AppError> {
    let ledger = app_state
        .ledger_service
        .get_ledger(customer_id, query.start_date, query.end_date)
        .await?;

    Ok((StatusCode::OK, Json(ledger)))
}
