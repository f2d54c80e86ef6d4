// src/common/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

// Nosso tipo de erro, com `thiserror` para melhor ergonomia.
// A taxonomia segue o motor de cobrança: NotFound, InvalidArgument,
// InvalidOperation, Conflict (retryable) e erros internos.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Argumento inválido: {0}")]
    InvalidArgument(String),

    #[error("Cliente não encontrado: {0}")]
    CustomerNotFound(Uuid),

    #[error("Fatura não encontrada: {0}")]
    InvoiceNotFound(Uuid),

    #[error("Crédito não encontrado: {0}")]
    CreditNotFound(Uuid),

    // Pré-condição de negócio violada (saldo insuficiente, crédito esgotado...).
    // A requisição inteira falha, nunca há efeito parcial.
    #[error("Operação inválida: {0}")]
    InvalidOperation(String),

    // Disputa de lock/versão sob concorrência. Esperado sob contenção;
    // o chamador (ou o serviço, com retry limitado) deve tentar de novo.
    #[error("Conflito de concorrência: {0}")]
    Conflict(String),

    // Variante para erros de banco de dados (sqlx)
    #[error("Erro de banco de dados")]
    DatabaseError(#[from] sqlx::Error),

    // Variante genérica para qualquer outro erro inesperado
    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),
}

impl AppError {
    /// Conflito de lock/serialização é esperado sob contenção e vale retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Conflict(_))
    }
}

/// Converte erros do Postgres que indicam disputa de lock em `Conflict`,
/// para que o chamador saiba que vale a pena tentar de novo.
/// 55P03 = lock_not_available, 40001 = serialization_failure,
/// 40P01 = deadlock_detected.
pub fn map_lock_error(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &e {
        if let Some(code) = db_err.code() {
            if code == "55P03" || code == "40001" || code == "40P01" {
                return AppError::Conflict(
                    "Outra operação está mexendo nas mesmas faturas. Tente novamente.".to_string(),
                );
            }
        }
    }
    AppError::DatabaseError(e)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            // Retorna todos os detalhes da validação.
            AppError::ValidationError(errors) => {
                let mut details = std::collections::HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors
                        .iter()
                        .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                let body = Json(json!({
                    "error": "Um ou mais campos são inválidos.",
                    "details": details,
                }));
                return (StatusCode::BAD_REQUEST, body).into_response();
            }

            AppError::InvalidArgument(msg) => (StatusCode::BAD_REQUEST, msg),

            AppError::CustomerNotFound(id) => {
                (StatusCode::NOT_FOUND, format!("Cliente não encontrado: {id}"))
            }
            AppError::InvoiceNotFound(id) => {
                (StatusCode::NOT_FOUND, format!("Fatura não encontrada: {id}"))
            }
            AppError::CreditNotFound(id) => {
                (StatusCode::NOT_FOUND, format!("Crédito não encontrado: {id}"))
            }

            AppError::InvalidOperation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),

            AppError::Conflict(msg) => {
                let body = Json(json!({ "error": msg, "retryable": true }));
                return (StatusCode::CONFLICT, body).into_response();
            }

            // Todos os outros erros (DatabaseError, InternalServerError) viram 500.
            // O `tracing` vai logar a mensagem detalhada que `thiserror` nos deu.
            ref e => {
                tracing::error!("Erro Interno do Servidor: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Ocorreu um erro inesperado.".to_string(),
                )
            }
        };

        // Resposta padrão para erros simples que só têm uma mensagem.
        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn so_conflito_de_concorrencia_vale_retry() {
        assert!(AppError::Conflict("disputa de lock".to_string()).is_retryable());

        assert!(!AppError::InvalidArgument("valor".to_string()).is_retryable());
        assert!(!AppError::InvalidOperation("saldo".to_string()).is_retryable());
        assert!(!AppError::CustomerNotFound(Uuid::nil()).is_retryable());
    }
}
