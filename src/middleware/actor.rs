// src/middleware/actor.rs

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::common::error::AppError;

// O cabeçalho HTTP com o usuário responsável pela operação. A autenticação
// em si mora num gateway externo; aqui só precisamos de quem assina a
// trilha de auditoria.
const ACTOR_ID_HEADER: &str = "x-actor-id";

// Extrator do usuário que executa a operação.
#[derive(Debug, Clone)]
pub struct ActorContext(pub Uuid);

impl<S> FromRequestParts<S> for ActorContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let header_value = parts.headers.get(ACTOR_ID_HEADER);

        match header_value {
            Some(value) => {
                let value_str = value.to_str().map_err(|_| {
                    AppError::InvalidArgument(
                        "Cabeçalho X-Actor-ID contém caracteres inválidos.".to_string(),
                    )
                })?;

                let actor_id = Uuid::parse_str(value_str).map_err(|_| {
                    AppError::InvalidArgument(
                        "Cabeçalho X-Actor-ID inválido (não é um UUID).".to_string(),
                    )
                })?;

                Ok(ActorContext(actor_id))
            }
            None => Err(AppError::InvalidArgument(
                "O cabeçalho X-Actor-ID é obrigatório.".to_string(),
            )),
        }
    }
}
