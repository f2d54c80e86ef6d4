// src/services/audit.rs
//
// Trilha de auditoria como colaborador explícito, injetado no serviço.
// O registro acontece DEPOIS do commit e é melhor-esforço: uma falha aqui
// jamais derruba a transação financeira que já foi confirmada.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub actor_id: Uuid,
    pub action: &'static str,
    pub entity_type: &'static str,
    pub entity_id: Uuid,
    pub before_snapshot: Option<Value>,
    pub after_snapshot: Value,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord);
}

/// Implementação padrão: emite o registro como evento estruturado de log.
/// Um coletor externo pode reprocessar a partir daí.
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: AuditRecord) {
        tracing::info!(
            target: "audit",
            actor_id = %record.actor_id,
            action = record.action,
            entity_type = record.entity_type,
            entity_id = %record.entity_id,
            snapshot = %record.after_snapshot,
            "Registro de auditoria"
        );
    }
}
