// src/config.rs

use std::{env, sync::Arc, time::Duration};

use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::{
    db::{BillingRepository, LedgerRepository},
    services::{BillingService, LedgerService, audit::TracingAuditSink},
};

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub billing_service: BillingService,
    pub ledger_service: LedgerService,
}

impl AppState {
    pub async fn new() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL deve ser definida");

        // Conecta ao banco de dados, usando '?' para propagar erros
        let db_pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&database_url)
            .await?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        // --- Monta o gráfico de dependências ---
        let billing_repo = BillingRepository::new(db_pool.clone());
        let ledger_repo = LedgerRepository::new(db_pool.clone());

        // Auditoria como colaborador injetado: o motor não conhece o destino
        // dos registros, só o trait.
        let audit_sink = Arc::new(TracingAuditSink);

        let billing_service = BillingService::new(billing_repo, audit_sink);
        let ledger_service = LedgerService::new(ledger_repo);

        Ok(Self {
            db_pool,
            billing_service,
            ledger_service,
        })
    }
}
