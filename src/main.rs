//! Worker entry point for the CVE rehearsal lab orchestrator.
//!
//! Boots the durable stack (config, logging, SQLite pool, migrations),
//! wires every adapter behind its port, resumes any workflow runs left
//! mid-flight by a prior crash, and starts the expiry sweeper. The
//! request-side API (`LabUseCase`) and admin maintenance surface are
//! constructed here too even though this binary exposes no transport of
//! its own (§1) — an external handler layer is expected to embed this
//! crate and call into them directly.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use lab_orchestrator::adapters::http::{HttpProvisioningBackend, HttpRuntimeResourceManager, TcpHttpReadinessProber};
use lab_orchestrator::adapters::sqlite::{
    all_embedded_migrations, create_pool, verify_connection, Migrator, SqliteAdminCleanupRepository, SqliteCveRepository,
    SqliteLabRepository, SqliteWorkflowStore,
};
use lab_orchestrator::application::LabUseCase;
use lab_orchestrator::infrastructure::config::ConfigLoader;
use lab_orchestrator::infrastructure::logging::audit::AuditLogger;
use lab_orchestrator::infrastructure::logging::{LogRotator, LoggerImpl};
use lab_orchestrator::services::{AdminMaintenanceService, ExpirySweeper, GuardrailEvaluator, MutationService, TemplateBlueprintService};
use lab_orchestrator::workflow::WorkflowEngine;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ConfigLoader::load().context("failed to load configuration")?;
    let _logger = LoggerImpl::init(&config.logging).context("failed to initialize logger")?;

    tracing::info!("starting lab orchestrator worker");

    let pool = create_pool(&config.database).await.context("failed to create sqlite pool")?;
    verify_connection(&pool).await.context("database connection check failed")?;

    let migrator = Migrator::new(pool.clone());
    let applied = migrator
        .run_embedded_migrations(all_embedded_migrations())
        .await
        .context("failed to run embedded migrations")?;
    tracing::info!(applied, "schema migrations applied");

    let lab_repository = Arc::new(SqliteLabRepository::new(pool.clone()));
    let cve_repository = Arc::new(SqliteCveRepository::new(pool.clone()));
    let workflow_store = Arc::new(SqliteWorkflowStore::new(pool.clone()));
    let admin_cleanup_repository = Arc::new(SqliteAdminCleanupRepository::new(pool.clone()));

    let audit = Arc::new(AuditLogger::new(&config.audit_log_path).await.context("failed to open audit log")?);

    let blueprint_service = Arc::new(TemplateBlueprintService::default());
    let prober = Arc::new(TcpHttpReadinessProber::new(&config.prober).context("failed to build readiness prober")?);
    let provisioner = Arc::new(
        HttpProvisioningBackend::new(config.collaborators.provisioner_base_url.clone())
            .context("failed to build provisioning backend client")?,
    );
    let resource_manager = Arc::new(
        HttpRuntimeResourceManager::new(config.collaborators.runtime_resource_manager_base_url.clone())
            .context("failed to build runtime resource manager client")?,
    );

    let guardrail = Arc::new(GuardrailEvaluator::new(config.guardrails.clone()));
    let mutation = Arc::new(
        MutationService::new(Arc::clone(&lab_repository), Arc::clone(&blueprint_service)).with_audit(Arc::clone(&audit)),
    );

    let prober_deadline = Duration::from_secs(config.prober.overall_deadline_secs);
    let engine = WorkflowEngine::new(
        Arc::clone(&workflow_store),
        Arc::clone(&mutation),
        Arc::clone(&provisioner),
        Arc::clone(&prober),
        &config.workflow,
        prober_deadline,
        Some(Arc::clone(&audit)),
    );

    let resumed = engine.resume_recoverable().await.context("failed to resume in-flight workflow runs")?;
    if resumed > 0 {
        tracing::info!(resumed, "resumed workflow runs after lease expiry");
    }

    // Neither of these has a caller inside this binary — no transport layer
    // is in scope (§1) — but both are constructed here so an embedding
    // handler can be wired in without touching this boot sequence.
    let _lab_use_case = Arc::new(LabUseCase::new(
        Arc::clone(&lab_repository),
        Arc::clone(&cve_repository),
        Arc::clone(&mutation),
        Arc::clone(&guardrail),
        Arc::new(engine),
    ));
    let _admin_maintenance = Arc::new(AdminMaintenanceService::new(
        Arc::clone(&lab_repository),
        resource_manager,
        admin_cleanup_repository,
        config.admin.resource_prefix.clone(),
    ));

    if let Some(log_dir) = config.logging.log_dir.clone() {
        let retention_days = u32::try_from(config.logging.retention_days.max(0)).unwrap_or(u32::MAX);
        let rotator = LogRotator::new(retention_days, 100 * 1024 * 1024);
        tokio::spawn(async move {
            let _ = rotator.run_periodic_cleanup(log_dir, Duration::from_secs(3600)).await;
        });
    }

    let sweeper = ExpirySweeper::new(
        Arc::clone(&lab_repository),
        Arc::clone(&workflow_store),
        Arc::clone(&mutation),
        Duration::from_secs(config.sweeper.poll_interval_secs),
    );
    let sweeper_handle = Arc::new(sweeper).start();

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown signal received, stopping worker");
    sweeper_handle.abort();

    Ok(())
}
