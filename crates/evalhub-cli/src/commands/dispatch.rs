//! `evalhub dispatch`: submit every benchmark of an evaluation.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{info, warn};

use evalhub_core::EvalHubConfig;
use evalhub_runtime::LogStatusSink;

use super::{build_runtime, load_evaluation};

pub async fn dispatch(config: &EvalHubConfig, evaluation_path: &Path) -> Result<()> {
    let evaluation = Arc::new(load_evaluation(evaluation_path)?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runtime = build_runtime(config, shutdown_rx).await?;

    let handle = runtime.dispatch(evaluation.clone(), Arc::new(LogStatusSink))?;

    // Ctrl-C stops workers from picking up more benchmarks.
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("shutdown signal received, cancelling dispatch");
            shutdown_tx.send_replace(true);
        }
    });

    let summary = handle.wait().await;
    signal.abort();

    info!(
        job_id = %evaluation.id,
        total = summary.total,
        succeeded = summary.succeeded,
        failed = summary.failed,
        cancelled = summary.cancelled,
        "dispatch finished"
    );
    println!(
        "{}",
        serde_json::json!({
            "job_id": evaluation.id,
            "runtime": runtime.name(),
            "total": summary.total,
            "succeeded": summary.succeeded,
            "failed": summary.failed,
            "cancelled": summary.cancelled,
        })
    );
    Ok(())
}
