//! `evalhub teardown`: delete an evaluation's cluster objects.

use std::path::Path;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::info;

use evalhub_core::EvalHubConfig;

use super::{build_runtime, load_evaluation};

pub async fn teardown(config: &EvalHubConfig, evaluation_path: &Path) -> Result<()> {
    let evaluation = load_evaluation(evaluation_path)?;
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let runtime = build_runtime(config, shutdown_rx).await?;

    runtime
        .teardown(&evaluation)
        .await
        .with_context(|| format!("tearing down evaluation {}", evaluation.id))?;

    info!(job_id = %evaluation.id, "evaluation resources deleted");
    Ok(())
}
