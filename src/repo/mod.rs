use anyhow::Result;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::info;

use crate::config::StorageConfig;

pub mod predictions;

pub use predictions::{
    HistoryEntry, InMemoryPredictionLog, PredictionLog, PredictionRecord, PredictionRepository,
};

/// Build the configured prediction log, pruning expired rows when a retention is set
pub async fn prediction_log(cfg: &StorageConfig) -> Result<Arc<dyn PredictionLog>> {
    let Some(path) = &cfg.database_path else {
        info!("recording predictions in memory only");
        return Ok(Arc::new(InMemoryPredictionLog::new()));
    };

    let repo = PredictionRepository::connect(path, cfg.max_connections).await?;
    info!(path = %path.display(), "recording predictions to sqlite");

    if let Some(days) = cfg.retention_days {
        let before = Utc::now().fixed_offset() - Duration::days(i64::from(days));
        let removed = repo.delete_old_data(before).await?;
        if removed > 0 {
            info!(removed, retention_days = days, "pruned expired predictions");
        }
    }

    Ok(Arc::new(repo))
}
