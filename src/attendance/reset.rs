use super::error::StoreError;
use crate::store::ResetTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetSummary {
    pub updated: usize,
    pub batches: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ResetError {
    #[error("could not list users: {0}")]
    Listing(#[source] StoreError),

    /// Batches before `committed_batches` are durable; nothing after is.
    #[error("reset stopped after {committed_batches} of {total_batches} batches ({updated} users reset)")]
    Partial {
        committed_batches: usize,
        total_batches: usize,
        updated: usize,
        #[source]
        source: StoreError,
    },
}

/// Clears every user's aggregates and daily logs, `batch_size` users per commit.
pub fn reset_all_users<T: ResetTarget>(
    target: &T,
    batch_size: usize,
) -> Result<ResetSummary, ResetError> {
    let user_ids = target.list_user_ids().map_err(ResetError::Listing)?;
    if user_ids.is_empty() {
        tracing::info!("no users to reset");
        return Ok(ResetSummary {
            updated: 0,
            batches: 0,
        });
    }

    let chunks: Vec<&[String]> = user_ids.chunks(batch_size.max(1)).collect();
    let total_batches = chunks.len();
    let mut updated = 0;
    for (i, chunk) in chunks.into_iter().enumerate() {
        if let Err(source) = target.reset_batch(chunk) {
            tracing::error!(
                batch = i + 1,
                total_batches,
                updated,
                error = %source,
                "semester reset batch failed"
            );
            return Err(ResetError::Partial {
                committed_batches: i,
                total_batches,
                updated,
                source,
            });
        }
        updated += chunk.len();
        tracing::info!(
            "Committed batch {}/{} ({} updates)",
            i + 1,
            total_batches,
            chunk.len()
        );
    }

    Ok(ResetSummary {
        updated,
        batches: total_batches,
    })
}
