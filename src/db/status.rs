//! Guarded processing-status transitions for every status-tracked table

use super::Database;
use crate::error::{Error, Result};
use crate::lifecycle::{now_timestamp, ProcessingStatus, StatusTrackable};
use sqlx::sqlite::SqliteRow;
use sqlx::FromRow;
use tracing::{debug, warn};

impl Database {
    // ===== Status Transitions =====

    /// pending -> processing, stamping `processing_started_at`
    pub async fn mark_processing<T>(&self, id: &str, message: &str) -> Result<T>
    where
        T: StatusTrackable + for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        self.transition::<T>(id, ProcessingStatus::Processing, message).await
    }

    /// pending/processing -> completed, stamping `processing_completed_at`
    pub async fn mark_completed<T>(&self, id: &str, message: &str) -> Result<T>
    where
        T: StatusTrackable + for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        self.transition::<T>(id, ProcessingStatus::Completed, message).await
    }

    /// pending/processing -> failed, stamping `processing_completed_at`
    pub async fn mark_failed<T>(&self, id: &str, error_message: &str) -> Result<T>
    where
        T: StatusTrackable + for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        self.transition::<T>(id, ProcessingStatus::Failed, error_message).await
    }

    /// pending/processing -> cancelled, stamping `processing_completed_at`
    pub async fn mark_cancelled<T>(&self, id: &str, message: &str) -> Result<T>
    where
        T: StatusTrackable + for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        self.transition::<T>(id, ProcessingStatus::Cancelled, message).await
    }

    async fn transition<T>(&self, id: &str, target: ProcessingStatus, message: &str) -> Result<T>
    where
        T: StatusTrackable + for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let stamp_column = if target == ProcessingStatus::Processing {
            "processing_started_at"
        } else {
            "processing_completed_at"
        };
        let sources = target
            .allowed_sources()
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!(
            "UPDATE {table} SET status = ?1, status_message = ?2, {stamp_column} = ?3, updated_at = ?3 \
             WHERE id = ?4 AND status IN ({sources}) RETURNING *",
            table = T::TABLE,
        );

        let updated = sqlx::query_as::<_, T>(&sql)
            .bind(target)
            .bind(message)
            .bind(now_timestamp())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(record) = updated {
            debug!("{} {} -> {}", T::ENTITY, id, target);
            return Ok(record);
        }

        Err(self.rejected_transition::<T>(id, target).await?)
    }

    /// Explain why a guarded transition matched no row: missing record or illegal edge
    pub(super) async fn rejected_transition<T: StatusTrackable>(
        &self,
        id: &str,
        target: ProcessingStatus,
    ) -> Result<Error> {
        let current: Option<ProcessingStatus> =
            sqlx::query_scalar(&format!("SELECT status FROM {} WHERE id = ?", T::TABLE))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(match current {
            None => T::not_found(id),
            Some(from) => {
                warn!("Rejected {} transition for {}: {} -> {}", T::ENTITY, id, from, target);
                Error::InvalidTransition {
                    entity: T::ENTITY,
                    id: id.to_string(),
                    from: from.to_string(),
                    to: target.to_string(),
                }
            }
        })
    }
}
