//! Knowledge base access log

use super::Database;
use crate::error::{is_foreign_key_violation, Error, Result};
use crate::lifecycle::{new_id, now_timestamp};
use crate::models::{AccessType, KnowledgeBaseAccess};
use std::net::IpAddr;
use tracing::debug;

impl Database {
    // ===== Access Log =====

    /// Append one access record for a user
    pub async fn record_access(
        &self,
        knowledge_base_id: &str,
        user_id: &str,
        access_type: AccessType,
        ip_address: Option<&str>,
        user_agent: &str,
    ) -> Result<KnowledgeBaseAccess> {
        if user_id.trim().is_empty() {
            return Err(Error::Validation("user_id must not be empty".to_string()));
        }
        let ip_address = match ip_address {
            Some(ip) => Some(
                ip.parse::<IpAddr>()
                    .map_err(|_| Error::Validation(format!("invalid IP address: {}", ip)))?
                    .to_string(),
            ),
            None => None,
        };

        let result = sqlx::query_as::<_, KnowledgeBaseAccess>(
            r#"
            INSERT INTO kb_access_log (
                id, knowledge_base_id, user_id, access_type, ip_address, user_agent, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(new_id())
        .bind(knowledge_base_id)
        .bind(user_id)
        .bind(access_type)
        .bind(ip_address)
        .bind(user_agent)
        .bind(now_timestamp())
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(entry) => {
                debug!("{} {} knowledge base {}", user_id, access_type, knowledge_base_id);
                Ok(entry)
            }
            Err(e) if is_foreign_key_violation(&e) => {
                Err(Error::KnowledgeBaseNotFound(knowledge_base_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Most recent accesses of a knowledge base, newest first
    pub async fn list_recent_access(
        &self,
        knowledge_base_id: &str,
        limit: i64,
    ) -> Result<Vec<KnowledgeBaseAccess>> {
        let entries = sqlx::query_as::<_, KnowledgeBaseAccess>(
            r#"
            SELECT * FROM kb_access_log
            WHERE knowledge_base_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(knowledge_base_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    /// Most recent accesses by a user across knowledge bases, newest first
    pub async fn list_user_access(&self, user_id: &str, limit: i64) -> Result<Vec<KnowledgeBaseAccess>> {
        let entries = sqlx::query_as::<_, KnowledgeBaseAccess>(
            r#"
            SELECT * FROM kb_access_log
            WHERE user_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn test_record_and_list_access() {
        let (db, _tmp) = setup_test_db().await;
        let kb = create_kb(&db).await;

        db.record_access(&kb.id, "bob", AccessType::View, Some("10.0.0.7"), "curl/8")
            .await
            .unwrap();
        db.record_access(&kb.id, "carol", AccessType::Search, None, "")
            .await
            .unwrap();
        db.record_access(&kb.id, "bob", AccessType::Query, Some("::1"), "")
            .await
            .unwrap();

        let recent = db.list_recent_access(&kb.id, 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].access_type, AccessType::Query);
        assert_eq!(recent[0].ip_address.as_deref(), Some("::1"));
        assert_eq!(recent[1].user_id, "carol");

        let bob = db.list_user_access("bob", 10).await.unwrap();
        assert_eq!(bob.len(), 2);
        assert_eq!(bob[1].user_agent, "curl/8");
    }

    #[tokio::test]
    async fn test_access_validation_and_cascade() {
        let (db, _tmp) = setup_test_db().await;
        let kb = create_kb(&db).await;

        assert!(matches!(
            db.record_access(&kb.id, "bob", AccessType::Edit, Some("not-an-ip"), "").await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            db.record_access(&kb.id, " ", AccessType::Edit, None, "").await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            db.record_access("missing", "bob", AccessType::View, None, "").await,
            Err(Error::KnowledgeBaseNotFound(_))
        ));

        db.record_access(&kb.id, "bob", AccessType::Delete, None, "").await.unwrap();
        db.hard_delete_knowledge_base(&kb.id).await.unwrap();
        assert!(db.list_user_access("bob", 10).await.unwrap().is_empty());
    }
}
