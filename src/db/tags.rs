//! Knowledge base tags

use super::Database;
use crate::error::{is_foreign_key_violation, is_unique_violation, Error, Result};
use crate::lifecycle::now_timestamp;
use crate::models::{KnowledgeBase, KnowledgeBaseTag};
use tracing::{debug, info};

impl Database {
    // ===== Tags =====

    /// Create a tag; names are unique
    pub async fn create_tag(&self, name: &str, color: Option<&str>) -> Result<KnowledgeBaseTag> {
        let tag = KnowledgeBaseTag::new(name, color)?;
        let result = sqlx::query_as::<_, KnowledgeBaseTag>(
            "INSERT INTO kb_tags (id, name, color, created_at) VALUES (?, ?, ?, ?) RETURNING *",
        )
        .bind(&tag.id)
        .bind(&tag.name)
        .bind(&tag.color)
        .bind(&tag.created_at)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(tag) => {
                info!("Created tag {}", tag.name);
                Ok(tag)
            }
            Err(e) if is_unique_violation(&e) => {
                Err(Error::Validation(format!("tag {} already exists", tag.name)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Get tag by name
    pub async fn get_tag(&self, name: &str) -> Result<KnowledgeBaseTag> {
        sqlx::query_as::<_, KnowledgeBaseTag>("SELECT * FROM kb_tags WHERE name = ?")
            .bind(name.trim())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::TagNotFound(name.to_string()))
    }

    /// All tags by name
    pub async fn list_tags(&self) -> Result<Vec<KnowledgeBaseTag>> {
        let tags = sqlx::query_as::<_, KnowledgeBaseTag>("SELECT * FROM kb_tags ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(tags)
    }

    /// Delete a tag and every link to it
    pub async fn delete_tag(&self, name: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM kb_tags WHERE name = ?")
            .bind(name.trim())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::TagNotFound(name.to_string()));
        }
        info!("Deleted tag {}", name);
        Ok(())
    }

    /// Attach a tag to a knowledge base, creating the tag on first use.
    /// `color` only applies to a newly created tag. Tagging twice is a no-op.
    pub async fn tag_knowledge_base(
        &self,
        id: &str,
        tag_name: &str,
        color: Option<&str>,
    ) -> Result<KnowledgeBaseTag> {
        let tag = match self.get_tag(tag_name).await {
            Ok(tag) => tag,
            Err(Error::TagNotFound(_)) => match self.create_tag(tag_name, color).await {
                Ok(tag) => tag,
                // Either a bad name or a concurrent creator won the insert
                Err(Error::Validation(msg)) => match self.get_tag(tag_name).await {
                    Ok(tag) => tag,
                    Err(_) => return Err(Error::Validation(msg)),
                },
                Err(e) => return Err(e),
            },
            Err(e) => return Err(e),
        };

        let result = sqlx::query(
            "INSERT OR IGNORE INTO kb_tag_relations (knowledge_base_id, tag_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(id)
        .bind(&tag.id)
        .bind(now_timestamp())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!("Tagged knowledge base {} with {}", id, tag.name);
                Ok(tag)
            }
            Err(e) if is_foreign_key_violation(&e) => Err(Error::KnowledgeBaseNotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Detach a tag; returns whether the link existed
    pub async fn untag_knowledge_base(&self, id: &str, tag_name: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM kb_tag_relations
            WHERE knowledge_base_id = ?1
              AND tag_id = (SELECT id FROM kb_tags WHERE name = ?2)
            "#,
        )
        .bind(id)
        .bind(tag_name.trim())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Tags attached to a knowledge base, by name
    pub async fn list_knowledge_base_tags(&self, id: &str) -> Result<Vec<KnowledgeBaseTag>> {
        let tags = sqlx::query_as::<_, KnowledgeBaseTag>(
            r#"
            SELECT t.* FROM kb_tags t
            JOIN kb_tag_relations r ON r.tag_id = t.id
            WHERE r.knowledge_base_id = ?
            ORDER BY t.name
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tags)
    }

    /// Live knowledge bases carrying a tag, newest first
    pub async fn list_knowledge_bases_by_tag(&self, tag_name: &str) -> Result<Vec<KnowledgeBase>> {
        let tag = self.get_tag(tag_name).await?;
        let kbs = sqlx::query_as::<_, KnowledgeBase>(
            r#"
            SELECT kb.* FROM knowledge_bases kb
            JOIN kb_tag_relations r ON r.knowledge_base_id = kb.id
            WHERE r.tag_id = ? AND kb.is_deleted = 0
            ORDER BY kb.created_at DESC
            "#,
        )
        .bind(&tag.id)
        .fetch_all(&self.pool)
        .await?;
        Ok(kbs)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn test_tag_and_untag() {
        let (db, _tmp) = setup_test_db().await;
        let kb = create_kb(&db).await;

        let tag = db.tag_knowledge_base(&kb.id, "research", Some("#ff0000")).await.unwrap();
        assert_eq!(tag.color, "#ff0000");
        let again = db.tag_knowledge_base(&kb.id, "research", Some("#00ff00")).await.unwrap();
        assert_eq!(again.id, tag.id);
        assert_eq!(again.color, "#ff0000");
        db.tag_knowledge_base(&kb.id, "archive", None).await.unwrap();

        let names: Vec<String> = db
            .list_knowledge_base_tags(&kb.id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["archive", "research"]);

        let tagged = db.list_knowledge_bases_by_tag("research").await.unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].id, kb.id);

        assert!(db.untag_knowledge_base(&kb.id, "research").await.unwrap());
        assert!(!db.untag_knowledge_base(&kb.id, "research").await.unwrap());
        assert!(db.list_knowledge_bases_by_tag("research").await.unwrap().is_empty());
        assert_eq!(db.list_tags().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_tag_names_unique() {
        let (db, _tmp) = setup_test_db().await;
        db.create_tag("ops", None).await.unwrap();
        assert!(matches!(db.create_tag("ops", None).await, Err(Error::Validation(_))));
        assert!(matches!(db.get_tag("nope").await, Err(Error::TagNotFound(_))));
        assert!(matches!(
            db.tag_knowledge_base("missing", "ops", None).await,
            Err(Error::KnowledgeBaseNotFound(_))
        ));
        let kb = create_kb(&db).await;
        assert!(matches!(
            db.tag_knowledge_base(&kb.id, "x", Some("blue")).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_links_follow_deletes() {
        let (db, _tmp) = setup_test_db().await;
        let kb = create_kb(&db).await;
        db.tag_knowledge_base(&kb.id, "keep", None).await.unwrap();
        db.tag_knowledge_base(&kb.id, "drop", None).await.unwrap();

        db.delete_tag("drop").await.unwrap();
        assert_eq!(db.list_knowledge_base_tags(&kb.id).await.unwrap().len(), 1);
        assert!(matches!(db.delete_tag("drop").await, Err(Error::TagNotFound(_))));

        db.soft_delete_knowledge_base(&kb.id).await.unwrap();
        assert!(db.list_knowledge_bases_by_tag("keep").await.unwrap().is_empty());

        db.hard_delete_knowledge_base(&kb.id).await.unwrap();
        assert!(db.list_knowledge_base_tags(&kb.id).await.unwrap().is_empty());
        assert_eq!(db.list_tags().await.unwrap().len(), 1);
    }
}
