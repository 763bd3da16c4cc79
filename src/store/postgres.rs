//! PostgreSQL-backed store.
//!
//! Uses a sqlx connection pool with plain queries and `try_get` row
//! mapping. Prompt mutations run inside transactions with a row lock on
//! the template, so the exactly-one-active invariant cannot tear.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Row, Transaction};
use uuid::Uuid;

use super::error::StoreError;
use super::models::*;
use super::{
    DocumentStore, FeedbackUpsert, NewDocument, NewTemplate, NewVersion, PromptStore,
    TelemetryStore,
};

/// PostgreSQL store implementing all three store traits.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connects to the database; runs pending migrations when asked.
    pub async fn connect(database_url: &str, run_migrations: bool) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Database(format!("failed to connect to database: {e}")))?;

        if run_migrations {
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(|e| StoreError::Database(format!("migration failed: {e}")))?;
        }

        Ok(PgStore { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn insert_audit(
        tx: &mut Transaction<'_, sqlx::Postgres>,
        template_id: &str,
        version_id: Option<&str>,
        action: AuditAction,
        actor: &str,
        details: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO prompt_audits (id, template_id, version_id, action, actor, details) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(template_id)
        .bind(version_id)
        .bind(action.as_str())
        .bind(actor)
        .bind(details)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Locks the template row for the duration of the transaction.
    async fn lock_template(
        tx: &mut Transaction<'_, sqlx::Postgres>,
        template_id: &str,
    ) -> Result<(), StoreError> {
        let row = sqlx::query("SELECT id FROM prompt_templates WHERE id = $1 FOR UPDATE")
            .bind(template_id)
            .fetch_optional(&mut **tx)
            .await?;

        if row.is_none() {
            return Err(StoreError::TemplateNotFound {
                id: template_id.to_string(),
            });
        }
        Ok(())
    }
}

fn parse_status(raw: &str) -> Result<DocumentStatus, StoreError> {
    DocumentStatus::from_str(raw).map_err(StoreError::Database)
}

fn row_to_document(row: &PgRow) -> Result<Document, StoreError> {
    let status: String = row.try_get("status")?;
    Ok(Document {
        id: row.try_get("id")?,
        game_id: row.try_get("game_id")?,
        file_name: row.try_get("file_name")?,
        file_size: row.try_get("file_size")?,
        uploaded_by: row.try_get("uploaded_by")?,
        uploaded_at: row.try_get("uploaded_at")?,
        status: parse_status(&status)?,
        extracted_text: row.try_get("extracted_text")?,
        page_count: row.try_get("page_count")?,
        char_count: row.try_get("char_count")?,
        extraction_error: row.try_get("extraction_error")?,
    })
}

fn row_to_vector_document(row: &PgRow) -> Result<VectorDocument, StoreError> {
    let status: String = row.try_get("status")?;
    Ok(VectorDocument {
        id: row.try_get("id")?,
        game_id: row.try_get("game_id")?,
        document_id: row.try_get("document_id")?,
        chunk_count: row.try_get("chunk_count")?,
        total_characters: row.try_get("total_characters")?,
        embedding_model: row.try_get("embedding_model")?,
        embedding_dimensions: row.try_get("embedding_dimensions")?,
        status: parse_status(&status)?,
        indexing_error: row.try_get("indexing_error")?,
        indexed_at: row.try_get("indexed_at")?,
    })
}

fn row_to_template(row: &PgRow) -> Result<PromptTemplate, StoreError> {
    Ok(PromptTemplate {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        version_count: row.try_get("version_count")?,
        active_version: row.try_get("active_version")?,
    })
}

fn row_to_version(row: &PgRow) -> Result<PromptVersion, StoreError> {
    Ok(PromptVersion {
        id: row.try_get("id")?,
        template_id: row.try_get("template_id")?,
        version: row.try_get("version")?,
        content: row.try_get("content")?,
        metadata: row.try_get("metadata")?,
        is_active: row.try_get("is_active")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_audit(row: &PgRow) -> Result<PromptAudit, StoreError> {
    let action: String = row.try_get("action")?;
    Ok(PromptAudit {
        id: row.try_get("id")?,
        template_id: row.try_get("template_id")?,
        version_id: row.try_get("version_id")?,
        action: AuditAction::from_str(&action).map_err(StoreError::Database)?,
        actor: row.try_get("actor")?,
        details: row.try_get("details")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn ensure_game(&self, game: &Game) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO games (id, name) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING")
            .bind(&game.id)
            .bind(&game.name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_game(&self, game_id: &str) -> Result<Option<Game>, StoreError> {
        let row = sqlx::query("SELECT id, name FROM games WHERE id = $1")
            .bind(game_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| {
            Ok(Game {
                id: r.try_get("id")?,
                name: r.try_get("name")?,
            })
        })
        .transpose()
    }

    async fn create_document(&self, new: NewDocument) -> Result<Document, StoreError> {
        let id = Uuid::new_v4().to_string();
        let row = sqlx::query(
            "INSERT INTO documents \
             (id, game_id, file_name, file_size, uploaded_by, status, extracted_text, \
              page_count, char_count, extraction_error) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING *",
        )
        .bind(&id)
        .bind(&new.game_id)
        .bind(&new.file_name)
        .bind(new.file_size)
        .bind(&new.uploaded_by)
        .bind(new.status.to_string())
        .bind(&new.extracted_text)
        .bind(new.page_count)
        .bind(new.char_count)
        .bind(&new.extraction_error)
        .fetch_one(&self.pool)
        .await?;

        row_to_document(&row)
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn set_document_status(
        &self,
        id: &str,
        status: DocumentStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE documents SET status = $2, extraction_error = $3 WHERE id = $1")
            .bind(id)
            .bind(status.to_string())
            .bind(error)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_vector_document(
        &self,
        document_id: &str,
    ) -> Result<Option<VectorDocument>, StoreError> {
        let row = sqlx::query("SELECT * FROM vector_documents WHERE document_id = $1")
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_vector_document).transpose()
    }

    async fn create_vector_document(&self, record: &VectorDocument) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO vector_documents \
             (id, game_id, document_id, chunk_count, total_characters, embedding_model, \
              embedding_dimensions, status, indexing_error, indexed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(&record.id)
        .bind(&record.game_id)
        .bind(&record.document_id)
        .bind(record.chunk_count)
        .bind(record.total_characters)
        .bind(&record.embedding_model)
        .bind(record.embedding_dimensions)
        .bind(record.status.to_string())
        .bind(&record.indexing_error)
        .bind(record.indexed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_vector_document_processing(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE vector_documents SET status = 'processing', indexing_error = NULL \
             WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn complete_vector_document(
        &self,
        id: &str,
        chunk_count: i32,
        total_characters: i64,
        indexed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE vector_documents SET status = 'completed', chunk_count = $2, \
             total_characters = $3, indexed_at = $4, indexing_error = NULL WHERE id = $1",
        )
        .bind(id)
        .bind(chunk_count)
        .bind(total_characters)
        .bind(indexed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail_vector_document(&self, id: &str, error: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE vector_documents SET status = 'failed', indexing_error = $2 WHERE id = $1")
            .bind(id)
            .bind(error)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PromptStore for PgStore {
    async fn create_template(
        &self,
        new: NewTemplate,
    ) -> Result<(PromptTemplate, PromptVersion), StoreError> {
        let mut tx = self.pool.begin().await?;

        let template_id = Uuid::new_v4().to_string();
        let template_row = sqlx::query(
            "INSERT INTO prompt_templates \
             (id, name, description, category, created_by, version_count, active_version) \
             VALUES ($1, $2, $3, $4, $5, 1, 1) RETURNING *",
        )
        .bind(&template_id)
        .bind(&new.name)
        .bind(&new.description)
        .bind(&new.category)
        .bind(&new.actor)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db)
                if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation) =>
            {
                StoreError::DuplicateName {
                    name: new.name.clone(),
                }
            }
            _ => StoreError::from(e),
        })?;

        let version_id = Uuid::new_v4().to_string();
        let version_row = sqlx::query(
            "INSERT INTO prompt_versions \
             (id, template_id, version, content, metadata, is_active, created_by) \
             VALUES ($1, $2, 1, $3, $4, TRUE, $5) RETURNING *",
        )
        .bind(&version_id)
        .bind(&template_id)
        .bind(&new.content)
        .bind(&new.metadata)
        .bind(&new.actor)
        .fetch_one(&mut *tx)
        .await?;

        Self::insert_audit(
            &mut tx,
            &template_id,
            None,
            AuditAction::TemplateCreated,
            &new.actor,
            Some(&format!("Created template '{}'", new.name)),
        )
        .await?;
        Self::insert_audit(
            &mut tx,
            &template_id,
            Some(&version_id),
            AuditAction::VersionCreated,
            &new.actor,
            Some("Created version 1"),
        )
        .await?;

        tx.commit().await?;

        Ok((row_to_template(&template_row)?, row_to_version(&version_row)?))
    }

    async fn append_version(&self, new: NewVersion) -> Result<PromptVersion, StoreError> {
        let mut tx = self.pool.begin().await?;
        Self::lock_template(&mut tx, &new.template_id).await?;

        let next: i32 = sqlx::query(
            "SELECT COALESCE(MAX(version), 0) + 1 AS next \
             FROM prompt_versions WHERE template_id = $1",
        )
        .bind(&new.template_id)
        .fetch_one(&mut *tx)
        .await?
        .try_get("next")?;

        let mut deactivated: Option<String> = None;
        if new.activate {
            deactivated = sqlx::query(
                "UPDATE prompt_versions SET is_active = FALSE \
                 WHERE template_id = $1 AND is_active RETURNING id",
            )
            .bind(&new.template_id)
            .fetch_optional(&mut *tx)
            .await?
            .map(|r| r.try_get("id"))
            .transpose()?;
        }

        let version_id = Uuid::new_v4().to_string();
        let version_row = sqlx::query(
            "INSERT INTO prompt_versions \
             (id, template_id, version, content, metadata, is_active, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
        )
        .bind(&version_id)
        .bind(&new.template_id)
        .bind(next)
        .bind(&new.content)
        .bind(&new.metadata)
        .bind(new.activate)
        .bind(&new.actor)
        .fetch_one(&mut *tx)
        .await?;

        if new.activate {
            sqlx::query("UPDATE prompt_templates SET version_count = $2, active_version = $3 WHERE id = $1")
                .bind(&new.template_id)
                .bind(next)
                .bind(next)
                .execute(&mut *tx)
                .await?;
        } else {
            sqlx::query("UPDATE prompt_templates SET version_count = $2 WHERE id = $1")
                .bind(&new.template_id)
                .bind(next)
                .execute(&mut *tx)
                .await?;
        }

        Self::insert_audit(
            &mut tx,
            &new.template_id,
            Some(&version_id),
            AuditAction::VersionCreated,
            &new.actor,
            Some(&format!("Created version {next}")),
        )
        .await?;

        if new.activate {
            Self::insert_audit(
                &mut tx,
                &new.template_id,
                Some(&version_id),
                AuditAction::VersionActivated,
                &new.actor,
                Some(&format!("Activated version {next}")),
            )
            .await?;
            if let Some(old_id) = &deactivated {
                Self::insert_audit(
                    &mut tx,
                    &new.template_id,
                    Some(old_id),
                    AuditAction::VersionDeactivated,
                    &new.actor,
                    None,
                )
                .await?;
            }
        }

        tx.commit().await?;
        row_to_version(&version_row)
    }

    async fn activate_version(
        &self,
        template_id: &str,
        version_id: &str,
        reason: Option<&str>,
        actor: &str,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        Self::lock_template(&mut tx, template_id).await?;

        let target = sqlx::query(
            "SELECT version, is_active FROM prompt_versions WHERE id = $1 AND template_id = $2",
        )
        .bind(version_id)
        .bind(template_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::VersionNotFound {
            id: version_id.to_string(),
        })?;

        let target_version: i32 = target.try_get("version")?;
        let already_active: bool = target.try_get("is_active")?;
        if already_active {
            tx.commit().await?;
            return Ok(());
        }

        let deactivated: Option<String> = sqlx::query(
            "UPDATE prompt_versions SET is_active = FALSE \
             WHERE template_id = $1 AND is_active RETURNING id",
        )
        .bind(template_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(|r| r.try_get("id"))
        .transpose()?;

        sqlx::query("UPDATE prompt_versions SET is_active = TRUE WHERE id = $1")
            .bind(version_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE prompt_templates SET active_version = $2 WHERE id = $1")
            .bind(template_id)
            .bind(target_version)
            .execute(&mut *tx)
            .await?;

        let details = match reason {
            Some(r) => format!("Rollback: {r}"),
            None => format!("Activated version {target_version}"),
        };
        Self::insert_audit(
            &mut tx,
            template_id,
            Some(version_id),
            AuditAction::VersionActivated,
            actor,
            Some(&details),
        )
        .await?;

        if let Some(old_id) = &deactivated {
            Self::insert_audit(
                &mut tx,
                template_id,
                Some(old_id),
                AuditAction::VersionDeactivated,
                actor,
                None,
            )
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_active_content(&self, name: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query(
            "SELECT v.content FROM prompt_versions v \
             JOIN prompt_templates t ON v.template_id = t.id \
             WHERE lower(t.name) = lower($1) AND v.is_active",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.try_get("content").map_err(StoreError::from))
            .transpose()
    }

    async fn get_template(&self, id: &str) -> Result<Option<PromptTemplate>, StoreError> {
        let row = sqlx::query("SELECT * FROM prompt_templates WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_template).transpose()
    }

    async fn list_templates(
        &self,
        category: Option<&str>,
    ) -> Result<Vec<PromptTemplate>, StoreError> {
        let rows = match category {
            Some(category) => {
                sqlx::query("SELECT * FROM prompt_templates WHERE category = $1 ORDER BY name")
                    .bind(category)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM prompt_templates ORDER BY name")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter().map(row_to_template).collect()
    }

    async fn versions(&self, template_id: &str) -> Result<Vec<PromptVersion>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM prompt_versions WHERE template_id = $1 ORDER BY version DESC",
        )
        .bind(template_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_version).collect()
    }

    async fn audits(&self, template_id: &str) -> Result<Vec<PromptAudit>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM prompt_audits WHERE template_id = $1 ORDER BY created_at DESC",
        )
        .bind(template_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_audit).collect()
    }

    async fn update_template(
        &self,
        template_id: &str,
        description: Option<&str>,
        category: Option<&str>,
        actor: &str,
    ) -> Result<PromptTemplate, StoreError> {
        let mut tx = self.pool.begin().await?;
        Self::lock_template(&mut tx, template_id).await?;

        let row = sqlx::query(
            "UPDATE prompt_templates SET \
             description = COALESCE($2, description), \
             category = COALESCE($3, category) \
             WHERE id = $1 RETURNING *",
        )
        .bind(template_id)
        .bind(description)
        .bind(category)
        .fetch_one(&mut *tx)
        .await?;

        Self::insert_audit(
            &mut tx,
            template_id,
            None,
            AuditAction::TemplateUpdated,
            actor,
            Some("Updated template metadata"),
        )
        .await?;

        tx.commit().await?;
        row_to_template(&row)
    }
}

#[async_trait]
impl TelemetryStore for PgStore {
    async fn record_cache_hit(
        &self,
        game_id: &str,
        question_hash: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO cache_stats (game_id, question_hash, hit_count, miss_count, last_hit_at) \
             VALUES ($1, $2, 1, 0, now()) \
             ON CONFLICT (game_id, question_hash) DO UPDATE \
             SET hit_count = cache_stats.hit_count + 1, last_hit_at = now()",
        )
        .bind(game_id)
        .bind(question_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_cache_miss(
        &self,
        game_id: &str,
        question_hash: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO cache_stats (game_id, question_hash, hit_count, miss_count) \
             VALUES ($1, $2, 0, 1) \
             ON CONFLICT (game_id, question_hash) DO UPDATE \
             SET miss_count = cache_stats.miss_count + 1",
        )
        .bind(game_id)
        .bind(question_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn cache_stats(&self, game_id: Option<&str>) -> Result<CacheStatsAggregate, StoreError> {
        let totals = match game_id {
            Some(game_id) => {
                sqlx::query(
                    "SELECT COALESCE(SUM(hit_count), 0) AS hits, \
                     COALESCE(SUM(miss_count), 0) AS misses \
                     FROM cache_stats WHERE game_id = $1",
                )
                .bind(game_id)
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT COALESCE(SUM(hit_count), 0) AS hits, \
                     COALESCE(SUM(miss_count), 0) AS misses FROM cache_stats",
                )
                .fetch_one(&self.pool)
                .await?
            }
        };

        let total_hits: i64 = totals.try_get("hits")?;
        let total_misses: i64 = totals.try_get("misses")?;

        let top_rows = match game_id {
            Some(game_id) => {
                sqlx::query(
                    "SELECT game_id, question_hash, hit_count FROM cache_stats \
                     WHERE game_id = $1 ORDER BY hit_count DESC LIMIT 10",
                )
                .bind(game_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT game_id, question_hash, hit_count FROM cache_stats \
                     ORDER BY hit_count DESC LIMIT 10",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        let top_questions = top_rows
            .iter()
            .map(|r| {
                Ok(TopQuestion {
                    game_id: r.try_get("game_id")?,
                    question_hash: r.try_get("question_hash")?,
                    hit_count: r.try_get("hit_count")?,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let denominator = total_hits + total_misses;
        let hit_rate = if denominator > 0 {
            total_hits as f64 / denominator as f64
        } else {
            0.0
        };

        Ok(CacheStatsAggregate {
            total_hits,
            total_misses,
            hit_rate,
            top_questions,
        })
    }

    async fn log_ai_request(&self, entry: AiRequestLogEntry) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO ai_request_logs \
             (id, endpoint, game_id, user_id, query, latency_ms, prompt_tokens, \
              completion_tokens, total_tokens, confidence, success, from_cache, error) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(entry.endpoint.as_str())
        .bind(&entry.game_id)
        .bind(&entry.user_id)
        .bind(&entry.query)
        .bind(entry.latency_ms)
        .bind(entry.prompt_tokens)
        .bind(entry.completion_tokens)
        .bind(entry.total_tokens)
        .bind(entry.confidence)
        .bind(entry.success)
        .bind(entry.from_cache)
        .bind(&entry.error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_feedback(&self, feedback: FeedbackUpsert) -> Result<(), StoreError> {
        match feedback.outcome {
            Some(outcome) => {
                sqlx::query(
                    "INSERT INTO agent_feedback \
                     (message_id, endpoint, user_id, game_id, outcome, updated_at) \
                     VALUES ($1, $2, $3, $4, $5, now()) \
                     ON CONFLICT (message_id, endpoint, user_id) DO UPDATE \
                     SET outcome = EXCLUDED.outcome, updated_at = now()",
                )
                .bind(&feedback.message_id)
                .bind(&feedback.endpoint)
                .bind(&feedback.user_id)
                .bind(&feedback.game_id)
                .bind(outcome.as_str())
                .execute(&self.pool)
                .await?;
            }
            None => {
                sqlx::query(
                    "DELETE FROM agent_feedback \
                     WHERE message_id = $1 AND endpoint = $2 AND user_id = $3",
                )
                .bind(&feedback.message_id)
                .bind(&feedback.endpoint)
                .bind(&feedback.user_id)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }

    async fn feedback_stats(&self, game_id: Option<&str>) -> Result<FeedbackStats, StoreError> {
        let rows = match game_id {
            Some(game_id) => {
                sqlx::query(
                    "SELECT endpoint, outcome, COUNT(*) AS count FROM agent_feedback \
                     WHERE game_id = $1 GROUP BY endpoint, outcome",
                )
                .bind(game_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT endpoint, outcome, COUNT(*) AS count FROM agent_feedback \
                     GROUP BY endpoint, outcome",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut stats = FeedbackStats::default();
        for row in rows {
            let endpoint: String = row.try_get("endpoint")?;
            let outcome: String = row.try_get("outcome")?;
            let count: i64 = row.try_get("count")?;
            stats.total += count;
            *stats
                .by_endpoint
                .entry(endpoint)
                .or_default()
                .entry(outcome)
                .or_default() += count;
        }

        Ok(stats)
    }
}
