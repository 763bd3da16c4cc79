//! In-memory store for tests.
//!
//! Mirrors the Postgres implementation's semantics, including the
//! exactly-one-active prompt invariant, dense version numbers, and
//! case-insensitive template names.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::error::StoreError;
use super::models::*;
use super::{
    DocumentStore, FeedbackUpsert, NewDocument, NewTemplate, NewVersion, PromptStore,
    TelemetryStore,
};

#[derive(Default)]
struct Inner {
    games: HashMap<String, Game>,
    documents: HashMap<String, Document>,
    vector_documents: HashMap<String, VectorDocument>,
    templates: HashMap<String, PromptTemplate>,
    versions: HashMap<String, PromptVersion>,
    audits: Vec<PromptAudit>,
    cache_stats: HashMap<(String, String), CacheStatsRow>,
    ai_logs: Vec<(AiRequestLogEntry, DateTime<Utc>)>,
    feedback: HashMap<(String, String, String), AgentFeedback>,
}

/// In-memory implementation of all three store traits.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_telemetry: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes telemetry writes fail, to exercise best-effort paths.
    pub fn fail_telemetry(&self, fail: bool) {
        self.fail_telemetry.store(fail, Ordering::SeqCst);
    }

    /// Number of AI request log rows written.
    pub fn ai_log_count(&self) -> usize {
        self.inner.lock().ai_logs.len()
    }

    /// Most recent AI request log row, if any.
    pub fn last_ai_log(&self) -> Option<AiRequestLogEntry> {
        self.inner.lock().ai_logs.last().map(|(e, _)| e.clone())
    }

    /// Raw (hits, misses) counters for one question.
    pub fn stats_row(&self, game_id: &str, question_hash: &str) -> Option<(i64, i64)> {
        self.inner
            .lock()
            .cache_stats
            .get(&(game_id.to_string(), question_hash.to_string()))
            .map(|r| (r.hit_count, r.miss_count))
    }

    /// Stored feedback outcome for a message, if present.
    pub fn feedback_row(
        &self,
        message_id: &str,
        endpoint: &str,
        user_id: &str,
    ) -> Option<FeedbackOutcome> {
        self.inner
            .lock()
            .feedback
            .get(&(
                message_id.to_string(),
                endpoint.to_string(),
                user_id.to_string(),
            ))
            .map(|f| f.outcome)
    }

    fn telemetry_guard(&self) -> Result<(), StoreError> {
        if self.fail_telemetry.load(Ordering::SeqCst) {
            return Err(StoreError::Database(
                "mock telemetry failure".to_string(),
            ));
        }
        Ok(())
    }

    fn push_audit(
        inner: &mut Inner,
        template_id: &str,
        version_id: Option<&str>,
        action: AuditAction,
        actor: &str,
        details: Option<String>,
    ) {
        inner.audits.push(PromptAudit {
            id: Uuid::new_v4().to_string(),
            template_id: template_id.to_string(),
            version_id: version_id.map(|s| s.to_string()),
            action,
            actor: actor.to_string(),
            details,
            created_at: Utc::now(),
        });
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ensure_game(&self, game: &Game) -> Result<(), StoreError> {
        self.inner
            .lock()
            .games
            .entry(game.id.clone())
            .or_insert_with(|| game.clone());
        Ok(())
    }

    async fn get_game(&self, game_id: &str) -> Result<Option<Game>, StoreError> {
        Ok(self.inner.lock().games.get(game_id).cloned())
    }

    async fn create_document(&self, new: NewDocument) -> Result<Document, StoreError> {
        let document = Document {
            id: Uuid::new_v4().to_string(),
            game_id: new.game_id,
            file_name: new.file_name,
            file_size: new.file_size,
            uploaded_by: new.uploaded_by,
            uploaded_at: Utc::now(),
            status: new.status,
            extracted_text: new.extracted_text,
            page_count: new.page_count,
            char_count: new.char_count,
            extraction_error: new.extraction_error,
        };
        self.inner
            .lock()
            .documents
            .insert(document.id.clone(), document.clone());
        Ok(document)
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.inner.lock().documents.get(id).cloned())
    }

    async fn set_document_status(
        &self,
        id: &str,
        status: DocumentStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let doc = inner
            .documents
            .get_mut(id)
            .ok_or_else(|| StoreError::DocumentNotFound { id: id.to_string() })?;
        doc.status = status;
        doc.extraction_error = error.map(|s| s.to_string());
        Ok(())
    }

    async fn get_vector_document(
        &self,
        document_id: &str,
    ) -> Result<Option<VectorDocument>, StoreError> {
        Ok(self
            .inner
            .lock()
            .vector_documents
            .values()
            .find(|vd| vd.document_id == document_id)
            .cloned())
    }

    async fn create_vector_document(&self, record: &VectorDocument) -> Result<(), StoreError> {
        self.inner
            .lock()
            .vector_documents
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn set_vector_document_processing(&self, id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if let Some(vd) = inner.vector_documents.get_mut(id) {
            vd.status = DocumentStatus::Processing;
            vd.indexing_error = None;
        }
        Ok(())
    }

    async fn complete_vector_document(
        &self,
        id: &str,
        chunk_count: i32,
        total_characters: i64,
        indexed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if let Some(vd) = inner.vector_documents.get_mut(id) {
            vd.status = DocumentStatus::Completed;
            vd.chunk_count = chunk_count;
            vd.total_characters = total_characters;
            vd.indexed_at = Some(indexed_at);
            vd.indexing_error = None;
        }
        Ok(())
    }

    async fn fail_vector_document(&self, id: &str, error: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if let Some(vd) = inner.vector_documents.get_mut(id) {
            vd.status = DocumentStatus::Failed;
            vd.indexing_error = Some(error.to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl PromptStore for MemoryStore {
    async fn create_template(
        &self,
        new: NewTemplate,
    ) -> Result<(PromptTemplate, PromptVersion), StoreError> {
        let mut inner = self.inner.lock();

        let name_lower = new.name.to_lowercase();
        if inner
            .templates
            .values()
            .any(|t| t.name.to_lowercase() == name_lower)
        {
            return Err(StoreError::DuplicateName { name: new.name });
        }

        let template = PromptTemplate {
            id: Uuid::new_v4().to_string(),
            name: new.name.clone(),
            description: new.description,
            category: new.category,
            created_by: new.actor.clone(),
            created_at: Utc::now(),
            version_count: 1,
            active_version: Some(1),
        };

        let version = PromptVersion {
            id: Uuid::new_v4().to_string(),
            template_id: template.id.clone(),
            version: 1,
            content: new.content,
            metadata: new.metadata,
            is_active: true,
            created_by: new.actor.clone(),
            created_at: Utc::now(),
        };

        inner
            .templates
            .insert(template.id.clone(), template.clone());
        inner.versions.insert(version.id.clone(), version.clone());

        Self::push_audit(
            &mut inner,
            &template.id,
            None,
            AuditAction::TemplateCreated,
            &new.actor,
            Some(format!("Created template '{}'", new.name)),
        );
        Self::push_audit(
            &mut inner,
            &template.id,
            Some(&version.id),
            AuditAction::VersionCreated,
            &new.actor,
            Some("Created version 1".to_string()),
        );

        Ok((template, version))
    }

    async fn append_version(&self, new: NewVersion) -> Result<PromptVersion, StoreError> {
        let mut inner = self.inner.lock();

        if !inner.templates.contains_key(&new.template_id) {
            return Err(StoreError::TemplateNotFound {
                id: new.template_id,
            });
        }

        let next = inner
            .versions
            .values()
            .filter(|v| v.template_id == new.template_id)
            .map(|v| v.version)
            .max()
            .unwrap_or(0)
            + 1;

        let mut deactivated: Option<String> = None;
        if new.activate {
            for v in inner.versions.values_mut() {
                if v.template_id == new.template_id && v.is_active {
                    v.is_active = false;
                    deactivated = Some(v.id.clone());
                }
            }
        }

        let version = PromptVersion {
            id: Uuid::new_v4().to_string(),
            template_id: new.template_id.clone(),
            version: next,
            content: new.content,
            metadata: new.metadata,
            is_active: new.activate,
            created_by: new.actor.clone(),
            created_at: Utc::now(),
        };
        inner.versions.insert(version.id.clone(), version.clone());

        if let Some(template) = inner.templates.get_mut(&new.template_id) {
            template.version_count = next;
            if new.activate {
                template.active_version = Some(next);
            }
        }

        Self::push_audit(
            &mut inner,
            &new.template_id,
            Some(&version.id),
            AuditAction::VersionCreated,
            &new.actor,
            Some(format!("Created version {next}")),
        );
        if new.activate {
            Self::push_audit(
                &mut inner,
                &new.template_id,
                Some(&version.id),
                AuditAction::VersionActivated,
                &new.actor,
                Some(format!("Activated version {next}")),
            );
            if let Some(old_id) = deactivated {
                Self::push_audit(
                    &mut inner,
                    &new.template_id,
                    Some(&old_id),
                    AuditAction::VersionDeactivated,
                    &new.actor,
                    None,
                );
            }
        }

        Ok(version)
    }

    async fn activate_version(
        &self,
        template_id: &str,
        version_id: &str,
        reason: Option<&str>,
        actor: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();

        if !inner.templates.contains_key(template_id) {
            return Err(StoreError::TemplateNotFound {
                id: template_id.to_string(),
            });
        }

        let target = inner
            .versions
            .get(version_id)
            .filter(|v| v.template_id == template_id)
            .cloned()
            .ok_or_else(|| StoreError::VersionNotFound {
                id: version_id.to_string(),
            })?;

        if target.is_active {
            return Ok(());
        }

        let mut deactivated: Option<String> = None;
        for v in inner.versions.values_mut() {
            if v.template_id == template_id && v.is_active {
                v.is_active = false;
                deactivated = Some(v.id.clone());
            }
        }

        if let Some(v) = inner.versions.get_mut(version_id) {
            v.is_active = true;
        }
        if let Some(template) = inner.templates.get_mut(template_id) {
            template.active_version = Some(target.version);
        }

        let details = match reason {
            Some(r) => format!("Rollback: {r}"),
            None => format!("Activated version {}", target.version),
        };
        Self::push_audit(
            &mut inner,
            template_id,
            Some(version_id),
            AuditAction::VersionActivated,
            actor,
            Some(details),
        );
        if let Some(old_id) = deactivated {
            Self::push_audit(
                &mut inner,
                template_id,
                Some(&old_id),
                AuditAction::VersionDeactivated,
                actor,
                None,
            );
        }

        Ok(())
    }

    async fn get_active_content(&self, name: &str) -> Result<Option<String>, StoreError> {
        let inner = self.inner.lock();
        let name_lower = name.to_lowercase();

        let Some(template) = inner
            .templates
            .values()
            .find(|t| t.name.to_lowercase() == name_lower)
        else {
            return Ok(None);
        };

        Ok(inner
            .versions
            .values()
            .find(|v| v.template_id == template.id && v.is_active)
            .map(|v| v.content.clone()))
    }

    async fn get_template(&self, id: &str) -> Result<Option<PromptTemplate>, StoreError> {
        Ok(self.inner.lock().templates.get(id).cloned())
    }

    async fn list_templates(
        &self,
        category: Option<&str>,
    ) -> Result<Vec<PromptTemplate>, StoreError> {
        let inner = self.inner.lock();
        let mut templates: Vec<PromptTemplate> = inner
            .templates
            .values()
            .filter(|t| category.is_none() || t.category.as_deref() == category)
            .cloned()
            .collect();
        templates.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(templates)
    }

    async fn versions(&self, template_id: &str) -> Result<Vec<PromptVersion>, StoreError> {
        let inner = self.inner.lock();
        let mut versions: Vec<PromptVersion> = inner
            .versions
            .values()
            .filter(|v| v.template_id == template_id)
            .cloned()
            .collect();
        versions.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(versions)
    }

    async fn audits(&self, template_id: &str) -> Result<Vec<PromptAudit>, StoreError> {
        let inner = self.inner.lock();
        let mut audits: Vec<PromptAudit> = inner
            .audits
            .iter()
            .filter(|a| a.template_id == template_id)
            .cloned()
            .collect();
        audits.reverse();
        Ok(audits)
    }

    async fn update_template(
        &self,
        template_id: &str,
        description: Option<&str>,
        category: Option<&str>,
        actor: &str,
    ) -> Result<PromptTemplate, StoreError> {
        let mut inner = self.inner.lock();

        let template = inner.templates.get_mut(template_id).ok_or_else(|| {
            StoreError::TemplateNotFound {
                id: template_id.to_string(),
            }
        })?;

        if let Some(description) = description {
            template.description = Some(description.to_string());
        }
        if let Some(category) = category {
            template.category = Some(category.to_string());
        }
        let updated = template.clone();

        Self::push_audit(
            &mut inner,
            template_id,
            None,
            AuditAction::TemplateUpdated,
            actor,
            Some("Updated template metadata".to_string()),
        );

        Ok(updated)
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn record_cache_hit(
        &self,
        game_id: &str,
        question_hash: &str,
    ) -> Result<(), StoreError> {
        self.telemetry_guard()?;
        let mut inner = self.inner.lock();
        let row = inner
            .cache_stats
            .entry((game_id.to_string(), question_hash.to_string()))
            .or_insert_with(|| CacheStatsRow {
                game_id: game_id.to_string(),
                question_hash: question_hash.to_string(),
                hit_count: 0,
                miss_count: 0,
                created_at: Utc::now(),
                last_hit_at: None,
            });
        row.hit_count += 1;
        row.last_hit_at = Some(Utc::now());
        Ok(())
    }

    async fn record_cache_miss(
        &self,
        game_id: &str,
        question_hash: &str,
    ) -> Result<(), StoreError> {
        self.telemetry_guard()?;
        let mut inner = self.inner.lock();
        let row = inner
            .cache_stats
            .entry((game_id.to_string(), question_hash.to_string()))
            .or_insert_with(|| CacheStatsRow {
                game_id: game_id.to_string(),
                question_hash: question_hash.to_string(),
                hit_count: 0,
                miss_count: 0,
                created_at: Utc::now(),
                last_hit_at: None,
            });
        row.miss_count += 1;
        Ok(())
    }

    async fn cache_stats(&self, game_id: Option<&str>) -> Result<CacheStatsAggregate, StoreError> {
        let inner = self.inner.lock();
        let rows: Vec<&CacheStatsRow> = inner
            .cache_stats
            .values()
            .filter(|r| game_id.is_none() || Some(r.game_id.as_str()) == game_id)
            .collect();

        let total_hits: i64 = rows.iter().map(|r| r.hit_count).sum();
        let total_misses: i64 = rows.iter().map(|r| r.miss_count).sum();

        let mut by_hits: Vec<&&CacheStatsRow> = rows.iter().collect();
        by_hits.sort_by(|a, b| b.hit_count.cmp(&a.hit_count));

        let top_questions = by_hits
            .into_iter()
            .take(10)
            .map(|r| TopQuestion {
                game_id: r.game_id.clone(),
                question_hash: r.question_hash.clone(),
                hit_count: r.hit_count,
            })
            .collect();

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
        self.telemetry_guard()?;
        self.inner.lock().ai_logs.push((entry, Utc::now()));
        Ok(())
    }

    async fn upsert_feedback(&self, feedback: FeedbackUpsert) -> Result<(), StoreError> {
        self.telemetry_guard()?;
        let mut inner = self.inner.lock();
        let key = (
            feedback.message_id.clone(),
            feedback.endpoint.clone(),
            feedback.user_id.clone(),
        );
        match feedback.outcome {
            Some(outcome) => {
                inner.feedback.insert(
                    key,
                    AgentFeedback {
                        message_id: feedback.message_id,
                        endpoint: feedback.endpoint,
                        user_id: feedback.user_id,
                        game_id: feedback.game_id,
                        outcome,
                        updated_at: Utc::now(),
                    },
                );
            }
            None => {
                inner.feedback.remove(&key);
            }
        }
        Ok(())
    }

    async fn feedback_stats(&self, game_id: Option<&str>) -> Result<FeedbackStats, StoreError> {
        let inner = self.inner.lock();
        let mut stats = FeedbackStats::default();

        for feedback in inner
            .feedback
            .values()
            .filter(|f| game_id.is_none() || Some(f.game_id.as_str()) == game_id)
        {
            stats.total += 1;
            *stats
                .by_endpoint
                .entry(feedback.endpoint.clone())
                .or_default()
                .entry(feedback.outcome.as_str().to_string())
                .or_default() += 1;
        }

        Ok(stats)
    }
}
