//! Prompt registry.
//!
//! Named, versioned prompt templates with an exactly-one-active invariant
//! per template. The hot read path (`get_active`) goes warm in-memory map
//! first, then the KV cache under `prompt:<name>:active`, then the
//! database; both cache layers degrade to the DB read on failure.

pub mod error;


pub use error::PromptError;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::cache::{KvStore, prompt_key};
use crate::store::{
    NewTemplate, NewVersion, PromptAudit, PromptStore, PromptTemplate, PromptVersion,
};

/// Template name used by the synchronous and streaming QA engines.
pub const QA_SYSTEM_PROMPT: &str = "qa-system-prompt";
/// Template name used by the explain engine.
pub const EXPLAIN_SYSTEM_PROMPT: &str = "explain-system-prompt";
/// Template name used by the setup-guide engine.
pub const SETUP_SYSTEM_PROMPT: &str = "setup-guide-system-prompt";

/// Versioned prompt store with a warmed read path.
pub struct PromptRegistry {
    store: Arc<dyn PromptStore>,
    kv: Arc<dyn KvStore>,
    /// name (lowercase) -> active content
    warm: RwLock<HashMap<String, String>>,
    cache_ttl: Duration,
    max_size_bytes: usize,
}

impl PromptRegistry {
    pub fn new(
        store: Arc<dyn PromptStore>,
        kv: Arc<dyn KvStore>,
        cache_ttl: Duration,
        max_size_bytes: usize,
    ) -> Self {
        Self {
            store,
            kv,
            warm: RwLock::new(HashMap::new()),
            cache_ttl,
            max_size_bytes,
        }
    }

    fn validate_name(name: &str) -> Result<(), PromptError> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            && !name.starts_with('-')
            && !name.ends_with('-');
        if !valid {
            return Err(PromptError::InvalidName {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn validate_content(&self, content: &str) -> Result<(), PromptError> {
        if content.trim().is_empty() {
            return Err(PromptError::EmptyContent);
        }
        if content.len() > self.max_size_bytes {
            return Err(PromptError::TooLarge {
                size: content.len(),
                max: self.max_size_bytes,
            });
        }
        Ok(())
    }

    /// Creates a template with version 1 active.
    #[instrument(skip(self, content))]
    pub async fn create_template(
        &self,
        name: &str,
        description: Option<String>,
        category: Option<String>,
        content: String,
        actor: &str,
    ) -> Result<(PromptTemplate, PromptVersion), PromptError> {
        Self::validate_name(name)?;
        self.validate_content(&content)?;

        let (template, version) = self
            .store
            .create_template(NewTemplate {
                name: name.to_string(),
                description,
                category,
                content: content.clone(),
                metadata: None,
                actor: actor.to_string(),
            })
            .await?;

        self.refresh_active(name, &content).await;
        info!(template = name, "created prompt template");
        Ok((template, version))
    }

    /// Appends a version; optionally activates it in the same store
    /// transaction.
    #[instrument(skip(self, content, metadata))]
    pub async fn create_version(
        &self,
        template_id: &str,
        content: String,
        metadata: Option<serde_json::Value>,
        activate: bool,
        actor: &str,
    ) -> Result<PromptVersion, PromptError> {
        self.validate_content(&content)?;

        let version = self
            .store
            .append_version(NewVersion {
                template_id: template_id.to_string(),
                content: content.clone(),
                metadata,
                activate,
                actor: actor.to_string(),
            })
            .await?;

        if activate {
            self.invalidate_template(template_id).await;
        }

        Ok(version)
    }

    /// Moves the active flag to `version_id`, recording the reason in the
    /// audit trail.
    #[instrument(skip(self))]
    pub async fn activate_version(
        &self,
        template_id: &str,
        version_id: &str,
        reason: Option<&str>,
        actor: &str,
    ) -> Result<(), PromptError> {
        self.store
            .activate_version(template_id, version_id, reason, actor)
            .await?;
        self.invalidate_template(template_id).await;
        Ok(())
    }

    /// Content of the active version for `name`.
    ///
    /// Read path: warm map, then KV cache, then DB with cache-through.
    /// Cache failures fall through to the DB read.
    pub async fn get_active(&self, name: &str) -> Result<Option<String>, PromptError> {
        let lookup = name.to_lowercase();

        if let Some(content) = self.warm.read().get(&lookup).cloned() {
            return Ok(Some(content));
        }

        match self.kv.get(&prompt_key(&lookup)).await {
            Ok(Some(content)) => return Ok(Some(content)),
            Ok(None) => {}
            Err(e) => debug!("prompt cache read failed, falling back to DB: {e}"),
        }

        let content = self.store.get_active_content(name).await?;

        if let Some(content) = &content {
            self.refresh_active(&lookup, content).await;
        }

        Ok(content)
    }

    /// Eagerly loads the critical prompts into both cache layers.
    /// Failures are logged and skipped; warming is never fatal.
    pub async fn warm(&self, names: &[String]) {
        for name in names {
            match self.store.get_active_content(name).await {
                Ok(Some(content)) => {
                    self.refresh_active(&name.to_lowercase(), &content).await;
                    debug!(prompt = %name, "warmed prompt");
                }
                Ok(None) => warn!(prompt = %name, "critical prompt has no active version"),
                Err(e) => warn!(prompt = %name, "failed to warm prompt: {e}"),
            }
        }
    }

    pub async fn get_template(&self, id: &str) -> Result<Option<PromptTemplate>, PromptError> {
        Ok(self.store.get_template(id).await?)
    }

    pub async fn list(&self, category: Option<&str>) -> Result<Vec<PromptTemplate>, PromptError> {
        Ok(self.store.list_templates(category).await?)
    }

    /// Versions of a template, newest first.
    pub async fn history(&self, template_id: &str) -> Result<Vec<PromptVersion>, PromptError> {
        Ok(self.store.versions(template_id).await?)
    }

    /// Audit rows of a template, newest first.
    pub async fn audit_history(&self, template_id: &str) -> Result<Vec<PromptAudit>, PromptError> {
        Ok(self.store.audits(template_id).await?)
    }

    pub async fn update_template(
        &self,
        template_id: &str,
        description: Option<&str>,
        category: Option<&str>,
        actor: &str,
    ) -> Result<PromptTemplate, PromptError> {
        Ok(self
            .store
            .update_template(template_id, description, category, actor)
            .await?)
    }

    /// Installs fresh active content into the warm map and the KV cache.
    async fn refresh_active(&self, name_lower: &str, content: &str) {
        self.warm
            .write()
            .insert(name_lower.to_string(), content.to_string());

        if let Err(e) = self
            .kv
            .set(
                &prompt_key(name_lower),
                content.to_string(),
                self.cache_ttl,
            )
            .await
        {
            debug!("failed to write prompt cache: {e}");
        }
    }

    /// Drops cached active content after an activation change, then
    /// repopulates from the store. Readers racing the activation may see
    /// at-most-one-version-stale content until this completes.
    async fn invalidate_template(&self, template_id: &str) {
        let Ok(Some(template)) = self.store.get_template(template_id).await else {
            return;
        };
        let lookup = template.name.to_lowercase();

        self.warm.write().remove(&lookup);
        if let Err(e) = self.kv.delete(&prompt_key(&lookup)).await {
            debug!("failed to drop cached prompt: {e}");
        }

        match self.store.get_active_content(&template.name).await {
            Ok(Some(content)) => self.refresh_active(&lookup, &content).await,
            Ok(None) => {}
            Err(e) => warn!("failed to reload active prompt after activation: {e}"),
        }
    }
}
