//! Rewrite settings: model name and per-mode prompts, with built-in defaults.

use std::sync::Arc;

use tracing::info;

use crate::error::DatabaseError;
use crate::rewrite::RewriteMode;
use crate::store::Database;

pub const MODEL_KEY: &str = "model";

pub const DEFAULT_MODEL: &str = "claude-haiku-4-5-20251001";

/// Models offered in the operator menu. Any other name can be set with `/model`.
pub const AVAILABLE_MODELS: &[&str] = &[
    "claude-haiku-4-5-20251001",
    "claude-sonnet-4-5-20250929",
    "claude-opus-4-5-20251101",
];

const MIN_PROMPT_CHARS: usize = 10;
const MIN_MODEL_CHARS: usize = 5;
const MAX_MODEL_CHARS: usize = 100;

const DEFAULT_PROMPT_STD: &str = "\
You edit posts for a Telegram channel.
Write a catchy but accurate headline in bold (<b>...</b>) on the first line.
Rewrite the text in plain, conversational language without adding facts of your own.
Keep names, titles and numbers exactly as they are.
Split the text into short paragraphs and cut filler.
Keep links as HTML anchors: <a href=\"URL\">text</a>.
Do not use emoji or the * character. Reply with the post text only, in the language of the original.";

const DEFAULT_PROMPT_SHORT: &str = "\
You are a copywriter. Shorten the post as much as possible:
- keep only the most important information
- drop filler and repetition
- aim for two or three sentences
Reply with the post text only, in the language of the original.";

const DEFAULT_PROMPT_CREATIVE: &str = "\
You are a creative social media editor. Rewrite the post to be engaging:
- add a catchy headline
- use emoji where they fit
- make the tone lively, keep every key fact
Reply with the post text only, in the language of the original.";

/// Built-in prompt for a mode.
pub fn default_prompt(mode: RewriteMode) -> &'static str {
    match mode {
        RewriteMode::Standard => DEFAULT_PROMPT_STD,
        RewriteMode::Short => DEFAULT_PROMPT_SHORT,
        RewriteMode::Creative => DEFAULT_PROMPT_CREATIVE,
    }
}

/// Check an operator-supplied prompt. Returns a short notice when rejected.
pub fn validate_prompt(prompt: &str) -> Result<(), &'static str> {
    if prompt.trim().chars().count() < MIN_PROMPT_CHARS {
        return Err("⚠️ Prompt is too short (at least 10 characters). Try again:");
    }
    Ok(())
}

/// Check an operator-supplied model name. Returns a short notice when rejected.
pub fn validate_model(name: &str) -> Result<(), &'static str> {
    let len = name.trim().chars().count();
    if len < MIN_MODEL_CHARS {
        return Err("⚠️ Model name is too short");
    }
    if len > MAX_MODEL_CHARS {
        return Err("⚠️ Model name is too long");
    }
    Ok(())
}

/// Current model and prompts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsSnapshot {
    pub model: String,
    pub prompts: Vec<(RewriteMode, String)>,
}

/// Read-through settings over the `settings` table.
#[derive(Clone)]
pub struct SettingsStore {
    db: Arc<dyn Database>,
}

impl SettingsStore {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    pub async fn model(&self) -> Result<String, DatabaseError> {
        Ok(self
            .db
            .get_setting(MODEL_KEY)
            .await?
            .unwrap_or_else(|| DEFAULT_MODEL.to_string()))
    }

    pub async fn set_model(&self, model: &str) -> Result<(), DatabaseError> {
        self.db.set_setting(MODEL_KEY, model.trim()).await?;
        info!(model = model.trim(), "Rewrite model changed");
        Ok(())
    }

    pub async fn prompt(&self, mode: RewriteMode) -> Result<String, DatabaseError> {
        Ok(self
            .db
            .get_setting(mode.setting_key())
            .await?
            .unwrap_or_else(|| default_prompt(mode).to_string()))
    }

    pub async fn set_prompt(&self, mode: RewriteMode, prompt: &str) -> Result<(), DatabaseError> {
        self.db.set_setting(mode.setting_key(), prompt.trim()).await?;
        info!(mode = %mode, "Rewrite prompt changed");
        Ok(())
    }

    /// Drop every override so the defaults apply again.
    pub async fn reset(&self) -> Result<(), DatabaseError> {
        let mut keys = vec![MODEL_KEY];
        keys.extend(RewriteMode::ALL.iter().map(|m| m.setting_key()));
        let removed = self.db.delete_settings(&keys).await?;
        info!(removed, "Rewrite settings reset");
        Ok(())
    }

    pub async fn snapshot(&self) -> Result<SettingsSnapshot, DatabaseError> {
        let mut prompts = Vec::with_capacity(RewriteMode::ALL.len());
        for mode in RewriteMode::ALL {
            prompts.push((mode, self.prompt(mode).await?));
        }
        Ok(SettingsSnapshot {
            model: self.model().await?,
            prompts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;

    async fn store() -> SettingsStore {
        SettingsStore::new(Arc::new(LibSqlBackend::new_memory().await.unwrap()))
    }

    #[tokio::test]
    async fn defaults_without_overrides() {
        let store = store().await;
        assert_eq!(store.model().await.unwrap(), DEFAULT_MODEL);
        for mode in RewriteMode::ALL {
            assert_eq!(store.prompt(mode).await.unwrap(), default_prompt(mode));
        }
    }

    #[tokio::test]
    async fn overrides_then_reset() {
        let store = store().await;
        store.set_model(" claude-sonnet-4-5-20250929 ").await.unwrap();
        store
            .set_prompt(RewriteMode::Creative, "Be playful with it")
            .await
            .unwrap();

        let snap = store.snapshot().await.unwrap();
        assert_eq!(snap.model, "claude-sonnet-4-5-20250929");
        assert_eq!(
            snap.prompts[2],
            (RewriteMode::Creative, "Be playful with it".to_string())
        );
        assert_eq!(snap.prompts[0].1, default_prompt(RewriteMode::Standard));

        store.reset().await.unwrap();
        assert_eq!(store.model().await.unwrap(), DEFAULT_MODEL);
        assert_eq!(
            store.prompt(RewriteMode::Creative).await.unwrap(),
            default_prompt(RewriteMode::Creative)
        );
    }

    #[test]
    fn validation() {
        assert!(validate_prompt("too short").is_err());
        assert!(validate_prompt("long enough prompt").is_ok());
        assert!(validate_model("abc").is_err());
        assert!(validate_model(&"m".repeat(101)).is_err());
        assert!(validate_model("claude-x-1").is_ok());
        assert!(AVAILABLE_MODELS.contains(&DEFAULT_MODEL));
    }
}
