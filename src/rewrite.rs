//! Post rewriting through a text generator.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::info;

use crate::error::{LlmError, RelayError};
use crate::llm::{GenerationRequest, TextGenerator};
use crate::settings::SettingsStore;

/// Output budget for one rewrite.
const MAX_TOKENS: u32 = 4096;

/// Rewrite style. Each mode has its own editable system prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RewriteMode {
    Standard,
    Short,
    Creative,
}

impl RewriteMode {
    pub const ALL: [RewriteMode; 3] = [Self::Standard, Self::Short, Self::Creative];

    /// Token used in callback data and commands.
    pub fn token(&self) -> &'static str {
        match self {
            Self::Standard => "std",
            Self::Short => "short",
            Self::Creative => "creative",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Standard => "Standard",
            Self::Short => "Short",
            Self::Creative => "Creative",
        }
    }

    /// Settings key holding this mode's prompt.
    pub fn setting_key(&self) -> &'static str {
        match self {
            Self::Standard => "prompt_std",
            Self::Short => "prompt_short",
            Self::Creative => "prompt_creative",
        }
    }
}

impl fmt::Display for RewriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for RewriteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "std" => Ok(Self::Standard),
            "short" => Ok(Self::Short),
            "creative" => Ok(Self::Creative),
            other => Err(format!("unknown rewrite mode: {other}")),
        }
    }
}

/// Rewrites text with the configured model and the mode's prompt.
pub struct RewriteService {
    generator: Option<Arc<dyn TextGenerator>>,
    settings: SettingsStore,
}

impl RewriteService {
    /// `generator` is `None` when no API key is configured.
    pub fn new(generator: Option<Arc<dyn TextGenerator>>, settings: SettingsStore) -> Self {
        Self {
            generator,
            settings,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.generator.is_some()
    }

    /// Rewrite `text` under `mode`. Empty input yields empty output without a call.
    pub async fn rewrite(&self, text: &str, mode: RewriteMode) -> Result<String, RelayError> {
        let generator = self.generator.as_ref().ok_or(RelayError::RewriteDisabled)?;

        if text.trim().is_empty() {
            return Ok(String::new());
        }

        let request = GenerationRequest {
            model: self.settings.model().await?,
            system_prompt: self.settings.prompt(mode).await?,
            user_text: text.to_string(),
            max_tokens: MAX_TOKENS,
        };

        let output = generator.generate(&request).await?;
        if output.trim().is_empty() {
            return Err(RelayError::Rewrite(LlmError::InvalidResponse {
                provider: request.model,
                reason: "empty rewrite".to_string(),
            }));
        }

        info!(mode = %mode, model = %request.model, chars = output.chars().count(), "Text rewritten");
        Ok(output.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::settings::DEFAULT_MODEL;
    use crate::store::{Database, LibSqlBackend};

    struct Recorder {
        reply: Result<String, ()>,
        seen: Mutex<Vec<GenerationRequest>>,
    }

    #[async_trait]
    impl TextGenerator for Recorder {
        async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
            self.seen.lock().unwrap().push(request.clone());
            self.reply.clone().map_err(|_| LlmError::InvalidRequest {
                provider: "stub".into(),
                status: 400,
                reason: "nope".into(),
            })
        }
    }

    async fn settings() -> SettingsStore {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        SettingsStore::new(db)
    }

    fn recorder(reply: Result<&str, ()>) -> Arc<Recorder> {
        Arc::new(Recorder {
            reply: reply.map(str::to_string),
            seen: Mutex::new(Vec::new()),
        })
    }

    #[test]
    fn mode_tokens() {
        for mode in RewriteMode::ALL {
            assert_eq!(mode.token().parse::<RewriteMode>().unwrap(), mode);
        }
        assert!("long".parse::<RewriteMode>().is_err());
        assert_eq!(RewriteMode::Standard.setting_key(), "prompt_std");
    }

    #[tokio::test]
    async fn disabled_without_generator() {
        let service = RewriteService::new(None, settings().await);
        assert!(!service.is_enabled());
        let err = service.rewrite("text", RewriteMode::Standard).await.unwrap_err();
        assert!(matches!(err, RelayError::RewriteDisabled));
    }

    #[tokio::test]
    async fn empty_text_skips_the_call() {
        let generator = recorder(Ok("unused"));
        let service = RewriteService::new(Some(generator.clone() as Arc<dyn TextGenerator>), settings().await);
        assert_eq!(service.rewrite("  \n", RewriteMode::Short).await.unwrap(), "");
        assert!(generator.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn uses_model_and_mode_prompt() {
        let store = settings().await;
        store.set_prompt(RewriteMode::Short, "Make it short please").await.unwrap();
        let generator = recorder(Ok(" Hello WORLD \n"));
        let service = RewriteService::new(Some(generator.clone() as Arc<dyn TextGenerator>), store);

        let out = service.rewrite("Hello **world**", RewriteMode::Short).await.unwrap();
        assert_eq!(out, "Hello WORLD");

        let seen = generator.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].model, DEFAULT_MODEL);
        assert_eq!(seen[0].system_prompt, "Make it short please");
        assert_eq!(seen[0].user_text, "Hello **world**");
        assert_eq!(seen[0].max_tokens, 4096);
    }

    #[tokio::test]
    async fn generator_failure_is_wrapped() {
        let service = RewriteService::new(Some(recorder(Err(())) as Arc<dyn TextGenerator>), settings().await);
        let err = service.rewrite("text", RewriteMode::Creative).await.unwrap_err();
        assert!(matches!(err, RelayError::Rewrite(LlmError::InvalidRequest { .. })));
    }

    #[tokio::test]
    async fn blank_output_is_rejected() {
        let service = RewriteService::new(Some(recorder(Ok("   ")) as Arc<dyn TextGenerator>), settings().await);
        let err = service.rewrite("text", RewriteMode::Standard).await.unwrap_err();
        assert!(matches!(err, RelayError::Rewrite(LlmError::InvalidResponse { .. })));
    }
}
