use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::config::{AppConfig, ConfigError, ProviderStore};
use crate::openai::{self, CompletionError, JsonSchemaRequest};

/// One schema-constrained completion call.
#[derive(Debug, Clone)]
pub struct StructuredPrompt<'a> {
    pub system: &'a str,
    pub user: &'a str,
    pub schema_name: &'a str,
    pub schema: &'a Value,
}

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete_json(&self, prompt: &StructuredPrompt<'_>) -> Result<Value, CompletionError>;
}

#[derive(Debug, Clone)]
pub struct OpenAiChatClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiChatClient {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
        timeout: Option<Duration>,
    ) -> Result<Self, InitError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| InitError::Client(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: openai::chat_completions_endpoint(base_url.trim()),
            api_key: api_key.into(),
            model: model.into(),
            temperature,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionBackend for OpenAiChatClient {
    async fn complete_json(&self, prompt: &StructuredPrompt<'_>) -> Result<Value, CompletionError> {
        tracing::info!(
            model = %self.model,
            schema = prompt.schema_name,
            prompt_chars = prompt.user.chars().count(),
            "completion request"
        );
        let request = JsonSchemaRequest {
            model: &self.model,
            system: prompt.system,
            user: prompt.user,
            schema_name: prompt.schema_name,
            schema: prompt.schema,
            temperature: self.temperature,
        };
        openai::chat_json(&self.client, &self.endpoint, &self.api_key, &request).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("build http client: {0}")]
    Client(String),
}

/// Settings needed to build the client on first use.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub providers_file: PathBuf,
    pub provider: String,
    pub model: String,
    pub temperature: f32,
    pub timeout: Option<Duration>,
}

impl From<&AppConfig> for ClientSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            providers_file: config.providers_file.clone(),
            provider: config.provider.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            timeout: config.request_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Completion client built on first use and shared afterwards.
///
/// A failed construction leaves the cell empty, so the next call tries
/// again (e.g. after the provider store has been fixed).
#[derive(Clone)]
pub struct LazyCompletion {
    settings: Arc<ClientSettings>,
    cell: Arc<OnceCell<Arc<dyn CompletionBackend>>>,
}

impl LazyCompletion {
    pub fn new(settings: ClientSettings) -> Self {
        Self {
            settings: Arc::new(settings),
            cell: Arc::new(OnceCell::new()),
        }
    }

    /// Pre-initialized with `backend`; used to inject stubs.
    pub fn with_backend(backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            settings: Arc::new(ClientSettings {
                providers_file: PathBuf::new(),
                provider: String::new(),
                model: String::new(),
                temperature: 0.0,
                timeout: None,
            }),
            cell: Arc::new(OnceCell::new_with(Some(backend))),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    pub async fn ensure_initialized(&self) -> Result<Arc<dyn CompletionBackend>, InitError> {
        let backend = self
            .cell
            .get_or_try_init(|| async { build_backend(&self.settings) })
            .await?;
        Ok(Arc::clone(backend))
    }
}

fn build_backend(settings: &ClientSettings) -> Result<Arc<dyn CompletionBackend>, InitError> {
    let store = ProviderStore::load(&settings.providers_file)?;
    let entry = store.get(&settings.provider)?;
    let client = OpenAiChatClient::new(
        &entry.base_url,
        entry.api_key.clone(),
        settings.model.clone(),
        settings.temperature,
        settings.timeout,
    )?;
    tracing::info!(
        provider = %settings.provider,
        endpoint = client.endpoint(),
        model = %settings.model,
        "completion client initialized"
    );
    Ok(Arc::new(client))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(providers_file: PathBuf) -> ClientSettings {
        ClientSettings {
            providers_file,
            provider: "YUNWU-OPENAI".to_owned(),
            model: "gpt-test".to_owned(),
            temperature: 0.1,
            timeout: None,
        }
    }

    #[tokio::test]
    async fn refused_connection_is_unavailable() -> anyhow::Result<()> {
        let client = OpenAiChatClient::new(
            "http://127.0.0.1:9/v1",
            "k",
            "gpt-test",
            0.1,
            Some(Duration::from_secs(5)),
        )?;
        let schema = serde_json::json!({ "type": "object" });
        let prompt = StructuredPrompt {
            system: "s",
            user: "u",
            schema_name: "empty",
            schema: &schema,
        };

        let err = client.complete_json(&prompt).await.err().expect("port 9 is closed");
        assert!(matches!(err, CompletionError::Unavailable(_)), "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn failed_init_is_retried_on_next_use() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let providers = temp.path().join("providers.yaml");
        let lazy = LazyCompletion::new(settings(providers.clone()));

        let err = lazy.ensure_initialized().await.err().expect("init should fail");
        assert!(matches!(err, InitError::Config(ConfigError::Read { .. })));
        assert!(!lazy.is_initialized());

        std::fs::write(&providers, "OTHER:\n  api_key: k\n  base_url: http://x\n")?;
        let err = lazy.ensure_initialized().await.err().expect("init should fail");
        assert!(matches!(
            err,
            InitError::Config(ConfigError::MissingProvider(_))
        ));

        std::fs::write(
            &providers,
            "YUNWU-OPENAI:\n  api_key: k\n  base_url: http://127.0.0.1:9/v1\n",
        )?;
        let first = lazy.ensure_initialized().await?;
        let second = lazy.clone().ensure_initialized().await?;
        assert!(lazy.is_initialized());
        assert!(Arc::ptr_eq(&first, &second));
        Ok(())
    }
}
