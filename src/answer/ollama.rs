//! [`AnswerService`] backed by a local Ollama server.
//!
//! Uses blocking `ureq` on tokio's blocking pool, so a slow model never
//! stalls the runtime threads that other queries are using.

use async_trait::async_trait;

use crate::config::OllamaConfig;

use super::{AnswerError, AnswerRequest, AnswerService, ServiceAnswer, decode};

const SYSTEM_PROMPT: &str = "You answer questions from knowledge graph evidence. \
    Use only the facts and paths given; say so when they are not enough. \
    Reply with a single JSON object and no other text.";

/// Client for the Ollama `/api/generate` endpoint.
#[derive(Clone)]
pub struct OllamaService {
    config: OllamaConfig,
}

impl OllamaService {
    pub fn new(config: OllamaConfig) -> Self {
        Self { config }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Whether the server answers on `/api/tags`.
    ///
    /// Blocking; meant for start-up checks, not the query path.
    pub fn is_reachable(&self) -> bool {
        let url = format!("{}/api/tags", self.config.base_url);
        let agent = ureq::AgentBuilder::new()
            .timeout(std::time::Duration::from_secs(5))
            .build();
        matches!(agent.get(&url).call(), Ok(resp) if resp.status() == 200)
    }

    /// One blocking completion; returns the raw `response` text.
    fn complete(&self, prompt: &str) -> Result<String, AnswerError> {
        let url = format!("{}/api/generate", self.config.base_url);
        let agent = ureq::AgentBuilder::new()
            .timeout(std::time::Duration::from_secs(self.config.timeout_secs))
            .build();

        let body = serde_json::json!({
            "model": self.config.model,
            "prompt": prompt,
            "system": SYSTEM_PROMPT,
            "stream": false,
            "format": "json",
            "options": { "temperature": self.config.temperature },
        });

        let resp = agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_json(body)
            .map_err(|e| self.map_error(e))?;

        let json: serde_json::Value =
            resp.into_json().map_err(|e| AnswerError::Malformed {
                message: format!("response body is not JSON: {e}"),
            })?;

        json["response"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AnswerError::Malformed {
                message: "missing 'response' field".into(),
            })
    }

    fn map_error(&self, err: ureq::Error) -> AnswerError {
        match err {
            ureq::Error::Status(code, _) => AnswerError::Transport {
                message: format!("{} returned status {code}", self.config.base_url),
            },
            ureq::Error::Transport(t) if t.kind() == ureq::ErrorKind::ConnectionFailed => {
                AnswerError::Unavailable {
                    message: format!("cannot connect to {}: {t}", self.config.base_url),
                }
            }
            ureq::Error::Transport(t) => AnswerError::Transport {
                message: t.to_string(),
            },
        }
    }
}

#[async_trait]
impl AnswerService for OllamaService {
    async fn generate(&self, request: &AnswerRequest) -> Result<ServiceAnswer, AnswerError> {
        let client = self.clone();
        let prompt = request.render_prompt();
        let raw = tokio::task::spawn_blocking(move || client.complete(&prompt))
            .await
            .map_err(|e| AnswerError::Transport {
                message: format!("blocking request task failed: {e}"),
            })??;
        decode::decode(&raw)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

impl std::fmt::Debug for OllamaService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaService")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .finish()
    }
}
