use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{GenerationConfig, GreetingConfig, GreetingError, Result};

/// Backend able to turn a prompt into text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_text(&self, prompt: &str) -> Result<String>;
}

/// Client for the Gemini `generateContent` REST endpoint.
pub struct GeminiClient {
    http: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let http = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint, self.model
        )
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate_text(&self, prompt: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or(GreetingError::MissingCredential)?;

        tracing::debug!(model = %self.model, "requesting wish text");
        let response = self
            .http
            .post(self.url())
            .header("x-goog-api-key", api_key)
            .json(&GenerateRequest::from_prompt(prompt))
            .send()
            .await?
            .error_for_status()?;

        let body: GenerateResponse = response.json().await?;
        body.text().ok_or(GreetingError::EmptyResponse)
    }
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

impl<'a> GenerateRequest<'a> {
    fn from_prompt(prompt: &'a str) -> Self {
        Self {
            contents: vec![Content {
                parts: vec![RequestPart { text: prompt }],
            }],
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GenerateResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CandidateContent {
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate, `None` when blank.
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect();
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

/// Builds the fixed prompt and fallback messages for one recipient.
#[derive(Debug, Clone)]
pub struct WishPrompt {
    pub prompt: String,
    /// Used when there is no credential or the service sends nothing back.
    pub fallback: String,
    /// Used when the request itself fails.
    pub error_fallback: String,
}

impl WishPrompt {
    pub fn for_greeting(greeting: &GreetingConfig) -> Self {
        let recipient = &greeting.recipient;
        let sender = &greeting.sender;
        Self {
            prompt: format!(
                "Write a cool and appreciative birthday message for {recipient} from their friend {sender}. \
                 Mention that {recipient} is such a chill friend, that {sender} is grateful for all the meetups \
                 and talks, and how much {sender} values the whole relationship. Keep it under 60 words. \
                 Make it sound genuine and amazing. End with a short, cool 2-line rhyme."
            ),
            fallback: format!(
                "Happy Birthday {recipient}! You're such a chill friend and I'm so grateful for our meetups \
                 and talks. I truly value our friendship. Have an amazing year ahead!"
            ),
            error_fallback: format!(
                "Happy Birthday {recipient}! Thanks for being a solid friend and a great person to talk to. \
                 Here's to an amazing year ahead!"
            ),
        }
    }
}

/// The `generate() -> text` boundary: never fails, substitutes a fallback
/// message instead.
#[derive(Clone)]
pub struct WishService {
    backend: Arc<dyn TextGenerator>,
    prompt: WishPrompt,
}

impl WishService {
    pub fn new(backend: Arc<dyn TextGenerator>, prompt: WishPrompt) -> Self {
        Self { backend, prompt }
    }

    pub fn prompt(&self) -> &WishPrompt {
        &self.prompt
    }

    pub async fn generate(&self) -> String {
        match self.backend.generate_text(&self.prompt.prompt).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) | Err(GreetingError::EmptyResponse) => {
                tracing::warn!("generation returned no text, using fallback");
                self.prompt.fallback.clone()
            }
            Err(GreetingError::MissingCredential) => {
                tracing::warn!("generation credential is missing, using fallback");
                self.prompt.fallback.clone()
            }
            Err(err) => {
                tracing::error!(error = %err, "error generating wish");
                self.prompt.error_fallback.clone()
            }
        }
    }
}

impl std::fmt::Debug for WishService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WishService")
            .field("prompt", &self.prompt)
            .finish()
    }
}
