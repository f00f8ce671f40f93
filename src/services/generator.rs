use crate::{
    config::Config,
    error::{AppError, Result},
    models::{generation::GeneratedStory, story::StoryCategory},
    services::session::SessionId,
};
use axum::http::StatusCode;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

static FENCE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```(\w*)?\s*\n?(.*?)\n?\s*```$").unwrap()
});

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("AI generation API key is not configured")]
    NotConfigured,

    #[error("generation request failed: {0}")]
    Transport(String),

    #[error("generated story is incomplete: {0}")]
    Incomplete(String),

    #[error("generated story has an invalid category: {0}")]
    InvalidCategory(String),

    #[error("generation was superseded by a newer request")]
    Superseded,
}

impl GenerationError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            Self::Superseded => StatusCode::CONFLICT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    /// 展示给用户的统一提示
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotConfigured => "AI story generation is not configured.",
            Self::Superseded => "This generation was replaced by a newer request.",
            _ => "An error occurred while generating the story. Please try again.",
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawStory {
    title: Option<String>,
    content: Option<String>,
    category: Option<String>,
}

struct InFlight {
    ticket: u64,
    abort: AbortHandle,
}

/// AI 故事生成客户端（Gemini `generateContent` 接口）
///
/// 每个会话同时最多一个进行中的请求：新请求会中止旧请求，
/// 旧请求的调用方收到 [`GenerationError::Superseded`]。
#[derive(Clone)]
pub struct StoryGenerator {
    http_client: Client,
    api_key: Option<String>,
    api_url: String,
    model: String,
    temperature: f32,
    in_flight: Arc<DashMap<SessionId, InFlight>>,
    next_ticket: Arc<AtomicU64>,
}

impl StoryGenerator {
    pub fn new(config: &Config) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.generation_timeout_secs))
            .build()
            .map_err(|e| AppError::internal(&format!("Failed to create HTTP client: {}", e)))?;

        if config.gemini_api_key.is_none() {
            warn!("GEMINI_API_KEY is not set. AI generation will be disabled.");
        }

        Ok(Self {
            http_client,
            api_key: config.gemini_api_key.clone(),
            api_url: config.gemini_api_url.trim_end_matches('/').to_string(),
            model: config.gemini_model.clone(),
            temperature: config.generation_temperature,
            in_flight: Arc::new(DashMap::new()),
            next_ticket: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub async fn generate(
        &self,
        session: &SessionId,
        prompt: &str,
    ) -> std::result::Result<GeneratedStory, GenerationError> {
        let api_key = self.api_key.clone().ok_or(GenerationError::NotConfigured)?;
        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst);

        let request = GenerationRequest {
            client: self.http_client.clone(),
            url: format!("{}/v1beta/models/{}:generateContent", self.api_url, self.model),
            api_key,
            temperature: self.temperature,
            prompt: prompt.to_string(),
        };
        let handle = tokio::spawn(request.send());

        let previous = self.in_flight.insert(
            session.clone(),
            InFlight {
                ticket,
                abort: handle.abort_handle(),
            },
        );
        if let Some(previous) = previous {
            debug!("Aborting generation {} for session {}", previous.ticket, session);
            previous.abort.abort();
        }

        // 调用方被丢弃（客户端断开）时由 guard 中止任务并清理登记
        let mut guard = InFlightGuard {
            in_flight: &self.in_flight,
            session,
            ticket,
            abort: handle.abort_handle(),
            armed: true,
        };

        let outcome = handle.await;
        guard.armed = false;

        let superseded = self
            .in_flight
            .get(session)
            .map_or(false, |current| current.ticket != ticket);
        drop(guard);

        match outcome {
            Ok(_) if superseded => Err(GenerationError::Superseded),
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(GenerationError::Superseded),
            Err(e) => {
                error!("Generation task failed: {}", e);
                Err(GenerationError::Transport(e.to_string()))
            }
        }
    }
}

struct InFlightGuard<'a> {
    in_flight: &'a DashMap<SessionId, InFlight>,
    session: &'a SessionId,
    ticket: u64,
    abort: AbortHandle,
    armed: bool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!(
                "Caller dropped, aborting generation {} for session {}",
                self.ticket, self.session
            );
            self.abort.abort();
        }
        let ticket = self.ticket;
        self.in_flight
            .remove_if(self.session, |_, current| current.ticket == ticket);
    }
}

struct GenerationRequest {
    client: Client,
    url: String,
    api_key: String,
    temperature: f32,
    prompt: String,
}

impl GenerationRequest {
    async fn send(self) -> std::result::Result<GeneratedStory, GenerationError> {
        let body = json!({
            "systemInstruction": { "parts": [{ "text": system_instruction() }] },
            "contents": [{
                "role": "user",
                "parts": [{ "text": format!("Write a story based on the following idea: \"{}\"", self.prompt) }]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "temperature": self.temperature
            }
        });

        let response = self
            .client
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            error!("Generation API returned {}: {}", status, detail);
            return Err(GenerationError::Transport(format!("HTTP {}", status)));
        }

        let payload: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Incomplete(format!("unreadable response: {}", e)))?;

        let text: String = payload
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let story = parse_generated_story(&text)?;
        info!("Generated story \"{}\" ({})", story.title, story.category);
        Ok(story)
    }
}

fn system_instruction() -> String {
    let categories = StoryCategory::ALL
        .iter()
        .map(|c| c.key())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "You are a professional novelist who writes long, gripping stories that keep the reader \
on the edge of their seat. Write a realistic, detailed story full of suspense, in the same \
language as the idea you are given.\n\
Respond with a JSON object containing exactly these fields:\n\
- \"title\": (string) a catchy, mysterious title.\n\
- \"content\": (string) the full story, rich in events and at least 500 words long, with a \
rising plot, a thrilling climax and a satisfying ending.\n\
- \"category\": (string) exactly one of: {}.\n\
Do not add any text outside the JSON object.",
        categories
    )
}

/// 去掉可选的 Markdown 代码块包裹
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    match FENCE_REGEX.captures(trimmed).and_then(|c| c.get(2)) {
        Some(inner) if !inner.as_str().trim().is_empty() => inner.as_str().trim(),
        _ => trimmed,
    }
}

pub fn parse_generated_story(text: &str) -> std::result::Result<GeneratedStory, GenerationError> {
    let json = strip_code_fence(text);
    if json.is_empty() {
        return Err(GenerationError::Incomplete("empty response".to_string()));
    }

    let raw: RawStory = serde_json::from_str(json)
        .map_err(|e| GenerationError::Incomplete(format!("response is not valid JSON: {}", e)))?;

    let title = non_blank(raw.title, "title")?;
    let content = non_blank(raw.content, "content")?;
    let category = non_blank(raw.category, "category")?;
    let category = category
        .parse::<StoryCategory>()
        .map_err(|e| GenerationError::InvalidCategory(e.0))?;

    Ok(GeneratedStory {
        title,
        content,
        category,
    })
}

fn non_blank(value: Option<String>, field: &str) -> std::result::Result<String, GenerationError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(GenerationError::Incomplete(format!("missing {}", field))),
    }
}
