// src/brain.rs
//! Language-model transport.
//!
//! [`ResearchBrain`] is the seam every synthesis step goes through; the
//! production implementation is [`GeminiBrain`], a blocking client for the
//! Gemini `generateContent` endpoint wrapped in the shared retry policy.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::LlmConfig;
use crate::error::SynthesisError;
use crate::retry::RetryPolicy;

const ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub trait ResearchBrain: Send + Sync {
    /// Whether a credential is present. Unconfigured brains fail every call
    /// with [`SynthesisError::NotConfigured`].
    fn is_configured(&self) -> bool;

    fn complete_text(&self, prompt: &str) -> Result<String, SynthesisError>;

    /// Complete and parse the first JSON object in the answer.
    fn complete_json(&self, prompt: &str) -> Result<Value, SynthesisError> {
        let text = self.complete_text(prompt)?;
        parse_json_object(&text)
    }
}

fn trailing_commas() -> &'static Regex {
    static TRAILING: OnceLock<Regex> = OnceLock::new();
    TRAILING.get_or_init(|| Regex::new(r",\s*([}\]])").expect("valid trailing comma regex"))
}

/// Pull the outermost `{...}` span out of a model answer and parse it.
///
/// Models wrap JSON in prose or code fences and leave trailing commas; the
/// span is cut from the first `{` to the last `}` and parsed, then parsed
/// once more with trailing commas removed.
pub fn parse_json_object(text: &str) -> Result<Value, SynthesisError> {
    let malformed = |reason: String| SynthesisError::Malformed {
        reason,
        raw_response: text.to_string(),
    };

    let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
        return Err(malformed("no JSON object in response".to_string()));
    };
    if end < start {
        return Err(malformed("no JSON object in response".to_string()));
    }
    let span = &text[start..=end];

    let parsed = serde_json::from_str::<Value>(span).or_else(|first| {
        let repaired = trailing_commas().replace_all(span, "$1");
        serde_json::from_str::<Value>(&repaired)
            .map_err(|_| malformed(format!("JSON parsing failed: {first}")))
    })?;

    if parsed.is_object() {
        Ok(parsed)
    } else {
        Err(malformed("response JSON is not an object".to_string()))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: [RequestPart<'a>; 1],
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Deserialize, Debug)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateResponse {
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| {
                c.parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
            .trim()
            .to_string()
    }
}

/// Map a non-success HTTP status to the error taxonomy.
fn status_error(status: StatusCode, body: &str) -> SynthesisError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        SynthesisError::RateLimited
    } else if status.is_server_error() {
        SynthesisError::Server {
            status: status.as_u16(),
        }
    } else {
        SynthesisError::Rejected {
            status: status.as_u16(),
            message: body.chars().take(300).collect(),
        }
    }
}

pub struct GeminiBrain {
    client: Client,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
    retry: RetryPolicy,
}

impl GeminiBrain {
    pub fn new(config: &LlmConfig) -> Result<Self, SynthesisError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SynthesisError::Connection {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        let api_key = config.api_key.clone().filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY not set, synthesis steps will report NotConfigured");
        }
        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            retry: config.retry.clone(),
        })
    }

    fn generate_once(&self, api_key: &str, prompt: &str) -> Result<String, SynthesisError> {
        let request = GenerateRequest {
            contents: [Content {
                role: "user",
                parts: [RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
            safety_settings: [
                "HARM_CATEGORY_HARASSMENT",
                "HARM_CATEGORY_HATE_SPEECH",
                "HARM_CATEGORY_SEXUALLY_EXPLICIT",
                "HARM_CATEGORY_DANGEROUS_CONTENT",
            ]
            .into_iter()
            .map(|category| SafetySetting {
                category,
                threshold: "BLOCK_NONE",
            })
            .collect(),
        };

        let url = format!("{ENDPOINT}/{}:generateContent", self.model);
        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&request)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    SynthesisError::Timeout
                } else {
                    SynthesisError::Connection {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let body: GenerateResponse = response.json().map_err(|e| SynthesisError::Malformed {
            reason: format!("unexpected response envelope: {e}"),
            raw_response: String::new(),
        })?;
        let text = body.text();
        if text.is_empty() {
            return Err(SynthesisError::Empty);
        }
        Ok(text)
    }
}

impl ResearchBrain for GeminiBrain {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn complete_text(&self, prompt: &str) -> Result<String, SynthesisError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(SynthesisError::NotConfigured);
        };
        tracing::debug!(model = %self.model, prompt_chars = prompt.chars().count(), "LLM request");
        self.retry
            .run("gemini.generate", || self.generate_once(api_key, prompt))
    }
}
