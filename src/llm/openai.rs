//! OpenAI-compatible model service over plain HTTP.
//!
//! Chat completions back `complete` and `complete_with_image`; the
//! Assistants v2 thread/run endpoints back the persistent operations.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, RunHandle,
    RunStatus, ThreadId, VisionRequest,
};

const PROVIDER: &str = "openai";

/// How many thread messages to scan for the newest assistant reply.
const LATEST_REPLY_SCAN: u32 = 20;

/// OpenAI-compatible provider.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    assistant_id: Option<String>,
}

impl OpenAiProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            assistant_id: config.assistant_id.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Send a request and decode the JSON body, mapping HTTP failures.
    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        assistants_api: bool,
    ) -> Result<Value, LlmError> {
        let mut builder = builder.bearer_auth(self.api_key.expose_secret());
        if assistants_api {
            builder = builder.header("OpenAI-Beta", "assistants=v2");
        }

        let resp = builder.send().await.map_err(transport_error)?;
        let status = resp.status();
        let retry_after = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = resp.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(status_error(status.as_u16(), &body, retry_after));
        }

        Ok(serde_json::from_str(&body)?)
    }

    fn assistant_id(&self) -> Result<&str, LlmError> {
        self.assistant_id
            .as_deref()
            .ok_or_else(|| LlmError::ModelNotAvailable {
                provider: PROVIDER.to_string(),
                model: "assistant (OPENAI_ASSISTANT_ID not set)".to_string(),
            })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = chat_body(&self.model, &request);
        let value = self
            .send(self.client.post(self.url("chat/completions")).json(&body), false)
            .await?;
        parse_completion(&value)
    }

    async fn create_thread(&self) -> Result<ThreadId, LlmError> {
        let value = self
            .send(self.client.post(self.url("threads")).json(&json!({})), true)
            .await?;
        let id = string_field(&value, "id")?;
        tracing::debug!(thread_id = %id, "Created thread");
        Ok(ThreadId(id))
    }

    async fn append_and_run(
        &self,
        thread: &ThreadId,
        message: &ChatMessage,
        instructions: Option<&str>,
    ) -> Result<RunHandle, LlmError> {
        let assistant_id = self.assistant_id()?;

        self.send(
            self.client
                .post(self.url(&format!("threads/{thread}/messages")))
                .json(&json!({ "role": "user", "content": message.content })),
            true,
        )
        .await?;

        let mut run_body = json!({ "assistant_id": assistant_id });
        if let Some(extra) = instructions {
            run_body["additional_instructions"] = json!(extra);
        }
        let value = self
            .send(
                self.client
                    .post(self.url(&format!("threads/{thread}/runs")))
                    .json(&run_body),
                true,
            )
            .await?;

        Ok(RunHandle {
            thread_id: thread.clone(),
            run_id: string_field(&value, "id")?,
        })
    }

    async fn poll_run(&self, run: &RunHandle) -> Result<RunStatus, LlmError> {
        let value = self
            .send(
                self.client.get(self.url(&format!(
                    "threads/{}/runs/{}",
                    run.thread_id, run.run_id
                ))),
                true,
            )
            .await?;
        parse_run_status(&value)
    }

    async fn cancel_run(&self, run: &RunHandle) -> Result<(), LlmError> {
        self.send(
            self.client.post(self.url(&format!(
                "threads/{}/runs/{}/cancel",
                run.thread_id, run.run_id
            ))),
            true,
        )
        .await?;
        Ok(())
    }

    async fn fetch_latest_reply(&self, thread: &ThreadId) -> Result<String, LlmError> {
        let value = self
            .send(
                self.client.get(self.url(&format!(
                    "threads/{thread}/messages?order=desc&limit={LATEST_REPLY_SCAN}"
                ))),
                true,
            )
            .await?;
        latest_assistant_text(&value)
    }

    async fn complete_with_image(
        &self,
        request: VisionRequest,
    ) -> Result<CompletionResponse, LlmError> {
        let body = vision_body(&self.model, &request);
        let value = self
            .send(self.client.post(self.url("chat/completions")).json(&body), false)
            .await?;
        parse_completion(&value)
    }
}

// ── Request bodies ──────────────────────────────────────────────────

fn chat_body(model: &str, request: &CompletionRequest) -> Value {
    let mut body = json!({
        "model": model,
        "messages": request.messages,
    });
    apply_sampling(&mut body, request.max_tokens, request.temperature);
    body
}

fn vision_body(model: &str, request: &VisionRequest) -> Value {
    let mut body = json!({
        "model": model,
        "messages": [
            { "role": "system", "content": request.system },
            {
                "role": "user",
                "content": [
                    { "type": "text", "text": request.text },
                    {
                        "type": "image_url",
                        "image_url": { "url": request.image.as_url(), "detail": "high" }
                    }
                ]
            }
        ],
    });
    apply_sampling(&mut body, request.max_tokens, request.temperature);
    body
}

fn apply_sampling(body: &mut Value, max_tokens: Option<u32>, temperature: Option<f32>) {
    if let Some(max_tokens) = max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    if let Some(temperature) = temperature {
        // f32 -> f64 widening would otherwise send 0.699999988 for 0.7.
        body["temperature"] = json!((f64::from(temperature) * 100.0).round() / 100.0);
    }
}

// ── Response parsing ────────────────────────────────────────────────

fn parse_completion(value: &Value) -> Result<CompletionResponse, LlmError> {
    let choice = value
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .ok_or_else(|| invalid_response("no choices in completion"))?;

    let content = choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| invalid_response("completion has no text content"))?
        .to_string();

    let finish_reason = match choice.get("finish_reason").and_then(Value::as_str) {
        Some("stop") => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        _ => FinishReason::Unknown,
    };

    let usage = value.get("usage");
    let tokens = |key: &str| {
        usage
            .and_then(|u| u.get(key))
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32
    };

    Ok(CompletionResponse {
        content,
        input_tokens: tokens("prompt_tokens"),
        output_tokens: tokens("completion_tokens"),
        finish_reason,
    })
}

fn parse_run_status(value: &Value) -> Result<RunStatus, LlmError> {
    let status = value
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid_response("run has no status"))?;

    match status {
        "queued" => Ok(RunStatus::Queued),
        "in_progress" | "cancelling" => Ok(RunStatus::InProgress),
        "completed" => Ok(RunStatus::Completed),
        // Tool calls are never registered, so a run waiting on one cannot finish.
        "failed" | "incomplete" | "requires_action" => Ok(RunStatus::Failed),
        "cancelled" => Ok(RunStatus::Cancelled),
        "expired" => Ok(RunStatus::Expired),
        other => Err(invalid_response(&format!("unknown run status '{other}'"))),
    }
}

fn latest_assistant_text(value: &Value) -> Result<String, LlmError> {
    let messages = value
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid_response("message list has no data"))?;

    let latest = messages
        .iter()
        .find(|m| m.get("role").and_then(Value::as_str) == Some("assistant"))
        .ok_or_else(|| invalid_response("thread has no assistant reply"))?;

    let text = latest
        .get("content")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter(|p| p.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|p| p.get("text")?.get("value")?.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();

    let text = text.trim();
    if text.is_empty() {
        return Err(invalid_response("assistant reply has no text"));
    }
    Ok(text.to_string())
}

fn string_field(value: &Value, key: &str) -> Result<String, LlmError> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| invalid_response(&format!("missing '{key}'")))
}

// ── Error mapping ───────────────────────────────────────────────────

fn invalid_response(reason: &str) -> LlmError {
    LlmError::InvalidResponse {
        provider: PROVIDER.to_string(),
        reason: reason.to_string(),
    }
}

fn transport_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout {
            provider: PROVIDER.to_string(),
            reason: e.to_string(),
        }
    } else {
        LlmError::RequestFailed {
            provider: PROVIDER.to_string(),
            reason: e.to_string(),
        }
    }
}

fn status_error(status: u16, body: &str, retry_after: Option<Duration>) -> LlmError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));
    let message = error
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| body.chars().take(200).collect());
    let code = error
        .and_then(|e| e.get("code").or_else(|| e.get("type")))
        .and_then(Value::as_str)
        .unwrap_or_default();

    let provider = PROVIDER.to_string();
    match status {
        408 | 504 => LlmError::Timeout {
            provider,
            reason: format!("HTTP {status}: {message}"),
        },
        401 | 403 => LlmError::AuthFailed { provider },
        429 if code == "insufficient_quota" => LlmError::QuotaExceeded { provider },
        429 => LlmError::RateLimited {
            provider,
            retry_after,
        },
        400 if code.contains("image") || message.to_lowercase().contains("image") => {
            LlmError::InvalidImage {
                provider,
                reason: message,
            }
        }
        _ => LlmError::RequestFailed {
            provider,
            reason: format!("HTTP {status}: {message}"),
        },
    }
}
