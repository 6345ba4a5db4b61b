//! Anthropic-backed teacher agent.
//!
//! Builds the strict-protocol prompt and calls the messages API. The system
//! prompt embeds the full corpus text and the protocol contract: the agent
//! must end its response with exactly one of the two markers recognized by
//! [`crate::protocol`]. Retry/backoff mirrors the Firecrawl client: 429 and
//! 5xx retried, other 4xx fatal.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::TeacherConfig;
use crate::error::{HarnessError, Result};
use crate::protocol::{COMPLETE_MARKER, GAP_MARKER};
use crate::providers::Agent;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Render the system prompt for one attempt.
pub fn system_prompt(task: &str, corpus_context: &str) -> String {
    format!(
        "You are an expert technical teacher. Your task is to demonstrate how to \
complete a specific task using the documentation provided.\n\n\
TASK: {task}\n\n\
You have access to the following documentation corpus. Pages are labeled with \
an authority tier; when pages disagree, prefer tier 1 over tier 2 over tier 3.\n\n\
<documentation>\n{corpus_context}\n</documentation>\n\n\
---\n\n\
INSTRUCTIONS:\n\
1. Carefully study the documentation above\n\
2. Provide a complete, working solution for the task\n\
3. Include all necessary code, commands, and explanations\n\n\
You MUST end your response with exactly one of these two lines, never both:\n\
{complete} <brief summary of what was accomplished>\n\
{gap} <specific search query to find the missing information>\n\n\
Use the second form when the documentation is insufficient. Do not provide \
partial solutions without declaring a gap, and do not emit either marker \
anywhere else in your response.",
        task = task,
        corpus_context = corpus_context,
        complete = COMPLETE_MARKER,
        gap = GAP_MARKER,
    )
}

/// The clarified instruction appended after an unparseable response.
pub fn reprompt_instruction() -> String {
    format!(
        "Your previous response did not follow the required format. Respond again, \
ending with exactly one of `{}` or `{}` followed by a non-empty payload on the \
same line.",
        COMPLETE_MARKER, GAP_MARKER
    )
}

pub struct AnthropicAgent {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_response_tokens: u32,
    max_retries: u32,
}

impl AnthropicAgent {
    pub fn new(config: &TeacherConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| HarnessError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            max_response_tokens: config.max_response_tokens,
            max_retries: 3,
        })
    }
}

#[async_trait]
impl Agent for AnthropicAgent {
    async fn attempt(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_response_tokens,
            "system": system_prompt,
            "messages": [{ "role": "user", "content": user_prompt }],
        });

        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(API_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", API_VERSION)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let value: Value =
                            response.json().await.map_err(|e| HarnessError::Provider {
                                op: "agent",
                                message: format!("invalid JSON response: {}", e),
                            })?;
                        return extract_text(&value);
                    }
                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(format!("HTTP {}: {}", status, body_text));
                        continue;
                    }
                    return Err(HarnessError::Provider {
                        op: "agent",
                        message: format!("HTTP {}: {}", status, body_text),
                    });
                }
                Err(e) => {
                    last_err = Some(e.to_string());
                    continue;
                }
            }
        }

        Err(HarnessError::Provider {
            op: "agent",
            message: last_err.unwrap_or_else(|| "request failed after retries".into()),
        })
    }
}

/// Concatenate the text blocks of a messages-API response.
fn extract_text(value: &Value) -> Result<String> {
    let blocks = value
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| HarnessError::Provider {
            op: "agent",
            message: "response missing content array".into(),
        })?;

    let text: Vec<&str> = blocks
        .iter()
        .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|b| b.get("text").and_then(Value::as_str))
        .collect();

    if text.is_empty() {
        return Err(HarnessError::Provider {
            op: "agent",
            message: "response contained no text blocks".into(),
        });
    }

    Ok(text.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_states_the_contract() {
        let prompt = system_prompt("build a parser", "=== docs ===");
        assert!(prompt.contains("build a parser"));
        assert!(prompt.contains(COMPLETE_MARKER));
        assert!(prompt.contains(GAP_MARKER));
        assert!(prompt.contains("exactly one"));
    }

    #[test]
    fn test_extract_text_joins_blocks() {
        let value = json!({
            "content": [
                {"type": "text", "text": "part one"},
                {"type": "tool_use", "id": "x"},
                {"type": "text", "text": "part two"}
            ]
        });
        assert_eq!(extract_text(&value).unwrap(), "part one\npart two");
    }

    #[test]
    fn test_extract_text_rejects_empty() {
        assert!(extract_text(&json!({"content": []})).is_err());
        assert!(extract_text(&json!({})).is_err());
    }
}
