//! OpenAI-compatible chat completions in schema-constrained mode.

use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("completion service unavailable: {0}")]
    Unavailable(String),

    #[error("completion API error ({status}): {message}")]
    Api {
        status: reqwest::StatusCode,
        message: String,
    },

    #[error("malformed completion response: {0}")]
    Malformed(String),
}

pub fn chat_completions_endpoint(base_url: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    format!("{base_url}/chat/completions")
}

#[derive(Debug, Clone)]
pub struct JsonSchemaRequest<'a> {
    pub model: &'a str,
    pub system: &'a str,
    pub user: &'a str,
    pub schema_name: &'a str,
    pub schema: &'a Value,
    pub temperature: f32,
}

pub fn request_body(req: &JsonSchemaRequest<'_>) -> Value {
    serde_json::json!({
        "model": req.model,
        "messages": [
            { "role": "system", "content": req.system },
            { "role": "user", "content": req.user },
        ],
        "response_format": {
            "type": "json_schema",
            "json_schema": {
                "name": req.schema_name,
                "strict": true,
                "schema": req.schema,
            },
        },
        "temperature": req.temperature,
    })
}

/// POST one chat completion and return the assistant message parsed as
/// JSON. Shape checks against the schema are left to the caller.
pub async fn chat_json(
    client: &reqwest::Client,
    endpoint: &str,
    api_key: &str,
    req: &JsonSchemaRequest<'_>,
) -> Result<Value, CompletionError> {
    let response = client
        .post(endpoint)
        .bearer_auth(api_key)
        .json(&request_body(req))
        .send()
        .await
        .map_err(|err| CompletionError::Unavailable(format!("POST {endpoint}: {err}")))?;

    let status = response.status();
    let raw = response
        .text()
        .await
        .map_err(|err| CompletionError::Unavailable(format!("read response body: {err}")))?;
    if !status.is_success() {
        let message = parse_error_message(&raw).unwrap_or_else(|| raw.clone());
        return Err(CompletionError::Api { status, message });
    }

    let value: Value = serde_json::from_str(&raw)
        .map_err(|err| CompletionError::Malformed(format!("response is not JSON: {err}")))?;
    let content = extract_message_content(&value)?;
    serde_json::from_str(content)
        .map_err(|err| CompletionError::Malformed(format!("message content is not JSON: {err}")))
}

fn parse_error_message(raw_json: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw_json).ok()?;
    let message = value.get("error")?.get("message")?.as_str()?.to_owned();
    Some(message)
}

fn extract_message_content(value: &Value) -> Result<&str, CompletionError> {
    let message = value
        .get("choices")
        .and_then(|v| v.as_array())
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| CompletionError::Malformed("missing `choices[0].message`".to_owned()))?;

    if let Some(refusal) = message.get("refusal").and_then(|v| v.as_str())
        && !refusal.trim().is_empty()
    {
        return Err(CompletionError::Malformed(format!("model refused: {refusal}")));
    }

    let content = message
        .get("content")
        .and_then(|v| v.as_str())
        .ok_or_else(|| CompletionError::Malformed("missing message content".to_owned()))?;
    if content.trim().is_empty() {
        return Err(CompletionError::Malformed("message content is empty".to_owned()));
    }
    Ok(content)
}
