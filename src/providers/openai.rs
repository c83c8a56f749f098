use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::{Value, json};

use super::retry::{Backoff, is_rate_limited, retry_after};
use super::{Provider, ProviderFuture, TranslateOptions};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub(crate) const DEFAULT_MODEL: &str = "gpt-4o-mini";
const TOOL_NAME: &str = "deliver_translations";
const MAX_TEXTS_PER_REQUEST: usize = 20;

#[derive(Debug, Clone)]
pub struct OpenAI {
    key: String,
    model: String,
    options: TranslateOptions,
}

impl OpenAI {
    pub fn new(key: impl Into<String>, options: TranslateOptions) -> Self {
        let model = options
            .model
            .clone()
            .filter(|model| !model.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Self {
            key: key.into(),
            model,
            options,
        }
    }

    async fn translate_batch(&self, texts: Vec<String>) -> Result<Vec<String>> {
        let client = reqwest::Client::new();
        let url = format!("{}/chat/completions", base_url());
        let body = request_body(&self.model, &self.options, &texts)?;

        let mut backoff = Backoff::new("OpenAI");
        loop {
            let response = client
                .post(&url)
                .bearer_auth(&self.key)
                .json(&body)
                .send()
                .await
                .with_context(|| "failed to reach OpenAI")?;

            let status = response.status();
            let retry_after = retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            if status.is_success() {
                return extract_translations(&text);
            }
            if is_rate_limited(status, &text) && backoff.retry(retry_after).await {
                continue;
            }
            return Err(anyhow!(
                "OpenAI API error ({}): {}",
                status,
                extract_openai_error(&text).unwrap_or(text)
            ));
        }
    }
}

impl Provider for OpenAI {
    fn name(&self) -> &'static str {
        "OpenAI"
    }

    fn batch_limit(&self) -> Option<usize> {
        Some(MAX_TEXTS_PER_REQUEST)
    }

    fn translate(&self, texts: Vec<String>) -> ProviderFuture<'_> {
        Box::pin(self.translate_batch(texts))
    }
}

fn base_url() -> String {
    std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}

fn system_prompt(options: &TranslateOptions) -> String {
    let mut prompt = format!(
        "You translate document paragraphs into the language with code '{}'. \
         The user message is a JSON array of paragraphs. Call {} with exactly one \
         translation per paragraph, in the same order. Never merge, split, drop or \
         reorder paragraphs.",
        options.target_lang, TOOL_NAME
    );
    if let Some(source) = &options.source_lang {
        prompt.push_str(&format!(" The source language code is '{}'.", source));
    }
    if let Some(formality) = &options.formality {
        prompt.push_str(&format!(" Use a '{}' register.", formality));
    }
    prompt
}

fn request_body(model: &str, options: &TranslateOptions, texts: &[String]) -> Result<Value> {
    let user = serde_json::to_string(texts).with_context(|| "failed to encode paragraphs")?;
    Ok(json!({
        "model": model,
        "messages": [
            {"role": "system", "content": system_prompt(options)},
            {"role": "user", "content": user}
        ],
        "tools": [
            {
                "type": "function",
                "function": {
                    "name": TOOL_NAME,
                    "description": "Return the translated paragraphs in input order.",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "translations": {
                                "type": "array",
                                "items": {"type": "string"}
                            }
                        },
                        "required": ["translations"]
                    }
                }
            }
        ],
        "tool_choice": {"type": "function", "function": {"name": TOOL_NAME}}
    }))
}

fn extract_translations(text: &str) -> Result<Vec<String>> {
    #[derive(Deserialize)]
    struct ToolArgs {
        translations: Vec<String>,
    }

    let payload: OpenAIResponse =
        serde_json::from_str(text).with_context(|| "failed to parse OpenAI response JSON")?;
    let tool_call = payload
        .choices
        .into_iter()
        .flat_map(|choice| choice.message.tool_calls)
        .next()
        .ok_or_else(|| anyhow!("no tool call returned from OpenAI"))?;

    if tool_call.function.name != TOOL_NAME {
        return Err(anyhow!(
            "unexpected tool name '{}' from OpenAI",
            tool_call.function.name
        ));
    }

    let args: ToolArgs = serde_json::from_str(&tool_call.function.arguments)
        .with_context(|| "failed to parse OpenAI tool arguments")?;
    Ok(args.translations)
}

fn extract_openai_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<OpenAIError>,
    }

    #[derive(Deserialize)]
    struct OpenAIError {
        message: Option<String>,
        #[serde(rename = "type")]
        kind: Option<String>,
        code: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    let parts: Vec<String> = [
        error.message,
        error.kind.map(|kind| format!("type: {}", kind)),
        error.code.map(|code| format!("code: {}", code)),
    ]
    .into_iter()
    .flatten()
    .filter(|part| !part.trim().is_empty())
    .collect();
    if parts.is_empty() {
        Some("unknown error".to_string())
    } else {
        Some(parts.join(" | "))
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    #[serde(default)]
    tool_calls: Vec<OpenAIToolCall>,
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCall {
    function: OpenAIFunctionCall,
}

#[derive(Debug, Deserialize)]
struct OpenAIFunctionCall {
    name: String,
    arguments: String,
}
