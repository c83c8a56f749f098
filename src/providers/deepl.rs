use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::retry::{Backoff, is_rate_limited, retry_after};
use super::{Provider, ProviderFuture, TranslateOptions};

const FREE_BASE_URL: &str = "https://api-free.deepl.com/v2";
const PRO_BASE_URL: &str = "https://api.deepl.com/v2";
pub(crate) const MAX_TEXTS_PER_REQUEST: usize = 50;

#[derive(Debug, Clone)]
pub struct DeepL {
    key: String,
    options: TranslateOptions,
}

/// Character usage for the current billing period.
#[derive(Debug, Clone, Deserialize)]
pub struct DeepLUsage {
    pub character_count: u64,
    pub character_limit: u64,
}

impl DeepLUsage {
    pub fn limit_reached(&self) -> bool {
        self.character_limit > 0 && self.character_count >= self.character_limit
    }
}

impl DeepL {
    pub fn new(key: impl Into<String>, options: TranslateOptions) -> Self {
        Self {
            key: key.into(),
            options,
        }
    }

    fn base_url(&self) -> String {
        if let Ok(url) = std::env::var("DEEPL_BASE_URL") {
            if !url.trim().is_empty() {
                return url.trim_end_matches('/').to_string();
            }
        }
        if self.key.ends_with(":fx") {
            FREE_BASE_URL.to_string()
        } else {
            PRO_BASE_URL.to_string()
        }
    }

    fn auth_header(&self) -> String {
        format!("DeepL-Auth-Key {}", self.key)
    }

    pub async fn usage(&self) -> Result<DeepLUsage> {
        let url = format!("{}/usage", self.base_url());
        let response = reqwest::Client::new()
            .get(&url)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .with_context(|| "failed to reach DeepL")?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(anyhow!(
                "DeepL API error ({}): {}",
                status,
                extract_deepl_error(&text).unwrap_or(text)
            ));
        }
        serde_json::from_str(&text).with_context(|| "failed to parse DeepL usage response")
    }

    async fn translate_batch(&self, texts: Vec<String>) -> Result<Vec<String>> {
        let client = reqwest::Client::new();
        let url = format!("{}/translate", self.base_url());
        let body = request_body(&texts, &self.options);

        let mut backoff = Backoff::new("DeepL");
        loop {
            let response = client
                .post(&url)
                .header("Authorization", self.auth_header())
                .json(&body)
                .send()
                .await
                .with_context(|| "failed to reach DeepL")?;

            let status = response.status();
            let retry_after = retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            if status.is_success() {
                return parse_translations(&text);
            }
            if is_rate_limited(status, &text) && backoff.retry(retry_after).await {
                continue;
            }
            return Err(anyhow!(
                "DeepL API error ({}): {}",
                status,
                extract_deepl_error(&text).unwrap_or(text)
            ));
        }
    }
}

impl Provider for DeepL {
    fn name(&self) -> &'static str {
        "DeepL"
    }

    fn batch_limit(&self) -> Option<usize> {
        Some(MAX_TEXTS_PER_REQUEST)
    }

    fn translate(&self, texts: Vec<String>) -> ProviderFuture<'_> {
        Box::pin(self.translate_batch(texts))
    }
}

fn request_body(texts: &[String], options: &TranslateOptions) -> Value {
    let mut body = Map::new();
    body.insert("text".to_string(), json!(texts));
    body.insert(
        "target_lang".to_string(),
        json!(options.target_lang.to_uppercase()),
    );
    if let Some(source) = &options.source_lang {
        body.insert("source_lang".to_string(), json!(source.to_uppercase()));
    }
    if let Some(formality) = &options.formality {
        body.insert("formality".to_string(), json!(formality));
    }
    Value::Object(body)
}

fn parse_translations(body: &str) -> Result<Vec<String>> {
    #[derive(Deserialize)]
    struct TranslateResponse {
        translations: Vec<Translation>,
    }

    #[derive(Deserialize)]
    struct Translation {
        text: String,
    }

    let parsed: TranslateResponse =
        serde_json::from_str(body).with_context(|| "failed to parse DeepL response JSON")?;
    Ok(parsed
        .translations
        .into_iter()
        .map(|translation| translation.text)
        .collect())
}

fn extract_deepl_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: Option<String>,
        detail: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let mut parts = Vec::new();
    if let Some(message) = parsed.message.filter(|value| !value.trim().is_empty()) {
        parts.push(message);
    }
    if let Some(detail) = parsed.detail.filter(|value| !value.trim().is_empty()) {
        parts.push(detail);
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" | "))
    }
}
