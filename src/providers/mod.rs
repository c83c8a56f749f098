use anyhow::{Result, anyhow};
use std::future::Future;
use std::pin::Pin;

mod deepl;
mod openai;
mod retry;

pub use deepl::{DeepL, DeepLUsage};
pub use openai::OpenAI;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    DeepL,
    OpenAI,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::DeepL => "deepl",
            ProviderKind::OpenAI => "openai",
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "deepl" => Ok(ProviderKind::DeepL),
            "openai" => Ok(ProviderKind::OpenAI),
            other => Err(anyhow!(
                "unknown translation backend '{}' (expected deepl or openai)",
                other
            )),
        }
    }

    fn key_env(&self) -> &'static str {
        match self {
            ProviderKind::DeepL => "DEEPL_AUTH_KEY",
            ProviderKind::OpenAI => "OPENAI_API_KEY",
        }
    }
}

/// Language and style parameters shared by every backend.
#[derive(Debug, Clone)]
pub struct TranslateOptions {
    pub target_lang: String,
    pub source_lang: Option<String>,
    pub formality: Option<String>,
    pub model: Option<String>,
}

pub type ProviderFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + 'a>>;

/// Batched, order-preserving translation capability.
///
/// `translate` must answer with one text per input, in input order.
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Largest number of texts accepted by a single request, if limited.
    fn batch_limit(&self) -> Option<usize> {
        None
    }

    fn translate(&self, texts: Vec<String>) -> ProviderFuture<'_>;
}

#[derive(Debug, Clone)]
pub enum ProviderImpl {
    DeepL(DeepL),
    OpenAI(OpenAI),
}

impl Provider for ProviderImpl {
    fn name(&self) -> &'static str {
        match self {
            ProviderImpl::DeepL(provider) => provider.name(),
            ProviderImpl::OpenAI(provider) => provider.name(),
        }
    }

    fn batch_limit(&self) -> Option<usize> {
        match self {
            ProviderImpl::DeepL(provider) => provider.batch_limit(),
            ProviderImpl::OpenAI(provider) => provider.batch_limit(),
        }
    }

    fn translate(&self, texts: Vec<String>) -> ProviderFuture<'_> {
        match self {
            ProviderImpl::DeepL(provider) => provider.translate(texts),
            ProviderImpl::OpenAI(provider) => provider.translate(texts),
        }
    }
}

pub fn build_provider(kind: ProviderKind, key: String, options: TranslateOptions) -> ProviderImpl {
    match kind {
        ProviderKind::DeepL => ProviderImpl::DeepL(DeepL::new(key, options)),
        ProviderKind::OpenAI => ProviderImpl::OpenAI(OpenAI::new(key, options)),
    }
}

/// Explicit key first, then the backend's environment variable.
pub fn resolve_key(kind: ProviderKind, override_key: Option<&str>) -> Result<String> {
    if let Some(key) = override_key.filter(|key| !key.trim().is_empty()) {
        return Ok(key.trim().to_string());
    }
    get_env(kind.key_env()).ok_or_else(|| {
        anyhow!(
            "API key not found for {} (pass --key or set {})",
            kind.as_str(),
            kind.key_env()
        )
    })
}

fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
