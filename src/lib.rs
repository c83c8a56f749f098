//! Layout-preserving PDF translation: detect paragraphs, translate them and
//! paint the translations over the original pages.

pub mod compose;
pub mod error;
pub mod extract;
pub mod layout;
pub mod logging;
pub mod overlay;
pub mod pipeline;
pub mod providers;
pub mod settings;
pub mod translator;

pub use error::PipelineError;
pub use layout::{LayoutDocument, Page, ParagraphBlock};
pub use pipeline::OutputPaths;
pub use providers::{DeepL, OpenAI, Provider, ProviderKind, TranslateOptions};
pub use settings::{Settings, load_settings};
pub use translator::Translator;
