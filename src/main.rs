use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;

use translatable::layout::{exchange, load_file, save_file};
use translatable::pipeline::{self, MergeReport, OutputPaths};

#[derive(Parser, Debug)]
#[command(
    name = "translatable",
    version,
    about = "Translate PDFs while keeping their page layout"
)]
struct Cli {
    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings", global = true)]
    read_settings: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Detect paragraphs in a PDF and write the layout JSON
    Parse {
        #[arg(short = 'p', long = "pdf")]
        pdf: PathBuf,
        /// Output layout JSON (default: <stem>_layout_en.json)
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// Dump paragraph texts of a layout JSON as plain text
    ToText {
        #[arg(short = 'j', long = "json")]
        json: PathBuf,
        /// Output text file (default: stdout)
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// Replace paragraph texts of a layout JSON from plain text
    FromText {
        #[arg(short = 'j', long = "json")]
        json: PathBuf,
        #[arg(short = 't', long = "text")]
        text: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },
    /// Translate every paragraph of a layout JSON
    Translate {
        #[arg(short = 'j', long = "json")]
        json: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        /// Translation backend: deepl or openai
        #[arg(short = 'b', long = "backend")]
        backend: Option<String>,
        /// API key (overrides environment variables)
        #[arg(short = 'k', long = "key")]
        key: Option<String>,
    },
    /// Paint a translated layout over the PDF and write the output PDFs
    Merge {
        #[arg(short = 'p', long = "pdf")]
        pdf: PathBuf,
        #[arg(short = 'j', long = "json")]
        json: PathBuf,
    },
    /// Parse, translate and merge in one go
    All {
        #[arg(short = 'p', long = "pdf")]
        pdf: PathBuf,
        #[arg(short = 'b', long = "backend")]
        backend: Option<String>,
        #[arg(short = 'k', long = "key")]
        key: Option<String>,
        /// Also write the source and translated layout JSON
        #[arg(long = "keep-auxiliary")]
        keep_auxiliary: bool,
    },
    /// Count the characters a translation of a layout JSON would send
    CountChars {
        #[arg(short = 'j', long = "json")]
        json: PathBuf,
    },
    /// Show DeepL character usage
    Usage {
        #[arg(short = 'k', long = "key")]
        key: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    translatable::logging::init(cli.verbose)?;
    let settings = translatable::load_settings(cli.read_settings.as_deref())?;

    match cli.command {
        Command::Parse { pdf, output } => {
            let doc = pipeline::parse(&pdf, &settings)?;
            let output = output
                .unwrap_or_else(|| OutputPaths::for_input(&pdf, &settings.output_suffix).layout_source);
            save_file(&doc, &output)?;
            println!("{}", output.display());
        }
        Command::ToText { json, output } => {
            let text = exchange::to_text(&load_file(&json)?);
            match output {
                Some(path) => write_text(&path, &text)?,
                None => print!("{}", text),
            }
        }
        Command::FromText { json, text, output } => {
            let doc = load_file(&json)?;
            let raw = fs::read_to_string(&text)
                .with_context(|| format!("failed to read {}", text.display()))?;
            let doc = exchange::from_text(&raw, doc)
                .with_context(|| format!("{} does not match {}", text.display(), json.display()))?;
            save_file(&doc, &output)?;
        }
        Command::Translate {
            json,
            output,
            backend,
            key,
        } => {
            let translator =
                pipeline::build_translator(&settings, backend.as_deref(), key.as_deref())?;
            let doc = pipeline::translate_layout(&translator, load_file(&json)?).await?;
            save_file(&doc, &output)?;
        }
        Command::Merge { pdf, json } => {
            let report = pipeline::merge(&pdf, &load_file(&json)?, &settings)?;
            print_outputs(&report);
        }
        Command::All {
            pdf,
            backend,
            key,
            keep_auxiliary,
        } => {
            let translator =
                pipeline::build_translator(&settings, backend.as_deref(), key.as_deref())?;
            let report = pipeline::run_all(&pdf, &settings, &translator, keep_auxiliary).await?;
            print_outputs(&report);
        }
        Command::CountChars { json } => {
            println!("{}", load_file(&json)?.char_count());
        }
        Command::Usage { key } => {
            let usage = pipeline::usage(&settings, key.as_deref()).await?;
            println!(
                "{} / {} characters",
                usage.character_count, usage.character_limit
            );
            if usage.limit_reached() {
                warn!("DeepL character limit reached");
                eprintln!("character limit reached");
            }
        }
    }
    Ok(())
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
}

fn print_outputs(report: &MergeReport) {
    let paths = &report.paths;
    println!("{}", paths.translated.display());
    println!("{}", paths.bilingual.display());
    println!("{}", paths.print_ready.display());
    for page in &report.failed_pages {
        eprintln!(
            "merge: page {} could not be composited; the original page was kept",
            page + 1
        );
    }
}
