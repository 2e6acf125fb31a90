// Command-line driver for the product-search assistant

mod config;

use std::io::Read;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use boardbot::filters::build_predicate;
use boardbot::types::query::sanitize_filters;
use boardbot::{
    extractor_for, Assistant, ExtractionConfig, ExtractorKind, FeatureExtraction, PipelineConfig,
    PromptCatalogue, ResponseEnvelope, UserMessage,
};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "boardbot", version, about = "Hardware product-search assistant")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Answer one chat message
    Chat {
        message: String,
        /// Route classifier: llm, semantic or hybrid
        #[arg(long)]
        router: Option<String>,
        /// Model override for this request
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        session: Option<String>,
        /// Print the raw envelope
        #[arg(long)]
        json: bool,
    },
    /// Extract a feature record from raw product text
    Extract {
        #[arg(long)]
        product_id: String,
        /// File holding the raw text, `-` for stdin
        #[arg(default_value = "-")]
        input: PathBuf,
        /// Single model call instead of the search loop
        #[arg(long)]
        simple: bool,
    },
    /// Show the index predicate for a JSON filter object
    Filters { filters: String },
    /// List the prompt catalogue, or print one prompt
    Prompts { name: Option<String> },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so command output stays pipeable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,boardbot=debug,flowgraph=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Chat {
            message,
            router,
            model,
            session,
            json,
        } => chat(message, router, model, session, json).await,
        Command::Extract {
            product_id,
            input,
            simple,
        } => extract(product_id, input, simple).await,
        Command::Filters { filters } => show_filters(&filters),
        Command::Prompts { name } => show_prompts(name.as_deref()),
    }
}

async fn chat(
    message: String,
    router: Option<String>,
    model: Option<String>,
    session: Option<String>,
    json: bool,
) -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    let services = config.services()?;
    let assistant = Assistant::new(
        services,
        PipelineConfig::default().with_router(config.router_kind),
    )
    .context("Failed to build the orchestration graph")?;

    let mut request = UserMessage::new(message);
    if let Some(router) = router {
        request = request.with_router(router);
    }
    if let Some(model) = model {
        request = request.with_model(model);
    }
    if let Some(session) = session {
        request = request.with_session(session);
    }

    let envelope = assistant.respond(request).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    } else {
        print_envelope(&envelope);
    }
    Ok(())
}

fn print_envelope(envelope: &ResponseEnvelope) {
    let kind = serde_json::to_value(envelope.kind)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    let label = if envelope.is_error() {
        kind.bright_red().bold()
    } else {
        kind.bright_cyan().bold()
    };
    println!("{label}");
    println!("{}", envelope.message);

    if !envelope.products.is_empty() {
        println!();
        for (rank, id) in envelope.product_ids().iter().enumerate() {
            println!("  {}. {}", rank + 1, id.bright_green());
        }
    }
    if !envelope.reasoning.is_empty() {
        println!();
        println!("{} {}", "Reasoning:".dimmed(), envelope.reasoning);
    }
    if !envelope.follow_up_question.is_empty() {
        println!("{} {}", "Follow-up:".bright_yellow(), envelope.follow_up_question);
    }

    let metadata = &envelope.metadata;
    if !metadata.time_taken.is_empty() {
        println!();
        for (stage, seconds) in &metadata.time_taken {
            let input = metadata.input_token_usage.get(stage).copied().unwrap_or(0);
            let output = metadata.output_token_usage.get(stage).copied().unwrap_or(0);
            println!(
                "  {:<18} {:>6} in {:>6} out {:>7.2}s",
                stage.dimmed(),
                input,
                output,
                seconds
            );
        }
    }
}

async fn extract(product_id: String, input: PathBuf, simple: bool) -> Result<()> {
    let text = if input.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        text
    } else {
        tokio::fs::read_to_string(&input)
            .await
            .with_context(|| format!("Failed to read {}", input.display()))?
    };

    let config = Config::from_env().context("Failed to load configuration")?;
    let kind = if simple {
        ExtractorKind::Simple
    } else {
        ExtractorKind::Agentic
    };
    let extraction = ExtractionConfig::default()
        .with_model(config.model.model.clone())
        .with_extractor(kind);
    let extractor = extractor_for(config.services()?, extraction)?;

    let result = extractor.extract(&text, &product_id).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn show_filters(raw: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(raw).context("filters must be valid JSON")?;
    let Some(object) = value.as_object() else {
        bail!("filters must be a JSON object");
    };

    let kept = sanitize_filters(object);
    for key in object.keys().filter(|k| !kept.contains_key(k.as_str())) {
        println!("{} {}", "dropped".bright_yellow(), key);
    }
    for (key, value) in &kept {
        println!("{} {} = {:?}", "kept".bright_green(), key, value.values());
    }

    match build_predicate(&kept)? {
        Some(predicate) => println!("{}", predicate.to_graphql()),
        None => println!("{}", "no filter".dimmed()),
    }
    Ok(())
}

fn show_prompts(name: Option<&str>) -> Result<()> {
    let catalogue = PromptCatalogue::new();
    catalogue.validate()?;

    match name {
        Some(name) => {
            let template = catalogue
                .template(name)
                .with_context(|| format!("unknown prompt: {name}"))?;
            println!("{}", "system".bright_cyan().bold());
            println!("{}", template.system);
            println!();
            println!("{}", "user".bright_cyan().bold());
            println!("{}", template.user);
        }
        None => {
            for name in catalogue.names() {
                let variables = catalogue
                    .template(name)
                    .map(|t| t.variables.join(", "))
                    .unwrap_or_default();
                println!("{:<28} {}", name.bright_green(), variables.dimmed());
            }
        }
    }
    Ok(())
}
