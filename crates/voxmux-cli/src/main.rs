use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use voxmux_core::config::{VoxmuxConfig, parse_yaml_file, validate_config};
use voxmux_core::{Orchestrator, Priority, SynthesisRequest};
use voxmux_speech::providers::tone::ToneBackend;
use voxmux_speech::{AudioFormat, QualityTier, SharedBackend};

#[derive(Parser)]
#[command(name = "voxmux")]
#[command(about = "voxmux CLI - Route text-to-speech requests across backends", long_about = None)]
struct Cli {
    /// Path to the orchestrator YAML file; defaults apply when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a configuration file and print the effective settings
    Validate,
    /// Synthesize text to a WAV file
    Synth {
        /// Text to speak
        #[arg(short, long)]
        text: String,

        /// Voice identifier
        #[arg(short, long, default_value = "mid")]
        voice: String,

        /// Prefer this backend over routing order
        #[arg(short, long)]
        backend: Option<String>,

        /// Quality tier: low, medium or high
        #[arg(short, long, default_value = "medium")]
        quality: QualityTier,

        /// Output file
        #[arg(short, long = "out", default_value = "out.wav")]
        output: PathBuf,

        /// Queue ahead of normal-priority work
        #[arg(long)]
        urgent: bool,

        /// Synthesize this many times to exercise the cache
        #[arg(long, default_value = "1")]
        repeat: usize,
    },
    /// List voices of one backend or all of them
    Voices {
        #[arg(short, long)]
        backend: Option<String>,
    },
    /// Print backend status as JSON
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Validate => {
            validate_config(&config)?;
            for tier in [QualityTier::Low, QualityTier::Medium, QualityTier::High] {
                println!(
                    "{:<6} -> {}",
                    tier.as_str(),
                    config.routing.order_for(tier).join(", ")
                );
            }
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Synth {
            text,
            voice,
            backend,
            quality,
            output,
            urgent,
            repeat,
        } => {
            let mut request = SynthesisRequest::new(text, voice)
                .with_quality(quality)
                .with_format(AudioFormat::Wav);
            if let Some(backend) = backend {
                request = request.with_backend_hint(backend);
            }
            if urgent {
                request = request.with_priority(Priority::High);
            }
            synthesize(config, request, &output, repeat.max(1)).await?;
        }
        Commands::Voices { backend } => {
            let orchestrator = build_orchestrator(config).await?;
            let voices = orchestrator.list_voices(backend.as_deref()).await?;
            for voice in voices {
                println!(
                    "{:<8} {:<12} {:<16} {} ({})",
                    voice.backend, voice.id, voice.name, voice.language, voice.quality
                );
            }
            orchestrator.shutdown().await;
        }
        Commands::Status => {
            let orchestrator = build_orchestrator(config).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&orchestrator.backend_status())?
            );
            orchestrator.shutdown().await;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<VoxmuxConfig> {
    match path {
        Some(path) => {
            log::info!("Loading configuration from {}", path.display());
            parse_yaml_file(path)
                .with_context(|| format!("Failed to load configuration {}", path.display()))
        }
        None => Ok(VoxmuxConfig::default()),
    }
}

/// One tone backend for every name the configuration mentions
async fn build_orchestrator(config: VoxmuxConfig) -> Result<Orchestrator> {
    let backends: Vec<SharedBackend> = config
        .referenced_backends()
        .into_iter()
        .map(|name| Arc::new(ToneBackend::new(name)) as SharedBackend)
        .collect();

    Orchestrator::builder()
        .config(config)
        .backends(backends)
        .build()
        .await
        .context("Failed to build orchestrator")
}

async fn synthesize(
    config: VoxmuxConfig,
    request: SynthesisRequest,
    output: &Path,
    repeat: usize,
) -> Result<()> {
    let orchestrator = build_orchestrator(config).await?;

    let mut last = None;
    for round in 1..=repeat {
        let outcome = orchestrator.synthesize(request.clone()).await?;
        log::info!(
            "Round {round}: {} bytes from '{}' (cached: {})",
            outcome.audio.len(),
            outcome.backend,
            outcome.cached
        );
        last = Some(outcome);
    }

    if let Some(outcome) = last {
        tokio::fs::write(output, &outcome.audio)
            .await
            .with_context(|| format!("Failed to write {}", output.display()))?;
        println!(
            "Wrote {} ({} ms, {} Hz) from '{}'",
            output.display(),
            outcome.metadata.duration_ms,
            outcome.metadata.sample_rate,
            outcome.backend
        );
    }
    println!("{}", serde_json::to_string_pretty(&orchestrator.stats())?);

    orchestrator.shutdown().await;
    Ok(())
}
