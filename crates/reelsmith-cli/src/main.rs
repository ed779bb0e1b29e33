//! Reelsmith - topic-to-video animation pipeline CLI
//!
//! The `reelsmith` command drives the pipeline in the foreground.
//!
//! ## Commands
//!
//! - `run`: full pipeline (script, code, render, review, voice, mux)
//! - `script`: narration stage only
//! - `render`: render an existing program and print the outcome
//! - `mux`: merge a video with a voiceover, matching durations
//! - `classify`: classify a render error log
//! - `config`: print the effective configuration

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, Level};

use reelsmith_core::artifact::ArtifactStore;
use reelsmith_core::domain::{CandidateSource, JobId, JobRequest, RenderOutcome, Topic};
use reelsmith_core::jobs::ProgressReporter;
use reelsmith_core::media::{FfmpegToolkit, MediaTools, MuxRequest};
use reelsmith_core::oracle::{Reviewer, VerificationOracle};
use reelsmith_core::pipeline::{PipelineFactory, StudioFactory};
use reelsmith_core::render::{default_rules, Quality, RenderConfig, Renderer};
use reelsmith_core::StudioConfig;

#[derive(Parser)]
#[command(name = "reelsmith")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Turn a topic into a narrated animated explainer video", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and JSON results
    #[arg(long, global = true)]
    json: bool,

    /// Path to a TOML config file
    #[arg(short, long, global = true, env = "REELSMITH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Produce a complete video for a topic
    Run {
        /// What the video explains
        #[arg(short, long)]
        topic: String,

        /// Narration language code, or "auto"
        #[arg(short, long, default_value = "en")]
        language: String,

        /// Target length in minutes
        #[arg(short, long, default_value = "1")]
        duration: u32,
    },

    /// Write the narration script only
    Script {
        #[arg(short, long)]
        topic: String,

        #[arg(short, long, default_value = "en")]
        language: String,

        #[arg(short, long, default_value = "1")]
        duration: u32,
    },

    /// Render an existing animation program
    Render {
        /// Program file
        #[arg(short, long)]
        source: PathBuf,

        /// Scene class to render (default: first declared scene)
        #[arg(long)]
        scene: Option<String>,

        /// Quality tier: low, medium, high, veryhigh, ultra
        #[arg(short, long)]
        quality: Option<Quality>,

        /// Frame rate; unsupported values fall back to the tier default
        #[arg(long)]
        fps: Option<u32>,

        /// Working directory (default: <workspace>/render)
        #[arg(long)]
        workdir: Option<PathBuf>,
    },

    /// Merge a video with a voiceover
    Mux {
        #[arg(long)]
        video: PathBuf,

        #[arg(long)]
        audio: PathBuf,

        #[arg(short, long, default_value = "final_video.mp4")]
        output: PathBuf,

        /// Keep the video speed unchanged
        #[arg(long)]
        no_speed_adjust: bool,
    },

    /// Classify a render error log
    Classify {
        /// File holding the engine's stderr
        #[arg(long)]
        stderr: PathBuf,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Serialize)]
struct RunSummary {
    job_id: String,
    final_video: PathBuf,
    attempts: u32,
    speed_factor: f64,
    duration_secs: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    reelsmith_core::init_tracing(cli.json, level);

    let config = StudioConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Run {
            topic,
            language,
            duration,
        } => cmd_run(config, job_request(&topic, &language, duration)?, cli.json).await,
        Commands::Script {
            topic,
            language,
            duration,
        } => cmd_script(config, job_request(&topic, &language, duration)?).await,
        Commands::Render {
            source,
            scene,
            quality,
            fps,
            workdir,
        } => cmd_render(config, &source, scene, quality, fps, workdir).await,
        Commands::Mux {
            video,
            audio,
            output,
            no_speed_adjust,
        } => cmd_mux(&config, video, audio, output, !no_speed_adjust, cli.json).await,
        Commands::Classify { stderr } => cmd_classify(&stderr, cli.json),
        Commands::Config => cmd_config(&config),
    }
}

fn job_request(topic: &str, language: &str, duration: u32) -> Result<JobRequest> {
    let topic = Topic::new(topic).context("Topic must not be empty")?;
    Ok(JobRequest::new(topic)
        .with_language(language)
        .with_duration(duration))
}

async fn cmd_run(config: StudioConfig, request: JobRequest, json: bool) -> Result<()> {
    let factory = StudioFactory::new(config).context("Failed to prepare workspace")?;
    let reporter = ProgressReporter::detached(&request, factory.catalog());
    let job_id = reporter.job_id();
    let coordinator = factory
        .build(&job_id)
        .context("Failed to assemble pipeline")?;

    let mut rx = reporter.subscribe();
    let progress = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let status = rx.borrow_and_update().clone();
            eprintln!("[{:>3}%] {}", status.progress, status.phase);
        }
    });

    info!(job_id = %job_id, topic = %request.topic, "starting run");
    let outcome = coordinator.run(&request, &reporter).await;
    match &outcome {
        Ok(result) => reporter.complete(result.final_video.clone()),
        Err(e) => reporter.fail(e.to_string()),
    }
    drop(reporter);
    progress.await.ok();

    let result = outcome.with_context(|| format!("Run {job_id} failed"))?;
    let summary = RunSummary {
        job_id: job_id.to_string(),
        final_video: result.final_video,
        attempts: result.attempts,
        speed_factor: result.speed_factor,
        duration_secs: result.duration_secs,
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Final video: {}", summary.final_video.display());
        println!("Attempts:    {}", summary.attempts);
        println!("Speed:       {:.3}x", summary.speed_factor);
    }
    Ok(())
}

async fn cmd_script(config: StudioConfig, request: JobRequest) -> Result<()> {
    let factory = StudioFactory::new(config).context("Failed to prepare workspace")?;
    let job_id = JobId::generate();
    let store: Arc<dyn ArtifactStore> = Arc::new(
        factory
            .workspace()
            .scoped(job_id.as_str())
            .context("Failed to create script workspace")?,
    );
    let storyteller = factory.storyteller(Arc::clone(&store))?;

    let script = storyteller
        .write_script(&request)
        .await
        .context("Failed to write script")?;
    print!("{}", script.to_text());
    eprintln!(
        "Saved to {}",
        store
            .path_of(&reelsmith_core::ArtifactName::Script)
            .display()
    );
    Ok(())
}

async fn cmd_render(
    config: StudioConfig,
    source: &Path,
    scene: Option<String>,
    quality: Option<Quality>,
    fps: Option<u32>,
    workdir: Option<PathBuf>,
) -> Result<()> {
    let code = std::fs::read_to_string(source)
        .with_context(|| format!("Failed to read {}", source.display()))?;
    let candidate = CandidateSource::new(code);
    let entry_point = scene
        .or_else(|| candidate.entry_point.clone())
        .unwrap_or_else(|| config.render.entry_point_fallback.clone());

    let mut render_config = RenderConfig::new(quality.unwrap_or(config.render.quality));
    render_config.fps = fps.or(config.render.fps);

    let workdir = workdir.unwrap_or_else(|| config.workspace.join("render"));
    let factory = StudioFactory::new(config).context("Failed to prepare workspace")?;
    let renderer = factory.renderer(&workdir);

    info!(entry_point = %entry_point, workdir = %workdir.display(), "rendering");
    let outcome = renderer.execute(&candidate, &entry_point, &render_config).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if let RenderOutcome::Failure(failure) = &outcome {
        let oracle = VerificationOracle::new(Reviewer::AutoApprove, factory.catalog());
        eprintln!("{}", oracle.failure_report(1, failure));
        bail!("Render failed: {}", failure.error_class);
    }
    Ok(())
}

async fn cmd_mux(
    config: &StudioConfig,
    video: PathBuf,
    audio: PathBuf,
    output: PathBuf,
    adjust_speed: bool,
    json: bool,
) -> Result<()> {
    let toolkit = FfmpegToolkit::new(config.media.clone());
    let mut request = MuxRequest::new(video, audio, output);
    request.adjust_speed = adjust_speed;

    let report = toolkit.mux(&request).await.context("Mux failed")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Output:  {}", report.output.display());
        println!("Speed:   {:.3}x", report.speed_factor);
        println!("Encoded: {}", if report.reencoded { "re-encoded" } else { "copied" });
    }
    Ok(())
}

fn cmd_classify(stderr: &Path, json: bool) -> Result<()> {
    let text = std::fs::read_to_string(stderr)
        .with_context(|| format!("Failed to read {}", stderr.display()))?;
    let class = default_rules().classify(&text, "");
    if json {
        println!(
            "{}",
            serde_json::json!({
                "error_class": class,
                "retriable": class.is_retriable(),
                "hint": class.remediation_hint(),
            })
        );
    } else {
        println!("{class}");
        println!("Hint: {}", class.remediation_hint());
    }
    Ok(())
}

fn cmd_config(config: &StudioConfig) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_arguments_parse() {
        let cli = Cli::try_parse_from([
            "reelsmith",
            "--verbose",
            "run",
            "--topic",
            "Basic Derivatives",
            "--language",
            "vi",
            "--duration",
            "2",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Run {
                topic,
                language,
                duration,
            } => {
                assert_eq!(topic, "Basic Derivatives");
                assert_eq!(language, "vi");
                assert_eq!(duration, 2);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn render_quality_accepts_short_flags() {
        let cli = Cli::try_parse_from([
            "reelsmith", "render", "--source", "scene.py", "--quality", "m", "--fps", "24",
        ])
        .unwrap();
        match cli.command {
            Commands::Render { quality, fps, .. } => {
                assert_eq!(quality, Some(Quality::Medium));
                assert_eq!(fps, Some(24));
            }
            _ => panic!("expected render"),
        }
    }

    #[test]
    fn empty_topic_is_rejected() {
        assert!(job_request("   ", "en", 1).is_err());
        let req = job_request("Limits", "auto", 0).unwrap();
        assert_eq!(req.duration_minutes, 1);
        let req = job_request("Limits", "en", 500).unwrap();
        assert_eq!(req.duration_minutes, reelsmith_core::domain::MAX_DURATION_MINUTES);
    }

    #[test]
    fn classify_reads_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("stderr.txt");
        std::fs::write(&log, "SyntaxError: invalid syntax").unwrap();
        cmd_classify(&log, true).unwrap();
        assert!(cmd_classify(&dir.path().join("missing.txt"), false).is_err());
    }

    #[tokio::test]
    async fn render_with_missing_engine_fails() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("scene.py");
        std::fs::write(
            &source,
            "from manim import *\n\nclass Demo(Scene):\n    def construct(self):\n        pass\n",
        )
        .unwrap();
        let mut config = StudioConfig {
            workspace: dir.path().join("ws"),
            ..StudioConfig::default()
        };
        config.render.binary = "reelsmith-no-such-engine".into();

        let err = cmd_render(config, &source, None, None, None, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ToolNotFound"));
    }
}
