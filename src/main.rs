use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use shortform::config::Config;
use shortform::{CancelSignal, GenerationRequest, Pipeline, PipelineState};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "shortform")]
#[command(about = "Generate a narrated vertical video from a short prompt", long_about = None)]
struct Args {
    /// OpenAI API key (overrides OPENAI_API_KEY)
    #[arg(long, global = true)]
    openai_api_key: Option<String>,

    /// ElevenLabs API key (overrides ELEVENLABS_API_KEY)
    #[arg(long, global = true)]
    elevenlabs_api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline and write the video plus a JSON result
    Run {
        #[arg(short, long)]
        prompt: String,

        /// Target length in seconds
        #[arg(short, long, default_value_t = 30)]
        duration: u32,

        /// Voice id, defaults to the configured voice
        #[arg(long)]
        voice: Option<String>,

        /// Output video file path
        #[arg(short, long, default_value = "output.mp4")]
        output: PathBuf,

        /// Where to write the JSON result, next to the video by default
        #[arg(long)]
        result: Option<PathBuf>,
    },

    /// Generate the script only
    Script {
        #[arg(short, long)]
        prompt: String,

        #[arg(short, long, default_value_t = 30)]
        duration: u32,
    },

    /// Generate one image per scene description
    Images {
        /// Scene description; repeat for several scenes
        #[arg(short, long = "scene", required = true)]
        scenes: Vec<String>,

        #[arg(short, long, default_value = "./images")]
        out_dir: PathBuf,
    },

    /// Synthesize narration for a text
    Narration {
        #[arg(short, long, conflicts_with = "file")]
        text: Option<String>,

        /// Read the narration text from a file
        #[arg(short, long)]
        file: Option<PathBuf>,

        #[arg(long)]
        voice: Option<String>,

        #[arg(short, long, default_value = "narration.mp3")]
        output: PathBuf,
    },

    /// List the available voices
    Voices,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    let args = Args::parse();

    let config = Config::from_env_with(|key| match key {
        "OPENAI_API_KEY" => args.openai_api_key.clone(),
        "ELEVENLABS_API_KEY" => args.elevenlabs_api_key.clone(),
        _ => None,
    })
    .context("Failed to load configuration")?;

    let pipeline = Pipeline::from_config(&config).context("Failed to set up clients")?;

    match args.command {
        Command::Run {
            prompt,
            duration,
            voice,
            output,
            result,
        } => {
            let voice = voice.unwrap_or_else(|| config.default_voice_id.clone());
            let result_path = result.unwrap_or_else(|| output.with_extension("json"));
            run_full(&pipeline, prompt, duration, voice, &output, &result_path).await
        }
        Command::Script { prompt, duration } => {
            let script = pipeline.generate_script(&prompt, duration).await?;
            print_json(&script)
        }
        Command::Images { scenes, out_dir } => {
            let images = pipeline.generate_images(&scenes).await?;
            tokio::fs::create_dir_all(&out_dir)
                .await
                .context("Failed to create image directory")?;
            for image in &images {
                let path = out_dir.join(format!("scene_{:02}.{}", image.scene_index, image.extension()));
                tokio::fs::write(&path, &image.data)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!("Scene {} ({} model) -> {}", image.scene_index, image.model, path.display());
            }
            Ok(())
        }
        Command::Narration {
            text,
            file,
            voice,
            output,
        } => {
            let text = match (text, file) {
                (Some(text), _) => text,
                (None, Some(path)) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("Failed to read file: {}", path.display()))?,
                (None, None) => anyhow::bail!("Either --text or --file must be provided"),
            };
            let voice = voice.unwrap_or_else(|| config.default_voice_id.clone());

            let audio = pipeline.generate_narration(&text, &voice).await?;
            tokio::fs::write(&output, &audio.data)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            info!("Narration: {:.2}s -> {}", audio.duration, output.display());
            Ok(())
        }
        Command::Voices => {
            let voices = pipeline.list_voices().await?;
            for voice in &voices {
                let labels = &voice.labels;
                println!(
                    "{}\t{}\t{}",
                    voice.voice_id,
                    voice.name,
                    [&labels.gender, &labels.age, &labels.accent]
                        .into_iter()
                        .flatten()
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
            Ok(())
        }
    }
}

async fn run_full(
    pipeline: &Pipeline,
    prompt: String,
    duration: u32,
    voice: String,
    output: &Path,
    result_path: &Path,
) -> anyhow::Result<()> {
    let request = GenerationRequest::new(prompt, duration, voice).context("Invalid request")?;

    let (state_tx, mut state_rx) = watch::channel(PipelineState::Pending);
    tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            let state = state_rx.borrow_and_update().clone();
            if let PipelineState::Running { stage } = state {
                info!("Stage: {}", stage);
            }
        }
    });

    let result = match pipeline
        .run_observed(&request, ctrl_c_signal(), Some(&state_tx))
        .await
    {
        Ok(result) => result,
        Err(failure) => {
            if failure.is_cancelled() {
                warn!("Generation cancelled during {} stage", failure.stage);
            } else {
                error!("Video generation failed: {}", failure);
            }
            return Err(failure.into());
        }
    };

    tokio::fs::write(output, &result.video.data)
        .await
        .with_context(|| format!("Failed to write video to {}", output.display()))?;

    let json = serde_json::to_vec_pretty(&result).context("Failed to serialize result")?;
    tokio::fs::write(result_path, json)
        .await
        .with_context(|| format!("Failed to write result to {}", result_path.display()))?;

    info!(
        "Video generation completed: {} ({}, {:.2}s, {} bytes)",
        output.display(),
        result.video.resolution(),
        result.video.duration,
        result.video.size_bytes()
    );
    Ok(())
}

/// Raised on the first Ctrl-C.
fn ctrl_c_signal() -> CancelSignal {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling...");
            let _ = tx.send(true);
            // Hold the sender so the flag stays readable
            std::future::pending::<()>().await;
        }
    });
    rx
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}
