use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use komochi_gateway::agent::ChatCompletionClient;
use komochi_gateway::audio::{AudioQueue, DevicePlayback, SpeechRequest, VoiceTuning};
use komochi_gateway::chat::{extract_video_id, live_url, ChatSource, YouTubeChatSource};
use komochi_gateway::events::{MessageKind, OutboundMessage};
use komochi_gateway::pipeline::{MessagePipeline, PipelineOptions};
use komochi_gateway::spam::SpamFilter;
use komochi_gateway::voice::{NewDictEntry, SpeechEngine, UserDictionary, WordType};
use komochi_gateway::{Config, Daemon};

/// Komochi - live chat reader and AI persona for streamers
#[derive(Parser)]
#[command(name = "komochi", version, about)]
struct Cli {
    /// Config file path (defaults to the platform config dir)
    #[arg(short, long, env = "KOMOCHI_CONFIG")]
    config: Option<PathBuf>,

    /// Speech engine URL override
    #[arg(long, env = "KOMOCHI_ENGINE_URL")]
    engine_url: Option<String>,

    /// Chat-completion API key override
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect to a live stream and run the chat-to-speech loop
    Run {
        /// Video id, watch URL, or channel URL
        target: String,
    },
    /// Speak a test sentence through the engine
    TestTts {
        /// Text to speak
        #[arg(default_value = "こんにちは、こもちです！聞こえていますか？")]
        text: String,
    },
    /// List speakers and style ids offered by the engine
    Speakers,
    /// Check the engine is reachable and print its version
    EngineVersion,
    /// Manage the engine's pronunciation dictionary
    #[command(subcommand)]
    Dict(DictCommand),
}

#[derive(Subcommand)]
enum DictCommand {
    /// Register a word
    Add {
        /// Written surface form
        surface: String,
        /// Katakana reading
        reading: String,
        /// Part of speech
        #[arg(short, long, value_enum, default_value = "proper-noun")]
        word_type: WordType,
    },
    /// List registered words
    List,
    /// Delete a word by its id
    Remove {
        /// Entry id (shown by `dict list`)
        uuid: uuid::Uuid,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,komochi_gateway=info",
        1 => "info,komochi_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(url) = cli.engine_url {
        config.engine.url = url;
    }
    if let Some(key) = cli.api_key {
        config.completion.api_key = key;
    }

    match cli.command {
        Command::Run { target } => run_gateway(config, &target).await,
        Command::TestTts { text } => test_tts(&config, text).await,
        Command::Speakers => list_speakers(&config).await,
        Command::EngineVersion => engine_version(&config).await,
        Command::Dict(cmd) => dict(&config, cmd).await,
    }
}

async fn run_gateway(config: Config, target: &str) -> anyhow::Result<()> {
    let engine = SpeechEngine::new(config.engine.url.clone());
    let version = engine.version().await?;
    tracing::info!(version, url = %config.engine.url, "speech engine ready");

    let playback = DevicePlayback::new()?;
    let queue = AudioQueue::new(Arc::new(engine), Arc::new(playback));

    let completion = ChatCompletionClient::new(
        config.completion.api_key.clone(),
        config.completion.model.clone(),
        config.completion.max_tokens,
        config.completion.temperature,
    );
    if config.completion.api_key.is_empty() {
        tracing::warn!("no API key configured, replies will use the fallback message");
    }

    let pipeline = MessagePipeline::new(
        queue,
        Arc::new(completion),
        PipelineOptions::from_config(&config),
    );
    let filter = SpamFilter::new(config.spam.clone());

    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(256);
    let printer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let tag = match message.kind {
                MessageKind::User => "chat",
                MessageKind::AiResponse => "reply",
                MessageKind::Spam => "spam",
                MessageKind::System => "system",
                MessageKind::Error => "error",
            };
            println!("[{tag}] {}: {}", message.author, message.message);
        }
    });

    let video_id = resolve_video_id(target).await?;
    let source = YouTubeChatSource::new(video_id);
    let daemon = Daemon::new(pipeline, filter, tx);

    tracing::info!("gateway ready, waiting for chat (Ctrl-C to stop)");
    tokio::select! {
        result = daemon.run(&source) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, shutting down");
            source.stop();
        }
    }

    printer.abort();
    Ok(())
}

/// Resolve a CLI target to a video id: bare id or watch URL directly,
/// otherwise treat it as a channel URL and follow its live redirect.
async fn resolve_video_id(target: &str) -> anyhow::Result<String> {
    if let Some(id) = extract_video_id(target) {
        return Ok(id);
    }

    anyhow::ensure!(
        target.contains("youtube.com"),
        "could not extract a video id from '{target}'"
    );

    let url = live_url(target.trim_end_matches("/live"));
    tracing::info!(%url, "resolving live stream from channel");
    let page = reqwest::get(&url).await?.text().await?;

    regex::Regex::new(r#""videoId":"([A-Za-z0-9_-]{11})""#)?
        .captures(&page)
        .map(|c| c[1].to_string())
        .ok_or_else(|| anyhow::anyhow!("no live stream found at {url}"))
}

async fn test_tts(config: &Config, text: String) -> anyhow::Result<()> {
    println!("Synthesizing: {text}");

    let engine = SpeechEngine::new(config.engine.url.clone());
    let playback = DevicePlayback::new()?;
    let queue = AudioQueue::new(Arc::new(engine), Arc::new(playback));

    let mut request = SpeechRequest::new(text, config.persona.speaker_id);
    request.tuning = VoiceTuning {
        volume: config.engine.volume,
        speed: config.engine.speed,
    };
    queue.enqueue(request);

    while queue.status().is_playing {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }

    println!("Done.");
    Ok(())
}

async fn list_speakers(config: &Config) -> anyhow::Result<()> {
    let engine = SpeechEngine::new(config.engine.url.clone());

    for speaker in engine.speakers().await? {
        println!("{}", speaker.name);
        for style in speaker.styles {
            println!("  {:>4}  {}", style.id, style.name);
        }
    }
    Ok(())
}

async fn engine_version(config: &Config) -> anyhow::Result<()> {
    let engine = SpeechEngine::new(config.engine.url.clone());
    println!("{} ({})", engine.version().await?, config.engine.url);
    Ok(())
}

async fn dict(config: &Config, cmd: DictCommand) -> anyhow::Result<()> {
    let dict = UserDictionary::new(config.engine.url.clone());

    match cmd {
        DictCommand::Add {
            surface,
            reading,
            word_type,
        } => {
            let uuid = dict
                .add_word(&NewDictEntry {
                    surface: surface.clone(),
                    reading,
                    word_type,
                })
                .await?;
            println!("Registered '{surface}' as {uuid}");
        }
        DictCommand::List => {
            let mut entries = dict.list_words().await?;
            entries.sort_by(|a, b| a.surface.cmp(&b.surface));
            if entries.is_empty() {
                println!("No dictionary entries.");
            }
            for entry in entries {
                println!(
                    "{}  {} -> {} ({})",
                    entry.uuid, entry.surface, entry.reading, entry.part_of_speech
                );
            }
        }
        DictCommand::Remove { uuid } => {
            dict.delete_word(uuid).await?;
            println!("Removed {uuid}");
        }
    }
    Ok(())
}
