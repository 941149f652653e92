use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use parley::voice::{
    AudioCapture, AudioPlayback, InterruptMonitor, PlaybackController, TtsClient, WhisperStt,
};
use parley::{ChatAgent, Config, ConversationLoop, InterruptState};

/// Parley - hands-free voice conversation loop for AI agents
#[derive(Parser)]
#[command(name = "parley", version, about)]
struct Cli {
    /// Wake phrase that starts a conversation
    #[arg(short, long, env = "PARLEY_TRIGGER", default_value = "jarvis")]
    trigger: String,

    /// Seconds of inactivity before conversation mode ends
    #[arg(long, env = "PARLEY_CONVERSATION_TIMEOUT", default_value = "60")]
    conversation_timeout: u64,

    /// Seconds to wait for speech before a listen times out
    #[arg(long, env = "PARLEY_LISTEN_TIMEOUT", default_value = "10")]
    listen_timeout: u64,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "PARLEY_API_BASE", default_value = "https://api.openai.com/v1")]
    api_base: String,

    /// API key for the chat/STT/TTS backends
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Chat model identifier
    #[arg(long, env = "PARLEY_MODEL", default_value = "gpt-4o-mini")]
    model: String,

    /// TTS voice identifier
    #[arg(long, env = "PARLEY_VOICE", default_value = "onyx")]
    voice: String,

    /// RMS threshold for barge-in detection during playback
    #[arg(long, env = "PARLEY_INTERRUPT_THRESHOLD", default_value = "0.08")]
    interrupt_threshold: f32,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,parley=info",
        1 => "info,parley=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => {
            tracing::info!("parley shut down");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let defaults = Config::default();
    let config = Config {
        trigger_phrase: cli.trigger,
        conversation_timeout: Duration::from_secs(cli.conversation_timeout),
        listen_timeout: Duration::from_secs(cli.listen_timeout),
        acknowledgement: defaults.acknowledgement,
        voice: parley::VoiceConfig {
            interrupt_threshold: cli.interrupt_threshold,
            tts_voice: cli.voice,
            ..defaults.voice
        },
        backend: parley::BackendConfig {
            api_base: cli.api_base,
            api_key: cli.api_key,
            model: cli.model,
            ..defaults.backend
        },
    };

    tracing::info!(
        trigger = %config.trigger_phrase,
        model = %config.backend.model,
        "starting parley"
    );

    // Collaborators are constructed once here and passed by reference;
    // nothing hides behind global state
    let interrupt = Arc::new(InterruptState::new());
    let capture = AudioCapture::new()?;
    let playback = AudioPlayback::new()?;

    let stt = Arc::new(WhisperStt::new(
        config.backend.api_base.clone(),
        config.backend.api_key.clone(),
        config.voice.stt_model.clone(),
    )?);
    let tts = TtsClient::new(
        config.backend.api_base.clone(),
        config.backend.api_key.clone(),
        config.voice.tts_voice.clone(),
        config.voice.tts_model.clone(),
        config.voice.tts_speed,
    )?;
    let agent = Arc::new(ChatAgent::new(&config.backend)?);

    let speaker = Arc::new(PlaybackController::new(
        tts,
        playback,
        Arc::clone(&interrupt),
        config.voice.playback_poll,
    ));

    // Barge-in monitor runs for the process lifetime
    let monitor = InterruptMonitor::new(
        capture.handle(),
        Arc::clone(&interrupt),
        config.voice.interrupt_threshold,
        config.voice.monitor_idle_poll,
        config.voice.monitor_capture_window,
    );
    tokio::spawn(monitor.run());

    // Set up shutdown signal
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(()).await;
        }
    });

    let voice_loop =
        ConversationLoop::new(config, capture, stt, agent, speaker, interrupt);
    voice_loop.run(&mut shutdown_rx).await?;

    Ok(())
}
