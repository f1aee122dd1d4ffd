//! Entry point for the dubbing player.
//!
//! Responsibilities here are intentionally minimal:
//! - Parse command-line arguments.
//! - Load configuration from `conf/config.toml`.
//! - Load the bilingual transcript and build the sentence timeline.
//! - Wire providers into a session and drive it from a simulated clock.

mod simulated_video;

use crate::simulated_video::SimulatedVideo;
use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};
use updraft_core::audio::SpeechSynthesizer;
use updraft_core::providers::{
    OpenAiSpeech, OpenAiTranslator, RodioOutput, SilentSpeech, api_key_from_env,
};
use updraft_core::surface::TARGET_TRACK_LABEL;
use updraft_core::transcript::{FileTranscriptSource, load_transcript};
use updraft_core::{
    EngineConfig, EventBus, PlayerSettings, PlayerSettingsPatch, SessionDeps, SessionEvent,
    SessionHandle, SessionRuntime, SettingsStore, TranslationContext, VideoSurface, load_config,
};

type ReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

#[derive(Parser, Debug)]
#[command(name = "updraft-dub", about = "Play a video transcript with live translated dubbing")]
struct Args {
    /// Source-language subtitle track (SRT or WebVTT).
    #[arg(long)]
    source: PathBuf,
    /// Target-language subtitle track aligned with the source.
    #[arg(long)]
    target: PathBuf,
    #[arg(long, default_value = "conf/config.toml")]
    config: PathBuf,
    #[arg(long, default_value = "")]
    title: String,
    #[arg(long, default_value = "")]
    description: String,
    /// Playback position to start from, in seconds.
    #[arg(long, default_value_t = 0.0)]
    start: f64,
    /// Interval between simulated time updates.
    #[arg(long, default_value_t = 250)]
    tick_ms: u64,
    /// Skip audio output; speech durations are estimated from text length.
    #[arg(long)]
    no_audio: bool,
}

#[tokio::main]
async fn main() {
    let reload_handle = init_tracing();
    if let Err(err) = run(&reload_handle).await {
        error!("{err:?}");
        std::process::exit(1);
    }
}

async fn run(reload_handle: &ReloadHandle) -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args.config);
    set_log_level(reload_handle, config.log_level.as_filter_str());
    info!(
        source = %args.source.display(),
        target = %args.target.display(),
        level = %config.log_level,
        "Starting dubbing player"
    );
    info!(
        translate_window = config.translate_window,
        dub_window = config.dub_window,
        throttle_ms = config.throttle_interval_ms,
        translation_workers = config.translation_workers,
        synthesis_workers = config.synthesis_workers,
        "Active session configuration"
    );

    let transcript = FileTranscriptSource::new(&args.source, &args.target);
    let (timeline, full_text) = load_transcript(&transcript)
        .await
        .context("Failed to load transcript")?;
    let end_time = timeline.iter().map(|s| s.end).fold(0.0, f64::max);
    let sources: Vec<String> = timeline.iter().map(|s| s.source_text.clone()).collect();
    info!(
        sentences = sources.len(),
        chars = full_text.chars().count(),
        end_time,
        "Transcript ready"
    );

    let translator_key = api_key_from_env(&config.translator.api_key_env).ok_or_else(|| {
        anyhow!(
            "Set {} to an API key for the translator",
            config.translator.api_key_env
        )
    })?;
    let translator = Arc::new(OpenAiTranslator::new(
        config.translator.clone(),
        translator_key,
    ));

    // The output stream must stay alive for as long as speech can play.
    let mut _stream = None;
    let synthesizer: Arc<dyn SpeechSynthesizer> = if args.no_audio {
        info!("Audio disabled; using silent speech");
        Arc::new(SilentSpeech::default())
    } else {
        let (stream, handle) =
            rodio::OutputStream::try_default().context("Opening audio output")?;
        _stream = Some(stream);
        let speech_key = api_key_from_env(&config.speech.api_key_env).ok_or_else(|| {
            anyhow!(
                "Set {} to an API key for speech, or pass --no-audio",
                config.speech.api_key_env
            )
        })?;
        Arc::new(OpenAiSpeech::new(
            config.speech.clone(),
            speech_key,
            Arc::new(RodioOutput::new(handle)),
        ))
    };

    let video = Arc::new(SimulatedVideo::new(args.start));
    let events = EventBus::new();
    let event_rx = events.subscribe_all();
    let (session, task) = SessionRuntime::spawn(
        timeline,
        &config,
        TranslationContext {
            title: args.title.clone(),
            description: args.description.clone(),
        },
        SessionDeps {
            surface: Arc::clone(&video) as Arc<dyn VideoSurface>,
            translator,
            synthesizer,
        },
        events,
    );

    let settings = SettingsStore::new(PlayerSettings {
        pre_translate_count: config.translate_window,
        pre_dub_count: config.dub_window,
    });
    let forward = session.clone();
    settings.subscribe(move |settings| {
        forward.set_windows(settings.pre_translate_count, settings.pre_dub_count);
    });

    let logger = tokio::spawn(log_events(
        event_rx,
        Arc::clone(&video),
        sources,
        session.clone(),
    ));

    drive_clock(&args, &config, &video, &session, &settings, end_time).await;

    session.dispose();
    task.await.context("Session task panicked")?;
    logger.await.context("Event logger panicked")?;
    info!(tokens = session.token_usage(), "Playback finished");
    Ok(())
}

/// Advance the simulated video until the transcript ends or Ctrl-C, feeding
/// time updates and console commands to the session.
async fn drive_clock(
    args: &Args,
    config: &EngineConfig,
    video: &SimulatedVideo,
    session: &SessionHandle,
    settings: &SettingsStore,
    end_time: f64,
) {
    let tick = Duration::from_millis(args.tick_ms.max(10));
    let mut interval = tokio::time::interval(tick);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    info!(
        "Commands: p (play/pause), g <index> (go to sentence), l (list), t <n> / d <n> (lookahead), q (quit)"
    );
    if config.translate_window == 0 {
        warn!("Pre-translation disabled; only reference text will be dubbed");
    }

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let time = video.advance(tick);
                if video.is_playing() {
                    session.time_update(time);
                }
                if time > end_time + 1.0 {
                    info!(time, "Reached end of transcript");
                    break;
                }
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim() == "l" => list_sentences(session).await,
                Ok(Some(line)) => {
                    if !handle_command(line.trim(), video, session, settings) {
                        break;
                    }
                }
                Ok(None) => stdin_open = false,
                Err(err) => {
                    warn!("Failed to read console input: {err}");
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }
}

/// Returns `false` when the player should stop.
fn handle_command(
    line: &str,
    video: &SimulatedVideo,
    session: &SessionHandle,
    settings: &SettingsStore,
) -> bool {
    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or_default();
    let value = parts.next().and_then(|raw| raw.parse::<usize>().ok());
    match (command, value) {
        ("", _) => {}
        ("q", _) => return false,
        ("p", _) => {
            if video.toggle_playing() {
                info!("Resumed");
                session.seeked(video.current_time());
            } else {
                info!("Paused");
                session.pause();
            }
        }
        ("g", Some(index)) => session.activate_sentence(index),
        ("t", Some(count)) => {
            settings.update(PlayerSettingsPatch {
                pre_translate_count: Some(count),
                ..PlayerSettingsPatch::default()
            });
        }
        ("d", Some(count)) => {
            settings.update(PlayerSettingsPatch {
                pre_dub_count: Some(count),
                ..PlayerSettingsPatch::default()
            });
        }
        _ => warn!(line, "Unrecognized command"),
    }
    true
}

async fn list_sentences(session: &SessionHandle) {
    let Some(views) = session.snapshot().await else {
        warn!("Session already stopped");
        return;
    };
    for view in views {
        info!(
            index = view.index,
            start = view.start,
            current = view.current,
            dubbed = view.dubbed,
            source = %view.source_text,
            target = view.display_text.as_deref().unwrap_or("-"),
            "Sentence"
        );
    }
}

async fn log_events(
    mut rx: tokio::sync::mpsc::UnboundedReceiver<SessionEvent>,
    video: Arc<SimulatedVideo>,
    sources: Vec<String>,
    session: SessionHandle,
) {
    while let Some(event) = rx.recv().await {
        match &event {
            SessionEvent::CurrentSentenceChanged(index) => {
                let time = video.current_time();
                let caption = video.caption_at(TARGET_TRACK_LABEL, time).unwrap_or_default();
                info!(
                    index,
                    time,
                    source = sources.get(*index).map(String::as_str).unwrap_or_default(),
                    caption = %caption,
                    "Now showing"
                );
            }
            SessionEvent::TokenUsageChange => {
                info!(tokens = session.token_usage(), "Token usage");
            }
            SessionEvent::TranslateSentencesFailed { indices, reason } => {
                warn!(indices = ?indices, %reason, "Translation failed");
            }
            other => info!(event = ?other, "Session event"),
        }
    }
}

fn init_tracing() -> ReloadHandle {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let (filter_layer, handle) = reload::Layer::new(env_filter);
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(filter_layer),
        )
        .init();
    warn!("Logging initialized; override level with config.log_level or RUST_LOG");
    handle
}

fn set_log_level(handle: &ReloadHandle, level: &str) {
    let parsed = EnvFilter::builder()
        .parse(level)
        .unwrap_or_else(|_| EnvFilter::new("debug"));
    if let Err(err) = handle.modify(|filter| *filter = parsed.clone()) {
        warn!(%level, "Failed to update log level from config: {err}");
    } else {
        info!(%level, "Applied log level from config");
    }
}
