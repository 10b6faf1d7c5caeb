mod cli;
mod console;
mod repl;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use mriga_chat::{
    ConversationEngine, ConversationSnapshot, PersonaDraft, PersonalityRegistry, SpeechEngines,
};
use mriga_core::config::MrigaConfig;
use mriga_core::types::InteractionMode;
use mriga_llm::{ChatBackend, ChatClient, GeminiBackend, ScriptedBackend};

use cli::CliArgs;
use console::{ConsoleRecognizer, ConsoleSynthesizer, MicTap};
use repl::{Command, Renderer, Theme};

type InputLines = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // The log level is read from the config before the subscriber exists so
    // it can seed the filter. The full load happens once logging is up.
    let config_path = args.resolve_config_path();
    let config_level = MrigaConfig::load(&config_path)
        .map(|c| c.general.log_level)
        .unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(args.resolve_log_level(&config_level))),
        )
        .init();

    tracing::info!("Starting Mriga v{}", env!("CARGO_PKG_VERSION"));

    let config = MrigaConfig::load_or_default(&config_path);

    // --- LLM backend ---
    let backend: Arc<dyn ChatBackend> = if args.offline {
        tracing::info!("Offline mode: replies come from the scripted backend");
        Arc::new(ScriptedBackend::new().with_chunk_delay(Duration::from_millis(120)))
    } else {
        match GeminiBackend::from_config(&config.llm) {
            Ok(backend) => {
                tracing::info!(model = backend.model(), "Using Gemini backend");
                Arc::new(backend)
            }
            Err(e) => {
                tracing::error!(error = %e, "Cannot start the Gemini backend");
                eprintln!(
                    "Set {} to your API key, or run with --offline.",
                    config.llm.api_key_env
                );
                return Err(e.into());
            }
        }
    };

    // --- Speech engines ---
    let tap = MicTap::new();
    let mut speech = SpeechEngines::new(&config.speech);
    if args.no_speech {
        tracing::info!("Speech disabled, running as a host without speech support");
    } else {
        speech = speech
            .with_recognizer(ConsoleRecognizer::new(tap.clone()))
            .with_synthesizer(ConsoleSynthesizer::new(&config.speech));
    }

    // --- Conversation engine ---
    let engine = ConversationEngine::new(
        ChatClient::new(backend),
        PersonalityRegistry::with_presets(),
        speech,
    )?;
    let handle = engine.handle();
    let engine_task = tokio::spawn(engine.run());

    let theme = Theme::from_key(&config.ui.theme);
    let (theme_tx, theme_rx) = watch::channel(theme);
    let render_task = tokio::spawn(render_loop(
        handle.subscribe(),
        theme_rx,
        Renderer::new(theme, config.ui.show_status),
    ));

    println!("{}", repl::HELP);
    match args.mode.as_deref() {
        Some("voice") => handle.select_mode(InteractionMode::Voice)?,
        Some("text") => handle.select_mode(InteractionMode::Text)?,
        _ => {}
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match repl::parse_command(&line) {
            Command::Quit => break,
            Command::Empty => {}
            Command::Say(text) => {
                if tap.deliver(&text) {
                    continue;
                }
                if handle.snapshot().mode == InteractionMode::Landing {
                    println!("Choose /voice or /text first.");
                } else {
                    handle.send_text(text)?;
                }
            }
            Command::Voice => handle.select_mode(InteractionMode::Voice)?,
            Command::Text => handle.select_mode(InteractionMode::Text)?,
            Command::Back => handle.go_back()?,
            Command::Mic => handle.toggle_mic()?,
            Command::Personas => print!("{}", repl::personality_list(&handle.snapshot())),
            Command::Persona(name) => handle.select_personality(name)?,
            Command::New => {
                if let Some((draft, code)) = read_persona_form(&mut lines).await? {
                    handle.add_personality(draft, code)?;
                }
            }
            Command::Theme => {
                theme_tx.send_modify(|t| *t = t.next());
                println!("Theme: {}", theme_tx.borrow().label());
            }
            Command::Help => println!("{}", repl::HELP),
            Command::Unknown(line) => println!("Unknown command {line}, try /help"),
        }
    }

    tracing::info!("Shutting down");
    handle.shutdown()?;
    engine_task.await?;
    render_task.abort();
    Ok(())
}

/// Print whatever changed in each published snapshot.
async fn render_loop(
    mut snapshots: watch::Receiver<ConversationSnapshot>,
    mut theme: watch::Receiver<Theme>,
    mut renderer: Renderer,
) {
    loop {
        let snapshot = snapshots.borrow_and_update().clone();
        let out = renderer.render(&snapshot);
        if !out.is_empty() {
            print!("{out}");
            if let Err(e) = std::io::stdout().flush() {
                tracing::warn!(error = %e, "Failed to flush stdout");
            }
        }

        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = theme.changed() => {
                if changed.is_err() {
                    break;
                }
                renderer.set_theme(*theme.borrow_and_update());
            }
        }
    }
}

/// Ask for a custom persona. `None` when stdin closes mid-form.
async fn read_persona_form(lines: &mut InputLines) -> std::io::Result<Option<(PersonaDraft, String)>> {
    let Some(name) = ask(lines, "Name: ").await? else {
        return Ok(None);
    };
    let Some(instruction) = ask(lines, "Describe them: ").await? else {
        return Ok(None);
    };
    let Some(gender) = ask(lines, "Voice (male/female) [male]: ").await? else {
        return Ok(None);
    };
    let Some(code) = ask(lines, "Secret code: ").await? else {
        return Ok(None);
    };
    let draft = PersonaDraft {
        name,
        instruction,
        gender: repl::parse_gender(&gender),
    };
    Ok(Some((draft, code)))
}

async fn ask(lines: &mut InputLines, label: &str) -> std::io::Result<Option<String>> {
    print!("{label}");
    std::io::stdout().flush()?;
    lines.next_line().await
}
