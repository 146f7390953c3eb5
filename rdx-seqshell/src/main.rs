use anyhow::Result;
use colored::Colorize;
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use sequencer::prelude::*;
use sequencer::{ENGINE_NAME, VERSION as LIB_VERSION};
use std::borrow::Cow;
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A custom helper struct for rustyline that enables syntax highlighting.
#[derive(Completer, Helper, Hinter, Validator)]
struct ShellHighlighter;

impl Highlighter for ShellHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            let colored_command = command.yellow().bold();
            let colored_rest = rest.yellow();
            Cow::Owned(format!("{} {}", colored_command, colored_rest))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }
    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    println!("{}", "  seqshell :: operator console".cyan().bold());

    let version_string = format!(
        "          Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );
    println!("{}", "-".repeat(79).dimmed());
    println!("{}", version_string);
    let license_blurb = "
    This software is provided 'as is', without warranty of any kind.
    Distributed under the MIT OR Apache-2.0 license. Use at your own risk.
    ";
    println!("{}", license_blurb.dimmed());
    println!("{}", "-".repeat(79).dimmed());
}

/// Spawns tasks that print engine events while `watch` is on.
fn spawn_event_listeners(engine: &SequencerEngine, watching: Arc<AtomicBool>) {
    // System events are always shown.
    let mut system_rx = engine.subscribe_system_events();
    tokio::spawn(async move {
        while let Ok(event) = system_rx.recv().await {
            match event {
                SystemEvent::ControllerDied { reason } => {
                    println!("\n<-- {} {}\n>> ", "[CONTROLLER DIED]".red().bold(), reason)
                }
                other => println!("\n<-- [SYSTEM EVENT] {:?}\n>> ", other),
            }
        }
    });

    let mut sequence_rx = engine.subscribe_sequence_events();
    tokio::spawn(async move {
        while let Ok(event) = sequence_rx.recv().await {
            if !watching.load(Ordering::Relaxed) {
                continue;
            }
            let line = match event {
                SequenceEvent::Queued { name, .. } => format!("queued '{}'", name),
                SequenceEvent::Ignored { name, reason } => {
                    format!("ignored '{}' ({:?})", name, reason).dimmed().to_string()
                }
                SequenceEvent::AbortRequested { name, .. } => {
                    format!("aborting '{}'", name).yellow().to_string()
                }
                SequenceEvent::Started { name, aborted, .. } => {
                    if aborted {
                        format!("started '{}' (cleanup only)", name)
                    } else {
                        format!("started '{}'", name)
                    }
                }
                SequenceEvent::StepStarted { name, step, .. } => {
                    format!("'{}' -> {:?}", name, step)
                }
                SequenceEvent::Finished { name, aborted, .. } => {
                    let text = format!("finished '{}'", name);
                    if aborted {
                        text.yellow().to_string()
                    } else {
                        text.green().to_string()
                    }
                }
            };
            println!("<-- [SEQUENCE] {}", line);
        }
    });
}

fn print_help() {
    println!("Available commands:");
    println!("  list                  - Shows the sequences that can be run.");
    println!("  run <NAME>            - Requests a sequence by name.");
    println!("  status                - Shows what the controller is doing.");
    println!("  state                 - Shows every subsystem setpoint.");
    println!("  enable | disable      - Accepts or rejects new requests.");
    println!("  watch on | watch off  - Prints sequence events as they happen.");
    println!("  exit                  - Quits the shell.");
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let path = env::args().nth(1).map(PathBuf::from);
    let config = SequencerConfig::load(path.as_deref())?;
    let sequences = Sequences::new(&config)?;
    let engine = SequencerEngine::new(config);
    let engine_handle = engine.clone();

    let watching = Arc::new(AtomicBool::new(true));
    spawn_event_listeners(&engine_handle, watching.clone());

    info!("Spawning {} in the background...", ENGINE_NAME.cyan());
    tokio::spawn(async move {
        if let Err(e) = engine.run().await {
            eprintln!("\nEngine stopped with an error: {}", e);
        }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut rl = Editor::new()?;
    rl.set_helper(Some(ShellHighlighter));

    println!(
        "{} is running. Type 'help' for commands or 'exit' to quit.",
        ENGINE_NAME.cyan()
    );

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(_) => {
                println!("Exiting seqshell...");
                break;
            }
        };
        rl.add_history_entry(line.as_str())?;
        let args = line.split_whitespace().collect::<Vec<_>>();
        let Some(command) = args.first() else {
            continue;
        };

        match *command {
            "list" => {
                println!("Sequences:");
                for name in sequences.names() {
                    println!("  {}", name);
                }
            }
            "run" => match args.get(1) {
                Some(name) => match sequences.get(name) {
                    Some(sequence) => match engine_handle.run_sequence(sequence).await {
                        Some(id) => println!("--> Requested '{}' as {:?}", sequence.name(), id),
                        None => println!("--> Request for '{}' was ignored.", sequence.name()),
                    },
                    None => println!("Error: no sequence named '{}'. Try 'list'.", name),
                },
                None => println!("Usage: run <NAME>"),
            },
            "status" => println!("{}", engine_handle.status().await),
            "state" => {
                let summary = engine_handle
                    .with_subsystems(|subsystems| subsystems.summary())
                    .await;
                println!("{}", summary);
            }
            "enable" => {
                engine_handle.enable().await;
                println!("--> Controller enabled.");
            }
            "disable" => {
                engine_handle.disable().await;
                println!("--> Controller disabled. Running sequences will clean up.");
            }
            "watch" => match args.get(1) {
                Some(&"on") => {
                    watching.store(true, Ordering::Relaxed);
                    println!("--> Printing sequence events.");
                }
                Some(&"off") => {
                    watching.store(false, Ordering::Relaxed);
                    println!("--> Stopped printing sequence events.");
                }
                _ => println!("Usage: watch on | watch off"),
            },
            "help" => print_help(),
            "exit" => break,
            _ => println!("Unknown command: '{}'. Type 'help'.", line),
        }
    }

    engine_handle.shutdown();
    tokio::time::sleep(Duration::from_millis(100)).await;
    Ok(())
}
