//! `notebridge` - CLI and foreground daemon
//!
//! This binary runs the clipboard/hotkey bridge and exposes one-shot
//! commands for sending, receiving and cleaning up notes.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::runtime::{Builder, Handle};
use tokio::sync::watch;

use notebridge::api::{ConfigCredentials, CredentialSource, HttpNoteApi, NoteApi};
use notebridge::cli::{
    CleanupCommand, Cli, Command, ConfigCommand, ReceiveCommand, SendCommand, StatusReport,
};
use notebridge::config::JsonSettingsStore;
use notebridge::coordinator::Coordinator;
use notebridge::daemon::Daemon;
use notebridge::event::{CleanupKind, Notifier, PasteStatus};
use notebridge::platform::{NativeClipboard, NativePasteInjector};
use notebridge::receiver::{ReceiveOutcome, ReceiveSequencer};
use notebridge::scheduler::{CleanupScheduler, LocalClock, WallClock};
use notebridge::sender::Dispatcher;
use notebridge::source::DetachedBindings;
use notebridge::{init_logging, Config};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    let runtime = Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting the async runtime")?;

    let config_path = cli.config_path();
    let load = || {
        Config::load_from(Some(config_path.clone()))
            .with_context(|| format!("loading {}", config_path.display()))
    };

    // Execute the command
    match cli.command {
        // The hotkey loop keeps the main thread; the daemon runs beside it.
        Command::Run => Daemon::run_foreground(&runtime, load()?, &config_path)?,
        Command::Send(cmd) => runtime.block_on(handle_send(&load()?, cmd))?,
        Command::Receive(cmd) => runtime.block_on(handle_receive(load()?, &cmd))?,
        Command::Cleanup(cmd) => runtime.block_on(handle_cleanup(load()?, &cmd))?,
        Command::TestConnection => runtime.block_on(handle_test_connection(&load()?))?,
        Command::Status(cmd) => {
            let report = StatusReport::build(&load()?, LocalClock.now());
            if cmd.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{report}");
            }
        }
        Command::Config(cmd) => handle_config(&config_path, cmd)?,
        Command::Enable => handle_switch(load()?, &config_path, true, runtime.handle())?,
        Command::Disable => handle_switch(load()?, &config_path, false, runtime.handle())?,
    }
    Ok(())
}

fn api() -> anyhow::Result<Arc<dyn NoteApi>> {
    Ok(Arc::new(HttpNoteApi::new()?))
}

fn credentials() -> Arc<dyn CredentialSource> {
    Arc::new(ConfigCredentials)
}

fn dispatcher() -> anyhow::Result<Dispatcher> {
    Ok(Dispatcher::new(api()?, credentials()))
}

/// A scheduler that is never armed, for the cleanup guard and coordinator.
fn idle_scheduler(
    config: Config,
    runtime: Handle,
) -> anyhow::Result<(watch::Sender<Arc<Config>>, Arc<CleanupScheduler>)> {
    let (tx, rx) = watch::channel(Arc::new(config));
    let scheduler = CleanupScheduler::new(
        api()?,
        credentials(),
        rx,
        Notifier::new(),
        Arc::new(LocalClock),
        runtime,
    );
    Ok((tx, scheduler))
}

async fn handle_send(config: &Config, cmd: SendCommand) -> anyhow::Result<()> {
    let text = match cmd.text {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading standard input")?;
            buf
        }
    };

    let ack = dispatcher()?.send(config, &text).await?;
    println!("{}", ack.message);
    Ok(())
}

async fn handle_test_connection(config: &Config) -> anyhow::Result<()> {
    let ack = dispatcher()?.test_connection(config).await?;
    println!("Connection OK: {}", ack.message);
    Ok(())
}

async fn handle_receive(mut config: Config, cmd: &ReceiveCommand) -> anyhow::Result<()> {
    if cmd.no_paste {
        config.receive.auto_paste = false;
    }

    let sequencer = ReceiveSequencer::new(
        api()?,
        credentials(),
        Arc::new(NativeClipboard::default()),
        Arc::new(NativePasteInjector::default()),
    );
    match sequencer.receive(&config).await? {
        ReceiveOutcome::Empty => println!("Nothing to receive."),
        ReceiveOutcome::Received { chars, paste } => {
            println!("Received {chars} characters to the clipboard.");
            match paste {
                PasteStatus::Skipped => {}
                PasteStatus::Injected(method) => println!("Pasted using {method}."),
                PasteStatus::Failed(reason) => eprintln!("Paste failed: {reason}"),
            }
        }
    }
    Ok(())
}

async fn handle_cleanup(config: Config, cmd: &CleanupCommand) -> anyhow::Result<()> {
    let (_tx, scheduler) = idle_scheduler(config, Handle::current())?;
    let kind = cmd.kind();
    let report = scheduler.run_now(kind).await?;

    match (kind, report.count) {
        (CleanupKind::BackupCount, Some(count)) => println!("Backups to purge: {count}"),
        _ => println!("{}", report.message),
    }
    Ok(())
}

fn handle_switch(
    config: Config,
    config_path: &Path,
    enabled: bool,
    runtime: &Handle,
) -> anyhow::Result<()> {
    let notifier = Notifier::new();
    let (tx, scheduler) = idle_scheduler(config, runtime.clone())?;
    let store = JsonSettingsStore::beside(config_path);
    let settings_path = store.path().to_path_buf();

    let coordinator = Coordinator::new(
        tx,
        Arc::new(store),
        Arc::new(DetachedBindings),
        Arc::clone(&scheduler),
        notifier,
    );
    let config = coordinator.set_enabled(enabled)?;
    scheduler.shutdown();

    println!(
        "Sync {} (saved to {})",
        if config.enabled { "enabled" } else { "disabled" },
        settings_path.display()
    );
    println!("A running daemon picks this up on its next start.");
    Ok(())
}

fn handle_config(config_path: &Path, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let config = Config::load_from(Some(config_path.to_path_buf()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print_config(&config);
            }
        }
        ConfigCommand::Path => {
            println!("{}", config_path.display());
            println!("{}", Config::settings_path_for(config_path).display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(|| config_path.to_path_buf());
            println!("Validating configuration: {}", path.display());
            if let Err(e) = Config::load_from(Some(path)) {
                bail!("Configuration error: {e}");
            }
            println!("Configuration is valid.");
        }
    }
    Ok(())
}

fn print_config(config: &Config) {
    let server = &config.server;
    println!("Current Configuration");
    println!("=====================");
    println!();
    println!("  Enabled:            {}", config.enabled);
    println!("  Show success:       {}", config.show_message_on_success);
    println!();
    println!("[Server]");
    println!("  Send URL:           {}", server.send_url);
    println!("  Receive URL:        {}", server.receive_url);
    println!("  Cleanup URL:        {}", server.cleanup_url);
    println!("  Basic auth user:    {}", server.basic_user);
    println!("  Pretty cleanup:     {}", server.cleanup_pretty);
    println!();
    println!("[Hotkeys]");
    println!("  Toggle:             {}", config.hotkeys.toggle.display);
    println!("  Receive:            {}", config.hotkeys.receive.display);
    println!();
    println!("[Cleanup]");
    println!("  Schedule:           {}", config.cleanup_mode());
    println!();
    println!("[Receive]");
    println!("  Auto paste:         {}", config.receive.auto_paste);
    println!(
        "  Stabilize wait (ms): {}",
        config.receive.clipboard_stabilize_wait_ms
    );
}
