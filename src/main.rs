mod backends;
mod config;
mod controller;
mod error;
mod filter;
mod keybindings;
mod port;
mod process;
mod scheduler;
mod session;
mod snapshot;
#[cfg(test)]
mod testing;
mod ui;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, Event},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;

use crate::backends::Platform;
use crate::backends::connection::{ConnectionEnumerator, detect_enumerators, select_enumerator};
use crate::backends::process::{ProcessInspector, SystemInspector};
use crate::backends::terminate::SignalTerminator;
use crate::config::Config;
use crate::controller::ProcessController;
use crate::filter::FilterSpec;
use crate::scheduler::{PollEvent, PollState, PollingScheduler};
use crate::session::{Command, Reply, Session};
use crate::snapshot::SnapshotBuilder;
use crate::ui::{AppState, UiAction};

/// portwatch - see which process owns which port, and stop it
#[derive(Parser, Debug)]
#[command(name = "portwatch")]
#[command(version)]
#[command(about = "Terminal port and process monitor", long_about = None)]
struct Args {
    /// Config file (default: <config dir>/portwatch/config.json)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Milliseconds between automatic refreshes
    #[arg(long, value_name = "MS")]
    interval_ms: Option<u64>,

    /// Milliseconds to wait before refreshing after a termination
    #[arg(long, value_name = "MS")]
    repoll_delay_ms: Option<u64>,

    /// Connection backend to use (see --list-backends)
    #[arg(long, value_name = "BACKEND")]
    enumerator: Option<String>,

    /// Only show connections whose local port contains this
    #[arg(long, value_name = "PORT")]
    port: Option<String>,

    /// Only show processes whose name contains this (case-insensitive)
    #[arg(long, value_name = "NAME")]
    process: Option<String>,

    /// Print one filtered snapshot and exit
    #[arg(long)]
    list: bool,

    /// Print --list output as JSON
    #[arg(long, requires = "list")]
    json: bool,

    /// Print details of a process and exit
    #[arg(long, value_name = "PID", conflicts_with = "list")]
    describe: Option<u32>,

    /// Terminate a process and exit
    #[arg(long, value_name = "PID", conflicts_with_all = ["list", "describe"])]
    kill: Option<u32>,

    /// Use SIGKILL / TerminateProcess instead of a graceful request
    #[arg(long, requires = "kill")]
    force: bool,

    /// Don't ask for confirmation
    #[arg(long, requires = "kill")]
    yes: bool,

    /// List all available backends and exit
    #[arg(long)]
    list_backends: bool,
}

impl Args {
    /// CLI flags override the config file
    fn apply_to(&self, config: &mut Config) -> Result<()> {
        if let Some(ms) = self.interval_ms {
            anyhow::ensure!(ms > 0, "--interval-ms must be greater than zero");
            config.poll_interval_ms = ms;
        }
        if let Some(ms) = self.repoll_delay_ms {
            config.repoll_delay_ms = ms;
        }
        if self.enumerator.is_some() {
            config.preferred_enumerator = self.enumerator.clone();
        }
        if self.port.is_some() {
            config.port_filter = self.port.clone();
        }
        if self.process.is_some() {
            config.process_filter = self.process.clone();
        }
        Ok(())
    }
}

/// Everything the front ends need, wired once
struct Core {
    enumerator: Arc<dyn ConnectionEnumerator>,
    inspector: Arc<dyn ProcessInspector>,
    scheduler: PollingScheduler,
    controller: Arc<ProcessController>,
}

impl Core {
    fn build(config: &Config) -> Result<Self> {
        let enumerator: Arc<dyn ConnectionEnumerator> =
            Arc::from(select_enumerator(config.preferred_enumerator.as_deref())?);
        log::info!("Using connection backend: {}", enumerator.name());

        let inspector: Arc<dyn ProcessInspector> =
            Arc::new(SystemInspector::new(Arc::clone(&enumerator)));
        let builder = SnapshotBuilder::new(Arc::clone(&enumerator), Arc::clone(&inspector));
        let scheduler = PollingScheduler::new(Arc::new(builder), config.poll_interval());
        let controller = Arc::new(ProcessController::new(
            Arc::clone(&inspector),
            Arc::new(SignalTerminator::new()),
            Arc::new(scheduler.clone()),
            config.repoll_delay(),
        ));

        Ok(Self {
            enumerator,
            inspector,
            scheduler,
            controller,
        })
    }

    fn into_session(self, filter: FilterSpec) -> Session {
        Session::new(self.scheduler, self.inspector, self.controller, filter)
    }
}

fn print_available_backends() -> Result<()> {
    println!("portwatch - Available Backends\n");

    println!("Connection Backends:");
    let backends = detect_enumerators();
    if backends.is_empty() {
        println!("  (none compiled in)");
    } else {
        for backend in backends {
            let status = if backend.available {
                "available"
            } else {
                "unavailable"
            };
            println!(
                "  {:12} [priority: {:?}] {}",
                backend.name, backend.priority, status
            );
        }
    }

    println!();
    match select_enumerator(None) {
        Ok(selected) => {
            let caps = selected.capabilities();
            println!(
                "Default: {} [priority: {:?}]",
                selected.name(),
                selected.priority()
            );
            println!(
                "  IPv4: {}  IPv6: {}  UDP: {}  native: {}",
                caps.ipv4_support, caps.ipv6_support, caps.udp_support, caps.native
            );
        }
        Err(e) => println!("Default: none ({})", e),
    }

    println!();
    println!("Note: {}", Platform::current().privilege_note());
    Ok(())
}

async fn run_list(core: Core, filter: &FilterSpec, json: bool) -> Result<()> {
    let snapshot = core.scheduler.refresh().await?;
    let rows = snapshot.filtered(filter);
    if !filter.is_empty() {
        log::info!("Filter: {}", filter.describe());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!(
        "{:>7}  {:20} {:5} {:28} {:28} {}",
        "PID", "PROCESS", "PROTO", "LOCAL", "REMOTE", "STATUS"
    );
    for record in &rows {
        println!(
            "{:>7}  {:20} {:5} {:28} {:28} {}",
            record.pid,
            record.process_name,
            record.protocol.to_string(),
            record.local_display(),
            record.remote_display(),
            record.status.to_string()
        );
    }
    println!(
        "\n{} of {} connection(s) at {}",
        rows.len(),
        snapshot.len(),
        snapshot.captured_at.format("%Y-%m-%d %H:%M:%S")
    );
    Ok(())
}

async fn run_describe(core: Core, pid: u32, max_open_files: usize) -> Result<()> {
    let mut session = core.into_session(FilterSpec::default());
    match session.dispatch(Command::RequestDetail(pid)).await {
        Reply::Detail(_, Some(detail)) => {
            for line in detail.lines(max_open_files) {
                println!("{}", line);
            }
            Ok(())
        }
        _ => anyhow::bail!("Process {} not found", pid),
    }
}

fn confirm_on_stdin(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("Failed to read confirmation")?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes" | "YES"))
}

async fn run_kill(core: Core, pid: u32, force: bool, yes: bool) -> Result<()> {
    let mut session = core.into_session(FilterSpec::default());

    let pending = match session
        .dispatch(Command::RequestTerminate { pid, force })
        .await
    {
        Reply::Confirm(pending) => pending,
        Reply::Terminated(outcome) => anyhow::bail!("{}", outcome),
        other => anyhow::bail!("Unexpected reply: {:?}", other),
    };

    if !yes && !confirm_on_stdin(&pending.prompt())? {
        println!("Cancelled");
        return Ok(());
    }

    match session.dispatch(Command::ConfirmTerminate(pending)).await {
        Reply::Terminated(outcome) if outcome.is_success() => {
            println!("{}", outcome);
            Ok(())
        }
        Reply::Terminated(outcome) => anyhow::bail!("{}", outcome),
        other => anyhow::bail!("Unexpected reply: {:?}", other),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // The TUI owns the screen, so only log when asked to
    if std::env::var("RUST_LOG").is_ok() {
        pretty_env_logger::formatted_builder()
            .parse_default_env()
            .init();
    }

    if args.list_backends {
        return print_available_backends();
    }

    let mut config = Config::load(args.config.as_deref())?;
    args.apply_to(&mut config)?;
    let filter = FilterSpec::new(config.port_filter.clone(), config.process_filter.clone());

    let core = Core::build(&config)?;

    if args.list {
        return run_list(core, &filter, args.json).await;
    }
    if let Some(pid) = args.describe {
        return run_describe(core, pid, config.max_open_files_shown).await;
    }
    if let Some(pid) = args.kill {
        return run_kill(core, pid, args.force, args.yes).await;
    }

    log::info!(
        "Starting TUI with backend {}, polling every {:?} ({})",
        core.enumerator.name(),
        core.scheduler.interval(),
        Platform::current().privilege_note()
    );

    let mut session = core.into_session(filter.clone());
    let mut app = AppState::new(config.theme, &filter, config.max_open_files_shown);

    // Setup terminal for TUI mode
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app, &mut session).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("Error: {:?}", err);
    }

    Ok(())
}

async fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut AppState,
    session: &mut Session,
) -> Result<()> {
    let mut events = session.scheduler().subscribe();
    let timer = session.scheduler().start();

    loop {
        app.polling = session.scheduler().state() == PollState::Polling;

        // Draw UI
        terminal.draw(|f| ui::draw_ui(f, app))?;

        // Handle input with timeout
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                match app.handle_key(key) {
                    UiAction::None => {}
                    UiAction::Quit => break,
                    UiAction::Send(command) => {
                        let reply = session.dispatch(command).await;
                        app.apply_reply(reply);
                    }
                }
            }
        }

        // Drain poll results without blocking the input loop
        loop {
            match events.try_recv() {
                Ok(PollEvent::Updated(snapshot)) => {
                    app.on_snapshot(&snapshot, session.rows());
                }
                Ok(PollEvent::Failed(message)) => app.on_poll_failed(&message),
                Err(TryRecvError::Lagged(skipped)) => {
                    log::debug!("UI skipped {} poll event(s)", skipped);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }

    timer.stop();
    Ok(())
}
