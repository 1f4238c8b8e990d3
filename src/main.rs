mod app;
mod cache;
mod cli;
mod config;
mod error;
mod filter;
mod format;
mod input;
mod linkage;
mod modal;
mod model;
mod ovirt;
mod paging;
mod refresh;
mod screen;
mod screens;
mod session;
mod source;
mod table;
mod ui;
mod worker;

use anyhow::{Context, Result};
use app::App;
use clap::Parser;
use cli::CliArgs;
use config::{
    RutilConfig, Settings, engine_url_for_fqdn, hosted_engine_fqdn, normalize_username,
};
use crossterm::event::{
    Event, EventStream, KeyEventKind, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags,
    PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
    supports_keyboard_enhancement,
};
use error::DashError;
use futures::StreamExt;
use ovirt::{EngineClient, EngineCredentials, engine_socket};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use session::Session;
use std::fs::OpenOptions;
use std::io::{self, Stdout};
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::time::{Duration, Instant, MissedTickBehavior, interval, timeout};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;
const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(5);
const LOGIN_ATTEMPTS: usize = 2;
const PASSWORD_ENV: &str = "RUTIL_PASSWORD";
const DEFAULT_USERNAME: &str = "admin";

/// Where and how to log in, merged from flags, config file and host files.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Connection {
    url: String,
    username: String,
    insecure: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    let _log_guard = init_tracing(&args.log_filter, args.log_file.as_deref())?;

    let (config, config_path) = RutilConfig::load(args.config.as_deref())?;
    if let Some(path) = &config_path {
        info!("loaded config from {}", path.display());
    }

    let mut settings = Settings::from_config(&config);
    if let Some(ms) = args.refresh_ms {
        settings.input_tick = Duration::from_millis(ms.clamp(10, 1_000));
    }

    let session = match bootstrap(&args, &config, settings).await {
        Ok(session) => session,
        Err(error) => {
            let error = anyhow::Error::new(error);
            eprintln!("rutil: {}", compact_error(&error));
            std::process::exit(1);
        }
    };

    let tick = session.settings().input_tick;
    let mut app = App::new(session);
    run(&mut app, tick).await
}

fn init_tracing(level_filter: &str, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(level_filter)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to initialize tracing filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact();

    let Some(path) = log_file else {
        let _ = builder.with_writer(std::io::sink).try_init();
        return Ok(None);
    };

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(file);
    let _ = builder.with_ansi(false).with_writer(writer).try_init();
    Ok(Some(guard))
}

fn resolve_connection(args: &CliArgs, config: &RutilConfig) -> Result<Connection, DashError> {
    let url = args
        .url
        .clone()
        .or_else(|| config.engine.url.clone())
        .or_else(|| {
            hosted_engine_fqdn(&config.engine.hosted_engine_conf)
                .map(|fqdn| engine_url_for_fqdn(&fqdn))
        })
        .ok_or_else(|| {
            DashError::FatalBootstrap(format!(
                "no engine URL: pass --url, set engine.url, or provide {}",
                config.engine.hosted_engine_conf.display()
            ))
        })?;
    let username = args
        .username
        .as_deref()
        .or(config.engine.username.as_deref())
        .unwrap_or(DEFAULT_USERNAME);
    Ok(Connection {
        url,
        username: normalize_username(username),
        insecure: args.insecure || config.engine.insecure,
    })
}

async fn check_reachable(url: &str) -> Result<(), DashError> {
    let (host, port) = engine_socket(url)
        .ok_or_else(|| DashError::FatalBootstrap(format!("invalid engine URL: {url}")))?;
    match timeout(REACHABILITY_TIMEOUT, TcpStream::connect((host.as_str(), port))).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(error)) => Err(DashError::FatalBootstrap(format!(
            "engine {host}:{port} is unreachable: {error}"
        ))),
        Err(_) => Err(DashError::FatalBootstrap(format!(
            "engine {host}:{port} did not answer within {}s",
            REACHABILITY_TIMEOUT.as_secs()
        ))),
    }
}

fn read_password(username: &str) -> Result<String, DashError> {
    rpassword::prompt_password(format!("Password for {username}: "))
        .map_err(|error| DashError::FatalBootstrap(format!("failed to read password: {error}")))
}

/// Resolves the engine, logs in and returns the session the screens share.
async fn bootstrap(
    args: &CliArgs,
    config: &RutilConfig,
    settings: Settings,
) -> Result<Session, DashError> {
    let connection = resolve_connection(args, config)?;
    info!(url = %connection.url, user = %connection.username, "connecting");
    check_reachable(&connection.url).await?;

    let from_env = std::env::var(PASSWORD_ENV).ok().filter(|value| !value.is_empty());
    let attempts = if from_env.is_some() { 1 } else { LOGIN_ATTEMPTS };
    let mut password = match from_env {
        Some(password) => password,
        None => read_password(&connection.username)?,
    };

    for attempt in 1..=attempts {
        let client = EngineClient::connect(&EngineCredentials {
            url: connection.url.clone(),
            username: connection.username.clone(),
            password: password.clone(),
            insecure: connection.insecure,
        })
        .map_err(|error| DashError::FatalBootstrap(error.to_string()))?;

        match client.probe().await {
            Ok(product) => {
                info!(%product, "engine login succeeded");
                let engine = client
                    .base_url()
                    .host_str()
                    .map(|host| format!("{host} ({product})"))
                    .unwrap_or(product);
                return Ok(Session::new(Arc::new(client), settings, engine));
            }
            Err(error) if error.is_unauthorized() && attempt < attempts => {
                warn!(attempt, "engine rejected the credentials");
                eprintln!("Login failed for {}; try again.", connection.username);
                password = read_password(&connection.username)?;
            }
            Err(error) => {
                return Err(DashError::FatalBootstrap(format!(
                    "engine login failed: {error}"
                )));
            }
        }
    }

    Err(DashError::FatalBootstrap(format!(
        "engine login failed for {}",
        connection.username
    )))
}

async fn run(app: &mut App, tick: Duration) -> Result<()> {
    let (mut terminal, keyboard_enhanced) = init_terminal()?;
    let run_result = run_loop(&mut terminal, app, tick).await;
    let restore_result = restore_terminal(&mut terminal, keyboard_enhanced);

    match (run_result, restore_result) {
        (Err(run_error), Err(restore_error)) => Err(anyhow::anyhow!(
            "{run_error:#}\nterminal restore error: {restore_error:#}"
        )),
        (Err(error), _) => Err(error),
        (_, Err(error)) => Err(error),
        (Ok(()), Ok(())) => Ok(()),
    }
}

fn init_terminal() -> Result<(TuiTerminal, bool)> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    let keyboard_enhanced = matches!(supports_keyboard_enhancement(), Ok(true));
    if keyboard_enhanced {
        execute!(
            stdout,
            EnterAlternateScreen,
            PushKeyboardEnhancementFlags(
                KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
                    | KeyboardEnhancementFlags::REPORT_EVENT_TYPES
            )
        )
        .context("failed to enter alternate screen with keyboard enhancement")?;
    } else {
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    }
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal backend")?;
    terminal.clear().context("failed to clear terminal")?;
    Ok((terminal, keyboard_enhanced))
}

fn restore_terminal(terminal: &mut TuiTerminal, keyboard_enhanced: bool) -> Result<()> {
    if keyboard_enhanced {
        execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags)
            .context("failed to pop keyboard enhancement flags")?;
    }
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;
    Ok(())
}

async fn run_loop(terminal: &mut TuiTerminal, app: &mut App, tick: Duration) -> Result<()> {
    let mut reader = EventStream::new();
    let mut ticker = interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        terminal
            .draw(|frame| ui::render(frame, app, Instant::now()))
            .context("failed to render terminal frame")?;

        if !app.running() {
            break;
        }

        tokio::select! {
            maybe_event = reader.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        if let Some(action) = input::map_key(app.mode(), key) {
                            debug!("action={action:?}");
                            let command = app.apply_action(action, Instant::now());
                            terminal
                                .draw(|frame| ui::render(frame, app, Instant::now()))
                                .context("failed to render terminal frame")?;
                            if !app.running() {
                                break;
                            }
                            app.settle(command).await;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        app.set_status(format!("terminal event error: {error}"));
                    }
                    None => {
                        app.set_status("terminal event stream closed");
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                app.tick(Instant::now()).await;
            }
        }
    }

    info!("exiting");
    Ok(())
}

fn compact_error(error: &anyhow::Error) -> String {
    let mut out = Vec::new();
    for (index, cause) in error.chain().enumerate() {
        if index == 0 {
            out.push(cause.to_string());
        } else if index <= 2 {
            out.push(format!("caused by: {cause}"));
        } else {
            break;
        }
    }

    out.join("\n")
}
