// # ipwatchd - Public IP Monitoring Daemon
//
// This daemon is a THIN integration layer:
// 1. Reading configuration from environment variables
// 2. Initializing the runtime and logging
// 3. Wiring the resolver, stores, and notifier into the engine
// 4. Starting the scheduler (or running one check with --run-now)
//
// All monitoring logic lives in ipwatch-core; do not add business logic,
// retry logic, or rendering here.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Resolver
// - `IPWATCH_RESOLVER_URL`: Address-lookup endpoint (default https://api.ipify.org?format=json)
// - `IPWATCH_REQUEST_TIMEOUT_SECS`: Per-request timeout (default 10)
// - `IPWATCH_MAX_ATTEMPTS`: Retry attempts per check, including the first (default 5)
// - `IPWATCH_BACKOFF_BASE_SECS`: Exponential backoff base (default 1)
//
// ### Schedule
// - `IPWATCH_CHECK_INTERVAL_SECS`: Check cadence (default 300)
// - `IPWATCH_DIGEST_CRON`: Digest cadence, 5-field cron in UTC (default "0 8 * * 1")
// - `IPWATCH_DIGEST_WINDOW_DAYS`: Trailing window the digest reports over (default 7)
//
// ### Detection
// - `IPWATCH_CHANGE_KEY`: What counts as a change (address, address_and_location)
//
// ### Storage
// - `IPWATCH_STATE_STORE_TYPE`: Type of state store (file, memory)
// - `IPWATCH_STATE_PATH`: Path to state file (for file store)
// - `IPWATCH_EVENT_LOG_TYPE`: Type of event log (sqlite, memory)
// - `IPWATCH_EVENT_DB_PATH`: Path to event database (for sqlite log)
//
// ### Mail
// - `IPWATCH_SMTP_HOST`: Relay hostname
// - `IPWATCH_SMTP_PORT`: SMTPS port (default 465)
// - `IPWATCH_SMTP_USERNAME`: Relay username
// - `IPWATCH_SMTP_PASSWORD`: Relay password
// - `IPWATCH_SMTP_FROM`: From address
// - `IPWATCH_RECIPIENTS`: Comma-separated recipient list
//
// ### Logging
// - `IPWATCH_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export IPWATCH_STATE_STORE_TYPE=file
// export IPWATCH_STATE_PATH=/var/lib/ipwatch/state.json
// export IPWATCH_EVENT_LOG_TYPE=sqlite
// export IPWATCH_EVENT_DB_PATH=/var/lib/ipwatch/events.db
// export IPWATCH_SMTP_HOST=smtp.fastmail.com
// export IPWATCH_SMTP_USERNAME=monitor@example.com
// export IPWATCH_SMTP_PASSWORD=app_password
// export IPWATCH_SMTP_FROM=ip-monitor@example.com
// export IPWATCH_RECIPIENTS=ops@example.com
//
// ipwatchd
// ```

use anyhow::Result;
use clap::Parser;
use std::env;
use std::process::ExitCode;
use tracing::{Level, debug, error, info};
use tracing_subscriber::FmtSubscriber;

use ipwatch_core::config::{
    EngineConfig, EventLogConfig, MonitorConfig, ResolverConfig, RetryConfig, ScheduleConfig,
    StateStoreConfig,
};
use ipwatch_core::traits::{EventLog, StateStore};
use ipwatch_core::{
    ChangeKey, MemoryEventLog, MemoryStateStore, MonitorEngine, Scheduler, TickOutcome,
};
use ipwatch_log_sqlite::SqliteEventLog;
use ipwatch_notify_smtp::{SmtpConfig, SmtpNotifier};
use ipwatch_resolver_http::HttpAddressSource;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum IpwatchExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<IpwatchExitCode> for ExitCode {
    fn from(code: IpwatchExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Public IP change monitoring daemon
#[derive(Debug, Parser)]
#[command(name = "ipwatchd", version, about)]
struct Cli {
    /// Run one check immediately and exit instead of starting the scheduler
    #[arg(long)]
    run_now: bool,
}

/// Application configuration
struct Config {
    resolver_url: String,
    request_timeout_secs: u64,
    max_attempts: u32,
    backoff_base_secs: u64,
    check_interval_secs: u64,
    digest_cron: String,
    digest_window_days: u32,
    change_key: String,
    state_store_type: String,
    state_path: Option<String>,
    event_log_type: String,
    event_db_path: Option<String>,
    smtp_host: String,
    smtp_port: u16,
    smtp_username: String,
    smtp_password: String,
    smtp_from: String,
    recipients: Vec<String>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            resolver_url: env::var("IPWATCH_RESOLVER_URL")
                .unwrap_or_else(|_| "https://api.ipify.org?format=json".to_string()),
            request_timeout_secs: parse_env("IPWATCH_REQUEST_TIMEOUT_SECS", 10)?,
            max_attempts: parse_env("IPWATCH_MAX_ATTEMPTS", 5)?,
            backoff_base_secs: parse_env("IPWATCH_BACKOFF_BASE_SECS", 1)?,
            check_interval_secs: parse_env("IPWATCH_CHECK_INTERVAL_SECS", 300)?,
            digest_cron: env::var("IPWATCH_DIGEST_CRON")
                .unwrap_or_else(|_| "0 8 * * 1".to_string()),
            digest_window_days: parse_env("IPWATCH_DIGEST_WINDOW_DAYS", 7)?,
            change_key: env::var("IPWATCH_CHANGE_KEY").unwrap_or_else(|_| "address".to_string()),
            state_store_type: env::var("IPWATCH_STATE_STORE_TYPE")
                .unwrap_or_else(|_| "file".to_string()),
            state_path: env::var("IPWATCH_STATE_PATH").ok(),
            event_log_type: env::var("IPWATCH_EVENT_LOG_TYPE")
                .unwrap_or_else(|_| "sqlite".to_string()),
            event_db_path: env::var("IPWATCH_EVENT_DB_PATH").ok(),
            smtp_host: env::var("IPWATCH_SMTP_HOST").unwrap_or_default(),
            smtp_port: parse_env("IPWATCH_SMTP_PORT", 465)?,
            smtp_username: env::var("IPWATCH_SMTP_USERNAME").unwrap_or_default(),
            smtp_password: env::var("IPWATCH_SMTP_PASSWORD").unwrap_or_default(),
            smtp_from: env::var("IPWATCH_SMTP_FROM").unwrap_or_default(),
            recipients: env::var("IPWATCH_RECIPIENTS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            log_level: env::var("IPWATCH_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration with actionable messages.
    ///
    /// Structural validation (cron syntax, retry bounds, URL scheme) happens
    /// again inside the engine; this catches the environment-level mistakes
    /// and names the variable to fix.
    fn validate(&self) -> Result<()> {
        if !self.resolver_url.starts_with("https://") && !self.resolver_url.starts_with("http://")
        {
            anyhow::bail!(
                "IPWATCH_RESOLVER_URL must use HTTP or HTTPS scheme. Got: {}",
                self.resolver_url
            );
        }

        if self.max_attempts == 0 || self.max_attempts > 10 {
            anyhow::bail!(
                "IPWATCH_MAX_ATTEMPTS must be between 1 and 10. Got: {}",
                self.max_attempts
            );
        }

        if !(10..=86400).contains(&self.check_interval_secs) {
            anyhow::bail!(
                "IPWATCH_CHECK_INTERVAL_SECS must be between 10 and 86400 seconds. Got: {}",
                self.check_interval_secs
            );
        }

        match self.change_key.as_str() {
            "address" | "address_and_location" => {}
            other => anyhow::bail!(
                "IPWATCH_CHANGE_KEY '{}' is not supported. \
                Supported keys: address, address_and_location",
                other
            ),
        }

        match self.state_store_type.as_str() {
            "file" => {
                if self.state_path.as_ref().is_none_or(|p| p.is_empty()) {
                    anyhow::bail!(
                        "IPWATCH_STATE_PATH is required when IPWATCH_STATE_STORE_TYPE=file. \
                        Set it via: export IPWATCH_STATE_PATH=/var/lib/ipwatch/state.json"
                    );
                }
            }
            "memory" => {}
            other => anyhow::bail!(
                "IPWATCH_STATE_STORE_TYPE '{}' is not supported. \
                Supported types: file, memory",
                other
            ),
        }

        match self.event_log_type.as_str() {
            "sqlite" => {
                if self.event_db_path.as_ref().is_none_or(|p| p.is_empty()) {
                    anyhow::bail!(
                        "IPWATCH_EVENT_DB_PATH is required when IPWATCH_EVENT_LOG_TYPE=sqlite. \
                        Set it via: export IPWATCH_EVENT_DB_PATH=/var/lib/ipwatch/events.db"
                    );
                }
            }
            "memory" => {}
            other => anyhow::bail!(
                "IPWATCH_EVENT_LOG_TYPE '{}' is not supported. \
                Supported types: sqlite, memory",
                other
            ),
        }

        if self.smtp_host.is_empty() {
            anyhow::bail!(
                "IPWATCH_SMTP_HOST is required. \
                Set it via: export IPWATCH_SMTP_HOST=smtp.fastmail.com"
            );
        }
        if self.smtp_username.is_empty() || self.smtp_password.is_empty() {
            anyhow::bail!(
                "IPWATCH_SMTP_USERNAME and IPWATCH_SMTP_PASSWORD are both required \
                for authenticated submission"
            );
        }
        if self.smtp_from.is_empty() {
            anyhow::bail!(
                "IPWATCH_SMTP_FROM is required. \
                Set it via: export IPWATCH_SMTP_FROM=ip-monitor@example.com"
            );
        }
        if self.recipients.is_empty() {
            anyhow::bail!(
                "IPWATCH_RECIPIENTS must contain at least one address. \
                Set it via: export IPWATCH_RECIPIENTS=ops@example.com"
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => anyhow::bail!(
                "IPWATCH_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                other
            ),
        }

        Ok(())
    }

    fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            resolver: ResolverConfig {
                url: self.resolver_url.clone(),
                request_timeout_secs: self.request_timeout_secs,
                retry: RetryConfig {
                    max_attempts: self.max_attempts,
                    backoff_base_secs: self.backoff_base_secs,
                },
            },
            state_store: match (self.state_store_type.as_str(), &self.state_path) {
                ("file", Some(path)) => StateStoreConfig::File { path: path.clone() },
                _ => StateStoreConfig::Memory,
            },
            event_log: match (self.event_log_type.as_str(), &self.event_db_path) {
                ("sqlite", Some(path)) => EventLogConfig::Sqlite { path: path.clone() },
                _ => EventLogConfig::Memory,
            },
            recipients: self.recipients.clone(),
            change_key: match self.change_key.as_str() {
                "address_and_location" => ChangeKey::AddressAndLocation,
                _ => ChangeKey::Address,
            },
            schedule: ScheduleConfig {
                check_interval_secs: self.check_interval_secs,
                digest_cron: self.digest_cron.clone(),
                digest_window_days: self.digest_window_days,
            },
            engine: EngineConfig::default(),
        }
    }

    fn smtp_config(&self) -> SmtpConfig {
        SmtpConfig {
            host: self.smtp_host.clone(),
            port: self.smtp_port,
            username: self.smtp_username.clone(),
            password: self.smtp_password.clone(),
            from: self.smtp_from.clone(),
            recipients: self.recipients.clone(),
        }
    }
}

/// Read and parse an environment variable, failing loudly on garbage.
fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: '{}'", name, raw)),
        Err(_) => Ok(default),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return IpwatchExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return IpwatchExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return IpwatchExitCode::ConfigError.into();
    }

    info!("Starting ipwatchd");

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return IpwatchExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config, cli.run_now).await {
            error!("Daemon error: {}", e);
            IpwatchExitCode::RuntimeError
        } else {
            IpwatchExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Wire up the components and run.
async fn run_daemon(config: Config, run_now: bool) -> Result<()> {
    let monitor_config = config.monitor_config();

    let source = HttpAddressSource::from_config(&monitor_config.resolver)?;

    let state_store: Box<dyn StateStore> = match &monitor_config.state_store {
        StateStoreConfig::File { path } => {
            info!(path, "using file state store");
            Box::new(ipwatch_core::FileStateStore::new(path).await?)
        }
        StateStoreConfig::Memory => {
            info!("using in-memory state store (every restart is a first run)");
            Box::new(MemoryStateStore::new())
        }
    };

    let event_log: Box<dyn EventLog> = match &monitor_config.event_log {
        EventLogConfig::Sqlite { path } => Box::new(SqliteEventLog::open(path).await?),
        EventLogConfig::Memory => {
            info!("using in-memory event log (history is not persistent)");
            Box::new(MemoryEventLog::new())
        }
    };

    let notifier = Box::new(SmtpNotifier::new(&config.smtp_config())?);

    let (engine, mut engine_events) = MonitorEngine::new(
        Box::new(source),
        state_store,
        event_log,
        notifier,
        &monitor_config,
    )?;

    // Drain engine events so the channel never fills
    tokio::spawn(async move {
        while let Some(event) = engine_events.recv().await {
            debug!(?event, "engine event");
        }
    });

    if run_now {
        info!("--run-now: running one check and exiting");
        let outcome = engine.run_check().await?;
        match outcome {
            TickOutcome::NoChange { address } => {
                info!(%address, "no change");
            }
            TickOutcome::ChangedAndNotified { event, report } => {
                info!(
                    event_id = event.id,
                    address = %event.address,
                    delivered = report.delivered.len(),
                    "change committed and notified"
                );
            }
            TickOutcome::ChangedNotifyFailed { event, error } => {
                error!(
                    event_id = event.id,
                    address = %event.address,
                    error,
                    "change committed but notification failed"
                );
            }
        }
        engine.flush().await?;
        return Ok(());
    }

    let (scheduler, _handle) = Scheduler::new(engine, &monitor_config.schedule)?;

    // Translate process signals into the scheduler's shutdown channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        match wait_for_shutdown().await {
            Ok(signal) => {
                info!("Received shutdown signal: {}", signal);
                let _ = shutdown_tx.send(());
            }
            Err(e) => {
                error!("Failed to wait for shutdown signal: {}", e);
            }
        }
    });

    scheduler.run_with_shutdown(Some(shutdown_rx)).await?;

    info!("Shutdown complete");
    Ok(())
}

/// Wait for SIGTERM or SIGINT.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let signal = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(signal)
}

/// Wait for CTRL-C. Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
