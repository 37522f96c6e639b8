use clap::Parser;
mod app;
mod commands;
mod progress;
use commands::cli;
use opsbook_core::context::AppContext;
use opsbook_core::error;
use opsbook_plugins::factory::expand_config_paths;
use opsbook_plugins::services::PluginServicesFactory;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            exit_code_for_error(&e)
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, error::CliError> {
    let args = cli::Args::parse();
    let mut cfg = match args.config.as_deref() {
        Some(path) => opsbook_core::config::load_from_path(path),
        None => opsbook_core::config::load_default(),
    }
    .map_err(|e| error::CliError::Config(e.to_string()))?;
    expand_config_paths(&mut cfg);
    init_tracing(&cfg.logging).map_err(error::CliError::Command)?;

    let ctx = AppContext::new(cfg, Some(Arc::new(PluginServicesFactory))).await?;

    dispatch(args.command, ctx).await
}

fn exit_code_for_error(e: &error::CliError) -> i32 {
    // 0: success
    // 11: config error
    // 12: invalid runbook
    // 20: IO / store / lookup error
    // 50: internal/uncategorized
    match e {
        error::CliError::Config(_) => 11,
        error::CliError::Runbook(_) => 12,
        error::CliError::Document(de) => match de {
            error::DocumentError::Read { .. } => 20,
            error::DocumentError::Parse { .. } => 12,
            error::DocumentError::DuplicateScript(_) => 12,
        },
        error::CliError::Executor(ee) => match ee {
            error::ExecutorError::Validation { .. } => 12,
            error::ExecutorError::ExecutionNotFound(_) => 20,
            error::ExecutorError::Store(_) => 20,
            error::ExecutorError::Internal(_) => 50,
        },
        error::CliError::Store(_) => 20,
        error::CliError::Io(_) => 20,
        error::CliError::Command(_) => 20,
        error::CliError::Anyhow(_) => 50,
    }
}

async fn dispatch(cmd: cli::Commands, ctx: AppContext) -> Result<i32, error::CliError> {
    match cmd {
        cli::Commands::Run(run_args) => app::run_runbook(run_args, &ctx).await,
        cli::Commands::Validate(validate_args) => app::validate_runbook(validate_args),
        cli::Commands::Show(show_args) => app::show_execution(show_args, &ctx).await,
        cli::Commands::Fingerprint(fp_args) => app::fingerprint_stderr(fp_args).await,
        cli::Commands::Failures(failures_args) => app::list_failures(failures_args, &ctx).await,
    }
}

fn init_tracing(logging: &opsbook_core::config::LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let mut maybe_writer = None;

    if logging.file {
        let dir = match logging
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(d) => std::path::PathBuf::from(d),
            None => std::env::temp_dir().join("opsbook"),
        };

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let file_name = format!("opsbook.{}.log", std::process::id());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    if !logging.console && maybe_writer.is_none() {
        return Err("logging disabled for both console and file".to_string());
    }

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}
