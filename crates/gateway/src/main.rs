//! relaybot entry point.

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rb_gateway::cli::pid::PidFile;
use rb_gateway::cli::{load_config, resolve_config_path, Cli, Command, ConfigAction};
use rb_gateway::{api, bootstrap};

use rb_domain::config::ConfigSeverity;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_deref());

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config_path),
        Command::Config { action } => config_command(config_path, action),
    }
}

fn config_command(path: std::path::PathBuf, action: ConfigAction) -> anyhow::Result<()> {
    let config = load_config(&path)?;
    match action {
        ConfigAction::Validate => {
            let findings = config.validate();
            if findings.is_empty() {
                println!("{}: ok", path.display());
                return Ok(());
            }
            for finding in &findings {
                println!("{finding}");
            }
            let errors = findings
                .iter()
                .filter(|f| f.severity == ConfigSeverity::Error)
                .count();
            if errors > 0 {
                anyhow::bail!("{errors} error(s) in {}", path.display());
            }
            Ok(())
        }
        ConfigAction::Show => {
            let rendered = toml::to_string_pretty(&config).context("serializing config")?;
            print!("{rendered}");
            Ok(())
        }
    }
}

fn serve(config_path: std::path::PathBuf) -> anyhow::Result<()> {
    init_tracing();
    let config = load_config(&config_path)?;
    tracing::info!(path = %config_path.display(), "configuration loaded");

    let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
    runtime.block_on(run(config))
}

async fn run(config: rb_domain::config::Config) -> anyhow::Result<()> {
    let state = bootstrap::build_app_state(config)?;

    let _pid_file = match &state.config.server.pid_file {
        Some(path) => Some(PidFile::acquire(path)?),
        None => None,
    };

    bootstrap::spawn_background_tasks(&state);
    state
        .coordinator
        .start_listeners(state.dispatcher.clone())
        .await
        .context("starting platform listeners")?;

    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "control api listening");

    let app = api::router(state.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving control api")?;

    tracing::info!("shutting down");
    state.coordinator.stop().await;
    state.store.flush()?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("RELAYBOT_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}
