use anyhow::{anyhow, Context};
use camino::Utf8PathBuf;
use clap::Parser;
use dropshot::{ConfigDropshot, ConfigLogging, ConfigLoggingLevel, HttpServerStarter};
use slidecount::counter::Counter;
use slidecount::persistence;
use slidecount::policy::Policy;
use slidecount::server::{self, ServerContext};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{event, Level};

#[derive(Debug, Clone, Parser)]
pub struct Args {
    /// Address the HTTP server listens on
    #[clap(long, default_value = "0.0.0.0:5000")]
    pub listen_address: SocketAddr,

    /// Requests older than this no longer count towards the total
    #[clap(long, alias = "persistence-time-interval", default_value = "60s")]
    pub window: humantime::Duration,

    /// Requests within the same multiple of this duration share a bucket
    #[clap(long, default_value = "1s")]
    pub precision: humantime::Duration,

    /// Where state is restored from on startup and saved to on shutdown
    #[clap(long, default_value = "persistence.bin")]
    pub persistence_file: Utf8PathBuf,

    /// How long a request waits on the counter before failing
    #[clap(long, default_value = "5s")]
    pub reply_timeout: humantime::Duration,

    #[clap(long, default_value_t = Level::INFO)]
    pub log_level: Level,

    /// Register DTrace USDT probes
    #[clap(long)]
    pub probes: bool,
}

fn dropshot_level(level: Level) -> ConfigLoggingLevel {
    match level {
        Level::TRACE => ConfigLoggingLevel::Trace,
        Level::DEBUG => ConfigLoggingLevel::Debug,
        Level::INFO => ConfigLoggingLevel::Info,
        Level::WARN => ConfigLoggingLevel::Warn,
        _ => ConfigLoggingLevel::Error,
    }
}

// Resolves once either SIGINT or SIGTERM arrives.
async fn shutdown_signal() -> anyhow::Result<()> {
    let mut terminate = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("waiting for SIGINT")?,
        _ = terminate.recv() => (),
    }
    Ok(())
}

/// Serves until `shutdown` resolves, then saves the counter's state.
async fn run<F>(args: &Args, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = anyhow::Result<()>>,
{
    let policy = Policy::new(args.window.into(), args.precision.into())
        .context("invalid counter configuration")?
        .with_reply_timeout(args.reply_timeout.into());

    // The state file stays on disk until the server is up, so failing to
    // start loses nothing.
    let state = persistence::restore(&args.persistence_file);
    let counter = Arc::new(Counter::new(policy, state));

    let config = ConfigDropshot {
        bind_address: args.listen_address,
        ..Default::default()
    };
    let log = ConfigLogging::StderrTerminal {
        level: dropshot_level(args.log_level),
    }
    .to_logger("slidecountd")
    .context("creating HTTP server logger")?;
    let server = HttpServerStarter::new(
        &config,
        server::api(),
        ServerContext::new(counter.clone()),
        &log,
    )
    .map_err(|e| anyhow!("failed to create HTTP server: {e}"))?
    .start();
    persistence::discard(&args.persistence_file);
    event!(Level::INFO, address = %server.local_addr(), "Serving");

    // The counter now holds the only copy of the state. It is saved however
    // serving ends.
    let served = shutdown.await;
    if let Err(err) = &served {
        event!(Level::ERROR, error = %err, "Failed waiting for shutdown");
    }
    event!(Level::INFO, "Shutting down");

    let closed = server
        .close()
        .await
        .map_err(|e| anyhow!("failed to stop HTTP server: {e}"));
    let state = counter
        .terminate()
        .await
        .context("terminating the counter")?;

    let stats = counter.stats();
    event!(
        Level::INFO,
        recorded = stats.recorded.load(Ordering::Relaxed),
        timed_out = stats.timed_out.load(Ordering::Relaxed),
        "Counter stopped"
    );

    persistence::save(&args.persistence_file, &state).context("saving state")?;
    served.and(closed)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_target(false)
        .init();

    if args.probes {
        usdt::register_probes().context("registering USDT probes")?;
    }

    run(&args, shutdown_signal()).await
}
