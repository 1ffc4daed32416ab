use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use collectd_proxy::app::AppState;
use collectd_proxy::config::{Overrides, ProxyCfg};
use collectd_proxy::http::{self, HttpMetrics};
use collectd_proxy::metrics::AppMetrics;
use collectd_proxy::readiness::{start_backend_probe, Readiness};
use collectd_proxy::shutdown::{wait_for_signal, ShutdownCoordinator};
use collectd_proxy::sink::InfluxSink;

/// Forwards collectd write_http JSON reports to InfluxDB
#[derive(Parser, Debug)]
#[command(name = "collectd-proxy", version)]
struct Args {
    /// Extra configuration file, layered over ./proxy.toml
    #[arg(short, long)]
    config: Option<String>,

    /// Listen address, e.g. 0.0.0.0:5826
    #[arg(long)]
    http_bind: Option<String>,

    /// InfluxDB base URL
    #[arg(long)]
    influx_url: Option<String>,

    /// InfluxDB database name
    #[arg(long)]
    database: Option<String>,

    /// Print the resolved listen address and exit
    #[arg(long)]
    print_bind: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let overrides = Overrides {
        http_bind: args.http_bind,
        influx_url: args.influx_url,
        database: args.database,
    };
    let cfg = ProxyCfg::load(args.config, &overrides).context("failed to load configuration")?;
    cfg.validate()?;

    if args.print_bind {
        println!("{}", cfg.http.bind);
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    let cfg = Arc::new(cfg);
    let coordinator = ShutdownCoordinator::new(cfg.shutdown.grace_period());
    let ready = Arc::new(Readiness::new(coordinator.subscribe()));
    let sink = InfluxSink::new(&cfg.influx).context("failed to create InfluxDB client")?;
    if cfg.health.require_backend {
        start_backend_probe(&cfg.health, sink.clone(), ready.clone());
    }

    let state = AppState {
        cfg: cfg.clone(),
        ready,
        sink: Arc::new(sink),
        metrics: Arc::new(AppMetrics::new()?),
    };
    let http_metrics = cfg.diagnostics.enabled.then(HttpMetrics::install);
    let app = http::router(state, http_metrics);

    let listener = TcpListener::bind(cfg.http.bind)
        .await
        .with_context(|| format!("failed to bind {}", cfg.http.bind))?;
    let local = listener.local_addr()?;
    println!("listening on {local}");
    info!(
        addr = %local,
        influx = %cfg.influx.url,
        database = %cfg.influx.database,
        "collectd proxy started"
    );

    http::serve(listener, app, &coordinator, wait_for_signal())
        .await
        .context("shutdown did not complete cleanly")?;
    Ok(())
}
