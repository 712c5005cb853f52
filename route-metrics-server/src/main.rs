mod server;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use route_metrics::{logging, Config, HttpMetrics, MetricsOptions};

#[derive(Parser, Debug)]
#[command(name = "route-metrics-server")]
#[command(about = "Demo HTTP server instrumented with per-route Prometheus metrics", long_about = None)]
struct Args {
    /// Path to a YAML/TOML/JSON config file
    #[arg(long, env = "ROUTE_METRICS_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load configuration
    let config = Config::load(args.config.as_deref())?;

    // 2. Validate configuration (fail fast on misconfigurations)
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("Config validation error: {e}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    // 3. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("route-metrics-server starting...");

    // 4. Register request metrics; this is the one place the process-wide
    //    default registry is picked.
    let registry = prometheus::default_registry().clone();
    let metrics = HttpMetrics::new(
        MetricsOptions::from(&config.metrics).with_registry(registry.clone()),
    )?;
    info!(buckets = ?metrics.buckets(), "HTTP request metrics registered");

    // 5. Serve
    let router = server::build_router(metrics, registry, &config.server.metrics_path);
    server::serve(router, &config.http_address()).await
}
