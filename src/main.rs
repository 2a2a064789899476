use anyhow::Context as _;
use clap::Parser;
use commonui_controller::config::LogFormat;
use commonui_controller::operator::Controller;
use commonui_controller::Config;
use kube::Client;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(config.log_format);

    info!(version = env!("CARGO_PKG_VERSION"), "commonui-controller starting");

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    Controller::new(client, config).await
}
