use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod enroll;
mod proof;
mod records;
mod session;
mod store;
mod watch;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("truantd starting");

    let cfg = config::Config::from_env();
    let engine = engine::spawn_engine(cfg)?;

    let service = dbus_interface::MonitorService::new(engine);
    let _conn = zbus::connection::Builder::session()?
        .name("org.truant.Monitor1")?
        .serve_at("/org/truant/Monitor1", service)?
        .build()
        .await?;

    tracing::info!("truantd ready on org.truant.Monitor1");

    tokio::signal::ctrl_c().await?;
    tracing::info!("truantd shutting down");

    Ok(())
}
