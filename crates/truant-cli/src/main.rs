use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use truant_hw::{Camera, SourceAddr};

#[derive(Parser)]
#[command(name = "truant", about = "Truant monitor CLI — talks to truantd over D-Bus")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll an identity through the guided pose sequence
    Enroll {
        /// Roll number to enroll
        identity: String,
    },
    /// Abort an in-flight enrollment
    CancelEnroll,
    /// Start the surveillance session
    Start,
    /// Stop the surveillance session (wipes pending alerts)
    Stop,
    /// List pending alerts
    Alerts,
    /// Confirm a pending alert and record the truancy
    Mark {
        /// Roll number of the pending alert
        identity: String,
    },
    /// Discard a pending alert without recording it
    Dismiss {
        /// Roll number of the pending alert
        identity: String,
    },
    /// Show recent confirmed truancy records
    Records {
        /// Maximum records to show
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },
    /// Show daemon status
    Status,
    /// Run camera diagnostics (bypasses the daemon)
    Test {
        /// Video source to probe
        #[arg(default_value = "/dev/video0")]
        source: String,
    },
}

#[zbus::proxy(
    interface = "org.truant.Monitor1",
    default_service = "org.truant.Monitor1",
    default_path = "/org/truant/Monitor1"
)]
trait Monitor {
    async fn start_session(&self) -> zbus::Result<()>;
    async fn stop_session(&self) -> zbus::Result<()>;
    async fn enroll(&self, identity: &str) -> zbus::Result<u32>;
    async fn cancel_enroll(&self) -> zbus::Result<()>;
    async fn alerts(&self) -> zbus::Result<String>;
    async fn mark(&self, identity: &str) -> zbus::Result<bool>;
    async fn dismiss(&self, identity: &str) -> zbus::Result<bool>;
    async fn records(&self, limit: u32) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

async fn proxy() -> Result<MonitorProxy<'static>> {
    let conn = zbus::Connection::session()
        .await
        .context("failed to connect to the session bus")?;
    MonitorProxy::new(&conn)
        .await
        .context("truantd is not reachable on org.truant.Monitor1")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Enroll { identity } => {
            println!("Enrolling {identity} — follow the pose prompts at the camera.");
            let templates = proxy().await?.enroll(&identity).await?;
            println!("Enrolled {identity} with {templates} pose templates.");
        }
        Commands::CancelEnroll => {
            proxy().await?.cancel_enroll().await?;
            println!("Enrollment cancel requested.");
        }
        Commands::Start => {
            proxy().await?.start_session().await?;
            println!("Surveillance session started.");
        }
        Commands::Stop => {
            proxy().await?.stop_session().await?;
            println!("Surveillance session stopped; pending alerts cleared.");
        }
        Commands::Alerts => {
            let raw = proxy().await?.alerts().await?;
            print_alerts(&raw)?;
        }
        Commands::Mark { identity } => {
            if proxy().await?.mark(&identity).await? {
                println!("Marked {identity}: truancy recorded.");
            } else {
                println!("No pending alert for {identity}.");
            }
        }
        Commands::Dismiss { identity } => {
            if proxy().await?.dismiss(&identity).await? {
                println!("Dismissed alert for {identity}.");
            } else {
                println!("No pending alert for {identity}.");
            }
        }
        Commands::Records { limit } => {
            let raw = proxy().await?.records(limit).await?;
            print_records(&raw)?;
        }
        Commands::Status => {
            let raw = proxy().await?.status().await?;
            let status: serde_json::Value = serde_json::from_str(&raw)?;
            println!("truantd {}", status["version"].as_str().unwrap_or("?"));
            println!("  watching:       {}", status["watching"]);
            println!("  enrolled:       {}", status["enrolled"]);
            println!("  pending alerts: {}", status["pending_alerts"]);
        }
        Commands::Test { source } => {
            run_camera_test(&source)?;
        }
    }

    Ok(())
}

fn print_alerts(raw: &str) -> Result<()> {
    let alerts: Vec<serde_json::Value> = serde_json::from_str(raw)?;
    if alerts.is_empty() {
        println!("No pending alerts.");
        return Ok(());
    }
    for alert in alerts {
        println!(
            "{}  {}%  {}  {}",
            alert["identity"].as_str().unwrap_or("?"),
            alert["percent"],
            alert["detected_at"].as_str().unwrap_or("?"),
            alert["proof"].as_str().unwrap_or("?"),
        );
    }
    Ok(())
}

fn print_records(raw: &str) -> Result<()> {
    let records: Vec<serde_json::Value> = serde_json::from_str(raw)?;
    if records.is_empty() {
        println!("No truancy records.");
        return Ok(());
    }
    for record in records {
        println!(
            "#{}  {}  {}%  {}  {}",
            record["id"],
            record["identity"].as_str().unwrap_or("?"),
            record["percent"],
            record["detected_at"].as_str().unwrap_or("?"),
            record["proof"].as_str().unwrap_or("?"),
        );
    }
    Ok(())
}

/// Open the source directly and grab one frame — quick way to tell camera
/// trouble from daemon trouble.
fn run_camera_test(source: &str) -> Result<()> {
    let addr = SourceAddr::parse(source);
    println!("Opening {addr} ...");

    let camera = Camera::open(&addr).with_context(|| format!("cannot open {addr}"))?;
    println!("  negotiated {}x{}", camera.width, camera.height);

    let frame = camera.capture_frame().context("frame capture failed")?;
    println!(
        "  captured frame seq={} avg_brightness={:.1}",
        frame.sequence,
        frame.avg_brightness()
    );
    println!("Camera OK.");
    Ok(())
}
