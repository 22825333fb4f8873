use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::overlay;
use rollcall_session::{spawn_session, SessionConfig, SessionHandle};
use rollcall_video::{TestPatternProvider, V4lProvider, V4lSource, VideoProvider};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall live attendance client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an attendance session until interrupted
    Run {
        /// Recognition service endpoint (host:port); overrides ROLLCALL_ENDPOINT
        #[arg(short, long)]
        endpoint: Option<String>,
        /// Eligible intake (repeatable)
        #[arg(short, long = "intake", required = true)]
        intakes: Vec<String>,
        /// Eligible course (repeatable)
        #[arg(short, long = "course", required = true)]
        courses: Vec<String>,
        /// Capture device path, or "test" for the synthetic pattern
        #[arg(short, long, default_value = "/dev/video0")]
        device: String,
        /// Stop automatically after this many seconds
        #[arg(long)]
        duration_secs: Option<u64>,
        /// Write annotated preview snapshots into this directory
        #[arg(long)]
        snapshot_dir: Option<PathBuf>,
        /// Print the final roll and summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// List available V4L2 capture devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            endpoint,
            intakes,
            courses,
            device,
            duration_secs,
            snapshot_dir,
            json,
        } => {
            let mut cfg = SessionConfig::from_env();
            if let Some(endpoint) = endpoint {
                cfg.endpoint = endpoint;
            }
            let provider: Arc<dyn VideoProvider> = if device == "test" {
                Arc::new(TestPatternProvider)
            } else {
                Arc::new(V4lProvider {
                    device_path: device,
                })
            };
            run_session(cfg, provider, intakes, courses, duration_secs, snapshot_dir, json)
                .await?;
        }
        Commands::Devices => {
            let devices = V4lSource::list_devices();
            if devices.is_empty() {
                println!("no capture devices found");
            }
            for dev in devices {
                println!("{}\t{} ({})", dev.path, dev.name, dev.driver);
            }
        }
    }

    Ok(())
}

async fn run_session(
    cfg: SessionConfig,
    provider: Arc<dyn VideoProvider>,
    intakes: Vec<String>,
    courses: Vec<String>,
    duration_secs: Option<u64>,
    snapshot_dir: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    if let Some(dir) = &snapshot_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating snapshot directory {}", dir.display()))?;
    }

    let processing_width = cfg.processing_width;
    let render_interval = cfg.render_interval;
    let handle = spawn_session(cfg, provider);
    handle
        .start(intakes, courses)
        .await
        .context("starting session")?;
    eprintln!("session running; press Ctrl-C to stop");

    let deadline = duration_secs.map(Duration::from_secs);
    let started = tokio::time::Instant::now();
    let mut render = tokio::time::interval(render_interval);
    let mut snapshot_seq = 0u64;

    loop {
        let remaining = match deadline {
            Some(d) => match d.checked_sub(started.elapsed()) {
                Some(r) => r,
                None => break,
            },
            None => Duration::MAX,
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("interrupted; stopping session");
                break;
            }
            _ = tokio::time::sleep(remaining), if deadline.is_some() => break,
            _ = render.tick() => {
                // Bail out early if the session died (e.g. connection loss).
                let status = handle.status().await?;
                if status.state == rollcall_session::SessionState::Idle {
                    if let Some(err) = status.last_error {
                        eprintln!("session ended: {err}");
                    }
                    break;
                }
                if let Some(dir) = &snapshot_dir {
                    if let Err(e) = write_snapshot(&handle, processing_width, dir, snapshot_seq) {
                        tracing::warn!(error = %e, "snapshot write failed");
                    }
                    snapshot_seq += 1;
                }
            }
        }
    }

    handle.stop().await?;
    print_roll(&handle, json).await
}

/// Paint the latest tracker snapshot over the latest preview frame and
/// save it as a numbered JPEG.
fn write_snapshot(
    handle: &SessionHandle,
    processing_width: u32,
    dir: &Path,
    seq: u64,
) -> Result<()> {
    let Some(frame) = handle.preview().borrow().clone() else {
        return Ok(());
    };
    let tracks = handle.tracks().borrow().clone();
    let mut canvas = frame.to_image()?;
    let video = (frame.width, frame.height);
    let boxes = overlay::layout(&tracks, processing_width, video, video);
    overlay::paint(&mut canvas, &boxes);
    canvas.save(dir.join(format!("frame-{seq:06}.jpg")))?;
    Ok(())
}

async fn print_roll(handle: &SessionHandle, json: bool) -> Result<()> {
    let roll = handle.attendance_roll().await?;
    let summary = handle.summary().await?;

    if json {
        let out = serde_json::json!({
            "attendance": roll,
            "summary": summary,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if roll.is_empty() {
        println!("no attendance recorded");
        return Ok(());
    }
    println!("{:<12} {:<24} {:<28} first seen", "student", "name", "cohort");
    for entry in &roll {
        println!(
            "{:<12} {:<24} {:<28} {}",
            entry.student_id,
            entry.name,
            entry.intake_course_key,
            entry.first_seen.format("%H:%M:%S"),
        );
    }
    println!();
    for (cohort, count) in &summary {
        println!("{cohort}: {count} present");
    }
    Ok(())
}
