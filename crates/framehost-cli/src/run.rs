//! Run command implementation.
//!
//! Plays the host: attaches a context, raises a frame callback at a fixed
//! rate followed by a frame-present event, and detaches on exit.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use framehost_core::{FrameDriver, HostConfig, HostContext, Job, Scheduler, SurfaceHandle};

use crate::colors;
use crate::logging;

/// Surface handle passed with every simulated present.
const SURFACE: SurfaceHandle = SurfaceHandle::from_raw(0x5f5f_0000);

pub struct RunOptions {
    pub config: PathBuf,
    pub modules: Vec<PathBuf>,
    pub runtime: Option<PathBuf>,
    pub frames: Option<u64>,
    pub fps: f64,
    pub verbose: bool,
}

pub async fn execute(options: RunOptions) -> anyhow::Result<()> {
    let period = frame_period(options.fps)?;

    let mut config = HostConfig::load_or_default(&options.config)?;
    if let Some(runtime) = options.runtime {
        config.runtime.library = Some(runtime);
    }

    let host = HostContext::builder().config(config).build();
    let queued = bring_up(&host, options.modules, options.verbose)?;
    tracing::info!("Queued {} modules", queued);

    let scheduler = Scheduler::from_config(Arc::clone(&host))?;
    let mut driver = FrameDriver::new(scheduler);

    let start = Instant::now();
    let result = drive(&mut driver, options.frames, period).await;
    let unloaded = driver.shutdown();
    let frames = result?;

    println!(
        "{}Ran{} {} frames in {:.2}s, unloaded {} modules",
        colors::GREEN,
        colors::RESET,
        frames,
        start.elapsed().as_secs_f64(),
        unloaded
    );
    Ok(())
}

/// Interval between frames at `fps`. Rejects rates whose period is zero or
/// does not fit in a `Duration`.
fn frame_period(fps: f64) -> anyhow::Result<Duration> {
    if !(fps.is_finite() && fps > 0.0) {
        anyhow::bail!("--fps must be a positive number, got {}", fps);
    }
    match Duration::try_from_secs_f64(1.0 / fps) {
        Ok(period) if !period.is_zero() => Ok(period),
        Ok(_) => anyhow::bail!("--fps {} is too high", fps),
        Err(e) => anyhow::bail!("--fps {} is too low: {}", fps, e),
    }
}

/// One-time bring-up on a background thread: install logging and queue the
/// modules to load. Returns how many Load jobs were queued.
fn bring_up(host: &Arc<HostContext>, extra: Vec<PathBuf>, verbose: bool) -> anyhow::Result<usize> {
    let host = Arc::clone(host);
    let handle = std::thread::Builder::new()
        .name("framehost-bringup".to_string())
        .spawn(move || -> anyhow::Result<usize> {
            logging::init_host(&host.config().log, verbose, host.log_layer())?;

            let mut queued = host.enqueue_configured_modules()?;
            for path in extra {
                host.enqueue(Job::Load(path));
                queued += 1;
            }
            Ok(queued)
        })
        .context("failed to spawn bring-up thread")?;

    handle
        .join()
        .map_err(|_| anyhow::anyhow!("bring-up thread panicked"))?
}

/// Raise frames until the limit is reached or Ctrl+C. Returns frames run.
async fn drive(
    driver: &mut FrameDriver,
    limit: Option<u64>,
    period: Duration,
) -> anyhow::Result<u64> {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut frames = 0;
    while limit.is_none_or(|limit| frames < limit) {
        tokio::select! {
            _ = &mut ctrl_c => {
                println!("\n{}Interrupted{}", colors::YELLOW, colors::RESET);
                break;
            }
            _ = interval.tick() => {
                driver.on_frame()?;
                driver.host().on_frame_present(SURFACE);
                frames += 1;
            }
        }
    }

    Ok(frames)
}
