use color_eyre::{eyre::eyre, Result};
use frameloop::frame_source::IntervalFrameSource;
use frameloop::{AppConfig, LoopController};
use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tokio::task::LocalSet;
use tokio::time::sleep;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

const CONFIG_ENV: &str = "FRAMELOOP_CONFIG";

// Units per millisecond for the demo body
const VELOCITY: f64 = 0.05;
const TRACK_LENGTH: f64 = 100.0;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = setup().await?;

    // The frame source and the controller are !Send, so everything runs on a LocalSet
    LocalSet::new().run_until(run_demo(config)).await
}

async fn setup() -> Result<AppConfig> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;

    let path = std::env::var(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| AppConfig::default_path());
    let config = AppConfig::load_or_create(&path)
        .await
        .map_err(|e| eyre!("Failed to load configuration: {}", e))?;

    setup_logging(config.logging.level()?);
    info!("Using configuration from {}", path.display());
    Ok(config)
}

fn setup_logging(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .init();
}

async fn run_demo(config: AppConfig) -> Result<()> {
    let source = Rc::new(IntervalFrameSource::with_refresh_rate(
        config.display.refresh_rate_hz,
    ));
    let controller = LoopController::new(source, config.run_loop.clone())?;
    info!(
        "Dead-frame threshold: {:.2}ms",
        controller.allowed_overflow_threshold()
    );

    let position = Rc::new(Cell::new(0.0_f64));
    let direction = Rc::new(Cell::new(1.0_f64));

    let (pos, dir) = (position.clone(), direction.clone());
    controller.add_update_step(move |elapsed_ms| {
        let mut next = pos.get() + dir.get() * VELOCITY * elapsed_ms;
        if !(0.0..=TRACK_LENGTH).contains(&next) {
            dir.set(-dir.get());
            next = next.clamp(0.0, TRACK_LENGTH);
        }
        pos.set(next);
    });

    let frame = Rc::new(Cell::new(0_u64));
    let pos = position.clone();
    controller.add_render_step(move || {
        frame.set(frame.get() + 1);
        if frame.get() % 30 == 0 {
            debug!("frame {} position {:.1}", frame.get(), pos.get());
        }
    });

    controller.start();
    sleep(Duration::from_secs(1)).await;

    controller.pause();
    info!("Paused at {:.1}ms of loop time", controller.elapsed_ms());
    sleep(Duration::from_millis(500)).await;

    controller.start();
    sleep(Duration::from_secs(1)).await;
    controller.stop();

    let stats = controller.stats();
    info!(
        "Finished: {} frames processed, {} dropped, {:.1}ms loop time, position {:.1}",
        stats.frames_processed,
        stats.frames_dropped,
        controller.elapsed_ms(),
        position.get()
    );
    Ok(())
}
