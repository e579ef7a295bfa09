//! Terminal kiosk that keeps the current attendance QR code on screen.
//!
//! KIOSK_API_URL=http://localhost:8080/api KIOSK_TOKEN=<hr token> cargo run --bin qr_kiosk

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use dotenvy::dotenv;
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::EnvFilter;

use hrm_attendance::controller::{
    ControllerConfig, ControllerSnapshot, ControllerState, DisplayMode, HttpQrSource,
    QrController,
};
use hrm_attendance::qr::render::unicode_block;

struct KioskConfig {
    api_url: String,
    token: String,
    mode: DisplayMode,
    poll_every: Duration,
}

impl KioskConfig {
    fn from_env() -> Result<Self> {
        let api_url = env::var("KIOSK_API_URL").context("KIOSK_API_URL must be set")?;
        let token = env::var("KIOSK_TOKEN").context("KIOSK_TOKEN must be set")?;

        let duration = match env::var("KIOSK_DURATION") {
            Ok(raw) => Some(
                raw.trim()
                    .parse::<u32>()
                    .with_context(|| format!("KIOSK_DURATION has an invalid value '{}'", raw))?,
            ),
            Err(_) => None,
        };

        let mode_name = env::var("KIOSK_MODE").unwrap_or_else(|_| "rotating".to_string());
        let mode = match mode_name.trim().to_ascii_lowercase().as_str() {
            "rotating" => DisplayMode::Rotating {
                minutes: duration.unwrap_or(1),
            },
            "static" => DisplayMode::Static {
                hours: duration.unwrap_or(24),
            },
            "off" => DisplayMode::Off,
            other => bail!("KIOSK_MODE must be rotating, static or off, got '{}'", other),
        };

        let poll_secs = match env::var("KIOSK_POLL_SECS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("KIOSK_POLL_SECS has an invalid value '{}'", raw))?,
            Err(_) => 60,
        };

        Ok(Self {
            api_url,
            token,
            mode,
            poll_every: Duration::from_secs(poll_secs.max(1)),
        })
    }
}

fn draw(snapshot: &ControllerSnapshot) {
    // clear screen, cursor home
    print!("\x1b[2J\x1b[H");

    match &snapshot.state {
        ControllerState::Idle => println!("Waiting for a QR code..."),
        ControllerState::Rotated { .. } => println!("Refreshing QR code..."),
        ControllerState::Cleared => println!("QR code expired. Ask HR to generate a new one."),
        ControllerState::Displaying(session) | ControllerState::Expiring { session, .. } => {
            match unicode_block(&session.session_id) {
                Ok(block) => println!("{}", block),
                Err(e) => println!("Cannot render QR code: {}", e),
            }
            match &snapshot.state {
                ControllerState::Expiring { seconds_left, .. } => {
                    println!("Scan to check in. Refreshes in {}s", seconds_left)
                }
                _ => println!("Scan to check in. Valid until {}", session.expires_at),
            }
        }
    }

    if let Some(err) = &snapshot.last_error {
        println!("\n{}", err);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let file_appender = rolling::daily("logs", "kiosk.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(false)
        .with_target(false)
        .init();

    let config = KioskConfig::from_env()?;
    info!(api_url = %config.api_url, mode = ?config.mode, "Kiosk starting");

    let source = Arc::new(HttpQrSource::new(&config.api_url, &config.token)?);
    let controller = QrController::spawn(
        source,
        ControllerConfig {
            mode: config.mode,
            poll_every: config.poll_every,
            ..ControllerConfig::default()
        },
    );

    if config.mode == DisplayMode::Off {
        controller.subscribe().await?;
    } else if let Err(e) = controller.generate().await {
        // keep running: the poll may still pick up a code issued elsewhere
        error!(error = %e, "Initial QR generation failed");
        controller.subscribe().await?;
    }

    let mut updates = controller.watch();
    draw(&updates.borrow());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                draw(&updates.borrow_and_update());
            }
        }
    }

    controller.shutdown().await;
    println!();
    Ok(())
}
