mod comet;
mod config;
mod error;
mod host;
mod ipc;
mod registry;
mod scheduler;
mod starfield;
mod visibility;
mod wayland;

use clap::Parser;
use config::Config;
use error::AnimError;
use log::{error, info, warn};
use smithay_client_toolkit::reexports::calloop::{self, EventLoop};
use smithay_client_toolkit::reexports::calloop_wayland_source::WaylandSource;
use starfield::{Resolution, StarfieldUniforms, shader};
use wayland::{Backdrop, BackdropCommand};
use wayland_client::Connection;

/// Starfall - an animated starfield backdrop with a comet flyby for Wayland
#[derive(Parser, Debug)]
#[command(name = "starfall", version, about)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "~/.config/hypr/starfall.toml")]
    config: String,

    /// Run in verbose mode
    #[arg(short, long)]
    verbose: bool,

    /// Skip the comet flyby
    #[arg(long)]
    no_comet: bool,

    /// Render a single starfield frame on the CPU into a PPM file and exit
    #[arg(long, value_name = "PATH")]
    still: Option<String>,

    /// Size of the still image
    #[arg(long, value_name = "WxH", default_value = "1280x720", value_parser = parse_size)]
    still_size: (u32, u32),

    /// Animation time of the still image in seconds
    #[arg(long, value_name = "SECONDS", default_value_t = 0.0)]
    still_time: f32,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    info!("Starfall v{} starting", env!("CARGO_PKG_VERSION"));

    let config_path = shellexpand(&cli.config);
    let mut cfg = load_config(&config_path);
    if cli.no_comet {
        cfg.comet.enabled = false;
    }

    if let Some(ref path) = cli.still {
        let (width, height) = cli.still_size;
        match write_still(path, Resolution::new(width, height), cli.still_time, &cfg) {
            Ok(()) => info!("Wrote {}x{} starfield to {}", width, height, path),
            Err(e) => {
                error!("Failed to write {}: {}", path, e);
                std::process::exit(1);
            }
        }
        return;
    }

    if let Err(e) = run_daemon(cfg) {
        error!("{}", e);
        std::process::exit(1);
    }
    info!("Starfall shutting down");
}

/// Load and validate the config, falling back to defaults on any problem
fn load_config(path: &str) -> Config {
    let cfg = match Config::load(path) {
        Ok(c) => c,
        Err(AnimError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("No config at {}, using defaults", path);
            return Config::default();
        }
        Err(e) => {
            error!("Failed to load config from {}: {}", path, e);
            info!("Using default configuration");
            return Config::default();
        }
    };
    match cfg.validate() {
        Ok(()) => cfg,
        Err(e) => {
            error!("{}", e);
            info!("Using default configuration");
            Config::default()
        }
    }
}

/// Render the CPU reference starfield as a binary PPM
fn write_still(path: &str, resolution: Resolution, time: f32, cfg: &Config) -> Result<(), AnimError> {
    let star_phase = time * cfg.starfield.star_speed / 10.0;
    let uniforms = StarfieldUniforms::new(&cfg.starfield, resolution, time, star_phase);
    let pixels = shader::render_still(resolution.width, resolution.height, &uniforms);

    let mut out = format!("P6\n{} {}\n255\n", resolution.width, resolution.height).into_bytes();
    out.extend_from_slice(&pixels);
    std::fs::write(path, out)?;
    Ok(())
}

/// Run the daemon: Wayland host on the main thread, tokio IPC on a background thread
fn run_daemon(cfg: Config) -> Result<(), AnimError> {
    let conn = Connection::connect_to_env()
        .map_err(|e| AnimError::Wayland(format!("cannot connect to compositor: {}", e)))?;

    let mut event_loop: EventLoop<'static, Backdrop> = EventLoop::try_new()
        .map_err(|e| AnimError::Wayland(format!("failed to create event loop: {}", e)))?;
    let loop_handle = event_loop.handle();

    let (mut state, event_queue) = Backdrop::new(&conn, cfg.clone(), loop_handle.clone())?;

    // Insert Wayland event source into calloop
    WaylandSource::new(conn, event_queue)
        .insert(loop_handle.clone())
        .map_err(|e| AnimError::Wayland(format!("failed to insert Wayland source: {}", e.error)))?;

    // Commands from the tokio side
    let (calloop_tx, calloop_rx) = calloop::channel::channel::<BackdropCommand>();
    loop_handle
        .insert_source(calloop_rx, |event, _, state: &mut Backdrop| {
            if let calloop::channel::Event::Msg(cmd) = event {
                state.handle_command(cmd);
            }
        })
        .map_err(|e| AnimError::Wayland(format!("failed to insert command channel: {}", e.error)))?;

    spawn_ipc_thread(cfg, calloop_tx);

    // Run the calloop event loop on the main thread (Wayland requires this)
    info!("Starting Wayland event loop");
    while !state.exit {
        if let Err(e) = event_loop.dispatch(None, &mut state) {
            error!("Event loop error: {}", e);
            break;
        }
    }

    state.shutdown();
    Ok(())
}

/// Fullscreen tracking and signal handling on a tokio runtime
fn spawn_ipc_thread(cfg: Config, tx: calloop::channel::Sender<BackdropCommand>) {
    std::thread::spawn(move || {
        let rt = match tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                error!("Failed to create tokio runtime: {}", e);
                return;
            }
        };

        rt.block_on(async move {
            let shutdown_tx = tx.clone();
            let track = cfg.general.track_fullscreen;

            let tracker = async move {
                if track {
                    if let Err(e) = visibility::run_visibility_loop(cfg, tx).await {
                        warn!("Fullscreen tracking stopped: {}", e);
                    }
                } else {
                    info!("Fullscreen tracking disabled");
                }
                std::future::pending::<()>().await
            };

            tokio::select! {
                _ = tracker => {}
                res = tokio::signal::ctrl_c() => {
                    if let Err(e) = res {
                        warn!("Failed to listen for Ctrl+C: {}", e);
                        return;
                    }
                    info!("Interrupted");
                    let _ = shutdown_tx.send(BackdropCommand::Shutdown);
                }
            }
        });
    });
}

/// Largest edge accepted for a still image
const MAX_STILL_EDGE: u32 = 16384;

/// Parse `WIDTHxHEIGHT`
fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
    let w: u32 = w.trim().parse().map_err(|_| format!("bad width '{}'", w))?;
    let h: u32 = h.trim().parse().map_err(|_| format!("bad height '{}'", h))?;
    if w == 0 || h == 0 {
        return Err("size must be non-zero".to_string());
    }
    if w > MAX_STILL_EDGE || h > MAX_STILL_EDGE {
        return Err(format!("size must be at most {0}x{0}", MAX_STILL_EDGE));
    }
    Ok((w, h))
}

/// Expand ~ to home directory in paths
fn shellexpand(path: &str) -> String {
    if let Some(stripped) = path.strip_prefix("~/")
        && let Ok(home) = std::env::var("HOME")
    {
        return format!("{}/{}", home, stripped);
    }
    path.to_string()
}
