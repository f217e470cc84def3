//! camquery — camera query & cache engine.
//!
//! Usage:
//!   camquery serve      --config config.toml                 # run the HTTP API
//!   camquery events     --config config.toml --cameras cam1,cam2
//!   camquery recordings --config config.toml --cameras cam1
//!   camquery seek       --config config.toml --camera cam1 \
//!                       --from 2026-02-19T14:00:00 --to 2026-02-19T15:00:00 \
//!                       --target 2026-02-19T14:30:00

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use camquery::api::{start_server, AppState};
use camquery::backend::HttpBackend;
use camquery::config::Config;
use camquery::engine::executor::CameraQueryEngine;
use camquery::engine::planner;
use camquery::media::Media;
use camquery::query::{EventQuery, Recording, RecordingQuery};

#[derive(Parser)]
#[command(name = "camquery", about = "Camera query & cache engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API backed by the query engine.
    Serve {
        /// Path to the TOML configuration file.
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
    /// Query recent events and print them.
    Events {
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
        /// Comma-separated camera IDs.
        #[arg(long)]
        cameras: String,
        /// Maximum events per sub-query.
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Query recordings and print them.
    Recordings {
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
        /// Comma-separated camera IDs.
        #[arg(long)]
        cameras: String,
    },
    /// Compute the stream seek offset for a moment within a recording.
    Seek {
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
        /// Camera ID.
        #[arg(long)]
        camera: String,
        /// Recording start (e.g. 2026-02-19T14:00:00).
        #[arg(long)]
        from: String,
        /// Recording end.
        #[arg(long)]
        to: String,
        /// Moment to seek to.
        #[arg(long)]
        target: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config } => {
            run_serve(config).await;
        }
        Command::Events { config, cameras, limit } => {
            run_events(config, &cameras, limit).await;
        }
        Command::Recordings { config, cameras } => {
            run_recordings(config, &cameras).await;
        }
        Command::Seek { config, camera, from, to, target } => {
            run_seek(config, &camera, &from, &to, &target).await;
        }
    }
}

fn load_config(path: &PathBuf) -> Config {
    match Config::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Failed to load config");
            std::process::exit(1);
        }
    }
}

fn build_engine(cfg: &Config) -> CameraQueryEngine {
    let backend = Arc::new(HttpBackend::new(&cfg.instances));
    CameraQueryEngine::new(backend, cfg.camera_map(), &cfg.engine)
}

fn parse_cli_time(value: &str, field: &str) -> DateTime<Utc> {
    match NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        Ok(dt) => dt.and_utc(),
        Err(e) => {
            error!(field, error = %e, "Invalid time, use format 2026-02-19T14:00:00");
            std::process::exit(1);
        }
    }
}

async fn run_serve(config_path: PathBuf) {
    let cfg = load_config(&config_path);
    if !cfg.api.enabled {
        error!("API disabled in config, nothing to serve");
        std::process::exit(1);
    }

    info!(
        cameras = cfg.cameras.len(),
        instances = cfg.instances.len(),
        port = cfg.api.port,
        "Starting camquery"
    );

    let engine = build_engine(&cfg);
    let state = Arc::new(AppState { engine });
    let port = cfg.api.port;

    tokio::select! {
        _ = start_server(state.clone(), port) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received CTRL+C, shutting down…");
        }
    }
    state.engine.shutdown();
}

async fn run_events(config_path: PathBuf, cameras: &str, limit: Option<u32>) {
    let cfg = load_config(&config_path);
    let engine = build_engine(&cfg);

    let camera_ids: BTreeSet<String> = cameras
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    let base = EventQuery { limit, ..Default::default() };

    let Some(queries) = planner::plan_event_queries(engine.cameras(), &camera_ids, &base) else {
        println!("No event query possible for cameras: {cameras}");
        return;
    };

    for query in queries {
        match engine.execute_event_query(&query).await {
            Ok(Some(map)) => {
                for (_, result) in &map {
                    for event in result.events().unwrap_or(&[]) {
                        println!(
                            "{}  {}  {}  clip={} snapshot={}",
                            event.start_time.format("%Y-%m-%dT%H:%M:%S"),
                            event.camera_id,
                            event.label,
                            event.has_clip,
                            event.has_snapshot,
                        );
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                error!(error = %e, "Event query failed");
                std::process::exit(1);
            }
        }
    }
    engine.shutdown();
}

async fn run_recordings(config_path: PathBuf, cameras: &str) {
    let cfg = load_config(&config_path);
    let engine = build_engine(&cfg);

    let camera_ids: BTreeSet<String> = cameras
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    let base = RecordingQuery::default();

    let Some(query) = planner::plan_recording_query(&camera_ids, &base) else {
        println!("No recording query possible for cameras: {cameras}");
        return;
    };

    match engine.execute_recording_query(&query).await {
        Ok(Some(map)) => {
            for (_, result) in &map {
                for rec in result.recordings().unwrap_or(&[]) {
                    println!(
                        "{} — {}  {}  events={}",
                        rec.start_time.format("%Y-%m-%dT%H:%M"),
                        rec.end_time.format("%H:%M"),
                        rec.camera_id,
                        rec.events,
                    );
                }
            }
        }
        Ok(None) => println!("No recordings found."),
        Err(e) => {
            error!(error = %e, "Recording query failed");
            std::process::exit(1);
        }
    }
    engine.shutdown();
}

async fn run_seek(config_path: PathBuf, camera: &str, from: &str, to: &str, target: &str) {
    let cfg = load_config(&config_path);
    let engine = build_engine(&cfg);

    let from = parse_cli_time(from, "from");
    let to = parse_cli_time(to, "to");
    let target = parse_cli_time(target, "target");

    let Some(cam) = engine.cameras().get(camera).cloned() else {
        error!(camera, "Unknown camera");
        std::process::exit(1);
    };
    // Synthesized span; only the time bounds matter for seeking.
    let recording = Recording {
        camera_id: camera.to_string(),
        start_time: from,
        end_time: to,
        events: 0,
    };
    let media = Media::from_recording(&recording, &cam);

    match engine.get_media_seek_time(&media, target).await {
        Ok(Some(offset)) => println!("{offset:.3}"),
        Ok(None) => println!("No seekable position: target outside the recording or no segments."),
        Err(e) => {
            error!(error = %e, "Seek failed");
            std::process::exit(1);
        }
    }
    engine.shutdown();
}
