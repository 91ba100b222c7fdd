//! Minimal liveness-check server: `ping\r\n` -> `PONG\r\n`. Carries a tiny
//! cuckoo table purely to satisfy [`Engine`]'s two-variant contract; no
//! storage command ever reaches it in practice.

use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use log::info;

use pelikan_core::config::ServerConfig;
use pelikan_core::cuckoo::{CuckooConfig, CuckooTable};
use pelikan_core::engine::Engine;
use pelikan_core::ring::{RingArray, DEFAULT_CAPACITY};
use pelikan_core::server::{accept_loop, Worker};
use pelikan_core::stats::Stats;

#[derive(Debug, ClapParser)]
#[command(name = "pelikan-ping", version = pelikan_core::VERSION)]
struct Args {
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,
}

/// `EX_USAGE` from the BSD sysexits convention: malformed CLI invocation.
const EX_USAGE: i32 = 64;

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::try_parse().unwrap_or_else(|e| match e.kind() {
        clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => e.exit(),
        _ => {
            let _ = e.print();
            std::process::exit(EX_USAGE);
        }
    });

    let base = ServerConfig::default_ping();
    let config = match &args.config {
        Some(path) => base.load_file(path).context("loading configuration")?,
        None => base,
    };

    info!("{} {} starting on {config}", pelikan_core::NAME, pelikan_core::VERSION);

    let engine = Engine::Cuckoo(CuckooTable::new(CuckooConfig {
        slot_size: 64,
        nslot: 1,
        d: 1,
        displace_max: 0,
        policy: pelikan_core::cuckoo::CuckooPolicy::Expire,
    }));
    let stats = Arc::new(Stats::default());

    let listener = TcpListener::bind((config.server_host.as_str(), config.server_port))
        .with_context(|| format!("binding {}:{}", config.server_host, config.server_port))?;
    let ring: Arc<RingArray<std::net::TcpStream>> = Arc::new(RingArray::new(DEFAULT_CAPACITY));
    let running = Arc::new(AtomicBool::new(true));

    {
        let ring = ring.clone();
        let stats = stats.clone();
        let running = running.clone();
        std::thread::spawn(move || accept_loop(listener, ring, stats, &running));
    }

    let mut worker = Worker::new(engine, stats, &config);
    worker.run(&ring, &running);
    Ok(())
}
