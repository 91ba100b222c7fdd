//! Cuckoo-engine-backed memcached ASCII server.

use std::net::TcpListener;
use std::panic;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
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

/// Fixed-footprint cuckoo-hashed cache, memcached ASCII protocol.
#[derive(Debug, ClapParser)]
#[command(name = "pelikan-cuckoo", version = pelikan_core::VERSION)]
struct Args {
    /// Configuration file (`name: value` lines).
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,
}

/// `EX_USAGE` from the BSD sysexits convention: malformed CLI invocation.
const EX_USAGE: i32 = 64;

fn main() -> Result<()> {
    panic::set_hook(Box::new(|info| {
        eprintln!("pelikan-cuckoo: fatal error");
        eprintln!("{info}");
    }));

    env_logger::init();
    let args = Args::try_parse().unwrap_or_else(|e| match e.kind() {
        clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => e.exit(),
        _ => {
            let _ = e.print();
            std::process::exit(EX_USAGE);
        }
    });

    let base = ServerConfig::default_cuckoo();
    let config = match &args.config {
        Some(path) => base.load_file(path).context("loading configuration")?,
        None => base,
    };

    info!("{} {} (cuckoo engine) starting on {config}", pelikan_core::NAME, pelikan_core::VERSION);

    let table = CuckooTable::new(CuckooConfig {
        slot_size: config.cuckoo.item_size,
        nslot: config.cuckoo.nitem,
        d: 2,
        displace_max: config.cuckoo.displace,
        policy: config.cuckoo.policy,
    });
    let engine = Engine::Cuckoo(table);
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
