//! Minimal single-threaded connection handling: a server thread that
//! accepts sockets and hands them to the worker through a [`RingArray`], and
//! a worker that runs a small non-blocking event loop and feeds every
//! request to the [`processor`].
//!
//! This is deliberately the least developed part of the crate — §1 names
//! "network acceptor/worker event loop" as an external collaborator out of
//! scope for the core design. What's here is just enough to drive the
//! engines and protocol codec end to end; a production accept loop would
//! likely reach for an epoll/kqueue reactor instead of the poll-and-sleep
//! loop below.

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::config::ServerConfig;
use crate::engine::Engine;
use crate::processor::process;
use crate::protocol::{compose, DoublingBuffer, ParseOutcome, Parser, Response};
use crate::ring::RingArray;
use crate::stats::Stats;

const POLL_IDLE_SLEEP: Duration = Duration::from_millis(2);

struct Connection {
    stream: TcpStream,
    parser: Parser,
    in_buf: DoublingBuffer,
    out_buf: DoublingBuffer,
    closing: bool,
}

impl Connection {
    fn new(stream: TcpStream, buf_init_size: usize, dbuf_max_power: u32) -> std::io::Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(Self {
            stream,
            parser: Parser::new(),
            in_buf: DoublingBuffer::new(buf_init_size, dbuf_max_power),
            out_buf: DoublingBuffer::new(buf_init_size, dbuf_max_power),
            closing: false,
        })
    }
}

/// Runs the worker's event loop: reads whatever is available from each
/// connection, drains every fully-formed request through the processor,
/// and flushes composed responses back out. Owns the engine exclusively —
/// engine calls here are never shared with another thread (§5).
pub struct Worker {
    connections: Vec<Connection>,
    engine: Engine,
    stats: Arc<Stats>,
    allow_flush: bool,
    buf_init_size: usize,
    dbuf_max_power: u32,
    start: Instant,
}

impl Worker {
    pub fn new(engine: Engine, stats: Arc<Stats>, config: &ServerConfig) -> Self {
        Self {
            connections: Vec::new(),
            engine,
            stats,
            allow_flush: config.allow_flush,
            buf_init_size: config.buf_init_size,
            dbuf_max_power: config.dbuf_max_power,
            start: Instant::now(),
        }
    }

    fn now(&self) -> u32 {
        self.start.elapsed().as_secs() as u32
    }

    fn accept(&mut self, stream: TcpStream) {
        match Connection::new(stream, self.buf_init_size, self.dbuf_max_power) {
            Ok(conn) => {
                Stats::bump(&self.stats.total_connections);
                self.stats.curr_connections.fetch_add(1, Ordering::Relaxed);
                self.connections.push(conn);
            }
            Err(e) => warn!("failed to configure accepted socket: {e}"),
        }
    }

    /// Drive every connection one non-blocking step. Returns the number of
    /// connections still open afterward.
    pub fn tick(&mut self, ring: &RingArray<TcpStream>) -> usize {
        while let Some(stream) = ring.pop() {
            self.accept(stream);
        }

        let now = self.now();
        for conn in &mut self.connections {
            Self::pump_reads(conn);
            Self::drain_requests(conn, &mut self.engine, &self.stats, self.allow_flush, now);
            Self::flush_writes(conn);
        }

        let before = self.connections.len();
        self.connections.retain(|c| !c.closing);
        let closed = before - self.connections.len();
        if closed > 0 {
            self.stats.curr_connections.fetch_sub(closed as u64, Ordering::Relaxed);
        }
        self.connections.len()
    }

    fn pump_reads(conn: &mut Connection) {
        conn.in_buf.compact();
        loop {
            if conn.in_buf.write_slot().is_empty() {
                if conn.in_buf.double().is_err() {
                    conn.closing = true; // buffer permanently full, can't make progress
                    return;
                }
                if conn.in_buf.write_slot().is_empty() {
                    return; // already at max_size with no room
                }
            }
            match conn.stream.read(conn.in_buf.write_slot()) {
                Ok(0) => {
                    conn.closing = true;
                    return;
                }
                Ok(n) => conn.in_buf.advance_write(n),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(_) => {
                    conn.closing = true;
                    return;
                }
            }
        }
    }

    fn drain_requests(conn: &mut Connection, engine: &mut Engine, stats: &Stats, allow_flush: bool, now: u32) {
        loop {
            match conn.parser.next_request(&mut conn.in_buf) {
                ParseOutcome::Unfinished => {
                    conn.in_buf.shrink();
                    return;
                }
                ParseOutcome::Invalid(msg) => {
                    let _ = compose(&Response::ClientError(msg.to_string()), &mut conn.out_buf);
                }
                ParseOutcome::Complete(req) => {
                    let result = process(engine, stats, allow_flush, now, req);
                    if compose(&result.response, &mut conn.out_buf).is_err() {
                        conn.closing = true;
                        return;
                    }
                    if result.close_connection {
                        conn.closing = true;
                    }
                }
            }
        }
    }

    fn flush_writes(conn: &mut Connection) {
        loop {
            let pending = conn.out_buf.unread();
            if pending.is_empty() {
                conn.out_buf.shrink();
                return;
            }
            match conn.stream.write(pending) {
                Ok(0) => {
                    conn.closing = true;
                    return;
                }
                Ok(n) => conn.out_buf.consume(n),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(_) => {
                    conn.closing = true;
                    return;
                }
            }
        }
    }

    /// Runs forever (until `running` is cleared), sleeping briefly whenever
    /// no connection made progress, matching §5's single suspension point
    /// at the event-loop wait.
    pub fn run(&mut self, ring: &RingArray<TcpStream>, running: &AtomicBool) {
        while running.load(Ordering::Relaxed) {
            self.tick(ring);
            std::thread::sleep(POLL_IDLE_SLEEP);
        }
    }
}

/// Accepts connections on `listener` and hands them to the worker via
/// `ring`, dropping (and counting) any connection the ring can't hold.
pub fn accept_loop(listener: TcpListener, ring: Arc<RingArray<TcpStream>>, stats: Arc<Stats>, running: &AtomicBool) {
    listener.set_nonblocking(true).expect("listener must support nonblocking mode");
    info!("accepting connections on {:?}", listener.local_addr());
    while running.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, _addr)) => {
                if let Err(returned) = ring.push(stream) {
                    Stats::bump(&stats.conn_dropped_ring_full);
                    drop(returned);
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(POLL_IDLE_SLEEP);
            }
            Err(e) => {
                warn!("accept failed: {e}");
                std::thread::sleep(POLL_IDLE_SLEEP);
            }
        }
    }
}
