//! Background hostname resolution
//!
//! A dedicated worker thread performs blocking getaddrinfo lookups so the
//! event loop never stalls on DNS. Requests travel over a std mpsc channel
//! that the worker polls with a 500 ms timeout (which bounds shutdown
//! latency); results come back over a tokio channel the event loop selects
//! on. Results arrive in completion order, which for the single worker is
//! submission order.

use crate::error::{Error, Result};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// How long the worker sleeps between queue polls when idle
const IDLE_POLL: Duration = Duration::from_millis(500);

/// A queued lookup
#[derive(Debug, Clone)]
struct Lookup {
    token: u64,
    hostname: String,
    port: u16,
}

/// A completed lookup, delivered on the event-loop channel
#[derive(Debug)]
pub struct Resolved {
    /// Caller token passed to [`Resolver::queue`]
    pub token: u64,
    /// The hostname that was resolved
    pub hostname: String,
    /// First resolved address, or the failure
    pub result: Result<SocketAddr>,
}

/// Handle to the resolver worker thread
pub struct Resolver {
    tx: mpsc::Sender<Lookup>,
    quit: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Resolver {
    /// Spawn the worker; the returned receiver delivers completions
    pub fn spawn() -> Result<(Self, tokio::sync::mpsc::UnboundedReceiver<Resolved>)> {
        let (tx, rx) = mpsc::channel::<Lookup>();
        let (done_tx, done_rx) = tokio::sync::mpsc::unbounded_channel();
        let quit = Arc::new(AtomicBool::new(false));

        let worker_quit = Arc::clone(&quit);
        let handle = thread::Builder::new()
            .name("rrdpoll-resolver".to_string())
            .spawn(move || worker(&rx, &done_tx, &worker_quit))
            .map_err(|e| Error::transport_with_source("couldn't spawn resolver thread", e))?;

        Ok((
            Self {
                tx,
                quit,
                handle: Some(handle),
            },
            done_rx,
        ))
    }

    /// Enqueue a lookup and wake the worker
    ///
    /// Returns an error only when the worker is gone; the lookup outcome
    /// itself always arrives on the completion channel.
    pub fn queue(&self, token: u64, hostname: &str, port: u16) -> Result<()> {
        debug!(hostname, "resolving host");
        self.tx
            .send(Lookup {
                token,
                hostname: hostname.to_string(),
                port,
            })
            .map_err(|_| Error::resolve(hostname, "resolver worker is not running"))
    }

    /// Stop the worker: pending lookups are discarded, the thread joined
    pub fn shutdown(mut self) {
        self.quit.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("resolver worker panicked during shutdown");
            }
        }
    }
}

impl Drop for Resolver {
    fn drop(&mut self) {
        self.quit.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn worker(
    rx: &mpsc::Receiver<Lookup>,
    done: &tokio::sync::mpsc::UnboundedSender<Resolved>,
    quit: &AtomicBool,
) {
    loop {
        if quit.load(Ordering::SeqCst) {
            return;
        }
        match rx.recv_timeout(IDLE_POLL) {
            Ok(lookup) => {
                // Drain without resolving once shutdown has been requested
                if quit.load(Ordering::SeqCst) {
                    return;
                }
                let result = lookup_blocking(&lookup.hostname, lookup.port);
                let resolved = Resolved {
                    token: lookup.token,
                    hostname: lookup.hostname,
                    result,
                };
                if done.send(resolved).is_err() {
                    // Event loop is gone
                    return;
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => return,
        }
    }
}

/// The blocking getaddrinfo call (AF_UNSPEC, numeric service)
fn lookup_blocking(hostname: &str, port: u16) -> Result<SocketAddr> {
    let mut addrs = (hostname, port)
        .to_socket_addrs()
        .map_err(|e| Error::resolve(hostname, e.to_string()))?;

    // A lookup that succeeds with zero records counts as a timeout
    addrs
        .next()
        .ok_or_else(|| Error::resolve(hostname, "lookup returned no addresses"))
}
