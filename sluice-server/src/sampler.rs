use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use sluice_config::{ConfigError, StatsdConfig};
use sluice_log::LogError;
use sluice_metrics::MetricRegistry;

use crate::receive::{ReceiveStrategy, batched_receive_supported, select_strategy};
use crate::socket::{SocketOptions, bind_socket, reuse_port_supported, wake};
use crate::split::{SamplerContext, split_datagram};
use crate::stats::IngressCounters;

/// Upper bound for how long a blocked worker takes to notice a shutdown request.
const WAKE_INTERVAL: Duration = Duration::from_millis(500);

/// An error returned when a sampler cannot be started.
#[derive(Debug, thiserror::Error)]
pub enum SamplerError {
    /// The sampler configuration is out of bounds.
    #[error("invalid sampler configuration")]
    InvalidConfig(#[source] ConfigError),

    /// A socket could not be created, configured or bound.
    #[error("failed to set up socket for {addr}")]
    Socket {
        /// The address the socket was supposed to bind to.
        addr: SocketAddr,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread")]
    SpawnFailed(#[source] io::Error),
}

/// Returns `true` for receive errors that are retried without being reported.
fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// A receive loop running on its own thread.
struct Worker<R> {
    index: usize,
    socket: UdpSocket,
    strategy: Box<dyn ReceiveStrategy>,
    context: Arc<SamplerContext<R>>,
    shutdown: Arc<AtomicBool>,
}

impl<R: MetricRegistry> Worker<R> {
    fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    fn run(mut self) {
        let sampler = self.context.kind();
        let socket = self
            .socket
            .local_addr()
            .map_or_else(|_| "unknown".to_owned(), |addr| addr.to_string());

        sluice_log::info!(
            sampler,
            worker = self.index,
            syscall = self.strategy.syscall(),
            socket = %socket,
            "worker online"
        );

        while !self.is_shutting_down() {
            let count = match self.strategy.receive(&self.socket) {
                Ok(count) => count,
                Err(_) if self.is_shutting_down() => break,
                Err(error) if is_transient(&error) => continue,
                Err(error) => {
                    sluice_log::error!(
                        sampler,
                        worker = self.index,
                        error = %LogError(&error),
                        "failed read"
                    );
                    self.context.stats().dropped();
                    continue;
                }
            };

            for index in 0..count {
                let datagram = self.strategy.datagram(index);

                // Reads return empty once the socket was woken up for shutdown.
                if datagram.payload.is_empty() && self.shutdown.load(Ordering::Relaxed) {
                    break;
                }

                self.context.datagram_received();
                split_datagram(&self.context, datagram);
            }
        }

        sluice_log::debug!(sampler, worker = self.index, "worker offline");
    }
}

/// A statsd sampler: a pool of workers receiving datagrams from one UDP address.
///
/// Workers either share a single socket or, with `multisock`, each own a socket bound to the same
/// address with `SO_REUSEPORT`, letting the kernel balance datagrams between them.
///
/// Dropping the sampler shuts it down the same way as [`shutdown`](Self::shutdown).
pub struct StatsdSampler<R> {
    context: Arc<SamplerContext<R>>,
    sockets: Vec<UdpSocket>,
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl<R> StatsdSampler<R>
where
    R: MetricRegistry + 'static,
{
    /// Binds the sockets and starts all workers.
    ///
    /// Fails if the configuration is invalid, a socket cannot be bound or a worker cannot be
    /// spawned. Workers that were already running are stopped before returning the error.
    pub fn start(
        config: &StatsdConfig,
        registry: Arc<R>,
        stats: Arc<IngressCounters>,
    ) -> Result<Self, SamplerError> {
        config.validate().map_err(SamplerError::InvalidConfig)?;

        let mut batch_size = config.multimsg;
        if batch_size > 1 && !batched_receive_supported() {
            sluice_log::warn!(
                multimsg = batch_size,
                "batched receive is not supported on this platform, receiving one datagram per call"
            );
            batch_size = 1;
        }

        let mut multisock = config.multisock;
        if multisock && !reuse_port_supported() {
            sluice_log::warn!("SO_REUSEPORT is not supported on this platform, sharing one socket");
            multisock = false;
        }

        let options = SocketOptions {
            reuse_port: multisock,
            recv_buffer_size: config.recv_buffer_size,
            wake_interval: Some(WAKE_INTERVAL),
        };

        let addr = config.socket_addr();
        let socket_error = |addr| move |source| SamplerError::Socket { addr, source };

        let first = bind_socket(addr, &options).map_err(socket_error(addr))?;
        let local_addr = first.local_addr().map_err(socket_error(addr))?;

        // Further sockets bind the resolved address, so an ephemeral port is shared.
        let mut sockets = vec![first];
        if multisock {
            for _ in 1..config.workers {
                let socket = bind_socket(local_addr, &options).map_err(socket_error(local_addr))?;
                sockets.push(socket);
            }
        }

        let mut sampler = Self {
            context: Arc::new(SamplerContext::new("statsd", registry, stats)),
            sockets,
            local_addr,
            shutdown: Arc::new(AtomicBool::new(false)),
            workers: Vec::with_capacity(config.workers),
        };

        for index in 0..config.workers {
            let socket = sampler.sockets[index % sampler.sockets.len()]
                .try_clone()
                .map_err(socket_error(local_addr))?;

            let worker = Worker {
                index,
                socket,
                strategy: select_strategy(batch_size, config.max_packet_size),
                context: Arc::clone(&sampler.context),
                shutdown: Arc::clone(&sampler.shutdown),
            };

            let handle = thread::Builder::new()
                .name(format!("statsd-worker-{index}"))
                .spawn(move || worker.run())
                .map_err(SamplerError::SpawnFailed)?;

            sampler.workers.push(handle);
        }

        Ok(sampler)
    }
}

impl<R> StatsdSampler<R> {
    /// The sampler kind.
    pub fn kind(&self) -> &'static str {
        self.context.kind()
    }

    /// The address the sampler is bound to, with the ephemeral port resolved.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The number of running workers.
    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Number of datagrams received by this sampler.
    pub fn inflow(&self) -> u64 {
        self.context.inflow()
    }

    /// Stops all workers and waits for them to exit.
    ///
    /// Workers finish the datagrams they are currently splitting. Datagrams still queued in the
    /// kernel are not read.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if self.workers.is_empty() {
            return;
        }

        self.shutdown.store(true, Ordering::Relaxed);
        for socket in &self.sockets {
            wake(socket);
        }

        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                sluice_log::error!(sampler = self.context.kind(), "worker panicked");
            }
        }

        sluice_log::debug!(
            sampler = self.context.kind(),
            socket = %self.local_addr,
            "sampler stopped"
        );
    }
}

impl<R> Drop for StatsdSampler<R> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<R> std::fmt::Debug for StatsdSampler<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsdSampler")
            .field("kind", &self.kind())
            .field("local_addr", &self.local_addr)
            .field("workers", &self.workers.len())
            .finish()
    }
}
