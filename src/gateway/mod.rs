//! # Gateway - UDP front end and frame pipeline
//!
//! ```text
//! UDP socket ──→ decode_datagram ──→ Dispatcher ──┬─→ PresenceTracker (observe)
//!     ↑                                           ├─→ MessageStore (job request / response)
//!     │                                           └─→ SquelchHandler
//!     │
//! writer task ←── Outbound channel ←── MessageStore (acks, forwards)
//!                                          ↑
//!                               retry scheduler task (tick)
//! ```
//!
//! [`Pipeline`] is everything after the socket and can be driven directly
//! with byte slices, which is how most tests use it. [`Gateway`] adds the
//! socket, the writer task and the retry scheduler.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use dectgw::config::Config;
//! use dectgw::gateway::Gateway;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let mut gateway = Gateway::bind(config).await?;
//!     gateway.run().await
//! }
//! ```

pub mod dispatch;
pub mod outbound;
pub mod presence;
pub mod scheduler;
pub mod squelch;
pub mod store;

use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::logutil::dump_document;
use crate::metrics;
use crate::protocol::{decode_datagram, template::Templates};
use dispatch::{Dispatcher, Disposition};
use outbound::{Outbound, OutgoingDatagram};
use presence::PresenceTracker;
use scheduler::{start_retry_scheduler, SchedulerHandle};
use squelch::SquelchHandler;
use store::{MessageStore, RetryPolicy};

const MAX_DATAGRAM: usize = 65_535;

/// Decoding and dispatch for inbound datagrams.
pub struct Pipeline {
    pub dispatcher: Dispatcher,
    pub store: MessageStore,
    pub presence: PresenceTracker,
    pub outbound: Outbound,
}

impl Pipeline {
    /// Wire up the handler chain: presence, message store, squelch.
    pub fn new(config: &Config, outbound: Outbound) -> Self {
        let presence = PresenceTracker::new();
        let templates = Templates::new(
            config.gateway.name.clone(),
            config.gateway.protocol_version.clone(),
        );
        let store = MessageStore::new(
            presence.clone(),
            outbound.clone(),
            templates,
            RetryPolicy::from(&config.queue),
        );

        let mut dispatcher = Dispatcher::new();
        dispatcher.register(Box::new(presence.clone()));
        dispatcher.register(Box::new(store.clone()));
        dispatcher.register(Box::new(SquelchHandler));

        Self {
            dispatcher,
            store,
            presence,
            outbound,
        }
    }

    /// Decode one datagram and dispatch every frame in it.
    ///
    /// Malformed documents are logged and skipped; they yield no entry.
    pub fn process_datagram(&mut self, data: &[u8], origin: SocketAddr) -> Vec<Disposition> {
        metrics::inc_datagrams_received();
        debug!("incoming datagram from: {} ({} bytes)", origin, data.len());
        self.outbound.note_origin(origin);

        let mut outcomes = Vec::new();
        for decoded in decode_datagram(data) {
            match decoded {
                Ok(frame) => {
                    metrics::inc_frames_decoded();
                    dump_document(log::Level::Debug, frame.raw());
                    outcomes.push(self.dispatcher.dispatch(&frame, origin));
                }
                Err(e) => {
                    metrics::inc_frames_rejected();
                    warn!("Dropping malformed document from {}: {}", origin, e);
                }
            }
        }
        outcomes
    }
}

/// The running service: socket, pipeline, writer and retry scheduler.
pub struct Gateway {
    config: Config,
    socket: Arc<UdpSocket>,
    pipeline: Pipeline,
    outgoing_rx: Option<mpsc::UnboundedReceiver<OutgoingDatagram>>,
}

impl Gateway {
    /// Bind the UDP socket described by `config.gateway`.
    ///
    /// Port 0 is accepted here (ephemeral port); the queue settings must be valid.
    pub async fn bind(config: Config) -> Result<Self> {
        config.queue.validate()?;
        let addr = config.gateway.listen_addr()?;
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| anyhow!("Failed to bind UDP socket on {}: {}", addr, e))?;
        debug!("UDP socket opened on {}", addr);
        let (outbound, outgoing_rx) = Outbound::channel();
        let pipeline = Pipeline::new(&config, outbound);
        Ok(Self {
            config,
            socket: Arc::new(socket),
            pipeline,
            outgoing_rx: Some(outgoing_rx),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn store(&self) -> &MessageStore {
        &self.pipeline.store
    }

    /// Run until Ctrl-C.
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Received shutdown signal");
        })
        .await
    }

    /// Run until `shutdown` completes.
    ///
    /// Queued messages and presence data live in memory only and are lost
    /// when this returns.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let outgoing_rx = self
            .outgoing_rx
            .take()
            .ok_or_else(|| anyhow!("gateway already ran"))?;
        let writer = spawn_writer(self.socket.clone(), outgoing_rx);
        let scheduler = start_retry_scheduler(
            self.pipeline.store.clone(),
            self.pipeline.presence.clone(),
            &self.config.queue,
        );

        info!(
            "Gateway '{}' listening on {} (retry every {}s, expire after {}s)",
            self.config.gateway.name,
            self.local_addr()?,
            self.config.queue.retry_interval_secs,
            self.config.queue.max_age_secs
        );

        tokio::pin!(shutdown);
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, origin)) => {
                            self.pipeline.process_datagram(&buf[..len], origin);
                        }
                        Err(e) => debug!("UDP socket: got exception: {}", e),
                    }
                }
                _ = &mut shutdown => break,
            }
        }

        self.shutdown(scheduler, writer).await;
        Ok(())
    }

    async fn shutdown(&mut self, scheduler: SchedulerHandle, writer: JoinHandle<()>) {
        if let Some(stats) = scheduler.snapshot().await {
            debug!("retry scheduler stats at shutdown: {:?}", stats);
        }
        scheduler.shutdown().await;
        writer.abort();
        let queued = self.pipeline.store.len();
        if queued > 0 {
            warn!("Shutting down with {} undelivered message(s) in queue", queued);
        }
        info!(
            "Gateway stopped; {} handset(s) known. metrics={}",
            self.pipeline.presence.len(),
            metrics::snapshot().to_log_line()
        );
    }
}

/// Drain the outbound channel onto the socket.
fn spawn_writer(
    socket: Arc<UdpSocket>,
    mut rx: mpsc::UnboundedReceiver<OutgoingDatagram>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(datagram) = rx.recv().await {
            debug!("Outgoing datagram to {}", datagram.dest);
            dump_document(log::Level::Debug, &datagram.payload);
            if let Err(e) = socket
                .send_to(datagram.payload.as_bytes(), datagram.dest)
                .await
            {
                metrics::inc_send_failures();
                warn!("Failed to send datagram to {}: {}", datagram.dest, e);
            }
        }
        debug!("writer task terminated");
    })
}
