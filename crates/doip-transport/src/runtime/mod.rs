//! Tokio driver for the TCP handler
//!
//! ```text
//!  accept task ──Accepted──┐
//!  watcher per conn ─Readable─┤
//!  timer tasks ──TimerExpired─┼──> dispatch task (owns TcpHandler)
//!  TransmitHandle ──Transmit──┤
//!  DoIpServer::stop ─Shutdown─┘
//! ```
//!
//! The dispatch task is the only place the handler and its channels are
//! touched, so channel processing is strictly sequential. A watcher waits
//! for read readiness, posts one event, then waits until the dispatcher has
//! processed it before watching again.

mod socket;
mod timers;

pub use socket::TokioSocket;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::timer::TimerKey;
use crate::channel::ReadStatus;
use crate::config::DoIpConfig;
use crate::error::DoIpError;
use crate::tcp::TcpHandler;
use crate::uds::{ChannelId, HandlerId, TransmissionResult, UdsMessage, UdsTransportProtocolMgr};

use timers::TokioTimers;

/// Back-off after a failed accept, e.g. when out of file descriptors
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

pub(crate) enum Event {
    Accepted(TcpStream, SocketAddr),
    Readable { slot: usize, generation: u64 },
    TimerExpired(TimerKey),
    Transmit {
        message: UdsMessage,
        channel_id: ChannelId,
    },
    Shutdown,
}

/// Running DoIP TCP server
pub struct DoIpServer {
    local_addr: SocketAddr,
    handler_id: HandlerId,
    events: mpsc::UnboundedSender<Event>,
    mgr: Arc<dyn UdsTransportProtocolMgr>,
    acceptor: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

impl DoIpServer {
    /// Bind the configured address and start serving
    pub async fn start(
        config: DoIpConfig,
        handler_id: HandlerId,
        mgr: Arc<dyn UdsTransportProtocolMgr>,
    ) -> Result<Self, DoIpError> {
        config.validate()?;
        let bind_addr = SocketAddr::new(config.tcp.ip_address, config.tcp.port);
        let listener = TcpListener::bind(bind_addr).await?;
        let local_addr = listener.local_addr()?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let timers = Arc::new(TokioTimers::new(events_tx.clone()));
        let handler = TcpHandler::new(config, handler_id, Arc::clone(&mgr), timers.clone())?;

        let dispatcher = Dispatcher {
            connections: (0..handler.capacity()).map(|_| None).collect(),
            handler,
            timers,
            events: events_tx.clone(),
            mgr: Arc::clone(&mgr),
            next_generation: 0,
        };
        let dispatcher = tokio::spawn(dispatcher.run(events_rx));
        let acceptor = tokio::spawn(accept_loop(listener, events_tx.clone()));

        info!(%local_addr, handler_id, "DoIP server listening");
        Ok(Self {
            local_addr,
            handler_id,
            events: events_tx,
            mgr,
            acceptor,
            dispatcher,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handler_id(&self) -> HandlerId {
        self.handler_id
    }

    /// Cloneable handle for sending outbound UDS messages from any thread
    pub fn transmit_handle(&self) -> TransmitHandle {
        TransmitHandle {
            events: self.events.clone(),
            mgr: Arc::clone(&self.mgr),
        }
    }

    /// Close every connection and stop serving.
    ///
    /// The transport manager is told via `handler_stopped` once all channels
    /// are finalized.
    pub async fn stop(self) {
        self.acceptor.abort();
        if self.events.send(Event::Shutdown).is_ok() {
            if let Err(e) = self.dispatcher.await {
                warn!(%e, "Dispatcher ended abnormally");
            }
        }
        info!(handler_id = self.handler_id, "DoIP server stopped");
    }
}

/// Sender half for outbound UDS messages
#[derive(Clone)]
pub struct TransmitHandle {
    events: mpsc::UnboundedSender<Event>,
    mgr: Arc<dyn UdsTransportProtocolMgr>,
}

impl TransmitHandle {
    /// Queue `message` for the routing-active channel `channel_id`.
    ///
    /// The outcome is reported through `transmit_confirmation`. If the server
    /// already stopped, the failure is confirmed right away.
    pub fn transmit(&self, message: UdsMessage, channel_id: ChannelId) -> Result<(), DoIpError> {
        match self.events.send(Event::Transmit {
            message,
            channel_id,
        }) {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendError(event)) => {
                if let Event::Transmit { message, .. } = event {
                    self.mgr
                        .transmit_confirmation(message, TransmissionResult::TransmitFailed);
                }
                Err(DoIpError::ServerStopped)
            }
        }
    }
}

async fn accept_loop(listener: TcpListener, events: mpsc::UnboundedSender<Event>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(%peer, "Incoming connection");
                if events.send(Event::Accepted(stream, peer)).is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!(%e, "Accept failed");
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
            }
        }
    }
}

/// Post a readiness event, then wait for the dispatcher before watching again
async fn watch_readable(
    reader: Arc<OwnedReadHalf>,
    slot: usize,
    generation: u64,
    events: mpsc::UnboundedSender<Event>,
    rearm: Arc<Notify>,
) {
    loop {
        // an error is reported as readiness; the next read surfaces it
        let _ = reader.readable().await;
        if events.send(Event::Readable { slot, generation }).is_err() {
            return;
        }
        rearm.notified().await;
    }
}

struct Connection {
    generation: u64,
    peer: SocketAddr,
    rearm: Arc<Notify>,
    watcher: JoinHandle<()>,
}

struct Dispatcher {
    handler: TcpHandler<TokioSocket>,
    timers: Arc<TokioTimers>,
    events: mpsc::UnboundedSender<Event>,
    mgr: Arc<dyn UdsTransportProtocolMgr>,
    /// Live connection per channel slot
    connections: Vec<Option<Connection>>,
    next_generation: u64,
}

impl Dispatcher {
    async fn run(mut self, mut events: mpsc::UnboundedReceiver<Event>) {
        while let Some(event) = events.recv().await {
            match event {
                Event::Accepted(stream, peer) => self.on_accepted(stream, peer),
                Event::Readable { slot, generation } => self.on_readable(slot, generation),
                Event::TimerExpired(key) => {
                    self.timers.forget(key);
                    self.handler.on_timeout(key);
                }
                Event::Transmit {
                    message,
                    channel_id,
                } => {
                    if let Err(e) = self.handler.transmit(message, channel_id) {
                        debug!(%e, "Transmit failed");
                    }
                }
                Event::Shutdown => {
                    self.handler.shutdown();
                    self.reconcile();
                    self.timers.cancel_all();
                    self.mgr.handler_stopped(self.handler.handler_id());
                    return;
                }
            }
            self.reconcile();
        }
    }

    fn on_accepted(&mut self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, %e, "Failed to disable Nagle");
        }
        let socket = TokioSocket::new(stream, peer);
        let reader = socket.reader();

        match self.handler.on_accept(socket) {
            Ok(slot) => {
                self.next_generation += 1;
                let generation = self.next_generation;
                let rearm = Arc::new(Notify::new());
                let watcher = tokio::spawn(watch_readable(
                    reader,
                    slot,
                    generation,
                    self.events.clone(),
                    Arc::clone(&rearm),
                ));
                info!(%peer, slot, "Tester connected");
                self.connections[slot] = Some(Connection {
                    generation,
                    peer,
                    rearm,
                    watcher,
                });
            }
            Err(e) => warn!(%peer, %e, "Connection refused"),
        }
    }

    fn on_readable(&mut self, slot: usize, generation: u64) {
        let current = matches!(
            self.connections.get(slot),
            Some(Some(connection)) if connection.generation == generation
        );
        if !current {
            return;
        }
        if self.handler.on_readable(slot) != ReadStatus::Closed {
            if let Some(Some(connection)) = self.connections.get(slot) {
                connection.rearm.notify_one();
            }
        }
    }

    /// Drop connections whose channel let go of the socket
    fn reconcile(&mut self) {
        for (slot, entry) in self.connections.iter_mut().enumerate() {
            let attached = self
                .handler
                .channel(slot)
                .map_or(false, |channel| channel.has_socket());
            if attached {
                continue;
            }
            if let Some(connection) = entry.take() {
                connection.watcher.abort();
                info!(peer = %connection.peer, slot, "Tester disconnected");
            }
        }
    }
}
