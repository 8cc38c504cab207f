//! Single-owner task for the one TCP connection to the vehicle.
//!
//! All mutation of connection state goes through one `tokio::select!` loop:
//! client requests arrive on an mpsc channel, the heartbeat fires on an
//! interval owned by the active connection, and socket reads/faults are
//! observed in the same loop. Dropping the per-connection struct closes the
//! socket and cancels the heartbeat, so teardown can never run twice and a
//! stale heartbeat can never touch a newer connection.

use std::time::Duration;

use bytes::Bytes;
use log::{debug, error, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use crate::codec::CommandSet;
use crate::types::{LinkConfig, LinkError, LinkStatus};

const REQUEST_CHANNEL_CAPACITY: usize = 32;
/// Bounded wait for the final stop command written on shutdown.
const SHUTDOWN_STOP_TIMEOUT: Duration = Duration::from_millis(500);

enum LinkRequest {
    Connect,
    Disconnect { reason: String },
    Send { payload: Bytes, source: String },
    Shutdown { done: oneshot::Sender<()> },
}

enum Event {
    Request(Option<LinkRequest>),
    HeartbeatDue,
    SocketRead(std::io::Result<usize>),
}

/// Live connection state. Exists iff the link is connected; dropping it
/// releases the socket and the heartbeat timer together.
struct Connection {
    stream: TcpStream,
    heartbeat: Interval,
    last_sent: Option<Bytes>,
    last_send_at: Option<Instant>,
}

/// Cloneable handle for talking to the link task.
#[derive(Clone)]
pub struct LinkHandle {
    req_tx: mpsc::Sender<LinkRequest>,
    status_rx: watch::Receiver<LinkStatus>,
}

impl LinkHandle {
    /// Request a connection attempt. Idempotent: while already connected the
    /// link re-emits its current status instead of reconnecting.
    pub async fn connect(&self) -> Result<(), LinkError> {
        self.req_tx
            .send(LinkRequest::Connect)
            .await
            .map_err(|_| LinkError::ChannelClosed)
    }

    /// Tear down the connection, reporting `reason` to status subscribers.
    /// Safe to call in any state.
    pub async fn disconnect(&self, reason: impl Into<String>) -> Result<(), LinkError> {
        self.req_tx
            .send(LinkRequest::Disconnect {
                reason: reason.into(),
            })
            .await
            .map_err(|_| LinkError::ChannelClosed)
    }

    /// Queue a command payload for the vehicle. The link applies debounce and
    /// de-duplication before writing; heartbeats bypass both.
    pub async fn send(&self, payload: Bytes, source: impl Into<String>) -> Result<(), LinkError> {
        self.req_tx
            .send(LinkRequest::Send {
                payload,
                source: source.into(),
            })
            .await
            .map_err(|_| LinkError::ChannelClosed)
    }

    /// Current status snapshot, for late-joining clients.
    pub fn status(&self) -> LinkStatus {
        self.status_rx.borrow().clone()
    }

    /// Subscribe to status transitions.
    pub fn subscribe(&self) -> watch::Receiver<LinkStatus> {
        self.status_rx.clone()
    }

    /// Stop the link task. If connected, a final stop command is written with
    /// a bounded wait before the socket is closed.
    pub async fn shutdown(&self) -> Result<(), LinkError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.req_tx
            .send(LinkRequest::Shutdown { done: done_tx })
            .await
            .map_err(|_| LinkError::ChannelClosed)?;
        let _ = done_rx.await;
        Ok(())
    }
}

pub struct VehicleLink {
    config: LinkConfig,
    commands: CommandSet,
    req_rx: mpsc::Receiver<LinkRequest>,
    status_tx: watch::Sender<LinkStatus>,
    conn: Option<Connection>,
}

impl VehicleLink {
    /// Spawn the link task and return its handle.
    pub fn spawn(config: LinkConfig, commands: CommandSet) -> (LinkHandle, JoinHandle<()>) {
        let (req_tx, req_rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        let (status_tx, status_rx) = watch::channel(LinkStatus::disconnected());
        let link = Self {
            config,
            commands,
            req_rx,
            status_tx,
            conn: None,
        };
        let task = tokio::spawn(link.run());
        (LinkHandle { req_tx, status_rx }, task)
    }

    async fn run(mut self) {
        let mut read_buf = [0u8; 1024];
        loop {
            let event = match self.conn.as_mut() {
                Some(conn) => tokio::select! {
                    req = self.req_rx.recv() => Event::Request(req),
                    _ = conn.heartbeat.tick() => Event::HeartbeatDue,
                    read = conn.stream.read(&mut read_buf) => Event::SocketRead(read),
                },
                None => Event::Request(self.req_rx.recv().await),
            };

            match event {
                Event::Request(Some(LinkRequest::Connect)) => self.handle_connect().await,
                Event::Request(Some(LinkRequest::Disconnect { reason })) => {
                    self.teardown(&reason);
                }
                Event::Request(Some(LinkRequest::Send { payload, source })) => {
                    self.send_command(payload, &source).await;
                }
                Event::Request(Some(LinkRequest::Shutdown { done })) => {
                    self.shutdown().await;
                    let _ = done.send(());
                    break;
                }
                Event::Request(None) => {
                    // All handles dropped; exit with the same safety stop.
                    self.shutdown().await;
                    break;
                }
                Event::HeartbeatDue => {
                    let heartbeat = self.commands.heartbeat();
                    self.send_command(heartbeat, "Heartbeat").await;
                }
                Event::SocketRead(Ok(0)) => self.teardown("Connection Closed by Car"),
                Event::SocketRead(Ok(n)) => {
                    // The car is treated as a write-mostly sink; replies are
                    // logged, not parsed.
                    debug!(
                        "data from vehicle: {}",
                        String::from_utf8_lossy(&read_buf[..n]).trim()
                    );
                }
                Event::SocketRead(Err(e)) => {
                    let reason = LinkError::Socket(e).to_string();
                    self.teardown(&reason);
                }
            }
        }
    }

    async fn handle_connect(&mut self) {
        if self.conn.is_some() {
            info!("connect requested while already connected; re-emitting status");
            self.publish(LinkStatus::connected());
            return;
        }

        info!(
            "connecting to vehicle at {}:{}",
            self.config.host, self.config.port
        );
        self.publish(LinkStatus::connecting());

        let stream = match self.try_connect().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("vehicle connect failed: {}", e);
                self.publish(LinkStatus::dropped(e.to_string()));
                return;
            }
        };

        // Socket options are best effort; refusal is logged, not fatal.
        if let Err(e) = stream.set_nodelay(true) {
            warn!("could not enable TCP_NODELAY: {}", e);
        }
        let keepalive = socket2::TcpKeepalive::new().with_time(Duration::from_secs(1));
        if let Err(e) = socket2::SockRef::from(&stream).set_tcp_keepalive(&keepalive) {
            warn!("could not enable TCP keepalive: {}", e);
        }

        // First tick lands one full interval after connect, matching a timer
        // started now rather than tokio's immediately-firing default.
        let mut heartbeat = time::interval_at(
            Instant::now() + self.config.heartbeat_interval,
            self.config.heartbeat_interval,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.conn = Some(Connection {
            stream,
            heartbeat,
            last_sent: None,
            last_send_at: None,
        });
        info!("connected to vehicle");

        // Safety default: the car must be stationary right after connecting.
        let stop = self.commands.stop();
        self.send_command(stop, "Initial Connection").await;

        // The initial stop may itself have failed and torn the link down;
        // only report connected if the connection survived it.
        if self.conn.is_some() {
            self.publish(LinkStatus::connected());
        }
    }

    async fn try_connect(&self) -> Result<TcpStream, LinkError> {
        let addr = (self.config.host.as_str(), self.config.port);
        match time::timeout(self.config.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(LinkError::Socket(e)),
            Err(_) => Err(LinkError::ConnectTimeout),
        }
    }

    async fn send_command(&mut self, payload: Bytes, source: &str) {
        let debounce = self.config.send_debounce;
        let heartbeat = self.commands.heartbeat();
        let stop = self.commands.stop();

        let write_failure = {
            let conn = match self.conn.as_mut() {
                Some(conn) => conn,
                None => {
                    warn!("cannot send command ({}): not connected to vehicle", source);
                    return;
                }
            };

            let is_heartbeat = payload == heartbeat;
            if !is_heartbeat {
                if let Some(at) = conn.last_send_at {
                    if at.elapsed() < debounce {
                        debug!("command debounced ({})", source);
                        return;
                    }
                }
                if conn.last_sent.as_ref() == Some(&payload) {
                    debug!("command unchanged ({}); skipping", source);
                    return;
                }
                // Keep the log quiet for heartbeats and repeated stops.
                if payload != stop || conn.last_sent.as_ref() != Some(&stop) {
                    info!(
                        "sending to vehicle ({}): {}",
                        source,
                        String::from_utf8_lossy(&payload).trim()
                    );
                }
            }

            match conn.stream.write_all(&payload).await {
                Ok(()) => {
                    conn.last_send_at = Some(Instant::now());
                    if !is_heartbeat {
                        conn.last_sent = Some(payload);
                    }
                    None
                }
                Err(e) => Some(e),
            }
        };

        if let Some(e) = write_failure {
            error!("error sending command to vehicle: {}", e);
            let reason = LinkError::SendFailure(e.to_string()).to_string();
            self.teardown(&reason);
        }
    }

    /// Release the connection (socket, heartbeat timer, last-command memory)
    /// and report the reason. A teardown without an active connection still
    /// re-emits status, which keeps explicit disconnect requests idempotent.
    fn teardown(&mut self, reason: &str) {
        if self.conn.take().is_some() {
            info!("disconnected from vehicle: {}", reason);
        } else {
            debug!("disconnect ({}) with no active connection", reason);
        }
        self.publish(LinkStatus::dropped(reason));
    }

    async fn shutdown(&mut self) {
        if let Some(conn) = self.conn.as_mut() {
            info!("sending final stop command before exit");
            let stop = self.commands.stop();
            match time::timeout(SHUTDOWN_STOP_TIMEOUT, conn.stream.write_all(&stop)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("final stop command failed: {}", e),
                Err(_) => warn!("final stop command did not complete in time"),
            }
        }
        self.conn = None;
        self.publish(LinkStatus::disconnected());
        info!("vehicle link stopped");
    }

    fn publish(&self, status: LinkStatus) {
        debug!("link status: {:?}", status);
        // Send can only fail when every receiver is gone; nothing to do then.
        let _ = self.status_tx.send(status);
    }
}
