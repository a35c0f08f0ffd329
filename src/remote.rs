//! Remote connection: this server as a client of an upstream server
//!
//! Presents the same shape to the router as a local driver: it owns
//! the devices learnt from upstream `def*` traffic, records the
//! upstream's snoop requests, and re-dials with a bounded backoff when
//! the link drops. A per-connection BLOB policy is pushed upstream for
//! every device as it is learnt, and liveness is enforced with an idle
//! window (probe with `getProperties`) and a response window (close
//! and reconnect).

use crate::comms::{queue_put, write_message, Shutdown};
use crate::error::{Error, Result};
use crate::framer::MessageReader;
use crate::message::{BlobPolicy, EnableBlob, GetProperties, ProtocolMessage};
use crate::server::{Ingress, Origin};
use crate::snoop::SnoopState;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Delay between reconnect attempts.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Probe the link with `getProperties` after this much silence.
const IDLE_TIMEOUT: Duration = Duration::from_secs(20);

/// Close and reconnect when a transmission stays unanswered this long.
const RESPOND_TIMEOUT: Duration = Duration::from_secs(40);

/// Configuration for one upstream INDI server link.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Upstream host
    pub host: String,
    /// Upstream port
    pub port: u16,
    /// BLOB policy requested from the upstream for its devices
    pub blob_policy: BlobPolicy,
    /// Log this link's XML traffic at DEBUG level
    pub debug_xml: bool,
}

impl RemoteConfig {
    /// Link to `host:port` with BLOBs off and XML logging off.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            blob_policy: BlobPolicy::Never,
            debug_xml: false,
        }
    }
}

/// The remote link; the router holds clones of its shared tables.
pub(crate) struct RemoteConnection {
    config: RemoteConfig,
    devices: Arc<Mutex<HashSet<String>>>,
    snoop: Arc<SnoopState>,
    connected: Arc<AtomicBool>,
}

impl RemoteConnection {
    pub(crate) fn new(config: RemoteConfig) -> Self {
        Self {
            config,
            devices: Arc::new(Mutex::new(HashSet::new())),
            snoop: Arc::new(SnoopState::new()),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn devices(&self) -> Arc<Mutex<HashSet<String>>> {
        Arc::clone(&self.devices)
    }

    pub(crate) fn snoop_state(&self) -> Arc<SnoopState> {
        Arc::clone(&self.snoop)
    }

    pub(crate) fn connected_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.connected)
    }

    /// Dial, serve, re-dial until shutdown.
    pub(crate) async fn run(
        self,
        mut inbox: mpsc::Receiver<ProtocolMessage>,
        ingress: mpsc::Sender<Ingress>,
        origin: Origin,
        shutdown: Shutdown,
    ) {
        let target = format!("{}:{}", self.config.host, self.config.port);
        while !shutdown.is_stopped() {
            match TcpStream::connect((self.config.host.as_str(), self.config.port)).await {
                Ok(stream) => {
                    info!("connected to remote {target}");
                    self.connected.store(true, Ordering::SeqCst);
                    self.devices.lock().expect("remote devices lock").clear();
                    let outcome = self
                        .serve(stream, &mut inbox, &ingress, origin, &shutdown)
                        .await;
                    self.connected.store(false, Ordering::SeqCst);
                    match outcome {
                        Ok(()) => break, // clean shutdown
                        Err(e) => warn!("remote {target} connection lost: {e}"),
                    }
                }
                Err(e) => warn!("remote {target} connect failed: {e}"),
            }
            if shutdown.is_stopped() {
                break;
            }
            debug!("re-dialling remote {target} in {RECONNECT_DELAY:?}");
            tokio::select! {
                _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                _ = shutdown.wait() => break,
            }
        }
        self.connected.store(false, Ordering::SeqCst);
        info!("remote {target} stopped");
    }

    async fn serve(
        &self,
        stream: TcpStream,
        inbox: &mut mpsc::Receiver<ProtocolMessage>,
        ingress: &mpsc::Sender<Ingress>,
        origin: Origin,
        shutdown: &Shutdown,
    ) -> Result<()> {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = MessageReader::new(read_half);
        let mut last_activity = Instant::now();

        // learn what the upstream hosts
        let hello = ProtocolMessage::GetProperties(GetProperties::new(None, None));
        write_message(&mut write_half, &hello).await?;
        let mut awaiting_reply: Option<Instant> = Some(Instant::now());

        let mut stop = shutdown.subscribe();
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = stop.recv() => return Ok(()),
                outbound = inbox.recv() => {
                    let Some(msg) = outbound else { return Ok(()) };
                    if self.config.debug_xml {
                        debug!("TX:: {}", msg.to_log_string());
                    }
                    write_message(&mut write_half, &msg).await?;
                    last_activity = Instant::now();
                    if awaiting_reply.is_none() && !matches!(msg, ProtocolMessage::EnableBlob(_)) {
                        awaiting_reply = Some(Instant::now());
                    }
                }
                inbound = reader.next_message() => {
                    let msg = inbound?.ok_or_else(|| {
                        Error::Io(std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "remote closed the connection",
                        ))
                    })?;
                    if self.config.debug_xml {
                        debug!("RX:: {}", msg.to_log_string());
                    }
                    last_activity = Instant::now();
                    awaiting_reply = None;
                    self.handle_inbound(&msg, &mut write_half).await?;
                    if !queue_put(ingress, Ingress { origin, msg }, shutdown).await {
                        return Ok(());
                    }
                }
                _ = tick.tick() => {
                    if let Some(since) = awaiting_reply {
                        if since.elapsed() > RESPOND_TIMEOUT {
                            return Err(Error::Timeout(format!(
                                "no response from remote within {RESPOND_TIMEOUT:?}"
                            )));
                        }
                    }
                    if last_activity.elapsed() > IDLE_TIMEOUT {
                        let probe = ProtocolMessage::GetProperties(GetProperties::new(None, None));
                        write_message(&mut write_half, &probe).await?;
                        last_activity = Instant::now();
                        if awaiting_reply.is_none() {
                            awaiting_reply = Some(Instant::now());
                        }
                    }
                }
            }
        }
    }

    /// Track devices and snoop requests seen on the link; push the
    /// BLOB policy upstream for each newly learnt device.
    async fn handle_inbound(
        &self,
        msg: &ProtocolMessage,
        write_half: &mut tokio::net::tcp::OwnedWriteHalf,
    ) -> Result<()> {
        if msg.is_def() {
            if let Some(device) = msg.device() {
                let newly_learnt = self
                    .devices
                    .lock()
                    .expect("remote devices lock")
                    .insert(device.to_string());
                if newly_learnt {
                    debug!(
                        "remote device {device} learnt, requesting BLOBs {}",
                        self.config.blob_policy
                    );
                    let enable = ProtocolMessage::EnableBlob(EnableBlob {
                        device: device.to_string(),
                        name: None,
                        policy: self.config.blob_policy,
                    });
                    write_message(write_half, &enable).await?;
                }
            }
        }
        if let ProtocolMessage::GetProperties(gp) = msg {
            // the upstream server is snooping through this link
            self.snoop
                .record_get_properties(gp.device.as_deref(), gp.name.as_deref());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn accept_and_collect(listener: TcpListener, bytes: usize) -> String {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut collected = Vec::new();
        let mut buf = [0u8; 1024];
        while collected.len() < bytes {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&buf[..n]);
        }
        String::from_utf8(collected).unwrap()
    }

    #[tokio::test]
    async fn test_probe_sent_on_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let upstream = tokio::spawn(accept_and_collect(listener, 20));

        let remote = RemoteConnection::new(RemoteConfig::new(addr.ip().to_string(), addr.port()));
        let shutdown = Shutdown::new();
        let (_inbox_tx, inbox_rx) = mpsc::channel(4);
        let (ingress_tx, _ingress_rx) = mpsc::channel(4);
        let task = tokio::spawn(remote.run(inbox_rx, ingress_tx, Origin::Endpoint(0), shutdown.clone()));

        let seen = upstream.await.unwrap();
        assert!(seen.contains("<getProperties"));
        shutdown.trigger();
        let _ = tokio::time::timeout(Duration::from_secs(1), task).await;
    }
}
