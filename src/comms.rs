//! Shared channel and socket plumbing for the server fabric

use crate::error::Result;
use crate::message::ProtocolMessage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

/// Capacity of every inter-component channel.
pub(crate) const CHANNEL_CAPACITY: usize = 6;

/// How long one enqueue attempt may block before re-checking the stop
/// flag.
pub(crate) const QUEUE_PUT_RETRY: Duration = Duration::from_millis(500);

/// Process-wide stop signal: a flag for polling loops plus a broadcast
/// channel for `select!` arms.
#[derive(Debug, Clone)]
pub struct Shutdown {
    stopped: Arc<AtomicBool>,
    notify: broadcast::Sender<()>,
}

impl Shutdown {
    /// A fresh, un-triggered signal.
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(1);
        Self {
            stopped: Arc::new(AtomicBool::new(false)),
            notify,
        }
    }

    /// Tell every task to stop.
    pub fn trigger(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let _ = self.notify.send(());
    }

    /// Has the signal been triggered?
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// A receiver that resolves once the signal triggers, usable in
    /// `select!`.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.notify.subscribe()
    }

    /// Resolves when the signal triggers.
    pub async fn wait(&self) {
        if self.is_stopped() {
            return;
        }
        let mut rx = self.subscribe();
        let _ = rx.recv().await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Enqueue with the timeout-and-retry pattern: attempt for
/// [`QUEUE_PUT_RETRY`], re-check the stop flag, repeat. Returns false
/// if the server is stopping or the consumer is gone; elements are
/// never dropped while both ends are alive.
pub(crate) async fn queue_put<T>(tx: &mpsc::Sender<T>, mut value: T, shutdown: &Shutdown) -> bool {
    loop {
        if shutdown.is_stopped() {
            return false;
        }
        match tx.send_timeout(value, QUEUE_PUT_RETRY).await {
            Ok(()) => return true,
            Err(mpsc::error::SendTimeoutError::Timeout(returned)) => value = returned,
            Err(mpsc::error::SendTimeoutError::Closed(_)) => return false,
        }
    }
}

/// Tracks the time of the last transmission or reception on a link.
#[derive(Debug)]
pub(crate) struct ActivityTimer {
    last: Instant,
    timeout: Duration,
}

impl ActivityTimer {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self {
            last: Instant::now(),
            timeout,
        }
    }

    /// Record activity now.
    pub(crate) fn update(&mut self) {
        self.last = Instant::now();
    }

    /// True once `timeout` has passed since the last update.
    pub(crate) fn is_expired(&self) -> bool {
        self.last.elapsed() > self.timeout
    }
}

/// Write one element to a socket or pipe. setBLOBVector payloads go
/// out in bounded chunks with a yield between writes so one large
/// image cannot monopolize the scheduler.
pub(crate) async fn write_message<W>(writer: &mut W, msg: &ProtocolMessage) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    match msg {
        ProtocolMessage::SetBlob(set) => {
            for piece in set.chunks() {
                writer.write_all(piece.as_bytes()).await?;
                writer.flush().await?;
                tokio::task::yield_now().await;
            }
        }
        other => {
            let mut xml = other.to_xml()?;
            xml.push('\n');
            writer.write_all(xml.as_bytes()).await?;
            writer.flush().await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{GetProperties, OneBlob, PropertyState, SetBlobVector};

    #[tokio::test]
    async fn test_shutdown_wakes_waiters() {
        let shutdown = Shutdown::new();
        let waiter = shutdown.clone();
        let handle = tokio::spawn(async move { waiter.wait().await });
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(shutdown.is_stopped());
    }

    #[tokio::test]
    async fn test_queue_put_retries_until_capacity() {
        let shutdown = Shutdown::new();
        let (tx, mut rx) = mpsc::channel(1);
        assert!(queue_put(&tx, 1u32, &shutdown).await);
        // channel now full; free a slot shortly after the first retry
        let drainer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            rx.recv().await;
            rx
        });
        assert!(queue_put(&tx, 2u32, &shutdown).await);
        let mut rx = drainer.await.unwrap();
        assert_eq!(rx.recv().await, Some(2));
    }

    #[tokio::test]
    async fn test_queue_put_gives_up_on_stop() {
        let shutdown = Shutdown::new();
        let (tx, _rx) = mpsc::channel(1);
        assert!(queue_put(&tx, 1u32, &shutdown).await);
        shutdown.trigger();
        // full queue, stop flag set: returns promptly instead of spinning
        let done = tokio::time::timeout(
            Duration::from_secs(2),
            queue_put(&tx, 2u32, &shutdown),
        )
        .await
        .expect("queue_put must observe the stop flag");
        assert!(!done);
    }

    #[tokio::test]
    async fn test_write_message_appends_newline() {
        let msg = ProtocolMessage::GetProperties(GetProperties::new(None, None));
        let mut out = Vec::new();
        write_message(&mut out, &msg).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.ends_with('\n'));
        assert!(text.contains("getProperties"));
    }

    #[tokio::test]
    async fn test_write_message_chunks_blobs() {
        let payload = vec![7u8; 5000];
        let msg = ProtocolMessage::SetBlob(SetBlobVector {
            device: "Cam".to_string(),
            name: "image".to_string(),
            state: PropertyState::Ok,
            timeout: None,
            timestamp: None,
            message: None,
            blobs: vec![OneBlob::from_bytes("frame", &payload, 0, ".raw")],
        });
        let mut out = Vec::new();
        write_message(&mut out, &msg).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        let parsed: crate::message::ProtocolMessage = text.trim_end().parse().unwrap();
        match parsed {
            ProtocolMessage::SetBlob(set) => assert_eq!(set.blobs[0].decode().unwrap(), payload),
            _ => panic!("wrong arm"),
        }
    }
}
