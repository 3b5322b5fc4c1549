//! Client facade and the send/recover loop.
//!
//! The [`Client`] hands submissions to a background loop over a capacity-1
//! channel; the hand-off is the only backpressure callers see. The loop owns
//! one gateway session at a time:
//!
//! 1. Connect, retrying with a fixed delay.
//! 2. Spawn an error reader bound to the new stream.
//! 3. Requeue whatever the previous session left unsent.
//! 4. Multiplex submissions against the error reader until the session dies.
//!
//! The gateway never acknowledges success. Failure arrives as a 6-byte error
//! response identifying a previously written notification, after which the
//! stream is closed and everything written behind the rejected notification
//! is discarded server-side. The [`crate::buffer`] window plus the requeue
//! step are what make that tail recoverable.

use std::io;
use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::buffer::{Cursor, ReplayBuffer};
use crate::error::Result;
use crate::protocol::{ErrorResponse, Notification, NotificationResult, ERROR_RESPONSE_SIZE};
use crate::transport::{Connector, TlsConnector, TlsIdentity};

/// Default capacity of the replay window.
pub const DEFAULT_BUFFER_CAPACITY: usize = 50;

/// Default delay between connect attempts.
pub const DEFAULT_CONNECT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Gateway `host:port` to dial.
    pub gateway: String,
    /// Capacity of the replay window.
    pub buffer_capacity: usize,
    /// Delay between connect attempts.
    pub connect_retry_delay: Duration,
}

impl ClientConfig {
    /// Configuration with default window capacity and retry delay.
    pub fn new(gateway: impl Into<String>) -> Self {
        Self {
            gateway: gateway.into(),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            connect_retry_delay: DEFAULT_CONNECT_RETRY_DELAY,
        }
    }

    /// Set the replay window capacity.
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Set the delay between connect attempts.
    pub fn connect_retry_delay(mut self, delay: Duration) -> Self {
        self.connect_retry_delay = delay;
        self
    }
}

/// Receive side of the failure reports channel.
///
/// Reports are delivered best-effort: the send loop never blocks on this
/// channel and drops reports when it is full. Keeping a consumer on it is
/// the caller's responsibility.
pub struct FailureStream {
    rx: mpsc::Receiver<NotificationResult>,
}

impl FailureStream {
    /// Receive the next failure report.
    ///
    /// Returns `None` after the client has shut down.
    pub async fn recv(&mut self) -> Option<NotificationResult> {
        self.rx.recv().await
    }

    /// Non-blocking variant of [`FailureStream::recv`].
    pub fn try_recv(&mut self) -> Option<NotificationResult> {
        self.rx.try_recv().ok()
    }
}

/// A running push client.
///
/// Submissions are accepted immediately (modulo the channel hand-off) and
/// written in order by a background loop; rejections surface later on
/// [`Client::failures`]. Dropping the client shuts the loop down and closes
/// the gateway session.
pub struct Client {
    notif_tx: mpsc::Sender<Notification>,
    failures: FailureStream,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl Client {
    /// Create a client from PEM-encoded certificate and key bytes.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: ClientConfig, cert_pem: &[u8], key_pem: &[u8]) -> Result<Self> {
        let identity = TlsIdentity::from_pem(cert_pem, key_pem)?;
        Self::with_identity(config, identity)
    }

    /// Create a client from PEM certificate and key files.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn from_files(
        config: ClientConfig,
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
    ) -> Result<Self> {
        let identity = TlsIdentity::from_files(cert_path, key_path)?;
        Self::with_identity(config, identity)
    }

    /// Create a client from a pre-built TLS identity.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_identity(config: ClientConfig, identity: TlsIdentity) -> Result<Self> {
        let connector = TlsConnector::new(config.gateway.clone(), identity)?;
        Ok(Self::with_connector(config, connector))
    }

    /// Create a client over a custom [`Connector`].
    ///
    /// This is the seam tests use to run the loop over in-memory streams;
    /// it also allows substituting the transport entirely.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_connector<C: Connector>(config: ClientConfig, connector: C) -> Self {
        let (notif_tx, notif_rx) = mpsc::channel(1);
        let (failure_tx, failure_rx) = mpsc::channel(config.buffer_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let loop_tx = notif_tx.clone();
        tokio::spawn(run_loop(
            connector,
            config,
            notif_rx,
            loop_tx,
            failure_tx,
            shutdown_rx,
        ));

        Self {
            notif_tx,
            failures: FailureStream { rx: failure_rx },
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Hand a notification to the send loop.
    ///
    /// Always succeeds from the caller's perspective; the only failure
    /// signal is an eventual report on [`Client::failures`]. Waits while
    /// the loop is mid-write or mid-reconnect.
    pub async fn send(&self, notification: Notification) {
        let _ = self.notif_tx.send(notification).await;
    }

    /// Stream of notifications the gateway rejected.
    pub fn failures(&mut self) -> &mut FailureStream {
        &mut self.failures
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Identifier assignment for the send loop.
///
/// Only the loop reads or writes the counter, so access is single-threaded
/// by construction.
#[derive(Debug)]
struct IdentifierCounter {
    next: u32,
}

impl IdentifierCounter {
    fn new() -> Self {
        Self { next: 1 }
    }

    /// Assign an identifier if the caller left it at 0; otherwise advance
    /// the counter past the preset value so later assignments stay unique
    /// within the window.
    fn assign(&mut self, notification: &mut Notification) {
        if notification.identifier == 0 {
            notification.identifier = self.next;
            self.next = bump(self.next);
        } else if notification.identifier >= self.next {
            self.next = bump(notification.identifier);
        }
    }
}

/// 0 means "unassigned", so the counter skips it on wrap.
fn bump(identifier: u32) -> u32 {
    match identifier.wrapping_add(1) {
        0 => 1,
        next => next,
    }
}

/// How a session ended.
enum SessionEnd {
    /// The gateway rejected an identified notification.
    Rejected(ErrorResponse),
    /// The connection failed without a protocol-level verdict.
    Transport(io::Error),
}

/// Spawn a one-shot reader for the session's single error response.
///
/// The task reads exactly [`ERROR_RESPONSE_SIZE`] bytes and emits exactly
/// one value: a decoded [`ErrorResponse`], or the I/O error (EOF included)
/// that ended the read. It is never reused across sessions.
fn spawn_error_reader<R>(
    mut read_half: R,
) -> (
    JoinHandle<()>,
    oneshot::Receiver<std::result::Result<ErrorResponse, io::Error>>,
)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let (tx, rx) = oneshot::channel();
    let handle = tokio::spawn(async move {
        let mut frame = [0u8; ERROR_RESPONSE_SIZE];
        let outcome = match read_half.read_exact(&mut frame).await {
            Ok(_) => Ok(ErrorResponse::decode(&frame)),
            Err(err) => Err(err),
        };
        let _ = tx.send(outcome);
    });
    (handle, rx)
}

/// Connect to the gateway, retrying with a fixed delay until it accepts.
async fn connect_with_retry<C: Connector>(connector: &C, retry_delay: Duration) -> C::Stream {
    loop {
        match connector.connect().await {
            Ok(stream) => return stream,
            Err(err) => {
                tracing::warn!("connect failed: {}; retrying in {:?}", err, retry_delay);
                tokio::time::sleep(retry_delay).await;
            }
        }
    }
}

/// The send/recover loop. Runs until shutdown.
async fn run_loop<C: Connector>(
    connector: C,
    config: ClientConfig,
    mut notif_rx: mpsc::Receiver<Notification>,
    notif_tx: mpsc::Sender<Notification>,
    failure_tx: mpsc::Sender<NotificationResult>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut sent = ReplayBuffer::new(config.buffer_capacity);
    let mut cursor = Cursor::Start;
    let mut counter = IdentifierCounter::new();

    loop {
        let stream = tokio::select! {
            _ = &mut shutdown_rx => return,
            stream = connect_with_retry(&connector, config.connect_retry_delay) => stream,
        };
        tracing::debug!("connected to {}", config.gateway);

        let (read_half, mut write_half) = tokio::io::split(stream);
        let (reader_task, mut error_rx) = spawn_error_reader(read_half);

        // Requeue what the previous session owes. Posting back through the
        // submission channel keeps identifier handling in one place; the
        // entries already carry nonzero identifiers, so nothing is
        // reassigned. A separate task keeps the loop free to start writing.
        let tail = sent.tail(cursor);
        if !tail.is_empty() {
            tracing::debug!("requeueing {} notifications", tail.len());
            let tx = notif_tx.clone();
            tokio::spawn(async move {
                for notification in tail {
                    if tx.send(notification).await.is_err() {
                        break;
                    }
                }
            });
        }
        cursor = Cursor::Start;

        // One session: either arm may win when both are ready. A submission
        // written while an error response is already pending lands in the
        // buffer and is requeued after the teardown this loop is about to
        // notice, so the race is harmless.
        let end = loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    reader_task.abort();
                    return;
                }
                outcome = &mut error_rx => {
                    break match outcome {
                        Ok(Ok(response)) => SessionEnd::Rejected(response),
                        Ok(Err(err)) => SessionEnd::Transport(err),
                        Err(_) => SessionEnd::Transport(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "error reader stopped",
                        )),
                    };
                }
                submission = notif_rx.recv() => {
                    let Some(mut notification) = submission else {
                        reader_task.abort();
                        return;
                    };

                    counter.assign(&mut notification);

                    let frame = match notification.to_frame() {
                        Ok(frame) => frame,
                        Err(err) => {
                            tracing::warn!(
                                "dropping unencodable notification {}: {}",
                                notification.identifier,
                                err
                            );
                            continue;
                        }
                    };

                    // Buffer before writing: if the write dies partway the
                    // notification is already eligible for replay.
                    sent.push(notification);

                    if let Err(err) = write_half.write_all(&frame).await {
                        break SessionEnd::Transport(err);
                    }
                }
            }
        };

        reader_task.abort();
        drop(write_half);

        cursor = match end {
            SessionEnd::Rejected(response) => {
                tracing::debug!("gateway rejected notification: {}", response);
                match sent.remove_rejected(response.identifier) {
                    Some((seq, notification)) => {
                        // Fire-and-forget: a slow or absent consumer must
                        // never stall the loop.
                        let _ = failure_tx.try_send(NotificationResult {
                            notification,
                            error: response,
                        });
                        Cursor::After(seq)
                    }
                    // Identifier already aged out of the window; nothing
                    // we could replay is known to have been discarded.
                    None => Cursor::End,
                }
            }
            SessionEnd::Transport(err) => {
                if err.kind() == io::ErrorKind::UnexpectedEof {
                    tracing::warn!("gateway closed the connection");
                } else {
                    tracing::warn!("session error: {}", err);
                }
                Cursor::Start
            }
        };
    }
}
