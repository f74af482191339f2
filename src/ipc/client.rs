//! IPC Client (spec §4.2): opens a connection to a named endpoint, sends
//! `Message`s, and awaits typed replies, with an optional per-call timeout.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::error::{AppError, AppResult};
use crate::ipc::transport;
use crate::message::Message;

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<AppResult<Message>>>>>;

/// A connection to a named endpoint. Cheap to clone: the socket and its
/// dispatcher tasks are shared, so `send` may be called concurrently from
/// multiple tasks and outstanding calls are independent of one another.
#[derive(Clone)]
pub struct Client {
    endpoint: PathBuf,
    next_id: Arc<AtomicU64>,
    inner: Arc<Mutex<Option<ConnectionHandle>>>,
}

#[derive(Clone)]
struct ConnectionHandle {
    outbox: mpsc::UnboundedSender<(u64, Message)>,
    pending: Pending,
}

impl Client {
    pub fn new(endpoint: impl Into<PathBuf>) -> Self {
        Self {
            endpoint: endpoint.into(),
            next_id: Arc::new(AtomicU64::new(1)),
            inner: Arc::new(Mutex::new(None)),
        }
    }

    /// Sends `msg` and awaits its reply. If `timeout` elapses first, fails
    /// with `internalError` carrying the route and endpoint name. If the
    /// transport reports a broken connection, fails with `interrupted`;
    /// a subsequent call reopens the connection lazily.
    pub async fn send(&self, msg: Message, timeout: Option<Duration>) -> AppResult<Message> {
        let route = msg.route().unwrap_or("").to_string();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();

        let handle = self.connection().await?;
        handle.pending.lock().await.insert(id, reply_tx);
        if handle.outbox.send((id, msg)).is_err() {
            handle.pending.lock().await.remove(&id);
            self.drop_connection().await;
            return Err(AppError::interrupted(format!(
                "connection to {} lost before send",
                self.endpoint.display()
            )));
        }

        let result = match timeout {
            Some(d) => match tokio::time::timeout(d, reply_rx).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(AppError::interrupted(format!(
                    "connection to {} closed while awaiting reply to {route}",
                    self.endpoint.display()
                ))),
                Err(_) => Err(AppError::internal(format!(
                    "timed out waiting for reply to route {route} on endpoint {}",
                    self.endpoint.display()
                ))),
            },
            None => reply_rx.await.map_err(|_| {
                AppError::interrupted(format!(
                    "connection to {} closed while awaiting reply to {route}",
                    self.endpoint.display()
                ))
            })?,
        };

        let reply = result?;
        reply.error()?;
        Ok(reply)
    }

    async fn connection(&self) -> AppResult<ConnectionHandle> {
        let mut guard = self.inner.lock().await;
        if let Some(handle) = guard.as_ref() {
            if !handle.outbox.is_closed() {
                return Ok(handle.clone());
            }
        }
        let handle = self.dial().await?;
        *guard = Some(handle.clone());
        Ok(handle)
    }

    async fn drop_connection(&self) {
        *self.inner.lock().await = None;
    }

    async fn dial(&self) -> AppResult<ConnectionHandle> {
        let stream = Arc::new(UnixStream::connect(&self.endpoint).await.map_err(|e| {
            AppError::interrupted(format!(
                "failed to connect to {}: {e}",
                self.endpoint.display()
            ))
        })?);

        let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel::<(u64, Message)>();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));

        // Writer task: serializes frame writes onto the socket.
        let writer_stream = stream.clone();
        tokio::spawn(async move {
            while let Some((id, msg)) = outbox_rx.recv().await {
                if transport::write_message(&writer_stream, &msg, id)
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        // Reader task: demuxes replies to whichever caller is waiting on
        // that request id.
        let reader_stream = stream.clone();
        let reader_pending = pending.clone();
        tokio::spawn(async move {
            loop {
                match transport::read_message(&reader_stream).await {
                    Ok((id, reply)) => {
                        if let Some(tx) = reader_pending.lock().await.remove(&id) {
                            let _ = tx.send(Ok(reply));
                        }
                    }
                    Err(e) => {
                        let mut pending = reader_pending.lock().await;
                        for (_, tx) in pending.drain() {
                            let _ = tx.send(Err(e.clone()));
                        }
                        break;
                    }
                }
            }
        });

        Ok(ConnectionHandle {
            outbox: outbox_tx,
            pending,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::server::Server;
    use std::time::Duration;

    #[tokio::test]
    async fn timeout_carries_route_and_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slow.sock");

        let server = Server::new(&path).unwrap();
        server.register("slow", |_msg| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Err(AppError::internal("should not be reached"))
            })
        });
        let _handle = server.spawn();

        let client = Client::new(&path);
        // give the listener a beat to bind & accept
        tokio::time::sleep(Duration::from_millis(50)).await;

        let result = client
            .send(Message::new("slow"), Some(Duration::from_millis(10)))
            .await;
        let err = result.unwrap_err();
        assert_eq!(err.code, crate::error::AppErrorCode::InternalError);
        assert!(err.message.contains("slow"));
    }

    #[tokio::test]
    async fn error_round_trips_with_identical_code_and_message() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("err.sock");

        let server = Server::new(&path).unwrap();
        server.register("boom", |_msg| {
            Box::pin(async move { Err(AppError::not_found("x")) })
        });
        let _handle = server.spawn();

        let client = Client::new(&path);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = client
            .send(Message::new("boom"), Some(Duration::from_secs(1)))
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::error::AppErrorCode::NotFound);
        assert_eq!(err.message, "x");
    }
}
