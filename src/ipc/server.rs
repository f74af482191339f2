//! IPC Server (spec §4.3): binds a listening endpoint, dispatches inbound
//! `Message`s to a static routing table, and writes replies back.
//!
//! Concurrency model: parallel. Each accepted connection gets its own task;
//! each message within a connection also gets its own task (§4.3, §5). The
//! listener shuts down when told to, cancelling in-flight handler tasks
//! before the listener socket itself is torn down.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::AppError;
use crate::ipc::transport;
use crate::message::Message;

pub type Handler = Arc<dyn Fn(Message) -> BoxFuture<'static, crate::error::AppResult<Message>> + Send + Sync>;

/// A static routing table supplied at construction, bound to a named
/// listening endpoint (a filesystem path for the Unix-domain-socket
/// transport).
pub struct Server {
    path: PathBuf,
    routes: Mutex<HashMap<&'static str, Handler>>,
}

impl Server {
    pub fn new(path: impl Into<PathBuf>) -> crate::error::AppResult<Self> {
        let path = path.into();
        // Clear a stale socket left behind by a prior crash; a live
        // listener never leaves one (it unlinks on clean shutdown).
        if path.exists() {
            let _ = std::fs::remove_file(&path);
        }
        Ok(Self {
            path,
            routes: Mutex::new(HashMap::new()),
        })
    }

    pub fn register<F, Fut>(&self, route: &'static str, handler: F)
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = crate::error::AppResult<Message>> + Send + 'static,
    {
        self.routes
            .lock()
            .unwrap()
            .insert(route, Arc::new(move |msg| Box::pin(handler(msg)) as BoxFuture<'static, _>));
    }

    /// Activates the listener and starts dispatching. Returns a handle used
    /// to request a clean shutdown.
    pub fn spawn(self) -> crate::error::AppResult<ServerHandle> {
        let listener = UnixListener::bind(&self.path)
            .map_err(|e| AppError::internal(format!("failed to bind {}: {e}", self.path.display())))?;
        let routes: Arc<HashMap<&'static str, Handler>> =
            Arc::new(self.routes.into_inner().unwrap());
        let path = self.path.clone();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tasks: Arc<std::sync::Mutex<Vec<JoinHandle<()>>>> = Arc::new(std::sync::Mutex::new(Vec::new()));

        let accept_tasks = tasks.clone();
        let accept_task = tokio::spawn(accept_loop(listener, routes, shutdown_rx, accept_tasks));

        Ok(ServerHandle {
            shutdown_tx,
            accept_task,
            tasks,
            path,
        })
    }
}

async fn accept_loop(
    listener: UnixListener,
    routes: Arc<HashMap<&'static str, Handler>>,
    mut shutdown_rx: watch::Receiver<bool>,
    tasks: Arc<std::sync::Mutex<Vec<JoinHandle<()>>>>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let routes = routes.clone();
                        let conn_shutdown = shutdown_rx.clone();
                        let task = tokio::spawn(handle_connection(stream, routes, conn_shutdown));
                        tasks.lock().unwrap().push(task);
                    }
                    Err(e) => {
                        // A broken listener is this loop's cancellation condition.
                        error!("ipc listener error, shutting down: {e}");
                        break;
                    }
                }
            }
        }
    }
}

async fn handle_connection(
    stream: UnixStream,
    routes: Arc<HashMap<&'static str, Handler>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let stream = Arc::new(stream);
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<(u64, Message)>();

    let writer_stream = stream.clone();
    let writer = tokio::spawn(async move {
        while let Some((id, reply)) = reply_rx.recv().await {
            if let Err(e) = transport::write_message(&writer_stream, &reply, id).await {
                warn!("failed writing ipc reply: {e}");
                break;
            }
        }
    });

    let message_tasks: std::sync::Mutex<Vec<JoinHandle<()>>> = std::sync::Mutex::new(Vec::new());

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
            received = transport::read_message(&stream) => {
                match received {
                    Ok((id, msg)) => {
                        let Some(route) = msg.route().map(str::to_owned) else {
                            warn!("dropped message with no route");
                            continue;
                        };
                        let Some(handler) = routes.get(route.as_str()).cloned() else {
                            warn!(route = %route, "unknown route, dropping message");
                            continue;
                        };
                        let reply_tx = reply_tx.clone();
                        let task = tokio::spawn(dispatch(handler, msg, id, reply_tx));
                        message_tasks.lock().unwrap().push(task);
                    }
                    Err(_) => {
                        // Connection invalid: this connection's cancellation condition.
                        break;
                    }
                }
            }
        }
    }

    for task in message_tasks.lock().unwrap().drain(..) {
        task.abort();
    }
    drop(reply_tx);
    let _ = writer.await;
}

async fn dispatch(
    handler: Handler,
    msg: Message,
    id: u64,
    reply_tx: mpsc::UnboundedSender<(u64, Message)>,
) {
    let route = msg.route().unwrap_or("").to_string();
    let reply = match handler(msg).await {
        Ok(reply) => reply,
        Err(e) => {
            debug!(route = %route, error = %e, "handler failed");
            let mut reply = Message::new(route.clone());
            reply.set_error(e);
            reply
        }
    };
    let _ = reply_tx.send((id, reply));
}

pub struct ServerHandle {
    shutdown_tx: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
    tasks: Arc<std::sync::Mutex<Vec<JoinHandle<()>>>>,
    path: PathBuf,
}

impl ServerHandle {
    /// Cancels outstanding connection tasks (and transitively their
    /// in-flight message tasks), awaits them, then unlinks the listening
    /// socket — the ordering spec §4.3 calls for.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
        let _ = self.accept_task.await;
        let _ = std::fs::remove_file(&self.path);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
