//! # Loopback Worker
//!
//! Runs an object space on a tokio task and talks to it over an unbounded
//! channel. A single task serves every request of one worker in arrival order,
//! so fire-and-forget calls can never be overtaken by a later blocking one.
//!
//! Killing the task drops the receiving end, which is exactly what a crashed
//! worker process looks like to the controller: the transport reports itself
//! closed and every pending request fails with `ChannelClosed`.

use std::sync::Arc;
use std::sync::Mutex;

use farproxy::Args;
use farproxy::CallbackId;
use farproxy::DispatchMode;
use farproxy::RemoteRef;
use farproxy::Spawner;
use farproxy::Transport;
use farproxy::Value;
use farproxy::transport;
use farproxy::transport::Inbound;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::space;
use crate::space::Journal;
use crate::space::JournalEntry;
use crate::space::Space;
use crate::space::lock;

type Reply<T> = oneshot::Sender<space::Result<T>>;

enum Request {
    Call {
        target: RemoteRef,
        method: String,
        args: Args,
        /// `None` for fire-and-forget.
        reply: Option<Reply<Value>>,
    },
    GetAttr {
        target: RemoteRef,
        name: String,
        reply: Reply<Value>,
    },
    SetAttr {
        target: RemoteRef,
        name: String,
        value: Value,
        reply: Reply<()>,
    },
    Import {
        module: String,
        reply: Reply<RemoteRef>,
    },
    IsCallable {
        target: RemoteRef,
        reply: Reply<bool>,
    },
    Connect {
        target: RemoteRef,
        signal: String,
        callback: CallbackId,
        reply: Reply<()>,
    },
    /// The user closed a window from the worker side.
    CloseWindow { target: RemoteRef, reply: Reply<()> },
}

async fn serve(mut space: Space, mut rx: mpsc::UnboundedReceiver<Request>) {
    let epoch = space.epoch();
    tracing::debug!(epoch, "worker started");
    while let Some(request) = rx.recv().await {
        handle(&mut space, request);
    }
    tracing::debug!(epoch, objects = space.len(), "worker stopped");
}

fn handle(space: &mut Space, request: Request) {
    match request {
        Request::Call {
            target,
            method,
            args,
            reply,
        } => {
            space.record(&space.label(target.id()), &method, reply.is_some());
            let result = space.call(&target, &method, args);
            match reply {
                Some(reply) => {
                    let _ = reply.send(result);
                }
                None => {
                    if let Err(e) = result {
                        tracing::warn!(method, target = %target, error = %e, "fire-and-forget call failed");
                    }
                }
            }
        }
        Request::GetAttr { target, name, reply } => {
            space.record(&space.label(target.id()), &format!("get {name}"), true);
            let _ = reply.send(space.get_attr(&target, &name));
        }
        Request::SetAttr {
            target,
            name,
            value,
            reply,
        } => {
            space.record(&space.label(target.id()), &format!("set {name}"), true);
            let _ = reply.send(space.set_attr(&target, &name, value));
        }
        Request::Import { module, reply } => {
            space.record(&module, "import", true);
            let _ = reply.send(space.import(&module));
        }
        Request::IsCallable { target, reply } => {
            let _ = reply.send(space.is_callable(&target));
        }
        Request::Connect {
            target,
            signal,
            callback,
            reply,
        } => {
            space.record(&space.label(target.id()), &format!("connect {signal}"), true);
            let result = space.resolve(&target).map(|id| space.connect(id, &signal, callback));
            let _ = reply.send(result);
        }
        Request::CloseWindow { target, reply } => {
            let result = space
                .resolve(&target)
                .and_then(|id| space.call_id(id, "close", Args::new()))
                .map(|_| ());
            let _ = reply.send(result);
        }
    }
}

/// The controller end of a loopback worker.
pub struct LoopbackTransport {
    tx: mpsc::UnboundedSender<Request>,
    inbound: Arc<Mutex<Vec<Inbound>>>,
}

impl LoopbackTransport {
    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Request) -> transport::Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .map_err(|_| transport::Error::ChannelClosed)?;
        let result = rx.await.map_err(|_| transport::Error::ChannelClosed)?;
        result.map_err(Into::into)
    }
}

#[async_trait::async_trait]
impl Transport for LoopbackTransport {
    async fn call(
        &self,
        target: &RemoteRef,
        method: &str,
        args: Args,
        mode: DispatchMode,
    ) -> transport::Result<Option<Value>> {
        match mode {
            DispatchMode::FireAndForget => {
                self.tx
                    .send(Request::Call {
                        target: target.clone(),
                        method: method.to_string(),
                        args,
                        reply: None,
                    })
                    .map_err(|_| transport::Error::ChannelClosed)?;
                Ok(None)
            }
            DispatchMode::Blocking => {
                let value = self
                    .request(|reply| Request::Call {
                        target: target.clone(),
                        method: method.to_string(),
                        args,
                        reply: Some(reply),
                    })
                    .await?;
                Ok(Some(value))
            }
        }
    }

    async fn get_attr(&self, target: &RemoteRef, name: &str) -> transport::Result<Value> {
        self.request(|reply| Request::GetAttr {
            target: target.clone(),
            name: name.to_string(),
            reply,
        })
        .await
    }

    async fn set_attr(&self, target: &RemoteRef, name: &str, value: Value) -> transport::Result<()> {
        self.request(|reply| Request::SetAttr {
            target: target.clone(),
            name: name.to_string(),
            value,
            reply,
        })
        .await
    }

    async fn import(&self, module: &str) -> transport::Result<RemoteRef> {
        self.request(|reply| Request::Import {
            module: module.to_string(),
            reply,
        })
        .await
    }

    async fn is_callable(&self, target: &RemoteRef) -> transport::Result<bool> {
        self.request(|reply| Request::IsCallable {
            target: target.clone(),
            reply,
        })
        .await
    }

    async fn connect(&self, target: &RemoteRef, signal: &str, callback: CallbackId) -> transport::Result<()> {
        self.request(|reply| Request::Connect {
            target: target.clone(),
            signal: signal.to_string(),
            callback,
            reply,
        })
        .await
    }

    fn drain_inbound(&self) -> Vec<Inbound> {
        std::mem::take(&mut *lock(&self.inbound))
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Test-side control over one loopback worker.
#[derive(Clone)]
pub struct WorkerHandle {
    epoch: u64,
    tx: mpsc::WeakUnboundedSender<Request>,
    journal: Journal,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl WorkerHandle {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The most recent requests served, in order.
    pub fn journal(&self) -> Vec<JournalEntry> {
        lock(&self.journal).iter().cloned().collect()
    }

    pub fn is_alive(&self) -> bool {
        lock(&self.task).as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stops the worker as if its process had crashed.
    pub async fn kill(&self) {
        let task = lock(&self.task).take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
            tracing::info!(epoch = self.epoch, "worker killed");
        }
    }

    /// Closes `window` from the worker side, as a user clicking its close box would.
    pub async fn simulate_close(&self, window: &RemoteRef) -> transport::Result<()> {
        let tx = self.tx.upgrade().ok_or(transport::Error::ChannelClosed)?;
        let (reply, rx) = oneshot::channel();
        tx.send(Request::CloseWindow {
            target: window.clone(),
            reply,
        })
        .map_err(|_| transport::Error::ChannelClosed)?;
        let result = rx.await.map_err(|_| transport::Error::ChannelClosed)?;
        result.map_err(Into::into)
    }
}

/// Starts a worker on the current tokio runtime.
pub fn spawn_worker(epoch: u64) -> (LoopbackTransport, WorkerHandle) {
    let (tx, rx) = mpsc::unbounded_channel();
    let inbound = Arc::new(Mutex::new(Vec::new()));
    let journal = Journal::default();
    let space = Space::new(epoch, Arc::clone(&inbound), Arc::clone(&journal));
    let task = tokio::spawn(serve(space, rx));

    let handle = WorkerHandle {
        epoch,
        tx: tx.downgrade(),
        journal,
        task: Arc::new(Mutex::new(Some(task))),
    };
    (LoopbackTransport { tx, inbound }, handle)
}

/// Spawns loopback workers and keeps a handle to each.
#[derive(Clone, Default)]
pub struct LoopbackSpawner {
    workers: Arc<Mutex<Vec<WorkerHandle>>>,
}

impl LoopbackSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently spawned worker.
    pub fn current(&self) -> Option<WorkerHandle> {
        lock(&self.workers).last().cloned()
    }

    pub fn spawned(&self) -> usize {
        lock(&self.workers).len()
    }
}

#[async_trait::async_trait]
impl Spawner for LoopbackSpawner {
    async fn spawn(&self, epoch: u64) -> transport::Result<Arc<dyn Transport>> {
        let (transport, handle) = spawn_worker(epoch);
        lock(&self.workers).push(handle);
        Ok(Arc::new(transport))
    }
}
