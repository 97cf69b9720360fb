//! One generation of the worker.
//!
//! A session pairs a transport with the epoch stamped on every reference it
//! mints. When the worker dies the context retires the session; every object of a
//! retired session fails from then on instead of reaching the replacement worker.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;

use crate::class::Class;
use crate::context::Callback;
use crate::error::Error;
use crate::error::Result;
use crate::object::Object;
use crate::object::WeakObject;
use crate::object::lock;
use crate::registry::Registry;
use crate::transport::CallbackId;
use crate::transport::DispatchMode;
use crate::transport::Transport;
use crate::value::Args;
use crate::value::RemoteRef;
use crate::value::Value;

pub struct Session {
    epoch: u64,
    transport: Arc<dyn Transport>,
    namespace: RemoteRef,
    registry: Arc<Registry>,
    retired: AtomicBool,
    callbacks: Mutex<HashMap<CallbackId, Callback>>,
    next_callback: AtomicU64,
    /// Owner of every owned reference.
    owners: DashMap<RemoteRef, WeakObject>,
}

impl Session {
    pub fn new(
        epoch: u64,
        transport: Arc<dyn Transport>,
        namespace: RemoteRef,
        registry: Arc<Registry>,
    ) -> Self {
        Self {
            epoch,
            transport,
            namespace,
            registry,
            retired: AtomicBool::new(false),
            callbacks: Mutex::new(HashMap::new()),
            next_callback: AtomicU64::new(0),
            owners: DashMap::new(),
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// The remote plotting namespace imported at startup.
    pub fn namespace(&self) -> &RemoteRef {
        &self.namespace
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Whether the session can still serve requests.
    pub fn is_alive(&self) -> bool {
        !self.is_retired() && !self.transport.is_closed()
    }

    pub(crate) fn retire(&self) {
        self.retired.store(true, Ordering::Release);
        lock(&self.callbacks).clear();
        self.owners.clear();
    }

    pub(crate) fn owners(&self) -> &DashMap<RemoteRef, WeakObject> {
        &self.owners
    }

    pub(crate) fn add_callback(&self, callback: Callback) -> CallbackId {
        let id = CallbackId(self.next_callback.fetch_add(1, Ordering::Relaxed));
        lock(&self.callbacks).insert(id, callback);
        id
    }

    pub(crate) fn remove_callback(&self, id: CallbackId) -> bool {
        lock(&self.callbacks).remove(&id).is_some()
    }

    /// Takes a callback out while it runs, so it may connect or disconnect others.
    pub(crate) fn take_callback(&self, id: CallbackId) -> Option<Callback> {
        lock(&self.callbacks).remove(&id)
    }

    pub(crate) fn restore_callback(&self, id: CallbackId, callback: Callback) {
        if !self.is_retired() {
            lock(&self.callbacks).entry(id).or_insert(callback);
        }
    }

    /// Number of connected callbacks.
    pub fn callback_count(&self) -> usize {
        lock(&self.callbacks).len()
    }

    /// Fails if `target` cannot be served by this session.
    pub(crate) fn check(&self, target: &RemoteRef, type_name: &str) -> Result<()> {
        if self.is_retired() || target.epoch() != self.epoch {
            return Err(Error::StaleObject {
                type_name: type_name.to_string(),
                epoch: target.epoch(),
            });
        }
        Ok(())
    }

    /// Calls a remote method. Fire-and-forget calls yield `Value::None`.
    pub async fn call(
        &self,
        target: &RemoteRef,
        method: &str,
        args: Args,
        mode: DispatchMode,
    ) -> Result<Value> {
        self.check(target, target.type_str())?;
        let reply = self.transport.call(target, method, args.lower(), mode).await?;
        Ok(reply.unwrap_or_default())
    }

    pub async fn get_attr(&self, target: &RemoteRef, name: &str) -> Result<Value> {
        self.check(target, target.type_str())?;
        Ok(self.transport.get_attr(target, name).await?)
    }

    pub async fn set_attr(&self, target: &RemoteRef, name: &str, value: Value) -> Result<()> {
        self.check(target, target.type_str())?;
        Ok(self.transport.set_attr(target, name, value.lower()).await?)
    }

    pub async fn is_callable(&self, target: &RemoteRef) -> Result<bool> {
        self.check(target, target.type_str())?;
        Ok(self.transport.is_callable(target).await?)
    }

    /// Creates a new remote object of `class`.
    pub async fn construct(self: &Arc<Self>, class: &'static Class, args: Args) -> Result<Object> {
        let info = self.registry.info(class)?;
        Object::construct(self, info, args).await
    }

    /// Wraps an existing remote reference as `class`.
    pub async fn wrap(self: &Arc<Self>, class: &'static Class, value: Value) -> Result<Object> {
        Object::wrap(self, class, value).await
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("epoch", &self.epoch)
            .field("namespace", &self.namespace.type_str())
            .field("retired", &self.is_retired())
            .finish()
    }
}
