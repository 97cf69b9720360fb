//! # Wrapped Objects
//!
//! An [`Object`] is the local stand-in for one remote object. It owns the remote
//! reference, answers what its class declares locally, and forwards the rest.
//!
//! ## Attribute resolution
//!
//! Reads go local property, then local field, then the worker. A local method
//! is not a value: reading one through [`Object::getattr`] fails with
//! [`Error::LocalMethod`], and it is used directly through [`Object::method`]
//! or [`Object::call`]. Local always wins:
//! a property declared on the class is never looked up remotely, whatever the
//! remote object has under the same name. Writes go to a local property setter,
//! then to declared or already-present local fields, then to the worker, so
//! bookkeeping fields are never shadowed by remote attributes.
//!
//! ## Ownership
//!
//! Creator methods record what they created in the receiver's owned list. The
//! session maps every owned reference to a weak pointer at its owner, so any
//! wrapper of the same remote object sees the same parent. A child lives in at
//! most one owned list; adding it elsewhere moves it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::Weak;

use dashmap::DashMap;

use crate::autowrap::autowrap;
use crate::class::Class;
use crate::context::Callback;
use crate::error::Error;
use crate::error::Result;
use crate::method::BoundMethod;
use crate::registry::ClassInfo;
use crate::session::Session;
use crate::transport;
use crate::transport::CallbackId;
use crate::transport::DispatchMode;
use crate::value::Args;
use crate::value::RemoteRef;
use crate::value::Value;

/// Where attribute resolution looks.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Lookup {
    #[default]
    Both,
    Local,
    Remote,
}

impl Lookup {
    fn local(self) -> bool {
        matches!(self, Lookup::Both | Lookup::Local)
    }

    fn remote(self) -> bool {
        matches!(self, Lookup::Both | Lookup::Remote)
    }
}

/// Handle to a wrapped remote object. Clones share state.
#[derive(Clone)]
pub struct Object {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    remote: RemoteRef,
    class: Arc<ClassInfo>,
    session: Arc<Session>,
    fields: Mutex<HashMap<String, Value>>,
    owned: Mutex<Vec<Value>>,
    cache: DashMap<String, Arc<BoundMethod>>,
}

/// Weak pointer to an owner, as kept in the session's ownership map.
pub(crate) type WeakObject = Weak<Inner>;

impl Drop for Inner {
    fn drop(&mut self) {
        let this: *const Inner = self;
        let owned = std::mem::take(self.owned.get_mut().unwrap_or_else(PoisonError::into_inner));
        for remote in owned.iter().filter_map(Value::remote_ref) {
            self.session.owners().remove_if(remote, |_, owner| owner.as_ptr() == this);
        }
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Object {
    fn attach(session: &Arc<Session>, class: Arc<ClassInfo>, remote: RemoteRef) -> Self {
        Self {
            inner: Arc::new(Inner {
                remote,
                class,
                session: Arc::clone(session),
                fields: Mutex::new(HashMap::new()),
                owned: Mutex::new(Vec::new()),
                cache: DashMap::new(),
            }),
        }
    }

    /// Creates the remote object and wraps it.
    ///
    /// Named arguments listed in the class's `local_args` are kept back from the
    /// remote constructor and handed to the `init` hooks. `wrap` hooks do not run.
    pub(crate) async fn construct(
        session: &Arc<Session>,
        class: Arc<ClassInfo>,
        mut args: Args,
    ) -> Result<Object> {
        let remote_type = class.remote_type().ok_or(Error::AbstractClass(class.name()))?;
        let local = args.split_named(class.local_args());

        tracing::debug!(class = class.name(), remote_type, "constructing remote object");
        let created = session
            .call(session.namespace(), remote_type, args, DispatchMode::Blocking)
            .await?;
        let Value::Remote(remote) = created else {
            return Err(Error::type_mismatch(
                format!("a reference to a new {remote_type}"),
                created.kind(),
            ));
        };

        let object = Object::attach(session, class, remote);
        for hook in object.class().init_hooks() {
            hook(&object, local.clone()).await?;
        }
        Ok(object)
    }

    /// Wraps a reference that already exists in the worker.
    pub async fn wrap(session: &Arc<Session>, class: &'static Class, value: Value) -> Result<Object> {
        Self::wrap_with(session, class, value, Args::new()).await
    }

    /// Wraps a reference that already exists in the worker, passing `args` to the
    /// `wrap` hooks. Nothing is constructed remotely and `init` hooks do not run.
    pub async fn wrap_with(
        session: &Arc<Session>,
        class: &'static Class,
        value: Value,
        args: Args,
    ) -> Result<Object> {
        let info = session.registry().info(class)?;
        Self::wrap_info(session, info, value, args).await
    }

    pub(crate) async fn wrap_info(
        session: &Arc<Session>,
        class: Arc<ClassInfo>,
        value: Value,
        args: Args,
    ) -> Result<Object> {
        if class.remote_type().is_none() {
            return Err(Error::AbstractClass(class.name()));
        }
        let remote = match value {
            Value::Remote(remote) => remote,
            other => {
                return Err(Error::NotARemote {
                    class: class.name(),
                    found: other.kind(),
                });
            }
        };
        session.check(&remote, class.name())?;

        let object = Object::attach(session, class, remote);
        for hook in object.class().wrap_hooks() {
            hook(&object, args.clone()).await?;
        }
        Ok(object)
    }

    pub fn remote(&self) -> &RemoteRef {
        &self.inner.remote
    }

    pub fn class(&self) -> &Arc<ClassInfo> {
        &self.inner.class
    }

    /// Local type name.
    pub fn type_name(&self) -> &'static str {
        self.inner.class.name()
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.inner.session
    }

    pub fn is_a(&self, class: &'static Class) -> bool {
        self.inner.class.is_a(class)
    }

    /// Fails unless this object is a `class` or inherits from it.
    pub fn expect_class(&self, class: &'static Class) -> Result<()> {
        if self.is_a(class) {
            Ok(())
        } else {
            Err(Error::type_mismatch(class.name, self.type_name()))
        }
    }

    /// Fails if the object's worker generation is gone.
    pub fn check(&self) -> Result<()> {
        self.inner.session.check(&self.inner.remote, self.type_name())
    }

    /// Whether both handles share the same local state.
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn cache(&self) -> &DashMap<String, Arc<BoundMethod>> {
        &self.inner.cache
    }

    /// The cached bound callable for `name`, if it has been resolved.
    pub fn cached(&self, name: &str) -> Option<Arc<BoundMethod>> {
        self.inner.cache.get(name).map(|entry| Arc::clone(entry.value()))
    }

    // --- Attribute protocol ---

    /// Reads an attribute, local first.
    pub async fn getattr(&self, name: &str) -> Result<Value> {
        self.getattr_in(name, Lookup::Both).await
    }

    pub async fn getattr_in(&self, name: &str, lookup: Lookup) -> Result<Value> {
        self.check()?;

        if lookup.local() {
            if let Some(property) = self.class().property(name) {
                tracing::debug!(object = self.type_name(), attr = name, "local property");
                return (property.get)(self).await;
            }
            if self.class().method(name).is_some() {
                return Err(Error::LocalMethod {
                    type_name: self.type_name().to_string(),
                    attr: name.to_string(),
                });
            }
            if let Some(value) = self.field(name) {
                return Ok(value);
            }
        }

        if !lookup.remote() {
            return Err(self.no_such_attribute(name));
        }

        tracing::debug!(object = self.type_name(), attr = name, "remote attribute");
        let value = self
            .session()
            .get_attr(self.remote(), name)
            .await
            .map_err(|e| self.translate(e, name))?;
        autowrap(self.session(), value).await
    }

    /// Writes an attribute, local first.
    pub async fn setattr(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.check()?;
        let value = value.into();

        if let Some(property) = self.class().property(name) {
            let Some(set) = property.set else {
                return Err(Error::ReadOnly {
                    type_name: self.type_name().to_string(),
                    attr: name.to_string(),
                });
            };
            return set(self, value).await;
        }

        {
            let mut fields = lock(&self.inner.fields);
            if self.class().has_field(name) || fields.contains_key(name) {
                fields.insert(name.to_string(), value);
                return Ok(());
            }
        }

        self.session()
            .set_attr(self.remote(), name, value)
            .await
            .map_err(|e| self.translate(e, name))
    }

    /// Reads a local field without touching the worker.
    pub fn field(&self, name: &str) -> Option<Value> {
        lock(&self.inner.fields).get(name).cloned()
    }

    /// Writes a local field without touching the worker.
    pub fn set_field(&self, name: &str, value: impl Into<Value>) {
        lock(&self.inner.fields).insert(name.to_string(), value.into());
    }

    /// Resolves `name` and invokes it.
    pub async fn call(&self, name: &str, args: Args) -> Result<Value> {
        self.method(name).await?.invoke(args).await
    }

    /// Resolves `name` on the worker only, skipping local methods, and invokes it.
    ///
    /// This is how a local method delegates to the remote method it shadows.
    pub async fn call_remote(&self, name: &str, args: Args) -> Result<Value> {
        self.remote_method(name).await?.invoke(args).await
    }

    /// Forwards the remote signal `signal` to `callback`.
    ///
    /// The callback runs on the controller task when the context processes
    /// events, never from the worker.
    pub async fn connect(&self, signal: &str, callback: Callback) -> Result<CallbackId> {
        self.check()?;
        let session = self.session();
        let id = session.add_callback(callback);
        if let Err(e) = session.transport().connect(self.remote(), signal, id).await {
            session.remove_callback(id);
            return Err(self.translate(e.into(), signal));
        }
        tracing::debug!(object = self.type_name(), signal, %id, "connected signal");
        Ok(id)
    }

    /// Stops running `id`. Returns whether it was connected.
    pub fn disconnect(&self, id: CallbackId) -> bool {
        self.session().remove_callback(id)
    }

    // --- Ownership ---

    /// Everything created inside this object, in insertion order.
    pub fn owned_items(&self) -> Vec<Value> {
        lock(&self.inner.owned).clone()
    }

    /// The object this one was most recently added to, if it is still alive.
    ///
    /// Ownership is tracked per remote reference, so every wrapper of the same
    /// remote object reports the same parent.
    pub fn parent(&self) -> Option<Object> {
        let owner = self.session().owners().get(self.remote()).map(|owner| owner.value().clone());
        owner?.upgrade().map(|inner| Object { inner })
    }

    /// Called when this object has been placed inside `parent`.
    ///
    /// Runs the class's `added` hooks, then moves this object into `parent`'s
    /// owned list. A failing hook leaves ownership as it was.
    pub async fn notify_added(&self, parent: &Object) -> Result<()> {
        for hook in self.class().added_hooks() {
            hook(self, parent).await?;
        }
        parent.take_ownership(&Value::Object(self.clone()));
        Ok(())
    }

    /// Records `child` as created by this object.
    pub(crate) async fn adopt(&self, child: Value) -> Result<Value> {
        match &child {
            Value::Object(obj) => obj.notify_added(self).await?,
            Value::Remote(_) => self.take_ownership(&child),
            _ => {}
        }
        Ok(child)
    }

    /// Removes `child` from the owned list and clears its parent.
    ///
    /// Returns whether it was owned.
    pub fn release(&self, child: &Value) -> bool {
        let Some(remote) = child.remote_ref() else {
            return false;
        };
        let removed = self.forget(remote);
        let this = Arc::as_ptr(&self.inner);
        self.session().owners().remove_if(remote, |_, owner| owner.as_ptr() == this);
        removed
    }

    /// Moves `child` out of its previous owner, if any, and into this object.
    fn take_ownership(&self, child: &Value) {
        let Some(remote) = child.remote_ref() else {
            return;
        };
        let previous = self
            .session()
            .owners()
            .insert(remote.clone(), Arc::downgrade(&self.inner));
        if let Some(previous) = previous.and_then(|owner| owner.upgrade()) {
            if !Arc::ptr_eq(&previous, &self.inner) {
                Object { inner: previous }.forget(remote);
            }
        }
        self.record(child);
    }

    fn record(&self, child: &Value) {
        let mut owned = lock(&self.inner.owned);
        if !owned.iter().any(|item| item == child) {
            owned.push(child.clone());
        }
    }

    fn forget(&self, remote: &RemoteRef) -> bool {
        let mut owned = lock(&self.inner.owned);
        let before = owned.len();
        owned.retain(|item| item.remote_ref() != Some(remote));
        owned.len() != before
    }

    // --- Errors ---

    pub(crate) fn no_such_attribute(&self, name: &str) -> Error {
        Error::NoSuchAttribute {
            type_name: self.type_name().to_string(),
            attr: name.to_string(),
        }
    }

    /// Names the local type when the worker reports a missing attribute.
    pub(crate) fn translate(&self, error: Error, name: &str) -> Error {
        match error {
            Error::Transport(transport::Error::AttributeNotFound { .. }) => self.no_such_attribute(name),
            other => other,
        }
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.inner.remote == other.inner.remote
    }
}

impl std::fmt::Debug for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{} for {}>", self.type_name(), self.inner.remote)
    }
}

impl std::fmt::Display for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}
