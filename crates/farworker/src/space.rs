//! # Object Space
//!
//! The worker side of the proxy: every object the controller can reference,
//! keyed by id, plus the bookkeeping the toolkit needs (configuration, open
//! windows, signal connections).
//!
//! ## Philosophy
//!
//! - **One generation**: A space belongs to one epoch. References from any
//!   other epoch are rejected, never guessed at.
//! - **Everything is a slot**: Modules, classes, instances, bound methods and
//!   remote lists all get ids, so the controller can hold a reference to any
//!   of them.
//! - **Signals are queued**: Emitting a connected signal only appends to the
//!   outbound queue. The controller decides when to look.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use farproxy::Args;
use farproxy::CallbackId;
use farproxy::RemoteRef;
use farproxy::Value;
use farproxy::transport;
use farproxy::transport::Inbound;

use crate::toolkit::Kind;

pub type ObjectId = u64;

/// Errors raised while serving a request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("no object {0} in this worker")]
    NoSuchObject(ObjectId),

    #[error("reference from worker generation {found}, this is generation {expected}")]
    ForeignReference { expected: u64, found: u64 },

    #[error("{type_str} has no attribute '{attr}'")]
    NoAttribute { type_str: String, attr: String },

    #[error("{type_name} has no method '{method}'")]
    NoMethod { type_name: String, method: String },

    #[error("bad argument to {method}: {reason}")]
    BadArgument { method: String, reason: String },

    #[error("unknown colormap '{0}'")]
    UnknownColorMap(String),

    #[error("cannot import '{0}'")]
    NoModule(String),
}

impl Error {
    pub fn bad_argument(method: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BadArgument {
            method: method.into(),
            reason: reason.into(),
        }
    }
}

impl From<Error> for transport::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::NoAttribute { type_str, attr } => transport::Error::AttributeNotFound { type_str, attr },
            other => transport::Error::Remote(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// One entry in the space.
pub enum Slot {
    Module(String),
    /// A toolkit class, callable to construct instances.
    Class(Kind),
    Instance(Instance),
    /// `name` bound to `owner`.
    Method { owner: ObjectId, name: String },
    List(Vec<Value>),
}

/// State of a toolkit object.
#[derive(Debug)]
pub struct Instance {
    pub kind: Kind,
    pub attrs: BTreeMap<String, Value>,
    /// Items placed inside this one, in order.
    pub children: Vec<ObjectId>,
    pub parent: Option<ObjectId>,
}

impl Instance {
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            attrs: BTreeMap::new(),
            children: Vec::new(),
            parent: None,
        }
    }
}

/// A request the worker has served, in the order served.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JournalEntry {
    /// Short type name of the target, or the module name.
    pub target: String,
    pub request: String,
    pub blocking: bool,
}

/// Most recent requests served, oldest dropped first.
pub type Journal = Arc<Mutex<VecDeque<JournalEntry>>>;

pub const JOURNAL_CAPACITY: usize = 4096;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Space {
    epoch: u64,
    next_id: ObjectId,
    slots: HashMap<ObjectId, Slot>,
    pub(crate) config: BTreeMap<String, Value>,
    /// Open top-level windows, oldest first.
    pub(crate) windows: Vec<ObjectId>,
    pub(crate) colormaps: BTreeMap<String, ObjectId>,
    connections: HashMap<(ObjectId, String), Vec<CallbackId>>,
    modules: HashMap<String, ObjectId>,
    classes: HashMap<Kind, ObjectId>,
    /// Bound method slots, one per (owner, name).
    bound: HashMap<(ObjectId, String), ObjectId>,
    lists: HashMap<Vec<ObjectId>, ObjectId>,
    outbound: Arc<Mutex<Vec<Inbound>>>,
    journal: Journal,
}

impl Space {
    pub fn new(epoch: u64, outbound: Arc<Mutex<Vec<Inbound>>>, journal: Journal) -> Self {
        Self {
            epoch,
            next_id: 0,
            slots: HashMap::new(),
            config: BTreeMap::new(),
            windows: Vec::new(),
            colormaps: BTreeMap::new(),
            connections: HashMap::new(),
            modules: HashMap::new(),
            classes: HashMap::new(),
            bound: HashMap::new(),
            lists: HashMap::new(),
            outbound,
            journal,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn insert(&mut self, slot: Slot) -> ObjectId {
        self.next_id += 1;
        self.slots.insert(self.next_id, slot);
        self.next_id
    }

    pub fn slot(&self, id: ObjectId) -> Result<&Slot> {
        self.slots.get(&id).ok_or(Error::NoSuchObject(id))
    }

    /// The worker's description of an object.
    pub fn type_str(&self, id: ObjectId) -> Result<String> {
        let address = 0x7f3a_0000_0000_u64 + id * 0x10;
        Ok(match self.slot(id)? {
            Slot::Module(name) => format!("<module '{name}'>"),
            Slot::Class(kind) => format!("<class 'farplot.remote.{}'>", kind.name()),
            Slot::Instance(instance) => {
                format!("<farplot.remote.{} object at 0x{address:x}>", instance.kind.name())
            }
            Slot::Method { name, .. } => format!("<bound method {name} at 0x{address:x}>"),
            Slot::List(_) => format!("<list object at 0x{address:x}>"),
        })
    }

    /// A fresh reference to `id`.
    pub fn reference(&self, id: ObjectId) -> Result<RemoteRef> {
        Ok(RemoteRef::new(id, self.epoch, self.type_str(id)?))
    }

    pub fn value(&self, id: ObjectId) -> Result<Value> {
        self.reference(id).map(Value::Remote)
    }

    /// The id behind a reference minted by this space.
    pub fn resolve(&self, target: &RemoteRef) -> Result<ObjectId> {
        if target.epoch() != self.epoch {
            return Err(Error::ForeignReference {
                expected: self.epoch,
                found: target.epoch(),
            });
        }
        self.slot(target.id())?;
        Ok(target.id())
    }

    /// The id behind a reference argument.
    pub fn resolve_value(&self, method: &str, value: &Value) -> Result<ObjectId> {
        match value {
            Value::Remote(target) => self.resolve(target),
            other => Err(Error::bad_argument(method, format!("expected an object, got {}", other.kind()))),
        }
    }

    pub fn instance(&self, id: ObjectId) -> Result<&Instance> {
        match self.slot(id)? {
            Slot::Instance(instance) => Ok(instance),
            _ => Err(Error::NoSuchObject(id)),
        }
    }

    pub fn instance_mut(&mut self, id: ObjectId) -> Result<&mut Instance> {
        match self.slots.get_mut(&id) {
            Some(Slot::Instance(instance)) => Ok(instance),
            _ => Err(Error::NoSuchObject(id)),
        }
    }

    pub fn attr(&self, id: ObjectId, name: &str) -> Option<Value> {
        self.instance(id).ok()?.attrs.get(name).cloned()
    }

    pub fn set(&mut self, id: ObjectId, name: &str, value: impl Into<Value>) -> Result<()> {
        self.instance_mut(id)?.attrs.insert(name.to_string(), value.into());
        Ok(())
    }

    /// Places `child` inside `parent`, moving it out of any previous parent.
    pub fn adopt(&mut self, parent: ObjectId, child: ObjectId) -> Result<()> {
        if let Some(previous) = self.instance(child)?.parent {
            if let Ok(previous) = self.instance_mut(previous) {
                previous.children.retain(|c| *c != child);
            }
        }
        self.instance_mut(child)?.parent = Some(parent);
        let parent = self.instance_mut(parent)?;
        if !parent.children.contains(&child) {
            parent.children.push(child);
        }
        Ok(())
    }

    /// A remote list holding references to `ids`.
    ///
    /// Lists with the same members share one slot.
    pub fn list_of(&mut self, ids: &[ObjectId]) -> Result<Value> {
        if let Some(list) = self.lists.get(ids) {
            return self.value(*list);
        }
        let items = ids.iter().map(|id| self.value(*id)).collect::<Result<Vec<_>>>()?;
        let list = self.insert(Slot::List(items));
        self.lists.insert(ids.to_vec(), list);
        self.value(list)
    }

    // --- Signals ---

    pub fn connect(&mut self, target: ObjectId, signal: &str, callback: CallbackId) {
        self.connections
            .entry((target, signal.to_string()))
            .or_default()
            .push(callback);
    }

    /// Queues `signal` of `source` for every connected callback.
    pub fn emit(&mut self, source: ObjectId, signal: &str, args: Vec<Value>) {
        let Some(callbacks) = self.connections.get(&(source, signal.to_string())) else {
            return;
        };
        let mut outbound = lock(&self.outbound);
        for callback in callbacks {
            outbound.push(Inbound::Signal {
                callback: *callback,
                args: args.clone(),
            });
        }
        tracing::debug!(source, signal, callbacks = callbacks.len(), "queued signal");
    }

    pub(crate) fn record(&self, target: &str, request: &str, blocking: bool) {
        let mut journal = lock(&self.journal);
        if journal.len() == JOURNAL_CAPACITY {
            journal.pop_front();
        }
        journal.push_back(JournalEntry {
            target: target.to_string(),
            request: request.to_string(),
            blocking,
        });
    }

    /// Short label of a slot for the journal.
    pub(crate) fn label(&self, id: ObjectId) -> String {
        match self.slots.get(&id) {
            Some(Slot::Module(name)) => name.clone(),
            Some(Slot::Class(kind)) => kind.name().to_string(),
            Some(Slot::Instance(instance)) => instance.kind.name().to_string(),
            Some(Slot::Method { name, .. }) => name.clone(),
            Some(Slot::List(_)) => "list".to_string(),
            None => format!("#{id}"),
        }
    }

    // --- Protocol ---

    pub fn import(&mut self, module: &str) -> Result<RemoteRef> {
        if module.split('.').next() != Some("farplot") {
            return Err(Error::NoModule(module.to_string()));
        }
        let id = match self.modules.get(module) {
            Some(id) => *id,
            None => {
                let id = self.insert(Slot::Module(module.to_string()));
                self.modules.insert(module.to_string(), id);
                id
            }
        };
        crate::toolkit::install(self)?;
        self.reference(id)
    }

    pub fn get_attr(&mut self, target: &RemoteRef, name: &str) -> Result<Value> {
        let id = self.resolve(target)?;
        let no_attribute = || Error::NoAttribute {
            type_str: target.type_str().to_string(),
            attr: name.to_string(),
        };

        match self.slot(id)? {
            // Methods win over stored state of the same name.
            Slot::Instance(instance) if instance.kind.has_method(name) => {}
            Slot::Instance(instance) => {
                return instance.attrs.get(name).cloned().ok_or_else(no_attribute);
            }
            Slot::Module(_) => {
                if name == "COLORMAPS" {
                    let mut map = BTreeMap::new();
                    for (cmap, cmap_id) in &self.colormaps {
                        map.insert(cmap.clone(), self.value(*cmap_id)?);
                    }
                    return Ok(Value::Map(map));
                }
                if let Some(kind) = Kind::from_name(name) {
                    let class = match self.classes.get(&kind) {
                        Some(class) => *class,
                        None => {
                            let class = self.insert(Slot::Class(kind));
                            self.classes.insert(kind, class);
                            class
                        }
                    };
                    return self.value(class);
                }
                if !crate::toolkit::MODULE_FUNCTIONS.contains(&name) {
                    return Err(no_attribute());
                }
            }
            Slot::Class(kind) => {
                if !kind.has_static(name) {
                    return Err(no_attribute());
                }
            }
            Slot::List(_) => {
                if name != "__len__" && name != "__getitem__" {
                    return Err(no_attribute());
                }
            }
            Slot::Method { .. } => return Err(no_attribute()),
        }

        let key = (id, name.to_string());
        let method = match self.bound.get(&key) {
            Some(method) => *method,
            None => {
                let method = self.insert(Slot::Method {
                    owner: id,
                    name: name.to_string(),
                });
                self.bound.insert(key, method);
                method
            }
        };
        self.value(method)
    }

    pub fn set_attr(&mut self, target: &RemoteRef, name: &str, value: Value) -> Result<()> {
        let id = self.resolve(target)?;
        match self.slots.get_mut(&id) {
            Some(Slot::Instance(instance)) => {
                instance.attrs.insert(name.to_string(), value);
                Ok(())
            }
            _ => Err(Error::NoAttribute {
                type_str: target.type_str().to_string(),
                attr: name.to_string(),
            }),
        }
    }

    pub fn is_callable(&self, target: &RemoteRef) -> Result<bool> {
        let id = self.resolve(target)?;
        Ok(matches!(self.slot(id)?, Slot::Method { .. } | Slot::Class(_)))
    }

    pub fn call(&mut self, target: &RemoteRef, method: &str, args: Args) -> Result<Value> {
        let id = self.resolve(target)?;
        self.call_id(id, method, args)
    }

    pub(crate) fn call_id(&mut self, id: ObjectId, method: &str, args: Args) -> Result<Value> {
        let no_method = |space: &Space| Error::NoMethod {
            type_name: space.label(id),
            method: method.to_string(),
        };

        match self.slot(id)? {
            Slot::Module(_) => {
                if let Some(kind) = Kind::from_name(method) {
                    let created = kind.construct(self, args)?;
                    return self.value(created);
                }
                crate::toolkit::call_module(self, method, args)
            }
            Slot::Class(kind) => {
                let kind = *kind;
                match method {
                    "__call__" => {
                        let created = kind.construct(self, args)?;
                        self.value(created)
                    }
                    _ if kind.has_static(method) => kind.call_static(self, method, args),
                    _ => Err(no_method(self)),
                }
            }
            Slot::Instance(instance) => {
                let kind = instance.kind;
                if !kind.has_method(method) {
                    return Err(no_method(self));
                }
                kind.call(self, id, method, args)
            }
            Slot::Method { owner, name } if method == "__call__" => {
                let (owner, name) = (*owner, name.clone());
                self.call_id(owner, &name, args)
            }
            Slot::List(items) => match method {
                "__len__" => Ok(Value::from(items.len())),
                "__getitem__" => {
                    let index = args
                        .param(0, "index")
                        .and_then(Value::as_i64)
                        .ok_or_else(|| Error::bad_argument("__getitem__", "index must be an integer"))?;
                    usize::try_from(index)
                        .ok()
                        .and_then(|i| items.get(i))
                        .cloned()
                        .ok_or_else(|| Error::bad_argument("__getitem__", format!("index {index} out of range")))
                }
                _ => Err(no_method(self)),
            },
            Slot::Method { .. } => Err(no_method(self)),
        }
    }
}
