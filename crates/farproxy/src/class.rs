//! # Wrapper class declarations
//!
//! A [`Class`] is the static description of one local wrapper type: which remote
//! type it stands for, what it answers locally, and how its remote methods are
//! intercepted. Classes form a single-inheritance chain through `parent`.
//!
//! Declarations are plain statics:
//!
//! ```ignore
//! pub static PLOT_ITEM: Class = Class {
//!     parent: Some(&BASE_PLOT_ITEM),
//!     remote_type: Some("ExtendedPlotItem"),
//!     roles: &[("listDataItems", Role::Query)],
//!     ..Class::new("PlotItem")
//! };
//! ```

use futures::future::BoxFuture;

use crate::error::Result;
use crate::object::Object;
use crate::transport::DispatchMode;
use crate::value::Args;
use crate::value::Value;

/// Runs after construction (`init`) or after wrapping an existing reference (`wrap`).
pub type Hook = for<'a> fn(&'a Object, Args) -> BoxFuture<'a, Result<()>>;

/// Runs when the object is placed inside `parent` by a creator method.
pub type AddedHook = for<'a> fn(&'a Object, &'a Object) -> BoxFuture<'a, Result<()>>;

pub type Getter = for<'a> fn(&'a Object) -> BoxFuture<'a, Result<Value>>;

pub type Setter = for<'a> fn(&'a Object, Value) -> BoxFuture<'a, Result<()>>;

pub type MethodFn = for<'a> fn(&'a Object, Args) -> BoxFuture<'a, Result<Value>>;

/// How the result of a remote method is treated.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Role {
    /// Creates or registers a child inside the receiver. The result is wrapped and
    /// recorded as owned by the receiver.
    Creator,
    /// Only reads. The result is wrapped; nothing is recorded.
    Query,
    /// Anything else. The result is wrapped.
    #[default]
    Plain,
}

/// A property answered locally. Reading it never touches the worker unless the
/// getter itself does.
pub struct Property {
    pub name: &'static str,
    pub get: Getter,
    pub set: Option<Setter>,
}

/// A method answered locally. It shadows any remote method with the same name.
pub struct LocalMethod {
    pub name: &'static str,
    pub func: MethodFn,
}

impl std::fmt::Debug for Property {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("writable", &self.set.is_some())
            .finish()
    }
}

impl std::fmt::Debug for LocalMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("LocalMethod").field(&self.name).finish()
    }
}

/// Static declaration of a wrapper type.
pub struct Class {
    /// Local type name, used in errors and registry keys.
    pub name: &'static str,
    pub parent: Option<&'static Class>,
    /// Short name of the remote type. `None` marks an abstract class.
    pub remote_type: Option<&'static str>,
    /// Local instance fields; writes to these never reach the worker.
    pub fields: &'static [&'static str],
    /// Named constructor arguments consumed locally and handed to `init`.
    pub local_args: &'static [&'static str],
    pub properties: &'static [Property],
    pub methods: &'static [LocalMethod],
    pub roles: &'static [(&'static str, Role)],
    /// Remote methods that do not use the default blocking dispatch.
    pub dispatch: &'static [(&'static str, DispatchMode)],
    pub init: Option<Hook>,
    pub wrap: Option<Hook>,
    pub added: Option<AddedHook>,
}

impl Class {
    /// An abstract class with nothing declared.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            parent: None,
            remote_type: None,
            fields: &[],
            local_args: &[],
            properties: &[],
            methods: &[],
            roles: &[],
            dispatch: &[],
            init: None,
            wrap: None,
            added: None,
        }
    }

    /// This class followed by its ancestors, nearest first.
    pub fn ancestry(&'static self) -> impl Iterator<Item = &'static Class> {
        std::iter::successors(Some(self), |class| class.parent)
    }

    pub fn is_abstract(&self) -> bool {
        self.remote_type.is_none()
    }
}

impl std::fmt::Debug for Class {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("remote_type", &self.remote_type)
            .field("parent", &self.parent.map(|p| p.name))
            .finish()
    }
}

/// Root of every wrapper hierarchy.
pub static REMOTE_OBJECT: Class = Class::new("RemoteObject");
