//! # Method resolution
//!
//! Turns a method name on an [`Object`] into something that can be invoked.
//!
//! ## Philosophy
//!
//! - **Local shadows remote**: A method declared on the class chain wins over any
//!   remote method of the same name. [`Object::call_remote`] reaches past it.
//! - **Roles act on results**: Creators record what they created, queries and
//!   plain methods only wrap. Roles never change how the call travels.
//! - **Resolve hot paths once**: Methods with a declared dispatch mode are bound
//!   on first use and cached on the object for its whole life. Everything else is
//!   resolved per call and blocks.

use std::sync::Arc;

use crate::autowrap::autowrap;
use crate::class::LocalMethod;
use crate::class::Role;
use crate::error::Error;
use crate::error::Result;
use crate::object::Object;
use crate::transport::DispatchMode;
use crate::value::Args;
use crate::value::RemoteRef;
use crate::value::Value;

/// A remote callable resolved against one receiver.
#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: RemoteRef,
    pub name: String,
    /// Reference to the bound callable in the worker.
    pub handle: RemoteRef,
    pub mode: DispatchMode,
}

/// A resolved method, ready to invoke.
#[derive(Clone, Debug)]
pub enum Method {
    Local {
        object: Object,
        def: &'static LocalMethod,
    },
    Remote {
        object: Object,
        bound: Arc<BoundMethod>,
        role: Role,
    },
}

impl Method {
    pub fn name(&self) -> &str {
        match self {
            Method::Local { def, .. } => def.name,
            Method::Remote { bound, .. } => &bound.name,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Method::Local { .. })
    }

    pub fn role(&self) -> Role {
        match self {
            Method::Local { .. } => Role::Plain,
            Method::Remote { role, .. } => *role,
        }
    }

    pub fn mode(&self) -> DispatchMode {
        match self {
            Method::Local { .. } => DispatchMode::Blocking,
            Method::Remote { bound, .. } => bound.mode,
        }
    }

    pub fn bound(&self) -> Option<&Arc<BoundMethod>> {
        match self {
            Method::Local { .. } => None,
            Method::Remote { bound, .. } => Some(bound),
        }
    }

    pub async fn invoke(&self, args: Args) -> Result<Value> {
        match self {
            Method::Local { object, def } => {
                object.check()?;
                (def.func)(object, args).await
            }
            Method::Remote { object, bound, role } => invoke_remote(object, bound, *role, args).await,
        }
    }
}

async fn invoke_remote(object: &Object, bound: &BoundMethod, role: Role, args: Args) -> Result<Value> {
    object.check()?;
    let session = object.session();
    let fallback = match role {
        Role::Creator => args.first().cloned(),
        _ => None,
    };

    let reply = session
        .call(&bound.receiver, &bound.name, args, bound.mode)
        .await
        .map_err(|e| object.translate(e, &bound.name))?;
    if bound.mode == DispatchMode::FireAndForget && role != Role::Creator {
        return Ok(Value::None);
    }

    let reply = autowrap(session, reply).await?;
    if role != Role::Creator {
        return Ok(reply);
    }

    let created = if reply.is_none() {
        let Some(first) = fallback else {
            return Err(Error::OwnershipInference {
                type_name: object.type_name().to_string(),
                method: bound.name.clone(),
            });
        };
        autowrap(session, first).await?
    } else {
        reply
    };
    tracing::debug!(object = object.type_name(), method = %bound.name, child = created.kind(), "creator result");
    object.adopt(created).await
}

impl Object {
    /// Resolves `name` to a local or remote method.
    pub async fn method(&self, name: &str) -> Result<Method> {
        self.check()?;
        if let Some(def) = self.class().method(name) {
            return Ok(Method::Local {
                object: self.clone(),
                def,
            });
        }
        self.remote_method(name).await
    }

    /// Resolves `name` on the worker, ignoring local methods.
    pub async fn remote_method(&self, name: &str) -> Result<Method> {
        self.check()?;
        let role = self.class().role(name);
        let override_mode = self.class().dispatch(name);

        if override_mode.is_some() {
            if let Some(bound) = self.cached(name) {
                return Ok(Method::Remote {
                    object: self.clone(),
                    bound,
                    role,
                });
            }
        }

        let handle = self.resolve_callable(name).await?;
        let mut bound = Arc::new(BoundMethod {
            receiver: self.remote().clone(),
            name: name.to_string(),
            handle,
            mode: override_mode.unwrap_or_default(),
        });
        if override_mode.is_some() {
            // First resolution wins if two raced.
            bound = Arc::clone(self.cache().entry(name.to_string()).or_insert(bound).value());
            tracing::debug!(object = self.type_name(), method = name, mode = ?bound.mode, "cached call options");
        }

        Ok(Method::Remote {
            object: self.clone(),
            bound,
            role,
        })
    }

    async fn resolve_callable(&self, name: &str) -> Result<RemoteRef> {
        let attr = self
            .session()
            .get_attr(self.remote(), name)
            .await
            .map_err(|e| self.translate(e, name))?;
        let not_callable = || Error::NotCallable {
            type_name: self.type_name().to_string(),
            attr: name.to_string(),
        };
        let Value::Remote(handle) = attr else {
            return Err(not_callable());
        };
        if !self.session().is_callable(&handle).await? {
            return Err(not_callable());
        }
        Ok(handle)
    }
}
