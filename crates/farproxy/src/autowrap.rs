//! Upgrades values coming back from the worker into local wrappers.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::error::Error;
use crate::error::Result;
use crate::object::Object;
use crate::registry::type_name;
use crate::session::Session;
use crate::transport::DispatchMode;
use crate::value::Args;
use crate::value::RemoteRef;
use crate::value::Value;

/// Wraps every remote reference inside `value` whose type has a registered class.
///
/// Plain data and already wrapped objects pass through unchanged. Containers are
/// wrapped element-wise and keep their kind. Remote lists and tuples are copied
/// into local ones. References of unregistered types stay bare.
pub fn autowrap<'a>(session: &'a Arc<Session>, value: Value) -> BoxFuture<'a, Result<Value>> {
    async move {
        match value {
            Value::List(items) => Ok(Value::List(autowrap_all(session, items).await?)),
            Value::Tuple(items) => Ok(Value::Tuple(autowrap_all(session, items).await?)),
            Value::Map(map) => {
                let mut wrapped = std::collections::BTreeMap::new();
                for (key, item) in map {
                    wrapped.insert(key, autowrap(session, item).await?);
                }
                Ok(Value::Map(wrapped))
            }
            Value::Remote(remote) => autowrap_remote(session, remote).await,
            other => Ok(other),
        }
    }
    .boxed()
}

async fn autowrap_all(session: &Arc<Session>, items: Vec<Value>) -> Result<Vec<Value>> {
    let mut wrapped = Vec::with_capacity(items.len());
    for item in items {
        wrapped.push(autowrap(session, item).await?);
    }
    Ok(wrapped)
}

async fn autowrap_remote(session: &Arc<Session>, remote: RemoteRef) -> Result<Value> {
    let type_str = session.transport().type_name_of(&remote);
    let Some(name) = type_name(&type_str) else {
        return Ok(Value::Remote(remote));
    };

    match name {
        "list" => Ok(Value::List(expand(session, &remote).await?)),
        "tuple" => Ok(Value::Tuple(expand(session, &remote).await?)),
        _ => match session.registry().lookup(name) {
            Some(info) => {
                tracing::debug!(remote_type = name, class = info.name(), "autowrap");
                let object = Object::wrap_info(session, Arc::clone(info), Value::Remote(remote), Args::new()).await?;
                Ok(Value::Object(object))
            }
            None => Ok(Value::Remote(remote)),
        },
    }
}

/// Copies a remote sequence item by item.
async fn expand(session: &Arc<Session>, remote: &RemoteRef) -> Result<Vec<Value>> {
    let len = session
        .call(remote, "__len__", Args::new(), DispatchMode::Blocking)
        .await?;
    let len = len
        .as_i64()
        .ok_or_else(|| Error::type_mismatch("an integer length", len.kind()))?;

    let mut items = Vec::with_capacity(len.max(0) as usize);
    for index in 0..len {
        let item = session
            .call(remote, "__getitem__", Args::new().arg(index), DispatchMode::Blocking)
            .await?;
        items.push(autowrap(session, item).await?);
    }
    Ok(items)
}
