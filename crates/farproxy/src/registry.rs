//! # Type Registry
//!
//! Maps remote type names to the local classes that stand for them.
//!
//! ## Philosophy
//!
//! - **Explicit Registration**: Classes are handed to the registry by whoever sets the
//!   process up. Registering a class registers its ancestors too.
//! - **Resolved Once**: Each class is flattened into a [`ClassInfo`] at registration,
//!   so the hot path looks roles, dispatch modes and local members up in O(1)
//!   instead of walking the inheritance chain.
//! - **Abstract is fine**: A class without a remote type is resolved (its members
//!   are inherited) but never matched against remote objects.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;

use crate::class::AddedHook;
use crate::class::Class;
use crate::class::Hook;
use crate::class::LocalMethod;
use crate::class::Property;
use crate::class::Role;
use crate::error::Error;
use crate::error::Result;
use crate::transport::DispatchMode;

static TYPE_STR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^<(?:[A-Za-z_][A-Za-z0-9_]*\.)*([A-Za-z_][A-Za-z0-9_]*) object at 0x[0-9A-Fa-f]+>$")
        .expect("type string pattern is valid")
});

/// Extracts the short type name from a worker type string.
///
/// `<pyqtgraph.graphicsItems.PlotItem.PlotItem object at 0x7f10>` gives `PlotItem`.
/// Anything that is not an instance description (modules, classes, bound methods)
/// gives `None`.
pub fn type_name(type_str: &str) -> Option<&str> {
    TYPE_STR
        .captures(type_str)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// A class with its inheritance chain flattened.
pub struct ClassInfo {
    class: &'static Class,
    /// Root first.
    lineage: Vec<&'static Class>,
    fields: HashSet<&'static str>,
    local_args: Vec<&'static str>,
    properties: HashMap<&'static str, &'static Property>,
    methods: HashMap<&'static str, &'static LocalMethod>,
    roles: HashMap<&'static str, Role>,
    dispatch: HashMap<&'static str, DispatchMode>,
}

impl ClassInfo {
    /// Flattens `class`. Entries of a subclass override those of its ancestors.
    pub fn resolve(class: &'static Class) -> Self {
        let mut lineage: Vec<&'static Class> = class.ancestry().collect();
        lineage.reverse();

        let mut info = Self {
            class,
            lineage: lineage.clone(),
            fields: HashSet::new(),
            local_args: Vec::new(),
            properties: HashMap::new(),
            methods: HashMap::new(),
            roles: HashMap::new(),
            dispatch: HashMap::new(),
        };

        for c in lineage {
            info.fields.extend(c.fields.iter().copied());
            for arg in c.local_args {
                if !info.local_args.contains(arg) {
                    info.local_args.push(arg);
                }
            }
            info.properties.extend(c.properties.iter().map(|p| (p.name, p)));
            info.methods.extend(c.methods.iter().map(|m| (m.name, m)));
            info.roles.extend(c.roles.iter().copied());
            info.dispatch.extend(c.dispatch.iter().copied());
        }

        info
    }

    pub fn class(&self) -> &'static Class {
        self.class
    }

    pub fn name(&self) -> &'static str {
        self.class.name
    }

    pub fn remote_type(&self) -> Option<&'static str> {
        self.class.remote_type
    }

    /// Whether this class is `other` or inherits from it.
    pub fn is_a(&self, other: &'static Class) -> bool {
        self.lineage.iter().any(|c| std::ptr::eq(*c, other))
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains(name)
    }

    pub fn local_args(&self) -> &[&'static str] {
        &self.local_args
    }

    pub fn property(&self, name: &str) -> Option<&'static Property> {
        self.properties.get(name).copied()
    }

    pub fn method(&self, name: &str) -> Option<&'static LocalMethod> {
        self.methods.get(name).copied()
    }

    /// Declared role of a remote method; undeclared methods are [`Role::Plain`].
    pub fn role(&self, name: &str) -> Role {
        self.roles.get(name).copied().unwrap_or_default()
    }

    /// Declared dispatch override of a remote method.
    pub fn dispatch(&self, name: &str) -> Option<DispatchMode> {
        self.dispatch.get(name).copied()
    }

    /// `init` hooks, root first.
    pub fn init_hooks(&self) -> impl Iterator<Item = Hook> + '_ {
        self.lineage.iter().filter_map(|c| c.init)
    }

    /// `wrap` hooks, root first.
    pub fn wrap_hooks(&self) -> impl Iterator<Item = Hook> + '_ {
        self.lineage.iter().filter_map(|c| c.wrap)
    }

    /// `added` hooks, root first.
    pub fn added_hooks(&self) -> impl Iterator<Item = AddedHook> + '_ {
        self.lineage.iter().filter_map(|c| c.added)
    }
}

impl std::fmt::Debug for ClassInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassInfo")
            .field("name", &self.name())
            .field("remote_type", &self.remote_type())
            .finish()
    }
}

/// Remote type name to local class, for one process.
#[derive(Debug, Default)]
pub struct Registry {
    classes: HashMap<&'static str, Arc<ClassInfo>>,
    by_remote: HashMap<&'static str, Arc<ClassInfo>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Resolved info of a registered class.
    pub fn info(&self, class: &'static Class) -> Result<Arc<ClassInfo>> {
        self.classes
            .get(class.name)
            .filter(|info| std::ptr::eq(info.class(), class))
            .cloned()
            .ok_or(Error::UnknownClass(class.name))
    }

    /// The class registered for a short remote type name.
    pub fn lookup(&self, remote_type: &str) -> Option<&Arc<ClassInfo>> {
        self.by_remote.get(remote_type)
    }

    /// The class registered for a full worker type string.
    pub fn resolve(&self, type_str: &str) -> Option<&Arc<ClassInfo>> {
        type_name(type_str).and_then(|name| self.lookup(name))
    }

    /// Number of registered classes, abstract ones included.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Names of the remote types that have a local wrapper.
    pub fn remote_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.by_remote.keys().copied()
    }

    fn insert(&mut self, class: &'static Class) -> Result<()> {
        if let Some(existing) = self.classes.get(class.name) {
            if std::ptr::eq(existing.class(), class) {
                return Ok(());
            }
            return Err(Error::DuplicateClass(class.name));
        }

        let info = Arc::new(ClassInfo::resolve(class));
        if let Some(remote_type) = class.remote_type {
            if let Some(existing) = self.by_remote.get(remote_type) {
                return Err(Error::DuplicateRemoteType {
                    remote_type,
                    first: existing.name(),
                    second: class.name,
                });
            }
            self.by_remote.insert(remote_type, info.clone());
        }
        self.classes.insert(class.name, info);
        Ok(())
    }
}

/// Collects classes before the registry is built.
#[derive(Default)]
pub struct RegistryBuilder {
    classes: Vec<&'static Class>,
}

impl RegistryBuilder {
    pub fn register(mut self, class: &'static Class) -> Self {
        self.classes.push(class);
        self
    }

    pub fn register_all(mut self, classes: impl IntoIterator<Item = &'static Class>) -> Self {
        self.classes.extend(classes);
        self
    }

    /// Resolves every class and its ancestors.
    ///
    /// Fails if two distinct classes share a name or a remote type.
    pub fn build(self) -> Result<Registry> {
        let mut registry = Registry::default();
        for class in self.classes {
            // Ancestors first, so a subclass never shadows an unregistered base.
            let mut chain: Vec<&'static Class> = class.ancestry().collect();
            chain.reverse();
            for c in chain {
                registry.insert(c)?;
            }
        }
        tracing::debug!(
            classes = registry.len(),
            remote_types = registry.by_remote.len(),
            "built type registry"
        );
        Ok(registry)
    }
}
