//! # Process Context
//!
//! Everything the proxy layer keeps per controller process: settings, the
//! registry, the current worker session and the windows that are still open.
//!
//! ## Lifecycle
//!
//! The first construction spawns a worker, imports the remote plotting module
//! and applies the baseline configuration. If the worker has died by the next
//! construction, its session is retired (live windows and callbacks cleared,
//! epoch bumped) and a fresh worker is spawned. Objects of the old session are
//! never re-pointed at the new worker.
//!
//! # Example
//!
//! ```rust,ignore
//! let ctx = Context::builder(spawner)
//!     .register_all(farplot::CLASSES.iter().copied())
//!     .config_option("background", "k")
//!     .build();
//! let window = ctx.construct(&PLOT_WINDOW, Args::new()).await?;
//! ```

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::OnceLock;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::autowrap::autowrap;
use crate::class::Class;
use crate::error::Error;
use crate::error::Result;
use crate::object::Object;
use crate::object::lock;
use crate::registry::Registry;
use crate::session::Session;
use crate::transport::DispatchMode;
use crate::transport::Inbound;
use crate::transport::Spawner;
use crate::value::Args;
use crate::value::RemoteRef;
use crate::value::Value;

/// A controller-side signal handler. Runs on the task that processes events.
pub type Callback = Box<dyn FnMut(&Context, &[Value]) -> Result<()> + Send>;

/// Tunables for one context.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Module the worker imports to build plot objects.
    pub remote_module: String,
    /// `setConfigOption` calls applied to every new worker, in order.
    pub config_options: Vec<(String, Value)>,
    /// Period of [`crate::Pump::tick`].
    pub pump_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            remote_module: "farplot.remote".to_string(),
            config_options: vec![
                ("background".to_string(), Value::from("w")),
                ("foreground".to_string(), Value::from("k")),
                ("leftButtonPan".to_string(), Value::from(false)),
                ("antialias".to_string(), Value::from(true)),
            ],
            pump_interval: Duration::from_millis(50),
        }
    }
}

/// Fluent builder for [`Context`].
pub struct ContextBuilder {
    spawner: Arc<dyn Spawner>,
    settings: Settings,
    classes: Vec<&'static Class>,
}

impl ContextBuilder {
    pub fn remote_module(mut self, module: impl Into<String>) -> Self {
        self.settings.remote_module = module.into();
        self
    }

    /// Sets a baseline option, replacing an earlier value for the same key.
    pub fn config_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.settings.config_options.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.settings.config_options.push((key, value)),
        }
        self
    }

    pub fn clear_config_options(mut self) -> Self {
        self.settings.config_options.clear();
        self
    }

    pub fn register(mut self, class: &'static Class) -> Self {
        self.classes.push(class);
        self
    }

    pub fn register_all(mut self, classes: impl IntoIterator<Item = &'static Class>) -> Self {
        self.classes.extend(classes);
        self
    }

    pub fn pump_interval(mut self, interval: Duration) -> Self {
        self.settings.pump_interval = interval;
        self
    }

    /// Nothing is spawned or resolved until first use.
    pub fn build(self) -> Context {
        Context {
            inner: Arc::new(ContextInner {
                settings: self.settings,
                spawner: self.spawner,
                classes: self.classes,
                registry: OnceLock::new(),
                spawning: tokio::sync::Mutex::new(()),
                current: Mutex::new(None),
                epoch: AtomicU64::new(0),
                windows: Mutex::new(Vec::new()),
            }),
        }
    }
}

/// Shared handle to the process context. Clones are cheap.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    settings: Settings,
    spawner: Arc<dyn Spawner>,
    classes: Vec<&'static Class>,
    registry: OnceLock<Arc<Registry>>,
    /// Held while a worker is being started.
    spawning: tokio::sync::Mutex<()>,
    current: Mutex<Option<Arc<Session>>>,
    epoch: AtomicU64,
    windows: Mutex<Vec<Object>>,
}

impl Context {
    pub fn builder(spawner: Arc<dyn Spawner>) -> ContextBuilder {
        ContextBuilder {
            spawner,
            settings: Settings::default(),
            classes: Vec::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    /// The registry, built from the registered classes on first use.
    pub fn registry(&self) -> Result<Arc<Registry>> {
        if let Some(registry) = self.inner.registry.get() {
            return Ok(Arc::clone(registry));
        }
        let built = Arc::new(
            Registry::builder()
                .register_all(self.inner.classes.iter().copied())
                .build()?,
        );
        Ok(Arc::clone(self.inner.registry.get_or_init(|| built)))
    }

    /// Epoch of the most recently spawned worker; `0` before the first spawn.
    pub fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::Acquire)
    }

    /// The current session, if one has been started and not retired.
    pub fn current_session(&self) -> Option<Arc<Session>> {
        lock(&self.inner.current).clone()
    }

    /// A live session, spawning or respawning the worker as needed.
    pub async fn session(&self) -> Result<Arc<Session>> {
        let _spawning = self.inner.spawning.lock().await;

        if let Some(session) = self.current_session() {
            if session.is_alive() {
                return Ok(session);
            }
            tracing::warn!(epoch = session.epoch(), "worker is gone, retiring its session");
            self.retire(&session);
        }

        let registry = self.registry()?;
        let epoch = self.inner.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        let module = &self.inner.settings.remote_module;
        tracing::info!(epoch, module = %module, "spawning worker");

        let transport = self.inner.spawner.spawn(epoch).await.map_err(Error::Spawn)?;
        let namespace = transport.import(module).await?;
        let session = Arc::new(Session::new(epoch, transport, namespace, registry));

        for (key, value) in &self.inner.settings.config_options {
            session
                .call(
                    session.namespace(),
                    "setConfigOption",
                    Args::new().arg(key.as_str()).arg(value.clone()),
                    DispatchMode::Blocking,
                )
                .await?;
        }

        *lock(&self.inner.current) = Some(Arc::clone(&session));
        tracing::info!(epoch, "worker ready");
        Ok(session)
    }

    fn retire(&self, session: &Arc<Session>) {
        session.retire();
        lock(&self.inner.windows).clear();
        let mut current = lock(&self.inner.current);
        if current.as_ref().is_some_and(|c| Arc::ptr_eq(c, session)) {
            *current = None;
        }
    }

    /// Creates a new remote object of `class` in a live worker.
    pub async fn construct(&self, class: &'static Class, args: Args) -> Result<Object> {
        self.session().await?.construct(class, args).await
    }

    /// Wraps an existing reference as `class`.
    pub async fn wrap(&self, class: &'static Class, value: Value) -> Result<Object> {
        let session = self.session().await?;
        Object::wrap(&session, class, value).await
    }

    /// Wraps whatever in `value` has a registered class.
    pub async fn autowrap(&self, value: Value) -> Result<Value> {
        let session = self.session().await?;
        autowrap(&session, value).await
    }

    // --- Live windows ---

    /// Adds a top-level window to the live list; registering twice is a no-op.
    pub fn register_window(&self, window: &Object) {
        let mut windows = lock(&self.inner.windows);
        if !windows.iter().any(|w| w == window) {
            windows.push(window.clone());
        }
    }

    /// Removes a window from the live list. Returns whether it was there.
    pub fn deregister_window(&self, window: &RemoteRef) -> bool {
        let mut windows = lock(&self.inner.windows);
        let before = windows.len();
        windows.retain(|w| w.remote() != window);
        windows.len() != before
    }

    /// Windows still open, oldest first.
    pub fn windows(&self) -> Vec<Object> {
        lock(&self.inner.windows).clone()
    }

    // --- Events ---

    /// Runs the callbacks of every signal the worker has queued.
    ///
    /// Never waits for the worker. Every queued signal is handled even if a
    /// callback fails; the first failure is returned. Returns how many
    /// callbacks ran.
    pub async fn process_events(&self) -> Result<usize> {
        let Some(session) = self.current_session() else {
            return Ok(0);
        };

        let mut handled = 0;
        let mut first_error = None;
        for inbound in session.transport().drain_inbound() {
            let Inbound::Signal { callback, args } = inbound;
            let Some(mut run) = session.take_callback(callback) else {
                tracing::debug!(%callback, "signal for a disconnected callback");
                continue;
            };

            let result = match autowrap(&session, Value::List(args)).await {
                Ok(Value::List(args)) => run(self, &args),
                Ok(other) => Err(Error::type_mismatch("signal arguments", other.kind())),
                Err(e) => Err(e),
            };
            session.restore_callback(callback, run);
            handled += 1;

            if let Err(e) = result {
                tracing::warn!(%callback, error = %e, "signal callback failed");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(handled),
        }
    }

    /// Closes every live window and lets the worker go.
    pub async fn shutdown(&self) -> Result<()> {
        let _spawning = self.inner.spawning.lock().await;
        let Some(session) = self.current_session() else {
            return Ok(());
        };

        let mut first_error = None;
        if session.is_alive() {
            for window in self.windows() {
                if let Err(e) = window.call_remote("close", Args::new()).await {
                    first_error.get_or_insert(e);
                }
            }
        }
        self.retire(&session);
        tracing::info!(epoch = session.epoch(), "context shut down");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("settings", &self.inner.settings)
            .field("epoch", &self.epoch())
            .field("windows", &lock(&self.inner.windows).len())
            .finish()
    }
}
