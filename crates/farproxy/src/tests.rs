//! Tests for the proxy layer against a scripted transport.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::class::Class;
use crate::class::LocalMethod;
use crate::class::Property;
use crate::class::Role;
use crate::context::Context;
use crate::error::Error;
use crate::error::Result;
use crate::object::Lookup;
use crate::object::Object;
use crate::registry::Registry;
use crate::registry::type_name;
use crate::transport;
use crate::transport::CallbackId;
use crate::transport::DispatchMode;
use crate::transport::Inbound;
use crate::transport::Spawner;
use crate::transport::Transport;
use crate::value::Args;
use crate::value::RemoteRef;
use crate::value::Value;

// --- Scripted worker ---

enum Kind {
    Module,
    Instance(&'static str),
    Method,
    List(Vec<Value>),
}

struct Entry {
    kind: Kind,
    type_str: String,
    attrs: HashMap<String, Value>,
    children: Vec<Value>,
}

#[derive(Default)]
struct World {
    next_id: u64,
    objects: HashMap<u64, Entry>,
    log: Vec<String>,
    connections: HashMap<(u64, String), Vec<CallbackId>>,
    inbound: Vec<Inbound>,
}

fn methods_of(class: &str) -> &'static [&'static str] {
    match class {
        "Panel" => &["addWidget", "makeWidget", "widgets", "pair", "render", "poke", "count", "emit"],
        "Widget" => &["setValue"],
        _ => &[],
    }
}

/// A worker that answers a fixed set of classes from memory.
struct MockTransport {
    epoch: u64,
    world: Mutex<World>,
    closed: AtomicBool,
}

impl MockTransport {
    fn new(epoch: u64) -> Self {
        Self {
            epoch,
            world: Mutex::new(World::default()),
            closed: AtomicBool::new(false),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn log(&self) -> Vec<String> {
        self.world.lock().unwrap().log.clone()
    }

    fn count(&self, entry: &str) -> usize {
        self.world.lock().unwrap().log.iter().filter(|e| *e == entry).count()
    }

    fn remote_attr(&self, target: &RemoteRef, name: &str) -> Option<Value> {
        let world = self.world.lock().unwrap();
        world.objects.get(&target.id())?.attrs.get(name).cloned()
    }

    fn mint(&self, world: &mut World, kind: Kind) -> RemoteRef {
        world.next_id += 1;
        let id = world.next_id;
        let type_str = match &kind {
            Kind::Module => "<module 'mock.ns'>".to_string(),
            Kind::Instance(class) => format!("<mock.{class} object at 0x{id:x}>"),
            Kind::Method => format!("<bound method at 0x{id:x}>"),
            Kind::List(_) => format!("<list object at 0x{id:x}>"),
        };
        world.objects.insert(
            id,
            Entry {
                kind,
                type_str: type_str.clone(),
                attrs: HashMap::new(),
                children: Vec::new(),
            },
        );
        RemoteRef::new(id, self.epoch, type_str)
    }

    fn check(&self) -> transport::Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(transport::Error::ChannelClosed);
        }
        Ok(())
    }

    fn dispatch(&self, target: &RemoteRef, method: &str, args: Args) -> transport::Result<Value> {
        let mut world = self.world.lock().unwrap();
        world.log.push(format!("call {method}"));
        let kind = match &world.objects[&target.id()].kind {
            Kind::Module => "module",
            Kind::Instance(class) => *class,
            Kind::Method => "method",
            Kind::List(_) => "list",
        };

        match (kind, method) {
            ("module", "Panel" | "Widget" | "Gizmo") => {
                let class = match method {
                    "Panel" => "Panel",
                    "Widget" => "Widget",
                    _ => "Gizmo",
                };
                let created = self.mint(&mut world, Kind::Instance(class));
                let (_, named) = args.into_parts();
                world.objects.get_mut(&created.id()).unwrap().attrs.extend(named);
                Ok(Value::Remote(created))
            }
            ("module", "setConfigOption") => {
                let key = args.positional()[0].as_str().unwrap().to_string();
                let value = args.positional()[1].clone();
                world.objects.get_mut(&target.id()).unwrap().attrs.insert(key, value);
                Ok(Value::None)
            }
            ("Panel", "addWidget") => {
                if let Some(child) = args.first().cloned() {
                    world.objects.get_mut(&target.id()).unwrap().children.push(child);
                }
                Ok(Value::None)
            }
            ("Panel", "makeWidget") => {
                let created = self.mint(&mut world, Kind::Instance("Widget"));
                let entry = world.objects.get_mut(&target.id()).unwrap();
                entry.children.push(Value::Remote(created.clone()));
                Ok(Value::Remote(created))
            }
            ("Panel", "widgets") => {
                let children = world.objects[&target.id()].children.clone();
                Ok(Value::Remote(self.mint(&mut world, Kind::List(children))))
            }
            ("Panel", "pair") => {
                let widget = self.mint(&mut world, Kind::Instance("Widget"));
                let gizmo = self.mint(&mut world, Kind::Instance("Gizmo"));
                Ok(Value::Tuple(vec![Value::Remote(widget), Value::Remote(gizmo)]))
            }
            ("Panel", "render" | "poke") => {
                let entry = world.objects.get_mut(&target.id()).unwrap();
                let counter = entry.attrs.entry(format!("{method}s")).or_insert(Value::Int(0));
                let next = counter.as_i64().unwrap() + 1;
                *counter = Value::Int(next);
                Ok(Value::Int(next))
            }
            ("Panel", "count") => Ok(Value::Int(world.objects[&target.id()].children.len() as i64)),
            ("Panel", "emit") => {
                let signal = args.positional()[0].as_str().unwrap().to_string();
                let callbacks = world.connections.get(&(target.id(), signal)).cloned().unwrap_or_default();
                for callback in callbacks {
                    world.inbound.push(Inbound::Signal {
                        callback,
                        args: vec![Value::Remote(target.clone()), Value::Int(7)],
                    });
                }
                Ok(Value::None)
            }
            ("Widget", "setValue") => {
                let value = args.positional()[0].clone();
                world.objects.get_mut(&target.id()).unwrap().attrs.insert("value".into(), value);
                Ok(Value::None)
            }
            ("list", "__len__") => match &world.objects[&target.id()].kind {
                Kind::List(items) => Ok(Value::Int(items.len() as i64)),
                _ => unreachable!(),
            },
            ("list", "__getitem__") => {
                let index = args.positional()[0].as_i64().unwrap() as usize;
                match &world.objects[&target.id()].kind {
                    Kind::List(items) => Ok(items[index].clone()),
                    _ => unreachable!(),
                }
            }
            _ => Err(transport::Error::Remote(format!("{kind} has no method {method}"))),
        }
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn call(
        &self,
        target: &RemoteRef,
        method: &str,
        args: Args,
        mode: DispatchMode,
    ) -> transport::Result<Option<Value>> {
        self.check()?;
        let reply = self.dispatch(target, method, args)?;
        match mode {
            DispatchMode::Blocking => Ok(Some(reply)),
            DispatchMode::FireAndForget => Ok(None),
        }
    }

    async fn get_attr(&self, target: &RemoteRef, name: &str) -> transport::Result<Value> {
        self.check()?;
        let mut world = self.world.lock().unwrap();
        world.log.push(format!("get {name}"));
        let entry = &world.objects[&target.id()];
        if let Some(value) = entry.attrs.get(name) {
            return Ok(value.clone());
        }
        let is_method = match entry.kind {
            Kind::Instance(class) => methods_of(class).iter().any(|m| *m == name),
            _ => false,
        };
        if !is_method {
            return Err(transport::Error::AttributeNotFound {
                type_str: entry.type_str.clone(),
                attr: name.to_string(),
            });
        }
        Ok(Value::Remote(self.mint(&mut world, Kind::Method)))
    }

    async fn set_attr(&self, target: &RemoteRef, name: &str, value: Value) -> transport::Result<()> {
        self.check()?;
        let mut world = self.world.lock().unwrap();
        world.log.push(format!("set {name}"));
        world.objects.get_mut(&target.id()).unwrap().attrs.insert(name.to_string(), value);
        Ok(())
    }

    async fn import(&self, _module: &str) -> transport::Result<RemoteRef> {
        self.check()?;
        let mut world = self.world.lock().unwrap();
        Ok(self.mint(&mut world, Kind::Module))
    }

    async fn is_callable(&self, target: &RemoteRef) -> transport::Result<bool> {
        self.check()?;
        let world = self.world.lock().unwrap();
        Ok(matches!(world.objects[&target.id()].kind, Kind::Method))
    }

    async fn connect(&self, target: &RemoteRef, signal: &str, callback: CallbackId) -> transport::Result<()> {
        self.check()?;
        let mut world = self.world.lock().unwrap();
        world
            .connections
            .entry((target.id(), signal.to_string()))
            .or_default()
            .push(callback);
        Ok(())
    }

    fn drain_inbound(&self) -> Vec<Inbound> {
        std::mem::take(&mut self.world.lock().unwrap().inbound)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[derive(Default)]
struct MockSpawner {
    spawned: Mutex<Vec<Arc<MockTransport>>>,
}

impl MockSpawner {
    fn latest(&self) -> Arc<MockTransport> {
        self.spawned.lock().unwrap().last().cloned().unwrap()
    }

    fn count(&self) -> usize {
        self.spawned.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Spawner for MockSpawner {
    async fn spawn(&self, epoch: u64) -> transport::Result<Arc<dyn Transport>> {
        let transport = Arc::new(MockTransport::new(epoch));
        self.spawned.lock().unwrap().push(Arc::clone(&transport));
        Ok(transport as Arc<dyn Transport>)
    }
}

// --- Test classes ---

fn base_init<'a>(object: &'a Object, args: Args) -> BoxFuture<'a, Result<()>> {
    async move {
        object.set_field("_origin", "init");
        if let Some(label) = args.named().get("label") {
            object.set_field("label", label.clone());
        }
        Ok(())
    }
    .boxed()
}

fn base_wrap<'a>(object: &'a Object, _args: Args) -> BoxFuture<'a, Result<()>> {
    async move {
        object.set_field("_origin", "wrap");
        Ok(())
    }
    .boxed()
}

fn panel_title<'a>(object: &'a Object) -> BoxFuture<'a, Result<Value>> {
    async move { Ok(object.field("_title").unwrap_or_else(|| Value::from("untitled"))) }.boxed()
}

fn panel_set_title<'a>(object: &'a Object, value: Value) -> BoxFuture<'a, Result<()>> {
    async move {
        object.set_field("_title", value);
        Ok(())
    }
    .boxed()
}

fn panel_kind<'a>(_object: &'a Object) -> BoxFuture<'a, Result<Value>> {
    async move { Ok(Value::from("panel")) }.boxed()
}

fn panel_describe<'a>(object: &'a Object, _args: Args) -> BoxFuture<'a, Result<Value>> {
    async move { Ok(Value::from(format!("panel #{}", object.remote().id()))) }.boxed()
}

fn panel_count<'a>(object: &'a Object, args: Args) -> BoxFuture<'a, Result<Value>> {
    async move {
        let remote = object.call_remote("count", args).await?;
        Ok(Value::Int(remote.as_i64().unwrap_or_default() * 2))
    }
    .boxed()
}

fn widget_added<'a>(object: &'a Object, parent: &'a Object) -> BoxFuture<'a, Result<()>> {
    async move {
        if parent.field("_title") == Some(Value::from("sealed")) {
            return Err(Error::type_mismatch("an open panel", "a sealed panel"));
        }
        object.set_field("_added_to", parent.type_name());
        Ok(())
    }
    .boxed()
}

static BASE: Class = Class {
    fields: &["_origin", "label"],
    local_args: &["label"],
    init: Some(base_init),
    wrap: Some(base_wrap),
    ..Class::new("Base")
};

static PANEL: Class = Class {
    parent: Some(&BASE),
    remote_type: Some("Panel"),
    fields: &["_title"],
    properties: &[
        Property {
            name: "title",
            get: panel_title,
            set: Some(panel_set_title),
        },
        Property {
            name: "kind",
            get: panel_kind,
            set: None,
        },
    ],
    methods: &[
        LocalMethod {
            name: "describe",
            func: panel_describe,
        },
        LocalMethod {
            name: "count",
            func: panel_count,
        },
    ],
    roles: &[
        ("addWidget", Role::Creator),
        ("makeWidget", Role::Creator),
        ("widgets", Role::Query),
    ],
    dispatch: &[("render", DispatchMode::Blocking), ("poke", DispatchMode::FireAndForget)],
    ..Class::new("Panel")
};

static WIDGET: Class = Class {
    parent: Some(&BASE),
    remote_type: Some("Widget"),
    added: Some(widget_added),
    ..Class::new("Widget")
};

static OTHER_WIDGET: Class = Class {
    remote_type: Some("Widget"),
    ..Class::new("OtherWidget")
};

fn context() -> (Context, Arc<MockSpawner>) {
    let spawner = Arc::new(MockSpawner::default());
    let ctx = Context::builder(spawner.clone())
        .remote_module("mock.ns")
        .register(&PANEL)
        .register(&WIDGET)
        .build();
    (ctx, spawner)
}

async fn panel(ctx: &Context) -> Object {
    ctx.construct(&PANEL, Args::new()).await.unwrap()
}

// --- Registry ---

#[test]
fn test_type_names_parse_instances_only() {
    assert_eq!(
        type_name("<pyqtgraph.graphicsItems.PlotItem.PlotItem object at 0x7f10aa>"),
        Some("PlotItem")
    );
    assert_eq!(type_name("<list object at 0x10>"), Some("list"));
    assert_eq!(type_name("<bound method at 0x10>"), None);
    assert_eq!(type_name("<module 'mock.ns'>"), None);
    assert_eq!(type_name("<class 'mock.Panel'>"), None);
}

#[test]
fn test_registering_a_class_registers_its_ancestors() {
    let registry = Registry::builder().register(&PANEL).build().unwrap();
    assert_eq!(registry.len(), 2);
    assert!(registry.info(&BASE).is_ok());
    assert_eq!(registry.lookup("Panel").map(|i| i.name()), Some("Panel"));
    assert_eq!(registry.remote_types().collect::<Vec<_>>(), vec!["Panel"]);
    assert_eq!(
        registry.resolve("<mock.Panel object at 0x1>").map(|i| i.name()),
        Some("Panel")
    );
}

#[test]
fn test_registering_the_same_class_twice_is_fine() {
    let registry = Registry::builder().register(&PANEL).register(&PANEL).build().unwrap();
    assert_eq!(registry.len(), 2);
}

#[test]
fn test_duplicate_remote_type_is_rejected() {
    let err = Registry::builder()
        .register(&WIDGET)
        .register(&OTHER_WIDGET)
        .build()
        .unwrap_err();
    assert!(matches!(
        err,
        Error::DuplicateRemoteType {
            remote_type: "Widget",
            first: "Widget",
            second: "OtherWidget"
        }
    ));
}

#[test]
fn test_subclass_entries_override_ancestors() {
    let registry = Registry::builder().register(&PANEL).build().unwrap();
    let info = registry.info(&PANEL).unwrap();
    assert!(info.has_field("_origin"));
    assert!(info.has_field("_title"));
    assert_eq!(info.local_args(), &["label"]);
    assert_eq!(info.role("addWidget"), Role::Creator);
    assert_eq!(info.role("render"), Role::Plain);
    assert_eq!(info.dispatch("poke"), Some(DispatchMode::FireAndForget));
    assert_eq!(info.dispatch("count"), None);
    assert!(info.is_a(&BASE));
    assert_eq!(info.init_hooks().count(), 1);
}

// --- Construction and wrapping ---

#[tokio::test]
async fn test_construct_runs_init_hooks_with_local_args() {
    let (ctx, spawner) = context();
    let panel = ctx
        .construct(&PANEL, Args::new().kwarg("label", "left").kwarg("size", 3))
        .await
        .unwrap();

    assert_eq!(panel.field("_origin"), Some(Value::from("init")));
    assert_eq!(panel.field("label"), Some(Value::from("left")));

    let transport = spawner.latest();
    assert_eq!(transport.remote_attr(panel.remote(), "size"), Some(Value::Int(3)));
    assert_eq!(transport.remote_attr(panel.remote(), "label"), None);
}

#[tokio::test]
async fn test_wrap_runs_wrap_hooks_not_init() {
    let (ctx, _spawner) = context();
    let created = panel(&ctx).await;
    let wrapped = ctx.wrap(&PANEL, Value::Remote(created.remote().clone())).await.unwrap();

    assert_eq!(wrapped.field("_origin"), Some(Value::from("wrap")));
    assert_eq!(wrapped, created);
    assert!(!wrapped.ptr_eq(&created));
}

#[tokio::test]
async fn test_wrap_rejects_plain_values_and_abstract_classes() {
    let (ctx, _spawner) = context();
    let err = ctx.wrap(&PANEL, Value::Int(3)).await.unwrap_err();
    assert!(matches!(err, Error::NotARemote { class: "Panel", found: "int" }));

    let created = panel(&ctx).await;
    let err = ctx.wrap(&BASE, Value::from(created.remote().clone())).await.unwrap_err();
    assert!(matches!(err, Error::AbstractClass("Base")));

    let err = ctx.construct(&BASE, Args::new()).await.unwrap_err();
    assert!(matches!(err, Error::AbstractClass("Base")));

    let err = ctx.construct(&OTHER_WIDGET, Args::new()).await.unwrap_err();
    assert!(matches!(err, Error::UnknownClass("OtherWidget")));
}

#[tokio::test]
async fn test_first_session_applies_config_options() {
    let spawner = Arc::new(MockSpawner::default());
    let ctx = Context::builder(spawner.clone())
        .config_option("background", "k")
        .config_option("useOpenGL", true)
        .build();
    let session = ctx.session().await.unwrap();
    let transport = spawner.latest();

    assert_eq!(ctx.epoch(), 1);
    assert_eq!(
        transport.remote_attr(session.namespace(), "background"),
        Some(Value::from("k"))
    );
    assert_eq!(
        transport.remote_attr(session.namespace(), "antialias"),
        Some(Value::Bool(true))
    );
    assert_eq!(
        transport.remote_attr(session.namespace(), "useOpenGL"),
        Some(Value::Bool(true))
    );
    assert_eq!(transport.count("call setConfigOption"), 5);
}

// --- Attribute protocol ---

#[tokio::test]
async fn test_local_properties_never_reach_the_worker() {
    let (ctx, spawner) = context();
    let panel = panel(&ctx).await;
    let transport = spawner.latest();
    let before = transport.log().len();

    assert_eq!(panel.getattr("title").await.unwrap(), Value::from("untitled"));
    panel.setattr("title", "Sweep").await.unwrap();
    assert_eq!(panel.getattr("title").await.unwrap(), Value::from("Sweep"));
    // Declared but unset fields fall through to the worker.
    assert!(matches!(panel.getattr("label").await, Err(Error::NoSuchAttribute { .. })));

    assert_eq!(transport.log().len(), before + 1);
}

#[tokio::test]
async fn test_read_only_properties_reject_writes() {
    let (ctx, _spawner) = context();
    let panel = panel(&ctx).await;
    assert_eq!(panel.getattr("kind").await.unwrap(), Value::from("panel"));
    let err = panel.setattr("kind", "other").await.unwrap_err();
    assert!(matches!(err, Error::ReadOnly { .. }));
}

#[tokio::test]
async fn test_fields_stay_local_and_the_rest_goes_remote() {
    let (ctx, spawner) = context();
    let panel = panel(&ctx).await;
    let transport = spawner.latest();

    panel.setattr("label", "mine").await.unwrap();
    panel.setattr("opacity", 0.5).await.unwrap();

    assert_eq!(panel.field("label"), Some(Value::from("mine")));
    assert_eq!(transport.remote_attr(panel.remote(), "label"), None);
    assert_eq!(transport.remote_attr(panel.remote(), "opacity"), Some(Value::Float(0.5)));
    assert_eq!(panel.getattr("opacity").await.unwrap(), Value::Float(0.5));
    assert_eq!(
        panel.getattr_in("opacity", Lookup::Local).await.unwrap_err().to_string(),
        "'Panel' object has no attribute 'opacity'"
    );
}

#[tokio::test]
async fn test_remote_lookup_skips_local_properties() {
    let (ctx, _spawner) = context();
    let panel = panel(&ctx).await;
    let err = panel.getattr_in("title", Lookup::Remote).await.unwrap_err();
    assert!(matches!(err, Error::NoSuchAttribute { .. }));
}

#[tokio::test]
async fn test_missing_attributes_name_the_local_type() {
    let (ctx, _spawner) = context();
    let panel = panel(&ctx).await;
    let err = panel.getattr("nope").await.unwrap_err();
    assert!(matches!(
        err,
        Error::NoSuchAttribute { ref type_name, ref attr } if type_name == "Panel" && attr == "nope"
    ));
}

#[tokio::test]
async fn test_local_methods_are_not_attributes() {
    let (ctx, _spawner) = context();
    let panel = panel(&ctx).await;
    let err = panel.getattr("describe").await.unwrap_err();
    assert!(matches!(err, Error::LocalMethod { .. }));
    assert!(err.to_string().contains("call(\"describe\""));
    assert!(panel.method("describe").await.is_ok());
    let described = panel.call("describe", Args::new()).await.unwrap();
    assert_eq!(described, Value::from(format!("panel #{}", panel.remote().id())));
}

#[tokio::test]
async fn test_data_attributes_are_not_callable() {
    let (ctx, _spawner) = context();
    let panel = panel(&ctx).await;
    panel.setattr("opacity", 0.5).await.unwrap();
    let err = panel.call("opacity", Args::new()).await.unwrap_err();
    assert!(matches!(err, Error::NotCallable { .. }));
}

#[tokio::test]
async fn test_local_methods_can_delegate_to_their_remote_namesake() {
    let (ctx, _spawner) = context();
    let panel = panel(&ctx).await;
    panel.call("makeWidget", Args::new()).await.unwrap();
    panel.call("makeWidget", Args::new()).await.unwrap();

    assert_eq!(panel.call("count", Args::new()).await.unwrap(), Value::Int(4));
    assert_eq!(panel.call_remote("count", Args::new()).await.unwrap(), Value::Int(2));
}

// --- Ownership ---

#[tokio::test]
async fn test_creators_record_and_notify_what_they_return() {
    let (ctx, _spawner) = context();
    let panel = panel(&ctx).await;
    let made = panel.call("makeWidget", Args::new()).await.unwrap();
    let widget = made.as_object().unwrap();

    assert_eq!(widget.type_name(), "Widget");
    assert_eq!(widget.field("_origin"), Some(Value::from("wrap")));
    assert_eq!(widget.field("_added_to"), Some(Value::from("Panel")));
    assert_eq!(widget.parent(), Some(panel.clone()));
    assert_eq!(panel.owned_items(), vec![made.clone()]);
}

#[tokio::test]
async fn test_creators_returning_nothing_record_their_first_argument() {
    let (ctx, _spawner) = context();
    let panel = panel(&ctx).await;
    let widget = ctx.construct(&WIDGET, Args::new()).await.unwrap();

    let added = panel.call("addWidget", Args::new().arg(&widget)).await.unwrap();
    assert_eq!(added, Value::from(&widget));
    assert_eq!(widget.parent(), Some(panel.clone()));

    panel.call("addWidget", Args::new().arg(&widget)).await.unwrap();
    assert_eq!(panel.owned_items().len(), 1);
}

#[tokio::test]
async fn test_creators_without_result_or_argument_fail() {
    let (ctx, _spawner) = context();
    let panel = panel(&ctx).await;
    let err = panel
        .call("addWidget", Args::new().kwarg("item", Value::None))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::OwnershipInference { ref method, .. } if method == "addWidget"));
}

#[tokio::test]
async fn test_adding_elsewhere_moves_the_child() {
    let (ctx, _spawner) = context();
    let first = panel(&ctx).await;
    let second = panel(&ctx).await;
    let widget = ctx.construct(&WIDGET, Args::new()).await.unwrap();

    first.call("addWidget", Args::new().arg(&widget)).await.unwrap();
    second.call("addWidget", Args::new().arg(&widget)).await.unwrap();

    assert!(first.owned_items().is_empty());
    assert_eq!(second.owned_items(), vec![Value::from(&widget)]);
    assert_eq!(widget.parent(), Some(second.clone()));

    assert!(second.release(&Value::from(&widget)));
    assert!(second.owned_items().is_empty());
    assert_eq!(widget.parent(), None);
}

#[tokio::test]
async fn test_re_adding_a_queried_handle_moves_it() {
    let (ctx, _spawner) = context();
    let first = panel(&ctx).await;
    let second = panel(&ctx).await;
    let made = first.call("makeWidget", Args::new()).await.unwrap();

    let Value::List(listed) = first.call("widgets", Args::new()).await.unwrap() else {
        panic!("expected a local list");
    };
    let queried = listed[0].as_object().unwrap().clone();
    assert!(!queried.ptr_eq(made.as_object().unwrap()));
    assert_eq!(queried.parent(), Some(first.clone()));

    second.call("addWidget", Args::new().arg(&queried)).await.unwrap();

    assert!(first.owned_items().is_empty());
    assert_eq!(second.owned_items(), vec![Value::from(&queried)]);
    assert_eq!(queried.parent(), Some(second.clone()));
    assert_eq!(made.as_object().unwrap().parent(), Some(second.clone()));
}

#[tokio::test]
async fn test_failed_added_hook_leaves_ownership_alone() {
    let (ctx, _spawner) = context();
    let first = panel(&ctx).await;
    let sealed = panel(&ctx).await;
    sealed.setattr("title", "sealed").await.unwrap();
    let widget = ctx.construct(&WIDGET, Args::new()).await.unwrap();
    first.call("addWidget", Args::new().arg(&widget)).await.unwrap();

    let err = sealed.call("addWidget", Args::new().arg(&widget)).await.unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { .. }));

    assert!(sealed.owned_items().is_empty());
    assert_eq!(first.owned_items(), vec![Value::from(&widget)]);
    assert_eq!(widget.parent(), Some(first.clone()));
}

#[tokio::test]
async fn test_dropping_the_owner_clears_the_parent() {
    let (ctx, _spawner) = context();
    let widget = ctx.construct(&WIDGET, Args::new()).await.unwrap();
    {
        let owner = panel(&ctx).await;
        owner.call("addWidget", Args::new().arg(&widget)).await.unwrap();
        assert!(widget.parent().is_some());
    }
    assert_eq!(widget.parent(), None);
}

#[tokio::test]
async fn test_queries_leave_ownership_alone() {
    let (ctx, _spawner) = context();
    let panel = panel(&ctx).await;
    panel.call("makeWidget", Args::new()).await.unwrap();
    let owned = panel.owned_items();

    let listed = panel.call("widgets", Args::new()).await.unwrap();
    let Value::List(items) = listed else {
        panic!("expected a local list, got {listed:?}");
    };
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].as_object().map(Object::type_name), Some("Widget"));
    assert_eq!(panel.owned_items(), owned);
}

// --- Call options ---

#[tokio::test]
async fn test_declared_dispatch_is_resolved_once() {
    let (ctx, spawner) = context();
    let panel = panel(&ctx).await;
    let transport = spawner.latest();

    let first = panel.method("render").await.unwrap();
    let second = panel.method("render").await.unwrap();
    assert!(Arc::ptr_eq(first.bound().unwrap(), second.bound().unwrap()));

    assert_eq!(first.invoke(Args::new()).await.unwrap(), Value::Int(1));
    assert_eq!(panel.call("render", Args::new()).await.unwrap(), Value::Int(2));
    assert_eq!(transport.count("get render"), 1);
    assert!(panel.cached("render").is_some());
}

#[tokio::test]
async fn test_undeclared_methods_are_not_cached() {
    let (ctx, spawner) = context();
    let panel = panel(&ctx).await;
    let transport = spawner.latest();

    panel.call("makeWidget", Args::new()).await.unwrap();
    panel.call("makeWidget", Args::new()).await.unwrap();
    assert_eq!(transport.count("get makeWidget"), 2);
    assert!(panel.cached("makeWidget").is_none());
    assert_eq!(panel.method("makeWidget").await.unwrap().mode(), DispatchMode::Blocking);
}

#[tokio::test]
async fn test_fire_and_forget_returns_nothing() {
    let (ctx, spawner) = context();
    let panel = panel(&ctx).await;
    assert_eq!(panel.call("poke", Args::new()).await.unwrap(), Value::None);
    assert_eq!(panel.call("poke", Args::new()).await.unwrap(), Value::None);
    assert_eq!(spawner.latest().remote_attr(panel.remote(), "pokes"), Some(Value::Int(2)));
}

// --- Autowrap ---

#[tokio::test]
async fn test_autowrap_keeps_sequence_kinds_and_bare_unknowns() {
    let (ctx, _spawner) = context();
    let panel = panel(&ctx).await;

    let pair = panel.call("pair", Args::new()).await.unwrap();
    let Value::Tuple(items) = pair else {
        panic!("expected a tuple, got {pair:?}");
    };
    assert_eq!(items[0].as_object().map(Object::type_name), Some("Widget"));
    assert!(matches!(items[1], Value::Remote(_)));

    let again = ctx.autowrap(Value::Tuple(items.clone())).await.unwrap();
    assert_eq!(again, Value::Tuple(items));
}

#[tokio::test]
async fn test_autowrap_is_idempotent_on_objects() {
    let (ctx, _spawner) = context();
    let panel = panel(&ctx).await;
    let wrapped = ctx.autowrap(Value::from(&panel)).await.unwrap();
    assert!(wrapped.as_object().unwrap().ptr_eq(&panel));
}

// --- Lifecycle ---

#[tokio::test]
async fn test_dead_worker_is_replaced_and_old_objects_go_stale() {
    let (ctx, spawner) = context();
    let old = panel(&ctx).await;
    spawner.latest().close();

    let err = old.call("render", Args::new()).await.unwrap_err();
    assert!(matches!(err, Error::Transport(transport::Error::ChannelClosed)));

    let fresh = panel(&ctx).await;
    assert_eq!(spawner.count(), 2);
    assert_eq!(ctx.epoch(), 2);
    assert_eq!(fresh.remote().epoch(), 2);
    assert!(old.session().is_retired());

    let err = old.getattr("title").await.unwrap_err();
    assert!(matches!(err, Error::StaleObject { epoch: 1, .. }));
    let err = ctx.wrap(&PANEL, Value::from(old.remote().clone())).await.unwrap_err();
    assert!(matches!(err, Error::StaleObject { .. }));
}

#[tokio::test]
async fn test_live_windows_are_cleared_on_respawn() {
    let (ctx, spawner) = context();
    let window = panel(&ctx).await;
    ctx.register_window(&window);
    ctx.register_window(&window);
    assert_eq!(ctx.windows().len(), 1);

    spawner.latest().close();
    panel(&ctx).await;
    assert!(ctx.windows().is_empty());
}

// --- Signals ---

#[tokio::test]
async fn test_signals_run_callbacks_when_processed() {
    let (ctx, _spawner) = context();
    let panel = panel(&ctx).await;
    let seen = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&seen);
    let id = panel
        .connect(
            "sigFired",
            Box::new(move |_ctx: &Context, args: &[Value]| {
                sink.lock().unwrap().push(args.to_vec());
                Ok(())
            }),
        )
        .await
        .unwrap();

    panel.call("emit", Args::new().arg("sigFired")).await.unwrap();
    assert!(seen.lock().unwrap().is_empty());

    assert_eq!(ctx.process_events().await.unwrap(), 1);
    let seen_args = seen.lock().unwrap()[0].clone();
    assert!(seen_args[0].as_object().unwrap() == &panel);
    assert_eq!(seen_args[1], Value::Int(7));

    assert!(panel.disconnect(id));
    panel.call("emit", Args::new().arg("sigFired")).await.unwrap();
    assert_eq!(ctx.process_events().await.unwrap(), 0);
}

#[tokio::test]
async fn test_failing_callbacks_do_not_starve_the_rest() {
    let (ctx, _spawner) = context();
    let panel = panel(&ctx).await;
    let ran = Arc::new(Mutex::new(0));

    panel
        .connect(
            "sigFired",
            Box::new(|_: &Context, _: &[Value]| Err(Error::invalid_argument("sigFired", "boom"))),
        )
        .await
        .unwrap();
    let counter = Arc::clone(&ran);
    panel
        .connect(
            "sigFired",
            Box::new(move |_: &Context, _: &[Value]| {
                *counter.lock().unwrap() += 1;
                Ok(())
            }),
        )
        .await
        .unwrap();

    panel.call("emit", Args::new().arg("sigFired")).await.unwrap();
    assert!(matches!(ctx.process_events().await, Err(Error::InvalidArgument { .. })));
    assert_eq!(*ran.lock().unwrap(), 1);
}
