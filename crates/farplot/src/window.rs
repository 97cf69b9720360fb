//! Top-level plot windows.
//!
//! A [`PlotWindow`] is tracked by the context from the moment it opens. It
//! leaves the live list when it is closed from here, or when the user closes it
//! in the worker and the `sigClosed` signal comes through the pump.

use farproxy::Args;
use farproxy::Class;
use farproxy::Context;
use farproxy::DispatchMode;
use farproxy::Error;
use farproxy::Result;
use farproxy::Role;
use farproxy::Value;
use farproxy::class::REMOTE_OBJECT;

use crate::convert;
use crate::macros::wrapper;
use crate::plot::PLOT_ITEM;
use crate::plot::PlotItem;

pub static GRAPHICS_LAYOUT_WIDGET: Class = Class {
    parent: Some(&REMOTE_OBJECT),
    remote_type: Some("GraphicsLayoutWidget"),
    roles: &[
        ("addItem", Role::Creator),
        ("getItem", Role::Query),
        ("getLayoutItems", Role::Query),
    ],
    ..Class::new("GraphicsLayoutWidget")
};

pub static PLOT_WINDOW: Class = Class {
    parent: Some(&GRAPHICS_LAYOUT_WIDGET),
    remote_type: Some("ExtendedPlotWindow"),
    ..Class::new("PlotWindow")
};

/// File formats a window can be exported to.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ExportKind {
    #[default]
    Image,
    Svg,
}

impl ExportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportKind::Image => "image",
            ExportKind::Svg => "svg",
        }
    }
}

wrapper!(
    /// A top-level window holding a grid of plots.
    PlotWindow => PLOT_WINDOW
);

impl PlotWindow {
    /// Opens a window titled `title` and tracks it in `ctx`.
    pub async fn new(ctx: &Context, title: &str) -> Result<Self> {
        let window = Self(ctx.construct(&PLOT_WINDOW, Args::new()).await?);
        window.set_title(title).await?;
        window.call("show", Args::new()).await?;

        let remote = window.remote().clone();
        window
            .connect(
                "sigClosed",
                Box::new(move |ctx: &Context, _args: &[Value]| {
                    if ctx.deregister_window(&remote) {
                        tracing::info!(window = %remote, "window closed in the worker");
                    }
                    Ok(())
                }),
            )
            .await?;

        ctx.register_window(&window);
        Ok(window)
    }

    /// Every plot window the worker has open, including ones this context
    /// did not create.
    pub async fn remote_windows(ctx: &Context) -> Result<Vec<Self>> {
        let session = ctx.session().await?;
        let class = match session.get_attr(session.namespace(), "ExtendedPlotWindow").await? {
            Value::Remote(class) => class,
            other => return Err(Error::type_mismatch("the window class", other.kind())),
        };
        let windows = session
            .call(&class, "getWindows", Args::new(), DispatchMode::Blocking)
            .await?;
        let windows = farproxy::autowrap(&session, windows).await?;
        convert::list(windows, "getWindows")?
            .into_iter()
            .map(Self::from_value)
            .collect()
    }

    /// The live window whose title, or the title of one of its plots, ends
    /// with `(id: <id>)`.
    pub async fn find_by_id(ctx: &Context, id: u64) -> Result<Option<Self>> {
        let suffix = format!("(id: {id})");
        for window in ctx.windows() {
            let window = Self::from_object(window)?;
            if window.title().await?.ends_with(&suffix) {
                return Ok(Some(window));
            }
            for plot in window.plots().await? {
                if plot.title().await?.ends_with(&suffix) {
                    return Ok(Some(window));
                }
            }
        }
        Ok(None)
    }

    pub async fn title(&self) -> Result<String> {
        convert::string(self.call("windowTitle", Args::new()).await?, "windowTitle")
    }

    pub async fn set_title(&self, title: &str) -> Result<()> {
        self.call("setWindowTitle", Args::new().arg(title)).await?;
        Ok(())
    }

    /// `(width, height)` in pixels.
    pub async fn size(&self) -> Result<(i64, i64)> {
        let size = self.call("size", Args::new()).await?;
        let (width, height) = convert::float_pair(&size, "size")?;
        Ok((width as i64, height as i64))
    }

    pub async fn resize(&self, width: i64, height: i64) -> Result<()> {
        self.call("resize", Args::new().arg(width).arg(height)).await?;
        Ok(())
    }

    /// Adds a new plot in the next free row.
    pub async fn add_plot(&self, title: &str) -> Result<PlotItem> {
        let plot = self
            .session()
            .construct(&PLOT_ITEM, Args::new().kwarg("title", title))
            .await?;
        let added = self.call("addItem", Args::new().arg(plot)).await?;
        PlotItem::from_value(added)
    }

    /// Items in the layout, oldest first.
    pub async fn items(&self) -> Result<Vec<Value>> {
        convert::list(self.call("getLayoutItems", Args::new()).await?, "getLayoutItems")
    }

    pub async fn plots(&self) -> Result<Vec<PlotItem>> {
        Ok(self
            .items()
            .await?
            .into_iter()
            .filter_map(|item| PlotItem::from_value(item).ok())
            .collect())
    }

    /// The item at a layout cell, if any.
    pub async fn item_at(&self, row: i64, col: i64) -> Result<Option<Value>> {
        let item = self.call("getItem", Args::new().arg(row).arg(col)).await?;
        Ok((!item.is_none()).then_some(item))
    }

    /// Writes the window to `path`. Returns the path the worker wrote.
    pub async fn export(&self, path: &str, kind: ExportKind) -> Result<String> {
        let written = self
            .call("export", Args::new().arg(path).arg(kind.as_str()))
            .await?;
        convert::string(written, "export")
    }

    /// Closes the window and stops tracking it.
    pub async fn close(&self, ctx: &Context) -> Result<()> {
        self.call("close", Args::new()).await?;
        ctx.deregister_window(self.remote());
        Ok(())
    }
}
