//! # Farplot
//!
//! Live plots for measurement scripts. Windows, traces and images live in a
//! worker; this crate hands out typed local handles to them.
//!
//! ```rust,ignore
//! let (ctx, _spawner) = farplot::loopback();
//! let window = PlotWindow::new(&ctx, "Sweep (id: 12)").await?;
//! let plot = window.add_plot("Current").await?;
//! let trace = plot.plot_line(&setpoints, None).await?;
//! trace.update(&data).await?;
//! ```
//!
//! Hot-path updates (`Trace::update`, `Image::update`) do not wait for the
//! worker. Everything else does.

mod convert;
mod macros;

pub mod colormap;
pub mod image;
pub mod plot;
pub mod text;
pub mod trace;
pub mod window;

use std::sync::Arc;

use farproxy::Class;
use farproxy::Context;
use farproxy::ContextBuilder;
use farproxy::Spawner;
use farworker::LoopbackSpawner;

pub use colormap::ColorMap;
pub use image::Histogram;
pub use image::Image;
pub use plot::Axis;
pub use plot::PlotItem;
pub use text::Corner;
pub use text::TextBox;
pub use trace::Trace;
pub use window::ExportKind;
pub use window::PlotWindow;

/// Every wrapper class, for registration.
pub static CLASSES: &[&Class] = &[
    &window::GRAPHICS_LAYOUT_WIDGET,
    &window::PLOT_WINDOW,
    &plot::BASE_PLOT_ITEM,
    &plot::PLOT_ITEM,
    &plot::AXIS,
    &trace::BASE_DATA_ITEM,
    &trace::TRACE,
    &image::BASE_IMAGE,
    &image::EXTENDED_IMAGE,
    &image::IMAGE,
    &image::HISTOGRAM,
    &colormap::COLOR_MAP,
    &text::TEXT_BOX,
];

/// A context builder with every wrapper class registered.
pub fn builder(spawner: Arc<dyn Spawner>) -> ContextBuilder {
    Context::builder(spawner).register_all(CLASSES.iter().copied())
}

/// A context backed by in-process loopback workers.
///
/// Must be called inside a tokio runtime before the first plot is created.
pub fn loopback() -> (Context, LoopbackSpawner) {
    let spawner = LoopbackSpawner::new();
    let ctx = builder(Arc::new(spawner.clone())).build();
    (ctx, spawner)
}
