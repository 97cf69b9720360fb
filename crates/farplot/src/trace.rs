//! Line traces.
//!
//! A trace is created over a fixed set of x setpoints. The controller then
//! streams y data with [`Trace::update`], fire-and-forget, and the worker drops
//! points that are not measured yet (NaN) and breaks the line there.

use farproxy::Args;
use farproxy::Class;
use farproxy::DispatchMode;
use farproxy::Error;
use farproxy::Lookup;
use farproxy::Object;
use farproxy::Result;
use farproxy::class::REMOTE_OBJECT;
use futures::FutureExt;
use futures::future::BoxFuture;

use crate::convert;
use crate::macros::wrapper;

pub static BASE_DATA_ITEM: Class = Class {
    parent: Some(&REMOTE_OBJECT),
    remote_type: Some("PlotDataItem"),
    dispatch: &[("setData", DispatchMode::FireAndForget)],
    ..Class::new("DataItem")
};

pub static TRACE: Class = Class {
    parent: Some(&BASE_DATA_ITEM),
    remote_type: Some("ExtendedPlotDataItem"),
    fields: &["_setpoints"],
    local_args: &["setpoints"],
    dispatch: &[("update", DispatchMode::FireAndForget)],
    init: Some(trace_init),
    wrap: Some(trace_wrap),
    ..Class::new("Trace")
};

fn trace_init<'a>(object: &'a Object, args: Args) -> BoxFuture<'a, Result<()>> {
    async move {
        let setpoints = match args.named().get("setpoints") {
            Some(value) => convert::floats(value, "setpoints")?,
            None => Vec::new(),
        };
        object.set_field("_setpoints", setpoints.clone());
        // The worker pairs every update with these.
        object.setattr("setpoint_x", setpoints).await
    }
    .boxed()
}

fn trace_wrap<'a>(object: &'a Object, _args: Args) -> BoxFuture<'a, Result<()>> {
    async move {
        let setpoints = object.getattr_in("setpoint_x", Lookup::Remote).await?;
        let setpoints = convert::floats(&setpoints, "setpoint_x")?;
        object.set_field("_setpoints", setpoints);
        Ok(())
    }
    .boxed()
}

wrapper!(
    /// A line over fixed x setpoints.
    Trace => TRACE
);

impl Trace {
    /// The x setpoints, as known locally.
    pub fn setpoints(&self) -> Vec<f64> {
        self.field("_setpoints")
            .and_then(|value| value.to_f64s())
            .unwrap_or_default()
    }

    /// Replaces the y data. Does not wait for the worker.
    ///
    /// `data` has one value per setpoint; NaN marks points not measured yet.
    pub async fn update(&self, data: &[f64]) -> Result<()> {
        let expected = self.setpoints().len();
        if data.len() != expected {
            return Err(Error::invalid_argument(
                "update",
                format!("{} values for {expected} setpoints", data.len()),
            ));
        }
        self.call("update", Args::new().arg(data)).await?;
        Ok(())
    }

    /// Replaces both coordinates. Does not wait for the worker.
    pub async fn set_data(&self, x: &[f64], y: &[f64]) -> Result<()> {
        if x.len() != y.len() {
            return Err(Error::invalid_argument(
                "set_data",
                format!("x has {} points but y has {}", x.len(), y.len()),
            ));
        }
        self.call("setData", Args::new().arg(x).arg(y)).await?;
        Ok(())
    }

    /// What the worker currently draws, as `(x, y)`.
    pub async fn data(&self) -> Result<(Vec<f64>, Vec<f64>)> {
        let x = self.getattr_in("xData", Lookup::Remote).await?;
        let y = self.getattr_in("yData", Lookup::Remote).await?;
        Ok((convert::floats(&x, "xData")?, convert::floats(&y, "yData")?))
    }
}
