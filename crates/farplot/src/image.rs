//! Images over a setpoint grid, each paired with a histogram that sets its
//! color levels.

use farproxy::Args;
use farproxy::Class;
use farproxy::DispatchMode;
use farproxy::Error;
use farproxy::Lookup;
use farproxy::Object;
use farproxy::RemoteRef;
use farproxy::Result;
use farproxy::Role;
use farproxy::Value;
use farproxy::class::Property;
use farproxy::class::REMOTE_OBJECT;
use futures::FutureExt;
use futures::future::BoxFuture;

use crate::convert;
use crate::macros::wrapper;

/// Colormap of images created without one.
pub const DEFAULT_COLORMAP: &str = "viridis";

pub static BASE_IMAGE: Class = Class {
    parent: Some(&REMOTE_OBJECT),
    remote_type: Some("ImageItem"),
    dispatch: &[("setImage", DispatchMode::FireAndForget)],
    ..Class::new("BaseImage")
};

pub static EXTENDED_IMAGE: Class = Class {
    parent: Some(&BASE_IMAGE),
    remote_type: Some("ExtendedImageItem"),
    ..Class::new("ExtendedImage")
};

pub static IMAGE: Class = Class {
    parent: Some(&EXTENDED_IMAGE),
    remote_type: Some("ImageItemWithHistogram"),
    fields: &["_setpoint_x", "_setpoint_y", "_colormap", "_auto_levels", "_histogram"],
    local_args: &["setpoint_x", "setpoint_y", "colormap"],
    roles: &[("getHistogramLUTItem", Role::Query)],
    init: Some(image_init),
    wrap: Some(image_wrap),
    added: Some(image_added),
    ..Class::new("Image")
};

pub static HISTOGRAM: Class = Class {
    parent: Some(&REMOTE_OBJECT),
    remote_type: Some("HistogramLUTItem"),
    properties: &[Property {
        name: "allow_add",
        get: histogram_allow_add,
        set: Some(histogram_set_allow_add),
    }],
    dispatch: &[
        ("setLevels", DispatchMode::FireAndForget),
        ("imageChanged", DispatchMode::FireAndForget),
    ],
    ..Class::new("Histogram")
};

fn image_init<'a>(object: &'a Object, args: Args) -> BoxFuture<'a, Result<()>> {
    async move {
        let mut setpoints = Vec::with_capacity(2);
        for name in ["setpoint_x", "setpoint_y"] {
            let values = match args.named().get(name) {
                Some(value) => convert::floats(value, name)?,
                None => Vec::new(),
            };
            object.set_field(&format!("_{name}"), values.clone());
            object.setattr(name, values.clone()).await?;
            setpoints.push(values);
        }
        object.set_field("_auto_levels", true);

        if let [x, y] = setpoints.as_slice() {
            if let (Some(x0), Some(x1), Some(y0), Some(y1)) = (x.first(), x.last(), y.first(), y.last()) {
                let rect = Args::new().arg(*x0).arg(*y0).arg(x1 - x0).arg(y1 - y0);
                object.call("setRect", rect).await?;
            }
        }

        match args.named().get("colormap") {
            Some(name) => {
                let name = convert::string(name.clone(), "colormap")?;
                object.call("changeColorScale", Args::new().arg(name.as_str())).await?;
                object.set_field("_colormap", name);
            }
            None => object.set_field("_colormap", DEFAULT_COLORMAP),
        }
        Ok(())
    }
    .boxed()
}

fn image_wrap<'a>(object: &'a Object, _args: Args) -> BoxFuture<'a, Result<()>> {
    async move {
        for name in ["setpoint_x", "setpoint_y"] {
            let values = object.getattr_in(name, Lookup::Remote).await?;
            object.set_field(&format!("_{name}"), convert::floats(&values, name)?);
        }
        let colormap = object.getattr_in("cmap", Lookup::Remote).await?;
        object.set_field("_colormap", colormap);
        object.set_field("_auto_levels", true);
        Ok(())
    }
    .boxed()
}

/// Puts the histogram in whatever the image was added to.
fn image_added<'a>(object: &'a Object, parent: &'a Object) -> BoxFuture<'a, Result<()>> {
    async move {
        let histogram = paired_histogram(object).await?;
        parent.call("addItem", Args::new().arg(histogram)).await?;
        Ok(())
    }
    .boxed()
}

/// The image's histogram, fetched once and then kept in `_histogram` so its
/// call cache survives between updates.
async fn paired_histogram(object: &Object) -> Result<Value> {
    if let Some(histogram @ Value::Object(_)) = object.field("_histogram") {
        return Ok(histogram);
    }
    let histogram = object.call("getHistogramLUTItem", Args::new()).await?;
    object.set_field("_histogram", histogram.clone());
    Ok(histogram)
}

async fn gradient(object: &Object) -> Result<RemoteRef> {
    match object.getattr_in("gradient", Lookup::Remote).await? {
        Value::Remote(gradient) => Ok(gradient),
        other => Err(Error::type_mismatch("a gradient editor", other.kind())),
    }
}

fn histogram_allow_add<'a>(object: &'a Object) -> BoxFuture<'a, Result<Value>> {
    async move {
        let gradient = gradient(object).await?;
        object.session().get_attr(&gradient, "allowAdd").await
    }
    .boxed()
}

fn histogram_set_allow_add<'a>(object: &'a Object, value: Value) -> BoxFuture<'a, Result<()>> {
    async move {
        if value.as_bool().is_none() {
            return Err(Error::type_mismatch("a bool for allow_add", value.kind()));
        }
        let gradient = gradient(object).await?;
        object.session().set_attr(&gradient, "allowAdd", value).await
    }
    .boxed()
}

wrapper!(
    /// A 2D image over an x by y setpoint grid.
    Image => IMAGE
);

wrapper!(
    /// Color levels and gradient of one image.
    Histogram => HISTOGRAM
);

impl Image {
    /// `(x, y)` setpoints, as known locally.
    pub fn setpoints(&self) -> (Vec<f64>, Vec<f64>) {
        let read = |name| {
            self.field(name)
                .and_then(|value| value.to_f64s())
                .unwrap_or_default()
        };
        (read("_setpoint_x"), read("_setpoint_y"))
    }

    pub fn colormap(&self) -> String {
        self.field("_colormap")
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_else(|| DEFAULT_COLORMAP.to_string())
    }

    pub async fn set_colormap(&self, name: &str) -> Result<()> {
        self.call("changeColorScale", Args::new().arg(name)).await?;
        self.set_field("_colormap", name);
        Ok(())
    }

    pub fn auto_levels(&self) -> bool {
        self.field("_auto_levels").and_then(|v| v.as_bool()).unwrap_or(true)
    }

    /// Whether [`Image::update`] also moves the histogram levels to the data range.
    pub fn set_auto_levels(&self, enabled: bool) {
        self.set_field("_auto_levels", enabled);
    }

    /// The paired histogram. Only the first call asks the worker.
    pub async fn histogram(&self) -> Result<Histogram> {
        Histogram::from_value(paired_histogram(self).await?)
    }

    /// Replaces the image, one row per x setpoint. Does not wait for the worker.
    pub async fn update(&self, data: &[Vec<f64>]) -> Result<()> {
        let (x, y) = self.setpoints();
        if !x.is_empty() && data.len() != x.len() {
            return Err(Error::invalid_argument(
                "update",
                format!("{} rows for {} x setpoints", data.len(), x.len()),
            ));
        }
        let width = if y.is_empty() { data.first().map_or(0, Vec::len) } else { y.len() };
        if data.iter().any(|row| row.len() != width) {
            return Err(Error::invalid_argument("update", format!("every row needs {width} values")));
        }

        let rows = data.iter().map(|row| Value::Array(row.clone())).collect();
        self.call("setImage", Args::new().arg(Value::List(rows))).await?;

        if self.auto_levels() {
            if let Some((min, max)) = finite_range(data) {
                let histogram = self.histogram().await?;
                histogram.set_levels(min, max).await?;
                histogram.image_changed().await?;
            }
        }
        Ok(())
    }
}

fn finite_range(data: &[Vec<f64>]) -> Option<(f64, f64)> {
    let mut values = data.iter().flatten().copied().filter(|v| v.is_finite());
    let first = values.next()?;
    Some(values.fold((first, first), |(min, max), v| (min.min(v), max.max(v))))
}

impl Histogram {
    /// Does not wait for the worker.
    pub async fn set_levels(&self, min: f64, max: f64) -> Result<()> {
        if min > max {
            return Err(Error::invalid_argument("set_levels", format!("min {min} exceeds max {max}")));
        }
        self.call("setLevels", Args::new().arg(min).arg(max)).await?;
        Ok(())
    }

    pub async fn levels(&self) -> Result<(f64, f64)> {
        let levels = self.call("getLevels", Args::new()).await?;
        convert::float_pair(&levels, "getLevels")
    }

    /// Tells the histogram its image changed. Does not wait for the worker.
    pub async fn image_changed(&self) -> Result<()> {
        self.call("imageChanged", Args::new()).await?;
        Ok(())
    }

    /// Whether the user may add gradient ticks.
    pub async fn allow_add(&self) -> Result<bool> {
        let value = self.getattr("allow_add").await?;
        value
            .as_bool()
            .ok_or_else(|| Error::type_mismatch("a bool for allow_add", value.kind()))
    }

    pub async fn set_allow_add(&self, allow: bool) -> Result<()> {
        self.setattr("allow_add", allow).await
    }
}
