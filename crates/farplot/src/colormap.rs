//! Color maps.

use farproxy::Args;
use farproxy::Class;
use farproxy::Context;
use farproxy::Error;
use farproxy::Object;
use farproxy::Result;
use farproxy::Role;
use farproxy::Value;
use farproxy::class::REMOTE_OBJECT;
use futures::FutureExt;
use futures::future::BoxFuture;

use crate::convert;
use crate::macros::wrapper;

pub static COLOR_MAP: Class = Class {
    parent: Some(&REMOTE_OBJECT),
    remote_type: Some("ColorMap"),
    fields: &["_name"],
    local_args: &["name"],
    roles: &[("getLookupTable", Role::Query)],
    init: Some(colormap_init),
    ..Class::new("ColorMap")
};

fn colormap_init<'a>(object: &'a Object, args: Args) -> BoxFuture<'a, Result<()>> {
    async move {
        let name = args.named().get("name").cloned().unwrap_or_else(|| Value::from("custom"));
        object.set_field("_name", name);
        Ok(())
    }
    .boxed()
}

wrapper!(
    /// Maps `[0, 1]` onto colors by interpolating between stops.
    ColorMap => COLOR_MAP
);

impl ColorMap {
    /// A new map with one color per position. Positions ascend.
    pub async fn new(ctx: &Context, name: &str, positions: &[f64], colors: &[[u8; 3]]) -> Result<Self> {
        if positions.len() < 2 || positions.len() != colors.len() {
            return Err(Error::invalid_argument(
                "ColorMap::new",
                format!("{} positions for {} colors", positions.len(), colors.len()),
            ));
        }
        let colors = colors
            .iter()
            .map(|rgb| Value::Tuple(rgb.iter().map(|c| Value::Int(i64::from(*c))).collect()))
            .collect();
        let args = Args::new()
            .arg(positions)
            .arg(Value::List(colors))
            .kwarg("name", name);
        Ok(Self(ctx.construct(&COLOR_MAP, args).await?))
    }

    /// One of the maps the worker ships with, such as `viridis` or `gray`.
    pub async fn builtin(ctx: &Context, name: &str) -> Result<Self> {
        let session = ctx.session().await?;
        let mut maps = match session.get_attr(session.namespace(), "COLORMAPS").await? {
            Value::Map(maps) => maps,
            other => return Err(Error::type_mismatch("a map of colormaps", other.kind())),
        };
        let Some(found) = maps.remove(name) else {
            return Err(Error::invalid_argument("ColorMap::builtin", format!("unknown colormap '{name}'")));
        };
        let colormap = Self::from_value(farproxy::autowrap(&session, found).await?)?;
        colormap.set_field("_name", name);
        Ok(colormap)
    }

    pub fn name(&self) -> String {
        self.field("_name")
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_default()
    }

    /// `points` RGB colors spread evenly from `start` to `stop`.
    pub async fn lookup_table(&self, start: f64, stop: f64, points: usize) -> Result<Vec<[u8; 3]>> {
        let table = self
            .call("getLookupTable", Args::new().arg(start).arg(stop).arg(points))
            .await?;
        convert::list(table, "getLookupTable")?
            .iter()
            .map(|color| {
                let rgb = convert::floats(color, "getLookupTable")?;
                match rgb.as_slice() {
                    [r, g, b, ..] => Ok([channel(*r), channel(*g), channel(*b)]),
                    _ => Err(Error::type_mismatch("an RGB color", format!("{} channels", rgb.len()))),
                }
            })
            .collect()
    }
}

fn channel(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
