//! The plotting toolkit served by the worker.
//!
//! A deliberately small stand-in for a real GUI toolkit: windows with a grid
//! layout, plot items with axes, line traces, images with a histogram, color
//! maps and text boxes. Nothing is drawn; every object only keeps the state a
//! drawing would be made from, so the controller side can be tested end to end.

use std::collections::BTreeMap;

use farproxy::Args;
use farproxy::Value;

use crate::space::Error;
use crate::space::Instance;
use crate::space::ObjectId;
use crate::space::Result;
use crate::space::Slot;
use crate::space::Space;

/// Colormap applied to images that do not ask for one.
pub const DEFAULT_COLORMAP: &str = "viridis";

/// Functions the remote module exposes besides its classes.
pub const MODULE_FUNCTIONS: &[&str] = &["setConfigOption", "getConfigOption"];

/// Every toolkit class.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    GraphicsLayoutWidget,
    ExtendedPlotWindow,
    PlotItem,
    ExtendedPlotItem,
    AxisItem,
    PlotDataItem,
    ExtendedPlotDataItem,
    ImageItem,
    ExtendedImageItem,
    ImageItemWithHistogram,
    HistogramLUTItem,
    GradientEditorItem,
    ColorMap,
    DraggableTextItem,
}

const ALL: [Kind; 14] = [
    Kind::GraphicsLayoutWidget,
    Kind::ExtendedPlotWindow,
    Kind::PlotItem,
    Kind::ExtendedPlotItem,
    Kind::AxisItem,
    Kind::PlotDataItem,
    Kind::ExtendedPlotDataItem,
    Kind::ImageItem,
    Kind::ExtendedImageItem,
    Kind::ImageItemWithHistogram,
    Kind::HistogramLUTItem,
    Kind::GradientEditorItem,
    Kind::ColorMap,
    Kind::DraggableTextItem,
];

impl Kind {
    pub fn name(self) -> &'static str {
        match self {
            Kind::GraphicsLayoutWidget => "GraphicsLayoutWidget",
            Kind::ExtendedPlotWindow => "ExtendedPlotWindow",
            Kind::PlotItem => "PlotItem",
            Kind::ExtendedPlotItem => "ExtendedPlotItem",
            Kind::AxisItem => "AxisItem",
            Kind::PlotDataItem => "PlotDataItem",
            Kind::ExtendedPlotDataItem => "ExtendedPlotDataItem",
            Kind::ImageItem => "ImageItem",
            Kind::ExtendedImageItem => "ExtendedImageItem",
            Kind::ImageItemWithHistogram => "ImageItemWithHistogram",
            Kind::HistogramLUTItem => "HistogramLUTItem",
            Kind::GradientEditorItem => "GradientEditorItem",
            Kind::ColorMap => "ColorMap",
            Kind::DraggableTextItem => "DraggableTextItem",
        }
    }

    pub fn from_name(name: &str) -> Option<Kind> {
        ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn parent(self) -> Option<Kind> {
        match self {
            Kind::ExtendedPlotWindow => Some(Kind::GraphicsLayoutWidget),
            Kind::ExtendedPlotItem => Some(Kind::PlotItem),
            Kind::ExtendedPlotDataItem => Some(Kind::PlotDataItem),
            Kind::ExtendedImageItem => Some(Kind::ImageItem),
            Kind::ImageItemWithHistogram => Some(Kind::ExtendedImageItem),
            _ => None,
        }
    }

    /// This kind followed by its ancestors.
    pub fn lineage(self) -> impl Iterator<Item = Kind> {
        std::iter::successors(Some(self), |kind| kind.parent())
    }

    pub fn is_a(self, other: Kind) -> bool {
        self.lineage().any(|kind| kind == other)
    }

    fn own_methods(self) -> &'static [&'static str] {
        match self {
            Kind::GraphicsLayoutWidget => &[
                "show",
                "close",
                "setWindowTitle",
                "windowTitle",
                "size",
                "resize",
                "addItem",
                "getItem",
                "getLayoutItems",
            ],
            Kind::ExtendedPlotWindow | Kind::ExtendedPlotItem => &["export"],
            Kind::PlotItem => &["setTitle", "getAxis", "addItem", "removeItem", "listDataItems"],
            Kind::AxisItem => &["setLabel"],
            Kind::PlotDataItem => &["setData"],
            Kind::ExtendedPlotDataItem => &["update"],
            Kind::ImageItem => &["setImage", "setLookupTable", "setRect"],
            Kind::ExtendedImageItem => &["changeColorScale"],
            Kind::ImageItemWithHistogram => &["getHistogramLUTItem"],
            Kind::HistogramLUTItem => &["setLevels", "getLevels", "imageChanged"],
            Kind::GradientEditorItem => &[],
            Kind::ColorMap => &["getLookupTable"],
            Kind::DraggableTextItem => &[
                "setText",
                "getText",
                "setParentItem",
                "anchor",
                "setOffset",
                "getOffset",
            ],
        }
    }

    pub fn has_method(self, name: &str) -> bool {
        self.lineage().any(|kind| kind.own_methods().contains(&name))
    }

    /// Methods called on the class itself.
    pub fn has_static(self, name: &str) -> bool {
        self == Kind::ExtendedPlotWindow && name == "getWindows"
    }

    /// Creates an instance, running each class's setup root first.
    pub fn construct(self, space: &mut Space, args: Args) -> Result<ObjectId> {
        let id = space.insert(Slot::Instance(Instance::new(self)));
        let mut lineage: Vec<Kind> = self.lineage().collect();
        lineage.reverse();
        for kind in lineage {
            kind.setup(space, id, &args)?;
        }
        tracing::debug!(kind = self.name(), id, "constructed");
        Ok(id)
    }

    fn setup(self, space: &mut Space, id: ObjectId, args: &Args) -> Result<()> {
        match self {
            Kind::GraphicsLayoutWidget => {
                space.set(id, "_windowTitle", "")?;
                space.set(id, "width", 800)?;
                space.set(id, "height", 600)?;
                space.set(id, "visible", false)?;
                space.set(id, "layout", Value::List(Vec::new()))?;
            }
            Kind::ExtendedPlotWindow => space.windows.push(id),
            Kind::PlotItem => {
                let title = args.given(0, "title").cloned().unwrap_or_else(|| Value::from(""));
                space.set(id, "title", title)?;
                let mut axes = BTreeMap::new();
                for orientation in ["left", "bottom", "right", "top"] {
                    let axis = Kind::AxisItem.construct(space, Args::new().kwarg("orientation", orientation))?;
                    space.instance_mut(axis)?.parent = Some(id);
                    axes.insert(orientation.to_string(), space.value(axis)?);
                }
                space.set(id, "axes", Value::Map(axes))?;
                space.set(id, "items", Value::List(Vec::new()))?;
            }
            Kind::ExtendedPlotItem => {}
            Kind::AxisItem => {
                let orientation = args.given(0, "orientation").cloned().unwrap_or_else(|| Value::from("left"));
                space.set(id, "orientation", orientation)?;
                space.set(id, "labelText", "")?;
                space.set(id, "labelUnits", "")?;
            }
            Kind::PlotDataItem => {
                space.set(id, "xData", Vec::<f64>::new())?;
                space.set(id, "yData", Vec::<f64>::new())?;
                for (name, value) in args.named() {
                    space.set(id, name, value.clone())?;
                }
            }
            Kind::ExtendedPlotDataItem => {
                let setpoints = match args.given(0, "setpoint_x") {
                    Some(value) => f64s("ExtendedPlotDataItem", value)?,
                    None => Vec::new(),
                };
                space.set(id, "setpoint_x", setpoints)?;
            }
            Kind::ImageItem => {
                space.set(id, "image", Value::List(Vec::new()))?;
                space.set(id, "lut", Value::None)?;
                space.set(id, "rect", Value::None)?;
            }
            Kind::ExtendedImageItem => {
                for (index, name) in [(0, "setpoint_x"), (1, "setpoint_y")] {
                    let setpoints = match args.given(index, name) {
                        Some(value) => f64s("ExtendedImageItem", value)?,
                        None => Vec::new(),
                    };
                    space.set(id, name, setpoints)?;
                }
                let cmap = match args.given(2, "colormap") {
                    Some(value) => text("ExtendedImageItem", value)?,
                    None => DEFAULT_COLORMAP.to_string(),
                };
                change_color_scale(space, id, &cmap)?;
            }
            Kind::ImageItemWithHistogram => {
                let image = space.value(id)?;
                let histogram = Kind::HistogramLUTItem.construct(space, Args::new().arg(image))?;
                let histogram = space.value(histogram)?;
                space.set(id, "histogram", histogram)?;
            }
            Kind::HistogramLUTItem => {
                let gradient = Kind::GradientEditorItem.construct(space, Args::new())?;
                let axis = Kind::AxisItem.construct(space, Args::new().kwarg("orientation", "right"))?;
                let (gradient, axis) = (space.value(gradient)?, space.value(axis)?);
                space.set(id, "gradient", gradient)?;
                space.set(id, "axis", axis)?;
                space.set(id, "levels", Value::Tuple(vec![Value::Float(0.0), Value::Float(1.0)]))?;
                space.set(id, "imageChanges", 0)?;
                space.set(id, "image", args.param(0, "image").cloned().unwrap_or_default())?;
            }
            Kind::GradientEditorItem => space.set(id, "allowAdd", false)?,
            Kind::ColorMap => {
                let pos = f64s("ColorMap", required("ColorMap", args, 0, "pos")?)?;
                let colors = colors(required("ColorMap", args, 1, "color")?)?;
                if pos.len() < 2 || pos.len() != colors.len() {
                    return Err(Error::bad_argument(
                        "ColorMap",
                        format!("need matching positions and colors, got {} and {}", pos.len(), colors.len()),
                    ));
                }
                if pos.windows(2).any(|w| w[0] > w[1]) {
                    return Err(Error::bad_argument("ColorMap", "positions must ascend"));
                }
                space.set(id, "pos", pos)?;
                space.set(id, "color", required("ColorMap", args, 1, "color")?.clone())?;
            }
            Kind::DraggableTextItem => {
                let text = args.given(0, "text").cloned().unwrap_or_else(|| Value::from(""));
                space.set(id, "text", text)?;
                space.set(id, "offset", Value::Tuple(vec![Value::Float(0.0), Value::Float(0.0)]))?;
                space.set(id, "_anchor", Value::Tuple(vec![Value::Float(0.0), Value::Float(0.0)]))?;
            }
        }
        Ok(())
    }

    /// Serves `method` on instance `id`. The caller has checked that the kind has it.
    pub fn call(self, space: &mut Space, id: ObjectId, method: &str, args: Args) -> Result<Value> {
        match method {
            "show" => space.set(id, "visible", true).map(|_| Value::None),
            "close" => close_window(space, id),
            "setWindowTitle" => {
                let title = text(method, required(method, &args, 0, "title")?)?;
                space.set(id, "_windowTitle", title).map(|_| Value::None)
            }
            "windowTitle" => Ok(space.attr(id, "_windowTitle").unwrap_or_default()),
            "size" => Ok(Value::Tuple(vec![
                space.attr(id, "width").unwrap_or_default(),
                space.attr(id, "height").unwrap_or_default(),
            ])),
            "resize" => {
                let width = int(method, required(method, &args, 0, "width")?)?;
                let height = int(method, required(method, &args, 1, "height")?)?;
                space.set(id, "width", width)?;
                space.set(id, "height", height).map(|_| Value::None)
            }
            "addItem" if self.is_a(Kind::PlotItem) => plot_add_item(space, id, &args),
            "addItem" => layout_add_item(space, id, &args),
            "getItem" => layout_get_item(space, id, &args),
            "getLayoutItems" => {
                let children = space.instance(id)?.children.clone();
                space.list_of(&children)
            }
            "export" => export(space, id, &args),
            "setTitle" => {
                let title = required(method, &args, 0, "title")?.clone();
                space.set(id, "title", title).map(|_| Value::None)
            }
            "getAxis" => {
                let name = text(method, required(method, &args, 0, "name")?)?;
                match space.attr(id, "axes") {
                    Some(Value::Map(axes)) => axes
                        .get(&name)
                        .cloned()
                        .ok_or_else(|| Error::bad_argument(method, format!("no axis named '{name}'"))),
                    _ => Err(Error::bad_argument(method, "plot has no axes")),
                }
            }
            "removeItem" => {
                let child = space.resolve_value(method, required(method, &args, 0, "item")?)?;
                space.instance_mut(id)?.children.retain(|c| *c != child);
                space.instance_mut(child)?.parent = None;
                refresh_items(space, id).map(|_| Value::None)
            }
            "listDataItems" => {
                let data_items: Vec<ObjectId> = space
                    .instance(id)?
                    .children
                    .iter()
                    .copied()
                    .filter(|child| {
                        space
                            .instance(*child)
                            .is_ok_and(|c| c.kind.is_a(Kind::PlotDataItem) || c.kind.is_a(Kind::ImageItem))
                    })
                    .collect();
                space.list_of(&data_items)
            }
            "setLabel" => {
                if let Some(label) = args.given(0, "text") {
                    space.set(id, "labelText", label.clone())?;
                }
                if let Some(units) = args.given(1, "units") {
                    space.set(id, "labelUnits", units.clone())?;
                }
                Ok(Value::None)
            }
            "setData" => {
                let x = f64s(method, required(method, &args, 0, "x")?)?;
                let y = f64s(method, required(method, &args, 1, "y")?)?;
                set_data(space, id, x, y, args.named().get("connect").cloned())
            }
            "update" => update_trace(space, id, &args),
            "setImage" => {
                let image = required(method, &args, 0, "image")?;
                validate_image(image)?;
                space.set(id, "image", image.clone())?;
                let source = space.value(id)?;
                space.emit(id, "sigImageChanged", vec![source]);
                Ok(Value::None)
            }
            "setLookupTable" => {
                let lut = required(method, &args, 0, "lut")?.clone();
                space.set(id, "lut", lut).map(|_| Value::None)
            }
            "setRect" => {
                let mut rect = Vec::with_capacity(4);
                for (index, name) in ["x", "y", "width", "height"].into_iter().enumerate() {
                    rect.push(Value::Float(float(method, required(method, &args, index, name)?)?));
                }
                space.set(id, "rect", Value::Tuple(rect)).map(|_| Value::None)
            }
            "changeColorScale" => {
                let name = text(method, required(method, &args, 0, "name")?)?;
                change_color_scale(space, id, &name).map(|_| Value::None)
            }
            "getHistogramLUTItem" => Ok(space.attr(id, "histogram").unwrap_or_default()),
            "setLevels" => {
                let min = float(method, required(method, &args, 0, "min")?)?;
                let max = float(method, required(method, &args, 1, "max")?)?;
                if min > max {
                    return Err(Error::bad_argument(method, format!("min {min} exceeds max {max}")));
                }
                space
                    .set(id, "levels", Value::Tuple(vec![Value::Float(min), Value::Float(max)]))
                    .map(|_| Value::None)
            }
            "getLevels" => Ok(space.attr(id, "levels").unwrap_or_default()),
            "imageChanged" => image_changed(space, id),
            "getLookupTable" => {
                let start = args.given(0, "start").map(|v| float(method, v)).transpose()?.unwrap_or(0.0);
                let stop = args.given(1, "stop").map(|v| float(method, v)).transpose()?.unwrap_or(1.0);
                let points = args.given(2, "nPts").map(|v| int(method, v)).transpose()?.unwrap_or(512);
                let alpha = args.given(3, "alpha").and_then(Value::as_bool).unwrap_or(false);
                lookup_table(space, id, start, stop, points, alpha)
            }
            "setText" => {
                let value = text(method, required(method, &args, 0, "text")?)?;
                space.set(id, "text", value).map(|_| Value::None)
            }
            "getText" => Ok(space.attr(id, "text").unwrap_or_default()),
            "setParentItem" => {
                let parent = space.resolve_value(method, required(method, &args, 0, "parent")?)?;
                space.adopt(parent, id).map(|_| Value::None)
            }
            "anchor" => {
                let item_pos = required(method, &args, 0, "itemPos")?.clone();
                let parent_pos = args.given(1, "parentPos").cloned().unwrap_or_else(|| item_pos.clone());
                space.set(id, "_anchor", item_pos)?;
                space.set(id, "parentAnchor", parent_pos)?;
                if let Some(offset) = args.given(2, "offset") {
                    space.set(id, "offset", pair(method, offset)?)?;
                }
                Ok(Value::None)
            }
            "setOffset" => {
                let offset = pair(method, required(method, &args, 0, "offset")?)?;
                space.set(id, "offset", offset).map(|_| Value::None)
            }
            "getOffset" => Ok(space.attr(id, "offset").unwrap_or_default()),
            _ => Err(Error::NoMethod {
                type_name: self.name().to_string(),
                method: method.to_string(),
            }),
        }
    }

    pub fn call_static(self, space: &mut Space, method: &str, _args: Args) -> Result<Value> {
        match (self, method) {
            (Kind::ExtendedPlotWindow, "getWindows") => {
                let windows = space.windows.clone();
                space.list_of(&windows)
            }
            _ => Err(Error::NoMethod {
                type_name: self.name().to_string(),
                method: method.to_string(),
            }),
        }
    }
}

/// Creates the built-in colormaps. Idempotent.
pub fn install(space: &mut Space) -> Result<()> {
    if !space.colormaps.is_empty() {
        return Ok(());
    }
    let builtin: [(&str, &[f64], &[[i64; 3]]); 3] = [
        ("gray", &[0.0, 1.0], &[[0, 0, 0], [255, 255, 255]]),
        (
            "viridis",
            &[0.0, 0.25, 0.5, 0.75, 1.0],
            &[[68, 1, 84], [59, 82, 139], [33, 145, 140], [94, 201, 98], [253, 231, 37]],
        ),
        (
            "thermal",
            &[0.0, 0.3333, 0.6666, 1.0],
            &[[0, 0, 0], [185, 0, 0], [255, 220, 0], [255, 255, 255]],
        ),
    ];
    for (name, pos, colors) in builtin {
        let colors = colors
            .iter()
            .map(|rgb| Value::Tuple(rgb.iter().map(|c| Value::Int(*c)).collect()))
            .collect();
        let cmap = Kind::ColorMap.construct(space, Args::new().arg(pos).arg(Value::List(colors)))?;
        space.colormaps.insert(name.to_string(), cmap);
    }
    Ok(())
}

/// Serves a function of the remote module.
pub fn call_module(space: &mut Space, method: &str, args: Args) -> Result<Value> {
    match method {
        "setConfigOption" => {
            let key = text(method, required(method, &args, 0, "key")?)?;
            let value = required(method, &args, 1, "value")?.clone();
            space.config.insert(key, value);
            Ok(Value::None)
        }
        "getConfigOption" => {
            let key = text(method, required(method, &args, 0, "key")?)?;
            space
                .config
                .get(&key)
                .cloned()
                .ok_or_else(|| Error::bad_argument(method, format!("unknown option '{key}'")))
        }
        _ => Err(Error::NoMethod {
            type_name: "module".to_string(),
            method: method.to_string(),
        }),
    }
}

// --- Argument helpers ---

fn required<'a>(method: &str, args: &'a Args, index: usize, name: &str) -> Result<&'a Value> {
    args.given(index, name)
        .ok_or_else(|| Error::bad_argument(method, format!("missing argument '{name}'")))
}

fn f64s(method: &str, value: &Value) -> Result<Vec<f64>> {
    value
        .to_f64s()
        .ok_or_else(|| Error::bad_argument(method, format!("expected numbers, got {}", value.kind())))
}

fn float(method: &str, value: &Value) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| Error::bad_argument(method, format!("expected a number, got {}", value.kind())))
}

fn int(method: &str, value: &Value) -> Result<i64> {
    value
        .as_i64()
        .ok_or_else(|| Error::bad_argument(method, format!("expected an integer, got {}", value.kind())))
}

fn text(method: &str, value: &Value) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| Error::bad_argument(method, format!("expected a string, got {}", value.kind())))
}

fn pair(method: &str, value: &Value) -> Result<Value> {
    match value.to_f64s() {
        Some(xy) if xy.len() == 2 => Ok(Value::Tuple(vec![Value::Float(xy[0]), Value::Float(xy[1])])),
        _ => Err(Error::bad_argument(method, "expected an (x, y) pair")),
    }
}

fn colors(value: &Value) -> Result<Vec<Vec<f64>>> {
    let bad = || Error::bad_argument("ColorMap", "colors must be sequences of 3 or 4 components");
    let items = value.as_seq().ok_or_else(bad)?;
    items
        .iter()
        .map(|color| match color.to_f64s() {
            Some(c) if c.len() == 3 || c.len() == 4 => Ok(c),
            _ => Err(bad()),
        })
        .collect()
}

// --- Behaviour ---

fn close_window(space: &mut Space, id: ObjectId) -> Result<Value> {
    space.set(id, "visible", false)?;
    space.windows.retain(|w| *w != id);
    let source = space.value(id)?;
    space.emit(id, "sigClosed", vec![source]);
    Ok(Value::None)
}

fn layout_add_item(space: &mut Space, id: ObjectId, args: &Args) -> Result<Value> {
    let child = space.resolve_value("addItem", required("addItem", args, 0, "item")?)?;
    let Some(Value::List(mut cells)) = space.attr(id, "layout") else {
        return Err(Error::bad_argument("addItem", "window has no layout"));
    };
    cells.retain(|cell| cell_item(cell) != Some(child));

    let row = match args.given(1, "row") {
        Some(row) => int("addItem", row)?,
        None => cells.iter().filter_map(cell_row).max().map_or(0, |r| r + 1),
    };
    let col = match args.given(2, "col") {
        Some(col) => int("addItem", col)?,
        None => 0,
    };
    if cells.iter().any(|cell| cell_row(cell) == Some(row) && cell_col(cell) == Some(col)) {
        return Err(Error::bad_argument("addItem", format!("cell ({row}, {col}) is taken")));
    }

    space.adopt(id, child)?;
    cells.push(Value::Tuple(vec![Value::Int(row), Value::Int(col), space.value(child)?]));
    space.set(id, "layout", Value::List(cells))?;
    Ok(Value::None)
}

fn cell_row(cell: &Value) -> Option<i64> {
    cell.as_seq()?.first()?.as_i64()
}

fn cell_col(cell: &Value) -> Option<i64> {
    cell.as_seq()?.get(1)?.as_i64()
}

fn cell_item(cell: &Value) -> Option<ObjectId> {
    cell.as_seq()?.get(2)?.remote_ref().map(|r| r.id())
}

fn layout_get_item(space: &mut Space, id: ObjectId, args: &Args) -> Result<Value> {
    let row = int("getItem", required("getItem", args, 0, "row")?)?;
    let col = int("getItem", required("getItem", args, 1, "col")?)?;
    let Some(Value::List(cells)) = space.attr(id, "layout") else {
        return Ok(Value::None);
    };
    let found = cells
        .iter()
        .find(|cell| cell_row(cell) == Some(row) && cell_col(cell) == Some(col))
        .and_then(cell_item);
    match found {
        Some(item) => space.value(item),
        None => Ok(Value::None),
    }
}

fn plot_add_item(space: &mut Space, id: ObjectId, args: &Args) -> Result<Value> {
    let child = space.resolve_value("addItem", required("addItem", args, 0, "item")?)?;
    space.adopt(id, child)?;
    refresh_items(space, id)?;
    Ok(Value::None)
}

fn refresh_items(space: &mut Space, id: ObjectId) -> Result<()> {
    let children = space.instance(id)?.children.clone();
    let items = children.iter().map(|c| space.value(*c)).collect::<Result<Vec<_>>>()?;
    space.set(id, "items", Value::List(items))
}

fn export(space: &mut Space, id: ObjectId, args: &Args) -> Result<Value> {
    let path = text("export", required("export", args, 0, "fname")?)?;
    let kind = match args.given(1, "export_type") {
        Some(kind) => text("export", kind)?,
        None => "image".to_string(),
    };
    if kind != "image" && kind != "svg" {
        return Err(Error::bad_argument("export", format!("unknown export type '{kind}'")));
    }
    if path.is_empty() {
        return Err(Error::bad_argument("export", "empty file name"));
    }
    space.set(id, "lastExport", Value::Tuple(vec![Value::from(path.as_str()), Value::from(kind)]))?;
    Ok(Value::from(path))
}

fn set_data(space: &mut Space, id: ObjectId, x: Vec<f64>, y: Vec<f64>, connect: Option<Value>) -> Result<Value> {
    if x.len() != y.len() {
        return Err(Error::bad_argument(
            "setData",
            format!("x has {} points but y has {}", x.len(), y.len()),
        ));
    }
    space.set(id, "xData", x)?;
    space.set(id, "yData", y)?;
    space.set(id, "connect", connect.unwrap_or_else(|| Value::from("all")))?;
    Ok(Value::None)
}

/// Pairs new y data with the stored setpoints, dropping pairs with a NaN and
/// breaking the line where points were dropped.
fn update_trace(space: &mut Space, id: ObjectId, args: &Args) -> Result<Value> {
    let y = f64s("update", required("update", args, 0, "yData")?)?;
    let setpoints = match space.attr(id, "setpoint_x") {
        Some(value) => f64s("update", &value)?,
        None => Vec::new(),
    };
    if setpoints.len() != y.len() {
        return Err(Error::bad_argument(
            "update",
            format!("{} setpoints but {} values", setpoints.len(), y.len()),
        ));
    }

    let mut xs = Vec::with_capacity(y.len());
    let mut ys = Vec::with_capacity(y.len());
    let mut connect: Vec<Value> = Vec::with_capacity(y.len());
    for (x, y) in setpoints.into_iter().zip(y) {
        if x.is_nan() || y.is_nan() {
            if let Some(last) = connect.last_mut() {
                *last = Value::Int(0);
            }
            continue;
        }
        xs.push(x);
        ys.push(y);
        connect.push(Value::Int(1));
    }

    let connect = args.named().get("connect").cloned().unwrap_or(Value::List(connect));
    set_data(space, id, xs, ys, Some(connect))
}

fn validate_image(image: &Value) -> Result<()> {
    let bad = |reason: &str| Err(Error::bad_argument("setImage", reason.to_string()));
    let Some(rows) = image.as_seq() else {
        return bad("image must be a list of rows");
    };
    let mut width = None;
    for row in rows {
        let Some(row) = row.to_f64s() else {
            return bad("rows must be numeric");
        };
        if *width.get_or_insert(row.len()) != row.len() {
            return bad("rows must have equal length");
        }
    }
    Ok(())
}

fn change_color_scale(space: &mut Space, id: ObjectId, name: &str) -> Result<()> {
    let cmap = *space
        .colormaps
        .get(name)
        .ok_or_else(|| Error::UnknownColorMap(name.to_string()))?;
    let lut = lookup_table(space, cmap, 0.0, 1.0, 256, false)?;
    space.set(id, "lut", lut)?;
    space.set(id, "cmap", name)
}

fn image_changed(space: &mut Space, id: ObjectId) -> Result<Value> {
    let changes = space.attr(id, "imageChanges").and_then(|v| v.as_i64()).unwrap_or(0);
    space.set(id, "imageChanges", changes + 1)?;

    let Some(image) = space.attr(id, "image").and_then(|v| v.remote_ref().map(|r| r.id())) else {
        return Ok(Value::None);
    };
    let values: Vec<f64> = match space.attr(image, "image") {
        Some(Value::List(rows)) => rows
            .iter()
            .filter_map(Value::to_f64s)
            .flatten()
            .filter(|v| !v.is_nan())
            .collect(),
        _ => Vec::new(),
    };
    if let (Some(min), Some(max)) = (
        values.iter().copied().reduce(f64::min),
        values.iter().copied().reduce(f64::max),
    ) {
        space.set(id, "range", Value::Tuple(vec![Value::Float(min), Value::Float(max)]))?;
    }
    Ok(Value::None)
}

fn lookup_table(space: &Space, cmap: ObjectId, start: f64, stop: f64, points: i64, alpha: bool) -> Result<Value> {
    if points < 1 {
        return Err(Error::bad_argument("getLookupTable", "nPts must be positive"));
    }
    let pos = match space.attr(cmap, "pos") {
        Some(value) => f64s("getLookupTable", &value)?,
        None => Vec::new(),
    };
    let colors = match space.attr(cmap, "color") {
        Some(value) => colors(&value)?,
        None => Vec::new(),
    };
    if pos.len() < 2 {
        return Err(Error::bad_argument("getLookupTable", "colormap has no stops"));
    }

    let table = (0..points)
        .map(|i| {
            let t = if points == 1 {
                start
            } else {
                start + (stop - start) * i as f64 / (points - 1) as f64
            };
            let color = interpolate(&pos, &colors, t);
            let components = if alpha { 4 } else { 3 };
            Value::Tuple(
                (0..components)
                    .map(|c| Value::Int(color.get(c).copied().unwrap_or(255.0).round() as i64))
                    .collect(),
            )
        })
        .collect();
    Ok(Value::List(table))
}

fn interpolate(pos: &[f64], colors: &[Vec<f64>], t: f64) -> Vec<f64> {
    let last = pos.len() - 1;
    if t <= pos[0] {
        return colors[0].clone();
    }
    if t >= pos[last] {
        return colors[last].clone();
    }
    let k = pos.windows(2).position(|w| t >= w[0] && t <= w[1]).unwrap_or(0);
    let width = pos[k + 1] - pos[k];
    let f = if width > 0.0 { (t - pos[k]) / width } else { 0.0 };
    colors[k]
        .iter()
        .zip(&colors[k + 1])
        .map(|(a, b)| a + (b - a) * f)
        .collect()
}
