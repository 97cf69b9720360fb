//! Plot areas and their axes.

use farproxy::Args;
use farproxy::Class;
use farproxy::Context;
use farproxy::Result;
use farproxy::Role;
use farproxy::Value;
use farproxy::class::REMOTE_OBJECT;

use crate::convert;
use crate::image::IMAGE;
use crate::image::Image;
use crate::macros::wrapper;
use crate::text::Corner;
use crate::text::TEXT_BOX;
use crate::text::TextBox;
use crate::trace::TRACE;
use crate::trace::Trace;

pub static BASE_PLOT_ITEM: Class = Class {
    parent: Some(&REMOTE_OBJECT),
    remote_type: Some("PlotItem"),
    roles: &[
        ("addItem", Role::Creator),
        ("getAxis", Role::Query),
        ("listDataItems", Role::Query),
    ],
    ..Class::new("BasePlotItem")
};

pub static PLOT_ITEM: Class = Class {
    parent: Some(&BASE_PLOT_ITEM),
    remote_type: Some("ExtendedPlotItem"),
    ..Class::new("PlotItem")
};

pub static AXIS: Class = Class {
    parent: Some(&REMOTE_OBJECT),
    remote_type: Some("AxisItem"),
    ..Class::new("Axis")
};

wrapper!(
    /// One plot area with four axes.
    PlotItem => PLOT_ITEM
);

wrapper!(Axis => AXIS);

impl PlotItem {
    /// A plot that is not placed in any window yet.
    pub async fn new(ctx: &Context, title: &str) -> Result<Self> {
        Ok(Self(ctx.construct(&PLOT_ITEM, Args::new().kwarg("title", title)).await?))
    }

    pub async fn title(&self) -> Result<String> {
        convert::string(self.getattr("title").await?, "title")
    }

    pub async fn set_title(&self, title: &str) -> Result<()> {
        self.call("setTitle", Args::new().arg(title)).await?;
        Ok(())
    }

    /// The axis on one side: `left`, `bottom`, `right` or `top`.
    pub async fn axis(&self, side: &str) -> Result<Axis> {
        Axis::from_value(self.call("getAxis", Args::new().arg(side)).await?)
    }

    pub async fn left_axis(&self) -> Result<Axis> {
        self.axis("left").await
    }

    pub async fn bottom_axis(&self) -> Result<Axis> {
        self.axis("bottom").await
    }

    /// Labels the left and bottom axes, each as `(text, units)`.
    pub async fn set_labels(&self, left: (&str, &str), bottom: (&str, &str)) -> Result<()> {
        self.left_axis().await?.set_label(left.0, left.1).await?;
        self.bottom_axis().await?.set_label(bottom.0, bottom.1).await
    }

    /// Adds a line over `setpoints`, optionally with initial data.
    pub async fn plot_line(&self, setpoints: &[f64], data: Option<&[f64]>) -> Result<Trace> {
        let trace = self
            .session()
            .construct(&TRACE, Args::new().kwarg("setpoints", setpoints))
            .await?;
        let trace = Trace::from_value(self.call("addItem", Args::new().arg(trace)).await?)?;
        if let Some(data) = data {
            trace.update(data).await?;
        }
        Ok(trace)
    }

    /// Adds an image over the `x` by `y` setpoint grid. Its histogram is added
    /// next to it.
    pub async fn plot_image(
        &self,
        x: &[f64],
        y: &[f64],
        data: Option<&[Vec<f64>]>,
        colormap: Option<&str>,
    ) -> Result<Image> {
        let mut args = Args::new().kwarg("setpoint_x", x).kwarg("setpoint_y", y);
        if let Some(colormap) = colormap {
            args.insert("colormap", colormap);
        }
        let image = self.session().construct(&IMAGE, args).await?;
        let image = Image::from_value(self.call("addItem", Args::new().arg(image)).await?)?;
        if let Some(data) = data {
            image.update(data).await?;
        }
        Ok(image)
    }

    /// Adds a draggable text box in the top left corner.
    pub async fn textbox(&self, text: &str) -> Result<TextBox> {
        let textbox = self.session().construct(&TEXT_BOX, Args::new()).await?;
        let textbox = TextBox::from_value(self.call("addItem", Args::new().arg(textbox)).await?)?;
        textbox.set_text(text).await?;
        textbox.anchor(Corner::TopLeft).await?;
        Ok(textbox)
    }

    /// Lines and images shown in this plot, autowrapped.
    pub async fn traces(&self) -> Result<Vec<Value>> {
        convert::list(self.call("listDataItems", Args::new()).await?, "listDataItems")
    }

    /// Takes `item` out of the plot. Returns whether this plot owned it.
    pub async fn remove_item(&self, item: impl Into<Value>) -> Result<bool> {
        let item = item.into();
        self.call("removeItem", Args::new().arg(item.clone())).await?;
        Ok(self.release(&item))
    }
}

impl Axis {
    pub async fn set_label(&self, text: &str, units: &str) -> Result<()> {
        self.call("setLabel", Args::new().kwarg("text", text).kwarg("units", units))
            .await?;
        Ok(())
    }

    /// `(text, units)`.
    pub async fn label(&self) -> Result<(String, String)> {
        let text = convert::string(self.getattr("labelText").await?, "labelText")?;
        let units = convert::string(self.getattr("labelUnits").await?, "labelUnits")?;
        Ok((text, units))
    }
}
