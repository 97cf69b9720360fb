//! Draggable text boxes.

use std::str::FromStr;

use farproxy::Args;
use farproxy::Class;
use farproxy::Error;
use farproxy::Object;
use farproxy::Result;
use farproxy::Value;
use farproxy::class::Property;
use farproxy::class::REMOTE_OBJECT;
use futures::FutureExt;
use futures::future::BoxFuture;

use crate::convert;
use crate::macros::wrapper;

pub static TEXT_BOX: Class = Class {
    parent: Some(&REMOTE_OBJECT),
    remote_type: Some("DraggableTextItem"),
    properties: &[Property {
        name: "text",
        get: text_get,
        set: Some(text_set),
    }],
    ..Class::new("TextBox")
};

// The worker renders rich text, so line breaks travel as `<br>`.

fn text_get<'a>(object: &'a Object) -> BoxFuture<'a, Result<Value>> {
    async move {
        let text = convert::string(object.call_remote("getText", Args::new()).await?, "getText")?;
        Ok(Value::from(text.replace("<br>", "\n")))
    }
    .boxed()
}

fn text_set<'a>(object: &'a Object, value: Value) -> BoxFuture<'a, Result<()>> {
    async move {
        let text = convert::string(value, "text")?;
        object
            .call_remote("setText", Args::new().arg(text.replace('\n', "<br>")))
            .await?;
        Ok(())
    }
    .boxed()
}

/// A corner of the parent plot.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Corner {
    /// Relative position of the corner, `(0, 0)` being the top left.
    fn position(self) -> (f64, f64) {
        match self {
            Corner::TopLeft => (0.0, 0.0),
            Corner::TopRight => (1.0, 0.0),
            Corner::BottomLeft => (0.0, 1.0),
            Corner::BottomRight => (1.0, 1.0),
        }
    }

    /// Pixels between the corner and the box, pointing inward.
    fn inset(self) -> (f64, f64) {
        let (x, y) = self.position();
        (5.0 - 10.0 * x, 5.0 - 10.0 * y)
    }
}

impl FromStr for Corner {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tl" => Ok(Corner::TopLeft),
            "tr" => Ok(Corner::TopRight),
            "bl" => Ok(Corner::BottomLeft),
            "br" => Ok(Corner::BottomRight),
            other => Err(Error::invalid_argument(
                "anchor",
                format!("corner must be one of tl, tr, bl, br, got '{other}'"),
            )),
        }
    }
}

fn pair((x, y): (f64, f64)) -> Value {
    Value::Tuple(vec![Value::Float(x), Value::Float(y)])
}

wrapper!(
    /// A text box the user can drag around a plot.
    TextBox => TEXT_BOX
);

impl TextBox {
    pub async fn text(&self) -> Result<String> {
        convert::string(self.getattr("text").await?, "text")
    }

    /// Newlines become line breaks.
    pub async fn set_text(&self, text: &str) -> Result<()> {
        self.setattr("text", text).await
    }

    /// Pins the box to a corner of its parent, slightly inset.
    pub async fn anchor(&self, corner: Corner) -> Result<()> {
        let position = pair(corner.position());
        let args = Args::new()
            .arg(position.clone())
            .arg(position)
            .arg(pair(corner.inset()));
        self.call("anchor", args).await?;
        Ok(())
    }

    pub async fn offset(&self) -> Result<(f64, f64)> {
        let offset = self.call("getOffset", Args::new()).await?;
        convert::float_pair(&offset, "getOffset")
    }

    pub async fn set_offset(&self, x: f64, y: f64) -> Result<()> {
        if !x.is_finite() || !y.is_finite() {
            return Err(Error::invalid_argument("set_offset", format!("offset ({x}, {y}) is not finite")));
        }
        self.call("setOffset", Args::new().arg(pair((x, y)))).await?;
        Ok(())
    }
}
