//! Simulated sweep: a line filling in point by point, then an image.
//!
//! `FARPLOT_POINTS` sets the number of setpoints (default 100) and
//! `FARPLOT_DELAY_MS` the pause between points (default 10). Logging follows
//! `RUST_LOG`.

use std::time::Duration;

use anyhow::Context as _;
use anyhow::Result;
use farplot::ExportKind;
use farplot::PlotWindow;
use farproxy::Pump;
use tracing_subscriber::EnvFilter;

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw.parse().with_context(|| format!("invalid {name}: {raw:?}")),
        Err(_) => Ok(default),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let points: usize = env_or("FARPLOT_POINTS", 100)?;
    let delay = Duration::from_millis(env_or("FARPLOT_DELAY_MS", 10)?);

    let (ctx, _spawner) = farplot::loopback();
    let pump = Pump::new(ctx.clone());

    let window = PlotWindow::new(&ctx, "Gate sweep (id: 1)").await?;
    let plot = window.add_plot("Current vs. gate").await?;
    plot.set_labels(("Current", "A"), ("Gate", "V")).await?;

    let setpoints: Vec<f64> = (0..points).map(|i| i as f64 / points as f64).collect();
    let trace = plot.plot_line(&setpoints, None).await?;
    let mut data = vec![f64::NAN; points];
    for (i, x) in setpoints.iter().enumerate() {
        data[i] = (x * 12.0).sin() * (-x).exp();
        trace.update(&data).await?;
        tokio::time::sleep(delay).await;
        pump.poll().await?;
    }
    let (x, _) = trace.data().await?;
    tracing::info!(points = x.len(), "line sweep done");

    let map = window.add_plot("Charge stability").await?;
    let image = map.plot_image(&setpoints, &setpoints, None, Some("thermal")).await?;
    let rows: Vec<Vec<f64>> = setpoints
        .iter()
        .map(|x| setpoints.iter().map(|y| (x * 9.0).cos() * (y * 7.0).sin()).collect())
        .collect();
    image.update(&rows).await?;
    let levels = image.histogram().await?.levels().await?;
    tracing::info!(?levels, "image done");

    let path = window.export("sweep.png", ExportKind::Image).await?;
    tracing::info!(%path, "exported");

    ctx.shutdown().await?;
    Ok(())
}
