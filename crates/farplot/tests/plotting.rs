use anyhow::Result;
use anyhow::anyhow;
use farplot::ColorMap;
use farplot::Corner;
use farplot::ExportKind;
use farplot::Histogram;
use farplot::Image;
use farplot::PlotWindow;
use farplot::Trace;
use farproxy::Args;
use farproxy::Error;
use farproxy::Value;
use rand::Rng;

#[tokio::test]
async fn test_new_windows_are_shown_and_tracked() -> Result<()> {
    let (ctx, spawner) = farplot::loopback();
    let window = PlotWindow::new(&ctx, "Sweep").await?;

    assert_eq!(window.title().await?, "Sweep");
    assert_eq!(window.size().await?, (800, 600));
    assert_eq!(ctx.windows(), vec![window.object().clone()]);

    let journal = spawner.current().ok_or_else(|| anyhow!("no worker"))?.journal();
    assert_eq!(journal[0].request, "import");
    let options = journal.iter().filter(|e| e.request == "setConfigOption").count();
    assert_eq!(options, 4);
    Ok(())
}

#[tokio::test]
async fn test_plots_are_owned_by_their_window() -> Result<()> {
    let (ctx, _spawner) = farplot::loopback();
    let window = PlotWindow::new(&ctx, "Sweep").await?;
    let plot = window.add_plot("Current").await?;

    assert_eq!(window.owned_items(), vec![Value::from(&plot)]);
    assert_eq!(plot.parent().as_ref(), Some(window.object()));
    assert_eq!(plot.title().await?, "Current");

    let plots = window.plots().await?;
    assert_eq!(plots, vec![plot.clone()]);
    assert_eq!(window.item_at(0, 0).await?, Some(Value::from(&plot)));
    assert_eq!(window.item_at(3, 0).await?, None);

    plot.set_labels(("Current", "A"), ("Gate", "V")).await?;
    assert_eq!(plot.left_axis().await?.label().await?, ("Current".into(), "A".into()));
    assert_eq!(plot.bottom_axis().await?.label().await?, ("Gate".into(), "V".into()));
    Ok(())
}

#[tokio::test]
async fn test_streamed_updates_arrive_in_order() -> Result<()> {
    let (ctx, spawner) = farplot::loopback();
    let window = PlotWindow::new(&ctx, "Sweep").await?;
    let plot = window.add_plot("Current").await?;

    let setpoints: Vec<f64> = (0..40).map(f64::from).collect();
    let trace = plot.plot_line(&setpoints, None).await?;
    assert_eq!(trace.setpoints(), setpoints);

    let mut rng = rand::thread_rng();
    let mut data = vec![f64::NAN; setpoints.len()];
    let measured = 25;
    for i in 0..measured {
        data[i] = rng.gen_range(-1.0..1.0);
        trace.update(&data).await?;
    }

    let (x, y) = trace.data().await?;
    assert_eq!(x, setpoints[..measured].to_vec());
    assert_eq!(y, data[..measured].to_vec());

    let journal = spawner.current().ok_or_else(|| anyhow!("no worker"))?.journal();
    let updates: Vec<_> = journal.iter().filter(|e| e.request == "update").collect();
    assert_eq!(updates.len(), measured);
    assert!(updates.iter().all(|e| !e.blocking));
    Ok(())
}

#[tokio::test]
async fn test_updates_must_match_the_setpoints() -> Result<()> {
    let (ctx, _spawner) = farplot::loopback();
    let plot = PlotWindow::new(&ctx, "Sweep").await?.add_plot("Current").await?;
    let trace = plot.plot_line(&[0.0, 1.0, 2.0], Some(&[1.0, 2.0, 3.0][..])).await?;

    assert!(matches!(
        trace.update(&[1.0]).await,
        Err(Error::InvalidArgument { .. })
    ));
    assert!(matches!(
        trace.set_data(&[1.0, 2.0], &[1.0]).await,
        Err(Error::InvalidArgument { .. })
    ));

    trace.set_data(&[5.0, 6.0], &[7.0, 8.0]).await?;
    assert_eq!(trace.data().await?, (vec![5.0, 6.0], vec![7.0, 8.0]));
    Ok(())
}

#[tokio::test]
async fn test_wrapped_traces_recover_their_setpoints() -> Result<()> {
    let (ctx, _spawner) = farplot::loopback();
    let plot = PlotWindow::new(&ctx, "Sweep").await?.add_plot("Current").await?;
    let trace = plot.plot_line(&[0.5, 1.5], None).await?;

    let listed = plot.traces().await?;
    assert_eq!(listed.len(), 1);
    let rewrapped = Trace::from_value(listed[0].clone())?;
    assert_eq!(rewrapped, trace);
    assert!(!rewrapped.ptr_eq(&trace));
    assert_eq!(rewrapped.setpoints(), vec![0.5, 1.5]);
    Ok(())
}

#[tokio::test]
async fn test_moving_a_listed_trace_moves_ownership() -> Result<()> {
    let (ctx, _spawner) = farplot::loopback();
    let window = PlotWindow::new(&ctx, "Sweep").await?;
    let first = window.add_plot("First").await?;
    let second = window.add_plot("Second").await?;
    let trace = first.plot_line(&[0.0, 1.0], None).await?;

    let listed = Trace::from_value(first.traces().await?.remove(0))?;
    assert!(!listed.ptr_eq(&trace));
    second.call("addItem", Args::new().arg(&listed)).await?;

    assert!(first.owned_items().is_empty());
    assert_eq!(second.owned_items(), vec![Value::from(&trace)]);
    assert_eq!(trace.parent().as_ref(), Some(second.object()));
    Ok(())
}

#[tokio::test]
async fn test_adding_a_trace_elsewhere_moves_it() -> Result<()> {
    let (ctx, _spawner) = farplot::loopback();
    let window = PlotWindow::new(&ctx, "Sweep").await?;
    let first = window.add_plot("First").await?;
    let second = window.add_plot("Second").await?;
    let trace = first.plot_line(&[0.0, 1.0], None).await?;

    second.call("addItem", Args::new().arg(&trace)).await?;

    assert!(first.owned_items().is_empty());
    assert_eq!(second.owned_items(), vec![Value::from(&trace)]);
    assert_eq!(trace.parent().as_ref(), Some(second.object()));
    assert!(first.traces().await?.is_empty());
    assert_eq!(second.traces().await?.len(), 1);

    assert!(second.remove_item(&trace).await?);
    assert!(second.owned_items().is_empty());
    assert!(trace.parent().is_none());
    Ok(())
}

#[tokio::test]
async fn test_images_bring_their_histogram_along() -> Result<()> {
    let (ctx, _spawner) = farplot::loopback();
    let plot = PlotWindow::new(&ctx, "Map").await?.add_plot("Charge").await?;
    let x = [0.0, 1.0, 2.0];
    let y = [0.0, 0.5];
    let image = plot.plot_image(&x, &y, None, None).await?;
    assert_eq!(image.colormap(), "viridis");
    assert_eq!(image.setpoints(), (x.to_vec(), y.to_vec()));

    // The histogram was added to the plot right after the image.
    let owned = plot.owned_items();
    assert_eq!(owned.len(), 2);
    assert_eq!(owned[0], Value::from(&image));
    let histogram = Histogram::from_value(owned[1].clone())?;
    assert_eq!(histogram, image.histogram().await?);
    assert_eq!(plot.traces().await?.len(), 1);

    let rows = vec![vec![1.0, 4.0], vec![f64::NAN, -2.0], vec![0.0, 3.0]];
    image.update(&rows).await?;
    assert_eq!(histogram.levels().await?, (-2.0, 4.0));

    image.set_auto_levels(false);
    image.update(&[vec![10.0, 20.0], vec![0.0, 0.0], vec![0.0, 0.0]]).await?;
    assert_eq!(histogram.levels().await?, (-2.0, 4.0));

    assert!(matches!(
        image.update(&[vec![1.0, 2.0]]).await,
        Err(Error::InvalidArgument { .. })
    ));

    image.set_colormap("gray").await?;
    assert_eq!(image.colormap(), "gray");
    let rewrapped = Image::from_value(plot.traces().await?.remove(0))?;
    assert_eq!(rewrapped.colormap(), "gray");
    assert_eq!(rewrapped.setpoints(), (x.to_vec(), y.to_vec()));
    Ok(())
}

#[tokio::test]
async fn test_image_updates_do_not_wait_once_warm() -> Result<()> {
    let (ctx, spawner) = farplot::loopback();
    let plot = PlotWindow::new(&ctx, "Map").await?.add_plot("Charge").await?;
    let image = plot.plot_image(&[0.0, 1.0, 2.0], &[0.0, 1.0], None, None).await?;
    let histogram = image.histogram().await?;
    let worker = spawner.current().ok_or_else(|| anyhow!("no worker"))?;

    let mut rng = rand::thread_rng();
    let mut frame = || -> Vec<Vec<f64>> {
        (0..3).map(|_| (0..2).map(|_| rng.gen_range(0.0..1.0)).collect()).collect()
    };

    image.update(&frame()).await?;
    // A blocking read returns only after the worker has served everything before it.
    histogram.levels().await?;
    let warm = worker.journal().len();

    let updates = 5;
    for _ in 0..updates {
        image.update(&frame()).await?;
    }
    histogram.levels().await?;

    let journal = worker.journal();
    let (hot, read) = journal[warm..].split_at(updates * 3);
    assert!(hot.iter().all(|e| !e.blocking), "{hot:?}");
    for cycle in hot.chunks(3) {
        let requests: Vec<_> = cycle.iter().map(|e| e.request.as_str()).collect();
        assert_eq!(requests, ["setImage", "setLevels", "imageChanged"]);
    }
    let read: Vec<_> = read.iter().map(|e| e.request.as_str()).collect();
    assert_eq!(read, ["get getLevels", "getLevels"]);
    Ok(())
}

#[tokio::test]
async fn test_unknown_colormaps_fail_construction() -> Result<()> {
    let (ctx, _spawner) = farplot::loopback();
    let plot = PlotWindow::new(&ctx, "Map").await?.add_plot("Charge").await?;
    let result = plot.plot_image(&[0.0, 1.0], &[0.0, 1.0], None, Some("sepia")).await;
    assert!(matches!(result, Err(Error::Transport(_))));
    assert!(plot.owned_items().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_histogram_allow_add_goes_through_the_gradient() -> Result<()> {
    let (ctx, _spawner) = farplot::loopback();
    let plot = PlotWindow::new(&ctx, "Map").await?.add_plot("Charge").await?;
    let histogram = plot.plot_image(&[0.0, 1.0], &[0.0, 1.0], None, None).await?.histogram().await?;

    assert!(!histogram.allow_add().await?);
    histogram.set_allow_add(true).await?;
    assert!(histogram.allow_add().await?);
    assert!(histogram.setattr("allow_add", "yes").await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_colormaps_interpolate() -> Result<()> {
    let (ctx, _spawner) = farplot::loopback();

    let gray = ColorMap::builtin(&ctx, "gray").await?;
    assert_eq!(gray.name(), "gray");
    assert_eq!(
        gray.lookup_table(0.0, 1.0, 3).await?,
        vec![[0, 0, 0], [128, 128, 128], [255, 255, 255]]
    );

    let custom = ColorMap::new(&ctx, "redblue", &[0.0, 1.0], &[[255, 0, 0], [0, 0, 255]]).await?;
    assert_eq!(custom.name(), "redblue");
    assert_eq!(custom.lookup_table(0.0, 1.0, 2).await?, vec![[255, 0, 0], [0, 0, 255]]);

    assert!(ColorMap::new(&ctx, "bad", &[0.0], &[[0, 0, 0]]).await.is_err());
    assert!(ColorMap::builtin(&ctx, "nope").await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_text_boxes_translate_line_breaks() -> Result<()> {
    let (ctx, _spawner) = farplot::loopback();
    let plot = PlotWindow::new(&ctx, "Sweep").await?.add_plot("Current").await?;
    let textbox = plot.textbox("T = 20 mK\nB = 1 T").await?;

    assert_eq!(textbox.text().await?, "T = 20 mK\nB = 1 T");
    let raw = textbox.call_remote("getText", Args::new()).await?;
    assert_eq!(raw, Value::from("T = 20 mK<br>B = 1 T"));
    assert_eq!(textbox.offset().await?, (5.0, 5.0));

    textbox.anchor("br".parse::<Corner>()?).await?;
    assert_eq!(textbox.offset().await?, (-5.0, -5.0));
    assert!("middle".parse::<Corner>().is_err());

    textbox.set_offset(2.0, 3.0).await?;
    assert_eq!(textbox.offset().await?, (2.0, 3.0));
    assert!(textbox.set_offset(f64::NAN, 0.0).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_windows_export() -> Result<()> {
    let (ctx, _spawner) = farplot::loopback();
    let window = PlotWindow::new(&ctx, "Sweep").await?;
    assert_eq!(window.export("sweep.svg", ExportKind::Svg).await?, "sweep.svg");
    assert!(window.export("", ExportKind::Image).await.is_err());
    Ok(())
}
