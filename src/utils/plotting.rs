use std::path::Path;

use anyhow::{anyhow, Result};
use plotters::prelude::*;

const PLOT_SIZE: (u32, u32) = (1200, 500);


/// Read depth along the consensus on a log-scaled y axis, with the
/// `min_depth` threshold drawn across the whole length.
///
/// # Arguments
///
/// * `depths` - Depth per position, 1-based position = index + 1.
/// * `min_depth` - Threshold line; skipped when 0.
/// * `sample_name` - Caption.
/// * `output_path` - PNG to write.
pub fn plot_depths(depths: &[u32], min_depth: u32, sample_name: &str, output_path: &Path) -> Result<()> {
    if depths.is_empty() {
        return Err(anyhow!("No depth data available for plotting"));
    }
    let length = depths.len();
    let y_max = depths.iter().copied().max().unwrap_or(1).max(min_depth).max(1) + 1;

    let area = BitMapBackend::new(output_path, PLOT_SIZE).into_drawing_area();
    area.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&area)
        .caption(format!("{}: depth over {} positions", sample_name, length), ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(1..length + 1, (1u32..y_max).log_scale())?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc("consensus position")
        .y_desc("read depth")
        .draw()?;

    // log axis has no zero; uncovered positions sit on the floor
    chart
        .draw_series(LineSeries::new(
            depths.iter().enumerate().map(|(i, &d)| (i + 1, d.max(1))),
            &BLUE,
        ))?
        .label("depth")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE));

    if min_depth > 0 {
        chart
            .draw_series(LineSeries::new(vec![(1, min_depth), (length, min_depth)], RED.stroke_width(1)))?
            .label(format!("min depth {}", min_depth))
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    area.present()?;
    Ok(())
}
