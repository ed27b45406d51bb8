//! Rendering river matrices as PNG heatmaps.

use std::path::Path;

use log::debug;
use plotters::prelude::*;
use plotters::style::colors::colormaps::ViridisRGB;
use plotters::style::FontTransform;

use crate::error::RenderError;
use crate::fold::{Aggregation, RiverMatrix};

/// Colour-scale limits for the heatmap. When not given, the 5th and 95th
/// percentiles of the finite cells are used, which keeps a few outlier
/// cells from washing out the rest of the plot.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderLimits {
    pub vmin: Option<f64>,
    pub vmax: Option<f64>,
}

/// Draw the river heatmap: phase along x, cycle along y, one coloured
/// rectangle per non-empty cell, with a colour bar on the right. Empty
/// cells are left background-coloured.
pub fn render_river_png(
    output: &Path,
    river: &RiverMatrix,
    title: Option<&str>,
    limits: RenderLimits,
) -> Result<(), RenderError> {
    let mut finite: Vec<f64> = river.values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return Err(RenderError::NothingToRender);
    }
    finite.sort_unstable_by(|a, b| a.partial_cmp(b).expect("finite values"));

    let (vmin, vmax) = resolve_limits(&finite, limits)?;
    debug!("Colour scale: {vmin}..{vmax}");

    let total_width = 1280u32;
    let total_height = 720u32;
    let color_bar_width = 140u32;
    let plot_width = total_width.saturating_sub(color_bar_width);

    let root = BitMapBackend::new(output, (total_width, total_height)).into_drawing_area();
    root.fill(&WHITE).map_err(draw_err)?;
    let (plot_area, color_bar_area) = root.split_horizontally(plot_width);

    let cycle_min = river.first_cycle as f64;
    let cycle_max = (river.last_cycle() + 1) as f64;

    let mut chart = ChartBuilder::on(&plot_area)
        .margin(20)
        .caption(title.unwrap_or("River plot"), ("sans-serif", 30))
        .x_label_area_size(70)
        .y_label_area_size(70)
        .build_cartesian_2d(0.0..1.0, cycle_min..cycle_max)
        .map_err(draw_err)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("Phase")
        .y_desc("Cycle")
        .x_label_formatter(&|v| format!("{v:.1}"))
        .y_label_formatter(&|v| format!("{v:.0}"))
        .x_label_style(("sans-serif", 24).into_font())
        .y_label_style(("sans-serif", 24).into_font())
        .draw()
        .map_err(draw_err)?;

    for (i_row, row) in river.values.rows().into_iter().enumerate() {
        let cycle_low = (river.first_cycle + i_row as i64) as f64;
        let cycle_high = cycle_low + 1.0;
        for (i_bin, &value) in row.iter().enumerate() {
            if !value.is_finite() {
                continue;
            }
            let phase_low = river.phase_edges[i_bin];
            let phase_high = river.phase_edges[i_bin + 1];
            let norm = ((value - vmin) / (vmax - vmin)).clamp(0.0, 1.0);
            let color = ViridisRGB.get_color(norm);
            chart
                .draw_series(std::iter::once(Rectangle::new(
                    [(phase_low, cycle_low), (phase_high, cycle_high)],
                    color.filled(),
                )))
                .map_err(draw_err)?;
        }
    }

    draw_color_bar(&color_bar_area, river.aggregation, vmin, vmax)?;

    root.present().map_err(draw_err)?;
    debug!("Wrote {}", output.display());
    Ok(())
}

fn draw_color_bar<DB: DrawingBackend>(
    color_bar_area: &DrawingArea<DB, plotters::coord::Shift>,
    aggregation: Aggregation,
    vmin: f64,
    vmax: f64,
) -> Result<(), RenderError> {
    let (bar_width_px, bar_height_px) = color_bar_area.dim_in_pixel();
    let bar_x_start = (bar_width_px as i32).saturating_sub(70);
    let top_margin = 40i32;
    let bottom_margin = 40i32;
    let usable_height = (bar_height_px as i32).saturating_sub(top_margin + bottom_margin);
    if usable_height <= 1 {
        return Ok(());
    }

    for i in 0..usable_height {
        let frac = 1.0 - (f64::from(i) / f64::from(usable_height - 1));
        let color = ViridisRGB.get_color(frac);
        color_bar_area
            .draw(&Rectangle::new(
                [
                    (bar_x_start, top_margin + i),
                    (bar_x_start + 30, top_margin + i + 1),
                ],
                color.filled(),
            ))
            .map_err(draw_err)?;
    }

    let label_count = 5.max(usable_height / 80);
    for i in 0..label_count {
        let frac = f64::from(i) / f64::from((label_count - 1).max(1));
        let value = vmin + (vmax - vmin) * (1.0 - frac);
        let y_pos = top_margin + (frac * f64::from(usable_height - 1)) as i32;
        color_bar_area
            .draw_text(
                &format!("{value:.4}"),
                &TextStyle::from(("sans-serif", 20).into_font()).color(&BLACK),
                (bar_x_start + 35, y_pos - 8),
            )
            .map_err(draw_err)?;
    }

    let bar_label = match aggregation {
        Aggregation::Mean => "Mean flux",
        Aggregation::Median => "Median flux",
        Aggregation::Sigma => "Significance [sigma]",
    };
    color_bar_area
        .draw_text(
            bar_label,
            &TextStyle::from(("sans-serif", 22).into_font())
                .color(&BLACK)
                .transform(FontTransform::Rotate270),
            (bar_x_start + 80, (bar_height_px / 2) as i32),
        )
        .map_err(draw_err)?;

    Ok(())
}

/// Resolve the colour-scale limits. User-supplied values win; defaults come
/// from the 5th/95th percentiles, widened when they coincide so that a
/// constant-flux matrix still renders. [RenderError::BadLimits] is reserved
/// for user-supplied inversions.
fn resolve_limits(sorted: &[f64], limits: RenderLimits) -> Result<(f64, f64), RenderError> {
    let vmin = limits.vmin.unwrap_or_else(|| percentile(sorted, 0.05));
    let vmax = limits.vmax.unwrap_or_else(|| percentile(sorted, 0.95));
    if vmin < vmax {
        return Ok((vmin, vmax));
    }
    if limits.vmin.is_some() || limits.vmax.is_some() {
        return Err(RenderError::BadLimits { vmin, vmax });
    }
    Ok((vmin - 0.5, vmax + 0.5))
}

/// Linear-interpolated percentile of an ascending-sorted slice, `q` in
/// [0, 1].
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
    }
}

fn draw_err<E: std::error::Error>(e: E) -> RenderError {
    RenderError::Draw(e.to_string())
}
