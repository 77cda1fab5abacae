//! Six-panel dashboard rendered with Plotters

use std::path::Path;

use plotters::coord::Shift;
use plotters::prelude::*;

use crate::anomaly::PincodeProfile;
use crate::benford::BenfordAudit;
use crate::config::ChartTheme;
use crate::model::{ClusterName, LabeledDistrict};
use crate::profile::MonthlyActivity;
use crate::resources::TargetDistrict;

type Panel<'a> = DrawingArea<BitMapBackend<'a>, Shift>;

/// Everything the dashboard draws
pub struct Dashboard<'a> {
    pub monthly: &'a [MonthlyActivity],
    pub districts: &'a [LabeledDistrict],
    pub targets: &'a [TargetDistrict],
    pub anomalies: &'a [PincodeProfile],
    pub benford: &'a BenfordAudit,
}

/// Render the dashboard as a PNG at `output_path`
pub fn render_dashboard(data: &Dashboard<'_>, theme: &ChartTheme, output_path: &Path) -> crate::Result<()> {
    let root = BitMapBackend::new(output_path, theme.size).into_drawing_area();
    root.fill(&theme.background)?;

    let panels = root.split_evenly((3, 2));

    draw_trend(&panels[0], data.monthly, theme)?;
    draw_district_scatter(&panels[1], data.districts, theme)?;

    let target_labels: Vec<String> = data.targets.iter().map(|t| t.district.clone()).collect();
    let shares: Vec<f64> = data.targets.iter().map(|t| t.student_share).collect();
    draw_hbar_panel(
        &panels[2],
        HBar {
            title: "3. Top Priority School Districts",
            x_desc: "Share of workload from students",
            labels: &target_labels,
            values: &shares,
            x_max: 1.0,
            color: theme.target_color,
        },
        theme,
    )?;

    let pincode_labels: Vec<String> = data.anomalies.iter().map(|a| a.pincode.clone()).collect();
    let volumes: Vec<f64> = data.anomalies.iter().map(|a| a.total_activity as f64).collect();
    draw_hbar_panel(
        &panels[3],
        HBar {
            title: "4. Anomalous Pincodes",
            x_desc: "Total activity",
            labels: &pincode_labels,
            values: &volumes,
            x_max: padded_max(&volumes),
            color: theme.anomaly_color,
        },
        theme,
    )?;

    let vans: Vec<f64> = data.targets.iter().map(|t| t.vans_required as f64).collect();
    draw_hbar_panel(
        &panels[4],
        HBar {
            title: "5. Resource Plan: Mobile Vans Required",
            x_desc: "Vans",
            labels: &target_labels,
            values: &vans,
            x_max: vans.iter().cloned().fold(0.0, f64::max) + 1.0,
            color: theme.vans_color,
        },
        theme,
    )?;

    draw_benford(&panels[5], data.benford, theme)?;

    root.present()?;
    Ok(())
}

fn draw_trend(area: &Panel<'_>, monthly: &[MonthlyActivity], theme: &ChartTheme) -> crate::Result<()> {
    let months: Vec<&str> = monthly.iter().map(|m| m.month.as_str()).collect();
    let totals: Vec<f64> = monthly.iter().map(|m| m.total_activity as f64).collect();
    let n = months.len().max(1);

    let mut chart = ChartBuilder::on(area)
        .caption("1. Monthly Activity Trend", (theme.font_family, theme.caption_size))
        .margin(15)
        .x_label_area_size(60)
        .y_label_area_size(90)
        .build_cartesian_2d(-0.5f64..(n as f64 - 0.5), 0f64..padded_max(&totals))?;

    chart
        .configure_mesh()
        .x_labels(n)
        .x_label_formatter(&|x| label_at(&months, *x))
        .x_desc("Month")
        .y_desc("Total activity")
        .axis_desc_style((theme.font_family, theme.label_size))
        .draw()?;

    let points: Vec<(f64, f64)> = totals.iter().enumerate().map(|(i, &t)| (i as f64, t)).collect();
    chart.draw_series(LineSeries::new(points.clone(), theme.trend_color.stroke_width(3)))?;
    chart.draw_series(
        points
            .into_iter()
            .map(|p| Circle::new(p, 5, theme.trend_color.filled())),
    )?;

    Ok(())
}

fn draw_district_scatter(area: &Panel<'_>, districts: &[LabeledDistrict], theme: &ChartTheme) -> crate::Result<()> {
    let births: Vec<f64> = districts.iter().map(|d| d.profile.age_0_5 as f64).collect();
    let students: Vec<f64> = districts.iter().map(|d| d.profile.age_5_17 as f64).collect();
    let max_total = districts
        .iter()
        .map(|d| d.profile.total_activity)
        .max()
        .unwrap_or(0);

    let mut chart = ChartBuilder::on(area)
        .caption("2. District Segmentation: Births vs Students", (theme.font_family, theme.caption_size))
        .margin(15)
        .x_label_area_size(60)
        .y_label_area_size(90)
        .build_cartesian_2d(0f64..padded_max(&births), 0f64..padded_max(&students))?;

    chart
        .configure_mesh()
        .x_desc("New enrolments (0-5 years)")
        .y_desc("Updates (5-17 years)")
        .axis_desc_style((theme.font_family, theme.label_size))
        .draw()?;

    for name in ClusterName::ALL {
        let color = theme.cluster_palette[name.index()];
        let members: Vec<&LabeledDistrict> = districts.iter().filter(|d| d.assignment.name == name).collect();
        if members.is_empty() {
            continue;
        }

        chart
            .draw_series(members.iter().map(|d| {
                Circle::new(
                    (d.profile.age_0_5 as f64, d.profile.age_5_17 as f64),
                    marker_size(d.profile.total_activity, max_total),
                    color.mix(0.6).filled(),
                )
            }))?
            .label(name.as_str())
            .legend(move |(x, y)| Circle::new((x, y), 5, color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    Ok(())
}

struct HBar<'a> {
    title: &'a str,
    x_desc: &'a str,
    labels: &'a [String],
    values: &'a [f64],
    x_max: f64,
    color: RGBColor,
}

/// Horizontal bars, first label on top
fn draw_hbar_panel(area: &Panel<'_>, bars: HBar<'_>, theme: &ChartTheme) -> crate::Result<()> {
    let n = bars.labels.len().max(1);
    let row = |i: usize| (n - 1 - i) as f64;
    let top_down: Vec<&str> = bars.labels.iter().rev().map(String::as_str).collect();

    let mut chart = ChartBuilder::on(area)
        .caption(bars.title, (theme.font_family, theme.caption_size))
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(160)
        .build_cartesian_2d(0f64..bars.x_max.max(1e-9), -0.5f64..(n as f64 - 0.5))?;

    chart
        .configure_mesh()
        .disable_y_mesh()
        .y_labels(n)
        .y_label_formatter(&|y| label_at(&top_down, *y))
        .x_desc(bars.x_desc)
        .axis_desc_style((theme.font_family, theme.label_size))
        .draw()?;

    chart.draw_series(bars.values.iter().enumerate().map(|(i, &v)| {
        Rectangle::new([(0.0, row(i) - 0.35), (v, row(i) + 0.35)], bars.color.filled())
    }))?;

    Ok(())
}

fn draw_benford(area: &Panel<'_>, audit: &BenfordAudit, theme: &ChartTheme) -> crate::Result<()> {
    let observed: Vec<f64> = audit.observed().iter().map(|&c| c as f64).collect();
    let expected = audit.expected();
    let y_max = padded_max(&observed).max(padded_max(&expected));

    let mut chart = ChartBuilder::on(area)
        .caption("6. Leading-Digit Audit (Benford's Law)", (theme.font_family, theme.caption_size))
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(90)
        .build_cartesian_2d(0.5f64..9.5f64, 0f64..y_max)?;

    chart
        .configure_mesh()
        .x_labels(9)
        .x_label_formatter(&|x| format!("{:.0}", x))
        .x_desc("Leading digit")
        .y_desc("Count")
        .axis_desc_style((theme.font_family, theme.label_size))
        .draw()?;

    let observed_color = theme.observed_color;
    chart
        .draw_series(audit.bins.iter().map(|bin| {
            let x = f64::from(bin.digit);
            Rectangle::new(
                [(x - 0.35, 0.0), (x + 0.35, bin.observed as f64)],
                observed_color.mix(0.6).filled(),
            )
        }))?
        .label("Observed")
        .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], observed_color.filled()));

    let expected_color = theme.expected_color;
    let expected_points: Vec<(f64, f64)> = audit
        .bins
        .iter()
        .map(|bin| (f64::from(bin.digit), bin.expected))
        .collect();
    chart
        .draw_series(LineSeries::new(expected_points.clone(), expected_color.stroke_width(2)))?
        .label("Benford's Law (expected)")
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 15, y)], expected_color.stroke_width(2)));
    chart.draw_series(
        expected_points
            .into_iter()
            .map(|p| Circle::new(p, 4, expected_color.filled())),
    )?;

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    Ok(())
}

/// Axis upper bound with 10% headroom, never zero
fn padded_max(values: &[f64]) -> f64 {
    let max = values.iter().cloned().fold(0.0, f64::max);
    if max > 0.0 {
        max * 1.1
    } else {
        1.0
    }
}

/// Label for an integer axis position; empty between positions or out of range
fn label_at(labels: &[&str], pos: f64) -> String {
    let idx = pos.round();
    if (pos - idx).abs() > 1e-6 || idx < 0.0 {
        return String::new();
    }
    labels
        .get(idx as usize)
        .map(|s| s.to_string())
        .unwrap_or_default()
}

/// Marker radius scaled by the square root of relative activity
fn marker_size(total_activity: u64, max_total: u64) -> u32 {
    if max_total == 0 {
        return 3;
    }
    let ratio = (total_activity as f64 / max_total as f64).sqrt();
    3 + (ratio * 12.0).round() as u32
}
