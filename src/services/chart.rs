// src/services/chart.rs
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use plotters::prelude::*;

use crate::error::{BotError, Result};
use crate::models::BondSeries;
use crate::services::dates::chart_label;

pub const CHART_WIDTH: u32 = 1000;
pub const CHART_HEIGHT: u32 = 400;
pub const CHART_TITLE: &str = "Singapore Savings Bonds 10-Year Returns";

/// Month labels and 10-year returns, paired by position.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

impl ChartData {
    pub fn from_series(series: &BondSeries) -> Self {
        let (labels, values) = series
            .iter()
            .map(|(bond, profile)| (chart_label(bond.issue_date), profile.ten_year_average_return()))
            .unzip();
        ChartData { labels, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn value_range(&self) -> (f64, f64) {
        let min = self.values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (min - 0.5, max + 0.5)
    }

    fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(BotError::RenderError("cannot plot an empty series".into()));
        }
        if self.labels.len() != self.values.len() {
            return Err(BotError::RenderError(format!(
                "{} labels for {} values",
                self.labels.len(),
                self.values.len()
            )));
        }
        if self.values.iter().any(|v| !v.is_finite()) {
            return Err(BotError::RenderError("non-finite return value".into()));
        }
        Ok(())
    }
}

/// Turns chart data into image bytes.
pub trait ChartRenderer: Send + Sync {
    fn render(&self, data: &ChartData) -> Result<Vec<u8>>;
}

/// PNG line chart drawn with plotters.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlottersRenderer;

/// Month label for an x position; tick marks between two bonds stay blank.
fn axis_label(labels: &[String], x: f64) -> String {
    let index = x.round();
    if index < 0.0 || (x - index).abs() > 1e-6 {
        return String::new();
    }
    labels.get(index as usize).cloned().unwrap_or_default()
}

fn render_err<E: std::fmt::Display>(e: E) -> BotError {
    BotError::RenderError(e.to_string())
}

impl ChartRenderer for PlottersRenderer {
    fn render(&self, data: &ChartData) -> Result<Vec<u8>> {
        data.validate()?;

        let mut buffer = vec![0u8; (CHART_WIDTH * CHART_HEIGHT * 3) as usize];
        {
            let root = BitMapBackend::with_buffer(&mut buffer, (CHART_WIDTH, CHART_HEIGHT))
                .into_drawing_area();
            root.fill(&WHITE).map_err(render_err)?;

            let last = data.len() as f64 - 1.0;
            let (y_min, y_max) = data.value_range();

            let mut chart = ChartBuilder::on(&root)
                .caption(CHART_TITLE, ("sans-serif", 24))
                .margin(20)
                .x_label_area_size(40)
                .y_label_area_size(60)
                .build_cartesian_2d(-0.5f64..last + 0.5, y_min..y_max)
                .map_err(render_err)?;

            chart
                .configure_mesh()
                .disable_x_mesh()
                .x_labels(data.len())
                .x_label_formatter(&|x: &f64| axis_label(&data.labels, *x))
                .y_label_formatter(&|y: &f64| format!("{:.2}%", y))
                .draw()
                .map_err(render_err)?;

            let points: Vec<(f64, f64)> = data
                .values
                .iter()
                .enumerate()
                .map(|(i, v)| (i as f64, *v))
                .collect();

            chart
                .draw_series(LineSeries::new(points.clone(), BLUE.stroke_width(2)))
                .map_err(render_err)?
                .label("Interest Rates")
                .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLUE));

            chart
                .draw_series(points.iter().map(|&(x, y)| {
                    EmptyElement::at((x, y))
                        + Circle::new((0, 0), 3, BLUE.filled())
                        + Text::new(format!("{:.2}%", y), (-14, -18), ("sans-serif", 12).into_font())
                }))
                .map_err(render_err)?;

            chart
                .configure_series_labels()
                .position(SeriesLabelPosition::UpperRight)
                .background_style(&WHITE.mix(0.8))
                .border_style(&BLACK)
                .draw()
                .map_err(render_err)?;

            root.present().map_err(render_err)?;
        }

        let mut png = Vec::new();
        PngEncoder::new(&mut png)
            .write_image(&buffer, CHART_WIDTH, CHART_HEIGHT, ColorType::Rgb8)
            .map_err(render_err)?;
        Ok(png)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BondInterestProfile, SavingsBond};
    use chrono::NaiveDate;

    fn entry(code: &str, y: i32, m: u32, ten_year: f64) -> (SavingsBond, BondInterestProfile) {
        let date = NaiveDate::from_ymd_opt(y, m, 1).unwrap();
        let mut returns = [2.5; 10];
        returns[9] = ten_year;
        (
            SavingsBond {
                issue_code: code.into(),
                isin_code: None,
                auction_tenor: None,
                issue_size: 700.0,
                amount_applied: None,
                issue_date: date,
                maturity_date: date,
                last_day_to_apply: date,
                first_interest_date: date,
                payment_month: "Jan,Jul".into(),
            },
            BondInterestProfile {
                issue_code: code.into(),
                coupons: [2.5; 10],
                returns,
            },
        )
    }

    #[test]
    fn labels_align_with_values() {
        let series = BondSeries::new(vec![
            entry("SBFEB25", 2025, 2, 2.9),
            entry("SBDEC24", 2024, 12, 3.1),
            entry("SBJAN25", 2025, 1, 3.0),
        ])
        .unwrap();
        let data = ChartData::from_series(&series);
        assert_eq!(data.labels, vec!["Dec 24", "Jan 25", "Feb 25"]);
        assert_eq!(data.values, vec![3.1, 3.0, 2.9]);
    }

    #[test]
    fn empty_series_is_render_error() {
        let data = ChartData {
            labels: vec![],
            values: vec![],
        };
        assert!(matches!(
            PlottersRenderer.render(&data),
            Err(BotError::RenderError(_))
        ));
    }

    #[test]
    fn axis_labels_only_on_whole_positions() {
        let labels: Vec<String> = vec!["Dec 24".into(), "Jan 25".into(), "Feb 25".into()];
        assert_eq!(axis_label(&labels, 0.0), "Dec 24");
        assert_eq!(axis_label(&labels, 2.0), "Feb 25");
        assert_eq!(axis_label(&labels, 0.5), "");
        assert_eq!(axis_label(&labels, 1.4), "");
        assert_eq!(axis_label(&labels, -0.5), "");
        assert_eq!(axis_label(&labels, 3.0), "");
    }

    #[test]
    fn renders_png_for_a_short_series() {
        // label text needs a system font; hosts without one cannot draw at all
        if ("sans-serif", 12).into_font().box_size("Jan 25").is_err() {
            eprintln!("no sans-serif font available, skipping chart render");
            return;
        }
        let series = BondSeries::new(vec![
            entry("SBDEC24", 2024, 12, 3.1),
            entry("SBJAN25", 2025, 1, 3.0),
            entry("SBFEB25", 2025, 2, 2.9),
        ])
        .unwrap();
        let png = PlottersRenderer
            .render(&ChartData::from_series(&series))
            .unwrap();
        assert!(png.starts_with(b"\x89PNG\r\n\x1a\n"));
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let data = ChartData {
            labels: vec!["Jan 25".into()],
            values: vec![3.0, 3.1],
        };
        assert!(matches!(data.validate(), Err(BotError::RenderError(_))));
    }

    #[test]
    fn value_range_pads_extremes() {
        let data = ChartData {
            labels: vec!["a".into(), "b".into()],
            values: vec![2.0, 3.0],
        };
        assert_eq!(data.value_range(), (1.5, 3.5));
    }
}
