use std::error::Error;
use std::path::Path;

use plotters::coord::types::RangedCoordf64;
use plotters::prelude::*;

use crate::models::ResultMapping;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MarkerShape {
    Circle,
    Diamond,
    Triangle,
}

/// Joins one category on the x mapping to one category on the y mapping.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SeriesPairing {
    pub(crate) label: &'static str,
    pub(crate) x_category: &'static str,
    pub(crate) y_category: &'static str,
    pub(crate) marker: MarkerShape,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ScatterPoint {
    pub(crate) entity: String,
    pub(crate) series: &'static str,
    pub(crate) marker: MarkerShape,
    pub(crate) x: f64,
    pub(crate) y: f64,
}

pub(crate) struct ChartSpec<'a> {
    pub(crate) title: &'a str,
    pub(crate) x_desc: &'a str,
    pub(crate) y_desc: &'a str,
    pub(crate) legend_at: LegendCorner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LegendCorner {
    UpperLeft,
    UpperRight,
}

impl LegendCorner {
    fn position(self) -> SeriesLabelPosition {
        match self {
            Self::UpperLeft => SeriesLabelPosition::UpperLeft,
            Self::UpperRight => SeriesLabelPosition::UpperRight,
        }
    }
}

/// One point per entity and pairing where both sides have a value.
/// Entities follow the x mapping's order.
pub(crate) fn match_pairs(
    x: &ResultMapping,
    y: &ResultMapping,
    pairings: &[SeriesPairing],
) -> Vec<ScatterPoint> {
    let mut points = Vec::new();
    for (entity, pairs) in x.iter() {
        for (category, x_value) in pairs {
            for pairing in pairings.iter().filter(|p| p.x_category == category) {
                if let Some(y_value) = y.value_of(entity, pairing.y_category) {
                    points.push(ScatterPoint {
                        entity: entity.to_string(),
                        series: pairing.label,
                        marker: pairing.marker,
                        x: *x_value,
                        y: y_value,
                    });
                }
            }
        }
    }
    points
}

const PALETTE: [RGBColor; 9] = [
    RED,
    GREEN,
    BLUE,
    MAGENTA,
    CYAN,
    YELLOW,
    RGBColor(255, 165, 0),
    RGBColor(255, 192, 203),
    RGBColor(128, 0, 128),
];

const LEGEND_GRAY: RGBColor = RGBColor(169, 169, 169);

pub(crate) fn entity_color(position: usize) -> RGBColor {
    PALETTE[position % PALETTE.len()]
}

/// Axis range padded by 5% on each side; flat ranges get a unit of room.
pub(crate) fn padded_range(values: impl Iterator<Item = f64>) -> std::ops::Range<f64> {
    let (low, high) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !low.is_finite() || !high.is_finite() {
        return 0.0..1.0;
    }
    let pad = if high > low { (high - low) * 0.05 } else { 1.0 };
    (low - pad)..(high + pad)
}

pub(crate) fn render_scatter(
    points: &[ScatterPoint],
    entities: &[String],
    pairings: &[SeriesPairing],
    spec: &ChartSpec,
    output_file: &Path,
) -> Result<(), Box<dyn Error>> {
    let root = BitMapBackend::new(output_file, (900, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(spec.title, ("sans-serif", 22))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(
            padded_range(points.iter().map(|p| p.x)),
            padded_range(points.iter().map(|p| p.y)),
        )?;

    chart
        .configure_mesh()
        .x_desc(spec.x_desc)
        .y_desc(spec.y_desc)
        .axis_desc_style(("sans-serif", 14))
        .draw()?;

    for (position, entity) in entities.iter().enumerate() {
        let color = entity_color(position);
        let mine = points.iter().filter(|p| &p.entity == entity);

        for pairing in pairings {
            let coords: Vec<(f64, f64)> = mine
                .clone()
                .filter(|p| p.series == pairing.label)
                .map(|p| (p.x, p.y))
                .collect();
            draw_markers(&mut chart, &coords, pairing.marker, color)?;
        }

        // Legend-only series: a coloured square per entity.
        chart
            .draw_series(std::iter::empty::<Circle<(f64, f64), i32>>())?
            .label(entity.as_str())
            .legend(move |(x, y)| {
                Rectangle::new([(x - 5, y - 5), (x + 5, y + 5)], color.filled())
            });
    }

    let gray = LEGEND_GRAY.filled();
    for pairing in pairings {
        let anno = chart
            .draw_series(std::iter::empty::<Circle<(f64, f64), i32>>())?
            .label(pairing.label);
        match pairing.marker {
            MarkerShape::Circle => {
                anno.legend(move |(x, y)| Circle::new((x, y), 5, gray));
            }
            MarkerShape::Triangle => {
                anno.legend(move |(x, y)| TriangleMarker::new((x, y), 6, gray));
            }
            MarkerShape::Diamond => {
                anno.legend(move |(x, y)| {
                    Polygon::new(vec![(x, y - 6), (x + 6, y), (x, y + 6), (x - 6, y)], gray)
                });
            }
        }
    }

    chart
        .configure_series_labels()
        .position(spec.legend_at.position())
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .label_font(("sans-serif", 12))
        .draw()?;

    root.present()?;
    println!("Scatter plot saved to {}", output_file.display());
    Ok(())
}

type ScatterChart<'a, 'b> =
    ChartContext<'a, BitMapBackend<'b>, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

fn draw_markers(
    chart: &mut ScatterChart<'_, '_>,
    coords: &[(f64, f64)],
    marker: MarkerShape,
    color: RGBColor,
) -> Result<(), Box<dyn Error>> {
    let style = color.filled();
    match marker {
        MarkerShape::Circle => {
            chart.draw_series(coords.iter().map(|&c| Circle::new(c, 6, style)))?;
        }
        MarkerShape::Triangle => {
            chart.draw_series(coords.iter().map(|&c| TriangleMarker::new(c, 7, style)))?;
        }
        MarkerShape::Diamond => {
            chart.draw_series(coords.iter().map(|&c| {
                EmptyElement::at(c) + Polygon::new(vec![(0, -7), (7, 0), (0, 7), (-7, 0)], style)
            }))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAIRINGS: [SeriesPairing; 2] = [
        SeriesPairing {
            label: "Primary",
            x_category: "Primary education",
            y_category: "Below upper secondary education",
            marker: MarkerShape::Circle,
        },
        SeriesPairing {
            label: "Upper secondary",
            x_category: "Upper secondary education",
            y_category: "Upper secondary education",
            marker: MarkerShape::Diamond,
        },
    ];

    #[test]
    fn pairs_are_matched_through_the_correspondence_table() {
        let mut education = ResultMapping::default();
        education.insert_first_seen("Austria", "Primary education", 10.0);
        education.insert_first_seen("Austria", "Upper secondary education", 50.0);
        education.insert_first_seen("Korea", "Primary education", 7.0);

        let mut income = ResultMapping::default();
        income.insert_first_seen("Austria", "Below upper secondary education", 31.0);
        income.insert_first_seen("Austria", "Upper secondary education", 44.0);

        let points = match_pairs(&education, &income, &PAIRINGS);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].series, "Primary");
        assert_eq!((points[0].x, points[0].y), (10.0, 31.0));
        assert_eq!(points[1].marker, MarkerShape::Diamond);
        assert_eq!((points[1].x, points[1].y), (50.0, 44.0));
        assert!(points.iter().all(|p| p.entity == "Austria"));
    }

    #[test]
    fn unmatched_categories_produce_nothing() {
        let mut x = ResultMapping::default();
        x.insert_first_seen("Chile", "Doctoral", 1.0);
        let y = ResultMapping::default();
        assert!(match_pairs(&x, &y, &PAIRINGS).is_empty());
    }

    #[test]
    fn colors_cycle_through_the_palette() {
        assert_eq!(entity_color(0), RED);
        assert_eq!(entity_color(PALETTE.len()), RED);
        assert_eq!(entity_color(6), RGBColor(255, 165, 0));
    }

    #[test]
    fn ranges_are_padded() {
        let range = padded_range([10.0, 20.0].into_iter());
        assert!((range.start - 9.5).abs() < 1e-9);
        assert!((range.end - 20.5).abs() < 1e-9);

        let flat = padded_range([3.0].into_iter());
        assert_eq!(flat, 2.0..4.0);

        assert_eq!(padded_range(std::iter::empty()), 0.0..1.0);
    }
}
