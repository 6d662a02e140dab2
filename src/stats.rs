use ndarray::{Array1, ArrayView1};
use statrs::statistics::{Data, Distribution, Median};

use crate::plot::ScatterPoint;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Summary {
    pub(crate) count: usize,
    pub(crate) mean: f64,
    pub(crate) median: f64,
    pub(crate) std_dev: Option<f64>,
}

/// `None` for an empty sample. `std_dev` needs at least two values.
pub(crate) fn summarize(values: &[f64]) -> Option<Summary> {
    if values.is_empty() {
        return None;
    }
    let data = Data::new(values.to_vec());
    Some(Summary {
        count: values.len(),
        mean: data.mean()?,
        median: data.median(),
        std_dev: if values.len() > 1 { data.std_dev() } else { None },
    })
}

// Pearson correlation
fn calculate_correlation(x: &ArrayView1<f64>, y: &ArrayView1<f64>) -> Option<f64> {
    if x.len() != y.len() {
        return None;
    }
    let x_mean = x.mean()?;
    let y_mean = y.mean()?;
    let numerator = x
        .iter()
        .zip(y.iter())
        .map(|(&xi, &yi)| (xi - x_mean) * (yi - y_mean))
        .sum::<f64>();
    let denominator_x = x.iter().map(|&xi| (xi - x_mean).powi(2)).sum::<f64>().sqrt();
    let denominator_y = y.iter().map(|&yi| (yi - y_mean).powi(2)).sum::<f64>().sqrt();
    if denominator_x > 0.0 && denominator_y > 0.0 {
        Some(numerator / (denominator_x * denominator_y))
    } else {
        None
    }
}

pub(crate) fn correlation(points: &[ScatterPoint]) -> Option<f64> {
    let xs: Array1<f64> = points.iter().map(|p| p.x).collect();
    let ys: Array1<f64> = points.iter().map(|p| p.y).collect();
    calculate_correlation(&xs.view(), &ys.view())
}

/// Prints the x/y summaries and their correlation for each series.
pub(crate) fn print_report(title: &str, points: &[ScatterPoint], series: &[&str]) {
    println!("{}:", title);
    for label in series {
        let picked: Vec<ScatterPoint> = points
            .iter()
            .filter(|p| p.series == *label)
            .cloned()
            .collect();
        let xs: Vec<f64> = picked.iter().map(|p| p.x).collect();
        let ys: Vec<f64> = picked.iter().map(|p| p.y).collect();
        match (summarize(&xs), summarize(&ys)) {
            (Some(x), Some(y)) => {
                println!(
                    "  {} (n={}): x mean {:.2}, median {:.2}, sd {} \
                     | y mean {:.2}, median {:.2}, sd {}",
                    label,
                    x.count,
                    x.mean,
                    x.median,
                    format_sd(x.std_dev),
                    y.mean,
                    y.median,
                    format_sd(y.std_dev)
                );
                match correlation(&picked) {
                    Some(r) => println!("  {} correlation: {:.2}", label, r),
                    None => println!("  {} correlation: n/a", label),
                }
            }
            _ => println!("  {}: no matched points", label),
        }
    }
}

fn format_sd(std_dev: Option<f64>) -> String {
    std_dev.map_or_else(|| "n/a".to_string(), |sd| format!("{:.2}", sd))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plot::MarkerShape;

    fn point(x: f64, y: f64) -> ScatterPoint {
        ScatterPoint {
            entity: "Norway".into(),
            series: "Female",
            marker: MarkerShape::Circle,
            x,
            y,
        }
    }

    #[test]
    fn summary_of_a_small_sample() {
        let summary = summarize(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(summary.count, 4);
        assert!((summary.mean - 2.5).abs() < 1e-12);
        assert!((summary.median - 2.5).abs() < 1e-12);
        assert!(summary.std_dev.is_some());

        let single = summarize(&[7.0]).unwrap();
        assert_eq!(single.std_dev, None);
        assert!(summarize(&[]).is_none());
    }

    #[test]
    fn perfectly_linear_points_correlate() {
        let up = [point(1.0, 2.0), point(2.0, 4.0), point(3.0, 6.0)];
        assert!((correlation(&up).unwrap() - 1.0).abs() < 1e-12);

        let down = [point(1.0, 3.0), point(2.0, 2.0), point(3.0, 1.0)];
        assert!((correlation(&down).unwrap() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn constant_axis_has_no_correlation() {
        let flat = [point(1.0, 5.0), point(2.0, 5.0)];
        assert_eq!(correlation(&flat), None);
        assert_eq!(correlation(&[]), None);
    }
}
