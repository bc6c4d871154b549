use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Distribution};

/// Per-feature standardization: (x - mean) / std.
///
/// Fit only on the chronological training segment and reused verbatim at
/// inference; the scaler travels inside the trained artifact so the two
/// can never diverge. A zero-variance column scales by 1.0, keeping the
/// transform finite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let width = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut means = Vec::with_capacity(width);
        let mut stds = Vec::with_capacity(width);
        for col in 0..width {
            let column: Vec<f64> = rows.iter().map(|r| r[col]).collect();
            let data = Data::new(column);
            let mean = data.mean().unwrap_or(0.0);
            let std = match data.std_dev() {
                Some(s) if s > 0.0 => s,
                _ => 1.0,
            };
            means.push(mean);
            stds.push(std);
        }
        Self { means, stds }
    }

    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(self.stds.iter()))
            .map(|(x, (mean, std))| (x - mean) / std)
            .collect()
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter().map(|r| self.transform_row(r)).collect()
    }

    pub fn width(&self) -> usize {
        self.means.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardizes_to_zero_mean_unit_variance() {
        let rows = vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0]];
        let scaler = StandardScaler::fit(&rows);
        let scaled = scaler.transform(&rows);
        let mean: f64 = scaled.iter().map(|r| r[0]).sum::<f64>() / 4.0;
        assert!(mean.abs() < 1e-12);
        assert!(scaled[0][0] < 0.0 && scaled[3][0] > 0.0);
    }

    #[test]
    fn constant_column_passes_through_centered() {
        let rows = vec![vec![5.0], vec![5.0], vec![5.0]];
        let scaler = StandardScaler::fit(&rows);
        let scaled = scaler.transform_row(&[5.0]);
        assert_eq!(scaled[0], 0.0);
        let shifted = scaler.transform_row(&[6.0]);
        assert_eq!(shifted[0], 1.0);
    }

    #[test]
    fn transform_uses_training_statistics_only() {
        let train = vec![vec![0.0], vec![10.0]];
        let scaler = StandardScaler::fit(&train);
        // A later out-of-sample value is scaled by the stored statistics,
        // not refit.
        let scaled = scaler.transform_row(&[20.0]);
        assert!(scaled[0] > 2.0);
    }
}
