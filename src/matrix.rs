use crate::error::KiraError;

/// Row-major features x samples grid. Missing measurements are `f64::NAN`.
#[derive(Debug, Clone)]
pub struct ExpressionMatrix {
    data: Vec<f64>,
    n_features: usize,
    n_samples: usize,
    sample_labels: Vec<String>,
}

impl ExpressionMatrix {
    pub fn new(rows: Vec<Vec<f64>>, sample_labels: Vec<String>) -> Result<Self, KiraError> {
        let n_features = rows.len();
        let n_samples = sample_labels.len();

        let mut data = Vec::with_capacity(n_features * n_samples);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != n_samples {
                return Err(KiraError::InvalidInput(format!(
                    "row {i} has {} values, expected {n_samples}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }

        Ok(Self {
            data,
            n_features,
            n_samples,
            sample_labels,
        })
    }

    pub fn from_flat(
        data: Vec<f64>,
        n_features: usize,
        sample_labels: Vec<String>,
    ) -> Result<Self, KiraError> {
        let n_samples = sample_labels.len();
        if data.len() != n_features * n_samples {
            return Err(KiraError::InvalidInput(format!(
                "buffer holds {} values, expected {n_features} x {n_samples}",
                data.len()
            )));
        }
        Ok(Self {
            data,
            n_features,
            n_samples,
            sample_labels,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.n_features, self.n_samples)
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn get(&self, feature: usize, sample: usize) -> Option<f64> {
        if feature < self.n_features && sample < self.n_samples {
            Some(self.data[feature * self.n_samples + sample])
        } else {
            None
        }
    }

    pub fn row(&self, feature: usize) -> Option<&[f64]> {
        if feature < self.n_features {
            let start = feature * self.n_samples;
            Some(&self.data[start..start + self.n_samples])
        } else {
            None
        }
    }

    pub fn column(&self, sample: usize) -> Option<Vec<f64>> {
        if sample >= self.n_samples {
            return None;
        }
        Some(
            (0..self.n_features)
                .map(|r| self.data[r * self.n_samples + sample])
                .collect(),
        )
    }

    pub fn sample_labels(&self) -> &[String] {
        &self.sample_labels
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Positions must already be bounds-checked by the caller.
    pub(crate) fn select_rows(&self, positions: &[usize]) -> ExpressionMatrix {
        let mut data = Vec::with_capacity(positions.len() * self.n_samples);
        for &r in positions {
            let start = r * self.n_samples;
            data.extend_from_slice(&self.data[start..start + self.n_samples]);
        }
        ExpressionMatrix {
            data,
            n_features: positions.len(),
            n_samples: self.n_samples,
            sample_labels: self.sample_labels.clone(),
        }
    }

    pub(crate) fn select_columns(&self, positions: &[usize]) -> ExpressionMatrix {
        let mut data = Vec::with_capacity(self.n_features * positions.len());
        for r in 0..self.n_features {
            let row = r * self.n_samples;
            data.extend(positions.iter().map(|&c| self.data[row + c]));
        }
        ExpressionMatrix {
            data,
            n_features: self.n_features,
            n_samples: positions.len(),
            sample_labels: positions
                .iter()
                .map(|&c| self.sample_labels[c].clone())
                .collect(),
        }
    }
}

impl PartialEq for ExpressionMatrix {
    fn eq(&self, other: &Self) -> bool {
        self.n_features == other.n_features
            && self.n_samples == other.n_samples
            && self.sample_labels == other.sample_labels
            && self
                .data
                .iter()
                .zip(&other.data)
                .all(|(a, b)| same_value(*a, *b))
    }
}

/// Missing cells (NaN) compare equal to each other.
pub(crate) fn same_value(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_matrix() -> ExpressionMatrix {
        ExpressionMatrix::new(
            vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
            vec!["s1".into(), "s2".into(), "s3".into()],
        )
        .unwrap()
    }

    #[test]
    fn construction_shape() {
        let m = sample_matrix();
        assert_eq!(m.shape(), (2, 3));
        assert_eq!(m.get(1, 2), Some(6.0));
        assert_eq!(m.get(2, 0), None);
    }

    #[test]
    fn ragged_rows_rejected() {
        let result = ExpressionMatrix::new(
            vec![vec![1.0, 2.0], vec![3.0]],
            vec!["s1".into(), "s2".into()],
        );
        assert!(result.is_err());
    }

    #[test]
    fn flat_buffer_size_checked() {
        assert!(ExpressionMatrix::from_flat(vec![1.0; 5], 2, vec!["a".into(), "b".into()]).is_err());
        let m = ExpressionMatrix::from_flat(vec![1.0; 4], 2, vec!["a".into(), "b".into()]).unwrap();
        assert_eq!(m.shape(), (2, 2));
    }

    #[test]
    fn row_and_column_access() {
        let m = sample_matrix();
        assert_eq!(m.row(0), Some(&[1.0, 2.0, 3.0][..]));
        assert_eq!(m.column(2), Some(vec![3.0, 6.0]));
        assert_eq!(m.column(3), None);
    }

    #[test]
    fn select_columns_reorders_labels() {
        let m = sample_matrix().select_columns(&[2, 0]);
        assert_eq!(m.sample_labels(), &["s3".to_string(), "s1".to_string()]);
        assert_eq!(m.row(1), Some(&[6.0, 4.0][..]));
    }

    #[test]
    fn select_rows_keeps_labels() {
        let m = sample_matrix().select_rows(&[1]);
        assert_eq!(m.shape(), (1, 3));
        assert_eq!(m.row(0), Some(&[4.0, 5.0, 6.0][..]));
        assert_eq!(m.sample_labels().len(), 3);
    }

    #[test]
    fn missing_cells_compare_equal() {
        let m = ExpressionMatrix::new(vec![vec![1.0, f64::NAN]], vec!["a".into(), "b".into()])
            .unwrap();
        assert_eq!(m, m.clone());
        let other =
            ExpressionMatrix::new(vec![vec![1.0, 2.0]], vec!["a".into(), "b".into()]).unwrap();
        assert_ne!(m, other);
    }

    #[test]
    fn empty_column_selection() {
        let m = sample_matrix().select_columns(&[]);
        assert_eq!(m.shape(), (2, 0));
        assert_eq!(m.row(0), Some(&[][..]));
    }
}
