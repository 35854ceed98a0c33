//! Per-feature standardization.
//!
//! The scaler works on the last dimension of a tensor, so the same fitted
//! state standardizes `[N, F]` static batches and `[B, T, F]` sequence
//! batches alike.

use crate::error::{FeatureError, FeatureResult};
use district_layers::Tensor;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Standard deviations below this are treated as constant features.
const MIN_STD: f32 = 1e-8;

/// Persisted scaler state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ScalerState {
    mean: Vec<f32>,
    std: Vec<f32>,
}

/// Zero-mean, unit-variance scaling fitted per column.
///
/// # Example
///
/// ```
/// use district_features::scaler::FeatureScaler;
/// use district_layers::Tensor;
///
/// let x = Tensor::from_data(&[2, 2], vec![1.0, 10.0, 3.0, 10.0]);
/// let mut scaler = FeatureScaler::new();
/// let z = scaler.fit_transform(&x).unwrap();
/// assert_eq!(z.data(), &[-1.0, 0.0, 1.0, 0.0]);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureScaler {
    state: Option<ScalerState>,
}

impl FeatureScaler {
    /// Creates an unfitted scaler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once [`FeatureScaler::fit`] or [`FeatureScaler::load`]
    /// has succeeded.
    pub fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    /// Per-column means, if fitted.
    pub fn mean(&self) -> Option<&[f32]> {
        self.state.as_ref().map(|s| s.mean.as_slice())
    }

    /// Per-column standard deviations, if fitted.
    pub fn std(&self) -> Option<&[f32]> {
        self.state.as_ref().map(|s| s.std.as_slice())
    }

    /// Fits column means and population standard deviations.
    ///
    /// # Errors
    ///
    /// Returns [`FeatureError::EmptyInput`] when `x` has no rows or no
    /// columns.
    pub fn fit(&mut self, x: &Tensor) -> FeatureResult<&mut Self> {
        let width = last_dim(x);
        if width == 0 || x.numel() == 0 {
            return Err(FeatureError::EmptyInput);
        }
        let rows = x.numel() / width;
        let data = x.data();

        let mut mean = vec![0.0f64; width];
        for row in data.chunks_exact(width) {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += *v as f64;
            }
        }
        for m in &mut mean {
            *m /= rows as f64;
        }

        let mut var = vec![0.0f64; width];
        for row in data.chunks_exact(width) {
            for ((acc, v), m) in var.iter_mut().zip(row).zip(&mean) {
                let d = *v as f64 - m;
                *acc += d * d;
            }
        }

        let std = var
            .iter()
            .map(|v| {
                let s = (v / rows as f64).sqrt() as f32;
                if s < MIN_STD {
                    1.0
                } else {
                    s
                }
            })
            .collect();
        self.state = Some(ScalerState {
            mean: mean.into_iter().map(|m| m as f32).collect(),
            std,
        });
        Ok(self)
    }

    /// Standardizes `x` with the fitted statistics.
    ///
    /// # Errors
    ///
    /// [`FeatureError::NotFitted`] before fitting and
    /// [`FeatureError::DimensionMismatch`] when the last dimension differs.
    pub fn transform(&self, x: &Tensor) -> FeatureResult<Tensor> {
        let state = self.checked_state(last_dim(x))?;
        Ok(apply(x, |i, v| (v - state.mean[i]) / state.std[i], state.mean.len()))
    }

    /// Maps standardized values back to the original scale.
    pub fn inverse_transform(&self, x: &Tensor) -> FeatureResult<Tensor> {
        let state = self.checked_state(last_dim(x))?;
        Ok(apply(x, |i, v| v * state.std[i] + state.mean[i], state.mean.len()))
    }

    /// Fits on `x` and returns its standardized copy.
    pub fn fit_transform(&mut self, x: &Tensor) -> FeatureResult<Tensor> {
        self.fit(x)?;
        self.transform(x)
    }

    /// Standardizes a single row.
    pub fn transform_row(&self, row: &[f32]) -> FeatureResult<Vec<f32>> {
        let state = self.checked_state(row.len())?;
        Ok(row
            .iter()
            .enumerate()
            .map(|(i, v)| (v - state.mean[i]) / state.std[i])
            .collect())
    }

    /// Writes `{"mean": [...], "std": [...]}` to `path`, creating parent
    /// directories.
    pub fn save(&self, path: &Path) -> FeatureResult<()> {
        let state = self.state.as_ref().ok_or(FeatureError::NotFitted)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FeatureError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let json = serde_json::to_string(state)?;
        std::fs::write(path, json).map_err(|e| FeatureError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        tracing::debug!(path = %path.display(), features = state.mean.len(), "Scaler saved");
        Ok(())
    }

    /// Reads a scaler written by [`FeatureScaler::save`].
    pub fn load(path: &Path) -> FeatureResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| FeatureError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let state: ScalerState = serde_json::from_str(&json)?;
        if state.mean.len() != state.std.len() {
            return Err(FeatureError::LengthMismatch {
                what: "std",
                expected: state.mean.len(),
                actual: state.std.len(),
            });
        }
        Ok(Self { state: Some(state) })
    }

    fn checked_state(&self, width: usize) -> FeatureResult<&ScalerState> {
        let state = self.state.as_ref().ok_or(FeatureError::NotFitted)?;
        if state.mean.len() != width {
            return Err(FeatureError::DimensionMismatch {
                expected: state.mean.len(),
                actual: width,
            });
        }
        Ok(state)
    }
}

fn last_dim(x: &Tensor) -> usize {
    x.shape().last().copied().unwrap_or(0)
}

fn apply<F>(x: &Tensor, f: F, width: usize) -> Tensor
where
    F: Fn(usize, f32) -> f32,
{
    let data = x
        .data()
        .iter()
        .enumerate()
        .map(|(idx, v)| f(idx % width, *v))
        .collect();
    Tensor::from_data(x.shape(), data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> Tensor {
        Tensor::from_data(
            &[4, 3],
            vec![
                1.0, 100.0, 5.0, //
                2.0, 200.0, 5.0, //
                3.0, 300.0, 5.0, //
                4.0, 400.0, 5.0,
            ],
        )
    }

    #[test]
    fn test_fit_uses_population_std() {
        let mut scaler = FeatureScaler::new();
        scaler.fit(&sample()).unwrap();
        let std = scaler.std().unwrap();
        // population std of 1..4 is sqrt(1.25)
        assert!((std[0] - 1.25f32.sqrt()).abs() < 1e-6);
        assert!((std[1] - 100.0 * 1.25f32.sqrt()).abs() < 1e-3);
        assert_eq!(std[2], 1.0);
        assert_eq!(scaler.mean().unwrap(), &[2.5, 250.0, 5.0]);
    }

    #[test]
    fn test_round_trip() {
        let x = sample();
        let mut scaler = FeatureScaler::new();
        let z = scaler.fit_transform(&x).unwrap();
        let back = scaler.inverse_transform(&z).unwrap();
        for (a, b) in back.data().iter().zip(x.data()) {
            assert!((a - b).abs() < 1e-3);
        }
        // constant column maps to zero
        assert_eq!(z.row(0)[2], 0.0);
    }

    #[test]
    fn test_not_fitted() {
        let scaler = FeatureScaler::new();
        assert!(!scaler.is_fitted());
        assert!(matches!(scaler.transform(&sample()), Err(FeatureError::NotFitted)));
        assert!(matches!(
            scaler.inverse_transform(&sample()),
            Err(FeatureError::NotFitted)
        ));
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut scaler = FeatureScaler::new();
        scaler.fit(&sample()).unwrap();
        let err = scaler.transform(&Tensor::zeros(&[2, 5])).unwrap_err();
        assert!(matches!(
            err,
            FeatureError::DimensionMismatch {
                expected: 3,
                actual: 5
            }
        ));
    }

    #[test]
    fn test_empty_fit_rejected() {
        let mut scaler = FeatureScaler::new();
        assert!(matches!(
            scaler.fit(&Tensor::zeros(&[0, 3])),
            Err(FeatureError::EmptyInput)
        ));
    }

    #[test]
    fn test_sequence_tensor_uses_last_dimension() {
        let mut scaler = FeatureScaler::new();
        scaler.fit(&sample()).unwrap();
        let seq = Tensor::from_data(&[1, 2, 3], vec![2.5, 250.0, 5.0, 2.5, 250.0, 5.0]);
        let z = scaler.transform(&seq).unwrap();
        assert_eq!(z.shape(), &[1, 2, 3]);
        assert!(z.data().iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("scaler.pkl");
        let mut scaler = FeatureScaler::new();
        scaler.fit(&sample()).unwrap();
        scaler.save(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw.get("mean").is_some());
        assert!(raw.get("std").is_some());

        let loaded = FeatureScaler::load(&path).unwrap();
        assert!(loaded.is_fitted());
        assert_eq!(loaded, scaler);
        assert_eq!(
            loaded.transform_row(&[2.5, 250.0, 5.0]).unwrap(),
            vec![0.0, 0.0, 0.0]
        );
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let err = FeatureScaler::load(&dir.path().join("absent.pkl")).unwrap_err();
        assert!(matches!(err, FeatureError::Io { .. }));
    }
}
