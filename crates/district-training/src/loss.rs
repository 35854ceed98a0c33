//! Loss functions with their gradients.

use crate::error::{TrainingError, TrainingResult};
use district_layers::Tensor;
use serde::{Deserialize, Serialize};

const BCE_EPS: f32 = 1e-7;

/// Element-wise loss averaged over every output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Loss {
    /// Mean squared error.
    Mse,
    /// Binary cross-entropy over probabilities.
    Bce,
}

impl Loss {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Loss::Mse => "mse",
            Loss::Bce => "bce",
        }
    }

    /// Mean loss of `predictions` against `targets`.
    pub fn value(&self, predictions: &Tensor, targets: &Tensor) -> TrainingResult<f64> {
        check_shapes(predictions, targets)?;
        let n = predictions.numel().max(1) as f64;
        let total: f64 = predictions
            .data()
            .iter()
            .zip(targets.data())
            .map(|(&p, &t)| self.point(p, t))
            .sum();
        Ok(total / n)
    }

    /// Mean loss together with its gradient with respect to `predictions`.
    ///
    /// # Errors
    ///
    /// Returns [`TrainingError::ShapeMismatch`] when the shapes differ.
    pub fn compute(&self, predictions: &Tensor, targets: &Tensor) -> TrainingResult<(f64, Tensor)> {
        let value = self.value(predictions, targets)?;
        let n = predictions.numel().max(1) as f32;
        let grad: Vec<f32> = predictions
            .data()
            .iter()
            .zip(targets.data())
            .map(|(&p, &t)| match self {
                Loss::Mse => 2.0 * (p - t) / n,
                Loss::Bce => {
                    let p = p.clamp(BCE_EPS, 1.0 - BCE_EPS);
                    (p - t) / (p * (1.0 - p)) / n
                }
            })
            .collect();
        Ok((value, Tensor::from_data(predictions.shape(), grad)))
    }

    fn point(&self, p: f32, t: f32) -> f64 {
        match self {
            Loss::Mse => {
                let d = (p - t) as f64;
                d * d
            }
            Loss::Bce => {
                let p = p.clamp(BCE_EPS, 1.0 - BCE_EPS) as f64;
                let t = t as f64;
                -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
            }
        }
    }
}

fn check_shapes(predictions: &Tensor, targets: &Tensor) -> TrainingResult<()> {
    if predictions.shape() != targets.shape() {
        return Err(TrainingError::ShapeMismatch {
            predictions: predictions.shape().to_vec(),
            targets: targets.shape().to_vec(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mse_value_and_gradient() {
        let p = Tensor::from_data(&[2, 1], vec![1.0, 3.0]);
        let t = Tensor::from_data(&[2, 1], vec![0.0, 1.0]);
        let (loss, grad) = Loss::Mse.compute(&p, &t).unwrap();
        assert!((loss - 2.5).abs() < 1e-9);
        assert_eq!(grad.data(), &[1.0, 2.0]);
    }

    #[test]
    fn test_bce_is_finite_at_saturation() {
        let p = Tensor::from_data(&[1, 2], vec![0.0, 1.0]);
        let t = Tensor::from_data(&[1, 2], vec![1.0, 0.0]);
        let (loss, grad) = Loss::Bce.compute(&p, &t).unwrap();
        assert!(loss.is_finite());
        assert!(grad.data().iter().all(|g| g.is_finite()));
    }

    #[test]
    fn test_bce_gradient_sign() {
        let p = Tensor::from_data(&[1, 2], vec![0.3, 0.8]);
        let t = Tensor::from_data(&[1, 2], vec![1.0, 0.0]);
        let (_, grad) = Loss::Bce.compute(&p, &t).unwrap();
        assert!(grad.data()[0] < 0.0);
        assert!(grad.data()[1] > 0.0);
    }

    #[test]
    fn test_shape_mismatch() {
        let p = Tensor::zeros(&[2, 1]);
        let t = Tensor::zeros(&[1, 2]);
        assert!(matches!(
            Loss::Mse.compute(&p, &t),
            Err(TrainingError::ShapeMismatch { .. })
        ));
    }
}
