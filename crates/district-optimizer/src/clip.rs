//! Global gradient-norm clipping.

/// Rescales every gradient buffer so their joint L2 norm is at most
/// `max_norm`.
///
/// The scale factor is `max_norm / (total_norm + 1e-6)`, applied only when
/// it is below 1. Returns the norm measured before clipping.
///
/// # Example
///
/// ```
/// use district_optimizer::clip_grad_norm;
///
/// let mut a = vec![3.0];
/// let mut b = vec![4.0];
/// let norm = clip_grad_norm(&mut [a.as_mut_slice(), b.as_mut_slice()], 1.0);
/// assert!((norm - 5.0).abs() < 1e-6);
/// assert!((a[0] - 0.6).abs() < 1e-4);
/// ```
pub fn clip_grad_norm(grads: &mut [&mut [f32]], max_norm: f32) -> f32 {
    let total_norm = grads
        .iter()
        .flat_map(|g| g.iter())
        .map(|x| x * x)
        .sum::<f32>()
        .sqrt();
    let coef = max_norm / (total_norm + 1e-6);
    if coef < 1.0 {
        for g in grads.iter_mut() {
            for x in g.iter_mut() {
                *x *= coef;
            }
        }
    }
    total_norm
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_gradients_untouched() {
        let mut a = vec![0.1, 0.2];
        let norm = clip_grad_norm(&mut [a.as_mut_slice()], 1.0);
        assert!(norm < 1.0);
        assert_eq!(a, vec![0.1, 0.2]);
    }

    #[test]
    fn test_large_gradients_scaled_jointly() {
        let mut a = vec![30.0, 0.0];
        let mut b = vec![0.0, 40.0];
        clip_grad_norm(&mut [a.as_mut_slice(), b.as_mut_slice()], 1.0);
        let after: f32 = a.iter().chain(b.iter()).map(|x| x * x).sum::<f32>().sqrt();
        assert!((after - 1.0).abs() < 1e-4);
        assert!((a[0] / b[1] - 0.75).abs() < 1e-6);
    }
}
