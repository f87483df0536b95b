//! Polynomial relaxation for symmetric positive (semi-)definite operators.
use crate::cg::LinearOperator;
use log::trace;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmootherConfig {
    /// Degree $\nu$ of the relaxation polynomial, i.e. the number of Richardson steps per sweep.
    pub degree: usize,
    /// Number of power iterations used to estimate the spectral radius.
    pub power_iterations: usize,
    /// Factor applied to the spectral radius estimate. Power iteration approaches the spectral
    /// radius from below, and the relaxation polynomial is only bounded by one up to the
    /// estimate.
    pub safety_factor: f64,
}

impl Default for SmootherConfig {
    fn default() -> Self {
        Self {
            degree: 3,
            power_iterations: 20,
            safety_factor: 1.1,
        }
    }
}

/// Estimates the spectral radius of a symmetric operator of dimension `n` by power iteration.
///
/// The start vector is deterministic, so repeated calls give identical estimates.
pub fn estimate_spectral_radius(
    operator: &dyn LinearOperator,
    n: usize,
    iterations: usize,
) -> Result<f64, Box<dyn Error>> {
    if n == 0 {
        return Ok(0.0);
    }
    // Slightly non-uniform so that it is unlikely to be orthogonal to the dominant eigenvector
    let mut v = DVector::from_fn(n, |i, _| 1.0 + (i as f64) / (n as f64));
    v /= v.norm();
    let mut w = DVector::zeros(n);
    for _ in 0..iterations.max(1) {
        operator.apply(w.as_view_mut(), v.as_view())?;
        let w_norm = w.norm();
        if w_norm == 0.0 {
            return Ok(0.0);
        }
        v.copy_from(&w);
        v /= w_norm;
    }
    // For unit v, ||Av|| >= |v^T A v|, so this is the sharper of the two lower bounds
    operator.apply(w.as_view_mut(), v.as_view())?;
    Ok(w.norm())
}

/// The polynomial smoother $x \leftarrow x + p(A)(b - Ax)$ with
/// $1 - t\,p(t) = \prod_{k=1}^{\nu} (1 - t / r_k)$ and
/// $r_k = \frac{\lambda}{2}\left(1 - \cos\frac{2 k \pi}{2 \nu + 1}\right)$.
///
/// The roots are spread over $(0, \lambda]$, so the error polynomial is small on the upper part
/// of the spectrum, which is what a multigrid smoother needs.
#[derive(Debug, Clone)]
pub struct PolynomialSmoother {
    roots: Vec<f64>,
}

impl PolynomialSmoother {
    pub fn new(degree: usize, spectral_radius: f64) -> Self {
        assert!(spectral_radius >= 0.0, "spectral radius must be non-negative");
        let nu = degree as f64;
        let roots = (1..=degree)
            .map(|k| 0.5 * spectral_radius * (1.0 - (2.0 * k as f64 * PI / (2.0 * nu + 1.0)).cos()))
            .collect();
        Self { roots }
    }

    /// Estimates the spectral radius of `operator` and builds the smoother from `config`.
    pub fn from_operator(
        operator: &dyn LinearOperator,
        n: usize,
        config: &SmootherConfig,
    ) -> Result<Self, Box<dyn Error>> {
        let lambda = config.safety_factor * estimate_spectral_radius(operator, n, config.power_iterations)?;
        trace!("Polynomial smoother of degree {} with spectral radius estimate {:e}", config.degree, lambda);
        Ok(Self::new(config.degree, lambda))
    }

    pub fn degree(&self) -> usize {
        self.roots.len()
    }

    pub fn roots(&self) -> &[f64] {
        &self.roots
    }

    /// One sweep of the smoother, updating `x` in place.
    pub fn smooth(
        &self,
        operator: &dyn LinearOperator,
        b: &DVector<f64>,
        x: &mut DVector<f64>,
    ) -> Result<(), Box<dyn Error>> {
        assert_eq!(b.len(), x.len(), "right-hand side and iterate must have the same length");
        let mut r = DVector::zeros(b.len());
        for &root in &self.roots {
            if root <= 0.0 {
                continue;
            }
            operator.apply(r.as_view_mut(), x.as_view())?;
            r.zip_apply(b, |ax_i, b_i| *ax_i = b_i - *ax_i);
            x.axpy(1.0 / root, &r, 1.0);
        }
        Ok(())
    }
}
