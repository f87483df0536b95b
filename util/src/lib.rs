use nalgebra::{DMatrix, DVector};

/// Poor man's approx assertion for matrices
#[macro_export]
macro_rules! assert_approx_matrix_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let diff = $x - $y;

        let max_absdiff = diff.abs().max();
        let approx_eq = max_absdiff <= $tol;

        if !approx_eq {
            println!("abstol: {:e}", $tol);
            println!("left: {}", $x);
            println!("right: {}", $y);
            println!("diff: {:e}", diff);
        }
        assert!(approx_eq);
    }};
}

#[macro_export]
macro_rules! assert_panics {
    ($e:expr) => {{
        use std::panic::catch_unwind;
        use std::stringify;
        let expr_string = stringify!($e);
        let result = catch_unwind(|| $e);
        if result.is_ok() {
            panic!("assert_panics!({}) failed.", expr_string);
        }
    }};
}

/// Largest entry of $|Q^T Q - I|$.
pub fn orthonormality_error(q: &DMatrix<f64>) -> f64 {
    let gram = q.transpose() * q;
    let identity = DMatrix::identity(gram.nrows(), gram.ncols());
    (gram - identity).abs().max()
}

/// Returns the index of the entry of largest magnitude, or `None` for an empty vector.
pub fn argmax_abs(v: &DVector<f64>) -> Option<usize> {
    v.iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, &x)| match best {
            Some((_, b)) if b >= x.abs() => best,
            _ => Some((i, x.abs())),
        })
        .map(|(i, _)| i)
}

/// A deterministic symmetric positive definite test matrix.
///
/// The off-diagonal entries are bounded, the diagonal dominates, and `shift` makes it
/// possible to produce different matrices of the same size.
pub fn spd_test_matrix(n: usize, shift: f64) -> DMatrix<f64> {
    let mut a = DMatrix::from_fn(n, n, |i, j| {
        let (i, j) = (i as f64, j as f64);
        ((i + 1.0) * (j + 1.0) + shift).sin() * ((i + j + shift).cos())
    });
    a = &a + a.transpose();
    for i in 0..n {
        a[(i, i)] = 2.0 * n as f64 + 1.0 + shift.abs();
    }
    a
}

pub fn prefix_sum(counts: impl IntoIterator<Item = usize>, x0: usize) -> impl Iterator<Item = usize> {
    counts.into_iter().scan(x0, |sum, x| {
        let current = *sum;
        *sum += x;
        Some(current)
    })
}
