use core::fmt;
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};
use nalgebra_sparse::ops::serial::spmm_csr_dense;
use nalgebra_sparse::ops::Op;
use nalgebra_sparse::CsrMatrix;
use std::error::Error;

/// An operator $y = A x$ acting on dynamically sized vectors.
pub trait LinearOperator {
    fn apply(&self, y: DVectorViewMut<f64>, x: DVectorView<f64>) -> Result<(), Box<dyn Error>>;

    /// Number of rows of the operator, if known.
    fn dim(&self) -> Option<usize> {
        None
    }
}

impl<'a, A> LinearOperator for &'a A
where
    A: ?Sized + LinearOperator,
{
    fn apply(&self, y: DVectorViewMut<f64>, x: DVectorView<f64>) -> Result<(), Box<dyn Error>> {
        <A as LinearOperator>::apply(self, y, x)
    }

    fn dim(&self) -> Option<usize> {
        <A as LinearOperator>::dim(self)
    }
}

impl LinearOperator for DMatrix<f64> {
    fn apply(&self, mut y: DVectorViewMut<f64>, x: DVectorView<f64>) -> Result<(), Box<dyn Error>> {
        if self.ncols() != x.len() || self.nrows() != y.len() {
            return Err(format!(
                "dimension mismatch: {}x{} matrix, x of length {}, y of length {}",
                self.nrows(),
                self.ncols(),
                x.len(),
                y.len()
            )
            .into());
        }
        y.gemv(1.0, self, &x, 0.0);
        Ok(())
    }

    fn dim(&self) -> Option<usize> {
        Some(self.nrows())
    }
}

impl LinearOperator for CsrMatrix<f64> {
    fn apply(&self, mut y: DVectorViewMut<f64>, x: DVectorView<f64>) -> Result<(), Box<dyn Error>> {
        if self.ncols() != x.len() || self.nrows() != y.len() {
            return Err(format!(
                "dimension mismatch: {}x{} CSR matrix, x of length {}, y of length {}",
                self.nrows(),
                self.ncols(),
                x.len(),
                y.len()
            )
            .into());
        }
        spmm_csr_dense(0.0, &mut y, 1.0, Op::NoOp(self), Op::NoOp(&x));
        Ok(())
    }

    fn dim(&self) -> Option<usize> {
        Some(self.nrows())
    }
}

pub struct IdentityOperator;

impl LinearOperator for IdentityOperator {
    fn apply(&self, mut y: DVectorViewMut<f64>, x: DVectorView<f64>) -> Result<(), Box<dyn Error>> {
        y.copy_from(&x);
        Ok(())
    }
}

/// Relative residual tolerance ||r|| <= tol * ||b||.
///
/// Note that we use the *approximate* residual given by Conjugate-Gradient. For ill-conditioned
/// problems, it is possible that CG's residual converges, but the real residual does not.
#[derive(Debug, Clone, Copy)]
pub struct RelativeResidualCriterion {
    tol: f64,
}

impl RelativeResidualCriterion {
    pub fn new(tol: f64) -> Self {
        Self { tol }
    }

    fn has_converged(&self, b_norm: f64, approx_residual: &DVector<f64>) -> bool {
        approx_residual.norm() <= self.tol * b_norm
    }
}

impl Default for RelativeResidualCriterion {
    fn default() -> Self {
        Self::new(1e-8)
    }
}

#[derive(Debug, Clone)]
#[allow(non_snake_case)]
struct CgWorkspace {
    r: DVector<f64>,
    z: DVector<f64>,
    p: DVector<f64>,
    Ap: DVector<f64>,
}

impl Default for CgWorkspace {
    fn default() -> Self {
        Self {
            r: DVector::zeros(0),
            z: DVector::zeros(0),
            p: DVector::zeros(0),
            Ap: DVector::zeros(0),
        }
    }
}

impl CgWorkspace {
    fn resize(&mut self, dim: usize) {
        self.r.resize_vertically_mut(dim, 0.0);
        self.z.resize_vertically_mut(dim, 0.0);
        self.p.resize_vertically_mut(dim, 0.0);
        self.Ap.resize_vertically_mut(dim, 0.0);
    }
}

/// Preconditioned conjugate gradient for symmetric positive definite operators.
///
/// The face operators produced by Schur elimination of SPD agglomerate systems are SPD, so
/// this is the iterative counterpart of the dense direct face solve.
#[derive(Debug)]
pub struct ConjugateGradient<A, P> {
    workspace: CgWorkspace,
    operator: A,
    preconditioner: P,
    stopping_criterion: RelativeResidualCriterion,
    max_iter: Option<usize>,
}

impl<A> ConjugateGradient<A, IdentityOperator> {
    pub fn new(operator: A) -> Self {
        Self {
            workspace: CgWorkspace::default(),
            operator,
            preconditioner: IdentityOperator,
            stopping_criterion: RelativeResidualCriterion::default(),
            max_iter: None,
        }
    }
}

impl<A, P> ConjugateGradient<A, P> {
    pub fn with_preconditioner<P2>(self, preconditioner: P2) -> ConjugateGradient<A, P2> {
        ConjugateGradient {
            workspace: self.workspace,
            operator: self.operator,
            preconditioner,
            stopping_criterion: self.stopping_criterion,
            max_iter: self.max_iter,
        }
    }

    pub fn with_stopping_criterion(self, stopping_criterion: RelativeResidualCriterion) -> Self {
        Self {
            stopping_criterion,
            ..self
        }
    }

    pub fn with_max_iter(self, max_iter: usize) -> Self {
        Self {
            max_iter: Some(max_iter),
            ..self
        }
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum SolveErrorKind {
    OperatorError(Box<dyn Error>),
    PreconditionerError(Box<dyn Error>),
    IndefiniteOperator,
    IndefinitePreconditioner,
    MaxIterationsReached { max_iter: usize },
}

impl fmt::Display for SolveErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OperatorError(err) => {
                write!(f, "Error applying operator: ")?;
                err.fmt(f)
            }
            Self::PreconditionerError(err) => {
                write!(f, "Error applying preconditioner: ")?;
                err.fmt(f)
            }
            Self::IndefiniteOperator => write!(f, "Operator appears to be indefinite"),
            Self::IndefinitePreconditioner => write!(f, "Indefinite preconditioner"),
            Self::MaxIterationsReached { max_iter } => {
                write!(f, "Max iterations ({}) reached.", max_iter)
            }
        }
    }
}

#[non_exhaustive]
#[derive(Debug)]
pub struct SolveError {
    pub output: CgOutput,
    pub kind: SolveErrorKind,
}

impl SolveError {
    fn new(output: CgOutput, kind: SolveErrorKind) -> Self {
        Self { output, kind }
    }
}

impl fmt::Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CG solve failed after {} iterations. ", self.output.num_iterations)?;
        write!(f, "Error: {}", self.kind)
    }
}

impl std::error::Error for SolveError {}

#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct CgOutput {
    /// Number of updates made to the (initial) solution vector.
    pub num_iterations: usize,
}

impl<A, P> ConjugateGradient<A, P>
where
    A: LinearOperator,
    P: LinearOperator,
{
    #[allow(non_snake_case)]
    pub fn solve_with_guess(
        &mut self,
        b: &DVector<f64>,
        x: &mut DVector<f64>,
    ) -> Result<CgOutput, SolveError> {
        use SolveErrorKind::*;
        assert_eq!(b.len(), x.len(), "right-hand side and solution must have the same length");

        let mut output = CgOutput { num_iterations: 0 };
        let ws = &mut self.workspace;
        ws.resize(x.len());
        let CgWorkspace { r, z, p, Ap } = ws;

        // r = b - Ax
        if let Err(err) = self.operator.apply(r.as_view_mut(), x.as_view()) {
            return Err(SolveError::new(output, OperatorError(err)));
        }
        r.zip_apply(b, |Ax_i, b_i| *Ax_i = b_i - *Ax_i);

        let b_norm = b.norm();
        if b_norm == 0.0 {
            x.fill(0.0);
            return Ok(output);
        }

        // z = Pr
        if let Err(err) = self.preconditioner.apply(z.as_view_mut(), r.as_view()) {
            return Err(SolveError::new(output, PreconditionerError(err)));
        }
        p.copy_from(z);
        let mut zTr = z.dot(r);

        loop {
            if self.stopping_criterion.has_converged(b_norm, r) {
                break;
            } else if let Some(max_iter) = self.max_iter {
                if output.num_iterations >= max_iter {
                    return Err(SolveError::new(output, MaxIterationsReached { max_iter }));
                }
            }

            // Ap = A * p
            if let Err(err) = self.operator.apply(Ap.as_view_mut(), p.as_view()) {
                return Err(SolveError::new(output, OperatorError(err)));
            }
            let pAp = p.dot(Ap);

            if pAp <= 0.0 {
                return Err(SolveError::new(output, IndefiniteOperator));
            }
            if zTr <= 0.0 {
                return Err(SolveError::new(output, IndefinitePreconditioner));
            }

            let alpha = zTr / pAp;
            x.axpy(alpha, p, 1.0);
            r.axpy(-alpha, Ap, 1.0);
            output.num_iterations += 1;

            if let Err(err) = self.preconditioner.apply(z.as_view_mut(), r.as_view()) {
                return Err(SolveError::new(output, PreconditionerError(err)));
            }
            let zTr_next = z.dot(r);
            let beta = zTr_next / zTr;

            // p <- z + beta * p
            p.zip_apply(z, |p_i, z_i| *p_i = z_i + beta * *p_i);

            zTr = zTr_next;
        }

        Ok(output)
    }
}
