use super::SchurComplementReducer;
use amge_sparse::{LinearOperator, PolynomialSmoother, SmootherConfig};
use eyre::eyre;
use log::trace;
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;

/// Relaxation of a full agglomerate system through its face operator.
///
/// One sweep computes the residual on the full operator, eliminates its interior part, applies
/// the polynomial smoother to the face system starting from zero, recovers the interior
/// correction by back-substitution and adds the correction to the iterate.
#[derive(Debug)]
pub struct SchurSmoother<'a> {
    reducer: &'a SchurComplementReducer,
    schur: CsrMatrix<f64>,
    full: CsrMatrix<f64>,
    smoother: PolynomialSmoother,
}

impl<'a> SchurSmoother<'a> {
    pub fn new(reducer: &'a SchurComplementReducer, config: &SmootherConfig) -> eyre::Result<Self> {
        let schur = reducer.assemble_schur_matrix();
        let full = reducer.assemble_full_matrix();
        let smoother = PolynomialSmoother::from_operator(&schur, schur.nrows(), config)
            .map_err(|err| eyre!("failed to set up face smoother: {}", err))?;
        Ok(Self {
            reducer,
            schur,
            full,
            smoother,
        })
    }

    pub fn polynomial(&self) -> &PolynomialSmoother {
        &self.smoother
    }

    /// The assembled operator over all true dofs.
    pub fn full_matrix(&self) -> &CsrMatrix<f64> {
        &self.full
    }

    /// One smoothing sweep for the all-true-dof system `A x = b`, updating `x` in place.
    pub fn smooth(&self, b: &DVector<f64>, x: &mut DVector<f64>) -> eyre::Result<()> {
        let reducer = self.reducer;
        let n = reducer.num_true_dofs();
        assert_eq!(b.len(), n, "right-hand side must cover all true dofs");
        assert_eq!(x.len(), n, "iterate must cover all true dofs");

        let mut residual = DVector::zeros(n);
        self.full
            .apply(residual.as_view_mut(), x.as_view())
            .map_err(|err| eyre!("failed to compute residual: {}", err))?;
        residual.zip_apply(b, |ax_i, b_i| *ax_i = b_i - *ax_i);

        let r_f = reducer.assemble_schur_rhs(&residual);
        let mut e_f = DVector::zeros(r_f.len());
        self.smoother
            .smooth(&self.schur, &r_f, &mut e_f)
            .map_err(|err| eyre!("face smoothing failed: {}", err))?;

        let mut correction = DVector::zeros(n);
        correction
            .rows_range_mut(reducer.face_range())
            .copy_from(&e_f);
        reducer.update_interior(&residual, &mut correction);
        trace!("Schur smoothing correction norm {:e}", correction.norm());
        *x += correction;
        Ok(())
    }
}
