use super::SchurComplementReducer;
use amge_sparse::{ConjugateGradient, RelativeResidualCriterion};
use eyre::eyre;
use log::debug;
use nalgebra::{DMatrix, DVector, Dyn, LU};
use nalgebra_sparse::CsrMatrix;
use serde::{Deserialize, Serialize};

/// How the assembled face system is solved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FaceSolver {
    /// Dense LU factorization of the face operator.
    Direct,
    ConjugateGradient { tolerance: f64, max_iter: usize },
}

impl Default for FaceSolver {
    fn default() -> Self {
        Self::Direct
    }
}

/// Solves a full agglomerate system by eliminating interior dofs, solving the face system and
/// recovering the interior dofs by back-substitution.
#[derive(Debug)]
pub struct SchurSolver<'a> {
    reducer: &'a SchurComplementReducer,
    schur: CsrMatrix<f64>,
    solver: FaceSolver,
    factorization: Option<LU<f64, Dyn, Dyn>>,
}

impl<'a> SchurSolver<'a> {
    /// Assembles the face operator and, for the direct solver, factors it.
    pub fn new(reducer: &'a SchurComplementReducer, solver: FaceSolver) -> eyre::Result<Self> {
        let schur = reducer.assemble_schur_matrix();
        let factorization = match solver {
            FaceSolver::Direct => {
                let lu = DMatrix::from(&schur).lu();
                if !lu.is_invertible() {
                    return Err(eyre!("face operator is singular"));
                }
                Some(lu)
            }
            FaceSolver::ConjugateGradient { .. } => None,
        };
        debug!(
            "Schur solver: {} face dofs, {} nonzeros, {:?}",
            schur.nrows(),
            schur.nnz(),
            solver
        );
        Ok(Self {
            reducer,
            schur,
            solver,
            factorization,
        })
    }

    pub fn schur_matrix(&self) -> &CsrMatrix<f64> {
        &self.schur
    }

    /// Solves the face system $S x_f = r_f$.
    pub fn solve_face(&self, r_f: &DVector<f64>) -> eyre::Result<DVector<f64>> {
        match (self.solver, &self.factorization) {
            (FaceSolver::Direct, Some(lu)) => lu
                .solve(r_f)
                .ok_or_else(|| eyre!("face operator is singular")),
            (FaceSolver::ConjugateGradient { tolerance, max_iter }, _) => {
                let mut x_f = DVector::zeros(r_f.len());
                let output = ConjugateGradient::new(&self.schur)
                    .with_stopping_criterion(RelativeResidualCriterion::new(tolerance))
                    .with_max_iter(max_iter)
                    .solve_with_guess(r_f, &mut x_f)
                    .map_err(|err| eyre!("face solve failed: {}", err))?;
                debug!("Face system solved in {} CG iterations", output.num_iterations);
                Ok(x_f)
            }
            (FaceSolver::Direct, None) => Err(eyre!("direct face solver was not factored")),
        }
    }

    /// Solves the full system for an all-true-dof right-hand side.
    pub fn solve(&self, b: &DVector<f64>) -> eyre::Result<DVector<f64>> {
        let reducer = self.reducer;
        let r_f = reducer.assemble_schur_rhs(b);
        let x_f = self.solve_face(&r_f)?;
        let mut x = DVector::zeros(reducer.num_true_dofs());
        x.rows_range_mut(reducer.face_range()).copy_from(&x_f);
        reducer.update_interior(b, &mut x);
        Ok(x)
    }
}
