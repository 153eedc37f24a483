use crate::formulation::CanonicalLp;
use anyhow::{anyhow as anyhow_error, ensure, Result};
use tracing::trace;

/// Terminal state of one linear program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LpStatus {
    Optimal,
    Infeasible,
    Unbounded,
}

/// Result of solving one linear program.
#[derive(Debug, Clone)]
pub struct LpOutcome {
    pub status: LpStatus,
    /// Optimal variable values. Empty unless `status` is `Optimal`.
    pub x: Vec<f64>,
    /// Optimal objective value. Meaningful only when `status` is `Optimal`.
    pub objective: f64,
}

impl LpOutcome {
    fn failed(status: LpStatus) -> LpOutcome {
        LpOutcome {
            status,
            x: Vec::new(),
            objective: 0.0,
        }
    }
}

/// Bounded-variable primal simplex over a dense working tableau.
///
/// Solves `max c'x, Ax <= b, l <= x <= u`. Upper bounds are handled by
/// keeping nonbasic variables at either bound and flipping between them, so
/// the variable count never doubles. Entering and leaving choices follow
/// Bland's rule to rule out cycling on the degenerate ties that assignment
/// programs produce in bulk.
///
/// The solver holds no state across calls; `solve` is a pure function of its
/// arguments.
#[derive(Debug, Clone)]
pub struct SimplexSolver {
    max_iterations: u32,
    epsilon: f64,
}

impl Default for SimplexSolver {
    fn default() -> SimplexSolver {
        SimplexSolver {
            max_iterations: 100_000,
            epsilon: 1e-9,
        }
    }
}

enum Pivoting {
    Finished,
    Unbounded,
}

impl SimplexSolver {
    pub fn new() -> SimplexSolver {
        SimplexSolver::default()
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> SimplexSolver {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> SimplexSolver {
        self.epsilon = epsilon;
        self
    }

    /// Solves the program over the given variable bounds.
    ///
    /// Lower bounds must be finite; upper bounds may be infinite. A variable
    /// with `lower == upper` is fixed and never priced. Errors are reserved
    /// for misuse and numerical anomalies (crossing bounds, iteration cap);
    /// infeasibility and unboundedness are ordinary outcomes.
    pub fn solve(&self, lp: &CanonicalLp, lower: &[f64], upper: &[f64]) -> Result<LpOutcome> {
        ensure!(
            lower.len() == lp.num_vars() && upper.len() == lp.num_vars(),
            "bound vectors must cover every variable"
        );
        for var in 0..lp.num_vars() {
            ensure!(lower[var].is_finite(), "lower bound of {} is not finite", var);
            ensure!(
                lower[var] <= upper[var],
                "variable {} has crossing bounds [{}, {}]",
                var,
                lower[var],
                upper[var]
            );
        }

        let mut tableau = Tableau::new(lp, lower, upper, self.epsilon);
        if tableau.needs_phase_one() {
            tableau.install_artificials();
            tableau.set_phase_one_objective();
            match self.optimize(&mut tableau)? {
                Pivoting::Finished => {}
                Pivoting::Unbounded => {
                    return Err(anyhow_error!(
                        "phase one objective is bounded; an unbounded pivot is a numerical anomaly"
                    ))
                }
            }
            let residual = tableau.phase_one_residual();
            if residual > tableau.feasibility_epsilon() {
                trace!("phase one residual {:e}", residual);
                return Ok(LpOutcome::failed(LpStatus::Infeasible));
            }
            tableau.evict_artificials();
        }

        tableau.set_phase_two_objective(lp.objective());
        match self.optimize(&mut tableau)? {
            Pivoting::Finished => {}
            Pivoting::Unbounded => return Ok(LpOutcome::failed(LpStatus::Unbounded)),
        }

        let x = tableau.extract(lower);
        let objective = lp.objective().iter().zip(&x).map(|(c, v)| c * v).sum();
        Ok(LpOutcome {
            status: LpStatus::Optimal,
            x,
            objective,
        })
    }

    fn optimize(&self, tableau: &mut Tableau) -> Result<Pivoting> {
        for _ in 0..self.max_iterations {
            let entering = match tableau.entering_column() {
                Some(column) => column,
                None => return Ok(Pivoting::Finished),
            };
            match tableau.step(entering) {
                StepOutcome::Moved => {}
                StepOutcome::Unbounded => return Ok(Pivoting::Unbounded),
            }
        }
        Err(anyhow_error!(
            "simplex iteration limit of {} exceeded",
            self.max_iterations
        ))
    }
}

enum StepOutcome {
    Moved,
    Unbounded,
}

/// Slack below which two ratio-test steps count as tied.
const RATIO_TIE: f64 = 1e-12;

/// Dense working state: `rows` is `B^-1 A` over all columns (structural,
/// slack, artificial), `xb` the current basic variable values, `obj` the
/// current reduced costs. Variable bounds are shifted so every column lives
/// in `[0, width]`.
struct Tableau {
    rows: Vec<Vec<f64>>,
    obj: Vec<f64>,
    xb: Vec<f64>,
    basis: Vec<usize>,
    in_basis: Vec<bool>,
    at_upper: Vec<bool>,
    width: Vec<f64>,
    num_structural: usize,
    ncols: usize,
    /// First artificial column; columns past it never enter the basis.
    art_start: usize,
    eps: f64,
    feas_tol: f64,
}

impl Tableau {
    fn new(lp: &CanonicalLp, lower: &[f64], upper: &[f64], eps: f64) -> Tableau {
        let num_structural = lp.num_vars();
        let num_rows = lp.num_rows();
        let ncols = num_structural + num_rows;

        let mut rows = vec![vec![0.0; ncols]; num_rows];
        let mut xb = vec![0.0; num_rows];
        let mut rhs_scale: f64 = 0.0;
        for row in 0..num_rows {
            let (columns, coefficients) = lp.row(row);
            let mut shifted = lp.rhs()[row];
            for (column, coefficient) in columns.iter().zip(coefficients) {
                rows[row][*column] += *coefficient;
                shifted -= coefficient * lower[*column];
            }
            rows[row][num_structural + row] = 1.0;
            xb[row] = shifted;
            rhs_scale = rhs_scale.max(shifted.abs());
        }

        let mut width = Vec::with_capacity(ncols);
        for var in 0..num_structural {
            width.push(upper[var] - lower[var]);
        }
        width.resize(ncols, f64::INFINITY);

        Tableau {
            rows,
            obj: vec![0.0; ncols],
            xb,
            basis: (num_structural..ncols).collect(),
            in_basis: (0..ncols).map(|column| column >= num_structural).collect(),
            at_upper: vec![false; ncols],
            width,
            num_structural,
            ncols,
            art_start: ncols,
            eps,
            feas_tol: eps * (1.0 + rhs_scale),
        }
    }

    #[inline]
    fn feasibility_epsilon(&self) -> f64 {
        self.feas_tol * (self.rows.len() as f64 + 1.0)
    }

    fn needs_phase_one(&self) -> bool {
        self.xb.iter().any(|value| *value < -self.feas_tol)
    }

    /// Replaces the basic slack of every violated row with a fresh artificial
    /// variable, negating the row so the artificial starts non-negative.
    fn install_artificials(&mut self) {
        self.art_start = self.ncols;
        for row in 0..self.rows.len() {
            if self.xb[row] >= -self.feas_tol {
                continue;
            }
            for value in self.rows[row].iter_mut() {
                *value = -*value;
            }
            self.xb[row] = -self.xb[row];

            let column = self.ncols;
            for (other, coefficients) in self.rows.iter_mut().enumerate() {
                coefficients.push(if other == row { 1.0 } else { 0.0 });
            }
            self.width.push(f64::INFINITY);
            self.at_upper.push(false);
            self.in_basis.push(true);

            let out = self.basis[row];
            self.in_basis[out] = false;
            self.at_upper[out] = false;
            self.basis[row] = column;
            self.ncols += 1;
        }
    }

    /// Phase one maximizes minus the artificial sum; basic artificial rows are
    /// folded into the objective so reduced costs start consistent.
    fn set_phase_one_objective(&mut self) {
        self.obj = vec![0.0; self.ncols];
        for column in self.art_start..self.ncols {
            self.obj[column] = -1.0;
        }
        for row in 0..self.rows.len() {
            if self.basis[row] < self.art_start {
                continue;
            }
            for column in 0..self.ncols {
                self.obj[column] += self.rows[row][column];
            }
        }
    }

    /// Total infeasibility left after phase one.
    fn phase_one_residual(&self) -> f64 {
        (0..self.rows.len())
            .filter(|row| self.basis[*row] >= self.art_start)
            .map(|row| self.xb[row])
            .sum()
    }

    /// Pivots leftover basic artificials out on a degenerate step. A row
    /// offering no pivot is redundant and keeps its artificial parked at zero.
    fn evict_artificials(&mut self) {
        for row in 0..self.rows.len() {
            if self.basis[row] < self.art_start {
                continue;
            }
            let mut best: Option<(usize, f64)> = None;
            for column in 0..self.art_start {
                if self.in_basis[column] {
                    continue;
                }
                let magnitude = self.rows[row][column].abs();
                if magnitude > self.eps && best.map_or(true, |(_, m)| magnitude > m) {
                    best = Some((column, magnitude));
                }
            }
            if let Some((column, _)) = best {
                let out = self.basis[row];
                let value = if self.at_upper[column] {
                    self.width[column]
                } else {
                    0.0
                };
                self.pivot(row, column);
                self.in_basis[out] = false;
                self.at_upper[out] = false;
                self.basis[row] = column;
                self.in_basis[column] = true;
                self.at_upper[column] = false;
                self.xb[row] = value;
            }
        }
    }

    fn set_phase_two_objective(&mut self, objective: &[f64]) {
        self.obj = vec![0.0; self.ncols];
        self.obj[..objective.len()].copy_from_slice(objective);
        for row in 0..self.rows.len() {
            let factor = self.obj[self.basis[row]];
            if factor != 0.0 {
                for column in 0..self.ncols {
                    self.obj[column] -= factor * self.rows[row][column];
                }
            }
        }
    }

    /// Bland's rule: the lowest-index nonbasic column whose reduced cost
    /// improves the objective from the bound it currently sits at. Fixed
    /// variables (zero width) and artificials never enter.
    fn entering_column(&self) -> Option<usize> {
        for column in 0..self.ncols {
            if column >= self.art_start || self.in_basis[column] || self.width[column] <= 0.0 {
                continue;
            }
            let reduced = self.obj[column];
            if self.at_upper[column] {
                if reduced < -self.eps {
                    return Some(column);
                }
            } else if reduced > self.eps {
                return Some(column);
            }
        }
        None
    }

    /// Moves the entering column as far as its own opposite bound or the
    /// first basic variable to hit a bound allows, then flips or pivots.
    fn step(&mut self, entering: usize) -> StepOutcome {
        let from_upper = self.at_upper[entering];
        let direction = if from_upper { -1.0 } else { 1.0 };

        let mut limit = self.width[entering];
        let mut leaving: Option<(usize, bool)> = None;
        for row in 0..self.rows.len() {
            let rate = direction * self.rows[row][entering];
            let (step, hits_upper) = if rate > self.eps {
                // basic variable decreases towards zero
                (self.xb[row].max(0.0) / rate, false)
            } else if rate < -self.eps {
                // basic variable increases towards its own upper bound
                let cap = self.width[self.basis[row]];
                if !cap.is_finite() {
                    continue;
                }
                ((cap - self.xb[row]).max(0.0) / -rate, true)
            } else {
                continue;
            };
            let replace = match leaving {
                None => step <= limit,
                Some((previous, _)) => {
                    step < limit - RATIO_TIE
                        || (step < limit + RATIO_TIE && self.basis[row] < self.basis[previous])
                }
            };
            if replace {
                limit = step;
                leaving = Some((row, hits_upper));
            }
        }

        if !limit.is_finite() {
            return StepOutcome::Unbounded;
        }

        if limit > 0.0 {
            for row in 0..self.rows.len() {
                self.xb[row] -= limit * direction * self.rows[row][entering];
            }
        }

        match leaving {
            None => {
                // the entering variable just slides to its other bound
                trace!("flip {} step {}", entering, limit);
                self.at_upper[entering] = !from_upper;
            }
            Some((row, hits_upper)) => {
                let out = self.basis[row];
                trace!("pivot row {} in {} out {} step {}", row, entering, out, limit);
                let value = if from_upper {
                    self.width[entering] - limit
                } else {
                    limit
                };
                self.pivot(row, entering);
                self.in_basis[out] = false;
                self.at_upper[out] = hits_upper;
                self.basis[row] = entering;
                self.in_basis[entering] = true;
                self.at_upper[entering] = false;
                self.xb[row] = value;
            }
        }
        StepOutcome::Moved
    }

    /// Gauss-Jordan elimination on the tableau and the reduced-cost row.
    /// Basic values are maintained incrementally by `step`, not here.
    fn pivot(&mut self, row: usize, entering: usize) {
        let inverse = 1.0 / self.rows[row][entering];
        for value in self.rows[row].iter_mut() {
            *value *= inverse;
        }
        let pivot_row = std::mem::take(&mut self.rows[row]);
        for (other, coefficients) in self.rows.iter_mut().enumerate() {
            if other == row {
                continue;
            }
            let factor = coefficients[entering];
            if factor != 0.0 {
                for (value, pivot_value) in coefficients.iter_mut().zip(&pivot_row) {
                    *value -= factor * pivot_value;
                }
            }
        }
        let factor = self.obj[entering];
        if factor != 0.0 {
            for (value, pivot_value) in self.obj.iter_mut().zip(&pivot_row) {
                *value -= factor * pivot_value;
            }
        }
        self.rows[row] = pivot_row;
    }

    /// Reads the structural solution back out of the shifted coordinates.
    fn extract(&self, lower: &[f64]) -> Vec<f64> {
        let mut x = lower.to_vec();
        for var in 0..self.num_structural {
            if self.at_upper[var] && !self.in_basis[var] {
                x[var] = lower[var] + self.width[var];
            }
        }
        for row in 0..self.rows.len() {
            let var = self.basis[row];
            if var < self.num_structural {
                x[var] = lower[var] + self.xb[row];
            }
        }
        x
    }
}
