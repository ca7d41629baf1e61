//! Two-phase simplex with best-effort relaxation.
//!
//! Dense tableau implementation. Constraints are normalized to non-negative
//! right-hand sides; `<=` rows get a slack column, `>=` rows a surplus plus
//! an artificial column, `=` rows an artificial column. Phase 1 drives the
//! artificials to zero, phase 2 optimizes the real objective.
//!
//! Infeasible problems are retried with every `>=` row relaxed by a
//! penalized slack variable, so callers can report a best-effort solution
//! together with the violated lower bounds.

use crate::problem::{Constraint, ConstraintOp, LpProblem};
use crate::solution::{Analysis, ReducedCost, ShadowPrice, Solution, Violation};

/// Simplex solver.
pub struct Solver {
    max_iterations: usize,
    tolerance: f64,
}

/// Structural problems the solver refuses to run on.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SolverError {
    #[error("constraint `{constraint}` has {got} coefficients for {expected} variables")]
    DimensionMismatch {
        constraint: String,
        got: usize,
        expected: usize,
    },
    #[error("objective has {got} coefficients for {expected} variables")]
    ObjectiveMismatch { got: usize, expected: usize },
}

enum Phase2Outcome {
    Optimal,
    Unbounded,
}

impl Default for Solver {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
            tolerance: 1e-9,
        }
    }
}

impl Solver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Solve a problem.
    ///
    /// Infeasible problems fall back to the relaxation path and come back as
    /// [`SolutionStatus::Infeasible`](crate::SolutionStatus::Infeasible) with
    /// violations; `Err` is reserved for structurally malformed input.
    pub fn solve(&self, problem: &LpProblem) -> Result<Solution, SolverError> {
        self.check_shape(problem)?;
        match self.run(problem) {
            RunOutcome::Optimal(solution) => Ok(solution),
            RunOutcome::Unbounded => Ok(Solution::unbounded()),
            RunOutcome::Infeasible => Ok(self.solve_relaxed(problem)),
        }
    }

    fn check_shape(&self, problem: &LpProblem) -> Result<(), SolverError> {
        let n = problem.num_variables();
        if problem.objective.coefficients.len() != n {
            return Err(SolverError::ObjectiveMismatch {
                got: problem.objective.coefficients.len(),
                expected: n,
            });
        }
        for c in &problem.constraints {
            if c.coefficients.len() != n {
                return Err(SolverError::DimensionMismatch {
                    constraint: c.name.clone(),
                    got: c.coefficients.len(),
                    expected: n,
                });
            }
        }
        Ok(())
    }

    fn run(&self, problem: &LpProblem) -> RunOutcome {
        let mut tableau = Tableau::build(problem);

        if tableau.num_artificial > 0 && !self.phase1(&mut tableau) {
            return RunOutcome::Infeasible;
        }

        match self.phase2(&mut tableau) {
            Phase2Outcome::Optimal => RunOutcome::Optimal(self.extract(&tableau, problem)),
            Phase2Outcome::Unbounded => RunOutcome::Unbounded,
        }
    }

    /// Relax every `>=` row with a penalized slack variable and re-solve.
    ///
    /// The relaxed problem is always feasible whenever the `<=`/`=` skeleton
    /// is; non-zero slacks mark the violated lower bounds.
    fn solve_relaxed(&self, problem: &LpProblem) -> Solution {
        let n = problem.num_variables();
        let ge_rows: Vec<usize> = problem
            .constraints
            .iter()
            .enumerate()
            .filter(|(_, c)| c.op == ConstraintOp::Ge)
            .map(|(i, _)| i)
            .collect();
        if ge_rows.is_empty() {
            return Solution::infeasible();
        }

        let max_cost = problem
            .objective
            .coefficients
            .iter()
            .fold(0.0f64, |acc, c| acc.max(c.abs()));
        let penalty = 1e7 * (1.0 + max_cost);
        let penalty = if problem.objective.minimize {
            penalty
        } else {
            -penalty
        };

        let mut variables = problem.variables.clone();
        for &row in &ge_rows {
            variables.push(format!("__relax_{}", problem.constraints[row].name));
        }

        let mut relaxed = LpProblem::new(variables);
        let mut objective = problem.objective.coefficients.clone();
        objective.extend(std::iter::repeat(penalty).take(ge_rows.len()));
        relaxed.set_objective(objective, problem.objective.minimize);

        for (i, c) in problem.constraints.iter().enumerate() {
            let mut coefficients = c.coefficients.clone();
            coefficients.extend(ge_rows.iter().map(|&row| if row == i { 1.0 } else { 0.0 }));
            relaxed.add_constraint(c.name.clone(), coefficients, c.op, c.rhs);
        }

        match self.run(&relaxed) {
            RunOutcome::Optimal(solution) => {
                let values: Vec<f64> = solution.values[..n].to_vec();
                let objective_value: f64 = problem
                    .objective
                    .coefficients
                    .iter()
                    .zip(&values)
                    .map(|(c, x)| c * x)
                    .sum();

                let mut violations: Vec<Violation> = ge_rows
                    .iter()
                    .filter_map(|&row| {
                        let c = &problem.constraints[row];
                        let actual = problem.constraint_value(c, &values);
                        let gap = c.rhs - actual;
                        (gap > self.tolerance).then(|| Violation {
                            constraint: c.name.clone(),
                            required: c.rhs,
                            actual,
                            gap,
                        })
                    })
                    .collect();
                violations.sort_by(|a, b| {
                    b.gap
                        .partial_cmp(&a.gap)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });

                if violations.is_empty() {
                    // The original problem was feasible after all (numeric
                    // edge); report it as such.
                    return Solution::optimal(values, objective_value, solution.analysis);
                }
                Solution::infeasible_with_relaxed(values, objective_value, violations)
            }
            _ => Solution::infeasible(),
        }
    }

    /// Phase 1: minimize the artificial variables. Returns false when they
    /// cannot all be driven to zero (the problem is infeasible).
    fn phase1(&self, tableau: &mut Tableau) -> bool {
        let obj = tableau.num_rows - 1;
        let art_start = tableau.artificial_start();

        let saved_objective = tableau.rows[obj].clone();

        for cell in tableau.rows[obj].iter_mut() {
            *cell = 0.0;
        }
        for col in art_start..art_start + tableau.num_artificial {
            tableau.rows[obj][col] = -1.0;
        }
        // Make the phase-1 objective consistent with the basic artificials.
        for row in 0..obj {
            if tableau.basis[row] >= art_start {
                for col in 0..tableau.num_cols {
                    tableau.rows[obj][col] = tableau.rows[obj][col] + tableau.rows[row][col];
                }
            }
        }

        for _ in 0..self.max_iterations {
            let Some(col) = tableau.entering_column(self.tolerance, tableau.num_cols - 1) else {
                break;
            };
            let Some(row) = tableau.leaving_row(col, self.tolerance) else {
                return false;
            };
            tableau.pivot(row, col);
        }

        // All artificials must be zero now.
        let rhs = tableau.num_cols - 1;
        for row in 0..obj {
            if tableau.basis[row] >= art_start && tableau.rows[row][rhs].abs() > self.tolerance {
                return false;
            }
        }

        // Restore the real objective and price out the basic columns.
        tableau.rows[obj] = saved_objective;
        for row in 0..obj {
            let basic = tableau.basis[row];
            let factor = tableau.rows[obj][basic];
            if factor.abs() > self.tolerance {
                for col in 0..tableau.num_cols {
                    tableau.rows[obj][col] -= factor * tableau.rows[row][col];
                }
            }
        }

        true
    }

    /// Phase 2: optimize the real objective, never pivoting on artificials.
    fn phase2(&self, tableau: &mut Tableau) -> Phase2Outcome {
        let limit = tableau.artificial_start();
        for _ in 0..self.max_iterations {
            let Some(col) = tableau.entering_column(self.tolerance, limit) else {
                return Phase2Outcome::Optimal;
            };
            let Some(row) = tableau.leaving_row(col, self.tolerance) else {
                return Phase2Outcome::Unbounded;
            };
            tableau.pivot(row, col);
        }
        Phase2Outcome::Optimal
    }

    fn extract(&self, tableau: &Tableau, problem: &LpProblem) -> Solution {
        let n = problem.num_variables();
        let rhs = tableau.num_cols - 1;
        let obj = tableau.num_rows - 1;

        let mut values = vec![0.0; n];
        for (row, &basic) in tableau.basis.iter().enumerate() {
            if basic < n {
                values[basic] = tableau.rows[row][rhs];
            }
        }

        let objective_value: f64 = problem
            .objective
            .coefficients
            .iter()
            .zip(&values)
            .map(|(c, x)| c * x)
            .sum();

        // Duals come from the objective row at each constraint's companion
        // column (slack, surplus, or artificial).
        let mut shadow_prices = Vec::with_capacity(problem.num_constraints());
        for (i, constraint) in problem.constraints.iter().enumerate() {
            let value = match tableau.dual_cols[i] {
                DualCol::Slack(col) => -tableau.rows[obj][col],
                DualCol::Surplus(col) => tableau.rows[obj][col],
                DualCol::Artificial(col) => -tableau.rows[obj][col],
            } * tableau.row_sign[i];
            shadow_prices.push(ShadowPrice {
                constraint: constraint.name.clone(),
                value,
            });
        }

        let mut reduced_costs = Vec::with_capacity(n);
        for (j, variable) in problem.variables.iter().enumerate() {
            let is_basic = tableau.basis.contains(&j);
            let entry = if is_basic { 0.0 } else { tableau.rows[obj][j] };
            let reduced_cost = if problem.objective.minimize {
                -entry
            } else {
                entry
            };
            reduced_costs.push(ReducedCost {
                variable: variable.clone(),
                value: values[j],
                reduced_cost,
                is_basic,
            });
        }

        let binding_constraints = shadow_prices
            .iter()
            .filter(|sp| sp.value.abs() > self.tolerance)
            .map(|sp| sp.constraint.clone())
            .collect();

        Solution::optimal(
            values,
            objective_value,
            Analysis {
                shadow_prices,
                reduced_costs,
                binding_constraints,
            },
        )
    }
}

enum RunOutcome {
    Optimal(Solution),
    Unbounded,
    Infeasible,
}

/// Which column carries a constraint's dual value.
#[derive(Debug, Clone, Copy)]
enum DualCol {
    Slack(usize),
    Surplus(usize),
    Artificial(usize),
}

/// Dense simplex tableau: constraint rows plus one objective row.
struct Tableau {
    rows: Vec<Vec<f64>>,
    /// Basic variable (column) per constraint row
    basis: Vec<usize>,
    num_rows: usize,
    num_cols: usize,
    num_vars: usize,
    num_slack: usize,
    num_artificial: usize,
    dual_cols: Vec<DualCol>,
    /// -1 for rows that were negated to make the RHS non-negative
    row_sign: Vec<f64>,
}

impl Tableau {
    fn build(problem: &LpProblem) -> Self {
        let n = problem.num_variables();
        let m = problem.num_constraints();

        // Normalize to non-negative RHS; flipping swaps the operator.
        let normalized: Vec<(Vec<f64>, ConstraintOp, f64, f64)> = problem
            .constraints
            .iter()
            .map(|c| normalize(c))
            .collect();

        let mut num_slack = 0;
        let mut num_artificial = 0;
        for (_, op, _, _) in &normalized {
            match op {
                ConstraintOp::Le => num_slack += 1,
                ConstraintOp::Ge => {
                    num_slack += 1;
                    num_artificial += 1;
                }
                ConstraintOp::Eq => num_artificial += 1,
            }
        }

        let num_cols = n + num_slack + num_artificial + 1;
        let num_rows = m + 1;
        let mut rows = vec![vec![0.0; num_cols]; num_rows];
        let mut basis = vec![0; m];
        let mut dual_cols = Vec::with_capacity(m);
        let mut row_sign = Vec::with_capacity(m);

        let mut slack_col = n;
        let mut artificial_col = n + num_slack;

        for (i, (coefficients, op, rhs, sign)) in normalized.iter().enumerate() {
            rows[i][..n].copy_from_slice(coefficients);
            rows[i][num_cols - 1] = *rhs;
            row_sign.push(*sign);

            match op {
                ConstraintOp::Le => {
                    rows[i][slack_col] = 1.0;
                    basis[i] = slack_col;
                    dual_cols.push(DualCol::Slack(slack_col));
                    slack_col += 1;
                }
                ConstraintOp::Ge => {
                    rows[i][slack_col] = -1.0;
                    rows[i][artificial_col] = 1.0;
                    basis[i] = artificial_col;
                    dual_cols.push(DualCol::Surplus(slack_col));
                    slack_col += 1;
                    artificial_col += 1;
                }
                ConstraintOp::Eq => {
                    rows[i][artificial_col] = 1.0;
                    basis[i] = artificial_col;
                    dual_cols.push(DualCol::Artificial(artificial_col));
                    artificial_col += 1;
                }
            }
        }

        // The tableau maximizes; negate for minimization.
        for (j, &c) in problem.objective.coefficients.iter().enumerate() {
            rows[m][j] = if problem.objective.minimize { -c } else { c };
        }

        Self {
            rows,
            basis,
            num_rows,
            num_cols,
            num_vars: n,
            num_slack,
            num_artificial,
            dual_cols,
            row_sign,
        }
    }

    fn artificial_start(&self) -> usize {
        self.num_vars + self.num_slack
    }

    /// Most positive reduced cost among columns `0..limit`.
    fn entering_column(&self, tolerance: f64, limit: usize) -> Option<usize> {
        let obj = self.num_rows - 1;
        let mut best = tolerance;
        let mut best_col = None;
        for col in 0..limit {
            if self.rows[obj][col] > best {
                best = self.rows[obj][col];
                best_col = Some(col);
            }
        }
        best_col
    }

    /// Minimum-ratio row for an entering column.
    fn leaving_row(&self, col: usize, tolerance: f64) -> Option<usize> {
        let rhs = self.num_cols - 1;
        let mut best_ratio = f64::INFINITY;
        let mut best_row = None;
        for row in 0..self.num_rows - 1 {
            let cell = self.rows[row][col];
            if cell > tolerance {
                let ratio = self.rows[row][rhs] / cell;
                if ratio >= 0.0 && ratio < best_ratio {
                    best_ratio = ratio;
                    best_row = Some(row);
                }
            }
        }
        best_row
    }

    fn pivot(&mut self, pivot_row: usize, pivot_col: usize) {
        self.basis[pivot_row] = pivot_col;

        let pivot_value = self.rows[pivot_row][pivot_col];
        for cell in self.rows[pivot_row].iter_mut() {
            *cell /= pivot_value;
        }

        for row in 0..self.num_rows {
            if row == pivot_row {
                continue;
            }
            let factor = self.rows[row][pivot_col];
            if factor == 0.0 {
                continue;
            }
            for col in 0..self.num_cols {
                self.rows[row][col] -= factor * self.rows[pivot_row][col];
            }
        }
    }
}

/// Flip a constraint with a negative RHS so the tableau sees `rhs >= 0`.
fn normalize(c: &Constraint) -> (Vec<f64>, ConstraintOp, f64, f64) {
    if c.rhs >= 0.0 {
        return (c.coefficients.clone(), c.op, c.rhs, 1.0);
    }
    let flipped_op = match c.op {
        ConstraintOp::Le => ConstraintOp::Ge,
        ConstraintOp::Ge => ConstraintOp::Le,
        ConstraintOp::Eq => ConstraintOp::Eq,
    };
    (
        c.coefficients.iter().map(|x| -x).collect(),
        flipped_op,
        -c.rhs,
        -1.0,
    )
}
