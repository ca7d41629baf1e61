// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Linear programming backend for Formulang.
//!
//! Continuous LP with non-negative variables, `<= / >= / =` constraints,
//! primal and dual values. Solved with a dense two-phase simplex; when a
//! problem is infeasible, lower bounds are relaxed with penalized slack
//! variables so a best-effort blend and its violations can be reported.

mod problem;
mod simplex;
mod solution;

pub use problem::{Constraint, ConstraintOp, LpProblem, Objective};
pub use simplex::{Solver, SolverError};
pub use solution::{Analysis, ReducedCost, ShadowPrice, Solution, SolutionStatus, Violation};
