//! LP problem model.

/// A linear program over non-negative variables.
#[derive(Debug, Clone, PartialEq)]
pub struct LpProblem {
    /// Variable names, defining column order
    pub variables: Vec<String>,
    pub objective: Objective,
    pub constraints: Vec<Constraint>,
}

/// Objective function.
#[derive(Debug, Clone, PartialEq)]
pub struct Objective {
    /// One coefficient per variable
    pub coefficients: Vec<f64>,
    /// Minimize when true, maximize otherwise
    pub minimize: bool,
}

/// One linear constraint row.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    /// Label used in reports and diagnostics
    pub name: String,
    /// One coefficient per variable
    pub coefficients: Vec<f64>,
    pub op: ConstraintOp,
    pub rhs: f64,
}

/// Constraint comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintOp {
    /// `<=`
    Le,
    /// `>=`
    Ge,
    /// `=`
    Eq,
}

impl LpProblem {
    /// Create a problem with a zero minimization objective.
    pub fn new(variables: Vec<String>) -> Self {
        let n = variables.len();
        Self {
            variables,
            objective: Objective {
                coefficients: vec![0.0; n],
                minimize: true,
            },
            constraints: Vec::new(),
        }
    }

    pub fn set_objective(&mut self, coefficients: Vec<f64>, minimize: bool) {
        self.objective = Objective {
            coefficients,
            minimize,
        };
    }

    pub fn add_constraint(
        &mut self,
        name: impl Into<String>,
        coefficients: Vec<f64>,
        op: ConstraintOp,
        rhs: f64,
    ) {
        self.constraints.push(Constraint {
            name: name.into(),
            coefficients,
            op,
            rhs,
        });
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// Evaluate a constraint's left-hand side at a point.
    pub fn constraint_value(&self, constraint: &Constraint, point: &[f64]) -> f64 {
        constraint
            .coefficients
            .iter()
            .zip(point)
            .map(|(c, x)| c * x)
            .sum()
    }
}
