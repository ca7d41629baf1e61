//! Solver adapter and report construction.
//!
//! Classifies the solver outcome and derives the per-ingredient and
//! per-nutrient report lines. All types serialize for the host.

use serde::Serialize;

use formulang_solver::{Solution, SolutionStatus};

use crate::lower::LoweredFormula;

/// Amounts smaller than this are noise and are left out of the report.
const AMOUNT_EPSILON: f64 = 1e-3;

/// Outcome classification of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SolveStatus {
    Optimal,
    /// No feasible blend; the report holds the best-effort blend and its
    /// violations
    Infeasible,
    Error,
}

/// The result of solving one formula.
#[derive(Debug, Clone, Serialize)]
pub struct SolveReport {
    pub status: SolveStatus,
    /// Declared formula identifier
    pub formula: String,
    /// Display name property, when declared
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub batch_size: f64,
    pub total_cost: f64,
    pub ingredients: Vec<IngredientLine>,
    pub nutrients: Vec<NutrientLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisReport>,
    pub violations: Vec<ViolationReport>,
    /// Backend failure message when `status == Error`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngredientLine {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Amount in batch units
    pub amount: f64,
    /// Share of the batch, in percent
    pub percentage: f64,
    pub unit_cost: f64,
    pub cost: f64,
    pub cost_percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NutrientLine {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Realized concentration, percent of batch
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub binding_constraints: Vec<String>,
    pub shadow_prices: Vec<ShadowPriceLine>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShadowPriceLine {
    pub constraint: String,
    pub value: f64,
    pub interpretation: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ViolationReport {
    pub constraint: String,
    pub required: f64,
    pub actual: f64,
    pub gap: f64,
    pub description: String,
}

impl SolveReport {
    /// A report for a formula that never reached the solver.
    pub fn failed(formula: &str, message: impl Into<String>) -> Self {
        Self {
            status: SolveStatus::Error,
            formula: formula.to_string(),
            formula_name: None,
            formula_code: None,
            description: None,
            batch_size: 0.0,
            total_cost: 0.0,
            ingredients: Vec::new(),
            nutrients: Vec::new(),
            analysis: None,
            violations: Vec::new(),
            error: Some(message.into()),
        }
    }
}

/// Derive the report from a solver outcome.
pub fn build_report(lowered: &LoweredFormula, solution: &Solution) -> SolveReport {
    let status = match solution.status {
        SolutionStatus::Optimal => SolveStatus::Optimal,
        SolutionStatus::Infeasible => SolveStatus::Infeasible,
        SolutionStatus::Unbounded => {
            return SolveReport {
                error: Some("the linear program is unbounded".to_string()),
                ..SolveReport::failed(&lowered.name, "")
            };
        }
    };

    let total_cost = if solution.objective_value.is_finite() {
        solution.objective_value
    } else {
        0.0
    };

    let mut ingredients = Vec::new();
    for (index, column) in lowered.ingredients.iter().enumerate() {
        let amount = solution.values.get(index).copied().unwrap_or(0.0);
        if amount <= AMOUNT_EPSILON {
            continue;
        }
        let cost = amount * column.cost;
        ingredients.push(IngredientLine {
            id: column.id.clone(),
            name: column.display_name.clone(),
            code: column.code.clone(),
            amount,
            percentage: amount / lowered.batch_size * 100.0,
            unit_cost: column.cost,
            cost,
            cost_percentage: if total_cost > 0.0 {
                cost / total_cost * 100.0
            } else {
                0.0
            },
        });
    }

    let mut nutrients: Vec<NutrientLine> = lowered
        .nutrients
        .iter()
        .map(|nutrient| {
            let mut total = 0.0;
            for (index, column) in lowered.ingredients.iter().enumerate() {
                let amount = solution.values.get(index).copied().unwrap_or(0.0);
                if amount > AMOUNT_EPSILON {
                    if let Some(level) = column.contents.get(&nutrient.decl) {
                        total += level * amount;
                    }
                }
            }
            NutrientLine {
                id: nutrient.id.clone(),
                name: nutrient.display_name.clone(),
                code: nutrient.code.clone(),
                // Content levels are percent, so this is percent of batch.
                value: total / lowered.batch_size,
                unit: nutrient.unit.clone(),
            }
        })
        .collect();
    nutrients.sort_by(|a, b| a.id.cmp(&b.id));

    let analysis = (status == SolveStatus::Optimal).then(|| AnalysisReport {
        binding_constraints: solution.analysis.binding_constraints.clone(),
        shadow_prices: solution
            .analysis
            .shadow_prices
            .iter()
            .map(|sp| ShadowPriceLine {
                constraint: sp.constraint.clone(),
                value: sp.value,
                interpretation: interpret_shadow_price(&sp.constraint, sp.value),
            })
            .collect(),
    });

    let violations = solution
        .violations
        .iter()
        .map(|v| ViolationReport {
            constraint: v.constraint.clone(),
            required: v.required,
            actual: v.actual,
            gap: v.gap,
            description: format!(
                "`{}` requires at least {:.2}, best effort reaches {:.2} (short by {:.2})",
                v.constraint, v.required, v.actual, v.gap
            ),
        })
        .collect();

    SolveReport {
        status,
        formula: lowered.name.clone(),
        formula_name: lowered.display_name.clone(),
        formula_code: lowered.code.clone(),
        description: lowered.description.clone(),
        batch_size: lowered.batch_size,
        total_cost,
        ingredients,
        nutrients,
        analysis,
        violations,
        error: None,
    }
}

fn interpret_shadow_price(constraint: &str, value: f64) -> String {
    if value.abs() < 1e-9 {
        return "non-binding constraint".to_string();
    }
    if value > 0.0 {
        format!(
            "relaxing `{}` by one unit would reduce total cost by {:.4}",
            constraint, value
        )
    } else {
        format!(
            "relaxing `{}` by one unit would increase total cost by {:.4}",
            constraint, -value
        )
    }
}
