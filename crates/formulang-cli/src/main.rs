//! Formulang CLI: solve formulas, check sources, list formulas.
//!
//! The only place in the workspace that touches the filesystem; imports
//! resolve relative to the file being processed.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use formulang::{DiagnosticFormatter, Severity, SolveStatus, SourceResolver};

#[derive(Parser)]
#[command(name = "formulang")]
#[command(about = "A DSL for least-cost feed formulation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a formula and print the optimal blend
    Solve {
        /// The .fm file containing the formula
        file: PathBuf,
        /// The formula name to solve
        formula: String,
        /// Emit the full report as JSON
        #[arg(long)]
        json: bool,
        /// Show binding constraints and shadow prices
        #[arg(short, long)]
        analysis: bool,
    },
    /// Check a .fm file and print its diagnostics
    Check {
        /// The file to check
        file: PathBuf,
    },
    /// List the formulas a file declares
    Formulas {
        /// The file to scan
        file: PathBuf,
    },
}

/// Resolves imports from the filesystem, relative to the importing file.
struct FsResolver;

impl SourceResolver for FsResolver {
    fn resolve(&self, from: &str, path: &str) -> Option<(String, String)> {
        let base = Path::new(from).parent().unwrap_or(Path::new(""));
        let mut candidate = base.join(path);
        if candidate.extension().is_none() {
            candidate.set_extension("fm");
        }
        let content = std::fs::read_to_string(&candidate).ok()?;
        Some((candidate.to_string_lossy().into_owned(), content))
    }
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "formulang=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Solve {
            file,
            formula,
            json,
            analysis,
        } => solve(&file, &formula, json, analysis),
        Commands::Check { file } => check(&file),
        Commands::Formulas { file } => formulas(&file),
    }
}

fn read(file: &Path) -> Result<String, ExitCode> {
    std::fs::read_to_string(file).map_err(|e| {
        eprintln!("error reading {}: {}", file.display(), e);
        ExitCode::FAILURE
    })
}

fn solve(file: &Path, formula: &str, json: bool, analysis: bool) -> ExitCode {
    let source = match read(file) {
        Ok(source) => source,
        Err(code) => return code,
    };
    let root = file.to_string_lossy().into_owned();
    debug!(file = %root, formula, "solving");

    let report = formulang::solve_in(&root, &source, &FsResolver, formula);

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(out) => println!("{}", out),
            Err(e) => {
                eprintln!("error serializing report: {}", e);
                return ExitCode::FAILURE;
            }
        }
        return match report.status {
            SolveStatus::Optimal => ExitCode::SUCCESS,
            _ => ExitCode::FAILURE,
        };
    }

    println!("Formula: {}", report.formula_name.as_deref().unwrap_or(&report.formula));
    if let Some(desc) = &report.description {
        println!("Description: {}", desc);
    }
    println!("Batch size: {}", report.batch_size);
    println!();

    match report.status {
        SolveStatus::Optimal => {
            println!("Status: OPTIMAL");
            println!("Total cost: {:.2}", report.total_cost);
            println!();
            println!("Ingredients:");
            for line in &report.ingredients {
                println!(
                    "  {:20} {:10.2} ({:5.2}%)",
                    line.id, line.amount, line.percentage
                );
            }
            println!();
            println!("Nutrients:");
            for line in &report.nutrients {
                let unit = line.unit.as_deref().unwrap_or("%");
                println!("  {:20} {:10.2} {}", line.id, line.value, unit);
            }

            if analysis {
                if let Some(details) = &report.analysis {
                    println!();
                    println!("Binding constraints:");
                    for name in &details.binding_constraints {
                        println!("  - {}", name);
                    }
                    println!();
                    println!("Shadow prices:");
                    for sp in &details.shadow_prices {
                        if sp.value.abs() > 0.001 {
                            println!("  {:30} {:10.4}", sp.constraint, sp.value);
                            println!("    {}", sp.interpretation);
                        }
                    }
                }
            }
            ExitCode::SUCCESS
        }
        SolveStatus::Infeasible => {
            println!("Status: INFEASIBLE (best-effort blend shown)");
            println!("Total cost: {:.2}", report.total_cost);
            println!();
            println!("Ingredients:");
            for line in &report.ingredients {
                println!(
                    "  {:20} {:10.2} ({:5.2}%)",
                    line.id, line.amount, line.percentage
                );
            }
            println!();
            println!("Violations:");
            for v in &report.violations {
                println!("  {}", v.description);
            }
            ExitCode::FAILURE
        }
        SolveStatus::Error => {
            eprintln!(
                "Status: ERROR\n{}",
                report.error.as_deref().unwrap_or("unknown solver failure")
            );
            ExitCode::FAILURE
        }
    }
}

fn check(file: &Path) -> ExitCode {
    let source = match read(file) {
        Ok(source) => source,
        Err(code) => return code,
    };
    let root = file.to_string_lossy().into_owned();

    let (program, diagnostics) = formulang::analyze(&root, &source, &FsResolver);

    if diagnostics.is_empty() {
        let module = program.module(program.root());
        println!("{} is valid", file.display());
        println!("  {} imports", module.imports.len());
        println!("  {} declarations", module.decls.len());
        return ExitCode::SUCCESS;
    }

    let formatter = DiagnosticFormatter::new(&program.sources);
    for diagnostic in &diagnostics {
        eprintln!("{}", formatter.format(diagnostic));
    }
    let errors = diagnostics.iter().filter(|d| d.is_error()).count();
    let warnings = diagnostics.len() - errors;
    eprintln!("{} error(s), {} warning(s)", errors, warnings);

    if diagnostics.iter().any(|d| d.severity == Severity::Error) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn formulas(file: &Path) -> ExitCode {
    let source = match read(file) {
        Ok(source) => source,
        Err(code) => return code,
    };
    for info in formulang::get_formulas(&source) {
        if info.is_template {
            println!("{} (template)", info.name);
        } else {
            println!("{}", info.name);
        }
    }
    ExitCode::SUCCESS
}
