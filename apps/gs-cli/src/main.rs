use clap::{Parser, Subcommand};
use gs_core::timing::{self, solver_timing};
use gs_floor::{FloorProjector, FloorReport, VarLayout};
use gs_solver::{NewtonSolver, StepOutcome, implicit_step};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::Level;

mod cooling;
mod error;
mod run_config;

use cooling::{CoolingStep, demo_geometry, initial_state};
use error::CliResult;
use run_config::RunConfig;

#[derive(Parser)]
#[command(name = "gs-cli")]
#[command(about = "gridstep CLI - batched implicit steps with validity floors", long_about = None)]
struct Cli {
    /// Log solver iterations (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the stiff cooling demo described by a YAML run file
    Run {
        /// Path to the run YAML file
        config_path: PathBuf,
        /// Write every step outcome as JSON to this path
        #[arg(long)]
        json: Option<PathBuf>,
        /// Collect and log per-phase timings
        #[arg(long)]
        timing: bool,
    },
    /// Parse and validate a run file without solving
    CheckConfig {
        /// Path to the run YAML file
        config_path: PathBuf,
    },
}

#[derive(Serialize)]
struct RunSummary<'a> {
    config: &'a RunConfig,
    initial_projection: FloorReport,
    steps: Vec<StepOutcome<FloorReport>>,
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    match cli.command {
        Commands::Run {
            config_path,
            json,
            timing,
        } => cmd_run(&config_path, json.as_deref(), timing),
        Commands::CheckConfig { config_path } => cmd_check_config(&config_path),
    }
}

fn cmd_check_config(config_path: &Path) -> CliResult<()> {
    println!("Checking run file: {}", config_path.display());
    let cfg = RunConfig::load(config_path)?;
    cfg.validate()?;
    let layout = VarLayout::new(cfg.closures);
    println!("✓ Run file is valid");
    println!(
        "  grid {} ({} cells, {} components), {} steps of dt = {}",
        cfg.grid,
        cfg.grid.num_cells(),
        layout.dof(),
        cfg.steps,
        cfg.dt
    );
    Ok(())
}

fn cmd_run(config_path: &Path, json: Option<&Path>, collect_timing: bool) -> CliResult<()> {
    let cfg = RunConfig::load(config_path)?;
    cfg.validate()?;
    if collect_timing {
        timing::enable_timing();
        solver_timing::reset_all();
    }

    let layout = VarLayout::new(cfg.closures);
    let geometry = demo_geometry(&cfg);
    let projector = FloorProjector::new(cfg.floors.clone(), layout, &geometry, cfg.fluid)?;
    let mut state = initial_state(&cfg, &layout, &geometry)?;
    let mut solver = NewtonSolver::new(cfg.newton.clone());

    println!(
        "Running {} cooling steps on a {} grid (dt = {})",
        cfg.steps, cfg.grid, cfg.dt
    );
    let initial_projection = projector.apply(&mut state)?;
    println!(
        "  initial state: {} cells floored",
        initial_projection.use_floor.count()
    );

    let mut steps = Vec::with_capacity(cfg.steps);
    for step in 0..cfg.steps {
        let model = CoolingStep::new(&cfg, layout, state.clone());
        let outcome = implicit_step(&mut solver, &model, &projector, &mut state)?;
        let newton = &outcome.newton;
        println!(
            "  step {:>3}: {} {:>2} iterations  residual={:.3e}  floored={}  capped={}  limited={}",
            step,
            if newton.status.is_converged() {
                "converged"
            } else {
                "exhausted"
            },
            newton.status.iterations(),
            newton.residual_norm,
            outcome.projection.use_floor.count(),
            outcome.projection.lorentz_capped.count(),
            outcome.projection.closure_limited,
        );
        steps.push(outcome);
    }
    println!("✓ Completed {} steps", cfg.steps);

    if collect_timing {
        solver_timing::log_summary();
    }

    if let Some(path) = json {
        let summary = RunSummary {
            config: &cfg,
            initial_projection,
            steps,
        };
        let encoded = serde_json::to_string_pretty(&summary)?;
        std::fs::write(path, encoded).map_err(|source| error::CliError::ReportWrite {
            path: path.to_path_buf(),
            source,
        })?;
        println!("  report written to {}", path.display());
    }
    Ok(())
}
