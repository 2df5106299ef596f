use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use pool_core::artifacts::{
    read_json, read_qubo, read_routes, read_solve_report, write_json, write_qubo, write_routes,
    write_solve_report, ASSIGNMENTS_FILE, QUBO_FILE, RIDES_FILE, ROUTES_FILE,
    SIMULATION_SUMMARY_FILE,
};
use pool_core::costs::{CostMatrixProvider, SyntheticCosts, TripCosts};
use pool_core::grid_world::GridWorld;
use pool_core::model::RiderRequest;
use pool_core::params::{PoolParams, StrategyKind};
use pool_core::pipeline::{build_model, plan_routes, solve_model};
use pool_core::qubo::SimulatedAnnealingSolver;
use pool_core::rides::{generate_rides, read_rides_csv, write_rides_csv};
use pool_core::route::RouteArtifact;
use pool_core::simulation::{SimulationLoop, SimulationOutcome, SimulationReport, Strategy};
use pool_core::telemetry_export::write_telemetry_parquet;

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "pool",
    about = "Ride-pooling assignment, routing and dispatch simulation",
    long_about = "Runs the ride-pooling pipeline stage by stage: generate rides, build the\n\
                  assignment model, solve it, build routes and simulate. Every stage reads\n\
                  and writes its artifacts in the output directory."
)]
struct Cli {
    /// Directory holding the stage artifacts
    #[arg(long, global = true, default_value = "out", env = "POOL_OUT_DIR")]
    out: PathBuf,
    /// JSON parameter file; flags override its fields
    #[arg(long, global = true, env = "POOL_CONFIG")]
    config: Option<PathBuf>,
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
    /// Hide progress bars
    #[arg(long, global = true)]
    quiet: bool,
    #[command(flatten)]
    overrides: ParamOverrides,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a synthetic ride batch
    Generate(GenerateArgs),
    /// Build the assignment model from the ride batch
    Model(CostArgs),
    /// Solve the model and write per-vehicle assignments
    Solve(CostArgs),
    /// Build one route per vehicle from the assignments
    Routes,
    /// Drive a strategy through the grid world
    Simulate(SimulateArgs),
    /// Run every stage in order
    Run {
        #[command(flatten)]
        generate: GenerateArgs,
        #[command(flatten)]
        costs: CostArgs,
        #[command(flatten)]
        simulate: SimulateArgs,
    },
}

#[derive(Args, Clone)]
struct GenerateArgs {
    /// Number of rides; defaults to vehicles x capacity
    #[arg(long)]
    count: Option<usize>,
    /// Side of the square grid rides are drawn from
    #[arg(long, default_value_t = 20)]
    grid_size: i64,
    /// Request times are drawn from 0..=window seconds
    #[arg(long, default_value_t = 600)]
    request_window_secs: u64,
}

#[derive(Args, Clone)]
struct CostArgs {
    #[arg(value_enum, long, default_value_t = CostSource::Trip)]
    costs: CostSource,
}

#[derive(Clone, Copy, ValueEnum)]
enum CostSource {
    /// Trip length and distance from the median request time
    Trip,
    /// Seeded random matrices
    Synthetic,
}

#[derive(Args, Clone)]
struct SimulateArgs {
    /// Grid side; grown to fit the depot and every ride
    #[arg(long = "world-size", default_value_t = 20)]
    world_size: i64,
    /// Cancel the run after this many wall-clock seconds
    #[arg(long)]
    time_limit_secs: Option<u64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Online,
    Offline,
}

impl From<StrategyArg> for StrategyKind {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::Online => StrategyKind::Online,
            StrategyArg::Offline => StrategyKind::Offline,
        }
    }
}

#[derive(Args)]
struct ParamOverrides {
    #[arg(long, global = true)]
    vehicles: Option<usize>,
    #[arg(long, global = true)]
    capacity: Option<u32>,
    #[arg(long, global = true)]
    penalty: Option<f64>,
    /// Seconds
    #[arg(long, global = true)]
    max_wait_time: Option<f64>,
    #[arg(long, global = true)]
    num_reads: Option<usize>,
    #[arg(long, global = true)]
    num_sweeps: Option<usize>,
    #[arg(long, global = true)]
    seed: Option<u64>,
    /// Fail the solve stage when capacity or wait limits are broken
    #[arg(long, global = true)]
    strict_feasibility: bool,
    #[arg(value_enum, long, global = true)]
    strategy: Option<StrategyArg>,
    #[arg(long, global = true)]
    max_ticks: Option<u64>,
}

impl ParamOverrides {
    fn apply(&self, mut params: PoolParams) -> PoolParams {
        if let Some(v) = self.vehicles {
            params = params.with_num_vehicles(v);
        }
        if let Some(c) = self.capacity {
            params = params.with_max_capacity(c);
        }
        if let Some(p) = self.penalty {
            params = params.with_penalty(p);
        }
        if let Some(w) = self.max_wait_time {
            params = params.with_max_wait_time(w);
        }
        if let Some(r) = self.num_reads {
            params = params.with_num_reads(r);
        }
        if let Some(s) = self.num_sweeps {
            params = params.with_num_sweeps(s);
        }
        if let Some(s) = self.seed {
            params = params.with_seed(s);
        }
        if self.strict_feasibility {
            params = params.with_strict_feasibility(true);
        }
        if let Some(s) = self.strategy {
            params = params.with_strategy(s.into());
        }
        if let Some(t) = self.max_ticks {
            params = params.with_max_ticks(t);
        }
        params
    }
}

// ── Entry point ────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let params = load_params(cli.config.as_deref(), &cli.overrides)?;
    params.validate().context("invalid parameters")?;
    fs::create_dir_all(&cli.out)
        .with_context(|| format!("creating output directory {}", cli.out.display()))?;

    let stages = Stages {
        out: cli.out,
        params,
        progress: !cli.quiet && !cli.json_logs,
    };

    match cli.command {
        Commands::Generate(args) => stages.generate(&args),
        Commands::Model(args) => stages.model(args.costs),
        Commands::Solve(args) => stages.solve(args.costs),
        Commands::Routes => stages.routes(),
        Commands::Simulate(args) => stages.simulate(&args),
        Commands::Run {
            generate,
            costs,
            simulate,
        } => {
            stages.generate(&generate)?;
            stages.model(costs.costs)?;
            stages.solve(costs.costs)?;
            stages.routes()?;
            stages.simulate(&simulate)
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

fn load_params(config: Option<&Path>, overrides: &ParamOverrides) -> Result<PoolParams> {
    let base = match config {
        Some(path) => read_json::<PoolParams, _>(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => PoolParams::default(),
    };
    Ok(overrides.apply(base))
}

// ── Stages ─────────────────────────────────────────────────────────

struct Stages {
    out: PathBuf,
    params: PoolParams,
    progress: bool,
}

impl Stages {
    fn artifact(&self, name: &str) -> PathBuf {
        self.out.join(name)
    }

    fn load_rides(&self) -> Result<Vec<RiderRequest>> {
        let path = self.artifact(RIDES_FILE);
        ensure_exists(&path)?;
        read_rides_csv(&path).with_context(|| format!("reading rides from {}", path.display()))
    }

    fn cost_provider(&self, source: CostSource) -> Box<dyn CostMatrixProvider> {
        match source {
            CostSource::Trip => Box::new(TripCosts::new(self.params.grid_to_km)),
            CostSource::Synthetic => Box::new(SyntheticCosts::new(self.params.solver.seed)),
        }
    }

    fn generate(&self, args: &GenerateArgs) -> Result<()> {
        let count = args
            .count
            .unwrap_or(self.params.num_vehicles * self.params.max_capacity as usize);
        let mut rng = StdRng::seed_from_u64(self.params.solver.seed);
        let rides = generate_rides(count, args.grid_size, args.request_window_secs, &mut rng)
            .context("generating rides")?;

        let path = self.artifact(RIDES_FILE);
        write_rides_csv(&path, &rides)
            .with_context(|| format!("writing rides to {}", path.display()))?;
        info!(rides = rides.len(), path = %path.display(), "rides generated");
        Ok(())
    }

    fn model(&self, source: CostSource) -> Result<()> {
        let rides = self.load_rides()?;
        let (_, qubo) = build_model(&rides, &self.params, self.cost_provider(source).as_ref())
            .context("building assignment model")?;

        let path = self.artifact(QUBO_FILE);
        write_qubo(&path, &qubo).with_context(|| format!("writing model to {}", path.display()))?;
        info!(
            variables = qubo.num_variables(),
            terms = qubo.num_terms(),
            path = %path.display(),
            "model written"
        );
        Ok(())
    }

    fn solve(&self, source: CostSource) -> Result<()> {
        let rides = self.load_rides()?;
        let qubo_path = self.artifact(QUBO_FILE);
        ensure_exists(&qubo_path)?;
        let qubo = read_qubo(&qubo_path)
            .with_context(|| format!("reading model from {}", qubo_path.display()))?;
        // Costs are deterministic, so rebuilding them matches the stored model.
        let costs = self
            .cost_provider(source)
            .cost_matrices(&rides, self.params.num_vehicles)
            .context("building cost matrices")?;

        let spinner = self.spinner("annealing")?;
        let result = solve_model(&qubo, &costs, &rides, &self.params, &SimulatedAnnealingSolver);
        if let Some(pb) = &spinner {
            pb.finish_and_clear();
        }
        let report = result.context("solving assignment model")?;
        if !report.is_valid {
            warn!("assignment breaks capacity or wait-time limits");
        }

        let path = self.artifact(ASSIGNMENTS_FILE);
        write_solve_report(&path, &report)
            .with_context(|| format!("writing assignments to {}", path.display()))?;
        info!(
            energy = report.energy,
            assigned = report.assigned_riders(),
            path = %path.display(),
            "assignments written"
        );
        Ok(())
    }

    fn routes(&self) -> Result<()> {
        let rides = self.load_rides()?;
        let report_path = self.artifact(ASSIGNMENTS_FILE);
        ensure_exists(&report_path)?;
        let report = read_solve_report(&report_path)
            .with_context(|| format!("reading assignments from {}", report_path.display()))?;
        let routes = plan_routes(&report.assignments, &rides, &self.params)
            .context("building routes")?;

        let path = self.artifact(ROUTES_FILE);
        write_routes(&path, &routes)
            .with_context(|| format!("writing routes to {}", path.display()))?;
        info!(routes = routes.len(), path = %path.display(), "routes written");
        Ok(())
    }

    fn simulate(&self, args: &SimulateArgs) -> Result<()> {
        let (strategy, extent) = match self.params.simulation.strategy {
            StrategyKind::Online => {
                let rides = self.load_rides()?;
                let extent = rides
                    .iter()
                    .flat_map(|r| [r.pickup, r.dropoff])
                    .map(|c| c.x.max(c.y))
                    .max()
                    .unwrap_or(0);
                (Strategy::online(rides), extent)
            }
            StrategyKind::Offline => {
                let path = self.artifact(ROUTES_FILE);
                ensure_exists(&path)?;
                let routes = read_routes(&path)
                    .with_context(|| format!("reading routes from {}", path.display()))?;
                let extent = route_extent(&routes);
                (Strategy::offline(routes), extent)
            }
        };
        let depot = self.params.depot;
        let size = args.world_size.max(extent + 1).max(depot.x.max(depot.y) + 1);
        let world = GridWorld::square(size).context("building grid world")?;

        let sim = SimulationLoop::new(world, self.params.clone(), strategy)
            .context("preparing simulation")?;
        let report = self.drive(sim, args.time_limit_secs.map(Duration::from_secs))?;

        let summary = report.summary();
        let summary_path = self.artifact(SIMULATION_SUMMARY_FILE);
        write_json(&summary_path, &summary)
            .with_context(|| format!("writing summary to {}", summary_path.display()))?;
        write_telemetry_parquet(&self.out, &report.telemetry).context("writing telemetry")?;

        match report.outcome {
            SimulationOutcome::Completed => info!(ticks = report.ticks, "simulation completed"),
            outcome => warn!(?outcome, unserved = report.unserved.len(), "simulation stopped early"),
        }
        println!("{}", serde_json::to_string_pretty(&summary)?);
        Ok(())
    }

    fn drive(
        &self,
        sim: SimulationLoop<GridWorld>,
        time_limit: Option<Duration>,
    ) -> Result<SimulationReport> {
        let cancel = sim.cancel_flag();
        let started = Instant::now();
        let spinner = self.spinner("simulating")?;

        let result = sim.run_with_hook(|tick, state| {
            if let Some(pb) = &spinner {
                pb.set_message(format!("tick {tick} ({state:?})"));
            }
            if time_limit.is_some_and(|limit| started.elapsed() >= limit) && !cancel.is_cancelled() {
                warn!(tick, "time limit reached, cancelling");
                cancel.cancel();
            }
        });
        if let Some(pb) = &spinner {
            pb.finish_and_clear();
        }
        result.context("running simulation")
    }

    fn spinner(&self, message: &'static str) -> Result<Option<ProgressBar>> {
        if !self.progress {
            return Ok(None);
        }
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(120));
        Ok(Some(pb))
    }
}

fn route_extent(routes: &[RouteArtifact]) -> i64 {
    routes
        .iter()
        .flat_map(|r| r.route.iter())
        .map(|s| s.coord.x.max(s.coord.y))
        .max()
        .unwrap_or(0)
}

fn ensure_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        bail!("{} does not exist; run the earlier stage first", path.display());
    }
    Ok(())
}
