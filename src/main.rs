use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use rustpower_interop::config::Config;
use rustpower_interop::io::pandapower::{
    self, load_pandapower_json, res_bus_table, runpp, save_pandapower_json,
};
use rustpower_interop::io::pypsa::{self, from_pypsa};
use rustpower_interop::opf::{JuliaPandaModels, run_pm};
use rustpower_interop::testcases::create_pypsa_test_net;
use rustpower_interop::verify::{check_results_equal, compare_bus_results, comparison_table};

#[derive(Parser)]
#[command(name = "rustpower-interop", version, about = "PyPSA to pandapower network conversion")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert and solve the built-in 3-bus network and compare both sides.
    Demo,
    /// Convert a PyPSA CSV folder (or zip archive) into a pandapower JSON file.
    Convert {
        input: PathBuf,
        output: PathBuf,
        /// Run a power flow on the converted network and store its results.
        #[arg(long)]
        solve: bool,
    },
    /// Run an optimal power flow through PandaModels.jl.
    Opf {
        input: PathBuf,
        /// Write the solved network here instead of printing bus results.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn load_source(input: &PathBuf) -> anyhow::Result<pypsa::SourceNetwork> {
    #[cfg(feature = "zip")]
    if input.extension().is_some_and(|e| e == "zip") {
        return pypsa::load_csv_zip(input).with_context(|| format!("reading {}", input.display()));
    }
    pypsa::load_csv_folder(input).with_context(|| format!("reading {}", input.display()))
}

fn demo(cfg: &Config) -> anyhow::Result<()> {
    let pnet = create_pypsa_test_net(&cfg.powerflow)?;
    let mut net = from_pypsa(&pnet)?;
    let iterations = runpp(&mut net, &cfg.powerflow)?;
    info!(iterations, "target power flow converged");

    let rows = compare_bus_results(&pnet, &net)?;
    println!("{}", comparison_table(&rows));
    check_results_equal(&pnet, &net, &cfg.verify)?;
    println!("results are equal within abs={:e} rel={:e}", cfg.verify.abs, cfg.verify.rel);
    Ok(())
}

fn convert(cfg: &Config, input: &PathBuf, output: &PathBuf, solve: bool) -> anyhow::Result<()> {
    let mut pnet = load_source(input)?;
    pnet.calculate_dependent_values()?;
    let mut net = from_pypsa(&pnet)?;
    if solve {
        runpp(&mut net, &cfg.powerflow)?;
        println!("{}", res_bus_table(&net));
    }
    save_pandapower_json(&net, output).with_context(|| format!("writing {}", output.display()))?;
    info!(buses = net.bus.len(), output = %output.display(), "wrote pandapower network");
    Ok(())
}

fn opf(cfg: &Config, input: &PathBuf, output: Option<&PathBuf>) -> anyhow::Result<()> {
    let net: pandapower::Network =
        load_pandapower_json(input).with_context(|| format!("reading {}", input.display()))?;
    let backend = JuliaPandaModels::from_options(&cfg.opf);
    let solved = run_pm(&net, &backend, &cfg.opf)?;
    match output {
        Some(path) => save_pandapower_json(&solved, path)?,
        None => println!("{}", res_bus_table(&solved)),
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = match &cli.config {
        Some(path) => Config::from_toml_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => Config::default(),
    };

    match &cli.command {
        Commands::Demo => demo(&cfg),
        Commands::Convert { input, output, solve } => convert(&cfg, input, output, *solve),
        Commands::Opf { input, output } => opf(&cfg, input, output.as_ref()),
    }
}
