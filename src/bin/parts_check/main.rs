use std::{fmt::Display, path::PathBuf, process::ExitCode};

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use error_stack::ResultExt;
use parts_rs::{
    config::SetupConfig,
    jacobian::{EngineCall, RecordingEngine},
    logging::init_logging,
    species::setup_species,
};

mod report;

fn main() -> ExitCode {
    if let Err(e) = main_inner() {
        eprintln!("ERROR: {e:?}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn main_inner() -> error_stack::Result<(), CliError> {
    let clargs = Cli::parse();
    init_logging(clargs.verbosity.log_level_filter(), clargs.show_deductions)
        .change_context_lazy(|| "Error setting up logging".into())?;

    let config = SetupConfig::from_toml_file(&clargs.setup_file)
        .change_context_lazy(|| format!("Error loading setup file {}", clargs.setup_file.display()).into())?;
    let ctx = config.build_context();

    // Print the table before checking, so that the user can see every source
    // that went into a conflicting dimension.
    println!("{}", report::dimension_table(&ctx));
    ctx.check_dimensions()
        .change_context_lazy(|| "The dimensions of the simulation are inconsistent".into())?;

    let mut species = config.build_species(&ctx)
        .change_context_lazy(|| "Error building the absorption species".into())?;
    let mut engine = RecordingEngine::default();
    let tags = setup_species(&ctx, &mut species, &mut engine)
        .change_context_lazy(|| "Error setting up the absorption species".into())?;

    if clargs.json {
        let dry_run = DryRun { abs_species: tags, calls: engine.calls };
        let s = serde_json::to_string_pretty(&dry_run)
            .change_context_lazy(|| "Error serializing the engine calls".into())?;
        println!("{s}");
    } else {
        println!("{}", report::species_table(&species));
    }

    Ok(())
}

/// Check that the dimensions implied by a simulation setup file are consistent
/// and show the species arguments that would be passed to ARTS.
#[derive(Debug, Parser)]
struct Cli {
    /// Path to the TOML setup file
    setup_file: PathBuf,

    /// Print the tag strings and engine calls as JSON instead of a table
    #[clap(long)]
    json: bool,

    /// Log every dimension deduction as it is recorded
    #[clap(long)]
    show_deductions: bool,

    #[command(flatten)]
    verbosity: Verbosity<InfoLevel>,
}

#[derive(Debug, serde::Serialize)]
struct DryRun {
    abs_species: Vec<String>,
    calls: Vec<EngineCall>,
}

#[derive(Debug, thiserror::Error)]
struct CliError(String);

impl Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CliError {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for CliError {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
