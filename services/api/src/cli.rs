use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use geoweight::error::AppError;

use crate::batch::{run_analyze, run_score, AnalyzeArgs, ScoreArgs};
use crate::demo::{run_demo, DemoArgs};
use crate::server;

#[derive(Parser, Debug)]
#[command(
    name = "geoweight",
    about = "Score geospatial features through a dataset, category and mode weight hierarchy",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Classify every property of a GeoJSON or CSV file and print the field profiles
    Analyze(AnalyzeArgs),
    /// Score a feature file against a JSON bundle of datasets, categories and one mode
    Score(ScoreArgs),
    /// Build a sample hierarchy over synthetic features and print the ranking
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Override the directory holding the JSON collections
    #[arg(long)]
    pub(crate) data_dir: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Analyze(args) => run_analyze(args),
        Command::Score(args) => run_score(args),
        Command::Demo(args) => run_demo(args),
    }
}
