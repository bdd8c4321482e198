use std::path::PathBuf;

use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand};

/// Top-level CLI entry point.
#[derive(Debug, Parser)]
#[command(
    name = "skylog",
    version,
    author,
    about = "Aircraft maintenance logbook digitization service"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    /// Increase logging verbosity (-v, -vv, -vvv).
    #[arg(global = true, short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn print_help() {
        let mut cmd = Cli::command();
        let _ = cmd.print_help();
        println!();
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Cut a page image into per-entry strips (debug aid for slicer tuning).
    Slice(SliceArgs),
    /// Rasterize a PDF into page JPEGs the way the split stage does.
    RenderPdf(RenderPdfArgs),
}

#[derive(Debug, Args)]
pub struct SliceArgs {
    /// Page images to slice.
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Directory the strips are written into.
    #[arg(short, long, default_value = "./slices")]
    pub output_dir: PathBuf,

    /// JPEG quality of the strips.
    #[arg(long, default_value_t = 85)]
    pub quality: u8,
}

#[derive(Debug, Args)]
pub struct RenderPdfArgs {
    /// PDF document to rasterize.
    pub input: PathBuf,

    /// Directory the page images are written into.
    #[arg(short, long, default_value = "./pages")]
    pub output_dir: PathBuf,
}
