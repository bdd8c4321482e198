use std::path::PathBuf;
use std::process;

use thiserror::Error;
use tracing_subscriber::{filter::LevelFilter, fmt};

use skylog_app::cli::{Cli, Commands, RenderPdfArgs, SliceArgs};
use skylog_app::pdf::{PageRasterizer, PdfiumRasterizer, RasterizeError};
use skylog_app::slicer::{slice_image, SliceError, SliceOptions};

fn main() {
    let cli = Cli::parse();
    init_tracing(determine_log_level(&cli));

    if let Err(err) = run(cli) {
        eprintln!("{err}");
        process::exit(1);
    }
}

fn init_tracing(level: LevelFilter) {
    let subscriber = fmt().with_max_level(level).with_target(false).finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("Tracing subscriber already set; skipping re-initialization.");
    }
}

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Slice(#[from] SliceError),
    #[error(transparent)]
    Rasterize(#[from] RasterizeError),
    #[error("failed to read input file {path}: {source}")]
    ReadInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write output file {path}: {source}")]
    WriteOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Some(Commands::Slice(args)) => run_slice(args),
        Some(Commands::RenderPdf(args)) => run_render_pdf(args),
        None => {
            Cli::print_help();
            Ok(())
        }
    }
}

fn run_slice(args: SliceArgs) -> Result<(), AppError> {
    let options = SliceOptions::builder().jpeg_quality(args.quality).build();

    for input in &args.inputs {
        let bytes = std::fs::read(input).map_err(|source| AppError::ReadInput {
            path: input.clone(),
            source,
        })?;

        let slices = slice_image(&bytes, &options)?;
        tracing::info!(input = %input.display(), strips = slices.len(), "sliced page");

        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("page");
        ensure_dir(&args.output_dir)?;

        for slice in &slices {
            let out_path = args
                .output_dir
                .join(format!("{stem}_slice_{:03}.jpg", slice.index));
            std::fs::write(&out_path, &slice.image_data).map_err(|source| {
                AppError::WriteOutput {
                    path: out_path.clone(),
                    source,
                }
            })?;
            println!(
                "{}  y=[{}, {})  height={}  ({} bytes)",
                out_path.display(),
                slice.y0,
                slice.y1,
                slice.y1 - slice.y0,
                slice.image_data.len()
            );
        }
    }

    Ok(())
}

fn run_render_pdf(args: RenderPdfArgs) -> Result<(), AppError> {
    let bytes = std::fs::read(&args.input).map_err(|source| AppError::ReadInput {
        path: args.input.clone(),
        source,
    })?;

    let pages = PdfiumRasterizer.rasterize(&bytes)?;
    tracing::info!(input = %args.input.display(), pages = pages.len(), "rasterized pdf");

    ensure_dir(&args.output_dir)?;
    for (i, page) in pages.iter().enumerate() {
        let out_path = args.output_dir.join(format!("page_{:04}.jpg", i + 1));
        std::fs::write(&out_path, page).map_err(|source| AppError::WriteOutput {
            path: out_path.clone(),
            source,
        })?;
        println!("{}  ({} bytes)", out_path.display(), page.len());
    }

    Ok(())
}

fn ensure_dir(dir: &PathBuf) -> Result<(), AppError> {
    std::fs::create_dir_all(dir).map_err(|source| AppError::WriteOutput {
        path: dir.clone(),
        source,
    })
}

fn determine_log_level(cli: &Cli) -> LevelFilter {
    match cli.verbose {
        0 => LevelFilter::OFF,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}
