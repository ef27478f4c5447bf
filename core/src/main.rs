use clap::{Parser, ValueEnum};
use dicomsort_core::{
    decode, BatchOptions, CancelToken, ClassifyMode, DeidPolicy, Manifest, Pipeline, TextReport,
};
use log::{error, info};
use std::path::PathBuf;
use std::process;

/// CLI tool for classifying, de-identifying and sorting DICOM files
#[derive(Parser, Debug)]
#[command(name = "dicomsort")]
#[command(about = "Classify, de-identify and sort a directory of DICOM files")]
#[command(version)]
struct Cli {
    /// Directory containing DICOM files
    #[arg(value_name = "INPUT_DIR")]
    input: PathBuf,

    /// Destination root for sorted output
    #[arg(value_name = "OUTPUT_DIR")]
    output: PathBuf,

    /// Classification manifest (JSON); omit to route everything to the
    /// default category
    #[arg(short, long)]
    manifest: Option<PathBuf>,

    /// De-identification policy (JSON); omit to use the built-in policy
    #[arg(short, long)]
    policy: Option<PathBuf>,

    /// Salt mixed into pseudonyms and remapped UIDs; overrides the policy
    /// document's own salt when both are given
    #[arg(long)]
    salt: Option<String>,

    /// Worker threads (0 = one per CPU)
    #[arg(short, long, default_value_t = 0)]
    jobs: usize,

    /// Descend into subdirectories of the input
    #[arg(short, long)]
    recursive: bool,

    /// Treat unmatched files as failures instead of routing them to the
    /// default category
    #[arg(long)]
    strict: bool,

    /// Output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// Write the original-to-pseudonym mapping CSV to this path
    #[arg(long)]
    map_file: Option<PathBuf>,

    /// Maximum number of per-file failures before the run is reported as
    /// unsuccessful
    #[arg(long, default_value_t = 0)]
    max_failures: usize,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Output format options
#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable text format
    Text,
    /// JSON format
    Json,
}

fn main() {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    if !cli.input.is_dir() {
        eprintln!("Error: {} is not a directory", cli.input.display());
        process::exit(1);
    }

    // Config problems are reported before any file is touched
    let manifest = match load_manifest(&cli) {
        Ok(manifest) => manifest,
        Err(e) => {
            error!("Invalid manifest: {}", e);
            eprintln!("Error: {}", e);
            process::exit(2);
        }
    };

    let policy = match load_policy(&cli) {
        Ok(policy) => policy,
        Err(e) => {
            error!("Invalid policy: {}", e);
            eprintln!("Error: {}", e);
            process::exit(2);
        }
    };

    info!("Processing directory: {}", cli.input.display());

    let files = match decode::collect_input_files(&cli.input, cli.recursive) {
        Ok(files) => files,
        Err(e) => {
            error!("Failed to read directory: {}", e);
            eprintln!("Error: Failed to read directory: {}", e);
            process::exit(1);
        }
    };

    if files.is_empty() {
        eprintln!("Error: No DICOM files found in directory");
        process::exit(1);
    }

    info!("Found {} DICOM files", files.len());

    let pipeline = Pipeline::new(manifest, policy, &cli.output).with_options(BatchOptions {
        workers: cli.jobs,
        progress: matches!(cli.format, OutputFormat::Text),
    });

    let cancel = CancelToken::new();
    let report = match pipeline.run(&files, &cancel) {
        Ok(report) => report,
        Err(e) => {
            error!("Batch run failed: {}", e);
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    if let Some(map_path) = &cli.map_file {
        if let Err(e) = report.write_mapping_csv(map_path) {
            error!("Failed to write mapping file: {}", e);
            eprintln!("Error: {}", e);
            process::exit(1);
        }
        info!("Wrote pseudonym mapping to {}", map_path.display());
    }

    if report.failed() > 0 {
        let error_path = cli.output.join("errors.csv");
        if let Err(e) = report.write_error_csv(&error_path) {
            error!("Failed to write error file: {}", e);
        } else {
            info!("Wrote failure list to {}", error_path.display());
        }
    }

    match cli.format {
        OutputFormat::Text => {
            println!("{}", TextReport::new(&report));
        }
        OutputFormat::Json => match report.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize to JSON: {}", e);
                eprintln!("Error: Failed to serialize to JSON: {}", e);
                process::exit(1);
            }
        },
    }

    if !report.is_success(cli.max_failures) {
        process::exit(1);
    }
}

fn setup_logging(verbose: bool) {
    if verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();
    }
}

fn load_manifest(cli: &Cli) -> dicomsort_core::Result<Manifest> {
    let manifest = match &cli.manifest {
        Some(path) => Manifest::from_path(path)?,
        None => Manifest::default(),
    };

    if cli.strict {
        Ok(manifest.with_mode(ClassifyMode::Strict))
    } else {
        Ok(manifest)
    }
}

fn load_policy(cli: &Cli) -> dicomsort_core::Result<DeidPolicy> {
    let Some(path) = &cli.policy else {
        return Ok(DeidPolicy::default_policy(
            cli.salt.as_deref().unwrap_or("anon"),
        ));
    };

    let policy = DeidPolicy::from_path(path)?;
    Ok(match &cli.salt {
        Some(salt) => policy.with_salt(salt),
        None => policy,
    })
}
