use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use neuromorpho_dl::logging::{self, LogOptions};
use neuromorpho_dl::{Config, DownloadOptions, Event, Pipeline, Query, Result, cancel_on_signal};

#[derive(Parser)]
#[command(name = "neuromorpho")]
#[command(about = "Search the NeuroMorpho.org archive and bulk-download morphology files")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run a query file: search, download, write the metadata export")]
    Search(SearchArgs),
    #[command(about = "List queryable fields, or the accepted values of one field")]
    Explore(ExploreArgs),
}

#[derive(Args)]
struct SearchArgs {
    /// Query definition file (YAML or JSON)
    query_file: PathBuf,

    /// Directory for downloads and the metadata export
    #[arg(short, long, default_value = "neurons")]
    output_dir: PathBuf,

    /// Name of the metadata export file inside the output directory
    #[arg(short, long, default_value = "metadata.csv")]
    metadata_filename: String,

    /// Maximum simultaneous file downloads (1-50)
    #[arg(short, long, default_value_t = 20, value_parser = clap::value_parser!(u8).range(1..=50))]
    concurrent: u8,

    /// Group downloads into subdirectories by these metadata fields
    #[arg(short, long, value_delimiter = ',')]
    group_by: Vec<String>,

    /// Parse and structurally check each file after download
    #[arg(long)]
    validate_swc: bool,

    /// Log at debug level
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Log errors only and skip per-neuron progress output
    #[arg(short, long)]
    quiet: bool,

    /// Skip writing a per-run log file into the output directory
    #[arg(long)]
    no_log: bool,

    /// Validate and count matches without downloading anything
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct ExploreArgs {
    /// Field whose accepted values to list; omit to list the fields themselves
    field: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Search(args) => run_search(args).await,
        Commands::Explore(args) => run_explore(args).await,
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run_search(args: SearchArgs) -> Result<()> {
    let run_name = args
        .query_file
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string);
    let log_dir = (!args.no_log).then(|| args.output_dir.clone());
    logging::init(&LogOptions {
        verbose: args.verbose,
        quiet: args.quiet,
        log_dir,
        run_name,
    })?;

    let query = Query::from_file(&args.query_file)?;
    let config = Config {
        download_concurrency: usize::from(args.concurrent),
        ..Config::default()
    };
    let pipeline = Pipeline::new(config)?;
    tokio::spawn(cancel_on_signal(pipeline.cancellation_token()));

    if args.dry_run {
        let preview = pipeline.preview(&query).await?;
        println!("{} matching neurons", preview.total);
        for name in &preview.sample {
            println!("  {name}");
        }
        if preview.total > preview.sample.len() as u64 {
            println!("  ...");
        }
        return Ok(());
    }

    if !args.quiet {
        let mut events = pipeline.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                if let Event::NeuronFinished {
                    name,
                    status,
                    completed,
                    total,
                    ..
                } = event
                {
                    eprintln!("[{completed}/{total}] {name}: {}", status.label());
                }
            }
        });
    }

    let options = DownloadOptions {
        group_by: args.group_by,
        metadata_filename: args.metadata_filename,
        validate_swc: args.validate_swc,
        ..DownloadOptions::default()
    };
    let summary = pipeline
        .search_and_download(&query, &args.output_dir, &options)
        .await?;

    println!(
        "{} neurons: {} downloaded, {} already present, {} failed",
        summary.total, summary.succeeded, summary.skipped, summary.failed
    );
    if let Some(path) = &summary.metadata_path {
        println!("metadata: {}", path.display());
    }
    if !summary.failed_names.is_empty() {
        println!("failed:");
        for name in &summary.failed_names {
            println!("  {name}");
        }
    }
    Ok(())
}

async fn run_explore(args: ExploreArgs) -> Result<()> {
    logging::init(&LogOptions {
        quiet: true,
        ..LogOptions::default()
    })?;
    let pipeline = Pipeline::new(Config::default())?;

    match args.field {
        Some(field) => {
            let mut values = pipeline.client().field_values(&field).await?;
            values.sort();
            for value in values {
                println!("{value}");
            }
        }
        None => {
            for field in pipeline.client().remote_fields().await? {
                println!("{field}");
            }
        }
    }
    Ok(())
}
