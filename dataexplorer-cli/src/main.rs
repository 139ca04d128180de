use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dataexplorer::{Config, Context, Published};
use eyre::{Result, WrapErr};

#[derive(Parser, Debug)]
#[clap(name = "dataexplorer", about, version)]
struct Args {
    /// Increase output logging verbosity.
    #[clap(short, long)]
    verbose: bool,

    /// Configuration file (JSON or YAML).
    #[clap(short, long, default_value = "dataexplorer.yml")]
    config: PathBuf,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List all locally stored projects.
    List,
    /// Create a new project.
    New {
        /// The project's name.
        name: String,
    },
    /// Print a project's attributes as JSON.
    Show { id: String },
    /// Serialize a project into a bundle.
    Export {
        id: String,
        /// Write the bundle to this file instead of standard output.
        #[clap(short, long)]
        out: Option<PathBuf>,
    },
    /// Publish a project to the remote store.
    Publish { id: String },
    /// Import a published bundle as a local project.
    Import { bundle_id: String },
    /// Load a project's source dataset, fetching it if it is remote.
    Load { id: String },
}

fn main() {
    let args = Args::parse();
    simple_logger::init_with_level(if args.verbose {
        log::Level::Debug
    } else {
        log::Level::Info
    })
    .unwrap();

    match run(args) {
        Ok(_) => log::debug!("Success!"),
        Err(e) => {
            log::error!("Failed: {:?}", e);
            std::process::exit(1);
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config = Config::load_from_file(&args.config)
        .wrap_err_with(|| format!("failed to load config from {}", args.config.display()))?
        .with_env();
    let ctx = Context::new(&config).wrap_err("failed to set up project storage")?;
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .wrap_err("failed to start async runtime")?;

    match args.command {
        Command::List => {
            let (projects, failures) = ctx.projects()?;
            for project in projects.iter() {
                println!("{}\t{}", project.id(), project.name());
            }
            for failure in failures {
                log::warn!("Skipped {}: {}", failure.key, failure.error);
            }
        }
        Command::New { name } => {
            let project = ctx.create_project(&name)?;
            println!("{}", project.id());
        }
        Command::Show { id } => {
            let project = ctx.project(&id)?;
            println!("{}", serde_json::to_string_pretty(&project.to_snapshot())?);
        }
        Command::Export { id, out } => {
            let bundle = ctx
                .export(&id)
                .wrap_err_with(|| format!("failed to export project {}", id))?;
            let json = serde_json::to_string_pretty(&bundle)?;
            match out {
                Some(path) => std::fs::write(&path, json)
                    .wrap_err_with(|| format!("failed to write {}", path.display()))?,
                None => println!("{}", json),
            }
        }
        Command::Publish { id } => {
            match rt
                .block_on(ctx.publish(&id))
                .wrap_err_with(|| format!("failed to publish project {}", id))?
            {
                Published::Created { id, url } => println!("Published as {} ({})", id, url),
                Published::Updated { id } => println!("Updated {}", id),
                Published::Skipped => log::warn!(
                    "Not authenticated: set a token in the configuration or {}",
                    dataexplorer::TOKEN_ENV_VAR
                ),
            }
        }
        Command::Import { bundle_id } => {
            let project = rt
                .block_on(ctx.import(&bundle_id))
                .wrap_err_with(|| format!("failed to import bundle {}", bundle_id))?;
            println!("{}", project.id());
        }
        Command::Load { id } => {
            let project = rt
                .block_on(ctx.load_source_dataset(&id))
                .wrap_err_with(|| format!("failed to load source dataset of {}", id))?;
            if let Some(store) = project.datasets().first().and_then(|d| d.store()) {
                println!(
                    "{} field(s), {} record(s)",
                    store.fields.len(),
                    store.records.len()
                );
            }
        }
    }
    Ok(())
}
