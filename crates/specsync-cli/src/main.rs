use clap::{Parser, Subcommand};
use colored::Colorize;
use specsync_core::{
    ssot, ConsistencyValidator, EnginePreference, FillEngine, SpecSyncConfig, Workspace,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod discover;
mod output;

/// Spec Sync - fill Word/Excel templates from one SSOT and check them against it
#[derive(Parser)]
#[command(name = "specsync", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project root holding ssot/, mapping/, templates/ and output/
    #[arg(short, long, value_name = "DIR", global = true)]
    root: Option<PathBuf>,

    /// Configuration file (TOML)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Fill engine: auto, pure or office
    #[arg(short, long, global = true)]
    engine: Option<EnginePreference>,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fill every template of the mapping file into output/
    Generate,

    /// Substitute {dotted.key} tokens in templates (all templates if none given)
    Fill {
        templates: Vec<String>,
    },

    /// List the tokens found in a template
    Scan {
        template: String,
    },

    /// Check the latest generated documents against the SSOT
    Validate {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write output/ssot_flat.json (marker name -> value) for external macros
    ExportFlat,

    /// Print the SSOT as dotted-key pairs
    Flatten,

    /// Suggest markers for the fields of a Word document
    Discover {
        /// Word document to analyse
        document: PathBuf,

        /// Template name used in the suggested mapping (default: file stem)
        #[arg(long)]
        template_name: Option<String>,

        /// Write the text report here instead of stdout
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,

        /// Write a suggested mapping file here
        #[arg(long, value_name = "FILE")]
        mapping: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(cli.verbose)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<SpecSyncConfig> {
    let config = match &cli.config {
        Some(path) => SpecSyncConfig::from_file(path)?,
        None => SpecSyncConfig::default(),
    };
    let mut config = config.apply_env(|key| std::env::var(key).ok())?;
    if let Some(root) = &cli.root {
        config.root = root.clone();
    }
    if let Some(engine) = cli.engine {
        config.engine = engine;
    }
    Ok(config)
}

/// `Ok(false)` means the command ran but found failures
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = load_config(&cli)?;
    let engine = FillEngine::new(&config);

    match cli.command {
        Commands::Generate => {
            let report = engine.generate_all().await?;
            output::print_generation(&report);
            Ok(report.all_ok())
        }
        Commands::Fill { templates } => {
            let templates = if templates.is_empty() {
                engine
                    .workspace()
                    .list_templates()?
                    .into_iter()
                    .map(|t| t.name)
                    .collect()
            } else {
                templates
            };
            let report = engine
                .fill_templates_with(&templates, output::print_outcome)
                .await?;
            output::print_summary(&report);
            Ok(report.all_ok())
        }
        Commands::Scan { template } => {
            let tokens = engine.scan_template(&template).await?;
            if tokens.is_empty() {
                println!("No tokens in {}", template);
            }
            for token in tokens {
                println!("{{{}}}", token);
            }
            Ok(true)
        }
        Commands::Validate { json } => {
            let report = ConsistencyValidator::new(&config).validate_all().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                output::print_validation(&report);
            }
            Ok(report.passed())
        }
        Commands::ExportFlat => {
            let (path, count) = engine.export_flat()?;
            println!("{} {} marker(s) -> {}", "✓".green(), count, path.display());
            Ok(true)
        }
        Commands::Flatten => {
            let data = Workspace::new(&config).ssot().load()?;
            for (key, value) in ssot::flatten(&data) {
                println!("{} = {}", key, ssot::render(&value));
            }
            Ok(true)
        }
        Commands::Discover {
            document,
            template_name,
            report,
            mapping,
        } => {
            let opts = discover::DiscoverOptions {
                template_name,
                report,
                mapping,
            };
            let summary = discover::run(&config, &document, opts)?;
            if summary.report_path.is_none() {
                print!("{}", summary.report);
            }
            Ok(true)
        }
    }
}
