use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use stencil::config::{BuildConfig, CONFIG_FILE};
use stencil::css::{self, ClassMap};
use stencil::{Builder, Error};

#[derive(Parser)]
#[command(name = "stencil", version, about = "Compile component libraries into templates, pages and stylesheets")]
struct Cli {
    /// Build configuration; defaults apply when the file does not exist
    #[arg(short, long, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every build stage
    Build,
    /// Check the props map against the class map
    Lint,
    /// Extract stylesheets from markup files
    Extract {
        /// Directories to scan
        #[arg(required = true)]
        dirs: Vec<PathBuf>,
        /// Output directory; defaults to `<out_dir>/css`
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

async fn load_config(path: &Path) -> Result<BuildConfig, Error> {
    if path.exists() {
        return Ok(BuildConfig::load(path).await?);
    }
    log::debug!("{} not found; using defaults", path.display());
    Ok(BuildConfig::default())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Error> {
    let text = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;
    println!("{}", text);
    Ok(())
}

async fn run(cli: Cli) -> Result<bool, Error> {
    let config = load_config(&cli.config).await?;

    match cli.command {
        Command::Build => {
            let builder = Builder::new(config);
            let logger = builder.events().spawn_logger();
            let report = builder.build().await;
            drop(builder);
            let _ = logger.await;

            let report = report?;
            if cli.json {
                print_json(&report)?;
            } else {
                for diagnostic in report.pipeline.diagnostics() {
                    eprintln!("{}: {}", diagnostic.file, diagnostic.message);
                }
                println!(
                    "{} stages, {} files written",
                    report.pipeline.stages.len(),
                    report.pipeline.written().count()
                );
            }
            let clean = report.pipeline.diagnostics().next().is_none();
            Ok(clean)
        }
        Command::Lint => {
            let result = Builder::new(config).lint().await?;
            if cli.json {
                print_json(&result)?;
            } else {
                for invalid in &result.invalid_prop_values {
                    println!(
                        "invalid: {}=\"{}\" (missing class \"{}\")",
                        invalid.property, invalid.value, invalid.expected_token
                    );
                }
                for duplicate in &result.duplicates {
                    println!(
                        "duplicate: {}=\"{}\" listed {} times",
                        duplicate.property, duplicate.value, duplicate.count
                    );
                }
                for typo in &result.typos {
                    println!("typo? \"{}\" -> \"{}\"", typo.token, typo.suggestion);
                }
                for invalid in &result.invalid_defaults {
                    println!(
                        "invalid default: {}=\"{}\" is not an allowed value",
                        invalid.property, invalid.default
                    );
                }
                for (property, variant) in &result.defaults {
                    println!("default: {}=\"{}\"", property, variant);
                }
                for missing in &result.missing_in_props {
                    println!("unused class: {}", missing);
                }
                println!(
                    "{} ({}% coverage)",
                    if result.synced { "synced" } else { "out of sync" },
                    result.stats.coverage
                );
            }
            Ok(result.synced)
        }
        Command::Extract { dirs, out } => {
            let class_map = match &config.class_map {
                Some(path) => css::load_class_map(path).await?,
                None => ClassMap::new(),
            };
            let out_dir = out.unwrap_or_else(|| config.css_dir());
            let report = css::extract(&dirs, &out_dir, &class_map, &config.extract_options()?).await?;
            if cli.json {
                print_json(&report)?;
            } else {
                println!(
                    "{} files, {} rules -> {}",
                    report.files_scanned,
                    report.rules,
                    out_dir.display()
                );
                for token in &report.unknown_tokens {
                    eprintln!("unknown class: {}", token);
                }
            }
            Ok(report.unknown_tokens.is_empty())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Cli::parse()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            log::error!("{}", e);
            ExitCode::from(2)
        }
    }
}
