//! `mtd`: compute UK property tax and submit it to HMRC under Making Tax
//! Digital.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use mtd_cli::commands::{self, Services, SubmitArgs};
use mtd_cli::input::{CompanyInput, PersonalInput, read_json};
use mtd_cli::AppConfig;
use mtd_core::fraud::ClientTelemetry;
use mtd_core::submission::Computation;
use mtd_core::TaxYear;
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mtd")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (default: config/mtd.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Calculate personal property tax
    Personal {
        /// JSON file with income, expenses and adjustments ("-" for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Tax year, e.g. 2024-25 (default: the current tax year)
        #[arg(short, long, value_parser = TaxYear::parse)]
        tax_year: Option<TaxYear>,
    },

    /// Calculate corporation tax
    Company {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long, value_parser = TaxYear::parse)]
        tax_year: Option<TaxYear>,
    },

    /// Calculate and print the HMRC payload without sending it
    Format {
        #[arg(short, long, value_enum)]
        kind: Kind,

        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long, value_parser = TaxYear::parse)]
        tax_year: TaxYear,
    },

    /// Calculate and submit to HMRC
    Submit {
        #[arg(short, long)]
        user: String,

        /// National Insurance number
        #[arg(short, long)]
        nino: String,

        #[arg(short, long, value_parser = TaxYear::parse)]
        tax_year: TaxYear,

        #[arg(short, long, value_enum)]
        kind: Kind,

        #[arg(short, long)]
        input: PathBuf,

        /// JSON file with the client's device telemetry
        #[arg(long)]
        telemetry: PathBuf,
    },

    /// Complete HMRC authorization with the code from the OAuth redirect
    Connect {
        #[arg(short, long)]
        user: String,

        #[arg(long)]
        code: String,

        #[arg(long)]
        redirect_uri: String,
    },

    /// List stored submission records
    Records {
        #[arg(short, long)]
        user: String,
    },

    /// Revoke and forget the stored HMRC authorization
    Disconnect {
        #[arg(short, long)]
        user: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    Personal,
    Company,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{text}");
    Ok(())
}

fn computation(kind: Kind, input: &Path, tax_year: TaxYear) -> Result<Computation> {
    Ok(match kind {
        Kind::Personal => {
            commands::personal_computation(&read_json::<PersonalInput>(input)?, tax_year)
        }
        Kind::Company => commands::company_computation(&read_json::<CompanyInput>(input)?, tax_year),
    })
}

fn current_tax_year() -> TaxYear {
    TaxYear::containing(Utc::now().date_naive())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    debug!(?config, "Configuration loaded");

    match cli.command {
        Command::Personal { input, tax_year } => {
            let input: PersonalInput = read_json(&input)?;
            print_json(&commands::personal(&input, tax_year.unwrap_or_else(current_tax_year)))
        }
        Command::Company { input, tax_year } => {
            let input: CompanyInput = read_json(&input)?;
            print_json(&commands::company(&input, tax_year.unwrap_or_else(current_tax_year)))
        }
        Command::Format {
            kind,
            input,
            tax_year,
        } => {
            let computation = computation(kind, &input, tax_year)?;
            print_json(&commands::format(config.vendor.clone(), &computation, tax_year)?)
        }
        Command::Submit {
            user,
            nino,
            tax_year,
            kind,
            input,
            telemetry,
        } => {
            let computation = computation(kind, &input, tax_year)?;
            let telemetry: ClientTelemetry = read_json(&telemetry)?;
            let services = Services::open(&config).await?;
            let orchestrator = services.orchestrator(&config, Services::hmrc_api(&config)?);

            let outcome = commands::submit(
                &orchestrator,
                SubmitArgs {
                    user_id: user,
                    nino,
                    tax_year,
                    computation,
                    telemetry,
                },
            )
            .await?;
            print_json(&outcome)
        }
        Command::Connect {
            user,
            code,
            redirect_uri,
        } => {
            let services = Services::open(&config).await?;
            commands::connect(&services, &user, &code, &redirect_uri).await
        }
        Command::Records { user } => {
            let repositories = commands::open_repositories(&config.database.db_config()).await?;
            print_json(&commands::records(&repositories, &user).await?)
        }
        Command::Disconnect { user } => {
            let services = Services::open(&config).await?;
            commands::disconnect(&services, &user).await
        }
    }
}
