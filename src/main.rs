use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use rust_decimal::Decimal;
use spendwatch::cli::show::ShowArgs;
use spendwatch::core::allowance::AllowanceDraft;
use spendwatch::core::log::init_logging;
use spendwatch::core::model::{Currency, Metric};

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for spendwatch::AppCommand {
    fn from(cmd: Commands) -> spendwatch::AppCommand {
        match cmd {
            Commands::Show {
                metric,
                currency,
                fiat,
            } => spendwatch::AppCommand::Show(ShowArgs {
                metric,
                currency,
                fiat_code: fiat,
            }),
            Commands::Allowance {
                funds,
                hosts,
                period,
                renew_window,
            } => spendwatch::AppCommand::Allowance(AllowanceDraft {
                funds,
                hosts,
                period,
                renew_window,
            }),
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Display unit price, spending and purchasable quantity for a metric
    Show {
        /// Metric to display: upload, download, storage, contract_formation or unspent
        #[arg(short, long)]
        metric: Option<Metric>,
        /// Display currency: native or fiat (remembered)
        #[arg(long)]
        currency: Option<Currency>,
        /// Fiat currency code used for conversion, e.g. EUR (remembered)
        #[arg(long)]
        fiat: Option<String>,
    },
    /// Update the renter allowance; omitted fields keep their current values
    Allowance {
        /// Total funds in the base currency
        #[arg(long)]
        funds: Option<Decimal>,
        /// Number of hosts to form contracts with
        #[arg(long)]
        hosts: Option<u64>,
        /// Contract period in blocks
        #[arg(long)]
        period: Option<u64>,
        /// Renew window in blocks
        #[arg(long)]
        renew_window: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => spendwatch::cli::setup::setup(),
        Some(cmd) => spendwatch::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
