use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "valutatrade")]
#[command(about = "Valutatrade Hub - console currency wallet")]
#[command(after_help = "Run without arguments to start the interactive prompt.")]
pub struct Cli {
    /// Path to a TOML configuration file (default: ./valutatrade.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Command {
    /// Register a new user
    Register(Credentials),
    /// Log in and start a session
    Login(Credentials),
    /// End the current session
    Logout,
    /// Show the current session
    Status,
    /// Show the portfolio valued in a base currency
    ShowPortfolio {
        /// Base currency (default from configuration)
        #[arg(short, long)]
        base: Option<String>,
    },
    /// Buy a currency with USD
    Buy(TradeArgs),
    /// Sell a currency for USD
    Sell(TradeArgs),
    /// Show the exchange rate between two currencies
    GetRate {
        #[arg(short = 'f', long = "from")]
        from_currency: String,
        #[arg(short = 't', long = "to")]
        to_currency: String,
    },
    /// Refresh the rate cache from the external APIs
    UpdateRates,
    /// List cached rates
    ShowRates {
        /// Only pairs involving this currency
        #[arg(short, long)]
        currency: Option<String>,
    },
    /// List known currency codes
    Currencies,
    /// Change the password of the logged in user
    ChangePassword {
        #[arg(long)]
        old: String,
        #[arg(long)]
        new: String,
    },
    /// Copy all data files into the backups directory
    Backup,
}

#[derive(Debug, Clone, PartialEq, Args)]
pub struct Credentials {
    #[arg(short, long)]
    pub username: String,
    #[arg(short, long)]
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Args)]
pub struct TradeArgs {
    /// Currency code, e.g. BTC
    #[arg(short, long)]
    pub currency: String,
    /// Amount of the currency to trade
    #[arg(short, long, allow_negative_numbers = true)]
    pub amount: f64,
}
