use std::io;
use std::path::PathBuf;

use chrono::{Local, NaiveDate};
use clap::{CommandFactory, Parser, Subcommand};
use env_logger::Env;
use log::debug;

use crate::amount::Amount;
use crate::command::Command;
use crate::error::LedgerError;
use crate::ledger::LedgerStore;
use crate::record::{parse_date, DEFAULT_DESCRIPTION};

/// Keep records of your finance.
#[derive(Debug, Parser)]
#[command(name = "finance-tracker", version)]
pub struct Cli {
    /// The ledger CSV file
    #[arg(long, env = "FINANCE_TRACKER_FILE", default_value = "finance.csv", global = true)]
    pub file: PathBuf,

    #[command(subcommand)]
    pub mode: Option<Mode>,
}

#[derive(Debug, Subcommand)]
pub enum Mode {
    /// Record an expense
    Spend {
        /// expense amount
        #[arg(allow_negative_numbers = true)]
        amount: Amount,
        /// description of expense origin
        #[arg(long, default_value = DEFAULT_DESCRIPTION)]
        desc: String,
        /// date of spending, defaults to today
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
    },
    /// Record an income
    Deposit {
        /// deposit amount
        #[arg(allow_negative_numbers = true)]
        amount: Amount,
        /// description of income origin
        #[arg(long, default_value = DEFAULT_DESCRIPTION)]
        desc: String,
        /// date of deposit, defaults to today
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
    },
    /// Change one field of a record
    Update {
        /// finance record id
        id: u32,
        /// name of the field to change: Date, Description, Amount or Type
        field: String,
        /// value that will replace the cell of interest
        #[arg(allow_hyphen_values = true)]
        value: String,
    },
    /// Show records in a date window, oldest first
    List {
        /// first day of the window, defaults to today
        #[arg(long = "from_date", value_parser = parse_date)]
        from_date: Option<NaiveDate>,
        /// last day of the window, defaults to today
        #[arg(long = "to_date", value_parser = parse_date)]
        to_date: Option<NaiveDate>,
    },
    /// Report income, expense and savings in a date window
    Summary {
        /// first day of the window, defaults to today
        #[arg(long = "from_date", value_parser = parse_date)]
        from_date: Option<NaiveDate>,
        /// last day of the window, defaults to today
        #[arg(long = "to_date", value_parser = parse_date)]
        to_date: Option<NaiveDate>,
    },
    /// Remove a record; later ids shift down by one
    Delete {
        /// finance record id
        id: u32,
    },
}

impl Mode {
    /// Resolve defaults against `today`.
    pub fn into_command(self, today: NaiveDate) -> Command {
        match self {
            Mode::Spend { amount, desc, date } => Command::Spend {
                amount,
                description: desc,
                date: date.unwrap_or(today),
            },
            Mode::Deposit { amount, desc, date } => Command::Deposit {
                amount,
                description: desc,
                date: date.unwrap_or(today),
            },
            Mode::Update { id, field, value } => Command::Update { id, field, value },
            Mode::List { from_date, to_date } => Command::List {
                from: from_date.unwrap_or(today),
                to: to_date.unwrap_or(today),
            },
            Mode::Summary { from_date, to_date } => Command::Summary {
                from: from_date.unwrap_or(today),
                to: to_date.unwrap_or(today),
            },
            Mode::Delete { id } => Command::Delete { id },
        }
    }
}

pub fn the_app() -> Result<(), LedgerError> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let Some(mode) = cli.mode else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let store = LedgerStore::new(cli.file);
    debug!("using ledger {}", store.path().display());

    let today = Local::now().date_naive();
    let outcome = mode.into_command(today).execute(&store)?;

    let stdout = io::stdout();
    outcome.write_to(&mut stdout.lock())?;
    Ok(())
}
