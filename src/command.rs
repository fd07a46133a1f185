use std::io::Write;

use chrono::NaiveDate;
use log::info;

use crate::amount::Amount;
use crate::error::{LedgerError, ValidationError};
use crate::ledger::LedgerStore;
use crate::record::{Kind, Record};
use crate::report::{self, Totals};

/// How many records are echoed back after `spend` or `deposit`.
const RECENT_RECORDS: usize = 5;

/// One resolved command with its arguments already typed and defaulted.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Spend {
        amount: Amount,
        description: String,
        date: NaiveDate,
    },
    Deposit {
        amount: Amount,
        description: String,
        date: NaiveDate,
    },
    Update {
        id: u32,
        field: String,
        value: String,
    },
    List {
        from: NaiveDate,
        to: NaiveDate,
    },
    Summary {
        from: NaiveDate,
        to: NaiveDate,
    },
    Delete {
        id: u32,
    },
}

/// What a command hands back for display.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Recorded { record: Record, recent: Vec<Record> },
    Updated(Record),
    Deleted(Record),
    Listing(Vec<Record>),
    Summary(Totals),
}

impl Command {
    pub fn execute(self, store: &LedgerStore) -> Result<Outcome, LedgerError> {
        store.ensure_initialized()?;

        match self {
            Command::Spend {
                amount,
                description,
                date,
            } => {
                non_negative(amount)?;
                record(store, date, &description, -amount, Kind::Expense)
            }
            Command::Deposit {
                amount,
                description,
                date,
            } => {
                non_negative(amount)?;
                record(store, date, &description, amount, Kind::Income)
            }
            Command::Update { id, field, value } => {
                let updated = store.update(id, &field, &value)?;
                info!("updated {field} of record {id}");
                Ok(Outcome::Updated(updated))
            }
            Command::List { from, to } => Ok(Outcome::Listing(report::list(store, from, to)?)),
            Command::Summary { from, to } => Ok(Outcome::Summary(report::summary(store, from, to)?)),
            Command::Delete { id } => {
                let removed = store.delete(id)?;
                info!("deleted record {id}");
                Ok(Outcome::Deleted(removed))
            }
        }
    }
}

fn non_negative(amount: Amount) -> Result<(), ValidationError> {
    if amount.is_negative() {
        return Err(ValidationError::NegativeAmount(amount.to_string()));
    }
    Ok(())
}

fn record(
    store: &LedgerStore,
    date: NaiveDate,
    description: &str,
    amount: Amount,
    kind: Kind,
) -> Result<Outcome, LedgerError> {
    let record = Record::new(store.next_id()?, date, description, amount, kind);
    store.append(&record)?;
    info!("recorded {kind} {} as record {}", record.amount, record.id);

    let recent = store.tail(RECENT_RECORDS)?;
    Ok(Outcome::Recorded { record, recent })
}

impl Outcome {
    pub fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        match self {
            Outcome::Recorded { recent, .. } => {
                writeln!(out, "The last five records added:")?;
                report::write_table(out, recent)
            }
            Outcome::Updated(record) => {
                writeln!(out, "Updated record {}:", record.id)?;
                report::write_table(out, std::slice::from_ref(record))
            }
            Outcome::Deleted(record) => writeln!(
                out,
                "Deleted record {} ({}); later records were renumbered.",
                record.id, record.description
            ),
            Outcome::Listing(records) => report::write_table(out, records),
            Outcome::Summary(totals) => totals.write_to(out),
        }
    }
}
