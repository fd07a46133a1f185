use std::io::Write;

use chrono::NaiveDate;
use log::warn;

use crate::amount::Amount;
use crate::error::LedgerError;
use crate::ledger::LedgerStore;
use crate::record::{Record, HEADER};

/// Income and expense accumulated over a filter window.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Totals {
    pub income: Amount,
    /// Sum of the magnitudes of negative amounts.
    pub expense: Amount,
    /// Rows left out because their amount did not parse.
    pub skipped: usize,
}

impl Totals {
    pub fn new() -> Self {
        Totals::default()
    }

    /// Book an amount by its sign: negative is expense, anything else income.
    pub fn add(&mut self, amount: Amount) -> Result<(), LedgerError> {
        let total = if amount.is_negative() {
            &mut self.expense
        } else {
            &mut self.income
        };
        *total = total
            .checked_add(amount.abs())
            .ok_or_else(|| LedgerError::parse(None, "summary limit exceeded"))?;
        Ok(())
    }

    pub fn savings(&self) -> Amount {
        // both totals are non-negative, so the difference cannot overflow
        self.income.checked_sub(self.expense).unwrap_or_default()
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        writeln!(out, "Savings: {}", self.savings())?;
        writeln!(out, "Income: {}", self.income)?;
        writeln!(out, "Expense: {}", self.expense)?;
        if self.skipped > 0 {
            writeln!(out, "Skipped: {} row(s) with an invalid amount", self.skipped)?;
        }
        Ok(())
    }
}

/// Records in the window, ordered by date.
///
/// Equal dates keep their file order. When there is more than one record to
/// sort, any unparsable date fails the whole listing, naming the record.
pub fn list(store: &LedgerStore, from: NaiveDate, to: NaiveDate) -> Result<Vec<Record>, LedgerError> {
    let records = store.filter(from, to)?;
    if records.len() < 2 {
        return Ok(records);
    }

    let mut keyed = Vec::with_capacity(records.len());
    for record in records {
        keyed.push((record.parsed_date()?, record));
    }
    keyed.sort_by_key(|(date, _)| *date);
    Ok(keyed.into_iter().map(|(_, record)| record).collect())
}

/// Income, expense and savings over the window.
///
/// Only the sign of `Amount` decides whether a row is income or expense; the
/// `Type` column is ignored. Rows whose amount does not parse are skipped
/// with a warning.
pub fn summary(store: &LedgerStore, from: NaiveDate, to: NaiveDate) -> Result<Totals, LedgerError> {
    let mut totals = Totals::new();
    for record in store.filter(from, to)? {
        match record.parsed_amount() {
            Ok(amount) => totals.add(amount)?,
            Err(err) => {
                warn!("skipping row due to invalid amount: {err}");
                totals.skipped += 1;
            }
        }
    }
    Ok(totals)
}

/// Render records as a grid under the ledger header.
pub fn write_table<W: Write>(out: &mut W, records: &[Record]) -> std::io::Result<()> {
    let rows: Vec<[String; 5]> = records.iter().map(Record::cells).collect();

    let mut widths = HEADER.map(|name| name.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let rule = |fill: char| {
        let mut line = String::from("+");
        for width in &widths {
            line.extend(std::iter::repeat(fill).take(width + 2));
            line.push('+');
        }
        line
    };

    writeln!(out, "{}", rule('-'))?;
    write_row(out, &HEADER.map(String::from), &widths)?;
    writeln!(out, "{}", rule('='))?;
    for row in &rows {
        write_row(out, row, &widths)?;
    }
    if !rows.is_empty() {
        writeln!(out, "{}", rule('-'))?;
    }
    Ok(())
}

fn write_row<W: Write>(out: &mut W, cells: &[String; 5], widths: &[usize; 5]) -> std::io::Result<()> {
    write!(out, "|")?;
    for (cell, &width) in cells.iter().zip(widths) {
        write!(out, " {cell:<width$} |")?;
    }
    writeln!(out)
}
