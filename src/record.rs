use std::fmt::Display;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::error::{LedgerError, ValidationError};

/// Header row of every ledger file, in column order.
pub const HEADER: [&str; 5] = ["ID", "Date", "Description", "Amount", "Type"];

pub const DEFAULT_DESCRIPTION: &str = "Unspecified";

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse an ISO 8601 calendar date (`YYYY-MM-DD`).
pub fn parse_date(value: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| ValidationError::MalformedDate(value.to_owned()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Expense,
    Income,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Expense => "Expense",
            Kind::Income => "Income",
        }
    }
}

impl Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Columns that can be edited in place. `ID` is positional and never editable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Date,
    Description,
    Amount,
    Type,
}

impl Field {
    /// Position of the column in a stored row.
    pub fn column(&self) -> usize {
        match self {
            Field::Date => 1,
            Field::Description => 2,
            Field::Amount => 3,
            Field::Type => 4,
        }
    }
}

impl FromStr for Field {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Date" => Ok(Field::Date),
            "Description" => Ok(Field::Description),
            "Amount" => Ok(Field::Amount),
            "Type" => Ok(Field::Type),
            _ => Err(ValidationError::UnknownField(s.to_owned())),
        }
    }
}

/// One row of the ledger.
///
/// Everything but the id is kept as the text found on disk: a hand edit or an
/// `update` may leave a cell that no longer parses, and only the operations
/// that need a typed value (filtering, sorting, summing) get to complain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "ID")]
    pub id: u32,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Amount")]
    pub amount: String,
    #[serde(rename = "Type")]
    pub kind: String,
}

impl Record {
    pub fn new(id: u32, date: NaiveDate, description: &str, amount: Amount, kind: Kind) -> Self {
        Record {
            id,
            date: date.format(DATE_FORMAT).to_string(),
            description: description.to_owned(),
            amount: amount.to_string(),
            kind: kind.as_str().to_owned(),
        }
    }

    pub fn parsed_date(&self) -> Result<NaiveDate, LedgerError> {
        parse_date(&self.date)
            .map_err(|_| LedgerError::parse(Some(self.id), format!("invalid date {:?}", self.date)))
    }

    pub fn parsed_amount(&self) -> Result<Amount, LedgerError> {
        self.amount
            .parse::<Amount>()
            .map_err(|e| LedgerError::parse(Some(self.id), e.to_string()))
    }

    /// Replace a single cell with `value`.
    pub fn set(&mut self, field: Field, value: &str) {
        let cell = match field {
            Field::Date => &mut self.date,
            Field::Description => &mut self.description,
            Field::Amount => &mut self.amount,
            Field::Type => &mut self.kind,
        };
        *cell = value.to_owned();
    }

    /// Cells in column order, for rendering.
    pub fn cells(&self) -> [String; 5] {
        [
            self.id.to_string(),
            self.date.clone(),
            self.description.clone(),
            self.amount.clone(),
            self.kind.clone(),
        ]
    }
}
