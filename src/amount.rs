use std::fmt::{self, Display};
use std::ops::Neg;
use std::str::FromStr;

/// Number of decimal places kept by [`Amount`].
const SCALE_DIGITS: usize = 4;
const SCALE: i128 = 10_000;

/// Signed fixed-point money value with four decimal places.
///
/// Negative amounts are expenses, everything else is income.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Amount(i128);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmountError(String);

impl Display for AmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse amount: {}", self.0)
    }
}

impl std::error::Error for AmountError {}

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Build an amount from a whole number of units.
    pub fn from_units(units: i64) -> Self {
        Amount(i128::from(units) * SCALE)
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn abs(&self) -> Self {
        Amount(self.0.abs())
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }
}

impl Neg for Amount {
    type Output = Amount;

    fn neg(self) -> Amount {
        Amount(-self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let s = input.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };

        let (units, decimals) = match digits.split_once('.') {
            Some((units, decimals)) => (units, decimals),
            None => (digits, ""),
        };

        // ".5" and "5." are accepted, "." alone is not
        if units.is_empty() && decimals.is_empty() {
            return Err(AmountError(format!("{input:?} has no digits")));
        }
        if !units.chars().all(|c| c.is_ascii_digit())
            || !decimals.chars().all(|c| c.is_ascii_digit())
        {
            return Err(AmountError(format!("{input:?} is not a decimal number")));
        }

        // anything beyond four decimals is truncated
        let mut padded: String = decimals.chars().take(SCALE_DIGITS).collect();
        while padded.len() < SCALE_DIGITS {
            padded.push('0');
        }

        let units = if units.is_empty() { "0" } else { units };
        let value = format!("{units}{padded}")
            .parse::<i128>()
            .map_err(|e| AmountError(format!("{input:?}: {e}")))?;

        Ok(Amount(if negative { -value } else { value }))
    }
}

impl Display for Amount {
    /// Renders the shortest exact form, e.g. `-20`, `12.5`, `0.0005`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        let scale = SCALE.unsigned_abs();
        let units = magnitude / scale;
        let decimals = magnitude % scale;

        let rendered = if decimals == 0 {
            format!("{sign}{units}")
        } else {
            let decimals = format!("{decimals:0>width$}", width = SCALE_DIGITS);
            format!("{sign}{units}.{}", decimals.trim_end_matches('0'))
        };
        f.pad(&rendered)
    }
}
