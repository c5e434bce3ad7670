//! Cell parsers for spreadsheet exports.
//!
//! Everything here is total: a cell either yields a value, is reported as
//! missing, or is reported as invalid with the offending text. Nothing
//! panics and nothing silently turns into zero.

use std::sync::OnceLock;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::CellValue;
use crate::period::Period;
use crate::text::fold;

// ── ParsedCell ────────────────────────────────────────────────────────────────

/// Outcome of interpreting one cell.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedCell<T> {
    Value(T),
    /// The cell was blank.
    Missing,
    /// The cell had content that could not be interpreted; carries that content.
    Invalid(String),
}

impl<T> ParsedCell<T> {
    pub fn value(self) -> Option<T> {
        match self {
            ParsedCell::Value(v) => Some(v),
            _ => None,
        }
    }
}

fn describe(cell: &CellValue) -> String {
    match cell {
        CellValue::Text(s) | CellValue::Malformed(s) => s.clone(),
        CellValue::Number(n) => n.to_string(),
        CellValue::Date(d) => d.to_string(),
        CellValue::Empty => String::new(),
    }
}

// ── NumberParser ──────────────────────────────────────────────────────────────

/// Which character separates the decimals when a number carries only one
/// kind of separator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecimalConvention {
    /// `1.234,56` style (es-CO, es-ES, de-DE).
    #[default]
    Comma,
    /// `1,234.56` style (en-US).
    Dot,
}

impl DecimalConvention {
    fn decimal_char(self) -> char {
        match self {
            DecimalConvention::Comma => ',',
            DecimalConvention::Dot => '.',
        }
    }
}

/// Parses locale-formatted numbers.
pub struct NumberParser;

impl NumberParser {
    /// Interpret a typed cell as a number.
    pub fn parse_cell(cell: &CellValue, convention: DecimalConvention) -> ParsedCell<f64> {
        match cell {
            CellValue::Empty => ParsedCell::Missing,
            CellValue::Number(n) if n.is_finite() => ParsedCell::Value(*n),
            CellValue::Text(s) => match Self::parse_str(s, convention) {
                Some(v) => ParsedCell::Value(v),
                None if s.trim().is_empty() => ParsedCell::Missing,
                None => ParsedCell::Invalid(s.clone()),
            },
            other => ParsedCell::Invalid(describe(other)),
        }
    }

    /// Parse a number written with spreadsheet conventions.
    ///
    /// * Surrounding whitespace, inner spaces and currency symbols are ignored.
    /// * `(100)` negates.
    /// * A trailing `%` divides by 100.
    /// * When both `.` and `,` appear, the one appearing last is the decimal
    ///   separator and the other is the thousands separator.
    /// * When one separator appears several times it is a thousands separator.
    /// * A single separator follows `convention`, except that a "thousands"
    ///   separator not followed by exactly three digits is read as decimal.
    ///
    /// ```
    /// use kpi_core::data_processors::{DecimalConvention, NumberParser};
    ///
    /// let c = DecimalConvention::Comma;
    /// assert_eq!(NumberParser::parse_str("1.234,56", c), Some(1234.56));
    /// assert_eq!(NumberParser::parse_str("(100)", c), Some(-100.0));
    /// assert_eq!(NumberParser::parse_str("15%", c), Some(0.15));
    /// ```
    pub fn parse_str(raw: &str, convention: DecimalConvention) -> Option<f64> {
        let mut s: String = raw
            .chars()
            .filter(|c| !c.is_whitespace() && !matches!(c, '$' | '€' | '£' | '\u{a0}'))
            .collect();
        if s.is_empty() {
            return None;
        }

        let mut negative = false;
        if s.starts_with('(') && s.ends_with(')') && s.len() > 2 {
            negative = true;
            s = s[1..s.len() - 1].to_string();
        }

        let mut percent = false;
        if let Some(stripped) = s.strip_suffix('%') {
            percent = true;
            s = stripped.to_string();
        }

        if let Some(stripped) = s.strip_prefix('-') {
            negative = !negative;
            s = stripped.to_string();
        } else if let Some(stripped) = s.strip_prefix('+') {
            s = stripped.to_string();
        }

        if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',') {
            return None;
        }
        if !s.chars().any(|c| c.is_ascii_digit()) {
            return None;
        }

        let canonical = Self::resolve_separators(&s, convention)?;
        let mut value: f64 = canonical.parse().ok()?;
        if percent {
            value /= 100.0;
        }
        if negative {
            value = -value;
        }
        value.is_finite().then_some(value)
    }

    /// Rewrite `s` (digits and separators only) into a `str::parse`-able form.
    fn resolve_separators(s: &str, convention: DecimalConvention) -> Option<String> {
        let last_dot = s.rfind('.');
        let last_comma = s.rfind(',');

        let (thousands, decimal) = match (last_dot, last_comma) {
            (None, None) => return Some(s.to_string()),
            (Some(d), Some(c)) => {
                if d > c {
                    (',', Some('.'))
                } else {
                    ('.', Some(','))
                }
            }
            (Some(_), None) | (None, Some(_)) => {
                let sep = if last_dot.is_some() { '.' } else { ',' };
                let occurrences = s.matches(sep).count();
                if occurrences > 1 {
                    (sep, None)
                } else if sep == convention.decimal_char() {
                    (other_separator(sep), Some(sep))
                } else {
                    let tail = s.rsplit(sep).next().unwrap_or("");
                    if tail.len() == 3 {
                        (sep, None)
                    } else {
                        (other_separator(sep), Some(sep))
                    }
                }
            }
        };

        let (int_part, frac_part) = match decimal {
            Some(d) => {
                let idx = s.rfind(d)?;
                (&s[..idx], Some(&s[idx + 1..]))
            }
            None => (s, None),
        };

        if let Some(frac) = frac_part {
            if frac.contains(thousands) {
                return None;
            }
        }
        if !valid_grouping(int_part, thousands) {
            return None;
        }

        let mut out: String = int_part.chars().filter(|c| *c != thousands).collect();
        if out.is_empty() {
            out.push('0');
        }
        if let Some(frac) = frac_part {
            out.push('.');
            out.push_str(frac);
        }
        Some(out)
    }
}

fn other_separator(sep: char) -> char {
    if sep == '.' {
        ','
    } else {
        '.'
    }
}

/// Every group after the first must have exactly three digits.
fn valid_grouping(int_part: &str, thousands: char) -> bool {
    let mut groups = int_part.split(thousands);
    let first = groups.next().unwrap_or("");
    if first.is_empty() && int_part.contains(thousands) {
        return false;
    }
    groups.all(|g| g.len() == 3 && g.chars().all(|c| c.is_ascii_digit()))
}

// ── PeriodParser ──────────────────────────────────────────────────────────────

/// Excel's day zero for serial dates (accounts for the 1900 leap-year bug).
fn excel_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or(NaiveDate::MIN)
}

/// Serial day numbers treated as Excel dates (1954-10-03 ..= 2119-01-10).
const EXCEL_SERIAL_RANGE: std::ops::RangeInclusive<i64> = 20_000..=80_000;

struct PeriodPatterns {
    year_month: Regex,
    month_year: Regex,
    compact: Regex,
    name_year: Regex,
    year_name: Regex,
}

fn patterns() -> &'static PeriodPatterns {
    static PATTERNS: OnceLock<PeriodPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| PeriodPatterns {
        year_month: Regex::new(r"^(\d{4})\s*[-/.]\s*(\d{1,2})$").expect("valid regex"),
        month_year: Regex::new(r"^(\d{1,2})\s*[-/.]\s*(\d{4})$").expect("valid regex"),
        compact: Regex::new(r"^(\d{4})(\d{2})$").expect("valid regex"),
        name_year: Regex::new(r"^([a-z]+)\.?\s*[-/.]?\s*(?:(?:de|del)\s+)?(\d{4}|\d{2})$")
            .expect("valid regex"),
        year_name: Regex::new(r"^(\d{4})\s*[-/.]?\s*([a-z]+)$").expect("valid regex"),
    })
}

/// Resolve a Spanish or English month name or abbreviation to `1..=12`.
///
/// Input is expected lower-case and accent-free (see [`crate::text::fold`]).
pub fn month_from_name(name: &str) -> Option<u32> {
    let month = match name.trim_end_matches('.') {
        "ene" | "enero" | "jan" | "january" => 1,
        "feb" | "febrero" | "february" => 2,
        "mar" | "marzo" | "march" => 3,
        "abr" | "abril" | "apr" | "april" => 4,
        "may" | "mayo" => 5,
        "jun" | "junio" | "june" => 6,
        "jul" | "julio" | "july" => 7,
        "ago" | "agosto" | "aug" | "august" => 8,
        "sep" | "sept" | "set" | "septiembre" | "setiembre" | "september" => 9,
        "oct" | "octubre" | "october" => 10,
        "nov" | "noviembre" | "november" => 11,
        "dic" | "diciembre" | "dec" | "december" => 12,
        _ => return None,
    };
    Some(month)
}

/// Two-digit years are read as 20xx.
fn expand_year(y: &str) -> Option<i32> {
    let year: i32 = y.parse().ok()?;
    Some(if y.len() == 2 { 2000 + year } else { year })
}

/// Parses the many date spellings found in exports into a [`Period`].
pub struct PeriodParser;

impl PeriodParser {
    /// Interpret a typed cell as a period.
    pub fn parse_cell(cell: &CellValue) -> ParsedCell<Period> {
        match cell {
            CellValue::Empty => ParsedCell::Missing,
            CellValue::Date(d) => ParsedCell::Value(Period::from_date(*d)),
            CellValue::Number(n) => match Self::from_number(*n) {
                Some(p) => ParsedCell::Value(p),
                None => ParsedCell::Invalid(n.to_string()),
            },
            CellValue::Text(s) => match Self::parse_str(s) {
                Some(p) => ParsedCell::Value(p),
                None => ParsedCell::Invalid(s.clone()),
            },
            CellValue::Malformed(s) => ParsedCell::Invalid(s.clone()),
        }
    }

    /// Parse a textual period.
    ///
    /// Accepts `YYYY-MM`, `YYYY/MM`, `MM/YYYY`, `MM-YYYY`, `YYYYMM`,
    /// month-name + year (`Ene-2024`, `enero de 2024`, `Jan 24`),
    /// year + month-name, and full dates with or without a time part
    /// (`YYYY-MM-DD`, `DD/MM/YYYY`).
    ///
    /// ```
    /// use kpi_core::data_processors::PeriodParser;
    ///
    /// for s in ["Ene-2024", "2024-01", "01/2024"] {
    ///     assert_eq!(PeriodParser::parse_str(s).unwrap().to_string(), "2024-01");
    /// }
    /// ```
    pub fn parse_str(raw: &str) -> Option<Period> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let lowered = crate::text::strip_accents(trimmed).to_lowercase();
        let pats = patterns();

        if let Some(c) = pats.year_month.captures(&lowered) {
            return Period::new(c[1].parse().ok()?, c[2].parse().ok()?);
        }
        if let Some(c) = pats.month_year.captures(&lowered) {
            return Period::new(c[2].parse().ok()?, c[1].parse().ok()?);
        }
        if let Some(c) = pats.compact.captures(&lowered) {
            return Period::new(c[1].parse().ok()?, c[2].parse().ok()?);
        }
        if let Some(c) = pats.name_year.captures(&lowered) {
            if let Some(month) = month_from_name(&c[1]) {
                return Period::new(expand_year(&c[2])?, month);
            }
        }
        if let Some(c) = pats.year_name.captures(&lowered) {
            if let Some(month) = month_from_name(&c[2]) {
                return Period::new(c[1].parse().ok()?, month);
            }
        }

        Self::parse_full_date(trimmed)
    }

    /// Build a period from separate year and month cells.
    ///
    /// The month may be numeric (`1`, `"01"`, `1.0`) or a month name.
    pub fn from_year_month(year: &CellValue, month: &CellValue) -> ParsedCell<Period> {
        if year.is_empty() || month.is_empty() {
            return ParsedCell::Missing;
        }
        let y = whole_number(year);
        let m = whole_number(month).or_else(|| {
            month
                .as_label()
                .and_then(|label| month_from_name(&fold(&label)))
                .map(i64::from)
        });
        match (y, m) {
            (Some(y), Some(m)) => {
                let period = i32::try_from(y)
                    .ok()
                    .zip(u32::try_from(m).ok())
                    .and_then(|(y, m)| Period::new(y, m));
                match period {
                    Some(p) => ParsedCell::Value(p),
                    None => ParsedCell::Invalid(format!("{}/{}", y, m)),
                }
            }
            _ => ParsedCell::Invalid(format!("{}/{}", describe(year), describe(month))),
        }
    }

    /// Numeric cells: `YYYYMM` or an Excel serial date.
    fn from_number(n: f64) -> Option<Period> {
        if !n.is_finite() || n.fract() != 0.0 {
            return None;
        }
        let whole = n as i64;
        if (100_001..=999_912).contains(&whole) {
            return Period::new((whole / 100) as i32, (whole % 100) as u32);
        }
        if EXCEL_SERIAL_RANGE.contains(&whole) {
            let date = excel_epoch().checked_add_signed(Duration::days(whole))?;
            return Some(Period::from_date(date));
        }
        None
    }

    fn parse_full_date(s: &str) -> Option<Period> {
        const DATETIME_FORMATS: &[&str] = &[
            "%Y-%m-%d %H:%M:%S",
            "%Y-%m-%dT%H:%M:%S",
            "%Y-%m-%d %H:%M:%S%.f",
            "%d/%m/%Y %H:%M:%S",
            "%d/%m/%Y %H:%M",
        ];
        const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"];

        for fmt in DATETIME_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                return Some(Period::from_date(dt.date()));
            }
        }
        for fmt in DATE_FORMATS {
            if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
                return Some(Period::from_date(d));
            }
        }
        None
    }
}

/// A whole number from a numeric or text cell (`"2024"`, `"1.0"`, `2024.0`).
fn whole_number(cell: &CellValue) -> Option<i64> {
    let n = match cell {
        CellValue::Number(n) => *n,
        CellValue::Text(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (n.is_finite() && n.fract() == 0.0).then_some(n as i64)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
