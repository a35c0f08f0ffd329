//! INDI number syntax: parsing and printf/sexagesimal formatting
//!
//! Member values travel as strings; this module converts between those
//! strings and `f64` on demand. A format of `%<w>.<f>m` selects
//! sexagesimal output, anything else is treated as a C printf
//! specifier.

use crate::error::{Error, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt::{self, Write};

lazy_static! {
    static ref SEXAGESIMAL_RE: Regex = Regex::new(r"^%(\d+)\.(\d+)m$").unwrap();
    static ref PRINTF_RE: Regex = Regex::new(r"^%(0?)(\d*)(?:\.(\d+))?([dfeg])$").unwrap();
}

/// Number format specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NumberFormat {
    /// Printf-style format (e.g. `%7.2f`)
    Printf(String),
    /// Sexagesimal format (e.g. `%9.6m` for degrees)
    Sexagesimal {
        /// Total field width, padded left with spaces
        width: usize,
        /// Fraction selector: 3, 5, 6, 8 or 9..=14
        fraction: usize,
    },
}

impl fmt::Display for NumberFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumberFormat::Printf(spec) => write!(f, "{}", spec),
            NumberFormat::Sexagesimal { width, fraction } => write!(f, "%{}.{}m", width, fraction),
        }
    }
}

impl NumberFormat {
    /// Parse a format attribute into a `NumberFormat`.
    pub fn parse(format: &str) -> Result<Self> {
        if let Some(caps) = SEXAGESIMAL_RE.captures(format) {
            let width = caps[1]
                .parse()
                .map_err(|_| Error::InvalidArgument(format!("bad sexagesimal width in {format}")))?;
            let fraction = caps[2]
                .parse()
                .map_err(|_| Error::InvalidArgument(format!("bad sexagesimal fraction in {format}")))?;
            if !matches!(fraction, 3 | 5 | 6 | 8 | 9..=14) {
                return Err(Error::InvalidArgument(format!(
                    "sexagesimal fraction {fraction} not one of 3,5,6,8,9..14"
                )));
            }
            return Ok(NumberFormat::Sexagesimal { width, fraction });
        }
        if !PRINTF_RE.is_match(format) {
            return Err(Error::InvalidArgument(format!("unsupported number format {format}")));
        }
        Ok(NumberFormat::Printf(format.to_string()))
    }

    /// Format a value according to this specification.
    pub fn format(&self, value: f64) -> Result<String> {
        match self {
            NumberFormat::Printf(spec) => format_printf(spec, value),
            NumberFormat::Sexagesimal { width, fraction } => {
                format_sexagesimal(value, *width, *fraction)
            }
        }
    }
}

/// Parse a decimal or sexagesimal number string into a float.
///
/// Accepted forms: `[-]d[.f]`, `[-]d:m[:s]`, `[-]d m[ s]`, `[-]d;m[;s]`.
/// Missing trailing parts default to zero.
pub fn parse_number(s: &str) -> Result<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(Error::Parse("empty number value".to_string()));
    }
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    // exactly one separator kind per value
    let separator = [' ', ':', ';'].into_iter().find(|c| body.contains(*c));
    let parts: Vec<&str> = match separator {
        Some(sep) => body.split(sep).collect(),
        None => vec![body],
    };
    if parts.len() > 3 {
        return Err(Error::Parse(format!("too many sexagesimal parts in {s}")));
    }
    let mut numbers = [0.0f64; 3];
    for (slot, part) in numbers.iter_mut().zip(&parts) {
        if !part.is_empty() {
            *slot = part
                .parse()
                .map_err(|_| Error::Parse(format!("invalid number part {part} in {s}")))?;
        }
    }
    let value = numbers[0] + numbers[1] / 60.0 + numbers[2] / 3600.0;
    Ok(if negative { -value } else { value })
}

fn format_printf(spec: &str, value: f64) -> Result<String> {
    let caps = PRINTF_RE
        .captures(spec)
        .ok_or_else(|| Error::InvalidArgument(format!("unsupported number format {spec}")))?;
    let zero = !caps[1].is_empty();
    let width: usize = caps[2].parse().unwrap_or(0);
    let precision: Option<usize> = caps.get(3).map(|m| m.as_str().parse().unwrap_or(0));
    let conv = &caps[4];
    let body = match conv {
        // C printf %d truncates toward zero
        "d" => format!("{}", value.trunc() as i64),
        "e" => format!("{:.*e}", precision.unwrap_or(6), value),
        // %g drops trailing zeros, close enough to the C behavior for
        // the precisions INDI drivers actually use
        "g" => {
            let s = format!("{}", value);
            match precision {
                Some(p) if s.len() > p + 1 => format!("{:.*}", p, value),
                _ => s,
            }
        }
        _ => format!("{:.*}", precision.unwrap_or(6), value),
    };
    if body.len() >= width {
        return Ok(body);
    }
    if zero {
        if let Some(rest) = body.strip_prefix('-') {
            return Ok(format!("-{:0>width$}", rest, width = width - 1));
        }
        return Ok(format!("{:0>width$}", body, width = width));
    }
    Ok(format!("{:>width$}", body, width = width))
}

fn format_sexagesimal(value: f64, width: usize, fraction: usize) -> Result<String> {
    let negative = value < 0.0;
    let value = value.abs();
    let degrees = value.trunc();
    let minutes_float = (value - degrees) * 60.0;
    let minutes = minutes_float.trunc();
    let seconds = (minutes_float - minutes) * 60.0;

    let mut body = String::with_capacity(width);
    if negative {
        body.push('-');
    }
    write!(body, "{}:", degrees as i64)?;
    match fraction {
        3 => write!(body, "{:02.0}", minutes_float)?,
        5 => write!(body, "{:04.1}", minutes_float)?,
        6 => write!(body, "{:02}:{:02.0}", minutes as i64, seconds)?,
        8 => write!(body, "{:02}:{:04.1}", minutes as i64, seconds)?,
        9..=14 => write!(body, "{:02}:{:05.2}", minutes as i64, seconds)?,
        _ => {
            return Err(Error::InvalidArgument(format!(
                "sexagesimal fraction {fraction} not one of 3,5,6,8,9..14"
            )))
        }
    }
    if body.len() < width {
        Ok(format!("{:>width$}", body, width = width))
    } else {
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_number("12.5").unwrap(), 12.5);
        assert_eq!(parse_number(" -3 ").unwrap(), -3.0);
        assert_eq!(parse_number("0").unwrap(), 0.0);
    }

    #[test]
    fn test_parse_sexagesimal() {
        assert_eq!(parse_number("12:30").unwrap(), 12.5);
        assert_eq!(parse_number("-12:30").unwrap(), -12.5);
        assert_eq!(parse_number("12:30:00").unwrap(), 12.5);
        assert_eq!(parse_number("12 30").unwrap(), 12.5);
        assert_eq!(parse_number("12;15;0").unwrap(), 12.25);
        // missing trailing parts default to zero
        assert_eq!(parse_number("2:5:").unwrap(), 2.0 + 5.0 / 60.0);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_number("").is_err());
        assert!(parse_number("twelve").is_err());
        assert!(parse_number("1:2:3:4").is_err());
    }

    #[test]
    fn test_format_parse_identity() {
        let fmt = NumberFormat::parse("%9.6m").unwrap();
        for value in [1.5, 12.5, -1.5, 123.75] {
            let s = fmt.format(value).unwrap();
            let back = parse_number(&s).unwrap();
            assert!((back - value).abs() < 1.0 / 3600.0, "{value} -> {s} -> {back}");
        }
    }

    #[test]
    fn test_format_sexagesimal_fractions() {
        assert_eq!(format_sexagesimal(123.75, 7, 3).unwrap(), " 123:45");
        assert_eq!(format_sexagesimal(-123.75, 7, 3).unwrap(), "-123:45");
        assert_eq!(format_sexagesimal(1.5, 7, 3).unwrap(), "   1:30");
        assert_eq!(format_sexagesimal(1.525, 9, 5).unwrap(), "   1:31.5");
        assert_eq!(format_sexagesimal(12.5, 9, 6).unwrap(), " 12:30:00");
        assert_eq!(format_sexagesimal(-1.508333333, 9, 8).unwrap(), "-1:30:30.0");
        assert_eq!(format_sexagesimal(1.508333333, 11, 9).unwrap(), " 1:30:30.00");
    }

    #[test]
    fn test_format_printf() {
        let fmt = NumberFormat::parse("%3.1f").unwrap();
        assert_eq!(fmt.format(20.0).unwrap(), "20.0");
        let fmt = NumberFormat::parse("%7.2f").unwrap();
        assert_eq!(fmt.format(3.14159).unwrap(), "   3.14");
        let fmt = NumberFormat::parse("%06.1f").unwrap();
        assert_eq!(fmt.format(-3.2).unwrap(), "-003.2");
        let fmt = NumberFormat::parse("%d").unwrap();
        assert_eq!(fmt.format(41.7).unwrap(), "41");
        assert_eq!(fmt.format(-41.7).unwrap(), "-41");
    }

    #[test]
    fn test_format_spec_validation() {
        assert!(matches!(
            NumberFormat::parse("%8.3m").unwrap(),
            NumberFormat::Sexagesimal { width: 8, fraction: 3 }
        ));
        assert!(NumberFormat::parse("%8.4m").is_err());
        assert!(NumberFormat::parse("no-percent").is_err());
    }
}
