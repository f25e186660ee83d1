//! Culture-aware formatting of partition-key components.
//!
//! Supports the subset of standard and custom format strings that partition keys
//! need in practice: standard numeric formats (`F`, `N`, `D`, `X`, `E`,
//! `G`), the round-trip/sortable timestamp formats (`o`, `s`, `u`), and
//! custom timestamp patterns made of numeric fields. Anything outside that
//! subset is rejected with a [`FormatError`] rather than guessed at.

use chrono::{DateTime, Datelike, FixedOffset, Timelike};

use crate::error::FormatError;
use crate::value::PropertyValue;

/// Separators and designators a culture contributes to formatted output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Culture {
    pub name: &'static str,
    pub decimal_separator: &'static str,
    pub group_separator: &'static str,
    pub date_separator: &'static str,
    pub time_separator: &'static str,
    pub am_designator: &'static str,
    pub pm_designator: &'static str,
}

/// The culture used when none is named.
pub const INVARIANT: Culture = Culture {
    name: "",
    decimal_separator: ".",
    group_separator: ",",
    date_separator: "/",
    time_separator: ":",
    am_designator: "AM",
    pm_designator: "PM",
};

const CULTURES: &[Culture] = &[
    Culture {
        name: "en-US",
        ..INVARIANT
    },
    Culture {
        name: "en-GB",
        am_designator: "am",
        pm_designator: "pm",
        ..INVARIANT
    },
    Culture {
        name: "fi-FI",
        decimal_separator: ",",
        group_separator: "\u{a0}",
        date_separator: ".",
        time_separator: ".",
        am_designator: "ap.",
        pm_designator: "ip.",
    },
    Culture {
        name: "sv-SE",
        decimal_separator: ",",
        group_separator: "\u{a0}",
        date_separator: "-",
        time_separator: ":",
        am_designator: "fm",
        pm_designator: "em",
    },
    Culture {
        name: "de-DE",
        decimal_separator: ",",
        group_separator: ".",
        date_separator: ".",
        time_separator: ":",
        am_designator: "AM",
        pm_designator: "PM",
    },
    Culture {
        name: "fr-FR",
        decimal_separator: ",",
        group_separator: "\u{202f}",
        date_separator: "/",
        time_separator: ":",
        am_designator: "AM",
        pm_designator: "PM",
    },
    Culture {
        name: "nl-NL",
        decimal_separator: ",",
        group_separator: ".",
        date_separator: "-",
        time_separator: ":",
        am_designator: "a.m.",
        pm_designator: "p.m.",
    },
    Culture {
        name: "es-ES",
        decimal_separator: ",",
        group_separator: ".",
        date_separator: "/",
        time_separator: ":",
        am_designator: "a. m.",
        pm_designator: "p. m.",
    },
    Culture {
        name: "nb-NO",
        decimal_separator: ",",
        group_separator: "\u{a0}",
        date_separator: ".",
        time_separator: ":",
        am_designator: "a.m.",
        pm_designator: "p.m.",
    },
    Culture {
        name: "da-DK",
        decimal_separator: ",",
        group_separator: ".",
        date_separator: ".",
        time_separator: ".",
        am_designator: "AM",
        pm_designator: "PM",
    },
];

/// Look up a culture by name, case-insensitively. `None` and the empty
/// string select the invariant culture.
pub fn lookup_culture(name: Option<&str>) -> Result<&'static Culture, FormatError> {
    match name {
        None | Some("") => Ok(&INVARIANT),
        Some(name) => CULTURES
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| FormatError::UnknownCulture(name.to_string())),
    }
}

/// Render one partition-key component.
///
/// Without a format string the value is stringified invariantly and the
/// culture is ignored. `Null` always renders as an empty string.
pub fn format_component(
    property: &str,
    value: &PropertyValue,
    format: Option<&str>,
    culture: Option<&str>,
) -> Result<String, FormatError> {
    let format = match format {
        Some(f) if !f.is_empty() => f,
        _ => return Ok(value.to_string()),
    };
    if value.is_null() {
        return Ok(String::new());
    }

    let culture = lookup_culture(culture)?;
    let incompatible = || FormatError::Incompatible {
        property: property.to_string(),
        format: format.to_string(),
        value_kind: value.kind_name(),
    };

    match value {
        PropertyValue::Integer(i) => format_integer(*i, format, culture, incompatible),
        PropertyValue::Float(f) => format_float(*f, format, culture, incompatible),
        PropertyValue::Timestamp(ts) => format_timestamp(ts, format, culture),
        PropertyValue::Text(s) => match DateTime::parse_from_rfc3339(s) {
            Ok(ts) => format_timestamp(&ts, format, culture),
            Err(_) => Err(incompatible()),
        },
        _ => Err(incompatible()),
    }
}

/// Parsed standard numeric format, e.g. `F2` or `x8`.
struct NumericFormat {
    specifier: char,
    precision: Option<usize>,
}

fn parse_numeric(format: &str) -> Result<NumericFormat, FormatError> {
    let mut chars = format.chars();
    let specifier = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => c,
        _ => return Err(FormatError::invalid(format, "custom numeric formats are not supported")),
    };

    let digits = chars.as_str();
    if digits.is_empty() {
        return Ok(NumericFormat {
            specifier,
            precision: None,
        });
    }
    if digits.len() > 2 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(FormatError::invalid(format, "custom numeric formats are not supported"));
    }

    let precision = digits
        .parse::<usize>()
        .map_err(|e| FormatError::invalid(format, e.to_string()))?;
    Ok(NumericFormat {
        specifier,
        precision: Some(precision),
    })
}

fn format_integer(
    value: i64,
    format: &str,
    culture: &Culture,
    incompatible: impl FnOnce() -> FormatError,
) -> Result<String, FormatError> {
    let numeric = parse_numeric(format)?;
    let negative = value < 0;
    let digits = value.unsigned_abs().to_string();

    match numeric.specifier {
        'D' | 'd' => {
            let width = numeric.precision.unwrap_or(0);
            Ok(signed(negative, format!("{:0>width$}", digits)))
        }
        'X' | 'x' => {
            let width = numeric.precision.unwrap_or(0);
            let hex = if numeric.specifier == 'X' {
                format!("{:X}", value as u64)
            } else {
                format!("{:x}", value as u64)
            };
            Ok(format!("{:0>width$}", hex))
        }
        'F' | 'f' | 'N' | 'n' => {
            let decimals = numeric.precision.unwrap_or(2);
            let grouped = matches!(numeric.specifier, 'N' | 'n');
            Ok(assemble(negative, &digits, &"0".repeat(decimals), grouped, culture))
        }
        'E' | 'e' => format_float(value as f64, format, culture, incompatible),
        'G' | 'g' => match numeric.precision {
            Some(p) if p > 0 && p < digits.len() => {
                format_float(value as f64, format, culture, incompatible)
            }
            _ => Ok(signed(negative, digits)),
        },
        _ => Err(FormatError::invalid(format, "unsupported numeric format specifier")),
    }
}

fn format_float(
    value: f64,
    format: &str,
    culture: &Culture,
    incompatible: impl FnOnce() -> FormatError,
) -> Result<String, FormatError> {
    let numeric = parse_numeric(format)?;
    if matches!(numeric.specifier, 'D' | 'd' | 'X' | 'x') {
        return Err(incompatible());
    }
    if !matches!(numeric.specifier, 'F' | 'f' | 'N' | 'n' | 'E' | 'e' | 'G' | 'g') {
        return Err(FormatError::invalid(format, "unsupported numeric format specifier"));
    }

    if value.is_nan() {
        return Ok("NaN".to_string());
    }
    if value.is_infinite() {
        return Ok(if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string());
    }

    let negative = value < 0.0;
    let abs = value.abs();

    let text = match numeric.specifier {
        'F' | 'f' | 'N' | 'n' => {
            let decimals = numeric.precision.unwrap_or(2);
            let fixed = format!("{:.*}", decimals, abs);
            let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
            let grouped = matches!(numeric.specifier, 'N' | 'n');
            assemble(negative, int_part, frac_part, grouped, culture)
        }
        'E' | 'e' => {
            let decimals = numeric.precision.unwrap_or(6);
            let (digits, exponent) = scientific_digits(abs, Some(decimals + 1));
            let mantissa = mantissa(&digits, culture);
            signed(
                negative,
                format!("{}{}", mantissa, exponent_suffix(numeric.specifier, exponent, 3)),
            )
        }
        _ => {
            let precision = numeric.precision.filter(|p| *p > 0);
            let (mut digits, exponent) = scientific_digits(abs, precision);
            while digits.len() > 1 && digits.ends_with('0') {
                digits.pop();
            }
            let limit = precision.unwrap_or(15) as i32;
            let body = if exponent >= -5 && exponent < limit {
                positional(&digits, exponent, culture)
            } else {
                let e = if numeric.specifier == 'G' { 'E' } else { 'e' };
                format!("{}{}", mantissa(&digits, culture), exponent_suffix(e, exponent, 2))
            };
            signed(negative, body)
        }
    };

    Ok(text)
}

/// Significant digits and decimal exponent of a non-negative finite value.
/// With `significant` set the digits are rounded to that many places,
/// otherwise the shortest round-trip representation is used.
fn scientific_digits(abs: f64, significant: Option<usize>) -> (String, i32) {
    let rendered = match significant {
        Some(n) => format!("{:.*e}", n.saturating_sub(1), abs),
        None => format!("{:e}", abs),
    };
    let (mantissa, exponent) = rendered.split_once('e').unwrap_or((rendered.as_str(), "0"));
    let digits: String = mantissa.chars().filter(|c| c.is_ascii_digit()).collect();
    (digits, exponent.parse().unwrap_or(0))
}

fn mantissa(digits: &str, culture: &Culture) -> String {
    let (first, rest) = digits.split_at(1.min(digits.len()));
    if rest.is_empty() {
        first.to_string()
    } else {
        format!("{}{}{}", first, culture.decimal_separator, rest)
    }
}

fn exponent_suffix(symbol: char, exponent: i32, min_digits: usize) -> String {
    let sign = if exponent < 0 { '-' } else { '+' };
    format!("{}{}{:0>min_digits$}", symbol, sign, exponent.unsigned_abs())
}

fn positional(digits: &str, exponent: i32, culture: &Culture) -> String {
    if exponent < 0 {
        let zeros = "0".repeat((-exponent - 1) as usize);
        return format!("0{}{}{}", culture.decimal_separator, zeros, digits);
    }

    let int_len = exponent as usize + 1;
    if digits.len() <= int_len {
        format!("{:0<int_len$}", digits)
    } else {
        let (int_part, frac_part) = digits.split_at(int_len);
        format!("{}{}{}", int_part, culture.decimal_separator, frac_part)
    }
}

fn assemble(
    negative: bool,
    int_part: &str,
    frac_part: &str,
    grouped: bool,
    culture: &Culture,
) -> String {
    let int_part = if grouped {
        group_digits(int_part, culture.group_separator)
    } else {
        int_part.to_string()
    };

    let body = if frac_part.is_empty() {
        int_part
    } else {
        format!("{}{}{}", int_part, culture.decimal_separator, frac_part)
    };
    signed(negative, body)
}

fn group_digits(digits: &str, separator: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3 * separator.len());
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push_str(separator);
        }
        out.push(c);
    }
    out
}

fn signed(negative: bool, body: String) -> String {
    if negative {
        format!("-{}", body)
    } else {
        body
    }
}

fn format_timestamp(
    ts: &DateTime<FixedOffset>,
    format: &str,
    culture: &Culture,
) -> Result<String, FormatError> {
    match format {
        "o" | "O" => {
            // Seven fractional digits (100ns ticks).
            let ticks = ts.nanosecond() % 1_000_000_000 / 100;
            return Ok(format!(
                "{}.{:07}{}",
                ts.format("%Y-%m-%dT%H:%M:%S"),
                ticks,
                ts.format("%:z")
            ));
        }
        "s" => return Ok(ts.format("%Y-%m-%dT%H:%M:%S").to_string()),
        "u" => return Ok(ts.naive_utc().format("%Y-%m-%d %H:%M:%SZ").to_string()),
        _ => {}
    }
    if format.chars().count() == 1 && format.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(FormatError::invalid(format, "unsupported standard date format"));
    }

    let chars: Vec<char> = format.chars().collect();
    let mut out = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let run = chars[i..].iter().take_while(|&&x| x == c).count();

        match c {
            'y' => {
                let year = ts.year();
                match run {
                    1 => out.push_str(&(year % 100).to_string()),
                    2 => out.push_str(&format!("{:02}", year % 100)),
                    _ => out.push_str(&format!("{:0width$}", year, width = run)),
                }
            }
            'M' => push_field(&mut out, ts.month(), run, format, "month names are not supported")?,
            'd' => push_field(&mut out, ts.day(), run, format, "day names are not supported")?,
            'H' => push_field(&mut out, ts.hour(), run, format, "too many 'H' characters")?,
            'h' => {
                let hour = match ts.hour() % 12 {
                    0 => 12,
                    h => h,
                };
                push_field(&mut out, hour, run, format, "too many 'h' characters")?;
            }
            'm' => push_field(&mut out, ts.minute(), run, format, "too many 'm' characters")?,
            's' => push_field(&mut out, ts.second(), run, format, "too many 's' characters")?,
            'f' => {
                if run > 7 {
                    return Err(FormatError::invalid(format, "too many 'f' characters"));
                }
                let nanos = format!("{:09}", ts.nanosecond() % 1_000_000_000);
                out.push_str(&nanos[..run]);
            }
            't' => {
                let designator = if ts.hour() < 12 {
                    culture.am_designator
                } else {
                    culture.pm_designator
                };
                if run == 1 {
                    out.extend(designator.chars().take(1));
                } else {
                    out.push_str(designator);
                }
            }
            'z' => {
                let offset = ts.offset().local_minus_utc();
                let sign = if offset < 0 { '-' } else { '+' };
                let (hours, minutes) = (offset.abs() / 3600, offset.abs() % 3600 / 60);
                match run {
                    1 => out.push_str(&format!("{}{}", sign, hours)),
                    2 => out.push_str(&format!("{}{:02}", sign, hours)),
                    _ => out.push_str(&format!("{}{:02}:{:02}", sign, hours, minutes)),
                }
            }
            '\'' | '"' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&x| x == c)
                    .ok_or_else(|| FormatError::invalid(format, "unterminated quoted literal"))?;
                out.extend(&chars[i + 1..i + 1 + end]);
                i += end + 2;
                continue;
            }
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .ok_or_else(|| FormatError::invalid(format, "trailing escape character"))?;
                out.push(*escaped);
                i += 2;
                continue;
            }
            '%' => {
                if i + 1 >= chars.len() {
                    return Err(FormatError::invalid(format, "'%' must precede a format character"));
                }
                i += 1;
                continue;
            }
            '/' => out.push_str(culture.date_separator),
            ':' => out.push_str(culture.time_separator),
            c if c.is_ascii_alphabetic() => {
                return Err(FormatError::invalid(
                    format,
                    format!("unsupported format character '{}'", c),
                ));
            }
            c => out.push(c),
        }

        // Quotes, escapes and '%' advance on their own above.
        i += match c {
            'y' | 'M' | 'd' | 'H' | 'h' | 'm' | 's' | 'f' | 't' | 'z' => run,
            _ => 1,
        };
    }

    Ok(out)
}

/// Push a one- or two-digit numeric field.
fn push_field(
    out: &mut String,
    value: u32,
    run: usize,
    format: &str,
    too_long: &str,
) -> Result<(), FormatError> {
    match run {
        1 => out.push_str(&value.to_string()),
        2 => out.push_str(&format!("{:02}", value)),
        _ => return Err(FormatError::invalid(format, too_long)),
    }
    Ok(())
}
