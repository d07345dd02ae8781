//! Parsing of SPICE text kernels.
//!
//! Text kernels are plain text files where only the contents between a
//! `\begindata` marker and the following `\begintext` marker are meaningful. Those
//! data blocks contain assignments of the form:
//!
//! ```text
//! NAME  = value
//! NAME  = ( value value, value )
//! NAME += ( value )
//! ```
//!
//! Values are either numbers (Fortran `D` exponents are accepted), single quoted
//! strings (a doubled quote `''` is a literal quote), or `@` prefixed calendar
//! dates. Dates are stored as seconds past J2000 without any time scale conversion.
//!
//! <https://naif.jpl.nasa.gov/pub/naif/toolkit_docs/C/req/kernel.html>
//!
use crate::errors::{ConvResult, Error};
use chrono::{NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use smol_str::SmolStr;

/// Values assigned to a single pool variable.
/// A variable holds either numbers or strings, never a mix of the two.
#[derive(Debug, Clone, PartialEq)]
pub enum PoolValues {
    /// Numeric values, including dates.
    Numbers(Vec<f64>),

    /// Character values.
    Strings(Vec<String>),
}

impl PoolValues {
    /// Number of individual values.
    pub fn len(&self) -> usize {
        match self {
            PoolValues::Numbers(v) => v.len(),
            PoolValues::Strings(v) => v.len(),
        }
    }

    /// Are there zero values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Assignment operator used in a kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AssignOp {
    /// `=`, replace any previous values.
    Set,

    /// `+=`, append to any previous values.
    Append,
}

/// One assignment from a data block of a text kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// Variable name, case is preserved.
    pub name: SmolStr,

    /// Assignment operator.
    pub op: AssignOp,

    /// Assigned values.
    pub values: PoolValues,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Str(String),
    Date(f64),
    LParen,
    RParen,
    Eq,
    PlusEq,
}

lazy_static! {
    /// The J2000 epoch, 2000-01-01 12:00:00.
    static ref J2000: NaiveDateTime = NaiveDate::from_ymd_opt(2000, 1, 1)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .expect("J2000 is a valid date");
}

/// Date formats accepted after an `@`.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d/%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d/%H:%M",
    "%Y-%b-%d/%H:%M:%S%.f",
    "%Y-%b-%d %H:%M:%S%.f",
];

/// Convert a calendar date into seconds past J2000.
///
/// This is a formal conversion, no leap seconds or time scale offsets are applied.
pub fn calendar_to_seconds(text: &str) -> ConvResult<f64> {
    let text = text.trim();
    let datetime = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok());
    let datetime = match datetime {
        Some(dt) => dt,
        None => NaiveDate::parse_from_str(text, "%Y-%m-%d")?
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| Error::ValueError(format!("Invalid date {:?}", text)))?,
    };
    let delta = datetime.signed_duration_since(*J2000);
    Ok(delta.num_seconds() as f64 + delta.subsec_nanos() as f64 * 1e-9)
}

/// Parse a numeric literal, accepting Fortran style `D` exponents.
fn parse_number(word: &str) -> ConvResult<f64> {
    word.replace(|c: char| c == 'D' || c == 'd', "E")
        .parse::<f64>()
        .map_err(|_| Error::KernelLoad(format!("Expected a number, found {:?}", word)))
}

/// Extract the text of all data blocks.
fn data_blocks(text: &str) -> String {
    let mut in_data = false;
    let mut data = String::new();
    for line in text.lines() {
        match line.trim() {
            "\\begindata" => in_data = true,
            "\\begintext" => in_data = false,
            _ if in_data => {
                data.push_str(line);
                data.push('\n');
            }
            _ => (),
        }
    }
    data
}

fn is_word_end(c: char) -> bool {
    c.is_whitespace() || matches!(c, ',' | '(' | ')' | '=' | '\'')
}

fn tokenize(data: &str) -> ConvResult<Vec<Token>> {
    let chars: Vec<char> = data.chars().collect();
    let mut tokens = Vec::new();
    let mut idx = 0;
    while idx < chars.len() {
        let c = chars[idx];
        match c {
            c if c.is_whitespace() || c == ',' => idx += 1,
            '(' => {
                tokens.push(Token::LParen);
                idx += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                idx += 1;
            }
            '=' => {
                tokens.push(Token::Eq);
                idx += 1;
            }
            '+' if chars.get(idx + 1) == Some(&'=') => {
                tokens.push(Token::PlusEq);
                idx += 2;
            }
            '\'' => {
                let mut value = String::new();
                idx += 1;
                loop {
                    match chars.get(idx) {
                        Some('\'') if chars.get(idx + 1) == Some(&'\'') => {
                            value.push('\'');
                            idx += 2;
                        }
                        Some('\'') => {
                            idx += 1;
                            break;
                        }
                        Some('\n') | None => {
                            Err(Error::KernelLoad(format!(
                                "Unterminated string starting with {:?}",
                                value
                            )))?;
                        }
                        Some(&other) => {
                            value.push(other);
                            idx += 1;
                        }
                    }
                }
                tokens.push(Token::Str(value));
            }
            '@' => {
                let start = idx + 1;
                idx = start;
                while idx < chars.len()
                    && !(chars[idx].is_whitespace() || chars[idx] == ',' || chars[idx] == ')')
                {
                    idx += 1;
                }
                let text: String = chars[start..idx].iter().collect();
                let seconds = calendar_to_seconds(&text).map_err(|_| {
                    Error::KernelLoad(format!("Could not parse date literal @{}", text))
                })?;
                tokens.push(Token::Date(seconds));
            }
            _ => {
                let start = idx;
                while idx < chars.len() && !is_word_end(chars[idx]) {
                    if chars[idx] == '+' && chars.get(idx + 1) == Some(&'=') {
                        break;
                    }
                    idx += 1;
                }
                tokens.push(Token::Word(chars[start..idx].iter().collect()));
            }
        }
    }
    Ok(tokens)
}

/// Add a single value token to the collection of values.
fn push_value(values: &mut Option<PoolValues>, token: Token, name: &str) -> ConvResult<()> {
    let mixed = || Error::KernelLoad(format!("Variable {} mixes strings and numbers.", name));
    match token {
        Token::Str(s) => match values {
            None => *values = Some(PoolValues::Strings(vec![s])),
            Some(PoolValues::Strings(v)) => v.push(s),
            Some(PoolValues::Numbers(_)) => Err(mixed())?,
        },
        Token::Date(x) => match values {
            None => *values = Some(PoolValues::Numbers(vec![x])),
            Some(PoolValues::Numbers(v)) => v.push(x),
            Some(PoolValues::Strings(_)) => Err(mixed())?,
        },
        Token::Word(w) => {
            let x = parse_number(&w)?;
            match values {
                None => *values = Some(PoolValues::Numbers(vec![x])),
                Some(PoolValues::Numbers(v)) => v.push(x),
                Some(PoolValues::Strings(_)) => Err(mixed())?,
            }
        }
        other => Err(Error::KernelLoad(format!(
            "Unexpected {:?} in the values of {}",
            other, name
        )))?,
    }
    Ok(())
}

/// Parse the full contents of a text kernel into its assignments, in file order.
pub fn parse_text_kernel(text: &str) -> ConvResult<Vec<Assignment>> {
    let tokens = tokenize(&data_blocks(text))?;
    let mut tokens = tokens.into_iter();
    let mut assignments = Vec::new();

    while let Some(token) = tokens.next() {
        let name: SmolStr = match token {
            Token::Word(w) => w.into(),
            other => Err(Error::KernelLoad(format!(
                "Expected a variable name, found {:?}",
                other
            )))?,
        };
        let op = match tokens.next() {
            Some(Token::Eq) => AssignOp::Set,
            Some(Token::PlusEq) => AssignOp::Append,
            other => Err(Error::KernelLoad(format!(
                "Expected '=' or '+=' after {}, found {:?}",
                name, other
            )))?,
        };

        let mut values = None;
        match tokens.next() {
            Some(Token::LParen) => loop {
                match tokens.next() {
                    Some(Token::RParen) => break,
                    Some(token) => push_value(&mut values, token, &name)?,
                    None => Err(Error::KernelLoad(format!(
                        "Missing closing parenthesis for {}",
                        name
                    )))?,
                }
            },
            Some(token) => push_value(&mut values, token, &name)?,
            None => Err(Error::KernelLoad(format!("No value assigned to {}", name)))?,
        }
        let values =
            values.ok_or_else(|| Error::KernelLoad(format!("No value assigned to {}", name)))?;
        assignments.push(Assignment { name, op, values });
    }
    Ok(assignments)
}
