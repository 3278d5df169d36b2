//! Request parser and response encoder for the SeriesVault text protocol
//!
//! A request is one or more newline-separated lines:
//!
//! ```text
//! put <key> <value> <timestamp>
//! get <key>
//! ```
//!
//! A response is `ok` followed by one `<key> <value> <timestamp>` row per
//! sample, or `error` followed by a message. Both end with a blank line.

use crate::error::{Result, SeriesVaultError};
use crate::executor::Outcome;
use crate::store::{QueryResult, Sample};
use nom::{
    bytes::complete::is_not,
    character::complete::{char, multispace0, multispace1},
    combinator::{all_consuming, map_res, rest},
    sequence::{preceded, separated_pair, terminated, tuple},
    IResult,
};
use std::fmt;

/// Commands supported by the SeriesVault protocol
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Put { key: String, value: f64, timestamp: i64 },
    Get { key: String },
}

impl fmt::Display for Command {
    /// Renders the command as its request line, without the newline
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Put { key, value, timestamp } => {
                write!(f, "put {} {:?} {}", key, value, timestamp)
            }
            Command::Get { key } => write!(f, "get {}", key),
        }
    }
}

/// Response frames sent back to the client
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Ok(Vec<(String, Sample)>),
    Error(String),
}

impl Response {
    /// Flatten per-command outcomes into data rows, in command order
    pub fn from_outcomes(outcomes: &[Outcome]) -> Self {
        let rows = outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                Outcome::Found(result) => Some(result),
                Outcome::Stored => None,
            })
            .flat_map(|result| {
                result.iter().flat_map(|(key, samples)| {
                    samples.iter().map(move |sample| (key.clone(), *sample))
                })
            })
            .collect();
        Response::Ok(rows)
    }

    /// Serialize response to bytes for network transmission
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    /// Parse a complete response frame, including its blank terminator line
    pub fn parse(text: &str) -> Result<Self> {
        let body = text.strip_suffix("\n\n").ok_or_else(|| {
            SeriesVaultError::Protocol("response is not terminated by a blank line".to_string())
        })?;

        let mut lines = body.split('\n');
        match lines.next() {
            Some("ok") => lines
                .map(parse_row)
                .collect::<Result<Vec<_>>>()
                .map(Response::Ok),
            Some("error") => Ok(Response::Error(lines.collect::<Vec<_>>().join("\n"))),
            other => Err(SeriesVaultError::Protocol(format!(
                "unknown response status: {:?}",
                other.unwrap_or_default()
            ))),
        }
    }

    /// Group rows by key with samples sorted by timestamp; an `error` frame
    /// becomes `SeriesVaultError::Server`
    pub fn into_result(self) -> Result<QueryResult> {
        match self {
            Response::Ok(rows) => {
                let mut result = QueryResult::new();
                for (key, sample) in rows {
                    result.entry(key).or_default().push(sample);
                }
                for samples in result.values_mut() {
                    samples.sort_by_key(|sample| sample.timestamp);
                }
                Ok(result)
            }
            Response::Error(message) => Err(SeriesVaultError::Server(message)),
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Ok(rows) => {
                writeln!(f, "ok")?;
                for (key, sample) in rows {
                    writeln!(f, "{} {:?} {}", key, sample.value, sample.timestamp)?;
                }
                writeln!(f)
            }
            Response::Error(message) => write!(f, "error\n{}\n\n", message),
        }
    }
}

/// Parse a whole request into commands; any bad line rejects the batch
pub fn decode(text: &str) -> Result<Vec<Command>> {
    text.split('\n')
        .filter(|line| !line.is_empty())
        .map(decode_line)
        .collect()
}

/// Encode the results of one batch as a success response
pub fn encode(outcomes: &[Outcome]) -> String {
    Response::from_outcomes(outcomes).to_string()
}

fn decode_line(line: &str) -> Result<Command> {
    let (_, (verb, params)) = verb_and_params(line.trim())?;
    match verb {
        "put" => {
            let (_, (key, value, timestamp)) = put_params(params)?;
            Ok(Command::Put {
                key: key.to_string(),
                value,
                timestamp,
            })
        }
        // the rest of the line is the key, wildcard included
        "get" => Ok(Command::Get {
            key: params.to_string(),
        }),
        _ => Err(SeriesVaultError::wrong_command()),
    }
}

/// Split at the first space: `<verb> <params>`
fn verb_and_params(input: &str) -> IResult<&str, (&str, &str)> {
    separated_pair(is_not(" "), char(' '), rest)(input)
}

fn token(input: &str) -> IResult<&str, &str> {
    is_not(" \t\r\n")(input)
}

/// Parse exactly `<key> <value> <timestamp>`
fn put_params(input: &str) -> IResult<&str, (&str, f64, i64)> {
    all_consuming(terminated(
        tuple((
            preceded(multispace0, token),
            preceded(multispace1, map_res(token, |s: &str| s.parse::<f64>())),
            preceded(multispace1, map_res(token, |s: &str| s.parse::<i64>())),
        )),
        multispace0,
    ))(input)
}

fn parse_row(line: &str) -> Result<(String, Sample)> {
    let malformed = || SeriesVaultError::Protocol(format!("malformed data row: {:?}", line));

    let mut fields = line.split_whitespace();
    let (Some(key), Some(value), Some(timestamp), None) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(malformed());
    };

    let value = value.parse::<f64>().map_err(|_| malformed())?;
    let timestamp = timestamp.parse::<i64>().map_err(|_| malformed())?;
    Ok((key.to_string(), Sample::new(timestamp, value)))
}
