use std::fmt::{Debug, Display, Formatter};

use drmsession::{BulkRange, Timeout};
use nom::character::complete::{char, satisfy};
use nom::combinator::{all_consuming, map, map_res, opt};
use nom::error::{ErrorKind, FromExternalError, ParseError};
use nom::multi::many0;
use nom::sequence::{preceded, tuple};
use nom::{AsChar, IResult};

pub enum ParserError<I> {
    Custom(anyhow::Error),
    Nom(I, ErrorKind),
}

impl<I: Debug> Debug for ParserError<I> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Custom(error) => f.write_fmt(format_args!("Semantic error at {error}")),
            Self::Nom(input, error) => f.write_fmt(format_args!(
                "Parser error at '{input:?}': expecting {error:?}"
            )),
        }
    }
}

impl<I> ParseError<I> for ParserError<I> {
    fn from_error_kind(input: I, kind: ErrorKind) -> Self {
        ParserError::Nom(input, kind)
    }

    fn append(_: I, _: ErrorKind, other: Self) -> Self {
        other
    }
}

impl<I: Display, E: Into<anyhow::Error>> FromExternalError<I, E> for ParserError<I> {
    fn from_external_error(input: I, _: ErrorKind, error: E) -> Self {
        ParserError::Custom(anyhow::anyhow!("'{}': {}", input, error.into()))
    }
}

pub(crate) fn format_parse_error<I: Debug>(error: nom::Err<ParserError<I>>) -> anyhow::Error {
    match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => anyhow::anyhow!("{:?}", e),
        _ => anyhow::anyhow!(error.to_string()),
    }
}

pub type NomResult<'a, Ret> = IResult<&'a str, Ret, ParserError<&'a str>>;

/// Runs the parser and fails unless the whole input was consumed.
pub fn consume_all<'a, O, F>(parser: F, input: &'a str) -> anyhow::Result<O>
where
    F: FnMut(&'a str) -> NomResult<'a, O>,
{
    all_consuming(parser)(input)
        .map(|(_, output)| output)
        .map_err(format_parse_error)
}

fn p_integer_string(input: &str) -> NomResult<String> {
    let parser = tuple((
        satisfy(|c| c.is_dec_digit()),
        many0(satisfy(|c| c.is_dec_digit() || c == '_')),
    ));
    map(parser, |(first, rest)| {
        let mut number = first.to_string();
        number.extend(rest.into_iter().filter(|c| c.is_dec_digit()));
        number
    })(input)
}

pub fn p_u32(input: &str) -> NomResult<u32> {
    map_res(p_integer_string, |number| number.parse::<u32>())(input)
}

/// Bulk index range in the format `START[-END][:STEP]`.
fn p_bulk_range(input: &str) -> NomResult<BulkRange> {
    map_res(
        tuple((
            p_u32,
            opt(preceded(char('-'), p_u32)),
            opt(preceded(char(':'), p_u32)),
        )),
        |(start, end, step)| BulkRange::new(start, end.unwrap_or(start), step.unwrap_or(1)),
    )(input)
}

pub fn parse_bulk_range(input: &str) -> anyhow::Result<BulkRange> {
    consume_all(p_bulk_range, input.trim())
}

/// Parses a waiting timeout.
///
/// Accepts `forever`, `nowait`, a number of seconds (`-1` waits forever, `0` does not wait)
/// or a humantime duration (`90s`, `2h`).
pub fn parse_timeout(input: &str) -> anyhow::Result<Timeout> {
    let input = input.trim();
    match input {
        "forever" | "inf" => return Ok(Timeout::Forever),
        "nowait" => return Ok(Timeout::NoWait),
        _ => {}
    }
    if let Ok(seconds) = input.parse::<i64>() {
        return Ok(Timeout::from_raw(seconds)?);
    }
    humantime::parse_duration(input)
        .map(Timeout::from)
        .map_err(|error| anyhow::anyhow!("Invalid timeout `{input}`: {error}"))
}
