use crate::types::Value;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{alpha1, char, multispace0},
    combinator::{map, recognize},
    sequence::{delimited, pair},
    IResult,
};

pub fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

pub fn identifier(input: &str) -> IResult<&str, String> {
    map(
        recognize(pair(
            alt((alpha1, tag("_"))),
            take_while(|c: char| c.is_alphanumeric() || c == '_'),
        )),
        |s: &str| s.to_string(),
    )(input)
}

/// A bare identifier, or one wrapped in double quotes or backticks.
pub fn column_name(input: &str) -> IResult<&str, String> {
    alt((
        map(
            delimited(char('"'), take_while1(|c| c != '"'), char('"')),
            |s: &str| s.to_string(),
        ),
        map(
            delimited(char('`'), take_while1(|c| c != '`'), char('`')),
            |s: &str| s.to_string(),
        ),
        identifier,
    ))(input)
}

/// One whitespace-delimited token.
pub fn token(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_whitespace())(input)
}

pub fn string_literal(input: &str) -> IResult<&str, String> {
    map(
        delimited(char('\''), take_while(|c| c != '\''), char('\'')),
        |s: &str| s.to_string(),
    )(input)
}

/// A quoted string is always text; a bare token is read as an integer,
/// a float, NULL or text, in that order.
pub fn value(input: &str) -> IResult<&str, Value> {
    alt((map(string_literal, Value::Text), map(token, Value::from_literal)))(input)
}
