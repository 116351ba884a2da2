/// Predicates typed on the command line: `n >= 5 AND name = 'bob'`.
///
/// Each term becomes one planner constraint; `rowid` names the row id.
use crate::executor::Operator;
use crate::types::{DatabaseError, Value};
use super::common::{column_name, value, ws};
use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case},
    character::complete::multispace1,
    combinator::{all_consuming, map},
    multi::separated_list1,
    sequence::{terminated, tuple},
    IResult,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub op: Operator,
    pub value: Value,
}

fn operator(input: &str) -> IResult<&str, Operator> {
    alt((
        map(tag(">="), |_| Operator::Ge),
        map(tag("<="), |_| Operator::Le),
        map(tag("=="), |_| Operator::Eq),
        map(tag("="), |_| Operator::Eq),
        map(tag(">"), |_| Operator::Gt),
        map(tag("<"), |_| Operator::Lt),
    ))(input)
}

fn predicate(input: &str) -> IResult<&str, Predicate> {
    map(
        tuple((ws(column_name), operator, ws(value))),
        |(column, op, value)| Predicate { column, op, value },
    )(input)
}

pub fn parse_predicates(input: &str) -> Result<Vec<Predicate>, DatabaseError> {
    all_consuming(separated_list1(
        terminated(tag_no_case("AND"), multispace1),
        predicate,
    ))(input.trim())
    .map(|(_, predicates)| predicates)
    .map_err(|e| DatabaseError::BadFormat(format!("where clause '{input}': {e}")))
}
