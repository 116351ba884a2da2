/// Column definition parsing
///
/// `name [TYPE] [CONSTRAINT ...]`. The type keyword picks an affinity
/// (see `DataType::from_keyword`); a missing or unrecognised keyword, or a
/// second token that is the `CONSTRAINT` introducer, keeps the Text default.
/// Everything after the type is accepted and ignored.
use crate::types::{ColumnSpec, DataType, DatabaseError};
use super::common::{column_name, ws};
use nom::{
    bytes::complete::take_while1,
    character::complete::{char, multispace0},
    combinator::opt,
    sequence::delimited,
    IResult,
};

const CONSTRAINT_KEYWORD: &str = "CONSTRAINT";

fn type_keyword(input: &str) -> IResult<&str, &str> {
    let (input, keyword) = take_while1(|c: char| c.is_alphanumeric() || c == '_')(input)?;
    // Swallow a size suffix such as VARCHAR(255) or NUMERIC(10, 2)
    let (input, _) = opt(delimited(
        ws(char('(')),
        take_while1(|c: char| c != ')'),
        char(')'),
    ))(input)?;
    Ok((input, keyword))
}

fn column_def(input: &str) -> IResult<&str, ColumnSpec> {
    let (input, name) = ws(column_name)(input)?;
    let (input, keyword) = opt(type_keyword)(input)?;
    let (input, _) = multispace0(input)?;

    let data_type = match keyword {
        Some(k) if k.eq_ignore_ascii_case(CONSTRAINT_KEYWORD) => DataType::default(),
        Some(k) => DataType::from_keyword(k).unwrap_or_default(),
        None => DataType::default(),
    };

    Ok((input, ColumnSpec::new(&name, data_type)))
}

/// Parses one column definition.
pub fn parse_column(definition: &str) -> Result<ColumnSpec, DatabaseError> {
    column_def(definition)
        .map(|(_, column)| column)
        .map_err(|e| DatabaseError::BadFormat(format!("column definition '{definition}': {e}")))
}

/// Parses a table's column definitions; a table needs at least one column
/// and column names must be unique.
pub fn parse_columns<S: AsRef<str>>(definitions: &[S]) -> Result<Vec<ColumnSpec>, DatabaseError> {
    if definitions.is_empty() {
        return Err(DatabaseError::BadFormat("table with zero columns".to_string()));
    }

    let mut columns: Vec<ColumnSpec> = Vec::with_capacity(definitions.len());
    for def in definitions {
        let column = parse_column(def.as_ref())?;
        if columns.iter().any(|c| c.name == column.name) {
            return Err(DatabaseError::BadFormat(format!("duplicate column '{}'", column.name)));
        }
        columns.push(column);
    }
    Ok(columns)
}
