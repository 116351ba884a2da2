/// Connection spec parsing
///
/// `<host>[:<port>]` connects directly (default Redis port);
/// `sentinel <service-name> <host>[:<port>] ...` discovers the master through
/// the listed sentinels (default sentinel port).
use crate::types::{Address, ConnectionSpec, DatabaseError};
use super::common::token;
use nom::{
    bytes::complete::tag,
    character::complete::multispace1,
    multi::separated_list1,
    sequence::{preceded, terminated},
    IResult,
};

fn sentinel_spec(input: &str) -> IResult<&str, (&str, Vec<&str>)> {
    let (input, _) = terminated(tag("sentinel"), multispace1)(input)?;
    let (input, service) = token(input)?;
    let (input, nodes) = preceded(multispace1, separated_list1(multispace1, token))(input)?;
    Ok((input, (service, nodes)))
}

/// Parses a connection spec; nothing is kept on failure.
pub fn parse_connection_spec(
    spec: &str,
    redis_port: u16,
    sentinel_port: u16,
) -> Result<ConnectionSpec, DatabaseError> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(DatabaseError::BadFormat("empty connection spec".to_string()));
    }

    if spec.starts_with("sentinel") && spec["sentinel".len()..].starts_with(char::is_whitespace) {
        let (rest, (service, nodes)) = sentinel_spec(spec).map_err(|_| {
            DatabaseError::BadFormat(format!(
                "expected 'sentinel <service> <host>[:<port>] ...', got '{spec}'"
            ))
        })?;
        if !rest.trim().is_empty() {
            return Err(DatabaseError::BadFormat(format!("trailing input '{rest}'")));
        }

        let addresses = nodes
            .into_iter()
            .map(|node| Address::parse(node, sentinel_port))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(ConnectionSpec::sentinel(service, addresses));
    }

    if spec.split_whitespace().nth(1).is_some() {
        return Err(DatabaseError::BadFormat(format!(
            "expected a single <host>[:<port>], got '{spec}'"
        )));
    }
    Ok(ConnectionSpec::direct(Address::parse(spec, redis_port)?))
}

impl std::str::FromStr for ConnectionSpec {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_connection_spec(
            s,
            crate::types::DEFAULT_REDIS_PORT,
            crate::types::DEFAULT_SENTINEL_PORT,
        )
    }
}
