/// Cursor - iterates the rowids matched by a plan
///
/// `filter` materializes every matching rowid in ascending order; values
/// are read lazily, one multi-field fetch per row, and cached until `next`.
/// A row deleted after filtering reads back as all NULL.
use std::collections::BTreeSet;
use tracing::debug;
use crate::network::{Command, Reply};
use crate::storage::{parse_rowid, TableStore};
use crate::types::{DataType, DatabaseError, Row, Value};
use super::planner::{AccessPath, Operator, QueryPlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Created,
    Filtered,
    Iterating,
    Exhausted,
}

#[derive(Debug)]
pub struct Cursor {
    rowids: Vec<i64>,
    position: usize,
    state: CursorState,
    current: Option<Row>,
}

impl Default for Cursor {
    fn default() -> Self {
        Self::new()
    }
}

impl Cursor {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            rowids: Vec::new(),
            position: 0,
            state: CursorState::Created,
            current: None,
        }
    }

    #[must_use]
    pub const fn state(&self) -> CursorState {
        self.state
    }

    /// Number of rows matched by the last `filter`
    #[must_use]
    pub fn len(&self) -> usize {
        self.rowids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rowids.is_empty()
    }

    /// Runs the plan's access path. `arg` is the value of the driving
    /// constraint; a full scan ignores it.
    pub fn filter(
        &mut self,
        store: &mut TableStore,
        plan: &QueryPlan,
        arg: Option<&Value>,
    ) -> Result<(), DatabaseError> {
        let rowids = match plan.access {
            AccessPath::FullScan => full_scan(store)?,
            AccessPath::Rowid(op) => rowid_lookup(store, op, required(arg, plan)?)?,
            AccessPath::Index { column, op } => {
                let data_type = store
                    .columns()
                    .get(column)
                    .filter(|c| c.indexed)
                    .map(|c| c.data_type)
                    .ok_or_else(|| DatabaseError::NotIndexed(format!("column #{column}")))?;
                index_lookup(store, column, data_type, op, required(arg, plan)?)?
            }
        };

        debug!(path = %plan.access, rows = rowids.len(), "cursor filtered");
        self.rowids = rowids;
        self.position = 0;
        self.current = None;
        self.state = if self.rowids.is_empty() {
            CursorState::Exhausted
        } else {
            CursorState::Filtered
        };
        Ok(())
    }

    #[must_use]
    pub fn eof(&self) -> bool {
        self.position >= self.rowids.len()
    }

    pub fn next(&mut self) {
        if self.eof() {
            return;
        }
        self.position += 1;
        self.current = None;
        self.state = if self.eof() {
            CursorState::Exhausted
        } else {
            CursorState::Iterating
        };
    }

    #[must_use]
    pub fn rowid(&self) -> Option<i64> {
        self.rowids.get(self.position).copied()
    }

    /// The current row, fetched on first access since the last `next`.
    pub fn row(&mut self, store: &mut TableStore) -> Result<&Row, DatabaseError> {
        let rowid = self
            .rowid()
            .ok_or_else(|| DatabaseError::Protocol("cursor is past the last row".to_string()))?;
        if self.current.is_none() {
            let row = store
                .fetch_row(rowid)?
                .unwrap_or_else(|| Row::all_null(rowid, store.columns().len()));
            self.current = Some(row);
        }
        self.current
            .as_ref()
            .ok_or_else(|| DatabaseError::Protocol("row cache empty".to_string()))
    }

    pub fn column(&mut self, store: &mut TableStore, i: usize) -> Result<Value, DatabaseError> {
        let row = self.row(store)?;
        row.values
            .get(i)
            .cloned()
            .ok_or_else(|| DatabaseError::ColumnNotFound(format!("#{i}")))
    }
}

fn required<'a>(arg: Option<&'a Value>, plan: &QueryPlan) -> Result<&'a Value, DatabaseError> {
    arg.ok_or_else(|| DatabaseError::BadFormat(format!("plan {} needs a value", plan.access)))
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        Value::Text(s) => s.trim().parse().ok(),
        Value::Null => None,
    }
}

fn parse_rowids(members: Vec<String>) -> Result<Vec<i64>, DatabaseError> {
    members.iter().map(|m| parse_rowid(m)).collect()
}

fn full_scan(store: &mut TableStore) -> Result<Vec<i64>, DatabaseError> {
    let index = store.keys().row_index();
    let members = store
        .connection()
        .command(Command::new("ZRANGE").arg(index).arg("0").arg("-1"))?
        .into_strings()?;
    parse_rowids(members)
}

fn rowid_lookup(store: &mut TableStore, op: Operator, arg: &Value) -> Result<Vec<i64>, DatabaseError> {
    let Some(pivot) = numeric(arg) else {
        return Ok(Vec::new());
    };

    if op == Operator::Eq {
        if pivot.fract() != 0.0 {
            return Ok(Vec::new());
        }
        let rowid = pivot as i64;
        let key = store.keys().row(rowid);
        let exists = store.connection().command(Command::new("EXISTS").arg(key))?.into_integer()?;
        return Ok(if exists > 0 { vec![rowid] } else { Vec::new() });
    }

    let (min, max) = match op {
        Operator::Gt => (format!("({pivot}"), "+inf".to_string()),
        Operator::Ge => (pivot.to_string(), "+inf".to_string()),
        Operator::Lt => ("-inf".to_string(), format!("({pivot}")),
        Operator::Le | Operator::Eq => ("-inf".to_string(), pivot.to_string()),
    };
    let index = store.keys().row_index();
    let members = store
        .connection()
        .command(Command::new("ZRANGEBYSCORE").arg(index).arg(min).arg(max))?
        .into_strings()?;
    parse_rowids(members)
}

fn index_lookup(
    store: &mut TableStore,
    column: usize,
    data_type: DataType,
    op: Operator,
    arg: &Value,
) -> Result<Vec<i64>, DatabaseError> {
    // NULL never compares equal or ordered
    let Some(pivot) = arg.to_store_string() else {
        return Ok(Vec::new());
    };
    let name = store.columns()[column].name.clone();
    let keys = store.keys().clone();

    let values = if op == Operator::Eq {
        vec![pivot]
    } else {
        let index = keys.value_index(&name);
        let rank = store
            .connection()
            .command(Command::new("ZRANK").arg(&index).arg(&pivot))?
            .into_result()?;
        match rank {
            Reply::Integer(rank) => {
                // -1 is the last rank
                let bounds = match op {
                    Operator::Ge => Some((rank, -1)),
                    Operator::Gt => Some((rank + 1, -1)),
                    Operator::Le => Some((0, rank)),
                    Operator::Lt | Operator::Eq => (rank > 0).then(|| (0, rank - 1)),
                };
                if let Some((start, stop)) = bounds {
                    store
                        .connection()
                        .command(
                            Command::new("ZRANGE")
                                .arg(&index)
                                .arg(start.to_string())
                                .arg(stop.to_string()),
                        )?
                        .into_strings()?
                } else {
                    Vec::new()
                }
            }
            Reply::Nil => {
                debug!(column = %name, value = %pivot, "pivot not indexed, scanning value index");
                let all = store
                    .connection()
                    .command(Command::new("ZRANGE").arg(&index).arg("0").arg("-1"))?
                    .into_strings()?;
                all.into_iter()
                    .filter(|member| in_range(member, &pivot, data_type, op))
                    .collect()
            }
            other => {
                return Err(DatabaseError::Protocol(format!("unexpected ZRANK reply {other:?}")));
            }
        }
    };

    if values.is_empty() {
        return Ok(Vec::new());
    }
    let commands = values
        .iter()
        .map(|v| Command::new("SMEMBERS").arg(keys.value_members(&name, v)))
        .collect();
    let mut rowids = BTreeSet::new();
    for reply in store.connection().pipeline(commands)? {
        for member in reply.into_strings()? {
            rowids.insert(parse_rowid(&member)?);
        }
    }
    Ok(rowids.into_iter().collect())
}

/// Compares a value-index member against the pivot the way the index
/// orders them: by score for numeric columns, by text otherwise.
fn in_range(member: &str, pivot: &str, data_type: DataType, op: Operator) -> bool {
    let ordering = if data_type.is_numeric() {
        let score = |s: &str| Value::Text(s.to_string()).index_score(data_type);
        score(member).total_cmp(&score(pivot))
    } else {
        member.cmp(pivot)
    };
    op.accepts(ordering)
}
