/// Select driver
///
/// Turns parsed predicates into planner constraints, runs the chosen access
/// path through a cursor and evaluates the remaining predicates against
/// each fetched row. All predicates are ANDed.
use crate::parser::Predicate;
use crate::storage::TableStore;
use crate::types::{ColumnSpec, DatabaseError, Row, Value};
use super::cursor::Cursor;
use super::planner::{Constraint, QueryPlan, QueryPlanner, Target};

/// Name that addresses the row id in predicates
pub const ROWID: &str = "rowid";

pub struct QueryRunner;

impl QueryRunner {
    /// Maps predicates to constraints and picks the access path.
    pub fn plan(columns: &[ColumnSpec], predicates: &[Predicate]) -> Result<QueryPlan, DatabaseError> {
        let constraints = predicates
            .iter()
            .map(|p| Ok(Constraint::new(Self::target(columns, &p.column)?, p.op)))
            .collect::<Result<Vec<_>, DatabaseError>>()?;
        Ok(QueryPlanner::best_index(columns, &constraints))
    }

    /// Rows matching every predicate, in rowid order
    pub fn select(store: &mut TableStore, predicates: &[Predicate]) -> Result<Vec<Row>, DatabaseError> {
        let plan = Self::plan(store.columns(), predicates)?;
        let arg = plan.constraint.map(|i| &predicates[i].value);

        let mut cursor = Cursor::new();
        cursor.filter(store, &plan, arg)?;
        Self::collect(store, &mut cursor, predicates)
    }

    /// Drains a filtered cursor, keeping rows that satisfy every predicate.
    ///
    /// Rows deleted after the cursor was filtered are skipped.
    pub fn collect(
        store: &mut TableStore,
        cursor: &mut Cursor,
        predicates: &[Predicate],
    ) -> Result<Vec<Row>, DatabaseError> {
        let mut rows = Vec::with_capacity(cursor.len());
        while !cursor.eof() {
            let row = cursor.row(store)?;
            // a row deleted after filtering reads back all NULL
            if !row.is_all_null() && Self::matches(store.columns(), row, predicates)? {
                rows.push(row.clone());
            }
            cursor.next();
        }
        Ok(rows)
    }

    /// Evaluates every predicate against `row`
    pub fn matches(columns: &[ColumnSpec], row: &Row, predicates: &[Predicate]) -> Result<bool, DatabaseError> {
        for p in predicates {
            let lhs = match Self::target(columns, &p.column)? {
                Target::Rowid => Value::Integer(row.rowid),
                Target::Column(i) => row.values.get(i).cloned().unwrap_or(Value::Null),
            };
            match lhs.compare(&p.value) {
                Some(ordering) if p.op.accepts(ordering) => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }

    fn target(columns: &[ColumnSpec], name: &str) -> Result<Target, DatabaseError> {
        if name.eq_ignore_ascii_case(ROWID) {
            return Ok(Target::Rowid);
        }
        columns
            .iter()
            .position(|c| c.name == name)
            .map(Target::Column)
            .ok_or_else(|| DatabaseError::ColumnNotFound(name.to_string()))
    }
}
