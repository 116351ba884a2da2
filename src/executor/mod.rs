/// Executor module - plans access paths and iterates matching rows
///
/// Structure:
/// - planner: best-index selection and plan encoding
/// - cursor: runs a plan against a table and reads rows lazily
/// - query: predicate-driven selects on top of the two

pub mod cursor;
pub mod planner;
pub mod query;

pub use cursor::{Cursor, CursorState};
pub use planner::{AccessPath, Constraint, Operator, QueryPlan, QueryPlanner, Target};
pub use query::QueryRunner;
