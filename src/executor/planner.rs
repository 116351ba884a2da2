/// Access path selection
///
/// Picks exactly one usable constraint to drive a scan, in fixed priority:
/// - rowid equality: existence check (cost 1)
/// - rowid range: range over the row index (cost 2500)
/// - indexed column equality: membership set lookup (cost 10)
/// - indexed column range: rank range over the value index (cost 5000)
/// - otherwise a full scan of the row index (cost 10000)
///
/// Costs are fixed heuristics. The chosen path is carried between planning
/// and execution as a short string (`rowid:eq`, `index:2:ge`, `scan`).
use std::fmt;
use std::str::FromStr;
use crate::types::{ColumnSpec, DatabaseError};

pub const COST_ROWID_EQ: f64 = 1.0;
pub const COST_ROWID_RANGE: f64 = 2500.0;
pub const COST_INDEX_EQ: f64 = 10.0;
pub const COST_INDEX_RANGE: f64 = 5000.0;
pub const COST_FULL_SCAN: f64 = 10000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Operator {
    #[must_use]
    pub const fn is_range(self) -> bool {
        !matches!(self, Self::Eq)
    }

    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }

    /// Whether `lhs op rhs` holds given how `lhs` orders against `rhs`
    #[must_use]
    pub const fn accepts(self, ordering: std::cmp::Ordering) -> bool {
        match self {
            Self::Eq => ordering.is_eq(),
            Self::Gt => ordering.is_gt(),
            Self::Ge => ordering.is_ge(),
            Self::Lt => ordering.is_lt(),
            Self::Le => ordering.is_le(),
        }
    }

    const fn code(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Gt => "gt",
            Self::Ge => "ge",
            Self::Lt => "lt",
            Self::Le => "le",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        match code {
            "eq" => Some(Self::Eq),
            "gt" => Some(Self::Gt),
            "ge" => Some(Self::Ge),
            "lt" => Some(Self::Lt),
            "le" => Some(Self::Le),
            _ => None,
        }
    }
}

/// What a constraint applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Rowid,
    Column(usize),
}

/// One term of a WHERE clause as offered by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constraint {
    pub target: Target,
    pub op: Operator,
    /// Cleared by the host when the term cannot be used for this scan
    pub usable: bool,
}

impl Constraint {
    #[must_use]
    pub const fn new(target: Target, op: Operator) -> Self {
        Self { target, op, usable: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPath {
    Rowid(Operator),
    Index { column: usize, op: Operator },
    FullScan,
}

impl fmt::Display for AccessPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rowid(op) => write!(f, "rowid:{}", op.code()),
            Self::Index { column, op } => write!(f, "index:{column}:{}", op.code()),
            Self::FullScan => write!(f, "scan"),
        }
    }
}

impl FromStr for AccessPath {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || DatabaseError::BadFormat(format!("invalid access path '{s}'"));
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            ["scan"] => Ok(Self::FullScan),
            ["rowid", op] => Operator::from_code(op).map(Self::Rowid).ok_or_else(bad),
            ["index", column, op] => {
                let column = column.parse().map_err(|_| bad())?;
                let op = Operator::from_code(op).ok_or_else(bad)?;
                Ok(Self::Index { column, op })
            }
            _ => Err(bad()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub access: AccessPath,
    /// Position of the driving constraint in the host's list
    pub constraint: Option<usize>,
    pub estimated_cost: f64,
}

impl QueryPlan {
    const fn full_scan() -> Self {
        Self {
            access: AccessPath::FullScan,
            constraint: None,
            estimated_cost: COST_FULL_SCAN,
        }
    }

    /// Human readable plan, one line per property
    #[must_use]
    pub fn describe(&self, columns: &[ColumnSpec]) -> String {
        let mut out = String::new();
        match self.access {
            AccessPath::Rowid(op) if !op.is_range() => out.push_str("Rowid Lookup\n"),
            AccessPath::Rowid(op) => out.push_str(&format!("Rowid Range Scan (rowid {})\n", op.symbol())),
            AccessPath::Index { column, op } => {
                let name = columns.get(column).map_or("?", |c| c.name.as_str());
                let kind = if op.is_range() { "Index Range Scan" } else { "Index Lookup" };
                out.push_str(&format!("{kind} on {name} ({name} {})\n", op.symbol()));
            }
            AccessPath::FullScan => out.push_str("Full Scan\n"),
        }
        out.push_str(&format!("  Path: {}\n", self.access));
        out.push_str(&format!("  Cost: {:.1}\n", self.estimated_cost));
        out
    }
}

pub struct QueryPlanner;

impl QueryPlanner {
    /// Chooses the access path for `constraints` over a table with `columns`.
    #[must_use]
    pub fn best_index(columns: &[ColumnSpec], constraints: &[Constraint]) -> QueryPlan {
        let usable = || constraints.iter().enumerate().filter(|(_, c)| c.usable);
        let indexed = |target: Target| match target {
            Target::Column(i) => columns.get(i).is_some_and(|c| c.indexed),
            Target::Rowid => false,
        };

        let tiers: [(&dyn Fn(&Constraint) -> bool, f64); 4] = [
            (&|c: &Constraint| c.target == Target::Rowid && !c.op.is_range(), COST_ROWID_EQ),
            (&|c: &Constraint| c.target == Target::Rowid && c.op.is_range(), COST_ROWID_RANGE),
            (&|c: &Constraint| indexed(c.target) && !c.op.is_range(), COST_INDEX_EQ),
            (&|c: &Constraint| indexed(c.target) && c.op.is_range(), COST_INDEX_RANGE),
        ];

        for (matches, cost) in tiers {
            if let Some((i, c)) = usable().find(|&(_, c)| matches(c)) {
                let access = match c.target {
                    Target::Rowid => AccessPath::Rowid(c.op),
                    Target::Column(column) => AccessPath::Index { column, op: c.op },
                };
                return QueryPlan {
                    access,
                    constraint: Some(i),
                    estimated_cost: cost,
                };
            }
        }
        QueryPlan::full_scan()
    }
}
