use tracing::{debug, info, warn};
use crate::network::{Command, ConnectionManager, Reply};
use crate::types::{ColumnSpec, DatabaseError, KeySpace, Row, Value};
use super::parse_rowid;
use super::scripts::DROP_INDEX_ENTRIES;
use super::transaction::{Ack, Outcome, TransactionBatch};

/// Rows fetched per round trip while backfilling a new index
const BACKFILL_BATCH: usize = 256;

/// Reads of one backfill chunk before giving up on a busy table
const BACKFILL_ATTEMPTS: usize = 8;

/// TableStore - one table handle over the key-value store
///
/// Owns its connection exclusively. Every mutation is a single MULTI/EXEC
/// unit, so handles in other processes can share the key space safely.
#[derive(Debug)]
pub struct TableStore {
    keys: KeySpace,
    columns: Vec<ColumnSpec>,
    conn: ConnectionManager,
}

impl TableStore {
    /// Connects and loads the index registry, flagging indexed columns.
    pub fn open(
        keys: KeySpace,
        columns: Vec<ColumnSpec>,
        mut conn: ConnectionManager,
    ) -> Result<Self, DatabaseError> {
        if columns.is_empty() {
            return Err(DatabaseError::BadFormat("table needs at least one column".to_string()));
        }
        conn.connect()?;

        let mut store = Self { keys, columns, conn };
        let indexed = store
            .conn
            .command(Command::new("SMEMBERS").arg(store.keys.index_registry()))?
            .into_strings()?;
        for col in &mut store.columns {
            col.indexed = indexed.contains(&col.name);
        }
        info!(
            table = store.keys.base(),
            columns = store.columns.len(),
            indexed = indexed.len(),
            "table opened"
        );
        Ok(store)
    }

    #[must_use]
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    #[must_use]
    pub const fn keys(&self) -> &KeySpace {
        &self.keys
    }

    pub fn connection(&mut self) -> &mut ConnectionManager {
        &mut self.conn
    }

    /// Position of the named column
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn generate_rowid(&mut self) -> Result<i64, DatabaseError> {
        self.conn
            .command(Command::new("INCR").arg(self.keys.rowid_sequence()))?
            .into_integer()
    }

    /// Inserts a row under a fresh rowid and returns it.
    pub fn insert(&mut self, values: &[Value]) -> Result<i64, DatabaseError> {
        self.check_values(values)?;
        let rowid = self.generate_rowid()?;

        let mut batch = TransactionBatch::new();
        batch.push(self.hset(rowid, values), Ack::Integer);
        batch.push(
            Command::new("ZADD")
                .arg(self.keys.row_index())
                .arg(rowid.to_string())
                .arg(rowid.to_string()),
            Ack::Exactly(1),
        );
        self.push_index_entries(&mut batch, rowid, values);

        match batch.execute(&mut self.conn)? {
            Outcome::Committed(_) => {
                debug!(table = self.keys.base(), rowid, "row inserted");
                Ok(rowid)
            }
            Outcome::Aborted => Err(DatabaseError::Protocol("unwatched insert was aborted".to_string())),
        }
    }

    /// Replaces every value of an existing row, moving its index entries.
    ///
    /// The row key is watched from before the existence check until commit;
    /// a concurrent write in that window yields `TransactionConflict`.
    pub fn update(&mut self, rowid: i64, values: &[Value]) -> Result<(), DatabaseError> {
        self.check_values(values)?;
        let row_key = self.keys.row(rowid);

        self.conn.command(Command::new("WATCH").arg(&row_key))?.into_result()?;
        let exists = self.conn.command(Command::new("EXISTS").arg(&row_key))?.into_integer()?;
        if exists == 0 {
            self.conn.command(Command::new("UNWATCH"))?;
            return Err(DatabaseError::RowNotFound(rowid));
        }

        let mut batch = TransactionBatch::new();
        batch.watch(&row_key);
        if let Some(cleanup) = self.drop_index_entries(rowid) {
            batch.push(cleanup, Ack::Integer);
        }
        let nulls: Vec<&str> = self
            .columns
            .iter()
            .zip(values)
            .filter(|(_, v)| v.is_null())
            .map(|(c, _)| c.name.as_str())
            .collect();
        if !nulls.is_empty() {
            batch.push(Command::new("HDEL").arg(&row_key).args(nulls), Ack::Integer);
        }
        batch.push(self.hset(rowid, values), Ack::Integer);
        self.push_index_entries(&mut batch, rowid, values);

        match batch.execute(&mut self.conn)? {
            Outcome::Committed(_) => {
                debug!(table = self.keys.base(), rowid, "row updated");
                Ok(())
            }
            Outcome::Aborted => {
                warn!(table = self.keys.base(), rowid, "update lost to a concurrent writer");
                Err(DatabaseError::TransactionConflict { rowid })
            }
        }
    }

    /// Deletes a row and its index entries. Returns whether the row existed.
    pub fn delete(&mut self, rowid: i64) -> Result<bool, DatabaseError> {
        let mut batch = TransactionBatch::new();
        if let Some(cleanup) = self.drop_index_entries(rowid) {
            batch.push(cleanup, Ack::Integer);
        }
        batch.push(Command::new("DEL").arg(self.keys.row(rowid)), Ack::Integer);
        batch.push(
            Command::new("ZREM").arg(self.keys.row_index()).arg(rowid.to_string()),
            Ack::Integer,
        );

        match batch.execute(&mut self.conn)? {
            Outcome::Committed(results) => {
                let existed = results.iter().rev().nth(1).and_then(Reply::as_integer) == Some(1);
                debug!(table = self.keys.base(), rowid, existed, "row deleted");
                Ok(existed)
            }
            Outcome::Aborted => Err(DatabaseError::Protocol("unwatched delete was aborted".to_string())),
        }
    }

    /// Reads a row with one multi-field fetch. `None` when the row is gone.
    pub fn fetch_row(&mut self, rowid: i64) -> Result<Option<Row>, DatabaseError> {
        let fields = self
            .conn
            .command(
                Command::new("HMGET")
                    .arg(self.keys.row(rowid))
                    .args(self.columns.iter().map(|c| c.name.as_str())),
            )?
            .into_optional_strings()?;
        if fields.len() != self.columns.len() {
            return Err(DatabaseError::Protocol(format!(
                "HMGET returned {} fields for {} columns",
                fields.len(),
                self.columns.len()
            )));
        }
        if fields.iter().all(Option::is_none) {
            return Ok(None);
        }
        let values = fields
            .into_iter()
            .zip(&self.columns)
            .map(|(raw, col)| Value::from_store(raw, col.data_type))
            .collect();
        Ok(Some(Row::new(rowid, values)))
    }

    /// Registers an index on `column` and backfills it from existing rows.
    /// Returns the number of rows indexed.
    pub fn create_index(&mut self, column: &str) -> Result<usize, DatabaseError> {
        let idx = self
            .column_index(column)
            .ok_or_else(|| DatabaseError::ColumnNotFound(column.to_string()))?;

        self.conn
            .command(Command::new("SADD").arg(self.keys.index_registry()).arg(column))?
            .into_integer()?;
        self.columns[idx].indexed = true;

        let rowids = self
            .conn
            .command(Command::new("ZRANGE").arg(self.keys.row_index()).arg("0").arg("-1"))?
            .into_strings()?
            .iter()
            .map(|s| parse_rowid(s))
            .collect::<Result<Vec<_>, _>>()?;

        let mut indexed = 0;
        for chunk in rowids.chunks(BACKFILL_BATCH) {
            indexed += self.backfill_chunk(idx, chunk)?;
        }

        info!(table = self.keys.base(), column, rows = indexed, "index created");
        Ok(indexed)
    }

    /// Indexes one chunk of existing rows.
    ///
    /// The rows are watched before their values are read, so a concurrent
    /// update aborts the commit and the chunk is read again. Index writes
    /// are idempotent, which makes the retry safe.
    fn backfill_chunk(&mut self, idx: usize, chunk: &[i64]) -> Result<usize, DatabaseError> {
        let column = self.columns[idx].name.clone();
        let row_keys: Vec<String> = chunk.iter().map(|rowid| self.keys.row(*rowid)).collect();

        for attempt in 1..=BACKFILL_ATTEMPTS {
            let mut commands = vec![Command::new("WATCH").args(&row_keys)];
            commands.extend(row_keys.iter().map(|key| Command::new("HGET").arg(key).arg(&column)));
            let mut replies = self.conn.pipeline(commands)?.into_iter();
            replies
                .next()
                .ok_or_else(|| DatabaseError::Protocol("no reply to WATCH".to_string()))?
                .into_result()?;

            let mut batch = TransactionBatch::new();
            for key in &row_keys {
                batch.watch(key);
            }
            let mut indexed = 0;
            for (rowid, reply) in chunk.iter().zip(replies) {
                let Reply::Bulk(raw) = reply.into_result()? else {
                    continue;
                };
                let value = Value::from_store(Some(raw), self.columns[idx].data_type);
                self.push_column_entry(&mut batch, idx, *rowid, &value);
                indexed += 1;
            }
            if batch.is_empty() {
                self.conn.command(Command::new("UNWATCH"))?.into_result()?;
                return Ok(0);
            }

            match batch.execute(&mut self.conn)? {
                Outcome::Committed(_) => return Ok(indexed),
                Outcome::Aborted => {
                    debug!(table = self.keys.base(), column = %column, attempt, "backfill chunk changed, reading again");
                }
            }
        }

        warn!(table = self.keys.base(), column = %column, "backfill kept losing to concurrent writers");
        Err(DatabaseError::TransactionConflict { rowid: chunk.first().copied().unwrap_or_default() })
    }

    fn check_values(&self, values: &[Value]) -> Result<(), DatabaseError> {
        if values.len() != self.columns.len() {
            return Err(DatabaseError::WrongArity {
                expected: self.columns.len(),
                got: values.len(),
            });
        }
        if values.iter().all(Value::is_null) {
            return Err(DatabaseError::EmptyRow);
        }
        Ok(())
    }

    /// HSET of every non-null value
    fn hset(&self, rowid: i64, values: &[Value]) -> Command {
        let mut cmd = Command::new("HSET").arg(self.keys.row(rowid));
        for (col, value) in self.columns.iter().zip(values) {
            if let Some(stored) = value.to_store_string() {
                cmd = cmd.arg(&col.name).arg(stored);
            }
        }
        cmd
    }

    /// The cleanup script call, or `None` when nothing is indexed.
    fn drop_index_entries(&self, rowid: i64) -> Option<Command> {
        let indexed: Vec<&str> = self
            .columns
            .iter()
            .filter(|c| c.indexed)
            .map(|c| c.name.as_str())
            .collect();
        if indexed.is_empty() {
            return None;
        }
        Some(
            Command::new("EVAL")
                .arg(DROP_INDEX_ENTRIES)
                .arg("1")
                .arg(self.keys.row(rowid))
                .arg(self.keys.base())
                .arg(rowid.to_string())
                .args(indexed),
        )
    }

    fn push_index_entries(&self, batch: &mut TransactionBatch, rowid: i64, values: &[Value]) {
        for (idx, value) in values.iter().enumerate() {
            if self.columns[idx].indexed {
                self.push_column_entry(batch, idx, rowid, value);
            }
        }
    }

    /// Adds `value` to the column's sorted index and `rowid` to its
    /// membership set. NULLs are never indexed.
    fn push_column_entry(&self, batch: &mut TransactionBatch, idx: usize, rowid: i64, value: &Value) {
        let Some(stored) = value.to_store_string() else {
            return;
        };
        let col = &self.columns[idx];
        let score = value.index_score(col.data_type);
        batch.push(
            Command::new("ZADD")
                .arg(self.keys.value_index(&col.name))
                .arg(score.to_string())
                .arg(&stored),
            Ack::Integer,
        );
        batch.push(
            Command::new("SADD")
                .arg(self.keys.value_members(&col.name, &stored))
                .arg(rowid.to_string()),
            Ack::Integer,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use crate::network::{ConnectionOptions, ConnectionManager};
    use crate::parser::parse_columns;
    use crate::testing::{addr, Dataset, MemoryCluster};
    use crate::types::ConnectionSpec;

    const SERVER: &str = "db:6379";

    fn open(cluster: &MemoryCluster, defs: &[&str]) -> TableStore {
        let conn = ConnectionManager::with_connector(
            ConnectionSpec::direct(addr(SERVER)),
            ConnectionOptions::default(),
            cluster.connector(),
        );
        TableStore::open(KeySpace::new("rt", "main", "t"), parse_columns(defs).unwrap(), conn).unwrap()
    }

    fn setup(defs: &[&str]) -> (MemoryCluster, Arc<Mutex<Dataset>>, TableStore) {
        let cluster = MemoryCluster::new();
        let data = cluster.add_server(&addr(SERVER));
        let store = open(&cluster, defs);
        (cluster, data, store)
    }

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn test_open_requires_columns() {
        let cluster = MemoryCluster::new();
        cluster.add_server(&addr(SERVER));
        let conn = ConnectionManager::with_connector(
            ConnectionSpec::direct(addr(SERVER)),
            ConnectionOptions::default(),
            cluster.connector(),
        );
        let err = TableStore::open(KeySpace::new("rt", "main", "t"), vec![], conn);
        assert!(matches!(err, Err(DatabaseError::BadFormat(_))));
    }

    #[test]
    fn test_open_loads_index_registry() {
        let cluster = MemoryCluster::new();
        cluster.add_server(&addr(SERVER));
        let mut first = open(&cluster, &["name TEXT", "n INTEGER"]);
        first.create_index("n").unwrap();

        let second = open(&cluster, &["name TEXT", "n INTEGER"]);
        let flags: Vec<bool> = second.columns().iter().map(|c| c.indexed).collect();
        assert_eq!(flags, vec![false, true]);
    }

    #[test]
    fn test_generate_rowid_is_monotonic() {
        let (_cluster, _data, mut store) = setup(&["a"]);
        assert_eq!(store.generate_rowid().unwrap(), 1);
        assert_eq!(store.generate_rowid().unwrap(), 2);
    }

    #[test]
    fn test_insert_populates_row_index() {
        let (_cluster, data, mut store) = setup(&["name TEXT", "n INTEGER"]);
        let rows = [
            vec![text("a"), Value::Integer(1)],
            vec![text("b"), Value::Null],
            vec![Value::Null, Value::Integer(3)],
        ];
        let ids: Vec<i64> = rows.iter().map(|r| store.insert(r).unwrap()).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let index = data.lock().unwrap().zset("rt.main.t.index.rowid");
        assert_eq!(index.len(), 3);
        for (id, row) in ids.iter().zip(&rows) {
            let fetched = store.fetch_row(*id).unwrap().unwrap();
            assert_eq!(&fetched.values, row);
        }
        let hash = data.lock().unwrap().hash("rt.main.t:2").unwrap();
        assert!(!hash.contains_key("n"));
    }

    #[test]
    fn test_insert_rejects_bad_rows() {
        let (_cluster, _data, mut store) = setup(&["a", "b"]);
        assert!(matches!(
            store.insert(&[text("x")]),
            Err(DatabaseError::WrongArity { expected: 2, got: 1 })
        ));
        assert!(matches!(store.insert(&[Value::Null, Value::Null]), Err(DatabaseError::EmptyRow)));
    }

    #[test]
    fn test_insert_writes_index_entries() {
        let (_cluster, data, mut store) = setup(&["name TEXT", "n INTEGER"]);
        store.create_index("n").unwrap();
        store.create_index("name").unwrap();
        let id = store.insert(&[text("bob"), Value::Integer(7)]).unwrap();

        let data = data.lock().unwrap();
        assert_eq!(data.zset("rt.main.t.index:n"), vec![(7.0, "7".to_string())]);
        assert_eq!(data.members("rt.main.t.index:n:7"), vec![id.to_string()]);
        assert_eq!(data.zset("rt.main.t.index:name"), vec![(0.0, "bob".to_string())]);
        assert_eq!(data.members("rt.main.t.index:name:bob"), vec![id.to_string()]);
    }

    #[test]
    fn test_fetch_row_applies_affinity() {
        let (_cluster, data, mut store) = setup(&["i INTEGER", "f REAL", "t TEXT"]);
        {
            let mut data = data.lock().unwrap();
            data.set_hash_field("rt.main.t:9", "i", "12");
            data.set_hash_field("rt.main.t:9", "f", "2.5");
            data.set_hash_field("rt.main.t:9", "t", "42");
        }
        let row = store.fetch_row(9).unwrap().unwrap();
        assert_eq!(row.values, vec![Value::Integer(12), Value::Float(2.5), text("42")]);
        assert_eq!(store.fetch_row(10).unwrap(), None);
    }

    #[test]
    fn test_delete_removes_everything() {
        let (_cluster, data, mut store) = setup(&["name TEXT", "n INTEGER"]);
        store.create_index("n").unwrap();
        let keep = store.insert(&[text("a"), Value::Integer(5)]).unwrap();
        let gone = store.insert(&[text("b"), Value::Integer(5)]).unwrap();
        let solo = store.insert(&[text("c"), Value::Integer(6)]).unwrap();

        assert!(store.delete(gone).unwrap());
        assert!(store.delete(solo).unwrap());
        assert!(!store.delete(solo).unwrap());

        let data = data.lock().unwrap();
        assert!(!data.exists("rt.main.t:2"));
        assert!(!data.exists("rt.main.t:3"));
        assert_eq!(
            data.zset("rt.main.t.index.rowid"),
            vec![(keep as f64, keep.to_string())]
        );
        assert_eq!(data.members("rt.main.t.index:n:5"), vec![keep.to_string()]);
        assert!(!data.exists("rt.main.t.index:n:6"));
        assert_eq!(data.zset("rt.main.t.index:n"), vec![(5.0, "5".to_string())]);
    }

    #[test]
    fn test_update_moves_index_membership() {
        let (_cluster, data, mut store) = setup(&["name TEXT", "n INTEGER"]);
        store.create_index("n").unwrap();
        let a = store.insert(&[text("a"), Value::Integer(1)]).unwrap();
        let b = store.insert(&[text("b"), Value::Integer(1)]).unwrap();

        store.update(a, &[text("a"), Value::Integer(2)]).unwrap();
        {
            let d = data.lock().unwrap();
            assert_eq!(d.members("rt.main.t.index:n:1"), vec![b.to_string()]);
            assert_eq!(d.members("rt.main.t.index:n:2"), vec![a.to_string()]);
        }

        store.update(b, &[text("b"), Value::Integer(2)]).unwrap();
        let d = data.lock().unwrap();
        assert!(!d.exists("rt.main.t.index:n:1"));
        assert_eq!(d.zset("rt.main.t.index:n"), vec![(2.0, "2".to_string())]);
        let mut members = d.members("rt.main.t.index:n:2");
        members.sort();
        assert_eq!(members, vec![a.to_string(), b.to_string()]);
    }

    #[test]
    fn test_update_to_null_drops_field() {
        let (_cluster, data, mut store) = setup(&["name TEXT", "n INTEGER"]);
        store.create_index("n").unwrap();
        let id = store.insert(&[text("a"), Value::Integer(1)]).unwrap();
        store.update(id, &[text("a"), Value::Null]).unwrap();

        assert_eq!(store.fetch_row(id).unwrap().unwrap().values, vec![text("a"), Value::Null]);
        assert!(!data.lock().unwrap().exists("rt.main.t.index:n"));
    }

    #[test]
    fn test_update_missing_row() {
        let (_cluster, _data, mut store) = setup(&["a"]);
        assert!(matches!(store.update(42, &[text("x")]), Err(DatabaseError::RowNotFound(42))));
    }

    #[test]
    fn test_concurrent_update_conflicts() {
        let (cluster, data, mut loser) = setup(&["name TEXT", "n INTEGER"]);
        loser.create_index("n").unwrap();
        let id = loser.insert(&[text("a"), Value::Integer(1)]).unwrap();

        let mut winner = open(&cluster, &["name TEXT", "n INTEGER"]);
        cluster.before_next_exec(move || {
            winner.update(id, &[text("w"), Value::Integer(3)]).unwrap();
        });

        let err = loser.update(id, &[text("l"), Value::Integer(2)]);
        assert!(matches!(err, Err(DatabaseError::TransactionConflict { rowid }) if rowid == id));

        let row = loser.fetch_row(id).unwrap().unwrap();
        assert_eq!(row.values, vec![text("w"), Value::Integer(3)]);
        let d = data.lock().unwrap();
        assert_eq!(d.members("rt.main.t.index:n:3"), vec![id.to_string()]);
        assert!(!d.exists("rt.main.t.index:n:2"));
        assert!(!d.exists("rt.main.t.index:n:1"));
    }

    #[test]
    fn test_create_index_backfills() {
        let (_cluster, data, mut store) = setup(&["name TEXT", "n INTEGER"]);
        store.insert(&[text("a"), Value::Integer(4)]).unwrap();
        store.insert(&[text("b"), Value::Null]).unwrap();
        store.insert(&[text("c"), Value::Integer(4)]).unwrap();

        assert_eq!(store.create_index("n").unwrap(), 2);
        assert!(store.columns()[1].indexed);
        let d = data.lock().unwrap();
        assert_eq!(d.members("rt.main.t.indices"), vec!["n".to_string()]);
        assert_eq!(d.members("rt.main.t.index:n:4"), vec!["1".to_string(), "3".to_string()]);
    }

    #[test]
    fn test_create_index_rereads_rows_changed_during_backfill() {
        let (cluster, data, mut store) = setup(&["name TEXT", "n INTEGER"]);
        let id = store.insert(&[text("a"), Value::Integer(4)]).unwrap();

        // opened after the registry entry exists, so it maintains the index itself
        let hook_cluster = cluster.clone();
        cluster.before_next_exec(move || {
            let mut other = open(&hook_cluster, &["name TEXT", "n INTEGER"]);
            other.update(id, &[text("a"), Value::Integer(9)]).unwrap();
        });

        assert_eq!(store.create_index("n").unwrap(), 1);

        let d = data.lock().unwrap();
        assert_eq!(d.members("rt.main.t.index:n:9"), vec![id.to_string()]);
        assert!(!d.exists("rt.main.t.index:n:4"));
        assert_eq!(d.zset("rt.main.t.index:n"), vec![(9.0, "9".to_string())]);
    }

    #[test]
    fn test_create_index_unknown_column() {
        let (_cluster, _data, mut store) = setup(&["a"]);
        assert!(matches!(store.create_index("zz"), Err(DatabaseError::ColumnNotFound(_))));
    }

    #[test]
    fn test_insert_survives_dropped_send() {
        let (cluster, data, mut store) = setup(&["a"]);
        cluster.fail_next_sends(1);
        let id = store.insert(&[text("x")]).unwrap();
        assert_eq!(data.lock().unwrap().zset("rt.main.t.index.rowid").len(), 1);
        assert_eq!(store.fetch_row(id).unwrap().unwrap().values, vec![text("x")]);
    }
}
