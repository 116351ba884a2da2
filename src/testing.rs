//! In-process stand-in for Redis servers and sentinels, used by unit tests.
//!
//! Implements the command subset the table layer issues, including
//! WATCH/MULTI/EXEC and the index cleanup script, plus hooks for dropped
//! sends and for a concurrent writer committing just before EXEC.
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use crate::network::{Command, Connector, Reply, Transport};
use crate::storage::scripts::DROP_INDEX_ENTRIES;
use crate::types::{Address, DatabaseError};

type Hook = Box<dyn FnOnce() + Send>;

#[derive(Debug, Default)]
pub struct Dataset {
    strings: HashMap<String, String>,
    hashes: HashMap<String, BTreeMap<String, String>>,
    sets: HashMap<String, BTreeSet<String>>,
    zsets: HashMap<String, Vec<(f64, String)>>,
    versions: HashMap<String, u64>,
}

impl Dataset {
    pub fn touch(&mut self, key: &str) {
        *self.versions.entry(key.to_string()).or_insert(0) += 1;
    }

    fn version(&self, key: &str) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    pub fn exists(&self, key: &str) -> bool {
        self.strings.contains_key(key)
            || self.hashes.contains_key(key)
            || self.sets.contains_key(key)
            || self.zsets.contains_key(key)
    }

    pub fn hash(&self, key: &str) -> Option<BTreeMap<String, String>> {
        self.hashes.get(key).cloned()
    }

    pub fn string(&self, key: &str) -> Option<String> {
        self.strings.get(key).cloned()
    }

    pub fn members(&self, key: &str) -> Vec<String> {
        self.sets.get(key).map(|s| s.iter().cloned().collect()).unwrap_or_default()
    }

    pub fn zset(&self, key: &str) -> Vec<(f64, String)> {
        self.zsets.get(key).cloned().unwrap_or_default()
    }

    pub fn set_hash_field(&mut self, key: &str, field: &str, value: &str) {
        self.hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        self.touch(key);
    }

    pub fn delete(&mut self, key: &str) -> bool {
        let existed = self.strings.remove(key).is_some()
            | self.hashes.remove(key).is_some()
            | self.sets.remove(key).is_some()
            | self.zsets.remove(key).is_some();
        if existed {
            self.touch(key);
        }
        existed
    }

    fn srem(&mut self, key: &str, member: &str) -> i64 {
        let Some(set) = self.sets.get_mut(key) else {
            return 0;
        };
        let removed = i64::from(set.remove(member));
        if set.is_empty() {
            self.sets.remove(key);
        }
        if removed > 0 {
            self.touch(key);
        }
        removed
    }

    fn zrem(&mut self, key: &str, member: &str) -> i64 {
        let Some(zset) = self.zsets.get_mut(key) else {
            return 0;
        };
        let before = zset.len();
        zset.retain(|(_, m)| m != member);
        let removed = (before - zset.len()) as i64;
        if zset.is_empty() {
            self.zsets.remove(key);
        }
        if removed > 0 {
            self.touch(key);
        }
        removed
    }

    fn zadd(&mut self, key: &str, score: f64, member: &str) -> i64 {
        let zset = self.zsets.entry(key.to_string()).or_default();
        let added = if let Some(entry) = zset.iter_mut().find(|(_, m)| m == member) {
            entry.0 = score;
            0
        } else {
            zset.push((score, member.to_string()));
            1
        };
        zset.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        self.touch(key);
        added
    }

    /// Native rendition of the index cleanup script.
    fn drop_index_entries(&mut self, row_key: &str, base: &str, rowid: &str, columns: &[String]) -> i64 {
        let mut removed = 0;
        for col in columns {
            let Some(value) = self.hashes.get(row_key).and_then(|h| h.get(col)).cloned() else {
                continue;
            };
            let members = format!("{base}.index:{col}:{value}");
            removed += self.srem(&members, rowid);
            if !self.sets.contains_key(&members) {
                self.zrem(&format!("{base}.index:{col}"), &value);
            }
        }
        removed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentinelAnswer {
    Master(Address),
    NameUnknown,
    MasterUnknown,
}

#[derive(Debug, Clone)]
pub struct SentinelNode {
    pub answer: SentinelAnswer,
    pub siblings: Vec<Address>,
}

#[derive(Clone)]
enum Node {
    Data(Arc<Mutex<Dataset>>),
    Sentinel(SentinelNode),
}

#[derive(Default)]
struct ClusterState {
    nodes: HashMap<Address, Node>,
    failing_sends: usize,
    before_exec: Option<Hook>,
    connects: Vec<Address>,
}

/// A set of fake servers addressable by `Address`.
#[derive(Clone, Default)]
pub struct MemoryCluster {
    state: Arc<Mutex<ClusterState>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a data server and returns its dataset.
    pub fn add_server(&self, address: &Address) -> Arc<Mutex<Dataset>> {
        let data = Arc::new(Mutex::new(Dataset::default()));
        lock(&self.state)
            .nodes
            .insert(address.clone(), Node::Data(Arc::clone(&data)));
        data
    }

    pub fn add_sentinel(&self, address: &Address, answer: SentinelAnswer, siblings: Vec<Address>) {
        lock(&self.state)
            .nodes
            .insert(address.clone(), Node::Sentinel(SentinelNode { answer, siblings }));
    }

    pub fn remove(&self, address: &Address) {
        lock(&self.state).nodes.remove(address);
    }

    /// The next `n` sends to data servers fail with a broken pipe.
    pub fn fail_next_sends(&self, n: usize) {
        lock(&self.state).failing_sends = n;
    }

    /// Runs `hook` right before the next EXEC is applied.
    pub fn before_next_exec(&self, hook: impl FnOnce() + Send + 'static) {
        lock(&self.state).before_exec = Some(Box::new(hook));
    }

    /// Every address a connection was opened to, in order.
    pub fn connects(&self) -> Vec<Address> {
        lock(&self.state).connects.clone()
    }

    pub fn connector(&self) -> Box<dyn Connector> {
        Box::new(MemoryConnector { cluster: self.clone() })
    }
}

pub struct MemoryConnector {
    cluster: MemoryCluster,
}

impl Connector for MemoryConnector {
    fn connect(
        &self,
        address: &Address,
        _connect_timeout: Option<Duration>,
        _io_timeout: Option<Duration>,
    ) -> Result<Box<dyn Transport>, DatabaseError> {
        let mut state = lock(&self.cluster.state);
        let node = state
            .nodes
            .get(address)
            .cloned()
            .ok_or_else(|| DatabaseError::Connection(format!("{address}: connection refused")))?;
        state.connects.push(address.clone());
        Ok(Box::new(MemoryTransport {
            cluster: self.cluster.clone(),
            node,
            replies: VecDeque::new(),
            watched: Vec::new(),
            multi: None,
        }))
    }
}

struct MemoryTransport {
    cluster: MemoryCluster,
    node: Node,
    replies: VecDeque<Reply>,
    watched: Vec<(String, u64)>,
    multi: Option<Vec<Command>>,
}

fn err(msg: &str) -> Reply {
    Reply::Error(format!("ERR {msg}"))
}

fn int_arg(cmd: &Command, i: usize) -> Option<i64> {
    cmd.arg_str(i)?.parse().ok()
}

fn score_bound(raw: &str) -> Option<(f64, bool)> {
    let (raw, exclusive) = raw.strip_prefix('(').map_or((raw, false), |r| (r, true));
    let value = match raw {
        "-inf" => f64::NEG_INFINITY,
        "+inf" | "inf" => f64::INFINITY,
        other => other.parse().ok()?,
    };
    Some((value, exclusive))
}

fn bulk_array(items: impl IntoIterator<Item = String>) -> Reply {
    Reply::Array(items.into_iter().map(Reply::Bulk).collect())
}

fn apply(data: &mut Dataset, cmd: &Command) -> Reply {
    let args: Vec<String> = (1..cmd.argv().len()).filter_map(|i| cmd.arg_str(i)).collect();
    let key = args.first().cloned().unwrap_or_default();

    match cmd.name().as_str() {
        "PING" => Reply::Status("PONG".into()),
        "INCR" => {
            let current = data.strings.get(&key).map_or(Ok(0), |v| v.parse::<i64>());
            let Ok(current) = current else {
                return err("value is not an integer or out of range");
            };
            data.strings.insert(key.clone(), (current + 1).to_string());
            data.touch(&key);
            Reply::Integer(current + 1)
        }
        "EXISTS" => Reply::Integer(args.iter().filter(|k| data.exists(k)).count() as i64),
        "DEL" => Reply::Integer(args.iter().filter(|k| data.delete(k)).count() as i64),
        "HSET" => {
            if args.len() < 3 || args.len() % 2 == 0 {
                return err("wrong number of arguments for 'hset' command");
            }
            let hash = data.hashes.entry(key.clone()).or_default();
            let mut added = 0;
            for pair in args[1..].chunks(2) {
                if hash.insert(pair[0].clone(), pair[1].clone()).is_none() {
                    added += 1;
                }
            }
            data.touch(&key);
            Reply::Integer(added)
        }
        "HDEL" => {
            let Some(hash) = data.hashes.get_mut(&key) else {
                return Reply::Integer(0);
            };
            let removed = args[1..].iter().filter(|f| hash.remove(*f).is_some()).count();
            if hash.is_empty() {
                data.hashes.remove(&key);
            }
            if removed > 0 {
                data.touch(&key);
            }
            Reply::Integer(removed as i64)
        }
        "HGET" => data
            .hashes
            .get(&key)
            .and_then(|h| h.get(args.get(1)?))
            .map_or(Reply::Nil, |v| Reply::Bulk(v.clone())),
        "HMGET" => {
            let hash = data.hashes.get(&key);
            Reply::Array(
                args[1..]
                    .iter()
                    .map(|f| hash.and_then(|h| h.get(f)).map_or(Reply::Nil, |v| Reply::Bulk(v.clone())))
                    .collect(),
            )
        }
        "HGETALL" => bulk_array(
            data.hashes
                .get(&key)
                .into_iter()
                .flat_map(|h| h.iter().flat_map(|(k, v)| [k.clone(), v.clone()])),
        ),
        "SADD" => {
            let set = data.sets.entry(key.clone()).or_default();
            let added = args[1..].iter().filter(|m| set.insert((*m).clone())).count();
            data.touch(&key);
            Reply::Integer(added as i64)
        }
        "SREM" => Reply::Integer(args[1..].iter().map(|m| data.srem(&key, m)).sum()),
        "SMEMBERS" => bulk_array(data.members(&key)),
        "SCARD" => Reply::Integer(data.sets.get(&key).map_or(0, BTreeSet::len) as i64),
        "SISMEMBER" => Reply::Integer(i64::from(
            data.sets.get(&key).is_some_and(|s| args.get(1).is_some_and(|m| s.contains(m))),
        )),
        "ZADD" => {
            if args.len() < 3 || args.len() % 2 == 0 {
                return err("syntax error");
            }
            let mut added = 0;
            for pair in args[1..].chunks(2) {
                let Ok(score) = pair[0].parse::<f64>() else {
                    return err("value is not a valid float");
                };
                added += data.zadd(&key, score, &pair[1]);
            }
            Reply::Integer(added)
        }
        "ZREM" => Reply::Integer(args[1..].iter().map(|m| data.zrem(&key, m)).sum()),
        "ZCARD" => Reply::Integer(data.zsets.get(&key).map_or(0, Vec::len) as i64),
        "ZRANK" => data
            .zsets
            .get(&key)
            .and_then(|z| z.iter().position(|(_, m)| Some(m) == args.get(1)))
            .map_or(Reply::Nil, |rank| Reply::Integer(rank as i64)),
        "ZRANGE" => {
            let (Some(start), Some(stop)) = (int_arg(cmd, 2), int_arg(cmd, 3)) else {
                return err("value is not an integer or out of range");
            };
            let zset = data.zset(&key);
            let len = zset.len() as i64;
            let start = if start < 0 { (len + start).max(0) } else { start };
            let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
            if start > stop || start >= len {
                return Reply::Array(Vec::new());
            }
            bulk_array(zset[start as usize..=stop as usize].iter().map(|(_, m)| m.clone()))
        }
        "ZRANGEBYSCORE" => {
            let (Some(min), Some(max)) = (
                args.get(1).and_then(|a| score_bound(a)),
                args.get(2).and_then(|a| score_bound(a)),
            ) else {
                return err("min or max is not a float");
            };
            bulk_array(
                data.zset(&key)
                    .into_iter()
                    .filter(|(s, _)| if min.1 { *s > min.0 } else { *s >= min.0 })
                    .filter(|(s, _)| if max.1 { *s < max.0 } else { *s <= max.0 })
                    .map(|(_, m)| m),
            )
        }
        "EVAL" => {
            if args.first().map(String::as_str) != Some(DROP_INDEX_ENTRIES) {
                return err("unknown script");
            }
            // EVAL script 1 row_key base rowid col...
            if args.len() < 5 || args[1] != "1" {
                return err("wrong number of arguments for cleanup script");
            }
            Reply::Integer(data.drop_index_entries(&args[2], &args[3], &args[4], &args[5..]))
        }
        other => err(&format!("unknown command '{other}'")),
    }
}

impl MemoryTransport {
    fn dispatch_sentinel(node: &SentinelNode, cmd: &Command) -> Reply {
        if cmd.name() != "SENTINEL" {
            return Reply::Status("PONG".into());
        }
        match cmd.arg_str(1).unwrap_or_default().to_ascii_lowercase().as_str() {
            "get-master-addr-by-name" => match &node.answer {
                SentinelAnswer::Master(addr) => Reply::Array(vec![
                    Reply::Bulk(addr.host.clone()),
                    Reply::Bulk(addr.port.to_string()),
                ]),
                SentinelAnswer::NameUnknown => Reply::Nil,
                SentinelAnswer::MasterUnknown => {
                    Reply::Error("IDONTKNOW No such master or master state unknown".into())
                }
            },
            "sentinels" => Reply::Array(
                node.siblings
                    .iter()
                    .map(|s| {
                        bulk_array([
                            "name".to_string(),
                            s.to_string(),
                            "ip".to_string(),
                            s.host.clone(),
                            "port".to_string(),
                            s.port.to_string(),
                        ])
                    })
                    .collect(),
            ),
            _ => err("unknown sentinel subcommand"),
        }
    }

    fn dispatch_data(&mut self, data: &Arc<Mutex<Dataset>>, cmd: Command) -> Reply {
        match cmd.name().as_str() {
            "MULTI" => {
                if self.multi.is_some() {
                    return err("MULTI calls can not be nested");
                }
                self.multi = Some(Vec::new());
                Reply::Status("OK".into())
            }
            "DISCARD" => {
                self.multi = None;
                self.watched.clear();
                Reply::Status("OK".into())
            }
            "WATCH" => {
                let ds = lock(data);
                for i in 1..cmd.argv().len() {
                    let key = cmd.arg_str(i).unwrap_or_default();
                    let version = ds.version(&key);
                    self.watched.push((key, version));
                }
                Reply::Status("OK".into())
            }
            "UNWATCH" => {
                self.watched.clear();
                Reply::Status("OK".into())
            }
            "EXEC" => {
                let Some(queued) = self.multi.take() else {
                    return err("EXEC without MULTI");
                };
                let hook = lock(&self.cluster.state).before_exec.take();
                if let Some(hook) = hook {
                    hook();
                }
                let mut ds = lock(data);
                let watched = std::mem::take(&mut self.watched);
                if watched.iter().any(|(k, v)| ds.version(k) != *v) {
                    return Reply::Nil;
                }
                Reply::Array(queued.iter().map(|c| apply(&mut ds, c)).collect())
            }
            _ => {
                if let Some(queued) = self.multi.as_mut() {
                    queued.push(cmd);
                    return Reply::Status("QUEUED".into());
                }
                apply(&mut lock(data), &cmd)
            }
        }
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, commands: &[Command]) -> Result<(), DatabaseError> {
        let node = self.node.clone();
        match node {
            Node::Sentinel(sentinel) => {
                for cmd in commands {
                    self.replies.push_back(Self::dispatch_sentinel(&sentinel, cmd));
                }
            }
            Node::Data(data) => {
                {
                    let mut state = lock(&self.cluster.state);
                    if state.failing_sends > 0 {
                        state.failing_sends -= 1;
                        return Err(DatabaseError::Io(std::io::Error::new(
                            std::io::ErrorKind::BrokenPipe,
                            "injected send failure",
                        )));
                    }
                }
                for cmd in commands {
                    let reply = self.dispatch_data(&data, cmd.clone());
                    self.replies.push_back(reply);
                }
            }
        }
        Ok(())
    }

    fn receive(&mut self) -> Result<Reply, DatabaseError> {
        self.replies
            .pop_front()
            .ok_or_else(|| DatabaseError::Connection("no reply pending".to_string()))
    }
}

pub fn addr(spec: &str) -> Address {
    Address::parse(spec, 6379).unwrap_or_else(|e| panic!("bad test address {spec}: {e}"))
}
