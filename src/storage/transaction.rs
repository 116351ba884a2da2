/// Transaction batches
///
/// A mutation is sent as one pipeline: optional WATCH, MULTI, the queued
/// steps, EXEC. Every acknowledgement is checked against the shape the step
/// should produce; anything unexpected fails the whole operation even
/// though the commit itself is atomic on the server.
use crate::network::{Command, ConnectionManager, Reply};
use crate::types::DatabaseError;

/// Result a step must produce once committed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Integer,
    Exactly(i64),
}

impl Ack {
    fn matches(self, reply: &Reply) -> bool {
        match self {
            Self::Integer => reply.is_integer(),
            Self::Exactly(n) => reply.as_integer() == Some(n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Per-step results, in step order
    Committed(Vec<Reply>),
    /// A watched key changed before EXEC; nothing was applied
    Aborted,
}

#[derive(Debug, Default)]
pub struct TransactionBatch {
    watched: Vec<String>,
    steps: Vec<(Command, Ack)>,
}

impl TransactionBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Aborts the commit if `key` changes between now and EXEC.
    pub fn watch(&mut self, key: impl Into<String>) {
        self.watched.push(key.into());
    }

    pub fn push(&mut self, cmd: Command, ack: Ack) {
        self.steps.push((cmd, ack));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn execute(self, conn: &mut ConnectionManager) -> Result<Outcome, DatabaseError> {
        let watching = !self.watched.is_empty();
        let mut names = Vec::with_capacity(self.steps.len());
        let mut acks = Vec::with_capacity(self.steps.len());

        if watching {
            conn.enqueue(Command::new("WATCH").args(&self.watched));
        }
        conn.enqueue(Command::new("MULTI"));
        for (cmd, ack) in self.steps {
            names.push(cmd.name());
            acks.push(ack);
            conn.enqueue(cmd);
        }
        conn.enqueue(Command::new("EXEC"));

        let replies = conn.read_queued()?;
        check_acknowledgements(watching, &names, &acks, replies)
    }
}

/// Validates the replies to `[WATCH] MULTI step... EXEC`.
pub fn check_acknowledgements(
    watching: bool,
    names: &[String],
    acks: &[Ack],
    replies: Vec<Reply>,
) -> Result<Outcome, DatabaseError> {
    let expected = usize::from(watching) + 1 + acks.len() + 1;
    if replies.len() != expected {
        return Err(DatabaseError::Protocol(format!(
            "expected {expected} replies to transaction, got {}",
            replies.len()
        )));
    }

    let mut replies = replies.into_iter();
    if watching {
        expect_ok(replies.next(), "WATCH")?;
    }
    expect_ok(replies.next(), "MULTI")?;

    for name in names {
        match replies.next() {
            Some(r) if r.is_queued() => {}
            other => {
                return Err(DatabaseError::Protocol(format!("{name} was not queued: {other:?}")));
            }
        }
    }

    match replies.next() {
        Some(Reply::Nil) => Ok(Outcome::Aborted),
        Some(Reply::Array(results)) => {
            if results.len() != acks.len() {
                return Err(DatabaseError::Protocol(format!(
                    "EXEC returned {} results for {} steps",
                    results.len(),
                    acks.len()
                )));
            }
            for ((result, ack), name) in results.iter().zip(acks).zip(names) {
                if !ack.matches(result) {
                    return Err(DatabaseError::Protocol(format!(
                        "unexpected result for {name}: {result:?}"
                    )));
                }
            }
            Ok(Outcome::Committed(results))
        }
        other => Err(DatabaseError::Protocol(format!("unexpected EXEC reply {other:?}"))),
    }
}

fn expect_ok(reply: Option<Reply>, name: &str) -> Result<(), DatabaseError> {
    match reply {
        Some(r) if r.is_ok() => Ok(()),
        other => Err(DatabaseError::Protocol(format!("{name} not acknowledged: {other:?}"))),
    }
}
