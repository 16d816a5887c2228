//! In-memory connection provider used by the unit tests.
//!
//! Every connection records what happens to it in a shared journal and keeps
//! its uncommitted rows locally, so tests can check which physical connection
//! did what and which rows survived.

use crate::connection::{Connection, ConnectionProvider};
use crate::{Error, Result};
use async_trait::async_trait;
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Opened(u32),
    Execute(u32, String),
    AutoCommit(u32, bool),
    Commit(u32),
    Rollback(u32),
    Close(u32),
}

#[derive(Default)]
struct Shared {
    events: Mutex<Vec<Event>>,
    committed: Mutex<Vec<String>>,
    next_id: AtomicU32,
    fail_commit: AtomicBool,
    fail_rollback: AtomicBool,
}

#[derive(Clone, Default)]
pub struct MockDatabase {
    shared: Arc<Shared>,
}

impl MockDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provider(&self) -> MockProvider {
        MockProvider { db: self.clone() }
    }

    pub fn events(&self) -> Vec<Event> {
        self.shared.events.lock().unwrap().clone()
    }

    pub fn committed(&self) -> Vec<String> {
        self.shared.committed.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|event| pred(event)).count()
    }

    pub fn opened(&self) -> usize {
        self.count(|event| matches!(event, Event::Opened(_)))
    }

    pub fn commits(&self) -> usize {
        self.count(|event| matches!(event, Event::Commit(_)))
    }

    pub fn rollbacks(&self) -> usize {
        self.count(|event| matches!(event, Event::Rollback(_)))
    }

    pub fn closes(&self) -> usize {
        self.count(|event| matches!(event, Event::Close(_)))
    }

    /// Connection ids that executed `sql`.
    pub fn executed_on(&self, sql: &str) -> Vec<u32> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Execute(id, stmt) if stmt == sql => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn fail_commits(&self, fail: bool) {
        self.shared.fail_commit.store(fail, Ordering::SeqCst);
    }

    pub fn fail_rollbacks(&self, fail: bool) {
        self.shared.fail_rollback.store(fail, Ordering::SeqCst);
    }

    fn record(&self, event: Event) {
        self.shared.events.lock().unwrap().push(event);
    }
}

pub struct MockProvider {
    db: MockDatabase,
}

#[async_trait]
impl ConnectionProvider for MockProvider {
    async fn get_connection(&self) -> Result<Box<dyn Connection>> {
        let id = self.db.shared.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.db.record(Event::Opened(id));
        Ok(Box::new(MockConnection {
            id,
            db: self.db.clone(),
            auto_commit: true,
            pending: Vec::new(),
            savepoints: Vec::new(),
            closed: false,
        }))
    }

    async fn get_connection_as(&self, user: &str, _password: &str) -> Result<Box<dyn Connection>> {
        if user.is_empty() {
            return Err(Error::Connection("missing user".into()));
        }
        self.get_connection().await
    }
}

pub struct MockConnection {
    id: u32,
    db: MockDatabase,
    auto_commit: bool,
    pending: Vec<String>,
    savepoints: Vec<(String, usize)>,
    closed: bool,
}

impl MockConnection {
    pub fn id(&self) -> u32 {
        self.id
    }

    fn flush(&mut self) {
        let mut committed = self.db.shared.committed.lock().unwrap();
        committed.append(&mut self.pending);
        self.savepoints.clear();
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        if self.closed {
            return Err(Error::Connection(format!("connection {} is closed", self.id)));
        }
        self.db.record(Event::Execute(self.id, sql.to_string()));

        if let Some(name) = sql.strip_prefix("SAVEPOINT ") {
            self.savepoints.push((name.to_string(), self.pending.len()));
        } else if let Some(name) = sql.strip_prefix("RELEASE SAVEPOINT ") {
            let pos = self
                .savepoints
                .iter()
                .rposition(|(sp, _)| sp == name)
                .ok_or_else(|| Error::Connection(format!("no savepoint {name}")))?;
            self.savepoints.truncate(pos);
        } else if let Some(name) = sql.strip_prefix("ROLLBACK TO SAVEPOINT ") {
            let pos = self
                .savepoints
                .iter()
                .rposition(|(sp, _)| sp == name)
                .ok_or_else(|| Error::Connection(format!("no savepoint {name}")))?;
            let mark = self.savepoints[pos].1;
            self.pending.truncate(mark);
            self.savepoints.truncate(pos + 1);
        } else if sql == "FAIL" {
            return Err(Error::Connection("statement failed".into()));
        } else {
            self.pending.push(sql.to_string());
            if self.auto_commit {
                self.flush();
            }
            return Ok(1);
        }
        Ok(0)
    }

    async fn commit(&mut self) -> Result<()> {
        self.db.record(Event::Commit(self.id));
        if self.db.shared.fail_commit.load(Ordering::SeqCst) {
            return Err(Error::Connection("commit failed".into()));
        }
        self.flush();
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.db.record(Event::Rollback(self.id));
        self.pending.clear();
        self.savepoints.clear();
        if self.db.shared.fail_rollback.load(Ordering::SeqCst) {
            return Err(Error::Connection("rollback failed".into()));
        }
        Ok(())
    }

    async fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
        self.db.record(Event::AutoCommit(self.id, auto_commit));
        self.auto_commit = auto_commit;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.db.record(Event::Close(self.id));
        self.pending.clear();
        self.closed = true;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
