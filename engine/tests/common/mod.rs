//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use ferry_engine::{RemoteError, RemoteTasks, Task};
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

/// One call as the server saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create { key: String, title: String },
    Update { id: String, title: String },
    Delete { id: String },
    List,
}

/// How the next create should be answered.
#[derive(Debug, Clone)]
pub enum CreateReply {
    Id(String),
    EchoClientId,
    MissingId,
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    create_replies: VecDeque<CreateReply>,
    fail_at: Option<usize>,
    next_id: u64,
    tasks: BTreeMap<String, Value>,
}

/// In-memory server that records every call in order.
#[derive(Default)]
pub struct MockRemote {
    state: Mutex<State>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the next creates with these replies before falling back to `srv-N` ids.
    pub fn with_create_replies(self, replies: impl IntoIterator<Item = CreateReply>) -> Self {
        self.state
            .lock()
            .unwrap()
            .create_replies
            .extend(replies);
        self
    }

    /// Fail the call at this zero-based position with a 503.
    pub fn failing_at(self, index: usize) -> Self {
        self.state.lock().unwrap().fail_at = Some(index);
        self
    }

    /// Seed a task the server already knows.
    pub fn seed(&self, id: &str, title: &str) {
        self.state
            .lock()
            .unwrap()
            .tasks
            .insert(id.to_string(), json!({ "_id": id, "title": title, "status": "pending" }));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn server_task(&self, id: &str) -> Option<Value> {
        self.state.lock().unwrap().tasks.get(id).cloned()
    }

    pub fn server_len(&self) -> usize {
        self.state.lock().unwrap().tasks.len()
    }

    fn record(state: &mut State, call: Call) -> Result<(), RemoteError> {
        let index = state.calls.len();
        state.calls.push(call);
        if state.fail_at == Some(index) {
            return Err(RemoteError::Status {
                status: 503,
                body: "unavailable".into(),
            });
        }
        Ok(())
    }
}

fn body(id: &str, payload: &Task) -> Value {
    json!({
        "_id": id,
        "title": payload.title,
        "description": payload.description,
        "status": payload.status.as_str(),
    })
}

#[async_trait]
impl RemoteTasks for MockRemote {
    async fn create(&self, payload: &Task, idempotency_key: &str) -> Result<Value, RemoteError> {
        let mut state = self.state.lock().unwrap();
        Self::record(
            &mut state,
            Call::Create {
                key: idempotency_key.to_string(),
                title: payload.title.clone(),
            },
        )?;

        let reply = state.create_replies.pop_front();
        let id = match reply {
            Some(CreateReply::Id(id)) => id,
            Some(CreateReply::EchoClientId) => return Ok(body(&payload.id, payload)),
            Some(CreateReply::MissingId) => return Ok(json!({ "title": payload.title })),
            None => {
                state.next_id += 1;
                format!("srv-{}", state.next_id)
            }
        };

        let created = body(&id, payload);
        state.tasks.insert(id, created.clone());
        Ok(created)
    }

    async fn update(&self, id: &str, payload: &Task) -> Result<Option<Value>, RemoteError> {
        let mut state = self.state.lock().unwrap();
        Self::record(
            &mut state,
            Call::Update {
                id: id.to_string(),
                title: payload.title.clone(),
            },
        )?;

        let updated = body(id, payload);
        state.tasks.insert(id.to_string(), updated.clone());
        Ok(Some(updated))
    }

    async fn delete(&self, id: &str) -> Result<(), RemoteError> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, Call::Delete { id: id.to_string() })?;
        state.tasks.remove(id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Value>, RemoteError> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, Call::List)?;
        Ok(state.tasks.values().cloned().collect())
    }
}

pub fn create(title: &str) -> Call {
    Call::Create {
        key: String::new(),
        title: title.to_string(),
    }
}

/// Drop the idempotency keys so calls compare by shape.
pub fn without_keys(calls: Vec<Call>) -> Vec<Call> {
    calls
        .into_iter()
        .map(|call| match call {
            Call::Create { title, .. } => Call::Create {
                key: String::new(),
                title,
            },
            other => other,
        })
        .collect()
}
