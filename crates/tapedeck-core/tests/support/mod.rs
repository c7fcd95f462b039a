#![allow(dead_code)]

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tapedeck_core::api::{ApiError, TapeBackend};
use tapedeck_shared::{AddTapeRequest, MoveAction, StatusPayload, TapeRecord};
use tokio::time::Instant;

/// How the fake machine answers a mutating call.
#[derive(Debug, Clone)]
pub enum Reply {
    Ok(Option<&'static str>),
    Server(u16, Option<&'static str>),
    Network,
}

impl Reply {
    fn into_result(self) -> Result<StatusPayload, ApiError> {
        match self {
            Reply::Ok(status) => Ok(StatusPayload {
                status: status.map(str::to_string),
            }),
            Reply::Server(status, message) => Err(ApiError::Server {
                status,
                message: message.map(str::to_string),
            }),
            Reply::Network => Err(network_error()),
        }
    }
}

pub fn network_error() -> ApiError {
    ApiError::Network(Box::new(std::io::Error::other("connection refused")))
}

#[derive(Debug)]
pub struct FakeState {
    pub records: Vec<Value>,
    pub tags: Option<Vec<String>>,
    pub fetch_fails: bool,
    pub machine: Reply,
    pub mutate: Reply,
    pub machine_delay: Duration,
    pub fetch_times: Vec<Instant>,
    pub calls: Vec<String>,
    pub last_add: Option<Value>,
}

/// In-memory stand-in for the machine's HTTP API.
#[derive(Debug)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn new(records: Vec<Value>) -> Self {
        Self {
            state: Mutex::new(FakeState {
                records,
                tags: Some(vec!["jazz".to_string(), "rock".to_string()]),
                fetch_fails: false,
                machine: Reply::Ok(Some("Dispensing")),
                mutate: Reply::Ok(Some("Success")),
                machine_delay: Duration::ZERO,
                fetch_times: Vec::new(),
                calls: Vec::new(),
                last_add: None,
            }),
        }
    }

    pub fn with(&self, edit: impl FnOnce(&mut FakeState)) {
        edit(&mut self.state.lock());
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.state.lock().fetch_times.len()
    }

    pub fn fetch_times(&self) -> Vec<Instant> {
        self.state.lock().fetch_times.clone()
    }

    pub fn last_add(&self) -> Option<Value> {
        self.state.lock().last_add.clone()
    }

    fn record(&self, call: String) {
        self.state.lock().calls.push(call);
    }

    fn set_in_machine(&self, id: u64, in_machine: bool) {
        let mut state = self.state.lock();
        for record in &mut state.records {
            if record["id"] == json!(id) {
                record["in_machine"] = json!(i64::from(in_machine));
            }
        }
    }

    async fn machine_call(&self, call: String) -> Result<StatusPayload, ApiError> {
        let (delay, reply) = {
            let mut state = self.state.lock();
            state.calls.push(call);
            (state.machine_delay, state.machine.clone())
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        reply.into_result()
    }
}

/// A raw tape row as the machine serves it.
pub fn tape(id: u64, name: &str, in_machine: bool) -> Value {
    json!({
        "id": id,
        "name": name,
        "artist": "Artist",
        "listens": 0,
        "in_machine": i64::from(in_machine),
    })
}

pub fn tape_at(id: u64, name: &str, in_machine: bool, x: u8, y: u8) -> Value {
    let mut value = tape(id, name, in_machine);
    value["slot_x"] = json!(x);
    value["slot_y"] = json!(y);
    value
}

#[async_trait]
impl TapeBackend for FakeBackend {
    async fn fetch_tapes(&self) -> Result<Vec<TapeRecord>, ApiError> {
        let (fails, records) = {
            let mut state = self.state.lock();
            state.fetch_times.push(Instant::now());
            (state.fetch_fails, state.records.clone())
        };
        if fails {
            return Err(network_error());
        }
        serde_json::from_value(Value::Array(records)).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn fetch_tags(&self) -> Result<Vec<String>, ApiError> {
        self.record("tags".to_string());
        self.state.lock().tags.clone().ok_or_else(network_error)
    }

    async fn move_hardware(
        &self,
        action: MoveAction,
        x: u8,
        y: u8,
    ) -> Result<StatusPayload, ApiError> {
        self.machine_call(format!("move {action} {x} {y}")).await
    }

    async fn offset(&self, val: f64) -> Result<StatusPayload, ApiError> {
        self.machine_call(format!("offset {val}")).await
    }

    async fn dispense(&self, id: u64) -> Result<StatusPayload, ApiError> {
        let result = self.machine_call(format!("dispense {id}")).await;
        if result.is_ok() {
            self.set_in_machine(id, false);
        }
        result
    }

    async fn return_tape(&self, id: u64) -> Result<StatusPayload, ApiError> {
        let result = self.machine_call(format!("return {id}")).await;
        if result.is_ok() {
            self.set_in_machine(id, true);
        }
        result
    }

    async fn add(&self, request: &AddTapeRequest) -> Result<Value, ApiError> {
        let body = serde_json::to_value(request).map_err(|e| ApiError::Decode(e.to_string()))?;
        let reply = {
            let mut state = self.state.lock();
            state.calls.push(format!("add {}", request.name));
            state.last_add = Some(body.clone());
            state.mutate.clone()
        };
        reply.into_result()?;

        let mut state = self.state.lock();
        let id = state.records.len() as u64 + 100;
        let mut row = tape(id, &request.name, true);
        row["artist"] = json!(request.artist);
        state.records.push(row);
        Ok(json!({"status": "Success", "id": id}))
    }

    async fn remove(&self, id: u64) -> Result<StatusPayload, ApiError> {
        let reply = {
            let mut state = self.state.lock();
            state.calls.push(format!("remove {id}"));
            state.mutate.clone()
        };
        let result = reply.into_result();
        if result.is_ok() {
            self.state.lock().records.retain(|r| r["id"] != json!(id));
        }
        result
    }

    async fn remove_all(&self) -> Result<StatusPayload, ApiError> {
        let reply = {
            let mut state = self.state.lock();
            state.calls.push("remove-all".to_string());
            state.mutate.clone()
        };
        let result = reply.into_result();
        if result.is_ok() {
            self.state.lock().records.clear();
        }
        result
    }
}
