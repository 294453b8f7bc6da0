//! Runtime model types
//!
//! Everything a renderer needs to draw the call stack, heap, scope chain and
//! event-loop queues. All of it serializes with serde.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::interpreter::types::{ConsoleMethod, DeclKind, FunctionDef, ReactionKind};

/* ===================== Identities ===================== */

macro_rules! id_type {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

id_type!(FrameId, "frame");
id_type!(HeapId, "heap");
id_type!(ScopeId, "scope");
id_type!(TaskId, "task");

/* ===================== Values ===================== */

/// Runtime value. Composites live on the heap and are held by reference.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Ref(HeapId),
}

impl Value {
    pub fn as_ref_id(&self) -> Option<HeapId> {
        match self {
            Value::Ref(id) => Some(*id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueKind {
    Undefined,
    Null,
    Boolean,
    Number,
    String,
    Function,
    Object,
    Array,
}

/* ===================== Call Stack ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FrameKind {
    Global,
    Function,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub value: Value,
    pub kind: ValueKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub id: FrameId,
    pub name: String,
    pub kind: FrameKind,
    pub variables: BTreeMap<String, Binding>,
    /// Display-only receiver, e.g. `globalThis` or `counter`
    pub this_binding: Option<String>,
    pub line: usize,
    pub active: bool,
}

/* ===================== Heap ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HeapKind {
    Function,
    Object,
    Array,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionObject {
    pub def: Arc<FunctionDef>,
    /// Scope the function was created in
    pub closure: ScopeId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "camelCase")]
pub enum HeapPayload {
    Function(FunctionObject),
    Object {
        class: Option<String>,
        properties: Vec<(String, Value)>,
    },
    Array(Vec<Value>),
}

impl HeapPayload {
    pub fn kind(&self) -> HeapKind {
        match self {
            HeapPayload::Function(_) => HeapKind::Function,
            HeapPayload::Object { .. } => HeapKind::Object,
            HeapPayload::Array(_) => HeapKind::Array,
        }
    }

    /// Heap identities held by this payload, in order, without duplicates
    pub fn outgoing(&self) -> Vec<HeapId> {
        let values: Box<dyn Iterator<Item = &Value>> = match self {
            HeapPayload::Function(_) => Box::new(std::iter::empty()),
            HeapPayload::Object { properties, .. } => Box::new(properties.iter().map(|(_, v)| v)),
            HeapPayload::Array(items) => Box::new(items.iter()),
        };

        let mut out = Vec::new();
        for id in values.filter_map(Value::as_ref_id) {
            if !out.contains(&id) {
                out.push(id);
            }
        }
        out
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        match self {
            HeapPayload::Object { properties, .. } => {
                properties.iter().find(|(k, _)| k == name).map(|(_, v)| v)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeapObject {
    pub id: HeapId,
    pub kind: HeapKind,
    pub payload: HeapPayload,
    pub references: Vec<HeapId>,
    pub created_at: DateTime<Utc>,
}

/* ===================== Scopes ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScopeKind {
    Global,
    Function,
    Block,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeBinding {
    pub value: Value,
    pub kind: ValueKind,
    pub declaration: DeclKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub id: ScopeId,
    pub name: String,
    pub kind: ScopeKind,
    /// Lexically enclosing scope; it may currently be retained off-list
    pub parent: Option<ScopeId>,
    pub variables: BTreeMap<String, ScopeBinding>,
}

/* ===================== Tasks ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskKind {
    Timer,
    Promise,
    Microtask,
}

/// A resolved callback: the function plus the scope it closes over
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Callback {
    pub function: Arc<FunctionDef>,
    pub closure: ScopeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "camelCase")]
pub enum Settlement {
    Fulfilled(Value),
    Rejected(Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reaction {
    pub kind: ReactionKind,
    pub callback: Callback,
}

/// Promise bookkeeping carried by a reaction microtask
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromiseLink {
    pub reaction: ReactionKind,
    /// Settlement the reaction was scheduled for
    pub settled: Settlement,
    /// Reactions further down the chain, scheduled once this one completes
    pub chain: Vec<Reaction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Assigned by the store when the task is enqueued
    pub id: TaskId,
    pub name: String,
    pub kind: TaskKind,
    pub callback: Callback,
    pub args: Vec<Value>,
    pub delay_ms: Option<u64>,
    pub registered_at: DateTime<Utc>,
    pub source: String,
    pub promise: Option<PromiseLink>,
}

impl Task {
    pub fn new(name: impl Into<String>, kind: TaskKind, callback: Callback) -> Self {
        let source = callback.function.body_source.clone();
        Self {
            id: TaskId(0),
            name: name.into(),
            kind,
            callback,
            args: Vec::new(),
            delay_ms: None,
            registered_at: Utc::now(),
            source,
            promise: None,
        }
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = Some(delay_ms);
        self
    }

    pub fn with_promise(mut self, link: PromiseLink) -> Self {
        self.promise = Some(link);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLoopState {
    pub web_apis: VecDeque<Task>,
    pub callback_queue: VecDeque<Task>,
    pub microtask_queue: VecDeque<Task>,
}

impl EventLoopState {
    pub fn is_empty(&self) -> bool {
        self.web_apis.is_empty() && self.callback_queue.is_empty() && self.microtask_queue.is_empty()
    }
}

/* ===================== Console ===================== */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleEntry {
    #[serde(rename = "type")]
    pub method: ConsoleMethod,
    pub args: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl ConsoleEntry {
    /// Arguments joined the way a console prints them
    pub fn text(&self) -> String {
        self.args.join(" ")
    }
}

/* ===================== Aggregate ===================== */

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeState {
    pub call_stack: Vec<Frame>,
    pub heap: BTreeMap<HeapId, HeapObject>,
    /// Outermost (global) first
    pub scopes: Vec<Scope>,
    pub event_loop: EventLoopState,
    pub cursor: usize,
    /// Highlighted source line; zero or negative means none
    pub current_line: i64,
    pub step_count: u64,
    pub is_running: bool,
    pub is_paused: bool,
    pub speed_ms: u64,
    pub console: Vec<ConsoleEntry>,
}

impl RuntimeState {
    pub fn new(speed_ms: u64) -> Self {
        Self {
            call_stack: Vec::new(),
            heap: BTreeMap::new(),
            scopes: Vec::new(),
            event_loop: EventLoopState::default(),
            cursor: 0,
            current_line: 0,
            step_count: 0,
            is_running: false,
            is_paused: false,
            speed_ms,
            console: Vec::new(),
        }
    }

    pub fn active_frame(&self) -> Option<&Frame> {
        self.call_stack.last()
    }

    pub fn scope(&self, id: ScopeId) -> Option<&Scope> {
        self.scopes.iter().find(|s| s.id == id)
    }

    pub fn console_lines(&self) -> Vec<String> {
        self.console.iter().map(ConsoleEntry::text).collect()
    }
}
