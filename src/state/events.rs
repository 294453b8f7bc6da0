//! Store notifications
//!
//! One closed event type per topic. Every payload carries a full copy of the
//! part of the model it touched so a renderer can redraw from the event alone.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::{ConsoleEntry, EventLoopState, Frame, HeapId, HeapObject, Scope, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    CallStack,
    Heap,
    Scopes,
    EventLoop,
    CurrentLine,
    Execution,
    Console,
    Progress,
    /// Receives every event
    All,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "topic", content = "payload", rename_all = "kebab-case")]
pub enum StoreEvent {
    CallStack(CallStackEvent),
    Heap(HeapEvent),
    Scopes(ScopeEvent),
    EventLoop(EventLoopEvent),
    CurrentLine(i64),
    Execution(ExecutionFlags),
    Console(ConsoleEntry),
    Progress(ProgressEvent),
}

impl StoreEvent {
    pub fn topic(&self) -> Topic {
        match self {
            StoreEvent::CallStack(_) => Topic::CallStack,
            StoreEvent::Heap(_) => Topic::Heap,
            StoreEvent::Scopes(_) => Topic::Scopes,
            StoreEvent::EventLoop(_) => Topic::EventLoop,
            StoreEvent::CurrentLine(_) => Topic::CurrentLine,
            StoreEvent::Execution(_) => Topic::Execution,
            StoreEvent::Console(_) => Topic::Console,
            StoreEvent::Progress(_) => Topic::Progress,
        }
    }
}

/* ===================== Call Stack ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CallStackAction {
    Push,
    Pop,
    Update,
    Reset,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallStackEvent {
    pub action: CallStackAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame: Option<Frame>,
    pub stack: Vec<Frame>,
}

/* ===================== Heap ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HeapAction {
    Allocate,
    Deallocate,
    Reference,
    Update,
    Reset,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeapEvent {
    pub action: HeapAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<HeapObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<HeapId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<HeapId>,
    pub heap: BTreeMap<HeapId, HeapObject>,
}

/* ===================== Scopes ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScopeAction {
    Create,
    AddVariable,
    UpdateVariable,
    Destroy,
    Reset,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScopeEvent {
    pub action: ScopeAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
    pub scopes: Vec<Scope>,
}

/* ===================== Event Loop ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventLoopAction {
    #[serde(rename = "addWebAPI")]
    AddWebApi,
    #[serde(rename = "moveToCallback")]
    MoveToCallback,
    #[serde(rename = "addMicrotask")]
    AddMicrotask,
    #[serde(rename = "processMicrotask")]
    ProcessMicrotask,
    #[serde(rename = "processCallback")]
    ProcessCallback,
    #[serde(rename = "reset")]
    Reset,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLoopEvent {
    pub action: EventLoopAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<Task>,
    pub event_loop: EventLoopState,
}

/* ===================== Flags ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionFlags {
    pub is_running: bool,
    pub is_paused: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub step: u64,
    pub cursor: usize,
}
