//! Runtime state store
//!
//! Owns the [`RuntimeState`] and is the only thing that mutates it. Every
//! operation notifies the subscribers of its topic (and of [`Topic::All`])
//! before returning. The store never schedules work itself; it only keeps the
//! abort handles of timers the interpreter spawned so `reset` can cancel them.

pub mod events;
pub mod types;


use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::trace;

use crate::interpreter::types::{ConsoleMethod, DeclKind};

pub use events::{
    CallStackAction, CallStackEvent, EventLoopAction, EventLoopEvent, ExecutionFlags, HeapAction,
    HeapEvent, ProgressEvent, ScopeAction, ScopeEvent, StoreEvent, Topic,
};
pub use types::{
    Binding, Callback, ConsoleEntry, EventLoopState, Frame, FrameId, FrameKind, FunctionObject,
    HeapId, HeapKind, HeapObject, HeapPayload, PromiseLink, Reaction, RuntimeState, Scope,
    ScopeBinding, ScopeId, ScopeKind, Settlement, Task, TaskId, TaskKind, Value, ValueKind,
};

/// Subscriber callback, invoked synchronously inside the mutating operation
pub type Handler = Box<dyn FnMut(&StoreEvent, &RuntimeState) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    topic: Topic,
    handler: Handler,
}

/// Identity counters survive `reset`, so identities are never reused
#[derive(Debug, Default)]
struct Counters {
    frame: u64,
    heap: u64,
    scope: u64,
    task: u64,
    subscription: u64,
}

pub struct RuntimeStore {
    state: RuntimeState,
    subscriptions: Vec<Subscription>,
    channels: Vec<(Topic, mpsc::UnboundedSender<StoreEvent>)>,
    timers: Vec<AbortHandle>,
    counters: Counters,
}

impl std::fmt::Debug for RuntimeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeStore")
            .field("state", &self.state)
            .field("subscriptions", &self.subscriptions.len())
            .field("timers", &self.timers.len())
            .finish()
    }
}

impl Default for RuntimeStore {
    fn default() -> Self {
        Self::new(0)
    }
}

impl RuntimeStore {
    pub fn new(speed_ms: u64) -> Self {
        Self {
            state: RuntimeState::new(speed_ms),
            subscriptions: Vec::new(),
            channels: Vec::new(),
            timers: Vec::new(),
            counters: Counters::default(),
        }
    }

    /* ===================== Subscriptions ===================== */

    pub fn subscribe(&mut self, topic: Topic, handler: Handler) -> SubscriptionId {
        self.counters.subscription += 1;
        let id = SubscriptionId(self.counters.subscription);
        self.subscriptions.push(Subscription { id, topic, handler });
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        self.subscriptions.len() != before
    }

    /// Stream the events of one topic into a channel. Dropping the receiver
    /// ends the subscription.
    pub fn channel(&mut self, topic: Topic) -> mpsc::UnboundedReceiver<StoreEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels.push((topic, tx));
        rx
    }

    fn emit(&mut self, event: StoreEvent) {
        let topic = event.topic();
        trace!(?topic, "store event");

        for sub in self.subscriptions.iter_mut() {
            if sub.topic == topic || sub.topic == Topic::All {
                (sub.handler)(&event, &self.state);
            }
        }

        self.channels.retain(|(wanted, tx)| {
            if *wanted != topic && *wanted != Topic::All {
                return !tx.is_closed();
            }
            tx.send(event.clone()).is_ok()
        });
    }

    /* ===================== Reads ===================== */

    pub fn state(&self) -> &RuntimeState {
        &self.state
    }

    /// Detached deep copy of the whole model
    pub fn snapshot(&self) -> RuntimeState {
        self.state.clone()
    }

    pub fn heap_object(&self, id: HeapId) -> Option<&HeapObject> {
        self.state.heap.get(&id)
    }

    pub fn scope(&self, id: ScopeId) -> Option<&Scope> {
        self.state.scope(id)
    }

    pub fn value_kind(&self, value: &Value) -> ValueKind {
        match value {
            Value::Undefined => ValueKind::Undefined,
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Boolean,
            Value::Num(_) => ValueKind::Number,
            Value::Str(_) => ValueKind::String,
            Value::Ref(id) => match self.state.heap.get(id).map(|o| o.kind) {
                Some(HeapKind::Function) => ValueKind::Function,
                Some(HeapKind::Array) => ValueKind::Array,
                _ => ValueKind::Object,
            },
        }
    }

    /* ===================== Call Stack ===================== */

    pub fn push_frame(
        &mut self,
        name: impl Into<String>,
        kind: FrameKind,
        this_binding: Option<String>,
        line: usize,
    ) -> FrameId {
        self.counters.frame += 1;
        let id = FrameId(self.counters.frame);

        if let Some(top) = self.state.call_stack.last_mut() {
            top.active = false;
        }
        let frame = Frame {
            id,
            name: name.into(),
            kind,
            variables: Default::default(),
            this_binding,
            line,
            active: true,
        };
        self.state.call_stack.push(frame.clone());

        self.emit(StoreEvent::CallStack(CallStackEvent {
            action: CallStackAction::Push,
            frame: Some(frame),
            stack: self.state.call_stack.clone(),
        }));
        id
    }

    pub fn pop_frame(&mut self) -> Option<Frame> {
        let frame = self.state.call_stack.pop()?;
        if let Some(top) = self.state.call_stack.last_mut() {
            top.active = true;
        }

        self.emit(StoreEvent::CallStack(CallStackEvent {
            action: CallStackAction::Pop,
            frame: Some(frame.clone()),
            stack: self.state.call_stack.clone(),
        }));
        Some(frame)
    }

    /// Mirror a binding into the active (top) frame
    pub fn update_frame_variable(&mut self, name: &str, value: Value) {
        let kind = self.value_kind(&value);
        let Some(top) = self.state.call_stack.last_mut() else {
            return;
        };
        top.variables.insert(name.to_string(), Binding { value, kind });
        let frame = top.clone();

        self.emit(StoreEvent::CallStack(CallStackEvent {
            action: CallStackAction::Update,
            frame: Some(frame),
            stack: self.state.call_stack.clone(),
        }));
    }

    /* ===================== Heap ===================== */

    pub fn allocate(&mut self, payload: HeapPayload) -> HeapId {
        self.counters.heap += 1;
        let id = HeapId(self.counters.heap);
        let object = HeapObject {
            id,
            kind: payload.kind(),
            references: payload.outgoing(),
            payload,
            created_at: chrono::Utc::now(),
        };
        self.state.heap.insert(id, object.clone());

        self.emit(StoreEvent::Heap(HeapEvent {
            action: HeapAction::Allocate,
            object: Some(object),
            from: None,
            to: None,
            heap: self.state.heap.clone(),
        }));
        id
    }

    pub fn deallocate(&mut self, id: HeapId) -> Option<HeapObject> {
        let object = self.state.heap.remove(&id)?;

        self.emit(StoreEvent::Heap(HeapEvent {
            action: HeapAction::Deallocate,
            object: Some(object.clone()),
            from: None,
            to: None,
            heap: self.state.heap.clone(),
        }));
        Some(object)
    }

    /// Record `from -> to`; the reference list stays ordered and duplicate-free
    pub fn add_reference(&mut self, from: HeapId, to: HeapId) -> bool {
        let Some(object) = self.state.heap.get_mut(&from) else {
            return false;
        };
        if !object.references.contains(&to) {
            object.references.push(to);
        }

        self.emit(StoreEvent::Heap(HeapEvent {
            action: HeapAction::Reference,
            object: None,
            from: Some(from),
            to: Some(to),
            heap: self.state.heap.clone(),
        }));
        true
    }

    /// Replace an object's payload; references follow the new contents
    pub fn update_object(&mut self, id: HeapId, payload: HeapPayload) -> bool {
        let Some(object) = self.state.heap.get_mut(&id) else {
            return false;
        };
        object.kind = payload.kind();
        object.references = payload.outgoing();
        object.payload = payload;
        let object = object.clone();

        self.emit(StoreEvent::Heap(HeapEvent {
            action: HeapAction::Update,
            object: Some(object),
            from: None,
            to: None,
            heap: self.state.heap.clone(),
        }));
        true
    }

    /* ===================== Scopes ===================== */

    pub fn create_scope(&mut self, name: impl Into<String>, kind: ScopeKind, parent: Option<ScopeId>) -> ScopeId {
        self.counters.scope += 1;
        let id = ScopeId(self.counters.scope);
        let scope = Scope {
            id,
            name: name.into(),
            kind,
            parent,
            variables: Default::default(),
        };
        self.push_scope(scope);
        id
    }

    /// Put a previously destroyed scope back, keeping its identity
    pub fn restore_scope(&mut self, scope: Scope) {
        if self.state.scope(scope.id).is_some() {
            return;
        }
        self.push_scope(scope);
    }

    fn push_scope(&mut self, scope: Scope) {
        self.state.scopes.push(scope.clone());
        self.emit(StoreEvent::Scopes(ScopeEvent {
            action: ScopeAction::Create,
            scope: Some(scope),
            variable: None,
            scopes: self.state.scopes.clone(),
        }));
    }

    /// Bind (or rebind) a name in one scope
    pub fn declare_variable(&mut self, scope: ScopeId, name: &str, value: Value, declaration: DeclKind) -> bool {
        let kind = self.value_kind(&value);
        let Some(target) = self.state.scopes.iter_mut().find(|s| s.id == scope) else {
            return false;
        };
        target.variables.insert(
            name.to_string(),
            ScopeBinding {
                value,
                kind,
                declaration,
            },
        );
        let snapshot = target.clone();

        self.emit(StoreEvent::Scopes(ScopeEvent {
            action: ScopeAction::AddVariable,
            scope: Some(snapshot),
            variable: Some(name.to_string()),
            scopes: self.state.scopes.clone(),
        }));
        true
    }

    /// Change the value of an existing binding, keeping its declaration kind
    pub fn update_variable(&mut self, scope: ScopeId, name: &str, value: Value) -> bool {
        let kind = self.value_kind(&value);
        let Some(target) = self.state.scopes.iter_mut().find(|s| s.id == scope) else {
            return false;
        };
        let Some(binding) = target.variables.get_mut(name) else {
            return false;
        };
        binding.value = value;
        binding.kind = kind;
        let snapshot = target.clone();

        self.emit(StoreEvent::Scopes(ScopeEvent {
            action: ScopeAction::UpdateVariable,
            scope: Some(snapshot),
            variable: Some(name.to_string()),
            scopes: self.state.scopes.clone(),
        }));
        true
    }

    pub fn destroy_scope(&mut self, id: ScopeId) -> Option<Scope> {
        let index = self.state.scopes.iter().position(|s| s.id == id)?;
        let scope = self.state.scopes.remove(index);

        self.emit(StoreEvent::Scopes(ScopeEvent {
            action: ScopeAction::Destroy,
            scope: Some(scope.clone()),
            variable: None,
            scopes: self.state.scopes.clone(),
        }));
        Some(scope)
    }

    /* ===================== Event Loop ===================== */

    fn next_task_id(&mut self) -> TaskId {
        self.counters.task += 1;
        TaskId(self.counters.task)
    }

    fn emit_event_loop(&mut self, action: EventLoopAction, task: Option<Task>) {
        self.emit(StoreEvent::EventLoop(EventLoopEvent {
            action,
            task,
            event_loop: self.state.event_loop.clone(),
        }));
    }

    /// Register a pending timer task; returns its assigned identity
    pub fn add_web_api(&mut self, mut task: Task) -> TaskId {
        task.id = self.next_task_id();
        let id = task.id;
        self.state.event_loop.web_apis.push_back(task.clone());
        self.emit_event_loop(EventLoopAction::AddWebApi, Some(task));
        id
    }

    /// Timer fired: web-API queue to callback queue
    pub fn move_to_callback(&mut self, id: TaskId) -> bool {
        let queue = &mut self.state.event_loop.web_apis;
        let Some(index) = queue.iter().position(|t| t.id == id) else {
            return false;
        };
        let Some(task) = queue.remove(index) else {
            return false;
        };
        self.state.event_loop.callback_queue.push_back(task.clone());
        self.emit_event_loop(EventLoopAction::MoveToCallback, Some(task));
        true
    }

    pub fn add_microtask(&mut self, mut task: Task) -> TaskId {
        task.id = self.next_task_id();
        let id = task.id;
        self.state.event_loop.microtask_queue.push_back(task.clone());
        self.emit_event_loop(EventLoopAction::AddMicrotask, Some(task));
        id
    }

    pub fn dequeue_microtask(&mut self) -> Option<Task> {
        let task = self.state.event_loop.microtask_queue.pop_front()?;
        self.emit_event_loop(EventLoopAction::ProcessMicrotask, Some(task.clone()));
        Some(task)
    }

    pub fn dequeue_callback(&mut self) -> Option<Task> {
        let task = self.state.event_loop.callback_queue.pop_front()?;
        self.emit_event_loop(EventLoopAction::ProcessCallback, Some(task.clone()));
        Some(task)
    }

    /// Keep the handle of a spawned timer so `reset` can abort it
    pub fn track_timer(&mut self, handle: AbortHandle) {
        self.timers.retain(|h| !h.is_finished());
        self.timers.push(handle);
    }

    /* ===================== Execution ===================== */

    pub fn set_current_line(&mut self, line: i64) {
        self.state.current_line = line;
        self.emit(StoreEvent::CurrentLine(line));
    }

    pub fn increment_step(&mut self, cursor: usize) {
        self.state.step_count += 1;
        self.state.cursor = cursor;
        self.emit(StoreEvent::Progress(ProgressEvent {
            step: self.state.step_count,
            cursor,
        }));
    }

    pub fn set_execution(&mut self, is_running: bool, is_paused: bool) {
        self.state.is_running = is_running;
        self.state.is_paused = is_paused;
        self.emit(StoreEvent::Execution(ExecutionFlags {
            is_running,
            is_paused,
        }));
    }

    pub fn set_speed(&mut self, speed_ms: u64) {
        self.state.speed_ms = speed_ms;
    }

    pub fn log_console(&mut self, method: ConsoleMethod, args: Vec<String>) {
        let entry = ConsoleEntry {
            method,
            args,
            timestamp: chrono::Utc::now(),
        };
        self.state.console.push(entry.clone());
        self.emit(StoreEvent::Console(entry));
    }

    /// Abort tracked timers and clear the model. Subscriptions and the
    /// configured speed survive.
    pub fn reset(&mut self) {
        for handle in self.timers.drain(..) {
            handle.abort();
        }
        self.state = RuntimeState::new(self.state.speed_ms);

        self.emit(StoreEvent::CallStack(CallStackEvent {
            action: CallStackAction::Reset,
            frame: None,
            stack: Vec::new(),
        }));
        self.emit(StoreEvent::Heap(HeapEvent {
            action: HeapAction::Reset,
            object: None,
            from: None,
            to: None,
            heap: Default::default(),
        }));
        self.emit(StoreEvent::Scopes(ScopeEvent {
            action: ScopeAction::Reset,
            scope: None,
            variable: None,
            scopes: Vec::new(),
        }));
        self.emit_event_loop(EventLoopAction::Reset, None);
        self.emit(StoreEvent::CurrentLine(0));
        self.emit(StoreEvent::Execution(ExecutionFlags {
            is_running: false,
            is_paused: false,
        }));
    }
}
