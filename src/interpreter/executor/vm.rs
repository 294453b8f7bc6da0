//! Interpreter state and lifecycle
//!
//! The interpreter owns its [`RuntimeStore`]; nothing else mutates the model.
//! Besides the store it keeps what the model does not show: the instruction
//! cursor, the call depth and the scopes retained by closures.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{info, info_span, warn};
use uuid::Uuid;

use super::control::{Controller, Pacing, Phase};
use super::errors::{RuntimeError, RuntimeResult};
use super::timers::TimerWheel;
use crate::config::Config;
use crate::interpreter::types::{Diagnostic, FunctionDef, Instruction, InstructionKind, Program};
use crate::state::{FrameKind, Handler, RuntimeState, RuntimeStore, Scope, ScopeId, ScopeKind, SubscriptionId, Topic};

/* ===================== Settings ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Pause between instructions in `run()`; also caps timer delays
    pub step_delay_ms: u64,
    pub max_call_depth: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            step_delay_ms: 500,
            max_call_depth: 256,
        }
    }
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Self {
            step_delay_ms: config.step_delay_ms,
            max_call_depth: config.max_call_depth,
        }
    }
}

/* ===================== Interpreter ===================== */

pub struct Interpreter {
    pub(super) store: RuntimeStore,
    pub(super) settings: Settings,
    pub(super) program: Arc<[Instruction]>,
    pub(super) diagnostics: Vec<Diagnostic>,
    /// Parse failure of the loaded program, raised by the first step
    pub(super) fault: Option<String>,
    /// Top-level function declarations, the last resort for call lookups
    pub(super) declarations: HashMap<String, Arc<FunctionDef>>,
    pub(super) cursor: usize,
    pub(super) phase: Phase,
    pub(super) pacing: Pacing,
    /// Global scope of the loaded program
    pub(super) global: Option<ScopeId>,
    pub(super) depth: usize,
    /// Destroyed scopes kept alive because a closure or task refers to them.
    /// Pruned after each task once nothing can reach them.
    pub(super) retained: HashMap<ScopeId, Scope>,
    pub(super) captured: HashSet<ScopeId>,
    pub(super) timers: TimerWheel,
    pub(super) control: Controller,
    pub(super) session: Uuid,
    pub(super) span: tracing::Span,
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("session", &self.session)
            .field("phase", &self.phase)
            .field("cursor", &self.cursor)
            .field("instructions", &self.program.len())
            .field("depth", &self.depth)
            .finish()
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl Interpreter {
    pub fn new(settings: Settings) -> Self {
        let session = Uuid::new_v4();
        Self {
            store: RuntimeStore::new(settings.step_delay_ms),
            settings,
            program: Arc::from(Vec::new()),
            diagnostics: Vec::new(),
            fault: None,
            declarations: HashMap::new(),
            cursor: 0,
            phase: Phase::Idle,
            pacing: Pacing::Immediate,
            global: None,
            depth: 0,
            retained: HashMap::new(),
            captured: HashSet::new(),
            timers: TimerWheel::default(),
            control: Controller::new(),
            session,
            span: info_span!("session", id = %session),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(Settings::from(config))
    }

    /* ===================== Lifecycle ===================== */

    /// Load a translated program: fresh global scope and frame, cursor at 0.
    /// Anything from a previous program is reset first.
    pub fn init(&mut self, program: Program) {
        self.reset();

        let _guard = self.span.clone().entered();
        for diagnostic in &program.diagnostics {
            warn!(
                line = diagnostic.line,
                text = %diagnostic.text,
                "skipped statement: {}",
                diagnostic.message
            );
        }

        self.declarations = program
            .instructions
            .iter()
            .filter_map(|i| match &i.kind {
                InstructionKind::FunctionDeclaration { function } => function
                    .name
                    .clone()
                    .map(|name| (name, function.clone())),
                _ => None,
            })
            .collect();
        self.fault = program
            .diagnostics
            .iter()
            .find(|d| d.fatal)
            .map(|d| d.message.clone());
        self.diagnostics = program.diagnostics;
        self.program = Arc::from(program.instructions);

        let scope = self.store.create_scope("Global", ScopeKind::Global, None);
        self.store
            .push_frame("(global)", FrameKind::Global, Some("globalThis".to_string()), 0);
        self.global = Some(scope);

        info!(
            instructions = self.program.len(),
            diagnostics = self.diagnostics.len(),
            "program loaded"
        );
    }

    /// Stop, abort timers and clear the model. `init` is needed before the
    /// next run.
    pub fn reset(&mut self) {
        self.control.stop();
        self.control = Controller::new();
        self.store.reset();
        self.store.set_speed(self.settings.step_delay_ms);
        self.timers = TimerWheel::default();

        self.program = Arc::from(Vec::new());
        self.diagnostics.clear();
        self.fault = None;
        self.declarations.clear();
        self.cursor = 0;
        self.phase = Phase::Idle;
        self.global = None;
        self.depth = 0;
        self.retained.clear();
        self.captured.clear();

        self.session = Uuid::new_v4();
        self.span = info_span!("session", id = %self.session);
    }

    /// Request suspension at the next pacing point of `run()`
    pub fn pause(&mut self) {
        self.control.pause();
        if self.phase == Phase::Running {
            self.phase = Phase::Paused;
            self.store.set_execution(true, true);
        }
    }

    pub fn resume(&mut self) {
        self.control.resume();
        if self.phase == Phase::Paused {
            self.phase = Phase::Running;
            self.store.set_execution(true, false);
        }
    }

    /// Handle for pausing or stopping while `run()` holds the interpreter
    pub fn controller(&self) -> Controller {
        self.control.clone()
    }

    /* ===================== Accessors ===================== */

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> &RuntimeState {
        self.store.state()
    }

    pub fn store(&self) -> &RuntimeStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut RuntimeStore {
        &mut self.store
    }

    pub fn subscribe(&mut self, topic: Topic, handler: Handler) -> SubscriptionId {
        self.store.subscribe(topic, handler)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn session_id(&self) -> Uuid {
        self.session
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    /// Change the step delay for subsequent pacing and timers
    pub fn set_speed(&mut self, step_delay_ms: u64) {
        self.settings.step_delay_ms = step_delay_ms;
        self.store.set_speed(step_delay_ms);
    }

    pub(super) fn global_scope(&self) -> RuntimeResult<ScopeId> {
        self.global.ok_or(RuntimeError::NotInitialized)
    }

    /// Whether the program or any queue still has work
    pub(super) fn has_work(&self) -> bool {
        self.cursor < self.program.len() || !self.store.state().event_loop.is_empty()
    }
}
