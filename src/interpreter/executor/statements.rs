//! Per-instruction semantics

use std::time::Duration;

use tracing::debug;

use super::errors::RuntimeResult;
use super::format;
use super::vm::Interpreter;
use crate::interpreter::types::{
    AssignTarget, CallbackExpr, ConsoleMethod, DeclKind, Expr, Instruction, InstructionKind,
    PromiseSource, ReactionExpr,
};
use crate::state::{HeapPayload, Reaction, ScopeId, Settlement, Task, TaskKind, Value};

/// How far past its end an index write may extend an array
const MAX_ARRAY_GROWTH: usize = 1 << 16;

impl Interpreter {
    /// Execute one instruction in `scope`. `Some(value)` means the body
    /// returned.
    pub(super) async fn execute(&mut self, instruction: &Instruction, scope: ScopeId) -> RuntimeResult<Option<Value>> {
        let line = instruction.line;
        self.store.set_current_line(line as i64);
        debug!(line, kind = instruction.kind.label(), "execute");

        match &instruction.kind {
            InstructionKind::HoistingMarker { .. } => {}

            InstructionKind::FunctionDeclaration { function } => {
                let value = self.allocate_function(function.clone(), scope);
                self.store
                    .declare_variable(scope, function.display_name(), value.clone(), DeclKind::Function);
                self.store.update_frame_variable(function.display_name(), value);
            }

            InstructionKind::HoistedVar { name } => {
                // a function of the same name keeps its binding
                if !self.bound_here(scope, name) {
                    self.store
                        .declare_variable(scope, name, Value::Undefined, DeclKind::Var);
                    self.store.update_frame_variable(name, Value::Undefined);
                }
            }

            InstructionKind::VariableDeclaration { kind, name, init } => {
                // `var x;` after hoisting leaves the current value alone
                if init.is_none() && *kind == DeclKind::Var && self.bound_here(scope, name) {
                    return Ok(None);
                }
                let value = match init {
                    Some(expr) => self.eval(expr, scope).await?,
                    None => Value::Undefined,
                };
                self.store.declare_variable(scope, name, value.clone(), *kind);
                self.store.update_frame_variable(name, value);
            }

            InstructionKind::Assignment { target, value } => {
                let value = self.eval(value, scope).await?;
                self.assign(target, value, scope).await?;
            }

            InstructionKind::FunctionCall { callee, args } => {
                let args = self.eval_args(args, scope).await?;
                self.call_named(callee, args, scope, line).await?;
            }

            InstructionKind::MethodCall {
                object,
                method,
                args,
            } => {
                self.call_method(object, method, args, scope, line).await?;
            }

            InstructionKind::Console { method, args } => {
                self.console(*method, args, scope).await?;
            }

            InstructionKind::TimerRegistration {
                callback,
                delay,
                args,
            } => {
                self.register_timer(callback, delay.as_ref(), args, scope).await?;
            }

            InstructionKind::PromiseThen { source, reactions } => {
                self.register_promise(source, reactions, scope).await?;
            }

            InstructionKind::Return { value } => {
                let value = match value {
                    Some(expr) => self.eval(expr, scope).await?,
                    None => Value::Undefined,
                };
                return Ok(Some(value));
            }

            InstructionKind::ObjectConstruction {
                declaration,
                name,
                constructor,
                args,
            } => {
                self.eval_args(args, scope).await?;
                let value = self.construct(constructor);
                match declaration {
                    Some(kind) => {
                        self.store.declare_variable(scope, name, value.clone(), *kind);
                        self.store.update_frame_variable(name, value);
                    }
                    None => self.assign_variable(scope, name, value),
                }
            }
        }

        Ok(None)
    }

    fn bound_here(&self, scope: ScopeId, name: &str) -> bool {
        self.store
            .scope(scope)
            .map(|s| s.variables.contains_key(name))
            .unwrap_or(false)
    }

    /// Empty object for `new C(...)`; `new Array()` gives an array
    pub(super) fn construct(&mut self, constructor: &str) -> Value {
        let payload = match constructor {
            "Array" => HeapPayload::Array(Vec::new()),
            _ => HeapPayload::Object {
                class: Some(constructor.to_string()),
                properties: Vec::new(),
            },
        };
        Value::Ref(self.store.allocate(payload))
    }

    pub(super) async fn console(&mut self, method: ConsoleMethod, args: &[Expr], scope: ScopeId) -> RuntimeResult<()> {
        let values = self.eval_args(args, scope).await?;
        let shown = values.iter().map(|v| format::display(&self.store, v)).collect();
        self.store.log_console(method, shown);
        Ok(())
    }

    /// Store `value` into a variable, property or index target
    pub(super) async fn assign(&mut self, target: &AssignTarget, value: Value, scope: ScopeId) -> RuntimeResult<()> {
        match target {
            AssignTarget::Variable { name } => self.assign_variable(scope, name, value),
            AssignTarget::Property { object, property } => {
                let object = self.eval(object, scope).await?;
                self.set_property(&object, property, value);
            }
            AssignTarget::Index { object, index } => {
                let object = self.eval(object, scope).await?;
                let index = self.eval(index, scope).await?;
                let is_array = matches!(
                    object
                        .as_ref_id()
                        .and_then(|id| self.store.heap_object(id))
                        .map(|o| &o.payload),
                    Some(HeapPayload::Array(_))
                );
                if is_array {
                    self.set_index(&object, format::to_number(&index), value);
                } else {
                    let key = format::to_js_string(&self.store, &index);
                    self.set_property(&object, &key, value);
                }
            }
        }
        Ok(())
    }

    fn set_property(&mut self, object: &Value, property: &str, value: Value) {
        let Some(id) = object.as_ref_id() else {
            debug!(property, "property write on a primitive ignored");
            return;
        };
        let Some(HeapPayload::Object { class, properties }) =
            self.store.heap_object(id).map(|o| o.payload.clone())
        else {
            return;
        };

        let mut properties = properties;
        match properties.iter_mut().find(|(k, _)| k == property) {
            Some((_, slot)) => *slot = value,
            None => properties.push((property.to_string(), value)),
        }
        self.store
            .update_object(id, HeapPayload::Object { class, properties });
    }

    fn set_index(&mut self, object: &Value, index: f64, value: Value) {
        let Some(id) = object.as_ref_id() else {
            return;
        };
        let Some(HeapPayload::Array(mut items)) = self.store.heap_object(id).map(|o| o.payload.clone()) else {
            return;
        };
        if index < 0.0 || index.fract() != 0.0 {
            debug!(index, "non-integer array index write ignored");
            return;
        }
        if index > (items.len() + MAX_ARRAY_GROWTH) as f64 {
            debug!(index, len = items.len(), "array index write too far past the end ignored");
            return;
        }

        let index = index as usize;
        if index >= items.len() {
            items.resize(index + 1, Value::Undefined);
        }
        items[index] = value;
        self.store.update_object(id, HeapPayload::Array(items));
    }

    /* ===================== Event Loop Registration ===================== */

    /// `setTimeout`: park the task in the web-API queue and start its sleeper
    pub(super) async fn register_timer(
        &mut self,
        callback: &CallbackExpr,
        delay: Option<&Expr>,
        args: &[Expr],
        scope: ScopeId,
    ) -> RuntimeResult<()> {
        let delay_ms = match delay {
            Some(expr) => {
                let value = self.eval(expr, scope).await?;
                let ms = format::to_number(&value);
                if ms.is_finite() && ms > 0.0 {
                    ms as u64
                } else {
                    0
                }
            }
            None => 0,
        };
        let args = self.eval_args(args, scope).await?;
        let Some(callback) = self.resolve_callback(callback, scope) else {
            return Ok(());
        };

        self.captured.insert(callback.closure);
        let name = callback.function.display_name().to_string();
        let task = Task::new(name, TaskKind::Timer, callback)
            .with_args(args)
            .with_delay(delay_ms);
        let id = self.store.add_web_api(task);

        let wait = Duration::from_millis(delay_ms.min(self.store.state().speed_ms));
        self.timers.schedule(&mut self.store, id, delay_ms, wait);
        Ok(())
    }

    /// Promise chains start already settled, so the first handling reaction
    /// goes straight to the microtask queue
    pub(super) async fn register_promise(
        &mut self,
        source: &PromiseSource,
        reactions: &[ReactionExpr],
        scope: ScopeId,
    ) -> RuntimeResult<()> {
        let settled = match source {
            PromiseSource::Resolve(value) | PromiseSource::Reject(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, scope).await?,
                    None => Value::Undefined,
                };
                if matches!(source, PromiseSource::Reject(_)) {
                    Settlement::Rejected(value)
                } else {
                    Settlement::Fulfilled(value)
                }
            }
            PromiseSource::QueueMicrotask => {
                for reaction in reactions {
                    if let Some(callback) = self.resolve_callback(&reaction.callback, scope) {
                        self.captured.insert(callback.closure);
                        let name = callback.function.display_name().to_string();
                        self.store
                            .add_microtask(Task::new(name, TaskKind::Microtask, callback));
                    }
                }
                return Ok(());
            }
        };

        let mut chain = Vec::with_capacity(reactions.len());
        for reaction in reactions {
            if let Some(callback) = self.resolve_callback(&reaction.callback, scope) {
                chain.push(Reaction {
                    kind: reaction.kind,
                    callback,
                });
            }
        }
        self.schedule_reaction(settled, chain);
        Ok(())
    }
}
