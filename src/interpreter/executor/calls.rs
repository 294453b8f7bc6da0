//! Function invocation, the scope chain and task callbacks
//!
//! Calls recurse through boxed futures: `invoke` runs a body, a body's
//! instructions evaluate expressions, and expressions may call again.
//! Every nested poll of `invoke` goes through `stacker`, so the call-depth
//! limit is reached before the thread stack runs out.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use super::errors::{RuntimeError, RuntimeResult};
use super::format;
use super::vm::Interpreter;
use crate::interpreter::types::{CallbackExpr, ConsoleMethod, DeclKind, FunctionDef, Instruction, ReactionKind};
use crate::state::{
    Callback, FrameKind, FunctionObject, HeapPayload, PromiseLink, Reaction, ScopeBinding, ScopeId,
    ScopeKind, Settlement, Task, TaskKind, Value,
};

pub(super) type LocalBoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Free stack required before polling a nested call in place
const STACK_RED_ZONE: usize = 256 * 1024;
/// Size of each stack segment allocated when the red zone is reached
const STACK_SEGMENT: usize = 4 * 1024 * 1024;

/// Everything needed to enter a function body
#[derive(Debug, Clone)]
pub(super) struct Call {
    pub function: Arc<FunctionDef>,
    pub closure: ScopeId,
    pub args: Vec<Value>,
    /// Receiver shown in the frame, and bound to `this` for method calls
    pub receiver: Option<(String, Value)>,
    /// Call-site line, highlighted again once the call returns
    pub line: usize,
}

/// Outcome of resolving a name to something callable
pub(super) enum Resolved {
    Function(Callback),
    NotCallable,
    Unbound,
}

impl Interpreter {
    /* ===================== Invocation ===================== */

    pub(super) fn invoke(&mut self, call: Call) -> LocalBoxFuture<'_, RuntimeResult<Value>> {
        let mut body = self.enter(call);
        Box::pin(std::future::poll_fn(move |cx| {
            stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, || body.as_mut().poll(cx))
        }))
    }

    fn enter(&mut self, call: Call) -> LocalBoxFuture<'_, RuntimeResult<Value>> {
        Box::pin(async move {
            let name = call.function.display_name().to_string();
            if self.depth >= self.settings.max_call_depth {
                return Err(RuntimeError::CallDepthExceeded {
                    depth: self.depth,
                    function: name,
                });
            }
            self.depth += 1;
            debug!(function = %name, depth = self.depth, "enter");

            let restored = self.restore_chain(call.closure);
            let scope = self
                .store
                .create_scope(name.clone(), ScopeKind::Function, Some(call.closure));
            let this_display = call.receiver.as_ref().map(|(display, _)| display.clone());
            self.store
                .push_frame(name.clone(), FrameKind::Function, this_display, call.function.start_line);
            self.store.set_current_line(call.function.start_line as i64);

            if let Some((_, receiver)) = &call.receiver {
                self.store
                    .declare_variable(scope, "this", receiver.clone(), DeclKind::Param);
            }
            for (index, param) in call.function.params.iter().enumerate() {
                let value = call.args.get(index).cloned().unwrap_or_default();
                self.store.declare_variable(scope, param, value.clone(), DeclKind::Param);
                self.store.update_frame_variable(param, value);
            }

            let result = self.run_body(&call.function.body, scope).await;

            self.store.pop_frame();
            self.release_scope(scope);
            for id in restored.into_iter().rev() {
                self.release_scope(id);
            }
            self.depth -= 1;
            if call.line > 0 {
                self.store.set_current_line(call.line as i64);
            }
            debug!(function = %name, depth = self.depth, "leave");
            result
        })
    }

    /// Interpret a cached body; the first `return` ends it
    pub(super) async fn run_body(&mut self, body: &[Instruction], scope: ScopeId) -> RuntimeResult<Value> {
        for instruction in body {
            self.pace().await?;
            if let Some(value) = Box::pin(self.execute(instruction, scope)).await? {
                return Ok(value);
            }
        }
        Ok(Value::Undefined)
    }

    /// Call `name(args)` from a statement or expression
    pub(super) async fn call_named(&mut self, name: &str, args: Vec<Value>, scope: ScopeId, line: usize) -> RuntimeResult<Value> {
        match self.resolve_function(scope, name) {
            Resolved::Function(callback) => {
                self.invoke(Call {
                    function: callback.function,
                    closure: callback.closure,
                    args,
                    receiver: None,
                    line,
                })
                .await
            }
            Resolved::NotCallable => {
                self.script_error(format!("TypeError: {} is not a function", name));
                Ok(Value::Undefined)
            }
            Resolved::Unbound => {
                self.script_error(format!("ReferenceError: {} is not defined", name));
                Ok(Value::Undefined)
            }
        }
    }

    /// Call a function value (e.g. an object method) if it is one
    pub(super) async fn call_value(
        &mut self,
        callee: &Value,
        args: Vec<Value>,
        receiver: Option<(String, Value)>,
        line: usize,
    ) -> RuntimeResult<Option<Value>> {
        let Some(function) = self.function_object(callee) else {
            return Ok(None);
        };
        let value = self
            .invoke(Call {
                function: function.def,
                closure: function.closure,
                args,
                receiver,
                line,
            })
            .await?;
        Ok(Some(value))
    }

    pub(super) fn function_object(&self, value: &Value) -> Option<FunctionObject> {
        let id = value.as_ref_id()?;
        match &self.store.heap_object(id)?.payload {
            HeapPayload::Function(function) => Some(function.clone()),
            _ => None,
        }
    }

    /// Scope chain first, then top-level declarations
    pub(super) fn resolve_function(&self, scope: ScopeId, name: &str) -> Resolved {
        if let Some((_, binding)) = self.lookup(scope, name) {
            return match self.function_object(&binding.value) {
                Some(function) => Resolved::Function(Callback {
                    function: function.def,
                    closure: function.closure,
                }),
                None => Resolved::NotCallable,
            };
        }

        match (self.declarations.get(name), self.global) {
            (Some(def), Some(global)) => Resolved::Function(Callback {
                function: def.clone(),
                closure: global,
            }),
            _ => Resolved::Unbound,
        }
    }

    /// Turn a callback argument into a function plus closure. Unknown names
    /// are reported and yield `None`.
    pub(super) fn resolve_callback(&mut self, callback: &CallbackExpr, scope: ScopeId) -> Option<Callback> {
        match callback {
            CallbackExpr::Inline { function } => Some(Callback {
                function: function.clone(),
                closure: scope,
            }),
            CallbackExpr::Named { name } => match self.resolve_function(scope, name) {
                Resolved::Function(callback) => Some(callback),
                Resolved::NotCallable => {
                    self.script_error(format!("TypeError: {} is not a function", name));
                    None
                }
                Resolved::Unbound => {
                    self.script_error(format!("ReferenceError: {} is not defined", name));
                    None
                }
            },
        }
    }

    /// Allocate a function object closing over `scope`
    pub(super) fn allocate_function(&mut self, def: Arc<FunctionDef>, scope: ScopeId) -> Value {
        self.captured.insert(scope);
        let id = self.store.allocate(HeapPayload::Function(FunctionObject {
            def,
            closure: scope,
        }));
        Value::Ref(id)
    }

    /* ===================== Scope Chain ===================== */

    /// Walk parent links over live and retained scopes
    pub(super) fn lookup(&self, scope: ScopeId, name: &str) -> Option<(ScopeId, ScopeBinding)> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let found = self.store.scope(id).or_else(|| self.retained.get(&id))?;
            if let Some(binding) = found.variables.get(name) {
                return Some((id, binding.clone()));
            }
            current = found.parent;
        }
        None
    }

    pub(super) fn read_variable(&self, scope: ScopeId, name: &str) -> Value {
        self.lookup(scope, name)
            .map(|(_, binding)| binding.value)
            .unwrap_or_default()
    }

    /// Assign to the nearest binding on the chain, or create an implicit one
    /// in the current scope. Mirrors into the active frame.
    pub(super) fn assign_variable(&mut self, scope: ScopeId, name: &str, value: Value) {
        match self.lookup(scope, name) {
            Some((_, binding)) if binding.declaration == DeclKind::Const => {
                self.script_error("TypeError: Assignment to constant variable.".to_string());
                return;
            }
            Some((owner, _)) => {
                if !self.store.update_variable(owner, name, value.clone()) {
                    if let Some(retained) = self.retained.get_mut(&owner) {
                        if let Some(binding) = retained.variables.get_mut(name) {
                            binding.value = value.clone();
                        }
                    }
                }
            }
            None => {
                self.store
                    .declare_variable(scope, name, value.clone(), DeclKind::Implicit);
            }
        }
        self.store.update_frame_variable(name, value);
    }

    /// Put retained ancestors of `closure` back into the scope list,
    /// outermost first. Returns what was restored.
    fn restore_chain(&mut self, closure: ScopeId) -> Vec<ScopeId> {
        let mut missing = Vec::new();
        let mut current = Some(closure);
        while let Some(id) = current {
            if let Some(live) = self.store.scope(id) {
                current = live.parent;
                continue;
            }
            match self.retained.get(&id) {
                Some(scope) => {
                    missing.push(id);
                    current = scope.parent;
                }
                None => break,
            }
        }

        let mut restored = Vec::new();
        for id in missing.into_iter().rev() {
            if let Some(scope) = self.retained.remove(&id) {
                self.store.restore_scope(scope);
                restored.push(id);
            }
        }
        restored
    }

    /// Destroy a scope, keeping it aside if something closed over it
    fn release_scope(&mut self, id: ScopeId) {
        if let Some(scope) = self.store.destroy_scope(id) {
            if self.captured.contains(&id) {
                self.retained.insert(id, scope);
            }
        }
    }

    /* ===================== Tasks ===================== */

    /// Run a dequeued task to completion and schedule what follows it
    pub(super) async fn run_task(&mut self, task: Task) -> RuntimeResult<()> {
        debug!(task = %task.id, name = %task.name, kind = ?task.kind, "run task");
        let Task {
            callback,
            args,
            promise,
            ..
        } = task;

        let result = self
            .invoke(Call {
                function: callback.function,
                closure: callback.closure,
                args,
                receiver: None,
                line: 0,
            })
            .await?;

        if let Some(link) = promise {
            let next = match link.reaction {
                ReactionKind::Finally => link.settled,
                _ => Settlement::Fulfilled(result),
            };
            self.schedule_reaction(next, link.chain);
        }
        self.prune_retained();
        Ok(())
    }

    /// Forget retained scopes that no function object and no queued task can
    /// reach any more
    fn prune_retained(&mut self) {
        let state = self.store.state();
        let queues = &state.event_loop;
        let mut roots: Vec<ScopeId> = state
            .heap
            .values()
            .filter_map(|object| match &object.payload {
                HeapPayload::Function(function) => Some(function.closure),
                _ => None,
            })
            .collect();
        for task in queues
            .web_apis
            .iter()
            .chain(&queues.callback_queue)
            .chain(&queues.microtask_queue)
        {
            roots.push(task.callback.closure);
            if let Some(link) = &task.promise {
                roots.extend(link.chain.iter().map(|r| r.callback.closure));
            }
        }

        let mut reachable = HashSet::new();
        for root in roots {
            let mut current = Some(root);
            while let Some(id) = current {
                if !reachable.insert(id) {
                    break;
                }
                current = self
                    .store
                    .scope(id)
                    .or_else(|| self.retained.get(&id))
                    .and_then(|scope| scope.parent);
            }
        }

        let before = self.retained.len();
        self.retained.retain(|id, _| reachable.contains(id));
        let store = &self.store;
        self.captured
            .retain(|id| reachable.contains(id) || store.scope(*id).is_some());
        if self.retained.len() != before {
            debug!(dropped = before - self.retained.len(), "pruned retained scopes");
        }
    }

    /// Queue the first reaction of `chain` that handles `settled`. Reactions
    /// that do not handle it pass the settlement through.
    pub(super) fn schedule_reaction(&mut self, settled: Settlement, chain: Vec<Reaction>) {
        let mut remaining = chain.into_iter();
        while let Some(reaction) = remaining.next() {
            let handles = matches!(
                (&settled, reaction.kind),
                (Settlement::Fulfilled(_), ReactionKind::Then)
                    | (Settlement::Rejected(_), ReactionKind::Catch)
                    | (_, ReactionKind::Finally)
            );
            if !handles {
                continue;
            }

            let args = match (&settled, reaction.kind) {
                (_, ReactionKind::Finally) => Vec::new(),
                (Settlement::Fulfilled(v), _) | (Settlement::Rejected(v), _) => vec![v.clone()],
            };
            self.captured.insert(reaction.callback.closure);
            let name = reaction.callback.function.display_name().to_string();
            let task = Task::new(name, TaskKind::Promise, reaction.callback)
                .with_args(args)
                .with_promise(PromiseLink {
                    reaction: reaction.kind,
                    settled,
                    chain: remaining.collect(),
                });
            self.store.add_microtask(task);
            return;
        }

        if let Settlement::Rejected(reason) = settled {
            let shown = format::display(&self.store, &reason);
            self.script_error(format!("Uncaught (in promise) {}", shown));
        }
    }

    /// Script-level error: console entry, execution continues
    pub(super) fn script_error(&mut self, message: String) {
        debug!(%message, "script error");
        self.store.log_console(ConsoleMethod::Error, vec![message]);
    }
}
