//! Expression evaluation

use tracing::debug;

use super::calls::LocalBoxFuture;
use super::errors::RuntimeResult;
use super::format;
use super::vm::Interpreter;
use crate::interpreter::translator::builtin_call;
use crate::interpreter::types::{
    AssignTarget, BinaryOp, Expr, Instruction, Literal, TemplatePart, UnaryOp, UpdateOp,
};
use crate::state::{HeapId, HeapPayload, ScopeId, Value};

impl Interpreter {
    /// Evaluate `expr` in `scope`. Boxed because calls recurse back into
    /// function bodies.
    pub(super) fn eval<'a>(&'a mut self, expr: &'a Expr, scope: ScopeId) -> LocalBoxFuture<'a, RuntimeResult<Value>> {
        Box::pin(async move {
            let value = match expr {
                Expr::Literal { value } => literal(value),

                Expr::Template { parts } => {
                    let mut out = String::new();
                    for part in parts {
                        match part {
                            TemplatePart::Text(text) => out.push_str(text),
                            TemplatePart::Expr(expr) => {
                                let value = self.eval(expr, scope).await?;
                                out.push_str(&format::to_js_string(&self.store, &value));
                            }
                        }
                    }
                    Value::Str(out)
                }

                Expr::Array { elements } => {
                    let items = self.eval_args(elements, scope).await?;
                    Value::Ref(self.store.allocate(HeapPayload::Array(items)))
                }

                Expr::Object { properties } => {
                    let mut values = Vec::with_capacity(properties.len());
                    for (key, expr) in properties {
                        values.push((key.clone(), self.eval(expr, scope).await?));
                    }
                    Value::Ref(self.store.allocate(HeapPayload::Object {
                        class: None,
                        properties: values,
                    }))
                }

                Expr::Function { function } => self.allocate_function(function.clone(), scope),

                Expr::Call { callee, args } => self.eval_call(callee, args, scope).await?,

                Expr::Variable { name } if name == "undefined" => Value::Undefined,
                Expr::Variable { name } => self.read_variable(scope, name),

                Expr::Property { object, property } => {
                    let object = self.eval(object, scope).await?;
                    self.read_property(&object, property)
                }

                Expr::Index { object, index } => {
                    let object = self.eval(object, scope).await?;
                    let index = self.eval(index, scope).await?;
                    self.read_index(&object, &index)
                }

                Expr::Unary { op, operand } => {
                    let value = self.eval(operand, scope).await?;
                    match op {
                        UnaryOp::Typeof => Value::Str(format::type_of(&self.store, &value).to_string()),
                        UnaryOp::Not => Value::Bool(!format::is_truthy(&value)),
                        UnaryOp::Neg => Value::Num(-format::to_number(&value)),
                    }
                }

                Expr::Binary { op, left, right } => {
                    let left = self.eval(left, scope).await?;
                    match op {
                        BinaryOp::And if !format::is_truthy(&left) => left,
                        BinaryOp::Or if format::is_truthy(&left) => left,
                        BinaryOp::And | BinaryOp::Or => self.eval(right, scope).await?,
                        _ => {
                            let right = self.eval(right, scope).await?;
                            self.binary(*op, &left, &right)
                        }
                    }
                }

                Expr::Update { op, prefix, target } => {
                    let Some(target_ref) = update_target(target) else {
                        debug!("update on a non-reference ignored");
                        return Ok(Value::Num(f64::NAN));
                    };
                    let old = format::to_number(&self.eval(target, scope).await?);
                    let new = match op {
                        UpdateOp::Inc => old + 1.0,
                        UpdateOp::Dec => old - 1.0,
                    };
                    self.assign(&target_ref, Value::Num(new), scope).await?;
                    Value::Num(if *prefix { new } else { old })
                }

                Expr::New { constructor, args } => {
                    self.eval_args(args, scope).await?;
                    self.construct(constructor)
                }
            };
            Ok(value)
        })
    }

    pub(super) async fn eval_args(&mut self, args: &[Expr], scope: ScopeId) -> RuntimeResult<Vec<Value>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg, scope).await?);
        }
        Ok(values)
    }

    /// Call expression. Builtins run as their own instruction and yield
    /// `undefined`; everything else yields the callee's return value.
    async fn eval_call(&mut self, callee: &Expr, args: &[Expr], scope: ScopeId) -> RuntimeResult<Value> {
        let line = self.store.state().current_line.max(0) as usize;

        match builtin_call(callee, args, line) {
            Ok(Some(kind)) => {
                self.execute(&Instruction::new(line, kind), scope).await?;
                return Ok(Value::Undefined);
            }
            Ok(None) => {}
            Err(err) => {
                self.script_error(format!("TypeError: {}", err));
                return Ok(Value::Undefined);
            }
        }

        match callee {
            Expr::Variable { name } => {
                let args = self.eval_args(args, scope).await?;
                self.call_named(name, args, scope, line).await
            }
            Expr::Property { object, property } => self.call_method(object, property, args, scope, line).await,
            other => {
                let function = self.eval(other, scope).await?;
                let args = self.eval_args(args, scope).await?;
                match self.call_value(&function, args, None, line).await? {
                    Some(value) => Ok(value),
                    None => {
                        self.script_error("TypeError: expression is not a function".to_string());
                        Ok(Value::Undefined)
                    }
                }
            }
        }
    }

    /// `object.method(args)`: array builtins, string case helpers, or a
    /// function-valued property invoked with `this` bound to the object
    pub(super) async fn call_method(
        &mut self,
        object: &Expr,
        method: &str,
        args: &[Expr],
        scope: ScopeId,
        line: usize,
    ) -> RuntimeResult<Value> {
        let receiver = self.eval(object, scope).await?;
        let args = self.eval_args(args, scope).await?;

        match &receiver {
            Value::Ref(id) => match self.store.heap_object(*id).map(|o| o.payload.clone()) {
                Some(HeapPayload::Array(items)) => {
                    if let Some(value) = self.array_method(*id, items, method, &args) {
                        return Ok(value);
                    }
                }
                Some(payload @ HeapPayload::Object { .. }) => {
                    if let Some(callee) = payload.property(method) {
                        let shown = object.dotted_path().unwrap_or_else(|| "object".to_string());
                        if let Some(value) = self
                            .call_value(callee, args, Some((shown, receiver.clone())), line)
                            .await?
                        {
                            return Ok(value);
                        }
                    }
                }
                _ => {}
            },
            Value::Str(s) => match method {
                "toUpperCase" => return Ok(Value::Str(s.to_uppercase())),
                "toLowerCase" => return Ok(Value::Str(s.to_lowercase())),
                _ => {}
            },
            _ => {}
        }

        debug!(method, "unsupported method call ignored");
        Ok(Value::Undefined)
    }

    fn array_method(&mut self, id: HeapId, mut items: Vec<Value>, method: &str, args: &[Value]) -> Option<Value> {
        let result = match method {
            "push" => {
                items.extend(args.iter().cloned());
                Value::Num(items.len() as f64)
            }
            "unshift" => {
                items.splice(0..0, args.iter().cloned());
                Value::Num(items.len() as f64)
            }
            "pop" => items.pop().unwrap_or_default(),
            "shift" => {
                if items.is_empty() {
                    Value::Undefined
                } else {
                    items.remove(0)
                }
            }
            "join" => {
                let separator = match args.first() {
                    Some(Value::Undefined) | None => ",".to_string(),
                    Some(other) => format::to_js_string(&self.store, other),
                };
                let parts: Vec<String> = items
                    .iter()
                    .map(|v| match v {
                        Value::Undefined | Value::Null => String::new(),
                        other => format::to_js_string(&self.store, other),
                    })
                    .collect();
                return Some(Value::Str(parts.join(&separator)));
            }
            "includes" => {
                let needle = args.first().cloned().unwrap_or_default();
                return Some(Value::Bool(items.iter().any(|v| format::strict_equals(v, &needle))));
            }
            "indexOf" => {
                let needle = args.first().cloned().unwrap_or_default();
                let index = items.iter().position(|v| format::strict_equals(v, &needle));
                return Some(Value::Num(index.map(|i| i as f64).unwrap_or(-1.0)));
            }
            _ => return None,
        };

        self.store.update_object(id, HeapPayload::Array(items));
        Some(result)
    }

    fn read_property(&self, object: &Value, property: &str) -> Value {
        match object {
            Value::Str(s) if property == "length" => Value::Num(s.encode_utf16().count() as f64),
            Value::Ref(id) => match self.store.heap_object(*id).map(|o| &o.payload) {
                Some(HeapPayload::Array(items)) if property == "length" => Value::Num(items.len() as f64),
                Some(HeapPayload::Function(f)) if property == "name" => {
                    Value::Str(f.def.name.clone().unwrap_or_default())
                }
                Some(payload) => payload.property(property).cloned().unwrap_or_default(),
                None => Value::Undefined,
            },
            _ => Value::Undefined,
        }
    }

    fn read_index(&self, object: &Value, index: &Value) -> Value {
        let position = format::to_number(index);
        let position = (position >= 0.0 && position.fract() == 0.0).then_some(position as usize);

        match object {
            Value::Str(s) => position
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::Str(c.to_string()))
                .unwrap_or_default(),
            Value::Ref(id) => match self.store.heap_object(*id).map(|o| &o.payload) {
                Some(HeapPayload::Array(items)) => position
                    .and_then(|i| items.get(i))
                    .cloned()
                    .unwrap_or_default(),
                Some(_) => {
                    let key = format::to_js_string(&self.store, index);
                    self.read_property(object, &key)
                }
                None => Value::Undefined,
            },
            _ => Value::Undefined,
        }
    }

    fn binary(&self, op: BinaryOp, left: &Value, right: &Value) -> Value {
        let num = |v: &Value| format::to_number(v);
        match op {
            BinaryOp::Add => {
                let stringy = |v: &Value| matches!(v, Value::Str(_) | Value::Ref(_));
                if stringy(left) || stringy(right) {
                    let mut out = format::to_js_string(&self.store, left);
                    out.push_str(&format::to_js_string(&self.store, right));
                    Value::Str(out)
                } else {
                    Value::Num(num(left) + num(right))
                }
            }
            BinaryOp::Sub => Value::Num(num(left) - num(right)),
            BinaryOp::Mul => Value::Num(num(left) * num(right)),
            BinaryOp::Div => Value::Num(num(left) / num(right)),
            BinaryOp::Mod => Value::Num(num(left) % num(right)),
            BinaryOp::Eq => Value::Bool(format::loose_equals(left, right)),
            BinaryOp::NotEq => Value::Bool(!format::loose_equals(left, right)),
            BinaryOp::StrictEq => Value::Bool(format::strict_equals(left, right)),
            BinaryOp::StrictNotEq => Value::Bool(!format::strict_equals(left, right)),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let ordering = match (left, right) {
                    (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                    _ => num(left).partial_cmp(&num(right)),
                };
                let Some(ordering) = ordering else {
                    return Value::Bool(false);
                };
                Value::Bool(match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::Le => ordering.is_le(),
                    BinaryOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                })
            }
            // short-circuited by the caller
            BinaryOp::And | BinaryOp::Or => Value::Undefined,
        }
    }
}

fn literal(value: &Literal) -> Value {
    match value {
        Literal::Undefined => Value::Undefined,
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Num(n) => Value::Num(*n),
        Literal::Str(s) => Value::Str(s.clone()),
    }
}

fn update_target(expr: &Expr) -> Option<AssignTarget> {
    match expr {
        Expr::Variable { name } => Some(AssignTarget::Variable { name: name.clone() }),
        Expr::Property { object, property } => Some(AssignTarget::Property {
            object: (**object).clone(),
            property: property.clone(),
        }),
        Expr::Index { object, index } => Some(AssignTarget::Index {
            object: (**object).clone(),
            index: (**index).clone(),
        }),
        _ => None,
    }
}
