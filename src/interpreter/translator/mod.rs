//! Instruction translator - PEST-based front end
//!
//! Turns script source into the hoisted instruction sequence the executor walks.
//! The grammar only splits the text into statements and expressions; deciding
//! which statement shape a line is (timer, promise chain, console call, ...)
//! happens in the builder below.
//!
//! Translation is fail-soft: a statement that does not fit one of the
//! recognized shapes is left out and reported as a [`Diagnostic`].

use std::sync::Arc;

use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser;
use thiserror::Error;

use super::types::{
    AssignTarget, BinaryOp, CallbackExpr, ConsoleMethod, DeclKind, Diagnostic, Expr,
    FunctionDef, Instruction, InstructionKind, Literal, Program, PromiseSource, ReactionExpr,
    ReactionKind, TemplatePart, UnaryOp, UpdateOp,
};

mod hoist;

#[cfg(test)]
mod tests;

/* ===================== PEST Parser ===================== */

#[derive(Parser)]
#[grammar = "interpreter/translator/loopscope.pest"]
struct ScriptParser;

/* ===================== Error Types ===================== */

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("{message}")]
    Build { line: usize, message: String },
}

impl TranslateError {
    pub fn line(&self) -> usize {
        match self {
            TranslateError::Syntax { line, .. } | TranslateError::Build { line, .. } => *line,
        }
    }

    fn build(line: usize, message: impl Into<String>) -> Self {
        TranslateError::Build {
            line,
            message: message.into(),
        }
    }
}

impl From<pest::error::Error<Rule>> for TranslateError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        let line = match err.line_col {
            pest::error::LineColLocation::Pos((line, _)) => line,
            pest::error::LineColLocation::Span((line, _), _) => line,
        };
        TranslateError::Syntax {
            line,
            message: err.variant.message().to_string(),
        }
    }
}

pub type TranslateResult<T> = Result<T, TranslateError>;

/* ===================== Public API ===================== */

/// Translate source text into a hoisted program.
///
/// Never fails: if the text cannot be parsed at all the result is a program
/// holding only the hoisting marker plus one diagnostic.
pub fn translate(source: &str) -> Program {
    match try_translate(source) {
        Ok(program) => program,
        Err(err) => Program {
            instructions: hoist::hoist_program(Vec::new()),
            diagnostics: vec![Diagnostic {
                line: err.line(),
                text: String::new(),
                message: err.to_string(),
                fatal: true,
            }],
        },
    }
}

/// Translate source text, surfacing grammar failures as errors.
pub fn try_translate(source: &str) -> TranslateResult<Program> {
    let mut pairs = ScriptParser::parse(Rule::program, source)?;
    let program = pairs
        .next()
        .ok_or_else(|| TranslateError::build(1, "empty parse result"))?;

    let mut builder = Builder::new(source);
    let body = builder.build_statements(program.into_inner());

    Ok(Program {
        instructions: hoist::hoist_program(body),
        diagnostics: builder.diagnostics,
    })
}

/* ===================== Builder ===================== */

struct Builder<'s> {
    source: &'s str,
    diagnostics: Vec<Diagnostic>,
}

fn line_of(pair: &Pair<'_, Rule>) -> usize {
    pair.line_col().0
}

/// Last line the pair actually covers, ignoring trailing whitespace
fn end_line_of(pair: &Pair<'_, Rule>) -> usize {
    line_of(pair) + pair.as_str().trim_end().matches('\n').count()
}

fn next_pair<'i>(inner: &mut Pairs<'i, Rule>, line: usize, what: &str) -> TranslateResult<Pair<'i, Rule>> {
    inner
        .next()
        .ok_or_else(|| TranslateError::build(line, format!("missing {}", what)))
}

impl<'s> Builder<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source,
            diagnostics: Vec::new(),
        }
    }

    fn skip(&mut self, line: usize, text: &str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            line,
            text: text.trim().to_string(),
            message: message.into(),
            fatal: false,
        });
    }

    /* ----- statements ----- */

    fn build_statements(&mut self, pairs: Pairs<'_, Rule>) -> Vec<Instruction> {
        let stmts: Vec<Pair<'_, Rule>> = pairs.filter(|p| p.as_rule() != Rule::EOI).collect();
        let mut out = Vec::new();
        let mut i = 0;

        while i < stmts.len() {
            let stmt = &stmts[i];

            if stmt.as_rule() == Rule::stray_close {
                self.skip(line_of(stmt), stmt.as_str(), "unmatched closing brace");
                i += 1;
                continue;
            }

            // `x = a ? b : c` parses as `x = a` followed by junk on the same
            // line; the whole line is unrecognized then.
            if let Some(next) = stmts.get(i + 1) {
                if runs_into_unknown(stmt, next) {
                    let start = stmt.as_span().start();
                    let end = next.as_span().end();
                    let source = self.source;
                    self.skip(line_of(stmt), &source[start..end], "unrecognized statement");
                    i += 2;
                    continue;
                }
            }

            self.build_statement(stmt.clone(), &mut out);
            i += 1;
        }

        out
    }

    fn build_statement(&mut self, pair: Pair<'_, Rule>, out: &mut Vec<Instruction>) {
        // statement = { (known_stmt ~ semicolon?) | empty_stmt | unknown_stmt }
        let line = line_of(&pair);
        let text = pair.as_str();
        let Some(inner) = pair.clone().into_inner().next() else {
            return;
        };

        match inner.as_rule() {
            Rule::empty_stmt => {}
            Rule::unknown_stmt => self.skip(line, text, "unrecognized statement"),
            _ => match self.build_known(inner) {
                Ok(mut instructions) => out.append(&mut instructions),
                Err(err) => self.skip(line, text, err.to_string()),
            },
        }
    }

    fn build_known(&mut self, pair: Pair<'_, Rule>) -> TranslateResult<Vec<Instruction>> {
        let line = line_of(&pair);
        match pair.as_rule() {
            Rule::function_decl => {
                let function = self.build_function(pair, None)?;
                Ok(vec![Instruction::new(
                    line,
                    InstructionKind::FunctionDeclaration {
                        function: Arc::new(function),
                    },
                )])
            }
            Rule::var_decl => self.build_var_decl(pair),
            Rule::return_stmt => {
                // return_stmt = { kw_return ~ expr? }
                let value = match pair.into_inner().find(|p| p.as_rule() == Rule::expr) {
                    Some(expr) => Some(self.build_expr(expr)?),
                    None => None,
                };
                Ok(vec![Instruction::new(line, InstructionKind::Return { value })])
            }
            Rule::assign_stmt => {
                let kind = self.build_assignment(pair)?;
                Ok(vec![Instruction::new(line, kind)])
            }
            Rule::expr_stmt => {
                let mut inner = pair.into_inner();
                let expr = self.build_expr(next_pair(&mut inner, line, "expression")?)?;
                let kind = expression_statement(expr, line)?;
                Ok(vec![Instruction::new(line, kind)])
            }
            other => Err(TranslateError::build(
                line,
                format!("unexpected statement rule: {:?}", other),
            )),
        }
    }

    fn build_var_decl(&mut self, pair: Pair<'_, Rule>) -> TranslateResult<Vec<Instruction>> {
        // var_decl = { decl_kind ~ declarator ~ ("," ~ declarator)* }
        let line = line_of(&pair);
        let mut inner = pair.into_inner();
        let kind = match next_pair(&mut inner, line, "declaration keyword")?.as_str() {
            "var" => DeclKind::Var,
            "let" => DeclKind::Let,
            _ => DeclKind::Const,
        };

        let mut out = Vec::new();
        for declarator in inner {
            let line = line_of(&declarator);
            let mut parts = declarator.into_inner();
            let name = next_pair(&mut parts, line, "variable name")?.as_str().to_string();
            let init = match parts.next() {
                Some(expr) => Some(with_inferred_name(self.build_expr(expr)?, &name)),
                None => None,
            };

            let instruction = match init {
                Some(Expr::New { constructor, args }) => InstructionKind::ObjectConstruction {
                    declaration: Some(kind),
                    name,
                    constructor,
                    args,
                },
                init => InstructionKind::VariableDeclaration { kind, name, init },
            };
            out.push(Instruction::new(line, instruction));
        }
        Ok(out)
    }

    fn build_assignment(&mut self, pair: Pair<'_, Rule>) -> TranslateResult<InstructionKind> {
        // assign_stmt = { call_expr ~ assign_op ~ expr }
        let line = line_of(&pair);
        let mut inner = pair.into_inner();
        let target_expr = self.build_expr(next_pair(&mut inner, line, "assignment target")?)?;
        let op = next_pair(&mut inner, line, "assignment operator")?;
        let value = self.build_expr(next_pair(&mut inner, line, "assigned value")?)?;

        let target = assign_target(target_expr, line)?;
        let value = match op.as_str() {
            "=" => value,
            compound => {
                let op = match compound {
                    "+=" => BinaryOp::Add,
                    "-=" => BinaryOp::Sub,
                    "*=" => BinaryOp::Mul,
                    "/=" => BinaryOp::Div,
                    _ => BinaryOp::Mod,
                };
                Expr::Binary {
                    op,
                    left: Box::new(target.to_expr()),
                    right: Box::new(value),
                }
            }
        };

        Ok(match (target, value) {
            (AssignTarget::Variable { name }, Expr::New { constructor, args }) => {
                InstructionKind::ObjectConstruction {
                    declaration: None,
                    name,
                    constructor,
                    args,
                }
            }
            (AssignTarget::Variable { name }, value) => {
                let value = with_inferred_name(value, &name);
                InstructionKind::Assignment {
                    target: AssignTarget::Variable { name },
                    value,
                }
            }
            (target, value) => InstructionKind::Assignment { target, value },
        })
    }

    /* ----- functions ----- */

    /// Build any function-shaped rule: declarations, `function` literals,
    /// arrows and object methods.
    fn build_function(&mut self, pair: Pair<'_, Rule>, name: Option<String>) -> TranslateResult<FunctionDef> {
        let start_line = line_of(&pair);
        let end_line = end_line_of(&pair);
        let is_arrow = pair.as_rule() == Rule::arrow_fn;

        let mut function = FunctionDef {
            name,
            params: Vec::new(),
            body: Vec::new(),
            body_source: String::new(),
            is_arrow,
            is_async: false,
            start_line,
            end_line,
        };

        for part in pair.into_inner() {
            match part.as_rule() {
                Rule::kw_async => function.is_async = true,
                Rule::kw_function => {}
                Rule::ident | Rule::prop_key => {
                    function.name = Some(property_key(&part));
                }
                Rule::params | Rule::arrow_params => {
                    function.params = part.into_inner().map(|p| p.as_str().to_string()).collect();
                }
                Rule::block => {
                    let text = part.as_str();
                    function.body_source = text
                        .strip_prefix('{')
                        .and_then(|t| t.strip_suffix('}'))
                        .unwrap_or(text)
                        .trim()
                        .to_string();
                    let body = self.build_statements(part.into_inner());
                    function.body = hoist::hoist_body(body);
                }
                Rule::expr => {
                    // Expression-bodied arrow
                    let line = line_of(&part);
                    function.body_source = part.as_str().trim().to_string();
                    let expr = self.build_expr(part)?;
                    function.body = vec![Instruction::new(line, arrow_body(expr))];
                }
                other => {
                    return Err(TranslateError::build(
                        start_line,
                        format!("unexpected function part: {:?}", other),
                    ))
                }
            }
        }

        Ok(function)
    }

    /* ----- expressions ----- */

    fn build_expr(&mut self, pair: Pair<'_, Rule>) -> TranslateResult<Expr> {
        let line = line_of(&pair);
        match pair.as_rule() {
            Rule::expr | Rule::expr_stmt => {
                let mut inner = pair.into_inner();
                self.build_expr(next_pair(&mut inner, line, "expression")?)
            }
            Rule::arrow_fn | Rule::function_expr => Ok(Expr::Function {
                function: Arc::new(self.build_function(pair, None)?),
            }),
            Rule::logical_or
            | Rule::logical_and
            | Rule::equality
            | Rule::comparison
            | Rule::additive
            | Rule::multiplicative => self.build_binary(pair),
            Rule::unary => self.build_unary(pair),
            Rule::postfix => {
                // postfix = { call_expr ~ (op_post_inc | op_post_dec)? }
                let mut inner = pair.into_inner();
                let target = self.build_expr(next_pair(&mut inner, line, "operand")?)?;
                match inner.next() {
                    Some(op) => Ok(Expr::Update {
                        op: if op.as_rule() == Rule::op_post_inc {
                            UpdateOp::Inc
                        } else {
                            UpdateOp::Dec
                        },
                        prefix: false,
                        target: Box::new(target),
                    }),
                    None => Ok(target),
                }
            }
            Rule::call_expr => self.build_call_expr(pair),
            Rule::new_expr => {
                // new_expr = { kw_new ~ ident ~ call_suffix? }
                let mut inner = pair.into_inner();
                let _kw = next_pair(&mut inner, line, "new")?;
                let constructor = next_pair(&mut inner, line, "constructor")?.as_str().to_string();
                let args = match inner.next() {
                    Some(suffix) => self.build_args(suffix)?,
                    None => Vec::new(),
                };
                Ok(Expr::New { constructor, args })
            }
            Rule::array_lit => {
                let elements = pair
                    .into_inner()
                    .map(|p| self.build_expr(p))
                    .collect::<TranslateResult<Vec<_>>>()?;
                Ok(Expr::Array { elements })
            }
            Rule::object_lit => self.build_object(pair),
            Rule::template => self.build_template(pair),
            Rule::string => {
                let raw = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");
                Ok(Expr::str(unescape(raw)))
            }
            Rule::number => {
                let text = pair.as_str();
                let value = match text.strip_prefix("0x") {
                    Some(hex) => u64::from_str_radix(hex, 16).map(|v| v as f64).ok(),
                    None => text.parse::<f64>().ok(),
                };
                value.map(Expr::num).ok_or_else(|| {
                    TranslateError::build(line, format!("failed to parse number '{}'", text))
                })
            }
            Rule::bool_lit => Ok(Expr::Literal {
                value: Literal::Bool(pair.as_str() == "true"),
            }),
            Rule::null_lit => Ok(Expr::Literal {
                value: Literal::Null,
            }),
            Rule::undefined_lit => Ok(Expr::undefined()),
            Rule::ident => Ok(Expr::var(pair.as_str())),
            other => Err(TranslateError::build(
                line,
                format!("unexpected expression rule: {:?}", other),
            )),
        }
    }

    fn build_binary(&mut self, pair: Pair<'_, Rule>) -> TranslateResult<Expr> {
        // level = { operand ~ (op ~ operand)* }, folded left to right
        let line = line_of(&pair);
        let mut inner = pair.into_inner();
        let mut left = self.build_expr(next_pair(&mut inner, line, "operand")?)?;

        while let Some(op_pair) = inner.next() {
            let op = binary_op(op_pair.as_rule())
                .ok_or_else(|| TranslateError::build(line, "unknown binary operator"))?;
            let right = self.build_expr(next_pair(&mut inner, line, "right operand")?)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn build_unary(&mut self, pair: Pair<'_, Rule>) -> TranslateResult<Expr> {
        // unary = { prefix_op* ~ postfix }
        let line = line_of(&pair);
        let parts: Vec<Pair<'_, Rule>> = pair.into_inner().collect();
        let Some((operand, ops)) = parts.split_last() else {
            return Err(TranslateError::build(line, "missing operand"));
        };

        let mut expr = self.build_expr(operand.clone())?;
        for op in ops.iter().rev() {
            expr = match op.as_rule() {
                Rule::op_pre_inc | Rule::op_pre_dec => Expr::Update {
                    op: if op.as_rule() == Rule::op_pre_inc {
                        UpdateOp::Inc
                    } else {
                        UpdateOp::Dec
                    },
                    prefix: true,
                    target: Box::new(expr),
                },
                Rule::op_neg => match expr {
                    Expr::Literal {
                        value: Literal::Num(v),
                    } => Expr::num(-v),
                    other => Expr::Unary {
                        op: UnaryOp::Neg,
                        operand: Box::new(other),
                    },
                },
                Rule::op_not => Expr::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(expr),
                },
                _ => Expr::Unary {
                    op: UnaryOp::Typeof,
                    operand: Box::new(expr),
                },
            };
        }
        Ok(expr)
    }

    fn build_call_expr(&mut self, pair: Pair<'_, Rule>) -> TranslateResult<Expr> {
        // call_expr = { primary ~ (call_suffix | member_suffix | index_suffix)* }
        let line = line_of(&pair);
        let mut inner = pair.into_inner();
        let mut expr = self.build_expr(next_pair(&mut inner, line, "primary expression")?)?;

        for suffix in inner {
            expr = match suffix.as_rule() {
                Rule::call_suffix => Expr::Call {
                    callee: Box::new(expr),
                    args: self.build_args(suffix)?,
                },
                Rule::member_suffix => {
                    let mut parts = suffix.into_inner();
                    Expr::Property {
                        object: Box::new(expr),
                        property: next_pair(&mut parts, line, "property name")?.as_str().to_string(),
                    }
                }
                _ => {
                    let mut parts = suffix.into_inner();
                    Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(self.build_expr(next_pair(&mut parts, line, "index")?)?),
                    }
                }
            };
        }

        Ok(expr)
    }

    fn build_args(&mut self, pair: Pair<'_, Rule>) -> TranslateResult<Vec<Expr>> {
        pair.into_inner().map(|p| self.build_expr(p)).collect()
    }

    fn build_object(&mut self, pair: Pair<'_, Rule>) -> TranslateResult<Expr> {
        let mut properties = Vec::new();
        for prop in pair.into_inner() {
            let line = line_of(&prop);
            match prop.as_rule() {
                Rule::method_prop => {
                    let key = prop
                        .clone()
                        .into_inner()
                        .next()
                        .map(|k| property_key(&k))
                        .unwrap_or_default();
                    let function = self.build_function(prop, None)?;
                    properties.push((
                        key,
                        Expr::Function {
                            function: Arc::new(function),
                        },
                    ));
                }
                Rule::keyed_prop => {
                    let mut inner = prop.into_inner();
                    let key = property_key(&next_pair(&mut inner, line, "property key")?);
                    let value = self.build_expr(next_pair(&mut inner, line, "property value")?)?;
                    let value = with_inferred_name(value, &key);
                    properties.push((key, value));
                }
                _ => {
                    let name = prop.as_str().trim().to_string();
                    properties.push((name.clone(), Expr::var(name)));
                }
            }
        }
        Ok(Expr::Object { properties })
    }

    fn build_template(&mut self, pair: Pair<'_, Rule>) -> TranslateResult<Expr> {
        let mut parts = Vec::new();
        for part in pair.into_inner() {
            let line = line_of(&part);
            match part.as_rule() {
                Rule::template_text => parts.push(TemplatePart::Text(unescape(part.as_str()))),
                _ => {
                    let mut inner = part.into_inner();
                    let expr = self.build_expr(next_pair(&mut inner, line, "template expression")?)?;
                    parts.push(TemplatePart::Expr(expr));
                }
            }
        }
        Ok(Expr::Template { parts })
    }
}

/* ===================== Statement Shapes ===================== */

/// `x = a ? b : c` style lines: a known statement without `;` that is
/// followed on the same line by text the grammar could not use.
fn runs_into_unknown(stmt: &Pair<'_, Rule>, next: &Pair<'_, Rule>) -> bool {
    if stmt.as_rule() != Rule::statement || next.as_rule() != Rule::statement {
        return false;
    }
    let mut inner = stmt.clone().into_inner();
    let known = match inner.next() {
        Some(first) => !matches!(first.as_rule(), Rule::empty_stmt | Rule::unknown_stmt),
        None => false,
    };
    let terminated = inner.any(|p| p.as_rule() == Rule::semicolon);
    let next_unknown = next
        .clone()
        .into_inner()
        .next()
        .map(|p| p.as_rule() == Rule::unknown_stmt)
        .unwrap_or(false);

    known && !terminated && next_unknown && end_line_of(stmt) == line_of(next)
}

/// Classify a bare expression statement into one of the instruction shapes.
fn expression_statement(expr: Expr, line: usize) -> TranslateResult<InstructionKind> {
    match expr {
        Expr::Call { callee, args } => call_statement(*callee, args, line),
        Expr::Update { op, target, .. } => {
            let target = assign_target(*target, line)?;
            let op = match op {
                UpdateOp::Inc => BinaryOp::Add,
                UpdateOp::Dec => BinaryOp::Sub,
            };
            Ok(InstructionKind::Assignment {
                value: Expr::Binary {
                    op,
                    left: Box::new(target.to_expr()),
                    right: Box::new(Expr::num(1.0)),
                },
                target,
            })
        }
        _ => Err(TranslateError::build(line, "expression statement has no effect")),
    }
}

fn call_statement(callee: Expr, args: Vec<Expr>, line: usize) -> TranslateResult<InstructionKind> {
    if let Some(kind) = builtin_call(&callee, &args, line)? {
        return Ok(kind);
    }

    match callee {
        Expr::Variable { name } => Ok(InstructionKind::FunctionCall { callee: name, args }),
        Expr::Property { object, property } => Ok(InstructionKind::MethodCall {
            object: *object,
            method: property,
            args,
        }),
        _ => Err(TranslateError::build(line, "unsupported call target")),
    }
}

/// Timers, microtasks, promise chains and console calls
pub(crate) fn builtin_call(callee: &Expr, args: &[Expr], line: usize) -> TranslateResult<Option<InstructionKind>> {
    match callee.dotted_path().as_deref() {
        Some("setTimeout") => {
            let first = args
                .first()
                .ok_or_else(|| TranslateError::build(line, "setTimeout needs a callback"))?;
            return Ok(Some(InstructionKind::TimerRegistration {
                callback: callback_expr(first, line)?,
                delay: args.get(1).cloned(),
                args: args.iter().skip(2).cloned().collect(),
            }));
        }
        Some("queueMicrotask") => {
            let first = args
                .first()
                .ok_or_else(|| TranslateError::build(line, "queueMicrotask needs a callback"))?;
            return Ok(Some(InstructionKind::PromiseThen {
                source: PromiseSource::QueueMicrotask,
                reactions: vec![ReactionExpr {
                    kind: ReactionKind::Then,
                    callback: callback_expr(first, line)?,
                }],
            }));
        }
        _ => {}
    }

    if let Expr::Property { object, property } = callee {
        if matches!(object.as_ref(), Expr::Variable { name } if name == "console") {
            if let Some(method) = ConsoleMethod::from_name(property) {
                return Ok(Some(InstructionKind::Console {
                    method,
                    args: args.to_vec(),
                }));
            }
        }
    }

    Ok(promise_chain(callee, args, line)?
        .map(|(source, reactions)| InstructionKind::PromiseThen { source, reactions }))
}

/// Unwind `Promise.resolve(v).then(a).catch(b)...` from the outside in.
fn promise_chain(
    callee: &Expr,
    args: &[Expr],
    line: usize,
) -> TranslateResult<Option<(PromiseSource, Vec<ReactionExpr>)>> {
    let Expr::Property { object, property } = callee else {
        return Ok(None);
    };
    let kind = match property.as_str() {
        "then" => ReactionKind::Then,
        "catch" => ReactionKind::Catch,
        "finally" => ReactionKind::Finally,
        _ => return Ok(None),
    };
    let Expr::Call {
        callee: inner_callee,
        args: inner_args,
    } = object.as_ref()
    else {
        return Ok(None);
    };

    let (source, mut reactions) = match inner_callee.dotted_path().as_deref() {
        Some("Promise.resolve") => (PromiseSource::Resolve(inner_args.first().cloned()), Vec::new()),
        Some("Promise.reject") => (PromiseSource::Reject(inner_args.first().cloned()), Vec::new()),
        _ => match promise_chain(inner_callee, inner_args, line)? {
            Some(chain) => chain,
            None => return Ok(None),
        },
    };

    let callback = args
        .first()
        .ok_or_else(|| TranslateError::build(line, format!(".{}() needs a callback", property)))?;
    reactions.push(ReactionExpr {
        kind,
        callback: callback_expr(callback, line)?,
    });
    Ok(Some((source, reactions)))
}

fn callback_expr(expr: &Expr, line: usize) -> TranslateResult<CallbackExpr> {
    match expr {
        Expr::Function { function } => Ok(CallbackExpr::Inline {
            function: function.clone(),
        }),
        Expr::Variable { name } => Ok(CallbackExpr::Named { name: name.clone() }),
        _ => Err(TranslateError::build(line, "callback must be a function or a name")),
    }
}

fn assign_target(expr: Expr, line: usize) -> TranslateResult<AssignTarget> {
    match expr {
        Expr::Variable { name } => Ok(AssignTarget::Variable { name }),
        Expr::Property { object, property } => Ok(AssignTarget::Property {
            object: *object,
            property,
        }),
        Expr::Index { object, index } => Ok(AssignTarget::Index {
            object: *object,
            index: *index,
        }),
        _ => Err(TranslateError::build(line, "invalid assignment target")),
    }
}

/// Expression-bodied arrows: builtin calls keep their own instruction, anything
/// else becomes the return value.
fn arrow_body(expr: Expr) -> InstructionKind {
    if let Expr::Call { callee, args } = &expr {
        if let Ok(Some(kind)) = builtin_call(callee, args, 0) {
            return kind;
        }
    }
    InstructionKind::Return { value: Some(expr) }
}

/// `const f = () => {}` names the function `f`
fn with_inferred_name(expr: Expr, name: &str) -> Expr {
    match expr {
        Expr::Function { mut function } if function.name.is_none() => {
            Arc::make_mut(&mut function).name = Some(name.to_string());
            Expr::Function { function }
        }
        other => other,
    }
}

fn property_key(pair: &Pair<'_, Rule>) -> String {
    match pair.as_rule() {
        Rule::prop_key => match pair.clone().into_inner().next() {
            Some(inner) => property_key(&inner),
            None => pair.as_str().to_string(),
        },
        Rule::string => unescape(pair.clone().into_inner().next().map(|p| p.as_str()).unwrap_or("")),
        _ => pair.as_str().to_string(),
    }
}

fn binary_op(rule: Rule) -> Option<BinaryOp> {
    Some(match rule {
        Rule::op_or => BinaryOp::Or,
        Rule::op_and => BinaryOp::And,
        Rule::op_strict_eq => BinaryOp::StrictEq,
        Rule::op_strict_ne => BinaryOp::StrictNotEq,
        Rule::op_eq => BinaryOp::Eq,
        Rule::op_ne => BinaryOp::NotEq,
        Rule::op_le => BinaryOp::Le,
        Rule::op_ge => BinaryOp::Ge,
        Rule::op_lt => BinaryOp::Lt,
        Rule::op_gt => BinaryOp::Gt,
        Rule::op_add => BinaryOp::Add,
        Rule::op_sub => BinaryOp::Sub,
        Rule::op_mul => BinaryOp::Mul,
        Rule::op_div => BinaryOp::Div,
        Rule::op_mod => BinaryOp::Mod,
        _ => return None,
    })
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
