//! Instruction and expression node types
//!
//! The translator produces a flat list of [`Instruction`]s per body. Function
//! bodies are translated once and shared through `Arc<FunctionDef>`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/* ===================== Program ===================== */

/// Output of one translation: the hoisted instruction sequence plus any
/// statements that were skipped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    pub instructions: Vec<Instruction>,
    pub diagnostics: Vec<Diagnostic>,
}

/// A statement the translator did not recognize and left out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub line: usize,
    pub text: String,
    pub message: String,
    /// The source could not be parsed at all
    #[serde(default)]
    pub fatal: bool,
}

/* ===================== Instructions ===================== */

/// One executable unit with its 1-based source line (0 for synthetic ones)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instruction {
    pub line: usize,
    #[serde(flatten)]
    pub kind: InstructionKind,
}

impl Instruction {
    pub fn new(line: usize, kind: InstructionKind) -> Self {
        Self { line, kind }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InstructionKind {
    /// Synthetic first instruction listing what the hoisting pass lifted
    HoistingMarker {
        functions: Vec<String>,
        variables: Vec<String>,
    },
    FunctionDeclaration {
        function: Arc<FunctionDef>,
    },
    /// Value-less `var` binding created ahead of its initializer
    HoistedVar {
        name: String,
    },
    VariableDeclaration {
        kind: DeclKind,
        name: String,
        init: Option<Expr>,
    },
    Assignment {
        target: AssignTarget,
        value: Expr,
    },
    FunctionCall {
        callee: String,
        args: Vec<Expr>,
    },
    MethodCall {
        object: Expr,
        method: String,
        args: Vec<Expr>,
    },
    Console {
        method: ConsoleMethod,
        args: Vec<Expr>,
    },
    TimerRegistration {
        callback: CallbackExpr,
        delay: Option<Expr>,
        args: Vec<Expr>,
    },
    PromiseThen {
        source: PromiseSource,
        reactions: Vec<ReactionExpr>,
    },
    Return {
        value: Option<Expr>,
    },
    ObjectConstruction {
        declaration: Option<DeclKind>,
        name: String,
        constructor: String,
        args: Vec<Expr>,
    },
}

impl InstructionKind {
    /// Short tag used in logs and step output
    pub fn label(&self) -> &'static str {
        match self {
            InstructionKind::HoistingMarker { .. } => "hoisting",
            InstructionKind::FunctionDeclaration { .. } => "function-declaration",
            InstructionKind::HoistedVar { .. } => "hoisted-var",
            InstructionKind::VariableDeclaration { .. } => "variable-declaration",
            InstructionKind::Assignment { .. } => "assignment",
            InstructionKind::FunctionCall { .. } => "function-call",
            InstructionKind::MethodCall { .. } => "method-call",
            InstructionKind::Console { .. } => "console",
            InstructionKind::TimerRegistration { .. } => "timer",
            InstructionKind::PromiseThen { .. } => "promise-then",
            InstructionKind::Return { .. } => "return",
            InstructionKind::ObjectConstruction { .. } => "object-construction",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeclKind {
    Var,
    Let,
    Const,
    Param,
    Function,
    /// Assignment to a name that was never declared
    Implicit,
}

impl DeclKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclKind::Var => "var",
            DeclKind::Let => "let",
            DeclKind::Const => "const",
            DeclKind::Param => "param",
            DeclKind::Function => "function",
            DeclKind::Implicit => "implicit",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AssignTarget {
    Variable { name: String },
    Property { object: Expr, property: String },
    Index { object: Expr, index: Expr },
}

impl AssignTarget {
    /// The target read back as an expression (compound assignments use it)
    pub fn to_expr(&self) -> Expr {
        match self {
            AssignTarget::Variable { name } => Expr::var(name.clone()),
            AssignTarget::Property { object, property } => Expr::Property {
                object: Box::new(object.clone()),
                property: property.clone(),
            },
            AssignTarget::Index { object, index } => Expr::Index {
                object: Box::new(object.clone()),
                index: Box::new(index.clone()),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConsoleMethod {
    Log,
    Warn,
    Error,
    Info,
}

impl ConsoleMethod {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "log" => Some(ConsoleMethod::Log),
            "warn" => Some(ConsoleMethod::Warn),
            "error" => Some(ConsoleMethod::Error),
            "info" => Some(ConsoleMethod::Info),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConsoleMethod::Log => "log",
            ConsoleMethod::Warn => "warn",
            ConsoleMethod::Error => "error",
            ConsoleMethod::Info => "info",
        }
    }
}

/// Callback argument of `setTimeout` and promise reactions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CallbackExpr {
    Inline { function: Arc<FunctionDef> },
    Named { name: String },
}

impl CallbackExpr {
    pub fn display_name(&self) -> String {
        match self {
            CallbackExpr::Inline { function } => function.display_name().to_string(),
            CallbackExpr::Named { name } => name.clone(),
        }
    }
}

/// Where a promise chain starts. All sources are already settled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum PromiseSource {
    Resolve(Option<Expr>),
    Reject(Option<Expr>),
    /// `queueMicrotask(cb)`: the single reaction runs unconditionally
    QueueMicrotask,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionExpr {
    pub kind: ReactionKind,
    pub callback: CallbackExpr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReactionKind {
    Then,
    Catch,
    Finally,
}

/* ===================== Functions ===================== */

/// A parsed function, declaration or literal. The body is already hoisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDef {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Vec<Instruction>,
    pub body_source: String,
    pub is_arrow: bool,
    pub is_async: bool,
    pub start_line: usize,
    pub end_line: usize,
}

impl FunctionDef {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("(anonymous)")
    }
}

/* ===================== Expressions ===================== */

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "camelCase")]
pub enum Expr {
    Literal {
        value: Literal,
    },
    Template {
        parts: Vec<TemplatePart>,
    },
    Array {
        elements: Vec<Expr>,
    },
    Object {
        properties: Vec<(String, Expr)>,
    },
    Function {
        function: Arc<FunctionDef>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Variable {
        name: String,
    },
    Property {
        object: Box<Expr>,
        property: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Update {
        op: UpdateOp,
        prefix: bool,
        target: Box<Expr>,
    },
    New {
        constructor: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn undefined() -> Self {
        Expr::Literal {
            value: Literal::Undefined,
        }
    }

    pub fn num(v: f64) -> Self {
        Expr::Literal {
            value: Literal::Num(v),
        }
    }

    pub fn str(v: impl Into<String>) -> Self {
        Expr::Literal {
            value: Literal::Str(v.into()),
        }
    }

    pub fn var(name: impl Into<String>) -> Self {
        Expr::Variable { name: name.into() }
    }

    /// Dotted path for plain property chains like `console.log`
    pub fn dotted_path(&self) -> Option<String> {
        match self {
            Expr::Variable { name } => Some(name.clone()),
            Expr::Property { object, property } => {
                object.dotted_path().map(|base| format!("{}.{}", base, property))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "v", rename_all = "camelCase")]
pub enum Literal {
    Undefined,
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "v", rename_all = "camelCase")]
pub enum TemplatePart {
    Text(String),
    Expr(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnaryOp {
    Typeof,
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpdateOp {
    Inc,
    Dec,
}
