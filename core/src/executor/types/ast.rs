//! Abstract Syntax Tree node types

use serde::{Deserialize, Serialize};

/// Source location span for error reporting and line mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Span {
    /// Start byte offset
    pub start: usize,
    /// End byte offset
    pub end: usize,
    /// Start line (0-indexed)
    pub start_line: usize,
    /// Start column (0-indexed)
    pub start_col: usize,
    /// End line (0-indexed)
    pub end_line: usize,
    /// End column (0-indexed)
    pub end_col: usize,
}

impl Span {
    pub fn new(
        start: usize,
        end: usize,
        start_line: usize,
        start_col: usize,
        end_line: usize,
        end_col: usize,
    ) -> Self {
        Self {
            start,
            end,
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// 1-based line the span starts on
    pub fn line(&self) -> usize {
        self.start_line + 1
    }
}

/// Member access segment for assignment paths
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum MemberAccess {
    Prop {
        property: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Index {
        expr: Expr,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
}

/// One `name = init` in a `let` statement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Declarator {
    pub name: String,
    pub init: Option<Expr>,
    #[serde(default, skip_serializing_if = "is_default_span")]
    pub span: Span,
}

/// One `key: name` in a destructuring assignment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Binding {
    pub key: String,
    pub name: String,
}

/// Statement AST node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Stmt {
    Block {
        body: Vec<Stmt>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Declare {
        declarators: Vec<Declarator>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Assign {
        var: String,
        path: Vec<MemberAccess>,
        value: Expr,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    /// `({ key: name, ... } = value);`
    Destructure {
        bindings: Vec<Binding>,
        value: Expr,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    If {
        test: Expr,
        then_s: Box<Stmt>,
        else_s: Option<Box<Stmt>>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    /// `for (let binding of iterable) body`
    ForOf {
        binding: String,
        iterable: Expr,
        body: Box<Stmt>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Try {
        body: Box<Stmt>,
        catch_var: String,
        catch_body: Box<Stmt>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Expr {
        expr: Expr,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Break {
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Continue {
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Empty {
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
}

impl Stmt {
    /// Get the span of this statement
    pub fn span(&self) -> Span {
        match self {
            Stmt::Block { span, .. } => *span,
            Stmt::Declare { span, .. } => *span,
            Stmt::Assign { span, .. } => *span,
            Stmt::Destructure { span, .. } => *span,
            Stmt::If { span, .. } => *span,
            Stmt::While { span, .. } => *span,
            Stmt::ForOf { span, .. } => *span,
            Stmt::Try { span, .. } => *span,
            Stmt::Expr { span, .. } => *span,
            Stmt::Break { span } => *span,
            Stmt::Continue { span } => *span,
            Stmt::Empty { span } => *span,
        }
    }
}

/// Binary operators. `And`/`Or` short-circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    And, // &&
    Or,  // ||
    Eq,  // == / ===
    Ne,  // != / !==
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Expression AST node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Expr {
    LitBool {
        v: bool,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    LitNum {
        v: f64,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    LitStr {
        v: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    LitNull {
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    LitUndefined {
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    LitList {
        elements: Vec<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    LitObj {
        properties: Vec<(String, Expr)>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Ident {
        name: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Member {
        object: Box<Expr>,
        property: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    BinaryOp {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
}

impl Expr {
    /// Get the span of this expression
    pub fn span(&self) -> Span {
        match self {
            Expr::LitBool { span, .. } => *span,
            Expr::LitNum { span, .. } => *span,
            Expr::LitStr { span, .. } => *span,
            Expr::LitNull { span } => *span,
            Expr::LitUndefined { span } => *span,
            Expr::LitList { span, .. } => *span,
            Expr::LitObj { span, .. } => *span,
            Expr::Ident { span, .. } => *span,
            Expr::Member { span, .. } => *span,
            Expr::Index { span, .. } => *span,
            Expr::Call { span, .. } => *span,
            Expr::Unary { span, .. } => *span,
            Expr::BinaryOp { span, .. } => *span,
        }
    }

    /// Dotted path of a pure member chain (`a.b.c`), if this is one.
    pub fn member_path(&self) -> Option<Vec<String>> {
        match self {
            Expr::Ident { name, .. } => Some(vec![name.clone()]),
            Expr::Member {
                object, property, ..
            } => {
                let mut path = object.member_path()?;
                path.push(property.clone());
                Some(path)
            }
            _ => None,
        }
    }
}

/// Helper function for serde to skip serializing default spans
fn is_default_span(span: &Span) -> bool {
    *span == Span::default()
}
