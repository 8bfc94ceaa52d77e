use crate::lexer::Span;

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

pub type SpannedExpr = Spanned<Expr>;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    // Literals
    Integer(i64),
    Decimal(f64),
    String(String),
    Boolean(bool),
    Nil,

    // Collections
    List(Vec<SpannedExpr>),
    Dict(Vec<(SpannedExpr, SpannedExpr)>),

    // Identifiers
    Identifier(String),

    // Operations
    Prefix {
        op: PrefixOp,
        right: Box<SpannedExpr>,
    },
    Infix {
        left: Box<SpannedExpr>,
        op: InfixOp,
        right: Box<SpannedExpr>,
    },
    Index {
        collection: Box<SpannedExpr>,
        index: Box<SpannedExpr>,
    },
    Member {
        object: Box<SpannedExpr>,
        name: String,
    },

    // Calls are by name: builtins or live synthesized units
    Call {
        function: String,
        args: Vec<SpannedExpr>,
    },

    // Control Flow
    Conditional {
        condition: Box<SpannedExpr>,
        then_branch: Box<SpannedExpr>,
        else_branch: Box<SpannedExpr>,
    },

    /// `a, b, c` evaluates each operand in order and yields the last
    Sequence(Vec<SpannedExpr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfixOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    // Logical
    And,
    Or,
}

impl std::fmt::Display for PrefixOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrefixOp::Neg => write!(f, "-"),
            PrefixOp::Not => write!(f, "!"),
        }
    }
}

impl std::fmt::Display for InfixOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InfixOp::Add => write!(f, "+"),
            InfixOp::Sub => write!(f, "-"),
            InfixOp::Mul => write!(f, "*"),
            InfixOp::Div => write!(f, "/"),
            InfixOp::Mod => write!(f, "%"),
            InfixOp::Eq => write!(f, "=="),
            InfixOp::Ne => write!(f, "!="),
            InfixOp::Lt => write!(f, "<"),
            InfixOp::Le => write!(f, "<="),
            InfixOp::Gt => write!(f, ">"),
            InfixOp::Ge => write!(f, ">="),
            InfixOp::And => write!(f, "&&"),
            InfixOp::Or => write!(f, "||"),
        }
    }
}

pub type SpannedStmt = Spanned<Stmt>;

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Let { name: String, value: SpannedExpr },
    Return(SpannedExpr),
    Expr(SpannedExpr),
}
