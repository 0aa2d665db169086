use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: u32,
    pub col: u32,
}

impl SourceLocation {
    pub fn new(line: u32, col: u32) -> Self {
        SourceLocation { line, col }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub loc: SourceLocation,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Number(f64),
    Variable(String),
    Unary(char, Box<Expr>),
    /// `=` is assignment and needs a `Variable` on the left.
    Binary(char, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    If {
        cond: Box<Expr>,
        then: Box<Expr>,
        else_: Box<Expr>,
    },
    For {
        var: String,
        start: Box<Expr>,
        end: Box<Expr>,
        step: Option<Box<Expr>>,
        body: Box<Expr>,
    },
    Var {
        bindings: Vec<(String, Option<Expr>)>,
        body: Box<Expr>,
    },
}

impl Expr {
    pub fn new(loc: SourceLocation, kind: ExprKind) -> Self {
        Expr { loc, kind }
    }
}

/// Prints the tree as an s-expression, e.g. `(+ a (* b c))`.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            ExprKind::Number(n) => write!(f, "{}", n),
            ExprKind::Variable(name) => write!(f, "{}", name),
            ExprKind::Unary(op, operand) => write!(f, "({} {})", op, operand),
            ExprKind::Binary(op, lhs, rhs) => write!(f, "({} {} {})", op, lhs, rhs),
            ExprKind::Call(callee, args) => {
                write!(f, "(call {}", callee)?;
                for a in args {
                    write!(f, " {}", a)?;
                }
                write!(f, ")")
            }
            ExprKind::If { cond, then, else_ } => write!(f, "(if {} {} {})", cond, then, else_),
            ExprKind::For {
                var,
                start,
                end,
                step,
                body,
            } => {
                write!(f, "(for {} {} {}", var, start, end)?;
                if let Some(step) = step {
                    write!(f, " {}", step)?;
                }
                write!(f, " {})", body)
            }
            ExprKind::Var { bindings, body } => {
                write!(f, "(var (")?;
                for (i, (name, init)) in bindings.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    match init {
                        Some(init) => write!(f, "({} {})", name, init)?,
                        None => write!(f, "{}", name)?,
                    }
                }
                write!(f, ") {})", body)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorKind {
    Function,
    Unary,
    Binary(i32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prototype {
    pub name: String,
    pub params: Vec<String>,
    pub kind: OperatorKind,
    pub loc: SourceLocation,
}

impl Prototype {
    pub fn new(name: String, params: Vec<String>, kind: OperatorKind, loc: SourceLocation) -> Self {
        Prototype {
            name,
            params,
            kind,
            loc,
        }
    }

    /// The operator symbol of a `unary`/`binary` prototype: the last
    /// character of its mangled name.
    pub fn operator_name(&self) -> Option<char> {
        match self.kind {
            OperatorKind::Function => None,
            _ => self.name.chars().last(),
        }
    }

    pub fn binary_precedence(&self) -> Option<i32> {
        match self.kind {
            OperatorKind::Binary(prec) => Some(prec),
            _ => None,
        }
    }
}

impl fmt::Display for Prototype {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}({})", self.name, self.params.join(" "))
    }
}

/// A definition (`def`), or a declaration (`extern`) when `body` is absent.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub proto: Prototype,
    pub body: Option<Expr>,
}

impl FunctionDecl {
    pub fn new(proto: Prototype, body: Option<Expr>) -> Self {
        FunctionDecl { proto, body }
    }
}
