use chrono::{SecondsFormat, TimeZone, Utc};
use std::fmt::{self, Display, Formatter, Write};
use std::time::Duration;

/// A literal value appearing in an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Duration(Duration),
    /// An absolute timestamp, in nanoseconds since the Unix epoch.
    Timestamp(i64),
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => {
                f.write_char('\'')?;
                for c in v.chars() {
                    match c {
                        '\'' => f.write_str(r"\'")?,
                        '\\' => f.write_str(r"\\")?,
                        '\n' => f.write_str(r"\n")?,
                        c => f.write_char(c)?,
                    }
                }
                f.write_char('\'')
            }
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Duration(d) => fmt_duration(*d, f),
            Self::Timestamp(ns) => write!(
                f,
                "'{}'",
                Utc.timestamp_nanos(*ns)
                    .to_rfc3339_opts(SecondsFormat::AutoSi, true)
            ),
        }
    }
}

/// Writes `d` using the largest InfluxQL duration unit that divides it evenly.
fn fmt_duration(d: Duration, f: &mut Formatter<'_>) -> fmt::Result {
    const UNITS: [(u128, &str); 8] = [
        (604_800_000_000_000, "w"),
        (86_400_000_000_000, "d"),
        (3_600_000_000_000, "h"),
        (60_000_000_000, "m"),
        (1_000_000_000, "s"),
        (1_000_000, "ms"),
        (1_000, "u"),
        (1, "ns"),
    ];

    let ns = d.as_nanos();
    if ns == 0 {
        return f.write_str("0s");
    }
    for (size, unit) in UNITS {
        if ns % size == 0 {
            return write!(f, "{}{unit}", ns / size);
        }
    }
    unreachable!("every duration is a multiple of one nanosecond")
}

/// A reference to a field or tag, such as `value` or `host`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarRef {
    pub name: String,
}

impl Display for VarRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A function call, such as `mean(value)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: String,
    pub args: Vec<Expr>,
}

impl Call {
    pub fn new(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

impl Display for Call {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_char(')')
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl Display for BinaryOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
        })
    }
}

/// A binary arithmetic expression, such as `value * 2`.
#[derive(Debug, Clone, PartialEq)]
pub struct Binary {
    pub lhs: Box<Expr>,
    pub op: BinaryOperator,
    pub rhs: Box<Expr>,
}

impl Display for Binary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.lhs, self.op, self.rhs)
    }
}

/// An arithmetic expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    VarRef(VarRef),

    Call(Call),

    /// The `DISTINCT` keyword applied to a field, as in `count(DISTINCT value)`.
    Distinct(String),

    Literal(Literal),

    Wildcard,

    Binary(Binary),

    /// An expression wrapped in parentheses.
    Nested(Box<Expr>),
}

impl Expr {
    /// Constructs a reference to the field or tag `name`.
    pub fn var(name: impl Into<String>) -> Self {
        Self::VarRef(VarRef { name: name.into() })
    }

    pub fn call(name: impl Into<String>, args: Vec<Self>) -> Self {
        Self::Call(Call::new(name, args))
    }

    pub fn distinct(name: impl Into<String>) -> Self {
        Self::Distinct(name.into())
    }

    pub fn binary(lhs: Self, op: BinaryOperator, rhs: Self) -> Self {
        Self::Binary(Binary {
            lhs: Box::new(lhs),
            op,
            rhs: Box::new(rhs),
        })
    }

    /// Returns the name of the reference if `self` is a [`VarRef`],
    /// looking through any parentheses.
    pub fn var_ref_name(&self) -> Option<&str> {
        match self {
            Self::VarRef(VarRef { name }) => Some(name),
            Self::Nested(e) => e.var_ref_name(),
            _ => None,
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::VarRef(v) => write!(f, "{v}"),
            Self::Call(c) => write!(f, "{c}"),
            Self::Distinct(name) => write!(f, "DISTINCT {name}"),
            Self::Literal(lit) => write!(f, "{lit}"),
            Self::Wildcard => f.write_char('*'),
            Self::Binary(b) => write!(f, "{b}"),
            Self::Nested(e) => write!(f, "({e})"),
        }
    }
}

impl From<Literal> for Expr {
    fn from(lit: Literal) -> Self {
        Self::Literal(lit)
    }
}

impl From<i64> for Expr {
    fn from(v: i64) -> Self {
        Self::Literal(Literal::Integer(v))
    }
}

impl From<f64> for Expr {
    fn from(v: f64) -> Self {
        Self::Literal(Literal::Float(v))
    }
}

impl From<bool> for Expr {
    fn from(v: bool) -> Self {
        Self::Literal(Literal::Boolean(v))
    }
}

impl From<&str> for Expr {
    /// Converts a string into a string [`Literal`]; use [`Expr::var`] for references.
    fn from(v: &str) -> Self {
        Self::Literal(Literal::String(v.to_string()))
    }
}
