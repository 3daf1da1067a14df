use crate::value::{ops, Value, ValueMap};

/// An expression node.
#[derive(Debug)]
pub enum Expr<'a> {
    Var(&'a str),
    Const(Value),
    UnaryOp(Box<UnaryOp<'a>>),
    BinOp(Box<BinOp<'a>>),
    Ternary(Box<Ternary<'a>>),
    GetAttr(Box<GetAttr<'a>>),
    GetItem(Box<GetItem<'a>>),
    Call(Box<Call<'a>>),
    List(Vec<Expr<'a>>),
    Map(Vec<(Expr<'a>, Expr<'a>)>),
}

impl<'a> Expr<'a> {
    pub fn description(&self) -> &'static str {
        match self {
            Expr::Var(_) => "variable",
            Expr::Const(_) => "constant",
            Expr::BinOp(_) | Expr::UnaryOp(_) => "operator",
            Expr::Ternary(_) => "conditional expression",
            Expr::GetAttr(_) => "attribute lookup",
            Expr::GetItem(_) => "subscript",
            Expr::Call(_) => "call",
            Expr::List(_) => "list literal",
            Expr::Map(_) => "map literal",
        }
    }

    /// Evaluates the expression if it only consists of constants.
    pub fn as_const(&self) -> Option<Value> {
        match self {
            Expr::Const(value) => Some(value.clone()),
            Expr::List(items) => items
                .iter()
                .map(|item| item.as_const())
                .collect::<Option<Vec<_>>>()
                .map(Value::from),
            Expr::Map(pairs) => {
                let mut rv = ValueMap::with_capacity(pairs.len());
                for (key, value) in pairs {
                    let key = some!(key.as_const());
                    rv.insert(some!(key.as_str()).to_string(), some!(value.as_const()));
                }
                Some(Value::from(rv))
            }
            Expr::UnaryOp(c) => {
                let value = some!(c.expr.as_const());
                match c.op {
                    UnaryOpKind::Not => Some(Value::from(!value.is_true())),
                    UnaryOpKind::Neg => ops::neg(&value).ok(),
                    UnaryOpKind::Pos => Some(ops::pos(&value)),
                }
            }
            Expr::BinOp(c) => {
                let (Some(left), Some(right)) = (c.left.as_const(), c.right.as_const()) else {
                    return None;
                };
                match c.op {
                    BinOpKind::Add => ops::add(&left, &right).ok(),
                    BinOpKind::Sub => ops::sub(&left, &right).ok(),
                    BinOpKind::Mul => ops::mul(&left, &right).ok(),
                    BinOpKind::Div => ops::div(&left, &right).ok(),
                    BinOpKind::Rem => ops::rem(&left, &right).ok(),
                    BinOpKind::Eq => Some(Value::from(ops::loose_eq(&left, &right))),
                    BinOpKind::Ne => Some(Value::from(!ops::loose_eq(&left, &right))),
                    BinOpKind::StrictEq => Some(Value::from(ops::strict_eq(&left, &right))),
                    BinOpKind::StrictNe => Some(Value::from(!ops::strict_eq(&left, &right))),
                    // comparisons can fail at runtime, leave them to the vm
                    BinOpKind::Lt | BinOpKind::Lte | BinOpKind::Gt | BinOpKind::Gte => None,
                    BinOpKind::ScAnd => Some(if left.is_true() { right } else { left }),
                    BinOpKind::ScOr => Some(if left.is_true() { left } else { right }),
                }
            }
            _ => None,
        }
    }
}

/// A kind of unary operator.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UnaryOpKind {
    Not,
    Neg,
    Pos,
}

/// An unary operator expression.
#[derive(Debug)]
pub struct UnaryOp<'a> {
    pub op: UnaryOpKind,
    pub expr: Expr<'a>,
}

/// A kind of binary operator.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BinOpKind {
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Lte,
    Gt,
    Gte,
    ScAnd,
    ScOr,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// A binary operator expression.
#[derive(Debug)]
pub struct BinOp<'a> {
    pub op: BinOpKind,
    pub left: Expr<'a>,
    pub right: Expr<'a>,
}

/// A conditional expression (`test ? a : b`).
#[derive(Debug)]
pub struct Ternary<'a> {
    pub test_expr: Expr<'a>,
    pub true_expr: Expr<'a>,
    pub false_expr: Expr<'a>,
}

/// An attribute lookup expression.
#[derive(Debug)]
pub struct GetAttr<'a> {
    pub expr: Expr<'a>,
    pub name: &'a str,
}

/// An item lookup expression.
#[derive(Debug)]
pub struct GetItem<'a> {
    pub expr: Expr<'a>,
    pub subscript_expr: Expr<'a>,
}

/// Calls something.
#[derive(Debug)]
pub struct Call<'a> {
    pub expr: Expr<'a>,
    pub args: Vec<Expr<'a>>,
}

/// The argument of a `do` directive.
#[derive(Debug)]
pub enum Stmt<'a> {
    /// An expression evaluated for its side effects.
    Expr(Expr<'a>),
    /// An assignment to a name.
    Assign(&'a str, Expr<'a>),
}

/// The pattern of an `in` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputPattern<'a> {
    /// Binds the whole input to a name.
    Whole(&'a str),
    /// Binds same-named attributes of the input.
    Destructure(Vec<&'a str>),
}

/// The header of a `for` directive.
#[derive(Debug)]
pub struct ForHeader<'a> {
    /// Key iteration (`for k, v in expr`) as opposed to sequence iteration.
    pub keyed: bool,
    pub first_var: &'a str,
    pub second_var: Option<&'a str>,
    pub iter: Expr<'a>,
}
