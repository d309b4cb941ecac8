use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Id(String),
    Assign(Option<BinOp>, Box<Expr>, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Unary(UnOp, Box<Expr>),
    Cond(Box<Expr>, Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    New(Box<Expr>, Vec<Expr>),
    ObjGet(Box<Expr>, Box<Expr>),
    ClassGet(Box<Expr>, Box<Expr>),
    ArrayGet(Box<Expr>, Option<Box<Expr>>),
    ConsArray(Vec<ArrayEntry>),
    List(Vec<Expr>),
    InterpString(Vec<Expr>),
    Xhp(Vec<Expr>),
    RefTo(Box<Expr>),
    Lambda(Rc<FuncDef>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrayEntry {
    Val(Expr),
    Kv(Expr, Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Plus,
    Minus,
    Mul,
    Div,
    Mod,
    Concat,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Xor,
}

impl BinOp {
    pub fn is_arith(self) -> bool {
        matches!(
            self,
            Self::Plus | Self::Minus | Self::Mul | Self::Div | Self::Mod
        )
    }

    pub fn is_logic(self) -> bool {
        !self.is_arith() && self != Self::Concat
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Block(Vec<Stmt>),
    If(Expr, Box<Stmt>, Box<Stmt>),
    While(Expr, Box<Stmt>),
    DoWhile(Box<Stmt>, Expr),
    For(Vec<Expr>, Vec<Expr>, Vec<Expr>, Box<Stmt>),
    Foreach(Expr, Option<Expr>, Expr, Box<Stmt>),
    Switch(Expr, Vec<Case>),
    Return(Option<Expr>),
    Break(Option<Expr>),
    Continue(Option<Expr>),
    Throw(Expr),
    Try(Vec<Stmt>, Vec<Catch>),
    Global(Vec<String>),
    StaticVars(Vec<(String, Option<Expr>)>),
    FuncDef(Rc<FuncDef>),
    ClassDef(Rc<ClassDef>),
    ConstDef(String, Expr),
    Nop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Case {
    Case(Expr, Vec<Stmt>),
    Default(Vec<Stmt>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Catch {
    pub class: String,
    pub var: String,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub by_ref: bool,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncDef {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    pub is_static: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name: String,
    pub parent: Option<String>,
    pub constants: Vec<(String, Expr)>,
    pub static_vars: Vec<(String, Option<Expr>)>,
    pub inst_vars: Vec<(String, Option<Expr>)>,
    pub methods: Vec<Rc<FuncDef>>,
}

pub const RETURN_VAR: &str = "*return*";
pub const ARRAY_VAR: &str = "*array*";
pub const MYOBJ_VAR: &str = "*myobj*";
pub const BUILD_METHOD: &str = "*BUILD*";
pub const SELF_NAME: &str = "self";
pub const PARENT_NAME: &str = "parent";
pub const THIS_VAR: &str = "$this";

/// An identifier is a variable if it carries the sigil or is one of the
/// analyzer's reserved names; anything else resolves through the code
/// database as a constant, function, or class name.
pub fn is_variable(name: &str) -> bool {
    name.starts_with('$')
        || matches!(
            name,
            RETURN_VAR | ARRAY_VAR | MYOBJ_VAR | BUILD_METHOD | SELF_NAME | PARENT_NAME
        )
}

impl Expr {
    pub fn var(name: &str) -> Expr {
        Expr::Id(name.to_string())
    }

    pub fn str(s: &str) -> Expr {
        Expr::Str(s.to_string())
    }

    pub fn assign(lhs: Expr, rhs: Expr) -> Expr {
        Expr::Assign(None, Box::new(lhs), Box::new(rhs))
    }

    pub fn assign_op(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Assign(Some(op), Box::new(lhs), Box::new(rhs))
    }

    pub fn binary(op: BinOp, l: Expr, r: Expr) -> Expr {
        Expr::Binary(op, Box::new(l), Box::new(r))
    }

    pub fn call(name: &str, args: Vec<Expr>) -> Expr {
        Expr::Call(Box::new(Expr::var(name)), args)
    }

    pub fn method_call(obj: Expr, name: &str, args: Vec<Expr>) -> Expr {
        Expr::Call(
            Box::new(Expr::ObjGet(Box::new(obj), Box::new(Expr::str(name)))),
            args,
        )
    }

    pub fn static_call(class: &str, name: &str, args: Vec<Expr>) -> Expr {
        Expr::Call(
            Box::new(Expr::ClassGet(
                Box::new(Expr::var(class)),
                Box::new(Expr::str(name)),
            )),
            args,
        )
    }

    pub fn new_(class: &str, args: Vec<Expr>) -> Expr {
        Expr::New(Box::new(Expr::var(class)), args)
    }

    pub fn obj_get(obj: Expr, field: &str) -> Expr {
        Expr::ObjGet(Box::new(obj), Box::new(Expr::str(field)))
    }

    pub fn array_get(arr: Expr, key: Expr) -> Expr {
        Expr::ArrayGet(Box::new(arr), Some(Box::new(key)))
    }

    pub fn array_push(arr: Expr) -> Expr {
        Expr::ArrayGet(Box::new(arr), None)
    }
}

impl Stmt {
    pub fn expr(e: Expr) -> Stmt {
        Stmt::Expr(e)
    }

    pub fn if_(cond: Expr, then: Vec<Stmt>, els: Vec<Stmt>) -> Stmt {
        Stmt::If(cond, Box::new(Stmt::Block(then)), Box::new(Stmt::Block(els)))
    }

    pub fn ret(e: Expr) -> Stmt {
        Stmt::Return(Some(e))
    }
}

impl FuncDef {
    pub fn new(name: &str, params: Vec<Param>, body: Vec<Stmt>) -> Rc<FuncDef> {
        Rc::new(FuncDef {
            name: name.to_string(),
            params,
            body,
            is_static: false,
        })
    }
}

impl Param {
    pub fn new(name: &str) -> Param {
        Param {
            name: name.to_string(),
            by_ref: false,
            default: None,
        }
    }

    pub fn with_default(name: &str, default: Expr) -> Param {
        Param {
            name: name.to_string(),
            by_ref: false,
            default: Some(default),
        }
    }

    pub fn by_ref(name: &str) -> Param {
        Param {
            name: name.to_string(),
            by_ref: true,
            default: None,
        }
    }
}
