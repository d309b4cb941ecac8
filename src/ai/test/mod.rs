use std::rc::Rc;

use crate::{
    ai::{
        analysis::{analyze_program, Analysis, AnalysisOpts},
        domains::{content_of, Value},
    },
    ast::{ClassDef, Expr, FuncDef, Param, Stmt},
    db::CodeDb,
    error::Result,
};

mod assign;
mod calls;
mod classes;
mod taint;

const FILE: &str = "test.php";

fn analyze(stmts: Vec<Stmt>) -> Analysis {
    analyze_with(stmts, AnalysisOpts::default())
}

fn analyze_with(stmts: Vec<Stmt>, opts: AnalysisOpts) -> Analysis {
    try_analyze_with(stmts, opts).unwrap()
}

fn try_analyze_with(stmts: Vec<Stmt>, opts: AnalysisOpts) -> Result<Analysis> {
    let db = CodeDb::build(&stmts);
    analyze_program(&db, &stmts, FILE, opts)
}

fn strict() -> AnalysisOpts {
    AnalysisOpts {
        strict: true,
        ..AnalysisOpts::default()
    }
}

/// Final value of a top-level variable, through both pointer hops.
fn global(a: &Analysis, name: &str) -> Value {
    let addr = a
        .globals
        .get(name)
        .unwrap_or_else(|| panic!("unbound variable {}", name));
    content_of(&a.heap, &Value::Ptr(*addr))
}

fn fun(name: &str, params: Vec<Param>, body: Vec<Stmt>) -> Stmt {
    Stmt::FuncDef(FuncDef::new(name, params, body))
}

fn method(name: &str, params: Vec<Param>, body: Vec<Stmt>) -> Rc<FuncDef> {
    FuncDef::new(name, params, body)
}

fn class(name: &str, parent: Option<&str>, methods: Vec<Rc<FuncDef>>) -> Stmt {
    Stmt::ClassDef(Rc::new(ClassDef {
        name: name.to_string(),
        parent: parent.map(|p| p.to_string()),
        constants: vec![],
        static_vars: vec![],
        inst_vars: vec![],
        methods,
    }))
}

fn assign_stmt(name: &str, rhs: Expr) -> Stmt {
    Stmt::expr(Expr::assign(Expr::var(name), rhs))
}

fn as_sum(v: &Value) -> &[Value] {
    match v {
        Value::Sum(vs) => vs,
        _ => panic!("not a sum: {:?}", v),
    }
}

fn sum_contains(v: &Value, needle: &Value) -> bool {
    as_sum(v).contains(needle)
}
