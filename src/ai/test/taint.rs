use super::*;
use crate::ai::{
    analysis::AnalysisOpts,
    taint::{find_taint, is_clean},
};

fn render_sink() -> Stmt {
    fun(
        "render",
        vec![Param::new("$x")],
        vec![Stmt::ret(Expr::var("$x"))],
    )
}

#[test]
fn test_request_global_reaches_sink() {
    // $x = $_GET; render($x);
    let a = analyze(vec![
        render_sink(),
        assign_stmt("$x", Expr::var("$_GET")),
        Stmt::expr(Expr::call("render", vec![Expr::var("$x")])),
    ]);
    assert_eq!(a.findings.len(), 1);
    let finding = &a.findings[0];
    assert_eq!(finding.sink, "render");
    assert_eq!(finding.label, "$_GET");
    assert_eq!(finding.file, FILE);
}

#[test]
fn test_request_global_is_a_tainted_map() {
    let a = analyze(vec![assign_stmt("$x", Expr::var("$_POST"))]);
    let x = global(&a, "$x");
    assert_eq!(find_taint(&a.heap, &x), Some("$_POST".to_string()));
}

#[test]
fn test_taint_flows_through_concat() {
    let a = analyze(vec![
        assign_stmt(
            "$q",
            Expr::array_get(Expr::var("$_GET"), Expr::str("q")),
        ),
        assign_stmt(
            "$y",
            Expr::binary(crate::ast::BinOp::Concat, Expr::str("a"), Expr::var("$q")),
        ),
    ]);
    assert_eq!(global(&a, "$y"), Value::Taint("$_GET".to_string()));
}

#[test]
fn test_taint_flows_through_interpolation() {
    let a = analyze(vec![
        assign_stmt("$q", Expr::var("$_REQUEST")),
        assign_stmt(
            "$y",
            Expr::InterpString(vec![Expr::str("q="), Expr::var("$q")]),
        ),
    ]);
    assert_eq!(global(&a, "$y"), Value::Taint("$_REQUEST".to_string()));
}

#[test]
fn test_taint_flows_through_unknown_call() {
    let a = analyze(vec![
        assign_stmt("$x", Expr::var("$_GET")),
        assign_stmt("$y", Expr::call("mystery", vec![Expr::var("$x")])),
    ]);
    assert_eq!(global(&a, "$y"), Value::Taint("$_GET".to_string()));
}

#[test]
fn test_taint_flows_through_function_return() {
    let a = analyze(vec![
        render_sink(),
        fun(
            "pass",
            vec![Param::new("$v")],
            vec![Stmt::ret(Expr::var("$v"))],
        ),
        assign_stmt("$x", Expr::call("pass", vec![Expr::var("$_GET")])),
        Stmt::expr(Expr::call("render", vec![Expr::var("$x")])),
    ]);
    assert_eq!(a.findings.len(), 1);
}

#[test]
fn test_disabled_hook_is_a_noop() {
    let opts = AnalysisOpts {
        taint_mode: false,
        ..Default::default()
    };
    let a = analyze_with(
        vec![
            render_sink(),
            assign_stmt("$x", Expr::var("$_GET")),
            Stmt::expr(Expr::call("render", vec![Expr::var("$x")])),
        ],
        opts,
    );
    assert!(a.findings.is_empty());
    assert_eq!(global(&a, "$x"), Value::Null);
}

#[test]
fn test_clean_return_is_cached() {
    let a = analyze(vec![
        fun("f", vec![], vec![Stmt::ret(Expr::Int(1))]),
        assign_stmt("$a", Expr::call("f", vec![])),
        assign_stmt("$b", Expr::call("f", vec![])),
    ]);
    assert_eq!(global(&a, "$a"), Value::Int(1));
    assert_eq!(global(&a, "$b"), Value::Int(1));
}

#[test]
fn test_taint_defeats_depth_cap() {
    // a tainted argument must keep the chain under exploration past max_depth
    let mut stmts = vec![render_sink()];
    for i in 0..8 {
        let next = if i == 7 {
            Stmt::expr(Expr::call("render", vec![Expr::var("$v")]))
        } else {
            Stmt::expr(Expr::call(&format!("t{}", i + 1), vec![Expr::var("$v")]))
        };
        stmts.push(fun(&format!("t{}", i), vec![Param::new("$v")], vec![next]));
    }
    stmts.push(Stmt::expr(Expr::call(
        "t0",
        vec![Expr::var("$_GET")],
    )));
    let a = analyze(stmts);
    assert_eq!(a.stats.truncated_calls, 0);
    assert_eq!(a.findings.len(), 1);
}

#[test]
fn test_clean_values_report_clean() {
    let a = analyze(vec![assign_stmt("$x", Expr::Int(1))]);
    assert!(is_clean(&a.heap, &global(&a, "$x")));
}
