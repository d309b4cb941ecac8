use super::*;
use crate::{
    ai::{analysis::CallNode, domains::Ty},
    ast::BinOp,
    error::InterpError,
};

#[test]
fn test_call_returns_value() {
    let a = analyze(vec![
        fun("f", vec![], vec![Stmt::ret(Expr::Int(42))]),
        assign_stmt("$x", Expr::call("f", vec![])),
    ]);
    assert_eq!(global(&a, "$x"), Value::Int(42));
}

#[test]
fn test_parameter_binding() {
    let a = analyze(vec![
        fun(
            "f",
            vec![Param::new("$a")],
            vec![Stmt::ret(Expr::var("$a"))],
        ),
        assign_stmt("$x", Expr::call("f", vec![Expr::Int(7)])),
    ]);
    assert_eq!(global(&a, "$x"), Value::Int(7));
}

#[test]
fn test_missing_argument_uses_default() {
    let a = analyze(vec![
        fun(
            "f",
            vec![Param::new("$a"), Param::with_default("$b", Expr::Int(5))],
            vec![Stmt::ret(Expr::var("$b"))],
        ),
        assign_stmt("$x", Expr::call("f", vec![Expr::Int(1)])),
    ]);
    assert_eq!(global(&a, "$x"), Value::Int(5));
}

#[test]
fn test_by_ref_parameter_writes_back() {
    // function f(&$a) { $a = 9; } $x = 1; f($x);
    let a = analyze(vec![
        fun(
            "f",
            vec![Param::by_ref("$a")],
            vec![assign_stmt("$a", Expr::Int(9))],
        ),
        assign_stmt("$x", Expr::Int(1)),
        Stmt::expr(Expr::call("f", vec![Expr::var("$x")])),
    ]);
    assert_eq!(global(&a, "$x"), Value::Abstr(Ty::Int));
}

#[test]
fn test_recursion_is_bounded() {
    // function f($n) { if ($n <= 0) return 0; return f($n - 1); } f(100);
    let a = analyze(vec![
        fun(
            "f",
            vec![Param::new("$n")],
            vec![
                Stmt::if_(
                    Expr::binary(BinOp::Le, Expr::var("$n"), Expr::Int(0)),
                    vec![Stmt::ret(Expr::Int(0))],
                    vec![],
                ),
                Stmt::ret(Expr::call(
                    "f",
                    vec![Expr::binary(BinOp::Minus, Expr::var("$n"), Expr::Int(1))],
                )),
            ],
        ),
        assign_stmt("$x", Expr::call("f", vec![Expr::Int(100)])),
    ]);
    assert!(a.stats.truncated_calls >= 1);
    let x = global(&a, "$x");
    assert!(sum_contains(&x, &Value::Int(0)));
}

#[test]
fn test_depth_cap_for_clean_chains() {
    // f0 -> f1 -> ... -> f7, all taint-free
    let mut stmts = vec![];
    for i in 0..8 {
        let body = if i == 7 {
            vec![Stmt::ret(Expr::Int(0))]
        } else {
            vec![Stmt::ret(Expr::call(&format!("f{}", i + 1), vec![]))]
        };
        stmts.push(fun(&format!("f{}", i), vec![], body));
    }
    stmts.push(assign_stmt("$x", Expr::call("f0", vec![])));
    let a = analyze(stmts);
    assert!(a.stats.truncated_calls >= 1);
}

#[test]
fn test_unknown_function_is_conservative() {
    let a = analyze(vec![assign_stmt("$x", Expr::call("undefined", vec![]))]);
    assert_eq!(global(&a, "$x"), Value::Any);
    assert!(a.graph.has_edge(
        &CallNode::File(FILE.to_string()),
        &CallNode::Fun("undefined".to_string())
    ));
}

#[test]
fn test_unknown_function_is_fatal_in_strict_mode() {
    let err = try_analyze_with(
        vec![Stmt::expr(Expr::call("undefined", vec![]))],
        strict(),
    )
    .unwrap_err();
    assert_eq!(err, InterpError::UnknownFunction("undefined".to_string()));
}

#[test]
fn test_dynamic_call_through_string() {
    // $g = "f"; $x = $g();
    let a = analyze(vec![
        fun("f", vec![], vec![Stmt::ret(Expr::Int(1))]),
        assign_stmt("$g", Expr::str("f")),
        assign_stmt("$x", Expr::Call(Box::new(Expr::var("$g")), vec![])),
    ]);
    assert_eq!(global(&a, "$x"), Value::Int(1));
    assert!(a.graph.has_edge(
        &CallNode::File(FILE.to_string()),
        &CallNode::Fun("f".to_string())
    ));
}

#[test]
fn test_call_graph_records_nesting() {
    let a = analyze(vec![
        fun("f", vec![], vec![]),
        fun("g", vec![], vec![Stmt::expr(Expr::call("f", vec![]))]),
        Stmt::expr(Expr::call("g", vec![])),
    ]);
    assert!(a.graph.has_edge(
        &CallNode::File(FILE.to_string()),
        &CallNode::Fun("g".to_string())
    ));
    assert!(a.graph.has_edge(
        &CallNode::Fun("g".to_string()),
        &CallNode::Fun("f".to_string())
    ));
}

#[test]
fn test_id_is_identity() {
    let a = analyze(vec![assign_stmt(
        "$x",
        Expr::call("id", vec![Expr::Int(41)]),
    )]);
    assert_eq!(global(&a, "$x"), Value::Int(41));
}

#[test]
fn test_show_discards() {
    let a = analyze(vec![assign_stmt(
        "$x",
        Expr::call("show", vec![Expr::Int(1)]),
    )]);
    assert_eq!(global(&a, "$x"), Value::Null);
}

#[test]
fn test_checkpoint_captures_state() {
    let a = analyze(vec![
        assign_stmt("$x", Expr::Int(1)),
        Stmt::expr(Expr::call("checkpoint", vec![])),
    ]);
    let (heap, vars) = a.checkpoint.expect("checkpoint slot");
    let addr = vars["$x"];
    assert_eq!(
        content_of(&heap, &Value::Ptr(addr)),
        Value::Int(1)
    );
}

#[test]
fn test_extract_paths_sweeps_definitions() {
    let opts = AnalysisOpts {
        extract_paths: true,
        ..Default::default()
    };
    let a = analyze_with(
        vec![
            fun("f", vec![], vec![Stmt::expr(Expr::call("g", vec![]))]),
            fun("g", vec![], vec![]),
        ],
        opts,
    );
    assert!(a
        .graph
        .has_edge(&CallNode::FakeRoot, &CallNode::Fun("f".to_string())));
    assert!(a.graph.has_edge(
        &CallNode::Fun("f".to_string()),
        &CallNode::Fun("g".to_string())
    ));
}
