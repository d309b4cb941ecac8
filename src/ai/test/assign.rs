use super::*;
use crate::ai::domains::{addrs_valid, Ty};

#[test]
fn test_copy_resolves_through_two_hops() {
    // $x = "s"; $y = $x;
    let a = analyze(vec![
        assign_stmt("$x", Expr::str("s")),
        assign_stmt("$y", Expr::var("$x")),
    ]);
    let outer = a.globals["$x"];
    let first = a.heap.get(outer);
    assert!(matches!(first, Value::Ptr(_)));
    let second = a.heap.chase(&first);
    assert_eq!(second, Value::Str("s".to_string()));
    assert_eq!(global(&a, "$y"), Value::Str("s".to_string()));
}

#[test]
fn test_reassignment_unifies() {
    let a = analyze(vec![
        assign_stmt("$x", Expr::Int(1)),
        assign_stmt("$x", Expr::Int(2)),
    ]);
    assert_eq!(global(&a, "$x"), Value::Abstr(Ty::Int));
}

#[test]
fn test_reference_aliases_value_cell() {
    // $x = 1; $y =& $x; $y = 2;
    let a = analyze(vec![
        assign_stmt("$x", Expr::Int(1)),
        Stmt::expr(Expr::assign(
            Expr::var("$y"),
            Expr::RefTo(Box::new(Expr::var("$x"))),
        )),
        assign_stmt("$y", Expr::Int(2)),
    ]);
    assert_eq!(global(&a, "$x"), Value::Abstr(Ty::Int));
    assert_eq!(global(&a, "$y"), Value::Abstr(Ty::Int));
}

#[test]
fn test_compound_assignment() {
    let a = analyze(vec![
        assign_stmt("$x", Expr::Int(1)),
        Stmt::expr(Expr::assign_op(
            crate::ast::BinOp::Plus,
            Expr::var("$x"),
            Expr::Int(2),
        )),
    ]);
    assert_eq!(global(&a, "$x"), Value::Abstr(Ty::Int));
}

#[test]
fn test_list_destructuring() {
    // list($a, $b) = array(1, "s");
    use crate::ast::ArrayEntry;
    let a = analyze(vec![Stmt::expr(Expr::assign(
        Expr::List(vec![Expr::var("$a"), Expr::var("$b")]),
        Expr::ConsArray(vec![
            ArrayEntry::Val(Expr::Int(1)),
            ArrayEntry::Val(Expr::str("s")),
        ]),
    ))]);
    assert_eq!(global(&a, "$a"), Value::Int(1));
    assert_eq!(global(&a, "$b"), Value::Str("s".to_string()));
}

#[test]
fn test_every_pointer_resolves() {
    let a = analyze(vec![
        assign_stmt("$x", Expr::str("s")),
        assign_stmt("$y", Expr::var("$x")),
        Stmt::expr(Expr::assign(
            Expr::var("$r"),
            Expr::RefTo(Box::new(Expr::var("$x"))),
        )),
    ]);
    for addr in a.globals.values() {
        assert!(addrs_valid(&a.heap, &Value::Ptr(*addr)));
    }
}
