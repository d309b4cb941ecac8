use super::*;
use crate::{ai::analysis::CallNode, error::InterpError};

#[test]
fn test_inherited_dispatch_records_declaring_class() {
    // class A { function f() {} } class B extends A { function g() {} }
    // $o = new B(); $o->f(); $o->g();
    let a = analyze(vec![
        class("A", None, vec![method("f", vec![], vec![])]),
        class("B", Some("A"), vec![method("g", vec![], vec![])]),
        assign_stmt("$o", Expr::new_("B", vec![])),
        Stmt::expr(Expr::method_call(Expr::var("$o"), "f", vec![])),
        Stmt::expr(Expr::method_call(Expr::var("$o"), "g", vec![])),
    ]);
    let file = CallNode::File(FILE.to_string());
    assert!(a
        .graph
        .has_edge(&file, &CallNode::Method("A".to_string(), "f".to_string())));
    assert!(a
        .graph
        .has_edge(&file, &CallNode::Method("B".to_string(), "g".to_string())));
}

#[test]
fn test_constructor_initializes_fields() {
    // class C { function __construct($v) { $this->x = $v; } }
    // $o = new C(5); $y = $o->x;
    let a = analyze(vec![
        class(
            "C",
            None,
            vec![method(
                "__construct",
                vec![Param::new("$v")],
                vec![Stmt::expr(Expr::assign(
                    Expr::obj_get(Expr::var("$this"), "x"),
                    Expr::var("$v"),
                ))],
            )],
        ),
        assign_stmt("$o", Expr::new_("C", vec![Expr::Int(5)])),
        assign_stmt("$y", Expr::obj_get(Expr::var("$o"), "x")),
    ]);
    assert_eq!(global(&a, "$y"), Value::Int(5));
}

#[test]
fn test_method_reads_instance_state() {
    let a = analyze(vec![
        class(
            "C",
            None,
            vec![
                method(
                    "__construct",
                    vec![Param::new("$v")],
                    vec![Stmt::expr(Expr::assign(
                        Expr::obj_get(Expr::var("$this"), "v"),
                        Expr::var("$v"),
                    ))],
                ),
                method(
                    "get",
                    vec![],
                    vec![Stmt::ret(Expr::obj_get(Expr::var("$this"), "v"))],
                ),
            ],
        ),
        assign_stmt("$o", Expr::new_("C", vec![Expr::str("inside")])),
        assign_stmt("$y", Expr::method_call(Expr::var("$o"), "get", vec![])),
    ]);
    assert_eq!(global(&a, "$y"), Value::Str("inside".to_string()));
}

#[test]
fn test_flattening_carries_parent_methods() {
    // every parent method is present on the child instance unless shadowed
    let a = analyze(vec![
        class(
            "P",
            None,
            vec![
                method("f", vec![], vec![Stmt::ret(Expr::Int(1))]),
                method("g", vec![], vec![Stmt::ret(Expr::Int(2))]),
            ],
        ),
        class(
            "C",
            Some("P"),
            vec![method("g", vec![], vec![Stmt::ret(Expr::str("shadowed"))])],
        ),
        assign_stmt("$o", Expr::new_("C", vec![])),
        assign_stmt("$a", Expr::method_call(Expr::var("$o"), "f", vec![])),
        assign_stmt("$b", Expr::method_call(Expr::var("$o"), "g", vec![])),
    ]);
    assert_eq!(global(&a, "$a"), Value::Int(1));
    assert_eq!(global(&a, "$b"), Value::Str("shadowed".to_string()));
}

#[test]
fn test_class_constant_and_static_var() {
    let a = analyze(vec![
        Stmt::ClassDef(Rc::new(ClassDef {
            name: "C".to_string(),
            parent: None,
            constants: vec![("MAX".to_string(), Expr::Int(10))],
            static_vars: vec![("$count".to_string(), Some(Expr::Int(0)))],
            inst_vars: vec![],
            methods: vec![],
        })),
        assign_stmt(
            "$m",
            Expr::ClassGet(
                Box::new(Expr::Id("C".to_string())),
                Box::new(Expr::str("MAX")),
            ),
        ),
        assign_stmt(
            "$c",
            Expr::ClassGet(
                Box::new(Expr::Id("C".to_string())),
                Box::new(Expr::str("$count")),
            ),
        ),
    ]);
    assert_eq!(global(&a, "$m"), Value::Int(10));
    assert_eq!(global(&a, "$c"), Value::Int(0));
}

#[test]
fn test_self_resolves_inside_method() {
    // class C { const K = 3; static function m() { return self::K; } }
    let m = Rc::new(FuncDef {
        name: "m".to_string(),
        params: vec![],
        body: vec![Stmt::ret(Expr::ClassGet(
            Box::new(Expr::Id("self".to_string())),
            Box::new(Expr::str("K")),
        ))],
        is_static: true,
    });
    let a = analyze(vec![
        Stmt::ClassDef(Rc::new(ClassDef {
            name: "C".to_string(),
            parent: None,
            constants: vec![("K".to_string(), Expr::Int(3))],
            static_vars: vec![],
            inst_vars: vec![],
            methods: vec![m],
        })),
        assign_stmt("$x", Expr::static_call("C", "m", vec![])),
    ]);
    assert_eq!(global(&a, "$x"), Value::Int(3));
}

#[test]
fn test_parent_resolves_inside_method() {
    let a = analyze(vec![
        class("P", None, vec![method("h", vec![], vec![Stmt::ret(Expr::Int(7))])]),
        class(
            "C",
            Some("P"),
            vec![method(
                "m",
                vec![],
                vec![Stmt::ret(Expr::static_call("parent", "h", vec![]))],
            )],
        ),
        assign_stmt("$o", Expr::new_("C", vec![])),
        assign_stmt("$x", Expr::method_call(Expr::var("$o"), "m", vec![])),
    ]);
    assert_eq!(global(&a, "$x"), Value::Int(7));
}

#[test]
fn test_missing_field_vivifies_as_null() {
    let a = analyze(vec![
        class("C", None, vec![]),
        assign_stmt("$o", Expr::new_("C", vec![])),
        assign_stmt("$y", Expr::obj_get(Expr::var("$o"), "ghost")),
    ]);
    assert_eq!(global(&a, "$y"), Value::Null);
}

#[test]
fn test_field_write_after_vivification() {
    let a = analyze(vec![
        class("C", None, vec![]),
        assign_stmt("$o", Expr::new_("C", vec![])),
        Stmt::expr(Expr::assign(
            Expr::obj_get(Expr::var("$o"), "n"),
            Expr::Int(5),
        )),
        assign_stmt("$y", Expr::obj_get(Expr::var("$o"), "n")),
    ]);
    assert_eq!(global(&a, "$y"), Value::Int(5));
}

#[test]
fn test_unknown_method_is_fatal_in_strict_mode() {
    let err = try_analyze_with(
        vec![
            class("C", None, vec![]),
            assign_stmt("$o", Expr::new_("C", vec![])),
            Stmt::expr(Expr::method_call(Expr::var("$o"), "nope", vec![])),
        ],
        strict(),
    )
    .unwrap_err();
    assert!(matches!(err, InterpError::UnknownMethod { name, .. } if name == "nope"));
}

#[test]
fn test_unknown_class_is_fatal_in_strict_mode() {
    let err = try_analyze_with(
        vec![Stmt::expr(Expr::new_("Ghost", vec![]))],
        strict(),
    )
    .unwrap_err();
    assert_eq!(err, InterpError::UnknownClass("Ghost".to_string()));
}

#[test]
fn test_instance_var_defaults() {
    let a = analyze(vec![
        Stmt::ClassDef(Rc::new(ClassDef {
            name: "C".to_string(),
            parent: None,
            constants: vec![],
            static_vars: vec![],
            inst_vars: vec![("ready".to_string(), Some(Expr::Bool(true)))],
            methods: vec![],
        })),
        assign_stmt("$o", Expr::new_("C", vec![])),
        assign_stmt("$y", Expr::obj_get(Expr::var("$o"), "ready")),
    ]);
    assert_eq!(global(&a, "$y"), Value::Bool(true));
}
