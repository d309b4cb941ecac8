use anyhow::Context;
use clap::Parser;
use sprat::{
    ai::analysis::{analyze_program, AnalysisOpts},
    ast::{ClassDef, Expr, FuncDef, Param, Stmt},
    db::CodeDb,
};

#[derive(Parser, Debug)]
struct Args {
    /// Logical name of the analyzed file, used in call-graph nodes
    #[arg(default_value = "demo.php")]
    file: String,
    /// Fail on unknown identifiers instead of over-approximating
    #[arg(long)]
    strict: bool,
    /// Sweep every top-level definition from a fake root
    #[arg(long)]
    extract_paths: bool,
    /// Call-stack depth cap for taint-free calls
    #[arg(long, default_value_t = 6)]
    max_depth: usize,
    /// Disable the taint policy
    #[arg(long)]
    no_taint: bool,
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    simplelog::TermLogger::init(
        if args.verbose {
            simplelog::LevelFilter::Debug
        } else {
            simplelog::LevelFilter::Info
        },
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let program = demo_program();
    let db = CodeDb::build(&program);
    let opts = AnalysisOpts {
        strict: args.strict,
        extract_paths: args.extract_paths,
        max_depth: args.max_depth,
        taint_mode: !args.no_taint,
    };
    let analysis = analyze_program(&db, &program, &args.file, opts)
        .with_context(|| format!("analysis of {} failed", args.file))?;

    println!(
        "{}",
        serde_json::to_string_pretty(&analysis.graph).context("serializing call graph")?
    );
    for finding in &analysis.findings {
        println!("{}", serde_json::to_string(finding)?);
    }
    Ok(())
}

/// Stand-in for the external parser: the simplified form of
///
/// ```text
/// function greet($name) { return "hello " . $name; }
/// class Box {
///     function __construct($v) { $this->v = $v; }
///     function get() { return $this->v; }
/// }
/// function render($x) { return $x; }
/// $b = new Box($_GET["q"]);
/// render($b->get());
/// greet("world");
/// ```
fn demo_program() -> Vec<Stmt> {
    use sprat::ast::BinOp;

    let greet = FuncDef::new(
        "greet",
        vec![Param::new("$name")],
        vec![Stmt::ret(Expr::binary(
            BinOp::Concat,
            Expr::str("hello "),
            Expr::var("$name"),
        ))],
    );
    let ctor = FuncDef::new(
        "__construct",
        vec![Param::new("$v")],
        vec![Stmt::expr(Expr::assign(
            Expr::obj_get(Expr::var("$this"), "v"),
            Expr::var("$v"),
        ))],
    );
    let get = FuncDef::new(
        "get",
        vec![],
        vec![Stmt::ret(Expr::obj_get(Expr::var("$this"), "v"))],
    );
    let render = FuncDef::new(
        "render",
        vec![Param::new("$x")],
        vec![Stmt::ret(Expr::var("$x"))],
    );
    let boxed = ClassDef {
        name: "Box".to_string(),
        parent: None,
        constants: vec![],
        static_vars: vec![],
        inst_vars: vec![("v".to_string(), None)],
        methods: vec![ctor, get],
    };

    vec![
        Stmt::FuncDef(greet),
        Stmt::ClassDef(std::rc::Rc::new(boxed)),
        Stmt::FuncDef(render),
        Stmt::expr(Expr::assign(
            Expr::var("$b"),
            Expr::New(
                Box::new(Expr::Id("Box".to_string())),
                vec![Expr::array_get(Expr::var("$_GET"), Expr::str("q"))],
            ),
        )),
        Stmt::expr(Expr::call(
            "render",
            vec![Expr::method_call(Expr::var("$b"), "get", vec![])],
        )),
        Stmt::expr(Expr::call("greet", vec![Expr::str("world")])),
    ]
}
