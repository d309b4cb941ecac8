use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use log::info;
use rustc_hash::FxHashMap;
use serde::{Serialize, Serializer};

use crate::{
    ai::{
        domains::{Addr, Heap},
        env::Env,
        taint::{HttpTaint, NoTaint, TaintFinding, TaintHook},
    },
    ast::Stmt,
    db::CodeDb,
    error::Result,
};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum CallNode {
    FakeRoot,
    File(String),
    Fun(String),
    Method(String, String),
}

impl fmt::Display for CallNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FakeRoot => write!(f, "FakeRoot"),
            Self::File(path) => write!(f, "File:{}", path),
            Self::Fun(name) => write!(f, "Function:{}", name),
            Self::Method(class, name) => write!(f, "Method:{}::{}", class, name),
        }
    }
}

impl Serialize for CallNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Caller → set of callees. Edges are recorded whenever a call resolves a
/// target or fails to resolve one.
#[derive(Debug, Default, Serialize)]
pub struct CallGraph(pub BTreeMap<CallNode, BTreeSet<CallNode>>);

impl CallGraph {
    pub fn add(&mut self, caller: CallNode, callee: CallNode) {
        self.0.entry(caller).or_default().insert(callee);
    }

    pub fn callees(&self, caller: &CallNode) -> impl Iterator<Item = &CallNode> {
        self.0.get(caller).into_iter().flatten()
    }

    pub fn has_edge(&self, caller: &CallNode, callee: &CallNode) -> bool {
        self.0.get(caller).is_some_and(|s| s.contains(callee))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AnalysisOpts {
    pub strict: bool,
    pub extract_paths: bool,
    pub max_depth: usize,
    pub taint_mode: bool,
}

impl Default for AnalysisOpts {
    fn default() -> Self {
        Self {
            strict: false,
            extract_paths: false,
            max_depth: 6,
            taint_mode: true,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct Stats {
    pub calls: usize,
    pub truncated_calls: usize,
    pub classes_built: usize,
}

pub struct Analyzer<'db> {
    pub db: &'db CodeDb,
    pub opts: AnalysisOpts,
    pub graph: CallGraph,
    pub findings: Vec<TaintFinding>,
    pub checkpoint: Option<(Heap, FxHashMap<String, Addr>)>,
    pub stats: Stats,
    pub(crate) hook: Box<dyn TaintHook>,
    pub(crate) building: rustc_hash::FxHashSet<String>,
    method_count: usize,
}

impl<'db> Analyzer<'db> {
    pub fn new(db: &'db CodeDb, opts: AnalysisOpts) -> Self {
        let hook: Box<dyn TaintHook> = if opts.taint_mode {
            Box::new(HttpTaint)
        } else {
            Box::new(NoTaint)
        };
        Self {
            db,
            opts,
            graph: CallGraph::default(),
            findings: vec![],
            checkpoint: None,
            stats: Stats::default(),
            hook,
            building: rustc_hash::FxHashSet::default(),
            method_count: 0,
        }
    }

    pub(crate) fn fresh_method_id(&mut self) -> usize {
        self.method_count += 1;
        self.method_count
    }
}

/// Everything the driver hands back to callers: the final heap, the global
/// bindings, and the accumulated outputs.
#[derive(Debug)]
pub struct Analysis {
    pub heap: Heap,
    pub globals: FxHashMap<String, Addr>,
    pub graph: CallGraph,
    pub findings: Vec<TaintFinding>,
    pub checkpoint: Option<(Heap, FxHashMap<String, Addr>)>,
    pub stats: Stats,
}

/// Run the interpreter over the top-level statements of a file. In strict
/// mode the first error escapes; otherwise every raise site recovers
/// conservatively and this returns `Ok`.
pub fn analyze_program(
    db: &CodeDb,
    stmts: &[Stmt],
    file: &str,
    opts: AnalysisOpts,
) -> Result<Analysis> {
    let mut analyzer = Analyzer::new(db, opts);
    let mut env = Env::new(db, file);
    let mut heap = Heap::new();
    for stmt in stmts {
        // top-level definitions are the code database's concern
        if matches!(
            stmt,
            Stmt::FuncDef(_) | Stmt::ClassDef(_) | Stmt::ConstDef(_, _)
        ) {
            continue;
        }
        analyzer.stmt(&mut env, &mut heap, stmt)?;
    }
    if opts.extract_paths {
        analyzer.sweep_definitions(&mut env, &mut heap)?;
    }
    info!(
        "analyzed {}: {} calls ({} truncated), {} classes, {} findings",
        file,
        analyzer.stats.calls,
        analyzer.stats.truncated_calls,
        analyzer.stats.classes_built,
        analyzer.findings.len()
    );
    Ok(Analysis {
        heap,
        globals: env.globals,
        graph: analyzer.graph,
        findings: analyzer.findings,
        checkpoint: analyzer.checkpoint,
        stats: analyzer.stats,
    })
}
