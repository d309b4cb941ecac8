use rustc_hash::FxHashMap;

use crate::{
    ai::{
        analysis::CallNode,
        domains::{Addr, Heap, Value},
    },
    db::CodeDb,
};

/// Interpretation environment. `vars` and `globals` map names to the outer
/// address of a two-level cell chain; at the top level the two namespaces are
/// the same map, inside a call `local` shadows it.
pub struct Env<'db> {
    pub db: &'db CodeDb,
    pub globals: FxHashMap<String, Addr>,
    local: Option<FxHashMap<String, Addr>>,
    pub cfun: String,
    pub path: Vec<CallNode>,
    pub stack: FxHashMap<String, usize>,
    pub safe: FxHashMap<String, Value>,
    pub file: String,
}

/// Scope state displaced by a call frame; must be restored on every exit
/// path, including failure.
pub struct SavedScope {
    local: Option<FxHashMap<String, Addr>>,
    cfun: String,
}

impl<'db> Env<'db> {
    pub fn new(db: &'db CodeDb, file: &str) -> Self {
        Self {
            db,
            globals: FxHashMap::default(),
            local: None,
            cfun: "<toplevel>".to_string(),
            path: vec![CallNode::File(file.to_string())],
            stack: FxHashMap::default(),
            safe: FxHashMap::default(),
            file: file.to_string(),
        }
    }

    pub fn vars(&self) -> &FxHashMap<String, Addr> {
        self.local.as_ref().unwrap_or(&self.globals)
    }

    pub fn vars_mut(&mut self) -> &mut FxHashMap<String, Addr> {
        self.local.as_mut().unwrap_or(&mut self.globals)
    }

    /// Spec `Var.get`: the bound pointer for `name`, binding a fresh `Null`
    /// cell first if the name is unbound. The flag reports freshness.
    pub fn get_var(&mut self, heap: &mut Heap, name: &str) -> (bool, Value) {
        if let Some(a) = self.vars().get(name) {
            return (false, Value::Ptr(*a));
        }
        let a = heap.new_cell();
        self.vars_mut().insert(name.to_string(), a);
        (true, Value::Ptr(a))
    }

    pub fn bind_var(&mut self, name: &str, a: Addr) {
        self.vars_mut().insert(name.to_string(), a);
    }

    pub fn unbind_var(&mut self, name: &str) {
        self.vars_mut().remove(name);
    }

    /// Address of a global binding, created as a fresh `Null` cell on miss.
    pub fn get_global(&mut self, heap: &mut Heap, name: &str) -> Addr {
        if let Some(a) = self.globals.get(name) {
            return *a;
        }
        let a = heap.new_cell();
        self.globals.insert(name.to_string(), a);
        a
    }

    /// Per-function statics live in `globals` under `<cfun>**<name>`.
    pub fn static_key(&self, name: &str) -> String {
        format!("{}**{}", self.cfun, name)
    }

    pub fn enter_frame(&mut self, vars: FxHashMap<String, Addr>, cfun: &str) -> SavedScope {
        SavedScope {
            local: std::mem::replace(&mut self.local, Some(vars)),
            cfun: std::mem::replace(&mut self.cfun, cfun.to_string()),
        }
    }

    pub fn leave_frame(&mut self, saved: SavedScope) {
        self.local = saved.local;
        self.cfun = saved.cfun;
    }

    pub fn caller(&self) -> CallNode {
        self.path.last().cloned().unwrap_or(CallNode::FakeRoot)
    }
}
