use std::{collections::BTreeMap, rc::Rc};

use etrace::some_or;
use log::debug;
use rustc_hash::FxHashMap;

use crate::{
    ai::{
        analysis::{Analyzer, CallNode},
        domains::{content_of, unify, Callable, Heap, MethodId, Value},
        env::Env,
        semantics::value_cell,
        taint::{is_clean, SINK_NAME},
    },
    ast::{
        is_variable, ClassDef, Expr, FuncDef, BUILD_METHOD, MYOBJ_VAR, PARENT_NAME, RETURN_VAR,
        SELF_NAME, THIS_VAR,
    },
    error::{InterpError, Result},
};

impl Analyzer<'_> {
    pub(crate) fn call_expr(
        &mut self,
        env: &mut Env<'_>,
        heap: &mut Heap,
        f: &Expr,
        args: &[Expr],
    ) -> Result<Value> {
        if let Expr::Id(name) = f {
            if !is_variable(name) {
                match name.as_str() {
                    // identity: a call to id(x) is x
                    "id" => {
                        return match args.first() {
                            Some(arg) => self.expr(env, heap, arg),
                            None => Ok(Value::Null),
                        };
                    }
                    // debug hook: evaluate and discard
                    "show" => {
                        for arg in args {
                            self.expr(env, heap, arg)?;
                        }
                        return Ok(Value::Null);
                    }
                    "checkpoint" => {
                        self.checkpoint = Some((heap.clone(), env.vars().clone()));
                        return Ok(Value::Null);
                    }
                    _ => return self.call_named(env, heap, name, args),
                }
            }
        }
        let callee = self.expr_chased(env, heap, f)?;
        self.call_value(env, heap, callee, args)
    }

    fn call_named(
        &mut self,
        env: &mut Env<'_>,
        heap: &mut Heap,
        name: &str,
        args: &[Expr],
    ) -> Result<Value> {
        self.graph
            .add(env.caller(), CallNode::Fun(name.to_string()));
        match env.db.fun(name) {
            Some(def) => {
                let def = def.clone();
                let node = CallNode::Fun(name.to_string());
                self.call_fun(env, heap, def, None, None, node, args, false)
            }
            None if self.opts.strict => Err(InterpError::UnknownFunction(name.to_string())),
            None => {
                let mut vals = Vec::with_capacity(args.len());
                for arg in args {
                    vals.push(self.expr(env, heap, arg)?);
                }
                Ok(self.hook.unknown_call_summary(heap, &vals))
            }
        }
    }

    /// Dispatch on the shape of an evaluated callee.
    fn call_value(
        &mut self,
        env: &mut Env<'_>,
        heap: &mut Heap,
        callee: Value,
        args: &[Expr],
    ) -> Result<Value> {
        match callee {
            Value::Str(name) => self.call_named(env, heap, &name, args),
            Value::Method(recv, methods) => {
                self.call_methods(env, heap, &recv, &methods, args, false)
            }
            Value::Taint(label) => {
                for arg in args {
                    self.expr(env, heap, arg)?;
                }
                Ok(Value::Taint(label))
            }
            Value::Sum(alts) => {
                let mut out = None;
                for alt in alts {
                    if !matches!(
                        alt,
                        Value::Str(_) | Value::Method(_, _) | Value::Taint(_)
                    ) {
                        continue;
                    }
                    let v = self.call_value(env, heap, alt, args)?;
                    out = Some(match out {
                        None => v,
                        Some(prev) => unify(heap, prev, v),
                    });
                }
                match out {
                    Some(v) => Ok(v),
                    None => self.lost_control(env, heap, args, "empty alternative set"),
                }
            }
            v => {
                let what = crate::ai::domains::show(heap, &v);
                self.lost_control(env, heap, args, &what)
            }
        }
    }

    fn lost_control(
        &mut self,
        env: &mut Env<'_>,
        heap: &mut Heap,
        args: &[Expr],
        what: &str,
    ) -> Result<Value> {
        if self.opts.strict {
            return Err(InterpError::LostControl(what.to_string()));
        }
        for arg in args {
            self.expr(env, heap, arg)?;
        }
        Ok(Value::Any)
    }

    /// Invoke every candidate closure and unify the results. Candidates stay
    /// distinct under value merging because each carries its own id.
    pub(crate) fn call_methods(
        &mut self,
        env: &mut Env<'_>,
        heap: &mut Heap,
        recv: &Value,
        methods: &BTreeMap<MethodId, Callable>,
        args: &[Expr],
        fake: bool,
    ) -> Result<Value> {
        let mut out = None;
        for callable in methods.values() {
            let v = match callable {
                Callable::Func { class, def } => {
                    let node = match class {
                        Some(c) => CallNode::Method(c.clone(), def.name.clone()),
                        None => CallNode::Fun(def.name.clone()),
                    };
                    self.graph.add(env.caller(), node.clone());
                    let this = match recv {
                        Value::Null => None,
                        v => Some(v.clone()),
                    };
                    self.call_fun(env, heap, def.clone(), class.as_deref(), this, node, args, fake)?
                }
                Callable::Build(cdef) => {
                    let node = CallNode::Method(cdef.name.clone(), BUILD_METHOD.to_string());
                    self.graph.add(env.caller(), node);
                    let cdef = cdef.clone();
                    self.build_instance(env, heap, &cdef)?
                }
            };
            out = Some(match out {
                None => v,
                Some(prev) => unify(heap, prev, v),
            });
        }
        Ok(out.unwrap_or(Value::Null))
    }

    /// The bounded call evaluation of the engine: at most twice-recursive
    /// into the same function, and no deeper than `max_depth` unless a
    /// tainted argument forces further exploration.
    pub(crate) fn call_fun(
        &mut self,
        env: &mut Env<'_>,
        heap: &mut Heap,
        def: Rc<FuncDef>,
        class: Option<&str>,
        recv: Option<Value>,
        node: CallNode,
        args: &[Expr],
        fake: bool,
    ) -> Result<Value> {
        self.stats.calls += 1;

        let mut vars = FxHashMap::default();
        let mut arg_vals = Vec::with_capacity(args.len());
        let mut clean = true;
        for (param, arg) in def.params.iter().zip(args) {
            let a = if param.by_ref {
                let (_, ptr) = self.lvalue(env, heap, arg)?;
                let inner = match &ptr {
                    Value::Ptr(a) => Value::Ptr(value_cell(heap, *a)),
                    v => v.clone(),
                };
                clean &= is_clean(heap, &inner);
                arg_vals.push(content_of(heap, &inner));
                heap.alloc(inner)
            } else {
                let v = self.expr(env, heap, arg)?;
                clean &= is_clean(heap, &v);
                arg_vals.push(v.clone());
                heap.alloc_chain(v)
            };
            vars.insert(param.name.clone(), a);
        }
        for arg in args.iter().skip(def.params.len()) {
            let v = self.expr(env, heap, arg)?;
            clean &= is_clean(heap, &v);
            arg_vals.push(v);
        }

        let n = env.stack.get(&def.name).copied().unwrap_or(0);
        if n >= 2 || (env.path.len() >= self.opts.max_depth && clean) {
            debug!("truncating call to {} (depth {})", def.name, env.path.len());
            self.stats.truncated_calls += 1;
            let a = heap.alloc(Value::Any);
            return Ok(Value::Ptr(a));
        }
        if clean {
            if let Some(v) = env.safe.get(&def.name) {
                return Ok(v.clone());
            }
        }

        env.stack.insert(def.name.clone(), n + 1);
        env.path.push(node);
        let saved = env.enter_frame(vars, &def.name);
        let result = self.call_body(env, heap, &def, class, recv, args.len(), fake);
        env.leave_frame(saved);
        env.path.pop();
        env.stack.insert(def.name.clone(), n);
        let ret = result?;

        if def.name == SINK_NAME {
            arg_vals.push(ret.clone());
            self.hook.check_danger(
                heap,
                SINK_NAME,
                &env.file,
                &env.cfun,
                &arg_vals,
                &mut self.findings,
            );
        }
        if is_clean(heap, &ret) {
            env.safe.insert(def.name.clone(), ret.clone());
        }
        Ok(ret)
    }

    /// Body execution inside an installed frame: receiver and class scope,
    /// defaults for unbound parameters, statements, then `*return*`.
    fn call_body(
        &mut self,
        env: &mut Env<'_>,
        heap: &mut Heap,
        def: &Rc<FuncDef>,
        class: Option<&str>,
        recv: Option<Value>,
        provided: usize,
        fake: bool,
    ) -> Result<Value> {
        if let Some(this) = recv {
            let a = heap.alloc_chain(this);
            env.bind_var(THIS_VAR, a);
        }

        let scope = match class {
            Some(cname) => {
                let self_ptr = self.lazy_class(env, heap, cname)?;
                let self_addr = heap.alloc(self_ptr);
                let parent_addr = match env.db.class(cname).and_then(|c| c.parent.clone()) {
                    Some(pname) => {
                        let parent_ptr = self.lazy_class(env, heap, &pname)?;
                        Some(heap.alloc(parent_ptr))
                    }
                    None => None,
                };
                let saved_self = env.globals.insert(SELF_NAME.to_string(), self_addr);
                let saved_parent = match parent_addr {
                    Some(a) => env.globals.insert(PARENT_NAME.to_string(), a),
                    None => env.globals.remove(PARENT_NAME),
                };
                Some((saved_self, saved_parent))
            }
            None => None,
        };

        let result = self.exec_body(env, heap, def, provided, fake);

        if let Some((saved_self, saved_parent)) = scope {
            match saved_self {
                Some(a) => env.globals.insert(SELF_NAME.to_string(), a),
                None => env.globals.remove(SELF_NAME),
            };
            match saved_parent {
                Some(a) => env.globals.insert(PARENT_NAME.to_string(), a),
                None => env.globals.remove(PARENT_NAME),
            };
        }
        result
    }

    fn exec_body(
        &mut self,
        env: &mut Env<'_>,
        heap: &mut Heap,
        def: &Rc<FuncDef>,
        provided: usize,
        fake: bool,
    ) -> Result<Value> {
        for param in def.params.iter().skip(provided) {
            let v = match &param.default {
                Some(e) => self.expr(env, heap, e)?,
                None if fake => Value::Any,
                None => Value::Null,
            };
            let (fresh, ptr) = env.get_var(heap, &param.name);
            self.assign(env, heap, fresh, &ptr, v)?;
        }
        self.stmts(env, heap, &def.body)?;
        let (_, rptr) = env.get_var(heap, RETURN_VAR);
        Ok(content_of(heap, &rptr))
    }

    /// Classes materialize once; afterwards the global binding short-circuits.
    pub(crate) fn lazy_class(
        &mut self,
        env: &mut Env<'_>,
        heap: &mut Heap,
        name: &str,
    ) -> Result<Value> {
        if let Some(a) = env.globals.get(name) {
            return Ok(heap.get(*a));
        }
        self.force_class(env, heap, name)
    }

    fn force_class(&mut self, env: &mut Env<'_>, heap: &mut Heap, name: &str) -> Result<Value> {
        let cdef = match env.db.class(name) {
            Some(c) => c.clone(),
            None if self.opts.strict => return Err(InterpError::UnknownClass(name.to_string())),
            None => return Ok(Value::Any),
        };
        // cyclic parent chains terminate here
        if !self.building.insert(name.to_string()) {
            return Ok(Value::Any);
        }

        let mut members = match &cdef.parent {
            Some(pname) => {
                let parent_ptr = self.lazy_class(env, heap, pname)?;
                match content_of(heap, &parent_ptr) {
                    Value::Object(m) => m,
                    _ => BTreeMap::new(),
                }
            }
            None => BTreeMap::new(),
        };

        if let Err(e) = self.class_level_inits(env, heap, &cdef, &mut members) {
            self.building.remove(name);
            return Err(e);
        }

        for mdef in &cdef.methods {
            let id = self.fresh_method_id();
            let mut m = BTreeMap::new();
            m.insert(
                id,
                Callable::Func {
                    class: Some(name.to_string()),
                    def: mdef.clone(),
                },
            );
            members.insert(mdef.name.clone(), Value::Method(Box::new(Value::Null), m));
        }
        let id = self.fresh_method_id();
        let mut m = BTreeMap::new();
        m.insert(id, Callable::Build(cdef.clone()));
        members.insert(
            BUILD_METHOD.to_string(),
            Value::Method(Box::new(Value::Null), m),
        );

        let cell = heap.alloc(Value::Object(members));
        let outer = heap.alloc(Value::Ptr(cell));
        env.globals.insert(name.to_string(), outer);
        self.building.remove(name);
        self.stats.classes_built += 1;
        debug!("materialized class {}", name);
        Ok(Value::Ptr(cell))
    }

    fn class_level_inits(
        &mut self,
        env: &mut Env<'_>,
        heap: &mut Heap,
        cdef: &Rc<ClassDef>,
        members: &mut BTreeMap<String, Value>,
    ) -> Result<()> {
        for (cname, e) in &cdef.constants {
            let v = self.expr(env, heap, e)?;
            let cell = heap.alloc_chain(v);
            members.insert(cname.clone(), Value::Ptr(cell));
        }
        for (sname, init) in &cdef.static_vars {
            let v = match init {
                Some(e) => self.expr(env, heap, e)?,
                None => Value::Null,
            };
            let cell = heap.alloc_chain(v);
            members.insert(sname.clone(), Value::Ptr(cell));
        }
        Ok(())
    }

    /// The synthetic `*BUILD*` closure: parent instance members first, then
    /// this class's instance variables and methods, with every non-static
    /// method re-bound to the new instance pointer.
    fn build_instance(
        &mut self,
        env: &mut Env<'_>,
        heap: &mut Heap,
        cdef: &Rc<ClassDef>,
    ) -> Result<Value> {
        let key = format!("*build*{}", cdef.name);
        if !self.building.insert(key.clone()) {
            return Ok(Value::Any);
        }
        let result = self.build_instance_inner(env, heap, cdef);
        self.building.remove(&key);
        result
    }

    fn build_instance_inner(
        &mut self,
        env: &mut Env<'_>,
        heap: &mut Heap,
        cdef: &Rc<ClassDef>,
    ) -> Result<Value> {
        let mut members = match &cdef.parent {
            Some(pname) => match env.db.class(pname) {
                Some(pdef) => {
                    let pdef = pdef.clone();
                    let parent_inst = self.build_instance(env, heap, &pdef)?;
                    match content_of(heap, &parent_inst) {
                        Value::Object(m) => m,
                        _ => BTreeMap::new(),
                    }
                }
                None if self.opts.strict => {
                    return Err(InterpError::UnknownClass(pname.clone()))
                }
                None => BTreeMap::new(),
            },
            None => BTreeMap::new(),
        };

        for (vname, init) in &cdef.inst_vars {
            let v = match init {
                Some(e) => self.expr(env, heap, e)?,
                None => Value::Null,
            };
            let cell = heap.alloc_chain(v);
            members.insert(vname.clone(), Value::Ptr(cell));
        }
        for mdef in &cdef.methods {
            let id = self.fresh_method_id();
            let mut m = BTreeMap::new();
            m.insert(
                id,
                Callable::Func {
                    class: Some(cdef.name.clone()),
                    def: mdef.clone(),
                },
            );
            members.insert(mdef.name.clone(), Value::Method(Box::new(Value::Null), m));
        }

        let inst = heap.alloc(Value::Null);
        for member in members.values_mut() {
            if let Value::Method(recv, m) = member {
                let rebind = m.values().any(|c| match c {
                    Callable::Func { def, .. } => !def.is_static,
                    Callable::Build(_) => false,
                });
                if rebind {
                    *recv = Box::new(Value::Ptr(inst));
                }
            }
        }
        heap.set(inst, Value::Object(members));
        Ok(Value::Ptr(inst))
    }

    /// `New`: resolve the class, run `*BUILD*` into the `*myobj*` scratch,
    /// run the constructor if the class has one, read the scratch back.
    pub(crate) fn new_expr(
        &mut self,
        env: &mut Env<'_>,
        heap: &mut Heap,
        class: &Expr,
        args: &[Expr],
    ) -> Result<Value> {
        let class_v = self.class_base(env, heap, class)?;
        let class_obj = match content_of(heap, &class_v) {
            Value::Object(m) => m,
            _ => {
                for arg in args {
                    self.expr(env, heap, arg)?;
                }
                return Ok(Value::Any);
            }
        };
        let build = match class_obj.get(BUILD_METHOD) {
            Some(Value::Method(recv, m)) => (recv.clone(), m.clone()),
            _ if self.opts.strict => {
                return Err(InterpError::Impossible(
                    "class object without constructor closure".to_string(),
                ))
            }
            _ => {
                for arg in args {
                    self.expr(env, heap, arg)?;
                }
                return Ok(Value::Any);
            }
        };

        env.unbind_var(MYOBJ_VAR);
        let (fresh, ptr) = env.get_var(heap, MYOBJ_VAR);
        let inst = self.call_methods(env, heap, &build.0, &build.1, args, false)?;
        self.assign(env, heap, fresh, &ptr, inst)?;

        let inst_v = content_of(heap, &ptr);
        if let Value::Object(m) = content_of(heap, &inst_v) {
            if let Some(Value::Method(recv, ctor)) = m.get("__construct") {
                let recv = recv.clone();
                let ctor = ctor.clone();
                self.call_methods(env, heap, &recv, &ctor, args, false)?;
            }
        }

        let out = content_of(heap, &ptr);
        env.unbind_var(MYOBJ_VAR);
        Ok(out)
    }

    /// The fake-root sweep behind `extract_paths`: call every top-level
    /// function and every method of every class, with `Any` parameters.
    pub(crate) fn sweep_definitions(
        &mut self,
        env: &mut Env<'_>,
        heap: &mut Heap,
    ) -> Result<()> {
        env.path = vec![CallNode::FakeRoot];

        let mut funs: Vec<String> = env.db.fun_names().cloned().collect();
        funs.sort();
        for name in funs {
            let def = some_or!(env.db.fun(&name), continue).clone();
            let node = CallNode::Fun(name.clone());
            self.graph.add(CallNode::FakeRoot, node.clone());
            self.call_fun(env, heap, def, None, None, node, &[], true)?;
        }

        let mut classes: Vec<String> = env.db.class_names().cloned().collect();
        classes.sort();
        for name in classes {
            self.lazy_class(env, heap, &name)?;
            let cdef = some_or!(env.db.class(&name), continue).clone();
            let inst = self.build_instance(env, heap, &cdef)?;
            let inst_members = match content_of(heap, &inst) {
                Value::Object(m) => m,
                _ => continue,
            };
            for mdef in &cdef.methods {
                if let Some(Value::Method(recv, m)) = inst_members.get(&mdef.name) {
                    let recv = recv.clone();
                    let m = m.clone();
                    self.call_methods(env, heap, &recv, &m, &[], true)?;
                }
            }
        }
        Ok(())
    }
}

