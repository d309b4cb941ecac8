use std::collections::BTreeSet;

use rustc_hash::FxHashSet;

use crate::{
    ai::{
        analysis::Analyzer,
        domains::{content_of, unify, Addr, Heap, Ty, Value},
        env::Env,
    },
    ast::{is_variable, ArrayEntry, Case, Expr, Stmt, ARRAY_VAR, RETURN_VAR},
    error::{InterpError, Result},
};

impl Analyzer<'_> {
    pub fn stmts(&mut self, env: &mut Env<'_>, heap: &mut Heap, stmts: &[Stmt]) -> Result<()> {
        for s in stmts {
            self.stmt(env, heap, s)?;
        }
        Ok(())
    }

    pub fn stmt(&mut self, env: &mut Env<'_>, heap: &mut Heap, s: &Stmt) -> Result<()> {
        match s {
            Stmt::Expr(e) => {
                self.expr(env, heap, e)?;
            }
            Stmt::Block(ss) => self.stmts(env, heap, ss)?,
            Stmt::If(c, then, els) => {
                self.expr(env, heap, c)?;
                self.pre_bind(env, heap, then)?;
                self.pre_bind(env, heap, els)?;
                self.stmt(env, heap, then)?;
                self.stmt(env, heap, els)?;
            }
            Stmt::While(c, body) => {
                self.expr(env, heap, c)?;
                self.stmt(env, heap, body)?;
            }
            Stmt::DoWhile(body, c) => {
                self.stmt(env, heap, body)?;
                self.expr(env, heap, c)?;
            }
            Stmt::For(init, cond, step, body) => {
                for e in init.iter().chain(cond) {
                    self.expr(env, heap, e)?;
                }
                self.stmt(env, heap, body)?;
                for e in step {
                    self.expr(env, heap, e)?;
                }
            }
            Stmt::Foreach(arr, key, val, body) => {
                self.foreach(env, heap, arr, key.as_ref(), val, body)?;
            }
            Stmt::Switch(subject, cases) => {
                self.expr(env, heap, subject)?;
                for case in cases {
                    match case {
                        Case::Case(e, body) => {
                            self.expr(env, heap, e)?;
                            self.stmts(env, heap, body)?;
                        }
                        Case::Default(body) => self.stmts(env, heap, body)?,
                    }
                }
            }
            Stmt::Return(e) => {
                let v = match e {
                    Some(e) => self.expr(env, heap, e)?,
                    None => Value::Null,
                };
                let (fresh, ptr) = env.get_var(heap, RETURN_VAR);
                self.assign(env, heap, fresh, &ptr, v)?;
            }
            // Control-flow effects of break/continue/throw are ignored; the
            // sub-expression is still evaluated for its side effects.
            Stmt::Break(e) | Stmt::Continue(e) => {
                if let Some(e) = e {
                    self.expr(env, heap, e)?;
                }
            }
            Stmt::Throw(e) => {
                self.expr(env, heap, e)?;
            }
            Stmt::Try(body, catches) => {
                self.stmts(env, heap, body)?;
                for catch in catches {
                    let (fresh, ptr) = env.get_var(heap, &catch.var);
                    self.assign(env, heap, fresh, &ptr, Value::Any)?;
                    self.stmts(env, heap, &catch.body)?;
                }
            }
            Stmt::Global(names) => {
                for name in names {
                    let a = env.get_global(heap, name);
                    env.bind_var(name, a);
                }
            }
            Stmt::StaticVars(vars) => {
                for (name, init) in vars {
                    let key = env.static_key(name);
                    let a = match env.globals.get(&key).copied() {
                        Some(a) => a,
                        None => {
                            let a = env.get_global(heap, &key);
                            let v = match init {
                                Some(e) => self.expr(env, heap, e)?,
                                None => Value::Null,
                            };
                            self.assign(env, heap, true, &Value::Ptr(a), v)?;
                            a
                        }
                    };
                    env.bind_var(name, a);
                }
            }
            Stmt::FuncDef(_) | Stmt::ClassDef(_) | Stmt::ConstDef(_, _) => {
                if self.opts.strict {
                    return Err(InterpError::Impossible(
                        "definition nested in executable code".to_string(),
                    ));
                }
            }
            Stmt::Nop => {}
        }
        Ok(())
    }

    pub fn expr(&mut self, env: &mut Env<'_>, heap: &mut Heap, e: &Expr) -> Result<Value> {
        match e {
            Expr::Null => Ok(Value::Null),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(n) => Ok(Value::Int(*n)),
            Expr::Float(x) => Ok(Value::Float(*x)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Id(name) if is_variable(name) => {
                let (_, ptr) = self.lvalue(env, heap, e)?;
                Ok(content_of(heap, &ptr))
            }
            Expr::Id(name) => match env.db.constant(name) {
                Some(def) => {
                    let def = def.clone();
                    self.expr(env, heap, &def)
                }
                None if self.opts.strict => Err(InterpError::UnknownConstant(name.clone())),
                None => Ok(Value::Any),
            },
            Expr::Assign(None, lhs, rhs) => self.assign_expr(env, heap, lhs, rhs),
            Expr::Assign(Some(op), lhs, rhs) => {
                let desugared = Expr::Binary(*op, lhs.clone(), rhs.clone());
                self.assign_expr(env, heap, lhs, &desugared)
            }
            Expr::Binary(op, l, r) => {
                let vl = self.expr_chased(env, heap, l)?;
                let vr = self.expr_chased(env, heap, r)?;
                Ok(self.binary(heap, *op, &vl, &vr))
            }
            Expr::Unary(op, e) => {
                let v = self.expr_chased(env, heap, e)?;
                Ok(unary(*op, &v))
            }
            Expr::Cond(c, t, f) => {
                self.expr(env, heap, c)?;
                let vt = self.expr(env, heap, t)?;
                let vf = self.expr(env, heap, f)?;
                Ok(unify(heap, vt, vf))
            }
            Expr::InterpString(parts) => {
                let mut vals = Vec::with_capacity(parts.len());
                for part in parts {
                    vals.push(self.expr_chased(env, heap, part)?);
                }
                Ok(self.hook.fold_slist(heap, &vals))
            }
            Expr::Xhp(children) => {
                let mut vals = Vec::with_capacity(children.len());
                for child in children {
                    vals.push(self.expr_chased(env, heap, child)?);
                }
                match self.hook.fold_slist(heap, &vals) {
                    v @ Value::Taint(_) => Ok(v),
                    _ => Ok(Value::Abstr(Ty::Xhp)),
                }
            }
            Expr::ConsArray(entries) => self.cons_array(env, heap, entries),
            Expr::List(_) => {
                if self.opts.strict {
                    Err(InterpError::Impossible(
                        "list pattern outside assignment".to_string(),
                    ))
                } else {
                    Ok(Value::Any)
                }
            }
            Expr::RefTo(inner) => {
                let (_, ptr) = self.lvalue(env, heap, inner)?;
                Ok(self.shared_cell(heap, &ptr))
            }
            Expr::Call(f, args) => self.call_expr(env, heap, f, args),
            Expr::New(class, args) => self.new_expr(env, heap, class, args),
            Expr::ObjGet(_, _) | Expr::ClassGet(_, _) | Expr::ArrayGet(_, _) => {
                let (_, ptr) = self.lvalue(env, heap, e)?;
                Ok(content_of(heap, &ptr))
            }
            Expr::Lambda(_) => Ok(Value::Any),
        }
    }

    /// Expression value with indirection fully collapsed, for operand
    /// positions that match on shapes.
    pub fn expr_chased(&mut self, env: &mut Env<'_>, heap: &mut Heap, e: &Expr) -> Result<Value> {
        let v = self.expr(env, heap, e)?;
        Ok(content_of(heap, &v))
    }

    fn assign_expr(
        &mut self,
        env: &mut Env<'_>,
        heap: &mut Heap,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<Value> {
        if let Expr::List(targets) = lhs {
            return self.list_assign(env, heap, targets, rhs);
        }
        if let Expr::RefTo(src) = rhs {
            return self.ref_assign(env, heap, lhs, src);
        }
        let (fresh, ptr) = self.lvalue(env, heap, lhs)?;
        let v = self.expr(env, heap, rhs)?;
        self.assign(env, heap, fresh, &ptr, v)
    }

    /// Destructuring is a sequence of indexed reads from the one evaluated
    /// right-hand side.
    fn list_assign(
        &mut self,
        env: &mut Env<'_>,
        heap: &mut Heap,
        targets: &[Expr],
        rhs: &Expr,
    ) -> Result<Value> {
        let source = self.expr_chased(env, heap, rhs)?;
        for (i, target) in targets.iter().enumerate() {
            let elem = index_value(heap, &source, i);
            let (fresh, ptr) = self.lvalue(env, heap, target)?;
            self.assign(env, heap, fresh, &ptr, elem)?;
        }
        Ok(source)
    }

    /// `$y =& $x`: both names end up pointing at the same value cell.
    fn ref_assign(
        &mut self,
        env: &mut Env<'_>,
        heap: &mut Heap,
        lhs: &Expr,
        src: &Expr,
    ) -> Result<Value> {
        let (_, src_ptr) = self.lvalue(env, heap, src)?;
        let inner = self.shared_cell(heap, &src_ptr);
        let (_, dst_ptr) = self.lvalue(env, heap, lhs)?;
        if let Value::Ptr(a) = dst_ptr {
            heap.set(a, inner.clone());
        }
        Ok(content_of(heap, &inner))
    }

    /// Inner pointer of a cell chain, creating the value cell if the chain is
    /// only one level deep.
    fn shared_cell(&mut self, heap: &mut Heap, ptr: &Value) -> Value {
        match ptr {
            Value::Ptr(a) => {
                let b = ensure_chain(heap, *a);
                Value::Ptr(b)
            }
            v => v.clone(),
        }
    }

    /// Store through a pointer. `fresh` cells take the value as-is; existing
    /// cells unify with their previous contents, so bindings only grow.
    pub fn assign(
        &mut self,
        env: &mut Env<'_>,
        heap: &mut Heap,
        fresh: bool,
        ptr: &Value,
        rhs: Value,
    ) -> Result<Value> {
        match ptr {
            Value::Ptr(a) => {
                let b = ensure_chain(heap, *a);
                let v = if fresh {
                    rhs
                } else {
                    let old = heap.get(b);
                    unify(heap, old, rhs)
                };
                heap.set(b, v.clone());
                Ok(v)
            }
            Value::Ref(addrs) => {
                let mut out = rhs.clone();
                for a in addrs.clone() {
                    out = self.assign(env, heap, false, &Value::Ptr(a), rhs.clone())?;
                }
                Ok(out)
            }
            _ => {
                if self.opts.strict {
                    Err(InterpError::Impossible(
                        "assignment through a non-pointer".to_string(),
                    ))
                } else {
                    Ok(rhs)
                }
            }
        }
    }

    pub fn lvalue(
        &mut self,
        env: &mut Env<'_>,
        heap: &mut Heap,
        e: &Expr,
    ) -> Result<(bool, Value)> {
        match e {
            Expr::Id(name) if is_variable(name) => {
                if !env.vars().contains_key(name) {
                    if let Some(v) = self.hook.source_value(heap, name) {
                        let a = heap.alloc_chain(v);
                        env.bind_var(name, a);
                        return Ok((false, Value::Ptr(a)));
                    }
                }
                Ok(env.get_var(heap, name))
            }
            Expr::Id(name) => {
                if self.opts.strict {
                    Err(InterpError::Impossible(format!(
                        "constant {} in l-value position",
                        name
                    )))
                } else {
                    let a = heap.new_cell();
                    Ok((true, Value::Ptr(a)))
                }
            }
            Expr::ObjGet(obj, member) => {
                let base = self.expr(env, heap, obj)?;
                let name = self.expr_chased(env, heap, member)?;
                self.member_lvalue(heap, &base, &name, false)
            }
            Expr::ClassGet(class, member) => {
                let base = self.class_base(env, heap, class)?;
                let name = self.expr_chased(env, heap, member)?;
                self.member_lvalue(heap, &base, &name, true)
            }
            Expr::ArrayGet(arr, key) => {
                let (_, base_ptr) = self.lvalue(env, heap, arr)?;
                let key_v = match key {
                    Some(k) => Some(self.expr_chased(env, heap, k)?),
                    None => None,
                };
                self.index_lvalue(heap, &base_ptr, key_v)
            }
            Expr::RefTo(inner) => self.lvalue(env, heap, inner),
            // Reference-opaque expressions: evaluate and wrap, so callers can
            // still read through the result.
            _ => {
                let v = self.expr(env, heap, e)?;
                let a = heap.alloc_chain(v);
                Ok((false, Value::Ptr(a)))
            }
        }
    }

    /// Member cell of an object or class value. Missing members vivify as
    /// `Null` cells; in strict mode only `__construct` may be absent.
    pub(crate) fn member_lvalue(
        &mut self,
        heap: &mut Heap,
        base: &Value,
        name: &Value,
        static_access: bool,
    ) -> Result<(bool, Value)> {
        let name = match name {
            Value::Str(s) => s.clone(),
            _ => {
                let a = heap.alloc_chain(Value::Any);
                return Ok((false, Value::Ptr(a)));
            }
        };
        let obj_addr = match self.object_cell(heap, base) {
            Some(a) => a,
            None => {
                if self.opts.strict {
                    return Err(InterpError::UnknownObject(name));
                }
                let a = heap.alloc_chain(Value::Any);
                return Ok((false, Value::Ptr(a)));
            }
        };
        let members = match heap.get(obj_addr) {
            Value::Object(m) => m,
            _ => unreachable!("object cell lost its shape"),
        };
        if let Some(cell) = members.get(&name) {
            return Ok((false, cell.clone()));
        }
        if self.opts.strict && name != "__construct" && !static_access {
            return Err(InterpError::UnknownMethod {
                name,
                class: crate::ai::domains::show(heap, base),
                candidates: members.keys().cloned().collect(),
            });
        }
        let mut members = members;
        let cell = heap.alloc_chain(Value::Null);
        members.insert(name, Value::Ptr(cell));
        heap.set(obj_addr, Value::Object(members));
        Ok((true, Value::Ptr(cell)))
    }

    /// Address of the heap cell holding the `Object` map behind `base`.
    fn object_cell(&self, heap: &Heap, base: &Value) -> Option<Addr> {
        let mut v = base.clone();
        let mut hops = 0;
        loop {
            match v {
                Value::Ptr(a) => {
                    if matches!(heap.get(a), Value::Object(_)) {
                        return Some(a);
                    }
                    if hops > 2 {
                        return None;
                    }
                    hops += 1;
                    v = heap.get(a);
                }
                Value::Ref(addrs) => {
                    let a = *addrs.iter().next()?;
                    if matches!(heap.get(a), Value::Object(_)) {
                        return Some(a);
                    }
                    return None;
                }
                _ => return None,
            }
        }
    }

    /// Resolve the base of a `C::member` access: a literal class name, or the
    /// reserved `self`/`parent` bindings pushed around method calls.
    pub(crate) fn class_base(
        &mut self,
        env: &mut Env<'_>,
        heap: &mut Heap,
        class: &Expr,
    ) -> Result<Value> {
        if let Expr::Id(name) = class {
            if name == crate::ast::SELF_NAME || name == crate::ast::PARENT_NAME {
                return match env.globals.get(name).copied() {
                    Some(a) => Ok(heap.get(a)),
                    None if self.opts.strict => Err(InterpError::UnknownClass(name.clone())),
                    None => Ok(Value::Any),
                };
            }
            if !is_variable(name) {
                return self.lazy_class(env, heap, name);
            }
        }
        match self.expr_chased(env, heap, class)? {
            Value::Str(s) => self.lazy_class(env, heap, &s),
            _ if self.opts.strict => Err(InterpError::UnknownClass("<dynamic>".to_string())),
            _ => Ok(Value::Any),
        }
    }

    fn index_lvalue(
        &mut self,
        heap: &mut Heap,
        base_ptr: &Value,
        key: Option<Value>,
    ) -> Result<(bool, Value)> {
        let outer = match base_ptr {
            Value::Ptr(a) => *a,
            Value::Ref(addrs) => match addrs.iter().next() {
                Some(a) => *a,
                None => {
                    let a = heap.alloc_chain(Value::Any);
                    return Ok((false, Value::Ptr(a)));
                }
            },
            _ => {
                let a = heap.alloc_chain(Value::Any);
                return Ok((false, Value::Ptr(a)));
            }
        };
        let cell = value_cell(heap, outer);
        let container = heap.get(cell);
        match container {
            Value::Null => {
                let elem = heap.alloc_chain(Value::Null);
                let container = match &key {
                    None | Some(Value::Int(0)) => Value::Array(vec![Value::Ptr(elem)]),
                    Some(Value::Str(s)) => {
                        let mut m = std::collections::BTreeMap::new();
                        m.insert(s.clone(), Value::Ptr(elem));
                        Value::Record(m)
                    }
                    Some(k) => Value::Map(Box::new(k.clone()), Box::new(Value::Ptr(elem))),
                };
                heap.set(cell, container);
                Ok((true, Value::Ptr(elem)))
            }
            Value::Array(mut elems) => match &key {
                None => {
                    let elem = heap.alloc_chain(Value::Null);
                    elems.push(Value::Ptr(elem));
                    heap.set(cell, Value::Array(elems));
                    Ok((true, Value::Ptr(elem)))
                }
                Some(Value::Int(i)) if (*i as usize) < elems.len() && *i >= 0 => {
                    let e = elems[*i as usize].clone();
                    heap.set(cell, Value::Array(elems));
                    Ok((false, e))
                }
                Some(Value::Int(i)) if *i >= 0 && (*i as usize) == elems.len() => {
                    let elem = heap.alloc_chain(Value::Null);
                    elems.push(Value::Ptr(elem));
                    heap.set(cell, Value::Array(elems));
                    Ok((true, Value::Ptr(elem)))
                }
                Some(k) => {
                    heap.set(cell, Value::Array(elems));
                    self.widen_index(heap, cell, k.clone())
                }
            },
            Value::Record(mut fields) => match &key {
                Some(Value::Str(s)) => {
                    if let Some(cell_v) = fields.get(s) {
                        let cell_v = cell_v.clone();
                        heap.set(cell, Value::Record(fields));
                        Ok((false, cell_v))
                    } else {
                        let elem = heap.alloc_chain(Value::Null);
                        fields.insert(s.clone(), Value::Ptr(elem));
                        heap.set(cell, Value::Record(fields));
                        Ok((true, Value::Ptr(elem)))
                    }
                }
                Some(k) => {
                    heap.set(cell, Value::Record(fields));
                    self.widen_index(heap, cell, k.clone())
                }
                None => {
                    heap.set(cell, Value::Record(fields));
                    self.widen_index(heap, cell, Value::Abstr(Ty::Int))
                }
            },
            Value::Map(_, _) => {
                let k = key.unwrap_or(Value::Abstr(Ty::Int));
                self.widen_index(heap, cell, k)
            }
            Value::Taint(label) => {
                let a = heap.alloc_chain(Value::Taint(label));
                Ok((false, Value::Ptr(a)))
            }
            _ => {
                let a = heap.alloc_chain(Value::Any);
                Ok((false, Value::Ptr(a)))
            }
        }
    }

    /// Collapse the container at `cell` into a summary `Map` and hand out its
    /// single element cell.
    fn widen_index(
        &mut self,
        heap: &mut Heap,
        cell: Addr,
        key: Value,
    ) -> Result<(bool, Value)> {
        let container = heap.get(cell);
        let mut seen = FxHashSet::default();
        let promoted = crate::ai::domains::promote_to_map(heap, container, &mut seen);
        let (k, e) = match promoted {
            Value::Map(k, e) => (*k, *e),
            v => {
                // not a container at all; replace wholesale
                let elem = heap.alloc_chain(v);
                (key.clone(), Value::Ptr(elem))
            }
        };
        let k = unify(heap, k, key);
        heap.set(cell, Value::Map(Box::new(k), Box::new(e.clone())));
        Ok((false, e))
    }

    fn cons_array(
        &mut self,
        env: &mut Env<'_>,
        heap: &mut Heap,
        entries: &[ArrayEntry],
    ) -> Result<Value> {
        env.unbind_var(ARRAY_VAR);
        let scratch = Expr::Id(ARRAY_VAR.to_string());
        for entry in entries {
            let (lhs, rhs) = match entry {
                ArrayEntry::Val(e) => (Expr::ArrayGet(Box::new(scratch.clone()), None), e),
                ArrayEntry::Kv(k, e) => (
                    Expr::ArrayGet(Box::new(scratch.clone()), Some(Box::new(k.clone()))),
                    e,
                ),
            };
            self.assign_expr(env, heap, &lhs, rhs)?;
        }
        let (_, ptr) = env.get_var(heap, ARRAY_VAR);
        let v = content_of(heap, &ptr);
        env.unbind_var(ARRAY_VAR);
        Ok(v)
    }

    fn foreach(
        &mut self,
        env: &mut Env<'_>,
        heap: &mut Heap,
        arr: &Expr,
        key: Option<&Expr>,
        val: &Expr,
        body: &Stmt,
    ) -> Result<()> {
        let container = self.expr_chased(env, heap, arr)?;
        let (key_summary, elem_summary) = container_summary(heap, &container);
        if let Some(key_e) = key {
            let (fresh, ptr) = self.lvalue(env, heap, key_e)?;
            self.assign(env, heap, fresh, &ptr, key_summary)?;
        }
        let target = match val {
            Expr::RefTo(inner) => inner.as_ref(),
            other => other,
        };
        let (fresh, ptr) = self.lvalue(env, heap, target)?;
        self.assign(env, heap, fresh, &ptr, elem_summary)?;
        self.stmt(env, heap, body)
    }

    fn binary(&mut self, heap: &mut Heap, op: crate::ast::BinOp, l: &Value, r: &Value) -> Value {
        use crate::ast::BinOp;
        match op {
            BinOp::Concat => self.hook.concat(heap, l, r),
            op if op.is_arith() => {
                if l.is_int_shaped() && r.is_int_shaped() {
                    Value::Abstr(Ty::Int)
                } else {
                    Value::Sum(vec![Value::Null, Value::Abstr(Ty::Int)])
                }
            }
            _ => Value::Abstr(Ty::Bool),
        }
    }

    /// Virtual `x = Null` for every name an `if` arm introduces, so a read
    /// after the merge sees at worst `Sum([Null, ...])`.
    fn pre_bind(&mut self, env: &mut Env<'_>, heap: &mut Heap, s: &Stmt) -> Result<()> {
        let mut names = BTreeSet::new();
        assigned_names_stmt(s, &mut names);
        for name in names {
            if !env.vars().contains_key(&name) {
                let (fresh, ptr) = env.get_var(heap, &name);
                self.assign(env, heap, fresh, &ptr, Value::Null)?;
            }
        }
        Ok(())
    }
}

fn unary(op: crate::ast::UnOp, v: &Value) -> Value {
    use crate::ast::UnOp;
    match op {
        UnOp::Not => match v {
            Value::Bool(b) => Value::Bool(!b),
            Value::Abstr(Ty::Bool) => Value::Abstr(Ty::Bool),
            _ => Value::Sum(vec![Value::Null, Value::Abstr(Ty::Bool)]),
        },
        UnOp::Neg => match v {
            Value::Int(n) => Value::Int(-n),
            Value::Float(x) => Value::Float(-x),
            Value::Abstr(t @ (Ty::Int | Ty::Float)) => Value::Abstr(*t),
            _ => Value::Sum(vec![Value::Null, Value::Abstr(Ty::Int)]),
        },
    }
}

/// Follow `Ptr` links from `outer` down to the cell that holds an actual
/// value, creating the second level of a one-level chain on the way.
pub(crate) fn value_cell(heap: &mut Heap, outer: Addr) -> Addr {
    let mut a = ensure_chain(heap, outer);
    let mut seen = FxHashSet::default();
    while let Value::Ptr(b) = heap.get(a) {
        if !seen.insert(a) {
            break;
        }
        a = b;
    }
    a
}

pub(crate) fn ensure_chain(heap: &mut Heap, a: Addr) -> Addr {
    match heap.get(a) {
        Value::Ptr(b) => b,
        Value::Ref(addrs) => match addrs.iter().next() {
            Some(b) => *b,
            None => {
                let b = heap.new_cell();
                heap.set(a, Value::Ptr(b));
                b
            }
        },
        v => {
            let b = heap.alloc(v);
            heap.set(a, Value::Ptr(b));
            b
        }
    }
}

/// i-th element of a destructured source, by value.
fn index_value(heap: &Heap, source: &Value, i: usize) -> Value {
    match source {
        Value::Array(elems) => match elems.get(i) {
            Some(cell) => content_of(heap, cell),
            None => Value::Null,
        },
        Value::Map(_, e) => content_of(heap, e),
        Value::Record(fields) => match fields.get(&i.to_string()) {
            Some(cell) => content_of(heap, cell),
            None => Value::Null,
        },
        Value::Taint(label) => Value::Taint(label.clone()),
        Value::Any => Value::Any,
        _ => Value::Null,
    }
}

/// Key and element summaries a `foreach` binds.
fn container_summary(heap: &mut Heap, container: &Value) -> (Value, Value) {
    match container {
        Value::Array(elems) => {
            let mut acc = None;
            for cell in elems {
                let content = content_of(heap, cell);
                acc = Some(match acc {
                    None => content,
                    Some(a) => unify(heap, a, content),
                });
            }
            (Value::Abstr(Ty::Int), acc.unwrap_or(Value::Null))
        }
        Value::Record(fields) => {
            let mut keys = None;
            let mut acc = None;
            for (k, cell) in fields {
                let content = content_of(heap, cell);
                acc = Some(match acc {
                    None => content,
                    Some(a) => unify(heap, a, content),
                });
                let key = Value::Str(k.clone());
                keys = Some(match keys {
                    None => key,
                    Some(a) => unify(heap, a, key),
                });
            }
            (
                keys.unwrap_or(Value::Abstr(Ty::String)),
                acc.unwrap_or(Value::Null),
            )
        }
        Value::Map(k, e) => ((**k).clone(), content_of(heap, e)),
        Value::Taint(label) => (Value::Taint(label.clone()), Value::Taint(label.clone())),
        Value::Any => (Value::Any, Value::Any),
        _ => (Value::Null, Value::Null),
    }
}

fn assigned_names_stmt(s: &Stmt, out: &mut BTreeSet<String>) {
    match s {
        Stmt::Expr(e) | Stmt::Throw(e) => assigned_names_expr(e, out),
        Stmt::Block(ss) => {
            for s in ss {
                assigned_names_stmt(s, out);
            }
        }
        Stmt::If(c, t, f) => {
            assigned_names_expr(c, out);
            assigned_names_stmt(t, out);
            assigned_names_stmt(f, out);
        }
        Stmt::While(c, body) | Stmt::DoWhile(body, c) => {
            assigned_names_expr(c, out);
            assigned_names_stmt(body, out);
        }
        Stmt::For(init, cond, step, body) => {
            for e in init.iter().chain(cond).chain(step) {
                assigned_names_expr(e, out);
            }
            assigned_names_stmt(body, out);
        }
        Stmt::Foreach(arr, key, val, body) => {
            assigned_names_expr(arr, out);
            for e in key.iter().chain(Some(val)) {
                if let Expr::Id(name) = e {
                    if is_variable(name) {
                        out.insert(name.clone());
                    }
                }
            }
            assigned_names_stmt(body, out);
        }
        Stmt::Switch(e, cases) => {
            assigned_names_expr(e, out);
            for case in cases {
                let body = match case {
                    Case::Case(e, body) => {
                        assigned_names_expr(e, out);
                        body
                    }
                    Case::Default(body) => body,
                };
                for s in body {
                    assigned_names_stmt(s, out);
                }
            }
        }
        Stmt::Return(e) | Stmt::Break(e) | Stmt::Continue(e) => {
            if let Some(e) = e {
                assigned_names_expr(e, out);
            }
        }
        Stmt::Try(body, catches) => {
            for s in body {
                assigned_names_stmt(s, out);
            }
            for catch in catches {
                out.insert(catch.var.clone());
                for s in &catch.body {
                    assigned_names_stmt(s, out);
                }
            }
        }
        Stmt::Global(names) => {
            for name in names {
                out.insert(name.clone());
            }
        }
        Stmt::StaticVars(vars) => {
            for (name, _) in vars {
                out.insert(name.clone());
            }
        }
        Stmt::FuncDef(_) | Stmt::ClassDef(_) | Stmt::ConstDef(_, _) | Stmt::Nop => {}
    }
}

fn assigned_names_expr(e: &Expr, out: &mut BTreeSet<String>) {
    match e {
        Expr::Assign(_, lhs, rhs) => {
            assigned_target(lhs, out);
            assigned_names_expr(rhs, out);
        }
        Expr::Binary(_, l, r) => {
            assigned_names_expr(l, out);
            assigned_names_expr(r, out);
        }
        Expr::Unary(_, e) | Expr::RefTo(e) => assigned_names_expr(e, out),
        Expr::Cond(c, t, f) => {
            assigned_names_expr(c, out);
            assigned_names_expr(t, out);
            assigned_names_expr(f, out);
        }
        Expr::Call(f, args) | Expr::New(f, args) => {
            assigned_names_expr(f, out);
            for a in args {
                assigned_names_expr(a, out);
            }
        }
        Expr::ObjGet(a, b) | Expr::ClassGet(a, b) => {
            assigned_names_expr(a, out);
            assigned_names_expr(b, out);
        }
        Expr::ArrayGet(a, k) => {
            assigned_names_expr(a, out);
            if let Some(k) = k {
                assigned_names_expr(k, out);
            }
        }
        Expr::ConsArray(entries) => {
            for entry in entries {
                match entry {
                    ArrayEntry::Val(e) => assigned_names_expr(e, out),
                    ArrayEntry::Kv(k, v) => {
                        assigned_names_expr(k, out);
                        assigned_names_expr(v, out);
                    }
                }
            }
        }
        Expr::List(es) | Expr::InterpString(es) | Expr::Xhp(es) => {
            for e in es {
                assigned_names_expr(e, out);
            }
        }
        _ => {}
    }
}

fn assigned_target(lhs: &Expr, out: &mut BTreeSet<String>) {
    match lhs {
        Expr::Id(name) if is_variable(name) => {
            out.insert(name.clone());
        }
        Expr::List(es) => {
            for e in es {
                assigned_target(e, out);
            }
        }
        Expr::ArrayGet(base, _) | Expr::RefTo(base) => assigned_target(base, out),
        _ => {}
    }
}
