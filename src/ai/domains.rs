use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    rc::Rc,
};

use rustc_hash::FxHashSet;

use crate::ast::{ClassDef, FuncDef};

pub type Addr = usize;
pub type MethodId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Ty {
    Int,
    Bool,
    Float,
    String,
    Xhp,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Any,
    Null,
    Abstr(Ty),
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Ptr(Addr),
    Ref(BTreeSet<Addr>),
    Record(BTreeMap<String, Value>),
    Array(Vec<Value>),
    Map(Box<Value>, Box<Value>),
    Object(BTreeMap<String, Value>),
    Method(Box<Value>, BTreeMap<MethodId, Callable>),
    Sum(Vec<Value>),
    Taint(String),
}

/// A dispatchable body. `Func` is a user definition, optionally bound to the
/// class that declared it; `Build` is the synthetic per-class constructor
/// appended by the class builder.
#[derive(Debug, Clone)]
pub enum Callable {
    Func {
        class: Option<String>,
        def: Rc<FuncDef>,
    },
    Build(Rc<ClassDef>),
}

impl Callable {
    pub fn name(&self) -> &str {
        match self {
            Self::Func { def, .. } => &def.name,
            Self::Build(_) => crate::ast::BUILD_METHOD,
        }
    }
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Func { class: c1, def: d1 }, Self::Func { class: c2, def: d2 }) => {
                c1 == c2 && d1.name == d2.name
            }
            (Self::Build(c1), Self::Build(c2)) => c1.name == c2.name,
            _ => false,
        }
    }
}

impl Value {
    pub fn ty(&self) -> Option<Ty> {
        match self {
            Self::Bool(_) => Some(Ty::Bool),
            Self::Int(_) => Some(Ty::Int),
            Self::Float(_) => Some(Ty::Float),
            Self::Str(_) => Some(Ty::String),
            Self::Abstr(t) => Some(*t),
            _ => None,
        }
    }

    pub fn is_int_shaped(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Abstr(Ty::Int))
    }

    pub fn ref_addrs(v: &Value) -> Option<BTreeSet<Addr>> {
        match v {
            Self::Ptr(a) => Some([*a].into_iter().collect()),
            Self::Ref(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// v1 ⊑ v2 in the value order. Pure on values: pointer cells compare by
    /// address set, not by content.
    pub fn le(&self, other: &Value) -> bool {
        if self == other {
            return true;
        }
        match (self, other) {
            (_, Value::Any) => true,
            (Value::Sum(vs), u) => vs.iter().all(|v| v.le(u)),
            (v, Value::Sum(us)) => us.iter().any(|u| v.le(u)),
            (v, Value::Abstr(t)) => v.ty() == Some(*t),
            (Value::Ptr(a), Value::Ref(s)) => s.contains(a),
            (Value::Ref(s1), Value::Ref(s2)) => s1.is_subset(s2),
            (Value::Record(m1), Value::Record(m2)) => {
                m1.iter().all(|(k, v)| m2.get(k).is_some_and(|u| v.le(u)))
            }
            (Value::Map(k1, v1), Value::Map(k2, v2)) => k1.le(k2) && v1.le(v2),
            _ => false,
        }
    }
}

/// Address-indexed store of abstract values. Addresses are allocated
/// monotonically and never reclaimed; reading a missing address behaves as
/// `Null`.
#[derive(Debug, Clone, Default)]
pub struct Heap(pub Vec<Value>);

impl Heap {
    pub fn new() -> Self {
        Self(vec![])
    }

    pub fn alloc(&mut self, v: Value) -> Addr {
        self.0.push(v);
        self.0.len() - 1
    }

    pub fn new_cell(&mut self) -> Addr {
        self.alloc(Value::Null)
    }

    pub fn get(&self, a: Addr) -> Value {
        self.0.get(a).cloned().unwrap_or(Value::Null)
    }

    pub fn set(&mut self, a: Addr, v: Value) {
        if a >= self.0.len() {
            self.0.resize(a + 1, Value::Null);
        }
        self.0[a] = v;
    }

    /// Single indirection step: `Ptr(a)` loads the cell, a `Ref` loads a
    /// representative (all members of a merged set hold the same content),
    /// everything else is returned unchanged.
    pub fn chase(&self, v: &Value) -> Value {
        match v {
            Value::Ptr(a) => self.get(*a),
            Value::Ref(addrs) => match addrs.iter().next() {
                Some(a) => self.get(*a),
                None => Value::Null,
            },
            _ => v.clone(),
        }
    }

    /// Allocate the two-level cell chain a variable resolves through and
    /// return the outer address: `heap[a] = Ptr(b)`, `heap[b] = v`.
    pub fn alloc_chain(&mut self, v: Value) -> Addr {
        let b = self.alloc(v);
        self.alloc(Value::Ptr(b))
    }
}

pub fn unify(heap: &mut Heap, v1: Value, v2: Value) -> Value {
    let mut seen = FxHashSet::default();
    unify_rec(heap, v1, v2, &mut seen)
}

fn unify_rec(heap: &mut Heap, v1: Value, v2: Value, seen: &mut FxHashSet<(Addr, Addr)>) -> Value {
    if let Some(v) = unify_base(heap, &v1, &v2, seen) {
        return v;
    }
    match (v1, v2) {
        (Value::Sum(vs1), Value::Sum(vs2)) => {
            let mut vs = vs1;
            for v in vs2 {
                vs = sum_insert(heap, vs, v, seen);
            }
            Value::Sum(vs)
        }
        (Value::Sum(vs), v) | (v, Value::Sum(vs)) => Value::Sum(sum_insert(heap, vs, v, seen)),
        (v1, v2) => Value::Sum(vec![v1, v2]),
    }
}

/// The non-`Sum` unification rules. `None` means no rule collapses the pair,
/// so the caller folds into a `Sum`.
fn unify_base(
    heap: &mut Heap,
    v1: &Value,
    v2: &Value,
    seen: &mut FxHashSet<(Addr, Addr)>,
) -> Option<Value> {
    if v1 == v2 {
        return Some(v1.clone());
    }
    match (v1, v2) {
        (Value::Any, _) | (_, Value::Any) => Some(Value::Any),
        (l, r) if l.ty().is_some() && l.ty() == r.ty() => Some(Value::Abstr(l.ty().unwrap())),
        (Value::Ptr(_) | Value::Ref(_), Value::Ptr(_) | Value::Ref(_)) => {
            let s1 = Value::ref_addrs(v1).unwrap();
            let s2 = Value::ref_addrs(v2).unwrap();
            let a1 = *s1.iter().next().unwrap();
            let a2 = *s2.iter().next().unwrap();
            if !seen.insert((a1, a2)) {
                return Some(v1.clone());
            }
            let c1 = heap.get(a1);
            let c2 = heap.get(a2);
            let u = unify_rec(heap, c1, c2, seen);
            let union: BTreeSet<Addr> = s1.union(&s2).copied().collect();
            for a in &union {
                heap.set(*a, u.clone());
            }
            if union.len() == 1 {
                Some(Value::Ptr(a1))
            } else {
                Some(Value::Ref(union))
            }
        }
        (Value::Record(m1), Value::Record(m2)) => {
            Some(Value::Record(unify_fields(heap, m1, m2, seen)))
        }
        (Value::Object(m1), Value::Object(m2)) => {
            Some(Value::Object(unify_fields(heap, m1, m2, seen)))
        }
        (Value::Method(r1, m1), Value::Method(r2, m2)) => {
            let recv = unify_rec(heap, (**r1).clone(), (**r2).clone(), seen);
            let mut methods = m1.clone();
            for (id, c) in m2 {
                methods.entry(*id).or_insert_with(|| c.clone());
            }
            Some(Value::Method(Box::new(recv), methods))
        }
        (Value::Map(k1, e1), Value::Map(k2, e2)) => {
            let k = unify_rec(heap, (**k1).clone(), (**k2).clone(), seen);
            let e = unify_rec(heap, (**e1).clone(), (**e2).clone(), seen);
            Some(Value::Map(Box::new(k), Box::new(e)))
        }
        (Value::Array(_), Value::Array(_) | Value::Map(_, _) | Value::Record(_))
        | (Value::Map(_, _) | Value::Record(_), Value::Array(_))
        | (Value::Record(_), Value::Map(_, _))
        | (Value::Map(_, _), Value::Record(_)) => {
            let m1 = promote_to_map(heap, v1.clone(), seen);
            let m2 = promote_to_map(heap, v2.clone(), seen);
            unify_base(heap, &m1, &m2, seen)
        }
        _ => None,
    }
}

fn unify_fields(
    heap: &mut Heap,
    m1: &BTreeMap<String, Value>,
    m2: &BTreeMap<String, Value>,
    seen: &mut FxHashSet<(Addr, Addr)>,
) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    for (k, v1) in m1 {
        let v = match m2.get(k) {
            Some(v2) => unify_rec(heap, v1.clone(), v2.clone(), seen),
            None => unify_cell_with_null(heap, v1.clone(), seen),
        };
        out.insert(k.clone(), v);
    }
    for (k, v2) in m2 {
        if !m1.contains_key(k) {
            out.insert(k.clone(), unify_cell_with_null(heap, v2.clone(), seen));
        }
    }
    out
}

/// A field present on only one side of a merge may also be absent at runtime.
/// The pointer is kept (the field stays addressable) and the value at the end
/// of the chain absorbs `Null`.
fn unify_cell_with_null(heap: &mut Heap, v: Value, seen: &mut FxHashSet<(Addr, Addr)>) -> Value {
    match v {
        Value::Ptr(a) => {
            if !seen.insert((a, a)) {
                return Value::Ptr(a);
            }
            let inner = heap.get(a);
            let u = unify_cell_with_null(heap, inner, seen);
            heap.set(a, u);
            Value::Ptr(a)
        }
        v => unify_rec(heap, v, Value::Null, seen),
    }
}

/// Widening of positional and string-keyed containers into the abstract
/// unbounded map: one summary key, one summary element cell.
pub fn promote_to_map(heap: &mut Heap, v: Value, seen: &mut FxHashSet<(Addr, Addr)>) -> Value {
    match v {
        Value::Array(elems) => {
            let elem = fold_cells(heap, elems, seen);
            let cell = heap.alloc_chain(elem);
            Value::Map(Box::new(Value::Abstr(Ty::Int)), Box::new(Value::Ptr(cell)))
        }
        Value::Record(fields) => {
            let elem = fold_cells(heap, fields.into_values().collect(), seen);
            let cell = heap.alloc_chain(elem);
            Value::Map(
                Box::new(Value::Abstr(Ty::String)),
                Box::new(Value::Ptr(cell)),
            )
        }
        v => v,
    }
}

fn fold_cells(heap: &mut Heap, cells: Vec<Value>, seen: &mut FxHashSet<(Addr, Addr)>) -> Value {
    let mut acc = None;
    for cell in cells {
        let content = content_of(heap, &cell);
        acc = Some(match acc {
            None => content,
            Some(a) => unify_rec(heap, a, content, seen),
        });
    }
    acc.unwrap_or(Value::Null)
}

/// Value at the end of a cell chain, two hops at most.
pub fn content_of(heap: &Heap, v: &Value) -> Value {
    let once = heap.chase(v);
    heap.chase(&once)
}

fn sum_insert(
    heap: &mut Heap,
    mut vs: Vec<Value>,
    v: Value,
    seen: &mut FxHashSet<(Addr, Addr)>,
) -> Vec<Value> {
    for u in vs.iter_mut() {
        if let Some(collapsed) = unify_base(heap, u, &v, seen) {
            *u = collapsed;
            return vs;
        }
    }
    vs.push(v);
    vs
}

#[derive(Clone, Copy)]
pub struct ValuePrinter<'a> {
    pub heap: &'a Heap,
    pub value: &'a Value,
}

impl fmt::Display for ValuePrinter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut seen = FxHashSet::default();
        write_value(f, self.heap, self.value, &mut seen)
    }
}

fn write_value(
    f: &mut fmt::Formatter<'_>,
    heap: &Heap,
    v: &Value,
    seen: &mut FxHashSet<Addr>,
) -> fmt::Result {
    match v {
        Value::Any => write!(f, "any"),
        Value::Null => write!(f, "null"),
        Value::Abstr(t) => write!(f, "{:?}", t),
        Value::Bool(b) => write!(f, "{}", b),
        Value::Int(n) => write!(f, "{}", n),
        Value::Float(x) => write!(f, "{}", x),
        Value::Str(s) => write!(f, "{:?}", s),
        Value::Ptr(a) => {
            if seen.insert(*a) {
                write!(f, "&{}{{", a)?;
                write_value(f, heap, &heap.get(*a), seen)?;
                write!(f, "}}")
            } else {
                write!(f, "&{}{{...}}", a)
            }
        }
        Value::Ref(addrs) => write!(f, "ref{:?}", addrs),
        Value::Record(m) => write_map(f, heap, "record", m, seen),
        Value::Object(m) => write_map(f, heap, "object", m, seen),
        Value::Array(elems) => {
            write!(f, "array[")?;
            for (i, e) in elems.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write_value(f, heap, e, seen)?;
            }
            write!(f, "]")
        }
        Value::Map(k, e) => {
            write!(f, "map(")?;
            write_value(f, heap, k, seen)?;
            write!(f, " => ")?;
            write_value(f, heap, e, seen)?;
            write!(f, ")")
        }
        Value::Method(recv, m) => {
            write!(f, "method(")?;
            write_value(f, heap, recv, seen)?;
            write!(f, ", [")?;
            for (i, c) in m.values().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", c.name())?;
            }
            write!(f, "])")
        }
        Value::Sum(vs) => {
            write!(f, "sum[")?;
            for (i, u) in vs.iter().enumerate() {
                if i > 0 {
                    write!(f, " | ")?;
                }
                write_value(f, heap, u, seen)?;
            }
            write!(f, "]")
        }
        Value::Taint(label) => write!(f, "taint({})", label),
    }
}

fn write_map(
    f: &mut fmt::Formatter<'_>,
    heap: &Heap,
    kind: &str,
    m: &BTreeMap<String, Value>,
    seen: &mut FxHashSet<Addr>,
) -> fmt::Result {
    write!(f, "{}{{", kind)?;
    for (i, (k, v)) in m.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}: ", k)?;
        write_value(f, heap, v, seen)?;
    }
    write!(f, "}}")
}

pub fn show(heap: &Heap, v: &Value) -> String {
    ValuePrinter { heap, value: v }.to_string()
}

/// Every address mentioned by `v` must exist in the heap.
pub fn addrs_valid(heap: &Heap, v: &Value) -> bool {
    let mut seen = FxHashSet::default();
    addrs_valid_rec(heap, v, &mut seen)
}

fn addrs_valid_rec(heap: &Heap, v: &Value, seen: &mut FxHashSet<Addr>) -> bool {
    match v {
        Value::Ptr(a) => {
            *a < heap.0.len() && (!seen.insert(*a) || addrs_valid_rec(heap, &heap.get(*a), seen))
        }
        Value::Ref(addrs) => addrs.iter().all(|a| {
            *a < heap.0.len() && (!seen.insert(*a) || addrs_valid_rec(heap, &heap.get(*a), seen))
        }),
        Value::Record(m) | Value::Object(m) => m.values().all(|v| addrs_valid_rec(heap, v, seen)),
        Value::Array(elems) => elems.iter().all(|v| addrs_valid_rec(heap, v, seen)),
        Value::Map(k, e) => addrs_valid_rec(heap, k, seen) && addrs_valid_rec(heap, e, seen),
        Value::Method(recv, _) => addrs_valid_rec(heap, recv, seen),
        Value::Sum(vs) => vs.iter().all(|v| addrs_valid_rec(heap, v, seen)),
        _ => true,
    }
}
