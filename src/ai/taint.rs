use log::debug;
use rustc_hash::FxHashSet;
use serde::Serialize;

use crate::ai::domains::{Addr, Heap, Ty, Value};

pub const SOURCE_GLOBALS: [&str; 3] = ["$_POST", "$_GET", "$_REQUEST"];
pub const SINK_NAME: &str = "render";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaintFinding {
    pub sink: String,
    pub file: String,
    pub fun: String,
    pub label: String,
}

/// Injection points the evaluator consults. The default methods are the
/// taint-free folding rules, so a hook that overrides nothing is an exact
/// no-op policy.
pub trait TaintHook {
    /// Value materialized for a request-like global in l-value position.
    fn source_value(&self, _heap: &mut Heap, _name: &str) -> Option<Value> {
        None
    }

    fn concat(&self, _heap: &Heap, l: &Value, r: &Value) -> Value {
        concat_untainted(l, r)
    }

    fn fold_slist(&self, _heap: &Heap, parts: &[Value]) -> Value {
        fold_untainted(parts)
    }

    /// Summary returned for a call whose target is not in the database.
    fn unknown_call_summary(&self, _heap: &Heap, _args: &[Value]) -> Value {
        Value::Any
    }

    fn check_danger(
        &self,
        _heap: &Heap,
        _sink: &str,
        _file: &str,
        _fun: &str,
        _vals: &[Value],
        _out: &mut Vec<TaintFinding>,
    ) {
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NoTaint;

impl TaintHook for NoTaint {}

/// Default policy: the well-known request globals are sources, `render` is a
/// sink, and labels flow through concatenation, interpolation, and unknown
/// calls.
#[derive(Debug, Clone, Copy)]
pub struct HttpTaint;

impl TaintHook for HttpTaint {
    fn source_value(&self, heap: &mut Heap, name: &str) -> Option<Value> {
        if !SOURCE_GLOBALS.contains(&name) {
            return None;
        }
        let elem = heap.alloc_chain(Value::Taint(name.to_string()));
        Some(Value::Map(
            Box::new(Value::Taint(name.to_string())),
            Box::new(Value::Ptr(elem)),
        ))
    }

    fn concat(&self, heap: &Heap, l: &Value, r: &Value) -> Value {
        if let Some(label) = find_taint(heap, l).or_else(|| find_taint(heap, r)) {
            return Value::Taint(label);
        }
        concat_untainted(l, r)
    }

    fn fold_slist(&self, heap: &Heap, parts: &[Value]) -> Value {
        for part in parts {
            if let Some(label) = find_taint(heap, part) {
                return Value::Taint(label);
            }
        }
        fold_untainted(parts)
    }

    fn unknown_call_summary(&self, heap: &Heap, args: &[Value]) -> Value {
        for arg in args {
            if let Some(label) = find_taint(heap, arg) {
                return Value::Taint(label);
            }
        }
        Value::Any
    }

    fn check_danger(
        &self,
        heap: &Heap,
        sink: &str,
        file: &str,
        fun: &str,
        vals: &[Value],
        out: &mut Vec<TaintFinding>,
    ) {
        let mut seen = FxHashSet::default();
        for v in vals {
            if let Some(label) = find_taint(heap, v) {
                if !seen.insert(label.clone()) {
                    continue;
                }
                debug!("taint reaches sink {} in {} via {}", sink, fun, label);
                out.push(TaintFinding {
                    sink: sink.to_string(),
                    file: file.to_string(),
                    fun: fun.to_string(),
                    label,
                });
            }
        }
    }
}

fn concat_untainted(l: &Value, r: &Value) -> Value {
    match (l, r) {
        (Value::Str(a), Value::Str(b)) => Value::Str(format!("{}{}", a, b)),
        _ => Value::Abstr(Ty::String),
    }
}

fn fold_untainted(parts: &[Value]) -> Value {
    let mut out = String::new();
    for part in parts {
        match part {
            Value::Str(s) => out.push_str(s),
            Value::Int(n) => out.push_str(&n.to_string()),
            Value::Bool(b) => out.push_str(&b.to_string()),
            Value::Null => {}
            _ => return Value::Abstr(Ty::String),
        }
    }
    Value::Str(out)
}

/// First taint label reachable from `v`, chasing indirection with a visited
/// set so cyclic heaps terminate.
pub fn find_taint(heap: &Heap, v: &Value) -> Option<String> {
    let mut seen = FxHashSet::default();
    find_taint_rec(heap, v, &mut seen)
}

pub fn is_clean(heap: &Heap, v: &Value) -> bool {
    find_taint(heap, v).is_none()
}

fn find_taint_rec(heap: &Heap, v: &Value, seen: &mut FxHashSet<Addr>) -> Option<String> {
    match v {
        Value::Taint(label) => Some(label.clone()),
        Value::Ptr(a) => {
            if seen.insert(*a) {
                find_taint_rec(heap, &heap.get(*a), seen)
            } else {
                None
            }
        }
        Value::Ref(addrs) => addrs.iter().find_map(|a| {
            if seen.insert(*a) {
                find_taint_rec(heap, &heap.get(*a), seen)
            } else {
                None
            }
        }),
        Value::Record(m) | Value::Object(m) => {
            m.values().find_map(|v| find_taint_rec(heap, v, seen))
        }
        Value::Array(elems) => elems.iter().find_map(|v| find_taint_rec(heap, v, seen)),
        Value::Map(k, e) => {
            find_taint_rec(heap, k, seen).or_else(|| find_taint_rec(heap, e, seen))
        }
        Value::Method(recv, _) => find_taint_rec(heap, recv, seen),
        Value::Sum(vs) => vs.iter().find_map(|v| find_taint_rec(heap, v, seen)),
        _ => None,
    }
}
