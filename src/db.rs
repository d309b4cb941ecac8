use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::ast::{ClassDef, Expr, FuncDef, Stmt};

/// Name-indexed lookups for the definitions of the program under analysis.
/// Filled once before interpretation starts; the interpreter only reads it.
#[derive(Debug, Default)]
pub struct CodeDb {
    funs: FxHashMap<String, Rc<FuncDef>>,
    classes: FxHashMap<String, Rc<ClassDef>>,
    constants: FxHashMap<String, Expr>,
}

impl CodeDb {
    pub fn build(stmts: &[Stmt]) -> Self {
        let mut db = Self::default();
        for stmt in stmts {
            match stmt {
                Stmt::FuncDef(f) => {
                    db.funs.insert(f.name.clone(), f.clone());
                }
                Stmt::ClassDef(c) => {
                    db.classes.insert(c.name.clone(), c.clone());
                }
                Stmt::ConstDef(name, e) => {
                    db.constants.insert(name.clone(), e.clone());
                }
                _ => {}
            }
        }
        db
    }

    pub fn fun(&self, name: &str) -> Option<&Rc<FuncDef>> {
        self.funs.get(name)
    }

    pub fn class(&self, name: &str) -> Option<&Rc<ClassDef>> {
        self.classes.get(name)
    }

    pub fn constant(&self, name: &str) -> Option<&Expr> {
        self.constants.get(name)
    }

    pub fn fun_names(&self) -> impl Iterator<Item = &String> {
        self.funs.keys()
    }

    pub fn class_names(&self) -> impl Iterator<Item = &String> {
        self.classes.keys()
    }
}
