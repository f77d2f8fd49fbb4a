//! Scoped variable bindings and rule tables (spec §4.1).
//!
//! `include` reuses the parent `Environment`; `subninja` and every `build`
//! edge get a fresh child whose parent chain reaches back to the root. Arena
//! ownership is via `Rc` rather than indices into a single arena — the
//! parent chain is a tree that outlives any one edge, and `Rc` keeps the
//! single-threaded core (spec §5) free of the lifetime parameters the
//! teacher's parallel `Scope` needed to fence off data races.

use crate::eval::{Env, EvalString};
use crate::graph::Rule;
use anyhow::bail;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub struct Environment {
    parent: Option<Rc<Environment>>,
    vars: RefCell<HashMap<String, String>>,
    rules: RefCell<HashMap<String, Rc<Rule>>>,
}

impl Environment {
    pub fn root() -> Rc<Environment> {
        mkenv(None)
    }

    /// Bind `name` to an already-evaluated string in this scope, overwriting
    /// any prior binding at the same scope (parent bindings are shadowed,
    /// never mutated).
    pub fn add_var(&self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.borrow_mut().insert(name.into(), value.into());
    }

    /// Look up a binding declared directly in *this* scope, without walking
    /// to the parent. Used for attribute-style lookups (`pool`, `depfile`,
    /// ...) that should see only what a build's own block set, not an
    /// unrelated same-named variable somewhere up the chain.
    pub fn local_var(&self, name: &str) -> Option<String> {
        self.vars.borrow().get(name).cloned()
    }

    /// Walk the parent chain; absent is never an error, it's the empty
    /// string (a command referencing an unset variable is common and legal).
    pub fn var(&self, name: &str) -> String {
        if let Some(v) = self.vars.borrow().get(name) {
            return v.clone();
        }
        match &self.parent {
            Some(p) => p.var(name),
            None => String::new(),
        }
    }

    /// Fatal if a rule of the same name is already registered at *this*
    /// scope. Shadowing a parent's rule of the same name is allowed.
    pub fn add_rule(&self, rule: Rule) -> anyhow::Result<()> {
        let mut rules = self.rules.borrow_mut();
        if rules.contains_key(&rule.name) {
            bail!("duplicate rule '{}'", rule.name);
        }
        rules.insert(rule.name.clone(), Rc::new(rule));
        Ok(())
    }

    pub fn rule(&self, name: &str) -> Option<Rc<Rule>> {
        if let Some(r) = self.rules.borrow().get(name) {
            return Some(r.clone());
        }
        self.parent.as_ref().and_then(|p| p.rule(name))
    }

    /// Expand an eval-string against this environment.
    pub fn eval(&self, es: &EvalString) -> String {
        es.evaluate(self)
    }
}

impl Env for Environment {
    fn get_var(&self, name: &str) -> String {
        self.var(name)
    }
}

pub fn mkenv(parent: Option<Rc<Environment>>) -> Rc<Environment> {
    Rc::new(Environment {
        parent,
        vars: RefCell::new(HashMap::new()),
        rules: RefCell::new(HashMap::new()),
    })
}
