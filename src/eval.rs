//! Deferred templates: eval-strings are a sequence of literal and
//! variable-reference segments, retained unexpanded until evaluation time.

/// One piece of an unexpanded template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalPart {
    Literal(String),
    VarRef(String),
}

/// An unexpanded template: `cc -c $in -o $out` becomes
/// `[Literal("cc -c "), VarRef("in"), Literal(" -o "), VarRef("out")]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvalString(Vec<EvalPart>);

impl EvalString {
    pub fn new(parts: Vec<EvalPart>) -> Self {
        EvalString(parts)
    }

    pub fn parts(&self) -> &[EvalPart] {
        &self.0
    }

    /// Fold over the sequence, resolving each `VarRef` against `env`.
    pub fn evaluate(&self, env: &dyn Env) -> String {
        let mut val = String::new();
        for part in &self.0 {
            match part {
                EvalPart::Literal(s) => val.push_str(s),
                EvalPart::VarRef(name) => val.push_str(&env.get_var(name)),
            }
        }
        val
    }
}

/// A variable-lookup environment: anything an `EvalString` can resolve
/// `VarRef`s against. Absence of a binding is never an error — it expands to
/// the empty string (spec §4.1 `envvar`).
pub trait Env {
    fn get_var(&self, name: &str) -> String;
}
