//! Top-level manifest loading (spec §4.3 "entry point"): wires together a
//! fresh `Graph`, a root `Environment` carrying the builtin `phony` rule,
//! and the parser, producing a `State` ready for an executor to walk.

use crate::defaults::DefaultTargets;
use crate::env::Environment;
use crate::graph::{Graph, Rule};
use crate::parse::{self, ParseState};
use anyhow::Context;
use std::path::Path;

pub use parse::Options;

/// Everything a manifest parse produced: the graph itself and the set of
/// targets to build absent an explicit request.
pub struct State {
    pub graph: Graph,
    pub defaults: DefaultTargets,
}

/// Parse `build_filename` (and anything it `include`s/`subninja`s) into a
/// fresh graph.
pub fn read(build_filename: &str, opts: Options) -> anyhow::Result<State> {
    crate::trace::scope("load::read", || {
        let mut graph = Graph::default();
        let root = Environment::root();
        // `phony` is builtin: every manifest may reference it without
        // declaring it, and it requires no `command` (see DESIGN.md).
        root.add_rule(Rule::new("phony".to_string()))?;

        let mut state = ParseState::new(&mut graph, opts);
        parse::parse_file(Path::new(build_filename), root, &mut state)
            .with_context(|| format!("loading {}", build_filename))?;
        let defaults = state.defaults;

        Ok(State { graph, defaults })
    })
}
