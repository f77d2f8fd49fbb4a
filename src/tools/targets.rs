//! `-t targets`: inspect the graph without building anything. Three modes,
//! selected by the first argument (default `depth`):
//!   - `depth [N]`: a tree of files starting from the DAG roots, to depth
//!     `N` (default 1, <= 0 means unlimited).
//!   - `rule [NAME]`: with a rule name, every file that rule produces; with
//!     none, every source file (a file that is some edge's input but no
//!     edge's output).
//!   - `all`: every produced file and the rule that produces it.

use crate::graph::{FileId, Graph};
use crate::load;
use anyhow::bail;
use std::collections::BTreeSet;

pub fn tool_targets(build_file: &str, args: &[String]) -> anyhow::Result<i32> {
    let state = load::read(build_file, load::Options::default())?;
    match args.first().map(|s| s.as_str()) {
        Some("rule") => match args.len() {
            1 => {
                let mut sources = BTreeSet::new();
                for (_, edge) in state.graph.all_edges() {
                    for &id in &edge.ins {
                        if state.graph.node(id).gen.is_none() {
                            sources.insert(state.graph.node(id).path.clone());
                        }
                    }
                }
                for path in sources {
                    println!("{}", path);
                }
            }
            2 => {
                let rule = &args[1];
                let mut outputs = BTreeSet::new();
                for (_, edge) in state.graph.all_edges() {
                    if &edge.rule.name == rule {
                        for &id in &edge.outs {
                            outputs.insert(state.graph.node(id).path.clone());
                        }
                    }
                }
                for path in outputs {
                    println!("{}", path);
                }
            }
            _ => bail!("too many arguments to targets tool"),
        },
        Some("depth") | None => {
            let max_depth = match args.len() {
                0 | 1 => 1,
                2 => args[1].parse::<i32>()?,
                _ => bail!("too many arguments to targets tool"),
            };
            let mut roots: Vec<FileId> = Vec::new();
            for (id, node) in state.graph.all_nodes() {
                if node.gen.is_some() && node.uses.is_empty() {
                    roots.push(id);
                }
            }
            print_files_recursively(&state.graph, &roots, 0, max_depth);
        }
        Some("all") => {
            if args.len() > 1 {
                bail!("too many arguments to targets tool");
            }
            for (_, edge) in state.graph.all_edges() {
                for &id in &edge.outs {
                    println!("{}: {}", state.graph.node(id).path, edge.rule.name);
                }
            }
        }
        Some(mode) => bail!(
            "unknown target tool mode {:?}, valid modes are \"rule\", \"depth\", or \"all\"",
            mode
        ),
    }
    Ok(0)
}

fn print_files_recursively(graph: &Graph, files: &[FileId], depth: i32, max_depth: i32) {
    for &id in files {
        for _ in 0..depth {
            print!("  ");
        }
        let node = graph.node(id);
        match node.gen {
            Some(edge_id) => {
                let edge = graph.edge(edge_id);
                println!("{}: {}", node.path, edge.rule.name);
                if max_depth <= 0 || depth < max_depth - 1 {
                    print_files_recursively(graph, &edge.ins, depth + 1, max_depth);
                }
            }
            None => println!("{}", node.path),
        }
    }
}
