//! End-to-end manifest scenarios, driven through the public API the way an
//! embedder (not just the CLI) would use it: write a manifest to disk, load
//! it, and inspect the resulting graph.

use ninjacore::graph::MTime;
use ninjacore::load::{self, Options};
use std::io::Write;

fn manifest(dir: &tempfile::TempDir, content: &str) -> String {
    let path = dir.path().join("build.ninja");
    std::fs::File::create(&path)
        .unwrap()
        .write_all(content.as_bytes())
        .unwrap();
    path.to_str().unwrap().to_string()
}

#[test]
fn simple_rule_and_edge() {
    let dir = tempfile::tempdir().unwrap();
    let path = manifest(&dir, "rule cc\n  command = cc -c $in -o $out\nbuild a.o: cc a.c\n");
    let mut state = load::read(&path, Options::default()).unwrap();

    assert_eq!(state.graph.num_edges(), 1);
    let (id, edge) = state.graph.all_edges().next().unwrap();
    assert_eq!(edge.outs.len(), 1);
    assert_eq!(edge.ins.len(), 1);
    assert_eq!(edge.outimpidx, 1);
    assert_eq!(edge.inimpidx, 1);
    assert_eq!(edge.inorderidx, 1);
    let hash = ninjacore::edgehash::edgehash(&mut state.graph, id).unwrap();
    assert_eq!(hash, ninjacore::hash::murmur_hash64a(b"cc -c a.c -o a.o"));
}

#[test]
fn implicit_and_order_only_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let path = manifest(&dir, "rule r\n  command = x\nbuild o: r a | b || c\n");
    let state = load::read(&path, Options::default()).unwrap();

    let (_, edge) = state.graph.all_edges().next().unwrap();
    assert_eq!(edge.ins.len(), 3);
    assert_eq!(edge.inimpidx, 1);
    assert_eq!(edge.inorderidx, 2);
}

#[test]
fn default_targets_and_roots() {
    let dir = tempfile::tempdir().unwrap();
    let path = manifest(&dir, "rule r\n  command = x\nbuild x: r\nbuild y: r\n");
    let state = load::read(&path, Options::default()).unwrap();

    assert!(state.defaults.is_empty());
    let mut seen = Vec::new();
    state
        .defaults
        .defaultnodes(&state.graph, |id| seen.push(state.graph.node(id).path.clone()));
    seen.sort();
    assert_eq!(seen, vec!["x".to_string(), "y".to_string()]);

    let path = manifest(
        &dir,
        "rule r\n  command = x\nbuild x: r\nbuild y: r\ndefault x\n",
    );
    let state = load::read(&path, Options::default()).unwrap();
    let mut seen = Vec::new();
    state
        .defaults
        .defaultnodes(&state.graph, |id| seen.push(state.graph.node(id).path.clone()));
    assert_eq!(seen, vec!["x".to_string()]);
}

#[test]
fn duplicate_output_fatal_unless_configured() {
    let dir = tempfile::tempdir().unwrap();
    let path = manifest(&dir, "rule r\n  command = x\nbuild a: r\nbuild a: r\n");

    assert!(load::read(&path, Options::default()).is_err());

    let state = load::read(
        &path,
        Options {
            dupbuildwarn: true,
        },
    )
    .unwrap();
    assert_eq!(state.graph.num_edges(), 2);
    let total_outs: usize = state.graph.all_edges().map(|(_, e)| e.outs.len()).sum();
    assert_eq!(total_outs, 1);
}

#[test]
fn subninja_scoping_differs_from_include() {
    let dir = tempfile::tempdir().unwrap();
    let child_path = dir.path().join("child.ninja");
    std::fs::File::create(&child_path)
        .unwrap()
        .write_all(b"rule r\n  command = child\n")
        .unwrap();

    let parent = manifest(
        &dir,
        &format!(
            "rule r\n  command = parent\nsubninja {}\nbuild out: r\n",
            child_path.display()
        ),
    );
    let mut state = load::read(&parent, Options::default()).unwrap();
    let (id, _) = state.graph.all_edges().next().unwrap();
    let hash = ninjacore::edgehash::edgehash(&mut state.graph, id).unwrap();
    assert_eq!(hash, ninjacore::hash::murmur_hash64a(b"parent"));
}

#[test]
fn shell_escaping() {
    let dir = tempfile::tempdir().unwrap();
    let path = manifest(
        &dir,
        "rule r\n  command = x\nbuild it's$ a$ file: r\nbuild a_b-1.2/x: r\n",
    );
    let mut state = load::read(&path, Options::default()).unwrap();
    let id = state.graph.nodeget("it's a file").unwrap();
    assert_eq!(state.graph.nodepath(id, true), "'it'\\''s a file'");
    let id2 = state.graph.nodeget("a_b-1.2/x").unwrap();
    assert_eq!(state.graph.nodepath(id2, true), "a_b-1.2/x");
}

#[test]
fn nodestat_reports_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = manifest(&dir, "rule r\n  command = x\nbuild out: r\n");
    let mut state = load::read(&path, Options::default()).unwrap();
    let id = state.graph.nodeget("out").unwrap();
    assert_eq!(state.graph.nodestat(id).unwrap(), MTime::Missing);
}
