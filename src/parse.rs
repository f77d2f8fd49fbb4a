//! Translates scanner tokens into graph mutations within an environment
//! (spec §4.3): registers rules and pools, creates nodes and edges,
//! resolves `include`/`subninja` scoping, and accumulates default targets.

use crate::canon::canon_path;
use crate::defaults::DefaultTargets;
use crate::env::{mkenv, Environment};
use crate::eval::EvalString;
use crate::graph::{EdgeId, FileId, Graph, Rule};
use crate::scanner::{Keyword, ScanResult, Scanner, SEP_IMPLICIT, SEP_ORDERONLY};
use anyhow::{anyhow, bail, Context};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Parser-level configuration (spec §6 "Configuration (parser)").
#[derive(Debug, Clone, Copy)]
pub struct Options {
    /// When true, a duplicate build output is a warning and the later
    /// edge's output is dropped. When false (the default), it's fatal.
    /// The name reads backwards from ninja's own flag, but that's the
    /// observed behavior this spec preserves (see DESIGN.md).
    pub dupbuildwarn: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            dupbuildwarn: false,
        }
    }
}

/// `(major, minor)` this implementation declares itself compatible with.
pub const DECLARED_VERSION: (u32, u32) = (1, 10);

/// Owns the mutable state threaded through one manifest parse: the graph
/// being built, the phony rule shared by every synthesized edge, default
/// targets, and parser options.
pub struct ParseState<'g> {
    pub graph: &'g mut Graph,
    pub defaults: DefaultTargets,
    pub opts: Options,
    pub phony_rule: Rc<Rule>,
}

impl<'g> ParseState<'g> {
    pub fn new(graph: &'g mut Graph, opts: Options) -> Self {
        ParseState {
            graph,
            defaults: DefaultTargets::default(),
            opts,
            phony_rule: Rc::new(Rule::new("phony".to_string())),
        }
    }
}

/// Parse `path` into `env`'s scope, mutating `state.graph`/`state.defaults`.
/// `include` callers pass the same `env` back in; `subninja` callers pass a
/// fresh child.
pub fn parse_file(path: &Path, env: Rc<Environment>, state: &mut ParseState) -> anyhow::Result<()> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("reading manifest {}", path.display()))?;
    let filename = Rc::new(path.to_path_buf());
    parse_bytes(&bytes, filename, env, state)
}

fn parse_bytes(
    bytes: &[u8],
    filename: Rc<PathBuf>,
    env: Rc<Environment>,
    state: &mut ParseState,
) -> anyhow::Result<()> {
    let mut scanner = Scanner::new(bytes);
    loop {
        let kw = to_anyhow(&filename, scanner_peek_keyword(&mut scanner))?;
        match kw {
            Keyword::Eof => return Ok(()),
            Keyword::Rule => parse_rule(&mut scanner, &filename, &env)?,
            Keyword::Build => parse_build(&mut scanner, &filename, &env, state)?,
            Keyword::Default => parse_default(&mut scanner, &filename, &env, state)?,
            Keyword::Pool => parse_pool(&mut scanner, &filename, &env, state)?,
            Keyword::Include => {
                let path = parse_single_path_stmt(&mut scanner, &filename, &env)?;
                parse_file(Path::new(&path), env.clone(), state)
                    .with_context(|| format!("{}: include {}", filename.display(), path))?;
            }
            Keyword::Subninja => {
                let path = parse_single_path_stmt(&mut scanner, &filename, &env)?;
                let child = mkenv(Some(env.clone()));
                parse_file(Path::new(&path), child, state)
                    .with_context(|| format!("{}: subninja {}", filename.display(), path))?;
            }
            Keyword::Variable(name) => {
                scanner.skip_spaces();
                to_anyhow(&filename, scanner.expect(b'='))?;
                scanner.skip_spaces();
                let es = to_anyhow(&filename, scanner.scan_eval_to_newline())?;
                let value = env.eval(&es);
                if name == "ninja_required_version" {
                    check_required_version(&value)
                        .with_context(|| format!("{}:{}", filename.display(), scanner.line()))?;
                }
                env.add_var(name, value);
            }
        }
    }
}

fn scanner_peek_keyword(scanner: &mut Scanner) -> ScanResult<Keyword> {
    scanner.scan_keyword()
}

fn to_anyhow<T>(filename: &Path, r: ScanResult<T>) -> anyhow::Result<T> {
    r.map_err(|e| anyhow!("{}:{}:{}: {}", filename.display(), e.line, e.col, e.msg))
}

fn check_required_version(value: &str) -> anyhow::Result<()> {
    let mut parts = value.splitn(2, '.');
    let major: u32 = parts
        .next()
        .unwrap_or("")
        .parse()
        .map_err(|_| anyhow!("invalid ninja_required_version {:?}", value))?;
    let minor: u32 = match parts.next() {
        Some(m) => m
            .parse()
            .map_err(|_| anyhow!("invalid ninja_required_version {:?}", value))?,
        None => 0,
    };
    if (major, minor) > DECLARED_VERSION {
        bail!(
            "manifest requires version {}.{}, this implementation supports up to {}.{}",
            major,
            minor,
            DECLARED_VERSION.0,
            DECLARED_VERSION.1
        );
    }
    Ok(())
}

/// `include path` / `subninja path`: a single eval-string path, to end of
/// line.
fn parse_single_path_stmt(
    scanner: &mut Scanner,
    filename: &Path,
    env: &Environment,
) -> anyhow::Result<String> {
    scanner.skip_spaces();
    let es = to_anyhow(filename, scanner.scan_eval_to_newline())?;
    canon_path_checked(filename, scanner.line(), env.eval(&es))
}

/// Canonicalize `raw` and reject the empty string it is fatal per spec §7
/// Internal error #5 (`canon_path(".")`, `canon_path("./")`, etc. all
/// collapse to `""`, which is not a usable node identity).
fn canon_path_checked(filename: &Path, line: usize, raw: String) -> anyhow::Result<String> {
    let path = canon_path(raw);
    if path.is_empty() {
        bail!(
            "{}:{}: path canonicalizes to the empty string",
            filename.display(),
            line
        );
    }
    Ok(path)
}

fn parse_rule(scanner: &mut Scanner, filename: &Path, env: &Rc<Environment>) -> anyhow::Result<()> {
    let name = to_anyhow(filename, scanner.scan_ident())?;
    to_anyhow(filename, scanner.expect_newline())?;
    let mut rule = Rule::new(name);
    while scanner.scan_indent() {
        let var_name = to_anyhow(filename, scanner.scan_ident())?;
        scanner.skip_spaces();
        to_anyhow(filename, scanner.expect(b'='))?;
        scanner.skip_spaces();
        let es: EvalString = to_anyhow(filename, scanner.scan_eval_to_newline())?;
        rule.add_var(var_name, es);
    }
    rule.validate()
        .with_context(|| format!("{}:{}", filename.display(), scanner.line()))?;
    env.add_rule(rule)
        .with_context(|| format!("{}:{}", filename.display(), scanner.line()))?;
    Ok(())
}

fn parse_pool(
    scanner: &mut Scanner,
    filename: &Path,
    env: &Rc<Environment>,
    state: &mut ParseState,
) -> anyhow::Result<()> {
    let name = to_anyhow(filename, scanner.scan_ident())?;
    to_anyhow(filename, scanner.expect_newline())?;
    let mut depth: Option<usize> = None;
    while scanner.scan_indent() {
        let var_name = to_anyhow(filename, scanner.scan_ident())?;
        scanner.skip_spaces();
        to_anyhow(filename, scanner.expect(b'='))?;
        scanner.skip_spaces();
        let es = to_anyhow(filename, scanner.scan_eval_to_newline())?;
        if var_name != "depth" {
            bail!(
                "{}:{}: pool '{}' has unknown binding '{}', only 'depth' is allowed",
                filename.display(),
                scanner.line(),
                name,
                var_name
            );
        }
        let text = env.eval(&es);
        let n: usize = text
            .parse()
            .map_err(|_| anyhow!("pool '{}': invalid depth {:?}", name, text))?;
        if n == 0 {
            bail!("pool '{}': depth must be positive", name);
        }
        depth = Some(n);
    }
    let depth = depth.ok_or_else(|| anyhow!("pool '{}' is missing required 'depth'", name))?;
    state.graph.add_pool(name, depth)
}

fn parse_default(
    scanner: &mut Scanner,
    filename: &Path,
    env: &Rc<Environment>,
    state: &mut ParseState,
) -> anyhow::Result<()> {
    scanner.skip_spaces();
    let mut any = false;
    loop {
        let path_es = to_anyhow(filename, scanner.scan_path())?;
        let path_es = match path_es {
            Some(p) => p,
            None => break,
        };
        any = true;
        let path = canon_path_checked(filename, scanner.line(), env.eval(&path_es))?;
        let id = state
            .graph
            .nodeget(&path)
            .ok_or_else(|| anyhow!("unknown default target {:?}", path))?;
        state.defaults.push(id);
    }
    if !any {
        bail!(
            "{}:{}: 'default' requires at least one target",
            filename.display(),
            scanner.line()
        );
    }
    to_anyhow(filename, scanner.expect_newline())
}

/// `build out... [| out...]: rule in... [| in...] [|| in...]`
fn parse_build(
    scanner: &mut Scanner,
    filename: &Path,
    env: &Rc<Environment>,
    state: &mut ParseState,
) -> anyhow::Result<()> {
    let line = scanner.line();
    let mut out_paths = read_paths(scanner, filename)?;
    let out_explicit = out_paths.len();
    if scanner.scan_pipe(SEP_IMPLICIT) == SEP_IMPLICIT {
        out_paths.extend(read_paths(scanner, filename)?);
    }
    if out_paths.is_empty() {
        bail!("{}:{}: build edge has no outputs", filename.display(), line);
    }
    scanner.skip_spaces();
    to_anyhow(filename, scanner.expect(b':'))?;
    scanner.skip_spaces();
    let rule_name = to_anyhow(filename, scanner.scan_ident())?;
    let rule = env
        .rule(&rule_name)
        .ok_or_else(|| anyhow!("{}:{}: unknown rule {:?}", filename.display(), line, rule_name))?;

    let mut in_paths = read_paths(scanner, filename)?;
    let in_explicit = in_paths.len();
    if scanner.scan_pipe(SEP_IMPLICIT) == SEP_IMPLICIT {
        in_paths.extend(read_paths(scanner, filename)?);
    }
    let in_order_boundary = in_paths.len();
    if scanner.scan_pipe(SEP_ORDERONLY) == SEP_ORDERONLY {
        in_paths.extend(read_paths(scanner, filename)?);
    }
    to_anyhow(filename, scanner.expect_newline())?;

    // Resolve output/input node ids against the *enclosing* scope — a
    // build's own local vars (read below) must not feed back into which
    // files it names.
    let mut out_ids: Vec<FileId> = out_paths
        .iter()
        .map(|es| -> anyhow::Result<FileId> {
            let path = canon_path_checked(filename, line, env.eval(es))?;
            Ok(state.graph.mknode(path))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let edge_env = mkenv(Some(env.clone()));
    let edge_id: EdgeId = state.graph.mkedge(rule, edge_env.clone(), filename.to_path_buf().into(), line);

    // Claim outputs, applying the duplicate-output policy and the exact
    // index bookkeeping spec §9 calls out: outimpidx only decrements when
    // the skipped index was strictly below it.
    let mut outimpidx = out_explicit;
    let mut keep = Vec::with_capacity(out_ids.len());
    let mut kept_so_far = 0usize;
    for &id in out_ids.iter() {
        if state.graph.claim_output(id, edge_id, state.opts.dupbuildwarn)? {
            keep.push(id);
            kept_so_far += 1;
        } else if kept_so_far < outimpidx {
            outimpidx -= 1;
        }
    }
    out_ids = keep;

    let in_ids: Vec<FileId> = in_paths
        .iter()
        .map(|es| -> anyhow::Result<FileId> {
            let path = canon_path_checked(filename, line, env.eval(es))?;
            Ok(state.graph.mknode(path))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    for &id in &in_ids {
        state.graph.nodeuse(id, edge_id);
    }

    {
        let edge = state.graph.edge_mut(edge_id);
        edge.outs = out_ids;
        edge.outimpidx = outimpidx;
        edge.ins = in_ids;
        edge.inimpidx = in_explicit;
        edge.inorderidx = in_order_boundary;
    }

    // Populate $in/$out (and the newline-joined variants) before reading
    // the block, so a local var can reference them.
    {
        let edge = state.graph.edge(edge_id);
        let explicit_outs: Vec<String> = edge
            .explicit_outs()
            .iter()
            .map(|&id| state.graph.node(id).path.clone())
            .collect();
        let explicit_ins: Vec<String> = edge
            .explicit_ins()
            .iter()
            .map(|&id| state.graph.node(id).path.clone())
            .collect();
        edge_env.add_var("out", explicit_outs.join(" "));
        edge_env.add_var("out_newline", explicit_outs.join("\n"));
        edge_env.add_var("in", explicit_ins.join(" "));
        edge_env.add_var("in_newline", explicit_ins.join("\n"));
    }

    while scanner.scan_indent() {
        let var_name = to_anyhow(filename, scanner.scan_ident())?;
        scanner.skip_spaces();
        to_anyhow(filename, scanner.expect(b'='))?;
        scanner.skip_spaces();
        let es = to_anyhow(filename, scanner.scan_eval_to_newline())?;
        let value = edge_env.eval(&es);
        edge_env.add_var(var_name, value);
    }

    if let Some(pool_name) = state.graph.edge(edge_id).binding("pool") {
        if !pool_name.is_empty() {
            let pool = state
                .graph
                .get_pool(&pool_name)
                .ok_or_else(|| anyhow!("unknown pool {:?}", pool_name))?;
            state.graph.edge_mut(edge_id).pool = Some(pool);
        }
    }

    Ok(())
}

fn read_paths(scanner: &mut Scanner, filename: &Path) -> anyhow::Result<Vec<EvalString>> {
    let mut paths = Vec::new();
    loop {
        match to_anyhow(filename, scanner.scan_path())? {
            Some(p) => paths.push(p),
            None => return Ok(paths),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use std::io::Write;

    fn write_manifest(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn simple_rule_and_edge() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(
            &dir,
            "build.ninja",
            "rule cc\n  command = cc -c $in -o $out\nbuild a.o: cc a.c\n",
        );
        let mut graph = Graph::default();
        let mut state = ParseState::new(&mut graph, Options::default());
        let root = Environment::root();
        parse_file(&path, root.clone(), &mut state).unwrap();

        assert_eq!(state.graph.num_edges(), 1);
        let (id, edge) = state.graph.all_edges().next().unwrap();
        assert_eq!(edge.outs.len(), 1);
        assert_eq!(edge.ins.len(), 1);
        assert_eq!(edge.outimpidx, 1);
        assert_eq!(edge.inimpidx, 1);
        assert_eq!(edge.inorderidx, 1);
        let hash = crate::edgehash::edgehash(state.graph, id).unwrap();
        assert_eq!(
            hash,
            crate::hash::murmur_hash64a(b"cc -c a.c -o a.o")
        );
    }

    #[test]
    fn implicit_and_order_only_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(
            &dir,
            "build.ninja",
            "rule r\n  command = x\nbuild o: r a | b || c\n",
        );
        let mut graph = Graph::default();
        let mut state = ParseState::new(&mut graph, Options::default());
        parse_file(&path, Environment::root(), &mut state).unwrap();

        let (_, edge) = state.graph.all_edges().next().unwrap();
        assert_eq!(edge.ins.len(), 3);
        assert_eq!(edge.inimpidx, 1);
        assert_eq!(edge.inorderidx, 2);
    }

    #[test]
    fn duplicate_output_fatal_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(
            &dir,
            "build.ninja",
            "rule r\n  command = x\nbuild a: r\nbuild a: r\n",
        );
        let mut graph = Graph::default();
        let mut state = ParseState::new(&mut graph, Options::default());
        assert!(parse_file(&path, Environment::root(), &mut state).is_err());
    }

    #[test]
    fn duplicate_output_warns_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(
            &dir,
            "build.ninja",
            "rule r\n  command = x\nbuild a: r\nbuild a: r\n",
        );
        let mut graph = Graph::default();
        let mut state = ParseState::new(
            &mut graph,
            Options {
                dupbuildwarn: true,
            },
        );
        parse_file(&path, Environment::root(), &mut state).unwrap();
        assert_eq!(state.graph.num_edges(), 2);
        let outs_len: Vec<usize> = state
            .graph
            .all_edges()
            .map(|(_, e)| e.outs.len())
            .collect();
        // One edge keeps its output, the other has it dropped to zero.
        assert_eq!(outs_len.iter().sum::<usize>(), 1);
    }

    #[test]
    fn duplicate_output_outimpidx_tracks_kept_count_not_loop_index() {
        // First edge claims `a` and `b` explicitly. Second edge re-declares
        // both as duplicates and adds a genuinely new implicit output `c`.
        // outimpidx must end at 0: neither surviving duplicate before `c`
        // was ever "kept", so both decrements apply.
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(
            &dir,
            "build.ninja",
            "rule r\n  command = x\nbuild a b: r\nbuild a b | c: r\n",
        );
        let mut graph = Graph::default();
        let mut state = ParseState::new(
            &mut graph,
            Options {
                dupbuildwarn: true,
            },
        );
        parse_file(&path, Environment::root(), &mut state).unwrap();

        let (_, second) = state
            .graph
            .all_edges()
            .find(|(_, e)| e.outs.len() == 1)
            .expect("second edge keeps only the new output");
        assert_eq!(second.outimpidx, 0);
    }

    #[test]
    fn default_targets_restrict_to_declared() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(
            &dir,
            "build.ninja",
            "rule r\n  command = x\nbuild x: r\nbuild y: r\ndefault x\n",
        );
        let mut graph = Graph::default();
        let mut state = ParseState::new(&mut graph, Options::default());
        parse_file(&path, Environment::root(), &mut state).unwrap();

        let mut seen = Vec::new();
        state.defaults.defaultnodes(state.graph, |id| {
            seen.push(state.graph.node(id).path.clone())
        });
        assert_eq!(seen, vec!["x".to_string()]);
    }

    #[test]
    fn output_path_canonicalizing_to_empty_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(&dir, "build.ninja", "rule r\n  command = x\nbuild .: r\n");
        let mut graph = Graph::default();
        let mut state = ParseState::new(&mut graph, Options::default());
        let err = parse_file(&path, Environment::root(), &mut state).unwrap_err();
        assert!(err.to_string().contains("empty string"));
    }

    #[test]
    fn default_target_path_canonicalizing_to_empty_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(
            &dir,
            "build.ninja",
            "rule r\n  command = x\nbuild a: r\ndefault a/..\n",
        );
        let mut graph = Graph::default();
        let mut state = ParseState::new(&mut graph, Options::default());
        let err = parse_file(&path, Environment::root(), &mut state).unwrap_err();
        assert!(err.to_string().contains("empty string"));
    }

    #[test]
    fn pool_requires_positive_depth() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(&dir, "build.ninja", "pool link_pool\n  depth = 4\n");
        let mut graph = Graph::default();
        let mut state = ParseState::new(&mut graph, Options::default());
        parse_file(&path, Environment::root(), &mut state).unwrap();
        assert!(state.graph.get_pool("link_pool").is_some());
    }

    #[test]
    fn pool_without_depth_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(&dir, "build.ninja", "pool link_pool\n");
        let mut graph = Graph::default();
        let mut state = ParseState::new(&mut graph, Options::default());
        assert!(parse_file(&path, Environment::root(), &mut state).is_err());
    }

    #[test]
    fn subninja_rule_does_not_leak_back_to_parent() {
        let dir = tempfile::tempdir().unwrap();
        let child = write_manifest(&dir, "child.ninja", "rule r\n  command = child\n");
        let parent = write_manifest(
            &dir,
            "build.ninja",
            &format!(
                "rule r\n  command = parent\nsubninja {}\nbuild out: r\n",
                child.display()
            ),
        );
        let mut graph = Graph::default();
        let mut state = ParseState::new(&mut graph, Options::default());
        let root = Environment::root();
        parse_file(&parent, root.clone(), &mut state).unwrap();

        // The top-level `build out: r` must still see the *parent*'s `r`.
        let (id, _) = state.graph.all_edges().next().unwrap();
        let hash = crate::edgehash::edgehash(state.graph, id).unwrap();
        assert_eq!(hash, crate::hash::murmur_hash64a(b"parent"));
    }

    #[test]
    fn comment_inside_indented_block_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(
            &dir,
            "build.ninja",
            "rule cc\n  # the compiler driver\n  command = cc -c $in -o $out\n  # done\nbuild a.o: cc a.c\n",
        );
        let mut graph = Graph::default();
        let mut state = ParseState::new(&mut graph, Options::default());
        parse_file(&path, Environment::root(), &mut state).unwrap();

        assert_eq!(state.graph.num_edges(), 1);
        let (id, _) = state.graph.all_edges().next().unwrap();
        let hash = crate::edgehash::edgehash(state.graph, id).unwrap();
        assert_eq!(hash, crate::hash::murmur_hash64a(b"cc -c a.c -o a.o"));
    }

    #[test]
    fn include_shares_scope_with_parent() {
        let dir = tempfile::tempdir().unwrap();
        let child = write_manifest(&dir, "rules.ninja", "rule r\n  command = from_child\n");
        let parent = write_manifest(
            &dir,
            "build.ninja",
            &format!("include {}\nbuild out: r\n", child.display()),
        );
        let mut graph = Graph::default();
        let mut state = ParseState::new(&mut graph, Options::default());
        parse_file(&parent, Environment::root(), &mut state).unwrap();
        assert_eq!(state.graph.num_edges(), 1);
    }
}
