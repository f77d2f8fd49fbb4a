//! The build graph: files (nodes) and build edges, plus pools and rules
//! (spec §4.4). Owned by a single `Graph` arena addressed by dense integer
//! ids — no `Rc`/`Arc` cross-links between `Node` and `Edge`, so there is no
//! reference cycle to worry about and `graphinit` (`Graph::default()`)
//! reclaims everything in one drop.

use crate::densemap::{self, DenseMap};
use crate::env::Environment;
use crate::eval::EvalString;
use crate::smallmap::SmallMap;
use anyhow::bail;
use rustc_hash::FxHashMap;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;
use std::time::SystemTime;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct FileId(u32);
impl densemap::Index for FileId {
    fn index(&self) -> usize {
        self.0 as usize
    }
}
impl From<usize> for FileId {
    fn from(u: usize) -> FileId {
        FileId(u as u32)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct EdgeId(u32);
impl densemap::Index for EdgeId {
    fn index(&self) -> usize {
        self.0 as usize
    }
}
impl From<usize> for EdgeId {
    fn from(u: usize) -> EdgeId {
        EdgeId(u as u32)
    }
}

/// A file's last-known modification time, or the fact it doesn't exist, or
/// that it has never been sampled at all.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum MTime {
    Unknown,
    Missing,
    /// Nanoseconds since the Unix epoch.
    Stamp(i128),
}

impl Default for MTime {
    fn default() -> Self {
        MTime::Unknown
    }
}

/// A file referenced as a build input or output.
#[derive(Debug)]
pub struct Node {
    pub path: String,
    shellpath: Option<String>,
    /// The edge that generates this file, if any (absent ⇒ source file).
    pub gen: Option<EdgeId>,
    /// Edges that use this file as an input, in declaration order;
    /// duplicates allowed (the same edge can list a node twice, e.g. once
    /// explicit once implicit).
    pub uses: Vec<EdgeId>,
    pub mtime: MTime,
    pub logmtime: MTime,
    pub hash: u64,
    /// Dense id assigned by the executor; -1 until then.
    pub id: i64,
}

impl Node {
    fn new(path: String) -> Self {
        Node {
            path,
            shellpath: None,
            gen: None,
            uses: Vec::new(),
            mtime: MTime::Unknown,
            logmtime: MTime::Missing,
            hash: 0,
            id: -1,
        }
    }

    pub fn path(&self) -> &Path {
        Path::new(&self.path)
    }
}

/// A response-file bundle: where to write it, and with what content.
#[derive(Debug, Clone)]
pub struct RspFile {
    pub path: std::path::PathBuf,
    pub content: String,
}

pub const EDGE_HASH: u8 = 1 << 0;

/// A named template. Must carry `command`; `rspfile`/`rspfile_content`
/// are both-or-neither (enforced when the rule is parsed).
#[derive(Debug)]
pub struct Rule {
    pub name: String,
    pub vars: HashMap<String, EvalString>,
}

impl Rule {
    pub fn new(name: String) -> Self {
        Rule {
            name,
            vars: HashMap::new(),
        }
    }

    pub fn add_var(&mut self, name: String, val: EvalString) {
        self.vars.insert(name, val);
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.vars.contains_key("command") {
            bail!("rule '{}' is missing 'command'", self.name);
        }
        let has_path = self.vars.contains_key("rspfile");
        let has_content = self.vars.contains_key("rspfile_content");
        if has_path != has_content {
            bail!(
                "rule '{}': rspfile and rspfile_content must both be set or both absent",
                self.name
            );
        }
        Ok(())
    }
}

/// A concurrency-limiting bucket. `""` and `"console"` are reserved by the
/// manifest language and never explicitly declared.
#[derive(Debug)]
pub struct Pool {
    pub name: String,
    pub depth: usize,
}

/// A rule instance bound to concrete inputs/outputs.
pub struct Edge {
    pub id: EdgeId,
    pub rule: Rc<Rule>,
    pub env: Rc<Environment>,
    pub pool: Option<Rc<Pool>>,

    pub outs: Vec<FileId>,
    pub outimpidx: usize,

    pub ins: Vec<FileId>,
    pub inimpidx: usize,
    pub inorderidx: usize,

    pub flags: u8,
    pub hash: u64,

    pub filename: Rc<std::path::PathBuf>,
    pub line: usize,
}

impl Edge {
    pub fn explicit_outs(&self) -> &[FileId] {
        &self.outs[0..self.outimpidx]
    }
    pub fn implicit_outs(&self) -> &[FileId] {
        &self.outs[self.outimpidx..]
    }
    pub fn explicit_ins(&self) -> &[FileId] {
        &self.ins[0..self.inimpidx]
    }
    pub fn implicit_ins(&self) -> &[FileId] {
        &self.ins[self.inimpidx..self.inorderidx]
    }
    pub fn order_only_ins(&self) -> &[FileId] {
        &self.ins[self.inorderidx..]
    }
    /// Inputs whose mtime being newer than the output invalidates it:
    /// explicit + implicit, but not order-only.
    pub fn dirtying_ins(&self) -> &[FileId] {
        &self.ins[0..self.inorderidx]
    }

    /// Look up a rule- or build-level attribute (`command`, `description`,
    /// `depfile`, `pool`, `rspfile`, `rspfile_content`): the rule's template
    /// wins if present (expanded against this edge's environment, so `$in`/
    /// `$out`/user vars resolve), otherwise the build's own local binding.
    pub fn binding(&self, name: &str) -> Option<String> {
        match self.rule.vars.get(name) {
            Some(es) => Some(self.env.eval(es)),
            None => self.env_var_local(name),
        }
    }

    fn env_var_local(&self, name: &str) -> Option<String> {
        self.env.local_var(name)
    }
}

/// Owns every `Node`/`Edge`/`Pool` parsed from a manifest.
#[derive(Default)]
pub struct Graph {
    nodes: DenseMap<FileId, Node>,
    // `mknode` is the hottest lookup in the whole parse (every path token in
    // every build statement), so it gets the same fast hasher the teacher
    // reaches for on its per-file maps.
    by_path: FxHashMap<String, FileId>,
    edges: DenseMap<EdgeId, Edge>,
    pools: SmallMap<String, Rc<Pool>>,
}

impl Graph {
    /// Drop every node and edge, releasing their owned buffers — ready for
    /// a fresh parse.
    pub fn reset(&mut self) {
        *self = Graph::default();
    }

    /// Create (or return the existing) node for an already-canonicalized
    /// path.
    pub fn mknode(&mut self, path: String) -> FileId {
        if let Some(&id) = self.by_path.get(&path) {
            return id;
        }
        let id = self.nodes.push(Node::new(path.clone()));
        self.by_path.insert(path, id);
        id
    }

    pub fn nodeget(&self, path: &str) -> Option<FileId> {
        self.by_path.get(path).copied()
    }

    pub fn node(&self, id: FileId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: FileId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn all_nodes(&self) -> impl Iterator<Item = (FileId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (FileId::from(i), n))
    }

    /// Sample the filesystem for `id`'s mtime, caching the result. Any
    /// error other than not-found is fatal.
    pub fn nodestat(&mut self, id: FileId) -> anyhow::Result<MTime> {
        let path = self.nodes[id].path().to_path_buf();
        let mtime = stat(&path)?;
        self.nodes[id].mtime = mtime;
        Ok(mtime)
    }

    /// `escape == false` returns the raw canonical path. `escape == true`
    /// returns a cached shell-quoted rendering, computed (and cached) on
    /// first request; paths containing only `[A-Za-z0-9_+-./]` are returned
    /// unquoted.
    pub fn nodepath(&mut self, id: FileId, escape: bool) -> &str {
        if !escape {
            return &self.nodes[id].path;
        }
        if self.nodes[id].shellpath.is_none() {
            let quoted = shell_quote_if_needed(&self.nodes[id].path);
            self.nodes[id].shellpath = Some(quoted);
        }
        self.nodes[id].shellpath.as_deref().unwrap()
    }

    /// Record that `edge` uses `node` as an input.
    pub fn nodeuse(&mut self, node: FileId, edge: EdgeId) {
        self.nodes[node].uses.push(edge);
    }

    /// Claim `file` as an output of `edge`. Returns `Ok(true)` if this is a
    /// fresh claim, `Ok(false)` if it's a duplicate that was dropped under
    /// `dupbuildwarn`, and an error if it's a duplicate and `dupbuildwarn`
    /// is false (spec's "`dupbuildwarn=false` is the fatal branch" — the
    /// flag name reads backwards from its effect; this is deliberate, see
    /// DESIGN.md).
    pub fn claim_output(
        &mut self,
        file: FileId,
        edge: EdgeId,
        dupbuildwarn: bool,
    ) -> anyhow::Result<bool> {
        let node = &mut self.nodes[file];
        match node.gen {
            Some(_) if dupbuildwarn => {
                println!("ninjacore: warn: {:?} is already an output; dropping duplicate", node.path);
                Ok(false)
            }
            Some(_) => {
                bail!("{:?} is already an output of another build edge", node.path);
            }
            None => {
                node.gen = Some(edge);
                Ok(true)
            }
        }
    }

    /// Allocate a new edge bound to `rule`/`env`, returning its id. Callers
    /// fill in `outs`/`ins`/etc. before the edge is visible to anyone else
    /// (single-threaded construction, so this is safe despite `&mut self`
    /// being reborrowed by the caller right after).
    pub fn mkedge(
        &mut self,
        rule: Rc<Rule>,
        env: Rc<Environment>,
        filename: Rc<std::path::PathBuf>,
        line: usize,
    ) -> EdgeId {
        let id_guess = EdgeId::from(self.edges.len());
        self.edges.push(Edge {
            id: id_guess,
            rule,
            env,
            pool: None,
            outs: Vec::new(),
            outimpidx: 0,
            ins: Vec::new(),
            inimpidx: 0,
            inorderidx: 0,
            flags: 0,
            hash: 0,
            filename,
            line,
        })
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id]
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> &mut Edge {
        &mut self.edges[id]
    }

    /// All edges, in reverse declaration order (the original C/C++
    /// implementations prepend onto a singly linked list; we keep the
    /// observable ordering without needing the intrusive list).
    pub fn all_edges(&self) -> impl Iterator<Item = (EdgeId, &Edge)> {
        self.edges
            .iter()
            .enumerate()
            .rev()
            .map(|(i, e)| (EdgeId::from(i), e))
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn get_pool(&self, name: &str) -> Option<Rc<Pool>> {
        self.pools.get(&name.to_string()).cloned()
    }

    pub fn add_pool(&mut self, name: String, depth: usize) -> anyhow::Result<()> {
        if self.pools.get(&name).is_some() {
            bail!("duplicate pool '{}'", name);
        }
        self.pools.insert(name.clone(), Rc::new(Pool { name, depth }));
        Ok(())
    }

    /// Insert `deps` as additional implicit inputs (e.g. from a depfile),
    /// right at the start of the order-only region, shifting any
    /// already-present order-only inputs to the right and extending
    /// `inorderidx` so the inserted deps land in the implicit region, not
    /// the order-only one. Any dep with no generating edge gets a synthetic
    /// `phony` edge so the graph still treats it uniformly as "producible"
    /// (spec §4.4/§4.6, `mkphony`).
    pub fn edgeadddeps(
        &mut self,
        phony_rule: &Rc<Rule>,
        edge: EdgeId,
        deps: Vec<FileId>,
    ) -> anyhow::Result<()> {
        for &dep in &deps {
            if self.nodes[dep].gen.is_none() {
                let phony = self.mkphony(phony_rule.clone(), dep)?;
                self.nodes[dep].gen = Some(phony);
            }
            self.nodes[dep].uses.push(edge);
        }
        let at = self.edges[edge].inorderidx;
        let ndeps = deps.len();
        let ins = &mut self.edges[edge].ins;
        for (i, dep) in deps.into_iter().enumerate() {
            ins.insert(at + i, dep);
        }
        self.edges[edge].inorderidx += ndeps;
        Ok(())
    }

    /// A synthetic edge with no command, whose sole output is `node` — lets
    /// a source file later discovered to be generated (via a depfile) be
    /// treated like any other producible node.
    pub fn mkphony(&mut self, phony_rule: Rc<Rule>, node: FileId) -> anyhow::Result<EdgeId> {
        let env = crate::env::mkenv(None);
        let filename = Rc::new(std::path::PathBuf::from("<phony>"));
        let id = self.mkedge(phony_rule, env, filename, 0);
        {
            let e = &mut self.edges[id];
            e.outs.push(node);
            e.outimpidx = 1;
            e.inimpidx = 0;
            e.inorderidx = 0;
        }
        Ok(id)
    }
}

/// `stat()` an on-disk path, producing its `MTime`.
pub fn stat(path: &Path) -> anyhow::Result<MTime> {
    match std::fs::metadata(path) {
        Ok(meta) => {
            let modified: SystemTime = meta.modified()?;
            let nanos = modified
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_nanos() as i128)
                .unwrap_or_else(|e| -(e.duration().as_nanos() as i128));
            Ok(MTime::Stamp(nanos))
        }
        Err(err) => {
            if err.kind() == std::io::ErrorKind::NotFound {
                Ok(MTime::Missing)
            } else {
                Err(anyhow::anyhow!("stat {:?}: {}", path, err))
            }
        }
    }
}

fn needs_shell_quoting(s: &str) -> bool {
    !s.bytes().all(|b| {
        b.is_ascii_alphanumeric() || matches!(b, b'_' | b'+' | b'-' | b'.' | b'/')
    })
}

fn shell_quote_if_needed(s: &str) -> String {
    if !needs_shell_quoting(s) {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        if ch == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(ch);
        }
    }
    out.push('\'');
    out
}
