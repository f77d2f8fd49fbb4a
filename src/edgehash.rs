//! Edge command hashing (spec §4.5): a stable 64-bit digest of what an edge
//! *means to run*, independent of file mtimes, so the executor can detect
//! command drift (a changed compiler flag) separately from "the input file
//! changed."

use crate::graph::{EdgeId, Graph, EDGE_HASH};
use crate::hash::murmur_hash64a;
use anyhow::bail;

/// Idempotent: the first call computes and caches the hash on the edge; any
/// later call is a no-op that returns the cached value.
pub fn edgehash(graph: &mut Graph, id: EdgeId) -> anyhow::Result<u64> {
    if graph.edge(id).flags & EDGE_HASH != 0 {
        return Ok(graph.edge(id).hash);
    }

    let command = match graph.edge(id).binding("command") {
        Some(c) => c,
        None => bail!("edge has no 'command' to hash"),
    };
    let rspfile_content = graph.edge(id).binding("rspfile_content").unwrap_or_default();

    let digest = if !rspfile_content.is_empty() {
        let mut buf = command.into_bytes();
        buf.extend_from_slice(b";rspfile=");
        buf.extend_from_slice(rspfile_content.as_bytes());
        murmur_hash64a(&buf)
    } else {
        murmur_hash64a(command.as_bytes())
    };

    let edge = graph.edge_mut(id);
    edge.hash = digest;
    edge.flags |= EDGE_HASH;
    Ok(digest)
}
