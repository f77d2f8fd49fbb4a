//! Path canonicalization: the identity key every `Node` is looked up by.
//!
//! Collapses repeated separators, drops `.` segments, and resolves `..`
//! against the accumulated prefix. A relative path can carry unresolved `..`
//! segments at the front (`../../foo`); those are never popped past.

/// Canonicalize a manifest path. Idempotent: `canon_path(&canon_path(p)) ==
/// canon_path(p)`. May return an empty string (e.g. for `.` or `./`); callers
/// must reject that per the "canonicalization producing the empty string is
/// fatal" rule (spec §7 Internal errors) — this function itself stays
/// infallible so it composes with plain string transforms the way the
/// teacher's `canon_path` does.
pub fn canon_path(path: impl AsRef<str>) -> String {
    let path = path.as_ref();
    let is_abs = path.starts_with('/');
    let mut components: Vec<&str> = Vec::new();
    for part in path.split('/') {
        if part.is_empty() || part == "." {
            continue;
        }
        if part == ".." {
            match components.last() {
                Some(&last) if last != ".." => {
                    components.pop();
                }
                _ => {
                    if !is_abs {
                        components.push("..");
                    }
                    // An absolute path can't go above its root; drop it.
                }
            }
            continue;
        }
        components.push(part);
    }
    let mut result = String::new();
    if is_abs {
        result.push('/');
    }
    result.push_str(&components.join("/"));
    result
}
