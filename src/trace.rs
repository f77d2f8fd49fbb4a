//! Lightweight scoped timing, in the spirit of the teacher's `trace::scope`
//! calls sprinkled through the loader. No external tracing crate — this is
//! purely an internal profiling hook that a future executor could redirect
//! into a Chrome-trace-JSON file, same as upstream `n2` does.

use std::cell::Cell;
use std::time::Instant;

thread_local! {
    static ENABLED: Cell<bool> = Cell::new(false);
}

/// Turn on printing of scope durations to stderr (off by default; the CLI's
/// `-v`/verbose flag can flip this).
pub fn set_enabled(enabled: bool) {
    ENABLED.with(|e| e.set(enabled));
}

/// Run `f`, optionally printing how long it took under `name`.
pub fn scope<T>(name: &str, f: impl FnOnce() -> T) -> T {
    let enabled = ENABLED.with(|e| e.get());
    if !enabled {
        return f();
    }
    let start = Instant::now();
    let result = f();
    eprintln!("trace: {} took {:?}", name, start.elapsed());
    result
}
