//! CLI entry point. This binary only drives the core: it loads a manifest
//! and, depending on flags, either reports what it found (`-t targets`) or
//! records the executor-facing options an external runner would need
//! (`--verbose`, `--dry-run`, ...) without itself scheduling or running any
//! command (spec §1, §6 "CLI").

use anyhow::bail;
use argh::FromArgs;

/// a ninja-manifest-compatible build graph core
#[derive(FromArgs)]
struct Args {
    /// input build file (default build.ninja)
    #[argh(option, short = 'f', default = "String::from(\"build.ninja\")")]
    file: String,

    /// run a subtool: currently only "targets"
    #[argh(option, short = 't')]
    tool: Option<String>,

    /// arguments passed through to the subtool
    #[argh(positional)]
    tool_args: Vec<String>,

    /// explain why each target is considered dirty (recorded, not acted on)
    #[argh(switch)]
    explain: bool,

    /// print executed commands as they run (recorded, not acted on)
    #[argh(switch)]
    verbose: bool,

    /// don't run commands, just report what would run (recorded, not acted on)
    #[argh(switch)]
    dry_run: bool,

    /// keep .d depfiles after the build (recorded, not acted on)
    #[argh(switch)]
    keep_depfile: bool,

    /// keep rspfiles after the build (recorded, not acted on)
    #[argh(switch)]
    keep_rspfile: bool,

    /// cap on concurrent jobs (recorded, not acted on)
    #[argh(option)]
    max_jobs: Option<usize>,

    /// stop after this many failures, 0 means unlimited (recorded, not acted on)
    #[argh(option, default = "1")]
    max_fail: usize,

    /// don't start new jobs once load average exceeds this (recorded, not acted on)
    #[argh(option)]
    max_load: Option<f64>,

    /// status line format string (recorded, not acted on)
    #[argh(option)]
    status_fmt: Option<String>,

    /// allow duplicate build outputs to warn-and-drop instead of failing
    #[argh(switch)]
    dupbuild_warn: bool,
}

fn main() {
    let args: Args = argh::from_env();
    ninjacore::trace::set_enabled(args.verbose);

    if let Err(e) = run(args) {
        eprintln!("ninjacore: error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    if let Some(tool) = &args.tool {
        return match tool.as_str() {
            "targets" => {
                let code = ninjacore::tools::targets::tool_targets(&args.file, &args.tool_args)?;
                std::process::exit(code);
            }
            other => bail!("unknown tool {:?}", other),
        };
    }

    let opts = ninjacore::load::Options {
        dupbuildwarn: args.dupbuild_warn,
    };
    let state = ninjacore::load::read(&args.file, opts)?;

    let mut targets = Vec::new();
    state.defaults.defaultnodes(&state.graph, |id| {
        targets.push(state.graph.node(id).path.clone())
    });
    for target in targets {
        println!("{}", target);
    }
    Ok(())
}
