//! Ancillary `-t` subcommands layered over the core graph (spec §6
//! "Tooling"), kept separate from the CLI's option parsing so they stay
//! usable by anything embedding this crate, not just `main.rs`.

pub mod targets;
