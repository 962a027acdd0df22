//! Subcommand implementations. Each command loads its own configuration
//! and connects its own pool, so one-shot invocations stay self-contained.

pub mod issue;
pub mod lookup;
pub mod migrate;
pub mod stats;
