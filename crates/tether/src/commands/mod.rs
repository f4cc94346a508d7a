//! CLI subcommand implementations

pub mod requirements;
