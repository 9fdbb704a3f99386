//! CLI subcommands.

pub(crate) mod compile;
pub(crate) mod config;
pub(crate) mod resolve;
pub(crate) mod scan;
