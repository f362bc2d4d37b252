//! CLI subcommand implementations.

pub mod import;
pub mod metrics;
pub mod recommend;
pub mod status;
pub mod suggest;
pub mod util;
pub mod workload;

#[cfg(test)]
mod test_support;
