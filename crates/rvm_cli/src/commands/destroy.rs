//! Destroy command implementation.

use super::CliResult;
use rvm_core::{Config, Rvm};
use std::path::Path;

/// Runs the destroy command.
pub fn run(path: &Path, name: &str, verbose: bool) -> CliResult<()> {
    let config = Config::default().create_if_missing(false).verbose(verbose);
    let rvm = Rvm::init_with_config(path, config)?;

    if rvm.destroy(name)? {
        println!("Destroyed segment '{name}'");
    } else {
        println!("Segment '{name}' has no backing file");
    }

    Ok(())
}
