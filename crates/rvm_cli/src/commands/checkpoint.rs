//! Checkpoint command implementation.
//!
//! Applies every unbacked record whose segment has a backing file, without
//! mapping any segment. Records for segments with no backing file stay in
//! the log.

use super::CliResult;
use rvm_core::{truncate_log, CheckpointStats, CommitLog, RvmDir};
use std::collections::HashSet;
use std::path::Path;

/// Runs the checkpoint command.
pub fn run(path: &Path) -> CliResult<()> {
    let stats = checkpoint(path)?;

    println!("Checkpoint complete");
    println!("  Applied: {}", stats.applied);
    println!("  Carried: {}", stats.carried);
    println!("  Dropped: {}", stats.dropped);

    Ok(())
}

/// Checkpoints the RVM directory at `path` against all backing segments.
///
/// Takes the directory lock, so it fails if an instance has it open.
pub fn checkpoint(path: &Path) -> CliResult<CheckpointStats> {
    let dir = RvmDir::open(path, false)?;
    let mut log = CommitLog::open(&dir.log_path(), true)?;

    let targets: HashSet<String> = dir
        .list_segments()?
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    tracing::debug!(segments = targets.len(), "checkpointing backing segments");

    Ok(truncate_log(&dir, &mut log, &targets, true)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rvm_core::Rvm;
    use tempfile::tempdir;

    #[test]
    fn applies_records_offline() {
        let temp = tempdir().unwrap();
        {
            let rvm = Rvm::init(temp.path()).unwrap();
            let seg = rvm.map("A", 4).unwrap();
            let tid = rvm.begin_trans(&[seg]).unwrap();
            rvm.about_to_modify(tid, seg, 0, 4);
            rvm.write(seg, 0, &[1, 2, 3, 4]).unwrap();
            rvm.commit_trans(tid).unwrap();
        }

        let stats = checkpoint(temp.path()).unwrap();
        assert_eq!(stats.applied, 1);
        assert_eq!(
            std::fs::read(temp.path().join(".A.seg")).unwrap(),
            vec![1, 2, 3, 4]
        );
        assert_eq!(std::fs::metadata(temp.path().join(".rvm.log")).unwrap().len(), 0);
    }

    #[test]
    fn fails_while_instance_is_open() {
        let temp = tempdir().unwrap();
        let _rvm = Rvm::init(temp.path()).unwrap();

        assert!(checkpoint(temp.path()).is_err());
    }
}
