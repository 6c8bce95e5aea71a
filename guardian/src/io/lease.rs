//! Advisory file locks (`fs2`) under `.guardian/locks/`.
//!
//! A [`MonthLease`] serializes decisions for one month and is taken without
//! blocking: contention surfaces as [`GuardianError::LockBusy`]. A
//! [`WriteLock`] guards short critical sections (ledger and cadence writes)
//! and blocks until free.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use tracing::debug;

use crate::core::calendar::MonthKey;
use crate::error::GuardianError;

/// Exclusive decision lease for one month; released on drop.
#[derive(Debug)]
pub struct MonthLease {
    month: MonthKey,
    file: File,
}

impl MonthLease {
    pub fn try_acquire(locks_dir: &Path, month: MonthKey) -> Result<Self> {
        let path = month_lock_path(locks_dir, month);
        let file = open_lock_file(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!(%month, "month lease acquired");
                Ok(Self { month, file })
            }
            Err(err) if err.kind() == fs2::lock_contended_error().kind() => {
                debug!(%month, "month lease busy");
                Err(GuardianError::LockBusy {
                    month: month.to_string(),
                }
                .into())
            }
            Err(err) => Err(err).with_context(|| format!("lock {}", path.display())),
        }
    }

    pub fn month(&self) -> MonthKey {
        self.month
    }
}

impl Drop for MonthLease {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Blocking exclusive lock for a short critical section; released on drop.
#[derive(Debug)]
pub struct WriteLock {
    file: File,
}

impl WriteLock {
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = open_lock_file(path)?;
        file.lock_exclusive()
            .with_context(|| format!("lock {}", path.display()))?;
        Ok(Self { file })
    }
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

pub fn month_lock_path(locks_dir: &Path, month: MonthKey) -> PathBuf {
    locks_dir.join(format!("{month}.lock"))
}

// Lock files are never removed: unlinking one while another process has it
// open would let two holders lock different inodes.
fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(path)
        .with_context(|| format!("open lock file {}", path.display()))
}
