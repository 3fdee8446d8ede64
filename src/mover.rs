// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Collision-safe relocation of finished files

use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::MoverConfig;
use crate::naming::RenamePlan;
use crate::{Result, SmartParseError};

/// Upper bound on numeric disambiguators tried for one name
pub const MAX_COLLISIONS: u32 = 10_000;

/// Moves files into their category folder
#[derive(Debug, Clone)]
pub struct Mover {
    retries: u32,
    backoff: Duration,
}

impl Mover {
    pub fn new(retries: u32, backoff: Duration) -> Self {
        Self { retries, backoff }
    }

    pub fn from_config(config: &MoverConfig) -> Self {
        Self::new(config.retries, Duration::from_millis(config.backoff_ms))
    }

    /// Move `source` into `dir` under the first free name of `plan`.
    ///
    /// Transient errors are retried with exponential backoff; fatal ones
    /// are returned immediately.
    pub async fn relocate(&self, source: &Path, dir: &Path, plan: &RenamePlan) -> Result<PathBuf> {
        self.relocate_with(source, dir, plan, claim).await
    }

    /// [`relocate`](Self::relocate) with the per-candidate claim step supplied
    pub async fn relocate_with<F>(&self, source: &Path, dir: &Path, plan: &RenamePlan, claim: F) -> Result<PathBuf>
    where
        F: Fn(&Path, &Path) -> io::Result<()>,
    {
        let mut attempt = 0;
        loop {
            match try_relocate(source, dir, plan, &claim) {
                Ok(destination) => {
                    info!("Renamed to: {:?}", destination);
                    return Ok(destination);
                }
                Err(e) if e.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    let delay = self.backoff * 2u32.saturating_pow(attempt - 1);
                    warn!("Move of {:?} failed ({}), retrying in {:?}", source, e, delay);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

}

fn try_relocate<F>(source: &Path, dir: &Path, plan: &RenamePlan, claim: &F) -> Result<PathBuf>
where
    F: Fn(&Path, &Path) -> io::Result<()>,
{
    std::fs::create_dir_all(dir).map_err(SmartParseError::from_move_error)?;

    for n in 0..MAX_COLLISIONS {
        let candidate = dir.join(plan.file_name(n));
        if candidate.exists() {
            debug!("Destination taken: {:?}", candidate);
            continue;
        }
        match claim(source, &candidate) {
            Ok(()) => return Ok(candidate),
            // lost a race for this name since the existence check
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(SmartParseError::from_move_error(e)),
        }
    }

    Err(SmartParseError::FatalIo(io::Error::new(
        ErrorKind::AlreadyExists,
        format!("no free name for {:?} in {:?}", plan.file_name(0), dir),
    )))
}

/// Move `source` to `destination`, failing with `AlreadyExists` rather than
/// ever replacing a file.
///
/// The hard link is the atomic claim on the destination name; filesystems
/// that cannot link (or a destination on another device) get an
/// exclusive-create copy instead.
pub fn claim(source: &Path, destination: &Path) -> io::Result<()> {
    match std::fs::hard_link(source, destination) {
        Ok(()) => {
            if let Err(e) = std::fs::remove_file(source) {
                let _ = std::fs::remove_file(destination);
                return Err(e);
            }
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(e),
        Err(e) if cannot_link(&e) => copy_exclusive(source, destination),
        Err(e) => Err(e),
    }
}

fn cannot_link(err: &io::Error) -> bool {
    // EPERM (no link support), EXDEV (cross-device), EMLINK
    err.kind() == ErrorKind::Unsupported
        || (cfg!(unix) && matches!(err.raw_os_error(), Some(1) | Some(18) | Some(31)))
}

fn copy_exclusive(source: &Path, destination: &Path) -> io::Result<()> {
    let mut src = File::open(source)?;
    let mut dst = OpenOptions::new().write(true).create_new(true).open(destination)?;

    let copied = io::copy(&mut src, &mut dst).and_then(|_| dst.sync_all());
    drop(dst);
    if let Err(e) = copied.and_then(|_| std::fs::remove_file(source)) {
        let _ = std::fs::remove_file(destination);
        return Err(e);
    }
    Ok(())
}
