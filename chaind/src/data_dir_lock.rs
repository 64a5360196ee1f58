use std::{
    io::{ErrorKind, Write as _},
    path::{Path, PathBuf},
};

use anyhow::Result;
use fs_err::OpenOptions;
use logging::debug_with_status;
use thiserror::Error;

use crate::consts::LOCK_FILE;

/// Keeps other instances from using the same data directory.
///
/// The lock file is left behind if the process is killed. It has to be removed by hand then.
#[derive(Debug)]
pub struct DataDirLock {
    path: PathBuf,
}

impl DataDirLock {
    pub fn acquire(data_dir: &Path) -> Result<Self> {
        fs_err::create_dir_all(data_dir)?;

        let path = data_dir.join(LOCK_FILE);

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(error) if error.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::AlreadyLocked { path }.into())
            }
            Err(error) => return Err(error.into()),
        };

        writeln!(file, "{}", std::process::id())?;

        debug_with_status!("data directory locked: {path:?}");

        Ok(Self { path })
    }

    pub fn release(self) -> Result<()> {
        fs_err::remove_file(&self.path)?;
        debug_with_status!("data directory unlocked: {:?}", self.path);
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("data directory is in use by another process (remove {path:?} if it is not)")]
    AlreadyLocked { path: PathBuf },
}
