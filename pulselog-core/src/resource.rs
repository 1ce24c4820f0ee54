//! Log directory and log file handles.
//!
//! The log file is always opened with `openat(2)` relative to an open handle
//! on the log directory. Combined with [`Filename`] rejecting `/`, `.` and
//! `..`, a stored filename can never reach outside the directory, and
//! `O_NOFOLLOW` refuses a symlink planted under the file's name.

use std::fs::{self, DirBuilder, File};
use std::io::{self, Write};
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use nix::fcntl::{self, OFlag};
use nix::sys::stat::Mode;

use crate::error::{io_err, PulseError};
use crate::types::Filename;

/// Owner-only directory mode (before umask).
pub const DEFAULT_DIR_MODE: u32 = 0o700;

/// Owner-only log file mode (before umask).
pub const DEFAULT_FILE_MODE: u32 = 0o600;

/// The fixed directory that holds the log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogDirectory {
    path: PathBuf,
    dir_mode: u32,
    file_mode: u32,
}

impl LogDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            dir_mode: DEFAULT_DIR_MODE,
            file_mode: DEFAULT_FILE_MODE,
        }
    }

    /// Override the permission bits used when creating the directory and files.
    pub fn with_modes(mut self, dir_mode: u32, file_mode: u32) -> Self {
        self.dir_mode = dir_mode;
        self.file_mode = file_mode;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file_mode(&self) -> Mode {
        Mode::from_bits_truncate(self.file_mode as nix::libc::mode_t)
    }

    /// Create the directory if it is missing.
    ///
    /// An existing directory is success and is left exactly as it is.
    pub fn ensure(&self) -> Result<(), PulseError> {
        match DirBuilder::new().mode(self.dir_mode).create(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                let meta = fs::metadata(&self.path).map_err(|e| io_err(&self.path, e))?;
                if meta.is_dir() {
                    Ok(())
                } else {
                    Err(PulseError::NotADirectory {
                        path: self.path.clone(),
                    })
                }
            }
            Err(err) => Err(io_err(&self.path, err)),
        }
    }

    /// Open (creating if needed) `name` inside the directory for appending.
    pub fn open_for_append(&self, name: &Filename) -> Result<LogFile, PulseError> {
        self.ensure()?;

        let dir = fcntl::open(
            &self.path,
            OFlag::O_RDONLY | OFlag::O_DIRECTORY | OFlag::O_CLOEXEC,
            Mode::empty(),
        )
        .map_err(|errno| io_err(&self.path, errno.into()))?;

        let flags = OFlag::O_WRONLY
            | OFlag::O_CREAT
            | OFlag::O_APPEND
            | OFlag::O_NOFOLLOW
            | OFlag::O_CLOEXEC;
        let fd = fcntl::openat(&dir, name.as_str(), flags, self.file_mode())
            .map_err(|errno| io_err(self.path.join(name.as_str()), errno.into()))?;
        let file = File::from(fd);

        Ok(LogFile {
            name: name.clone(),
            file,
        })
    }
}

/// An open, append-only log file together with the name it was opened under.
#[derive(Debug)]
pub struct LogFile {
    name: Filename,
    file: File,
}

impl LogFile {
    pub fn name(&self) -> &Filename {
        &self.name
    }

    /// Append the whole buffer.
    ///
    /// Partial writes are continued and `EINTR` retried; any other error ends
    /// the append with part of the buffer possibly written.
    pub fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes)
    }

    #[cfg(test)]
    pub(crate) fn from_parts(name: Filename, file: File) -> Self {
        Self { name, file }
    }
}
