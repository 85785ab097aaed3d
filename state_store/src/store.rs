use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::name_locks::NameLocks;
use crate::roster::Roster;

/// Extension of the content artifact for an entry.
pub const STATE_FILE_EXT: &str = ".tfstate";

/// Extension of the (empty) lock marker for an entry.
pub const LOCK_FILE_EXT: &str = ".lock";

/// Created and removed once at startup to confirm the root is readable and writable.
const PROBE_FILE_NAME: &str = "test_rw";

/// Prefix of in-flight content writes. Never ends in a recognized extension, so scans skip it.
const PARTIAL_WRITE_PREFIX: &str = ".partial-";

#[cfg(unix)]
const DEFAULT_FILE_MODE: u32 = 0o644;
#[cfg(unix)]
const DEFAULT_DIR_MODE: u32 = 0o755;

/// Checks that `name` addresses exactly one file directly inside the storage root.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(StoreError::InvalidName(name.to_owned()));
    }
    Ok(())
}

/// Durable storage for named state blobs and their lock markers.
///
/// Each mutating call runs its check and its action inside a per-name section, so two
/// requests for the same name cannot interleave between "is it locked?" and the write,
/// delete or marker change that depends on the answer. Calls for distinct names never
/// wait on each other. All methods block on the filesystem.
#[derive(Debug)]
pub struct StateStore {
    root: PathBuf,
    name_locks: NameLocks,
}

impl StateStore {
    /// Opens the store at `root`, creating the directory if needed and probing that it is writable.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        debug!("storage path: {root:?}");

        let md = match fs::metadata(&root) {
            Ok(md) => md,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("storage directory {root:?} does not exist, creating it");
                create_root_dir(&root).map_err(|source| StoreError::RootUnusable {
                    path: root.clone(),
                    source,
                })?;
                fs::metadata(&root)?
            },
            Err(e) => {
                return Err(StoreError::RootUnusable { path: root, source: e });
            },
        };

        if !md.is_dir() {
            return Err(StoreError::NotDirectory(root));
        }

        let probe = root.join(PROBE_FILE_NAME);
        fs::File::create(&probe)
            .and_then(|_| fs::remove_file(&probe))
            .map_err(|source| StoreError::RootUnusable {
                path: root.clone(),
                source,
            })?;

        Ok(Self {
            root,
            name_locks: NameLocks::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn state_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}{STATE_FILE_EXT}"))
    }

    fn lock_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}{LOCK_FILE_EXT}"))
    }

    /// True iff the content artifact for `name` is present and is a regular file.
    pub fn exists(&self, name: &str) -> Result<bool> {
        validate_name(name)?;
        is_regular_file(&self.state_path(name))
    }

    /// True iff the lock marker for `name` is present and is a regular file.
    pub fn is_locked(&self, name: &str) -> Result<bool> {
        validate_name(name)?;
        is_regular_file(&self.lock_path(name))
    }

    /// Returns the full content stored under `name`.
    ///
    /// Writes replace the content file by rename, so this never observes a partial write
    /// and needs no section of its own.
    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        validate_name(name)?;
        fs::read(self.state_path(name)).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StoreError::NotFound(name.to_owned()),
            _ => e.into(),
        })
    }

    /// Replaces the content of `name` with `data`.
    ///
    /// Returns `true` when this call created the entry and `false` when it replaced existing
    /// content. Fails with `AlreadyLocked` while a lock marker is present.
    pub fn write(&self, name: &str, data: &[u8]) -> Result<bool> {
        validate_name(name)?;
        self.name_locks.with_name(name, || {
            if is_regular_file(&self.lock_path(name))? {
                return Err(StoreError::AlreadyLocked(name.to_owned()));
            }

            let path = self.state_path(name);
            let created = !is_regular_file(&path)?;
            self.persist(&path, data)?;
            Ok(created)
        })
    }

    /// Writes `data` to a temporary file in the root and renames it over `path`.
    fn persist(&self, path: &Path, data: &[u8]) -> Result<()> {
        let mut tmp = tempfile::Builder::new()
            .prefix(PARTIAL_WRITE_PREFIX)
            .tempfile_in(&self.root)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(fs::Permissions::from_mode(DEFAULT_FILE_MODE))?;
        }

        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Removes the content of `name`.
    ///
    /// Content that is already gone counts as success; the return value tells whether a file
    /// was actually removed. Fails with `AlreadyLocked` while a lock marker is present.
    pub fn delete(&self, name: &str) -> Result<bool> {
        validate_name(name)?;
        self.name_locks.with_name(name, || {
            if is_regular_file(&self.lock_path(name))? {
                return Err(StoreError::AlreadyLocked(name.to_owned()));
            }

            match fs::remove_file(self.state_path(name)) {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Creates the lock marker for `name`. The entry does not need to have content yet.
    pub fn lock(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        self.name_locks.with_name(name, || {
            let mut options = OpenOptions::new();
            options.write(true).create_new(true);

            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(DEFAULT_FILE_MODE);
            }

            // create_new keeps this exclusive even against other processes sharing the root.
            match options.open(self.lock_path(name)) {
                Ok(_) => Ok(()),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(StoreError::AlreadyLocked(name.to_owned())),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Removes the lock marker for `name`.
    pub fn unlock(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        self.name_locks.with_name(name, || {
            let lock_path = self.lock_path(name);
            if !is_regular_file(&lock_path)? {
                return Err(StoreError::NotLocked(name.to_owned()));
            }

            match fs::remove_file(lock_path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotLocked(name.to_owned())),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Lists every entry in the root with its lock flag, from a fresh directory scan.
    pub fn list(&self) -> Result<Roster> {
        Roster::scan(&self.root)
    }
}

fn is_regular_file(path: &Path) -> Result<bool> {
    match fs::metadata(path) {
        Ok(md) => Ok(md.is_file()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn create_root_dir(root: &Path) -> std::io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DEFAULT_DIR_MODE);
    }

    builder.create(root)
}
