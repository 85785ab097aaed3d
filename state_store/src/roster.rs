use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::store::{validate_name, LOCK_FILE_EXT, STATE_FILE_EXT};

/// One line of the roster: an entry name and whether a lock marker is present for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateStatus {
    pub name: String,
    pub locked: bool,
}

/// All entries found in the storage root during a single scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    pub states: Vec<StateStatus>,
}

enum ArtifactKind {
    State,
    Lock,
}

impl Roster {
    /// Scans `root` exactly once and builds the roster.
    ///
    /// Content artifacts are listed in directory order, then lock markers are folded in.
    /// A marker without content is kept as a locked entry, since clients lock a brand new
    /// state before writing it for the first time. Any I/O failure aborts the scan; a
    /// partial roster is never returned.
    pub(crate) fn scan(root: &Path) -> Result<Self> {
        let mut artifacts = Vec::new();

        for dir_entry in std::fs::read_dir(root)? {
            let dir_entry = dir_entry?;

            let file_name = dir_entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                warn!("skipping non UTF-8 file name {:?} in {:?}", dir_entry.file_name(), root);
                continue;
            };

            let (name, kind) = if let Some(name) = file_name.strip_suffix(STATE_FILE_EXT) {
                (name, ArtifactKind::State)
            } else if let Some(name) = file_name.strip_suffix(LOCK_FILE_EXT) {
                (name, ArtifactKind::Lock)
            } else {
                continue;
            };

            if validate_name(name).is_err() {
                warn!("skipping artifact {file_name:?} with unusable name");
                continue;
            }

            // Follow symlinks the same way the per-entry existence checks do.
            let md = match std::fs::metadata(dir_entry.path()) {
                Ok(md) => md,
                Err(e) => {
                    if e.kind() == ErrorKind::NotFound {
                        continue;
                    }
                    return Err(e.into());
                },
            };
            if !md.is_file() {
                debug!("skipping {file_name:?}, not a regular file");
                continue;
            }

            artifacts.push((name.to_owned(), kind));
        }

        let mut roster = Roster::default();
        let mut index: HashMap<String, usize> = HashMap::new();

        for (name, kind) in &artifacts {
            if let ArtifactKind::State = kind {
                if index.contains_key(name) {
                    return Err(StoreError::Inconsistent(format!("state {name:?} listed twice")));
                }
                index.insert(name.clone(), roster.states.len());
                roster.states.push(StateStatus {
                    name: name.clone(),
                    locked: false,
                });
            }
        }

        for (name, kind) in artifacts {
            if let ArtifactKind::Lock = kind {
                match index.get(&name) {
                    Some(&i) => roster.states[i].locked = true,
                    None => {
                        index.insert(name.clone(), roster.states.len());
                        roster.states.push(StateStatus { name, locked: true });
                    },
                }
            }
        }

        Ok(roster)
    }

    pub fn get(&self, name: &str) -> Option<&StateStatus> {
        self.states.iter().find(|s| s.name == name)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
