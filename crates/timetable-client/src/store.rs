//! Local store of downloaded timetable versions.
//!
//! ```text
//! <download_dir>/
//!   temp/<key>/<version>/<file>.pdf  staged, not yet seen
//!   <key>/<version>/<file>.pdf       one directory per version stamp
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use timetable_core::VersionStamp;
use tracing::{debug, info};

const STAGING_DIR: &str = "temp";

/// A stored version of one timetable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredVersion {
    pub stamp: VersionStamp,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct VersionStore {
    root: PathBuf,
    dry_run: bool,
}

impl VersionStore {
    pub fn new(root: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            root: root.into(),
            dry_run,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Known version identifiers per timetable key.
    ///
    /// A missing root yields an empty map.
    pub fn scan(&self) -> io::Result<BTreeMap<String, BTreeSet<String>>> {
        let mut known = BTreeMap::new();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(known),
            Err(e) => return Err(e),
        };

        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let key = entry.file_name().to_string_lossy().into_owned();
            if key == STAGING_DIR {
                continue;
            }
            let mut versions = BTreeSet::new();
            for version in fs::read_dir(entry.path())? {
                let version = version?;
                if version.file_type()?.is_dir() {
                    versions.insert(version.file_name().to_string_lossy().into_owned());
                }
            }
            known.insert(key, versions);
        }
        debug!(root = %self.root.display(), timetables = known.len(), "scanned version store");
        Ok(known)
    }

    pub fn seen(&self, key: &str, stamp: &VersionStamp) -> bool {
        self.version_dir(key, stamp).is_dir()
    }

    /// Writes `bytes` to `temp/<key>/<version>/<file_name>`.
    ///
    /// A staged version is not [`seen`](Self::seen) until it is committed, so
    /// a run that fails before committing downloads it again next time. In
    /// dry-run mode nothing is written and the would-be path is returned.
    pub fn stage(
        &self,
        key: &str,
        stamp: &VersionStamp,
        file_name: &str,
        bytes: &[u8],
    ) -> io::Result<PathBuf> {
        let staging_dir = self
            .root
            .join(STAGING_DIR)
            .join(key)
            .join(stamp.identifier());
        let staged = staging_dir.join(sanitize_file_name(file_name));
        if self.dry_run {
            debug!(path = %staged.display(), "dry run: not staging");
            return Ok(staged);
        }
        fs::create_dir_all(&staging_dir)?;
        fs::write(&staged, bytes)?;
        debug!(path = %staged.display(), version = %stamp, "staged new version");
        Ok(staged)
    }

    /// Moves a staged file to `<key>/<version>/`, marking the version seen.
    ///
    /// Committing a version that is already in place is a no-op.
    pub fn commit(&self, key: &str, stamp: &VersionStamp, staged: &Path) -> io::Result<PathBuf> {
        let target_dir = self.version_dir(key, stamp);
        let file_name = staged
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let target = target_dir.join(sanitize_file_name(&file_name));

        if self.dry_run {
            info!(path = %target.display(), "dry run: would store new version");
            return Ok(target);
        }
        if !staged.exists() && target.exists() {
            return Ok(target);
        }

        fs::create_dir_all(&target_dir)?;
        fs::rename(staged, &target)?;
        if let Some(parent) = staged.parent() {
            // Only succeeds once the version's staging directory is empty.
            let _ = fs::remove_dir(parent);
        }
        info!(path = %target.display(), version = %stamp, "stored new version");
        Ok(target)
    }

    /// Stages and commits in one go.
    pub fn record(
        &self,
        key: &str,
        stamp: &VersionStamp,
        file_name: &str,
        bytes: &[u8],
    ) -> io::Result<PathBuf> {
        let staged = self.stage(key, stamp, file_name, bytes)?;
        self.commit(key, stamp, &staged)
    }

    /// Newest stored version of `key`, by version stamp.
    ///
    /// Directories that are not version identifiers or hold no PDF are
    /// ignored.
    pub fn latest(&self, key: &str) -> io::Result<Option<StoredVersion>> {
        let key_dir = self.root.join(key);
        let entries = match fs::read_dir(&key_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let mut stamps = Vec::new();
        for entry in entries {
            let entry = entry?;
            if let Some(stamp) = VersionStamp::from_identifier(&entry.file_name().to_string_lossy())
            {
                stamps.push((stamp, entry.path()));
            }
        }
        stamps.sort_by(|a, b| b.0.cmp(&a.0));

        for (stamp, dir) in stamps {
            if let Some(path) = first_pdf(&dir)? {
                return Ok(Some(StoredVersion { stamp, path }));
            }
        }
        Ok(None)
    }

    fn version_dir(&self, key: &str, stamp: &VersionStamp) -> PathBuf {
        self.root.join(key).join(stamp.identifier())
    }
}

fn first_pdf(dir: &Path) -> io::Result<Option<PathBuf>> {
    let mut pdfs: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
        })
        .collect();
    pdfs.sort();
    Ok(pdfs.into_iter().next())
}

/// Keeps only the last path component of a remote name.
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    if base.is_empty() || base == "." || base == ".." {
        "timetable.pdf".to_string()
    } else {
        base.to_string()
    }
}
