//! Backup, merge and atomic rewrite of the local kubeconfig.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use super::{absorb, CredentialBundle, KubeconfigError, Renames};

/// Infix between the kubeconfig file name and the backup timestamp.
pub const BACKUP_MARKER: &str = ".backup.";

/// What [`consolidate`] did.
#[derive(Debug, Clone)]
pub struct ConsolidateReport {
    pub path: PathBuf,
    /// Backup of the previous file, if one existed
    pub backup: Option<PathBuf>,
    pub renames: Renames,
    pub current_context: Option<String>,
}

/// `<file>.backup.<YYYYmmddHHMMSS>`
pub fn backup_path(path: &Path, at: DateTime<Local>) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(BACKUP_MARKER);
    name.push(at.format("%Y%m%d%H%M%S").to_string());
    path.with_file_name(name)
}

/// Merge `incoming` into the kubeconfig at `path`.
pub fn consolidate(incoming: CredentialBundle, path: &Path) -> Result<ConsolidateReport, KubeconfigError> {
    consolidate_at(incoming, path, Local::now())
}

/// [`consolidate`] with an explicit backup timestamp.
pub fn consolidate_at(
    incoming: CredentialBundle,
    path: &Path,
    now: DateTime<Local>,
) -> Result<ConsolidateReport, KubeconfigError> {
    let io_err = |source: std::io::Error| KubeconfigError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut backup = None;
    let mut existing = None;

    if path.exists() {
        let text = fs::read_to_string(path).map_err(io_err)?;
        backup = Some(write_backup(path, now)?);

        if !text.trim().is_empty() {
            match CredentialBundle::parse(&text) {
                Ok(bundle) => existing = Some(bundle),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "existing kubeconfig is unreadable, replacing it");
                }
            }
        }
    }

    let (merged, renames) = match existing {
        Some(existing) => absorb(existing, incoming),
        None => (incoming, Renames::default()),
    };

    for (context, kind, target) in merged.dangling_references() {
        tracing::warn!(context = %context, kind = %kind, target = %target, "kubeconfig context refers to a missing entry");
    }

    let text = merged.to_yaml()?;
    write_atomic(path, &text)?;

    tracing::info!(
        path = %path.display(),
        current_context = merged.current_context.as_deref().unwrap_or(""),
        "kubeconfig updated"
    );

    Ok(ConsolidateReport {
        path: path.to_path_buf(),
        backup,
        renames,
        current_context: merged.current_context,
    })
}

/// Copy `path` to its timestamped backup and drop older backups.
fn write_backup(path: &Path, now: DateTime<Local>) -> Result<PathBuf, KubeconfigError> {
    let backup = backup_path(path, now);
    fs::copy(path, &backup).map_err(|source| KubeconfigError::Io {
        path: backup.clone(),
        source,
    })?;

    for stale in older_backups(path, &backup)? {
        match fs::remove_file(&stale) {
            Ok(()) => tracing::debug!(path = %stale.display(), "removed old kubeconfig backup"),
            Err(e) => tracing::warn!(path = %stale.display(), error = %e, "failed to remove old kubeconfig backup"),
        }
    }

    tracing::info!(backup = %backup.display(), "backed up kubeconfig");
    Ok(backup)
}

fn older_backups(path: &Path, keep: &Path) -> Result<Vec<PathBuf>, KubeconfigError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut prefix = path.file_name().unwrap_or_default().to_string_lossy().into_owned();
    prefix.push_str(BACKUP_MARKER);

    let entries = fs::read_dir(&dir).map_err(|source| KubeconfigError::Io {
        path: dir.clone(),
        source,
    })?;

    let mut stale = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name();
        let candidate = entry.path();
        if name.to_string_lossy().starts_with(&prefix) && candidate.file_name() != keep.file_name() {
            stale.push(candidate);
        }
    }
    Ok(stale)
}

/// Write through a temp file and rename, so a failed write never leaves a
/// truncated kubeconfig behind.
fn write_atomic(path: &Path, content: &str) -> Result<(), KubeconfigError> {
    let io_err = |source: std::io::Error| KubeconfigError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    // A temp file left by an interrupted run keeps its old mode if reused
    let temp_path = path.with_extension("tmp");
    match fs::remove_file(&temp_path) {
        Err(e) if e.kind() != ErrorKind::NotFound => return Err(io_err(e)),
        _ => {}
    }

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(&temp_path).map_err(io_err)?;
    file.write_all(content.as_bytes()).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    drop(file);

    fs::rename(&temp_path, path).map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kubeconfig::tests::K3S_BUNDLE;
    use crate::kubeconfig::EntryKind;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn backups(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.contains(BACKUP_MARKER))
            .collect();
        names.sort();
        names
    }

    fn at(second: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 1, 2, 3, 4, second).unwrap()
    }

    #[test]
    fn test_backup_path_format() {
        let path = backup_path(Path::new("/home/ops/.kube/config"), at(5));
        assert_eq!(path, PathBuf::from("/home/ops/.kube/config.backup.20240102030405"));
    }

    #[test]
    fn test_fresh_store_written_without_backup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".kube").join("config");
        let incoming = CredentialBundle::parse(K3S_BUNDLE).unwrap();

        let report = consolidate_at(incoming.clone(), &path, at(0)).unwrap();

        assert!(report.backup.is_none());
        let written = CredentialBundle::parse(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, incoming);
        assert!(backups(path.parent().unwrap()).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_written_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config");
        consolidate_at(CredentialBundle::parse(K3S_BUNDLE).unwrap(), &path, at(0)).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_leftover_temp_file_not_reused() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config");
        let temp = dir.path().join("config.tmp");
        fs::write(&temp, "stale: true\n").unwrap();
        fs::set_permissions(&temp, fs::Permissions::from_mode(0o644)).unwrap();

        consolidate_at(CredentialBundle::parse(K3S_BUNDLE).unwrap(), &path, at(0)).unwrap();

        assert!(!temp.exists());
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(!fs::read_to_string(&path).unwrap().contains("stale"));
    }

    #[test]
    fn test_only_latest_backup_kept() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config");
        fs::write(&path, K3S_BUNDLE).unwrap();

        consolidate_at(CredentialBundle::parse(K3S_BUNDLE).unwrap(), &path, at(1)).unwrap();
        let report = consolidate_at(CredentialBundle::parse(K3S_BUNDLE).unwrap(), &path, at(2)).unwrap();

        assert_eq!(backups(dir.path()), vec!["config.backup.20240102030402"]);
        assert_eq!(report.backup, Some(dir.path().join("config.backup.20240102030402")));

        let merged = CredentialBundle::parse(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            merged.names(EntryKind::Context),
            vec!["default", "default_1", "default_2"]
        );
    }

    #[test]
    fn test_unreadable_store_backed_up_and_replaced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config");
        fs::write(&path, "clusters: [unclosed\n").unwrap();
        let incoming = CredentialBundle::parse(K3S_BUNDLE).unwrap();

        let report = consolidate_at(incoming.clone(), &path, at(3)).unwrap();

        let backup = report.backup.unwrap();
        assert_eq!(fs::read_to_string(backup).unwrap(), "clusters: [unclosed\n");
        let written = CredentialBundle::parse(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, incoming);
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config");
        consolidate_at(CredentialBundle::parse(K3S_BUNDLE).unwrap(), &path, at(0)).unwrap();
        assert!(!dir.path().join("config.tmp").exists());
    }
}
