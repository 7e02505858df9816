//! Keypair files: one JSON array of the 64 keypair bytes per entity.
//!
//! Files are resolved against an explicit keystore directory instead of the
//! process working directory. A file is written exactly once; saving over an
//! existing file fails with [`VrfError::AlreadyExists`] and leaves it intact.

use solana_sdk::signature::Keypair;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::VrfError;

pub const FULFILLMENT_MANAGER_FILE: &str = "ffmAccount.json";
pub const ORACLE_AUTH_FILE: &str = "oracleAuthAccount.json";
pub const VRF_ACCOUNT_FILE: &str = "vrfAccount.json";
pub const VRF_PERMIT_FILE: &str = "vrfPermitAccount.json";
pub const PRODUCER_PERMIT_FILE: &str = "producerPermitAccount.json";

#[derive(Debug, Clone)]
pub struct KeyStore {
    dir: PathBuf,
}

impl KeyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve a file name. Absolute and `~` paths are used as given,
    /// anything else is placed inside the keystore directory.
    pub fn path_for(&self, name: &str) -> PathBuf {
        let expanded = PathBuf::from(shellexpand::tilde(name).as_ref());
        if expanded.is_absolute() {
            expanded
        } else {
            self.dir.join(expanded)
        }
    }

    /// Fail early when a creation command would overwrite a keypair.
    pub fn ensure_absent(&self, name: &str) -> Result<PathBuf, VrfError> {
        let path = self.path_for(name);
        if path.exists() {
            return Err(VrfError::AlreadyExists { path });
        }
        Ok(path)
    }

    pub fn load(&self, name: &str) -> Result<Keypair, VrfError> {
        read_keypair(&self.path_for(name))
    }

    pub fn save(&self, name: &str, keypair: &Keypair) -> Result<PathBuf, VrfError> {
        let path = self.path_for(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        write_new_keypair(&path, keypair)?;
        Ok(path)
    }
}

pub fn read_keypair(path: &Path) -> Result<Keypair, VrfError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(VrfError::NotFound {
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(e.into()),
    };

    let invalid = |reason: String| VrfError::InvalidKeypair {
        path: path.to_path_buf(),
        reason,
    };
    let bytes: Vec<u8> = serde_json::from_str(&contents).map_err(|e| invalid(e.to_string()))?;
    Keypair::try_from(bytes.as_slice()).map_err(|e| invalid(e.to_string()))
}

/// Create `path` and write the keypair into it. Never truncates.
pub fn write_new_keypair(path: &Path, keypair: &Keypair) -> Result<(), VrfError> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = match options.open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(VrfError::AlreadyExists {
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(e.into()),
    };

    let written = write_contents(&mut file, keypair);
    drop(file);
    discard_on_error(path, written)?;

    debug!(path = %path.display(), "Wrote keypair file");
    Ok(())
}

fn write_contents(file: &mut File, keypair: &Keypair) -> std::io::Result<()> {
    let json = serde_json::to_string(&keypair.to_bytes().to_vec()).map_err(std::io::Error::other)?;
    file.write_all(json.as_bytes())?;
    file.sync_all()
}

/// Remove a partially written file so the name can be saved again.
fn discard_on_error(path: &Path, written: std::io::Result<()>) -> Result<(), VrfError> {
    let Err(e) = written else {
        return Ok(());
    };
    if let Err(remove) = std::fs::remove_file(path) {
        warn!(path = %path.display(), error = %remove, "Failed to remove partial keypair file");
    }
    Err(e.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::signature::Signer;

    #[test]
    fn save_then_load_returns_same_identity() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path());
        let keypair = Keypair::new();

        let path = store.save(VRF_ACCOUNT_FILE, &keypair).unwrap();
        assert_eq!(path, dir.path().join(VRF_ACCOUNT_FILE));
        assert_eq!(store.load(VRF_ACCOUNT_FILE).unwrap().pubkey(), keypair.pubkey());
    }

    #[test]
    fn file_is_a_json_byte_array() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path());
        let keypair = Keypair::new();
        let path = store.save("payer.json", &keypair).unwrap();

        let raw: Vec<u8> = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(raw.len(), 64);
        assert_eq!(raw, keypair.to_bytes().to_vec());
    }

    #[test]
    fn save_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path());
        let path = store.save(VRF_ACCOUNT_FILE, &Keypair::new()).unwrap();
        let before = std::fs::read(&path).unwrap();

        let err = store.save(VRF_ACCOUNT_FILE, &Keypair::new()).unwrap_err();
        assert!(matches!(err, VrfError::AlreadyExists { path: p } if p == path));
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn ensure_absent_detects_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path());
        assert!(store.ensure_absent(VRF_PERMIT_FILE).is_ok());

        store.save(VRF_PERMIT_FILE, &Keypair::new()).unwrap();
        assert!(matches!(
            store.ensure_absent(VRF_PERMIT_FILE),
            Err(VrfError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn failed_write_leaves_no_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path());
        let path = store.path_for(VRF_ACCOUNT_FILE);
        std::fs::write(&path, "[12, 3").unwrap();

        let err = discard_on_error(&path, Err(std::io::Error::other("disk full"))).unwrap_err();
        assert!(matches!(err, VrfError::Io(_)));
        assert!(!path.exists());

        let keypair = Keypair::new();
        store.save(VRF_ACCOUNT_FILE, &keypair).unwrap();
        assert_eq!(store.load(VRF_ACCOUNT_FILE).unwrap().pubkey(), keypair.pubkey());
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path());
        assert!(matches!(store.load("nope.json"), Err(VrfError::NotFound { .. })));
    }

    #[test]
    fn garbage_file_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "[1,2,3]").unwrap();
        let store = KeyStore::new(dir.path());
        assert!(matches!(store.load("bad.json"), Err(VrfError::InvalidKeypair { .. })));
    }

    #[test]
    fn absolute_names_bypass_keystore_dir() {
        let store = KeyStore::new("/var/keys");
        assert_eq!(store.path_for("/tmp/payer.json"), PathBuf::from("/tmp/payer.json"));
        assert_eq!(store.path_for("payer.json"), PathBuf::from("/var/keys/payer.json"));
    }
}
