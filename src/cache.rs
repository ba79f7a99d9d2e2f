//! Write-once artifact storage keyed by (session, artifact name).
//!
//! Each artifact has exactly one producer.  A second write of the same key
//! is an error, and so is a read of a key nobody wrote; nothing is ever
//! recomputed behind the caller's back.
use crate::error::{Error, Result};
use crate::io::{SafeTensors, StWriter};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// In-memory store.
#[derive(Debug, Clone)]
pub struct ArtifactStore<T> {
    items: BTreeMap<(String, String), T>,
}

impl<T> Default for ArtifactStore<T> {
    fn default() -> Self {
        Self { items: BTreeMap::new() }
    }
}

impl<T> ArtifactStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// [`Error::ArtifactExists`] if the key is already present.
    pub fn insert(&mut self, session: &str, name: &str, value: T) -> Result<()> {
        let key = (session.to_string(), name.to_string());
        if self.items.contains_key(&key) {
            return Err(Error::ArtifactExists { session: key.0, name: key.1 });
        }
        self.items.insert(key, value);
        Ok(())
    }

    /// # Errors
    ///
    /// [`Error::MissingArtifact`] if the key was never written.
    pub fn get(&self, session: &str, name: &str) -> Result<&T> {
        self.items
            .get(&(session.to_string(), name.to_string()))
            .ok_or_else(|| Error::MissingArtifact {
                session: session.to_string(),
                name: name.to_string(),
            })
    }

    pub fn contains(&self, session: &str, name: &str) -> bool {
        self.items.contains_key(&(session.to_string(), name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Artifacts named `name`, in session order.
    pub fn by_name<'a>(&'a self, name: &'a str) -> impl Iterator<Item = (&'a str, &'a T)> + 'a {
        self.items
            .iter()
            .filter(move |((_, n), _)| n == name)
            .map(|((s, _), v)| (s.as_str(), v))
    }
}

/// On-disk store: `<root>/<session>/<name>.safetensors`.
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, session: &str, name: &str) -> PathBuf {
        self.root.join(session).join(format!("{name}.safetensors"))
    }

    pub fn contains(&self, session: &str, name: &str) -> bool {
        self.path(session, name).is_file()
    }

    /// Write an artifact, creating the session directory if needed.
    ///
    /// # Errors
    ///
    /// [`Error::ArtifactExists`] if the file is already there.
    pub fn write(&self, session: &str, name: &str, tensors: &StWriter) -> Result<PathBuf> {
        let path = self.path(session, name);
        if path.exists() {
            return Err(Error::ArtifactExists { session: session.into(), name: name.into() });
        }
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        }
        tensors.write(&path)?;
        Ok(path)
    }

    /// # Errors
    ///
    /// [`Error::MissingArtifact`] if the file does not exist.
    pub fn read(&self, session: &str, name: &str) -> Result<SafeTensors> {
        let path = self.path(session, name);
        if !path.is_file() {
            return Err(Error::MissingArtifact { session: session.into(), name: name.into() });
        }
        SafeTensors::read(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_write_is_rejected() {
        let mut store = ArtifactStore::new();
        store.insert("R042-d1", "swrs", 1).unwrap();
        let err = store.insert("R042-d1", "swrs", 2).unwrap_err();
        assert!(matches!(err, Error::ArtifactExists { .. }));
        assert_eq!(*store.get("R042-d1", "swrs").unwrap(), 1);
        store.insert("R042-d2", "swrs", 3).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn missing_read_fails_loudly() {
        let store: ArtifactStore<u8> = ArtifactStore::new();
        match store.get("R042-d1", "likelihood") {
            Err(Error::MissingArtifact { session, name }) => {
                assert_eq!(session, "R042-d1");
                assert_eq!(name, "likelihood");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn by_name_lists_sessions_in_order() {
        let mut store = ArtifactStore::new();
        store.insert("b", "x", 2).unwrap();
        store.insert("a", "x", 1).unwrap();
        store.insert("a", "y", 9).unwrap();
        let got: Vec<_> = store.by_name("x").map(|(s, v)| (s.to_string(), *v)).collect();
        assert_eq!(got, vec![("a".to_string(), 1), ("b".to_string(), 2)]);
    }

    #[test]
    fn disk_store_is_write_once() {
        let root = std::env::temp_dir().join(format!("swrdecode-cache-{}", std::process::id()));
        let store = DiskStore::new(&root);
        let mut w = StWriter::new();
        w.add_f64_vec("v", &[1.0, 2.0]);
        store.write("s1", "out", &w).unwrap();
        assert!(matches!(store.write("s1", "out", &w), Err(Error::ArtifactExists { .. })));
        assert_eq!(store.read("s1", "out").unwrap().f64("v").unwrap(), vec![1.0, 2.0]);
        assert!(matches!(store.read("s1", "nope"), Err(Error::MissingArtifact { .. })));
        std::fs::remove_dir_all(&root).unwrap();
    }
}
