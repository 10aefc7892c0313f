//! Byte sources: where class bytes come from when the resolver needs a class
//! other than the one being reconstructed.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};

use crate::error::ClassFileResult;

/// Supplies raw class-file bytes by internal name (`java/lang/String`).
///
/// Implementations are shared read-only between reconstructions running on
/// different threads.
pub trait ClassSource: Send + Sync {
    fn can_load(&self, internal_name: &str) -> bool;

    /// `None` when the class is not available from this source.
    fn load(&self, internal_name: &str) -> Option<Vec<u8>>;
}

/// A source with nothing in it. Resolution degrades to raw names.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptySource;

impl ClassSource for EmptySource {
    fn can_load(&self, _internal_name: &str) -> bool {
        false
    }

    fn load(&self, _internal_name: &str) -> Option<Vec<u8>> {
        None
    }
}

/// In-memory source keyed by internal name.
#[derive(Clone, Debug, Default)]
pub struct MapSource {
    classes: BTreeMap<String, Vec<u8>>,
}

impl MapSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, internal_name: impl Into<String>, bytes: Vec<u8>) {
        self.classes.insert(internal_name.into(), bytes);
    }

    pub fn with(mut self, internal_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.insert(internal_name, bytes);
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(|s| s.as_str())
    }
}

impl ClassSource for MapSource {
    fn can_load(&self, internal_name: &str) -> bool {
        self.classes.contains_key(internal_name)
    }

    fn load(&self, internal_name: &str) -> Option<Vec<u8>> {
        self.classes.get(internal_name).cloned()
    }
}

/// Class files laid out under a root directory by package path.
#[derive(Clone, Debug)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, internal_name: &str) -> PathBuf {
        let mut path = self.root.clone();
        path.extend(internal_name.split('/'));
        path.set_extension("class");
        path
    }
}

impl ClassSource for DirectorySource {
    fn can_load(&self, internal_name: &str) -> bool {
        self.path_for(internal_name).is_file()
    }

    fn load(&self, internal_name: &str) -> Option<Vec<u8>> {
        match std::fs::read(self.path_for(internal_name)) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                log::debug!("{} not loadable from {}: {}", internal_name, self.root.display(), e);
                None
            }
        }
    }
}

/// The `.class` entries of a jar archive, read eagerly into memory.
#[derive(Clone, Debug, Default)]
pub struct JarSource {
    entries: BTreeMap<String, Vec<u8>>,
}

impl JarSource {
    /// Read a jar from any reader.
    pub fn read<R: Read + Seek>(reader: R) -> ClassFileResult<Self> {
        let mut archive = zip::ZipArchive::new(reader)?;
        let mut entries = BTreeMap::new();

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let Some(internal_name) = file.name().strip_suffix(".class").map(str::to_string) else {
                continue;
            };
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;
            entries.insert(internal_name, data);
        }

        log::debug!("jar source holds {} classes", entries.len());
        Ok(JarSource { entries })
    }

    pub fn from_bytes(bytes: &[u8]) -> ClassFileResult<Self> {
        Self::read(Cursor::new(bytes))
    }

    pub fn open(path: impl AsRef<Path>) -> ClassFileResult<Self> {
        let file = std::fs::File::open(path)?;
        Self::read(std::io::BufReader::new(file))
    }

    /// Internal names of every class in the archive, sorted.
    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|s| s.as_str())
    }
}

impl ClassSource for JarSource {
    fn can_load(&self, internal_name: &str) -> bool {
        self.entries.contains_key(internal_name)
    }

    fn load(&self, internal_name: &str) -> Option<Vec<u8>> {
        self.entries.get(internal_name).cloned()
    }
}
