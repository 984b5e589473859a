//! Minimal key/value blob store backing index persistence.
//!
//! One file per key inside a namespace directory. A flush is staged: every
//! value is first written to `<key>.tmp`, then the whole set is renamed
//! into place. A failure during staging leaves the committed files
//! untouched, so the previous index remains loadable on the next mount.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

pub struct KvStore {
    dir: PathBuf,
}

impl KvStore {
    pub fn open(dir: PathBuf) -> io::Result<Self> {
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn get(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.dir.join(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write the full key set atomically-per-key: stage everything, then
    /// commit via rename.
    pub fn commit(&self, entries: &[(String, Vec<u8>)]) -> io::Result<()> {
        for (key, value) in entries {
            let staged = self.dir.join(format!("{key}.tmp"));
            let mut file = fs::File::create(&staged)?;
            file.write_all(value)?;
            file.sync_all()?;
        }
        for (key, _) in entries {
            fs::rename(self.dir.join(format!("{key}.tmp")), self.dir.join(key))?;
        }
        Ok(())
    }

    /// Remove every key the predicate selects. Returns how many went away.
    pub fn remove_where<F: Fn(&str) -> bool>(&self, pred: F) -> io::Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if pred(name) {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
