use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use log::{info, warn};
use thiserror::Error;

use super::Fingerprint;

#[derive(Error, Debug)]
pub enum HashStoreError {
    #[error("Error accessing hash store {path}: {src}")]
    HashFileIo { src: std::io::Error, path: PathBuf },
}

/// Durable, append-only storage for the fingerprints of every accepted clip.
pub trait HashStore: Send {
    /// Every fingerprint appended so far, in append order.
    fn load(&mut self) -> Result<Vec<Fingerprint>, HashStoreError>;

    /// Persist one more fingerprint. When this returns Ok the fingerprint survives a crash.
    fn append(&mut self, fingerprint: &Fingerprint) -> Result<(), HashStoreError>;
}

/// A text file with one hex fingerprint per line.
#[derive(Debug)]
pub struct FileHashStore {
    path: PathBuf,
    writer: Option<File>,
}

impl FileHashStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            writer: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, src: std::io::Error) -> HashStoreError {
        HashStoreError::HashFileIo {
            src,
            path: self.path.clone(),
        }
    }

    fn open_for_append(&mut self) -> Result<&mut File, HashStoreError> {
        let file = match self.writer.take() {
            Some(file) => file,
            None => self.open_new_writer()?,
        };

        Ok(self.writer.insert(file))
    }

    fn open_new_writer(&self) -> Result<File, HashStoreError> {
        if let Some(parent_dir) = self.path.parent() {
            std::fs::create_dir_all(parent_dir).map_err(|e| self.io_err(e))?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;

        // A crash mid-append can leave a torn final line. Terminate it so the next
        // entry starts on a line of its own; load() skips the fragment.
        if ends_without_newline(&mut file).map_err(|e| self.io_err(e))? {
            file.write_all(b"\n").map_err(|e| self.io_err(e))?;
        }

        Ok(file)
    }
}

fn ends_without_newline(file: &mut File) -> std::io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }

    let mut last_byte = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last_byte)?;
    Ok(last_byte[0] != b'\n')
}

impl HashStore for FileHashStore {
    fn load(&mut self) -> Result<Vec<Fingerprint>, HashStoreError> {
        //A missing store just means that nothing has been collected yet.
        if !self.path.exists() {
            info!(target: "hash_store", "Creating new hash store: {}", self.path.display());
            return Ok(vec![]);
        }

        let contents = std::fs::read_to_string(&self.path).map_err(|e| self.io_err(e))?;

        let mut fingerprints = vec![];
        for (line_idx, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }

            match line.parse::<Fingerprint>() {
                Ok(fingerprint) => fingerprints.push(fingerprint),
                Err(e) => warn!(
                    target: "hash_store",
                    "{}:{}: skipping unreadable entry: {}",
                    self.path.display(),
                    line_idx + 1,
                    e
                ),
            }
        }

        info!(
            target: "hash_store",
            "Loaded {} fingerprints from {}",
            fingerprints.len(),
            self.path.display()
        );

        Ok(fingerprints)
    }

    fn append(&mut self, fingerprint: &Fingerprint) -> Result<(), HashStoreError> {
        let line = format!("{}\n", fingerprint.to_hex());
        let file = self.open_for_append()?;

        let result = file
            .write_all(line.as_bytes())
            .and_then(|()| file.flush())
            .and_then(|()| file.sync_data());

        result.map_err(|e| self.io_err(e))
    }
}

#[cfg(test)]
mod test {
    use rand::prelude::*;

    use super::*;

    #[test]
    fn test_appended_fingerprints_survive_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta").join("hashes.txt");
        let mut rng = StdRng::seed_from_u64(5);
        let fingerprints = (0..5)
            .map(|_| Fingerprint::random(&mut rng))
            .collect::<Vec<_>>();

        let mut store = FileHashStore::new(&path);
        assert!(store.load().unwrap().is_empty());
        for f in &fingerprints {
            store.append(f).unwrap();
        }
        drop(store);

        let mut reopened = FileHashStore::new(&path);
        assert_eq!(reopened.load().unwrap(), fingerprints);
    }

    #[test]
    fn test_torn_and_foreign_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hashes.txt");
        let mut rng = StdRng::seed_from_u64(6);
        let good = Fingerprint::random(&mut rng);
        let later = Fingerprint::random(&mut rng);

        // an md5 digest, a valid entry, then a line cut short by a crash
        let torn = &good.to_hex()[..20];
        std::fs::write(
            &path,
            format!("d41d8cd98f00b204e9800998ecf8427e\n{good}\n{torn}"),
        )
        .unwrap();

        let mut store = FileHashStore::new(&path);
        assert_eq!(store.load().unwrap(), vec![good]);

        store.append(&later).unwrap();
        let mut reopened = FileHashStore::new(&path);
        assert_eq!(reopened.load().unwrap(), vec![good, later]);
    }
}
