use std::{
    collections::{BTreeMap, HashSet},
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use super::DatasetError::{self, *};
use crate::{
    keyword_tag, video::sanitize_file_stem, CandidateVideo, Clip, Fingerprint, SegmentedClip,
};

/// One row of the dataset index. `clip_path` is relative to the dataset directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub clip_path: PathBuf,
    pub keyword: String,
    pub source_name: String,
    pub source_video_id: String,
    pub source_url: String,
    pub sequence_index: u32,
    pub start_offset: f64,
    pub duration: f64,
    pub fingerprint: Fingerprint,
}

/// What startup reconciliation changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub dropped_rows: usize,
    pub deleted_orphans: usize,
}

/// Owns the dataset directory and its JSON Lines index. Accepted clips are moved in and
/// indexed one at a time, so after any crash the only possible inconsistencies are a clip
/// file without a row, or a torn final row. Both are repaired by [`DatasetIndexer::open`].
#[derive(Debug)]
pub struct DatasetIndexer {
    dataset_dir: PathBuf,
    index_file: PathBuf,
    records: Vec<DatasetRecord>,
    reconciliation: Reconciliation,
    writer: Option<File>,
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> DatasetError + '_ {
    move |src| DatasetIo {
        src,
        path: path.to_path_buf(),
    }
}

impl DatasetIndexer {
    /// Open (or create) the dataset, then make the index and the clip files agree: rows
    /// whose clip is gone are dropped and clip files that no row mentions are deleted.
    pub fn open(
        dataset_dir: impl AsRef<Path>,
        index_file: impl AsRef<Path>,
    ) -> Result<Self, DatasetError> {
        let dataset_dir = dataset_dir.as_ref().to_path_buf();
        let index_file = index_file.as_ref().to_path_buf();

        std::fs::create_dir_all(&dataset_dir).map_err(io_err(&dataset_dir))?;
        if let Some(parent) = index_file.parent() {
            std::fs::create_dir_all(parent).map_err(io_err(parent))?;
        }

        let mut ret = Self {
            dataset_dir,
            index_file,
            records: vec![],
            reconciliation: Reconciliation::default(),
            writer: None,
        };
        ret.reconcile()?;
        Ok(ret)
    }

    // Returns the parsed rows, the number of unreadable lines, and whether the file
    // ends mid-row (no trailing newline).
    fn read_index(&self) -> Result<(Vec<DatasetRecord>, usize, bool), DatasetError> {
        let contents = match std::fs::read_to_string(&self.index_file) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((vec![], 0, false)),
            Err(e) => return Err(io_err(&self.index_file)(e)),
        };
        let unterminated = !contents.is_empty() && !contents.ends_with('\n');

        let mut records = vec![];
        let mut bad_lines = 0;
        for (line_no, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<DatasetRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(
                        target: "dataset",
                        "{}:{}: skipping unreadable row: {e}",
                        self.index_file.display(),
                        line_no + 1
                    );
                    bad_lines += 1;
                }
            }
        }
        Ok((records, bad_lines, unterminated))
    }

    fn reconcile(&mut self) -> Result<(), DatasetError> {
        let (records, bad_lines, unterminated) = self.read_index()?;

        let (kept, dropped): (Vec<_>, Vec<_>) = records
            .into_iter()
            .partition(|r| self.dataset_dir.join(&r.clip_path).is_file());
        for record in &dropped {
            warn!(
                target: "dataset",
                "clip {} is missing. Dropping its index row.",
                record.clip_path.display()
            );
        }
        self.records = kept;

        // An unterminated final row would have the next append glued onto it.
        if !dropped.is_empty() || bad_lines > 0 || unterminated {
            self.rewrite_index()?;
        }

        let indexed = self
            .records
            .iter()
            .map(|r| r.clip_path.clone())
            .collect::<HashSet<_>>();

        let mut deleted_orphans = 0;
        for entry in WalkDir::new(&self.dataset_dir) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(target: "dataset", "{e}");
                    continue;
                }
            };
            let path = entry.path();
            let is_clip = entry.file_type().is_file()
                && path.extension().is_some_and(|ext| ext == "mp4");
            if !is_clip {
                continue;
            }

            let rel_path = path.strip_prefix(&self.dataset_dir).unwrap_or(path);
            if !indexed.contains(rel_path) {
                warn!(
                    target: "dataset",
                    "{} is not in the index. Deleting it.",
                    path.display()
                );
                std::fs::remove_file(path).map_err(io_err(path))?;
                deleted_orphans += 1;
            }
        }

        self.reconciliation = Reconciliation {
            dropped_rows: dropped.len(),
            deleted_orphans,
        };

        info!(
            target: "dataset",
            "dataset at {} holds {} clips",
            self.dataset_dir.display(),
            self.records.len()
        );
        Ok(())
    }

    // Replace the index with the current rows. Written to a temporary file first so
    // a crash can't lose the index.
    fn rewrite_index(&mut self) -> Result<(), DatasetError> {
        self.writer = None;
        let temp_path = self.index_file.with_extension("tmp");

        let temp_file = File::create(&temp_path).map_err(io_err(&temp_path))?;
        let mut buf = BufWriter::new(temp_file);
        for record in &self.records {
            let row =
                serde_json::to_string(record).map_err(|e| Serialization(e.to_string()))?;
            writeln!(buf, "{row}").map_err(io_err(&temp_path))?;
        }

        let temp_file = buf
            .into_inner()
            .map_err(|e| io_err(&temp_path)(e.into_error()))?;
        temp_file.sync_all().map_err(io_err(&temp_path))?;

        std::fs::rename(&temp_path, &self.index_file).map_err(io_err(&self.index_file))?;
        Ok(())
    }

    pub fn dataset_dir(&self) -> &Path {
        &self.dataset_dir
    }

    pub fn reconciliation(&self) -> Reconciliation {
        self.reconciliation
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> &[DatasetRecord] {
        &self.records
    }

    /// Number of indexed clips per keyword.
    pub fn per_keyword_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.keyword.clone()).or_default() += 1;
        }
        counts
    }

    /// Move an accepted clip into the dataset and index it. The file is moved before the
    /// row is written.
    pub fn accept(
        &mut self,
        segmented: &SegmentedClip,
        candidate: &CandidateVideo,
        keyword: &str,
        fingerprint: Fingerprint,
    ) -> Result<Clip, DatasetError> {
        let tag = keyword_tag(keyword);
        let keyword_dir = self.dataset_dir.join(&tag);
        std::fs::create_dir_all(&keyword_dir).map_err(io_err(&keyword_dir))?;

        let stem = format!(
            "{}_{}_{:03}",
            sanitize_file_stem(&candidate.source_name),
            sanitize_file_stem(&candidate.id),
            segmented.sequence_index
        );
        let rel_path = unused_clip_path(&self.dataset_dir, Path::new(&tag), &stem);
        let dest = self.dataset_dir.join(&rel_path);

        move_file(&segmented.file_path, &dest)?;

        let record = DatasetRecord {
            clip_path: rel_path,
            keyword: keyword.to_string(),
            source_name: candidate.source_name.clone(),
            source_video_id: candidate.id.clone(),
            source_url: candidate.url.clone(),
            sequence_index: segmented.sequence_index,
            start_offset: segmented.start_offset,
            duration: segmented.duration,
            fingerprint,
        };
        self.append_row(&record)?;
        self.records.push(record);

        Ok(Clip {
            source_video_id: candidate.id.clone(),
            keyword: keyword.to_string(),
            sequence_index: segmented.sequence_index,
            start_offset: segmented.start_offset,
            duration: segmented.duration,
            file_path: dest,
            fingerprint,
        })
    }

    fn append_row(&mut self, record: &DatasetRecord) -> Result<(), DatasetError> {
        let mut row =
            serde_json::to_string(record).map_err(|e| Serialization(e.to_string()))?;
        row.push('\n');

        let file = match self.writer.take() {
            Some(file) => file,
            None => OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.index_file)
                .map_err(io_err(&self.index_file))?,
        };
        let file = self.writer.insert(file);

        file.write_all(row.as_bytes()).map_err(io_err(&self.index_file))?;
        file.flush().map_err(io_err(&self.index_file))?;
        file.sync_data().map_err(io_err(&self.index_file))?;
        Ok(())
    }
}

fn unused_clip_path(dataset_dir: &Path, tag_dir: &Path, stem: &str) -> PathBuf {
    let mut rel_path = tag_dir.join(format!("{stem}.mp4"));
    let mut n = 1;
    while dataset_dir.join(&rel_path).exists() {
        rel_path = tag_dir.join(format!("{stem}-{n}.mp4"));
        n += 1;
    }
    rel_path
}

// rename doesn't work across filesystems, so fall back to copy and delete.
fn move_file(src: &Path, dest: &Path) -> Result<(), DatasetError> {
    if std::fs::rename(src, dest).is_ok() {
        return Ok(());
    }

    std::fs::copy(src, dest).map_err(io_err(src))?;
    std::fs::remove_file(src).map_err(io_err(src))?;
    Ok(())
}
