use std::{fs::File, path::Path};

use flate2::{write::GzEncoder, Compression};
use log::info;
use walkdir::WalkDir;

use super::DatasetError::{self, *};

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> DatasetError + '_ {
    move |src| DatasetIo {
        src,
        path: path.to_path_buf(),
    }
}

/// Pack every file under `dataset_dir` into a gzip-compressed tar at `archive_path`.
/// Entries are stored under the dataset directory's own name.
pub fn archive_dataset(
    dataset_dir: impl AsRef<Path>,
    archive_path: impl AsRef<Path>,
) -> Result<(), DatasetError> {
    let dataset_dir = dataset_dir.as_ref();
    let archive_path = archive_path.as_ref();

    if archive_path.starts_with(dataset_dir) {
        return Err(InvalidArchivePath(archive_path.to_path_buf()));
    }

    if let Some(parent) = archive_path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err(parent))?;
    }

    let root_name = dataset_dir
        .file_name()
        .map(Path::new)
        .unwrap_or(Path::new("dataset"));

    info!(
        target: "dataset",
        "archiving {} to {}", dataset_dir.display(), archive_path.display()
    );

    let file = File::create(archive_path).map_err(io_err(archive_path))?;
    let mut tar = tar::Builder::new(GzEncoder::new(file, Compression::default()));

    for entry in WalkDir::new(dataset_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| DatasetIo {
            src: e.into(),
            path: dataset_dir.to_path_buf(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let rel_path = path.strip_prefix(dataset_dir).unwrap_or(path);
        tar.append_path_with_name(path, root_name.join(rel_path))
            .map_err(io_err(path))?;
    }

    let file = tar
        .into_inner()
        .and_then(GzEncoder::finish)
        .map_err(io_err(archive_path))?;
    file.sync_all().map_err(io_err(archive_path))?;
    Ok(())
}

#[cfg(test)]
mod test {
    use std::{io::Read, path::PathBuf};

    use flate2::read::GzDecoder;

    use super::*;

    #[test]
    fn test_archive_contains_every_clip() {
        let dir = tempfile::tempdir().unwrap();
        let dataset_dir = dir.path().join("dataset");
        std::fs::create_dir_all(dataset_dir.join("rain")).unwrap();
        std::fs::create_dir_all(dataset_dir.join("desert")).unwrap();
        std::fs::write(dataset_dir.join("rain/local_a_000.mp4"), b"clip a").unwrap();
        std::fs::write(dataset_dir.join("desert/local_b_001.mp4"), b"clip b").unwrap();

        let archive_path = dir.path().join("out").join("dataset.tar.gz");
        archive_dataset(&dataset_dir, &archive_path).unwrap();

        let mut archive = tar::Archive::new(GzDecoder::new(File::open(&archive_path).unwrap()));
        let mut entries = vec![];
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let mut contents = String::new();
            entry.read_to_string(&mut contents).unwrap();
            entries.push((entry.path().unwrap().into_owned(), contents));
        }

        assert_eq!(
            entries,
            vec![
                (
                    PathBuf::from("dataset/desert/local_b_001.mp4"),
                    "clip b".to_string()
                ),
                (
                    PathBuf::from("dataset/rain/local_a_000.mp4"),
                    "clip a".to_string()
                ),
            ]
        );
    }

    #[test]
    fn test_archive_inside_dataset_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let result = archive_dataset(dir.path(), dir.path().join("self.tar.gz"));
        assert!(matches!(result, Err(InvalidArchivePath(_))));
    }
}
