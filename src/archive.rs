//! Deterministic `.tar.gz` packing of the patch series.
//!
//! Members are the immediate regular files of a directory, sorted by name,
//! with normalized headers (mtime 0, uid/gid 0, mode 0644). The gzip header
//! carries no timestamp, so equal inputs produce byte-identical archives.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::{Compression, GzBuilder};
use log::debug;
use walkdir::WalkDir;

use crate::error::Result;

/// Regular files directly inside `dir`, sorted by file name.
fn archive_members(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut members = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file() {
            members.push(entry.into_path());
        }
    }
    Ok(members)
}

/// Pack the regular files of `src_dir` into `archive_path`, replacing any
/// existing archive.
///
/// Returns the number of members written.
pub fn create_tar_gz(src_dir: &Path, archive_path: &Path) -> Result<usize> {
    let members = archive_members(src_dir)?;
    if let Some(parent) = archive_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file = BufWriter::new(File::create(archive_path)?);
    let encoder = GzBuilder::new().mtime(0).write(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.mode(tar::HeaderMode::Deterministic);

    for path in &members {
        let name = path.file_name().unwrap_or_default();
        let bytes = fs::read(path)?;
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(bytes.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        header.set_cksum();
        builder.append_data(&mut header, name, bytes.as_slice())?;
    }

    let encoder = builder.into_inner()?;
    let mut file = encoder.finish()?;
    file.flush()?;

    debug!(
        "packed {} files from {} into {}",
        members.len(),
        src_dir.display(),
        archive_path.display()
    );
    Ok(members.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::TempDir;

    fn read_members(archive: &Path) -> Vec<(String, u32, u64, Vec<u8>)> {
        let mut tar = tar::Archive::new(GzDecoder::new(File::open(archive).unwrap()));
        tar.entries()
            .unwrap()
            .map(|e| {
                let mut e = e.unwrap();
                let name = e.path().unwrap().to_string_lossy().into_owned();
                let mode = e.header().mode().unwrap();
                let mtime = e.header().mtime().unwrap();
                let mut body = Vec::new();
                e.read_to_end(&mut body).unwrap();
                (name, mode, mtime, body)
            })
            .collect()
    }

    #[test]
    fn test_members_sorted_with_normalized_headers() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("patches");
        fs::create_dir_all(src.join("subdir")).unwrap();
        fs::write(src.join("0002-b.patch"), "b\n").unwrap();
        fs::write(src.join("0001-a.patch"), "a\n").unwrap();
        fs::write(src.join("subdir/ignored.patch"), "x\n").unwrap();
        let archive = temp.path().join("patches.tar.gz");

        assert_eq!(create_tar_gz(&src, &archive).unwrap(), 2);
        let members = read_members(&archive);
        assert_eq!(
            members,
            vec![
                ("0001-a.patch".to_string(), 0o644, 0, b"a\n".to_vec()),
                ("0002-b.patch".to_string(), 0o644, 0, b"b\n".to_vec()),
            ]
        );
    }

    #[test]
    fn test_archive_is_reproducible() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("patches");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("0001-a.patch"), "a\n").unwrap();
        let first = temp.path().join("one.tar.gz");
        let second = temp.path().join("two.tar.gz");

        create_tar_gz(&src, &first).unwrap();
        create_tar_gz(&src, &second).unwrap();
        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    }

    #[test]
    fn test_existing_archive_is_replaced() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("patches");
        fs::create_dir_all(&src).unwrap();
        let archive = temp.path().join("out/patches.tar.gz");
        fs::create_dir_all(archive.parent().unwrap()).unwrap();
        fs::write(&archive, "not an archive").unwrap();

        assert_eq!(create_tar_gz(&src, &archive).unwrap(), 0);
        assert!(read_members(&archive).is_empty());
    }
}
