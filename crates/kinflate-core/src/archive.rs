//! Chart archive (`.tgz`) packing and unpacking
//!
//! Archives follow the chart convention: every entry lives below a single
//! top-level directory named after the chart.

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Component, Path};
use tar::{Archive, Builder, Header};

use crate::error::{CoreError, Result};

/// Directory names never packed into an archive
const SKIPPED_DIRS: &[&str] = &["tmpcharts", ".git"];

/// Pack a chart directory into gzipped tar bytes below `<root_name>/`
pub fn pack_directory(dir: &Path, root_name: &str) -> Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);

    let mut files = Vec::new();
    let walker = walkdir::WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !e
                    .file_name()
                    .to_str()
                    .is_some_and(|n| SKIPPED_DIRS.contains(&n))
        });
    for entry in walker {
        let entry = entry.map_err(|e| CoreError::Archive {
            message: format!("walk {}: {}", dir.display(), e),
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();

    for file in files {
        let rel = file.strip_prefix(dir).unwrap_or(&file);
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let content = std::fs::read(&file)?;
        add_bytes_to_archive(&mut builder, &format!("{}/{}", root_name, name), &content)?;
    }

    let encoder = builder.into_inner()?;
    Ok(encoder.finish()?)
}

/// Read every regular file of a gzipped tar archive into memory.
///
/// Keys are `/`-separated paths as stored in the archive. Entries that
/// would escape the archive root are rejected.
pub fn read_archive(bytes: &[u8]) -> Result<BTreeMap<String, Vec<u8>>> {
    let mut archive = Archive::new(GzDecoder::new(bytes));
    let mut files = BTreeMap::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let path = entry.path()?.into_owned();
        let mut parts = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(p) => parts.push(p.to_string_lossy().into_owned()),
                Component::CurDir => {}
                _ => {
                    return Err(CoreError::Archive {
                        message: format!("illegal path in archive: {}", path.display()),
                    });
                }
            }
        }
        if parts.is_empty() {
            continue;
        }

        let mut data = Vec::new();
        entry.read_to_end(&mut data)?;
        files.insert(parts.join("/"), data);
    }

    Ok(files)
}

fn add_bytes_to_archive<W: Write>(
    builder: &mut Builder<W>,
    archive_path: &str,
    content: &[u8],
) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    // Reproducible archives
    header.set_mtime(0);
    header.set_cksum();

    builder.append_data(&mut header, archive_path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_pack_and_read() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        std::fs::write(dir.join("Chart.yaml"), "name: demo\nversion: 0.1.0\n").unwrap();
        std::fs::create_dir_all(dir.join("templates")).unwrap();
        std::fs::write(dir.join("templates/cm.yaml"), "kind: ConfigMap\n").unwrap();
        std::fs::create_dir_all(dir.join("tmpcharts")).unwrap();
        std::fs::write(dir.join("tmpcharts/leftover.tgz"), "junk").unwrap();

        let bytes = pack_directory(dir, "demo").unwrap();
        let files = read_archive(&bytes).unwrap();

        let names: Vec<_> = files.keys().cloned().collect();
        assert_eq!(names, vec!["demo/Chart.yaml", "demo/templates/cm.yaml"]);
        assert_eq!(files["demo/templates/cm.yaml"], b"kind: ConfigMap\n");
    }

    #[test]
    fn test_pack_is_reproducible() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("Chart.yaml"), "name: demo\n").unwrap();

        let first = pack_directory(temp.path(), "demo").unwrap();
        let second = pack_directory(temp.path(), "demo").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_read_archive_rejects_garbage() {
        assert!(read_archive(b"not a gzip stream").is_err());
    }
}
