// 📦 Archive extraction - ZIP de comprobantes → directorio de trabajo

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io;
use std::path::Path;
use zip::ZipArchive;

/// Extract every entry of a ZIP archive under `dest`, keeping nested dirs
///
/// Entries whose path would escape `dest` (absolute, `..`) are skipped.
/// Returns the number of files written.
pub fn extract_archive(archive_path: &Path, dest: &Path) -> Result<usize> {
    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive: {}", archive_path.display()))?;

    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("Not a valid ZIP archive: {}", archive_path.display()))?;

    fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create directory: {}", dest.display()))?;

    let mut extracted = 0;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("Failed to read entry #{} of {}", i, archive_path.display()))?;

        let relative = match entry.enclosed_name() {
            Some(path) => path,
            None => {
                log::warn!("Skipping unsafe archive entry {:?}", entry.name());
                continue;
            }
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)
                .with_context(|| format!("Failed to create directory: {}", out_path.display()))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let mut out = File::create(&out_path)
            .with_context(|| format!("Failed to create file: {}", out_path.display()))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("Failed to extract {}", entry.name()))?;

        extracted += 1;
    }

    log::info!(
        "Extracted {} files from {}",
        extracted,
        archive_path.display()
    );

    Ok(extracted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        let options = SimpleFileOptions::default();
        for (name, content) in entries {
            if name.ends_with('/') {
                zip.add_directory(*name, options).unwrap();
            } else {
                zip.start_file(*name, options).unwrap();
                zip.write_all(content).unwrap();
            }
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_extracts_nested_entries() {
        let dir = TempDir::new().unwrap();
        let zip_path = dir.path().join("archivos.zip");
        write_zip(
            &zip_path,
            &[
                ("lote/", b""),
                ("lote/2024-01-05 PAGO ACME.pdf", b"%PDF"),
                ("lote/sub/2024-01-05_OP_ACME_1.pdf", b"%PDF"),
                ("leeme.txt", b"hola"),
            ],
        );

        let dest = dir.path().join("pdfs");
        let count = extract_archive(&zip_path, &dest).unwrap();

        assert_eq!(count, 3);
        assert!(dest.join("lote/2024-01-05 PAGO ACME.pdf").is_file());
        assert!(dest.join("lote/sub/2024-01-05_OP_ACME_1.pdf").is_file());
        assert_eq!(fs::read(dest.join("leeme.txt")).unwrap(), b"hola");
    }

    #[test]
    fn test_skips_escaping_entries() {
        let dir = TempDir::new().unwrap();
        let zip_path = dir.path().join("malo.zip");
        write_zip(&zip_path, &[("../fuera.pdf", b"x"), ("ok.pdf", b"y")]);

        let dest = dir.path().join("pdfs");
        let count = extract_archive(&zip_path, &dest).unwrap();

        assert_eq!(count, 1);
        assert!(!dir.path().join("fuera.pdf").exists());
        assert!(dest.join("ok.pdf").is_file());
    }

    #[test]
    fn test_invalid_archive_is_error() {
        let dir = TempDir::new().unwrap();
        let bogus = dir.path().join("no-zip.zip");
        fs::write(&bogus, b"this is not a zip").unwrap();

        let err = extract_archive(&bogus, &dir.path().join("out")).unwrap_err();
        assert!(format!("{:#}", err).contains("Not a valid ZIP"));
    }
}
