use std::fs::{self, File};
use std::io;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tracing::warn;

/// Decompresses one archive into a destination directory, creating the
/// destination if absent. Archive-format internals stay behind this seam.
pub trait ArchiveExtractor {
    fn extract(&self, archive: &Path, dest_dir: &Path) -> Result<()>;
}

/// Zip-backed extractor. 7-Zip containers are accepted as uploads but this
/// extractor cannot unpack them; they are rejected up front with a message
/// naming the limitation, which the dispatcher treats as a non-fatal
/// per-archive extraction failure.
#[derive(Debug, Default)]
pub struct ZipExtractor;

impl ArchiveExtractor for ZipExtractor {
    fn extract(&self, archive: &Path, dest_dir: &Path) -> Result<()> {
        let extension = archive
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase);
        if extension.as_deref() == Some("7z") {
            return Err(anyhow!(
                "{} is a 7-Zip archive; this extractor handles zip only, repack the upload as zip",
                archive.display()
            ));
        }

        fs::create_dir_all(dest_dir)
            .with_context(|| format!("failed to create {}", dest_dir.display()))?;

        let file = File::open(archive)
            .with_context(|| format!("failed to open archive {}", archive.display()))?;
        let mut zip = zip::ZipArchive::new(file)
            .with_context(|| format!("failed to read archive {}", archive.display()))?;

        for index in 0..zip.len() {
            let mut entry = zip
                .by_index(index)
                .with_context(|| format!("failed to read entry {index} of {}", archive.display()))?;

            // enclosed_name rejects entries that would escape dest_dir.
            let relative = match entry.enclosed_name() {
                Some(relative) => relative,
                None => {
                    warn!(
                        archive = %archive.display(),
                        entry = entry.name(),
                        "skipping archive entry with unsafe path"
                    );
                    continue;
                }
            };
            let target = dest_dir.join(relative);

            if entry.is_dir() {
                fs::create_dir_all(&target)
                    .with_context(|| format!("failed to create {}", target.display()))?;
                continue;
            }

            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let mut output = File::create(&target)
                .with_context(|| format!("failed to create {}", target.display()))?;
            io::copy(&mut entry, &mut output)
                .with_context(|| format!("failed to write {}", target.display()))?;
        }

        if zip.is_empty() {
            return Err(anyhow!("archive {} contains no entries", archive.display()));
        }
        Ok(())
    }
}
