use async_trait::async_trait;
use regex::Regex;
use std::io::{Cursor, Write};
use std::sync::{Arc, OnceLock};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::errors::PipelineError;
use crate::wire::FileEntry;

#[async_trait]
pub trait Packer: Send + Sync {
    /// Serialize `files` into archive bytes; each path becomes an entry name verbatim.
    async fn pack(&self, files: &[FileEntry]) -> Result<Vec<u8>, PipelineError>;
}

pub type DynPacker = Arc<dyn Packer>;

/// Deflate-compressed zip archives.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipPacker;

/// Download name for a pack: runs of characters outside `[A-Za-z0-9_-]` become `_`.
pub fn archive_filename(pack_name: &str) -> String {
    static UNSAFE_RUN: OnceLock<Regex> = OnceLock::new();
    let re = UNSAFE_RUN.get_or_init(|| Regex::new(r"[^A-Za-z0-9_-]+").expect("static pattern"));
    let base = if pack_name.is_empty() { "datapack" } else { pack_name };
    format!("{}.zip", re.replace_all(base, "_"))
}

pub fn zip_files(files: &[FileEntry]) -> Result<Vec<u8>, PipelineError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for file in files {
        writer.start_file(file.path.as_str(), options)?;
        writer
            .write_all(file.content.as_bytes())
            .map_err(|e| PipelineError::Packaging(format!("{}: {e}", file.path)))?;
    }

    Ok(writer.finish()?.into_inner())
}

#[async_trait]
impl Packer for ZipPacker {
    async fn pack(&self, files: &[FileEntry]) -> Result<Vec<u8>, PipelineError> {
        let files = files.to_vec();
        tokio::task::spawn_blocking(move || zip_files(&files))
            .await
            .map_err(|e| PipelineError::Packaging(format!("packing task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    fn entry(path: &str, content: &str) -> FileEntry {
        FileEntry { path: path.into(), content: content.into() }
    }

    #[tokio::test]
    async fn entries_round_trip_byte_for_byte() {
        let files = vec![
            entry("pack.mcmeta", "{\"pack\":{\"pack_format\":15,\"description\":\"Héal ✨\"}}"),
            entry("data/heal/functions/tick.mcfunction", "# tick\r\neffect give @a minecraft:regeneration 2 0\n"),
            entry("data/minecraft/tags/functions/tick.json", "{\"values\":[\"heal:tick\"]}"),
        ];
        let bytes = ZipPacker.pack(&files).await.unwrap();

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), files.len());
        for f in &files {
            let mut zf = archive.by_name(&f.path).unwrap();
            assert_eq!(zf.compression(), CompressionMethod::Deflated);
            let mut out = String::new();
            zf.read_to_string(&mut out).unwrap();
            assert_eq!(out, f.content);
        }
    }

    #[test]
    fn entry_order_follows_input() {
        let files = vec![entry("b.txt", "b"), entry("a.txt", "a")];
        let mut archive = ZipArchive::new(Cursor::new(zip_files(&files).unwrap())).unwrap();
        assert_eq!(archive.by_index(0).unwrap().name(), "b.txt");
        assert_eq!(archive.by_index(1).unwrap().name(), "a.txt");
    }

    #[test]
    fn filename_replaces_unsafe_runs() {
        assert_eq!(archive_filename("Healing Aura!"), "Healing_Aura_.zip");
        assert_eq!(archive_filename("vein-miner_2"), "vein-miner_2.zip");
        assert_eq!(archive_filename("../../etc"), "_etc.zip");
        assert_eq!(archive_filename("Ünïcode pack"), "_n_code_pack.zip");
        assert_eq!(archive_filename(""), "datapack.zip");
    }

    #[test]
    fn duplicate_entry_is_a_packaging_error() {
        let files = vec![entry("a.txt", "1"), entry("a.txt", "2")];
        assert!(matches!(zip_files(&files), Err(PipelineError::Packaging(_))));
    }
}
