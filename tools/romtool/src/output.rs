//! Output files
//!
//! Outputs are first written to temp files next to their destination, then
//! renamed into place together once every one of them was written. A run
//! that fails never leaves a half written image behind.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{Result, RomToolError};

struct Staged {
    path: PathBuf,
    file: NamedTempFile,
    len: usize,
    crc32: u32,
}

#[derive(Default)]
pub struct StagedOutputs {
    staged: Vec<Staged>,
}

impl StagedOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&mut self, path: &Path, bytes: &[u8]) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(|e| RomToolError::io(dir, e))?;

        let mut file = NamedTempFile::new_in(dir).map_err(|e| RomToolError::io(dir, e))?;
        file.write_all(bytes)
            .and_then(|_| file.as_file().sync_all())
            .map_err(|e| RomToolError::io(file.path(), e))?;

        debug!("staged {} as {}", path.display(), file.path().display());
        self.staged.push(Staged {
            path: path.to_path_buf(),
            file,
            len: bytes.len(),
            crc32: crc32fast::hash(bytes),
        });
        Ok(())
    }

    /// Moves every staged file to its destination.
    pub fn commit(self) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(self.staged.len());
        for staged in self.staged {
            staged
                .file
                .persist(&staged.path)
                .map_err(|e| RomToolError::io(&staged.path, e.error))?;

            info!(
                "Created {} ({} bytes, CRC32 {:08X})",
                staged.path.display(),
                staged.len,
                staged.crc32
            );
            written.push(staged.path);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_appears_before_commit() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out/roms.uf2");

        let mut outputs = StagedOutputs::new();
        outputs.stage(&target, b"blocks").unwrap();
        assert!(!target.exists());

        let written = outputs.commit().unwrap();
        assert_eq!(written, vec![target.clone()]);
        assert_eq!(std::fs::read(&target).unwrap(), b"blocks");
    }

    #[test]
    fn dropped_stage_leaves_old_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("config.bin");
        std::fs::write(&target, b"previous").unwrap();

        let mut outputs = StagedOutputs::new();
        outputs.stage(&target, b"new").unwrap();
        drop(outputs);

        assert_eq!(std::fs::read(&target).unwrap(), b"previous");
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn commit_truncates_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("roms.bin");
        std::fs::write(&target, vec![0xEE; 100]).unwrap();

        let mut outputs = StagedOutputs::new();
        outputs.stage(&target, b"short").unwrap();
        outputs.commit().unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"short");
    }
}
