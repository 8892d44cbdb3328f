//! Where ROM bytes come from
//!
//! A ROM file may be stored as-is, gzipped, inside a zip, or inside a gzipped
//! tarball. Archives are recognised by their magic bytes and the first member
//! named `*.ROM` is used. A gzip stream that is not a tarball is the ROM. Files saved from a CPC usually carry a 128 byte AMSDOS
//! header, which the board firmware strips when loading; we do the same.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::debug;
use zip::ZipArchive;

use crate::error::{Result, RomToolError};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const GZIP_MAGIC: &[u8] = &[0x1F, 0x8B];
const TAR_MAGIC_OFFSET: usize = 257;
const TAR_MAGIC: &[u8] = b"ustar";

const AMSDOS_HEADER_LEN: usize = 128;
const AMSDOS_CHECKSUMMED_LEN: usize = 67;
const AMSDOS_LOGICAL_LENGTH: usize = 24;

pub trait ByteSource {
    /// Raw bytes of the ROM stored under `file`.
    fn read_rom(&self, file: &str) -> Result<Vec<u8>>;
}

/// ROMs read from a directory on disk.
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
    strip_amsdos: bool,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>, strip_amsdos: bool) -> Self {
        Self { root: root.into(), strip_amsdos }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ByteSource for DirSource {
    fn read_rom(&self, file: &str) -> Result<Vec<u8>> {
        let path = self.root.join(file);
        let raw = std::fs::read(&path).map_err(|e| RomToolError::io(&path, e))?;
        decode_payload(file, raw, self.strip_amsdos)
    }
}

/// ROMs held in memory, keyed by file name.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: HashMap<String, Vec<u8>>,
    strip_amsdos: bool,
}

impl MemorySource {
    pub fn new(strip_amsdos: bool) -> Self {
        Self { files: HashMap::new(), strip_amsdos }
    }

    pub fn insert(&mut self, file: impl Into<String>, bytes: impl Into<Vec<u8>>) -> &mut Self {
        self.files.insert(file.into(), bytes.into());
        self
    }
}

impl ByteSource for MemorySource {
    fn read_rom(&self, file: &str) -> Result<Vec<u8>> {
        let raw = self.files.get(file).cloned().ok_or_else(|| {
            RomToolError::io(file, std::io::Error::from(std::io::ErrorKind::NotFound))
        })?;
        decode_payload(file, raw, self.strip_amsdos)
    }
}

/// Unwraps archives and AMSDOS headers.
pub fn decode_payload(file: &str, raw: Vec<u8>, strip_amsdos: bool) -> Result<Vec<u8>> {
    let data = if raw.starts_with(ZIP_MAGIC) {
        extract_from_zip(file, raw)?
    } else if raw.starts_with(GZIP_MAGIC) {
        extract_from_gzip(file, &raw)?
    } else {
        raw
    };

    if strip_amsdos {
        if let Some(body) = amsdos_body(file, &data)? {
            debug!("{}: stripped AMSDOS header, {} bytes of ROM", file, body.len());
            return Ok(body.to_vec());
        }
    }

    Ok(data)
}

fn is_rom_name(name: &str) -> bool {
    name.to_ascii_uppercase().ends_with(".ROM")
}

fn extract_from_zip(file: &str, raw: Vec<u8>) -> Result<Vec<u8>> {
    let zip_err = |e: zip::result::ZipError| RomToolError::format(format!("{}: bad zip archive: {}", file, e));

    let mut archive = ZipArchive::new(Cursor::new(raw)).map_err(zip_err)?;
    for i in 0..archive.len() {
        let mut member = archive.by_index(i).map_err(zip_err)?;
        if !member.is_file() || !is_rom_name(member.name()) {
            continue;
        }

        debug!("{}: using zip member {}", file, member.name());
        let mut buf = Vec::with_capacity(member.size() as usize);
        member
            .read_to_end(&mut buf)
            .map_err(|e| RomToolError::format(format!("{}: failed to inflate {}: {}", file, member.name(), e)))?;
        return Ok(buf);
    }

    Err(RomToolError::format(format!("{}: zip archive has no .ROM member", file)))
}

fn extract_from_gzip(file: &str, raw: &[u8]) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    GzDecoder::new(raw)
        .read_to_end(&mut data)
        .map_err(|e| RomToolError::format(format!("{}: bad gzip stream: {}", file, e)))?;

    if data.get(TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + TAR_MAGIC.len()) != Some(TAR_MAGIC) {
        debug!("{}: plain gzip, {} bytes", file, data.len());
        return Ok(data);
    }

    let tar_err = |e: std::io::Error| RomToolError::format(format!("{}: bad gzip tarball: {}", file, e));

    let mut archive = Archive::new(Cursor::new(data));
    for entry in archive.entries().map_err(tar_err)? {
        let mut entry = entry.map_err(tar_err)?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let entry_path = entry.path().map_err(tar_err)?.to_string_lossy().into_owned();
        if !is_rom_name(&entry_path) {
            continue;
        }

        debug!("{}: using tar member {}", file, entry_path);
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf).map_err(tar_err)?;
        return Ok(buf);
    }

    Err(RomToolError::format(format!("{}: gzip tarball has no .ROM member", file)))
}

/// Body of an AMSDOS file, or `None` if `data` has no valid header.
fn amsdos_body<'a>(file: &str, data: &'a [u8]) -> Result<Option<&'a [u8]>> {
    if data.len() <= AMSDOS_HEADER_LEN {
        return Ok(None);
    }

    let sum: u16 = data[..AMSDOS_CHECKSUMMED_LEN]
        .iter()
        .fold(0u16, |acc, &b| acc.wrapping_add(b as u16));
    let stored = u16::from_le_bytes([data[AMSDOS_CHECKSUMMED_LEN], data[AMSDOS_CHECKSUMMED_LEN + 1]]);

    // an all-zero prefix sums to zero too, that's not a header
    if sum == 0 || sum != stored {
        return Ok(None);
    }

    let logical_len =
        u16::from_le_bytes([data[AMSDOS_LOGICAL_LENGTH], data[AMSDOS_LOGICAL_LENGTH + 1]]) as usize;
    data.get(AMSDOS_HEADER_LEN..AMSDOS_HEADER_LEN + logical_len)
        .map(Some)
        .ok_or_else(|| {
            RomToolError::format(format!(
                "{}: AMSDOS header declares {} bytes, file holds {}",
                file,
                logical_len,
                data.len() - AMSDOS_HEADER_LEN
            ))
        })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    pub(crate) fn amsdos_wrap(body: &[u8]) -> Vec<u8> {
        let mut header = [0u8; AMSDOS_HEADER_LEN];
        header[1..9].copy_from_slice(b"PROTEXT ");
        header[9..12].copy_from_slice(b"ROM");
        header[18] = 2;
        header[AMSDOS_LOGICAL_LENGTH..AMSDOS_LOGICAL_LENGTH + 2]
            .copy_from_slice(&(body.len() as u16).to_le_bytes());
        let sum: u16 = header[..AMSDOS_CHECKSUMMED_LEN].iter().map(|&b| b as u16).sum();
        header[AMSDOS_CHECKSUMMED_LEN..AMSDOS_CHECKSUMMED_LEN + 2].copy_from_slice(&sum.to_le_bytes());

        let mut out = header.to_vec();
        out.extend_from_slice(body);
        out
    }

    pub(crate) fn zip_with(members: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (name, bytes) in members {
            writer.start_file(*name, options).unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn tar_gz_with(members: &[(&str, &[u8])]) -> Vec<u8> {
        let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, bytes) in members {
            let mut header = tar::Header::new_gnu();
            header.set_size(bytes.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *bytes).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn plain_file_passes_through() {
        let rom = vec![1u8, 2, 3, 4];
        assert_eq!(decode_payload("a.rom", rom.clone(), true).unwrap(), rom);
    }

    #[test]
    fn zip_member_is_extracted() {
        let zip = zip_with(&[("readme.txt", b"hello"), ("games/Arkanoid.rom", &[0xAA; 300])]);
        let out = decode_payload("arkanoid.zip", zip, false).unwrap();
        assert_eq!(out, vec![0xAA; 300]);
    }

    #[test]
    fn zip_without_rom_member_is_a_format_error() {
        let zip = zip_with(&[("readme.txt", b"hello")]);
        let err = decode_payload("x.zip", zip, false).unwrap_err();
        assert!(matches!(err, RomToolError::Format(_)));
    }

    #[test]
    fn tar_gz_member_is_extracted() {
        let tgz = tar_gz_with(&[("notes.txt", b"x"), ("MAXAM.ROM", &[7; 64])]);
        assert_eq!(decode_payload("maxam.tgz", tgz, false).unwrap(), vec![7; 64]);
    }

    #[test]
    fn tar_gz_without_rom_member_is_a_format_error() {
        let tgz = tar_gz_with(&[("notes.txt", b"x")]);
        let err = decode_payload("x.tgz", tgz, false).unwrap_err();
        assert!(matches!(err, RomToolError::Format(_)));
    }

    #[test]
    fn plain_gzip_is_decompressed() {
        let rom: Vec<u8> = (0..300u16).map(|i| (i % 256) as u8).collect();
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&rom).unwrap();
        let gz = encoder.finish().unwrap();

        assert_eq!(decode_payload("game.rom.gz", gz, false).unwrap(), rom);
    }

    #[test]
    fn amsdos_header_is_stripped() {
        let body: Vec<u8> = (0..200u8).collect();
        let wrapped = amsdos_wrap(&body);
        assert_eq!(decode_payload("p.rom", wrapped.clone(), true).unwrap(), body);
        assert_eq!(decode_payload("p.rom", wrapped.clone(), false).unwrap(), wrapped);
    }

    #[test]
    fn amsdos_header_inside_zip() {
        let body = vec![0x55; 256];
        let zip = zip_with(&[("P.ROM", &amsdos_wrap(&body))]);
        assert_eq!(decode_payload("p.zip", zip, true).unwrap(), body);
    }

    #[test]
    fn truncated_amsdos_file_is_a_format_error() {
        let mut wrapped = amsdos_wrap(&[1; 100]);
        wrapped.truncate(AMSDOS_HEADER_LEN + 50);
        let err = decode_payload("p.rom", wrapped, true).unwrap_err();
        assert!(matches!(err, RomToolError::Format(_)));
    }

    #[test]
    fn zeroed_prefix_is_not_a_header() {
        let rom = vec![0u8; 1024];
        assert_eq!(decode_payload("blank.rom", rom.clone(), true).unwrap(), rom);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirSource::new(dir.path(), true);
        assert!(matches!(source.read_rom("nope.rom"), Err(RomToolError::Io { .. })));

        let source = MemorySource::new(true);
        assert!(matches!(source.read_rom("nope.rom"), Err(RomToolError::Io { .. })));
    }

    #[test]
    fn dir_source_reads_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("OS.ROM"), [3u8; 16]).unwrap();
        let source = DirSource::new(dir.path(), true);
        assert_eq!(source.read_rom("OS.ROM").unwrap(), vec![3; 16]);
    }
}
