//! ROM image assembly
//!
//! Places ROM payloads into the banked ROM region and writes the index table
//! the board firmware scans at boot. The index has one entry per slot, with
//! unused slots marked by a `0xFF` type and a zeroed name.

use std::fmt;
use std::str::FromStr;

use tracing::info;

use crate::error::{Result, RomToolError};
use crate::image::ImageBuffer;
use crate::layout::{FlashLayout, FormatVersion, ROM_BASE_ADDRESS};
use crate::source::ByteSource;

/// ROM type byte, as found at offset 0 of a CPC ROM header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RomType(pub u8);

impl RomType {
    pub const FOREGROUND: RomType = RomType(0x00);
    pub const BACKGROUND: RomType = RomType(0x01);
    pub const EXTENSION: RomType = RomType(0x02);
    pub const LOWER: RomType = RomType(0x40);
    pub const BASIC: RomType = RomType(0x80);
    pub const MISSING: RomType = RomType(0xFF);

    fn describe(self) -> &'static str {
        match self {
            RomType::FOREGROUND => "foreground",
            RomType::BACKGROUND => "background",
            RomType::EXTENSION => "extension",
            RomType::LOWER => "lower",
            RomType::BASIC => "basic",
            RomType::MISSING => "missing",
            _ => "other",
        }
    }
}

impl fmt::Display for RomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x} ({})", self.0, self.describe())
    }
}

impl FromStr for RomType {
    type Err = RomToolError;

    /// `L`/`LOWER` for a lower ROM, otherwise a decimal or `0x` hex byte.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("L") || s.eq_ignore_ascii_case("LOWER") {
            return Ok(RomType::LOWER);
        }

        let value = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => i64::from_str_radix(hex, 16),
            None => s.parse::<i64>(),
        }
        .map_err(|_| RomToolError::config(format!("invalid ROM type '{}'", s)))?;

        u8::try_from(value)
            .map(RomType)
            .map_err(|_| RomToolError::encoding(format!("ROM type {} does not fit in a byte", value)))
    }
}

/// One catalog line: `filename[,name[,type]]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomSpec {
    pub file: String,
    pub name: Option<String>,
    pub rom_type: Option<RomType>,
}

impl RomSpec {
    pub fn new(file: impl Into<String>) -> Self {
        Self { file: file.into(), name: None, rom_type: None }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_type(mut self, rom_type: RomType) -> Self {
        self.rom_type = Some(rom_type);
        self
    }
}

impl FromStr for RomSpec {
    type Err = RomToolError;

    fn from_str(s: &str) -> Result<Self> {
        let mut fields = s.split(',').map(str::trim);

        let file = fields.next().filter(|f| !f.is_empty()).ok_or_else(|| {
            RomToolError::config(format!("ROM entry '{}' has no file name", s))
        })?;
        let name = fields.next().filter(|n| !n.is_empty()).map(str::to_string);
        let rom_type = fields
            .next()
            .filter(|t| !t.is_empty())
            .map(RomType::from_str)
            .transpose()?;

        if fields.next().is_some() {
            return Err(RomToolError::config(format!(
                "ROM entry '{}' has more than three fields",
                s
            )));
        }

        Ok(Self { file: file.to_string(), name, rom_type })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub rom_type: RomType,
    pub name: String,
    /// Image offset of the payload. Only encoded in the variable layout.
    pub offset: usize,
    pub size: usize,
}

impl IndexEntry {
    pub fn missing() -> Self {
        Self { rom_type: RomType::MISSING, name: String::new(), offset: 0, size: 0 }
    }

    pub fn is_missing(&self) -> bool {
        self.rom_type == RomType::MISSING && self.name.is_empty()
    }

    pub fn encode(&self, format: FormatVersion) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(format.entry_size());

        if format == FormatVersion::Variable {
            let offset = u32::try_from(self.offset).map_err(|_| {
                RomToolError::encoding(format!("offset {:#X} does not fit in 32 bits", self.offset))
            })?;
            let size = u16::try_from(self.size).map_err(|_| {
                RomToolError::encoding(format!("size {} does not fit in 16 bits", self.size))
            })?;
            out.extend_from_slice(&offset.to_le_bytes());
            out.extend_from_slice(&size.to_le_bytes());
            out.push(self.rom_type.0);
            out.push(0);
        } else {
            out.push(self.rom_type.0);
        }

        out.extend_from_slice(&encode_name(&self.name, format.name_capacity())?);
        debug_assert_eq!(out.len(), format.entry_size());
        Ok(out)
    }
}

/// NUL padded ASCII, truncated so the last byte is always NUL.
fn encode_name(name: &str, capacity: usize) -> Result<Vec<u8>> {
    if !name.is_ascii() {
        return Err(RomToolError::encoding(format!("ROM name '{}' is not ASCII", name)));
    }

    let mut out = vec![0u8; capacity];
    let len = name.len().min(capacity - 1);
    out[..len].copy_from_slice(&name.as_bytes()[..len]);
    Ok(out)
}

/// Type from the first byte of the ROM header.
pub fn infer_type(payload: &[u8]) -> Result<RomType> {
    payload
        .first()
        .map(|&b| RomType(b))
        .ok_or_else(|| RomToolError::format("empty ROM has no type byte"))
}

/// Name from the ROM's external command table.
///
/// Bytes 4-5 hold a pointer to the name table, linked at `0xC000`. The first
/// name is terminated by setting bit 7 of its last character.
pub fn infer_name(payload: &[u8]) -> Result<String> {
    let ptr = payload
        .get(4..6)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| RomToolError::format("ROM too short for a name table pointer"))?;

    let start = ptr.checked_sub(ROM_BASE_ADDRESS).ok_or_else(|| {
        RomToolError::format(format!("name table pointer {:#06X} is below {:#06X}", ptr, ROM_BASE_ADDRESS))
    })? as usize;

    let table = payload.get(start..).unwrap_or_default();
    let end = table.iter().position(|&b| b & 0x80 != 0).ok_or_else(|| {
        RomToolError::format(format!(
            "name at {:#06X} runs past the end of the ROM ({} bytes)",
            ptr,
            payload.len()
        ))
    })?;

    let name: String = table[..=end].iter().map(|&b| (b & 0x7F) as char).collect();
    Ok(name.trim().to_string())
}

/// The assembled ROM region.
#[derive(Debug, Clone)]
pub struct RomImage {
    pub bytes: Vec<u8>,
    /// One entry per slot, missing slots included.
    pub entries: Vec<IndexEntry>,
}

pub struct RomImageBuilder<'a> {
    layout: FlashLayout,
    format: FormatVersion,
    source: &'a dyn ByteSource,
    image: ImageBuffer,
    entries: Vec<Option<IndexEntry>>,
    next_free: usize,
}

impl<'a> RomImageBuilder<'a> {
    pub fn new(layout: FlashLayout, format: FormatVersion, source: &'a dyn ByteSource) -> Result<Self> {
        layout.validate(format)?;

        Ok(Self {
            layout,
            format,
            source,
            image: ImageBuffer::new(layout.rom_region_len(), layout.index_size),
            entries: vec![None; layout.max_roms],
            next_free: layout.index_size,
        })
    }

    /// Loads `spec` into `slot`. Nothing is written if this fails.
    pub fn add(&mut self, slot: usize, spec: &RomSpec) -> Result<&IndexEntry> {
        if slot >= self.layout.max_roms {
            return Err(RomToolError::config(format!(
                "ROM slot {} out of range, max ROM number is {}",
                slot,
                self.layout.max_roms - 1
            )));
        }
        if self.entries[slot].is_some() {
            return Err(RomToolError::config(format!("ROM slot {} is used twice", slot)));
        }

        let payload = self.source.read_rom(&spec.file)?;
        if payload.len() > self.layout.bank_size {
            return Err(RomToolError::format(format!(
                "slot {}: {} is {} bytes, a bank holds {}",
                slot,
                spec.file,
                payload.len(),
                self.layout.bank_size
            )));
        }

        let in_slot = |e: RomToolError| match e {
            RomToolError::Format(msg) => RomToolError::format(format!("slot {} ({}): {}", slot, spec.file, msg)),
            other => other,
        };

        let rom_type = match spec.rom_type {
            Some(t) => t,
            None => infer_type(&payload).map_err(in_slot)?,
        };
        let name = match &spec.name {
            Some(n) => n.trim().to_string(),
            None => infer_name(&payload).map_err(in_slot)?,
        };

        let offset = match self.format {
            FormatVersion::Fixed => self.layout.bank_offset(slot),
            FormatVersion::Variable => self.next_free,
        };

        let entry = IndexEntry { rom_type, name, offset, size: payload.len() };
        if entry.is_missing() {
            return Err(RomToolError::format(format!(
                "slot {} ({}): type {} with no name reads as an empty slot",
                slot, spec.file, rom_type
            )));
        }
        // encode now so a bad name fails before the payload lands
        entry.encode(self.format)?;

        self.image.write_at(offset, &payload)?;
        if self.format == FormatVersion::Variable {
            self.next_free += payload.len();
        }

        info!(
            "Added rom #{:2} at offset {:#010x}: type {}, size {} {}",
            slot, offset, rom_type, entry.size, entry.name
        );

        Ok(&*self.entries[slot].insert(entry))
    }

    /// Writes the index table and hands back the image.
    pub fn finish(mut self) -> Result<RomImage> {
        let entries: Vec<IndexEntry> = self
            .entries
            .into_iter()
            .map(|e| e.unwrap_or_else(IndexEntry::missing))
            .collect();

        let mut table = Vec::with_capacity(entries.len() * self.format.entry_size());
        for entry in &entries {
            table.extend_from_slice(&entry.encode(self.format)?);
        }
        self.image.write_at(0, &table)?;

        Ok(RomImage { bytes: self.image.into_bytes(), entries })
    }
}

/// Builds the ROM region from a catalog, in catalog order.
pub fn assemble<'c>(
    catalog: impl IntoIterator<Item = (usize, &'c RomSpec)>,
    layout: FlashLayout,
    format: FormatVersion,
    source: &dyn ByteSource,
) -> Result<RomImage> {
    let mut builder = RomImageBuilder::new(layout, format, source)?;
    for (slot, spec) in catalog {
        builder.add(slot, spec)?;
    }
    builder.finish()
}
