//! Flash layout of the ROM board
//!
//! The 2MB flash of the RP2040 is split into three regions:
//!
//! ```text
//! 0x10000000  firmware code      (whatever is left)
//! 0x1001E000  ROM index (4K)     followed by 120 x 16K ROM banks
//! 0x101FF000  config block (4K)
//! 0x10200000
//! ```
//!
//! Every offset written to the output images is derived from a [`FlashLayout`].

use serde::Deserialize;

use crate::error::{Result, RomToolError};

pub const FLASH_BASE: u32 = 0x1000_0000;
pub const FLASH_SIZE: usize = 2048 * 1024;
pub const INDEX_SIZE: usize = 4096;
pub const BANK_SIZE: usize = 0x4000; // 16KB per bank
pub const MAX_ROMS: usize = 120;
pub const NUM_ROM_BANKS: usize = 14;
pub const CONFIG_SIZE: usize = 4096;

/// ROM headers are linked to run at the upper ROM window.
pub const ROM_BASE_ADDRESS: u16 = 0xC000;

/// Index table layout, chosen per build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatVersion {
    /// `type, name[33]` entries, ROM `n` always lives in bank `n`.
    #[default]
    Fixed,
    /// `offset, size, type, name[24]` entries, ROMs packed back to back.
    Variable,
}

impl FormatVersion {
    pub const fn entry_size(self) -> usize {
        match self {
            FormatVersion::Fixed => 34,
            FormatVersion::Variable => 32,
        }
    }

    /// Name capacity in bytes, including the NUL terminator.
    pub const fn name_capacity(self) -> usize {
        match self {
            FormatVersion::Fixed => 33,
            FormatVersion::Variable => 24,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashLayout {
    pub flash_base: u32,
    pub flash_size: usize,
    pub index_size: usize,
    pub bank_size: usize,
    pub max_roms: usize,
    pub num_rom_banks: usize,
    pub config_size: usize,
}

impl Default for FlashLayout {
    fn default() -> Self {
        Self::RP2040
    }
}

impl FlashLayout {
    pub const RP2040: FlashLayout = FlashLayout {
        flash_base: FLASH_BASE,
        flash_size: FLASH_SIZE,
        index_size: INDEX_SIZE,
        bank_size: BANK_SIZE,
        max_roms: MAX_ROMS,
        num_rom_banks: NUM_ROM_BANKS,
        config_size: CONFIG_SIZE,
    };

    /// Index table plus every bank.
    pub const fn rom_region_len(&self) -> usize {
        self.index_size + self.max_roms * self.bank_size
    }

    /// Space left for the firmware itself.
    pub const fn code_len(&self) -> usize {
        self.flash_size - self.rom_region_len() - self.config_size
    }

    pub const fn rom_start(&self) -> u32 {
        self.flash_base + self.code_len() as u32
    }

    pub const fn config_start(&self) -> u32 {
        self.rom_start() + self.rom_region_len() as u32
    }

    /// Image offset of `slot`'s bank in the fixed layout.
    pub const fn bank_offset(&self, slot: usize) -> usize {
        self.index_size + slot * self.bank_size
    }

    /// Checks that the regions fit the flash and that an index table
    /// in `format` fits in `index_size`.
    pub fn validate(&self, format: FormatVersion) -> Result<()> {
        let fixed = self.index_size + self.config_size;
        let rom_and_config = self
            .max_roms
            .checked_mul(self.bank_size)
            .and_then(|banks| banks.checked_add(fixed));
        if rom_and_config.is_none_or(|len| len > self.flash_size) {
            return Err(RomToolError::config(format!(
                "{} banks of {} bytes do not fit in {} bytes of flash",
                self.max_roms, self.bank_size, self.flash_size
            )));
        }

        if u32::try_from(self.flash_size)
            .ok()
            .and_then(|size| self.flash_base.checked_add(size))
            .is_none()
        {
            return Err(RomToolError::config(format!(
                "flash of {} bytes at {:#010X} overflows the address space",
                self.flash_size, self.flash_base
            )));
        }

        let table = self.max_roms * format.entry_size();
        if table > self.index_size {
            return Err(RomToolError::config(format!(
                "{:?} index table needs {} bytes, index region holds {}",
                format, table, self.index_size
            )));
        }

        Ok(())
    }
}
