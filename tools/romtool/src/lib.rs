//! romtool - CPC ROM board image builder
//!
//! Packs a set of CPC ROMs into the banked ROM region of the board's flash,
//! encodes the boot profiles into the config block, and frames both as UF2
//! files for the RP2040 bootloader.
//!
//! - `assembler`: ROM region and index table
//! - `config_block`: profile records
//! - `uf2`: bootloader framing
//! - `pipeline`: one run, from `romtool.toml` to files on disk

pub mod assembler;
pub mod catalog;
pub mod combine;
pub mod config_block;
pub mod error;
pub mod image;
pub mod layout;
pub mod output;
pub mod pipeline;
pub mod source;
pub mod uf2;

pub use error::{Result, RomToolError};
pub use layout::{FlashLayout, FormatVersion};
