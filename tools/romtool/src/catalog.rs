//! romtool.toml parsing
//!
//! ```toml
//! [input]
//! romdir = "roms"
//!
//! [output]
//! romfile = "roms.uf2"
//! configfile = "config.uf2"
//! combined = "combined.uf2"
//!
//! [roms]
//! 0 = "BASIC_1.1.ROM"
//! 1 = "Protext.rom,Protext,1"
//! 2 = "OS_6128.ROM,OS 6128,L"
//!
//! [CONFIG_DEFAULT]
//! ACTIVE = 1
//! LOWER = 2
//! BANK0 = 0
//! BANK1 = 1
//! DESCRIPTION = "6128 with Protext"
//! ```
//!
//! Every top level table other than `input`, `output` and `roms` is handed to
//! the config block encoder as a profile, in file order.
//!
//! Older `romtool.ini` files need converting by hand: lowercase the `input`,
//! `output` and `roms` section names and quote every string value. Profile
//! values may stay quoted, `BANK3 = "3"` reads the same as `BANK3 = 3`.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;

use crate::assembler::RomSpec;
use crate::config_block::{ProfileDefinition, ProfileValue};
use crate::error::{Result, RomToolError};
use crate::layout::FormatVersion;

pub const DEFAULT_CONFIG_FILE: &str = "romtool.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct InputSection {
    pub romdir: PathBuf,
    /// Strip 128 byte AMSDOS headers from ROM files.
    #[serde(default = "default_true")]
    pub amsdos_headers: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputSection {
    pub romfile: PathBuf,
    pub configfile: PathBuf,
    #[serde(default)]
    pub combined: Option<PathBuf>,
    #[serde(default = "default_rom_image")]
    pub rom_image: PathBuf,
    #[serde(default = "default_config_image")]
    pub config_image: PathBuf,
    #[serde(default)]
    pub format: FormatVersion,
}

fn default_true() -> bool {
    true
}

fn default_rom_image() -> PathBuf {
    PathBuf::from("roms.bin")
}

fn default_config_image() -> PathBuf {
    PathBuf::from("config.bin")
}

#[derive(Debug, Clone, Deserialize)]
pub struct RomToolConfig {
    pub input: InputSection,
    pub output: OutputSection,
    #[serde(default)]
    pub roms: IndexMap<String, String>,
    #[serde(flatten)]
    pub sections: IndexMap<String, toml::Value>,
}

impl RomToolConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| RomToolError::io(path, e))?;
        let mut config: Self = toml::from_str(&content)
            .map_err(|e| RomToolError::config(format!("{}: {}", path.display(), e)))?;

        // relative paths are relative to the config file
        if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            config.rebase(base);
        }
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| RomToolError::config(e.to_string()))
    }

    fn rebase(&mut self, base: &Path) {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };

        rebase(&mut self.input.romdir);
        rebase(&mut self.output.romfile);
        rebase(&mut self.output.configfile);
        rebase(&mut self.output.rom_image);
        rebase(&mut self.output.config_image);
        if let Some(combined) = self.output.combined.as_mut() {
            rebase(combined);
        }
    }

    /// The `[roms]` table as slot → spec, in file order.
    pub fn catalog(&self) -> Result<Vec<(usize, RomSpec)>> {
        self.roms
            .iter()
            .map(|(slot, line)| {
                let slot = slot
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| RomToolError::config(format!("invalid ROM slot '{}'", slot)))?;
                let spec = line
                    .parse::<RomSpec>()
                    .map_err(|e| with_context(e, &format!("slot {}", slot)))?;
                Ok((slot, spec))
            })
            .collect()
    }

    pub fn profiles(&self) -> Result<Vec<ProfileDefinition>> {
        self.sections
            .iter()
            .map(|(name, value)| {
                let table = value.as_table().ok_or_else(|| {
                    RomToolError::config(format!("unexpected top level key '{}'", name))
                })?;

                let mut profile = ProfileDefinition::new(name.clone());
                for (key, value) in table {
                    let value = match value {
                        toml::Value::Integer(i) => ProfileValue::Int(*i),
                        toml::Value::String(s) => ProfileValue::Text(s.clone()),
                        other => {
                            return Err(RomToolError::config(format!(
                                "{}: {} must be an integer or a string, got {}",
                                name,
                                key,
                                other.type_str()
                            )));
                        }
                    };
                    profile.set(key, value);
                }
                Ok(profile)
            })
            .collect()
    }
}

fn with_context(err: RomToolError, context: &str) -> RomToolError {
    match err {
        RomToolError::Configuration(msg) => RomToolError::config(format!("{}: {}", context, msg)),
        RomToolError::Encoding(msg) => RomToolError::encoding(format!("{}: {}", context, msg)),
        other => other,
    }
}
