//! Config block encoding
//!
//! The board keeps its bank assignments in a 4K block at the top of flash,
//! one fixed size record per profile:
//!
//! ```text
//! u16  magic          0x07B0
//! u16  version        1
//! u8   active
//! u8   bank7_enable
//! i8   lower_rom      -1 = none
//! i8   upper_roms[14] -1 = none
//! char desc[33]
//! u8   spare[10]
//! ```

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::error::{Result, RomToolError};
use crate::layout::FlashLayout;

pub const CONFIG_MAGIC: u16 = 0x07B0;
pub const CONFIG_VERSION: u16 = 1;
pub const PROFILE_PREFIX: &str = "CONFIG";

const DESCRIPTION_CAPACITY: usize = 33;
const SPARE_LEN: usize = 10;

/// Size of one record for a board with `num_rom_banks` upper banks.
pub const fn record_size(num_rom_banks: usize) -> usize {
    2 + 2 + 1 + 1 + 1 + num_rom_banks + DESCRIPTION_CAPACITY + SPARE_LEN
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileValue {
    Int(i64),
    Text(String),
}

/// A named set of `KEY = value` pairs. Keys are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileDefinition {
    pub name: String,
    values: IndexMap<String, ProfileValue>,
}

impl ProfileDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), values: IndexMap::new() }
    }

    pub fn set(&mut self, key: &str, value: ProfileValue) -> &mut Self {
        self.values.insert(key.to_ascii_uppercase(), value);
        self
    }

    pub fn with(mut self, key: &str, value: impl Into<ProfileValue>) -> Self {
        self.set(key, value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&ProfileValue> {
        self.values.get(&key.to_ascii_uppercase())
    }

    fn int(&self, key: &str) -> Result<Option<i64>> {
        match self.get(key) {
            None => Ok(None),
            Some(ProfileValue::Int(v)) => Ok(Some(*v)),
            Some(ProfileValue::Text(s)) => s.trim().parse().map(Some).map_err(|_| {
                RomToolError::config(format!("{}: {} = '{}' is not an integer", self.name, key, s))
            }),
        }
    }

    fn text(&self, key: &str) -> Result<&str> {
        match self.get(key) {
            Some(ProfileValue::Text(s)) => Ok(s),
            Some(ProfileValue::Int(v)) => Err(RomToolError::config(format!(
                "{}: {} must be a string, got {}",
                self.name, key, v
            ))),
            None => Err(RomToolError::config(format!("{}: missing required key {}", self.name, key))),
        }
    }
}

impl From<i64> for ProfileValue {
    fn from(v: i64) -> Self {
        ProfileValue::Int(v)
    }
}

impl From<i32> for ProfileValue {
    fn from(v: i32) -> Self {
        ProfileValue::Int(v.into())
    }
}

impl From<&str> for ProfileValue {
    fn from(s: &str) -> Self {
        ProfileValue::Text(s.to_string())
    }
}

impl From<String> for ProfileValue {
    fn from(s: String) -> Self {
        ProfileValue::Text(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigRecord {
    pub active: u8,
    pub bank7_enable: u8,
    pub lower_rom: i8,
    pub upper_roms: Vec<i8>,
    pub description: String,
}

fn check_description(profile: &str, description: &str) -> Result<()> {
    if !description.is_ascii() || description.len() >= DESCRIPTION_CAPACITY {
        return Err(RomToolError::encoding(format!(
            "{}: DESCRIPTION must be ASCII and at most {} characters",
            profile,
            DESCRIPTION_CAPACITY - 1
        )));
    }
    Ok(())
}

fn fit<T: TryFrom<i64>>(profile: &str, key: &str, value: i64) -> Result<T> {
    T::try_from(value).map_err(|_| {
        RomToolError::encoding(format!(
            "{}: {} = {} does not fit in a {} field",
            profile,
            key,
            value,
            std::any::type_name::<T>()
        ))
    })
}

impl ConfigRecord {
    pub fn from_profile(profile: &ProfileDefinition, num_rom_banks: usize) -> Result<Self> {
        let name = profile.name.as_str();

        let active = fit(name, "ACTIVE", profile.int("ACTIVE")?.unwrap_or(0))?;
        let bank7_enable = u8::from(profile.int("BANK7")?.is_some_and(|v| v >= 0));
        let lower_rom = fit(name, "LOWER", profile.int("LOWER")?.unwrap_or(-1))?;

        let upper_roms = (0..num_rom_banks)
            .map(|bank| {
                let key = format!("BANK{}", bank);
                fit(name, &key, profile.int(&key)?.unwrap_or(-1))
            })
            .collect::<Result<Vec<i8>>>()?;

        let description = profile.text("DESCRIPTION")?;
        check_description(name, description)?;

        Ok(Self {
            active,
            bank7_enable,
            lower_rom,
            upper_roms,
            description: description.to_string(),
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        check_description("record", &self.description)?;

        let mut out = Vec::with_capacity(record_size(self.upper_roms.len()));
        out.extend_from_slice(&CONFIG_MAGIC.to_le_bytes());
        out.extend_from_slice(&CONFIG_VERSION.to_le_bytes());
        out.push(self.active);
        out.push(self.bank7_enable);
        out.push(self.lower_rom as u8);
        out.extend(self.upper_roms.iter().map(|&r| r as u8));

        let mut desc = [0u8; DESCRIPTION_CAPACITY];
        desc[..self.description.len()].copy_from_slice(self.description.as_bytes());
        out.extend_from_slice(&desc);
        out.extend_from_slice(&[0u8; SPARE_LEN]);
        Ok(out)
    }
}

/// Encodes every `CONFIG*` profile, in order, into a zeroed config block.
pub fn encode(profiles: &[ProfileDefinition], layout: &FlashLayout) -> Result<Vec<u8>> {
    let record_len = record_size(layout.num_rom_banks);
    let mut block = vec![0u8; layout.config_size];
    let mut offset = 0;

    for profile in profiles {
        if !profile.name.starts_with(PROFILE_PREFIX) {
            debug!("skipping section {}", profile.name);
            continue;
        }

        let record = ConfigRecord::from_profile(profile, layout.num_rom_banks)?;
        if offset + record_len > block.len() {
            return Err(RomToolError::encoding(format!(
                "{}: config block holds at most {} profiles",
                profile.name,
                block.len() / record_len
            )));
        }

        info!("Adding {}: {}", profile.name, record.description);
        block[offset..offset + record_len].copy_from_slice(&record.encode()?);
        offset += record_len;
    }

    Ok(block)
}
