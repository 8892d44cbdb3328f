use std::path::PathBuf;

use tracing::info;

use crate::assembler::{self, RomImage};
use crate::catalog::RomToolConfig;
use crate::combine::combine;
use crate::config_block;
use crate::error::Result;
use crate::layout::FlashLayout;
use crate::output::StagedOutputs;
use crate::source::{ByteSource, DirSource};
use crate::uf2::to_uf2;

/// Everything a run writes, still in memory.
#[derive(Debug, Clone)]
pub struct BuildArtifacts {
    pub rom_image: RomImage,
    pub rom_uf2: Vec<u8>,
    pub config_block: Vec<u8>,
    pub config_uf2: Vec<u8>,
    pub combined: Option<Vec<u8>>,
}

pub fn build(config: &RomToolConfig, layout: FlashLayout, source: &dyn ByteSource) -> Result<BuildArtifacts> {
    let catalog = config.catalog()?;
    let format = config.output.format;

    info!("Building {:?} ROM image, {} ROM(s)", format, catalog.len());
    let rom_image = assembler::assemble(
        catalog.iter().map(|(slot, spec)| (*slot, spec)),
        layout,
        format,
        source,
    )?;
    let rom_uf2 = to_uf2(&rom_image.bytes, layout.rom_start());

    let config_block = config_block::encode(&config.profiles()?, &layout)?;
    let config_uf2 = to_uf2(&config_block, layout.config_start());

    let combined = config
        .output
        .combined
        .as_ref()
        .map(|_| combine(&rom_uf2, &config_uf2));

    Ok(BuildArtifacts { rom_image, rom_uf2, config_block, config_uf2, combined })
}

pub fn write_outputs(config: &RomToolConfig, artifacts: &BuildArtifacts) -> Result<Vec<PathBuf>> {
    let out = &config.output;
    let mut staged = StagedOutputs::new();

    staged.stage(&out.rom_image, &artifacts.rom_image.bytes)?;
    staged.stage(&out.romfile, &artifacts.rom_uf2)?;
    staged.stage(&out.config_image, &artifacts.config_block)?;
    staged.stage(&out.configfile, &artifacts.config_uf2)?;
    if let (Some(path), Some(bytes)) = (&out.combined, &artifacts.combined) {
        staged.stage(path, bytes)?;
    }

    staged.commit()
}

/// One full run: read ROMs from `input.romdir`, write every output.
pub fn run(config: &RomToolConfig, layout: FlashLayout) -> Result<Vec<PathBuf>> {
    let source = DirSource::new(&config.input.romdir, config.input.amsdos_headers);
    info!("Reading ROMs from {}", source.root().display());

    let artifacts = build(config, layout, &source)?;
    write_outputs(config, &artifacts)
}
