//! UF2 framing
//!
//! The RP2040 bootloader accepts 512 byte UF2 blocks, each carrying 256 bytes
//! of payload for a given flash address:
//!
//! ```text
//! u32 magicStart0, magicStart1, flags, targetAddr
//! u32 payloadSize, blockNo, numBlocks, familyID
//! u8  data[476]
//! u32 magicEnd
//! ```

use tracing::info;

pub const MAGIC_START0: u32 = 0x0A32_4655;
pub const MAGIC_START1: u32 = 0x9E5D_5157;
pub const MAGIC_END: u32 = 0x0AB1_6F30;
pub const FLAG_FAMILY_ID_PRESENT: u32 = 0x0000_2000;
pub const RP2040_FAMILY_ID: u32 = 0xE48B_FF56;

pub const BLOCK_SIZE: usize = 512;
pub const PAYLOAD_SIZE: usize = 256;
pub const DATA_CAPACITY: usize = 476;

/// One 512 byte UF2 block, not yet serialized. Only built by [`frame`], so
/// `data` never exceeds [`PAYLOAD_SIZE`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uf2Block<'a> {
    flags: u32,
    target_addr: u32,
    /// Always [`PAYLOAD_SIZE`], even when `data` is shorter.
    payload_size: u32,
    block_no: u32,
    num_blocks: u32,
    family_id: u32,
    data: &'a [u8],
}

impl Uf2Block<'_> {
    pub fn to_bytes(&self) -> [u8; BLOCK_SIZE] {
        let mut out = [0u8; BLOCK_SIZE];
        let header = [
            MAGIC_START0,
            MAGIC_START1,
            self.flags,
            self.target_addr,
            self.payload_size,
            self.block_no,
            self.num_blocks,
            self.family_id,
        ];
        for (word, chunk) in header.iter().zip(out.chunks_exact_mut(4)) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }

        out[32..32 + self.data.len()].copy_from_slice(self.data);
        out[32 + DATA_CAPACITY..].copy_from_slice(&MAGIC_END.to_le_bytes());
        out
    }
}

pub fn block_count(len: usize) -> usize {
    len.div_ceil(PAYLOAD_SIZE)
}

/// Splits `payload` into UF2 blocks addressed from `base_address`, in order.
pub fn frame(payload: &[u8], base_address: u32) -> impl Iterator<Item = Uf2Block<'_>> {
    let num_blocks = block_count(payload.len()) as u32;

    payload
        .chunks(PAYLOAD_SIZE)
        .enumerate()
        .map(move |(i, data)| Uf2Block {
            flags: FLAG_FAMILY_ID_PRESENT,
            target_addr: base_address.wrapping_add((i * PAYLOAD_SIZE) as u32),
            payload_size: PAYLOAD_SIZE as u32,
            block_no: i as u32,
            num_blocks,
            family_id: RP2040_FAMILY_ID,
            data,
        })
}

/// Frames `payload` into a new buffer.
pub fn to_uf2(payload: &[u8], base_address: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(block_count(payload.len()) * BLOCK_SIZE);
    for block in frame(payload, base_address) {
        out.extend_from_slice(&block.to_bytes());
    }

    info!(
        "Framed {} bytes at {:#010x} into {} UF2 blocks",
        payload.len(),
        base_address,
        block_count(payload.len())
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(block: &[u8], index: usize) -> u32 {
        u32::from_le_bytes(block[index * 4..index * 4 + 4].try_into().unwrap())
    }

    /// Rebuilds the payload by concatenating each block's 256 byte chunk.
    fn unframe(uf2: &[u8], len: usize) -> Vec<u8> {
        let mut blocks: Vec<&[u8]> = uf2.chunks(BLOCK_SIZE).collect();
        blocks.sort_by_key(|b| word(b, 5));
        let mut out: Vec<u8> = blocks.iter().flat_map(|b| b[32..32 + PAYLOAD_SIZE].to_vec()).collect();
        out.truncate(len);
        out
    }

    #[test]
    fn six_hundred_bytes_make_three_blocks() {
        let payload: Vec<u8> = (0..600).map(|i| (i % 251) as u8 + 1).collect();
        let uf2 = to_uf2(&payload, 0x1010_0000);
        assert_eq!(uf2.len(), 3 * BLOCK_SIZE);

        for (i, block) in uf2.chunks(BLOCK_SIZE).enumerate() {
            assert_eq!(word(block, 0), MAGIC_START0);
            assert_eq!(word(block, 1), MAGIC_START1);
            assert_eq!(word(block, 2), FLAG_FAMILY_ID_PRESENT);
            assert_eq!(word(block, 3), 0x1010_0000 + 0x100 * i as u32);
            assert_eq!(word(block, 4), 256);
            assert_eq!(word(block, 5), i as u32);
            assert_eq!(word(block, 6), 3);
            assert_eq!(word(block, 7), RP2040_FAMILY_ID);
            assert_eq!(word(block, 127), MAGIC_END);
        }

        let last = &uf2[2 * BLOCK_SIZE..];
        assert_eq!(&last[32..32 + 88], &payload[512..]);
        assert!(last[32 + 88..32 + DATA_CAPACITY].iter().all(|&b| b == 0));
    }

    #[test]
    fn reconstructs_any_length() {
        for len in [0, 1, 255, 256, 257, 511, 512, 513, 4096, 4097] {
            let payload: Vec<u8> = (0..len).map(|i| (i * 7 % 256) as u8).collect();
            let uf2 = to_uf2(&payload, 0x1001_E000);
            assert_eq!(uf2.len(), block_count(len) * BLOCK_SIZE);
            assert_eq!(unframe(&uf2, len), payload, "length {}", len);
        }
    }

    #[test]
    fn empty_payload_has_no_blocks() {
        assert_eq!(frame(&[], 0x1000_0000).count(), 0);
        assert!(to_uf2(&[], 0x1000_0000).is_empty());
    }

    #[test]
    fn block_data_is_bounded_by_payload_size() {
        let payload = vec![0x5A; 3 * PAYLOAD_SIZE + 1];
        assert!(frame(&payload, 0).all(|b| b.data.len() <= PAYLOAD_SIZE));
    }

    #[test]
    fn blocks_are_in_address_order() {
        let payload = vec![0xA5; 1000];
        let blocks: Vec<_> = frame(&payload, 0x101F_F000).collect();
        assert_eq!(blocks.len(), 4);
        for pair in blocks.windows(2) {
            assert_eq!(pair[1].block_no, pair[0].block_no + 1);
            assert_eq!(pair[1].target_addr, pair[0].target_addr + 256);
        }
        assert_eq!(blocks[3].data.len(), 1000 - 768);
        assert_eq!(blocks[3].payload_size, 256);
    }
}
