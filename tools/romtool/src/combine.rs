/// Concatenates two UF2 streams. Neither stream is inspected.
pub fn combine(first: &[u8], second: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(first.len() + second.len());
    out.extend_from_slice(first);
    out.extend_from_slice(second);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uf2::{BLOCK_SIZE, to_uf2};

    #[test]
    fn concatenates_in_order() {
        assert_eq!(combine(b"rom", b"cfg"), b"romcfg");
        assert_eq!(combine(&[], b"cfg"), b"cfg");
        assert_eq!(combine(b"rom", &[]), b"rom");
    }

    #[test]
    fn uf2_streams_are_kept_whole() {
        let roms = to_uf2(&[1; 700], 0x1001_E000);
        let config = to_uf2(&[2; 4096], 0x101F_F000);
        let combined = combine(&roms, &config);

        assert_eq!(combined.len(), (3 + 16) * BLOCK_SIZE);
        assert_eq!(&combined[..roms.len()], &roms[..]);
        assert_eq!(&combined[roms.len()..], &config[..]);
    }
}
