use crate::error::{Result, RomToolError};

/// Byte buffer that is only ever written at explicit offsets.
///
/// The buffer has a fixed capacity and starts out zeroed. Its length is the
/// end of the furthest write, but never less than `min_len`.
#[derive(Debug, Clone)]
pub struct ImageBuffer {
    data: Vec<u8>,
    len: usize,
}

impl ImageBuffer {
    pub fn new(capacity: usize, min_len: usize) -> Self {
        Self {
            data: vec![0; capacity],
            len: min_len.min(capacity),
        }
    }

    pub fn write_at(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let end = offset
            .checked_add(bytes.len())
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                RomToolError::encoding(format!(
                    "write of {} bytes at {:#X} exceeds image capacity {:#X}",
                    bytes.len(),
                    offset,
                    self.data.len()
                ))
            })?;

        self.data[offset..end].copy_from_slice(bytes);
        self.len = self.len.max(end);
        Ok(())
    }

    pub fn read_at(&self, offset: usize, len: usize) -> Option<&[u8]> {
        self.as_bytes().get(offset..offset.checked_add(len)?)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn into_bytes(mut self) -> Vec<u8> {
        self.data.truncate(self.len);
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_tracks_furthest_write() {
        let mut image = ImageBuffer::new(64, 8);
        assert_eq!(image.as_bytes().len(), 8);

        image.write_at(30, &[1, 2, 3]).unwrap();
        image.write_at(10, &[4]).unwrap();
        assert_eq!(image.as_bytes().len(), 33);
        assert_eq!(image.read_at(30, 3), Some(&[1u8, 2, 3][..]));
        assert_eq!(image.as_bytes()[20], 0);
    }

    #[test]
    fn out_of_range_write_is_rejected_untouched() {
        let mut image = ImageBuffer::new(16, 0);
        image.write_at(0, &[9; 4]).unwrap();

        let err = image.write_at(14, &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, RomToolError::Encoding(_)));
        assert_eq!(image.into_bytes(), vec![9; 4]);
    }

    #[test]
    fn read_past_end_is_none() {
        let image = ImageBuffer::new(16, 4);
        assert!(image.read_at(2, 4).is_none());
        assert!(image.read_at(usize::MAX, 2).is_none());
    }
}
