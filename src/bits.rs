use crate::marshal::{Error, Result};

/// MSB-first reader over a byte slice, used for parameter-set payloads.
pub struct BitReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    pub fn bit(&mut self) -> Result<bool> {
        let byte = self
            .data
            .get(self.position / 8)
            .ok_or(Error::BitstreamOverrun)?;
        let bit = byte >> (7 - self.position % 8) & 1;
        self.position += 1;
        Ok(bit != 0)
    }

    pub fn bits(&mut self, count: u32) -> Result<u32> {
        let mut value = 0;
        for _ in 0..count {
            value = value << 1 | self.bit()? as u32;
        }
        Ok(value)
    }

    /// Exp-Golomb, unsigned (ue(v)).
    pub fn ue(&mut self) -> Result<u32> {
        let mut leading_zeros = 0;
        while !self.bit()? {
            leading_zeros += 1;
            if leading_zeros > 31 {
                return Err(Error::BitstreamOverrun);
            }
        }
        Ok((1 << leading_zeros) - 1 + self.bits(leading_zeros)?)
    }

    /// Exp-Golomb, signed (se(v)).
    pub fn se(&mut self) -> Result<i32> {
        let value = self.ue()?;
        Ok(if value % 2 == 0 {
            -((value / 2) as i32)
        } else {
            (value / 2 + 1) as i32
        })
    }
}

#[cfg(test)]
pub(crate) struct BitWriter {
    data: Vec<u8>,
    length: usize,
}

#[cfg(test)]
impl BitWriter {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            length: 0,
        }
    }

    pub fn bits(&mut self, value: u32, count: u32) -> &mut Self {
        for offset in (0..count).rev() {
            if self.length % 8 == 0 {
                self.data.push(0);
            }
            let bit = (value >> offset & 1) as u8;
            *self.data.last_mut().unwrap() |= bit << (7 - self.length % 8);
            self.length += 1;
        }
        self
    }

    pub fn ue(&mut self, value: u32) -> &mut Self {
        let coded = value as u64 + 1;
        let width = 64 - coded.leading_zeros();
        self.bits(0, width - 1);
        self.bits(coded as u32, width)
    }

    pub fn se(&mut self, value: i32) -> &mut Self {
        let coded = if value > 0 {
            (value as u32) * 2 - 1
        } else {
            (-value as u32) * 2
        };
        self.ue(coded)
    }

    /// Appends the stop bit and pads to a byte boundary.
    pub fn finish(&mut self) -> Vec<u8> {
        self.bits(1, 1);
        while self.length % 8 != 0 {
            self.bits(0, 1);
        }
        std::mem::take(&mut self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_are_read_msb_first() {
        let mut reader = BitReader::new(&[0b1010_1100, 0b0100_0000]);
        assert!(reader.bit().unwrap());
        assert!(!reader.bit().unwrap());
        assert_eq!(reader.bits(4).unwrap(), 0b1011);
        assert_eq!(reader.bits(3).unwrap(), 0b000);
        assert!(reader.bit().unwrap());
    }

    #[test]
    fn exp_golomb_values_round_trip() {
        let mut writer = BitWriter::new();
        for value in [0u32, 1, 2, 3, 7, 255] {
            writer.ue(value);
        }
        for value in [0i32, 1, -1, 3, -6] {
            writer.se(value);
        }
        let data = writer.finish();

        let mut reader = BitReader::new(&data);
        for value in [0u32, 1, 2, 3, 7, 255] {
            assert_eq!(reader.ue().unwrap(), value);
        }
        for value in [0i32, 1, -1, 3, -6] {
            assert_eq!(reader.se().unwrap(), value);
        }
    }

    #[test]
    fn reading_past_the_end_fails() {
        let mut reader = BitReader::new(&[0xFF]);
        assert_eq!(reader.bits(8).unwrap(), 0xFF);
        assert!(reader.bit().is_err());

        // All zeros never terminate a ue(v) prefix.
        let mut reader = BitReader::new(&[0x00]);
        assert!(reader.ue().is_err());
    }
}
