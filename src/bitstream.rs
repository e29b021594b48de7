use std::path::Path;

/// One coded picture as produced by an elementary-stream parser, in decode
/// order. Parameter-set lists are populated at most once per stream, on the
/// first access unit that carries them.
#[derive(Debug, Default, Clone)]
pub struct AccessUnit {
    /// Raw NAL units, Annex-B start codes included.
    pub nal_units: Vec<Vec<u8>>,
    /// Parameter-set NAL units without start codes.
    pub vps_nal_units: Vec<Vec<u8>>,
    pub sps_nal_units: Vec<Vec<u8>>,
    pub pps_nal_units: Vec<Vec<u8>>,
    pub is_intra: bool,
    pub is_idr: bool,
    /// Decode-order indices of the pictures this one predicts from.
    pub ref_pic_indices: Vec<u32>,
    pub pic_index: u32,
    pub display_order: u32,
}

/// Elementary-bitstream parser seam. The real AVC/HEVC parsers live outside
/// this crate; tests drive the writer with in-memory implementations.
pub trait BitstreamParser {
    fn open_file(&mut self, path: &Path) -> bool;

    /// Fills the next access unit, false when none was produced. Use
    /// `end_of_stream` to tell exhaustion apart from a parse error.
    fn parse_next_au(&mut self, access_unit: &mut AccessUnit) -> bool;

    fn end_of_stream(&self) -> bool;
}

/// Byte length and offset of one coded sample inside its media-data payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccessUnitInfo {
    pub length: u32,
    pub offset: u32,
}

/// Number of leading bytes forming the Annex-B start code (zeros up to and
/// including the 0x01), 0 if the data does not start with one.
pub fn start_code_len(nal_unit: &[u8]) -> usize {
    let mut len = 0;
    for &byte in nal_unit {
        match byte {
            0 => len += 1,
            1 => return len + 1,
            _ => break,
        }
    }
    0
}

/// Rewrites an Annex-B NAL unit into the container form: 4-byte big-endian
/// payload length followed by the payload, appended to `output`. Returns the
/// number of bytes appended.
pub fn append_length_prefixed(output: &mut Vec<u8>, nal_unit: &[u8]) -> u32 {
    let payload = &nal_unit[start_code_len(nal_unit)..];
    output.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    output.extend_from_slice(payload);
    payload.len() as u32 + 4
}

/// Removes emulation-prevention bytes (0x03 after two zeros) from a NAL
/// payload, yielding the raw RBSP.
pub fn strip_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut rbsp = Vec::with_capacity(data.len());
    let mut zeros = 0;
    for &byte in data {
        if zeros >= 2 && byte == 3 {
            zeros = 0;
            continue;
        }
        if byte == 0 {
            zeros += 1;
        } else {
            zeros = 0;
        }
        rbsp.push(byte);
    }
    rbsp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_codes_of_both_lengths_are_detected() {
        assert_eq!(start_code_len(&[0, 0, 0, 1, 0x65]), 4);
        assert_eq!(start_code_len(&[0, 0, 1, 0x65]), 3);
        assert_eq!(start_code_len(&[0x65, 0, 0, 1]), 0);
    }

    #[test]
    fn length_prefix_replaces_the_start_code() {
        let mut output = Vec::new();
        let appended = append_length_prefixed(&mut output, &[0, 0, 0, 1, 0x65, 0x88, 0x84]);
        assert_eq!(appended, 7);
        assert_eq!(output, [0, 0, 0, 3, 0x65, 0x88, 0x84]);

        let appended = append_length_prefixed(&mut output, &[0, 0, 1, 0x41, 0x9A]);
        assert_eq!(appended, 6);
        assert_eq!(&output[7..], [0, 0, 0, 2, 0x41, 0x9A]);
    }

    #[test]
    fn emulation_prevention_bytes_are_stripped() {
        assert_eq!(
            strip_emulation_prevention(&[0x00, 0x00, 0x03, 0x01, 0x42]),
            [0x00, 0x00, 0x01, 0x42]
        );
        // 0x03 not preceded by two zeros stays.
        assert_eq!(
            strip_emulation_prevention(&[0x00, 0x03, 0x00, 0x00, 0x03, 0x03]),
            [0x00, 0x03, 0x00, 0x00, 0x03]
        );
    }
}
