use std::io::{Seek, Write};

use bstringify::bstringify;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::{
    bits::BitReader,
    bitstream::strip_emulation_prevention,
    marshal::{
        avc::unique_parameter_set,
        encode_box_header,
        iso::{CodingConstraintsBox, VisualSampleEntry},
        update_box_header, Decode, Encode, Error, Result,
    },
};

pub const NAL_UNIT_VPS: u8 = 32;
pub const NAL_UNIT_SPS: u8 = 33;
pub const NAL_UNIT_PPS: u8 = 34;

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-15:2014 8.4.1
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug)]
pub struct HevcSampleEntry {
    pub base: VisualSampleEntry,
    pub config: HevcConfigurationBox,
    pub coding_constraints: Option<CodingConstraintsBox>,
}

impl Encode for HevcSampleEntry {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"hvc1")?;

        self.base.encode(output)?;
        self.config.encode(output)?;
        if let Some(coding_constraints) = &self.coding_constraints {
            coding_constraints.encode(output)?;
        }

        update_box_header(output, begin)
    }
}

impl Decode for HevcSampleEntry {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        let base = Decode::decode(input)?;

        let mut config = None;
        let mut coding_constraints = None;

        decode_boxes! {
            input,
            required hvcC config,
            optional ccst coding_constraints,
        }

        Ok(Self {
            base,
            config,
            coding_constraints,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-15:2014 8.4.1.1
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub struct HevcConfigurationBox {
    pub config: HevcDecoderConfigurationRecord,
}

impl Encode for HevcConfigurationBox {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"hvcC")?;

        self.config.encode(output)?;

        update_box_header(output, begin)
    }
}

impl Decode for HevcConfigurationBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            config: Decode::decode(input)?,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-15:2014 8.3.3.1
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub struct NalUnitArray {
    pub nal_unit_type: u8,
    pub nal_units: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HevcDecoderConfigurationRecord {
    pub general_profile_space: u8,
    pub general_tier_flag: bool,
    pub general_profile_idc: u8,
    pub general_profile_compatibility_flags: u32,
    pub general_constraint_indicator_flags: u64,
    pub general_level_idc: u8,
    pub chroma_format_idc: u8,
    pub bit_depth_luma_minus8: u8,
    pub bit_depth_chroma_minus8: u8,
    pub avg_frame_rate: u16,
    pub num_temporal_layers: u8,
    pub temporal_id_nested: bool,
    pub arrays: Vec<NalUnitArray>,
    pub width: u16,
    pub height: u16,
}

impl HevcDecoderConfigurationRecord {
    /// Builds the record from the parameter sets read off the first access
    /// unit, with the average frame rate taken from the configured display
    /// rate (frames per 256 seconds on the wire).
    pub fn from_parameter_sets(
        vps_nals: &[Vec<u8>],
        sps_nals: &[Vec<u8>],
        pps_nals: &[Vec<u8>],
        display_rate: u32,
    ) -> Result<Self> {
        let vps_nal = unique_parameter_set(vps_nals, "video parameter set")?;
        let sps_nal = unique_parameter_set(sps_nals, "sequence parameter set")?;
        let pps_nal = unique_parameter_set(pps_nals, "picture parameter set")?;
        let sps = SequenceParameterSet::parse(sps_nal)?;
        Ok(Self {
            general_profile_space: sps.general_profile_space,
            general_tier_flag: sps.general_tier_flag,
            general_profile_idc: sps.general_profile_idc,
            general_profile_compatibility_flags: sps.general_profile_compatibility_flags,
            general_constraint_indicator_flags: sps.general_constraint_indicator_flags,
            general_level_idc: sps.general_level_idc,
            chroma_format_idc: sps.chroma_format_idc,
            bit_depth_luma_minus8: sps.bit_depth_luma_minus8,
            bit_depth_chroma_minus8: sps.bit_depth_chroma_minus8,
            avg_frame_rate: display_rate.saturating_mul(256).min(u16::MAX as u32) as u16,
            num_temporal_layers: sps.max_sub_layers,
            temporal_id_nested: sps.temporal_id_nested,
            arrays: vec![
                NalUnitArray {
                    nal_unit_type: NAL_UNIT_VPS,
                    nal_units: vec![vps_nal.clone()],
                },
                NalUnitArray {
                    nal_unit_type: NAL_UNIT_SPS,
                    nal_units: vec![sps_nal.clone()],
                },
                NalUnitArray {
                    nal_unit_type: NAL_UNIT_PPS,
                    nal_units: vec![pps_nal.clone()],
                },
            ],
            width: sps.width,
            height: sps.height,
        })
    }
}

impl Encode for HevcDecoderConfigurationRecord {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        output.write_u8(1)?; // configurationVersion
        output.write_u8(
            self.general_profile_space << 6
                | (self.general_tier_flag as u8) << 5
                | self.general_profile_idc,
        )?;
        self.general_profile_compatibility_flags.encode(output)?;
        output.write_u16::<BigEndian>((self.general_constraint_indicator_flags >> 32) as u16)?;
        output.write_u32::<BigEndian>(self.general_constraint_indicator_flags as u32)?;
        output.write_u8(self.general_level_idc)?;
        0xF000u16.encode(output)?; // min_spatial_segmentation_idc
        output.write_u8(0xFC)?; // parallelismType
        output.write_u8(0xFC | self.chroma_format_idc)?;
        output.write_u8(0xF8 | self.bit_depth_luma_minus8)?;
        output.write_u8(0xF8 | self.bit_depth_chroma_minus8)?;
        self.avg_frame_rate.encode(output)?;
        output.write_u8(
            self.num_temporal_layers << 3 | (self.temporal_id_nested as u8) << 2 | 3,
        )?;
        output.write_u8(self.arrays.len() as u8)?;
        for array in &self.arrays {
            output.write_u8(array.nal_unit_type & 0x3F)?; // array_completeness 0
            (array.nal_units.len() as u16).encode(output)?;
            for nal_unit in &array.nal_units {
                (nal_unit.len() as u16).encode(output)?;
                output.write_all(nal_unit)?;
            }
        }
        Ok(())
    }
}

impl Decode for HevcDecoderConfigurationRecord {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        input.read_u8()?; // configurationVersion
        let byte = input.read_u8()?;
        let general_profile_space = byte >> 6;
        let general_tier_flag = byte >> 5 & 1 != 0;
        let general_profile_idc = byte & 0x1F;
        let general_profile_compatibility_flags = u32::decode(input)?;
        let general_constraint_indicator_flags =
            (u16::decode(input)? as u64) << 32 | u32::decode(input)? as u64;
        let general_level_idc = input.read_u8()?;
        u16::decode(input)?; // min_spatial_segmentation_idc
        input.read_u8()?; // parallelismType
        let chroma_format_idc = input.read_u8()? & 0x3;
        let bit_depth_luma_minus8 = input.read_u8()? & 0x7;
        let bit_depth_chroma_minus8 = input.read_u8()? & 0x7;
        let avg_frame_rate = Decode::decode(input)?;
        let byte = input.read_u8()?;
        let num_temporal_layers = byte >> 3 & 0x7;
        let temporal_id_nested = byte >> 2 & 1 != 0;
        let array_count = input.read_u8()?;
        let mut arrays = Vec::default();
        for _ in 0..array_count {
            let nal_unit_type = input.read_u8()? & 0x3F;
            let nal_unit_count = u16::decode(input)?;
            let mut nal_units = Vec::default();
            for _ in 0..nal_unit_count {
                let length = u16::decode(input)? as usize;
                if length > input.len() {
                    return Err(Error::ParameterSet("nal unit array"));
                }
                let (data, remaining_data) = input.split_at(length);
                nal_units.push(data.to_owned());
                *input = remaining_data;
            }
            arrays.push(NalUnitArray {
                nal_unit_type,
                nal_units,
            });
        }
        let sps_nal = arrays
            .iter()
            .find(|array| array.nal_unit_type == NAL_UNIT_SPS)
            .and_then(|array| array.nal_units.first())
            .ok_or(Error::ParameterSet("sequence parameter set"))?;
        let sps = SequenceParameterSet::parse(sps_nal)?;
        Ok(Self {
            general_profile_space,
            general_tier_flag,
            general_profile_idc,
            general_profile_compatibility_flags,
            general_constraint_indicator_flags,
            general_level_idc,
            chroma_format_idc,
            bit_depth_luma_minus8,
            bit_depth_chroma_minus8,
            avg_frame_rate,
            num_temporal_layers,
            temporal_id_nested,
            arrays,
            width: sps.width,
            height: sps.height,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 23008-2 7.3.2.2
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug)]
pub struct SequenceParameterSet {
    pub general_profile_space: u8,
    pub general_tier_flag: bool,
    pub general_profile_idc: u8,
    pub general_profile_compatibility_flags: u32,
    pub general_constraint_indicator_flags: u64,
    pub general_level_idc: u8,
    pub max_sub_layers: u8,
    pub temporal_id_nested: bool,
    pub chroma_format_idc: u8,
    pub bit_depth_luma_minus8: u8,
    pub bit_depth_chroma_minus8: u8,
    pub width: u16,
    pub height: u16,
}

impl SequenceParameterSet {
    pub fn parse(nal: &[u8]) -> Result<Self> {
        if nal.len() < 16 {
            return Err(Error::ParameterSet("sequence parameter set"));
        }
        // Skip the two byte NAL unit header.
        let rbsp = strip_emulation_prevention(&nal[2..]);
        let mut reader = BitReader::new(&rbsp);

        reader.bits(4)?; // sps_video_parameter_set_id
        let max_sub_layers = reader.bits(3)? as u8 + 1;
        let temporal_id_nested = reader.bit()?;

        // profile_tier_level
        let general_profile_space = reader.bits(2)? as u8;
        let general_tier_flag = reader.bit()?;
        let general_profile_idc = reader.bits(5)? as u8;
        let general_profile_compatibility_flags = reader.bits(32)?;
        let general_constraint_indicator_flags =
            (reader.bits(16)? as u64) << 32 | reader.bits(32)? as u64;
        let general_level_idc = reader.bits(8)? as u8;
        let mut profile_present = [false; 8];
        let mut level_present = [false; 8];
        for index in 0..max_sub_layers as usize - 1 {
            profile_present[index] = reader.bit()?;
            level_present[index] = reader.bit()?;
        }
        if max_sub_layers > 1 {
            for _ in max_sub_layers - 1..8 {
                reader.bits(2)?; // reserved_zero_2bits
            }
        }
        for index in 0..max_sub_layers as usize - 1 {
            if profile_present[index] {
                reader.bits(32)?;
                reader.bits(32)?;
                reader.bits(24)?; // 88 bits of sub layer profile data
            }
            if level_present[index] {
                reader.bits(8)?; // sub_layer_level_idc
            }
        }

        reader.ue()?; // sps_seq_parameter_set_id
        let chroma_format_idc = reader.ue()? as u8;
        if chroma_format_idc == 3 {
            reader.bit()?; // separate_colour_plane_flag
        }
        let pic_width_in_luma_samples = reader.ue()?;
        let pic_height_in_luma_samples = reader.ue()?;
        let mut window_left = 0;
        let mut window_right = 0;
        let mut window_top = 0;
        let mut window_bottom = 0;
        if reader.bit()? {
            // conformance_window_flag
            window_left = reader.ue()?;
            window_right = reader.ue()?;
            window_top = reader.ue()?;
            window_bottom = reader.ue()?;
        }
        let bit_depth_luma_minus8 = reader.ue()? as u8;
        let bit_depth_chroma_minus8 = reader.ue()? as u8;

        let (sub_width, sub_height) = match chroma_format_idc {
            1 => (2, 2),
            2 => (2, 1),
            _ => (1, 1),
        };
        let width = pic_width_in_luma_samples - (window_left + window_right) * sub_width;
        let height = pic_height_in_luma_samples - (window_top + window_bottom) * sub_height;

        Ok(Self {
            general_profile_space,
            general_tier_flag,
            general_profile_idc,
            general_profile_compatibility_flags,
            general_constraint_indicator_flags,
            general_level_idc,
            max_sub_layers,
            temporal_id_nested,
            chroma_format_idc,
            bit_depth_luma_minus8,
            bit_depth_chroma_minus8,
            width: width as u16,
            height: height as u16,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Cursor;

    use crate::bits::BitWriter;

    use super::*;

    // Main profile, level 3.1, 1280x720, 4:2:0.
    pub(crate) fn synthetic_sps() -> Vec<u8> {
        let mut writer = BitWriter::new();
        writer
            .bits(0, 4) // sps_video_parameter_set_id
            .bits(0, 3) // sps_max_sub_layers_minus1
            .bits(1, 1) // sps_temporal_id_nesting_flag
            .bits(0, 2) // general_profile_space
            .bits(0, 1) // general_tier_flag
            .bits(1, 5) // general_profile_idc
            .bits(0x6000_0000, 32) // general_profile_compatibility_flags
            .bits(0, 16)
            .bits(0, 32) // general_constraint_indicator_flags
            .bits(93, 8) // general_level_idc
            .ue(0) // sps_seq_parameter_set_id
            .ue(1) // chroma_format_idc
            .ue(1280) // pic_width_in_luma_samples
            .ue(720) // pic_height_in_luma_samples
            .bits(0, 1) // conformance_window_flag
            .ue(0) // bit_depth_luma_minus8
            .ue(0); // bit_depth_chroma_minus8
        let mut nal = vec![NAL_UNIT_SPS << 1, 1];
        nal.extend(writer.finish());
        nal
    }

    pub(crate) fn synthetic_vps() -> Vec<u8> {
        vec![NAL_UNIT_VPS << 1, 1, 0x0C, 0x01, 0xFF, 0xFF]
    }

    pub(crate) fn synthetic_pps() -> Vec<u8> {
        vec![NAL_UNIT_PPS << 1, 1, 0xC1, 0x72, 0xB4, 0x62, 0x40]
    }

    #[test]
    fn sequence_parameter_set_yields_dimensions() {
        let sps = SequenceParameterSet::parse(&synthetic_sps()).unwrap();
        assert_eq!(sps.general_profile_idc, 1);
        assert_eq!(sps.general_level_idc, 93);
        assert_eq!(sps.chroma_format_idc, 1);
        assert!(sps.temporal_id_nested);
        assert_eq!(sps.width, 1280);
        assert_eq!(sps.height, 720);
    }

    #[test]
    fn record_carries_all_three_parameter_set_arrays() {
        let record = HevcDecoderConfigurationRecord::from_parameter_sets(
            &[synthetic_vps()],
            &[synthetic_sps()],
            &[synthetic_pps()],
            30,
        )
        .unwrap();
        assert_eq!(record.avg_frame_rate, 7680);
        assert_eq!(
            record
                .arrays
                .iter()
                .map(|array| array.nal_unit_type)
                .collect::<Vec<_>>(),
            vec![NAL_UNIT_VPS, NAL_UNIT_SPS, NAL_UNIT_PPS]
        );
    }

    #[test]
    fn configuration_box_round_trips() {
        let config = HevcConfigurationBox {
            config: HevcDecoderConfigurationRecord::from_parameter_sets(
                &[synthetic_vps()],
                &[synthetic_sps()],
                &[synthetic_pps()],
                25,
            )
            .unwrap(),
        };

        let mut output = Cursor::new(Vec::new());
        config.encode(&mut output).unwrap();
        let data = output.into_inner();
        assert_eq!(
            u32::from_be_bytes(data[..4].try_into().unwrap()) as usize,
            data.len()
        );
        let mut input = &data[8..];
        let decoded = HevcConfigurationBox::decode(&mut input).unwrap();
        assert_eq!(decoded, config);
        assert_eq!(decoded.config.width, 1280);
        assert_eq!(decoded.config.height, 720);
    }

    #[test]
    fn truncated_record_is_rejected() {
        let mut data = vec![
            1, // configurationVersion
            0x01, // profile space / tier / profile_idc
            0x60, 0, 0, 0, // compatibility flags
            0, 0, 0, 0, 0, 0, // constraint indicator flags
            93,   // level_idc
            0xF0, 0x00, // min_spatial_segmentation_idc
            0xFC, // parallelismType
            0xFD, // chroma_format_idc
            0xF8, 0xF8, // bit depths
            0, 0, // avg_frame_rate
            0x0F, // temporal layers / nesting
            1,    // array count
        ];
        // One array declaring a 255 byte NAL unit with 2 bytes present.
        data.extend_from_slice(&[NAL_UNIT_SPS, 0, 1, 0, 255, 0x42, 0x01]);

        let mut input = data.as_slice();
        assert!(matches!(
            HevcDecoderConfigurationRecord::decode(&mut input),
            Err(Error::ParameterSet(_))
        ));
    }

    #[test]
    fn missing_video_parameter_set_is_rejected() {
        assert!(matches!(
            HevcDecoderConfigurationRecord::from_parameter_sets(
                &[],
                &[synthetic_sps()],
                &[synthetic_pps()],
                30,
            ),
            Err(Error::ParameterSet(_))
        ));
    }
}
