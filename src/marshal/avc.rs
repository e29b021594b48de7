use std::io::{Seek, Write};

use bstringify::bstringify;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::{
    bits::BitReader,
    bitstream::strip_emulation_prevention,
    marshal::{
        encode_box_header,
        iso::{CodingConstraintsBox, VisualSampleEntry},
        update_box_header, Decode, Encode, Error, Result,
    },
};

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-15:2014 5.4.2
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug)]
pub struct AvcSampleEntry {
    pub base: VisualSampleEntry,
    pub config: AvcConfigurationBox,
    pub coding_constraints: Option<CodingConstraintsBox>,
}

impl Encode for AvcSampleEntry {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"avc1")?;

        self.base.encode(output)?;
        self.config.encode(output)?;
        if let Some(coding_constraints) = &self.coding_constraints {
            coding_constraints.encode(output)?;
        }

        update_box_header(output, begin)
    }
}

impl Decode for AvcSampleEntry {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        let base = Decode::decode(input)?;

        let mut config = None;
        let mut coding_constraints = None;

        decode_boxes! {
            input,
            required avcC config,
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
// ISO/IEC 14496-15:2014 5.4.2.1
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub struct AvcConfigurationBox {
    pub config: AvcDecoderConfigurationRecord,
}

impl Encode for AvcConfigurationBox {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"avcC")?;

        self.config.encode(output)?;

        update_box_header(output, begin)
    }
}

impl Decode for AvcConfigurationBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            config: Decode::decode(input)?,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-15:2014 5.3.3.1
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub struct AvcDecoderConfigurationRecord {
    pub profile_idc: u8,
    pub profile_compatibility: u8,
    pub level_idc: u8,
    pub sequence_parameter_sets: Vec<Vec<u8>>,
    pub picture_parameter_sets: Vec<Vec<u8>>,
    pub width: u16,
    pub height: u16,
}

impl AvcDecoderConfigurationRecord {
    /// Builds the record from the parameter sets read off the first access
    /// unit. Profile, level and coded picture dimensions come from the
    /// sequence parameter set.
    pub fn from_parameter_sets(
        sps_nals: &[Vec<u8>],
        pps_nals: &[Vec<u8>],
    ) -> Result<Self> {
        let sps_nal = unique_parameter_set(sps_nals, "sequence parameter set")?;
        let pps_nal = unique_parameter_set(pps_nals, "picture parameter set")?;
        let sps = SequenceParameterSet::parse(sps_nal)?;
        Ok(Self {
            profile_idc: sps.profile_idc,
            profile_compatibility: sps.profile_compatibility,
            level_idc: sps.level_idc,
            sequence_parameter_sets: vec![sps_nal.clone()],
            picture_parameter_sets: vec![pps_nal.clone()],
            width: sps.width,
            height: sps.height,
        })
    }
}

pub(crate) fn unique_parameter_set<'a>(
    nals: &'a [Vec<u8>],
    kind: &'static str,
) -> Result<&'a Vec<u8>> {
    let first = nals.first().ok_or(Error::ParameterSet(kind))?;
    if nals.iter().any(|nal| nal != first) {
        return Err(Error::ParameterSet(kind));
    }
    Ok(first)
}

impl Encode for AvcDecoderConfigurationRecord {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        output.write_u8(1)?; // configurationVersion
        output.write_u8(self.profile_idc)?;
        output.write_u8(self.profile_compatibility)?;
        output.write_u8(self.level_idc)?;
        output.write_u8(0xFC | 3)?; // lengthSizeMinusOne
        output.write_u8(0xE0 | self.sequence_parameter_sets.len() as u8)?;
        for sps in &self.sequence_parameter_sets {
            (sps.len() as u16).encode(output)?;
            output.write_all(sps)?;
        }
        output.write_u8(self.picture_parameter_sets.len() as u8)?;
        for pps in &self.picture_parameter_sets {
            (pps.len() as u16).encode(output)?;
            output.write_all(pps)?;
        }
        Ok(())
    }
}

impl Decode for AvcDecoderConfigurationRecord {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        input.read_u8()?; // configurationVersion
        let profile_idc = input.read_u8()?;
        let profile_compatibility = input.read_u8()?;
        let level_idc = input.read_u8()?;
        input.read_u8()?; // lengthSizeMinusOne
        let sps_count = input.read_u8()? & 0x1F;
        let mut sequence_parameter_sets = Vec::default();
        for _ in 0..sps_count {
            let length = u16::decode(input)? as usize;
            if length > input.len() {
                return Err(Error::ParameterSet("sequence parameter set"));
            }
            let (data, remaining_data) = input.split_at(length);
            sequence_parameter_sets.push(data.to_owned());
            *input = remaining_data;
        }
        let pps_count = input.read_u8()?;
        let mut picture_parameter_sets = Vec::default();
        for _ in 0..pps_count {
            let length = u16::decode(input)? as usize;
            if length > input.len() {
                return Err(Error::ParameterSet("picture parameter set"));
            }
            let (data, remaining_data) = input.split_at(length);
            picture_parameter_sets.push(data.to_owned());
            *input = remaining_data;
        }
        let sps = SequenceParameterSet::parse(
            sequence_parameter_sets
                .first()
                .ok_or(Error::ParameterSet("sequence parameter set"))?,
        )?;
        Ok(Self {
            profile_idc,
            profile_compatibility,
            level_idc,
            sequence_parameter_sets,
            picture_parameter_sets,
            width: sps.width,
            height: sps.height,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-10 7.3.2.1
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug)]
pub struct SequenceParameterSet {
    pub profile_idc: u8,
    pub profile_compatibility: u8,
    pub level_idc: u8,
    pub width: u16,
    pub height: u16,
}

impl SequenceParameterSet {
    pub fn parse(nal: &[u8]) -> Result<Self> {
        if nal.len() < 4 {
            return Err(Error::ParameterSet("sequence parameter set"));
        }
        // Skip the one byte NAL unit header.
        let rbsp = strip_emulation_prevention(&nal[1..]);
        let mut reader = BitReader::new(&rbsp);

        let profile_idc = reader.bits(8)? as u8;
        let profile_compatibility = reader.bits(8)? as u8;
        let level_idc = reader.bits(8)? as u8;
        reader.ue()?; // seq_parameter_set_id

        let mut chroma_format_idc = 1;
        if matches!(
            profile_idc,
            100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135
        ) {
            chroma_format_idc = reader.ue()?;
            if chroma_format_idc == 3 {
                reader.bit()?; // separate_colour_plane_flag
            }
            reader.ue()?; // bit_depth_luma_minus8
            reader.ue()?; // bit_depth_chroma_minus8
            reader.bit()?; // qpprime_y_zero_transform_bypass_flag
            if reader.bit()? {
                // seq_scaling_matrix_present_flag
                let list_count = if chroma_format_idc == 3 { 12 } else { 8 };
                for index in 0..list_count {
                    if reader.bit()? {
                        skip_scaling_list(&mut reader, if index < 6 { 16 } else { 64 })?;
                    }
                }
            }
        }

        reader.ue()?; // log2_max_frame_num_minus4
        let pic_order_cnt_type = reader.ue()?;
        match pic_order_cnt_type {
            0 => {
                reader.ue()?; // log2_max_pic_order_cnt_lsb_minus4
            }
            1 => {
                reader.bit()?; // delta_pic_order_always_zero_flag
                reader.se()?; // offset_for_non_ref_pic
                reader.se()?; // offset_for_top_to_bottom_field
                let cycle_length = reader.ue()?;
                for _ in 0..cycle_length {
                    reader.se()?; // offset_for_ref_frame
                }
            }
            _ => {}
        }
        reader.ue()?; // max_num_ref_frames
        reader.bit()?; // gaps_in_frame_num_value_allowed_flag

        let pic_width_in_mbs = reader.ue()? + 1;
        let pic_height_in_map_units = reader.ue()? + 1;
        let frame_mbs_only = reader.bit()?;
        if !frame_mbs_only {
            reader.bit()?; // mb_adaptive_frame_field_flag
        }
        reader.bit()?; // direct_8x8_inference_flag

        let mut crop_left = 0;
        let mut crop_right = 0;
        let mut crop_top = 0;
        let mut crop_bottom = 0;
        if reader.bit()? {
            // frame_cropping_flag
            crop_left = reader.ue()?;
            crop_right = reader.ue()?;
            crop_top = reader.ue()?;
            crop_bottom = reader.ue()?;
        }

        let (crop_unit_x, crop_unit_y) = match chroma_format_idc {
            0 | 3 => (1, 2 - frame_mbs_only as u32),
            1 => (2, 2 * (2 - frame_mbs_only as u32)),
            _ => (2, 2 - frame_mbs_only as u32),
        };
        let width = pic_width_in_mbs * 16 - (crop_left + crop_right) * crop_unit_x;
        let height = pic_height_in_map_units * 16 * (2 - frame_mbs_only as u32)
            - (crop_top + crop_bottom) * crop_unit_y;

        Ok(Self {
            profile_idc,
            profile_compatibility,
            level_idc,
            width: width as u16,
            height: height as u16,
        })
    }
}

fn skip_scaling_list(reader: &mut BitReader, size: u32) -> Result<()> {
    let mut last_scale = 8i32;
    let mut next_scale = 8i32;
    for _ in 0..size {
        if next_scale != 0 {
            let delta = reader.se()?;
            next_scale = (last_scale + delta + 256) % 256;
        }
        if next_scale != 0 {
            last_scale = next_scale;
        }
    }
    Ok(())
}
