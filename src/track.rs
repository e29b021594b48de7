use std::{
    mem,
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};

use fixed::types::U16F16;

use crate::{
    bitstream::{append_length_prefixed, AccessUnit, BitstreamParser},
    marshal::{
        avc::{AvcConfigurationBox, AvcDecoderConfigurationRecord, AvcSampleEntry},
        hevc::{HevcConfigurationBox, HevcDecoderConfigurationRecord, HevcSampleEntry},
        iso::{
            CodingConstraintsBox, DataEntry, DataEntryUrlBox, DataInformationBox,
            DataReferenceBox, EditBox, HandlerBox, MediaBox, MediaHeaderBox,
            MediaInformationBox, SampleDescriptionBox, SampleEntry, SampleTableBox, TrackBox,
            TrackHeaderBox, VideoMediaHeaderBox, VisualSampleEntry, DATA_ENTRY_SELF_CONTAINED,
            TRACK_ENABLED, TRACK_IN_MOVIE, TRACK_IN_PREVIEW,
        },
        Error, FourCC, Language, Matrix, Result,
    },
    sample_table::SampleTableBuilder,
    timing::{EditList, PtsResolver, TimeTableBuilder},
};

// Offset between the 1904 epoch of box timestamps and the Unix epoch.
const SECONDS_1904_TO_1970: u64 = 2_082_844_800;

fn seconds_since_1904() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
        + SECONDS_1904_TO_1970
}

/// Turns one elementary stream into a fully populated `trak` subtree plus its
/// media-data payload. A writer is reusable: `finalize_writing` hands the
/// track over and resets the ingest state.
pub struct TrackWriter {
    track_id: u32,
    edit_list: Option<EditList>,
    filename: PathBuf,
    clock_ticks: u32,
    enabled: bool,
    in_movie: bool,
    in_preview: bool,
    alternate_group: u16,
    display_width: u32,
    display_height: u32,
    display_rate: u32,
    vps_nal_units: Vec<Vec<u8>>,
    sps_nal_units: Vec<Vec<u8>>,
    pps_nal_units: Vec<Vec<u8>>,
    media_data: Vec<u8>,
    sample_sizes: Vec<u32>,
    sync_flags: Vec<bool>,
    refs_list: Vec<Vec<u32>>,
    display_order: Vec<u32>,
    has_pred: bool,
    track: Option<TrackBox>,
}

impl TrackWriter {
    pub fn new(
        track_id: u32,
        edit_list: Option<EditList>,
        filename: impl Into<PathBuf>,
        clock_ticks: u32,
    ) -> Self {
        Self {
            track_id,
            edit_list,
            filename: filename.into(),
            clock_ticks,
            enabled: true,
            in_movie: true,
            in_preview: false,
            alternate_group: 0,
            display_width: 0,
            display_height: 0,
            display_rate: 0,
            vps_nal_units: vec![],
            sps_nal_units: vec![],
            pps_nal_units: vec![],
            media_data: vec![],
            sample_sizes: vec![],
            sync_flags: vec![],
            refs_list: vec![],
            display_order: vec![],
            has_pred: false,
            track: None,
        }
    }

    pub fn set_track_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn set_display_track(&mut self, in_movie: bool) {
        self.in_movie = in_movie;
    }

    pub fn set_preview_track(&mut self, in_preview: bool) {
        self.in_preview = in_preview;
    }

    pub fn set_track_as_alter(&mut self, alternate_group: u16) {
        self.alternate_group = alternate_group;
    }

    pub fn set_display_width(&mut self, width: u32) {
        self.display_width = width;
    }

    pub fn set_display_height(&mut self, height: u32) {
        self.display_height = height;
    }

    pub fn set_display_rate(&mut self, rate: u32) {
        self.display_rate = rate;
    }

    /// Reads every access unit off the parser and builds the complete track
    /// subtree. `code_type` selects the sample entry, avc1 or hvc1.
    pub fn write_track(
        &mut self,
        parser: &mut dyn BitstreamParser,
        code_type: FourCC,
    ) -> Result<()> {
        if !matches!(&code_type.to_bytes(), b"avc1" | b"hvc1") {
            return Err(Error::UnsupportedCodeType(code_type));
        }
        self.ingest(parser)?;
        self.build_track(code_type)
    }

    fn ingest(&mut self, parser: &mut dyn BitstreamParser) -> Result<()> {
        log::debug!("track {}: parsing {}", self.track_id, self.filename.display());
        if !parser.open_file(&self.filename) {
            return Err(Error::BitstreamOpen(self.filename.display().to_string()));
        }

        let mut vps_nal_units = Vec::default();
        let mut sps_nal_units = Vec::default();
        let mut pps_nal_units = Vec::default();
        let mut media_data = Vec::default();
        let mut sample_sizes = Vec::default();
        let mut sync_flags = Vec::default();
        let mut refs_list = Vec::default();
        let mut display_order = Vec::default();
        let mut has_pred = false;

        loop {
            let mut access_unit = AccessUnit::default();
            if !parser.parse_next_au(&mut access_unit) {
                if parser.end_of_stream() {
                    break;
                }
                return Err(Error::BitstreamParse(self.filename.display().to_string()));
            }

            if sps_nal_units.is_empty() && !access_unit.sps_nal_units.is_empty() {
                vps_nal_units = access_unit.vps_nal_units.clone();
                sps_nal_units = access_unit.sps_nal_units.clone();
                pps_nal_units = access_unit.pps_nal_units.clone();
            }

            let mut length = 0;
            for nal_unit in &access_unit.nal_units {
                length += append_length_prefixed(&mut media_data, nal_unit);
            }
            sample_sizes.push(length);
            sync_flags.push(access_unit.is_idr);
            if !access_unit.is_intra && !access_unit.is_idr {
                has_pred = true;
            }
            refs_list.push(access_unit.ref_pic_indices.clone());
            display_order.push(access_unit.display_order);
        }

        log::debug!(
            "track {}: ingested {} samples ({} bytes)",
            self.track_id,
            sample_sizes.len(),
            media_data.len()
        );
        self.vps_nal_units = vps_nal_units;
        self.sps_nal_units = sps_nal_units;
        self.pps_nal_units = pps_nal_units;
        self.media_data = media_data;
        self.sample_sizes = sample_sizes;
        self.sync_flags = sync_flags;
        self.refs_list = refs_list;
        self.display_order = display_order;
        self.has_pred = has_pred;
        Ok(())
    }

    fn coding_constraints(&self) -> CodingConstraintsBox {
        let max_ref_per_pic = if self.has_pred {
            self.refs_list
                .iter()
                .map(|refs| refs.len())
                .max()
                .unwrap_or(0) as u8
        } else {
            0
        };
        CodingConstraintsBox {
            all_ref_pics_intra: !self.has_pred,
            intra_pred_used: true,
            max_ref_per_pic,
        }
    }

    fn sample_entry(&self, code_type: FourCC) -> Result<(SampleEntry, u16, u16)> {
        match &code_type.to_bytes() {
            b"avc1" => {
                let config = AvcDecoderConfigurationRecord::from_parameter_sets(
                    &self.sps_nal_units,
                    &self.pps_nal_units,
                )?;
                let (width, height) = (config.width, config.height);
                Ok((
                    SampleEntry::Avc(AvcSampleEntry {
                        base: VisualSampleEntry::new(width, height),
                        config: AvcConfigurationBox { config },
                        coding_constraints: Some(self.coding_constraints()),
                    }),
                    width,
                    height,
                ))
            }
            b"hvc1" => {
                let config = HevcDecoderConfigurationRecord::from_parameter_sets(
                    &self.vps_nal_units,
                    &self.sps_nal_units,
                    &self.pps_nal_units,
                    self.display_rate,
                )?;
                let (width, height) = (config.width, config.height);
                Ok((
                    SampleEntry::Hevc(HevcSampleEntry {
                        base: VisualSampleEntry::new(width, height),
                        config: HevcConfigurationBox { config },
                        coding_constraints: Some(self.coding_constraints()),
                    }),
                    width,
                    height,
                ))
            }
            _ => Err(Error::UnsupportedCodeType(code_type)),
        }
    }

    fn build_track(&mut self, code_type: FourCC) -> Result<()> {
        log::debug!("track {}: building sample tables", self.track_id);
        let builder = SampleTableBuilder::new(
            &self.sample_sizes,
            &self.sync_flags,
            &self.refs_list,
            self.has_pred,
        );
        let sample_size = builder.sample_sizes();
        let sample_to_chunk = builder.sample_to_chunk();
        let chunk_offset = builder.chunk_offsets();
        let sync_sample = builder.sync_samples();
        let groups = builder.reference_groups();

        log::debug!("track {}: reconciling timing", self.track_id);
        let time_builder = TimeTableBuilder::with_display_rate(
            self.clock_ticks,
            self.display_rate,
            &self.display_order,
        );
        let time_to_sample = time_builder.time_to_sample();
        let composition_offset = time_builder.composition_offsets();
        let composition_to_decode = time_builder.composition_to_decode();

        let edit = self
            .edit_list
            .as_ref()
            .filter(|edit_list| !edit_list.is_empty())
            .map(|edit_list| EditBox {
                edit_list: Some(edit_list.to_box()),
            });

        let mut resolver = PtsResolver::default();
        resolver.load_time_to_sample(&time_to_sample);
        if let Some(composition_offset) = &composition_offset {
            resolver.load_composition_offsets(composition_offset);
        }
        if let Some(composition_to_decode) = &composition_to_decode {
            resolver.load_composition_to_decode(composition_to_decode);
        }
        if let Some(edit_list) = edit.as_ref().and_then(|edit| edit.edit_list.as_ref()) {
            resolver.load_edit_list(edit_list);
        }
        resolver.unravel();
        let span = resolver.span();
        let duration = match &self.edit_list {
            Some(edit_list) => edit_list.total_duration(span),
            None => span,
        };
        log::debug!("track {}: span {span}, duration {duration}", self.track_id);

        let (entry, coded_width, coded_height) = self.sample_entry(code_type)?;
        let width = match self.display_width {
            0 => coded_width,
            width => width as u16,
        };
        let height = match self.display_height {
            0 => coded_height,
            height => height as u16,
        };

        let (sample_to_group, group_description) = match groups {
            Some((description, to_group)) => (Some(to_group), Some(description)),
            None => (None, None),
        };
        let sample_table = SampleTableBox {
            description: SampleDescriptionBox { entry },
            time_to_sample,
            composition_offset,
            composition_to_decode,
            sample_to_chunk,
            sample_size,
            chunk_offset,
            sync_sample,
            sample_to_group,
            group_description,
        };

        let mut flags = 0;
        if self.enabled {
            flags |= TRACK_ENABLED;
        }
        if self.in_movie {
            flags |= TRACK_IN_MOVIE;
        }
        if self.in_preview {
            flags |= TRACK_IN_PREVIEW;
        }

        let now = seconds_since_1904();
        self.track = Some(TrackBox {
            header: TrackHeaderBox {
                flags,
                creation_time: now,
                modification_time: now,
                track_id: self.track_id,
                duration,
                layer: 0,
                alternate_group: self.alternate_group,
                volume: Default::default(),
                matrix: Matrix::identity(),
                width: U16F16::from_num(width),
                height: U16F16::from_num(height),
            },
            edit,
            media: MediaBox {
                header: MediaHeaderBox {
                    creation_time: now,
                    modification_time: now,
                    timescale: self.clock_ticks,
                    duration,
                    language: Language(0x55C4), // und
                },
                handler: HandlerBox {
                    r#type: FourCC(u32::from_be_bytes(*b"pict")),
                    name: String::new(),
                },
                information: MediaInformationBox {
                    video_header: VideoMediaHeaderBox {
                        graphicsmode: 0,
                        opcolor: [0; 3],
                    },
                    data_information: DataInformationBox {
                        reference: DataReferenceBox {
                            entries: vec![DataEntry::Url(DataEntryUrlBox {
                                flags: DATA_ENTRY_SELF_CONTAINED,
                                location: String::new(),
                            })],
                        },
                    },
                    sample_table,
                },
            },
        });
        Ok(())
    }

    /// Detaches the finished track subtree and resets the ingest state so the
    /// writer can be pointed at another stream.
    pub fn finalize_writing(&mut self) -> Result<TrackBox> {
        let track = self.track.take().ok_or(Error::StructuralInconsistency(
            "no track has been written yet",
        ))?;
        self.vps_nal_units.clear();
        self.sps_nal_units.clear();
        self.pps_nal_units.clear();
        self.sample_sizes.clear();
        self.sync_flags.clear();
        self.refs_list.clear();
        self.display_order.clear();
        self.has_pred = false;
        Ok(track)
    }

    /// Surrenders the length-prefixed media-data payload for the mdat box.
    pub fn take_media_data(&mut self) -> Vec<u8> {
        mem::take(&mut self.media_data)
    }
}
