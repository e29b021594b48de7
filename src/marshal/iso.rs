use std::io::{Read, Seek, Write};

use bstringify::bstringify;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use derivative::Derivative;
use fixed::types::{U16F16, U8F8};
use fixed_macro::types::U16F16;

use crate::marshal::{
    avc::AvcSampleEntry, encode_box_header, hevc::HevcSampleEntry, meta::MetaBox,
    update_box_header, Decode, Encode, Error, FourCC, Language, Matrix, Result,
};

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-12:2015
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Derivative)]
#[derivative(Debug)]
pub struct File {
    pub file_type: FileTypeBox,
    pub meta: Option<MetaBox>,
    pub movie: MovieBox,
    #[derivative(Debug = "ignore")]
    pub media_data: Vec<MediaDataBox>,
}

impl Encode for File {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        self.file_type.encode(output)?;
        if let Some(meta) = &self.meta {
            meta.encode(output)?;
        }
        for media_data in &self.media_data {
            media_data.encode(output)?;
        }
        self.movie.encode(output)
    }
}

impl Decode for File {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        let mut file_type = None;
        let mut meta = None;
        let mut movie = None;
        let mut media_data = vec![];

        decode_boxes! {
            input,
            required ftyp file_type,
            optional meta meta,
            required moov movie,
            multiple mdat media_data,
        }

        Ok(Self {
            file_type,
            meta,
            movie,
            media_data,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-12:2015 4.3
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub struct FileTypeBox {
    pub major_brand: FourCC,
    pub minor_version: u32,
    pub compatible_brands: Vec<FourCC>,
}

impl Encode for FileTypeBox {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"ftyp")?;

        self.major_brand.0.encode(output)?;
        self.minor_version.encode(output)?;
        for compatible_brand in &self.compatible_brands {
            compatible_brand.0.encode(output)?;
        }

        update_box_header(output, begin)
    }
}

impl Decode for FileTypeBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        let major_brand = FourCC(Decode::decode(input)?);
        let minor_version = Decode::decode(input)?;
        let mut compatible_brands = Vec::default();
        while !input.is_empty() {
            compatible_brands.push(FourCC(Decode::decode(input)?));
        }
        Ok(Self {
            major_brand,
            minor_version,
            compatible_brands,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-12:2015 8.1.1
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, PartialEq)]
pub struct MediaDataBox {
    pub data: Vec<u8>,
}

impl Encode for MediaDataBox {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"mdat")?;

        output.write_all(&self.data)?;

        update_box_header(output, begin)
    }
}

impl Decode for MediaDataBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        let data = input.to_owned();
        *input = &input[input.len()..];
        Ok(Self { data })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-12:2015 8.2.1
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug)]
pub struct MovieBox {
    pub header: MovieHeaderBox,
    pub tracks: Vec<TrackBox>,
}

impl Encode for MovieBox {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"moov")?;

        self.header.encode(output)?;
        for track in &self.tracks {
            track.encode(output)?;
        }

        update_box_header(output, begin)
    }
}

impl Decode for MovieBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        let mut header = None;
        let mut tracks = vec![];

        decode_boxes! {
            input,
            required mvhd header,
            multiple trak tracks,
        }

        Ok(Self { header, tracks })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-12:2015 8.2.2
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub struct MovieHeaderBox {
    pub creation_time: u64,
    pub modification_time: u64,
    pub timescale: u32,
    pub duration: u64,
    pub rate: U16F16,
    pub volume: U8F8,
    pub matrix: Matrix,
    pub next_track_id: u32,
}

impl MovieHeaderBox {
    fn version(&self) -> u8 {
        if self.creation_time > u32::MAX as u64
            || self.modification_time > u32::MAX as u64
            || self.duration > u32::MAX as u64
        {
            1
        } else {
            0
        }
    }
}

impl Encode for MovieHeaderBox {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"mvhd")?;
        let version = self.version();
        output.write_u8(version)?;
        output.write_u24::<BigEndian>(0)?; // flags

        match version {
            0 => {
                (self.creation_time as u32).encode(output)?;
                (self.modification_time as u32).encode(output)?;
                self.timescale.encode(output)?;
                (self.duration as u32).encode(output)?;
            }
            _ => {
                self.creation_time.encode(output)?;
                self.modification_time.encode(output)?;
                self.timescale.encode(output)?;
                self.duration.encode(output)?;
            }
        }
        self.rate.encode(output)?;
        self.volume.encode(output)?;
        0u16.encode(output)?; // reserved
        0u32.encode(output)?; // reserved
        0u32.encode(output)?; // reserved
        self.matrix.encode(output)?;
        0u32.encode(output)?; // pre_defined
        0u32.encode(output)?; // pre_defined
        0u32.encode(output)?; // pre_defined
        0u32.encode(output)?; // pre_defined
        0u32.encode(output)?; // pre_defined
        0u32.encode(output)?; // pre_defined
        self.next_track_id.encode(output)?;

        update_box_header(output, begin)
    }
}

impl Decode for MovieHeaderBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        let version = input.read_u8()?;
        input.read_u24::<BigEndian>()?; // flags

        let creation_time;
        let modification_time;
        let timescale;
        let duration;
        match version {
            0 => {
                creation_time = u32::decode(input)? as u64;
                modification_time = u32::decode(input)? as u64;
                timescale = Decode::decode(input)?;
                duration = u32::decode(input)? as u64;
            }
            1 => {
                creation_time = Decode::decode(input)?;
                modification_time = Decode::decode(input)?;
                timescale = Decode::decode(input)?;
                duration = Decode::decode(input)?;
            }
            _ => {
                return Err(Error::InvalidBoxVersion {
                    r#type: "mvhd",
                    version,
                })
            }
        }
        let rate = Decode::decode(input)?;
        let volume = Decode::decode(input)?;
        u16::decode(input)?; // reserved
        u32::decode(input)?; // reserved
        u32::decode(input)?; // reserved
        let matrix = Decode::decode(input)?;
        u32::decode(input)?; // pre_defined
        u32::decode(input)?; // pre_defined
        u32::decode(input)?; // pre_defined
        u32::decode(input)?; // pre_defined
        u32::decode(input)?; // pre_defined
        u32::decode(input)?; // pre_defined
        let next_track_id = Decode::decode(input)?;
        Ok(Self {
            creation_time,
            modification_time,
            timescale,
            duration,
            rate,
            volume,
            matrix,
            next_track_id,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-12:2015 8.3.1
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug)]
pub struct TrackBox {
    pub header: TrackHeaderBox,
    pub edit: Option<EditBox>,
    pub media: MediaBox,
}

impl Encode for TrackBox {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"trak")?;

        self.header.encode(output)?;
        if let Some(edit) = &self.edit {
            edit.encode(output)?;
        }
        self.media.encode(output)?;

        update_box_header(output, begin)
    }
}

impl Decode for TrackBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        let mut header = None;
        let mut edit = None;
        let mut media = None;

        decode_boxes! {
            input,
            required tkhd header,
            optional edts edit,
            required mdia media,
        }

        Ok(Self {
            header,
            edit,
            media,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-12:2015 8.3.2
////////////////////////////////////////////////////////////////////////////////////////////////////

pub const TRACK_ENABLED: u32 = 1;
pub const TRACK_IN_MOVIE: u32 = 2;
pub const TRACK_IN_PREVIEW: u32 = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct TrackHeaderBox {
    pub flags: u32,
    pub creation_time: u64,
    pub modification_time: u64,
    pub track_id: u32,
    pub duration: u64,
    pub layer: u16,
    pub alternate_group: u16,
    pub volume: U8F8,
    pub matrix: Matrix,
    pub width: U16F16,
    pub height: U16F16,
}

impl TrackHeaderBox {
    fn version(&self) -> u8 {
        if self.creation_time > u32::MAX as u64
            || self.modification_time > u32::MAX as u64
            || self.duration > u32::MAX as u64
        {
            1
        } else {
            0
        }
    }
}

impl Encode for TrackHeaderBox {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"tkhd")?;
        let version = self.version();
        output.write_u8(version)?;
        output.write_u24::<BigEndian>(self.flags)?;

        match version {
            0 => {
                (self.creation_time as u32).encode(output)?;
                (self.modification_time as u32).encode(output)?;
                self.track_id.encode(output)?;
                0u32.encode(output)?; // reserved
                (self.duration as u32).encode(output)?;
            }
            _ => {
                self.creation_time.encode(output)?;
                self.modification_time.encode(output)?;
                self.track_id.encode(output)?;
                0u32.encode(output)?; // reserved
                self.duration.encode(output)?;
            }
        }
        0u32.encode(output)?; // reserved
        0u32.encode(output)?; // reserved
        self.layer.encode(output)?;
        self.alternate_group.encode(output)?;
        self.volume.encode(output)?;
        0u16.encode(output)?; // reserved
        self.matrix.encode(output)?;
        self.width.encode(output)?;
        self.height.encode(output)?;

        update_box_header(output, begin)
    }
}

impl Decode for TrackHeaderBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        let version = input.read_u8()?;
        let flags = input.read_u24::<BigEndian>()?;

        let creation_time;
        let modification_time;
        let track_id;
        let duration;
        match version {
            0 => {
                creation_time = u32::decode(input)? as u64;
                modification_time = u32::decode(input)? as u64;
                track_id = Decode::decode(input)?;
                u32::decode(input)?; // reserved
                duration = u32::decode(input)? as u64;
            }
            1 => {
                creation_time = Decode::decode(input)?;
                modification_time = Decode::decode(input)?;
                track_id = Decode::decode(input)?;
                u32::decode(input)?; // reserved
                duration = Decode::decode(input)?;
            }
            _ => {
                return Err(Error::InvalidBoxVersion {
                    r#type: "tkhd",
                    version,
                })
            }
        }
        u32::decode(input)?; // reserved
        u32::decode(input)?; // reserved
        let layer = Decode::decode(input)?;
        let alternate_group = Decode::decode(input)?;
        let volume = Decode::decode(input)?;
        u16::decode(input)?; // reserved
        let matrix = Decode::decode(input)?;
        let width = Decode::decode(input)?;
        let height = Decode::decode(input)?;
        Ok(Self {
            flags,
            creation_time,
            modification_time,
            track_id,
            duration,
            layer,
            alternate_group,
            volume,
            matrix,
            width,
            height,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-12:2015 8.4.1
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug)]
pub struct MediaBox {
    pub header: MediaHeaderBox,
    pub handler: HandlerBox,
    pub information: MediaInformationBox,
}

impl Encode for MediaBox {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"mdia")?;

        self.header.encode(output)?;
        self.handler.encode(output)?;
        self.information.encode(output)?;

        update_box_header(output, begin)
    }
}

impl Decode for MediaBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        let mut header = None;
        let mut handler = None;
        let mut information = None;

        decode_boxes! {
            input,
            required mdhd header,
            required hdlr handler,
            required minf information,
        }

        Ok(Self {
            header,
            handler,
            information,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-12:2015 8.4.2
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub struct MediaHeaderBox {
    pub creation_time: u64,
    pub modification_time: u64,
    pub timescale: u32,
    pub duration: u64,
    pub language: Language,
}

impl MediaHeaderBox {
    fn version(&self) -> u8 {
        if self.creation_time > u32::MAX as u64
            || self.modification_time > u32::MAX as u64
            || self.duration > u32::MAX as u64
        {
            1
        } else {
            0
        }
    }
}

impl Encode for MediaHeaderBox {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"mdhd")?;
        let version = self.version();
        output.write_u8(version)?;
        output.write_u24::<BigEndian>(0)?; // flags

        match version {
            0 => {
                (self.creation_time as u32).encode(output)?;
                (self.modification_time as u32).encode(output)?;
                self.timescale.encode(output)?;
                (self.duration as u32).encode(output)?;
            }
            _ => {
                self.creation_time.encode(output)?;
                self.modification_time.encode(output)?;
                self.timescale.encode(output)?;
                self.duration.encode(output)?;
            }
        }
        self.language.0.encode(output)?;
        0u16.encode(output)?; // pre_defined

        update_box_header(output, begin)
    }
}

impl Decode for MediaHeaderBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        let version = input.read_u8()?;
        input.read_u24::<BigEndian>()?; // flags

        let creation_time;
        let modification_time;
        let timescale;
        let duration;
        match version {
            0 => {
                creation_time = u32::decode(input)? as u64;
                modification_time = u32::decode(input)? as u64;
                timescale = Decode::decode(input)?;
                duration = u32::decode(input)? as u64;
            }
            1 => {
                creation_time = Decode::decode(input)?;
                modification_time = Decode::decode(input)?;
                timescale = Decode::decode(input)?;
                duration = Decode::decode(input)?;
            }
            _ => {
                return Err(Error::InvalidBoxVersion {
                    r#type: "mdhd",
                    version,
                })
            }
        }
        let language = Language(Decode::decode(input)?);
        u16::decode(input)?; // pre_defined
        Ok(Self {
            creation_time,
            modification_time,
            timescale,
            duration,
            language,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-12:2015 8.4.3
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub struct HandlerBox {
    pub r#type: FourCC,
    pub name: String,
}

impl Encode for HandlerBox {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"hdlr")?;
        output.write_u8(0)?; // version
        output.write_u24::<BigEndian>(0)?; // flags

        0u32.encode(output)?; // pre_defined
        self.r#type.0.encode(output)?;
        0u32.encode(output)?; // reserved
        0u32.encode(output)?; // reserved
        0u32.encode(output)?; // reserved
        self.name.encode(output)?;

        update_box_header(output, begin)
    }
}

impl Decode for HandlerBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        input.read_u8()?; // version
        input.read_u24::<BigEndian>()?; // flags

        u32::decode(input)?; // pre_defined
        let r#type = FourCC(Decode::decode(input)?);
        u32::decode(input)?; // reserved
        u32::decode(input)?; // reserved
        u32::decode(input)?; // reserved
        let name = Decode::decode(input)?;
        Ok(Self { r#type, name })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-12:2015 8.4.4
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug)]
pub struct MediaInformationBox {
    pub video_header: VideoMediaHeaderBox,
    pub data_information: DataInformationBox,
    pub sample_table: SampleTableBox,
}

impl Encode for MediaInformationBox {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"minf")?;

        self.video_header.encode(output)?;
        self.data_information.encode(output)?;
        self.sample_table.encode(output)?;

        update_box_header(output, begin)
    }
}

impl Decode for MediaInformationBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        let mut video_header = None;
        let mut data_information = None;
        let mut sample_table = None;

        decode_boxes! {
            input,
            required vmhd video_header,
            required dinf data_information,
            required stbl sample_table,
        }

        Ok(Self {
            video_header,
            data_information,
            sample_table,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-12:2015 12.1.2
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub struct VideoMediaHeaderBox {
    pub graphicsmode: u16,
    pub opcolor: [u16; 3],
}

impl Encode for VideoMediaHeaderBox {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"vmhd")?;
        output.write_u8(0)?; // version
        output.write_u24::<BigEndian>(1)?; // flags

        self.graphicsmode.encode(output)?;
        for value in self.opcolor {
            value.encode(output)?;
        }

        update_box_header(output, begin)
    }
}

impl Decode for VideoMediaHeaderBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        input.read_u8()?; // version
        input.read_u24::<BigEndian>()?; // flags

        Ok(Self {
            graphicsmode: Decode::decode(input)?,
            opcolor: [
                Decode::decode(input)?,
                Decode::decode(input)?,
                Decode::decode(input)?,
            ],
        })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-12:2015 8.7.1
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub struct DataInformationBox {
    pub reference: DataReferenceBox,
}

impl Encode for DataInformationBox {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"dinf")?;

        self.reference.encode(output)?;

        update_box_header(output, begin)
    }
}

impl Decode for DataInformationBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        let mut reference = None;

        decode_boxes! {
            input,
            required dref reference,
        }

        Ok(Self { reference })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-12:2015 8.7.2
////////////////////////////////////////////////////////////////////////////////////////////////////

pub const DATA_ENTRY_SELF_CONTAINED: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct DataReferenceBox {
    pub entries: Vec<DataEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataEntry {
    Url(DataEntryUrlBox),
    Urn(DataEntryUrnBox),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataEntryUrlBox {
    pub flags: u32,
    pub location: String,
}

impl Encode for DataEntryUrlBox {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"url ")?;
        output.write_u8(0)?; // version
        output.write_u24::<BigEndian>(self.flags)?;

        if self.flags & DATA_ENTRY_SELF_CONTAINED == 0 {
            self.location.encode(output)?;
        }

        update_box_header(output, begin)
    }
}

impl Decode for DataEntryUrlBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        input.read_u8()?; // version
        let flags = input.read_u24::<BigEndian>()?;

        let location = if flags & DATA_ENTRY_SELF_CONTAINED == 0 {
            Decode::decode(input)?
        } else {
            String::new()
        };
        Ok(Self { flags, location })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataEntryUrnBox {
    pub flags: u32,
    pub name: String,
    pub location: String,
}

impl Encode for DataEntryUrnBox {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"urn ")?;
        output.write_u8(0)?; // version
        output.write_u24::<BigEndian>(self.flags)?;

        self.name.encode(output)?;
        self.location.encode(output)?;

        update_box_header(output, begin)
    }
}

impl Decode for DataEntryUrnBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        input.read_u8()?; // version
        let flags = input.read_u24::<BigEndian>()?;

        Ok(Self {
            flags,
            name: Decode::decode(input)?,
            location: Decode::decode(input)?,
        })
    }
}

impl Encode for DataReferenceBox {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"dref")?;
        output.write_u8(0)?; // version
        output.write_u24::<BigEndian>(0)?; // flags

        (self.entries.len() as u32).encode(output)?;
        for entry in &self.entries {
            match entry {
                DataEntry::Url(entry) => entry.encode(output),
                DataEntry::Urn(entry) => entry.encode(output),
            }?;
        }

        update_box_header(output, begin)
    }
}

impl Decode for DataReferenceBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        input.read_u8()?; // version
        input.read_u24::<BigEndian>()?; // flags

        let entry_count = u32::decode(input)?;
        let mut entries = Vec::default();
        for _ in 0..entry_count {
            let size = u32::decode(input)?;
            let r#type: [u8; 4] = u32::decode(input)?.to_be_bytes();

            if size < 4 + 4 || (size - 4 - 4) as usize > input.len() {
                return Err(Error::BoxOverrun {
                    r#type: u32::from_be_bytes(r#type).into(),
                    size,
                });
            }
            let (mut data, remaining_data) = input.split_at((size - 4 - 4) as usize);
            match &r#type {
                b"url " => entries.push(DataEntry::Url(Decode::decode(&mut data)?)),
                b"urn " => entries.push(DataEntry::Urn(Decode::decode(&mut data)?)),
                _ => {}
            }
            *input = remaining_data;
        }
        Ok(Self { entries })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-12:2015 8.5.1
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug)]
pub struct SampleTableBox {
    pub description: SampleDescriptionBox,
    pub time_to_sample: TimeToSampleBox,
    pub composition_offset: Option<CompositionOffsetBox>,
    pub composition_to_decode: Option<CompositionToDecodeBox>,
    pub sample_to_chunk: SampleToChunkBox,
    pub sample_size: SampleSizeBox,
    pub chunk_offset: ChunkOffsetBox,
    pub sync_sample: Option<SyncSampleBox>,
    pub sample_to_group: Option<SampleToGroupBox>,
    pub group_description: Option<SampleGroupDescriptionBox>,
}

impl Encode for SampleTableBox {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"stbl")?;

        self.description.encode(output)?;
        self.time_to_sample.encode(output)?;
        if let Some(composition_offset) = &self.composition_offset {
            composition_offset.encode(output)?;
        }
        if let Some(composition_to_decode) = &self.composition_to_decode {
            composition_to_decode.encode(output)?;
        }
        self.sample_to_chunk.encode(output)?;
        self.sample_size.encode(output)?;
        self.chunk_offset.encode(output)?;
        if let Some(sync_sample) = &self.sync_sample {
            sync_sample.encode(output)?;
        }
        if let Some(group_description) = &self.group_description {
            group_description.encode(output)?;
        }
        if let Some(sample_to_group) = &self.sample_to_group {
            sample_to_group.encode(output)?;
        }

        update_box_header(output, begin)
    }
}

impl Decode for SampleTableBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        let mut description = None;
        let mut time_to_sample = None;
        let mut composition_offset = None;
        let mut composition_to_decode = None;
        let mut sample_to_chunk = None;
        let mut sample_size = None;
        let mut chunk_offset = None;
        let mut sync_sample = None;
        let mut sample_to_group = None;
        let mut group_description = None;

        decode_boxes! {
            input,
            required stsd description,
            required stts time_to_sample,
            optional ctts composition_offset,
            optional cslg composition_to_decode,
            required stsc sample_to_chunk,
            required stsz sample_size,
            required stco chunk_offset,
            optional stss sync_sample,
            optional sbgp sample_to_group,
            optional sgpd group_description,
        }

        Ok(Self {
            description,
            time_to_sample,
            composition_offset,
            composition_to_decode,
            sample_to_chunk,
            sample_size,
            chunk_offset,
            sync_sample,
            sample_to_group,
            group_description,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-12:2015 8.6.1.2
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub struct TimeToSampleBox {
    pub entries: Vec<TimeToSampleEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeToSampleEntry {
    pub sample_count: u32,
    pub sample_delta: u32,
}

impl Encode for TimeToSampleBox {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"stts")?;
        output.write_u8(0)?; // version
        output.write_u24::<BigEndian>(0)?; // flags

        (self.entries.len() as u32).encode(output)?;
        for entry in &self.entries {
            entry.sample_count.encode(output)?;
            entry.sample_delta.encode(output)?;
        }

        update_box_header(output, begin)
    }
}

impl Decode for TimeToSampleBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        input.read_u8()?; // version
        input.read_u24::<BigEndian>()?; // flags

        let entry_count = u32::decode(input)?;
        let mut entries = Vec::default();
        for _ in 0..entry_count {
            entries.push(TimeToSampleEntry {
                sample_count: Decode::decode(input)?,
                sample_delta: Decode::decode(input)?,
            });
        }
        Ok(Self { entries })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-12:2015 8.6.1.3
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub struct CompositionOffsetBox {
    pub entries: Vec<CompositionOffsetEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompositionOffsetEntry {
    pub sample_count: u32,
    pub sample_offset: i64,
}

impl CompositionOffsetBox {
    fn version(&self) -> u8 {
        if self
            .entries
            .iter()
            .any(|entry| entry.sample_offset < 0 || entry.sample_offset > u32::MAX as i64)
        {
            1
        } else {
            0
        }
    }
}

impl Encode for CompositionOffsetBox {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"ctts")?;
        let version = self.version();
        output.write_u8(version)?;
        output.write_u24::<BigEndian>(0)?; // flags

        (self.entries.len() as u32).encode(output)?;
        for entry in &self.entries {
            entry.sample_count.encode(output)?;
            match version {
                0 => (entry.sample_offset as u32).encode(output)?,
                _ => (entry.sample_offset as i32).encode(output)?,
            }
        }

        update_box_header(output, begin)
    }
}

impl Decode for CompositionOffsetBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        let version = input.read_u8()?;
        input.read_u24::<BigEndian>()?; // flags

        let entry_count = u32::decode(input)?;
        let mut entries = Vec::default();
        for _ in 0..entry_count {
            let sample_count = Decode::decode(input)?;
            let sample_offset = match version {
                0 => u32::decode(input)? as i64,
                1 => i32::decode(input)? as i64,
                _ => {
                    return Err(Error::InvalidBoxVersion {
                        r#type: "ctts",
                        version,
                    })
                }
            };
            entries.push(CompositionOffsetEntry {
                sample_count,
                sample_offset,
            });
        }
        Ok(Self { entries })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-12:2015 8.6.1.4
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub struct CompositionToDecodeBox {
    pub composition_to_dts_shift: i64,
    pub least_decode_to_display_delta: i64,
    pub greatest_decode_to_display_delta: i64,
    pub composition_start_time: i64,
    pub composition_end_time: i64,
}

impl CompositionToDecodeBox {
    fn version(&self) -> u8 {
        let fits = |value: i64| i32::try_from(value).is_ok();
        if fits(self.composition_to_dts_shift)
            && fits(self.least_decode_to_display_delta)
            && fits(self.greatest_decode_to_display_delta)
            && fits(self.composition_start_time)
            && fits(self.composition_end_time)
        {
            0
        } else {
            1
        }
    }
}

impl Encode for CompositionToDecodeBox {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"cslg")?;
        let version = self.version();
        output.write_u8(version)?;
        output.write_u24::<BigEndian>(0)?; // flags

        match version {
            0 => {
                (self.composition_to_dts_shift as i32).encode(output)?;
                (self.least_decode_to_display_delta as i32).encode(output)?;
                (self.greatest_decode_to_display_delta as i32).encode(output)?;
                (self.composition_start_time as i32).encode(output)?;
                (self.composition_end_time as i32).encode(output)?;
            }
            _ => {
                self.composition_to_dts_shift.encode(output)?;
                self.least_decode_to_display_delta.encode(output)?;
                self.greatest_decode_to_display_delta.encode(output)?;
                self.composition_start_time.encode(output)?;
                self.composition_end_time.encode(output)?;
            }
        }

        update_box_header(output, begin)
    }
}

impl Decode for CompositionToDecodeBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        let version = input.read_u8()?;
        input.read_u24::<BigEndian>()?; // flags

        Ok(match version {
            0 => Self {
                composition_to_dts_shift: i32::decode(input)? as i64,
                least_decode_to_display_delta: i32::decode(input)? as i64,
                greatest_decode_to_display_delta: i32::decode(input)? as i64,
                composition_start_time: i32::decode(input)? as i64,
                composition_end_time: i32::decode(input)? as i64,
            },
            1 => Self {
                composition_to_dts_shift: Decode::decode(input)?,
                least_decode_to_display_delta: Decode::decode(input)?,
                greatest_decode_to_display_delta: Decode::decode(input)?,
                composition_start_time: Decode::decode(input)?,
                composition_end_time: Decode::decode(input)?,
            },
            _ => {
                return Err(Error::InvalidBoxVersion {
                    r#type: "cslg",
                    version,
                })
            }
        })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-12:2015 8.5.2
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug)]
pub enum SampleEntry {
    Avc(AvcSampleEntry),
    Hevc(HevcSampleEntry),
}

#[derive(Debug)]
pub struct SampleDescriptionBox {
    pub entry: SampleEntry,
}

impl Encode for SampleDescriptionBox {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"stsd")?;
        output.write_u8(0)?; // version
        output.write_u24::<BigEndian>(0)?; // flags

        1u32.encode(output)?; // entry_count
        match &self.entry {
            SampleEntry::Avc(entry) => entry.encode(output),
            SampleEntry::Hevc(entry) => entry.encode(output),
        }?;

        update_box_header(output, begin)
    }
}

impl Decode for SampleDescriptionBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        input.read_u8()?; // version
        input.read_u24::<BigEndian>()?; // flags

        let entry_count = u32::decode(input)? as usize;
        if entry_count != 1 {
            return Err(Error::InvalidBoxQuantity {
                r#type: "stsd",
                quantity: entry_count,
                expected: 1,
            });
        }

        let mut avc = None;
        let mut hevc = None;

        decode_boxes! {
            input,
            optional avc1 avc,
            optional hvc1 hevc,
        }

        let entry = match (avc, hevc) {
            (Some(avc), None) => SampleEntry::Avc(avc),
            (None, Some(hevc)) => SampleEntry::Hevc(hevc),
            _ => {
                return Err(Error::InvalidBoxQuantity {
                    r#type: "stsd",
                    quantity: 0,
                    expected: 1,
                })
            }
        };
        Ok(Self { entry })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-12:2015 12.1.3
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub struct VisualSampleEntry {
    pub data_reference_index: u16,
    pub width: u16,
    pub height: u16,
    pub horizresolution: U16F16,
    pub vertresolution: U16F16,
    pub frame_count: u16,
    pub compressorname: [u8; 32],
    pub depth: u16,
}

impl VisualSampleEntry {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            // All samples are carried in the same file, entry 1 of dref
            data_reference_index: 1,
            width,
            height,
            horizresolution: U16F16!(72),
            vertresolution: U16F16!(72),
            frame_count: 1,
            compressorname: [0; 32],
            depth: 0x0018,
        }
    }
}

impl Encode for VisualSampleEntry {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        output.write_u8(0)?; // reserved
        output.write_u8(0)?; // reserved
        output.write_u8(0)?; // reserved
        output.write_u8(0)?; // reserved
        output.write_u8(0)?; // reserved
        output.write_u8(0)?; // reserved
        self.data_reference_index.encode(output)?;

        0u16.encode(output)?; // pre_defined
        0u16.encode(output)?; // reserved
        0u32.encode(output)?; // pre_defined
        0u32.encode(output)?; // pre_defined
        0u32.encode(output)?; // pre_defined
        self.width.encode(output)?;
        self.height.encode(output)?;
        self.horizresolution.encode(output)?;
        self.vertresolution.encode(output)?;
        0u32.encode(output)?; // reserved
        self.frame_count.encode(output)?;
        output.write_all(&self.compressorname)?;
        self.depth.encode(output)?;
        (-1i16 as u16).encode(output)?; // pre_defined

        Ok(())
    }
}

impl Decode for VisualSampleEntry {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        input.read_u8()?; // reserved
        input.read_u8()?; // reserved
        input.read_u8()?; // reserved
        input.read_u8()?; // reserved
        input.read_u8()?; // reserved
        input.read_u8()?; // reserved
        let data_reference_index = Decode::decode(input)?;

        u16::decode(input)?; // pre_defined
        u16::decode(input)?; // reserved
        u32::decode(input)?; // pre_defined
        u32::decode(input)?; // pre_defined
        u32::decode(input)?; // pre_defined
        let width = Decode::decode(input)?;
        let height = Decode::decode(input)?;
        let horizresolution = Decode::decode(input)?;
        let vertresolution = Decode::decode(input)?;
        u32::decode(input)?; // reserved
        let frame_count = Decode::decode(input)?;
        let mut compressorname = [0u8; 32];
        input.read_exact(&mut compressorname)?;
        let depth = Decode::decode(input)?;
        u16::decode(input)?; // pre_defined
        Ok(Self {
            data_reference_index,
            width,
            height,
            horizresolution,
            vertresolution,
            frame_count,
            compressorname,
            depth,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 23008-12:2017 7.2.2
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub struct CodingConstraintsBox {
    pub all_ref_pics_intra: bool,
    pub intra_pred_used: bool,
    pub max_ref_per_pic: u8,
}

impl Encode for CodingConstraintsBox {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"ccst")?;
        output.write_u8(0)?; // version
        output.write_u24::<BigEndian>(0)?; // flags

        let value = (self.all_ref_pics_intra as u32) << 31
            | (self.intra_pred_used as u32) << 30
            | (self.max_ref_per_pic as u32 & 0xF) << 26;
        value.encode(output)?;

        update_box_header(output, begin)
    }
}

impl Decode for CodingConstraintsBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        input.read_u8()?; // version
        input.read_u24::<BigEndian>()?; // flags

        let value = u32::decode(input)?;
        Ok(Self {
            all_ref_pics_intra: value >> 31 & 1 != 0,
            intra_pred_used: value >> 30 & 1 != 0,
            max_ref_per_pic: (value >> 26 & 0xF) as u8,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-12:2015 8.7.3
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub enum SampleSizeBox {
    Value {
        sample_size: u32,
        sample_count: u32,
    },
    PerSample(Vec<u32>),
}

impl Encode for SampleSizeBox {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"stsz")?;
        output.write_u8(0)?; // version
        output.write_u24::<BigEndian>(0)?; // flags

        match self {
            SampleSizeBox::Value {
                sample_size,
                sample_count,
            } => {
                sample_size.encode(output)?;
                sample_count.encode(output)?;
            }
            SampleSizeBox::PerSample(samples) => {
                0u32.encode(output)?; // sample_size
                (samples.len() as u32).encode(output)?;
                for sample in samples {
                    sample.encode(output)?;
                }
            }
        }

        update_box_header(output, begin)
    }
}

impl Decode for SampleSizeBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        input.read_u8()?; // version
        input.read_u24::<BigEndian>()?; // flags

        let sample_size = u32::decode(input)?;
        let sample_count = u32::decode(input)?;
        if sample_size != 0 {
            return Ok(SampleSizeBox::Value {
                sample_size,
                sample_count,
            });
        }

        let mut samples = Vec::default();
        for _ in 0..sample_count {
            samples.push(Decode::decode(input)?)
        }
        Ok(SampleSizeBox::PerSample(samples))
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-12:2015 8.7.4
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub struct SampleToChunkBox {
    pub entries: Vec<SampleToChunkEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleToChunkEntry {
    pub first_chunk: u32,
    pub samples_per_chunk: u32,
    pub sample_description_index: u32,
}

impl Encode for SampleToChunkBox {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"stsc")?;
        output.write_u8(0)?; // version
        output.write_u24::<BigEndian>(0)?; // flags

        (self.entries.len() as u32).encode(output)?;
        for entry in &self.entries {
            entry.first_chunk.encode(output)?;
            entry.samples_per_chunk.encode(output)?;
            entry.sample_description_index.encode(output)?;
        }

        update_box_header(output, begin)
    }
}

impl Decode for SampleToChunkBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        input.read_u8()?; // version
        input.read_u24::<BigEndian>()?; // flags

        let entry_count = u32::decode(input)?;
        let mut entries = Vec::default();
        for _ in 0..entry_count {
            entries.push(SampleToChunkEntry {
                first_chunk: Decode::decode(input)?,
                samples_per_chunk: Decode::decode(input)?,
                sample_description_index: Decode::decode(input)?,
            })
        }
        Ok(Self { entries })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-12:2015 8.7.5
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkOffsetBox {
    pub entries: Vec<u32>,
}

impl Encode for ChunkOffsetBox {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"stco")?;
        output.write_u8(0)?; // version
        output.write_u24::<BigEndian>(0)?; // flags

        (self.entries.len() as u32).encode(output)?;
        for entry in &self.entries {
            entry.encode(output)?;
        }

        update_box_header(output, begin)
    }
}

impl Decode for ChunkOffsetBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        input.read_u8()?; // version
        input.read_u24::<BigEndian>()?; // flags

        let entry_count = u32::decode(input)?;
        let mut entries = Vec::default();
        for _ in 0..entry_count {
            entries.push(Decode::decode(input)?)
        }
        Ok(Self { entries })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-12:2015 8.6.2
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub struct SyncSampleBox {
    pub entries: Vec<u32>,
}

impl Encode for SyncSampleBox {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"stss")?;
        output.write_u8(0)?; // version
        output.write_u24::<BigEndian>(0)?; // flags

        (self.entries.len() as u32).encode(output)?;
        for entry in &self.entries {
            entry.encode(output)?;
        }

        update_box_header(output, begin)
    }
}

impl Decode for SyncSampleBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        input.read_u8()?; // version
        input.read_u24::<BigEndian>()?; // flags

        let entry_count = u32::decode(input)?;
        let mut entries = vec![];
        for _ in 0..entry_count {
            entries.push(Decode::decode(input)?)
        }
        Ok(Self { entries })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-12:2015 8.6.5
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub struct EditBox {
    pub edit_list: Option<EditListBox>,
}

impl Encode for EditBox {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"edts")?;

        if let Some(edit_list) = &self.edit_list {
            edit_list.encode(output)?;
        }

        update_box_header(output, begin)
    }
}

impl Decode for EditBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        let mut edit_list = None;

        decode_boxes! {
            input,
            optional elst edit_list,
        }

        Ok(Self { edit_list })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-12:2015 8.6.6
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub struct EditListBox {
    pub entries: Vec<EditListEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditListEntry {
    pub segment_duration: u64,
    pub media_time: i64,
    pub media_rate: U16F16,
}

impl EditListBox {
    fn version(&self) -> u8 {
        if self.entries.iter().any(|entry| {
            entry.segment_duration > u32::MAX as u64
                || entry.media_time > i32::MAX as i64
                || entry.media_time < i32::MIN as i64
        }) {
            1
        } else {
            0
        }
    }
}

impl Encode for EditListBox {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"elst")?;
        let version = self.version();
        output.write_u8(version)?;
        output.write_u24::<BigEndian>(0)?; // flags

        (self.entries.len() as u32).encode(output)?;
        for entry in &self.entries {
            match version {
                0 => {
                    (entry.segment_duration as u32).encode(output)?;
                    (entry.media_time as i32).encode(output)?;
                }
                _ => {
                    entry.segment_duration.encode(output)?;
                    entry.media_time.encode(output)?;
                }
            }
            entry.media_rate.encode(output)?;
        }

        update_box_header(output, begin)
    }
}

impl Decode for EditListBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        let version = input.read_u8()?;
        input.read_u24::<BigEndian>()?; // flags

        let entry_count = u32::decode(input)?;
        let mut entries = vec![];
        for _ in 0..entry_count {
            let segment_duration;
            let media_time;
            match version {
                0 => {
                    segment_duration = u32::decode(input)? as u64;
                    media_time = i32::decode(input)? as i64;
                }
                1 => {
                    segment_duration = Decode::decode(input)?;
                    media_time = Decode::decode(input)?;
                }
                _ => {
                    return Err(Error::InvalidBoxVersion {
                        r#type: "elst",
                        version,
                    })
                }
            }
            entries.push(EditListEntry {
                segment_duration,
                media_time,
                media_rate: Decode::decode(input)?,
            })
        }
        Ok(Self { entries })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-12:2015 8.9.2
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub struct SampleToGroupBox {
    pub grouping_type: FourCC,
    pub entries: Vec<SampleToGroupEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleToGroupEntry {
    pub sample_count: u32,
    pub group_description_index: u32,
}

impl Encode for SampleToGroupBox {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"sbgp")?;
        output.write_u8(0)?; // version
        output.write_u24::<BigEndian>(0)?; // flags

        self.grouping_type.0.encode(output)?;
        (self.entries.len() as u32).encode(output)?;
        for entry in &self.entries {
            entry.sample_count.encode(output)?;
            entry.group_description_index.encode(output)?;
        }

        update_box_header(output, begin)
    }
}

impl Decode for SampleToGroupBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        input.read_u8()?; // version
        input.read_u24::<BigEndian>()?; // flags

        let grouping_type = FourCC(Decode::decode(input)?);
        let entry_count = u32::decode(input)?;
        let mut entries = vec![];
        for _ in 0..entry_count {
            entries.push(SampleToGroupEntry {
                sample_count: Decode::decode(input)?,
                group_description_index: Decode::decode(input)?,
            })
        }
        Ok(Self {
            grouping_type,
            entries,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-12:2015 8.9.3, ISO/IEC 23008-12:2017 7.5
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub struct SampleGroupDescriptionBox {
    pub grouping_type: FourCC,
    pub entries: Vec<DirectReferenceSamplesEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirectReferenceSamplesEntry {
    pub sample_id: u32,
    pub direct_reference_sample_ids: Vec<u32>,
}

impl Encode for SampleGroupDescriptionBox {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"sgpd")?;
        output.write_u8(1)?; // version
        output.write_u24::<BigEndian>(0)?; // flags

        self.grouping_type.0.encode(output)?;
        0u32.encode(output)?; // default_length
        (self.entries.len() as u32).encode(output)?;
        for entry in &self.entries {
            let description_length =
                4 + 1 + 4 * entry.direct_reference_sample_ids.len() as u32;
            description_length.encode(output)?;
            entry.sample_id.encode(output)?;
            output.write_u8(entry.direct_reference_sample_ids.len() as u8)?;
            for id in &entry.direct_reference_sample_ids {
                id.encode(output)?;
            }
        }

        update_box_header(output, begin)
    }
}

impl Decode for SampleGroupDescriptionBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        let version = input.read_u8()?;
        input.read_u24::<BigEndian>()?; // flags

        let grouping_type = FourCC(Decode::decode(input)?);
        let default_length = if version == 1 { u32::decode(input)? } else { 0 };
        let entry_count = u32::decode(input)?;
        let mut entries = vec![];
        for _ in 0..entry_count {
            if version == 1 && default_length == 0 {
                u32::decode(input)?; // description_length
            }
            let sample_id = Decode::decode(input)?;
            let count = input.read_u8()?;
            let mut direct_reference_sample_ids = vec![];
            for _ in 0..count {
                direct_reference_sample_ids.push(Decode::decode(input)?);
            }
            entries.push(DirectReferenceSamplesEntry {
                sample_id,
                direct_reference_sample_ids,
            });
        }
        Ok(Self {
            grouping_type,
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use fixed_macro::types::U16F16;

    use super::*;

    // Top-level boxes carry their own headers, children of decode_boxes do
    // not. This strips one header before decoding.
    fn round_trip_boxed<T: Encode + Decode>(value: &T) -> T {
        let mut output = Cursor::new(Vec::new());
        value.encode(&mut output).unwrap();
        let data = output.into_inner();
        assert_eq!(
            u32::from_be_bytes(data[..4].try_into().unwrap()) as usize,
            data.len()
        );
        let mut input = &data[8..];
        let decoded = T::decode(&mut input).unwrap();
        assert!(input.is_empty());
        decoded
    }

    #[test]
    fn file_type_round_trips() {
        let file_type = FileTypeBox {
            major_brand: "isom".parse().unwrap(),
            minor_version: 512,
            compatible_brands: vec!["isom".parse().unwrap(), "hvc1".parse().unwrap()],
        };
        assert_eq!(round_trip_boxed(&file_type), file_type);
    }

    #[test]
    fn movie_header_picks_version_by_range() {
        let mut header = MovieHeaderBox {
            creation_time: 3_600_000_000,
            modification_time: 3_600_000_000,
            timescale: 1000,
            duration: 42,
            rate: U16F16!(1),
            volume: Default::default(),
            matrix: Matrix::identity(),
            next_track_id: 2,
        };
        assert_eq!(header.version(), 0);
        assert_eq!(round_trip_boxed(&header), header);

        header.duration = u32::MAX as u64 + 1;
        assert_eq!(header.version(), 1);
        assert_eq!(round_trip_boxed(&header), header);
    }

    #[test]
    fn track_header_keeps_flag_bits() {
        let header = TrackHeaderBox {
            flags: TRACK_ENABLED | TRACK_IN_MOVIE,
            creation_time: 0,
            modification_time: 0,
            track_id: 1,
            duration: 1000,
            layer: 0,
            alternate_group: 0,
            volume: Default::default(),
            matrix: Matrix::identity(),
            width: U16F16!(320),
            height: U16F16!(240),
        };
        assert_eq!(round_trip_boxed(&header), header);
    }

    #[test]
    fn edit_list_negative_media_time_round_trips_in_version_0() {
        let edit_list = EditListBox {
            entries: vec![EditListEntry {
                segment_duration: 1000,
                media_time: -1,
                media_rate: U16F16!(1),
            }],
        };
        assert_eq!(edit_list.version(), 0);
        assert_eq!(round_trip_boxed(&edit_list), edit_list);
    }

    #[test]
    fn edit_list_wide_duration_promotes_to_version_1() {
        let edit_list = EditListBox {
            entries: vec![EditListEntry {
                segment_duration: u32::MAX as u64 + 1,
                media_time: 0,
                media_rate: U16F16!(1),
            }],
        };
        assert_eq!(edit_list.version(), 1);
        assert_eq!(round_trip_boxed(&edit_list), edit_list);
    }

    #[test]
    fn composition_offsets_promote_to_signed_when_negative() {
        let unsigned = CompositionOffsetBox {
            entries: vec![CompositionOffsetEntry {
                sample_count: 3,
                sample_offset: 100,
            }],
        };
        assert_eq!(unsigned.version(), 0);
        assert_eq!(round_trip_boxed(&unsigned), unsigned);

        let signed = CompositionOffsetBox {
            entries: vec![
                CompositionOffsetEntry {
                    sample_count: 1,
                    sample_offset: -200,
                },
                CompositionOffsetEntry {
                    sample_count: 2,
                    sample_offset: 100,
                },
            ],
        };
        assert_eq!(signed.version(), 1);
        assert_eq!(round_trip_boxed(&signed), signed);
    }

    #[test]
    fn composition_to_decode_round_trips() {
        let cslg = CompositionToDecodeBox {
            composition_to_dts_shift: 200,
            least_decode_to_display_delta: -200,
            greatest_decode_to_display_delta: 100,
            composition_start_time: 0,
            composition_end_time: 1000,
        };
        assert_eq!(round_trip_boxed(&cslg), cslg);
    }

    #[test]
    fn sample_size_encodes_both_forms() {
        let constant = SampleSizeBox::Value {
            sample_size: 100,
            sample_count: 7,
        };
        assert_eq!(round_trip_boxed(&constant), constant);

        let per_sample = SampleSizeBox::PerSample(vec![100, 200, 300]);
        assert_eq!(round_trip_boxed(&per_sample), per_sample);
    }

    #[test]
    fn self_contained_url_entry_has_no_location() {
        let entry = DataEntryUrlBox {
            flags: DATA_ENTRY_SELF_CONTAINED,
            location: String::new(),
        };
        let mut output = Cursor::new(Vec::new());
        entry.encode(&mut output).unwrap();
        // size + type + version/flags, nothing else
        assert_eq!(output.into_inner().len(), 12);

        let reference = DataReferenceBox {
            entries: vec![DataEntry::Url(entry)],
        };
        assert_eq!(round_trip_boxed(&reference), reference);
    }

    #[test]
    fn direct_reference_samples_round_trip() {
        let group_description = SampleGroupDescriptionBox {
            grouping_type: "refs".parse().unwrap(),
            entries: vec![
                DirectReferenceSamplesEntry {
                    sample_id: 1,
                    direct_reference_sample_ids: vec![],
                },
                DirectReferenceSamplesEntry {
                    sample_id: 2,
                    direct_reference_sample_ids: vec![1, 3],
                },
            ],
        };
        assert_eq!(round_trip_boxed(&group_description), group_description);
    }

    #[test]
    fn child_box_overrunning_parent_is_rejected() {
        let mut data = Vec::new();
        data.extend_from_slice(&100u32.to_be_bytes()); // size past the end
        data.extend_from_slice(b"elst");
        let mut input = data.as_slice();
        match EditBox::decode(&mut input) {
            Err(Error::BoxOverrun { size, .. }) => assert_eq!(size, 100),
            other => panic!("expected overrun, got {other:?}"),
        }
    }
}
