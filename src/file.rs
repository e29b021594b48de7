use std::{
    io::{Seek, Write},
    path::PathBuf,
};

use fixed::types::U8F8;
use fixed_macro::types::U16F16;

use crate::{
    marshal::{
        iso::{File, FileTypeBox, MediaDataBox, MovieBox, MovieHeaderBox},
        meta::MetaBox,
        Encode, FourCC, Matrix, Result,
    },
    timing::{EditList, INFINITE_DURATION},
    track::TrackWriter,
};

// Movie timescale, milliseconds.
const MOVIE_TIMESCALE: u32 = 1000;

/// Assembles the whole output file from finished track writers: ftyp, an
/// optional meta subtree, one mdat per track and the moov subtree. Owns the
/// global track and item numbering.
pub struct FileWriter {
    major_brand: FourCC,
    compatible_brands: Vec<FourCC>,
    meta: Option<MetaBox>,
    tracks: Vec<TrackWriter>,
    next_track_id: u32,
    next_item_id: u32,
}

impl FileWriter {
    pub fn new(major_brand: FourCC, compatible_brands: Vec<FourCC>) -> Self {
        Self {
            major_brand,
            compatible_brands,
            meta: None,
            tracks: Vec::default(),
            next_track_id: 1,
            next_item_id: 1,
        }
    }

    /// Registers a new track under the next free track id and returns its
    /// writer for the caller to configure and feed.
    pub fn add_track(
        &mut self,
        edit_list: Option<EditList>,
        filename: impl Into<PathBuf>,
        clock_ticks: u32,
    ) -> &mut TrackWriter {
        let track_id = self.next_track_id;
        self.next_track_id += 1;
        self.tracks
            .push(TrackWriter::new(track_id, edit_list, filename, clock_ticks));
        self.tracks.last_mut().unwrap()
    }

    pub fn new_item_id(&mut self) -> u32 {
        let item_id = self.next_item_id;
        self.next_item_id += 1;
        item_id
    }

    pub fn set_meta(&mut self, meta: MetaBox) {
        self.meta = Some(meta);
    }

    /// Finalizes every track and writes the file. All subtrees are built
    /// before a single byte goes out, so a failing track leaves the output
    /// untouched.
    pub fn finish(mut self, output: &mut (impl Write + Seek)) -> Result<()> {
        log::debug!("finalizing {} tracks", self.tracks.len());
        let mut tracks = Vec::with_capacity(self.tracks.len());
        let mut media_data = Vec::with_capacity(self.tracks.len());
        for writer in &mut self.tracks {
            tracks.push(writer.finalize_writing()?);
            media_data.push(MediaDataBox {
                data: writer.take_media_data(),
            });
        }

        let duration = tracks
            .iter()
            .map(|track| {
                let timescale = track.media.header.timescale;
                match track.header.duration {
                    INFINITE_DURATION => INFINITE_DURATION,
                    duration if timescale != 0 => {
                        duration * MOVIE_TIMESCALE as u64 / timescale as u64
                    }
                    duration => duration,
                }
            })
            .max()
            .unwrap_or(0);

        let file = File {
            file_type: FileTypeBox {
                major_brand: self.major_brand,
                minor_version: 0,
                compatible_brands: self.compatible_brands,
            },
            meta: self.meta,
            movie: MovieBox {
                header: MovieHeaderBox {
                    creation_time: 0,
                    modification_time: 0,
                    timescale: MOVIE_TIMESCALE,
                    duration,
                    rate: U16F16!(1),
                    volume: U8F8::from_num(1),
                    matrix: Matrix::identity(),
                    next_track_id: self.next_track_id,
                },
                tracks,
            },
            media_data,
        };
        log::debug!("writing file, movie duration {duration}");
        file.encode(output)
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Cursor, path::Path};

    use crate::{
        bitstream::{AccessUnit, BitstreamParser},
        marshal::{
            avc,
            iso::{HandlerBox, SampleSizeBox},
            meta::{
                ImageSpatialExtentsProperty, ItemPropertiesBox, ItemProperty,
                ItemPropertyContainer, PrimaryItemBox,
            },
            Decode,
        },
    };

    use super::*;

    struct OneShotParser {
        access_units: Vec<AccessUnit>,
        position: usize,
    }

    impl BitstreamParser for OneShotParser {
        fn open_file(&mut self, _path: &Path) -> bool {
            true
        }

        fn parse_next_au(&mut self, access_unit: &mut AccessUnit) -> bool {
            match self.access_units.get(self.position) {
                Some(next) => {
                    *access_unit = next.clone();
                    self.position += 1;
                    true
                }
                None => false,
            }
        }

        fn end_of_stream(&self) -> bool {
            self.position >= self.access_units.len()
        }
    }

    fn avc_stream() -> OneShotParser {
        let sps = avc::tests::synthetic_sps();
        let pps = avc::tests::synthetic_pps();
        let mut nal_units = vec![vec![0, 0, 0, 1], vec![0, 0, 0, 1]];
        nal_units[0].extend_from_slice(&sps);
        nal_units[1].extend_from_slice(&pps);
        nal_units.push(vec![0, 0, 0, 1, 0x65, 0x88, 0x84]);
        OneShotParser {
            access_units: vec![AccessUnit {
                nal_units,
                sps_nal_units: vec![sps],
                pps_nal_units: vec![pps],
                is_intra: true,
                is_idr: true,
                ..Default::default()
            }],
            position: 0,
        }
    }

    #[test]
    fn two_tracks_and_meta_survive_a_round_trip() {
        let mut writer = FileWriter::new(
            "msf1".parse().unwrap(),
            vec!["msf1".parse().unwrap(), "iso8".parse().unwrap()],
        );

        let avc1: FourCC = "avc1".parse().unwrap();
        for _ in 0..2 {
            let track = writer.add_track(None, "input.264", 90000);
            track.set_display_rate(30);
            let mut parser = avc_stream();
            track.write_track(&mut parser, avc1).unwrap();
        }

        let item_id = writer.new_item_id();
        assert_eq!(item_id, 1);
        assert_eq!(writer.new_item_id(), 2);
        let mut container = ItemPropertyContainer::default();
        container.add(ItemProperty::ImageSpatialExtents(
            ImageSpatialExtentsProperty {
                width: 320,
                height: 240,
            },
        ));
        writer.set_meta(MetaBox {
            handler: HandlerBox {
                r#type: "pict".parse().unwrap(),
                name: String::new(),
            },
            primary_item: Some(PrimaryItemBox { item_id }),
            item_properties: Some(ItemPropertiesBox { container }),
        });

        let mut output = Cursor::new(Vec::new());
        writer.finish(&mut output).unwrap();
        let data = output.into_inner();

        let mut input = data.as_slice();
        let file = File::decode(&mut input).unwrap();
        assert!(input.is_empty());

        assert_eq!(file.file_type.major_brand, "msf1".parse().unwrap());
        assert_eq!(file.movie.header.timescale, 1000);
        // One sample at 30 fps, rescaled from 90000 to 1000 ticks.
        assert_eq!(file.movie.header.duration, 33);
        assert_eq!(file.movie.header.next_track_id, 3);
        assert_eq!(file.movie.tracks.len(), 2);
        assert_eq!(file.movie.tracks[0].header.track_id, 1);
        assert_eq!(file.movie.tracks[1].header.track_id, 2);
        assert_eq!(file.media_data.len(), 2);

        let meta = file.meta.unwrap();
        assert_eq!(meta.primary_item.unwrap().item_id, 1);
        assert_eq!(meta.item_properties.unwrap().container.len(), 1);

        // The sample sizes match the mdat payloads.
        for (track, media_data) in file.movie.tracks.iter().zip(&file.media_data) {
            match &track.media.information.sample_table.sample_size {
                SampleSizeBox::PerSample(sizes) => {
                    assert_eq!(sizes.iter().sum::<u32>() as usize, media_data.data.len())
                }
                other => panic!("expected per-sample sizes, got {other:?}"),
            }
        }
    }

    #[test]
    fn unwritten_track_aborts_the_file() {
        let mut writer = FileWriter::new("msf1".parse().unwrap(), vec![]);
        writer.add_track(None, "input.264", 90000);

        let mut output = Cursor::new(Vec::new());
        assert!(writer.finish(&mut output).is_err());
        assert!(output.into_inner().is_empty());
    }
}
