use crate::marshal::{
    iso::{
        ChunkOffsetBox, DirectReferenceSamplesEntry, SampleGroupDescriptionBox, SampleSizeBox,
        SampleToChunkBox, SampleToChunkEntry, SampleToGroupBox, SampleToGroupEntry, SyncSampleBox,
    },
    FourCC,
};

const GROUPING_TYPE_REFS: FourCC = FourCC(u32::from_be_bytes(*b"refs"));

/// Derives the sample-table boxes of one track from its per-sample arrays.
/// All samples of a track are written into a single chunk that starts right
/// after the mdat header.
pub struct SampleTableBuilder<'a> {
    sample_sizes: &'a [u32],
    sync_flags: &'a [bool],
    refs_list: &'a [Vec<u32>],
    has_pred: bool,
}

impl<'a> SampleTableBuilder<'a> {
    pub fn new(
        sample_sizes: &'a [u32],
        sync_flags: &'a [bool],
        refs_list: &'a [Vec<u32>],
        has_pred: bool,
    ) -> Self {
        Self {
            sample_sizes,
            sync_flags,
            refs_list,
            has_pred,
        }
    }

    pub fn sample_sizes(&self) -> SampleSizeBox {
        SampleSizeBox::PerSample(self.sample_sizes.to_vec())
    }

    pub fn sample_to_chunk(&self) -> SampleToChunkBox {
        SampleToChunkBox {
            entries: if self.sample_sizes.is_empty() {
                vec![]
            } else {
                vec![SampleToChunkEntry {
                    first_chunk: 1,
                    samples_per_chunk: self.sample_sizes.len() as u32,
                    sample_description_index: 1,
                }]
            },
        }
    }

    pub fn chunk_offsets(&self) -> ChunkOffsetBox {
        ChunkOffsetBox {
            entries: if self.sample_sizes.is_empty() {
                vec![]
            } else {
                // mdat header size, the single chunk follows it directly
                vec![8]
            },
        }
    }

    /// 1-based indices of the sync samples, present only when the track has
    /// at least one.
    pub fn sync_samples(&self) -> Option<SyncSampleBox> {
        let entries: Vec<u32> = self
            .sync_flags
            .iter()
            .enumerate()
            .filter(|(_, &flag)| flag)
            .map(|(index, _)| index as u32 + 1)
            .collect();
        if entries.is_empty() {
            None
        } else {
            Some(SyncSampleBox { entries })
        }
    }

    /// The reference-picture sample group (grouping type `refs`), built only
    /// when the track holds predicted samples. Identical reference-index
    /// lists share one description entry whose sample_id is the 1-based
    /// decode index of the first sample showing the pattern.
    pub fn reference_groups(&self) -> Option<(SampleGroupDescriptionBox, SampleToGroupBox)> {
        if !self.has_pred || self.refs_list.is_empty() {
            return None;
        }

        let mut descriptions: Vec<DirectReferenceSamplesEntry> = Vec::new();
        let mut indices = Vec::with_capacity(self.refs_list.len());
        for (sample, refs) in self.refs_list.iter().enumerate() {
            let position = descriptions
                .iter()
                .position(|entry| entry.direct_reference_sample_ids == *refs)
                .unwrap_or_else(|| {
                    descriptions.push(DirectReferenceSamplesEntry {
                        sample_id: sample as u32 + 1,
                        direct_reference_sample_ids: refs.clone(),
                    });
                    descriptions.len() - 1
                });
            indices.push(position as u32 + 1);
        }

        let mut entries: Vec<SampleToGroupEntry> = Vec::new();
        for &index in &indices {
            match entries.last_mut() {
                Some(entry) if entry.group_description_index == index => entry.sample_count += 1,
                _ => entries.push(SampleToGroupEntry {
                    sample_count: 1,
                    group_description_index: index,
                }),
            }
        }

        Some((
            SampleGroupDescriptionBox {
                grouping_type: GROUPING_TYPE_REFS,
                entries: descriptions,
            },
            SampleToGroupBox {
                grouping_type: GROUPING_TYPE_REFS,
                entries,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_chunk_covers_all_samples() {
        let sizes = [100, 200, 150];
        let builder = SampleTableBuilder::new(&sizes, &[], &[], false);

        assert_eq!(
            builder.sample_sizes(),
            SampleSizeBox::PerSample(vec![100, 200, 150])
        );
        assert_eq!(
            builder.sample_to_chunk().entries,
            vec![SampleToChunkEntry {
                first_chunk: 1,
                samples_per_chunk: 3,
                sample_description_index: 1,
            }]
        );
        assert_eq!(builder.chunk_offsets().entries, vec![8]);
    }

    #[test]
    fn all_intra_track_lists_every_sample_as_sync() {
        let sizes = [10, 10, 10];
        let flags = [true, true, true];
        let refs: [Vec<u32>; 3] = [vec![], vec![], vec![]];
        let builder = SampleTableBuilder::new(&sizes, &flags, &refs, false);

        assert_eq!(builder.sync_samples().unwrap().entries, vec![1, 2, 3]);
        assert!(builder.reference_groups().is_none());
    }

    #[test]
    fn sync_box_absent_without_sync_samples() {
        let flags = [false, false];
        let builder = SampleTableBuilder::new(&[10, 10], &flags, &[], false);
        assert!(builder.sync_samples().is_none());
    }

    #[test]
    fn identical_reference_lists_share_a_description() {
        let sizes = [10, 10, 10, 10];
        let flags = [true, false, false, false];
        let refs: [Vec<u32>; 4] = [vec![], vec![1, 2], vec![1, 2], vec![1, 3]];
        let builder = SampleTableBuilder::new(&sizes, &flags, &refs, true);

        let (sgpd, sbgp) = builder.reference_groups().unwrap();
        assert_eq!(
            sgpd.entries,
            vec![
                DirectReferenceSamplesEntry {
                    sample_id: 1,
                    direct_reference_sample_ids: vec![],
                },
                DirectReferenceSamplesEntry {
                    sample_id: 2,
                    direct_reference_sample_ids: vec![1, 2],
                },
                DirectReferenceSamplesEntry {
                    sample_id: 4,
                    direct_reference_sample_ids: vec![1, 3],
                },
            ]
        );
        assert_eq!(
            sbgp.entries,
            vec![
                SampleToGroupEntry {
                    sample_count: 1,
                    group_description_index: 1,
                },
                SampleToGroupEntry {
                    sample_count: 2,
                    group_description_index: 2,
                },
                SampleToGroupEntry {
                    sample_count: 1,
                    group_description_index: 3,
                },
            ]
        );
    }

    #[test]
    fn zero_samples_produce_empty_tables() {
        let builder = SampleTableBuilder::new(&[], &[], &[], false);
        assert_eq!(builder.sample_sizes(), SampleSizeBox::PerSample(vec![]));
        assert!(builder.sample_to_chunk().entries.is_empty());
        assert!(builder.chunk_offsets().entries.is_empty());
        assert!(builder.sync_samples().is_none());
        assert!(builder.reference_groups().is_none());
    }
}
