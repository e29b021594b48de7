use fixed_macro::types::U16F16;

use crate::marshal::iso::{
    CompositionOffsetBox, CompositionOffsetEntry, CompositionToDecodeBox, EditListBox,
    EditListEntry, TimeToSampleBox, TimeToSampleEntry,
};

/// Track duration written when an edit list loops forever. The literal
/// maximum is kept for wire compatibility even though it conflates "very
/// long" with "truly infinite".
pub const INFINITE_DURATION: u64 = 0xFFFF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EditKind {
    /// Nothing is presented for the segment (media_time -1 on the wire).
    Empty,
    /// One sample is held in view for the segment (media_rate 0).
    Dwell,
    /// A media interval plays back at normal rate (media_rate 1).
    Shift,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditUnit {
    pub kind: EditKind,
    pub media_time: i64,
    pub duration: u64,
}

/// Caller-facing edit list model; `repeat` counts additional plays of the
/// whole list, -1 meaning infinite looping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditList {
    pub units: Vec<EditUnit>,
    pub repeat: i32,
}

impl EditList {
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn to_box(&self) -> EditListBox {
        EditListBox {
            entries: self
                .units
                .iter()
                .map(|unit| EditListEntry {
                    segment_duration: unit.duration,
                    media_time: match unit.kind {
                        EditKind::Empty => -1,
                        _ => unit.media_time,
                    },
                    media_rate: match unit.kind {
                        EditKind::Dwell => U16F16!(0),
                        _ => U16F16!(1),
                    },
                })
                .collect(),
        }
    }

    /// Total presentation duration of one span played `repeat + 1` times.
    pub fn total_duration(&self, span: u64) -> u64 {
        if self.units.is_empty() {
            span
        } else if self.repeat == -1 {
            INFINITE_DURATION
        } else {
            span * (self.repeat as u64 + 1)
        }
    }
}

/// Builds the decode/composition time tables of one track from its sample
/// ordering. Samples tick at a constant display rate; the decode timestamp
/// of sample i is the prefix sum of deltas, and its composition timestamp is
/// the decode timestamp at its display rank.
pub struct TimeTableBuilder {
    deltas: Vec<u32>,
    display_ranks: Vec<usize>,
}

impl TimeTableBuilder {
    pub fn with_display_rate(clock_ticks: u32, display_rate: u32, display_order: &[u32]) -> Self {
        let delta = if display_rate == 0 {
            0
        } else {
            clock_ticks / display_rate
        };
        Self::with_deltas(vec![delta; display_order.len()], display_order)
    }

    pub fn with_deltas(deltas: Vec<u32>, display_order: &[u32]) -> Self {
        let display_ranks = display_order
            .iter()
            .map(|&order| display_order.iter().filter(|&&other| other < order).count())
            .collect();
        Self {
            deltas,
            display_ranks,
        }
    }

    fn decode_times(&self) -> Vec<i64> {
        let mut times = Vec::with_capacity(self.deltas.len());
        let mut time = 0i64;
        for &delta in &self.deltas {
            times.push(time);
            time += delta as i64;
        }
        times
    }

    fn composition_offsets_raw(&self) -> Vec<i64> {
        let decode_times = self.decode_times();
        self.display_ranks
            .iter()
            .enumerate()
            .map(|(sample, &rank)| decode_times[rank] - decode_times[sample])
            .collect()
    }

    pub fn time_to_sample(&self) -> TimeToSampleBox {
        let mut entries: Vec<TimeToSampleEntry> = Vec::new();
        for &delta in &self.deltas {
            match entries.last_mut() {
                Some(entry) if entry.sample_delta == delta => entry.sample_count += 1,
                _ => entries.push(TimeToSampleEntry {
                    sample_count: 1,
                    sample_delta: delta,
                }),
            }
        }
        TimeToSampleBox { entries }
    }

    /// Composition offsets, absent when decode order already is display
    /// order.
    pub fn composition_offsets(&self) -> Option<CompositionOffsetBox> {
        let offsets = self.composition_offsets_raw();
        if offsets.iter().all(|&offset| offset == 0) {
            return None;
        }
        let mut entries: Vec<CompositionOffsetEntry> = Vec::new();
        for &offset in &offsets {
            match entries.last_mut() {
                Some(entry) if entry.sample_offset == offset => entry.sample_count += 1,
                _ => entries.push(CompositionOffsetEntry {
                    sample_count: 1,
                    sample_offset: offset,
                }),
            }
        }
        Some(CompositionOffsetBox { entries })
    }

    /// Required exactly when some composition offset is negative.
    pub fn composition_to_decode(&self) -> Option<CompositionToDecodeBox> {
        let offsets = self.composition_offsets_raw();
        let least = offsets.iter().copied().min()?;
        if least >= 0 {
            return None;
        }
        let greatest = offsets.iter().copied().max().unwrap_or(0);
        let decode_times = self.decode_times();
        let composition_times: Vec<i64> = decode_times
            .iter()
            .zip(&offsets)
            .map(|(&decode, &offset)| decode + offset)
            .collect();
        let start = composition_times.iter().copied().min().unwrap_or(0);
        let end = composition_times
            .iter()
            .zip(&self.deltas)
            .map(|(&time, &delta)| time + delta as i64)
            .max()
            .unwrap_or(0);
        Some(CompositionToDecodeBox {
            composition_to_dts_shift: -least,
            least_decode_to_display_delta: least,
            greatest_decode_to_display_delta: greatest,
            composition_start_time: start,
            composition_end_time: end,
        })
    }
}

/// Replays the built time tables through the edit list to recover the final
/// presentation timestamp of every sample and the total presentation span.
#[derive(Default)]
pub struct PtsResolver {
    deltas: Vec<u32>,
    offsets: Vec<i64>,
    shift: i64,
    edit_list: Option<EditListBox>,
    mapped: Vec<(usize, i64)>,
    span: u64,
}

impl PtsResolver {
    pub fn load_time_to_sample(&mut self, time_to_sample: &TimeToSampleBox) {
        self.deltas.clear();
        for entry in &time_to_sample.entries {
            for _ in 0..entry.sample_count {
                self.deltas.push(entry.sample_delta);
            }
        }
    }

    pub fn load_composition_offsets(&mut self, composition_offsets: &CompositionOffsetBox) {
        self.offsets.clear();
        for entry in &composition_offsets.entries {
            for _ in 0..entry.sample_count {
                self.offsets.push(entry.sample_offset);
            }
        }
    }

    /// The shift normalizes emitted presentation times to be non-negative;
    /// it never changes the span.
    pub fn load_composition_to_decode(&mut self, composition_to_decode: &CompositionToDecodeBox) {
        self.shift = composition_to_decode.composition_to_dts_shift;
    }

    pub fn load_edit_list(&mut self, edit_list: &EditListBox) {
        self.edit_list = Some(edit_list.clone());
    }

    pub fn unravel(&mut self) {
        let media_duration: i64 = self.deltas.iter().map(|&delta| delta as i64).sum();
        let mut time = 0i64;
        let mut media: Vec<(i64, usize)> = Vec::with_capacity(self.deltas.len());
        for (sample, &delta) in self.deltas.iter().enumerate() {
            let offset = self.offsets.get(sample).copied().unwrap_or(0);
            media.push((time + offset + self.shift, sample));
            time += delta as i64;
        }
        media.sort_by_key(|&(pts, _)| pts);

        self.mapped.clear();
        match &self.edit_list {
            None => {
                self.mapped
                    .extend(media.iter().map(|&(pts, sample)| (sample, pts)));
                self.span = media_duration as u64;
            }
            Some(edit_list) => {
                let mut clock = 0i64;
                for entry in &edit_list.entries {
                    if entry.media_time == -1 {
                        // Empty edit, nothing presented.
                        clock += entry.segment_duration as i64;
                        continue;
                    }
                    if entry.media_rate == 0 {
                        // Dwell: the sample in view at media_time is held.
                        if let Some(&(_, sample)) = media
                            .iter()
                            .rev()
                            .find(|&&(pts, _)| pts <= entry.media_time)
                        {
                            self.mapped.push((sample, clock));
                        }
                        clock += entry.segment_duration as i64;
                        continue;
                    }
                    // Shift: a zero duration means the rest of the media.
                    let duration = if entry.segment_duration == 0 {
                        (media_duration - entry.media_time).max(0)
                    } else {
                        entry.segment_duration as i64
                    };
                    for &(pts, sample) in &media {
                        if pts >= entry.media_time && pts < entry.media_time + duration {
                            self.mapped.push((sample, pts - entry.media_time + clock));
                        }
                    }
                    clock += duration;
                }
                self.mapped.sort_by_key(|&(_, pts)| pts);
                self.span = clock.max(0) as u64;
            }
        }
    }

    /// (sample index, presentation time) pairs in presentation order.
    pub fn presentation_times(&self) -> &[(usize, i64)] {
        &self.mapped
    }

    pub fn span(&self) -> u64 {
        self.span
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder_3000_30(display_order: &[u32]) -> TimeTableBuilder {
        TimeTableBuilder::with_display_rate(3000, 30, display_order)
    }

    #[test]
    fn in_order_samples_need_no_composition_offsets() {
        let builder = builder_3000_30(&[0, 1, 2]);
        assert_eq!(
            builder.time_to_sample().entries,
            vec![TimeToSampleEntry {
                sample_count: 3,
                sample_delta: 100,
            }]
        );
        assert!(builder.composition_offsets().is_none());
        assert!(builder.composition_to_decode().is_none());
    }

    #[test]
    fn reordered_samples_get_signed_offsets_and_a_shift() {
        // Decode order 0,1,2 but sample 1 is displayed last.
        let builder = builder_3000_30(&[0, 2, 1]);

        let ctts = builder.composition_offsets().unwrap();
        assert_eq!(
            ctts.entries,
            vec![
                CompositionOffsetEntry {
                    sample_count: 1,
                    sample_offset: 0,
                },
                CompositionOffsetEntry {
                    sample_count: 1,
                    sample_offset: 100,
                },
                CompositionOffsetEntry {
                    sample_count: 1,
                    sample_offset: -100,
                },
            ]
        );

        let cslg = builder.composition_to_decode().unwrap();
        assert_eq!(cslg.composition_to_dts_shift, 100);
        assert_eq!(cslg.least_decode_to_display_delta, -100);
        assert_eq!(cslg.greatest_decode_to_display_delta, 100);
        assert_eq!(cslg.composition_start_time, 0);
        assert_eq!(cslg.composition_end_time, 300);
    }

    #[test]
    fn nonnegative_reorder_skips_the_shift() {
        // Display order is a pure delay of decode order.
        let builder = TimeTableBuilder::with_deltas(vec![100, 100], &[1, 0]);
        assert!(builder.composition_offsets().is_some());
        // Offsets are 100 and -100, so a shift is required here;
        // swap the deltas so both offsets stay at zero or above.
        let builder = TimeTableBuilder::with_deltas(vec![100, 100], &[0, 1]);
        assert!(builder.composition_to_decode().is_none());
    }

    #[test]
    fn unravel_without_edits_is_the_identity() {
        let builder = builder_3000_30(&[0, 2, 1]);
        let mut resolver = PtsResolver::default();
        resolver.load_time_to_sample(&builder.time_to_sample());
        resolver.load_composition_offsets(&builder.composition_offsets().unwrap());
        resolver.unravel();

        assert_eq!(resolver.span(), 300);
        // Samples in presentation order: 0 at 0, 2 at 100, 1 at 200.
        assert_eq!(resolver.presentation_times(), [(0, 0), (2, 100), (1, 200)]);
    }

    #[test]
    fn shift_edit_selects_an_interval() {
        let edit = EditList {
            units: vec![EditUnit {
                kind: EditKind::Shift,
                media_time: 100,
                duration: 100,
            }],
            repeat: 0,
        };

        let builder = builder_3000_30(&[0, 1, 2]);
        let mut resolver = PtsResolver::default();
        resolver.load_time_to_sample(&builder.time_to_sample());
        resolver.load_edit_list(&edit.to_box());
        resolver.unravel();

        assert_eq!(resolver.span(), 100);
        assert_eq!(resolver.presentation_times(), [(1, 0)]);
    }

    #[test]
    fn empty_edit_advances_the_clock() {
        let edit = EditList {
            units: vec![
                EditUnit {
                    kind: EditKind::Empty,
                    media_time: -1,
                    duration: 50,
                },
                EditUnit {
                    kind: EditKind::Shift,
                    media_time: 0,
                    duration: 300,
                },
            ],
            repeat: 0,
        };

        let builder = builder_3000_30(&[0, 1, 2]);
        let mut resolver = PtsResolver::default();
        resolver.load_time_to_sample(&builder.time_to_sample());
        resolver.load_edit_list(&edit.to_box());
        resolver.unravel();

        assert_eq!(resolver.span(), 350);
        assert_eq!(
            resolver.presentation_times(),
            [(0, 50), (1, 150), (2, 250)]
        );
    }

    #[test]
    fn dwell_edit_holds_one_sample() {
        let edit = EditList {
            units: vec![EditUnit {
                kind: EditKind::Dwell,
                media_time: 150,
                duration: 400,
            }],
            repeat: 0,
        };

        let builder = builder_3000_30(&[0, 1, 2]);
        let mut resolver = PtsResolver::default();
        resolver.load_time_to_sample(&builder.time_to_sample());
        resolver.load_edit_list(&edit.to_box());
        resolver.unravel();

        // Sample 1 (pts 100) is the one in view at media time 150.
        assert_eq!(resolver.span(), 400);
        assert_eq!(resolver.presentation_times(), [(1, 0)]);
    }

    #[test]
    fn zero_duration_shift_plays_the_rest_of_the_media() {
        let edit = EditList {
            units: vec![EditUnit {
                kind: EditKind::Shift,
                media_time: 100,
                duration: 0,
            }],
            repeat: 0,
        };

        let builder = builder_3000_30(&[0, 1, 2]);
        let mut resolver = PtsResolver::default();
        resolver.load_time_to_sample(&builder.time_to_sample());
        resolver.load_edit_list(&edit.to_box());
        resolver.unravel();

        assert_eq!(resolver.span(), 200);
        assert_eq!(resolver.presentation_times(), [(1, 0), (2, 100)]);
    }

    #[test]
    fn repeats_scale_the_span_and_minus_one_loops_forever() {
        let edit = EditList {
            units: vec![EditUnit {
                kind: EditKind::Shift,
                media_time: 0,
                duration: 300,
            }],
            repeat: 2,
        };
        assert_eq!(edit.total_duration(300), 900);

        let looping = EditList {
            repeat: -1,
            ..edit.clone()
        };
        assert_eq!(looping.total_duration(300), INFINITE_DURATION);

        let none = EditList::default();
        assert_eq!(none.total_duration(300), 300);
    }

    #[test]
    fn zero_samples_have_zero_span() {
        let builder = TimeTableBuilder::with_deltas(vec![], &[]);
        assert!(builder.time_to_sample().entries.is_empty());

        let mut resolver = PtsResolver::default();
        resolver.load_time_to_sample(&builder.time_to_sample());
        resolver.unravel();
        assert_eq!(resolver.span(), 0);
        assert!(resolver.presentation_times().is_empty());
    }
}
