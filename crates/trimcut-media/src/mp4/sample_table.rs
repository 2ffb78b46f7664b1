//! MP4 sample table resolution.
//!
//! The stbl child atoms describe where each sample lives and when it
//! plays:
//! - stts: sample durations (decoding time)
//! - stss: sync sample table (keyframes); absent means all samples sync
//! - stsc: sample-to-chunk mapping
//! - stsz: sample sizes
//! - stco/co64: chunk offsets
//! - ctts: composition time offsets (for B-frames)
//!
//! The builder flattens those run-length tables into one resolved entry
//! per sample so the demuxer can seek and read without re-deriving them.

/// A fully resolved sample.
#[derive(Debug, Clone, Copy)]
pub struct SampleEntry {
    /// Sample index (0-based).
    pub index: u32,
    /// File offset where sample data starts.
    pub offset: u64,
    /// Sample size in bytes.
    pub size: u32,
    /// Decode timestamp in media timescale.
    pub dts: u64,
    /// Composition time offset (for PTS calculation).
    pub cts_offset: i32,
    /// Whether this sample is a keyframe (sync sample).
    pub is_keyframe: bool,
}

impl SampleEntry {
    /// Get the presentation timestamp in media timescale.
    pub fn pts(&self) -> u64 {
        (self.dts as i64 + self.cts_offset as i64).max(0) as u64
    }
}

/// Resolved sample table for one track.
#[derive(Debug, Clone, Default)]
pub struct SampleTable {
    /// Sample count.
    pub sample_count: u32,
    /// All resolved samples, in decode order.
    pub samples: Vec<SampleEntry>,
}

impl SampleTable {
    /// Create a new sample table builder.
    pub fn builder() -> SampleTableBuilder {
        SampleTableBuilder::default()
    }

    /// Get sample by index.
    pub fn get(&self, index: u32) -> Option<&SampleEntry> {
        self.samples.get(index as usize)
    }

    /// Iterate over all samples.
    pub fn iter(&self) -> impl Iterator<Item = &SampleEntry> {
        self.samples.iter()
    }

    /// Index of the last sample whose decode time is at or before `dts`.
    ///
    /// Returns `None` for an empty table; a target before the first
    /// sample resolves to index 0.
    pub fn find_sample_at_or_before(&self, dts: u64) -> Option<u32> {
        if self.samples.is_empty() {
            return None;
        }
        let at = self.samples.partition_point(|s| s.dts <= dts);
        Some(at.saturating_sub(1) as u32)
    }

    /// Index of the sync sample at or before the given sample index.
    pub fn find_keyframe_at_or_before(&self, index: u32) -> Option<u32> {
        let last = self.sample_count.checked_sub(1)?;
        let upto = index.min(last) as usize;
        self.samples[..=upto]
            .iter()
            .rposition(|s| s.is_keyframe)
            .map(|i| i as u32)
    }
}

/// Builder that resolves raw stbl atom data into a `SampleTable`.
#[derive(Default)]
pub struct SampleTableBuilder {
    /// stts runs: (sample count, duration per sample).
    stts_entries: Vec<(u32, u32)>,
    /// stss sync sample numbers (1-based).
    sync_samples: Vec<u32>,
    /// stsc runs: (first chunk, samples per chunk, sample description index).
    stsc_entries: Vec<(u32, u32, u32)>,
    /// stsz uniform size; zero means per-sample sizes apply.
    uniform_size: u32,
    sample_sizes: Vec<u32>,
    /// stco/co64 chunk offsets.
    chunk_offsets: Vec<u64>,
    /// ctts runs: (sample count, composition offset).
    ctts_entries: Vec<(u32, i32)>,
}

impl SampleTableBuilder {
    /// Set stts (decoding time to sample) entries.
    pub fn set_stts(&mut self, entries: Vec<(u32, u32)>) {
        self.stts_entries = entries;
    }

    /// Set stss (sync sample) entries.
    pub fn set_sync_samples(&mut self, samples: Vec<u32>) {
        self.sync_samples = samples;
    }

    /// Set stsc (sample to chunk) entries.
    pub fn set_stsc(&mut self, entries: Vec<(u32, u32, u32)>) {
        self.stsc_entries = entries;
    }

    /// Set stsz (sample size) data.
    pub fn set_stsz(&mut self, uniform_size: u32, sizes: Vec<u32>) {
        self.uniform_size = uniform_size;
        self.sample_sizes = sizes;
    }

    /// Set chunk offsets (from stco or co64).
    pub fn set_chunk_offsets(&mut self, offsets: Vec<u64>) {
        self.chunk_offsets = offsets;
    }

    /// Set ctts (composition time to sample) entries.
    pub fn set_ctts(&mut self, entries: Vec<(u32, i32)>) {
        self.ctts_entries = entries;
    }

    fn sample_size(&self, index: usize) -> u32 {
        if self.uniform_size > 0 {
            self.uniform_size
        } else {
            self.sample_sizes.get(index).copied().unwrap_or(0)
        }
    }

    /// Resolve all tables into per-sample entries.
    pub fn build(self) -> SampleTable {
        let stts_total: usize = self.stts_entries.iter().map(|(n, _)| *n as usize).sum();
        let sample_count = if self.uniform_size > 0 {
            self.sample_sizes.len().max(stts_total) as u32
        } else {
            self.sample_sizes.len() as u32
        };
        if sample_count == 0 {
            return SampleTable::default();
        }
        let n = sample_count as usize;

        // Flatten stts into per-sample DTS values; pad short tables by
        // repeating the last duration.
        let mut dts_values = Vec::with_capacity(n);
        let mut dts = 0u64;
        let mut last_delta = 1u32;
        for &(count, delta) in &self.stts_entries {
            for _ in 0..count {
                if dts_values.len() == n {
                    break;
                }
                dts_values.push(dts);
                dts += delta as u64;
                last_delta = delta;
            }
        }
        while dts_values.len() < n {
            dts_values.push(dts);
            dts += last_delta as u64;
        }

        // Flatten ctts, zero-padded.
        let mut cts_offsets = Vec::with_capacity(n);
        for &(count, offset) in &self.ctts_entries {
            for _ in 0..count {
                if cts_offsets.len() == n {
                    break;
                }
                cts_offsets.push(offset);
            }
        }
        cts_offsets.resize(n, 0);

        // Walk chunks in order, assigning file offsets within each chunk
        // by accumulating sample sizes from the chunk base.
        let offsets = self.resolve_offsets(n);

        let sync_set: std::collections::HashSet<u32> =
            self.sync_samples.iter().copied().collect();
        let all_sync = self.sync_samples.is_empty();

        let samples = (0..n)
            .map(|i| SampleEntry {
                index: i as u32,
                offset: offsets[i],
                size: self.sample_size(i),
                dts: dts_values[i],
                cts_offset: cts_offsets[i],
                // stss numbering is 1-based; no stss means every sample
                // is a sync sample.
                is_keyframe: all_sync || sync_set.contains(&(i as u32 + 1)),
            })
            .collect();

        SampleTable {
            sample_count,
            samples,
        }
    }

    fn resolve_offsets(&self, n: usize) -> Vec<u64> {
        let mut offsets = vec![0u64; n];
        if self.chunk_offsets.is_empty() {
            return offsets;
        }

        let num_chunks = self.chunk_offsets.len() as u32;
        let mut sample = 0usize;

        for (i, &(first_chunk, per_chunk, _)) in self.stsc_entries.iter().enumerate() {
            let run_end = self
                .stsc_entries
                .get(i + 1)
                .map(|e| e.0)
                .unwrap_or(num_chunks + 1)
                .min(num_chunks + 1);

            for chunk in first_chunk..run_end {
                let Some(&base) = self.chunk_offsets.get(chunk as usize - 1) else {
                    break;
                };
                let mut within = 0u64;
                for _ in 0..per_chunk {
                    if sample >= n {
                        return offsets;
                    }
                    offsets[sample] = base + within;
                    within += self.sample_size(sample) as u64;
                    sample += 1;
                }
            }
        }

        // Tables that under-count leave trailing samples at the end of
        // the last chunk.
        if sample < n {
            let mut prev = offsets.get(sample.wrapping_sub(1)).copied().unwrap_or(0);
            for i in sample..n {
                offsets[i] = prev;
                prev += self.sample_size(i) as u64;
            }
        }

        offsets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_sample_table() -> SampleTable {
        let mut builder = SampleTable::builder();
        builder.set_stts(vec![(3, 1000)]);
        builder.set_sync_samples(vec![1]);
        builder.set_stsc(vec![(1, 3, 1)]);
        builder.set_stsz(0, vec![100, 200, 150]);
        builder.set_chunk_offsets(vec![1000]);
        builder.build()
    }

    #[test]
    fn test_sample_entry_pts() {
        let mut sample = SampleEntry {
            index: 0,
            offset: 100,
            size: 1000,
            dts: 1000,
            cts_offset: 500,
            is_keyframe: true,
        };
        assert_eq!(sample.pts(), 1500);

        sample.dts = 100;
        sample.cts_offset = -200;
        assert_eq!(sample.pts(), 0); // Clamped to 0
    }

    #[test]
    fn test_builder_resolves_offsets_and_timing() {
        let table = three_sample_table();

        assert_eq!(table.sample_count, 3);

        assert_eq!(table.samples[0].offset, 1000);
        assert_eq!(table.samples[0].size, 100);
        assert_eq!(table.samples[0].dts, 0);
        assert!(table.samples[0].is_keyframe);

        assert_eq!(table.samples[1].offset, 1100); // 1000 + 100
        assert_eq!(table.samples[1].size, 200);
        assert_eq!(table.samples[1].dts, 1000);
        assert!(!table.samples[1].is_keyframe);

        assert_eq!(table.samples[2].offset, 1300); // 1000 + 100 + 200
    }

    #[test]
    fn test_multi_chunk_offsets() {
        let mut builder = SampleTable::builder();
        builder.set_stts(vec![(4, 10)]);
        // Two chunks of two samples each.
        builder.set_stsc(vec![(1, 2, 1)]);
        builder.set_stsz(50, vec![]);
        builder.set_chunk_offsets(vec![0, 5000]);
        let table = builder.build();

        assert_eq!(table.sample_count, 4);
        assert_eq!(table.samples[0].offset, 0);
        assert_eq!(table.samples[1].offset, 50);
        assert_eq!(table.samples[2].offset, 5000);
        assert_eq!(table.samples[3].offset, 5050);
    }

    #[test]
    fn test_no_stss_means_all_sync() {
        let mut builder = SampleTable::builder();
        builder.set_stts(vec![(3, 10)]);
        builder.set_stsc(vec![(1, 3, 1)]);
        builder.set_stsz(20, vec![]);
        builder.set_chunk_offsets(vec![0]);
        let table = builder.build();
        assert!(table.iter().all(|s| s.is_keyframe));
    }

    #[test]
    fn test_keyframe_search() {
        let mut builder = SampleTable::builder();
        builder.set_stts(vec![(10, 1000)]);
        builder.set_sync_samples(vec![1, 5, 9]); // Keyframes at 0, 4, 8 (0-indexed)
        builder.set_stsc(vec![(1, 10, 1)]);
        builder.set_stsz(100, vec![]);
        builder.set_chunk_offsets(vec![0]);
        let table = builder.build();

        assert_eq!(table.find_keyframe_at_or_before(0), Some(0));
        assert_eq!(table.find_keyframe_at_or_before(3), Some(0));
        assert_eq!(table.find_keyframe_at_or_before(4), Some(4));
        assert_eq!(table.find_keyframe_at_or_before(7), Some(4));
        assert_eq!(table.find_keyframe_at_or_before(8), Some(8));
        assert_eq!(table.find_keyframe_at_or_before(9), Some(8));
    }

    #[test]
    fn test_sample_search_by_dts() {
        let table = three_sample_table(); // DTS 0, 1000, 2000

        assert_eq!(table.find_sample_at_or_before(0), Some(0));
        assert_eq!(table.find_sample_at_or_before(999), Some(0));
        assert_eq!(table.find_sample_at_or_before(1000), Some(1));
        assert_eq!(table.find_sample_at_or_before(99999), Some(2));
        assert_eq!(SampleTable::default().find_sample_at_or_before(0), None);
    }
}
