//! Chunk cutting for the capture stream
//!
//! Converts drained sample buffers into numbered, timestamped chunks.
//! Sequence numbers are strictly increasing and contiguous for the
//! lifetime of one capture session.

/// One fixed-duration slice of captured audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// Position in the capture stream, starting at 0
    pub seq: u64,
    /// Capture time, milliseconds since the Unix epoch
    pub captured_at_ms: u64,
    /// 16-bit little-endian PCM
    pub pcm: Vec<u8>,
}

/// Cuts drained sample buffers into numbered chunks
#[derive(Debug, Default)]
pub struct Chunker {
    next_seq: u64,
}

impl Chunker {
    /// Create a chunker starting at sequence 0
    #[must_use]
    pub const fn new() -> Self {
        Self { next_seq: 0 }
    }

    /// Cut one chunk from the given samples.
    ///
    /// Consumes the next sequence number even for an empty buffer so the
    /// stream stays contiguous under momentary capture underruns.
    pub fn cut(&mut self, samples: &[f32], captured_at_ms: u64) -> AudioChunk {
        let seq = self.next_seq;
        self.next_seq += 1;

        AudioChunk {
            seq,
            captured_at_ms,
            pcm: samples_to_pcm(samples),
        }
    }

    /// Sequence number the next chunk will carry
    #[must_use]
    pub const fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Restart numbering for a new capture session
    pub const fn reset(&mut self) {
        self.next_seq = 0;
    }
}

/// Convert f32 samples in [-1, 1] to 16-bit little-endian PCM bytes
#[must_use]
pub fn samples_to_pcm(samples: &[f32]) -> Vec<u8> {
    let mut pcm = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        #[allow(clippy::cast_possible_truncation)]
        let value = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
        pcm.extend_from_slice(&value.to_le_bytes());
    }
    pcm
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_strictly_increasing_and_contiguous() {
        let mut chunker = Chunker::new();
        let samples = vec![0.1f32; 160];

        let seqs: Vec<u64> = (0..100).map(|i| chunker.cut(&samples, i).seq).collect();

        for (i, &seq) in seqs.iter().enumerate() {
            assert_eq!(seq, i as u64);
        }
    }

    #[test]
    fn empty_buffer_still_consumes_a_sequence_number() {
        let mut chunker = Chunker::new();
        let a = chunker.cut(&[], 0);
        let b = chunker.cut(&[0.5], 1);
        assert_eq!(a.seq, 0);
        assert!(a.pcm.is_empty());
        assert_eq!(b.seq, 1);
    }

    #[test]
    fn reset_restarts_numbering() {
        let mut chunker = Chunker::new();
        chunker.cut(&[0.0], 0);
        chunker.cut(&[0.0], 1);
        chunker.reset();
        assert_eq!(chunker.cut(&[0.0], 2).seq, 0);
    }

    #[test]
    fn pcm_conversion_clamps_and_scales() {
        let pcm = samples_to_pcm(&[0.0, 1.0, -1.0, 2.0]);
        assert_eq!(pcm.len(), 8);
        assert_eq!(i16::from_le_bytes([pcm[0], pcm[1]]), 0);
        assert_eq!(i16::from_le_bytes([pcm[2], pcm[3]]), 32767);
        assert_eq!(i16::from_le_bytes([pcm[4], pcm[5]]), -32767);
        // Out-of-range input clamps instead of wrapping
        assert_eq!(i16::from_le_bytes([pcm[6], pcm[7]]), 32767);
    }
}
