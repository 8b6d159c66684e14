//! Host output formats
//!
//! The mixer always works in interleaved stereo f32. The host hands in a
//! buffer of whatever format its device wants and the samples are converted
//! on the way out.

use ringbuf::HeapCons;
use ringbuf::traits::Consumer;
use serde::{Deserialize, Serialize};

/// Sample format of a host buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    #[default]
    F32,
    I16,
}

impl SampleType {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleType::F32 => 4,
            SampleType::I16 => 2,
        }
    }
}

/// Caller-owned buffer of interleaved stereo samples
#[derive(Debug)]
pub enum OutputBuffer<'a> {
    F32(&'a mut [f32]),
    I16(&'a mut [i16]),
}

impl OutputBuffer<'_> {
    pub fn sample_type(&self) -> SampleType {
        match self {
            OutputBuffer::F32(_) => SampleType::F32,
            OutputBuffer::I16(_) => SampleType::I16,
        }
    }

    /// Length in samples (twice the frame count)
    pub fn len(&self) -> usize {
        match self {
            OutputBuffer::F32(buf) => buf.len(),
            OutputBuffer::I16(buf) => buf.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill from `start` to the end with silence
    pub fn silence_from(&mut self, start: usize) {
        match self {
            OutputBuffer::F32(buf) => {
                let n = buf.len();
                buf[start.min(n)..].fill(0.0);
            }
            OutputBuffer::I16(buf) => {
                let n = buf.len();
                buf[start.min(n)..].fill(0);
            }
        }
    }
}

#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Convert mixed samples into the host buffer
///
/// Writes `min(src.len(), dst.len())` samples and returns that count. The
/// rest of `dst` is left untouched.
pub fn write_interleaved(src: &[f32], dst: &mut OutputBuffer<'_>) -> usize {
    match dst {
        OutputBuffer::F32(buf) => {
            let n = src.len().min(buf.len());
            buf[..n].copy_from_slice(&src[..n]);
            n
        }
        OutputBuffer::I16(buf) => {
            let n = src.len().min(buf.len());
            for (out, &sample) in buf[..n].iter_mut().zip(src) {
                *out = f32_to_i16(sample);
            }
            n
        }
    }
}

/// Drain the mixer ring into a host buffer, padding with silence
///
/// `scratch` is reused across calls for the I16 path so the host callback
/// does not allocate once it has warmed up. Returns the number of samples
/// that came from the ring; the remainder of `dst` is silence.
pub fn drain_ring(
    consumer: &mut HeapCons<f32>,
    dst: &mut OutputBuffer<'_>,
    scratch: &mut Vec<f32>,
) -> usize {
    let popped = match dst {
        OutputBuffer::F32(buf) => consumer.pop_slice(buf),
        OutputBuffer::I16(buf) => {
            if scratch.len() < buf.len() {
                scratch.resize(buf.len(), 0.0);
            }
            let popped = consumer.pop_slice(&mut scratch[..buf.len()]);
            for (out, &sample) in buf[..popped].iter_mut().zip(&scratch[..popped]) {
                *out = f32_to_i16(sample);
            }
            popped
        }
    };
    dst.silence_from(popped);
    popped
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringbuf::HeapRb;
    use ringbuf::traits::{Producer, Split};

    #[test]
    fn test_f32_to_i16() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(1.0), 32767);
        assert_eq!(f32_to_i16(-1.0), -32767);
        assert_eq!(f32_to_i16(4.0), 32767);
        assert_eq!(f32_to_i16(-4.0), -32768);
    }

    #[test]
    fn test_write_interleaved_i16() {
        let mut buf = [7i16; 4];
        let mut dst = OutputBuffer::I16(&mut buf);
        assert_eq!(write_interleaved(&[0.5, -0.5], &mut dst), 2);
        assert_eq!(buf, [16383, -16383, 7, 7]);
    }

    #[test]
    fn test_write_interleaved_truncates() {
        let mut buf = [0.0f32; 2];
        let mut dst = OutputBuffer::F32(&mut buf);
        assert_eq!(write_interleaved(&[0.1, 0.2, 0.3], &mut dst), 2);
        assert_eq!(buf, [0.1, 0.2]);
    }

    #[test]
    fn test_drain_ring_pads_with_silence() {
        let (mut producer, mut consumer) = HeapRb::<f32>::new(8).split();
        producer.push_slice(&[0.25, -0.25]);

        let mut buf = [1i16; 4];
        let mut scratch = Vec::new();
        let popped = drain_ring(&mut consumer, &mut OutputBuffer::I16(&mut buf), &mut scratch);
        assert_eq!(popped, 2);
        assert_eq!(buf, [8191, -8191, 0, 0]);

        let mut buf = [1.0f32; 2];
        assert_eq!(drain_ring(&mut consumer, &mut OutputBuffer::F32(&mut buf), &mut scratch), 0);
        assert_eq!(buf, [0.0, 0.0]);
    }

    #[test]
    fn test_silence_from_clamps_start() {
        let mut buf = [0.5f32; 4];
        let mut dst = OutputBuffer::F32(&mut buf);
        dst.silence_from(2);
        dst.silence_from(10);
        assert_eq!(buf, [0.5, 0.5, 0.0, 0.0]);

        let mut buf = [3i16; 2];
        OutputBuffer::I16(&mut buf).silence_from(1);
        assert_eq!(buf, [3, 0]);
    }

    #[test]
    fn test_sample_type_serde_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            kind: SampleType,
        }
        let parsed: Wrapper = toml::from_str("kind = \"i16\"").unwrap();
        assert_eq!(parsed.kind, SampleType::I16);
        assert_eq!(SampleType::I16.bytes_per_sample(), 2);
    }
}
