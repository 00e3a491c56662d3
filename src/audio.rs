use std::path::Path;

use anyhow::Context as _;

/// Mono 16-bit PCM held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    sample_rate: u32,
    samples: Vec<i16>,
}

impl AudioClip {
    pub fn new(sample_rate: u32, samples: Vec<i16>) -> Self {
        Self {
            sample_rate,
            samples,
        }
    }

    pub fn silence(sample_rate: u32, millis: u64) -> Self {
        let len = (u64::from(sample_rate) * millis / 1000) as usize;
        Self::new(sample_rate, vec![0; len])
    }

    /// Decodes little-endian 16-bit PCM as streamed by the provider.
    pub fn from_pcm_le(sample_rate: u32, bytes: &[u8]) -> anyhow::Result<Self> {
        if bytes.len() % 2 != 0 {
            anyhow::bail!("pcm payload has odd length: {}", bytes.len());
        }
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(Self::new(sample_rate, samples))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }

    pub fn append(&mut self, other: &AudioClip) -> anyhow::Result<()> {
        if other.sample_rate != self.sample_rate {
            anyhow::bail!(
                "sample rate mismatch: {} != {}",
                other.sample_rate,
                self.sample_rate
            );
        }
        self.samples.extend_from_slice(&other.samples);
        Ok(())
    }

    pub fn append_silence(&mut self, millis: u64) {
        let len = (u64::from(self.sample_rate) * millis / 1000) as usize;
        self.samples.resize(self.samples.len() + len, 0);
    }

    pub fn write_wav(&self, path: &Path) -> anyhow::Result<()> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec)
            .with_context(|| format!("create wav: {}", path.display()))?;
        for &sample in &self.samples {
            writer.write_sample(sample).context("write wav sample")?;
        }
        writer
            .finalize()
            .with_context(|| format!("finalize wav: {}", path.display()))?;
        Ok(())
    }

    pub fn read_wav(path: &Path) -> anyhow::Result<Self> {
        let mut reader = hound::WavReader::open(path)
            .with_context(|| format!("open wav: {}", path.display()))?;
        let spec = reader.spec();
        if spec.channels != 1 || spec.bits_per_sample != 16 {
            anyhow::bail!(
                "unsupported wav layout in {}: {} channels, {} bits",
                path.display(),
                spec.channels,
                spec.bits_per_sample
            );
        }
        let samples = reader
            .samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("read wav samples: {}", path.display()))?;
        Ok(Self::new(spec.sample_rate, samples))
    }
}
