use std::sync::Arc;

use crate::filter_bank::{FilterBank, ResampleError};

// Rebase thresholds keeping the read position small on endless streams.
// Position and the consumed-frame counter always shift together, so only
// their difference (and the fractional part) is observable by the driver.
const REBASE_LIMIT: f64 = (1u64 << 31) as f64;
const REBASE_STEP: u64 = 1 << 30;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessResult {
    pub input_consumed: usize,
    pub output_generated: usize,
}

/// Streaming polyphase resampler: owns the filter bank, one delay line per
/// channel and a fractional read position in input-sample units.
///
/// Not safe for concurrent use on one instance; independent instances are
/// independent (the bank itself is immutable and shareable).
pub struct Resampler {
    bank: Arc<FilterBank>,
    channels: usize,
    delay: Vec<Vec<f32>>,
    fill: usize,      // write cursor, shared by all delay lines
    position: f64,    // fractional read offset in input-sample units
    consumed: u64,    // input frames written since init (rebased with position)
    interpolate: bool,
}

impl Resampler {
    pub fn new(
        channels: usize,
        num_taps: usize,
        num_filters: usize,
        cutoff: f64,
        flags: u32,
    ) -> Result<Self, ResampleError> {
        let bank = FilterBank::new(num_filters, num_taps, cutoff, flags)?;
        Self::with_bank(Arc::new(bank), channels)
    }

    /// Build a resampler over an existing (shared) bank.
    pub fn with_bank(bank: Arc<FilterBank>, channels: usize) -> Result<Self, ResampleError> {
        if !(1..=32).contains(&channels) {
            return Err(ResampleError::InvalidParameter("channels must be 1 - 32"));
        }
        let taps = bank.num_taps();
        Ok(Self {
            interpolate: bank.subsample_interpolate(),
            channels,
            // T leading zeros stand in for the history before the stream
            delay: vec![vec![0.0; taps * 2]; channels],
            fill: taps,
            position: 0.0,
            consumed: 0,
            bank,
        })
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn bank(&self) -> &Arc<FilterBank> {
        &self.bank
    }

    /// Current read position in input-sample units. An ASRC loop samples
    /// this between process calls.
    #[inline]
    pub fn position(&self) -> f64 {
        self.position
    }

    /// Add `delta` input samples to the read position. Called once after
    /// init with `num_taps / 2 + phase_shift` to compensate the filter
    /// group delay (plus any user phase shift under one sample).
    pub fn advance_position(&mut self, delta: f64) {
        debug_assert!(self.position + delta >= 0.0);
        self.position += delta;
    }

    /// Zero the delay lines and return the position to the origin.
    pub fn reset(&mut self) {
        for line in self.delay.iter_mut() {
            line.fill(0.0);
        }
        self.fill = self.bank.num_taps();
        self.position = 0.0;
        self.consumed = 0;
    }

    /// Run the stream forward: consume interleaved input frames as the read
    /// position crosses them and write interleaved output frames until the
    /// output slice is full or the input is exhausted. `ratio` is the
    /// output/input rate for this call and may change between calls.
    ///
    /// Input is only consumed as far as the position advances; unconsumed
    /// frames must be offered again on the next call.
    pub fn process_interleaved(
        &mut self,
        input: &[f32],
        output: &mut [f32],
        ratio: f64,
    ) -> Result<ProcessResult, ResampleError> {
        if !(ratio > 0.0) || !ratio.is_finite() {
            return Err(ResampleError::InvalidParameter("ratio must be positive and finite"));
        }

        let channels = self.channels;
        let in_frames = input.len() / channels;
        let out_capacity = output.len() / channels;
        let step = 1.0 / ratio;
        let taps = self.bank.num_taps();
        let num_filters = self.bank.num_filters();

        let mut res = ProcessResult::default();

        'drive: while res.output_generated < out_capacity {
            // The filter window ends at input frame floor(position); pull
            // frames until that one is buffered.
            while self.consumed as f64 <= self.position {
                if res.input_consumed >= in_frames {
                    break 'drive;
                }
                let frame = &input[res.input_consumed * channels..];
                self.push_frame(frame);
                res.input_consumed += 1;
            }

            let frac = self.position - self.position.floor();
            let scaled = frac * num_filters as f64;
            let index = scaled as usize;
            let alpha = scaled - index as f64;

            let first = self.bank.row(index);
            let out_frame = &mut output[res.output_generated * channels..];
            for ch in 0..channels {
                let window = &self.delay[ch][self.fill - taps..self.fill];
                let sample = if self.interpolate {
                    let y0 = dot(first, window);
                    let y1 = dot(self.bank.row(index + 1), window);
                    y0 + alpha * (y1 - y0)
                } else {
                    dot(first, window)
                };
                out_frame[ch] = sample as f32;
            }

            self.position += step;
            res.output_generated += 1;
        }

        Ok(res)
    }

    #[inline]
    fn push_frame(&mut self, frame: &[f32]) {
        let taps = self.bank.num_taps();
        let len = self.delay[0].len();
        if self.fill == len {
            for line in self.delay.iter_mut() {
                line.copy_within(len - taps.., 0);
            }
            self.fill = taps;
        }
        for (ch, line) in self.delay.iter_mut().enumerate() {
            line[self.fill] = frame[ch];
        }
        self.fill += 1;
        self.consumed += 1;

        if self.position >= REBASE_LIMIT && self.consumed >= REBASE_STEP {
            self.position -= REBASE_STEP as f64;
            self.consumed -= REBASE_STEP;
        }
    }
}

#[inline]
fn dot(taps: &[f32], window: &[f32]) -> f64 {
    let mut acc = 0.0f64;
    for (&coeff, &sample) in taps.iter().zip(window.iter()) {
        acc += coeff as f64 * sample as f64;
    }
    acc
}
