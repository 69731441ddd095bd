use std::error::Error;
use std::time::Instant;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{info, trace, warn};

use crate::biquad::{Biquad, BiquadCoefficients};
use crate::dither::Dither;
use crate::filter_bank::{BLACKMAN_HARRIS, INCLUDE_LOWPASS, SUBSAMPLE_INTERPOLATE};
use crate::input::InputContext;
use crate::output::OutputContext;
use crate::resampler::Resampler;

/// Frames handed to the kernel per read. Tunable; larger blocks trade a
/// little memory for fewer passes through the conditioning layers.
pub const BUFFER_FRAMES: usize = 4096;

// Fixed dither seed so identical inputs convert to identical outputs.
const DITHER_SEED: u64 = 0x31415926;

#[derive(Debug, Clone)]
pub struct ConversionOptions {
    pub num_taps: usize,
    pub num_filters: usize,
    pub hann_window: bool,
    pub blackman_harris: bool,
    pub interpolate: bool,
    pub pre_post_filter: bool,
    pub gain_db: f64,
    pub phase_shift: f64, // fraction of a sample, |x| < 1
    pub lowpass_freq: Option<f64>,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            num_taps: 256,
            num_filters: 256,
            hann_window: false,
            blackman_harris: false,
            interpolate: true,
            pre_post_filter: false,
            gain_db: 0.0,
            phase_shift: 0.0,
            lowpass_freq: None,
        }
    }
}

/// One WAV-to-WAV conversion: owns both container contexts, the resampler,
/// the optional biquad cascades and the dither state, and drives the block
/// loop from first frame to the group-delay flush.
pub struct ConversionContext {
    in_ctx: InputContext,
    out_ctx: OutputContext,
    dither: Dither,
    resampler: Resampler,
    pre_filter: Option<Vec<[Biquad; 2]>>,
    post_filter: Option<Vec<[Biquad; 2]>>,
    ratio: f64,
    gain: f64,
    samples_to_append: usize,
    inbuffer: Vec<f32>,
    outbuffer: Vec<f32>,
}

impl ConversionContext {
    pub fn new(
        in_ctx: InputContext,
        out_ctx: OutputContext,
        options: &ConversionOptions,
    ) -> Result<Self, Box<dyn Error>> {
        if options.phase_shift.abs() >= 1.0 {
            return Err("phase shift must be less than +/- 1 sample".into());
        }

        let channels = in_ctx.channels;
        let taps = options.num_taps;
        let ratio = out_ctx.rate as f64 / in_ctx.sample_rate as f64;
        let mut lowpass_ratio = 1.0f64;

        if ratio < 1.0 {
            lowpass_ratio -= 10.24 / taps as f64;

            if lowpass_ratio < 0.84 {
                lowpass_ratio = 0.84; // limit the lowpass for very short filters
            }

            if lowpass_ratio < ratio {
                lowpass_ratio = ratio; // avoid discontinuities near unity ratios
            }
        }

        if let Some(freq) = options.lowpass_freq {
            let nyquist = if ratio < 1.0 {
                out_ctx.rate as f64 / 2.0
            } else {
                in_ctx.sample_rate as f64 / 2.0
            };
            let user_lowpass_ratio = freq / nyquist;

            if user_lowpass_ratio >= 1.0 {
                warn!("ignoring invalid lowpass frequency specification (at or over Nyquist)");
            } else {
                lowpass_ratio = user_lowpass_ratio;
            }
        }

        let mut flags = 0u32;
        if options.interpolate {
            flags |= SUBSAMPLE_INTERPOLATE;
        }
        if options.blackman_harris || !options.hann_window {
            flags |= BLACKMAN_HARRIS;
        }

        let mut pre_filter = None;
        let mut post_filter = None;
        let sections = |cutoff: f64| -> Vec<[Biquad; 2]> {
            let coeffs = BiquadCoefficients::lowpass(cutoff);
            (0..channels)
                .map(|_| [Biquad::new(coeffs, 1.0), Biquad::new(coeffs, 1.0)])
                .collect()
        };

        if lowpass_ratio * ratio < 0.98 && options.pre_post_filter {
            let cutoff = lowpass_ratio * ratio / 2.0;
            pre_filter = Some(sections(cutoff));
            info!(
                "cascaded biquad pre-filter at {:.0} Hz",
                in_ctx.sample_rate as f64 * cutoff
            );
        }

        let mut resampler = if ratio < 1.0 {
            let r = Resampler::new(
                channels,
                taps,
                options.num_filters,
                ratio * lowpass_ratio,
                flags | INCLUDE_LOWPASS,
            )?;
            info!(
                "{}-tap sinc downsampler with lowpass at {:.0} Hz",
                taps,
                ratio * lowpass_ratio * in_ctx.sample_rate as f64 / 2.0
            );
            r
        } else if lowpass_ratio < 1.0 {
            let r = Resampler::new(
                channels,
                taps,
                options.num_filters,
                lowpass_ratio,
                flags | INCLUDE_LOWPASS,
            )?;
            info!(
                "{}-tap sinc resampler with lowpass at {:.0} Hz",
                taps,
                lowpass_ratio * in_ctx.sample_rate as f64 / 2.0
            );
            r
        } else {
            let r = Resampler::new(channels, taps, options.num_filters, 1.0, flags)?;
            info!(
                "{}-tap pure sinc resampler (no lowpass), {:.0} Hz Nyquist",
                taps,
                in_ctx.sample_rate as f64 / 2.0
            );
            r
        };

        if lowpass_ratio / ratio < 0.98 && options.pre_post_filter && pre_filter.is_none() {
            let cutoff = lowpass_ratio / ratio / 2.0;
            post_filter = Some(sections(cutoff));
            info!(
                "cascaded biquad post-filter at {:.0} Hz",
                out_ctx.rate as f64 * cutoff
            );
        }

        // bake in the filter group delay and any user phase shift
        resampler.advance_position(taps as f64 / 2.0 + options.phase_shift);

        let outbuffer_frames = (BUFFER_FRAMES as f64 * ratio * 1.1 + 100.0) as usize;
        trace!(
            "sample ratio {:.6}, lowpass ratio {:.4}, {} output frames per block",
            ratio,
            lowpass_ratio,
            outbuffer_frames
        );

        Ok(Self {
            dither: Dither::new(channels, DITHER_SEED),
            resampler,
            pre_filter,
            post_filter,
            ratio,
            gain: 10.0f64.powf(options.gain_db / 20.0),
            samples_to_append: taps / 2,
            inbuffer: vec![0.0; BUFFER_FRAMES * channels],
            outbuffer: vec![0.0; outbuffer_frames * channels],
            in_ctx,
            out_ctx,
        })
    }

    pub fn convert(&mut self, multi: Option<&MultiProgress>) -> Result<u64, Box<dyn Error>> {
        let channels = self.in_ctx.channels;
        let total_frames = self.in_ctx.num_frames;

        self.out_ctx
            .write_header((total_frames as f64 * self.ratio).round() as u64)?;

        let progress = match multi {
            Some(multi) if total_frames >= 1000 => {
                let style = ProgressStyle::with_template("{prefix} {bar:20.cyan/blue} {percent}{msg}")?;
                Some(
                    multi
                        .add(ProgressBar::new(total_frames))
                        .with_style(style)
                        .with_prefix("[resampling]")
                        .with_message("%"),
                )
            }
            _ => None,
        };

        let wall_start = Instant::now();
        let mut remaining = total_frames;
        let mut append_left = self.samples_to_append;

        loop {
            let frames = if remaining > 0 {
                let want = remaining.min(BUFFER_FRAMES as u64) as usize;
                let got = self
                    .in_ctx
                    .read_block(want, self.gain, &mut self.inbuffer)?;
                if got == 0 {
                    warn!("input file terminated early!");
                    remaining = 0;
                    continue;
                }
                remaining -= got as u64;
                if let Some(bar) = &progress {
                    bar.inc(got as u64);
                }
                got
            } else if append_left > 0 {
                // drain the filter's group delay with silence
                let now = append_left.min(BUFFER_FRAMES);
                self.inbuffer[..now * channels].fill(0.0);
                append_left -= now;
                now
            } else {
                break;
            };

            if let Some(cascade) = &mut self.pre_filter {
                apply_cascade(cascade, &mut self.inbuffer[..frames * channels], frames, channels);
            }

            let res = self.resampler.process_interleaved(
                &self.inbuffer[..frames * channels],
                &mut self.outbuffer,
                self.ratio,
            )?;
            debug_assert_eq!(res.input_consumed, frames);
            let generated = res.output_generated;

            if generated > 0 {
                if let Some(cascade) = &mut self.post_filter {
                    apply_cascade(
                        cascade,
                        &mut self.outbuffer[..generated * channels],
                        generated,
                        channels,
                    );
                }
                self.out_ctx
                    .push_block(&self.outbuffer[..generated * channels], &mut self.dither)?;
            }
        }

        let output_frames = self.out_ctx.finalize()?;
        if let Some(bar) = progress {
            bar.finish_and_clear();
        }

        let elapsed = wall_start.elapsed();
        let audio_seconds = total_frames as f64 / self.in_ctx.sample_rate as f64;
        let total_secs = elapsed.as_secs();
        info!(
            "wrote {} frames to \"{}\" in {:02}:{:02}:{:02} ({:.2}x realtime)",
            output_frames,
            self.out_ctx.path.display(),
            total_secs / 3600,
            (total_secs % 3600) / 60,
            total_secs % 60,
            audio_seconds / elapsed.as_secs_f64().max(1e-9)
        );

        if self.dither.clipped_samples() > 0 {
            warn!(
                "{} samples were clipped, suggest reducing gain!",
                self.dither.clipped_samples()
            );
        }

        Ok(output_frames)
    }
}

fn apply_cascade(cascade: &mut [[Biquad; 2]], buffer: &mut [f32], frames: usize, channels: usize) {
    for (channel, sections) in cascade.iter_mut().enumerate() {
        for section in sections.iter_mut() {
            section.apply_interleaved(&mut buffer[channel..], frames, channels);
        }
    }
}
