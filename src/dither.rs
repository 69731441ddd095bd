use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Per-channel TPDF dither and first-order noise shaping for the integer
/// output path. Each channel owns its own generator and its own running
/// quantisation-error accumulator, so channels never correlate.
pub struct Dither {
    rngs: Vec<SmallRng>,
    previous: Vec<f64>,
    error: Vec<f64>,
    clipped: u64,
}

impl Dither {
    pub fn new(channels: usize, seed: u64) -> Self {
        Self {
            rngs: (0..channels)
                .map(|ch| SmallRng::seed_from_u64(seed.wrapping_add(ch as u64)))
                .collect(),
            previous: vec![0.5; channels],
            error: vec![0.0; channels],
            clipped: 0,
        }
    }

    // High-passed triangular noise in (-1, 1): the first difference of
    // successive uniform draws, which pushes the dither energy toward
    // Nyquist where it is least audible.
    #[inline]
    fn tpdf(&mut self, channel: usize) -> f64 {
        let draw = self.rngs[channel].gen::<f64>();
        let noise = draw - self.previous[channel];
        self.previous[channel] = draw;
        noise
    }

    /// Round `scaled` (already in LSB units) to an integer with dither and
    /// error feedback, clamping to `low..=high` and counting any clips.
    #[inline]
    pub fn quantize(&mut self, channel: usize, scaled: f64, low: i64, high: i64) -> i64 {
        let mut value = (scaled - self.error[channel] + self.tpdf(channel) + 0.5).floor() as i64;
        if value > high {
            value = high;
            self.clipped += 1;
        } else if value < low {
            value = low;
            self.clipped += 1;
        }
        self.error[channel] += value as f64 - scaled;
        value
    }

    pub fn clipped_samples(&self) -> u64 {
        self.clipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noise_stays_triangular_and_centered() {
        let mut dither = Dither::new(1, 1);
        let mut sum = 0.0f64;
        for _ in 0..10000 {
            let noise = dither.tpdf(0);
            assert!(noise > -1.0 && noise < 1.0);
            sum += noise;
        }
        assert!((sum / 10000.0).abs() < 0.05, "mean {}", sum / 10000.0);
    }

    #[test]
    fn same_seed_reproduces_the_stream() {
        let mut a = Dither::new(2, 42);
        let mut b = Dither::new(2, 42);
        for n in 0..500 {
            let x = (n as f64 * 0.013).sin() * 1000.0;
            assert_eq!(
                a.quantize(n % 2, x, -32768, 32767),
                b.quantize(n % 2, x, -32768, 32767)
            );
        }
    }

    #[test]
    fn channels_are_independent() {
        let mut dither = Dither::new(2, 7);
        let left: Vec<f64> = (0..64).map(|_| dither.tpdf(0)).collect();
        // a fresh instance gives the same channel-0 sequence no matter how
        // the other channel is exercised in between
        let mut fresh = Dither::new(2, 7);
        for (n, &want) in left.iter().enumerate() {
            fresh.tpdf(1);
            let got = fresh.tpdf(0);
            assert_eq!(got, want, "draw {}", n);
        }
    }

    #[test]
    fn error_feedback_stays_bounded() {
        let mut dither = Dither::new(1, 3);
        let mut worst = 0.0f64;
        for n in 0..20000 {
            let ideal = (n as f64 * 0.0137).sin() * 30000.0;
            let value = dither.quantize(0, ideal, -32768, 32767);
            worst = worst.max((value as f64 - ideal).abs());
        }
        assert!(worst < 4.0, "worst quantisation excursion {}", worst);
    }

    #[test]
    fn clamping_counts_clips() {
        let mut dither = Dither::new(1, 5);
        for _ in 0..10 {
            dither.quantize(0, 200.0, -128, 127);
        }
        assert_eq!(dither.clipped_samples(), 10);
    }
}
