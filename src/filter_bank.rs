use core::fmt;
use std::f64::consts::PI;

// Resampler flag bits. Parroted into the driver so the hot loop can branch
// without re-reading the bank.
pub const SUBSAMPLE_INTERPOLATE: u32 = 0x1;
pub const BLACKMAN_HARRIS: u32 = 0x2;
pub const INCLUDE_LOWPASS: u32 = 0x4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Hann,
    BlackmanHarris4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResampleError {
    InvalidParameter(&'static str),
}

impl fmt::Display for ResampleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResampleError::InvalidParameter(msg) => write!(f, "invalid parameter: {}", msg),
        }
    }
}

impl std::error::Error for ResampleError {}

// 4-term Blackman-Harris coefficients
const BH4_A0: f64 = 0.35875;
const BH4_A1: f64 = 0.48829;
const BH4_A2: f64 = 0.14128;
const BH4_A3: f64 = 0.01168;

impl Window {
    // Window value for u in [-1, 1]; 1 at u = 0, 0 at |u| = 1.
    #[inline]
    fn evaluate(self, u: f64) -> f64 {
        if u.abs() >= 1.0 {
            return 0.0;
        }
        match self {
            Window::Hann => 0.5 + 0.5 * (PI * u).cos(),
            Window::BlackmanHarris4 => {
                let x = (u + 1.0) * 0.5;
                BH4_A0 - BH4_A1 * (2.0 * PI * x).cos() + BH4_A2 * (4.0 * PI * x).cos()
                    - BH4_A3 * (6.0 * PI * x).cos()
            }
        }
    }
}

#[inline]
fn sinc(y: f64) -> f64 {
    if y == 0.0 {
        1.0
    } else {
        (PI * y).sin() / (PI * y)
    }
}

/// Bank of `num_filters` windowed-sinc FIR filters, each `num_taps` long,
/// covering the fractional phases k/F of one input sample interval. Row F is
/// a sentinel equal to row 0 advanced by one input sample, so the driver can
/// blend rows k and k+1 without wrap logic.
///
/// Immutable after construction; may be shared across resampler instances.
pub struct FilterBank {
    num_filters: usize,
    num_taps: usize,
    window: Window,
    subsample_interpolate: bool,
    include_lowpass: bool,
    cutoff: f64,
    taps: Vec<f32>, // (num_filters + 1) * num_taps, row-major
}

impl FilterBank {
    pub fn new(
        num_filters: usize,
        num_taps: usize,
        cutoff: f64,
        flags: u32,
    ) -> Result<Self, ResampleError> {
        if !(2..=1024).contains(&num_filters) {
            return Err(ResampleError::InvalidParameter("num_filters must be 2 - 1024"));
        }
        if !(4..=1024).contains(&num_taps) || num_taps % 4 != 0 {
            return Err(ResampleError::InvalidParameter(
                "num_taps must be 4 - 1024 and a multiple of 4",
            ));
        }
        if !(cutoff > 0.0 && cutoff <= 1.0) {
            return Err(ResampleError::InvalidParameter("cutoff must be in (0, 1]"));
        }

        let window = if flags & BLACKMAN_HARRIS != 0 {
            Window::BlackmanHarris4
        } else {
            Window::Hann
        };
        let include_lowpass = flags & INCLUDE_LOWPASS != 0;
        let scale = if include_lowpass { cutoff } else { 1.0 };

        let half = num_taps as f64 / 2.0;
        let mut taps = vec![0.0f32; (num_filters + 1) * num_taps];

        for k in 0..num_filters {
            let phase = k as f64 / num_filters as f64;
            let row = &mut taps[k * num_taps..(k + 1) * num_taps];
            let mut sum = 0.0f64;

            for (i, tap) in row.iter_mut().enumerate() {
                // Row k reconstructs the signal k/F of a sample later than
                // row 0; the sentinel row (k = F) lands exactly one whole
                // sample ahead.
                let x = i as f64 - half + 1.0 - phase;
                let value = window.evaluate(x / half) * sinc(scale * x);
                *tap = value as f32;
                sum += value;
            }

            // unity DC gain per row
            for tap in row.iter_mut() {
                *tap = (*tap as f64 / sum) as f32;
            }
        }

        // Sentinel row: row 0 shifted by one input sample.
        let (head, sentinel) = taps.split_at_mut(num_filters * num_taps);
        sentinel[0] = 0.0;
        sentinel[1..num_taps].copy_from_slice(&head[..num_taps - 1]);

        Ok(Self {
            num_filters,
            num_taps,
            window,
            subsample_interpolate: flags & SUBSAMPLE_INTERPOLATE != 0,
            include_lowpass,
            cutoff: scale,
            taps,
        })
    }

    #[inline]
    pub fn num_filters(&self) -> usize {
        self.num_filters
    }

    #[inline]
    pub fn num_taps(&self) -> usize {
        self.num_taps
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn subsample_interpolate(&self) -> bool {
        self.subsample_interpolate
    }

    pub fn include_lowpass(&self) -> bool {
        self.include_lowpass
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// Tap row for phase index k, valid for k in 0..=num_filters.
    #[inline]
    pub fn row(&self, k: usize) -> &[f32] {
        &self.taps[k * self.num_taps..(k + 1) * self.num_taps]
    }
}
