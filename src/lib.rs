pub mod biquad;
pub mod color_logger;
pub mod conversion_context;
pub mod dither;
pub mod filter_bank;
pub mod input;
pub mod model;
pub mod output;
pub mod resampler;

pub use biquad::{Biquad, BiquadCoefficients};
pub use color_logger::ColorLogger;
pub use conversion_context::{ConversionContext, ConversionOptions, BUFFER_FRAMES};
pub use dither::Dither;
pub use filter_bank::{
    FilterBank, ResampleError, Window, BLACKMAN_HARRIS, INCLUDE_LOWPASS, SUBSAMPLE_INTERPOLATE,
};
pub use input::InputContext;
pub use model::{MyError, MyResult, TermResult};
pub use output::OutputContext;
pub use resampler::{ProcessResult, Resampler};
