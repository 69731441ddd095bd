/*
 Copyright (c) 2025 wavrate contributors

 This file is part of wavrate

 wavrate is free software: you can redistribute it and/or modify it
 under the terms of the GNU General Public License as published by the
 Free Software Foundation, either version 3 of the License, or
 (at your option) any later version.

 wavrate is distributed in the hope that it will be useful, but
 WITHOUT ANY WARRANTY; without even the implied warranty of
 MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 GNU General Public License for more details.
 You should have received a copy of the GNU General Public License
 along with wavrate. If not, see <https://www.gnu.org/licenses/>.
*/

use std::error::Error;
use std::path::PathBuf;

use clap::{ArgAction, Parser};
use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;
use log::info;

use wavrate::{ColorLogger, ConversionContext, ConversionOptions, InputContext, OutputContext, TermResult};

#[derive(Parser)]
#[command(
    name = "wavrate",
    version,
    about = "Resample WAV files with a windowed-sinc polyphase kernel",
    disable_help_flag = true
)]
struct Cli {
    /// Quality preset: 16 sinc filters / 16 taps
    #[arg(short = '1', group = "preset")]
    preset1: bool,

    /// Quality preset: 64 sinc filters / 64 taps
    #[arg(short = '2', group = "preset")]
    preset2: bool,

    /// Quality preset: 256 sinc filters / 256 taps [default]
    #[arg(short = '3', group = "preset")]
    preset3: bool,

    /// Quality preset: 1024 sinc filters / 1024 taps
    #[arg(short = '4', group = "preset")]
    preset4: bool,

    /// Resample to the specified rate in Hz [default: input rate]
    #[arg(short = 'r', long = "rate")]
    rate: Option<u32>,

    /// Apply gain in dB
    #[arg(short = 'g', long = "gain", default_value = "0.0", allow_hyphen_values = true)]
    gain: f64,

    /// Add the specified phase shift in degrees (+/- 360)
    #[arg(short = 's', long = "shift", default_value = "0.0", allow_hyphen_values = true)]
    shift: f64,

    /// Specify an alternate lowpass frequency in Hz
    #[arg(short = 'l', long = "lowpass")]
    lowpass: Option<f64>,

    /// Number of sinc filters (2-1024)
    #[arg(short = 'f', long = "filters")]
    num_filters: Option<usize>,

    /// Number of sinc taps (4-1024, multiples of 4)
    #[arg(short = 't', long = "taps")]
    num_taps: Option<usize>,

    /// Change output file bitdepth (4-24 or 32) [default: input depth]
    #[arg(short = 'o', long = "bits")]
    bits: Option<u32>,

    /// Use the nearest filter (don't interpolate between phases)
    #[arg(short = 'n', long = "nearest")]
    nearest: bool,

    /// Blackman-Harris windowing, best stopband [default]
    #[arg(short = 'b', long = "blackman-harris")]
    blackman_harris: bool,

    /// Hann windowing, fastest transition
    #[arg(short = 'h', long = "hann")]
    hann: bool,

    /// Pre/post filtering with cascaded biquads
    #[arg(short = 'p', long = "pre-post")]
    pre_post: bool,

    /// Quiet mode (display errors only)
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// Verbose (display lots of info)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Overwrite the output file if it exists
    #[arg(short = 'y', long = "overwrite")]
    overwrite: bool,

    /// Print help
    #[arg(long = "help", action = ArgAction::Help)]
    #[allow(dead_code)]
    help: Option<bool>,

    /// Input WAV file
    infile: PathBuf,

    /// Output WAV file
    outfile: PathBuf,
}

fn main() -> TermResult {
    match run() {
        Ok(()) => TermResult(Ok(())),
        Err(e) => TermResult(Err(e.into())),
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let logger = ColorLogger::new(cli.quiet, cli.verbose);
    let max_level = logger.max_level();
    let multi = MultiProgress::new();
    LogWrapper::new(multi.clone(), logger).try_init()?;
    log::set_max_level(max_level);

    if cli.shift <= -360.0 || cli.shift >= 360.0 {
        return Err("phase shift must be less than +/- 1 sample".into());
    }
    if cli.infile == cli.outfile {
        return Err("can't overwrite input file (specify different/new output file name)".into());
    }

    let (mut num_filters, mut num_taps) = if cli.preset1 {
        (16, 16)
    } else if cli.preset2 {
        (64, 64)
    } else if cli.preset3 {
        (256, 256)
    } else if cli.preset4 {
        (1024, 1024)
    } else {
        (256, 256)
    };
    if let Some(filters) = cli.num_filters {
        num_filters = filters;
    }
    if let Some(taps) = cli.num_taps {
        num_taps = taps;
    }

    let in_ctx = InputContext::open(&cli.infile)?;
    let out_rate = cli.rate.unwrap_or(in_ctx.sample_rate);
    let out_bits = cli.bits.unwrap_or(in_ctx.bits);

    info!(
        "resampling {}-channel \"{}\" ({}b/{}k) to \"{}\" ({}b/{}k)",
        in_ctx.channels,
        cli.infile.display(),
        in_ctx.bits,
        (in_ctx.sample_rate + 500) / 1000,
        cli.outfile.display(),
        out_bits,
        (out_rate + 500) / 1000
    );

    let out_ctx = OutputContext::new(
        &cli.outfile,
        out_bits,
        in_ctx.channels,
        out_rate,
        in_ctx.channel_mask,
        cli.overwrite,
    )?;

    let options = ConversionOptions {
        num_taps,
        num_filters,
        hann_window: cli.hann,
        blackman_harris: cli.blackman_harris,
        interpolate: !cli.nearest,
        pre_post_filter: cli.pre_post,
        gain_db: cli.gain,
        phase_shift: cli.shift / 360.0,
        lowpass_freq: cli.lowpass,
    };

    let mut conversion = ConversionContext::new(in_ctx, out_ctx, &options)?;
    conversion.convert(Some(&multi))?;

    Ok(())
}
