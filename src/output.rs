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
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::dither::Dither;
use crate::input::{WAVE_FORMAT_EXTENSIBLE, WAVE_FORMAT_IEEE_FLOAT, WAVE_FORMAT_PCM};

/// Open WAV output stream: encodes interleaved f32 frames to the requested
/// bit depth and maintains the RIFF header, which is rewritten with the
/// true frame count once the stream drains.
pub struct OutputContext {
    pub path: PathBuf,
    pub bits: u32,
    pub channels: usize,
    pub rate: u32,
    pub float_format: bool,
    channel_mask: u32,
    bytes_per_sample: usize,
    writer: BufWriter<File>,
    pcm: Vec<u8>,
    output_frames: u64,
}

impl OutputContext {
    pub fn new(
        path: &Path,
        bits: u32,
        channels: usize,
        rate: u32,
        channel_mask: u32,
        overwrite: bool,
    ) -> Result<Self, Box<dyn Error>> {
        if !((4..=24).contains(&bits) || bits == 32) {
            return Err("output bitdepth must be 4 - 24 or 32".into());
        }
        if path.exists() && !overwrite {
            return Err(format!(
                "output file \"{}\" exists (use -y to overwrite)",
                path.display()
            )
            .into());
        }

        let file = File::create(path)
            .map_err(|e| format!("can't open \"{}\" for writing: {}", path.display(), e))?;

        Ok(Self {
            path: path.to_path_buf(),
            bits,
            channels,
            rate,
            float_format: bits == 32,
            channel_mask,
            bytes_per_sample: (bits as usize + 7) / 8,
            writer: BufWriter::new(file),
            pcm: Vec::new(),
            output_frames: 0,
        })
    }

    /// Write the RIFF header for `frames` frames at the current position.
    /// Called once up front with an estimate and again from `finalize`.
    pub fn write_header(&mut self, frames: u64) -> Result<(), Box<dyn Error>> {
        let bytes_per_sample = self.bytes_per_sample as u32;
        let block_align = bytes_per_sample * self.channels as u32;
        let data_bytes = frames as u32 * block_align;
        let format: u16 = if self.float_format {
            WAVE_FORMAT_IEEE_FLOAT
        } else {
            WAVE_FORMAT_PCM
        };
        let extensible = self.channel_mask != 0;
        let fmt_size: u32 = if extensible { 40 } else { 16 };

        let w = &mut self.writer;
        w.write_all(b"RIFF")?;
        w.write_all(&(4 + 8 + fmt_size + 8 + data_bytes).to_le_bytes())?;
        w.write_all(b"WAVE")?;

        w.write_all(b"fmt ")?;
        w.write_all(&fmt_size.to_le_bytes())?;
        let tag = if extensible { WAVE_FORMAT_EXTENSIBLE } else { format };
        w.write_all(&tag.to_le_bytes())?;
        w.write_all(&(self.channels as u16).to_le_bytes())?;
        w.write_all(&self.rate.to_le_bytes())?;
        w.write_all(&(self.rate * block_align).to_le_bytes())?;
        w.write_all(&(block_align as u16).to_le_bytes())?;
        w.write_all(&(self.bits as u16).to_le_bytes())?;
        if extensible {
            w.write_all(&22u16.to_le_bytes())?; // cbSize
            w.write_all(&(self.bits as u16).to_le_bytes())?;
            w.write_all(&self.channel_mask.to_le_bytes())?;
            w.write_all(&format.to_le_bytes())?;
            // standard media-subtype GUID tail
            w.write_all(&[
                0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xaa, 0x00, 0x38, 0x9b,
                0x71,
            ])?;
        }

        w.write_all(b"data")?;
        w.write_all(&data_bytes.to_le_bytes())?;
        Ok(())
    }

    /// Encode and append interleaved frames. Integer depths are dithered
    /// and noise shaped; 32-bit output is written as float verbatim.
    pub fn push_block(&mut self, samples: &[f32], dither: &mut Dither) -> Result<(), Box<dyn Error>> {
        let frames = samples.len() / self.channels;
        let need = samples.len() * self.bytes_per_sample;
        if self.pcm.len() < need {
            self.pcm.resize(need, 0);
        }

        if self.float_format {
            for (sample, bytes) in samples.iter().zip(self.pcm.chunks_exact_mut(4)) {
                bytes.copy_from_slice(&sample.to_le_bytes());
            }
        } else {
            let scaler = ((1u32 << self.bits) / 2) as f64;
            let high = (1i64 << (self.bits - 1)) - 1;
            let low = -(1i64 << (self.bits - 1));
            // sub-byte depths are left-aligned in their container bytes
            let leftshift = self.bytes_per_sample as u32 * 8 - self.bits;
            let offset = if self.bits <= 8 { 128i64 } else { 0 };

            let mut at = 0usize;
            for (i, &sample) in samples.iter().enumerate() {
                let channel = i % self.channels;
                let value = dither.quantize(channel, sample as f64 * scaler, low, high);
                let packed = (value << leftshift) + offset;
                self.pcm[at] = packed as u8;
                if self.bytes_per_sample > 1 {
                    self.pcm[at + 1] = (packed >> 8) as u8;
                    if self.bytes_per_sample > 2 {
                        self.pcm[at + 2] = (packed >> 16) as u8;
                    }
                }
                at += self.bytes_per_sample;
            }
        }

        self.writer.write_all(&self.pcm[..need])?;
        self.output_frames += frames as u64;
        Ok(())
    }

    pub fn output_frames(&self) -> u64 {
        self.output_frames
    }

    /// Rewrite the header with the frame count actually produced and flush.
    pub fn finalize(&mut self) -> Result<u64, Box<dyn Error>> {
        self.writer.seek(SeekFrom::Start(0))?;
        let frames = self.output_frames;
        self.write_header(frames)?;
        self.writer.flush()?;
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputContext;

    fn reopen(path: &Path) -> InputContext {
        InputContext::open(path).expect("reopen finished file")
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("wavrate_out_{}_{}", std::process::id(), name))
    }

    #[test]
    fn sixteen_bit_round_trips_within_dither() {
        let path = temp_path("rt16.wav");
        let mut out = OutputContext::new(&path, 16, 1, 44100, 0, true).unwrap();
        out.write_header(0).unwrap();

        let samples: Vec<f32> = (0..256).map(|n| (n as f32 / 256.0) - 0.5).collect();
        let mut dither = Dither::new(1, 1);
        out.push_block(&samples, &mut dither).unwrap();
        let frames = out.finalize().unwrap();
        assert_eq!(frames, 256);

        let mut back = reopen(&path);
        assert_eq!(back.num_frames, 256);
        assert_eq!(back.bits, 16);
        let mut decoded = vec![0.0f32; 256];
        assert_eq!(back.read_block(256, 1.0, &mut decoded).unwrap(), 256);
        for (n, (&got, &want)) in decoded.iter().zip(samples.iter()).enumerate() {
            // dither plus shaping stays within a couple of LSBs
            assert!(
                (got - want).abs() < 4.0 / 32768.0,
                "frame {}: {} vs {}",
                n,
                got,
                want
            );
        }
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn float_output_is_verbatim() {
        let path = temp_path("rt32.wav");
        let mut out = OutputContext::new(&path, 32, 2, 96000, 0, true).unwrap();
        out.write_header(0).unwrap();

        let samples = vec![0.125f32, -0.75, 1.5, -2.0];
        let mut dither = Dither::new(2, 1);
        out.push_block(&samples, &mut dither).unwrap();
        out.finalize().unwrap();

        let mut back = reopen(&path);
        assert!(back.float_format);
        assert_eq!(back.num_frames, 2);
        let mut decoded = vec![0.0f32; 4];
        back.read_block(2, 1.0, &mut decoded).unwrap();
        assert_eq!(decoded, samples); // out-of-range values pass unclipped
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn eight_bit_uses_offset_binary() {
        let path = temp_path("rt8.wav");
        let mut out = OutputContext::new(&path, 8, 1, 8000, 0, true).unwrap();
        out.write_header(0).unwrap();

        let mut dither = Dither::new(1, 1);
        out.push_block(&[0.0f32; 64], &mut dither).unwrap();
        out.finalize().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let data = &bytes[44..];
        assert_eq!(data.len(), 64);
        for &byte in data {
            assert!((127..=129).contains(&byte), "silence byte {}", byte);
        }
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn extensible_header_round_trips_the_mask() {
        let path = temp_path("mask.wav");
        let mut out = OutputContext::new(&path, 24, 2, 48000, 0x3, true).unwrap();
        out.write_header(0).unwrap();
        let mut dither = Dither::new(2, 1);
        out.push_block(&[0.25f32; 32], &mut dither).unwrap();
        out.finalize().unwrap();

        let back = reopen(&path);
        assert_eq!(back.channel_mask, 0x3);
        assert_eq!(back.bits, 24);
        assert_eq!(back.num_frames, 16);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn refuses_to_clobber_without_overwrite() {
        let path = temp_path("noclobber.wav");
        std::fs::write(&path, b"existing").unwrap();
        assert!(OutputContext::new(&path, 16, 2, 44100, 0, false).is_err());
        assert!(OutputContext::new(&path, 16, 2, 44100, 0, true).is_ok());
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn clipping_is_counted_not_wrapped() {
        let path = temp_path("clip.wav");
        let mut out = OutputContext::new(&path, 16, 1, 44100, 0, true).unwrap();
        out.write_header(0).unwrap();
        let mut dither = Dither::new(1, 1);
        out.push_block(&[1.5f32; 16], &mut dither).unwrap();
        out.finalize().unwrap();
        assert_eq!(dither.clipped_samples(), 16);

        let mut back = reopen(&path);
        let mut decoded = vec![0.0f32; 16];
        back.read_block(16, 1.0, &mut decoded).unwrap();
        for &y in &decoded {
            assert!((y - 32767.0 / 32768.0).abs() < 1e-6);
        }
        std::fs::remove_file(path).ok();
    }
}
