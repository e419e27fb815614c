// This file is part of instrument_controller.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use crate::constants::{FRAME_HEAD, FRAME_LENGTH, FRAME_TAIL};

/// Frame of the encoder collector: [head, channel, b3, b2, b1, b0, tail].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderFrame {
    // Local channel of the collector.
    pub channel: u8,
    // Big-endian value of b3..b0.
    pub raw: u32,
}

/// Parser of the byte stream from the encoder collector. The incomplete
/// frame is kept until the next bytes arrive.
#[derive(Default)]
pub struct FrameParser {
    _buffer: Vec<u8>,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of the bytes waiting for more data.
    pub fn buffered_len(&self) -> usize {
        self._buffer.len()
    }

    /// Push the received bytes and parse the frames.
    ///
    /// # Arguments
    /// * `bytes` - Received bytes.
    ///
    /// # Returns
    /// Well-formed frames in the order of arrival.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<EncoderFrame> {
        self._buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        let mut idx = 0;
        loop {
            // Search the head.
            match self._buffer[idx..].iter().position(|&byte| byte == FRAME_HEAD) {
                Some(offset) => idx += offset,
                None => {
                    idx = self._buffer.len();
                    break;
                }
            }

            // Wait for the rest of the frame.
            if self._buffer.len() - idx < FRAME_LENGTH {
                break;
            }

            let frame = &self._buffer[idx..(idx + FRAME_LENGTH)];
            if frame[FRAME_LENGTH - 1] != FRAME_TAIL {
                // Out of sync, skip this head.
                idx += 1;
                continue;
            }

            frames.push(EncoderFrame {
                channel: frame[1],
                raw: u32::from_be_bytes([frame[2], frame[3], frame[4], frame[5]]),
            });
            idx += FRAME_LENGTH;
        }

        self._buffer.drain(..idx);

        frames
    }

    /// Clear the buffered bytes.
    pub fn clear(&mut self) {
        self._buffer.clear();
    }
}
