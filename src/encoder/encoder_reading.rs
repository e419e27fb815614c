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

use std::time::{Duration, Instant};

use crate::constants::{
    ENCODER_COMBINED_SCALE, ENCODER_POSITION_BITS, ENCODER_POSITION_MASK, ENCODER_TURNS_MASK,
};

/// Reading of an encoder channel.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EncoderReading {
    pub raw: u32,
    // High 15 bits of the raw value.
    pub turns: u16,
    // Low 17 bits of the raw value.
    pub position: u32,
    // turns + position / 1e6
    pub combined: f64,
    // Time when the reading is received.
    pub timestamp: Option<Instant>,
    pub valid: bool,
}

impl EncoderReading {
    /// Decode the raw value of the encoder.
    ///
    /// # Arguments
    /// * `raw` - Raw 32-bit value.
    /// * `timestamp` - Time of the reception.
    ///
    /// # Returns
    /// Valid reading.
    pub fn decode(raw: u32, timestamp: Instant) -> Self {
        let turns = ((raw >> ENCODER_POSITION_BITS) & ENCODER_TURNS_MASK) as u16;
        let position = raw & ENCODER_POSITION_MASK;

        Self {
            raw,
            turns,
            position,
            combined: turns as f64 + position as f64 / ENCODER_COMBINED_SCALE,
            timestamp: Some(timestamp),
            valid: true,
        }
    }

    /// The reading is valid and not older than the timeout.
    ///
    /// # Arguments
    /// * `timeout` - Data timeout.
    /// * `now` - Current time.
    pub fn is_fresh(&self, timeout: Duration, now: Instant) -> bool {
        match self.timestamp {
            Some(timestamp) => self.valid && now.saturating_duration_since(timestamp) <= timeout,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn test_decode() {
        let now = Instant::now();

        let reading = EncoderReading::decode(0x0002_0000, now);

        assert_eq!(reading.turns, 1);
        assert_eq!(reading.position, 0);
        assert_relative_eq!(reading.combined, 1.0);
        assert!(reading.valid);

        let reading = EncoderReading::decode(0x0000_C000, now);

        assert_eq!(reading.turns, 0);
        assert_eq!(reading.position, 49152);
        assert_relative_eq!(reading.combined, 0.049152);
    }

    #[test]
    fn test_decode_bit_fields() {
        let now = Instant::now();

        // Sweep the raw values with a prime step to cover the bit patterns.
        let mut raw: u32 = 0;
        for _ in 0..10_000 {
            let reading = EncoderReading::decode(raw, now);

            assert_eq!(reading.turns as u32, (raw >> 17) & 0x7FFF);
            assert_eq!(reading.position, raw & 0x1FFFF);
            assert_eq!(
                reading.combined,
                reading.turns as f64 + reading.position as f64 / 1e6
            );

            raw = raw.wrapping_add(429_497);
        }

        let reading = EncoderReading::decode(u32::MAX, now);

        assert_eq!(reading.turns, 0x7FFF);
        assert_eq!(reading.position, 0x1FFFF);
    }

    #[test]
    fn test_is_fresh() {
        let now = Instant::now();
        let reading = EncoderReading::decode(1, now);
        let timeout = Duration::from_millis(500);

        assert!(reading.is_fresh(timeout, now));
        assert!(reading.is_fresh(timeout, now + Duration::from_millis(500)));
        assert!(!reading.is_fresh(timeout, now + Duration::from_millis(501)));

        assert!(!EncoderReading::default().is_fresh(timeout, now));

        let invalid = EncoderReading {
            valid: false,
            ..reading
        };
        assert!(!invalid.is_fresh(timeout, now));
    }
}
