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

use std::fmt;
use std::str::FromStr;

use crate::enums::PlcArea;
use crate::error::PlcError;

const OPCUA_NAMESPACE: u16 = 3;

/// Address of a PLC point. The address is immutable after the construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlcAddress {
    _area: PlcArea,
    _byte_offset: u32,
    // -1 for the non-bit address.
    _bit_offset: i8,
    // 0 for the non-DB address.
    _db_number: u16,
    // Access width in bytes: 1, 2, or 4.
    _width: u8,
}

impl PlcAddress {
    /// Create a bit address.
    ///
    /// # Arguments
    /// * `area` - Memory area. Use `db_bit()` for the DB block.
    /// * `byte_offset` - Byte offset.
    /// * `bit_offset` - Bit offset in [0, 7].
    ///
    /// # Returns
    /// Address of the bit.
    pub const fn bit(area: PlcArea, byte_offset: u32, bit_offset: u8) -> Self {
        Self {
            _area: area,
            _byte_offset: byte_offset,
            _bit_offset: (bit_offset & 0x07) as i8,
            _db_number: 0,
            _width: 1,
        }
    }

    /// Create a byte, word or double-word address.
    ///
    /// # Arguments
    /// * `area` - Memory area. Use `db_value()` for the DB block.
    /// * `byte_offset` - Byte offset.
    /// * `width` - Access width in bytes: 1, 2, or 4.
    ///
    /// # Returns
    /// Address of the value.
    pub const fn value(area: PlcArea, byte_offset: u32, width: u8) -> Self {
        Self {
            _area: area,
            _byte_offset: byte_offset,
            _bit_offset: -1,
            _db_number: 0,
            _width: width,
        }
    }

    /// Create a bit address in the DB block.
    pub const fn db_bit(db_number: u16, byte_offset: u32, bit_offset: u8) -> Self {
        Self {
            _area: PlcArea::DbBlock,
            _byte_offset: byte_offset,
            _bit_offset: (bit_offset & 0x07) as i8,
            _db_number: db_number,
            _width: 1,
        }
    }

    /// Create a byte, word or double-word address in the DB block.
    pub const fn db_value(db_number: u16, byte_offset: u32, width: u8) -> Self {
        Self {
            _area: PlcArea::DbBlock,
            _byte_offset: byte_offset,
            _bit_offset: -1,
            _db_number: db_number,
            _width: width,
        }
    }

    pub fn area(&self) -> PlcArea {
        self._area
    }

    pub fn byte_offset(&self) -> u32 {
        self._byte_offset
    }

    pub fn bit_offset(&self) -> i8 {
        self._bit_offset
    }

    pub fn db_number(&self) -> u16 {
        self._db_number
    }

    pub fn width(&self) -> u8 {
        self._width
    }

    /// The address is a bit or not.
    pub fn is_bit(&self) -> bool {
        self._bit_offset >= 0
    }

    /// Get the OPC-UA node ID with the string identifier.
    ///
    /// # Returns
    /// Node ID such as "ns=3;s=%I0.0".
    pub fn opcua_node_id(&self) -> String {
        format!("ns={OPCUA_NAMESPACE};s={self}")
    }

    /// Get the size letter of the canonical text.
    fn size_letter(&self) -> &'static str {
        match self._width {
            1 => "B",
            4 => "D",
            _ => "W",
        }
    }
}

impl fmt::Display for PlcAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self._area == PlcArea::DbBlock {
            return if self.is_bit() {
                write!(
                    f,
                    "DB{}.DBX{}.{}",
                    self._db_number, self._byte_offset, self._bit_offset
                )
            } else {
                write!(
                    f,
                    "DB{}.DB{}{}",
                    self._db_number,
                    self.size_letter(),
                    self._byte_offset
                )
            };
        }

        let prefix = match self._area {
            PlcArea::Input | PlcArea::InputWord => "I",
            PlcArea::Output | PlcArea::OutputWord => "Q",
            _ => "M",
        };

        if self.is_bit() {
            write!(f, "%{prefix}{}.{}", self._byte_offset, self._bit_offset)
        } else {
            write!(f, "%{prefix}{}{}", self.size_letter(), self._byte_offset)
        }
    }
}

impl FromStr for PlcAddress {
    type Err = PlcError;

    /// Parse the canonical text such as "%I0.0", "%IW130", "%MD4",
    /// "DB1.DBX2.4" or "DB1.DBW12".
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let invalid = || PlcError::InvalidAddress(String::from(text));

        if let Some(rest) = text.strip_prefix("DB") {
            let (db_number, rest) = rest.split_once(".DB").ok_or_else(invalid)?;
            let db_number = db_number.parse::<u16>().map_err(|_| invalid())?;

            let mut chars = rest.chars();
            let letter = chars.next().ok_or_else(invalid)?;
            let rest = chars.as_str();
            return match letter {
                'X' => {
                    let (byte, bit) = parse_bit(rest).ok_or_else(invalid)?;
                    Ok(Self::db_bit(db_number, byte, bit))
                }
                _ => {
                    let width = width_of(letter).ok_or_else(invalid)?;
                    let byte = rest.parse::<u32>().map_err(|_| invalid())?;
                    Ok(Self::db_value(db_number, byte, width))
                }
            };
        }

        let rest = text.strip_prefix('%').ok_or_else(invalid)?;
        let mut chars = rest.chars();
        let area_letter = chars.next().ok_or_else(invalid)?;
        let rest = chars.as_str();

        // Bit address has no size letter.
        if let Some((byte, bit)) = parse_bit(rest) {
            let area = match area_letter {
                'I' => PlcArea::Input,
                'Q' => PlcArea::Output,
                'M' => PlcArea::Memory,
                _ => return Err(invalid()),
            };
            return Ok(Self::bit(area, byte, bit));
        }

        let mut chars = rest.chars();
        let size_letter = chars.next().ok_or_else(invalid)?;
        let width = width_of(size_letter).ok_or_else(invalid)?;
        let byte = chars.as_str().parse::<u32>().map_err(|_| invalid())?;
        let area = match (area_letter, width) {
            ('I', 1) => PlcArea::Input,
            ('I', _) => PlcArea::InputWord,
            ('Q', 1) => PlcArea::Output,
            ('Q', _) => PlcArea::OutputWord,
            ('M', _) => PlcArea::Memory,
            _ => return Err(invalid()),
        };

        Ok(Self::value(area, byte, width))
    }
}

/// Parse the "<byte>.<bit>" text.
fn parse_bit(text: &str) -> Option<(u32, u8)> {
    let (byte, bit) = text.split_once('.')?;
    let byte = byte.parse::<u32>().ok()?;
    let bit = bit.parse::<u8>().ok()?;
    if bit > 7 {
        return None;
    }

    Some((byte, bit))
}

fn width_of(letter: char) -> Option<u8> {
    match letter {
        'B' => Some(1),
        'W' => Some(2),
        'D' => Some(4),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(PlcAddress::bit(PlcArea::Input, 0, 0).to_string(), "%I0.0");
        assert_eq!(
            PlcAddress::bit(PlcArea::Output, 3, 7).to_string(),
            "%Q3.7"
        );
        assert_eq!(
            PlcAddress::value(PlcArea::InputWord, 130, 2).to_string(),
            "%IW130"
        );
        assert_eq!(
            PlcAddress::value(PlcArea::Memory, 4, 4).to_string(),
            "%MD4"
        );
        assert_eq!(PlcAddress::db_bit(1, 2, 4).to_string(), "DB1.DBX2.4");
        assert_eq!(PlcAddress::db_value(1, 12, 2).to_string(), "DB1.DBW12");
        assert_eq!(PlcAddress::db_value(2, 0, 4).to_string(), "DB2.DBD0");
        assert_eq!(PlcAddress::db_value(2, 1, 1).to_string(), "DB2.DBB1");
    }

    #[test]
    fn test_accessors() {
        let address = PlcAddress::db_bit(1, 2, 4);

        assert_eq!(address.area(), PlcArea::DbBlock);
        assert_eq!(address.byte_offset(), 2);
        assert_eq!(address.bit_offset(), 4);
        assert_eq!(address.db_number(), 1);
        assert!(address.is_bit());

        let address = PlcAddress::value(PlcArea::Input, 130, 2);

        assert_eq!(address.bit_offset(), -1);
        assert_eq!(address.db_number(), 0);
        assert!(!address.is_bit());
    }

    #[test]
    fn test_from_str() {
        for text in [
            "%I0.0", "%Q3.7", "%M10.1", "%IW130", "%QW2", "%MD4", "%MB8", "DB1.DBX2.4",
            "DB1.DBW12", "DB2.DBD0", "DB3.DBB7",
        ] {
            assert_eq!(PlcAddress::from_str(text).unwrap().to_string(), text);
        }

        assert_eq!(
            PlcAddress::from_str("%IW130").unwrap().area(),
            PlcArea::InputWord
        );
        assert_eq!(PlcAddress::from_str("%IB1").unwrap().area(), PlcArea::Input);
    }

    #[test]
    fn test_from_str_invalid() {
        for text in ["", "I0.0", "%X0.0", "%I0.8", "%IZ2", "DB1.DBX2", "DBa.DBW2", "%Iabc"] {
            assert_eq!(
                PlcAddress::from_str(text),
                Err(PlcError::InvalidAddress(String::from(text)))
            );
        }
    }

    #[test]
    fn test_opcua_node_id() {
        assert_eq!(
            PlcAddress::bit(PlcArea::Input, 0, 0).opcua_node_id(),
            "ns=3;s=%I0.0"
        );
        assert_eq!(
            PlcAddress::db_value(1, 12, 2).opcua_node_id(),
            "ns=3;s=DB1.DBW12"
        );
    }
}
