//! # Punch Decoder
//!
//! Boxing gloves report a single small integer per punch. Bit 0 carries the hand, bits 1-2
//! carry the punch classification.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which glove produced the punch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Hand {
    Left,
    Right,
}

/// Punch classification carried in bits 1-2 of the hand code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PunchType {
    Straight,
    Swing,
    Upcut,
    Unknown,
}

/// Maps bit 0 of the hand code: 0 is the left glove, 1 the right.
pub fn decode_hand(code: u32) -> Hand {
    if code & 0x01 == 0 {
        Hand::Left
    } else {
        Hand::Right
    }
}

/// Extracts bits 1-2 of the hand code. Total over all inputs.
pub fn decode_punch(code: u32) -> PunchType {
    match (code >> 1) & 0x03 {
        0 => PunchType::Straight,
        1 => PunchType::Swing,
        2 => PunchType::Upcut,
        _ => PunchType::Unknown,
    }
}

impl Hand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Hand::Left => "Left",
            Hand::Right => "Right",
        }
    }
}

impl PunchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PunchType::Straight => "Straight",
            PunchType::Swing => "Swing",
            PunchType::Upcut => "Upcut",
            PunchType::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Hand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for PunchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Hand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Left" => Ok(Hand::Left),
            "Right" => Ok(Hand::Right),
            other => Err(format!("unknown hand label '{}'", other)),
        }
    }
}

impl FromStr for PunchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Straight" => Ok(PunchType::Straight),
            "Swing" => Ok(PunchType::Swing),
            "Upcut" => Ok(PunchType::Upcut),
            "Unknown" => Ok(PunchType::Unknown),
            other => Err(format!("unknown punch type '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_punch_maps_bits_one_and_two() {
        assert_eq!(decode_punch(0b000), PunchType::Straight);
        assert_eq!(decode_punch(0b010), PunchType::Swing);
        assert_eq!(decode_punch(0b100), PunchType::Upcut);
        assert_eq!(decode_punch(0b110), PunchType::Unknown);
    }

    #[test]
    fn test_decode_punch_ignores_hand_bit() {
        for code in 0..8u32 {
            assert_eq!(decode_punch(code), decode_punch(code & !0x01), "code {}", code);
        }
    }

    #[test]
    fn test_decode_punch_is_total() {
        // Upper bits never leak into the classification
        for code in [8u32, 9, 12, 255, 1024, u32::MAX] {
            let punch = decode_punch(code);
            assert_eq!(punch, decode_punch(code & 0b111));
        }
    }

    #[test]
    fn test_decode_hand_uses_bit_zero() {
        assert_eq!(decode_hand(0), Hand::Left);
        assert_eq!(decode_hand(1), Hand::Right);
        assert_eq!(decode_hand(4), Hand::Left);
        assert_eq!(decode_hand(7), Hand::Right);
    }

    #[test]
    fn test_labels_parse_back() {
        for punch in [PunchType::Straight, PunchType::Swing, PunchType::Upcut, PunchType::Unknown] {
            assert_eq!(punch.as_str().parse::<PunchType>().unwrap(), punch);
        }
        assert_eq!("Right".parse::<Hand>().unwrap(), Hand::Right);
        assert!("Center".parse::<Hand>().is_err());
    }
}
