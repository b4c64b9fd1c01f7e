//! Stereo eye identifiers.

use serde::{Deserialize, Serialize};

/// One of the two stereo views.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Eye {
    #[default]
    Left = 0,
    Right = 1,
}

impl Eye {
    /// Both eyes in submission order.
    pub const BOTH: [Self; 2] = [Self::Left, Self::Right];

    /// Index into per-eye arrays.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// The other eye.
    #[inline]
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

impl std::fmt::Display for Eye {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Left => f.write_str("left"),
            Self::Right => f.write_str("right"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eye_indices_are_stable() {
        assert_eq!(Eye::Left.index(), 0);
        assert_eq!(Eye::Right.index(), 1);
        assert_eq!(Eye::BOTH.map(Eye::index), [0, 1]);
    }

    #[test]
    fn other_eye_round_trips() {
        assert_eq!(Eye::Left.other(), Eye::Right);
        assert_eq!(Eye::Right.other().other(), Eye::Right);
    }

    #[test]
    fn display_names() {
        assert_eq!(Eye::Left.to_string(), "left");
        assert_eq!(Eye::Right.to_string(), "right");
    }
}
