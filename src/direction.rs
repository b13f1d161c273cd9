//! Commanded direction of motion and the remote button table that selects it.

use std::fmt;

/// Motion selected by the operator.
///
/// The discriminants are the values stored in the shared direction word, so
/// they must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Direction {
    #[default]
    Stop = 0,
    StraightForward = 1,
    LeftForward = 2,
    RightForward = 3,
    StraightBackward = 4,
    LeftBackward = 5,
    RightBackward = 6,
    BeaconOn = 7,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::Stop,
        Direction::StraightForward,
        Direction::LeftForward,
        Direction::RightForward,
        Direction::StraightBackward,
        Direction::LeftBackward,
        Direction::RightBackward,
        Direction::BeaconOn,
    ];

    /// Decode an infrared remote button code (channel 1 of the EV3 remote).
    ///
    /// Codes with no meaning for the walker (combinations such as
    /// "red up + blue down") decode to `Stop`.
    pub fn from_remote_code(code: u8) -> Self {
        match code {
            0 => Direction::Stop,
            1 => Direction::LeftForward,
            2 => Direction::LeftBackward,
            3 => Direction::RightForward,
            4 => Direction::RightBackward,
            5 => Direction::StraightForward,
            8 => Direction::StraightBackward,
            9 => Direction::BeaconOn,
            _ => Direction::Stop,
        }
    }

    /// Decode a raw shared-state word. `None` for anything that is not a
    /// discriminant.
    pub fn from_u8(raw: u8) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }

    /// True for the six directions that make the legs step.
    pub fn is_moving(self) -> bool {
        !matches!(self, Direction::Stop | Direction::BeaconOn)
    }

    pub fn name(self) -> &'static str {
        match self {
            Direction::Stop => "Stop",
            Direction::StraightForward => "Straight_Forward",
            Direction::LeftForward => "Left_Forward",
            Direction::RightForward => "Right_Forward",
            Direction::StraightBackward => "Straight_Backward",
            Direction::LeftBackward => "Left_Backward",
            Direction::RightBackward => "Right_Backward",
            Direction::BeaconOn => "Beacon_ON",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
