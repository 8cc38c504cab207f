//! Wire-format encoding for the Elegoo smart car TCP protocol.
//!
//! Drive and turn commands are newline-terminated JSON records; the heartbeat
//! is a bare `{Heartbeat}` literal that the firmware matches byte-for-byte.
//! Encoding is deterministic (fixed field order, no whitespace), which the
//! link layer relies on for equality-based de-duplication.

use bytes::Bytes;
use serde::Serialize;

const COMMAND_ID: &str = "Elegoo";

/// Opcode for differential drive (D1 = left speed, D2 = right speed).
const OP_DRIVE: u8 = 4;
/// Opcode for in-place turns (D1 = direction code, D2 = speed).
const OP_TURN: u8 = 3;

/// Default straight-line drive speed.
pub const DEFAULT_SPEED: i32 = 100;
/// Default turning speed.
pub const TURNING_SPEED: i32 = 75;

/// Keepalive payload. Not JSON; the firmware expects this exact literal.
const HEARTBEAT_PAYLOAD: &[u8] = b"{Heartbeat}\n";

#[derive(Serialize)]
struct WireRecord<'a> {
    #[serde(rename = "H")]
    header: &'a str,
    #[serde(rename = "N")]
    op: u8,
    #[serde(rename = "D1")]
    d1: i32,
    #[serde(rename = "D2")]
    d2: i32,
}

fn encode(op: u8, d1: i32, d2: i32) -> Bytes {
    let record = WireRecord {
        header: COMMAND_ID,
        op,
        d1,
        d2,
    };
    let mut line = serde_json::to_string(&record).expect("wire record is always serializable");
    line.push('\n');
    Bytes::from(line)
}

/// Stop payload (opcode 4, both operands zero).
pub fn stop_command() -> Bytes {
    encode(OP_DRIVE, 0, 0)
}

/// Differential drive payload. Each operand is clamped to [-255, 255].
pub fn move_command(left_speed: i32, right_speed: i32) -> Bytes {
    encode(
        OP_DRIVE,
        left_speed.clamp(-255, 255),
        right_speed.clamp(-255, 255),
    )
}

/// In-place turn payload. Speed is clamped to [0, 255].
pub fn turn_command(direction: TurnDirection, speed: i32) -> Bytes {
    encode(OP_TURN, direction.wire_code(), speed.clamp(0, 255))
}

/// Keepalive payload, emitted on the heartbeat timer.
pub fn heartbeat() -> Bytes {
    Bytes::from_static(HEARTBEAT_PAYLOAD)
}

/// Turn direction as encoded in the D1 operand of opcode 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnDirection {
    Left,
    Right,
}

impl TurnDirection {
    fn wire_code(self) -> i32 {
        match self {
            TurnDirection::Left => 1,
            TurnDirection::Right => 2,
        }
    }
}

/// Drive actions the control UI may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveAction {
    Stop,
    Forward,
    Left,
    Right,
}

impl DriveAction {
    /// Parse the action string used in client `command` messages.
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "STOP" => Some(DriveAction::Stop),
            "FORWARD" => Some(DriveAction::Forward),
            "LEFT" => Some(DriveAction::Left),
            "RIGHT" => Some(DriveAction::Right),
            _ => None,
        }
    }
}

/// Command payloads built once at startup and reused byte-identically, so
/// the link's de-duplication check can compare by equality.
#[derive(Debug, Clone)]
pub struct CommandSet {
    stop: Bytes,
    forward: Bytes,
    // Encoded but not reachable from any UI action.
    backward: Bytes,
    left: Bytes,
    right: Bytes,
    heartbeat: Bytes,
}

impl CommandSet {
    pub fn new(default_speed: i32, turning_speed: i32) -> Self {
        Self {
            stop: stop_command(),
            forward: move_command(default_speed, default_speed),
            backward: move_command(-default_speed, -default_speed),
            left: turn_command(TurnDirection::Left, turning_speed),
            right: turn_command(TurnDirection::Right, turning_speed),
            heartbeat: heartbeat(),
        }
    }

    pub fn for_action(&self, action: DriveAction) -> Bytes {
        match action {
            DriveAction::Stop => self.stop.clone(),
            DriveAction::Forward => self.forward.clone(),
            DriveAction::Left => self.left.clone(),
            DriveAction::Right => self.right.clone(),
        }
    }

    pub fn stop(&self) -> Bytes {
        self.stop.clone()
    }

    pub fn backward(&self) -> Bytes {
        self.backward.clone()
    }

    pub fn heartbeat(&self) -> Bytes {
        self.heartbeat.clone()
    }
}

impl Default for CommandSet {
    fn default() -> Self {
        Self::new(DEFAULT_SPEED, TURNING_SPEED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_command_matches_wire_format() {
        assert_eq!(
            &stop_command()[..],
            b"{\"H\":\"Elegoo\",\"N\":4,\"D1\":0,\"D2\":0}\n"
        );
    }

    #[test]
    fn move_command_clamps_operands() {
        let payload = move_command(999, -999);
        assert_eq!(
            &payload[..],
            b"{\"H\":\"Elegoo\",\"N\":4,\"D1\":255,\"D2\":-255}\n"
        );
    }

    #[test]
    fn turn_command_encodes_direction_and_clamps_speed() {
        assert_eq!(
            &turn_command(TurnDirection::Left, 75)[..],
            b"{\"H\":\"Elegoo\",\"N\":3,\"D1\":1,\"D2\":75}\n"
        );
        assert_eq!(
            &turn_command(TurnDirection::Right, 400)[..],
            b"{\"H\":\"Elegoo\",\"N\":3,\"D1\":2,\"D2\":255}\n"
        );
    }

    #[test]
    fn heartbeat_is_exact_literal() {
        assert_eq!(&heartbeat()[..], b"{Heartbeat}\n");
    }

    #[test]
    fn encoding_is_deterministic() {
        let set = CommandSet::default();
        assert_eq!(
            set.for_action(DriveAction::Left),
            turn_command(TurnDirection::Left, TURNING_SPEED)
        );
        assert_eq!(move_command(100, 100), move_command(100, 100));
        assert_eq!(
            set.for_action(DriveAction::Forward),
            set.for_action(DriveAction::Forward)
        );
    }

    #[test]
    fn backward_is_built_but_unmapped() {
        let set = CommandSet::default();
        assert_eq!(
            &set.backward()[..],
            b"{\"H\":\"Elegoo\",\"N\":4,\"D1\":-100,\"D2\":-100}\n"
        );
        assert_eq!(DriveAction::parse("BACKWARD"), None);
    }

    #[test]
    fn parse_known_actions() {
        assert_eq!(DriveAction::parse("STOP"), Some(DriveAction::Stop));
        assert_eq!(DriveAction::parse("FORWARD"), Some(DriveAction::Forward));
        assert_eq!(DriveAction::parse("LEFT"), Some(DriveAction::Left));
        assert_eq!(DriveAction::parse("RIGHT"), Some(DriveAction::Right));
        assert_eq!(DriveAction::parse("forward"), None);
    }
}
