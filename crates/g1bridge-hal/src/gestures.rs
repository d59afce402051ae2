//! Built-in arm gesture catalogue.
//!
//! A fixed name → action-id table for the pre-programmed arm motions of the
//! G1.  Ids are the firmware's; the table is immutable and resolved without
//! touching the native layer.

/// One named arm gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gesture {
    pub name: &'static str,
    pub id: i32,
}

/// Every gesture the arm service accepts.
pub const GESTURES: &[Gesture] = &[
    Gesture { name: "release_arm", id: 99 },
    Gesture { name: "two_hand_kiss", id: 11 },
    Gesture { name: "left_kiss", id: 12 },
    Gesture { name: "right_kiss", id: 13 },
    Gesture { name: "hands_up", id: 15 },
    Gesture { name: "clap", id: 17 },
    Gesture { name: "high_five", id: 18 },
    Gesture { name: "hug", id: 19 },
    Gesture { name: "heart", id: 20 },
    Gesture { name: "right_heart", id: 21 },
    Gesture { name: "reject", id: 22 },
    Gesture { name: "right_hand_up", id: 23 },
    Gesture { name: "x_ray", id: 24 },
    Gesture { name: "face_wave", id: 25 },
    Gesture { name: "high_wave", id: 26 },
    Gesture { name: "shake_hand", id: 27 },
];

/// Look up a gesture id by exact name.
pub fn gesture_id(name: &str) -> Option<i32> {
    GESTURES.iter().find(|g| g.name == name).map(|g| g.id)
}

/// All gesture names, sorted alphabetically.
pub fn gesture_names() -> Vec<&'static str> {
    let mut names: Vec<_> = GESTURES.iter().map(|g| g.name).collect();
    names.sort_unstable();
    names
}
