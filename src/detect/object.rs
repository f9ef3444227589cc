use serde::{Deserialize, Serialize};

/// One detection reported by the external detector.
///
/// On the wire confidence arrives as an integer `percent` (0–100); it is
/// normalised into `[0, 1]` on the way in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireObject")]
pub struct DetectedObject {
    /// Class label.
    pub token: String,
    pub confidence: f32,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Deserialize)]
struct WireObject {
    token: String,
    percent: f32,
    x: i32,
    y: i32,
    width: i32,
    height: i32,
}

impl From<WireObject> for DetectedObject {
    fn from(wire: WireObject) -> Self {
        Self {
            token: wire.token,
            confidence: (wire.percent / 100.0).clamp(0.0, 1.0),
            x: wire.x,
            y: wire.y,
            width: wire.width,
            height: wire.height,
        }
    }
}

/// Parse one complete detector response.
pub fn parse_response(body: &[u8]) -> serde_json::Result<Vec<DetectedObject>> {
    serde_json::from_slice(body)
}
