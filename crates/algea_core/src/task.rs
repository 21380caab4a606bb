use serde::{Deserialize, Serialize};

/// A unit of work routed to a single worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Task identifier; also the trigger under which its distress is remembered
    pub id: String,
    pub payload: String,
    /// Complexity in [0, 1]; the source of worker load
    pub magnitude: f64,
}

impl Task {
    pub fn new(id: impl Into<String>, magnitude: f64) -> Self {
        Self {
            id: id.into(),
            payload: "execute".to_string(),
            magnitude: clamp_magnitude(magnitude),
        }
    }
}

fn clamp_magnitude(m: f64) -> f64 {
    if m.is_finite() {
        m.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Map a user-facing 1-10 complexity onto the [0, 1] magnitude scale.
pub fn complexity_from_scale(level: u8) -> f64 {
    clamp_magnitude(level as f64 / 10.0)
}
