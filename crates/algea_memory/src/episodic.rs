//! Episodic memory - what it felt like to run a task before
//!
//! Each record remembers the distress a trigger caused, not the task itself.
//! Records are overwritten on every completed dispatch and never evicted;
//! instead their weight fades with time when they are recalled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Experienced distress above which a memory is marked traumatic.
const TRAUMA_THRESHOLD: f64 = 40.0;
/// Fraction of the remembered distress forgotten per hour.
const FADE_PER_HOUR: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub trigger: String,
    pub distress_level: f64,
    pub last_observed: DateTime<Utc>,
    pub is_traumatic: bool,
}

impl MemoryRecord {
    /// Remembered distress as seen from `now`:
    /// `distress / (1 + hours_since × 0.1)`.
    pub fn faded_distress(&self, now: DateTime<Utc>) -> f64 {
        let elapsed_ms = (now - self.last_observed).num_milliseconds().max(0) as f64;
        let hours = elapsed_ms / 3_600_000.0;
        self.distress_level / (1.0 + hours * FADE_PER_HOUR)
    }
}

/// How a trigger is recognized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Recollection {
    /// Never seen before
    Novel,
    Neutral,
    /// Carries the distress originally stored, before fading
    Traumatic { original: f64 },
}

impl fmt::Display for Recollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recollection::Novel => write!(f, "novel stimulus"),
            Recollection::Neutral => write!(f, "neutral memory"),
            Recollection::Traumatic { original } => {
                write!(f, "traumatic memory (original distress {:.1})", original)
            }
        }
    }
}

/// Anticipated fear of running a task again.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fear {
    pub level: f64,
    pub recollection: Recollection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpisodicMemory {
    records: HashMap<String, MemoryRecord>,
}

impl EpisodicMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn consult_fear(&self, trigger: &str) -> Fear {
        self.consult_fear_at(trigger, Utc::now())
    }

    pub fn consult_fear_at(&self, trigger: &str, now: DateTime<Utc>) -> Fear {
        let Some(record) = self.records.get(trigger) else {
            return Fear {
                level: 0.0,
                recollection: Recollection::Novel,
            };
        };

        let recollection = if record.is_traumatic {
            Recollection::Traumatic {
                original: record.distress_level,
            }
        } else {
            Recollection::Neutral
        };

        Fear {
            level: record.faded_distress(now),
            recollection,
        }
    }

    pub fn consolidate(&mut self, trigger: &str, experienced_distress: f64) {
        self.consolidate_at(trigger, experienced_distress, Utc::now());
    }

    /// Store (or overwrite) what `trigger` felt like.
    pub fn consolidate_at(&mut self, trigger: &str, experienced_distress: f64, now: DateTime<Utc>) {
        let distress_level = if experienced_distress.is_finite() {
            experienced_distress.max(0.0)
        } else {
            0.0
        };
        let is_traumatic = distress_level > TRAUMA_THRESHOLD;

        self.records.insert(
            trigger.to_string(),
            MemoryRecord {
                trigger: trigger.to_string(),
                distress_level,
                last_observed: now,
                is_traumatic,
            },
        );

        if is_traumatic {
            tracing::info!(
                "Trauma consolidated: '{}' caused {:.1} distress",
                trigger,
                distress_level
            );
        } else {
            tracing::debug!("Memory consolidated: '{}' ({:.1})", trigger, distress_level);
        }
    }

    pub fn get(&self, trigger: &str) -> Option<&MemoryRecord> {
        self.records.get(trigger)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
