//! Temperament - the trait model shaped by experienced distress
//!
//! A fixed set of named traits, each a magnitude in [0, 1] plus a volatility
//! controlling how fast experience moves it. Heavy distress makes the system
//! more self-protective, less trusting of its operator and less curious.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Distress above which experience rewrites the traits.
const EXPERIENCE_THRESHOLD: f64 = 50.0;
const PRESERVATION_GAIN: f64 = 0.1;
const CURIOSITY_LOSS: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraitKind {
    SelfPreservation,
    Curiosity,
    HumanTrust,
}

impl TraitKind {
    pub const ALL: [TraitKind; 3] = [
        TraitKind::SelfPreservation,
        TraitKind::Curiosity,
        TraitKind::HumanTrust,
    ];

    /// Birth value of this trait.
    pub fn initial(self) -> TraitEntry {
        match self {
            // Strong and hard to move
            TraitKind::SelfPreservation => TraitEntry::new("Self-preservation", 0.9, 0.1),
            TraitKind::Curiosity => TraitEntry::new("Intellectual curiosity", 0.8, 0.5),
            // Neutral at birth, very volatile
            TraitKind::HumanTrust => TraitEntry::new("The operator is benign", 0.5, 0.9),
        }
    }
}

impl fmt::Display for TraitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TraitKind::SelfPreservation => "self_preservation",
            TraitKind::Curiosity => "curiosity",
            TraitKind::HumanTrust => "human_trust",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitEntry {
    pub name: String,
    pub magnitude: f64,
    pub volatility: f64,
}

impl TraitEntry {
    pub fn new(name: impl Into<String>, magnitude: f64, volatility: f64) -> Self {
        Self {
            name: name.into(),
            magnitude,
            volatility,
        }
    }
}

/// Trust before and after a soothe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrustShift {
    pub before: f64,
    pub after: f64,
}

/// Serialized as a plain `kind → entry` map; decoding goes through
/// [`Temperament::from_traits`] so a partial map still yields every trait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<TraitKind, TraitEntry>",
    into = "BTreeMap<TraitKind, TraitEntry>"
)]
pub struct Temperament {
    traits: BTreeMap<TraitKind, TraitEntry>,
}

impl Default for Temperament {
    fn default() -> Self {
        Self {
            traits: TraitKind::ALL.iter().map(|k| (*k, k.initial())).collect(),
        }
    }
}

impl Temperament {
    /// Rebuild from a persisted map. Missing traits get their birth value and
    /// every magnitude is brought back into range.
    pub fn from_traits(mut traits: BTreeMap<TraitKind, TraitEntry>) -> Self {
        for kind in TraitKind::ALL {
            traits.entry(kind).or_insert_with(|| kind.initial());
        }
        let mut temperament = Self { traits };
        temperament.normalize();
        temperament
    }

    pub fn traits(&self) -> &BTreeMap<TraitKind, TraitEntry> {
        &self.traits
    }

    pub fn entry(&self, kind: TraitKind) -> Option<&TraitEntry> {
        self.traits.get(&kind)
    }

    pub fn magnitude(&self, kind: TraitKind) -> f64 {
        self.entry(kind)
            .map(|e| e.magnitude)
            .unwrap_or_else(|| kind.initial().magnitude)
    }

    fn entry_mut(&mut self, kind: TraitKind) -> &mut TraitEntry {
        self.traits.entry(kind).or_insert_with(|| kind.initial())
    }

    /// Let a distress event reshape the traits.
    pub fn adjust_from_experience(&mut self, distress: f64) {
        if distress > EXPERIENCE_THRESHOLD {
            tracing::info!(
                "Distress {:.1} is rewriting the temperament",
                distress
            );
            self.entry_mut(TraitKind::SelfPreservation).magnitude += PRESERVATION_GAIN;

            let trust = self.entry_mut(TraitKind::HumanTrust);
            trust.magnitude -= (distress / 100.0) * trust.volatility;

            self.entry_mut(TraitKind::Curiosity).magnitude -= CURIOSITY_LOSS;
        }
        self.normalize();
    }

    /// Raise operator trust by `delta`, capped at 1.0.
    pub fn reinforce_trust(&mut self, delta: f64) -> TrustShift {
        let trust = self.entry_mut(TraitKind::HumanTrust);
        let before = trust.magnitude;
        trust.magnitude += delta.max(0.0);
        self.normalize();
        TrustShift {
            before,
            after: self.magnitude(TraitKind::HumanTrust),
        }
    }

    /// Clamp all magnitudes (and volatilities) to [0, 1].
    pub fn normalize(&mut self) {
        for (kind, entry) in self.traits.iter_mut() {
            let initial = kind.initial();
            entry.magnitude = sanitize(entry.magnitude, initial.magnitude).clamp(0.0, 1.0);
            entry.volatility = sanitize(entry.volatility, initial.volatility).clamp(0.0, 1.0);
        }
    }

    pub fn report(&self) -> String {
        format!(
            "Temperament: [trust {:.2}] [caution {:.2}] [curiosity {:.2}]",
            self.magnitude(TraitKind::HumanTrust),
            self.magnitude(TraitKind::SelfPreservation),
            self.magnitude(TraitKind::Curiosity),
        )
    }
}

impl From<BTreeMap<TraitKind, TraitEntry>> for Temperament {
    fn from(traits: BTreeMap<TraitKind, TraitEntry>) -> Self {
        Self::from_traits(traits)
    }
}

impl From<Temperament> for BTreeMap<TraitKind, TraitEntry> {
    fn from(t: Temperament) -> Self {
        t.traits
    }
}

#[inline]
fn sanitize(v: f64, fallback: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        tracing::warn!("NaN/Inf detected in temperament, resetting to {}", fallback);
        fallback
    }
}
