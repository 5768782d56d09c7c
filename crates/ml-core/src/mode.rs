//! Detection modes, the mode → model table, and per-mode overlay styling.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Hazard category being queried. Exactly one is active at any time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectionMode {
    Fire,
    Earthquake,
    People,
}

impl DetectionMode {
    pub const ALL: [DetectionMode; 3] = [
        DetectionMode::Fire,
        DetectionMode::Earthquake,
        DetectionMode::People,
    ];

    /// Next mode in the fixed Fire → Earthquake → People → Fire cycle.
    pub fn next(self) -> Self {
        match self {
            DetectionMode::Fire => DetectionMode::Earthquake,
            DetectionMode::Earthquake => DetectionMode::People,
            DetectionMode::People => DetectionMode::Fire,
        }
    }

    /// Lowercase identifier used in object keys and metric labels.
    pub fn slug(self) -> &'static str {
        match self {
            DetectionMode::Fire => "fire",
            DetectionMode::Earthquake => "earthquake",
            DetectionMode::People => "people",
        }
    }

    pub fn from_slug(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.slug().eq_ignore_ascii_case(value))
    }

    pub fn style(self) -> ModeStyle {
        match self {
            DetectionMode::Fire => ModeStyle {
                stroke: [255, 0, 0, 255],
                fill: [255, 0, 0, 255],
                label: "FIRE",
            },
            DetectionMode::Earthquake => ModeStyle {
                stroke: [0, 0, 255, 255],
                fill: [0, 0, 255, 255],
                label: "EARTHQUAKE",
            },
            DetectionMode::People => ModeStyle {
                stroke: [0, 255, 0, 255],
                fill: [0, 255, 0, 255],
                label: "PEOPLE",
            },
        }
    }
}

impl fmt::Display for DetectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DetectionMode::Fire => "Fire",
            DetectionMode::Earthquake => "Earthquake",
            DetectionMode::People => "People",
        };
        f.write_str(name)
    }
}

/// RGBA colors and caption used when drawing a mode's detections.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModeStyle {
    pub stroke: [u8; 4],
    pub fill: [u8; 4],
    pub label: &'static str,
}

pub const FIRE_MODEL_ID: &str = "fire-dji3l/2";
pub const EARTHQUAKE_MODEL_ID: &str = "earthquake-dataset-oxnyc/1";
pub const PEOPLE_MODEL_ID: &str = "people-detection-thermal/3";

/// Remote model identifier queried for each mode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelTable {
    pub fire: String,
    pub earthquake: String,
    pub people: String,
}

impl Default for ModelTable {
    fn default() -> Self {
        Self {
            fire: FIRE_MODEL_ID.to_string(),
            earthquake: EARTHQUAKE_MODEL_ID.to_string(),
            people: PEOPLE_MODEL_ID.to_string(),
        }
    }
}

impl ModelTable {
    pub fn model_id(&self, mode: DetectionMode) -> &str {
        match mode {
            DetectionMode::Fire => &self.fire,
            DetectionMode::Earthquake => &self.earthquake,
            DetectionMode::People => &self.people,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_steps_return_to_start() {
        for mode in DetectionMode::ALL {
            assert_eq!(mode.next().next().next(), mode);
            assert_ne!(mode.next(), mode);
        }
    }

    #[test]
    fn default_models_match_modes() {
        let table = ModelTable::default();
        assert_eq!(table.model_id(DetectionMode::Fire), "fire-dji3l/2");
        assert_eq!(
            table.model_id(DetectionMode::Earthquake),
            "earthquake-dataset-oxnyc/1"
        );
        assert_eq!(
            table.model_id(DetectionMode::People),
            "people-detection-thermal/3"
        );
    }

    #[test]
    fn styles_are_distinct_per_mode() {
        let strokes: Vec<_> = DetectionMode::ALL.iter().map(|m| m.style().stroke).collect();
        assert_ne!(strokes[0], strokes[1]);
        assert_ne!(strokes[1], strokes[2]);
        assert_ne!(strokes[0], strokes[2]);
        assert_eq!(DetectionMode::People.style().stroke, [0, 255, 0, 255]);
    }

    #[test]
    fn slug_round_trips_and_serializes_as_name() {
        for mode in DetectionMode::ALL {
            assert_eq!(DetectionMode::from_slug(mode.slug()), Some(mode));
        }
        assert_eq!(DetectionMode::from_slug("PEOPLE"), Some(DetectionMode::People));
        assert_eq!(DetectionMode::from_slug("flood"), None);
        assert_eq!(
            serde_json::to_string(&DetectionMode::People).unwrap(),
            "\"People\""
        );
    }
}
