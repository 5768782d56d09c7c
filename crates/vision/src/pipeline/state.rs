//! Mode state machine and the hazard result it gates.

use ml_core::DetectionMode;
use serde::Serialize;

/// Outcome of the last completed cycle: which mode ran and whether it found
/// anything. Holding a single value keeps the hazard flags mutually exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ActiveDetection {
    pub mode: DetectionMode,
    pub is_positive: bool,
}

/// Flag view of [`ActiveDetection`] for display.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DetectionState {
    pub fire_detected: bool,
    pub earthquake_detected: bool,
    pub people_detected: bool,
}

impl DetectionState {
    pub fn positive_count(&self) -> usize {
        [
            self.fire_detected,
            self.earthquake_detected,
            self.people_detected,
        ]
        .into_iter()
        .filter(|flag| *flag)
        .count()
    }
}

#[derive(Debug)]
pub struct ModeController {
    mode: DetectionMode,
    last: Option<ActiveDetection>,
}

impl Default for ModeController {
    fn default() -> Self {
        Self::new(DetectionMode::Fire)
    }
}

impl ModeController {
    pub fn new(initial: DetectionMode) -> Self {
        Self {
            mode: initial,
            last: None,
        }
    }

    pub fn current_mode(&self) -> DetectionMode {
        self.mode
    }

    /// Step to the next mode. The last detection result is left as is.
    pub fn advance(&mut self) -> DetectionMode {
        self.mode = self.mode.next();
        self.mode
    }

    /// Record a finished cycle for `mode`, replacing whatever was shown.
    pub fn apply_result(&mut self, mode: DetectionMode, predictions_non_empty: bool) {
        self.last = Some(ActiveDetection {
            mode,
            is_positive: predictions_non_empty,
        });
    }

    pub fn active_detection(&self) -> Option<ActiveDetection> {
        self.last
    }

    pub fn detection_state(&self) -> DetectionState {
        let mut state = DetectionState::default();
        if let Some(ActiveDetection {
            mode,
            is_positive: true,
        }) = self.last
        {
            match mode {
                DetectionMode::Fire => state.fire_detected = true,
                DetectionMode::Earthquake => state.earthquake_detected = true,
                DetectionMode::People => state.people_detected = true,
            }
        }
        state
    }

    /// Banner text for the hazard indicator.
    pub fn hazard_status(&self) -> &'static str {
        match self.last {
            Some(ActiveDetection {
                mode,
                is_positive: true,
            }) => match mode {
                DetectionMode::Fire => "Fire Detected!",
                DetectionMode::Earthquake => "Earthquake Detected!",
                DetectionMode::People => "People Detected!",
            },
            _ => "No Hazard",
        }
    }

    pub fn headline(&self) -> String {
        format!("Live {} Detection", self.mode)
    }
}
