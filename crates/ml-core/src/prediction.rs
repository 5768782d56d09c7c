use serde::{Deserialize, Serialize};

use crate::error::InferenceError;

/// Single bounding box returned by the remote detector, center-anchored in
/// frame pixels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    center_x: f64,
    center_y: f64,
    width: f64,
    height: f64,
    label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    confidence: Option<f64>,
}

impl Prediction {
    pub fn new(
        center_x: f64,
        center_y: f64,
        width: f64,
        height: f64,
        label: impl Into<String>,
        confidence: Option<f64>,
    ) -> Self {
        Self {
            center_x,
            center_y,
            width,
            height,
            label: label.into(),
            confidence,
        }
    }

    pub fn center_x(&self) -> f64 {
        self.center_x
    }

    pub fn center_y(&self) -> f64 {
        self.center_y
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn confidence(&self) -> Option<f64> {
        self.confidence
    }

    /// Top-left corner and size as `[left, top, width, height]`.
    pub fn bbox_ltwh(&self) -> [f64; 4] {
        [
            self.center_x - self.width / 2.0,
            self.center_y - self.height / 2.0,
            self.width,
            self.height,
        ]
    }
}

#[derive(Deserialize)]
struct RawResponse {
    #[serde(default)]
    predictions: Option<Vec<RawPrediction>>,
}

#[derive(Deserialize)]
struct RawPrediction {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    class: String,
    #[serde(default)]
    confidence: Option<f64>,
}

impl TryFrom<RawPrediction> for Prediction {
    type Error = InferenceError;

    fn try_from(raw: RawPrediction) -> Result<Self, Self::Error> {
        let numbers = [raw.x, raw.y, raw.width, raw.height];
        if numbers.iter().any(|v| !v.is_finite()) {
            return Err(InferenceError::invalid("prediction coordinates must be finite"));
        }
        if raw.width < 0.0 || raw.height < 0.0 {
            return Err(InferenceError::invalid(format!(
                "prediction {:?} has negative size {}x{}",
                raw.class, raw.width, raw.height
            )));
        }
        if raw.confidence.is_some_and(|c| !c.is_finite()) {
            return Err(InferenceError::invalid("prediction confidence must be finite"));
        }
        Ok(Prediction::new(
            raw.x,
            raw.y,
            raw.width,
            raw.height,
            raw.class,
            raw.confidence,
        ))
    }
}

/// Parse a detector response body. A missing, `null`, or empty `predictions`
/// field means nothing was detected.
pub fn parse_predictions(body: &[u8]) -> Result<Vec<Prediction>, InferenceError> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|err| InferenceError::invalid(format!("malformed detector response: {err}")))?;
    if !value.is_object() {
        return Err(InferenceError::invalid("detector response is not a JSON object"));
    }
    let raw: RawResponse = serde_json::from_value(value)
        .map_err(|err| InferenceError::invalid(format!("unexpected detector response: {err}")))?;
    raw.predictions
        .unwrap_or_default()
        .into_iter()
        .map(Prediction::try_from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_missing_and_null_mean_no_detection() {
        assert!(parse_predictions(br#"{"predictions": []}"#).unwrap().is_empty());
        assert!(parse_predictions(br#"{}"#).unwrap().is_empty());
        assert!(parse_predictions(br#"{"predictions": null, "time": 0.1}"#)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn parses_boxes_in_order() {
        let body = br#"{
            "time": 0.05,
            "image": {"width": 640, "height": 480},
            "predictions": [
                {"x": 100, "y": 50, "width": 40, "height": 60, "class": "person", "confidence": 0.91},
                {"x": 300.5, "y": 200, "width": 10, "height": 12, "class": "person"}
            ]
        }"#;
        let predictions = parse_predictions(body).unwrap();
        assert_eq!(predictions.len(), 2);
        assert_eq!(predictions[0].center_x(), 100.0);
        assert_eq!(predictions[0].center_y(), 50.0);
        assert_eq!(predictions[0].label(), "person");
        assert_eq!(predictions[0].confidence(), Some(0.91));
        assert_eq!(predictions[1].confidence(), None);
        assert_eq!(predictions[0].bbox_ltwh(), [80.0, 20.0, 40.0, 60.0]);
    }

    #[test]
    fn rejects_malformed_payloads() {
        for body in [
            &b"not json"[..],
            br#"[1, 2, 3]"#,
            br#"{"predictions": [{"x": 1, "y": 2, "width": 3, "class": "fire"}]}"#,
            br#"{"predictions": [{"x": "1", "y": 2, "width": 3, "height": 4, "class": "fire"}]}"#,
            br#"{"predictions": [{"x": 1, "y": 2, "width": 3, "height": 4}]}"#,
            br#"{"predictions": [{"x": 1, "y": 2, "width": -3, "height": 4, "class": "fire"}]}"#,
            br#"{"predictions": {"x": 1}}"#,
        ] {
            let err = parse_predictions(body).unwrap_err();
            assert!(
                matches!(err, InferenceError::InvalidResponse { .. }),
                "{} -> {err}",
                String::from_utf8_lossy(body)
            );
        }
    }

    #[test]
    fn serializes_with_event_field_names() {
        let prediction = Prediction::new(100.0, 50.0, 40.0, 60.0, "person", None);
        let json = serde_json::to_value(&prediction).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "centerX": 100.0,
                "centerY": 50.0,
                "width": 40.0,
                "height": 60.0,
                "label": "person"
            })
        );
    }
}
