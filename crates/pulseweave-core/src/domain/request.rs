//! Request payload: plain text or a full ASR event.

use serde::{Deserialize, Serialize};

use super::errors::ValidationError;

/// Payload carried by a `submit_task` request.
///
/// Either `text` or `event.transcript` must be non-blank. When both are
/// present `text` wins as predictor input, and the event is still used for
/// result enhancement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<EventData>,
}

impl InferRequest {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            event: None,
        }
    }

    /// Decode and validate a raw `data` object.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ValidationError> {
        if !value.is_object() {
            return Err(ValidationError::NotAnObject);
        }
        let request: InferRequest =
            serde_json::from_value(value).map_err(|e| ValidationError::Decode(e.to_string()))?;
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.input_text() {
            Some(_) => Ok(()),
            None => Err(ValidationError::MissingInput),
        }
    }

    /// Text handed to the predictor, trimmed.
    pub fn input_text(&self) -> Option<&str> {
        let from_text = self.text.as_deref().map(str::trim).filter(|t| !t.is_empty());
        from_text.or_else(|| {
            self.event
                .as_ref()
                .and_then(|e| e.transcript.as_deref())
                .map(str::trim)
                .filter(|t| !t.is_empty())
        })
    }
}

/// One ASR event as produced by the transcription feed.
///
/// Only the fields the enhancement step reads are typed; everything else is
/// kept verbatim in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,

    #[serde(default)]
    pub start_offset_sec: f64,

    #[serde(default)]
    pub end_offset_sec: f64,

    #[serde(default)]
    pub speakers: Vec<Speaker>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_features: Option<AudioFeatures>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nlu: Option<Nlu>,

    #[serde(default)]
    pub entities: Vec<Entity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy: Option<Privacy>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Speaker {
    #[serde(default)]
    pub speaker_id: Option<String>,
    #[serde(default)]
    pub speaker_label: Option<String>,
    #[serde(default)]
    pub is_user: bool,
    #[serde(default)]
    pub speaker_confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatures {
    #[serde(default)]
    pub avg_volume_db: Option<f64>,
    #[serde(default)]
    pub snr_db: Option<f64>,
    #[serde(default)]
    pub speech_rate_wpm: Option<f64>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub asr_confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Nlu {
    #[serde(default)]
    pub intents: Vec<serde_json::Value>,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "type", default = "Entity::unknown_type")]
    pub kind: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub confidence: f64,
}

impl Entity {
    fn unknown_type() -> String {
        "unknown".to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Privacy {
    #[serde(default)]
    pub contains_pii: bool,
    #[serde(default)]
    pub pii_types: Vec<String>,
    #[serde(default)]
    pub redaction_suggested: bool,
}
