//! Prediction output and the enriched result stored on a completed task.

use serde::{Deserialize, Serialize};

use super::request::Entity;

/// What a predictor returns for one input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub task_type: String,

    /// 0.0 ..= 1.0
    pub confidence: f64,

    #[serde(default)]
    pub potential_omissions: Vec<String>,

    #[serde(default)]
    pub latency_ms: u64,

    pub model_version: String,

    #[serde(default)]
    pub summary_text: String,

    #[serde(default)]
    pub suggested_plan: String,
}

/// Extra analysis derived from the request's event data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventInsights {
    pub extracted_entities: Vec<Entity>,
    pub suggested_tags: Vec<String>,
    pub priority_level: PriorityLevel,
    pub reminder_suggestions: Vec<String>,
    pub event_analysis: EventAnalysis,
    pub speaker_insights: Option<SpeakerInsights>,
    pub audio_quality_assessment: Option<AudioQualityAssessment>,
    pub enhanced_nlu: Option<EnhancedNlu>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityLevel {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventAnalysis {
    pub has_speakers: bool,
    pub speaker_count: usize,
    pub has_audio_features: bool,
    pub contains_pii: bool,
    pub event_duration_sec: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerInsights {
    pub total_speakers: usize,
    pub user_speakers: usize,
    pub multi_speaker: bool,
    pub primary_speaker: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioQuality {
    Good,
    Fair,
    Poor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioQualityAssessment {
    pub overall_quality: AudioQuality,
    pub asr_confidence: Option<f64>,
    pub snr_db: Option<f64>,
    pub language: Option<String>,
    pub speech_rate_wpm: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedNlu {
    pub intents: Vec<serde_json::Value>,
    pub summary: String,
}

/// Final result of a completed task: the prediction, plus event insights
/// when the request carried event data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferResult {
    #[serde(flatten)]
    pub prediction: Prediction,

    #[serde(flatten)]
    pub insights: Option<EventInsights>,
}

impl InferResult {
    /// Flattened JSON object stored as the task's `result`.
    pub fn into_value(self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(&self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction() -> Prediction {
        Prediction {
            task_type: "trip".into(),
            confidence: 0.7,
            potential_omissions: vec!["tickets".into()],
            latency_ms: 1,
            model_version: "dummy:v1".into(),
            summary_text: String::new(),
            suggested_plan: String::new(),
        }
    }

    #[test]
    fn plain_result_is_flat() {
        let value = InferResult {
            prediction: prediction(),
            insights: None,
        }
        .into_value()
        .unwrap();
        assert_eq!(value["task_type"], "trip");
        assert!(value.get("priority_level").is_none());
    }

    #[test]
    fn insights_are_flattened_next_to_prediction() {
        let value = InferResult {
            prediction: prediction(),
            insights: Some(EventInsights {
                extracted_entities: vec![],
                suggested_tags: vec!["trip".into()],
                priority_level: PriorityLevel::Medium,
                reminder_suggestions: vec![],
                event_analysis: EventAnalysis {
                    has_speakers: false,
                    speaker_count: 0,
                    has_audio_features: false,
                    contains_pii: false,
                    event_duration_sec: 0.0,
                },
                speaker_insights: None,
                audio_quality_assessment: None,
                enhanced_nlu: None,
            }),
        }
        .into_value()
        .unwrap();
        assert_eq!(value["task_type"], "trip");
        assert_eq!(value["priority_level"], "medium");
        assert_eq!(value["suggested_tags"][0], "trip");
    }
}
