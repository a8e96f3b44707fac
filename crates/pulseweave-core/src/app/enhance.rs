//! Enhance - event データからの結果拡張
//!
//! Predictor の出力に、ASR event 由来の分析（タグ、優先度、話者、音質など）を付け足す。
//! 純粋関数なので worker からも単体テストからもそのまま呼べる。

use crate::domain::outcome::{
    AudioQuality, AudioQualityAssessment, EnhancedNlu, EventAnalysis, SpeakerInsights,
};
use crate::domain::request::AudioFeatures;
use crate::domain::{EventData, EventInsights, Prediction, PriorityLevel};

const HIGH_CONFIDENCE: f64 = 0.8;
const LOW_CONFIDENCE: f64 = 0.4;

pub fn analyze(prediction: &Prediction, event: &EventData) -> EventInsights {
    EventInsights {
        extracted_entities: event.entities.clone(),
        suggested_tags: suggested_tags(prediction, event),
        priority_level: priority_level(prediction.confidence),
        reminder_suggestions: prediction
            .potential_omissions
            .iter()
            .map(|o| format!("记得确认{o}"))
            .collect(),
        event_analysis: EventAnalysis {
            has_speakers: !event.speakers.is_empty(),
            speaker_count: event.speakers.len(),
            has_audio_features: event.audio_features.is_some(),
            contains_pii: event.privacy.as_ref().is_some_and(|p| p.contains_pii),
            event_duration_sec: event.end_offset_sec - event.start_offset_sec,
        },
        speaker_insights: speaker_insights(event),
        audio_quality_assessment: event.audio_features.as_ref().map(assess_audio),
        enhanced_nlu: event.nlu.as_ref().map(|nlu| EnhancedNlu {
            intents: nlu.intents.clone(),
            summary: nlu
                .summary
                .clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| prediction.summary_text.clone()),
        }),
    }
}

/// Event tags first, then the predicted task type if it is not already there.
fn suggested_tags(prediction: &Prediction, event: &EventData) -> Vec<String> {
    let mut tags = event.tags.clone();
    if !tags.contains(&prediction.task_type) {
        tags.push(prediction.task_type.clone());
    }
    tags
}

fn priority_level(confidence: f64) -> PriorityLevel {
    if confidence > HIGH_CONFIDENCE {
        PriorityLevel::High
    } else if confidence < LOW_CONFIDENCE {
        PriorityLevel::Low
    } else {
        PriorityLevel::Medium
    }
}

fn speaker_insights(event: &EventData) -> Option<SpeakerInsights> {
    if event.speakers.is_empty() {
        return None;
    }
    let primary = event
        .speakers
        .first()
        .and_then(|s| s.speaker_label.clone())
        .unwrap_or_else(|| "unknown".to_string());

    Some(SpeakerInsights {
        total_speakers: event.speakers.len(),
        user_speakers: event.speakers.iter().filter(|s| s.is_user).count(),
        multi_speaker: event.speakers.len() > 1,
        primary_speaker: primary,
    })
}

fn assess_audio(features: &AudioFeatures) -> AudioQualityAssessment {
    let asr = features.asr_confidence.unwrap_or(1.0);
    let snr = features.snr_db.unwrap_or(f64::INFINITY);

    let overall_quality = if asr < 0.7 || snr < 10.0 {
        AudioQuality::Poor
    } else if asr < 0.85 {
        AudioQuality::Fair
    } else {
        AudioQuality::Good
    };

    AudioQualityAssessment {
        overall_quality,
        asr_confidence: features.asr_confidence,
        snr_db: features.snr_db,
        language: features.language.clone(),
        speech_rate_wpm: features.speech_rate_wpm,
    }
}
