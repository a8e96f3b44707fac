//! KeywordPredictor - キーワード一致による開発用 Predictor
//!
//! 本物のモデルを呼ばずに end-to-end を動かすためのもの。
//! 各ラベルのキーワード出現数で最も多いものを選び（同数なら後のラベル）、
//! confidence = min(1.0, 0.5 + 0.1 * hits) とする。

use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::domain::{EventData, PredictError, Prediction};
use crate::ports::Predictor;

const MODEL_VERSION: &str = "dummy:v1";
const DEFAULT_LABEL: &str = "meeting";

struct Label {
    name: &'static str,
    keywords: &'static [&'static str],
    omissions: &'static [&'static str],
}

const LABELS: &[Label] = &[
    Label {
        name: "meeting",
        keywords: &["会议", "开会", "会议室", "PPT", "议程"],
        omissions: &["attendees", "room", "agenda", "materials"],
    },
    Label {
        name: "shopping",
        keywords: &["买", "购买", "购物", "订单", "价格"],
        omissions: &["quantity", "budget"],
    },
    Label {
        name: "trip",
        keywords: &["机场", "车票", "机票", "出差", "旅行"],
        omissions: &["tickets", "weather"],
    },
    Label {
        name: "pickup",
        keywords: &["接", "接人", "校门", "车站"],
        omissions: &["person_name", "time_window"],
    },
];

#[derive(Debug, Clone, Default)]
pub struct KeywordPredictor {
    /// Artificial delay before answering.
    latency: Duration,
}

impl KeywordPredictor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }

    /// More hits always win; on a tie the later label in `LABELS` wins.
    fn classify(text: &str) -> Prediction {
        let mut best: Option<(&Label, usize)> = None;
        for label in LABELS {
            let hits = label.keywords.iter().filter(|k| text.contains(*k)).count();
            if hits > 0 && best.is_none_or(|(_, h)| hits >= h) {
                best = Some((label, hits));
            }
        }

        let (name, hits, omissions) = match best {
            Some((label, hits)) => (label.name, hits, label.omissions),
            None => {
                let default = LABELS.iter().find(|l| l.name == DEFAULT_LABEL);
                (DEFAULT_LABEL, 0, default.map(|l| l.omissions).unwrap_or(&[]))
            }
        };

        Prediction {
            task_type: name.to_string(),
            confidence: (0.5 + hits as f64 * 0.1).min(1.0),
            potential_omissions: omissions.iter().map(|s| s.to_string()).collect(),
            latency_ms: 0,
            model_version: MODEL_VERSION.to_string(),
            summary_text: String::new(),
            suggested_plan: String::new(),
        }
    }
}

#[async_trait]
impl Predictor for KeywordPredictor {
    async fn predict(
        &self,
        text: &str,
        _event: Option<&EventData>,
    ) -> Result<Prediction, PredictError> {
        let start = Instant::now();
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let mut prediction = Self::classify(text);
        prediction.latency_ms = start.elapsed().as_millis() as u64;
        Ok(prediction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("订明天去机场的车票", "trip")]
    #[case("下午三点开会，准备PPT", "meeting")]
    #[case("帮我购买两箱牛奶", "shopping")]
    #[case("五点去校门接人", "pickup")]
    #[case("今天天气不错", "meeting")]
    #[case("买机票", "trip")]
    #[tokio::test]
    async fn classifies_by_keywords(#[case] text: &str, #[case] expected: &str) {
        let p = KeywordPredictor::new().predict(text, None).await.unwrap();
        assert_eq!(p.task_type, expected);
        assert_eq!(p.model_version, "dummy:v1");
    }

    #[tokio::test]
    async fn confidence_grows_with_hits() {
        let p = KeywordPredictor::new()
            .predict("订明天去机场的车票", None)
            .await
            .unwrap();
        assert!((p.confidence - 0.7).abs() < 1e-9);
        assert_eq!(p.potential_omissions, vec!["tickets", "weather"]);

        let none = KeywordPredictor::new().predict("随便说说", None).await.unwrap();
        assert!((none.confidence - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn latency_is_reported() {
        let p = KeywordPredictor::with_latency(Duration::from_millis(30))
            .predict("开会", None)
            .await
            .unwrap();
        assert!(p.latency_ms >= 30);
    }
}
