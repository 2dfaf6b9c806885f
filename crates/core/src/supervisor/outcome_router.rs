use serde_json::{json, Map, Value};

use crate::shared::constants::TIMEOUT_MESSAGE;
use crate::shared::detection::strip_emotion;
use crate::supervisor::domain::outcome::Outcome;
use crate::supervisor::domain::status::Status;
use crate::supervisor::domain::supervisor_sink::SupervisorSink;
use crate::worker::domain::detection_config::DetectionConfig;

/// Delivers a resolved outcome to the sink.
///
/// Success goes to the detection channel, timeout to the timeout channel,
/// and failure to the error report only. Returns the status to show for
/// the resolution, if any.
pub fn route(
    context: Value,
    config: &DetectionConfig,
    outcome: Outcome,
    sink: &mut dyn SupervisorSink,
) -> Option<Status> {
    match outcome {
        Outcome::Success {
            count,
            detections,
            timestamp,
        } => {
            log::info!("Detected {count} human(s) at {timestamp}");
            sink.detected(detection_message(
                context, config, count, detections, &timestamp,
            ));
            Some(Status::Detected(count))
        }
        Outcome::Timeout => {
            log::info!("No detection before timeout");
            sink.timed_out(timeout_message());
            None
        }
        Outcome::Failure(failure) => {
            log::error!("Detection failed: {failure}");
            sink.failed(&failure);
            Some(Status::Error)
        }
    }
}

/// Caller context with `payload` replaced by the detection result.
///
/// `count` is the worker's own figure. Emotion summaries are dropped unless
/// emotion analysis was requested. A context that is not a JSON object is
/// replaced by a fresh one.
pub fn detection_message(
    context: Value,
    config: &DetectionConfig,
    count: u32,
    mut detections: Vec<Value>,
    timestamp: &str,
) -> Value {
    if !config.emotion {
        strip_emotion(&mut detections);
    }

    let mut message = match context {
        Value::Object(map) => map,
        other => {
            log::debug!("Non-object caller context replaced: {other}");
            Map::new()
        }
    };
    message.insert(
        "payload".to_string(),
        json!({
            "count": count,
            "humans": detections,
            "timestamp": timestamp,
        }),
    );
    Value::Object(message)
}

pub fn timeout_message() -> Value {
    json!({ "payload": TIMEOUT_MESSAGE })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::domain::outcome::WorkerFailure;
    use crate::supervisor::infrastructure::channel_sink::{ChannelSupervisorSink, SinkMessage};

    fn detection(with_emotion: bool) -> Value {
        let mut entry = json!({
            "id": 0,
            "bbox": {"x": 10, "y": 20, "width": 30, "height": 40},
            "confidence": 0.9
        });
        if with_emotion {
            entry["emotion"] = json!({
                "label": "happy",
                "confidence": 0.8,
                "scores": {"happy": 0.8}
            });
        }
        entry
    }

    fn emotion_config(emotion: bool) -> DetectionConfig {
        DetectionConfig {
            emotion,
            ..DetectionConfig::default()
        }
    }

    #[test]
    fn test_payload_replaces_context_field_and_keeps_others() {
        let message = detection_message(
            json!({"topic": "door", "payload": "trigger"}),
            &emotion_config(false),
            1,
            vec![detection(false)],
            "2025-01-01T00:00:00Z",
        );

        assert_eq!(message["topic"], "door");
        assert_eq!(message["payload"]["count"], 1);
        assert_eq!(message["payload"]["timestamp"], "2025-01-01T00:00:00Z");
        assert_eq!(message["payload"]["humans"][0]["bbox"]["width"], 30);
    }

    #[test]
    fn test_emotion_stripped_when_not_requested() {
        let message = detection_message(
            json!({}),
            &emotion_config(false),
            1,
            vec![detection(true)],
            "t",
        );
        assert!(message["payload"]["humans"][0].get("emotion").is_none());
    }

    #[test]
    fn test_emotion_kept_when_requested() {
        let message = detection_message(
            json!({}),
            &emotion_config(true),
            1,
            vec![detection(true)],
            "t",
        );
        assert_eq!(message["payload"]["humans"][0]["emotion"]["label"], "happy");
    }

    #[test]
    fn test_unknown_entry_fields_reach_channel_one() {
        let entry = json!({"id": 0, "bbox": {"x": 10.5, "y": 0, "width": 1, "height": 1}, "confidence": 0.5, "track": 7});
        let message = detection_message(json!({}), &emotion_config(false), 1, vec![entry.clone()], "t");
        assert_eq!(message["payload"]["humans"][0], entry);
    }

    #[test]
    fn test_reported_count_is_kept() {
        let message = detection_message(json!({}), &emotion_config(false), 2, vec![], "t");
        assert_eq!(message["payload"]["count"], 2);
    }

    #[test]
    fn test_non_object_context_is_replaced() {
        let message = detection_message(json!("raw"), &emotion_config(false), 0, vec![], "t");
        assert_eq!(message["payload"]["count"], 0);
        assert_eq!(message.as_object().map(|map| map.len()), Some(1));
    }

    #[test]
    fn test_route_each_outcome_to_one_place() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut sink = ChannelSupervisorSink::new(tx);
        let config = DetectionConfig::default();

        let status = route(
            json!({}),
            &config,
            Outcome::Success {
                count: 2,
                detections: vec![detection(false), detection(false)],
                timestamp: "t".to_string(),
            },
            &mut sink,
        );
        assert_eq!(status, Some(Status::Detected(2)));
        assert!(matches!(rx.try_recv(), Ok(SinkMessage::Detected(_))));

        let status = route(json!({}), &config, Outcome::Timeout, &mut sink);
        assert_eq!(status, None);
        assert_eq!(
            rx.try_recv().unwrap(),
            SinkMessage::TimedOut(json!({"payload": "No human detected within timeout period"}))
        );

        let status = route(
            json!({}),
            &config,
            Outcome::Failure(WorkerFailure::Reported("camera not found".to_string())),
            &mut sink,
        );
        assert_eq!(status, Some(Status::Error));
        assert_eq!(
            rx.try_recv().unwrap(),
            SinkMessage::Failed("camera not found".to_string())
        );
        assert!(rx.try_recv().is_err());
    }
}
