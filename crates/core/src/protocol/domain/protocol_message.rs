use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A `detected` report from the worker.
///
/// Each entry in `humans` is kept as the worker's raw JSON object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub count: u32,
    pub humans: Vec<Value>,
    pub timestamp: Option<String>,
}

/// One structured message from the worker's stdout.
#[derive(Clone, Debug, PartialEq)]
pub enum ProtocolMessage {
    /// Worker initialized. `method` echoes the detector it loaded.
    Ready { method: Option<String> },
    /// Detection pass result. Only terminal when `count > 0`.
    Detected(DetectionReport),
    /// Worker-reported failure. Always terminal.
    Error(String),
    /// Any other `status` value, e.g. `emotion_detector_ready`.
    Notice(String),
}

/// Result of decoding one line.
#[derive(Clone, Debug, PartialEq)]
pub enum Decoded {
    Message(ProtocolMessage),
    /// Anything that is not a recognized message, passed through verbatim.
    Diagnostic(String),
}

#[derive(Deserialize)]
struct WireMessage {
    status: Option<String>,
    error: Option<Value>,
    method: Option<String>,
    count: Option<i64>,
    humans: Option<Vec<Value>>,
    timestamp: Option<String>,
}

/// Decodes one line of worker output.
///
/// Never fails: malformed or unrecognized input comes back as
/// [`Decoded::Diagnostic`] so it can be logged instead of acted on.
pub fn decode(line: &str) -> Decoded {
    match serde_json::from_str::<WireMessage>(line.trim()) {
        Ok(wire) => match classify(wire) {
            Some(message) => Decoded::Message(message),
            None => Decoded::Diagnostic(line.to_string()),
        },
        Err(_) => Decoded::Diagnostic(line.to_string()),
    }
}

fn classify(wire: WireMessage) -> Option<ProtocolMessage> {
    if let Some(error) = wire.error {
        let reason = match error {
            Value::String(reason) => reason,
            other => other.to_string(),
        };
        return Some(ProtocolMessage::Error(reason));
    }

    match wire.status.as_deref()? {
        "ready" => Some(ProtocolMessage::Ready {
            method: wire.method,
        }),
        "detected" => {
            let count = u32::try_from(wire.count?).ok()?;
            if count == 0 {
                return Some(ProtocolMessage::Detected(DetectionReport {
                    count,
                    humans: wire.humans.unwrap_or_default(),
                    timestamp: wire.timestamp,
                }));
            }
            Some(ProtocolMessage::Detected(DetectionReport {
                count,
                humans: wire.humans?,
                timestamp: Some(wire.timestamp?),
            }))
        }
        other => Some(ProtocolMessage::Notice(other.to_string())),
    }
}
