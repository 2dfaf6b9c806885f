use serde_json::Value;

/// Key of the per-person emotion summary inside a detection entry.
pub const EMOTION_KEY: &str = "emotion";

/// Removes emotion summaries from detection entries.
///
/// Entries are otherwise left exactly as the worker wrote them: unknown
/// fields and fractional coordinates pass through. Entries that are not
/// objects have nothing to strip.
pub fn strip_emotion(entries: &mut [Value]) {
    for entry in entries {
        if let Some(fields) = entry.as_object_mut() {
            fields.remove(EMOTION_KEY);
        }
    }
}
