use chrono::{DateTime, Utc};

use crate::models::{Alert, AlertSeverity, SESSION_COMPRESSION_LIMIT};

pub const STABLE_MESSAGE: &str = "CPR technique is stable! Keep this rhythm.";
pub const UNSTABLE_MESSAGE: &str = "CPR technique is unstable! Work on consistency.";
pub const TRENDING_SHALLOW_MESSAGE: &str = "Compressions trending shallow. Push deeper.";
pub const TRENDING_DEEP_MESSAGE: &str = "Compressions trending too deep. Ease the pressure.";
pub const AWAITING_MESSAGE: &str = "Waiting for CPR technique analysis...";

pub const SESSION_RESET_MESSAGE: &str = "Session reset manually.";

/// Default text for the backend's automatic close-out at the compression limit.
pub fn session_complete_message() -> String {
    format!("{SESSION_COMPRESSION_LIMIT} compressions reached! Session reset automatically.")
}

/// Severity and message for a model class index. Anything outside the four
/// known classes, including no classification at all, is the "awaiting"
/// warning.
pub fn severity_and_message(class_index: Option<u32>) -> (AlertSeverity, &'static str) {
    match class_index {
        Some(0) => (AlertSeverity::Success, STABLE_MESSAGE),
        Some(1) => (AlertSeverity::Danger, UNSTABLE_MESSAGE),
        Some(2) => (AlertSeverity::Warning, TRENDING_SHALLOW_MESSAGE),
        Some(3) => (AlertSeverity::Warning, TRENDING_DEEP_MESSAGE),
        _ => (AlertSeverity::Warning, AWAITING_MESSAGE),
    }
}

/// Alert for a class index, stamped with the given time.
pub fn classify_at(class_index: Option<u32>, timestamp: DateTime<Utc>) -> Alert {
    let (severity, message) = severity_and_message(class_index);
    Alert::new(severity, message, timestamp)
}

pub fn classify(class_index: Option<u32>) -> Alert {
    classify_at(class_index, Utc::now())
}

/// Success alert raised when the session is cleared, either by the backend's
/// automatic close-out or by a reset. A server-supplied message takes
/// precedence over the default text.
pub fn session_cleared_alert(server_message: Option<&str>, default_message: &str) -> Alert {
    let message = server_message
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .unwrap_or(default_message);
    Alert::new(AlertSeverity::Success, message, Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fixed_table_for_known_classes() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();

        let stable = classify_at(Some(0), at);
        assert_eq!(stable.severity, AlertSeverity::Success);
        assert_eq!(stable.message, STABLE_MESSAGE);
        assert_eq!(stable.timestamp, at);

        assert_eq!(classify_at(Some(1), at).severity, AlertSeverity::Danger);
        assert_eq!(classify_at(Some(2), at).message, TRENDING_SHALLOW_MESSAGE);
        assert_eq!(classify_at(Some(2), at).severity, AlertSeverity::Warning);
        assert_eq!(classify_at(Some(3), at).message, TRENDING_DEEP_MESSAGE);
        assert_eq!(classify_at(Some(3), at).severity, AlertSeverity::Warning);
    }

    #[test]
    fn unknown_or_absent_class_is_awaiting_warning() {
        for input in [None, Some(4), Some(17), Some(u32::MAX)] {
            let (severity, message) = severity_and_message(input);
            assert_eq!(severity, AlertSeverity::Warning);
            assert_eq!(message, AWAITING_MESSAGE);
        }
    }

    #[test]
    fn classification_is_pure() {
        let at = Utc.with_ymd_and_hms(2026, 5, 6, 7, 8, 9).unwrap();
        for input in [None, Some(0), Some(1), Some(2), Some(3), Some(9)] {
            assert_eq!(classify_at(input, at), classify_at(input, at));
        }
    }

    #[test]
    fn cleared_alert_prefers_server_text() {
        let alert = session_cleared_alert(Some("Reset by operator"), SESSION_RESET_MESSAGE);
        assert_eq!(alert.severity, AlertSeverity::Success);
        assert_eq!(alert.message, "Reset by operator");

        let fallback = session_cleared_alert(Some("   "), &session_complete_message());
        assert_eq!(fallback.message, "120 compressions reached! Session reset automatically.");
        assert_eq!(session_cleared_alert(None, SESSION_RESET_MESSAGE).message, SESSION_RESET_MESSAGE);
    }
}
