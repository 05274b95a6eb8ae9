//! User-facing status texts.

use crate::job::JobState;

pub fn received(display_name: &str) -> String {
    format!("Received {display_name}")
}

pub fn queued(position: usize) -> String {
    format!("Queued — position {position}")
}

/// Text for a running phase; `milestone` is a percentage once known.
pub fn phase(state: JobState, milestone: Option<u8>) -> String {
    let verb = match state {
        JobState::Downloading => "Downloading",
        JobState::Uploading => "Uploading",
        other => return format!("{other}"),
    };
    match milestone {
        Some(percent) => format!("{verb}… {percent}%"),
        None => format!("{verb}…"),
    }
}

pub fn succeeded(name: &str, url: &str) -> String {
    format!("Uploaded {name}\n{url}")
}

pub fn cancelled() -> String {
    "Cancelled".to_string()
}

pub fn failed(error: &str) -> String {
    format!("Failed: {error}")
}

pub fn reauthenticate(error: &str) -> String {
    format!("Failed: {error}\nPlease authenticate again and resend the file.")
}

pub fn rejected_not_media() -> String {
    "Send a video, photo or document to store it.".to_string()
}

pub fn rejected_unauthorized(error: &str) -> String {
    format!("Not authorized: {error}")
}

pub fn shutting_down() -> String {
    "Service is shutting down; please resend later.".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_texts() {
        assert_eq!(phase(JobState::Downloading, None), "Downloading…");
        assert_eq!(phase(JobState::Uploading, Some(50)), "Uploading… 50%");
        assert_eq!(phase(JobState::Cancelled, Some(50)), "cancelled");
    }

    #[test]
    fn queued_text_carries_position() {
        assert_eq!(queued(2), "Queued — position 2");
    }

    #[test]
    fn error_text_is_verbatim() {
        assert!(failed("disk full").ends_with("disk full"));
        assert!(reauthenticate("expired").contains("authenticate again"));
    }
}
