use crate::transport::{best_effort, ChatId, ChatTransport, MessageRef};
use std::sync::Arc;

/// Frames cycled on every update so each edit visibly changes.
const SPINNER_FRAMES: [&str; 4] = [
    "\u{26a1}",
    "\u{26a1}\u{fe0f}",
    "\u{26a1}\u{26a1}",
    "\u{26a1}\u{fe0f}\u{26a1}\u{fe0f}",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub percent: u8,
    pub phase: String,
}

/// The single live status message of one worker run.
///
/// Every display operation is best-effort: a failed send, edit or delete is
/// logged and the run carries on.
pub struct ProgressReporter {
    transport: Arc<dyn ChatTransport>,
    message: Option<MessageRef>,
    frame: usize,
    status: Status,
}

impl ProgressReporter {
    /// Post the status message.
    pub async fn start(transport: Arc<dyn ChatTransport>, chat: ChatId) -> Self {
        let status = Status {
            percent: 0,
            phase: "Starting...".to_string(),
        };
        let text = format!("{} {}", SPINNER_FRAMES[0], status.phase);
        let message = best_effort("status message", transport.send_text(chat, &text)).await;

        Self {
            transport,
            message,
            frame: 0,
            status,
        }
    }

    pub async fn update(&mut self, percent: u8, phase: impl Into<String>) {
        self.status = Status {
            percent: percent.min(100),
            phase: phase.into(),
        };
        self.frame = (self.frame + 1) % SPINNER_FRAMES.len();

        let text = self.render();
        if let Some(ref message) = self.message {
            best_effort("status edit", self.transport.edit_text(message, &text)).await;
        }
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn render(&self) -> String {
        format!(
            "{} {}% · {}",
            SPINNER_FRAMES[self.frame], self.status.percent, self.status.phase
        )
    }

    /// Remove the status message.
    pub async fn finish(mut self) {
        if let Some(message) = self.message.take() {
            best_effort("status delete", self.transport.delete(&message)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_are_distinct() {
        for (i, a) in SPINNER_FRAMES.iter().enumerate() {
            for b in &SPINNER_FRAMES[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
