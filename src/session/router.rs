use super::{Selection, SessionKey, Stage};
use crate::clip::parse_range;
use crate::config::Limits;
use crate::error::{ClipbotError, Result};
use crate::worker::{ClipJob, JobKind};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::debug;

const RANGE_EXAMPLES: &str = "`00H08M10S-00H09M20S` or `2:32-3:23` or `152-203`";

/// A duration button press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationPick {
    Seconds(u64),
    Custom,
}

/// An inbound interaction, after the transport has decoded it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Duration(DurationPick),
    Quality(String),
    Count(usize),
    FullVideo,
    /// Free text that is not a source link.
    Text(String),
}

impl Event {
    /// Encode as button payload.
    pub fn to_payload(&self) -> String {
        match self {
            Event::Duration(DurationPick::Seconds(n)) => format!("dur:{n}"),
            Event::Duration(DurationPick::Custom) => "dur:c".to_string(),
            Event::Quality(selector) => format!("fmt:{selector}"),
            Event::Count(n) => format!("count:{n}"),
            Event::FullVideo => "full:1".to_string(),
            Event::Text(text) => text.clone(),
        }
    }
}

impl FromStr for Event {
    type Err = String;

    /// Decode a button payload such as `dur:10`, `dur:c`, `fmt:22`, `count:3` or `full:1`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (kind, value) = s
            .split_once(':')
            .ok_or_else(|| format!("Unknown button payload: {s}"))?;

        match kind {
            "dur" if value == "c" => Ok(Event::Duration(DurationPick::Custom)),
            "dur" => value
                .parse()
                .map(|n| Event::Duration(DurationPick::Seconds(n)))
                .map_err(|_| "Invalid duration selection.".to_string()),
            "fmt" if !value.is_empty() => Ok(Event::Quality(value.to_string())),
            "count" => value
                .parse()
                .map(Event::Count)
                .map_err(|_| "Invalid count".to_string()),
            "full" => Ok(Event::FullVideo),
            _ => Err(format!("Unknown button payload: {s}")),
        }
    }
}

/// What the caller should do after an event was applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The selection changed; tell the user what comes next.
    Reply(String),
    /// The selection is complete and has been consumed.
    Launch(ClipJob),
    /// Nothing to do with this event.
    Ignored,
}

/// Owns every pending selection, keyed by session, and applies events to them.
///
/// Recoverable problems come back as [`ClipbotError::Parse`] or
/// [`ClipbotError::Selection`] and never modify the selection.
#[derive(Debug, Default)]
pub struct InteractionRouter {
    sessions: HashMap<SessionKey, Selection>,
    limits: Limits,
}

impl InteractionRouter {
    pub fn new(limits: Limits) -> Self {
        Self {
            sessions: HashMap::new(),
            limits,
        }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Start a new selection for `key`, replacing any unfinished one.
    pub fn begin(&mut self, key: SessionKey, selection: Selection) {
        if self.sessions.insert(key, selection).is_some() {
            debug!("Session {} replaced its pending selection", key);
        }
    }

    pub fn selection(&self, key: &SessionKey) -> Option<&Selection> {
        self.sessions.get(key)
    }

    pub fn selection_mut(&mut self, key: &SessionKey) -> Option<&mut Selection> {
        self.sessions.get_mut(key)
    }

    pub fn is_awaiting_custom_range(&self, key: &SessionKey) -> bool {
        self.sessions
            .get(key)
            .is_some_and(|s| s.awaiting_custom_range)
    }

    /// Number of pending selections.
    pub fn pending(&self) -> usize {
        self.sessions.len()
    }

    pub fn handle(&mut self, key: SessionKey, event: Event) -> Result<Outcome> {
        match event {
            Event::Text(text) => self.on_text(key, &text),
            Event::Duration(pick) => self.on_duration(key, pick),
            Event::Quality(selector) => self.on_quality(key, selector),
            Event::Count(n) => self.on_count(key, n),
            Event::FullVideo => self.on_full_video(key),
        }
    }

    fn pending_selection(&mut self, key: &SessionKey) -> Result<&mut Selection> {
        self.sessions
            .get_mut(key)
            .ok_or_else(|| ClipbotError::Selection("No video pending. Send a link first.".to_string()))
    }

    fn on_duration(&mut self, key: SessionKey, pick: DurationPick) -> Result<Outcome> {
        let max = self.limits.max_clip_seconds;
        let selection = self.pending_selection(&key)?;

        let seconds = match pick {
            DurationPick::Custom => {
                selection.awaiting_custom_range = true;
                return Ok(Outcome::Reply(format!(
                    "Send custom range like {RANGE_EXAMPLES} (max {max}s)."
                )));
            }
            DurationPick::Seconds(n) => n,
        };

        if seconds == 0 {
            return Err(ClipbotError::Selection("Invalid duration selection.".to_string()));
        }
        if seconds > max {
            return Err(ClipbotError::Selection(format!(
                "Requested duration too long (max {max}s)."
            )));
        }

        selection.clip_length_seconds = Some(seconds);
        selection.custom_range = None;
        selection.awaiting_custom_range = false;

        let next = match selection.stage() {
            Stage::AwaitingQuality => "Now pick quality.".to_string(),
            _ => format!("Now choose how many clips (1..{}).", self.suggested(&key)),
        };
        Ok(Outcome::Reply(format!("Duration set to {seconds}s. {next}")))
    }

    fn on_quality(&mut self, key: SessionKey, selector: String) -> Result<Outcome> {
        let selection = self.pending_selection(&key)?;
        selection.format_selector = Some(selector);

        let reply = match selection.stage() {
            Stage::AwaitingDuration => "Format set. Now pick clip duration.".to_string(),
            Stage::AwaitingCustomRange => "Format set. Now send the custom range.".to_string(),
            _ => format!(
                "Format set. Now choose how many clips (1..{}).",
                self.suggested(&key)
            ),
        };
        Ok(Outcome::Reply(reply))
    }

    fn on_count(&mut self, key: SessionKey, n: usize) -> Result<Outcome> {
        let limits = self.limits;
        let selection = self.pending_selection(&key)?;

        let (Some(clip_length), Some(_)) =
            (selection.clip_length_seconds, &selection.format_selector)
        else {
            return Err(ClipbotError::Selection(
                "Select duration and quality first.".to_string(),
            ));
        };
        if selection.awaiting_custom_range {
            return Err(ClipbotError::Selection(
                "Send the custom range first.".to_string(),
            ));
        }
        if clip_length > limits.max_clip_seconds {
            return Err(ClipbotError::Selection(format!(
                "Requested duration too long (max {}s).",
                limits.max_clip_seconds
            )));
        }
        if n == 0 || n > limits.max_clips as usize {
            return Err(ClipbotError::Selection(format!(
                "Too many clips selected (max {}).",
                limits.max_clips
            )));
        }
        let suggested = selection.suggested_max_clips(&limits);
        if n > suggested {
            return Err(ClipbotError::Selection(format!(
                "This video is too short for {n} clips (max {suggested})."
            )));
        }

        selection.clip_count = Some(n);
        debug_assert_eq!(selection.stage(), Stage::Ready);

        let selection = self
            .sessions
            .remove(&key)
            .ok_or_else(|| ClipbotError::Selection("No video pending.".to_string()))?;
        Ok(Outcome::Launch(ClipJob::from_selection(key, selection)))
    }

    fn on_full_video(&mut self, key: SessionKey) -> Result<Outcome> {
        self.pending_selection(&key)?;
        let mut selection = self
            .sessions
            .remove(&key)
            .ok_or_else(|| ClipbotError::Selection("No video pending.".to_string()))?;

        // Full downloads ignore the clip choices; only the quality carries over
        selection.clip_length_seconds = None;
        selection.clip_count = None;
        selection.custom_range = None;

        let mut job = ClipJob::from_selection(key, selection);
        job.kind = JobKind::FullVideo;
        Ok(Outcome::Launch(job))
    }

    fn on_text(&mut self, key: SessionKey, text: &str) -> Result<Outcome> {
        let max = self.limits.max_clip_seconds;
        let Some(selection) = self.sessions.get_mut(&key) else {
            return Ok(Outcome::Ignored);
        };
        if !selection.awaiting_custom_range {
            return Ok(Outcome::Ignored);
        }

        let (start, end) = parse_range(text).ok_or_else(|| {
            ClipbotError::Parse(format!("Try formats: {RANGE_EXAMPLES}."))
        })?;

        let length = end - start;
        if length > max {
            return Err(ClipbotError::Selection(format!(
                "Invalid range length. Max clip length is {max}s."
            )));
        }
        let total = selection.source_duration_seconds;
        if total > 0 && start >= total {
            return Err(ClipbotError::Selection(format!(
                "Range starts after the end of the video (~{total}s)."
            )));
        }

        selection.clip_length_seconds = Some(length);
        selection.custom_range = Some((start, end));
        selection.awaiting_custom_range = false;

        Ok(Outcome::Reply(format!(
            "Custom range accepted ({start}s - {end}s, {length}s). Now pick quality and number of clips."
        )))
    }

    fn suggested(&self, key: &SessionKey) -> usize {
        self.sessions
            .get(key)
            .map_or(1, |s| s.suggested_max_clips(&self.limits))
    }
}
