pub mod router;

pub use router::{DurationPick, Event, InteractionRouter, Outcome};

use crate::config::{Limits, MIN_CLIP_UNIT_SECONDS};
use crate::extract::{ProbeInfo, Quality};
use crate::transport::{ChatId, MessageRef};
use std::fmt;

/// Identifies one user's conversation in one chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub chat: ChatId,
    pub user: i64,
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chat.0, self.user)
    }
}

/// Where a selection stands in the duration → quality → count flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    AwaitingDuration,
    AwaitingQuality,
    AwaitingCount,
    AwaitingCustomRange,
    Ready,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::AwaitingDuration => write!(f, "awaiting_duration"),
            Stage::AwaitingQuality => write!(f, "awaiting_quality"),
            Stage::AwaitingCount => write!(f, "awaiting_count"),
            Stage::AwaitingCustomRange => write!(f, "awaiting_custom_range"),
            Stage::Ready => write!(f, "ready"),
        }
    }
}

/// The choices a user has made so far for one pending request.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub source_url: String,
    pub source_id: String,
    pub title: String,
    pub source_duration_seconds: u64,
    /// Qualities offered in the menu.
    pub qualities: Vec<Quality>,
    pub clip_length_seconds: Option<u64>,
    pub clip_count: Option<usize>,
    pub format_selector: Option<String>,
    pub custom_range: Option<(u64, u64)>,
    pub awaiting_custom_range: bool,
    /// The menu message, removed once the request launches.
    pub menu: Option<MessageRef>,
}

impl Selection {
    pub fn new(source_url: impl Into<String>, probe: &ProbeInfo) -> Self {
        Self {
            source_url: source_url.into(),
            source_id: probe.id.clone(),
            title: probe.title.clone(),
            source_duration_seconds: probe.duration_seconds,
            qualities: probe.qualities.clone(),
            clip_length_seconds: None,
            clip_count: None,
            format_selector: None,
            custom_range: None,
            awaiting_custom_range: false,
            menu: None,
        }
    }

    pub fn stage(&self) -> Stage {
        if self.awaiting_custom_range {
            Stage::AwaitingCustomRange
        } else if self.clip_length_seconds.is_none() {
            Stage::AwaitingDuration
        } else if self.format_selector.is_none() {
            Stage::AwaitingQuality
        } else if self.clip_count.is_none() {
            Stage::AwaitingCount
        } else {
            Stage::Ready
        }
    }

    /// How many clips this source can reasonably yield.
    pub fn suggested_max_clips(&self, limits: &Limits) -> usize {
        let by_duration = (self.source_duration_seconds / MIN_CLIP_UNIT_SECONDS).max(1);
        (limits.max_clips as usize).min(by_duration as usize)
    }
}
