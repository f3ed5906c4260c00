//! Glue between the chat transport and the interaction router.

use crate::config::Limits;
use crate::extract::Extractor;
use crate::session::{
    DurationPick, Event, InteractionRouter, Outcome, Selection, SessionKey,
};
use crate::transport::{
    best_effort, Button, ChatId, ChatTransport, Inbound, InboundKind, Menu, MessageRef,
};
use crate::worker::{ClipJob, JobKind, RunSupervisor};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Clip lengths offered as buttons, in seconds.
pub const DURATION_CHOICES: [u64; 4] = [5, 10, 20, 30];

/// How long a session's dispatch lane waits for more events before its task exits.
const LANE_IDLE: Duration = Duration::from_secs(300);

/// Most quality buttons shown in one menu.
pub const MAX_QUALITY_BUTTONS: usize = 6;

/// Most count buttons shown in one menu.
pub const MAX_COUNT_BUTTONS: usize = 5;

const START_TEXT: &str = "Send me a YouTube link (just paste) and I'll cut short sections \
     into small clips. Use /help for step-by-step instructions.";

const HELP_TEXT: &str = "Clipper bot, simple guide:\n\n\
     1. Paste a YouTube link (text only). Files are not accepted.\n\
     2. Pick clip duration (5/10/20/30/Custom up to 3 minutes).\n   \
        Custom format examples: `00H08M10S:00H09M20S`, `2:32-3:23`, `152-203`.\n\
     3. Pick quality (the bot shows available qualities from the source).\n\
     4. Pick number of clips (up to 5 according to video length).\n\
     5. Wait for the \u{26a1} progress message. When finished you get clips or a GoFile link.\n\n\
     Commands:\n\
     /feedback <text> - send a message to the admin\n";

/// Return the first whitespace-separated token of `text` that points at a supported source.
pub fn find_source_link(text: &str) -> Option<&str> {
    text.split_whitespace()
        .find(|token| token.contains("youtube.com") || token.contains("youtu.be"))
}

/// The combined selection menu: durations, qualities, counts and a full download.
pub fn build_menu(selection: &Selection, limits: &Limits) -> Menu {
    let mut menu: Menu = DURATION_CHOICES
        .chunks(2)
        .map(|pair| {
            pair.iter()
                .map(|&s| {
                    Button::new(
                        format!("{s}s"),
                        Event::Duration(DurationPick::Seconds(s)).to_payload(),
                    )
                })
                .collect()
        })
        .collect();
    menu.push(vec![Button::new(
        "Custom",
        Event::Duration(DurationPick::Custom).to_payload(),
    )]);

    for quality in selection.qualities.iter().take(MAX_QUALITY_BUTTONS) {
        menu.push(vec![Button::new(
            quality.label.clone(),
            Event::Quality(quality.selector.clone()).to_payload(),
        )]);
    }

    let counts = selection
        .suggested_max_clips(limits)
        .min(MAX_COUNT_BUTTONS);
    menu.push(
        (1..=counts)
            .map(|i| {
                let label = format!("{} clip{}", i, if i > 1 { "s" } else { "" });
                Button::new(label, Event::Count(i).to_payload())
            })
            .collect(),
    );

    menu.push(vec![Button::new(
        "Download full video",
        Event::FullVideo.to_payload(),
    )]);
    menu
}

/// Dispatches inbound events. Events of one session must be handled in order,
/// see [`SessionLanes`].
pub struct Bot {
    transport: Arc<dyn ChatTransport>,
    extractor: Arc<dyn Extractor>,
    supervisor: Arc<RunSupervisor>,
    router: Mutex<InteractionRouter>,
    admin_id: Option<i64>,
}

impl Bot {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        extractor: Arc<dyn Extractor>,
        supervisor: Arc<RunSupervisor>,
        limits: Limits,
        admin_id: Option<i64>,
    ) -> Self {
        Self {
            transport,
            extractor,
            supervisor,
            router: Mutex::new(InteractionRouter::new(limits)),
            admin_id,
        }
    }

    pub async fn dispatch(&self, inbound: Inbound) {
        let key = SessionKey {
            chat: inbound.chat,
            user: inbound.user,
        };

        match inbound.kind {
            InboundKind::Other => self.discard(inbound.message).await,
            InboundKind::Command { ref name, ref args } => {
                self.on_command(&inbound, name, args).await
            }
            InboundKind::Button {
                ref callback_id,
                ref payload,
            } => {
                best_effort("button answer", self.transport.answer_button(callback_id)).await;
                match payload.parse::<Event>() {
                    Ok(event) => {
                        self.apply(key, event).await;
                    }
                    Err(e) => {
                        debug!("Ignoring button from {}: {}", key, e);
                        self.say(key.chat, &e).await;
                    }
                }
            }
            InboundKind::Text(ref text) => {
                if let Some(link) = find_source_link(text) {
                    self.discard(inbound.message).await;
                    self.on_link(key, link).await;
                } else if self.router.lock().await.is_awaiting_custom_range(&key) {
                    let accepted = self.apply(key, Event::Text(text.clone())).await;
                    if accepted {
                        self.discard(inbound.message).await;
                    }
                } else {
                    self.discard(inbound.message).await;
                }
            }
        }
    }

    async fn on_command(&self, inbound: &Inbound, name: &str, args: &str) {
        match name {
            "start" => {
                self.discard(inbound.message).await;
                self.say(inbound.chat, START_TEXT).await;
            }
            "help" => {
                self.discard(inbound.message).await;
                self.say(inbound.chat, HELP_TEXT).await;
            }
            "feedback" => {
                self.forward_feedback(inbound, args).await;
                self.discard(inbound.message).await;
            }
            other => {
                debug!("Unknown command /{} from {}", other, inbound.user);
                self.discard(inbound.message).await;
            }
        }
    }

    async fn forward_feedback(&self, inbound: &Inbound, text: &str) {
        if text.is_empty() {
            self.say(inbound.chat, "Usage: /feedback <your message>").await;
            return;
        }

        let body = format!(
            "Feedback from {} @{}:\n\n{}",
            inbound.user,
            inbound.username.as_deref().unwrap_or(""),
            text
        );
        let forwarded = match self.admin_id {
            Some(admin) => self.transport.send_text(ChatId(admin), &body).await.map(|_| ()),
            None => {
                info!("Feedback received with no admin configured: {}", body);
                Ok(())
            }
        };

        match forwarded {
            Ok(()) => {
                self.say(inbound.chat, "Thanks for your feedback, we sent it to the admin.")
                    .await
            }
            Err(e) => {
                warn!("Failed to forward feedback: {}", e);
                self.say(inbound.chat, "Failed to send feedback, try again later.")
                    .await;
            }
        }
    }

    async fn on_link(&self, key: SessionKey, url: &str) {
        info!("Session {} sent {}", key, url);

        let probe = match self.extractor.probe(url).await {
            Ok(probe) => probe,
            Err(e) => {
                warn!("Probe of {} failed: {}", url, e);
                self.say(key.chat, "Failed to read the video. Try again later.")
                    .await;
                return;
            }
        };

        let mut selection = Selection::new(url, &probe);
        let limits = *self.router.lock().await.limits();
        let menu = build_menu(&selection, &limits);
        let text = format!(
            "Title: {}\nDuration: ~{}s\nPick clip duration and quality:",
            probe.title, probe.duration_seconds
        );

        match self.transport.send_menu(key.chat, &text, &menu).await {
            Ok(message) => selection.menu = Some(message),
            Err(e) => {
                warn!("Failed to send menu to {}: {}", key, e);
                return;
            }
        }

        let replaced = {
            let mut router = self.router.lock().await;
            let previous = router.selection(&key).and_then(|s| s.menu);
            router.begin(key, selection);
            previous
        };
        // A newer link supersedes the old menu
        self.discard(replaced).await;
    }

    /// Apply an event to the router and act on the outcome.
    ///
    /// Returns `true` when the event was accepted.
    async fn apply(&self, key: SessionKey, event: Event) -> bool {
        let (result, menu) = {
            let mut router = self.router.lock().await;
            let menu = router.selection(&key).and_then(|s| s.menu);
            (router.handle(key, event), menu)
        };

        match result {
            Ok(Outcome::Reply(text)) => {
                self.say(key.chat, &text).await;
                true
            }
            Ok(Outcome::Launch(job)) => {
                self.discard(menu).await;
                self.launch(job).await;
                true
            }
            Ok(Outcome::Ignored) => false,
            Err(e) if e.is_recoverable() => {
                debug!("Session {} rejected: {}", key, e);
                self.say(key.chat, &e.to_string()).await;
                false
            }
            Err(e) => {
                warn!("Session {} failed: {}", key, e);
                false
            }
        }
    }

    async fn launch(&self, job: ClipJob) {
        let chat = job.chat();
        let mut ack = match job.kind {
            JobKind::FullVideo => "Downloading full video, please wait...".to_string(),
            JobKind::Clips { .. } => format!(
                "Working on {}... This may take a while, please wait.",
                job.describe()
            ),
        };

        if self.supervisor.launch(job).await {
            ack.push_str(" It will start once your previous request is done.");
        }
        self.say(chat, &ack).await;
    }

    async fn say(&self, chat: ChatId, text: &str) {
        best_effort("reply", self.transport.send_text(chat, text)).await;
    }

    async fn discard(&self, message: Option<MessageRef>) {
        if let Some(ref message) = message {
            best_effort("message delete", self.transport.delete(message)).await;
        }
    }
}

/// Feeds polled events to the bot, one ordered lane per session.
///
/// Events of one session are dispatched one after another in arrival order.
/// Different sessions proceed concurrently.
pub struct SessionLanes {
    bot: Arc<Bot>,
    lanes: HashMap<SessionKey, Lane>,
}

struct Lane {
    sender: mpsc::UnboundedSender<Inbound>,
    task: JoinHandle<()>,
}

impl SessionLanes {
    pub fn new(bot: Arc<Bot>) -> Self {
        Self {
            bot,
            lanes: HashMap::new(),
        }
    }

    pub fn push(&mut self, inbound: Inbound) {
        self.lanes.retain(|_, lane| !lane.sender.is_closed());

        let key = SessionKey {
            chat: inbound.chat,
            user: inbound.user,
        };
        let inbound = match self.lanes.get(&key) {
            Some(lane) => match lane.sender.send(inbound) {
                Ok(()) => return,
                Err(mpsc::error::SendError(inbound)) => inbound,
            },
            None => inbound,
        };

        debug!("Opening dispatch lane for {}", key);
        let lane = Self::open(self.bot.clone(), inbound);
        self.lanes.insert(key, lane);
    }

    /// Number of sessions with a live lane.
    pub fn active(&self) -> usize {
        self.lanes
            .values()
            .filter(|lane| !lane.sender.is_closed())
            .count()
    }

    fn open(bot: Arc<Bot>, first: Inbound) -> Lane {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        // The receiver is alive, so this cannot fail
        let _ = sender.send(first);

        let task = tokio::spawn(async move {
            loop {
                match tokio::time::timeout(LANE_IDLE, receiver.recv()).await {
                    Ok(Some(inbound)) => bot.dispatch(inbound).await,
                    Ok(None) => break,
                    Err(_) => {
                        // Refuse new events, then finish the ones already queued
                        receiver.close();
                        while let Ok(inbound) = receiver.try_recv() {
                            bot.dispatch(inbound).await;
                        }
                        break;
                    }
                }
            }
        });
        Lane { sender, task }
    }

    /// Stop accepting events and wait until every queued one is handled.
    pub async fn drain(self) {
        let tasks: Vec<JoinHandle<()>> = self
            .lanes
            .into_values()
            .map(|lane| {
                drop(lane.sender);
                lane.task
            })
            .collect();

        for result in join_all(tasks).await {
            if let Err(e) = result {
                warn!("Dispatch lane failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{ProbeInfo, Quality};

    fn selection(duration: u64, qualities: usize) -> Selection {
        let probe = ProbeInfo {
            id: "vid".to_string(),
            title: "A video".to_string(),
            duration_seconds: duration,
            qualities: (0..qualities)
                .map(|i| Quality {
                    selector: format!("{}", 100 + i),
                    label: format!("{}p (mp4)", 1080 - i * 100),
                })
                .collect(),
        };
        Selection::new("https://youtu.be/vid", &probe)
    }

    #[test]
    fn test_find_source_link() {
        assert_eq!(
            find_source_link("https://youtu.be/abc please"),
            Some("https://youtu.be/abc")
        );
        assert_eq!(
            find_source_link("https://www.youtube.com/watch?v=abc"),
            Some("https://www.youtube.com/watch?v=abc")
        );
        assert_eq!(
            find_source_link("look at this https://youtu.be/xyz"),
            Some("https://youtu.be/xyz")
        );
        assert_eq!(find_source_link("https://vimeo.com/1"), None);
        assert_eq!(find_source_link("2:32-3:23"), None);
    }

    #[test]
    fn test_menu_layout() {
        let menu = build_menu(&selection(300, 8), &Limits::default());

        // 2 duration rows + custom + 6 qualities + counts + full
        assert_eq!(menu.len(), 11);
        assert_eq!(menu[0][0].payload, "dur:5");
        assert_eq!(menu[1][1].payload, "dur:30");
        assert_eq!(menu[2][0].payload, "dur:c");
        assert_eq!(menu[3][0].payload, "fmt:100");
        assert_eq!(menu[9].len(), 5);
        assert_eq!(menu[9][0].label, "1 clip");
        assert_eq!(menu[9][4].payload, "count:5");
        assert_eq!(menu[10][0].payload, "full:1");
    }

    #[test]
    fn test_menu_counts_follow_duration() {
        let menu = build_menu(&selection(12, 1), &Limits::default());
        let counts = &menu[menu.len() - 2];
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[1].label, "2 clips");
    }
}
