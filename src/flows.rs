//! Per-chat conversation state: the multi-step report and add-scammer
//! flows, plus the one-shot "next message answers this prompt"
//! continuations used by search and broadcast.

use std::{
    collections::{hash_map::Entry, HashMap},
    time::{Duration, Instant},
};

use teloxide::types::{ChatId, FileId};
use tokio::sync::Mutex;

use crate::types::{NewScammer, Proof};

/// Literal token that finishes a proofs step. Everywhere else it's just text.
pub const DONE: &str = "/done";

/// Hard cap on proofs per flow. The original accumulated without bound.
pub const MAX_PROOFS: usize = 24;

/// Flows abandoned for this long get swept out of memory.
pub const FLOW_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
/// How often the eviction sweeper runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

pub mod prompts {
    pub const REPORT_SUSPECT: &str = "Enter scammer ID or @username:";
    pub const REPORT_DESCRIPTION: &str = "Describe what happened:";
    pub const REPORT_PROOFS: &str =
        "Send photos/videos as proof (one by one). Send /done when finished.";
    pub const ADD_NAME: &str = "Enter scammer name:";
    pub const ADD_HANDLE: &str = "Enter Telegram ID or @username:";
    pub const ADD_DESCRIPTION: &str = "Enter description:";
    pub const ADD_PROOFS: &str = "Send photo/video proofs. Send /done when finished.";
    pub const PHOTO_SAVED: &str = "📸 Photo saved. Send more or /done";
    pub const VIDEO_SAVED: &str = "🎥 Video saved. Send more or /done";
    pub const PROOF_LIMIT: &str = "Proof limit reached. Send /done to finish.";
}

/// The message content a flow step can consume.
#[derive(Debug, Clone)]
pub enum FlowInput {
    Text(String),
    Photo(FileId),
    Video(FileId),
}

/// One step of an active flow. Each variant carries everything collected
/// so far, so there is no partially-filled struct with sentinel fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowState {
    ReportSuspect,
    ReportDescription {
        suspect: String,
    },
    ReportProofs {
        suspect: String,
        description: String,
        proofs: Vec<Proof>,
    },
    AddName,
    AddHandle {
        name: String,
    },
    AddDescription {
        name: String,
        tg_id: String,
        username: String,
    },
    AddProofs {
        name: String,
        tg_id: String,
        username: String,
        description: String,
        proofs: Vec<Proof>,
    },
}

/// A finished flow, ready for the handler to persist.
/// The reporter/author id is attached by the handler from the final
/// message's sender, same as the original did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletedFlow {
    Report {
        suspect: String,
        description: String,
        proofs: Vec<Proof>,
    },
    Scammer(NewScammer),
}

/// What the handler should do after feeding a message into a flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEvent {
    /// Send this prompt; the flow moved to its next step.
    Prompt(&'static str),
    /// A proof was appended; reply with this confirmation.
    ProofSaved(&'static str),
    /// The proof cap was hit; the attachment was dropped.
    ProofLimit,
    /// The message doesn't fit the current step. Say nothing.
    Ignored,
    /// The flow finished and its state is gone.
    Done(CompletedFlow),
}

impl FlowState {
    pub fn report() -> FlowState {
        FlowState::ReportSuspect
    }

    pub fn add_scammer() -> FlowState {
        FlowState::AddName
    }

    /// The prompt to send when this flow starts.
    pub fn opening_prompt(&self) -> &'static str {
        match self {
            FlowState::ReportSuspect => prompts::REPORT_SUSPECT,
            FlowState::AddName => prompts::ADD_NAME,
            _ => unreachable!("flows only start at their first step"),
        }
    }

    /// Consume one message. Returns the next state (`None` once the flow is
    /// over) and the event the handler should act on.
    ///
    /// Note that `/done` is only special in the proofs steps; in every text
    /// step it is stored as field data like anything else.
    pub fn advance(self, input: FlowInput) -> (Option<FlowState>, FlowEvent) {
        use FlowEvent::*;
        use FlowState::*;
        match (self, input) {
            (ReportSuspect, FlowInput::Text(text)) => (
                Some(ReportDescription { suspect: text }),
                Prompt(prompts::REPORT_DESCRIPTION),
            ),
            (ReportDescription { suspect }, FlowInput::Text(text)) => (
                Some(ReportProofs {
                    suspect,
                    description: text,
                    proofs: Vec::new(),
                }),
                Prompt(prompts::REPORT_PROOFS),
            ),
            (
                ReportProofs {
                    suspect,
                    description,
                    proofs,
                },
                input,
            ) => match proofs_step(proofs, input) {
                ProofsStep::Finished(proofs) => (
                    None,
                    Done(CompletedFlow::Report {
                        suspect,
                        description,
                        proofs,
                    }),
                ),
                ProofsStep::Continue(proofs, event) => (
                    Some(ReportProofs {
                        suspect,
                        description,
                        proofs,
                    }),
                    event,
                ),
            },

            (AddName, FlowInput::Text(text)) => {
                (Some(AddHandle { name: text }), Prompt(prompts::ADD_HANDLE))
            }
            (AddHandle { name }, FlowInput::Text(text)) => {
                let username = text.strip_prefix('@').unwrap_or(&text).to_string();
                (
                    Some(AddDescription {
                        name,
                        tg_id: text,
                        username,
                    }),
                    Prompt(prompts::ADD_DESCRIPTION),
                )
            }
            (
                AddDescription {
                    name,
                    tg_id,
                    username,
                },
                FlowInput::Text(text),
            ) => (
                Some(AddProofs {
                    name,
                    tg_id,
                    username,
                    description: text,
                    proofs: Vec::new(),
                }),
                Prompt(prompts::ADD_PROOFS),
            ),
            (
                AddProofs {
                    name,
                    tg_id,
                    username,
                    description,
                    proofs,
                },
                input,
            ) => match proofs_step(proofs, input) {
                ProofsStep::Finished(proofs) => (
                    None,
                    Done(CompletedFlow::Scammer(NewScammer {
                        name,
                        tg_id,
                        username,
                        description,
                        proofs,
                    })),
                ),
                ProofsStep::Continue(proofs, event) => (
                    Some(AddProofs {
                        name,
                        tg_id,
                        username,
                        description,
                        proofs,
                    }),
                    event,
                ),
            },

            // Media in a text step doesn't fit anywhere. Drop it.
            (state, _) => (Some(state), Ignored),
        }
    }
}

enum ProofsStep {
    Finished(Vec<Proof>),
    Continue(Vec<Proof>, FlowEvent),
}

/// Shared semantics of both flows' final step: `/done` finishes, media
/// accumulates up to the cap, anything else is ignored.
fn proofs_step(mut proofs: Vec<Proof>, input: FlowInput) -> ProofsStep {
    match input {
        FlowInput::Text(text) if text == DONE => ProofsStep::Finished(proofs),
        FlowInput::Text(_) => ProofsStep::Continue(proofs, FlowEvent::Ignored),
        FlowInput::Photo(file_id) => {
            if proofs.len() >= MAX_PROOFS {
                return ProofsStep::Continue(proofs, FlowEvent::ProofLimit);
            }
            proofs.push(Proof::photo(file_id));
            ProofsStep::Continue(proofs, FlowEvent::ProofSaved(prompts::PHOTO_SAVED))
        }
        FlowInput::Video(file_id) => {
            if proofs.len() >= MAX_PROOFS {
                return ProofsStep::Continue(proofs, FlowEvent::ProofLimit);
            }
            proofs.push(Proof::video(file_id));
            ProofsStep::Continue(proofs, FlowEvent::ProofSaved(prompts::VIDEO_SAVED))
        }
    }
}

/// A registered "the next message from this chat answers this" prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pending {
    SearchQuery,
    Broadcast,
}

#[derive(Debug)]
enum Conversation {
    Flow(FlowState),
    Pending(Pending),
}

#[derive(Debug)]
struct Slot {
    conversation: Conversation,
    last_activity: Instant,
}

impl Slot {
    fn new(conversation: Conversation) -> Slot {
        Slot {
            conversation,
            last_activity: Instant::now(),
        }
    }
}

/// Owns all per-chat conversation state. One slot per chat: starting a new
/// flow or prompt replaces whatever that chat had before, and completion
/// clears the slot. A chat's messages are serialized through the lock, so
/// two updates from the same chat can't corrupt one flow.
#[derive(Debug, Default)]
pub struct FlowTracker {
    slots: Mutex<HashMap<ChatId, Slot>>,
}

impl FlowTracker {
    pub fn new() -> FlowTracker {
        FlowTracker::default()
    }

    pub async fn begin_flow(&self, chat: ChatId, state: FlowState) {
        self.slots
            .lock()
            .await
            .insert(chat, Slot::new(Conversation::Flow(state)));
    }

    pub async fn begin_pending(&self, chat: ChatId, pending: Pending) {
        self.slots
            .lock()
            .await
            .insert(chat, Slot::new(Conversation::Pending(pending)));
    }

    /// Take and clear the chat's one-shot continuation, if it has one.
    pub async fn take_pending(&self, chat: ChatId) -> Option<Pending> {
        let mut slots = self.slots.lock().await;
        let Entry::Occupied(occupied) = slots.entry(chat) else {
            return None;
        };
        if !matches!(occupied.get().conversation, Conversation::Pending(_)) {
            return None;
        }
        let Conversation::Pending(pending) = occupied.remove().conversation else {
            unreachable!()
        };
        Some(pending)
    }

    /// Feed one message into the chat's active flow, if it has one.
    pub async fn advance_flow(&self, chat: ChatId, input: FlowInput) -> Option<FlowEvent> {
        let mut slots = self.slots.lock().await;
        let Entry::Occupied(occupied) = slots.entry(chat) else {
            return None;
        };
        if !matches!(occupied.get().conversation, Conversation::Flow(_)) {
            return None;
        }
        let Conversation::Flow(state) = occupied.remove().conversation else {
            unreachable!()
        };

        let (next, event) = state.advance(input);
        if let Some(next) = next {
            slots.insert(chat, Slot::new(Conversation::Flow(next)));
        }
        Some(event)
    }

    /// Whether this chat currently has an active flow (not a one-shot).
    pub async fn has_flow(&self, chat: ChatId) -> bool {
        matches!(
            self.slots.lock().await.get(&chat),
            Some(Slot {
                conversation: Conversation::Flow(_),
                ..
            })
        )
    }

    /// Drop every slot idle for longer than `max_idle`. Returns how many
    /// were dropped.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut slots = self.slots.lock().await;
        let before = slots.len();
        slots.retain(|_, slot| slot.last_activity.elapsed() < max_idle);
        before - slots.len()
    }
}

/// Background sweeper for abandoned conversations. The original kept them
/// forever; this bounds the memory to recently active chats.
pub async fn eviction_loop(tracker: std::sync::Arc<FlowTracker>) {
    loop {
        tokio::time::sleep(SWEEP_INTERVAL).await;
        let evicted = tracker.evict_idle(FLOW_IDLE_TIMEOUT).await;
        if evicted > 0 {
            log::debug!("Evicted {} idle conversation(s)", evicted);
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::types::ProofKind;

    fn text(s: &str) -> FlowInput {
        FlowInput::Text(s.to_string())
    }

    fn photo(id: &str) -> FlowInput {
        FlowInput::Photo(FileId(id.to_string()))
    }

    fn video(id: &str) -> FlowInput {
        FlowInput::Video(FileId(id.to_string()))
    }

    #[test]
    fn report_flow_happy_path() {
        let state = FlowState::report();
        assert_eq!(state.opening_prompt(), prompts::REPORT_SUSPECT);

        let (state, event) = state.advance(text("@joe"));
        assert_eq!(event, FlowEvent::Prompt(prompts::REPORT_DESCRIPTION));
        let (state, event) = state.unwrap().advance(text("scammed me"));
        assert_eq!(event, FlowEvent::Prompt(prompts::REPORT_PROOFS));

        let (state, event) = state.unwrap().advance(photo("p1"));
        assert_eq!(event, FlowEvent::ProofSaved(prompts::PHOTO_SAVED));
        let (state, event) = state.unwrap().advance(video("v1"));
        assert_eq!(event, FlowEvent::ProofSaved(prompts::VIDEO_SAVED));

        let (state, event) = state.unwrap().advance(text(DONE));
        assert!(state.is_none());
        let FlowEvent::Done(CompletedFlow::Report {
            suspect,
            description,
            proofs,
        }) = event
        else {
            panic!("expected completion, got {event:?}");
        };
        assert_eq!(suspect, "@joe");
        assert_eq!(description, "scammed me");
        assert_eq!(proofs.len(), 2);
        assert_eq!(proofs[0].kind, ProofKind::Photo);
        assert_eq!(proofs[0].file_id.0, "p1");
        assert_eq!(proofs[1].kind, ProofKind::Video);
        assert_eq!(proofs[1].file_id.0, "v1");
    }

    #[test]
    fn done_is_plain_text_outside_the_proofs_step() {
        let (state, _) = FlowState::report().advance(text(DONE));
        let (state, _) = state.unwrap().advance(text(DONE));
        let (_, event) = state.unwrap().advance(text(DONE));
        let FlowEvent::Done(CompletedFlow::Report {
            suspect,
            description,
            proofs,
        }) = event
        else {
            panic!("expected completion, got {event:?}");
        };
        // Both fields are literally "/done"; only the third one completed.
        assert_eq!(suspect, DONE);
        assert_eq!(description, DONE);
        assert!(proofs.is_empty());
    }

    #[test]
    fn stray_text_in_proofs_step_is_ignored() {
        let (state, _) = FlowState::report().advance(text("someone"));
        let (state, _) = state.unwrap().advance(text("something"));
        let (state, event) = state.unwrap().advance(text("here is a photo"));
        assert_eq!(event, FlowEvent::Ignored);
        // Still in the proofs step.
        let (_, event) = state.unwrap().advance(text(DONE));
        assert!(matches!(event, FlowEvent::Done(_)));
    }

    #[test]
    fn media_in_a_text_step_is_dropped() {
        let state = FlowState::report();
        let (state, event) = state.advance(photo("p1"));
        assert_eq!(event, FlowEvent::Ignored);
        assert_eq!(state, Some(FlowState::ReportSuspect));
    }

    #[test]
    fn add_scammer_strips_one_leading_at_sign() {
        let (state, _) = FlowState::add_scammer().advance(text("Joe Scam"));
        let (state, _) = state.unwrap().advance(text("@joe_scam"));
        let (state, _) = state.unwrap().advance(text("sells fake stuff"));
        let (_, event) = state.unwrap().advance(text(DONE));
        let FlowEvent::Done(CompletedFlow::Scammer(scammer)) = event else {
            panic!("expected completion, got {event:?}");
        };
        assert_eq!(scammer.name, "Joe Scam");
        assert_eq!(scammer.tg_id, "@joe_scam");
        assert_eq!(scammer.username, "joe_scam");
        assert_eq!(scammer.description, "sells fake stuff");
        assert!(scammer.proofs.is_empty());
    }

    #[test]
    fn handle_without_at_sign_is_kept_verbatim() {
        let (state, _) = FlowState::add_scammer().advance(text("Joe"));
        let (state, _) = state.unwrap().advance(text("123456789"));
        let (state, _) = state.unwrap().advance(text("desc"));
        let (_, event) = state.unwrap().advance(text(DONE));
        let FlowEvent::Done(CompletedFlow::Scammer(scammer)) = event else {
            panic!("expected completion, got {event:?}");
        };
        assert_eq!(scammer.tg_id, "123456789");
        assert_eq!(scammer.username, "123456789");
    }

    #[test]
    fn proofs_stop_accumulating_at_the_cap() {
        let (state, _) = FlowState::report().advance(text("x"));
        let (mut state, _) = state.unwrap().advance(text("y"));
        for i in 0..MAX_PROOFS {
            let (next, event) = state.unwrap().advance(photo(&format!("p{i}")));
            assert!(matches!(event, FlowEvent::ProofSaved(_)));
            state = next;
        }
        let (state, event) = state.unwrap().advance(photo("one too many"));
        assert_eq!(event, FlowEvent::ProofLimit);
        let (state, event) = state.unwrap().advance(video("also too many"));
        assert_eq!(event, FlowEvent::ProofLimit);

        let (_, event) = state.unwrap().advance(text(DONE));
        let FlowEvent::Done(CompletedFlow::Report { proofs, .. }) = event else {
            panic!("expected completion, got {event:?}");
        };
        assert_eq!(proofs.len(), MAX_PROOFS);
        assert_eq!(proofs[0].file_id.0, "p0");
        assert_eq!(proofs[MAX_PROOFS - 1].file_id.0, format!("p{}", MAX_PROOFS - 1));
    }

    #[tokio::test]
    async fn chats_do_not_interfere() {
        let tracker = FlowTracker::new();
        let (c1, c2) = (ChatId(1), ChatId(2));

        tracker.begin_flow(c1, FlowState::report()).await;
        tracker.begin_flow(c2, FlowState::report()).await;

        tracker.advance_flow(c1, text("@joe")).await.unwrap();
        tracker.advance_flow(c2, text("@jane")).await.unwrap();
        tracker.advance_flow(c1, text("took my money")).await.unwrap();
        tracker.advance_flow(c2, text("fake shop")).await.unwrap();
        tracker.advance_flow(c1, photo("only-c1")).await.unwrap();

        let e1 = tracker.advance_flow(c1, text(DONE)).await.unwrap();
        let e2 = tracker.advance_flow(c2, text(DONE)).await.unwrap();

        let FlowEvent::Done(CompletedFlow::Report {
            suspect, proofs, ..
        }) = e1
        else {
            panic!("c1 should have completed");
        };
        assert_eq!(suspect, "@joe");
        assert_eq!(proofs.len(), 1);

        let FlowEvent::Done(CompletedFlow::Report {
            suspect, proofs, ..
        }) = e2
        else {
            panic!("c2 should have completed");
        };
        assert_eq!(suspect, "@jane");
        assert!(proofs.is_empty());
    }

    #[tokio::test]
    async fn completion_clears_the_slot() {
        let tracker = FlowTracker::new();
        let chat = ChatId(7);
        tracker.begin_flow(chat, FlowState::report()).await;
        tracker.advance_flow(chat, text("a")).await.unwrap();
        tracker.advance_flow(chat, text("b")).await.unwrap();
        tracker.advance_flow(chat, text(DONE)).await.unwrap();

        assert!(!tracker.has_flow(chat).await);
        assert!(tracker.advance_flow(chat, text("c")).await.is_none());
    }

    #[tokio::test]
    async fn pending_is_one_shot_and_separate_from_flows() {
        let tracker = FlowTracker::new();
        let chat = ChatId(9);

        tracker.begin_pending(chat, Pending::SearchQuery).await;
        assert!(!tracker.has_flow(chat).await);
        // A pending slot is not advanced as a flow.
        assert!(tracker.advance_flow(chat, text("query")).await.is_none());
        assert_eq!(tracker.take_pending(chat).await, Some(Pending::SearchQuery));
        // Consumed.
        assert_eq!(tracker.take_pending(chat).await, None);
    }

    #[tokio::test]
    async fn idle_slots_get_evicted() {
        let tracker = FlowTracker::new();
        tracker.begin_flow(ChatId(1), FlowState::report()).await;
        tracker.begin_pending(ChatId(2), Pending::Broadcast).await;

        // Nothing is older than an hour.
        assert_eq!(tracker.evict_idle(Duration::from_secs(3600)).await, 0);
        // Everything is older than zero.
        assert_eq!(tracker.evict_idle(Duration::ZERO).await, 2);
        assert!(!tracker.has_flow(ChatId(1)).await);
    }
}
