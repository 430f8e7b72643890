//! Message handling: dispatch policy, the lookup pipeline, and the run loop.
//!
//! **Core invariant: the bot never posts error text into a room.** Every
//! failure path ends in a log line and no reply.

use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, debug_span, error, info, warn};

use crate::channels::{Channel, IncomingMessage, MessageType, OutgoingReply};
use crate::error::{ChannelError, ResolveError};
use crate::proposals::{ProposalResolver, extract_references, format_reply};

/// Why a message was not processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Sent by the bot itself.
    OwnMessage,
    /// Replaces an earlier message.
    Edit,
    /// Not `m.text` or `m.emote`; notices come from other bots.
    UnsupportedType,
}

impl SkipReason {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::OwnMessage => "own_message",
            Self::Edit => "edit",
            Self::UnsupportedType => "unsupported_type",
        }
    }
}

/// Decide whether a message may trigger a reply at all.
///
/// Each rule guards against a reply loop: our own output, edits of a
/// message already answered, and notices posted by other bots.
pub fn skip_reason(msg: &IncomingMessage, own_user_id: &str) -> Option<SkipReason> {
    if msg.sender == own_user_id {
        return Some(SkipReason::OwnMessage);
    }
    if msg.is_edit {
        return Some(SkipReason::Edit);
    }
    if !matches!(msg.msgtype, MessageType::Text | MessageType::Emote) {
        return Some(SkipReason::UnsupportedType);
    }
    None
}

/// Turns one incoming message into at most one reply.
#[derive(Clone)]
pub struct MessageHandler {
    resolver: ProposalResolver,
    own_user_id: Arc<str>,
}

impl MessageHandler {
    pub fn new(resolver: ProposalResolver, own_user_id: impl Into<Arc<str>>) -> Self {
        Self {
            resolver,
            own_user_id: own_user_id.into(),
        }
    }

    /// Run the full pipeline for one message.
    ///
    /// `Ok(None)` covers every "nothing to say" case. An error means a
    /// lookup failed and the whole message was abandoned.
    pub async fn handle(&self, msg: &IncomingMessage) -> Result<Option<OutgoingReply>, ResolveError> {
        if let Some(reason) = skip_reason(msg, &self.own_user_id) {
            debug!(event_id = %msg.event_id, reason = reason.label(), "Ignoring message");
            return Ok(None);
        }

        let ids = extract_references(&msg.body);
        if ids.is_empty() {
            debug!(event_id = %msg.event_id, "No proposal references in message");
            return Ok(None);
        }

        let span = debug_span!("resolve", room_id = %msg.room_id, event_id = %msg.event_id);
        let records = self.resolver.resolve_all(&ids).instrument(span).await?;

        let Some(body) = format_reply(&records) else {
            debug!(event_id = %msg.event_id, "No suitable proposals found, not responding");
            return Ok(None);
        };

        Ok(Some(OutgoingReply::from_markdown(body)))
    }
}

/// Handle one message and post the reply, if any.
async fn process_message(channel: Arc<dyn Channel>, handler: MessageHandler, msg: IncomingMessage) {
    let reply = match handler.handle(&msg).await {
        Ok(Some(reply)) => reply,
        Ok(None) => return,
        Err(e) => {
            error!(
                error = %e,
                msc = e.id(),
                room_id = %msg.room_id,
                event_id = %msg.event_id,
                "Failed to query the issue tracker"
            );
            return;
        }
    };

    let latency_ms = (Utc::now() - msg.received_at).num_milliseconds();
    debug!(
        channel = %msg.channel,
        event_id = %msg.event_id,
        latency_ms,
        "Sending response"
    );
    if let Err(e) = channel.respond(&msg, reply).await {
        error!(
            error = %e,
            room_id = %msg.room_id,
            event_id = %msg.event_id,
            "Failed to send response"
        );
    }
}

/// Consume the channel's message stream until it ends.
///
/// Each message is handled on its own task; tasks share nothing mutable.
/// Once the stream ends, in-flight tasks are awaited before the channel
/// shuts down. Dropping the returned future aborts them.
pub async fn run(channel: Arc<dyn Channel>, resolver: ProposalResolver) -> Result<(), ChannelError> {
    let own_user_id = channel.own_user_id().await?;
    info!(channel = channel.name(), user_id = %own_user_id, "Bot identity resolved");

    let handler = MessageHandler::new(resolver, own_user_id);
    let mut stream = channel.start().await?;
    let mut tasks = JoinSet::new();

    while let Some(msg) = stream.next().await {
        tasks.spawn(process_message(Arc::clone(&channel), handler.clone(), msg));
        // Reap finished handlers so the set stays small.
        while let Some(result) = tasks.try_join_next() {
            log_task_result(result);
        }
    }

    warn!(channel = channel.name(), "Message stream ended");
    while let Some(result) = tasks.join_next().await {
        log_task_result(result);
    }
    channel.shutdown().await
}

fn log_task_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        error!(error = %e, "Message handler task failed");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::channels::MessageStream;
    use crate::config::{RepoRef, TrackerConfig};
    use crate::proposals::{IssueLabel, IssueResponse, IssueTracker, IssueUser};

    const BOT: &str = "@bot:example.org";

    struct StubTracker {
        issues: HashMap<String, IssueResponse>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl IssueTracker for StubTracker {
        async fn fetch_issue(
            &self,
            _repo: &RepoRef,
            id: &str,
        ) -> Result<IssueResponse, ResolveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.issues.get(id).cloned().ok_or(ResolveError::Status {
                id: id.to_string(),
                status: 404,
            })
        }
    }

    fn proposal(title: &str, login: &str) -> IssueResponse {
        IssueResponse {
            labels: vec![IssueLabel {
                name: Some("proposal".into()),
            }],
            title: Some(title.into()),
            user: Some(IssueUser {
                login: Some(login.into()),
            }),
        }
    }

    fn handler_with(issues: &[(&str, IssueResponse)]) -> (MessageHandler, Arc<StubTracker>) {
        let tracker = Arc::new(StubTracker {
            issues: issues
                .iter()
                .map(|(id, issue)| (id.to_string(), issue.clone()))
                .collect(),
            calls: AtomicUsize::new(0),
        });
        let resolver = ProposalResolver::new(tracker.clone(), Arc::new(TrackerConfig::default()));
        (MessageHandler::new(resolver, BOT), tracker)
    }

    fn text(body: &str) -> IncomingMessage {
        IncomingMessage::new("test", "!room:example.org", "@alice:example.org", body)
    }

    // ── Dispatch policy ─────────────────────────────────────────────

    #[test]
    fn plain_text_and_emote_are_processed() {
        assert_eq!(skip_reason(&text("msc1"), BOT), None);
        assert_eq!(
            skip_reason(&text("msc1").with_msgtype(MessageType::Emote), BOT),
            None
        );
    }

    #[test]
    fn own_messages_are_skipped() {
        let msg = IncomingMessage::new("test", "!r:x", BOT, "msc1");
        assert_eq!(skip_reason(&msg, BOT), Some(SkipReason::OwnMessage));
    }

    #[test]
    fn edits_are_skipped() {
        assert_eq!(skip_reason(&text("msc1").as_edit(), BOT), Some(SkipReason::Edit));
    }

    #[test]
    fn notices_and_other_types_are_skipped() {
        for kind in [MessageType::Notice, MessageType::Other("m.image".into())] {
            assert_eq!(
                skip_reason(&text("msc1").with_msgtype(kind), BOT),
                Some(SkipReason::UnsupportedType)
            );
        }
    }

    // ── Handler ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn single_reference_gets_plain_reply() {
        let (handler, _) = handler_with(&[("1234", proposal("Example", "alice"))]);
        let reply = handler.handle(&text("what about msc1234?")).await.unwrap().unwrap();
        assert_eq!(
            reply.body,
            "[Example](https://github.com/matrix-org/matrix-spec-proposals/issues/1234) by @alice"
        );
        assert!(reply.formatted_body.starts_with("<a href="));
    }

    #[tokio::test]
    async fn multiple_references_get_prefixed_list() {
        let (handler, _) = handler_with(&[
            ("1", proposal("One", "a")),
            ("2", proposal("Two", "b")),
        ]);
        let reply = handler.handle(&text("MSC2 vs msc1 vs msc2")).await.unwrap().unwrap();
        let lines: Vec<_> = reply.body.split("\n\n").collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("MSC2: [Two]"));
        assert!(lines[1].starts_with("MSC1: [One]"));
    }

    #[tokio::test]
    async fn no_references_means_no_lookup() {
        let (handler, tracker) = handler_with(&[]);
        assert_eq!(handler.handle(&text("hello")).await.unwrap(), None);
        assert_eq!(tracker.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn skipped_messages_never_hit_the_tracker() {
        let (handler, tracker) = handler_with(&[("1", proposal("One", "a"))]);
        let own = IncomingMessage::new("test", "!r:x", BOT, "msc1");
        let notice = text("msc1").with_msgtype(MessageType::Notice);
        let edit = text("msc1").as_edit();

        for msg in [own, notice, edit] {
            assert_eq!(handler.handle(&msg).await.unwrap(), None);
        }
        assert_eq!(tracker.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unlabelled_issues_yield_no_reply() {
        let (handler, _) = handler_with(&[("5", IssueResponse::default())]);
        assert_eq!(handler.handle(&text("msc5")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn fetch_failure_aborts_whole_message() {
        let (handler, tracker) = handler_with(&[
            ("1", proposal("One", "a")),
            ("3", proposal("Three", "c")),
        ]);
        let err = handler.handle(&text("msc1 msc2 msc3")).await.unwrap_err();
        assert_eq!(err.id(), "2");
        assert_eq!(tracker.calls.load(Ordering::SeqCst), 2);
    }

    // ── Run loop ────────────────────────────────────────────────────

    struct ScriptedChannel {
        messages: Mutex<Vec<IncomingMessage>>,
        sent: Mutex<Vec<(String, OutgoingReply)>>,
    }

    #[async_trait]
    impl Channel for ScriptedChannel {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn own_user_id(&self) -> Result<String, ChannelError> {
            Ok(BOT.to_string())
        }

        async fn start(&self) -> Result<MessageStream, ChannelError> {
            let messages = std::mem::take(&mut *self.messages.lock().unwrap());
            Ok(Box::pin(futures::stream::iter(messages)))
        }

        async fn respond(
            &self,
            msg: &IncomingMessage,
            reply: OutgoingReply,
        ) -> Result<(), ChannelError> {
            self.sent.lock().unwrap().push((msg.room_id.clone(), reply));
            Ok(())
        }

        async fn health_check(&self) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn run_replies_only_to_eligible_messages() {
        let tracker = Arc::new(StubTracker {
            issues: HashMap::from([("1234".to_string(), proposal("Example", "alice"))]),
            calls: AtomicUsize::new(0),
        });
        let resolver = ProposalResolver::new(tracker, Arc::new(TrackerConfig::default()));

        let channel = Arc::new(ScriptedChannel {
            messages: Mutex::new(vec![
                text("msc1234").with_event_id("$ok"),
                text("msc1234").with_msgtype(MessageType::Notice),
                IncomingMessage::new("test", "!room:example.org", BOT, "msc1234"),
                text("msc9999"),
            ]),
            sent: Mutex::new(Vec::new()),
        });

        // `run` returns only after every spawned handler has finished.
        run(channel.clone(), resolver).await.unwrap();

        let sent = channel.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "!room:example.org");
        assert!(sent[0].1.body.contains("[Example]"));
    }

    /// Tracker that answers every lookup after a delay.
    struct SlowTracker;

    #[async_trait]
    impl IssueTracker for SlowTracker {
        async fn fetch_issue(
            &self,
            _repo: &RepoRef,
            _id: &str,
        ) -> Result<IssueResponse, ResolveError> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(proposal("Slow", "snail"))
        }
    }

    #[tokio::test]
    async fn run_waits_for_in_flight_handlers() {
        let resolver =
            ProposalResolver::new(Arc::new(SlowTracker), Arc::new(TrackerConfig::default()));
        let channel = Arc::new(ScriptedChannel {
            messages: Mutex::new(vec![text("msc1"), text("msc2"), text("msc3")]),
            sent: Mutex::new(Vec::new()),
        });

        run(channel.clone(), resolver).await.unwrap();

        assert_eq!(channel.sent.lock().unwrap().len(), 3);
    }
}
