//! The relay engine: admission, content assembly, dispatch and correlation
//! of new messages in both directions.
//!
//! The origin platform (Telegram) has many subscriber chats; the
//! destination platform (Discord) has one target channel. Origin messages
//! go to the target channel, preferably under an impersonation identity.
//! Destination messages are broadcast to every subscriber.

use std::sync::Arc;

use {
    tgdc_channels::{
        Attachment, Capabilities, InboundEvent, InboundMessage, OutboundMessage, Persona,
        Platform, PlatformClient,
    },
    tokio::sync::mpsc,
    tracing::{Instrument, debug, info, info_span, warn},
};

#[cfg(feature = "metrics")]
use tgdc_metrics::{counter, histogram, relay as relay_metrics};

use crate::{
    Error,
    broadcast::fan_out,
    correlation::MessageRef,
    identity::IdentityCache,
    media::{LocalBlob, MediaPipeline},
    render::{self, TextParts},
    store::{PollMirror, Store},
    subscribers::SubscriberRegistry,
};

/// Tunables of the engine.
#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Raw text is cut to this many characters before rendering.
    pub max_body_chars: usize,
    /// Name of the identity used to post on the destination.
    pub identity_name: String,
    /// Copy origin messages to the other origin subscribers too.
    pub echo_to_subscribers: bool,
    /// Messages starting with this are bot commands and never relayed.
    pub command_prefix: char,
    /// Destination channel used when the store has no override.
    pub target_channel: Option<String>,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            max_body_chars: 2000,
            identity_name: "Bridge".into(),
            echo_to_subscribers: true,
            command_prefix: '/',
            target_channel: None,
        }
    }
}

/// Why an event was deliberately not relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppressed {
    Disabled,
    DoNotDisturb,
    /// Sent by a bot or webhook, possibly the relay itself.
    SelfLoop,
    Command,
    /// Destination message outside the target channel.
    ForeignChannel,
    NoTarget,
    NoSubscribers,
    /// Edit, delete or vote for a message that was never relayed.
    NotCorrelated,
    /// Edit or delete of a relay-produced copy.
    MirrorEcho,
    /// Vote change reported by the copy of a poll, not the original.
    NonOwningPoll,
    /// Poll mirror rendered once as text; vote changes are not pushed.
    StaticPoll,
    UnknownPlatform,
}

impl Suppressed {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::DoNotDisturb => "do_not_disturb",
            Self::SelfLoop => "self_loop",
            Self::Command => "command",
            Self::ForeignChannel => "foreign_channel",
            Self::NoTarget => "no_target",
            Self::NoSubscribers => "no_subscribers",
            Self::NotCorrelated => "not_correlated",
            Self::MirrorEcho => "mirror_echo",
            Self::NonOwningPoll => "non_owning_poll",
            Self::StaticPoll => "static_poll",
            Self::UnknownPlatform => "unknown_platform",
        }
    }
}

/// Terminal state of one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// New message relayed; `mirror` is the correlated copy.
    Forwarded {
        mirror: MessageRef,
        deliveries: usize,
    },
    Edited {
        mirror: MessageRef,
    },
    Deleted {
        mirror: MessageRef,
    },
    /// The mirror no longer exists remotely; its correlation was dropped.
    Pruned {
        mirror: MessageRef,
    },
    Suppressed(Suppressed),
    Failed {
        reason: String,
    },
}

impl Outcome {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Forwarded { .. } => "forwarded",
            Self::Edited { .. } => "edited",
            Self::Deleted { .. } => "deleted",
            Self::Pruned { .. } => "pruned",
            Self::Suppressed(_) => "suppressed",
            Self::Failed { .. } => "failed",
        }
    }

    pub(crate) fn failed(reason: impl std::fmt::Display) -> Self {
        Self::Failed {
            reason: reason.to_string(),
        }
    }
}

/// Content shared by every send of one inbound message.
pub(crate) struct Prepared {
    pub body: Option<String>,
    pub notice: Option<String>,
    pub blob: Option<LocalBlob>,
    pub poll: Option<PollMirror>,
}

impl Prepared {
    fn outbound(&self, text: String, reply_to: Option<String>) -> OutboundMessage {
        OutboundMessage {
            text,
            attachment: self.blob.as_ref().map(LocalBlob::as_outbound),
            reply_to,
        }
    }
}

/// Where a reply should point on the side a message is relayed to.
#[derive(Debug, Default, Clone)]
pub(crate) struct ReplyTarget {
    /// The replied-to message has a copy on the relayed-to side.
    pub peer: Option<MessageRef>,
    /// The incoming message is a reply at all.
    pub is_reply: bool,
}

pub struct Relay {
    pub(crate) origin: Arc<dyn PlatformClient>,
    pub(crate) destination: Arc<dyn PlatformClient>,
    pub(crate) store: Arc<Store>,
    pub(crate) subscribers: Arc<SubscriberRegistry>,
    pub(crate) identities: IdentityCache,
    pub(crate) media: Arc<MediaPipeline>,
    pub(crate) options: RelayOptions,
}

impl Relay {
    pub fn new(
        origin: Arc<dyn PlatformClient>,
        destination: Arc<dyn PlatformClient>,
        store: Arc<Store>,
        subscribers: Arc<SubscriberRegistry>,
        media: Arc<MediaPipeline>,
        options: RelayOptions,
    ) -> Self {
        let identities = IdentityCache::new(Arc::clone(&destination), options.identity_name.clone());
        Self {
            origin,
            destination,
            store,
            subscribers,
            identities,
            media,
            options,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Consume one platform's event stream until its sender is dropped.
    /// Events of the stream are handled one at a time, in order.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<InboundEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        debug!("relay event stream closed");
    }

    /// Handle one event to completion. Never fails; the outcome is logged
    /// and returned for callers that care.
    pub async fn handle(&self, event: InboundEvent) -> Outcome {
        let span = info_span!(
            "relay",
            platform = %event.platform(),
            kind = event.kind(),
            message_id = event.message_id(),
        );
        async move {
            #[cfg(feature = "metrics")]
            let start = std::time::Instant::now();

            let outcome = self.dispatch(event).await;

            match &outcome {
                Outcome::Forwarded { mirror, deliveries } => {
                    info!(mirror = %mirror, deliveries, "message relayed");
                },
                Outcome::Edited { mirror } => info!(mirror = %mirror, "edit mirrored"),
                Outcome::Deleted { mirror } => info!(mirror = %mirror, "delete mirrored"),
                Outcome::Pruned { mirror } => {
                    info!(mirror = %mirror, "mirror gone remotely, correlation dropped");
                },
                Outcome::Suppressed(reason) => debug!(reason = reason.as_str(), "event suppressed"),
                Outcome::Failed { reason } => warn!(%reason, "event dropped"),
            }

            #[cfg(feature = "metrics")]
            {
                counter!(relay_metrics::EVENTS_TOTAL, "outcome" => outcome.label()).increment(1);
                histogram!(relay_metrics::HANDLE_DURATION_SECONDS)
                    .record(start.elapsed().as_secs_f64());
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&self, event: InboundEvent) -> Outcome {
        let platform = event.platform();
        if self.client_for(platform).is_none() {
            return Outcome::Suppressed(Suppressed::UnknownPlatform);
        }
        match event {
            InboundEvent::NewMessage(msg) if platform == self.origin.platform() => {
                self.forward_from_origin(msg).await
            },
            InboundEvent::NewMessage(msg) => self.broadcast_from_destination(msg).await,
            InboundEvent::Edited(msg) => self.mirror_edit(msg).await,
            InboundEvent::Deleted {
                platform,
                chat_id,
                message_id,
            } => {
                self.mirror_delete(MessageRef::new(platform, chat_id, message_id))
                    .await
            },
            InboundEvent::PollVoteChanged {
                platform,
                chat_id,
                message_id,
                poll,
            } => {
                self.poll_update(MessageRef::new(platform, chat_id, message_id), &poll)
                    .await
            },
        }
    }

    pub(crate) fn client_for(&self, platform: Platform) -> Option<&dyn PlatformClient> {
        if platform == self.origin.platform() {
            Some(self.origin.as_ref())
        } else if platform == self.destination.platform() {
            Some(self.destination.as_ref())
        } else {
            None
        }
    }

    /// Target channel: the store's override, else the configured one.
    pub(crate) async fn target_channel(&self) -> Option<String> {
        self.store
            .settings()
            .await
            .target_channel
            .or_else(|| self.options.target_channel.clone())
    }

    // ── origin → destination ────────────────────────────────────────────

    async fn forward_from_origin(&self, msg: InboundMessage) -> Outcome {
        if !msg.sender.is_bot
            && let Err(e) = self.subscribers.register(&msg.chat_id).await
        {
            warn!(chat_id = %msg.chat_id, error = %e, "failed to register subscriber");
        }

        let settings = self.store.settings().await;
        if !settings.enabled {
            return Outcome::Suppressed(Suppressed::Disabled);
        }
        if msg.sender.is_bot {
            return Outcome::Suppressed(Suppressed::SelfLoop);
        }
        if self.is_command(&msg) {
            return Outcome::Suppressed(Suppressed::Command);
        }
        let Some(target) = self.target_channel().await else {
            return Outcome::Suppressed(Suppressed::NoTarget);
        };

        let caps = self.destination.capabilities();
        let prepared = match self.prepare(self.origin.as_ref(), &msg, &caps).await {
            Ok(prepared) => prepared,
            Err(e) => return Outcome::failed(e),
        };
        let reply = self.reply_target(&msg).await;
        let (native_reply, marker) =
            self.reply_rendering(self.destination.as_ref(), &caps, &reply, &target);

        let source = MessageRef::new(msg.platform, msg.chat_id.clone(), msg.message_id.clone());
        let (mirror_id, impersonated) = match self
            .send_to_destination(&msg, &target, &caps, &prepared, native_reply, marker.as_deref())
            .await
        {
            Ok(sent) => sent,
            Err(e) => return Outcome::failed(format!("destination send failed: {e}")),
        };
        let mirror = MessageRef::new(self.destination.platform(), target, mirror_id);

        self.record_link(&source, &mirror, impersonated, prepared.poll.clone())
            .await;

        let mut deliveries = 1;
        if self.options.echo_to_subscribers {
            deliveries += self.echo_to_origin(&msg, &prepared).await;
        }
        Outcome::Forwarded { mirror, deliveries }
    }

    /// Send to the target channel, through the identity when possible.
    /// Returns the new message id and whether it was impersonated.
    async fn send_to_destination(
        &self,
        msg: &InboundMessage,
        target: &str,
        caps: &Capabilities,
        prepared: &Prepared,
        native_reply: Option<String>,
        marker: Option<&str>,
    ) -> crate::Result<(String, bool)> {
        let allow_empty = prepared.blob.is_some();

        if caps.impersonation {
            match self.identities.resolve(target).await {
                Ok(identity) => {
                    let persona = Persona {
                        display_name: render::persona_name(&msg.sender.display_name),
                        avatar_url: self.origin.sender_avatar(&msg.sender.id).await,
                    };
                    let text = render::compose_text(
                        caps,
                        self.options.max_body_chars,
                        &TextParts {
                            header: None,
                            marker,
                            body: prepared.body.as_deref(),
                            notice: prepared.notice.as_deref(),
                        },
                        allow_empty,
                    );
                    let outbound = prepared.outbound(text, native_reply.clone());
                    match self
                        .destination
                        .send_message_as(target, &identity, &persona, &outbound)
                        .await
                    {
                        Ok(id) => return Ok((id, true)),
                        Err(e) if e.is_not_found() => {
                            warn!(channel_id = %target, "identity gone, sending as the bridge");
                            self.identities.invalidate(target);
                        },
                        Err(e) => warn!(
                            channel_id = %target,
                            error = %e,
                            "impersonated send failed, sending as the bridge"
                        ),
                    }
                },
                Err(e) => {
                    debug!(channel_id = %target, error = %e, "no identity, sending as the bridge");
                },
            }
        }

        let header = render::author_header(caps.markup, msg.platform, &msg.sender.display_name);
        let text = render::compose_text(
            caps,
            self.options.max_body_chars,
            &TextParts {
                header: Some(&header),
                marker,
                body: prepared.body.as_deref(),
                notice: prepared.notice.as_deref(),
            },
            allow_empty,
        );
        let outbound = prepared.outbound(text, native_reply);
        let id = self.destination.send_message(target, &outbound).await?;
        Ok((id, false))
    }

    /// Copy an origin message to the other origin subscribers. Untracked.
    async fn echo_to_origin(&self, msg: &InboundMessage, prepared: &Prepared) -> usize {
        let subscribers = self.subscribers.list().await;
        if subscribers.iter().all(|c| *c == msg.chat_id) {
            return 0;
        }
        let caps = self.origin.capabilities();
        let header = render::author_header(caps.markup, msg.platform, &msg.sender.display_name);
        let text = render::compose_text(
            &caps,
            self.options.max_body_chars,
            &TextParts {
                header: Some(&header),
                marker: None,
                body: prepared.body.as_deref(),
                notice: prepared.notice.as_deref(),
            },
            prepared.blob.is_some(),
        );
        let report = fan_out(
            self.origin.as_ref(),
            &subscribers,
            Some(&msg.chat_id),
            |_| prepared.outbound(text.clone(), None),
        )
        .await;
        report.delivered.len()
    }

    // ── destination → origin ────────────────────────────────────────────

    async fn broadcast_from_destination(&self, msg: InboundMessage) -> Outcome {
        let settings = self.store.settings().await;
        if !settings.enabled {
            return Outcome::Suppressed(Suppressed::Disabled);
        }
        if settings.do_not_disturb {
            return Outcome::Suppressed(Suppressed::DoNotDisturb);
        }
        if msg.sender.is_bot {
            return Outcome::Suppressed(Suppressed::SelfLoop);
        }
        let Some(target) = self.target_channel().await else {
            return Outcome::Suppressed(Suppressed::NoTarget);
        };
        if msg.chat_id != target {
            return Outcome::Suppressed(Suppressed::ForeignChannel);
        }
        let subscribers = self.subscribers.list().await;
        if subscribers.is_empty() {
            return Outcome::Suppressed(Suppressed::NoSubscribers);
        }

        let caps = self.origin.capabilities();
        let prepared = match self.prepare(self.destination.as_ref(), &msg, &caps).await {
            Ok(prepared) => prepared,
            Err(e) => return Outcome::failed(e),
        };
        let reply = self.reply_target(&msg).await;
        let header = render::author_header(caps.markup, msg.platform, &msg.sender.display_name);
        let allow_empty = prepared.blob.is_some();

        let report = fan_out(self.origin.as_ref(), &subscribers, None, |chat_id| {
            let (native_reply, marker) =
                self.reply_rendering(self.origin.as_ref(), &caps, &reply, chat_id);
            let text = render::compose_text(
                &caps,
                self.options.max_body_chars,
                &TextParts {
                    header: Some(&header),
                    marker: marker.as_deref(),
                    body: prepared.body.as_deref(),
                    notice: prepared.notice.as_deref(),
                },
                allow_empty,
            );
            prepared.outbound(text, native_reply)
        })
        .await;

        let Some(mirror) = report.canonical().cloned() else {
            return Outcome::failed(format!(
                "no subscriber accepted the message ({} failed)",
                report.failures.len()
            ));
        };
        let source = MessageRef::new(msg.platform, msg.chat_id.clone(), msg.message_id.clone());
        self.record_link(&source, &mirror, false, prepared.poll.clone())
            .await;

        let extras = msg.attachments().get(1..).unwrap_or_default();
        if !extras.is_empty() {
            self.send_follow_ups(extras, &subscribers, &caps).await;
        }

        Outcome::Forwarded {
            mirror,
            deliveries: report.delivered.len(),
        }
    }

    /// Relay attachments beyond the first as separate, untracked messages.
    async fn send_follow_ups(
        &self,
        extras: &[Attachment],
        subscribers: &[String],
        caps: &Capabilities,
    ) {
        for attachment in extras {
            let (blob, notice) = match self
                .media
                .transfer(self.destination.as_ref(), attachment, caps.max_upload_bytes)
                .await
            {
                Ok(blob) => (Some(blob), None),
                Err(Error::SizeExceeded { kind, size, cap }) => {
                    (None, Some(render::too_large_notice(kind, size, cap)))
                },
                Err(e) => {
                    warn!(error = %e, "follow-up attachment dropped");
                    continue;
                },
            };
            let text = notice
                .as_deref()
                .map(|n| escape_for(caps, n))
                .unwrap_or_default();
            let outbound = OutboundMessage {
                text,
                attachment: blob.as_ref().map(LocalBlob::as_outbound),
                reply_to: None,
            };
            fan_out(self.origin.as_ref(), subscribers, None, |_| outbound.clone()).await;
        }
    }

    // ── shared steps ────────────────────────────────────────────────────

    async fn record_link(
        &self,
        source: &MessageRef,
        mirror: &MessageRef,
        impersonated: bool,
        poll: Option<PollMirror>,
    ) {
        match self.store.link(source, mirror, impersonated, poll).await {
            Ok(()) => {},
            Err(e @ Error::DuplicateLink { .. }) => {
                warn!(source = %source, mirror = %mirror, error = %e, "correlation rejected");
            },
            Err(e) => {
                warn!(
                    source = %source,
                    mirror = %mirror,
                    error = %e,
                    "correlation recorded but not persisted"
                );
            },
        }
    }

    fn is_command(&self, msg: &InboundMessage) -> bool {
        msg.text
            .as_deref()
            .map(str::trim_start)
            .is_some_and(|t| t.starts_with(self.options.command_prefix))
    }

    /// Collect body, first attachment and poll state of `msg`.
    ///
    /// Oversized media degrades to a notice; a failed download fails the
    /// whole event.
    pub(crate) async fn prepare(
        &self,
        source: &dyn PlatformClient,
        msg: &InboundMessage,
        dest_caps: &Capabilities,
    ) -> crate::Result<Prepared> {
        if let Some(poll) = msg.poll() {
            return Ok(Prepared {
                body: Some(render::render_poll(poll)),
                notice: None,
                blob: None,
                poll: Some(PollMirror {
                    owner: msg.platform,
                    live: dest_caps.live_polls,
                    author: Some(msg.sender.display_name.clone()),
                }),
            });
        }

        let body = msg.body().map(str::to_string);
        let Some(attachment) = msg.attachments().first() else {
            return Ok(Prepared {
                body,
                notice: None,
                blob: None,
                poll: None,
            });
        };

        if !attachment.kind.is_transferable() {
            let notice = match &attachment.url {
                Some(url) => format!("{}: {url}", attachment.kind.label()),
                None => format!("[{}]", attachment.kind.label()),
            };
            return Ok(Prepared {
                body,
                notice: Some(notice),
                blob: None,
                poll: None,
            });
        }

        match self
            .media
            .transfer(source, attachment, dest_caps.max_upload_bytes)
            .await
        {
            Ok(blob) => Ok(Prepared {
                body,
                notice: None,
                blob: Some(blob),
                poll: None,
            }),
            Err(Error::SizeExceeded { kind, size, cap }) => {
                info!(kind, size, cap, "attachment too large, relaying a notice instead");
                Ok(Prepared {
                    body,
                    notice: Some(render::too_large_notice(kind, size, cap)),
                    blob: None,
                    poll: None,
                })
            },
            Err(e) => Err(e),
        }
    }

    /// Look up the copy of the message `msg` replies to.
    pub(crate) async fn reply_target(&self, msg: &InboundMessage) -> ReplyTarget {
        let Some(reply_to) = &msg.reply_to else {
            return ReplyTarget::default();
        };
        let replied = MessageRef::new(msg.platform, msg.chat_id.clone(), reply_to.clone());
        ReplyTarget {
            peer: self.store.lookup(&replied).await.map(|c| c.peer),
            is_reply: true,
        }
    }

    /// Native reply id and/or marker text for a send into `chat_id`.
    ///
    /// A deep link is preferred; native threading works only inside the
    /// chat that holds the replied-to copy.
    pub(crate) fn reply_rendering(
        &self,
        client: &dyn PlatformClient,
        caps: &Capabilities,
        reply: &ReplyTarget,
        chat_id: &str,
    ) -> (Option<String>, Option<String>) {
        if !reply.is_reply {
            return (None, None);
        }
        let Some(peer) = &reply.peer else {
            return (None, Some(render::reply_marker(caps.markup, None)));
        };
        if let Some(link) = client.message_link(&peer.chat_id, &peer.message_id) {
            return (None, Some(render::reply_marker(caps.markup, Some(&link))));
        }
        if peer.chat_id == chat_id {
            return (Some(peer.message_id.clone()), None);
        }
        (None, Some(render::reply_marker(caps.markup, None)))
    }
}

fn escape_for(caps: &Capabilities, text: &str) -> String {
    match caps.markup {
        tgdc_channels::Markup::Html => render::escape_html(text),
        tgdc_channels::Markup::Markdown => text.to_string(),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::test_support::{EventExt, Harness, attachment, dc_message, tg_message},
        tgdc_channels::{AttachmentKind, MessageContent, PollOption, PollSnapshot, StickerFormat},
    };

    const MIB: u64 = 1024 * 1024;

    #[tokio::test]
    async fn forward_records_pair() {
        let h = Harness::new(&["42"]).await;
        let outcome = h.relay.handle(tg_message("42", "100", "hello")).await;

        let mirror = MessageRef::new(Platform::Discord, "900", "D1");
        assert_eq!(outcome, Outcome::Forwarded {
            mirror: mirror.clone(),
            deliveries: 1,
        });
        let forward = h.store.lookup(&MessageRef::new(Platform::Telegram, "42", "100")).await;
        assert_eq!(forward.unwrap().peer, mirror);
        let back = h.store.lookup(&mirror).await.unwrap();
        assert_eq!(back.peer.message_id, "100");

        let sent = h.discord.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, "hello");
        assert_eq!(sent[0].persona.as_deref(), Some("Ann"));
    }

    #[tokio::test]
    async fn new_origin_chat_is_registered() {
        let h = Harness::new(&[]).await;
        h.relay.handle(tg_message("77", "1", "hi")).await;
        assert!(h.subscribers.contains("77").await);
    }

    #[tokio::test]
    async fn identity_failure_falls_back_to_header() {
        let h = Harness::new(&["42"]).await;
        h.discord.fail_identities(true);
        let outcome = h.relay.handle(tg_message("42", "100", "hello")).await;

        assert_eq!(outcome.label(), "forwarded");
        let sent = h.discord.sent();
        assert_eq!(sent[0].text, "**[TG | Ann]**\nhello");
        assert!(sent[0].persona.is_none());
        let record = h
            .store
            .lookup(&MessageRef::new(Platform::Telegram, "42", "100"))
            .await
            .unwrap();
        assert!(!record.impersonated);
    }

    #[tokio::test]
    async fn deleted_webhook_is_recreated_next_time() {
        let h = Harness::new(&["42"]).await;
        h.relay.handle(tg_message("42", "1", "a")).await;
        h.discord.drop_identities();
        let outcome = h.relay.handle(tg_message("42", "2", "b")).await;
        assert_eq!(outcome.label(), "forwarded");
        assert!(h.discord.sent()[1].persona.is_none());

        h.relay.handle(tg_message("42", "3", "c")).await;
        assert_eq!(h.discord.identities_created(), 2);
        assert!(h.discord.sent()[2].persona.is_some());
    }

    #[tokio::test]
    async fn bots_and_commands_are_not_relayed() {
        let h = Harness::new(&["42"]).await;
        let mut bot = tg_message("42", "1", "beep");
        if let InboundEvent::NewMessage(m) = &mut bot {
            m.sender.is_bot = true;
        }
        assert_eq!(
            h.relay.handle(bot).await,
            Outcome::Suppressed(Suppressed::SelfLoop)
        );
        assert_eq!(
            h.relay.handle(tg_message("42", "2", "/status")).await,
            Outcome::Suppressed(Suppressed::Command)
        );
        assert!(h.discord.sent().is_empty());
    }

    #[tokio::test]
    async fn disabled_bridge_relays_nothing() {
        let h = Harness::new(&["42"]).await;
        h.store.set_enabled(false).await.unwrap();
        assert_eq!(
            h.relay.handle(tg_message("42", "1", "x")).await,
            Outcome::Suppressed(Suppressed::Disabled)
        );
        assert_eq!(
            h.relay.handle(dc_message("900", "5", "y")).await,
            Outcome::Suppressed(Suppressed::Disabled)
        );
    }

    #[tokio::test]
    async fn do_not_disturb_gates_only_destination_side() {
        let h = Harness::new(&["42"]).await;
        h.store.set_do_not_disturb(true).await.unwrap();
        assert_eq!(
            h.relay.handle(dc_message("900", "5", "y")).await,
            Outcome::Suppressed(Suppressed::DoNotDisturb)
        );
        assert_eq!(h.relay.handle(tg_message("42", "1", "x")).await.label(), "forwarded");
    }

    #[tokio::test]
    async fn missing_target_suppresses() {
        let h = Harness::without_target(&["42"]).await;
        assert_eq!(
            h.relay.handle(tg_message("42", "1", "x")).await,
            Outcome::Suppressed(Suppressed::NoTarget)
        );
        h.store.set_target_channel(Some("900".into())).await.unwrap();
        assert_eq!(h.relay.handle(tg_message("42", "2", "x")).await.label(), "forwarded");
    }

    #[tokio::test]
    async fn oversize_attachment_becomes_notice_and_still_correlates() {
        let h = Harness::new(&["42"]).await;
        let mut item = attachment("vid", AttachmentKind::Video);
        item.size = Some(9 * MIB);
        let event = InboundEvent::NewMessage(InboundMessage {
            content: MessageContent::Media(vec![item]),
            ..tg_message("42", "300", "clip").into_message()
        });

        let outcome = h.relay.handle(event).await;
        assert_eq!(outcome.label(), "forwarded");
        assert_eq!(h.telegram.fetch_count(), 0);
        let sent = h.discord.sent();
        assert!(sent[0].file.is_none());
        assert_eq!(
            sent[0].text,
            "clip\n[video too large to relay: 9.0 MiB, limit 8.0 MiB]"
        );
        assert!(
            h.store
                .lookup(&MessageRef::new(Platform::Telegram, "42", "300"))
                .await
                .is_some()
        );
    }

    #[tokio::test]
    async fn attachment_is_uploaded_and_cleaned_up() {
        let h = Harness::new(&["42"]).await;
        h.telegram.put_file("stk", b"RIFF".to_vec());
        let event = InboundEvent::NewMessage(InboundMessage {
            content: MessageContent::Media(vec![attachment(
                "stk",
                AttachmentKind::Sticker(StickerFormat::Raster),
            )]),
            text: None,
            ..tg_message("42", "5", "").into_message()
        });

        h.relay.handle(event).await;
        let sent = h.discord.sent();
        assert_eq!(sent[0].file.as_deref(), Some("sticker.webp"));
        assert_eq!(sent[0].text, "");
        assert_eq!(std::fs::read_dir(h.media.dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn transfer_failure_fails_without_correlation() {
        let h = Harness::new(&["42"]).await;
        let event = InboundEvent::NewMessage(InboundMessage {
            content: MessageContent::Media(vec![attachment("gone", AttachmentKind::Photo)]),
            ..tg_message("42", "6", "pic").into_message()
        });

        assert_eq!(h.relay.handle(event).await.label(), "failed");
        assert!(h.discord.sent().is_empty());
        assert!(h.store.is_empty().await);
    }

    #[tokio::test]
    async fn lottie_sticker_is_relayed_as_link() {
        let h = Harness::new(&["42"]).await;
        let mut item = attachment("lot", AttachmentKind::Sticker(StickerFormat::Lottie));
        item.url = Some("https://cdn.example/lot.json".into());
        let event = InboundEvent::NewMessage(InboundMessage {
            content: MessageContent::Media(vec![item]),
            text: None,
            ..dc_message("900", "8", "").into_message()
        });

        h.relay.handle(event).await;
        let sent = h.telegram.sent();
        assert_eq!(
            sent[0].text,
            "<b>[DC | Bob]</b>\nsticker: https://cdn.example/lot.json"
        );
    }

    #[tokio::test]
    async fn reply_on_destination_uses_deep_link() {
        let h = Harness::new(&["42"]).await;
        h.relay.handle(tg_message("42", "100", "question")).await;

        let reply = InboundEvent::NewMessage(InboundMessage {
            reply_to: Some("100".into()),
            ..tg_message("42", "101", "answer").into_message()
        });
        h.relay.handle(reply).await;

        let sent = h.discord.sent();
        assert_eq!(
            sent[1].text,
            "⤴️ [In reply to](https://chat.example/900/D1)\nanswer"
        );
    }

    #[tokio::test]
    async fn reply_on_origin_is_native_in_the_same_chat_only() {
        let h = Harness::new(&["42", "43"]).await;
        // Discord message 5 is broadcast; the canonical copy lands in chat 42.
        h.relay.handle(dc_message("900", "5", "first")).await;
        h.telegram.clear();

        let reply = InboundEvent::NewMessage(InboundMessage {
            reply_to: Some("5".into()),
            ..dc_message("900", "6", "second").into_message()
        });
        h.relay.handle(reply).await;

        let sent = h.telegram.sent();
        assert_eq!(sent[0].chat_id, "42");
        assert_eq!(sent[0].reply_to.as_deref(), Some("T1"));
        assert_eq!(sent[0].text, "<b>[DC | Bob]</b>\nsecond");
        assert_eq!(sent[1].chat_id, "43");
        assert!(sent[1].reply_to.is_none());
        assert_eq!(sent[1].text, "<b>[DC | Bob]</b>\n↪ in reply to\nsecond");
    }

    #[tokio::test]
    async fn broadcast_with_one_failing_subscriber() {
        let h = Harness::new(&["a", "b", "c"]).await;
        h.telegram.fail_chat("b");

        let outcome = h.relay.handle(dc_message("900", "5", "hey")).await;
        match outcome {
            Outcome::Forwarded { mirror, deliveries } => {
                assert_eq!(deliveries, 2);
                assert_eq!(mirror.chat_id, "a");
            },
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(h.telegram.sent_to(), vec!["a", "c"]);
        assert_eq!(h.store.len().await, 2);
    }

    #[tokio::test]
    async fn broadcast_with_all_failing_is_failed() {
        let h = Harness::new(&["a"]).await;
        h.telegram.fail_chat("a");
        assert_eq!(h.relay.handle(dc_message("900", "5", "hey")).await.label(), "failed");
        assert!(h.store.is_empty().await);
    }

    #[tokio::test]
    async fn foreign_channel_is_ignored() {
        let h = Harness::new(&["a"]).await;
        assert_eq!(
            h.relay.handle(dc_message("901", "5", "hey")).await,
            Outcome::Suppressed(Suppressed::ForeignChannel)
        );
    }

    #[tokio::test]
    async fn origin_message_is_echoed_to_other_subscribers() {
        let h = Harness::new(&["42", "43", "44"]).await;
        let outcome = h.relay.handle(tg_message("42", "1", "hi & bye")).await;

        assert_eq!(outcome, Outcome::Forwarded {
            mirror: MessageRef::new(Platform::Discord, "900", "D1"),
            deliveries: 3,
        });
        assert_eq!(h.telegram.sent_to(), vec!["43", "44"]);
        assert_eq!(h.telegram.sent()[0].text, "<b>[TG | Ann]</b>\nhi &amp; bye");
        // Echoes are untracked.
        assert_eq!(h.store.len().await, 2);
    }

    #[tokio::test]
    async fn extra_attachments_follow_up_untracked() {
        let h = Harness::new(&["a"]).await;
        h.discord.put_file("one", b"1".to_vec());
        h.discord.put_file("two", b"2".to_vec());
        let event = InboundEvent::NewMessage(InboundMessage {
            content: MessageContent::Media(vec![
                attachment("one", AttachmentKind::Document),
                attachment("two", AttachmentKind::Document),
            ]),
            ..dc_message("900", "5", "files").into_message()
        });

        h.relay.handle(event).await;
        let sent = h.telegram.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].file.is_some());
        assert_eq!(sent[1].text, "");
        assert!(sent[1].file.is_some());
        assert_eq!(h.store.len().await, 2);
    }

    #[tokio::test]
    async fn poll_from_origin_is_tagged_live() {
        let h = Harness::new(&["42"]).await;
        let poll = PollSnapshot {
            question: "Tea?".into(),
            options: vec![PollOption {
                text: "Yes".into(),
                votes: 0,
            }],
            anonymous: false,
            closed: false,
        };
        let event = InboundEvent::NewMessage(InboundMessage {
            content: MessageContent::Poll(poll),
            text: None,
            ..tg_message("42", "9", "").into_message()
        });

        h.relay.handle(event).await;
        let tag = h
            .store
            .poll_mirror(&MessageRef::new(Platform::Discord, "900", "D1"))
            .await
            .unwrap();
        assert_eq!(tag.owner, Platform::Telegram);
        assert!(tag.live);
        assert!(h.discord.sent()[0].text.starts_with("📊 Tea?"));
    }
}
