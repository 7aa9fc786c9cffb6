//! Propagation of edits, deletions and poll vote changes from a source
//! message to its correlated mirror.
//!
//! Nothing here creates correlations. A mirror that turns out to be gone
//! remotely has its pair dropped and is never recreated.

use {
    tgdc_channels::{Identity, InboundMessage, Platform, PollSnapshot},
    tracing::{debug, warn},
};

use crate::{
    correlation::{MessageRef, Role},
    engine::{Outcome, Relay, Suppressed},
    render::{self, TextParts},
};

impl Relay {
    /// Bridge switches apply to follow-up events exactly as to new
    /// messages.
    async fn gate(&self, from: Platform) -> Option<Outcome> {
        let settings = self.store.settings().await;
        if !settings.enabled {
            return Some(Outcome::Suppressed(Suppressed::Disabled));
        }
        if settings.do_not_disturb && from == self.destination.platform() {
            return Some(Outcome::Suppressed(Suppressed::DoNotDisturb));
        }
        None
    }

    pub(crate) async fn mirror_edit(&self, msg: InboundMessage) -> Outcome {
        if let Some(outcome) = self.gate(msg.platform).await {
            return outcome;
        }

        let source = MessageRef::new(msg.platform, msg.chat_id.clone(), msg.message_id.clone());
        let Some(record) = self.store.lookup(&source).await else {
            return Outcome::Suppressed(Suppressed::NotCorrelated);
        };
        if record.role == Role::Mirror {
            return Outcome::Suppressed(Suppressed::MirrorEcho);
        }
        let mirror = record.peer;
        let Some(client) = self.client_for(mirror.platform) else {
            return Outcome::Suppressed(Suppressed::UnknownPlatform);
        };
        let caps = client.capabilities();

        let body = match msg.poll() {
            Some(poll) => Some(render::render_poll(poll)),
            None => msg.body().map(str::to_string),
        };
        let header = (!record.impersonated).then(|| {
            render::author_header(caps.markup, msg.platform, &msg.sender.display_name)
        });
        let reply = self.reply_target(&msg).await;
        let (_, marker) = self.reply_rendering(client, &caps, &reply, &mirror.chat_id);
        let text = render::compose_text(
            &caps,
            self.options.max_body_chars,
            &TextParts {
                header: header.as_deref(),
                marker: marker.as_deref(),
                body: body.as_deref(),
                notice: None,
            },
            !msg.attachments().is_empty(),
        );

        self.push_edit(&source, mirror, &text, record.impersonated)
            .await
    }

    pub(crate) async fn mirror_delete(&self, source: MessageRef) -> Outcome {
        if let Some(outcome) = self.gate(source.platform).await {
            return outcome;
        }
        let Some(record) = self.store.lookup(&source).await else {
            return Outcome::Suppressed(Suppressed::NotCorrelated);
        };
        if record.role == Role::Mirror {
            return Outcome::Suppressed(Suppressed::MirrorEcho);
        }
        let mirror = record.peer;

        if let Some(client) = self.client_for(mirror.platform) {
            let identity = if record.impersonated {
                self.identities.resolve(&mirror.chat_id).await.ok()
            } else {
                None
            };
            if let Err(e) = client
                .delete_message(&mirror.chat_id, &mirror.message_id, identity.as_ref())
                .await
            {
                if e.is_not_found() {
                    debug!(mirror = %mirror, "mirror already gone");
                } else {
                    warn!(mirror = %mirror, error = %e, "failed to delete mirror");
                }
            }
        }

        if let Err(e) = self.store.unlink(&source).await {
            warn!(source = %source, error = %e, "failed to drop correlation");
        }
        Outcome::Deleted { mirror }
    }

    pub(crate) async fn poll_update(&self, message: MessageRef, poll: &PollSnapshot) -> Outcome {
        if let Some(outcome) = self.gate(message.platform).await {
            return outcome;
        }
        let Some(tag) = self.store.poll_mirror(&message).await else {
            return Outcome::Suppressed(Suppressed::NotCorrelated);
        };
        if tag.owner != message.platform {
            return Outcome::Suppressed(Suppressed::NonOwningPoll);
        }
        if !tag.live {
            return Outcome::Suppressed(Suppressed::StaticPoll);
        }
        let Some(record) = self.store.lookup(&message).await else {
            return Outcome::Suppressed(Suppressed::NotCorrelated);
        };
        let mirror = record.peer;
        let Some(client) = self.client_for(mirror.platform) else {
            return Outcome::Suppressed(Suppressed::UnknownPlatform);
        };

        let caps = client.capabilities();
        let header = tag
            .author
            .as_deref()
            .filter(|_| !record.impersonated)
            .map(|author| render::author_header(caps.markup, tag.owner, author));
        let text = render::compose_text(
            &caps,
            self.options.max_body_chars,
            &TextParts {
                header: header.as_deref(),
                body: Some(&render::render_poll(poll)),
                ..Default::default()
            },
            false,
        );
        self.push_edit(&message, mirror, &text, record.impersonated)
            .await
    }

    async fn push_edit(
        &self,
        source: &MessageRef,
        mirror: MessageRef,
        text: &str,
        impersonated: bool,
    ) -> Outcome {
        let Some(client) = self.client_for(mirror.platform) else {
            return Outcome::Suppressed(Suppressed::UnknownPlatform);
        };
        let identity: Option<Identity> = if impersonated {
            match self.identities.resolve(&mirror.chat_id).await {
                Ok(identity) => Some(identity),
                Err(e) => return Outcome::failed(e),
            }
        } else {
            None
        };

        match client
            .edit_message(&mirror.chat_id, &mirror.message_id, text, identity.as_ref())
            .await
        {
            Ok(()) => Outcome::Edited { mirror },
            Err(e) if e.is_not_found() => {
                if impersonated {
                    self.identities.invalidate(&mirror.chat_id);
                }
                if let Err(e) = self.store.unlink(source).await {
                    warn!(source = %source, error = %e, "failed to drop correlation");
                }
                Outcome::Pruned { mirror }
            },
            Err(e) => Outcome::failed(format!("edit of {mirror} failed: {e}")),
        }
    }
}
