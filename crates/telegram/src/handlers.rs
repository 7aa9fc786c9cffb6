//! Translation of Bot API updates into relay events.

use {
    teloxide::types::{MediaKind, Message, MessageKind, Poll, Sticker, User},
    tgdc_channels::{
        Attachment, AttachmentKind, InboundEvent, InboundMessage, MessageContent, Platform,
        PollOption, PollSnapshot, Sender, StickerFormat,
    },
    tracing::debug,
};

use crate::state::PollIndex;

/// Normalize a new or edited message. Service messages and content kinds the
/// bridge cannot relay yield `None`.
pub fn message_event(msg: &Message, edited: bool, polls: &PollIndex) -> Option<InboundEvent> {
    let normalized = normalize(msg)?;
    if let MessageContent::Poll(_) = &normalized.content
        && let Some(poll) = poll_of(msg)
    {
        polls.record(&poll.id.to_string(), &normalized.chat_id, &normalized.message_id);
    }
    Some(if edited {
        InboundEvent::Edited(normalized)
    } else {
        InboundEvent::NewMessage(normalized)
    })
}

/// Normalize a poll state update. Polls whose message was never seen are
/// dropped.
pub fn poll_event(poll: &Poll, polls: &PollIndex) -> Option<InboundEvent> {
    let poll_id = poll.id.to_string();
    let Some((chat_id, message_id)) = polls.lookup(&poll_id) else {
        debug!(poll_id, "poll update for unknown poll");
        return None;
    };
    Some(InboundEvent::PollVoteChanged {
        platform: Platform::Telegram,
        chat_id,
        message_id,
        poll: snapshot(poll),
    })
}

/// Platform-neutral view of a Telegram message.
pub fn normalize(msg: &Message) -> Option<InboundMessage> {
    let MessageKind::Common(common) = &msg.kind else {
        return None;
    };

    let content = match &common.media_kind {
        MediaKind::Text(_) => MessageContent::Text,
        MediaKind::Photo(p) => {
            let photo = p.photo.last()?;
            MessageContent::Media(vec![Attachment {
                file_ref: photo.file.id.clone(),
                unique_id: photo.file.unique_id.clone(),
                kind: AttachmentKind::Photo,
                size: Some(u64::from(photo.file.size)),
                file_name: None,
                mime_type: Some("image/jpeg".to_string()),
                url: None,
            }])
        },
        MediaKind::Document(d) => MessageContent::Media(vec![Attachment {
            file_ref: d.document.file.id.clone(),
            unique_id: d.document.file.unique_id.clone(),
            kind: AttachmentKind::Document,
            size: Some(u64::from(d.document.file.size)),
            file_name: d.document.file_name.clone(),
            mime_type: d.document.mime_type.as_ref().map(ToString::to_string),
            url: None,
        }]),
        MediaKind::Video(v) => MessageContent::Media(vec![Attachment {
            file_ref: v.video.file.id.clone(),
            unique_id: v.video.file.unique_id.clone(),
            kind: AttachmentKind::Video,
            size: Some(u64::from(v.video.file.size)),
            file_name: v.video.file_name.clone(),
            mime_type: v.video.mime_type.as_ref().map(ToString::to_string),
            url: None,
        }]),
        MediaKind::Animation(a) => MessageContent::Media(vec![Attachment {
            file_ref: a.animation.file.id.clone(),
            unique_id: a.animation.file.unique_id.clone(),
            kind: AttachmentKind::Animation,
            size: Some(u64::from(a.animation.file.size)),
            file_name: a.animation.file_name.clone(),
            mime_type: a.animation.mime_type.as_ref().map(ToString::to_string),
            url: None,
        }]),
        MediaKind::Audio(a) => MessageContent::Media(vec![Attachment {
            file_ref: a.audio.file.id.clone(),
            unique_id: a.audio.file.unique_id.clone(),
            kind: AttachmentKind::Audio,
            size: Some(u64::from(a.audio.file.size)),
            file_name: a.audio.file_name.clone(),
            mime_type: a.audio.mime_type.as_ref().map(ToString::to_string),
            url: None,
        }]),
        MediaKind::Voice(v) => MessageContent::Media(vec![Attachment {
            file_ref: v.voice.file.id.clone(),
            unique_id: v.voice.file.unique_id.clone(),
            kind: AttachmentKind::Voice,
            size: Some(u64::from(v.voice.file.size)),
            file_name: None,
            // Telegram voice messages are OGG Opus
            mime_type: Some(
                v.voice
                    .mime_type
                    .as_ref()
                    .map_or_else(|| "audio/ogg".to_string(), ToString::to_string),
            ),
            url: None,
        }]),
        MediaKind::VideoNote(v) => MessageContent::Media(vec![Attachment {
            file_ref: v.video_note.file.id.clone(),
            unique_id: v.video_note.file.unique_id.clone(),
            kind: AttachmentKind::VideoNote,
            size: Some(u64::from(v.video_note.file.size)),
            file_name: None,
            mime_type: Some("video/mp4".to_string()),
            url: None,
        }]),
        MediaKind::Sticker(s) => MessageContent::Media(vec![sticker_attachment(&s.sticker)]),
        MediaKind::Poll(p) => MessageContent::Poll(snapshot(&p.poll)),
        _ => {
            if msg.text().or_else(|| msg.caption()).is_none() {
                debug!(
                    chat_id = msg.chat.id.0,
                    message_id = msg.id.0,
                    "ignoring telegram message without relayable content"
                );
                return None;
            }
            MessageContent::Text
        },
    };

    Some(InboundMessage {
        platform: Platform::Telegram,
        chat_id: msg.chat.id.0.to_string(),
        message_id: msg.id.0.to_string(),
        sender: sender(msg),
        text: msg.text().map(str::to_string),
        caption: msg.caption().map(str::to_string),
        reply_to: msg.reply_to_message().map(|r| r.id.0.to_string()),
        content,
    })
}

fn poll_of(msg: &Message) -> Option<&Poll> {
    match &msg.kind {
        MessageKind::Common(common) => match &common.media_kind {
            MediaKind::Poll(p) => Some(&p.poll),
            _ => None,
        },
        _ => None,
    }
}

fn sender(msg: &Message) -> Sender {
    match msg.from.as_ref() {
        Some(user) => Sender {
            id: user.id.0.to_string(),
            display_name: display_name(user),
            is_bot: user.is_bot,
        },
        // Anonymous admins and channel posts carry no user.
        None => Sender {
            id: msg.chat.id.0.to_string(),
            display_name: msg.chat.title().unwrap_or("Unknown").to_string(),
            is_bot: false,
        },
    }
}

/// "First Last", falling back to the username.
fn display_name(user: &User) -> String {
    let first = &user.first_name;
    let last = user.last_name.as_deref().unwrap_or("");
    let name = format!("{first} {last}").trim().to_string();
    if name.is_empty() {
        user.username.clone().unwrap_or_else(|| user.id.0.to_string())
    } else {
        name
    }
}

fn sticker_attachment(sticker: &Sticker) -> Attachment {
    let (format, mime) = if sticker.is_animated() {
        (StickerFormat::Animated, "application/x-tgsticker")
    } else if sticker.is_video() {
        (StickerFormat::Video, "video/webm")
    } else {
        (StickerFormat::Raster, "image/webp")
    };
    Attachment {
        file_ref: sticker.file.id.clone(),
        unique_id: sticker.file.unique_id.clone(),
        kind: AttachmentKind::Sticker(format),
        size: Some(u64::from(sticker.file.size)),
        file_name: None,
        mime_type: Some(mime.to_string()),
        url: None,
    }
}

fn snapshot(poll: &Poll) -> PollSnapshot {
    PollSnapshot {
        question: poll.question.clone(),
        options: poll
            .options
            .iter()
            .map(|o| PollOption {
                text: o.text.clone(),
                votes: o.voter_count,
            })
            .collect(),
        anonymous: poll.is_anonymous,
        closed: poll.is_closed,
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    fn base(extra: serde_json::Value) -> Message {
        let mut value = json!({
            "message_id": 10,
            "date": 1,
            "chat": { "id": -1001, "type": "supergroup", "title": "Club" },
            "from": {
                "id": 1001,
                "is_bot": false,
                "first_name": "Alice",
                "last_name": "Smith",
                "username": "alice"
            }
        });
        for (k, v) in extra.as_object().unwrap() {
            value[k] = v.clone();
        }
        serde_json::from_value(value).expect("deserialize message")
    }

    #[test]
    fn text_message_is_normalized() {
        let msg = base(json!({ "text": "hello" }));
        let normalized = normalize(&msg).unwrap();
        assert_eq!(normalized.platform, Platform::Telegram);
        assert_eq!(normalized.chat_id, "-1001");
        assert_eq!(normalized.message_id, "10");
        assert_eq!(normalized.sender.id, "1001");
        assert_eq!(normalized.sender.display_name, "Alice Smith");
        assert!(!normalized.sender.is_bot);
        assert_eq!(normalized.text.as_deref(), Some("hello"));
        assert_eq!(normalized.content, MessageContent::Text);
    }

    #[test]
    fn photo_uses_largest_size_and_caption() {
        let msg = base(json!({
            "caption": "look",
            "photo": [
                { "file_id": "small", "file_unique_id": "s", "width": 90, "height": 90, "file_size": 100 },
                { "file_id": "big", "file_unique_id": "b", "width": 800, "height": 800, "file_size": 9000 }
            ]
        }));
        let normalized = normalize(&msg).unwrap();
        assert_eq!(normalized.caption.as_deref(), Some("look"));
        let attachments = normalized.attachments();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].file_ref, "big");
        assert_eq!(attachments[0].unique_id, "b");
        assert_eq!(attachments[0].size, Some(9000));
        assert_eq!(attachments[0].kind, AttachmentKind::Photo);
    }

    #[test]
    fn animated_sticker_is_tagged() {
        let msg = base(json!({
            "sticker": {
                "file_id": "st",
                "file_unique_id": "stu",
                "type": "regular",
                "width": 512,
                "height": 512,
                "is_animated": true,
                "is_video": false,
                "file_size": 2048
            }
        }));
        let normalized = normalize(&msg).unwrap();
        assert_eq!(
            normalized.attachments()[0].kind,
            AttachmentKind::Sticker(StickerFormat::Animated)
        );
    }

    #[test]
    fn voice_defaults_to_ogg() {
        let msg = base(json!({
            "voice": {
                "file_id": "voice-file-id",
                "file_unique_id": "voice-unique-id",
                "duration": 1
            }
        }));
        let normalized = normalize(&msg).unwrap();
        let voice = &normalized.attachments()[0];
        assert_eq!(voice.kind, AttachmentKind::Voice);
        assert_eq!(voice.mime_type.as_deref(), Some("audio/ogg"));
    }

    #[test]
    fn reply_target_is_carried() {
        let msg = base(json!({
            "text": "answer",
            "reply_to_message": {
                "message_id": 7,
                "date": 1,
                "chat": { "id": -1001, "type": "supergroup", "title": "Club" },
                "text": "question"
            }
        }));
        assert_eq!(normalize(&msg).unwrap().reply_to.as_deref(), Some("7"));
    }

    #[test]
    fn bot_senders_are_flagged() {
        let mut msg = base(json!({ "text": "beep" }));
        if let Some(user) = msg.from.as_mut() {
            user.is_bot = true;
        }
        assert!(normalize(&msg).unwrap().sender.is_bot);
    }

    #[test]
    fn location_without_text_is_ignored() {
        let msg = base(json!({ "location": { "latitude": 1.0, "longitude": 2.0 } }));
        assert!(normalize(&msg).is_none());
    }

    #[test]
    fn poll_messages_are_indexed_for_vote_updates() {
        let poll = json!({
            "id": "poll-1",
            "question": "Lunch?",
            "options": [
                { "text": "Pizza", "voter_count": 2 },
                { "text": "Soup", "voter_count": 0 }
            ],
            "total_voter_count": 2,
            "is_closed": false,
            "is_anonymous": true,
            "type": "regular",
            "allows_multiple_answers": false
        });
        let msg = base(json!({ "poll": poll.clone() }));
        let polls = PollIndex::new();

        let event = message_event(&msg, false, &polls).unwrap();
        let InboundEvent::NewMessage(normalized) = event else {
            panic!("expected a new message");
        };
        let snapshot = normalized.poll().unwrap();
        assert_eq!(snapshot.question, "Lunch?");
        assert_eq!(snapshot.options[0].votes, 2);
        assert!(snapshot.anonymous);

        let mut update = poll;
        update["options"][1]["voter_count"] = json!(1);
        let update: Poll = serde_json::from_value(update).unwrap();
        match poll_event(&update, &polls).unwrap() {
            InboundEvent::PollVoteChanged {
                chat_id,
                message_id,
                poll,
                ..
            } => {
                assert_eq!(chat_id, "-1001");
                assert_eq!(message_id, "10");
                assert_eq!(poll.options[1].votes, 1);
            },
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn unknown_poll_updates_are_dropped() {
        let update: Poll = serde_json::from_value(json!({
            "id": "nope",
            "question": "?",
            "options": [],
            "total_voter_count": 0,
            "is_closed": true,
            "is_anonymous": false,
            "type": "regular",
            "allows_multiple_answers": false
        }))
        .unwrap();
        assert!(poll_event(&update, &PollIndex::new()).is_none());
    }

    #[test]
    fn edits_become_edit_events() {
        let msg = base(json!({ "text": "fixed" }));
        let event = message_event(&msg, true, &PollIndex::new()).unwrap();
        assert!(matches!(event, InboundEvent::Edited(_)));
    }
}
