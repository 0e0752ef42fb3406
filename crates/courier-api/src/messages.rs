use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::warn;
use uuid::Uuid;

use courier_db::models::{AttachmentRow, MessageRow, NewAttachment};
use courier_types::api::{Envelope, MessageResponse};
use courier_types::models::{Attachment, AttachmentKind, ChatPeer};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult, blocking, join_error};
use crate::intake;
use crate::middleware::AuthUser;
use crate::time;

/// Send a message, optionally with staged file attachments. Intake runs
/// before the content/attachment invariant so an attachments-only message
/// validates; one failed upload aborts the send entirely.
pub async fn send_message(
    State(state): State<AppState>,
    Path(receiver_id): Path<Uuid>,
    Extension(AuthUser(sender)): Extension<AuthUser>,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    // The receiver must exist before any staging or upload work happens.
    let db = state.clone();
    let rid = receiver_id.to_string();
    blocking(move || db.db.get_user_by_id(&rid))
        .await?
        .ok_or_else(|| ApiError::NotFound("Receiver not found".into()))?;

    let (content, staged) = intake::stage_multipart(&state.uploads, multipart).await?;

    if content.is_none() && staged.is_empty() {
        return Err(ApiError::Validation(
            "Message must have either content or attachments".into(),
        ));
    }

    let attachments = if staged.is_empty() {
        vec![]
    } else {
        intake::ingest(&state.blobs, staged).await?
    };

    let new_attachments: Vec<NewAttachment> = attachments
        .iter()
        .map(|a| NewAttachment {
            url: a.url.clone(),
            kind: a.kind.as_str().to_string(),
            name: a.name.clone(),
            size: a.size as i64,
        })
        .collect();

    let db = state.clone();
    let mid = Uuid::new_v4().to_string();
    let sid = sender.id.to_string();
    let rid = receiver_id.to_string();
    let (row, rows) = tokio::task::spawn_blocking(move || -> ApiResult<(MessageRow, Vec<AttachmentRow>)> {
        let now = time::now_string();
        db.db
            .insert_message(&mid, &sid, &rid, content.as_deref(), &new_attachments, &now)?;
        let row = db
            .db
            .get_message(&mid)?
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("message vanished after insert")))?;
        let rows = db.db.attachments_for_messages(std::slice::from_ref(&mid))?;
        Ok((row, rows))
    })
    .await
    .map_err(join_error)??;

    Ok((
        StatusCode::CREATED,
        Json(Envelope::ok("Message sent successfully", to_response(row, rows))),
    ))
}

/// Conversation history with another user, in either direction, oldest
/// first — clients render chat history straight from this order.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(other_user_id): Path<Uuid>,
    Extension(AuthUser(me)): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let a = me.id.to_string();
    let b = other_user_id.to_string();
    let (rows, attachment_rows) =
        tokio::task::spawn_blocking(move || -> ApiResult<(Vec<MessageRow>, Vec<AttachmentRow>)> {
            let rows = db.db.messages_between(&a, &b)?;
            let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
            let attachment_rows = db.db.attachments_for_messages(&ids)?;
            Ok((rows, attachment_rows))
        })
        .await
        .map_err(join_error)??;

    let mut by_message: HashMap<String, Vec<AttachmentRow>> = HashMap::new();
    for row in attachment_rows {
        by_message.entry(row.message_id.clone()).or_default().push(row);
    }

    let messages: Vec<MessageResponse> = rows
        .into_iter()
        .map(|row| {
            let attachments = by_message.remove(&row.id).unwrap_or_default();
            to_response(row, attachments)
        })
        .collect();

    Ok(Json(Envelope::ok("Messages fetched successfully", messages)))
}

/// Re-stamps read_at on every call (last-call-wins).
pub async fn mark_read(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(AuthUser(_me)): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let mid = message_id.to_string();
    let (row, rows) = tokio::task::spawn_blocking(move || -> ApiResult<(MessageRow, Vec<AttachmentRow>)> {
        let now = time::now_string();
        if !db.db.mark_read(&mid, &now)? {
            return Err(ApiError::NotFound("Message not found".into()));
        }
        let row = db
            .db
            .get_message(&mid)?
            .ok_or_else(|| ApiError::NotFound("Message not found".into()))?;
        let rows = db.db.attachments_for_messages(std::slice::from_ref(&mid))?;
        Ok((row, rows))
    })
    .await
    .map_err(join_error)??;

    Ok(Json(Envelope::ok("Message marked as read", to_response(row, rows))))
}

/// Hard delete, sender only. Receivers can never delete.
pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(AuthUser(me)): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let mid = message_id.to_string();
    let actor = me.id.to_string();
    tokio::task::spawn_blocking(move || -> ApiResult<()> {
        let row = db
            .db
            .get_message(&mid)?
            .ok_or_else(|| ApiError::NotFound("Message not found".into()))?;
        if row.sender_id != actor {
            return Err(ApiError::Forbidden("Only the sender can delete this message".into()));
        }
        if !db.db.delete_message(&mid)? {
            return Err(ApiError::NotFound("Message not found".into()));
        }
        Ok(())
    })
    .await
    .map_err(join_error)??;

    Ok(Json(Envelope::ok_empty("Message deleted successfully")))
}

fn to_response(row: MessageRow, attachments: Vec<AttachmentRow>) -> MessageResponse {
    MessageResponse {
        id: parse_uuid(&row.id, "message id"),
        sender: ChatPeer {
            id: parse_uuid(&row.sender_id, "sender id"),
            username: row.sender_username,
            profile_pic_url: row.sender_profile_pic_url,
        },
        receiver: ChatPeer {
            id: parse_uuid(&row.receiver_id, "receiver id"),
            username: row.receiver_username,
            profile_pic_url: row.receiver_profile_pic_url,
        },
        content: row.content,
        attachments: attachments.into_iter().map(attachment_from_row).collect(),
        read_at: row.read_at.as_deref().map(time::parse_timestamp),
        created_at: time::parse_timestamp(&row.created_at),
    }
}

fn attachment_from_row(row: AttachmentRow) -> Attachment {
    let kind = row.kind.parse().unwrap_or_else(|e| {
        warn!("Corrupt attachment kind on message '{}': {}", row.message_id, e);
        AttachmentKind::Document
    });
    Attachment {
        url: row.url,
        kind,
        name: row.name,
        size: row.size.max(0) as u64,
    }
}

fn parse_uuid(value: &str, what: &str) -> Uuid {
    value.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, value, e);
        Uuid::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(content: Option<&str>, read_at: Option<&str>) -> MessageRow {
        MessageRow {
            id: "6f0a2f49-9a3c-4d5e-8b7a-1c2d3e4f5a6b".into(),
            sender_id: "11111111-1111-1111-1111-111111111111".into(),
            sender_username: "alice".into(),
            sender_profile_pic_url: Some("https://blobs.example/alice.png".into()),
            receiver_id: "22222222-2222-2222-2222-222222222222".into(),
            receiver_username: "bob".into(),
            receiver_profile_pic_url: None,
            content: content.map(str::to_string),
            read_at: read_at.map(str::to_string),
            created_at: "2026-01-01T00:00:01.000000Z".into(),
        }
    }

    #[test]
    fn response_resolves_peers_without_email_or_hash() {
        let resp = to_response(row(Some("hi"), None), vec![]);
        assert_eq!(resp.sender.username, "alice");
        assert_eq!(resp.receiver.username, "bob");
        assert!(resp.read_at.is_none());

        let json = serde_json::to_value(&resp).unwrap();
        assert!(json["sender"].get("email").is_none());
        assert!(json["sender"].get("password").is_none());
        assert_eq!(json["readAt"], serde_json::Value::Null);
    }

    #[test]
    fn read_at_round_trips() {
        let resp = to_response(row(Some("hi"), Some("2026-01-01T00:05:00.000000Z")), vec![]);
        assert!(resp.read_at.is_some());
    }

    #[test]
    fn corrupt_attachment_kind_degrades_to_document() {
        let att = attachment_from_row(AttachmentRow {
            message_id: "m1".into(),
            url: "https://blobs.example/x".into(),
            kind: "sticker".into(),
            name: "x.bin".into(),
            size: 7,
        });
        assert_eq!(att.kind, AttachmentKind::Document);
        assert_eq!(att.size, 7);
    }
}
