use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User projection safe for external exposure. The password hash lives only
/// in the db row type and never crosses into this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub profile_pic_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Minimal peer projection embedded in messages: username and picture only,
/// no email.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPeer {
    pub id: Uuid,
    pub username: String,
    pub profile_pic_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Video,
    Document,
    Audio,
}

impl AttachmentKind {
    /// Map a blob-service resource kind onto an attachment kind. Anything
    /// the service reports outside the known media classes is a document.
    pub fn from_resource_kind(kind: &str) -> Self {
        match kind {
            "image" => Self::Image,
            "video" => Self::Video,
            "audio" => Self::Audio,
            _ => Self::Document,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Document => "document",
            Self::Audio => "audio",
        }
    }
}

impl std::str::FromStr for AttachmentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "document" => Ok(Self::Document),
            "audio" => Ok(Self::Audio),
            other => Err(format!("unknown attachment kind: {other}")),
        }
    }
}

/// Immutable file metadata attached to a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    pub name: String,
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_kind_mapping() {
        assert_eq!(AttachmentKind::from_resource_kind("image"), AttachmentKind::Image);
        assert_eq!(AttachmentKind::from_resource_kind("video"), AttachmentKind::Video);
        assert_eq!(AttachmentKind::from_resource_kind("audio"), AttachmentKind::Audio);
        // unknown kinds degrade to document
        assert_eq!(AttachmentKind::from_resource_kind("raw"), AttachmentKind::Document);
    }

    #[test]
    fn attachment_serializes_kind_as_type() {
        let a = Attachment {
            url: "https://blobs.example/abc".into(),
            kind: AttachmentKind::Image,
            name: "cat.png".into(),
            size: 1234,
        };
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["type"], "image");
        assert_eq!(json["size"], 1234);
    }
}
