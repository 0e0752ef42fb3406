/// Database row types — these map directly to SQLite rows.
/// Distinct from courier-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub profile_pic_url: Option<String>,
    pub password: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Message row joined with both peers' public columns.
pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub sender_username: String,
    pub sender_profile_pic_url: Option<String>,
    pub receiver_id: String,
    pub receiver_username: String,
    pub receiver_profile_pic_url: Option<String>,
    pub content: Option<String>,
    pub read_at: Option<String>,
    pub created_at: String,
}

pub struct AttachmentRow {
    pub message_id: String,
    pub url: String,
    pub kind: String,
    pub name: String,
    pub size: i64,
}

/// Attachment fields for insertion alongside a new message.
pub struct NewAttachment {
    pub url: String,
    pub kind: String,
    pub name: String,
    pub size: i64,
}
