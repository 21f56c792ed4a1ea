/// Time-to-live for direct and anonymous chat messages (60 seconds)
pub const MESSAGE_TTL_MS: u64 = 60_000;

/// Lifetime of an anonymous group chat (7 days)
pub const ANONYMOUS_CHAT_LIFETIME_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// Time-to-live for uploaded file and voice blobs (24 hours)
pub const ATTACHMENT_TTL_MS: u64 = 24 * 60 * 60 * 1000;

/// Maximum declared size of a file upload (10 MiB)
pub const MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;

/// Maximum payload size of a voice note (5 MiB)
pub const MAX_VOICE_BYTES: u64 = 5 * 1024 * 1024;

/// Janitor sweep period for expired attachments (5 minutes)
pub const ATTACHMENT_SWEEP_SECS: u64 = 300;

/// Janitor sweep period for expired anonymous chats (10 minutes)
pub const CHAT_SWEEP_SECS: u64 = 600;

/// Maximum number of results returned by an anonymous chat search
pub const SEARCH_RESULT_CAP: usize = 20;

/// Maximum number of recent messages returned when joining an anonymous chat
pub const JOIN_HISTORY_CAP: usize = 100;

/// Default channel message auto-delete interval in milliseconds
pub const DEFAULT_AUTO_DELETE_MS: u64 = 60_000;

/// Default channel member cap
pub const DEFAULT_MAX_USERS: u32 = 100;

/// Capacity of a connection's outbound push buffer; frames beyond this are dropped
pub const PUSH_BUFFER: usize = 256;

/// Maximum WebSocket frame/message size (16 MiB, fits a 10 MiB upload in
/// its client-side transport encoding plus the envelope)
pub const MAX_WS_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Default HTTP listen port
pub const DEFAULT_HTTP_PORT: u16 = 3000;

/// MIME top-level categories accepted for file uploads
pub const ALLOWED_MIME_PREFIXES: [&str; 3] = ["image/", "video/", "audio/"];

/// Exact MIME types accepted for file uploads outside the allowed categories
pub const ALLOWED_MIME_TYPES: [&str; 3] = ["application/pdf", "text/plain", "application/zip"];
