/// Server part of personal-chat JIDs
pub const USER_SERVER: &str = "s.whatsapp.net";

/// Server part of group-chat JIDs
pub const GROUP_SERVER: &str = "g.us";

/// Suffix marking limited / anonymous identities
pub const LIMITED_SERVER_SUFFIX: &str = "@lid";

/// Stored content of a revoked message
pub const DELETED_MARKER: &str = "[MESSAGE DELETED]";

/// Prefix prepended to the text of an edit
pub const EDITED_PREFIX: &str = "[EDITED] ";

/// Quote preview when the quoted payload has neither text nor a known kind
pub const GENERIC_QUOTE_PLACEHOLDER: &str = "[Message]";

/// How long a protocol query waits for its response
pub const QUERY_TIMEOUT_SECS: u64 = 30;

/// Namespace of the order-details query
pub const ORDER_QUERY_NAMESPACE: &str = "fb:thrift_iq";

/// Fixed smax id of the order-details query
pub const ORDER_QUERY_SMAX_ID: &str = "5";

/// Template prefix of the formatted order line
pub const ORDER_LINE_PREFIX: &str = "我想购买: ";

/// Length of the synthetic voice-note waveform
pub const WAVEFORM_LEN: usize = 64;

/// Voice-note duration bounds, in seconds
pub const MIN_AUDIO_SECS: u32 = 1;
pub const MAX_AUDIO_SECS: u32 = 300;

/// Default page size for message listings
pub const DEFAULT_MESSAGE_LIMIT: u32 = 20;

/// Default HTTP API port
pub const DEFAULT_HTTP_PORT: u16 = 8080;
