// Gateway constants - single source of truth for protocol codes and defaults

/// JSON-RPC 2.0 error codes
pub mod jsonrpc {
    /// Tool call blocked by a security scan (custom code)
    pub const ERROR_SECURITY_BLOCK: i32 = -32000;
    /// Invalid request (standard JSON-RPC)
    pub const ERROR_INVALID_REQUEST: i32 = -32600;
    /// Internal error (standard JSON-RPC)
    pub const ERROR_INTERNAL: i32 = -32603;
    /// Parse error (standard JSON-RPC)
    pub const ERROR_PARSE: i32 = -32700;
}

/// MCP protocol methods
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
}

/// Prompt delimiters for injection defense
///
/// Untrusted payloads handed to the judge are wrapped between two
/// occurrences of a freshly randomized token so embedded text cannot
/// impersonate the surrounding instructions.
pub mod spotlight {
    /// Start delimiter prefix
    pub const DATA_START_PREFIX: &str = "<<<TOOLGATE_DATA_START:";
    /// End delimiter prefix
    pub const DATA_END_PREFIX: &str = "<<<TOOLGATE_DATA_END:";
    /// Delimiter suffix
    pub const DELIMITER_SUFFIX: &str = ">>>";
    /// Random token length for delimiters
    pub const RANDOM_ID_LENGTH: usize = 16;
}

/// Engine timing defaults
pub mod timing {
    /// Ceiling on a human-escalation wait; firing resolves to deny.
    pub const ALERT_TIMEOUT_SECS: u64 = 30;
    /// Pending tool calls older than this are never matched to a response.
    pub const CORRELATOR_MAX_AGE_SECS: u64 = 600;
}

/// Transport limits (DoS protection)
pub mod limits {
    /// Maximum allowed submission body size (2 MB)
    pub const MAX_BODY_SIZE_BYTES: usize = 2 * 1024 * 1024;
    /// Maximum buffered size of a single upstream stream event (10 MB)
    pub const MAX_EVENT_SIZE_BYTES: usize = 10 * 1024 * 1024;
    /// Bounded retention of completed scan records
    pub const LEDGER_CAPACITY: usize = 1000;
}
