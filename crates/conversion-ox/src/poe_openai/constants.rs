//! Constants for Poe-OpenAI conversions

/// Prefix of completion identifiers
pub const COMPLETION_ID_PREFIX: &str = "chatcmpl";

/// Prefix of Poe message identifiers
pub const MESSAGE_ID_PREFIX: &str = "msg";

/// Conversation id sent to Poe when none is configured
pub const DEFAULT_CONVERSATION_ID: &str = "poepenai-default-conversation";

/// Schema type used when a tool declares none
pub const DEFAULT_PARAMETERS_TYPE: &str = "object";

/// Tool call type used when a bot omits it
pub const TOOL_CALL_TYPE_FUNCTION: &str = "function";

/// Terminal error text used while streaming when the bot sent none
pub const STREAM_ERROR_FALLBACK: &str = "Poe bot reported an error.";

/// Error text appended to an aggregated response when the bot sent none
pub const AGGREGATE_ERROR_FALLBACK: &str = "An unspecified error occurred from Poe bot.";

/// Marker placed before a bot error in an aggregated response
pub const AGGREGATE_ERROR_MARKER: &str = "[POE BOT ERROR]";
