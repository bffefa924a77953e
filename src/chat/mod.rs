//! Chat Module - Nachrichten und Reaktionen über das Relay

mod channel;

pub use channel::{
    ChatError, ChatLog, ChatMessage, ReactionBoard, ReactionEvent, ReactionKind,
    MAX_CHAT_LENGTH, REACTION_TTL,
};
