//! Wire types for the Gemini Live (`BidiGenerateContent`) protocol.
//!
//! This crate is pure data: the message envelopes exchanged over the live
//! websocket, the tool declaration schema used to validate function-call
//! arguments, and the frame codec that turns envelopes into transport
//! payloads and back. It performs no I/O.

pub mod codec;
pub mod messages;
pub mod schema;
pub mod tools;

pub use codec::{CodecError, decode, decode_client, encode, encode_server};
pub use messages::{
    ClientContent, ClientMessage, Content, GenerationConfig, MediaChunk, Part, PrebuiltVoiceConfig,
    RealtimeInput, ResponseModality, ServerContent, ServerMessage, Setup, SpeechConfig, Tool,
    VoiceConfig,
};
pub use schema::{Schema, SchemaError, SchemaType};
pub use tools::{
    FunctionCall, FunctionResponse, ToolCall, ToolCallCancellation, ToolDeclaration, ToolResponse,
};
