//! Message envelopes for the live session, in both directions.

use crate::tools::{ToolCall, ToolCallCancellation, ToolDeclaration, ToolResponse};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

// --- Client -> server ---

/// A message sent from the client to the live endpoint.
///
/// Serialized externally tagged, so `Setup(..)` becomes `{"setup": {..}}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    /// Session configuration. The endpoint accepts exactly one per connection,
    /// and it must be the first frame.
    Setup(Setup),
    /// Conversation turns appended to the session (typically text).
    ClientContent(ClientContent),
    /// Streamed audio/video fragments.
    RealtimeInput(RealtimeInput),
    /// Results for a batch of function calls issued by the model.
    ToolResponse(ToolResponse),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
}

/// A group of function declarations, as the endpoint expects them in `setup.tools`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub function_declarations: Vec<ToolDeclaration>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_modalities: Vec<ResponseModality>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl GenerationConfig {
    /// Audio output spoken with the given prebuilt voice.
    pub fn audio(voice_name: Option<String>) -> Self {
        Self {
            response_modalities: vec![ResponseModality::Audio],
            speech_config: voice_name.map(|voice_name| SpeechConfig {
                voice_config: VoiceConfig {
                    prebuilt_voice_config: PrebuiltVoiceConfig { voice_name },
                },
            }),
            temperature: None,
        }
    }

    /// Text-only output.
    pub fn text() -> Self {
        Self {
            response_modalities: vec![ResponseModality::Text],
            ..Default::default()
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseModality {
    Text,
    Audio,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientContent {
    pub turns: Vec<Content>,
    pub turn_complete: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaChunk>,
}

// --- Shared content types ---

/// One turn of conversation content.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    /// A single text part with the given role.
    pub fn text(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
            parts: vec![Part::text(text)],
        }
    }

    /// Concatenation of every text part, or `None` if there is none.
    pub fn joined_text(&self) -> Option<String> {
        let texts: Vec<&str> = self.parts.iter().filter_map(|p| p.text.as_deref()).collect();
        if texts.is_empty() {
            None
        } else {
            Some(texts.concat())
        }
    }
}

/// A content part.
///
/// Only `text` and `inlineData` are modelled; any other field the server sends
/// (executable code, thoughts, ...) is kept in `extra` and re-serialized
/// unchanged.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<MediaChunk>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn inline(chunk: MediaChunk) -> Self {
        Self {
            inline_data: Some(chunk),
            ..Default::default()
        }
    }

    /// True for inline PCM audio, which the session reports separately from content.
    pub fn is_pcm_audio(&self) -> bool {
        self.inline_data
            .as_ref()
            .is_some_and(|blob| blob.mime_type.starts_with("audio/pcm"))
    }
}

/// A realtime media fragment: raw bytes tagged with their MIME type.
///
/// The bytes are base64 encoded on the wire.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaChunk {
    pub mime_type: String,
    #[serde(with = "base64_bytes")]
    pub data: Bytes,
}

impl MediaChunk {
    pub fn new(mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Little-endian 16-bit mono PCM at `sample_rate` Hz.
    pub fn pcm16(data: impl Into<Bytes>, sample_rate: u32) -> Self {
        Self::new(format!("audio/pcm;rate={sample_rate}"), data)
    }

    /// A single encoded video frame.
    pub fn jpeg(data: impl Into<Bytes>) -> Self {
        Self::new("image/jpeg", data)
    }
}

mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(D::Error::custom)
    }
}

// --- Server -> client ---

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// The endpoint accepted the `setup` frame.
    SetupComplete,
    /// Model output and turn signals.
    ServerContent(ServerContent),
    /// The model wants the client to run one or more functions.
    ToolCall(ToolCall),
    /// Previously issued calls that should no longer be answered.
    ToolCallCancellation(ToolCallCancellation),
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_turn: Option<Content>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub turn_complete: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub interrupted: bool,
}
