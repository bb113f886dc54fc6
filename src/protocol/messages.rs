use serde::{Deserialize, Serialize};
use serde_json::Value;

/// MIME type for microphone audio sent to the service
pub const AUDIO_INPUT_MIME: &str = "audio/pcm;rate=16000";

/// MIME type for encoded video frames sent to the service
pub const JPEG_MIME: &str = "image/jpeg";

/// Outbound message envelope
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClientMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup: Option<Setup>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub realtime_input: Option<RealtimeInput>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_content: Option<ClientContent>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_response: Option<ToolResponse>,
}

impl ClientMessage {
    /// Setup message declaring model and generation parameters, sent once
    /// per connection immediately after the connected event
    pub fn setup(setup: Setup) -> Self {
        Self {
            setup: Some(setup),
            ..Default::default()
        }
    }

    /// Realtime input carrying one media chunk
    pub fn media(chunk: MediaChunk) -> Self {
        Self {
            realtime_input: Some(RealtimeInput {
                media_chunks: vec![chunk],
            }),
            ..Default::default()
        }
    }

    /// A complete user text turn sent alongside the live media streams
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            client_content: Some(ClientContent {
                turns: vec![Content {
                    role: Some("user".to_string()),
                    parts: vec![Part {
                        text: Some(text.into()),
                        inline_data: None,
                    }],
                }],
                turn_complete: true,
            }),
            ..Default::default()
        }
    }

    /// Reply to a tool call requested by the service
    pub fn tool_response(responses: Vec<FunctionResponse>) -> Self {
        Self {
            tool_response: Some(ToolResponse {
                function_responses: responses,
            }),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Setup {
    pub model: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaChunk>,
}

/// Text turns sent on behalf of the user
#[derive(Debug, Clone, Serialize)]
pub struct ClientContent {
    pub turns: Vec<Content>,
    pub turn_complete: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolResponse {
    pub function_responses: Vec<FunctionResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionResponse {
    pub id: String,
    pub name: String,
    pub response: Value,
}

/// A tagged base64 media payload (audio bytes or one compressed image)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaChunk {
    pub mime_type: String,
    /// Base64-encoded payload
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            role: None,
            parts: vec![Part {
                text: Some(text.into()),
                inline_data: None,
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineData {
    pub mime_type: String,
    /// Base64-encoded payload
    pub data: String,
}

/// Inbound message envelope
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerMessage {
    /// Acknowledgment of the setup message (presence marker, no payload)
    pub setup_complete: Option<Value>,

    pub server_content: Option<ServerContent>,

    pub tool_call: Option<ToolCall>,

    pub tool_call_cancellation: Option<ToolCallCancellation>,

    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerContent {
    pub model_turn: Option<Content>,

    #[serde(default)]
    pub turn_complete: bool,

    #[serde(default)]
    pub generation_complete: bool,

    #[serde(default)]
    pub interrupted: bool,

    pub input_transcription: Option<Transcription>,

    pub output_transcription: Option<Transcription>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Transcription {
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub function_calls: Vec<FunctionCall>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionCall {
    pub id: String,
    pub name: String,
    /// Open-ended argument map (string | number | bool | null | array | object)
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallCancellation {
    #[serde(default)]
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u64,
    #[serde(default)]
    pub cached_content_token_count: u64,
    #[serde(default)]
    pub response_token_count: u64,
    #[serde(default)]
    pub total_token_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_setup_serializes_snake_case() {
        let msg = ClientMessage::setup(Setup {
            model: "models/gemini-2.0-flash-live".to_string(),
            generation_config: Some(json!({"response_modalities": ["AUDIO"]})),
            system_instruction: Some(Content::text("Be brief.")),
        });

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["setup"]["model"], "models/gemini-2.0-flash-live");
        assert_eq!(
            value["setup"]["generation_config"]["response_modalities"][0],
            "AUDIO"
        );
        assert_eq!(
            value["setup"]["system_instruction"]["parts"][0]["text"],
            "Be brief."
        );
        // No realtime_input field when unset
        assert!(value.get("realtime_input").is_none());
    }

    #[test]
    fn test_media_chunk_serializes() {
        let msg = ClientMessage::media(MediaChunk {
            mime_type: JPEG_MIME.to_string(),
            data: "aGVsbG8=".to_string(),
        });

        let value = serde_json::to_value(&msg).unwrap();
        let chunk = &value["realtime_input"]["media_chunks"][0];
        assert_eq!(chunk["mime_type"], "image/jpeg");
        assert_eq!(chunk["data"], "aGVsbG8=");
        assert!(value.get("setup").is_none());
    }

    #[test]
    fn test_text_turn_serializes() {
        let msg = ClientMessage::text("What am I looking at?");
        let value = serde_json::to_value(&msg).unwrap();
        let content = &value["client_content"];
        assert_eq!(content["turn_complete"], true);
        assert_eq!(content["turns"][0]["role"], "user");
        assert_eq!(content["turns"][0]["parts"][0]["text"], "What am I looking at?");
        assert!(value.get("setup").is_none());
        assert!(value.get("realtime_input").is_none());
    }

    #[test]
    fn test_tool_response_serializes() {
        let msg = ClientMessage::tool_response(vec![FunctionResponse {
            id: "c1".to_string(),
            name: "lookup".to_string(),
            response: json!({"result": "three results found"}),
        }]);

        let value = serde_json::to_value(&msg).unwrap();
        let responses = &value["tool_response"]["function_responses"];
        assert_eq!(responses[0]["id"], "c1");
        assert_eq!(responses[0]["name"], "lookup");
        assert_eq!(responses[0]["response"]["result"], "three results found");
    }

    #[test]
    fn test_deserialize_setup_complete() {
        let msg: ServerMessage = serde_json::from_str(r#"{"setup_complete": {}}"#).unwrap();
        assert!(msg.setup_complete.is_some());
        assert!(msg.server_content.is_none());
    }

    #[test]
    fn test_deserialize_server_content_flags_co_occur() {
        let raw = r#"{"server_content":{"turn_complete":true,"generation_complete":true}}"#;
        let msg: ServerMessage = serde_json::from_str(raw).unwrap();
        let content = msg.server_content.unwrap();
        assert!(content.turn_complete);
        assert!(content.generation_complete);
        assert!(!content.interrupted);
        assert!(content.model_turn.is_none());
    }

    #[test]
    fn test_deserialize_model_turn_with_audio() {
        let raw = r#"{
            "server_content": {
                "model_turn": {
                    "parts": [
                        {"text": "hello"},
                        {"inline_data": {"mime_type": "audio/pcm;rate=24000", "data": "AAA="}}
                    ]
                }
            }
        }"#;
        let msg: ServerMessage = serde_json::from_str(raw).unwrap();
        let turn = msg.server_content.unwrap().model_turn.unwrap();
        assert_eq!(turn.parts.len(), 2);
        assert_eq!(turn.parts[0].text.as_deref(), Some("hello"));
        let inline = turn.parts[1].inline_data.as_ref().unwrap();
        assert!(inline.mime_type.starts_with("audio/"));
    }

    #[test]
    fn test_deserialize_tool_call_args() {
        let raw = r#"{
            "tool_call": {
                "function_calls": [
                    {"id": "c1", "name": "lookup", "args": {"q": "rust", "limit": 3, "deep": true, "tags": ["a", "b"], "extra": null}}
                ]
            }
        }"#;
        let msg: ServerMessage = serde_json::from_str(raw).unwrap();
        let call = &msg.tool_call.unwrap().function_calls[0];
        assert_eq!(call.id, "c1");
        assert_eq!(call.name, "lookup");
        assert_eq!(call.args["q"], "rust");
        assert_eq!(call.args["limit"], 3);
        assert_eq!(call.args["deep"], true);
        assert_eq!(call.args["tags"][1], "b");
        assert!(call.args["extra"].is_null());
    }

    #[test]
    fn test_deserialize_usage_metadata() {
        let raw = r#"{"usage_metadata":{"prompt_token_count":10,"response_token_count":25,"total_token_count":35}}"#;
        let msg: ServerMessage = serde_json::from_str(raw).unwrap();
        let usage = msg.usage_metadata.unwrap();
        assert_eq!(usage.prompt_token_count, 10);
        assert_eq!(usage.cached_content_token_count, 0);
        assert_eq!(usage.total_token_count, 35);
    }

    #[test]
    fn test_deserialize_transcriptions() {
        let raw = r#"{"server_content":{"input_transcription":{"text":"hi there"},"output_transcription":{"text":"hello"}}}"#;
        let msg: ServerMessage = serde_json::from_str(raw).unwrap();
        let content = msg.server_content.unwrap();
        assert_eq!(content.input_transcription.unwrap().text, "hi there");
        assert_eq!(content.output_transcription.unwrap().text, "hello");
    }
}
