use serde::Deserialize;

/// Room token used when a caller joins without supplying one.
pub const DEFAULT_ROOM: &str = "lobby";

/// Length of generated room tokens.
const DEFAULT_TOKEN_LEN: usize = 7;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CallConfig {
    /// Signaling relay endpoint handed to the transport connector.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Well-known shared room used when no token is given on join.
    #[serde(default = "default_room")]
    pub default_room: String,
    /// Length of room tokens produced by `create_room`.
    #[serde(default = "default_token_len")]
    pub token_len: usize,
}

fn default_endpoint() -> String {
    "ws://127.0.0.1:9000/signal".to_string()
}

fn default_room() -> String {
    DEFAULT_ROOM.to_string()
}

fn default_token_len() -> usize {
    DEFAULT_TOKEN_LEN
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            default_room: default_room(),
            token_len: default_token_len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: CallConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, CallConfig::default());
        assert_eq!(config.default_room, DEFAULT_ROOM);
        assert_eq!(config.token_len, 7);
    }

    #[test]
    fn explicit_fields_override_defaults() {
        let config: CallConfig =
            serde_json::from_str(r#"{"endpoint": "wss://relay.example/ws", "token_len": 12}"#)
                .unwrap();
        assert_eq!(config.endpoint, "wss://relay.example/ws");
        assert_eq!(config.token_len, 12);
        assert_eq!(config.default_room, DEFAULT_ROOM);
    }
}
