use serde::{Deserialize, Serialize};

/// Configuration for a console adapter instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Username attached to messages typed on stdin.
    pub username: String,
    /// External thread ID this terminal represents.
    pub thread: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            username: "operator".into(),
            thread: "console".into(),
        }
    }
}

impl ConsoleConfig {
    /// JSON schema reference published in the adapter descriptor.
    pub fn schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "username": { "type": "string", "default": "operator" },
                "thread":   { "type": "string", "default": "console" },
            },
        })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let cfg: ConsoleConfig = serde_json::from_str(r#"{"thread": "tty1"}"#).unwrap();
        assert_eq!(cfg.thread, "tty1");
        assert_eq!(cfg.username, "operator");
    }
}
