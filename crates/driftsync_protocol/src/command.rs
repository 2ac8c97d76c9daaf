//! Inter-device commands embedded in `clients` records.

use serde_json::Value;

/// A parsed inter-device command.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Command name, e.g. `displayURI`.
    pub command_type: String,
    /// Positional string arguments.
    pub args: Vec<String>,
}

impl Command {
    /// Parses a command from its wire form `{"command": ..., "args": [...]}`.
    ///
    /// An object missing `command` or `args`, or with non-string argument
    /// entries, parses to `None` rather than an error: malformed commands
    /// from other devices are ignored, never fatal.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let command_type = object.get("command")?.as_str()?.to_string();
        let args = object
            .get("args")?
            .as_array()?
            .iter()
            .map(|arg| arg.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()?;
        Some(Self { command_type, args })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const WELL_FORMED: &str =
        r#"{"args":["https://example.org/article","PKsljsuqYbGg"],"command":"displayURI"}"#;

    #[test]
    fn parse_well_formed_command() {
        let value: Value = serde_json::from_str(WELL_FORMED).unwrap();
        let command = Command::from_value(&value).unwrap();
        assert_eq!(command.command_type, "displayURI");
        assert_eq!(command.args.len(), 2);
    }

    #[test]
    fn parse_command_no_args() {
        let value = json!({"command": "displayURI"});
        assert!(Command::from_value(&value).is_none());
    }

    #[test]
    fn parse_command_no_type() {
        let value = json!({"args": ["https://example.org/article", "PKsljsuqYbGg"]});
        assert!(Command::from_value(&value).is_none());
    }

    #[test]
    fn parse_non_string_args() {
        let value = json!({"command": "displayURI", "args": [1, 2]});
        assert!(Command::from_value(&value).is_none());
    }

    #[test]
    fn parse_non_object() {
        assert!(Command::from_value(&json!("displayURI")).is_none());
        assert!(Command::from_value(&json!(null)).is_none());
    }
}
