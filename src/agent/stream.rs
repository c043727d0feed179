use serde::Deserialize;
use serde_json::Value;

/// Events from the agent CLI's stream-json output format
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "assistant")]
    Assistant { message: AssistantMessage },

    #[serde(rename = "result")]
    Result {
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        is_error: bool,
    },

    /// `user`, `system` and anything newer carry nothing the runner needs.
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "tool_use")]
    ToolUse { name: String, input: Value },

    #[serde(rename = "text")]
    Text { text: String },

    #[serde(other)]
    Other,
}

/// A file the agent wrote through its `Write` tool, if `input` describes one.
pub fn written_file(name: &str, input: &Value) -> Option<(String, String)> {
    if name != "Write" {
        return None;
    }
    let path = input.get("file_path").and_then(Value::as_str)?;
    let content = input.get("content").and_then(Value::as_str)?;
    Some((path.to_string(), content.to_string()))
}

/// Extract a human-readable description from a tool use event
pub fn describe_tool_use(name: &str, input: &Value) -> String {
    let field = |key: &str| input.get(key).and_then(Value::as_str);
    match name {
        "Write" => format!(
            "Writing: {}",
            field("file_path").map(shorten_path).unwrap_or_else(|| "file".to_string())
        ),
        "Read" => format!(
            "Reading: {}",
            field("file_path").map(shorten_path).unwrap_or_else(|| "file".to_string())
        ),
        "WebSearch" => format!(
            "Searching: {}",
            field("query").map(|q| truncate_str(q, 50)).unwrap_or_else(|| "web".to_string())
        ),
        "WebFetch" => format!(
            "Fetching: {}",
            field("url").map(|u| truncate_str(u, 50)).unwrap_or_else(|| "page".to_string())
        ),
        "Bash" => format!(
            "Running: {}",
            field("command").map(|c| truncate_str(c, 40)).unwrap_or_else(|| "command".to_string())
        ),
        _ => match name.strip_prefix("mcp__").and_then(|rest| rest.split_once("__")) {
            // Provider tools arrive as mcp__<server>__<tool>
            Some((server, tool)) => {
                let target = field("domain").or_else(|| field("target")).or_else(|| field("keyword"));
                match target {
                    Some(t) => format!("{}: {} ({})", server, tool, t),
                    None => format!("{}: {}", server, tool),
                }
            }
            None => name.to_string(),
        },
    }
}

/// Shorten a file path to just the last 2 components
fn shorten_path(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() <= 2 {
        path.to_string()
    } else {
        parts[parts.len() - 2..].join("/")
    }
}

fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_assistant_tool_use() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"tool_use","name":"WebSearch","input":{"query":"alpha.com traffic"},"id":"1"}]},"session_id":"abc"}"#;
        let event: StreamEvent = serde_json::from_str(line).unwrap();
        let StreamEvent::Assistant { message } = event else {
            panic!("Expected Assistant event");
        };
        match &message.content[0] {
            ContentBlock::ToolUse { name, input } => {
                assert_eq!(name, "WebSearch");
                assert_eq!(input["query"], "alpha.com traffic");
            }
            _ => panic!("Expected ToolUse"),
        }
    }

    #[test]
    fn test_parse_result_event() {
        let line = r#"{"type":"result","subtype":"success","result":"Key Findings:\nok","is_error":false}"#;
        let event: StreamEvent = serde_json::from_str(line).unwrap();
        match event {
            StreamEvent::Result { result, is_error } => {
                assert_eq!(result.as_deref(), Some("Key Findings:\nok"));
                assert!(!is_error);
            }
            _ => panic!("Expected Result"),
        }
    }

    #[test]
    fn test_unknown_events_and_blocks_parse_as_other() {
        let system: StreamEvent =
            serde_json::from_str(r#"{"type":"system","subtype":"init"}"#).unwrap();
        assert!(matches!(system, StreamEvent::Other));

        let line = r#"{"type":"assistant","message":{"content":[{"type":"thinking","thinking":"hmm"}]}}"#;
        let StreamEvent::Assistant { message } = serde_json::from_str(line).unwrap() else {
            panic!("Expected Assistant event");
        };
        assert!(matches!(message.content[0], ContentBlock::Other));
    }

    #[test]
    fn test_written_file_requires_write_tool_with_content() {
        let input = json!({"file_path": "/out/report.html", "content": "<html/>"});
        assert_eq!(
            written_file("Write", &input),
            Some(("/out/report.html".to_string(), "<html/>".to_string()))
        );
        assert_eq!(written_file("Read", &input), None);
        assert_eq!(written_file("Write", &json!({"file_path": "x"})), None);
    }

    #[test]
    fn test_describe_mcp_provider_tool() {
        let desc = describe_tool_use("mcp__semrush__domain_overview", &json!({"domain": "alpha.com"}));
        assert_eq!(desc, "semrush: domain_overview (alpha.com)");
    }

    #[test]
    fn test_describe_write_shortens_path() {
        let desc = describe_tool_use("Write", &json!({"file_path": "/a/b/c/report.md"}));
        assert_eq!(desc, "Writing: c/report.md");
    }

    #[test]
    fn test_describe_truncates_long_queries() {
        let desc = describe_tool_use("WebSearch", &json!({"query": "q".repeat(80)}));
        assert_eq!(desc.chars().count(), "Searching: ".len() + 50);
        assert!(desc.ends_with("..."));
    }

    #[test]
    fn test_describe_unknown_tool_uses_name() {
        assert_eq!(describe_tool_use("TodoWrite", &json!({})), "TodoWrite");
    }
}
