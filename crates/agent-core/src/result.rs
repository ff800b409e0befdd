//! Per-node accumulated output

use serde::{Deserialize, Serialize};

/// Line-break marker used in presented text
pub const LINE_BREAK: &str = "<br>";

/// Terminal status of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Node has not reached its terminal envelope yet
    #[default]
    Pending,
    Ok,
    Error,
}

/// Accumulated thinking and output text of one node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeResult {
    pub thinking_text: String,
    pub output_text: String,
    pub status: NodeStatus,
}

impl NodeResult {
    /// Build the final result from streamed fragments
    ///
    /// Fragments are concatenated in arrival order and literal `\n` escapes
    /// are replaced with [`LINE_BREAK`].
    pub fn finalize<S: AsRef<str>>(thinking: &[S], output: &[S], status: NodeStatus) -> Self {
        Self {
            thinking_text: present(thinking),
            output_text: present(output),
            status,
        }
    }

    /// Whether the node finished without error
    pub fn is_ok(&self) -> bool {
        self.status == NodeStatus::Ok
    }
}

fn present<S: AsRef<str>>(fragments: &[S]) -> String {
    let joined: String = fragments.iter().map(AsRef::as_ref).collect();
    joined.replace(r"\n", LINE_BREAK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalize_concatenates_in_order() {
        let result = NodeResult::finalize(&["think "], &["a", "b", "c"], NodeStatus::Ok);
        assert_eq!(result.thinking_text, "think ");
        assert_eq!(result.output_text, "abc");
        assert!(result.is_ok());
    }

    #[test]
    fn test_finalize_replaces_escaped_newlines() {
        let result = NodeResult::finalize::<&str>(&[], &[r"line1\nline2", r"\n"], NodeStatus::Ok);
        assert_eq!(result.output_text, "line1<br>line2<br>");
    }

    #[test]
    fn test_real_newlines_are_kept() {
        let result = NodeResult::finalize::<&str>(&[], &["a\nb"], NodeStatus::Error);
        assert_eq!(result.output_text, "a\nb");
        assert!(!result.is_ok());
    }

    #[test]
    fn test_default_is_pending() {
        assert_eq!(NodeResult::default().status, NodeStatus::Pending);
    }
}
