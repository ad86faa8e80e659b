//! Filtering of noisy diagnostics before they reach the editor.
//!
//! Shared, scaffolded workspaces produce diagnostics that are accurate
//! but useless to the person typing (missing project metadata, unused
//! declaration warnings for a file they just opened). The filter drops
//! diagnostics by code or by message substring.

use serde_json::Value;
use tracing::trace;

/// Drops diagnostics matching a code or message-substring denylist.
#[derive(Debug, Clone)]
pub struct DiagnosticsFilter {
    noisy_codes: Vec<String>,
    noisy_substrings: Vec<String>,
}

impl Default for DiagnosticsFilter {
    fn default() -> Self {
        Self {
            noisy_codes: vec![
                // JDT complains about the synthetic gradle project model.
                "32".to_string(),
                "16".to_string(),
            ],
            noisy_substrings: vec![
                "is never used".to_string(),
                "build path".to_string(),
                "Classpath is incomplete".to_string(),
            ],
        }
    }
}

impl DiagnosticsFilter {
    /// A filter that drops nothing.
    pub fn permissive() -> Self {
        Self {
            noisy_codes: Vec::new(),
            noisy_substrings: Vec::new(),
        }
    }

    pub fn with_noisy_code(mut self, code: impl Into<String>) -> Self {
        self.noisy_codes.push(code.into());
        self
    }

    pub fn with_noisy_substring(mut self, substring: impl Into<String>) -> Self {
        self.noisy_substrings.push(substring.into());
        self
    }

    /// Apply the filter to a `textDocument/publishDiagnostics` message
    /// in place. Other messages pass through untouched.
    pub fn apply(&self, message: &mut Value) {
        if message.get("method").and_then(Value::as_str)
            != Some("textDocument/publishDiagnostics")
        {
            return;
        }
        let Some(diagnostics) = message
            .pointer_mut("/params/diagnostics")
            .and_then(Value::as_array_mut)
        else {
            return;
        };

        let before = diagnostics.len();
        diagnostics.retain(|d| !self.is_noisy(d));
        if diagnostics.len() < before {
            trace!(dropped = before - diagnostics.len(), "filtered noisy diagnostics");
        }
    }

    fn is_noisy(&self, diagnostic: &Value) -> bool {
        let code = match diagnostic.get("code") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        if let Some(code) = code {
            if self.noisy_codes.iter().any(|c| c == &code) {
                return true;
            }
        }
        if let Some(message) = diagnostic.get("message").and_then(Value::as_str) {
            return self
                .noisy_substrings
                .iter()
                .any(|s| message.contains(s.as_str()));
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn publish(diagnostics: Value) -> Value {
        json!({
            "jsonrpc": "2.0",
            "method": "textDocument/publishDiagnostics",
            "params": {"uri": "file:///main.py", "diagnostics": diagnostics}
        })
    }

    #[test]
    fn test_drops_by_numeric_code() {
        let filter = DiagnosticsFilter::permissive().with_noisy_code("32");
        let mut msg = publish(json!([
            {"code": 32, "message": "noise"},
            {"code": 1, "message": "real problem"}
        ]));
        filter.apply(&mut msg);
        let remaining = msg.pointer("/params/diagnostics").unwrap().as_array().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0]["message"], "real problem");
    }

    #[test]
    fn test_drops_by_message_substring() {
        let filter = DiagnosticsFilter::permissive().with_noisy_substring("is never used");
        let mut msg = publish(json!([
            {"message": "variable 'x' is never used"},
            {"message": "undefined name 'y'"}
        ]));
        filter.apply(&mut msg);
        let remaining = msg.pointer("/params/diagnostics").unwrap().as_array().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0]["message"], "undefined name 'y'");
    }

    #[test]
    fn test_other_methods_pass_through() {
        let filter = DiagnosticsFilter::default();
        let mut msg = json!({
            "jsonrpc": "2.0",
            "method": "window/logMessage",
            "params": {"message": "Classpath is incomplete"}
        });
        let original = msg.clone();
        filter.apply(&mut msg);
        assert_eq!(msg, original);
    }

    #[test]
    fn test_permissive_keeps_everything() {
        let filter = DiagnosticsFilter::permissive();
        let mut msg = publish(json!([{"code": 32, "message": "is never used"}]));
        filter.apply(&mut msg);
        assert_eq!(
            msg.pointer("/params/diagnostics").unwrap().as_array().unwrap().len(),
            1
        );
    }
}
