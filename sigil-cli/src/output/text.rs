//! Text output formatting with colors.

use sigil_core::Response;
use sigil_http::StreamEnd;
use sigil_store::Settings;

use super::json::{SignatureOutput, stream_end_parts};

// ============================================================================
// ANSI Colors
// ============================================================================

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";

/// Text formatter with optional colors.
pub struct TextFormatter {
    use_colors: bool,
    show_headers: bool,
}

impl TextFormatter {
    /// Creates a new text formatter.
    pub fn new(use_colors: bool) -> Self {
        Self {
            use_colors,
            show_headers: false,
        }
    }

    /// Include response headers.
    pub fn with_headers(mut self, show: bool) -> Self {
        self.show_headers = show;
        self
    }

    /// Formats a response: a status line, optional headers, then the body.
    pub fn format_response(&self, response: &Response) -> String {
        let mut lines = vec![self.status_line(response)];

        if let Some(uri) = response.response_uri.as_ref().or(response.request_uri.as_ref()) {
            lines.push(self.dim(uri));
        }

        if self.show_headers {
            for (name, value) in &response.headers {
                lines.push(format!("{}: {}", self.cyan(name), value));
            }
        }

        if let Some(error) = &response.exception {
            lines.push(format!("{} {}", self.red("Error:"), error.message));
        }
        if let Some(error) = &response.entity_error {
            lines.push(format!("{} {}", self.yellow("Decode:"), error));
        }

        if !response.content.is_empty() {
            lines.push(String::new());
            lines.push(response.content.trim_end().to_string());
        }

        lines.join("\n")
    }

    /// Formats the one-line summary used by `request` and `watch`.
    pub fn status_line(&self, response: &Response) -> String {
        if response.skipped_due_to_rate_limiting {
            return self.yellow("skipped (rate limit)");
        }
        if response.timed_out {
            return self.red("timed out");
        }
        if response.status_code == 0 {
            let message = response
                .exception
                .as_ref()
                .map_or("no response", |e| e.message.as_str());
            return self.red(&format!("failed: {message}"));
        }

        let status = format!("{} {}", response.status_code, response.status_description);
        let status = self.color_for_status(response.status_code, status.trim_end());

        let mut extras = Vec::new();
        if response.times_tried > 1 {
            extras.push(format!("{} tries", response.times_tried));
        }
        if response.is_mock {
            extras.push("mock".to_string());
        }
        if let Some(length) = response.content_length {
            extras.push(format_bytes(length));
        }

        if extras.is_empty() {
            self.bold(&status)
        } else {
            format!("{} {}", self.bold(&status), self.dim(&format!("({})", extras.join(", "))))
        }
    }

    /// Formats a stream batch, one line per entry.
    pub fn format_batch(&self, lines: &[String]) -> String {
        lines.join("\n")
    }

    /// Formats the end of a stream.
    pub fn format_stream_end(&self, reason: &StreamEnd) -> String {
        let (name, detail) = stream_end_parts(reason);
        let text = match detail {
            Some(detail) => format!("stream {name}: {detail}"),
            None => format!("stream {name}"),
        };
        match reason {
            StreamEnd::Failed(_) | StreamEnd::Rejected { .. } => self.red(&text),
            _ => self.dim(&text),
        }
    }

    /// Formats signature details.
    pub fn format_signature(&self, signature: &SignatureOutput) -> String {
        let mut lines = vec![
            format!("{} {} {}", self.bold(&signature.method), signature.url, self.dim(&format!("({})", signature.flow))),
            String::new(),
            self.dim("Signature base:"),
            signature.signature_base.clone(),
        ];
        if let Some(value) = &signature.signature {
            lines.push(String::new());
            lines.push(format!("{} {}", self.dim(&format!("{}:", signature.signature_method)), value));
        }
        if let Some(header) = &signature.authorization {
            lines.push(String::new());
            lines.push(format!("{} {}", self.cyan("Authorization:"), header));
        } else {
            lines.push(String::new());
            lines.push(self.dim("OAuth parameters (sent in the URL or body):"));
            for parameter in &signature.oauth_parameters {
                lines.push(format!("  {}={}", parameter.name, parameter.value));
            }
        }
        lines.join("\n")
    }

    /// Formats settings as aligned key/value lines.
    pub fn format_settings(&self, settings: &Settings) -> String {
        let show = |value: Option<&str>| value.map_or_else(|| "−".to_string(), ToString::to_string);
        let rows = [
            ("authority", show(settings.authority.as_deref())),
            ("version_path", show(settings.version_path.as_deref())),
            ("timeout_secs", show(settings.timeout_secs.map(|s| s.to_string()).as_deref())),
            ("retry_count", settings.retry_count.to_string()),
            ("user_agent", show(settings.user_agent.as_deref())),
            ("proxy", show(settings.proxy.as_deref())),
            ("follow_redirects", settings.follow_redirects.to_string()),
            ("cache_mode", show(settings.cache_mode.map(|m| m.to_string()).as_deref())),
            ("cache_secs", settings.cache_secs.to_string()),
            ("log_level", settings.log_level.to_string()),
            ("profile", settings.profile.clone()),
            ("consumer_key", show(settings.consumer_key.as_deref())),
            ("token", show(settings.token.as_deref())),
            ("signature_method", settings.signature_method.as_str().to_string()),
            ("parameter_handling", format!("{:?}", settings.parameter_handling)),
        ];

        let mut lines = vec![self.bold("Sigil Configuration"), "─".repeat(40)];
        lines.extend(rows.iter().map(|(key, value)| format!("{key:<20} {value}")));
        lines.join("\n")
    }

    /// Formats an error message.
    pub fn format_error(&self, context: &str, error: &str) -> String {
        format!("{}: {} - {}", self.bold(context), self.red("Error"), error)
    }

    // ========================================================================
    // Color/style helpers
    // ========================================================================

    fn color_for_status(&self, status: u16, text: &str) -> String {
        match status {
            200..=299 => self.green(text),
            300..=399 => self.cyan(text),
            400..=499 => self.yellow(text),
            _ => self.red(text),
        }
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.use_colors {
            format!("{color}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    fn bold(&self, text: &str) -> String {
        self.paint(BOLD, text)
    }

    fn dim(&self, text: &str) -> String {
        self.paint(DIM, text)
    }

    fn green(&self, text: &str) -> String {
        self.paint(GREEN, text)
    }

    fn yellow(&self, text: &str) -> String {
        self.paint(YELLOW, text)
    }

    fn red(&self, text: &str) -> String {
        self.paint(RED, text)
    }

    fn cyan(&self, text: &str) -> String {
        self.paint(CYAN, text)
    }
}

#[allow(clippy::cast_precision_loss)]
fn format_bytes(n: u64) -> String {
    let n = n as f64;
    if n >= 1_048_576.0 {
        format!("{:.1} MB", n / 1_048_576.0)
    } else if n >= 1_024.0 {
        format!("{:.1} KB", n / 1_024.0)
    } else {
        format!("{n:.0} B")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(1_572_864), "1.5 MB");
    }

    #[test]
    fn test_color_for_status() {
        let formatter = TextFormatter::new(true);
        assert!(formatter.color_for_status(200, "ok").contains(GREEN));
        assert!(formatter.color_for_status(302, "moved").contains(CYAN));
        assert!(formatter.color_for_status(404, "missing").contains(YELLOW));
        assert!(formatter.color_for_status(503, "down").contains(RED));
    }

    #[test]
    fn test_no_colors() {
        let formatter = TextFormatter::new(false);
        assert_eq!(formatter.bold("x"), "x");
        assert_eq!(formatter.color_for_status(500, "x"), "x");
    }
}
