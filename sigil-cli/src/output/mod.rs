//! Output formatting for CLI.

mod json;
mod text;

pub use json::{HeaderOutput, JsonFormatter, SignatureOutput};
pub use text::TextFormatter;
