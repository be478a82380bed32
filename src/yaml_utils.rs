//! Cleanup for simulator-produced YAML
//!
//! Session documents come out of a fixed-size shared buffer or a recorded
//! script and can carry NUL padding, a byte-order mark, and stray control
//! characters that standard YAML parsers reject.

use crate::{RelayError, Result};

/// Clean session YAML so it can be handed to `serde_yaml_ng`.
///
/// - Truncates at the first NUL (buffer padding)
/// - Drops a leading byte-order mark
/// - Removes control characters except `\n`, `\r`, `\t`
///
/// Returns a parse error when nothing but whitespace is left.
pub fn preprocess_session_yaml(yaml: &str) -> Result<String> {
    let content = yaml.split('\0').next().unwrap_or_default();
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let result: String = content
        .chars()
        .filter(|ch| !matches!(ch, '\x01'..='\x08' | '\x0B'..='\x0C' | '\x0E'..='\x1F' | '\x7F'))
        .collect();

    if result.trim().is_empty() {
        return Err(RelayError::parse("YAML preprocessing", "YAML is empty after preprocessing"));
    }

    Ok(result)
}
