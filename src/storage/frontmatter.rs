//! Header-block parsing for PRD documents.
//!
//! A document may open with a block delimited by lines containing only `---`:
//!
//! ```text
//! ---
//! id: auth
//! title: "User authentication"
//! status: building
//! ---
//! # Body text...
//! ```

use crate::models::Frontmatter;

const DELIMITER: &str = "---";

/// Extract the key-value header block at the start of `content`.
///
/// Returns an empty map when the document has no block or the block is
/// never closed. Never fails.
pub fn parse_frontmatter(content: &str) -> Frontmatter {
    let mut map = Frontmatter::new();
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut lines = content.lines().map(|l| l.strip_suffix('\r').unwrap_or(l));

    if lines.next() != Some(DELIMITER) {
        return map;
    }

    let mut closed = false;
    for line in lines {
        if line == DELIMITER {
            closed = true;
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            map.insert(key.to_string(), unquote(value.trim()).to_string());
        }
    }

    if !closed {
        return Frontmatter::new();
    }
    map
}

/// Strip one pair of matching surrounding quotes.
fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
