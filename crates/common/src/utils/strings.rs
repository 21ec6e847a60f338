//! String helpers shared by the renderers and the CLI.

/// Expand tab characters to spaces, honoring tab stops every `tabsize`
/// columns. Legacy COBOL listings mix tabs and the fixed-format column
/// conventions, so positions are only meaningful after expansion.
pub fn expand_tabs(source: &str, tabsize: usize) -> String {
    let tabsize = tabsize.max(1);
    let mut out = String::with_capacity(source.len());
    let mut col = 0usize;

    for ch in source.chars() {
        match ch {
            '\t' => {
                let pad = tabsize - (col % tabsize);
                out.extend(std::iter::repeat(' ').take(pad));
                col += pad;
            }
            '\n' => {
                out.push('\n');
                col = 0;
            }
            other => {
                out.push(other);
                col += 1;
            }
        }
    }

    out
}

/// Escape the HTML metacharacters in `text`.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Shorten `text` to at most `max` characters, appending an ellipsis when
/// truncation happens. Used for graph node labels.
pub fn ellipsize(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_owned();
    }
    let prefix: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{}\u{2026}", prefix)
}

/// Turn a COBOL paragraph or section name into a label identifier:
/// lower-cased, with `-` replaced by `_`.
pub fn sanitize_label(name: &str) -> String {
    name.to_lowercase().replace('-', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_tabs_stops() {
        assert_eq!(expand_tabs("a\tb", 4), "a   b");
        assert_eq!(expand_tabs("abcd\tb", 4), "abcd    b");
        assert_eq!(expand_tabs("a\nb\tc", 4), "a\nb   c");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a < b & c"), "a &lt; b &amp; c");
        assert_eq!(escape_html("move 'x' to a"), "move &#39;x&#39; to a");
    }

    #[test]
    fn test_ellipsize() {
        assert_eq!(ellipsize("short", 10), "short");
        assert_eq!(ellipsize("a rather long label", 8), "a rathe\u{2026}");
    }

    #[test]
    fn test_sanitize_label() {
        assert_eq!(sanitize_label("SUB-EXIT"), "sub_exit");
    }
}
