//! Template scanning.
//!
//! A template is split left to right into literal text and `<$...$>` tags.
//! The body of a tag runs to the first `$>` on the same line; tags never
//! nest. An opening `<$` without a closing `$>` on its line is plain text.

/// Reserved tag left in place for the loader.
pub const CONVERSATION_HISTORY: &str = "conversation_history";

const OPEN: &str = "<$";
const CLOSE: &str = "$>";

/// One piece of a scanned template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Tag { raw: &'a str, tag: Tag<'a> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag<'a> {
    /// `<$path$>`
    File(&'a str),
    /// `<$dir:path/*.ext$>`; `ext` is `None` for a bare `*`
    Dir { dir: &'a str, ext: Option<&'a str> },
    /// A `dir:` tag whose pattern could not be understood
    MalformedDir(&'a str),
    /// `<$datetime$>` or `<$datetime:FORMAT$>`
    Datetime(Option<&'a str>),
    /// `<$conversation_history$>`
    ConversationHistory,
}

/// Split `template` into segments.
pub fn scan(template: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut rest = template;
    // Offset in `rest` before which everything is already known to be text
    let mut from = 0;

    while let Some(found) = rest[from..].find(OPEN) {
        let start = from + found;
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            break;
        };
        // A tag never spans lines; this `<$` is prose.
        if after_open[..end].contains('\n') {
            from = start + OPEN.len();
            continue;
        }
        let body = &after_open[..end];
        let raw_len = OPEN.len() + end + CLOSE.len();

        match classify(body) {
            Some(tag) => {
                if start > 0 {
                    segments.push(Segment::Text(&rest[..start]));
                }
                segments.push(Segment::Tag {
                    raw: &rest[start..start + raw_len],
                    tag,
                });
                rest = &rest[start + raw_len..];
                from = 0;
            }
            None => from = start + raw_len,
        }
    }

    if !rest.is_empty() {
        segments.push(Segment::Text(rest));
    }
    segments
}

fn classify(body: &str) -> Option<Tag<'_>> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed == "datetime" {
        return Some(Tag::Datetime(None));
    }
    if let Some(format) = trimmed.strip_prefix("datetime:") {
        let format = format.trim();
        return Some(Tag::Datetime((!format.is_empty()).then_some(format)));
    }
    if trimmed == CONVERSATION_HISTORY {
        return Some(Tag::ConversationHistory);
    }
    if let Some(pattern) = trimmed.strip_prefix("dir:") {
        return Some(parse_dir_pattern(pattern.trim()));
    }
    Some(Tag::File(trimmed))
}

fn parse_dir_pattern(pattern: &str) -> Tag<'_> {
    let (dir, glob) = match pattern.rfind('/') {
        Some(i) => (&pattern[..i], &pattern[i + 1..]),
        None => (".", pattern),
    };
    let dir = if dir.is_empty() { "." } else { dir };

    if glob == "*" {
        return Tag::Dir { dir, ext: None };
    }
    match glob.strip_prefix("*.") {
        Some(ext) if !ext.is_empty() && !ext.contains(['*', '?', '[']) => {
            Tag::Dir { dir, ext: Some(ext) }
        }
        _ => Tag::MalformedDir(pattern),
    }
}
