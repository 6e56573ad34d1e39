/// Removes the fallback quote block that replies carry in their body.
///
/// Leading newlines and leading `"> "` lines are discarded until the first
/// line that is neither. A quote line without a trailing line break is kept,
/// since nothing would remain to display otherwise.
pub fn strip_quote(body: &str) -> &str {
    let mut rest = body;
    loop {
        if let Some(stripped) = rest.strip_prefix('\n') {
            rest = stripped;
        } else if rest.starts_with("> ") {
            match rest.find('\n') {
                Some(line_end) => rest = &rest[line_end + 1..],
                None => break,
            }
        } else {
            break;
        }
    }
    rest
}
