use chrono::Duration;

pub const MAX_MESSAGE_LENGTH: usize = 4000;
const ELLIPSIS: &str = "…";
const SELF_CLOSING_TAGS: [&str; 3] = ["br", "hr", "img"];

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// "2h 05m" / "37m" style rendering of a wait time.
pub fn format_wait(wait: Duration) -> String {
    let minutes = (wait.num_seconds() + 59) / 60;
    let (hours, minutes) = (minutes / 60, minutes % 60);
    if hours > 0 {
        format!("{}h {:02}m", hours, minutes)
    } else {
        format!("{}m", minutes.max(1))
    }
}

/// Caps an HTML message at `MAX_MESSAGE_LENGTH` characters.
pub fn truncate_html(text: &str) -> String {
    truncate_html_to(text, MAX_MESSAGE_LENGTH)
}

/// Truncates on character boundaries, drops a dangling tag or entity and
/// closes whatever tags remain open.
pub fn truncate_html_to(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let mut cutoff = max_chars.saturating_sub(ELLIPSIS.chars().count());
    while cutoff > 0 {
        let fragment = prefix_chars(text, cutoff).trim_end();
        let fragment = strip_incomplete_tail(fragment);
        let mut candidate = close_open_tags(fragment);
        candidate.push_str(ELLIPSIS);
        if candidate.chars().count() <= max_chars {
            return candidate;
        }
        cutoff = cutoff.saturating_sub(20);
    }
    ELLIPSIS.to_string()
}

fn prefix_chars(text: &str, chars: usize) -> &str {
    match text.char_indices().nth(chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn strip_incomplete_tail(mut text: &str) -> &str {
    if let Some(lt) = text.rfind('<') {
        if text.rfind('>').is_none_or(|gt| lt > gt) {
            text = &text[..lt];
        }
    }
    if let Some(amp) = text.rfind('&') {
        if !text[amp..].contains(';') {
            text = &text[..amp];
        }
    }
    text
}

fn close_open_tags(fragment: &str) -> String {
    let mut open: Vec<String> = Vec::new();
    let mut rest = fragment;

    while let Some(start) = rest.find('<') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('>') else { break };
        let inner = &after[..end];
        rest = &after[end + 1..];

        let (closing, body) = match inner.strip_prefix('/') {
            Some(body) => (true, body),
            None => (false, inner),
        };
        let name: String = body
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        if name.is_empty() || SELF_CLOSING_TAGS.contains(&name.as_str()) {
            continue;
        }

        if closing {
            if let Some(pos) = open.iter().rposition(|t| *t == name) {
                open.truncate(pos);
            }
        } else {
            open.push(name);
        }
    }

    let mut closed = fragment.to_string();
    for tag in open.iter().rev() {
        closed.push_str(&format!("</{}>", tag));
    }
    closed
}
