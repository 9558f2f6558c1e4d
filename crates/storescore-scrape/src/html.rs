//! Small, allocation-light HTML helpers. Storefront markup is messy and we
//! only need readable text plus a handful of tagged values, so this works on
//! plain string slicing instead of building a DOM.
//!
//! Case-insensitive searches use an ASCII-lowercased copy, which keeps byte
//! offsets identical to the original string.

/// Elements whose contents are never visible text.
const INVISIBLE: [&str; 5] = ["script", "style", "noscript", "svg", "template"];

/// Find `<tag` followed by a tag-name boundary, starting at `from`.
fn find_open_tag(lc: &str, tag: &str, from: usize) -> Option<usize> {
    let needle = format!("<{}", tag);
    let mut pos = from;
    loop {
        let start = lc.get(pos..)?.find(&needle)? + pos;
        let after = start + needle.len();
        match lc.as_bytes().get(after) {
            Some(b) if b.is_ascii_whitespace() || *b == b'>' || *b == b'/' => return Some(start),
            None => return None,
            _ => pos = after,
        }
    }
}

/// Inner content of the first `<tag ...>...</tag>` block.
pub fn slice_between_ci<'a>(s: &'a str, tag: &str) -> Option<&'a str> {
    let lc = s.to_ascii_lowercase();
    let open = find_open_tag(&lc, tag, 0)?;
    let after = s[open..].find('>')? + open + 1;
    let close = lc[after..].find(&format!("</{}", tag))? + after;
    Some(&s[after..close])
}

/// Drop every `<tag ...>...</tag>` block for the given tags. An unterminated
/// block swallows the rest of the document.
pub fn remove_blocks(s: &str, tags: &[&str]) -> String {
    let mut out = s.to_string();
    for tag in tags {
        let mut cleaned = String::with_capacity(out.len());
        let lc = out.to_ascii_lowercase();
        let close_pat = format!("</{}", tag);
        let mut pos = 0;
        while let Some(start) = find_open_tag(&lc, tag, pos) {
            cleaned.push_str(&out[pos..start]);
            pos = match lc[start..].find(&close_pat) {
                Some(rel) => {
                    let close = start + rel;
                    lc[close..].find('>').map(|e| close + e + 1).unwrap_or(out.len())
                }
                None => out.len(),
            };
        }
        cleaned.push_str(&out[pos.min(out.len())..]);
        out = cleaned;
    }
    out
}

/// Replace tags with spaces so adjacent cells don't glue together.
pub fn strip_tags<S: AsRef<str>>(s: S) -> String {
    let s = s.as_ref();
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;

    for ch in s.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_entity(&tail[1..semi]).map(|c| (c, semi + 1)));
        match decoded {
            Some((c, used)) => {
                out.push(c);
                rest = &tail[used..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code);
    }
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "ndash" => '–',
        "mdash" => '—',
        "hellip" => '…',
        "lsquo" => '‘',
        "rsquo" => '’',
        "ldquo" => '“',
        "rdquo" => '”',
        "copy" => '©',
        "reg" => '®',
        "trade" => '™',
        "euro" => '€',
        "pound" => '£',
        _ => return None,
    };
    Some(c)
}

pub fn normalize_ws(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !prev_space {
                out.push(' ');
                prev_space = true;
            }
        } else {
            out.push(ch);
            prev_space = false;
        }
    }
    out.trim().to_string()
}

/// Markup fragment to readable single-line text.
pub fn text_of(fragment: &str) -> String {
    normalize_ws(&decode_entities(&strip_tags(fragment)))
}

/// Visible text of a page: body only when present, invisible blocks removed.
pub fn visible_text(html: &str) -> String {
    let body = slice_between_ci(html, "body").unwrap_or(html);
    text_of(&remove_blocks(body, &INVISIBLE))
}

pub fn title(html: &str) -> Option<String> {
    slice_between_ci(html, "title")
        .map(text_of)
        .filter(|t| !t.is_empty())
}

/// Value of attribute `name` inside a single opening tag.
pub fn attr(tag: &str, name: &str) -> Option<String> {
    let lc = tag.to_ascii_lowercase();
    let needle = format!("{}=", name);
    let mut pos = 0;
    while let Some(rel) = lc[pos..].find(&needle) {
        let start = pos + rel;
        let boundary = start == 0 || lc.as_bytes()[start - 1].is_ascii_whitespace();
        let value_start = start + needle.len();
        if boundary {
            let rest = &tag[value_start..];
            let value = match rest.chars().next() {
                Some(q @ ('"' | '\'')) => {
                    let inner = &rest[1..];
                    &inner[..inner.find(q).unwrap_or(inner.len())]
                }
                _ => {
                    let end = rest
                        .find(|c: char| c.is_whitespace() || c == '>')
                        .unwrap_or(rest.len());
                    &rest[..end]
                }
            };
            return Some(decode_entities(value));
        }
        pos = value_start;
    }
    None
}

/// All opening tags `<tag ...>` in document order.
pub fn opening_tags<'a>(html: &'a str, tag: &str) -> Vec<&'a str> {
    let lc = html.to_ascii_lowercase();
    let mut tags = Vec::new();
    let mut pos = 0;
    while let Some(start) = find_open_tag(&lc, tag, pos) {
        let Some(end) = html[start..].find('>').map(|e| start + e + 1) else {
            break;
        };
        tags.push(&html[start..end]);
        pos = end;
    }
    tags
}

/// `<meta name=...>` or `<meta property=...>` content.
pub fn meta_content(html: &str, key: &str) -> Option<String> {
    opening_tags(html, "meta").into_iter().find_map(|tag| {
        let matches = [attr(tag, "name"), attr(tag, "property")]
            .into_iter()
            .flatten()
            .any(|v| v.eq_ignore_ascii_case(key));
        if matches {
            attr(tag, "content")
                .map(|c| normalize_ws(&c))
                .filter(|c| !c.is_empty())
        } else {
            None
        }
    })
}

/// Text of h1-h3 headings in document order, deduplicated, at most `max`.
pub fn headings(html: &str, max: usize) -> Vec<String> {
    let html = remove_blocks(html, &INVISIBLE);
    let html = html.as_str();
    let lc = html.to_ascii_lowercase();
    let mut found: Vec<(usize, String)> = Vec::new();
    for tag in ["h1", "h2", "h3"] {
        let mut pos = 0;
        while let Some(start) = find_open_tag(&lc, tag, pos) {
            let Some(open_end) = html[start..].find('>').map(|e| start + e + 1) else {
                break;
            };
            let Some(close) = lc[open_end..].find(&format!("</{}", tag)).map(|c| open_end + c) else {
                break;
            };
            let text = text_of(&html[open_end..close]);
            if !text.is_empty() {
                found.push((start, text));
            }
            pos = close;
        }
    }
    found.sort_by_key(|(pos, _)| *pos);
    let mut out: Vec<String> = Vec::new();
    for (_, text) in found {
        if !out.contains(&text) {
            out.push(text);
        }
        if out.len() >= max {
            break;
        }
    }
    out
}

/// Inner text of every element whose class list contains `class`. The
/// element ends at the first matching close tag, so nested elements of the
/// same name truncate the block; good enough for title and price spans.
pub fn texts_with_class(html: &str, class: &str) -> Vec<String> {
    let lc = html.to_ascii_lowercase();
    let class_lc = class.to_ascii_lowercase();
    let mut out = Vec::new();
    let mut pos = 0;
    while let Some(rel) = lc[pos..].find(&class_lc) {
        let hit = pos + rel;
        pos = hit + class_lc.len();
        let Some(open) = lc[..hit].rfind('<') else {
            continue;
        };
        // The hit must sit inside the opening tag's attributes.
        if lc[open..hit].contains('>') {
            continue;
        }
        let name: String = lc[open + 1..]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect();
        if name.is_empty() {
            continue;
        }
        let Some(open_end) = html[open..].find('>').map(|e| open + e + 1) else {
            break;
        };
        let Some(close) = lc[open_end..].find(&format!("</{}", name)).map(|c| open_end + c) else {
            continue;
        };
        let text = text_of(&html[open_end..close]);
        if !text.is_empty() {
            out.push(text);
        }
        pos = pos.max(close);
    }
    out
}

/// Cut to at most `max` chars on a char boundary, appending an ellipsis when cut.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", s[..idx].trim_end()),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html><head>
<title>Acme &amp; Co | Handmade Mugs</title>
<meta name="description" content="Hand-thrown  mugs, shipped &quot;fast&quot;.">
<meta property="og:site_name" content='Acme'>
<style>.x { color: red }</style>
</head>
<BODY class="home">
<script>var a = "<h1>not a heading</h1>";</script>
<h1>Welcome to Acme</h1>
<p>Free shipping over $50 &ndash; 30-day returns.</p>
<h2 class="t">Best sellers</h2><h2>Best sellers</h2>
<noscript>Enable JS</noscript>
<svg><text>icon</text></svg>
</BODY></html>"#;

    #[test]
    fn title_and_meta() {
        assert_eq!(title(PAGE).as_deref(), Some("Acme & Co | Handmade Mugs"));
        assert_eq!(
            meta_content(PAGE, "description").as_deref(),
            Some("Hand-thrown mugs, shipped \"fast\".")
        );
        assert_eq!(meta_content(PAGE, "og:site_name").as_deref(), Some("Acme"));
        assert_eq!(meta_content(PAGE, "keywords"), None);
    }

    #[test]
    fn visible_text_drops_invisible_blocks() {
        let text = visible_text(PAGE);
        assert!(text.starts_with("Welcome to Acme"));
        assert!(text.contains("Free shipping over $50 – 30-day returns."));
        assert!(!text.contains("not a heading"));
        assert!(!text.contains("Enable JS"));
        assert!(!text.contains("icon"));
    }

    #[test]
    fn headings_in_order_without_duplicates() {
        assert_eq!(headings(PAGE, 20), vec!["Welcome to Acme", "Best sellers"]);
        assert_eq!(headings(PAGE, 1).len(), 1);
    }

    #[test]
    fn remove_blocks_respects_tag_boundaries() {
        let html = "<section>keep</section><s>strike</s><style>x</style>";
        assert_eq!(remove_blocks(html, &["s"]), "<section>keep</section><style>x</style>");
        assert_eq!(remove_blocks("a<script>never closed", &["script"]), "a");
    }

    #[test]
    fn entities() {
        assert_eq!(decode_entities("&lt;b&gt; &#39;x&#x27; &bogus; & done"), "<b> 'x' &bogus; & done");
    }

    #[test]
    fn class_texts() {
        let html = r#"<li><div class="s-item__title"><span role="heading">Vintage <b>Lamp</b></span></div>
<span class="s-item__price">$24.99</span></li>
<li><div class="s-item__title">Brass Bowl</div><span class="s-item__price">$9.50</span></li>"#;
        assert_eq!(texts_with_class(html, "s-item__title"), vec!["Vintage Lamp", "Brass Bowl"]);
        assert_eq!(texts_with_class(html, "s-item__price"), vec!["$24.99", "$9.50"]);
    }

    #[test]
    fn attr_parsing() {
        let tag = r#"<meta data-name="x" name=Description content="a &amp; b">"#;
        assert_eq!(attr(tag, "name").as_deref(), Some("Description"));
        assert_eq!(attr(tag, "content").as_deref(), Some("a & b"));
    }

    #[test]
    fn truncation_is_char_safe() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo...");
        assert_eq!(truncate_chars("short", 10), "short");
    }
}
