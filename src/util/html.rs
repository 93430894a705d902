/// Escape the five characters that are significant in markup.
/// Used for text runs and attribute values alike.
pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Remove whole `<tag>...</tag>` blocks, content included, without parsing the markup.
/// - Tag names match case-insensitively and only on a name boundary (`<scripts>` stays)
/// - An opening tag without a closing tag drops everything up to the end of input
/// - Runs until no block is left, so removals cannot splice a new opening tag together
pub fn remove_blocks<S: AsRef<str>>(input: &str, tags: &[S]) -> String {
    if input.is_empty() {
        return String::new();
    }

    let tags: Vec<String> = tags
        .iter()
        .map(|tag| tag.as_ref().trim().to_ascii_lowercase())
        .filter(|tag| !tag.is_empty())
        .collect();

    let mut buf = input.to_string();
    loop {
        let before = buf.len();
        for tag in &tags {
            remove_tag_blocks(&mut buf, tag);
        }
        // every removal shrinks the buffer
        if buf.len() == before {
            return buf;
        }
    }
}

fn remove_tag_blocks(buf: &mut String, tag: &str) {
    let open = format!("<{}", tag);
    let close = format!("</{}", tag);
    let mut from = 0;
    loop {
        // ascii lowercasing keeps byte offsets aligned with `buf`
        let lower = buf.to_ascii_lowercase();
        let Some(start) = find_tag(&lower, &open, from) else {
            return;
        };
        match find_tag(&lower, &close, start + open.len()) {
            Some(close_start) => {
                let end = lower[close_start..]
                    .find('>')
                    .map(|rel| close_start + rel + 1)
                    .unwrap_or(buf.len());
                buf.replace_range(start..end, "");
                from = start;
            }
            None => {
                buf.truncate(start);
                return;
            }
        }
    }
}

fn find_tag(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let mut offset = from;
    while let Some(rel) = haystack[offset..].find(needle) {
        let pos = offset + rel;
        match haystack.as_bytes().get(pos + needle.len()) {
            None | Some(b'>') | Some(b'/') => return Some(pos),
            Some(b) if b.is_ascii_whitespace() => return Some(pos),
            _ => offset = pos + needle.len(),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_reserved_characters() {
        assert_eq!(escape(r#"<a href="x">'&'</a>"#), "&lt;a href=&quot;x&quot;&gt;&#039;&amp;&#039;&lt;/a&gt;");
        assert_eq!(escape("plain text"), "plain text");
    }

    #[test]
    fn removes_blocks_with_content() {
        let input = "a<SCRIPT type=\"text/javascript\">alert(1)</Script >b<style>p{}</style>c";
        assert_eq!(remove_blocks(input, &["script", "style"]), "abc");
    }

    #[test]
    fn unclosed_block_drops_rest_of_input() {
        assert_eq!(remove_blocks("keep<script>alert(1) <p>lost</p>", &["script"]), "keep");
    }

    #[test]
    fn respects_name_boundaries() {
        let input = "<scripts>x</scripts><script/>y";
        assert_eq!(remove_blocks(input, &["script"]), "<scripts>x</scripts>");
    }

    #[test]
    fn removal_does_not_splice_a_new_block_together() {
        let input = "<p>x</p><scr<script></script>ipt>alert(1)</script>";
        assert_eq!(remove_blocks(input, &["script", "style"]), "<p>x</p>");

        let input = "<sty<style></style>le>body{color:red}</style><p>y</p>";
        assert_eq!(remove_blocks(input, &["script", "style"]), "<p>y</p>");

        let input = "<scr<sty<style></style>le></style>ipt>alert(1)</script>z";
        assert_eq!(remove_blocks(input, &["script", "style"]), "z");
    }

    #[test]
    fn keeps_multibyte_text_intact() {
        let input = "İstanbul <script>x</script>café";
        assert_eq!(remove_blocks(input, &["script"]), "İstanbul café");
    }
}
