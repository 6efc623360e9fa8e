//! Minimal vCard property reader (RFC 6350 / 2426 content lines)

/// One content line of a vCard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    /// Upper-cased name without group prefix
    pub name: String,
    /// Parameters as (upper-cased name, value) pairs
    pub params: Vec<(String, String)>,
    /// Raw value, still escaped, whitespace kept as written
    pub value: String,
}

impl Property {
    /// Look up a parameter by name (case-insensitive)
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Join folded lines: a line starting with a space or tab continues the previous one
pub fn unfold(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in text.split('\n') {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        if let Some(rest) = line.strip_prefix([' ', '\t']) {
            if let Some(last) = lines.last_mut() {
                last.push_str(rest);
                continue;
            }
        }
        if !line.trim().is_empty() {
            lines.push(line.to_string());
        }
    }
    lines
}

/// Parse one unfolded content line
pub fn parse_line(line: &str) -> Option<Property> {
    let colon = find_unquoted(line, ':')?;
    let (head, value) = (&line[..colon], &line[colon + 1..]);

    let mut segments = split_unquoted(head, ';').into_iter();
    let full_name = segments.next()?.trim();
    // Strip "item1." style groups
    let name = full_name.rsplit('.').next().unwrap_or(full_name).to_uppercase();
    if name.is_empty() {
        return None;
    }

    let params = segments
        .filter_map(|segment| {
            let (k, v) = match segment.split_once('=') {
                Some((k, v)) => (k, v),
                // vCard 2.1 bare parameters ("TEL;HOME:")
                None => ("TYPE", segment),
            };
            let v = v.trim().trim_matches('"');
            Some((k.trim().to_uppercase(), v.to_string()))
        })
        .collect();

    Some(Property {
        name,
        params,
        value: value.to_string(),
    })
}

/// All properties of the first VCARD in `text`
pub fn parse(text: &str) -> Vec<Property> {
    let mut properties = Vec::new();
    let mut inside = false;

    for line in unfold(text) {
        let Some(property) = parse_line(&line) else {
            continue;
        };
        let is_card = property.value.trim().eq_ignore_ascii_case("VCARD");
        if property.name == "BEGIN" && is_card {
            inside = true;
        } else if property.name == "END" && is_card && inside {
            break;
        } else if inside {
            properties.push(property);
        }
    }

    properties
}

/// Undo text escaping (`\,` `\;` `\n` `\\`)
pub fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Split a structured value (`N:Family;Given;;;`) on unescaped semicolons
pub fn components(value: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for c in value.chars() {
        if escaped {
            current.push('\\');
            current.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == ';' {
            parts.push(unescape(&current));
            current.clear();
        } else {
            current.push(c);
        }
    }
    parts.push(unescape(&current));
    parts
}

fn find_unquoted(s: &str, needle: char) -> Option<usize> {
    let mut quoted = false;
    for (i, c) in s.char_indices() {
        match c {
            '"' => quoted = !quoted,
            c if c == needle && !quoted => return Some(i),
            _ => {}
        }
    }
    None
}

fn split_unquoted(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '"' => quoted = !quoted,
            c if c == sep && !quoted => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unfold() {
        let text = "BEGIN:VCARD\r\nNOTE:first\r\n  second\r\nEND:VCARD\r\n";
        let lines = unfold(text);
        assert_eq!(lines, vec!["BEGIN:VCARD", "NOTE:first second", "END:VCARD"]);
    }

    #[test]
    fn test_parse_line_with_group_and_params() {
        let prop = parse_line("item1.BDAY;VALUE=date;X-APPLE-OMIT-YEAR=1604:1604-03-14").unwrap();
        assert_eq!(prop.name, "BDAY");
        assert_eq!(prop.param("value"), Some("date"));
        assert_eq!(prop.param("X-APPLE-OMIT-YEAR"), Some("1604"));
        assert_eq!(prop.value, "1604-03-14");
    }

    #[test]
    fn test_parse_line_quoted_colon() {
        let prop = parse_line("X-ABLABEL;X-NOTE=\"a:b\":Party").unwrap();
        assert_eq!(prop.name, "X-ABLABEL");
        assert_eq!(prop.param("X-NOTE"), Some("a:b"));
        assert_eq!(prop.value, "Party");
    }

    #[test]
    fn test_parse_line_keeps_value_whitespace() {
        let prop = parse_line("NOTE: padded text ").unwrap();
        assert_eq!(prop.value, " padded text ");

        let props = parse("BEGIN:VCARD 
FN:Alice 
END: VCARD
FN:Other
");
        assert_eq!(props.len(), 1);
        assert_eq!(props[0].value, "Alice ");
    }

    #[test]
    fn test_parse_only_first_card() {
        let text = "BEGIN:VCARD\nFN:One\nEND:VCARD\nBEGIN:VCARD\nFN:Two\nEND:VCARD\n";
        let props = parse(text);
        assert_eq!(props.len(), 1);
        assert_eq!(props[0].value, "One");
    }

    #[test]
    fn test_components_and_unescape() {
        assert_eq!(components("Doe;John;;;"), vec!["Doe", "John", "", "", ""]);
        assert_eq!(components("O\\;Brien;Pat"), vec!["O;Brien", "Pat"]);
        assert_eq!(unescape("Smith\\, Jr."), "Smith, Jr.");
    }
}
