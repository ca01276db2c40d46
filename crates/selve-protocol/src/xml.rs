//! Minimal XML element reader and writer for the gateway dialect.
//!
//! The gateway only ever emits a handful of elements with no attributes,
//! namespaces or mixed content, so frames are read into a small element tree
//! rather than through a general-purpose XML stack.

use std::fmt::Write;

/// A parsed element: its tag, child elements and unescaped text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    pub name: String,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    /// First child with the given tag.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Parse a single root element from `input`, ignoring trailing whitespace.
    pub fn parse(input: &str) -> Result<Element, String> {
        let mut parser = Parser { input, pos: 0 };
        parser.skip_whitespace();
        let root = parser.element()?;
        parser.skip_whitespace();
        if parser.pos != input.len() {
            return Err(format!("trailing data after </{}>", root.name));
        }
        Ok(root)
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn skip_whitespace(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.input.len() - trimmed.len();
    }

    fn expect(&mut self, token: &str) -> Result<(), String> {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            Ok(())
        } else {
            Err(format!("expected '{}' at offset {}", token, self.pos))
        }
    }

    fn element(&mut self) -> Result<Element, String> {
        self.expect("<")?;
        let end = self
            .rest()
            .find('>')
            .ok_or_else(|| "unterminated start tag".to_string())?;
        let tag = &self.rest()[..end];
        self.pos += end + 1;

        let self_closing = tag.ends_with('/');
        let tag = tag.trim_end_matches('/');
        // Attributes are tolerated but not kept.
        let name = tag.split_whitespace().next().unwrap_or("").to_string();
        if name.is_empty() || name.starts_with('/') {
            return Err(format!("invalid start tag '<{}>'", tag));
        }

        let mut element = Element {
            name,
            ..Default::default()
        };
        if self_closing {
            return Ok(element);
        }

        let mut raw_text = String::new();
        loop {
            let next = self
                .rest()
                .find('<')
                .ok_or_else(|| format!("missing </{}>", element.name))?;
            raw_text.push_str(&self.rest()[..next]);
            self.pos += next;

            if self.rest().starts_with("</") {
                self.pos += 2;
                let end = self
                    .rest()
                    .find('>')
                    .ok_or_else(|| "unterminated end tag".to_string())?;
                let closing = self.rest()[..end].trim();
                if closing != element.name {
                    return Err(format!(
                        "mismatched end tag: expected </{}>, found </{}>",
                        element.name, closing
                    ));
                }
                self.pos += end + 1;
                break;
            }
            element.children.push(self.element()?);
        }

        if element.children.is_empty() {
            element.text = unescape(&raw_text)?;
        } else if !raw_text.trim().is_empty() {
            return Err(format!("unexpected text inside <{}>", element.name));
        }
        Ok(element)
    }
}

/// Escape text content for inclusion in an element.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Resolve entity and character references.
pub fn unescape(text: &str) -> Result<String, String> {
    if !text.contains('&') {
        return Ok(text.to_string());
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let semi = after
            .find(';')
            .ok_or_else(|| "unterminated entity reference".to_string())?;
        let entity = &after[..semi];
        let resolved = match entity {
            "amp" => '&',
            "lt" => '<',
            "gt" => '>',
            "quot" => '"',
            "apos" => '\'',
            _ => {
                let code = if let Some(hex) = entity.strip_prefix("#x") {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse::<u32>().ok()
                } else {
                    None
                };
                code.and_then(char::from_u32)
                    .ok_or_else(|| format!("unknown entity '&{};'", entity))?
            }
        };
        out.push(resolved);
        rest = &after[semi + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Append `<tag>escaped text</tag>` to `out`.
pub fn write_text_element(out: &mut String, tag: &str, text: &str) {
    // Writing to a String cannot fail.
    let _ = write!(out, "<{0}>{1}</{0}>", tag, escape(text));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested() {
        let root = Element::parse(
            "<methodResponse><array><string>a</string><int>5</int></array></methodResponse>",
        )
        .unwrap();
        assert_eq!(root.name, "methodResponse");
        let array = root.child("array").unwrap();
        assert_eq!(array.children.len(), 2);
        assert_eq!(array.children[0].text, "a");
        assert_eq!(array.children[1].name, "int");
    }

    #[test]
    fn test_parse_whitespace_and_self_closing() {
        let root = Element::parse("<a>\r\n  <string/>\n  <int> 3 </int>\n</a>\n").unwrap();
        assert_eq!(root.children[0].text, "");
        assert_eq!(root.children[1].text, " 3 ");
    }

    #[test]
    fn test_parse_rejects_mismatch() {
        assert!(Element::parse("<a><b></a></b>").is_err());
        assert!(Element::parse("<a>").is_err());
        assert!(Element::parse("<a></a><b></b>").is_err());
    }

    #[test]
    fn test_escape_unescape() {
        let text = "Tom & Jerry's <blind> \"left\"";
        let escaped = escape(text);
        assert!(!escaped.contains('<'));
        assert_eq!(unescape(&escaped).unwrap(), text);
        assert_eq!(unescape("K&#252;che &#x41;").unwrap(), "Küche A");
        assert!(unescape("&bogus;").is_err());
    }
}
