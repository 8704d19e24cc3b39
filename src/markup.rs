use std::collections::BTreeMap;

use crate::error::{FormwrightError, FormwrightResult};

/// Tag vocabulary of server-delivered view descriptions.
///
/// Closed for everything this crate interprets; anything else is kept as
/// `Other` so forward-incompatible view definitions still parse and render
/// a visible marker instead of aborting.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    Form,
    Tree,
    Graph,
    Calendar,
    Board,
    Group,
    Notebook,
    Page,
    Separator,
    Label,
    Field,
    Button,
    Paned,
    Expander,
    Link,
    Image,
    Other(String),
}

impl Tag {
    fn from_name(name: &str) -> Self {
        match name {
            "form" => Tag::Form,
            "tree" => Tag::Tree,
            "graph" => Tag::Graph,
            "calendar" => Tag::Calendar,
            "board" => Tag::Board,
            "group" => Tag::Group,
            "notebook" => Tag::Notebook,
            "page" => Tag::Page,
            "separator" => Tag::Separator,
            "label" => Tag::Label,
            "field" => Tag::Field,
            "button" => Tag::Button,
            "paned" => Tag::Paned,
            "expander" => Tag::Expander,
            "link" => Tag::Link,
            "image" => Tag::Image,
            other => Tag::Other(other.to_string()),
        }
    }
}

/// One normalized element of a view description.
///
/// Every element has the same shape regardless of how the source markup
/// spelled it; repeatable tags are plain entries of `children`, so a single
/// occurrence needs no special-casing by consumers.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ViewNode {
    pub tag: Tag,
    pub attrs: BTreeMap<String, String>,
    pub children: Vec<ViewNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ViewNode {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn children_tagged<'a>(&'a self, tag: &Tag) -> impl Iterator<Item = &'a ViewNode> {
        let tag = tag.clone();
        self.children.iter().filter(move |c| c.tag == tag)
    }
}

/// Parse raw view markup into a normalized tree.
///
/// Failure is fatal only to this one view load; the caller keeps whatever
/// view it was showing before.
#[tracing::instrument(skip(markup), fields(len = markup.len()))]
pub fn parse_view(markup: &str) -> FormwrightResult<ViewNode> {
    let mut scanner = Scanner::new(markup);
    scanner.skip_prolog();
    let root = scanner.element()?;
    scanner.skip_trivia();
    if !scanner.at_end() {
        return Err(FormwrightError::parse(format!(
            "trailing content after root element at offset {}",
            scanner.pos
        )));
    }
    Ok(root)
}

struct Scanner<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src: src.as_bytes(),
            pos: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn starts_with(&self, s: &str) -> bool {
        self.src[self.pos..].starts_with(s.as_bytes())
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    /// Whitespace plus comments; also used between prolog and root.
    fn skip_trivia(&mut self) {
        loop {
            self.skip_ws();
            if self.starts_with("<!--") {
                match find(self.src, self.pos + 4, "-->") {
                    Some(end) => self.pos = end + 3,
                    None => {
                        self.pos = self.src.len();
                        return;
                    }
                }
            } else {
                return;
            }
        }
    }

    fn skip_prolog(&mut self) {
        self.skip_trivia();
        if self.starts_with("<?") {
            if let Some(end) = find(self.src, self.pos + 2, "?>") {
                self.pos = end + 2;
            } else {
                self.pos = self.src.len();
            }
        }
        self.skip_trivia();
    }

    fn element(&mut self) -> FormwrightResult<ViewNode> {
        if self.peek() != Some(b'<') {
            return Err(FormwrightError::parse(format!(
                "expected '<' at offset {}",
                self.pos
            )));
        }
        self.pos += 1;

        let name = self.name()?;
        let mut attrs = BTreeMap::new();

        loop {
            self.skip_ws();
            match self.peek() {
                Some(b'/') => {
                    // Self-closing element.
                    self.pos += 1;
                    if self.peek() != Some(b'>') {
                        return Err(FormwrightError::parse(format!(
                            "expected '>' after '/' at offset {}",
                            self.pos
                        )));
                    }
                    self.pos += 1;
                    return Ok(ViewNode {
                        tag: Tag::from_name(&name),
                        attrs,
                        children: Vec::new(),
                        text: None,
                    });
                }
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => {
                    let (key, value) = self.attribute()?;
                    attrs.insert(key, value);
                }
                None => {
                    return Err(FormwrightError::parse(format!(
                        "unterminated element '{name}'"
                    )));
                }
            }
        }

        let (children, text) = self.content(&name)?;
        Ok(ViewNode {
            tag: Tag::from_name(&name),
            attrs,
            children,
            text,
        })
    }

    /// Child elements and text until the matching close tag.
    fn content(&mut self, open_name: &str) -> FormwrightResult<(Vec<ViewNode>, Option<String>)> {
        let mut children = Vec::new();
        let mut text = String::new();

        loop {
            if self.at_end() {
                return Err(FormwrightError::parse(format!(
                    "missing close tag for '{open_name}'"
                )));
            }
            if self.starts_with("<!--") {
                self.skip_trivia();
                continue;
            }
            if self.starts_with("</") {
                self.pos += 2;
                let close = self.name()?;
                if close != open_name {
                    return Err(FormwrightError::parse(format!(
                        "close tag '</{close}>' does not match '<{open_name}>'"
                    )));
                }
                self.skip_ws();
                if self.peek() != Some(b'>') {
                    return Err(FormwrightError::parse(format!(
                        "expected '>' in close tag at offset {}",
                        self.pos
                    )));
                }
                self.pos += 1;
                break;
            }
            if self.peek() == Some(b'<') {
                children.push(self.element()?);
                continue;
            }

            let start = self.pos;
            while !self.at_end() && self.peek() != Some(b'<') {
                self.pos += 1;
            }
            text.push_str(&decode_entities(str_slice(self.src, start, self.pos)?));
        }

        let text = text.trim();
        let text = if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        };
        Ok((children, text))
    }

    fn name(&mut self) -> FormwrightResult<String> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || matches!(c, b'_' | b'-' | b':' | b'.') {
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(FormwrightError::parse(format!(
                "expected name at offset {}",
                self.pos
            )));
        }
        Ok(str_slice(self.src, start, self.pos)?.to_string())
    }

    fn attribute(&mut self) -> FormwrightResult<(String, String)> {
        let key = self.name()?;
        self.skip_ws();
        if self.peek() != Some(b'=') {
            // Bare attribute, e.g. `<field name="x" readonly/>`.
            return Ok((key, "1".to_string()));
        }
        self.pos += 1;
        self.skip_ws();

        let quote = match self.peek() {
            Some(q @ (b'"' | b'\'')) => q,
            _ => {
                return Err(FormwrightError::parse(format!(
                    "attribute '{key}' value must be quoted (offset {})",
                    self.pos
                )));
            }
        };
        self.pos += 1;
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == quote {
                break;
            }
            self.pos += 1;
        }
        if self.at_end() {
            return Err(FormwrightError::parse(format!(
                "unterminated value for attribute '{key}'"
            )));
        }
        let raw = str_slice(self.src, start, self.pos)?;
        self.pos += 1; // closing quote
        Ok((key, decode_entities(raw)))
    }
}

fn find(src: &[u8], from: usize, needle: &str) -> Option<usize> {
    let needle = needle.as_bytes();
    if from > src.len() {
        return None;
    }
    src[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| from + i)
}

fn str_slice(src: &[u8], start: usize, end: usize) -> FormwrightResult<&str> {
    std::str::from_utf8(&src[start..end])
        .map_err(|_| FormwrightError::parse("markup is not valid UTF-8 at a token boundary"))
}

fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_structure_in_order() {
        let root = parse_view(
            r#"<form string="Order">
                 <group col="2">
                   <field name="quantity"/>
                   <field name="price" widget="numeric"/>
                 </group>
                 <button name="confirm" string="Confirm"/>
               </form>"#,
        )
        .unwrap();

        assert_eq!(root.tag, Tag::Form);
        assert_eq!(root.attr("string"), Some("Order"));
        assert_eq!(root.children.len(), 2);

        let group = &root.children[0];
        assert_eq!(group.tag, Tag::Group);
        assert_eq!(group.attr("col"), Some("2"));
        let fields: Vec<_> = group.children_tagged(&Tag::Field).collect();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].attr("name"), Some("quantity"));
        assert_eq!(fields[1].attr("widget"), Some("numeric"));

        assert_eq!(root.children[1].tag, Tag::Button);
    }

    #[test]
    fn single_repeatable_tag_is_still_a_list() {
        let root = parse_view(r#"<form><field name="only"/></form>"#).unwrap();
        assert_eq!(root.children_tagged(&Tag::Field).count(), 1);
    }

    #[test]
    fn prolog_comments_and_entities() {
        let root = parse_view(
            "<?xml version=\"1.0\"?>\n<!-- header -->\n<form>\
             <label string=\"a &amp; b &lt;c&gt;\"/><!-- mid --></form>",
        )
        .unwrap();
        assert_eq!(root.children[0].attr("string"), Some("a & b <c>"));
    }

    #[test]
    fn text_content_is_captured() {
        let root = parse_view("<form><label>Shipping notes</label></form>").unwrap();
        assert_eq!(root.children[0].text.as_deref(), Some("Shipping notes"));
    }

    #[test]
    fn unknown_tag_is_preserved_not_rejected() {
        let root = parse_view(r#"<form><hologram name="x"/></form>"#).unwrap();
        assert_eq!(root.children[0].tag, Tag::Other("hologram".to_string()));
    }

    #[test]
    fn bare_attribute_reads_as_set() {
        let root = parse_view(r#"<form><field name="x" readonly/></form>"#).unwrap();
        assert_eq!(root.children[0].attr("readonly"), Some("1"));
    }

    #[test]
    fn mismatched_close_tag_is_a_parse_error() {
        let err = parse_view("<form><group></form></group>").unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn trailing_content_is_rejected() {
        assert!(parse_view("<form/><form/>").is_err());
    }

    #[test]
    fn serde_round_trip_preserves_tag_attrs_and_child_order() {
        let root = parse_view(
            r#"<form><separator/><field name="b"/><field name="a"/><label string="l"/></form>"#,
        )
        .unwrap();
        let json = serde_json::to_string(&root).unwrap();
        let back: ViewNode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, root);
        let tags: Vec<_> = back.children.iter().map(|c| c.tag.clone()).collect();
        assert_eq!(
            tags,
            vec![Tag::Separator, Tag::Field, Tag::Field, Tag::Label]
        );
    }
}
