use super::{Attribute, CodeBlockKind, Document, Element, Node, is_raw_text_element, is_void_element};

/// Parses a view file. Never fails: malformed constructs degrade to text.
pub fn parse(source: &str) -> Document {
    let mut parser = Parser {
        src: source,
        pos: 0,
        stack: Vec::new(),
        roots: Vec::new(),
    };
    parser.run();
    Document {
        nodes: parser.roots,
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    stack: Vec<Element>,
    roots: Vec<Node>,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.src[start..end]
    }

    fn run(&mut self) {
        while self.pos < self.src.len() {
            let rest = self.rest();
            if rest.starts_with("<%--") {
                self.server_comment();
            } else if rest.starts_with("<%") {
                self.server_block();
            } else if rest.starts_with("<!--") {
                self.comment();
            } else if rest.starts_with("</") {
                self.end_tag();
            } else if rest.starts_with("<!") || rest.starts_with("<?") {
                self.declaration();
            } else if rest.starts_with('<')
                && rest[1..].chars().next().is_some_and(|c| c.is_ascii_alphabetic())
            {
                if !self.start_tag() {
                    self.push_text("<");
                    self.pos += 1;
                }
            } else {
                self.text();
            }
        }

        while !self.stack.is_empty() {
            self.close_top(false);
        }
    }

    fn push_node(&mut self, node: Node) {
        match self.stack.last_mut() {
            Some(top) => top.children.push(node),
            None => self.roots.push(node),
        }
    }

    fn push_text(&mut self, text: &str) {
        let target = match self.stack.last_mut() {
            Some(top) => &mut top.children,
            None => &mut self.roots,
        };
        if let Some(Node::Text(existing)) = target.last_mut() {
            existing.push_str(text);
        } else {
            target.push(Node::Text(text.to_string()));
        }
    }

    fn close_top(&mut self, closed: bool) {
        if let Some(mut element) = self.stack.pop() {
            element.closed = closed;
            self.push_node(Node::Element(element));
        }
    }

    /// Consumes up to and including `terminator`, returning the text before it.
    /// Without a terminator the rest of the input is returned.
    fn take_until(&mut self, start: usize, terminator: &str) -> (&'a str, bool) {
        let body_start = self.pos + start;
        match self.src[body_start..].find(terminator) {
            Some(offset) => {
                let body = &self.src[body_start..body_start + offset];
                self.pos = body_start + offset + terminator.len();
                (body, true)
            }
            None => {
                let body = &self.src[body_start..];
                self.pos = self.src.len();
                (body, false)
            }
        }
    }

    fn server_comment(&mut self) {
        let begin = self.pos;
        let (body, terminated) = self.take_until(4, "--%>");
        if terminated {
            self.push_node(Node::ServerComment(body.to_string()));
        } else {
            let raw = self.slice(begin, self.src.len());
            self.push_text(raw);
        }
    }

    fn server_block(&mut self) {
        let begin = self.pos;
        let (body, terminated) = self.take_until(2, "%>");
        if !terminated {
            let raw = self.slice(begin, self.src.len());
            self.push_text(raw);
            return;
        }
        let node = match body.chars().next() {
            Some('@') => Node::Directive(body[1..].to_string()),
            Some('=') => code_block(CodeBlockKind::Expression, &body[1..]),
            Some(':') => code_block(CodeBlockKind::EncodedExpression, &body[1..]),
            Some('#') => code_block(CodeBlockKind::DataBinding, &body[1..]),
            Some('$') => code_block(CodeBlockKind::ExpressionBuilder, &body[1..]),
            _ => code_block(CodeBlockKind::Statement, body),
        };
        self.push_node(node);
    }

    fn comment(&mut self) {
        let begin = self.pos;
        let (body, terminated) = self.take_until(4, "-->");
        if terminated {
            self.push_node(Node::Comment(body.to_string()));
        } else {
            let raw = self.slice(begin, self.src.len());
            self.push_text(raw);
        }
    }

    fn declaration(&mut self) {
        let begin = self.pos;
        self.take_until(2, ">");
        let raw = self.slice(begin, self.pos);
        self.push_text(raw);
    }

    fn text(&mut self) {
        let rest = self.rest();
        let first = rest.chars().next().map(char::len_utf8).unwrap_or(1);
        let len = rest[first..]
            .find('<')
            .map(|idx| idx + first)
            .unwrap_or(rest.len());
        self.push_text(&rest[..len]);
        self.pos += len;
    }

    fn end_tag(&mut self) {
        let begin = self.pos;
        let (body, _) = self.take_until(2, ">");
        let name = body.trim();
        let matching = self
            .stack
            .iter()
            .rposition(|element| element.name.eq_ignore_ascii_case(name));
        match matching {
            Some(idx) => {
                while self.stack.len() > idx + 1 {
                    self.close_top(false);
                }
                self.close_top(true);
            }
            None => {
                let raw = self.slice(begin, self.pos);
                self.push_text(raw);
            }
        }
    }

    /// Parses a start tag at the cursor. Returns false (without consuming) when
    /// the input is not a well-formed tag.
    fn start_tag(&mut self) -> bool {
        let mut scanner = Scanner {
            src: self.src,
            pos: self.pos + 1,
        };
        let name = scanner.take_while(|c| !c.is_whitespace() && c != '>' && c != '/');
        if name.is_empty() {
            return false;
        }
        let mut element = Element::new(name);

        loop {
            scanner.skip_whitespace();
            let rest = scanner.rest();
            if rest.is_empty() {
                return false;
            }
            if rest.starts_with("/>") {
                scanner.pos += 2;
                element.self_closing = true;
                break;
            }
            if rest.starts_with('>') {
                scanner.pos += 1;
                break;
            }
            if rest.starts_with("<%") {
                let Some(end) = rest.find("%>") else {
                    return false;
                };
                element.attributes.push(Attribute {
                    name: rest[..end + 2].to_string(),
                    value: None,
                    quote: None,
                });
                scanner.pos += end + 2;
                continue;
            }
            match scanner.attribute() {
                Some(attribute) => element.attributes.push(attribute),
                None => return false,
            }
        }
        self.pos = scanner.pos;

        if element.self_closing || is_void_element(&element.name) {
            element.closed = false;
            self.push_node(Node::Element(element));
        } else if is_raw_text_element(&element.name) {
            self.raw_text_body(element);
        } else {
            self.stack.push(element);
        }
        true
    }

    fn raw_text_body(&mut self, mut element: Element) {
        let closing = format!("</{}", element.name.to_ascii_lowercase());
        let rest = self.rest();
        let lowered = rest.to_ascii_lowercase();
        match lowered.find(&closing) {
            Some(offset) => {
                if offset > 0 {
                    element.children.push(Node::Text(rest[..offset].to_string()));
                }
                let after = &rest[offset..];
                let tag_len = after.find('>').map(|idx| idx + 1).unwrap_or(after.len());
                self.pos += offset + tag_len;
                element.closed = true;
            }
            None => {
                if !rest.is_empty() {
                    element.children.push(Node::Text(rest.to_string()));
                }
                self.pos = self.src.len();
                element.closed = false;
            }
        }
        self.push_node(Node::Element(element));
    }
}

fn code_block(kind: CodeBlockKind, code: &str) -> Node {
    Node::CodeBlock {
        kind,
        code: code.to_string(),
    }
}

struct Scanner<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn take_while<F: Fn(char) -> bool>(&mut self, keep: F) -> &'a str {
        let rest = self.rest();
        let len = rest
            .char_indices()
            .find(|(_, c)| !keep(*c))
            .map(|(idx, _)| idx)
            .unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    fn skip_whitespace(&mut self) {
        self.take_while(char::is_whitespace);
    }

    fn attribute(&mut self) -> Option<Attribute> {
        let name = self.take_while(|c| !c.is_whitespace() && c != '=' && c != '>' && c != '/');
        if name.is_empty() {
            // Stray '/' inside a tag.
            if self.rest().starts_with('/') {
                self.pos += 1;
                return Some(Attribute {
                    name: "/".into(),
                    value: None,
                    quote: None,
                });
            }
            return None;
        }

        let checkpoint = self.pos;
        self.skip_whitespace();
        if !self.rest().starts_with('=') {
            self.pos = checkpoint;
            return Some(Attribute {
                name: name.to_string(),
                value: None,
                quote: None,
            });
        }
        self.pos += 1;
        self.skip_whitespace();

        let quote = self.rest().chars().next().filter(|c| *c == '"' || *c == '\'');
        let value = match quote {
            Some(q) => {
                self.pos += 1;
                let value = self.value_until(|c| c == q)?;
                self.pos += 1;
                value
            }
            None => self.value_until(|c| c.is_whitespace() || c == '>')?,
        };
        Some(Attribute {
            name: name.to_string(),
            value: Some(value.to_string()),
            quote,
        })
    }

    /// Reads a value up to `stop`, skipping over embedded `<% ... %>` blocks.
    /// Returns None when a quoted value runs off the end of the input.
    fn value_until<F: Fn(char) -> bool>(&mut self, stop: F) -> Option<&'a str> {
        let start = self.pos;
        loop {
            let rest = self.rest();
            if rest.starts_with("<%") {
                let end = rest.find("%>")?;
                self.pos += end + 2;
                continue;
            }
            match rest.chars().next() {
                Some(c) if stop(c) => return Some(&self.src[start..self.pos]),
                Some(c) => self.pos += c.len_utf8(),
                None => {
                    return if stop(' ') {
                        Some(&self.src[start..self.pos])
                    } else {
                        None
                    };
                }
            }
        }
    }
}
