//! Recursive-descent parser for relation expression strings.

use super::{Recursion, RelationNode, MAX_RECURSION_DEPTH};
use crate::error::GraphError;
use crate::model::ModifierRef;

/// Deepest `[` and `.` nesting the parser descends into
const MAX_NESTING_DEPTH: usize = 128;

/// What a path or list contributes to the node it hangs off
enum Piece {
    Child(RelationNode),
    Recursion(Recursion),
    AllRecursive,
}

struct Parser<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
    nesting: usize,
}

pub(super) fn parse(input: &str) -> Result<RelationNode, GraphError> {
    let mut parser = Parser {
        input,
        bytes: input.as_bytes(),
        pos: 0,
        nesting: 0,
    };
    let mut root = RelationNode::default();

    parser.skip_ws();
    if parser.at_end() {
        return Ok(root);
    }
    let pieces = parser.item()?;
    parser.skip_ws();
    if !parser.at_end() {
        return Err(parser.error("unexpected character"));
    }

    parser.attach(&mut root, pieces, 0)?;
    if root.recursion != Recursion::None {
        return Err(parser.error_at(0, "recursion marker must follow a relation"));
    }
    Ok(root)
}

impl<'a> Parser<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, message: &str) -> GraphError {
        self.error_at(self.pos, message)
    }

    fn error_at(&self, position: usize, message: &str) -> GraphError {
        let end = (position + 20).min(self.bytes.len());
        let fragment = String::from_utf8_lossy(&self.bytes[position.min(end)..end]).into_owned();
        GraphError::Parse {
            expression: self.input.to_string(),
            position,
            fragment,
            message: message.to_string(),
        }
    }

    /// item := list | path
    fn item(&mut self) -> Result<Vec<Piece>, GraphError> {
        self.skip_ws();
        if self.nesting == MAX_NESTING_DEPTH {
            return Err(self.error("expression is nested too deeply"));
        }
        self.nesting += 1;
        let pieces = if self.peek() == Some(b'[') {
            self.list()
        } else {
            self.path()
        };
        self.nesting -= 1;
        pieces
    }

    /// list := '[' (item (',' item)*)? ']'
    fn list(&mut self) -> Result<Vec<Piece>, GraphError> {
        self.pos += 1;
        let mut pieces = Vec::new();
        loop {
            self.skip_ws();
            if self.eat(b']') {
                return Ok(pieces);
            }
            pieces.extend(self.item()?);
            self.skip_ws();
            if self.eat(b']') {
                return Ok(pieces);
            }
            if !self.eat(b',') {
                return Err(self.error("expected ',' or ']'"));
            }
        }
    }

    /// path := '*' | '^' digits? | segment ('.' item)?
    fn path(&mut self) -> Result<Vec<Piece>, GraphError> {
        let start = self.pos;
        if self.eat(b'*') {
            return Ok(vec![Piece::AllRecursive]);
        }
        if self.eat(b'^') {
            let digits = self.identifier_chars(|b| b.is_ascii_digit());
            if digits.is_empty() {
                return Ok(vec![Piece::Recursion(Recursion::Unbounded)]);
            }
            let depth: usize = digits
                .parse()
                .map_err(|_| self.error_at(start, "invalid recursion depth"))?;
            if depth == 0 {
                return Err(self.error_at(start, "recursion depth must be at least 1"));
            }
            if depth > MAX_RECURSION_DEPTH {
                return Err(GraphError::RecursionTooDeep {
                    expression: self.input.to_string(),
                    limit: MAX_RECURSION_DEPTH,
                });
            }
            return Ok(vec![Piece::Recursion(Recursion::Depth(depth))]);
        }

        let mut node = self.segment()?;
        self.skip_ws();
        if self.eat(b'.') {
            let pieces = self.item()?;
            self.attach(&mut node, pieces, start)?;
        }
        Ok(vec![Piece::Child(node)])
    }

    /// segment := name ('(' names? ')')? ('as' name)?
    fn segment(&mut self) -> Result<RelationNode, GraphError> {
        let relation_name = self.name("expected a relation name")?;
        let mut node = RelationNode::new(relation_name);

        self.skip_ws();
        if self.eat(b'(') {
            loop {
                self.skip_ws();
                if self.eat(b')') {
                    break;
                }
                let modifier = self.name("expected a modifier name")?;
                node.add_modifier(&ModifierRef::Named(modifier));
                self.skip_ws();
                if self.eat(b')') {
                    break;
                }
                if !self.eat(b',') {
                    return Err(self.error("expected ',' or ')'"));
                }
            }
        }

        let before_alias = self.pos;
        self.skip_ws();
        if self.bytes[self.pos..].starts_with(b"as")
            && matches!(self.bytes.get(self.pos + 2), Some(b' ' | b'\t' | b'\n' | b'\r'))
        {
            self.pos += 2;
            self.skip_ws();
            node.name = self.name("expected an alias after 'as'")?;
        } else {
            self.pos = before_alias;
        }
        Ok(node)
    }

    fn name(&mut self, message: &str) -> Result<String, GraphError> {
        let name = self.identifier_chars(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'$');
        if name.is_empty() {
            Err(self.error(message))
        } else {
            Ok(name)
        }
    }

    fn identifier_chars(&mut self, accept: impl Fn(u8) -> bool) -> String {
        let start = self.pos;
        while self.peek().map(&accept).unwrap_or(false) {
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned()
    }

    fn attach(&self, node: &mut RelationNode, pieces: Vec<Piece>, position: usize) -> Result<(), GraphError> {
        for piece in pieces {
            match piece {
                Piece::Child(child) => node.insert_child(child),
                Piece::Recursion(recursion) => node.recursion = node.recursion.merge(recursion),
                Piece::AllRecursive => node.all_recursive = true,
            }
        }
        if (node.all_recursive || node.recursion != Recursion::None) && !node.children.is_empty() {
            return Err(self.error_at(
                position,
                "recursion markers cannot be combined with other relations",
            ));
        }
        Ok(())
    }
}
