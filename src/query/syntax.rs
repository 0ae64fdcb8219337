//! Query document syntax check
//!
//! A recursive-descent pass over the subset of the graph-query grammar the
//! engine emits: named operations, selection sets, aliases, arguments and
//! literal values (including variables). Generated text is checked before it
//! is sent so a bad binding aborts the cycle instead of reaching the server.

use crate::error::StencilError;

#[derive(Debug, Clone, PartialEq)]
enum Token<'a> {
    Name(&'a str),
    Number(&'a str),
    Str,
    Punct(char),
    Spread,
}

#[derive(Debug, Clone)]
struct Spanned<'a> {
    token: Token<'a>,
    pos: usize,
}

fn error(pos: usize, details: impl Into<String>) -> StencilError {
    StencilError::QueryParse {
        position: pos,
        details: details.into(),
    }
}

fn tokenize(text: &str) -> Result<Vec<Spanned<'_>>, StencilError> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            // Commas are insignificant, like whitespace
            b' ' | b'\t' | b'\n' | b'\r' | b',' => i += 1,
            b'#' => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'{' | b'}' | b'(' | b')' | b'[' | b']' | b':' | b'$' | b'!' | b'=' | b'@' => {
                tokens.push(Spanned {
                    token: Token::Punct(b as char),
                    pos: i,
                });
                i += 1;
            }
            b'.' => {
                if text[i..].starts_with("...") {
                    tokens.push(Spanned {
                        token: Token::Spread,
                        pos: i,
                    });
                    i += 3;
                } else {
                    return Err(error(i, "unexpected '.'"));
                }
            }
            b'"' => {
                let start = i;
                i += 1;
                loop {
                    match bytes.get(i) {
                        None | Some(b'\n') => return Err(error(start, "unterminated string")),
                        Some(b'\\') => i += 2,
                        Some(b'"') => {
                            i += 1;
                            break;
                        }
                        Some(_) => i += 1,
                    }
                }
                tokens.push(Spanned {
                    token: Token::Str,
                    pos: start,
                });
            }
            b'-' | b'0'..=b'9' => {
                let start = i;
                i += 1;
                while i < bytes.len()
                    && (bytes[i].is_ascii_digit() || matches!(bytes[i], b'.' | b'e' | b'E' | b'+' | b'-'))
                {
                    i += 1;
                }
                let literal = &text[start..i];
                if literal == "-" {
                    return Err(error(start, "expected digits after '-'"));
                }
                if i < bytes.len() && (bytes[i].is_ascii_alphabetic() || bytes[i] == b'_') {
                    return Err(error(start, format!("invalid name starting with '{}'", literal)));
                }
                tokens.push(Spanned {
                    token: Token::Number(literal),
                    pos: start,
                });
            }
            b if b.is_ascii_alphabetic() || b == b'_' => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                tokens.push(Spanned {
                    token: Token::Name(&text[start..i]),
                    pos: start,
                });
            }
            _ => {
                let ch = text[i..].chars().next().unwrap_or('?');
                return Err(error(i, format!("unexpected character '{}'", ch)));
            }
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Spanned<'a>>,
    cursor: usize,
    end: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.cursor).map(|t| &t.token)
    }

    fn pos(&self) -> usize {
        self.tokens.get(self.cursor).map(|t| t.pos).unwrap_or(self.end)
    }

    fn bump(&mut self) -> Option<Token<'a>> {
        let token = self.tokens.get(self.cursor).map(|t| t.token.clone());
        self.cursor += 1;
        token
    }

    fn expect_punct(&mut self, ch: char) -> Result<(), StencilError> {
        let pos = self.pos();
        match self.bump() {
            Some(Token::Punct(c)) if c == ch => Ok(()),
            Some(other) => Err(error(pos, format!("expected '{}', found {:?}", ch, other))),
            None => Err(error(pos, format!("expected '{}', found end of document", ch))),
        }
    }

    fn expect_name(&mut self) -> Result<&'a str, StencilError> {
        let pos = self.pos();
        match self.bump() {
            Some(Token::Name(name)) => Ok(name),
            Some(other) => Err(error(pos, format!("expected a name, found {:?}", other))),
            None => Err(error(pos, "expected a name, found end of document")),
        }
    }

    fn at_punct(&self, ch: char) -> bool {
        matches!(self.peek(), Some(Token::Punct(c)) if *c == ch)
    }

    fn document(&mut self) -> Result<usize, StencilError> {
        let mut operations = 0;
        while self.peek().is_some() {
            self.operation()?;
            operations += 1;
        }
        if operations == 0 {
            return Err(error(0, "document has no operations"));
        }
        Ok(operations)
    }

    fn operation(&mut self) -> Result<(), StencilError> {
        if self.at_punct('{') {
            return self.selection_set();
        }

        let pos = self.pos();
        match self.expect_name()? {
            "query" | "mutation" | "subscription" => {}
            other => return Err(error(pos, format!("unknown operation type '{}'", other))),
        }
        if matches!(self.peek(), Some(Token::Name(_))) {
            self.bump();
        }
        if self.at_punct('(') {
            self.variable_definitions()?;
        }
        self.selection_set()
    }

    fn variable_definitions(&mut self) -> Result<(), StencilError> {
        self.expect_punct('(')?;
        while !self.at_punct(')') {
            self.expect_punct('$')?;
            self.expect_name()?;
            self.expect_punct(':')?;
            self.type_ref()?;
            if self.at_punct('=') {
                self.bump();
                self.value()?;
            }
        }
        self.expect_punct(')')
    }

    fn type_ref(&mut self) -> Result<(), StencilError> {
        if self.at_punct('[') {
            self.bump();
            self.type_ref()?;
            self.expect_punct(']')?;
        } else {
            self.expect_name()?;
        }
        if self.at_punct('!') {
            self.bump();
        }
        Ok(())
    }

    fn selection_set(&mut self) -> Result<(), StencilError> {
        let open = self.pos();
        self.expect_punct('{')?;
        if self.at_punct('}') {
            return Err(error(open, "empty selection set"));
        }
        while !self.at_punct('}') {
            if self.peek().is_none() {
                return Err(error(self.end, "unclosed selection set"));
            }
            self.selection()?;
        }
        self.expect_punct('}')
    }

    fn selection(&mut self) -> Result<(), StencilError> {
        if matches!(self.peek(), Some(Token::Spread)) {
            self.bump();
            if matches!(self.peek(), Some(Token::Name("on"))) {
                self.bump();
                self.expect_name()?;
                return self.selection_set();
            }
            self.expect_name()?;
            return Ok(());
        }

        self.expect_name()?;
        if self.at_punct(':') {
            self.bump();
            self.expect_name()?;
        }
        if self.at_punct('(') {
            self.arguments()?;
        }
        if self.at_punct('{') {
            self.selection_set()?;
        }
        Ok(())
    }

    fn arguments(&mut self) -> Result<(), StencilError> {
        let open = self.pos();
        self.expect_punct('(')?;
        if self.at_punct(')') {
            return Err(error(open, "empty argument list"));
        }
        while !self.at_punct(')') {
            if self.peek().is_none() {
                return Err(error(self.end, "unclosed argument list"));
            }
            self.expect_name()?;
            self.expect_punct(':')?;
            self.value()?;
        }
        self.expect_punct(')')
    }

    fn value(&mut self) -> Result<(), StencilError> {
        let pos = self.pos();
        match self.bump() {
            Some(Token::Number(_)) | Some(Token::Str) | Some(Token::Name(_)) => Ok(()),
            Some(Token::Punct('$')) => self.expect_name().map(|_| ()),
            Some(Token::Punct('[')) => {
                while !self.at_punct(']') {
                    if self.peek().is_none() {
                        return Err(error(self.end, "unclosed list value"));
                    }
                    self.value()?;
                }
                self.expect_punct(']')
            }
            Some(Token::Punct('{')) => {
                while !self.at_punct('}') {
                    if self.peek().is_none() {
                        return Err(error(self.end, "unclosed object value"));
                    }
                    self.expect_name()?;
                    self.expect_punct(':')?;
                    self.value()?;
                }
                self.expect_punct('}')
            }
            Some(other) => Err(error(pos, format!("expected a value, found {:?}", other))),
            None => Err(error(pos, "expected a value, found end of document")),
        }
    }
}

/// Check that `text` is a syntactically valid query document
///
/// Returns the number of operations on success.
pub fn check(text: &str) -> Result<usize, StencilError> {
    let tokens = tokenize(text)?;
    let mut parser = Parser {
        tokens,
        cursor: 0,
        end: text.len(),
    };
    parser.document()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_generated_shape() {
        let text = r#"
            query StencilGeneratedQuery {
              widgets(limit: 2, offset: 2, order_by: {id: asc}) {
                id
                name
                category {
                  name
                }
              }
              widgets_aggregate {
                aggregate {
                  count
                }
              }
            }
        "#;
        assert_eq!(check(text).unwrap(), 1);
    }

    #[test]
    fn accepts_mutation_with_literals() {
        let text = r#"mutation M { update_widgets_by_pk(pk_columns: {id: 3}, _set: {price: 12.5, name: "A \"b\"", tags: [1, 2], note: null}) { id price } }"#;
        assert!(check(text).is_ok());
    }

    #[test]
    fn accepts_variables_and_aliases() {
        let text = "query Q($id: Int!, $ids: [Int!]) { w: widgets_by_pk(id: $id) { id } }";
        assert!(check(text).is_ok());
    }

    #[test]
    fn rejects_empty_selection() {
        let err = check("query Q { }").unwrap_err();
        assert!(matches!(err, StencilError::QueryParse { position: 8, .. }));
    }

    #[test]
    fn rejects_unbalanced_braces() {
        assert!(check("query Q { name").is_err());
        assert!(check("query Q { name } }").is_err());
    }

    #[test]
    fn rejects_numeric_field_names() {
        assert!(check("query Q { widgets { 0 } }").is_err());
        assert!(check("query Q { 2widgets }").is_err());
    }

    #[test]
    fn rejects_bad_characters() {
        assert!(check("query Q { in-stock }").is_err());
        assert!(check("query Q { a.b }").is_err());
    }

    #[test]
    fn rejects_empty_document() {
        assert!(check("   ").is_err());
    }
}
