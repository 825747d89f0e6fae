use super::SyntaxError;

/// Token classes of the SQL subset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier or keyword, upper-cased unless it was double-quoted.
    Ident(String),
    /// Double-quoted identifier, case preserved.
    QuotedIdent(String),
    /// Integer literal text.
    Integer(String),
    /// Decimal literal text (fraction or exponent present).
    Decimal(String),
    /// String literal contents with `''` escapes collapsed.
    Str(String),
    /// `,`
    Comma,
    /// `.`
    Dot,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `*`
    Star,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `/`
    Slash,
    /// `=`
    Eq,
    /// `<>` or `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `?`
    Question,
    /// `;`
    Semicolon,
    /// End of input.
    Eof,
}

/// Token with its byte offset in the statement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    /// Token class and payload.
    pub kind: TokenKind,
    /// Byte offset of the first character.
    pub pos: usize,
}

impl Token {
    /// True when the token is the given keyword.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(&self.kind, TokenKind::Ident(word) if word == keyword)
    }
}

/// Splits statement text into tokens, ending with [`TokenKind::Eof`].
pub fn tokenize(sql: &str) -> Result<Vec<Token>, SyntaxError> {
    let bytes = sql.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        let start = i;
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        if c == b'-' && bytes.get(i + 1) == Some(&b'-') {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }
        let kind = match c {
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                TokenKind::Ident(sql[start..i].to_ascii_uppercase())
            }
            b'0'..=b'9' => {
                let mut decimal = false;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                if i < bytes.len() && bytes[i] == b'.' {
                    decimal = true;
                    i += 1;
                    while i < bytes.len() && bytes[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
                    decimal = true;
                    i += 1;
                    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
                        i += 1;
                    }
                    let digits = i;
                    while i < bytes.len() && bytes[i].is_ascii_digit() {
                        i += 1;
                    }
                    if digits == i {
                        return Err(SyntaxError::new("malformed exponent", start));
                    }
                }
                let text = sql[start..i].to_owned();
                if decimal {
                    TokenKind::Decimal(text)
                } else {
                    TokenKind::Integer(text)
                }
            }
            b'\'' => {
                i += 1;
                let mut text = String::new();
                loop {
                    match sql[i..].find('\'') {
                        None => return Err(SyntaxError::new("unterminated string literal", start)),
                        Some(offset) => {
                            text.push_str(&sql[i..i + offset]);
                            i += offset + 1;
                            if bytes.get(i) == Some(&b'\'') {
                                text.push('\'');
                                i += 1;
                            } else {
                                break;
                            }
                        }
                    }
                }
                TokenKind::Str(text)
            }
            b'"' => {
                i += 1;
                match sql[i..].find('"') {
                    None => return Err(SyntaxError::new("unterminated quoted identifier", start)),
                    Some(offset) => {
                        let text = sql[i..i + offset].to_owned();
                        i += offset + 1;
                        if text.is_empty() {
                            return Err(SyntaxError::new("empty quoted identifier", start));
                        }
                        TokenKind::QuotedIdent(text)
                    }
                }
            }
            _ => {
                let (kind, len) = match (c, bytes.get(i + 1).copied()) {
                    (b'<', Some(b'>')) | (b'!', Some(b'=')) => (TokenKind::NotEq, 2),
                    (b'<', Some(b'=')) => (TokenKind::LtEq, 2),
                    (b'>', Some(b'=')) => (TokenKind::GtEq, 2),
                    (b'<', _) => (TokenKind::Lt, 1),
                    (b'>', _) => (TokenKind::Gt, 1),
                    (b'=', _) => (TokenKind::Eq, 1),
                    (b',', _) => (TokenKind::Comma, 1),
                    (b'.', _) => (TokenKind::Dot, 1),
                    (b'(', _) => (TokenKind::LParen, 1),
                    (b')', _) => (TokenKind::RParen, 1),
                    (b'*', _) => (TokenKind::Star, 1),
                    (b'+', _) => (TokenKind::Plus, 1),
                    (b'-', _) => (TokenKind::Minus, 1),
                    (b'/', _) => (TokenKind::Slash, 1),
                    (b'?', _) => (TokenKind::Question, 1),
                    (b';', _) => (TokenKind::Semicolon, 1),
                    _ => {
                        let ch = sql[start..].chars().next().unwrap_or('?');
                        return Err(SyntaxError::new(format!("unexpected character '{ch}'"), start));
                    }
                };
                i += len;
                kind
            }
        };
        tokens.push(Token { kind, pos: start });
    }
    tokens.push(Token {
        kind: TokenKind::Eof,
        pos: sql.len(),
    });
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(sql: &str) -> Vec<TokenKind> {
        tokenize(sql)
            .expect("tokenize")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn keywords_are_upper_cased_and_numbers_classified() {
        assert_eq!(
            kinds("select a1, 2.5e3 from t -- trailing"),
            vec![
                TokenKind::Ident("SELECT".into()),
                TokenKind::Ident("A1".into()),
                TokenKind::Comma,
                TokenKind::Decimal("2.5e3".into()),
                TokenKind::Ident("FROM".into()),
                TokenKind::Ident("T".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn string_escapes_collapse() {
        assert_eq!(
            kinds("'it''s' <> ?"),
            vec![
                TokenKind::Str("it's".into()),
                TokenKind::NotEq,
                TokenKind::Question,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unterminated_string_reports_its_start() {
        let err = tokenize("select 'abc").expect_err("must fail");
        assert_eq!(err.position, 7);
    }
}
