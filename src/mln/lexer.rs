//! Lexer for program, evidence and query lines.
//!
//! Input is line oriented: every statement sits on one line, so the lexer
//! works on a single line at a time and tracks byte spans for error messages.
//! `//` starts a comment that runs to the end of the line.

/// Byte-level source span within a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Identifier: predicate, type, variable or unquoted constant.
    Ident(String),
    /// Double-quoted constant.
    Quoted(String),
    Number(f64),
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Bang,
    Star,
    Dot,
    Equals,
    Implies,
    /// `v` between literals is also a disjunction; the parser decides that.
    Or,
    And,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// Tokenize one line. Returns the offending column and a message on failure.
pub fn tokenize(line: &str) -> Result<Vec<Token>, (usize, String)> {
    let bytes = line.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        let start = i;

        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '/' && bytes.get(i + 1) == Some(&b'/') {
            break;
        }

        let single = match c {
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            '{' => Some(TokenKind::LBrace),
            '}' => Some(TokenKind::RBrace),
            ',' => Some(TokenKind::Comma),
            '!' => Some(TokenKind::Bang),
            '*' => Some(TokenKind::Star),
            '|' => Some(TokenKind::Or),
            '^' | '&' => Some(TokenKind::And),
            _ => None,
        };
        if let Some(kind) = single {
            i += 1;
            tokens.push(Token {
                kind,
                span: Span { start, end: i },
            });
            continue;
        }

        if c == '=' {
            if bytes.get(i + 1) == Some(&b'>') {
                i += 2;
                tokens.push(Token {
                    kind: TokenKind::Implies,
                    span: Span { start, end: i },
                });
            } else {
                i += 1;
                tokens.push(Token {
                    kind: TokenKind::Equals,
                    span: Span { start, end: i },
                });
            }
            continue;
        }

        if c == '"' {
            i += 1;
            let body_start = i;
            while i < bytes.len() && bytes[i] != b'"' {
                i += 1;
            }
            if i >= bytes.len() {
                return Err((start, "unterminated string".into()));
            }
            let text = line[body_start..i].to_string();
            i += 1;
            tokens.push(Token {
                kind: TokenKind::Quoted(text),
                span: Span { start, end: i },
            });
            continue;
        }

        let starts_number = c.is_ascii_digit()
            || ((c == '-' || c == '+' || c == '.')
                && bytes.get(i + 1).is_some_and(|b| b.is_ascii_digit()));
        // A number directly followed by letters is an identifier-like constant (e.g. `3rdFloor`).
        if starts_number {
            let mut j = i + 1;
            while j < bytes.len() {
                let b = bytes[j];
                let exponent_sign = (b == b'-' || b == b'+') && matches!(bytes[j - 1], b'e' | b'E');
                if b.is_ascii_digit() || b == b'.' || b == b'e' || b == b'E' || exponent_sign {
                    j += 1;
                } else {
                    break;
                }
            }
            // Trailing '.' ends a hard rule, it is not part of the number.
            let mut end = j;
            if end > i + 1 && bytes[end - 1] == b'.' {
                end -= 1;
            }
            let followed_by_ident = bytes
                .get(end)
                .is_some_and(|b| b.is_ascii_alphabetic() || *b == b'_');
            if !followed_by_ident {
                if let Ok(value) = line[i..end].parse::<f64>() {
                    i = end;
                    tokens.push(Token {
                        kind: TokenKind::Number(value),
                        span: Span { start, end },
                    });
                    continue;
                }
            }
        }

        if c.is_alphanumeric() || c == '_' {
            let mut j = i;
            while j < bytes.len() {
                let b = bytes[j] as char;
                if b.is_alphanumeric() || b == '_' || b == '-' && j > i && next_is_word(bytes, j) {
                    j += 1;
                } else {
                    break;
                }
            }
            let text = &line[i..j];
            i = j;
            tokens.push(Token {
                kind: TokenKind::Ident(text.to_string()),
                span: Span { start, end: i },
            });
            continue;
        }

        if c == '.' {
            i += 1;
            tokens.push(Token {
                kind: TokenKind::Dot,
                span: Span { start, end: i },
            });
            continue;
        }

        return Err((start, format!("unexpected character '{c}'")));
    }

    Ok(tokens)
}

/// Allow dashes inside identifiers (`is-a`) only when a word character follows.
fn next_is_word(bytes: &[u8], dash: usize) -> bool {
    bytes
        .get(dash + 1)
        .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_')
        && bytes.get(dash + 1) != Some(&b'>')
}
