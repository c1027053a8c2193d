use kestrel_core::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Ident,
    Int,
    String,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LAngle,
    RAngle,
    Comma,
    Dot,
    Colon,
    ColonColon,
    Semi,
    At,
    Question,
    Star,
    Plus,
    Minus,
    Slash,
    Percent,
    Bang,
    Eq,
    EqEq,
    NotEq,
    LessEq,
    GreaterEq,
    AndAnd,
    OrOr,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// A line break separates this token from the previous one.
    pub newline_before: bool,
}

pub(crate) fn lex(source: &str) -> Vec<Token> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;
    let mut newline_before = false;

    while pos < bytes.len() {
        let b = bytes[pos];
        if b == b'\n' {
            newline_before = true;
            pos += 1;
            continue;
        }
        if b.is_ascii_whitespace() {
            pos += 1;
            continue;
        }
        if source[pos..].starts_with("//") {
            while pos < bytes.len() && bytes[pos] != b'\n' {
                pos += 1;
            }
            continue;
        }
        if source[pos..].starts_with("/*") {
            let end = source[pos + 2..]
                .find("*/")
                .map(|rel| pos + 2 + rel + 2)
                .unwrap_or(bytes.len());
            if source[pos..end].contains('\n') {
                newline_before = true;
            }
            pos = end;
            continue;
        }

        let start = pos;
        let kind = if b == b'_' || b.is_ascii_alphabetic() || b >= 0x80 {
            while pos < bytes.len()
                && (bytes[pos] == b'_' || bytes[pos].is_ascii_alphanumeric() || bytes[pos] >= 0x80)
            {
                pos += 1;
            }
            TokenKind::Ident
        } else if b.is_ascii_digit() {
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
            TokenKind::Int
        } else if b == b'"' {
            pos += 1;
            while pos < bytes.len() && bytes[pos] != b'"' {
                if bytes[pos] == b'\\' {
                    pos += 1;
                }
                pos += 1;
            }
            pos = (pos + 1).min(bytes.len());
            TokenKind::String
        } else {
            let two = source.get(pos..pos + 2).unwrap_or("");
            let (kind, len) = match two {
                "::" => (TokenKind::ColonColon, 2),
                "==" => (TokenKind::EqEq, 2),
                "!=" => (TokenKind::NotEq, 2),
                "<=" => (TokenKind::LessEq, 2),
                ">=" => (TokenKind::GreaterEq, 2),
                "&&" => (TokenKind::AndAnd, 2),
                "||" => (TokenKind::OrOr, 2),
                "+=" => (TokenKind::PlusEq, 2),
                "-=" => (TokenKind::MinusEq, 2),
                "*=" => (TokenKind::StarEq, 2),
                "/=" => (TokenKind::SlashEq, 2),
                _ => {
                    let kind = match b {
                        b'(' => TokenKind::LParen,
                        b')' => TokenKind::RParen,
                        b'{' => TokenKind::LBrace,
                        b'}' => TokenKind::RBrace,
                        b'<' => TokenKind::LAngle,
                        b'>' => TokenKind::RAngle,
                        b',' => TokenKind::Comma,
                        b'.' => TokenKind::Dot,
                        b':' => TokenKind::Colon,
                        b';' => TokenKind::Semi,
                        b'@' => TokenKind::At,
                        b'?' => TokenKind::Question,
                        b'*' => TokenKind::Star,
                        b'+' => TokenKind::Plus,
                        b'-' => TokenKind::Minus,
                        b'/' => TokenKind::Slash,
                        b'%' => TokenKind::Percent,
                        b'!' => TokenKind::Bang,
                        b'=' => TokenKind::Eq,
                        other => panic!("unexpected character {:?} at {pos}", other as char),
                    };
                    (kind, 1)
                }
            };
            pos += len;
            kind
        };

        tokens.push(Token {
            kind,
            span: Span::new(start, pos),
            newline_before,
        });
        newline_before = false;
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        span: Span::empty(bytes.len()),
        newline_before: true,
    });
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexes_labels_and_operators() {
        let kinds: Vec<_> = lex("loop@ while (a <= 1) x += 2 // tail")
            .into_iter()
            .map(|t| t.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Ident,
                TokenKind::At,
                TokenKind::Ident,
                TokenKind::LParen,
                TokenKind::Ident,
                TokenKind::LessEq,
                TokenKind::Int,
                TokenKind::RParen,
                TokenKind::Ident,
                TokenKind::PlusEq,
                TokenKind::Int,
                TokenKind::Eof,
            ]
        );
    }
}
