use serde::Serialize;
use thiserror::Error;

use super::token::Token;

/// 1-based source position of a token or node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub line: usize,
    pub col: usize,
}

impl Default for Span {
    fn default() -> Self {
        Span { line: 1, col: 1 }
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

#[derive(Debug, Clone)]
pub struct Spanned {
    pub token: Token,
    pub span: Span,
}

#[derive(Debug, Clone, Error)]
#[error("{line}:{col}: {message}")]
pub struct LexerError {
    pub message: String,
    pub line: usize,
    pub col: usize,
}

pub struct Lexer {
    source: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn current(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos + 1).copied()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.source.get(self.pos + n).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current();
        if ch == Some('\n') {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        self.pos += 1;
        ch
    }

    fn span(&self) -> Span {
        Span {
            line: self.line,
            col: self.col,
        }
    }

    fn error(&self, message: impl Into<String>, line: usize, col: usize) -> LexerError {
        LexerError {
            message: message.into(),
            line,
            col,
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current() {
            if ch == ' ' || ch == '\t' || ch == '\r' {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_comment(&mut self) -> Token {
        self.advance();
        let mut comment = String::new();
        while let Some(ch) = self.current() {
            if ch == '\n' {
                break;
            }
            comment.push(ch);
            self.advance();
        }
        Token::Comment(comment.trim().to_string())
    }

    fn read_escape(&mut self) -> Result<char, LexerError> {
        self.advance(); // consume '\'
        let escaped = match self.current() {
            Some('n') => '\n',
            Some('t') => '\t',
            Some('r') => '\r',
            Some('\\') => '\\',
            Some('"') => '"',
            Some('\'') => '\'',
            Some('0') => '\0',
            Some(ch) => {
                return Err(self.error(
                    format!("unknown escape sequence: \\{}", ch),
                    self.line,
                    self.col,
                ));
            }
            None => {
                return Err(self.error("unexpected EOF in escape sequence", self.line, self.col));
            }
        };
        self.advance();
        Ok(escaped)
    }

    fn read_string(&mut self) -> Result<Token, LexerError> {
        let start_line = self.line;
        let start_col = self.col;
        self.advance();

        let mut string = String::new();
        loop {
            match self.current() {
                Some('"') => {
                    self.advance();
                    return Ok(Token::String(string));
                }
                Some('\\') => string.push(self.read_escape()?),
                Some('\n') => {
                    return Err(self.error(
                        "unterminated string (newline before closing quote)",
                        start_line,
                        start_col,
                    ));
                }
                Some(ch) => {
                    string.push(ch);
                    self.advance();
                }
                None => {
                    return Err(self.error("unterminated string literal", start_line, start_col));
                }
            }
        }
    }

    fn read_char(&mut self) -> Result<Token, LexerError> {
        let start_line = self.line;
        let start_col = self.col;
        self.advance(); // opening quote

        let ch = match self.current() {
            Some('\\') => self.read_escape()?,
            Some('\'') | Some('\n') | None => {
                return Err(self.error("empty character literal", start_line, start_col));
            }
            Some(ch) => {
                self.advance();
                ch
            }
        };

        if self.current() != Some('\'') {
            return Err(self.error(
                "character literal must contain exactly one character",
                start_line,
                start_col,
            ));
        }
        self.advance();
        Ok(Token::Char(ch))
    }

    fn read_number(&mut self) -> Result<Token, LexerError> {
        let start_line = self.line;
        let start_col = self.col;

        // Hex: 0x... or 0X...
        if self.current() == Some('0') && matches!(self.peek(), Some('x') | Some('X')) {
            self.advance(); // '0'
            self.advance(); // 'x' or 'X'

            let mut hex = String::new();
            while let Some(ch) = self.current() {
                if ch.is_ascii_hexdigit() {
                    hex.push(ch);
                    self.advance();
                } else {
                    break;
                }
            }

            if hex.is_empty() {
                return Err(self.error("expected hex digits after 0x", start_line, start_col));
            }

            let value = i64::from_str_radix(&hex, 16).map_err(|_| {
                self.error(format!("invalid hex number: 0x{}", hex), start_line, start_col)
            })?;

            return Ok(Token::Integer(value));
        }

        let mut digits = String::new();
        let mut has_dot = false;

        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() {
                digits.push(ch);
                self.advance();
            } else if ch == '_' {
                self.advance();
            } else if ch == '.' && !has_dot {
                // Only treat '.' as a decimal point if followed by a digit
                if self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                    has_dot = true;
                    digits.push('.');
                    self.advance();
                } else {
                    break;
                }
            } else {
                break;
            }
        }

        if has_dot {
            let value: f64 = digits.parse().map_err(|_| {
                self.error(format!("invalid float: {}", digits), start_line, start_col)
            })?;
            Ok(Token::Float(value))
        } else {
            let value: i64 = digits.parse().map_err(|_| {
                self.error(format!("invalid integer: {}", digits), start_line, start_col)
            })?;
            Ok(Token::Integer(value))
        }
    }

    fn read_identifier(&mut self) -> Token {
        let mut ident = String::new();
        while let Some(ch) = self.current() {
            if ch.is_alphanumeric() || ch == '_' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        match ident.as_str() {
            "true" => Token::Bool(true),
            "false" => Token::Bool(false),
            "none" => Token::None,
            "let" => Token::Let,
            "mut" => Token::Mut,
            "fn" => Token::Fn,
            "return" => Token::Return,
            "if" => Token::If,
            "else" => Token::Else,
            "while" => Token::While,
            "type" => Token::Type,
            _ => Token::Ident(ident),
        }
    }

    /// Longest-match operator scan. Three-character forms first, then two, then one.
    fn read_operator(&mut self) -> Option<Token> {
        let ch = self.current()?;
        let next = self.peek();
        let third = self.peek_at(2);

        let (token, width) = match (ch, next, third) {
            ('/', Some('/'), Some('=')) => (compound(Token::SlashSlash), 3),
            ('*', Some('*'), Some('=')) => (compound(Token::StarStar), 3),
            ('<', Some('<'), Some('=')) => (compound(Token::Shl), 3),
            ('>', Some('>'), Some('=')) => (compound(Token::Shr), 3),

            ('/', Some('/'), _) => (Token::SlashSlash, 2),
            ('*', Some('*'), _) => (Token::StarStar, 2),
            ('<', Some('<'), _) => (Token::Shl, 2),
            ('>', Some('>'), _) => (Token::Shr, 2),
            ('&', Some('&'), _) => (Token::AmpAmp, 2),
            ('|', Some('|'), _) => (Token::PipePipe, 2),
            ('=', Some('='), _) => (Token::EqEq, 2),
            ('!', Some('='), _) => (Token::NotEq, 2),
            ('<', Some('='), _) => (Token::LtEq, 2),
            ('>', Some('='), _) => (Token::GtEq, 2),
            ('+', Some('+'), _) => (Token::PlusPlus, 2),
            ('-', Some('-'), _) => (Token::MinusMinus, 2),
            ('-', Some('>'), _) => (Token::Arrow, 2),
            ('+', Some('='), _) => (compound(Token::Plus), 2),
            ('-', Some('='), _) => (compound(Token::Minus), 2),
            ('*', Some('='), _) => (compound(Token::Star), 2),
            ('/', Some('='), _) => (compound(Token::Slash), 2),
            ('%', Some('='), _) => (compound(Token::Percent), 2),
            ('&', Some('='), _) => (compound(Token::Amp), 2),
            ('|', Some('='), _) => (compound(Token::Pipe), 2),
            ('^', Some('='), _) => (compound(Token::Caret), 2),

            ('+', _, _) => (Token::Plus, 1),
            ('-', _, _) => (Token::Minus, 1),
            ('*', _, _) => (Token::Star, 1),
            ('/', _, _) => (Token::Slash, 1),
            ('%', _, _) => (Token::Percent, 1),
            ('&', _, _) => (Token::Amp, 1),
            ('|', _, _) => (Token::Pipe, 1),
            ('^', _, _) => (Token::Caret, 1),
            ('~', _, _) => (Token::Tilde, 1),
            ('!', _, _) => (Token::Bang, 1),
            ('=', _, _) => (Token::Assign, 1),
            ('<', _, _) => (Token::Lt, 1),
            ('>', _, _) => (Token::Gt, 1),
            ('.', _, _) => (Token::Dot, 1),
            (',', _, _) => (Token::Comma, 1),
            (':', _, _) => (Token::Colon, 1),
            (';', _, _) => (Token::Semicolon, 1),
            ('?', _, _) => (Token::Question, 1),
            ('(', _, _) => (Token::LParen, 1),
            (')', _, _) => (Token::RParen, 1),
            ('{', _, _) => (Token::LBrace, 1),
            ('}', _, _) => (Token::RBrace, 1),
            ('[', _, _) => (Token::LBracket, 1),
            (']', _, _) => (Token::RBracket, 1),
            _ => return None,
        };

        for _ in 0..width {
            self.advance();
        }
        Some(token)
    }

    pub fn tokenize(&mut self) -> Result<Vec<Spanned>, LexerError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();
            let span = self.span();

            match self.current() {
                None => {
                    tokens.push(Spanned {
                        token: Token::Eof,
                        span,
                    });
                    break;
                }
                Some('\n') => {
                    tokens.push(Spanned {
                        token: Token::Newline,
                        span,
                    });
                    self.advance();
                }
                Some('#') => {
                    let token = self.read_comment();
                    tokens.push(Spanned { token, span });
                }
                Some('"') => {
                    let token = self.read_string()?;
                    tokens.push(Spanned { token, span });
                }
                Some('\'') => {
                    let token = self.read_char()?;
                    tokens.push(Spanned { token, span });
                }
                Some(ch) if ch.is_ascii_digit() => {
                    let token = self.read_number()?;
                    tokens.push(Spanned { token, span });
                }
                Some(ch) if ch.is_alphabetic() || ch == '_' => {
                    let token = self.read_identifier();
                    tokens.push(Spanned { token, span });
                }
                Some(ch) => match self.read_operator() {
                    Some(token) => tokens.push(Spanned { token, span }),
                    None => {
                        return Err(self.error(
                            format!("unexpected character: '{}'", ch),
                            span.line,
                            span.col,
                        ));
                    }
                },
            }
        }

        Ok(tokens)
    }
}

fn compound(op: Token) -> Token {
    Token::CompoundAssign(Box::new(op))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(source);
        lexer
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .filter(|t| !matches!(t, Token::Eof | Token::Newline | Token::Comment(_)))
            .collect()
    }

    #[test]
    fn test_let_statement() {
        assert_eq!(
            tokens("let mut x: int = 42;"),
            vec![
                Token::Let,
                Token::Mut,
                Token::Ident("x".into()),
                Token::Colon,
                Token::Ident("int".into()),
                Token::Assign,
                Token::Integer(42),
                Token::Semicolon,
            ]
        );
    }

    #[test]
    fn test_integer_division_is_not_a_comment() {
        assert_eq!(
            tokens("9 // 2 # trailing"),
            vec![Token::Integer(9), Token::SlashSlash, Token::Integer(2)]
        );
    }

    #[test]
    fn test_compound_operators() {
        assert_eq!(
            tokens("a += 1; b //= 2; c <<= 3"),
            vec![
                Token::Ident("a".into()),
                Token::CompoundAssign(Box::new(Token::Plus)),
                Token::Integer(1),
                Token::Semicolon,
                Token::Ident("b".into()),
                Token::CompoundAssign(Box::new(Token::SlashSlash)),
                Token::Integer(2),
                Token::Semicolon,
                Token::Ident("c".into()),
                Token::CompoundAssign(Box::new(Token::Shl)),
                Token::Integer(3),
            ]
        );
    }

    #[test]
    fn test_floats_and_hex() {
        assert_eq!(
            tokens("1.5 0x1F 3.method"),
            vec![
                Token::Float(1.5),
                Token::Integer(31),
                Token::Integer(3),
                Token::Dot,
                Token::Ident("method".into()),
            ]
        );
    }

    #[test]
    fn test_string_and_char_escapes() {
        assert_eq!(
            tokens(r#""a\tb" '\n' 'z'"#),
            vec![
                Token::String("a\tb".into()),
                Token::Char('\n'),
                Token::Char('z'),
            ]
        );
    }

    #[test]
    fn test_unterminated_string() {
        let err = Lexer::new("\"abc").tokenize().unwrap_err();
        assert!(err.message.contains("unterminated"));
        assert_eq!((err.line, err.col), (1, 1));
    }

    #[test]
    fn test_bad_char_literal() {
        let err = Lexer::new("'ab'").tokenize().unwrap_err();
        assert!(err.message.contains("exactly one character"));
    }

    #[test]
    fn test_spans_track_lines() {
        let spanned = Lexer::new("let\n  x").tokenize().unwrap();
        let x = spanned
            .iter()
            .find(|s| s.token == Token::Ident("x".into()))
            .unwrap();
        assert_eq!(x.span, Span { line: 2, col: 3 });
    }
}
