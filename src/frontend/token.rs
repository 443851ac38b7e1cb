#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Integer(i64),
    Float(f64),
    String(std::string::String),
    Char(char),
    Bool(bool),
    None,

    // Keywords
    Let,
    Mut,
    Fn,
    Return,
    If,
    Else,
    While,
    Type,

    // Arithmetic
    Plus,
    Minus,
    Star,
    Slash,
    SlashSlash,
    Percent,
    StarStar,

    // Bitwise
    Amp,
    Pipe,
    Caret,
    Tilde,
    Shl,
    Shr,

    // Logic
    AmpAmp,
    PipePipe,
    Bang,

    // Comparison
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,

    // Assignment
    Assign,
    /// Compound assignment; carries the arithmetic token it applies (`+=` => `Plus`).
    CompoundAssign(Box<Token>),
    PlusPlus,
    MinusMinus,

    // Punctuation
    Arrow,
    Dot,
    Comma,
    Colon,
    Semicolon,
    Question,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,

    Ident(std::string::String),

    // Special
    Comment(std::string::String),
    Newline,
    Eof,
}

impl Token {
    /// Returns true if the token can stand on the left of `=` in a compound form.
    pub fn is_compoundable(&self) -> bool {
        matches!(
            self,
            Token::Plus
                | Token::Minus
                | Token::Star
                | Token::Slash
                | Token::SlashSlash
                | Token::Percent
                | Token::StarStar
                | Token::Amp
                | Token::Pipe
                | Token::Caret
                | Token::Shl
                | Token::Shr
        )
    }

    /// Returns the human readable form used in parser messages.
    pub fn describe(&self) -> std::string::String {
        match self {
            Token::Integer(n) => n.to_string(),
            Token::Float(n) => n.to_string(),
            Token::String(s) => format!("\"{}\"", s),
            Token::Char(c) => format!("'{}'", c),
            Token::Bool(b) => b.to_string(),
            Token::None => "none".to_string(),
            Token::Ident(name) => name.clone(),
            Token::Eof => "end of input".to_string(),
            Token::CompoundAssign(op) => format!("{}=", op.describe()),
            other => other.symbol().to_string(),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Token::Let => "let",
            Token::Mut => "mut",
            Token::Fn => "fn",
            Token::Return => "return",
            Token::If => "if",
            Token::Else => "else",
            Token::While => "while",
            Token::Type => "type",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::SlashSlash => "//",
            Token::Percent => "%",
            Token::StarStar => "**",
            Token::Amp => "&",
            Token::Pipe => "|",
            Token::Caret => "^",
            Token::Tilde => "~",
            Token::Shl => "<<",
            Token::Shr => ">>",
            Token::AmpAmp => "&&",
            Token::PipePipe => "||",
            Token::Bang => "!",
            Token::EqEq => "==",
            Token::NotEq => "!=",
            Token::Lt => "<",
            Token::LtEq => "<=",
            Token::Gt => ">",
            Token::GtEq => ">=",
            Token::Assign => "=",
            Token::PlusPlus => "++",
            Token::MinusMinus => "--",
            Token::Arrow => "->",
            Token::Dot => ".",
            Token::Comma => ",",
            Token::Colon => ":",
            Token::Semicolon => ";",
            Token::Question => "?",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::Comment(_) => "comment",
            Token::Newline => "newline",
            _ => "token",
        }
    }
}
