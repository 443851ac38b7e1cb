use crate::frontend::lexer::Spanned;
use crate::frontend::token::Token;
use std::fmt::Write;

/// Renders a token stream one token per line, for `--tokens`.
pub struct TokenDumper {
    pub color: bool,
    pub show_debug_repr: bool, // if false, prints a nicer value for some tokens
}

impl Default for TokenDumper {
    fn default() -> Self {
        Self {
            color: true,
            show_debug_repr: true,
        }
    }
}

impl TokenDumper {
    // ANSI colors
    const RESET: &'static str = "\x1b[0m";
    const DIM: &'static str = "\x1b[2m";
    const GRN: &'static str = "\x1b[32m";
    const YEL: &'static str = "\x1b[33m";
    const CYN: &'static str = "\x1b[36m";
    const MAG: &'static str = "\x1b[35m";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_color(mut self) -> Self {
        self.color = false;
        self
    }

    pub fn pretty(mut self) -> Self {
        self.show_debug_repr = false;
        self
    }

    pub fn dump(&self, tokens: &[Spanned]) -> String {
        let mut out = String::new();
        for s in tokens {
            self.write_one(&mut out, s);
        }
        out
    }

    fn write_one(&self, out: &mut String, s: &Spanned) {
        let kind = kind(&s.token);
        let colr = if self.color { color(&s.token) } else { "" };
        let reset = if self.color { Self::RESET } else { "" };

        let text = match &s.token {
            _ if self.show_debug_repr => format!("{:?}", s.token),
            Token::Comment(c) => format!("# {}", c.trim()),
            Token::String(v) => format!("{:?}", v),
            Token::Char(v) => format!("{:?}", v),
            Token::Integer(v) => v.to_string(),
            Token::Float(v) => v.to_string(),
            Token::Bool(v) => v.to_string(),
            Token::Ident(v) => v.clone(),
            Token::CompoundAssign(op) => format!("{:?}=", op),
            other => format!("{:?}", other),
        };
        let _ = writeln!(
            out,
            "[{:02}:{:02}] {}{:<8} {}{}",
            s.span.line, s.span.col, colr, kind, text, reset
        );
    }
}

fn kind(t: &Token) -> &'static str {
    use Token::*;
    match t {
        Newline => "NEWLINE",
        Comment(_) => "COMMENT",
        Eof => "EOF",

        Integer(_) => "INT",
        Float(_) => "FLOAT",
        String(_) => "STRING",
        Char(_) => "CHAR",
        Bool(_) | None => "CONST",

        Ident(_) => "IDENT",

        Let | Mut | Fn | Return | If | Else | While | Type => "KEYWORD",

        Assign | CompoundAssign(_) => "ASSIGN",
        EqEq | NotEq | Lt | LtEq | Gt | GtEq => "CMP",
        Plus | Minus | Star | Slash | SlashSlash | Percent | StarStar | Amp | Pipe | Caret
        | Tilde | Shl | Shr | AmpAmp | PipePipe | Bang | PlusPlus | MinusMinus => "OP",

        _ => "PUNCT",
    }
}

fn color(t: &Token) -> &'static str {
    match kind(t) {
        "NEWLINE" | "COMMENT" | "EOF" => TokenDumper::DIM,
        "STRING" | "CHAR" => TokenDumper::GRN,
        "INT" | "FLOAT" | "CONST" => TokenDumper::CYN,
        "IDENT" => TokenDumper::YEL,
        "OP" | "CMP" | "ASSIGN" => TokenDumper::MAG,
        _ => TokenDumper::RESET,
    }
}
