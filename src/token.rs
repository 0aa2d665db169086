#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Def,
    Extern,
    If,
    Then,
    Else,
    For,
    In,
    Binary,
    Unary,
    Var,
    While,
    Ident(String),
    Number(f64),
    Kwd(char),
    Eof,
}

impl Token {
    pub(crate) fn keyword(s: &str) -> Option<Token> {
        use self::Token::*;

        Some(match s {
            "def" => Def,
            "extern" => Extern,
            "if" => If,
            "then" => Then,
            "else" => Else,
            "for" => For,
            "in" => In,
            "binary" => Binary,
            "unary" => Unary,
            "var" => Var,
            "while" => While,
            _ => return None,
        })
    }
}
