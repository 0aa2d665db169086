use super::ast::SourceLocation;
use super::error::{Error, ErrorKind};
use super::token::Token;
use combine::error::ParseError;
use combine::parser::char::{alpha_num, digit, letter, space};
use combine::parser::choice::or;
use combine::parser::token::position;
use combine::stream::position::{self as pos, SourcePosition};
use combine::stream::Stream;
use combine::{any, choice, eof, many, many1, satisfy, skip_many, token, Parser};

/// Pulls tokens one at a time out of a buffer owned by the driver.
pub struct Lexer<'a> {
    input: pos::Stream<&'a str, SourcePosition>,
    loc: SourceLocation,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Lexer {
            input: pos::Stream::new(src),
            loc: SourceLocation::default(),
        }
    }

    /// Returns `Token::Eof` forever once the buffer is exhausted.
    pub fn next_token(&mut self) -> Result<Token, Error> {
        match lex().parse(self.input.clone()) {
            Ok(((p, tok), rest)) => {
                self.input = rest;
                self.loc = SourceLocation::new(p.line as u32, p.column as u32);
                Ok(tok)
            }
            Err(e) => {
                let p = self.input.positioner;
                let loc = SourceLocation::new(p.line as u32, p.column as u32);
                Err(Error::from(ErrorKind::Lex(e.to_string())).at(loc))
            }
        }
    }

    /// Start of the token most recently returned by `next_token`.
    pub fn location(&self) -> SourceLocation {
        self.loc
    }
}

/// `strtod`-like: takes the longest prefix that reads as a float, so
/// `1.2.3` becomes `1.2` and a lone `.` becomes `0`.
fn decode_number(s: &str) -> f64 {
    (1..=s.len())
        .rev()
        .find_map(|end| s[..end].parse::<f64>().ok())
        .unwrap_or(0.0)
}

fn number<Input>() -> impl Parser<Input, Output = Token>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    many1(or(digit(), token('.'))).map(|ns: String| Token::Number(decode_number(&ns)))
}

fn ident<Input>() -> impl Parser<Input, Output = Token>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    (letter(), many(alpha_num())).map(|(first, rest): (char, String)| {
        let mut id = first.to_string();
        id.push_str(&rest);
        Token::keyword(&id).unwrap_or(Token::Ident(id))
    })
}

fn comment<Input>() -> impl Parser<Input, Output = ()>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    (
        token('#'),
        skip_many(satisfy(|c: char| c != '\n' && c != '\r')),
    )
        .map(|_| ())
}

pub(crate) fn lex<Input>() -> impl Parser<Input, Output = (Input::Position, Token)>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    skip_many(or(space().map(|_| ()), comment())).with((
        position(),
        choice((
            number(),
            ident(),
            eof().map(|_| Token::Eof),
            any().map(Token::Kwd),
        )),
    ))
}

#[cfg(test)]
mod test {
    use super::super::token::Token::*;
    use super::*;
    use combine::EasyParser;

    fn lex_all(s: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(s);
        let mut tokens = Vec::new();
        loop {
            match lexer.next_token().unwrap() {
                Eof => break,
                t => tokens.push(t),
            }
        }
        tokens
    }

    #[test]
    fn test_number() {
        assert_eq!(number().easy_parse("1.0").map(|x| x.0), Ok(Number(1.0)));
        assert_eq!(number().easy_parse(".5").map(|x| x.0), Ok(Number(0.5)));
        assert_eq!(number().easy_parse("1.2.3").map(|x| x.0), Ok(Number(1.2)));
        assert_eq!(number().easy_parse(".").map(|x| x.0), Ok(Number(0.0)));
    }

    #[test]
    fn test_ident() {
        assert_eq!(
            ident().easy_parse("test").map(|x| x.0),
            Ok(Ident("test".to_owned()))
        );
        assert_eq!(
            ident().easy_parse("x1y").map(|x| x.0),
            Ok(Ident("x1y".to_owned()))
        );

        assert_eq!(ident().easy_parse("def").map(|x| x.0), Ok(Def));
        assert_eq!(ident().easy_parse("binary").map(|x| x.0), Ok(Binary));
        assert_eq!(ident().easy_parse("while").map(|x| x.0), Ok(While));
    }

    #[test]
    fn test_comment() {
        assert_eq!(comment().easy_parse("#hoge").map(|x| x.0), Ok(()));
    }

    #[test]
    fn test_lex() {
        assert_eq!(
            lex()
                .easy_parse(
                    r#"#comment
1.0
"#
                )
                .map(|x| (x.0).1),
            Ok(Number(1.0))
        );
    }

    #[test]
    fn test_token_stream() {
        assert_eq!(
            lex_all("def foo(x y) x+y*2 # trailing\nextern sin(a);"),
            vec![
                Def,
                Ident("foo".to_owned()),
                Kwd('('),
                Ident("x".to_owned()),
                Ident("y".to_owned()),
                Kwd(')'),
                Ident("x".to_owned()),
                Kwd('+'),
                Ident("y".to_owned()),
                Kwd('*'),
                Number(2.0),
                Extern,
                Ident("sin".to_owned()),
                Kwd('('),
                Ident("a".to_owned()),
                Kwd(')'),
                Kwd(';'),
            ]
        );
    }

    #[test]
    fn test_eof_is_sticky() {
        let mut lexer = Lexer::new("  # only a comment");
        assert_eq!(lexer.next_token().unwrap(), Eof);
        assert_eq!(lexer.next_token().unwrap(), Eof);
        assert_eq!(lexer.next_token().unwrap(), Eof);
    }

    #[test]
    fn test_location() {
        let mut lexer = Lexer::new("a\n  bc");
        lexer.next_token().unwrap();
        assert_eq!(lexer.location(), SourceLocation::new(1, 1));
        assert_eq!(lexer.next_token().unwrap(), Ident("bc".to_owned()));
        assert_eq!(lexer.location(), SourceLocation::new(2, 3));
    }
}
