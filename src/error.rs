use super::ast::SourceLocation;
use failure::{Backtrace, Context, Fail};
use std::fmt::{self, Display};

#[derive(Debug)]
pub struct Error {
    inner: Context<ErrorKind>,
    loc: Option<SourceLocation>,
}

#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum ErrorKind {
    #[fail(display = "lex error: {}", _0)]
    Lex(String),
    #[fail(display = "{}", _0)]
    Syntax(String),
    #[fail(display = "{}", _0)]
    Codegen(String),
    #[fail(display = "runtime error: {}", _0)]
    Runtime(String),
    #[fail(display = "io error")]
    Io,
}

impl Fail for Error {
    fn cause(&self) -> Option<&dyn Fail> {
        self.inner.cause()
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        self.inner.backtrace()
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.loc {
            Some(loc) => write!(f, "{}: {}", loc, self.inner),
            None => Display::fmt(&self.inner, f),
        }
    }
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.inner.get_context()
    }

    /// Where in the source the error was found, when it is tied to a token
    /// or an expression.
    pub fn location(&self) -> Option<SourceLocation> {
        self.loc
    }

    /// Attaches `loc` unless a more precise location is already known.
    pub(crate) fn at(mut self, loc: SourceLocation) -> Error {
        if self.loc.is_none() {
            self.loc = Some(loc);
        }
        self
    }

    pub(crate) fn syntax<S: Into<String>>(msg: S) -> Error {
        Error::from(ErrorKind::Syntax(msg.into()))
    }

    pub(crate) fn codegen<S: Into<String>>(msg: S) -> Error {
        Error::from(ErrorKind::Codegen(msg.into()))
    }

    pub(crate) fn runtime<S: Into<String>>(msg: S) -> Error {
        Error::from(ErrorKind::Runtime(msg.into()))
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error {
            inner: Context::new(kind),
            loc: None,
        }
    }
}

impl From<Context<ErrorKind>> for Error {
    fn from(inner: Context<ErrorKind>) -> Error {
        Error { inner, loc: None }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error {
            inner: e.context(ErrorKind::Io),
            loc: None,
        }
    }
}
