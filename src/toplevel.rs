use super::ast::FunctionDecl;
use super::codegen::Session;
use super::error::Error;
use super::parser::{Parser, ANON_EXPR};
use super::runtime::HostFunctions;
use super::token::Token;
use colored::Colorize;
use std::io::{stdin, stdout, BufRead, Write};

#[derive(Debug, Clone, Copy)]
pub struct Options {
    /// Include the IR of every lowered function in the outcome.
    pub print_ir: bool,
    /// Run top-level expressions after lowering them.
    pub evaluate: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            print_ir: true,
            evaluate: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Definition { name: String, ir: Option<String> },
    Extern { name: String, ir: Option<String> },
    /// `value` is `None` when evaluation is turned off.
    TopLevel { value: Option<f64>, ir: Option<String> },
}

/// Feeds top-level declarations through parsing, lowering and, for bare
/// expressions, evaluation. State carries over between calls.
pub struct Driver {
    session: Session,
    options: Options,
}

impl Driver {
    pub fn new(options: Options) -> Result<Self, Error> {
        Self::with_host_functions(options, HostFunctions::with_runtime())
    }

    pub fn with_host_functions(options: Options, hosts: HostFunctions) -> Result<Self, Error> {
        Ok(Driver {
            session: Session::with_host_functions("my cool jit", hosts)?,
            options,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Handles every declaration in `src`. A declaration that fails to parse
    /// is reported and its offending token skipped, then processing resumes.
    pub fn run_source(&mut self, src: &str) -> Vec<Result<Outcome, Error>> {
        let mut results = Vec::new();

        let mut parser = match Parser::new(src) {
            Ok(p) => p,
            Err(e) => {
                results.push(Err(e));
                return results;
            }
        };

        loop {
            let parsed = match parser.current() {
                Token::Eof => break,
                Token::Kwd(';') => {
                    if let Err(e) = parser.skip_token() {
                        results.push(Err(e));
                        break;
                    }
                    continue;
                }
                Token::Def => parser.parse_definition(self.session.operators()),
                Token::Extern => parser.parse_extern(),
                _ => parser.parse_top_level_expr(self.session.operators()),
            };

            match parsed {
                Ok(decl) => results.push(self.handle(&decl)),
                Err(e) => {
                    results.push(Err(e));
                    if let Err(e) = parser.skip_token() {
                        results.push(Err(e));
                        break;
                    }
                }
            }
        }

        results
    }

    fn handle(&mut self, decl: &FunctionDecl) -> Result<Outcome, Error> {
        let print_ir = self.options.print_ir;
        let f = self.session.lower(decl)?;
        let name = f.name().to_owned();
        let ir = if print_ir { Some(f.to_string()) } else { None };

        if decl.body.is_none() {
            return Ok(Outcome::Extern { name, ir });
        }
        if name != ANON_EXPR {
            return Ok(Outcome::Definition { name, ir });
        }

        let value = if self.options.evaluate {
            self.session.run(ANON_EXPR).map(Some)
        } else {
            Ok(None)
        };
        self.session.remove_function(ANON_EXPR);
        Ok(Outcome::TopLevel { value: value?, ir })
    }
}

pub fn report(results: &[Result<Outcome, Error>]) {
    for r in results {
        match r {
            Ok(Outcome::Definition { ir, .. }) => {
                println!("Read function definition:");
                if let Some(ir) = ir {
                    print!("{}", ir);
                }
            }
            Ok(Outcome::Extern { ir, .. }) => {
                println!("Read extern:");
                if let Some(ir) = ir {
                    print!("{}", ir);
                }
            }
            Ok(Outcome::TopLevel { value, ir }) => {
                if let Some(ir) = ir {
                    println!("Read top-level expression:");
                    print!("{}", ir);
                }
                if let Some(v) = value {
                    println!("Evaluated to {}", v);
                }
            }
            Err(e) => eprintln!("{} {}", "Error:".red().bold(), e),
        }
    }
}

pub fn main_loop(driver: &mut Driver) -> Result<(), Error> {
    let stdin = stdin();
    let mut input = stdin.lock();
    loop {
        print!("{}", "ready> ".bright_cyan());
        stdout().flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            println!();
            return Ok(());
        }

        let results = driver.run_source(&line);
        report(&results);
    }
}

#[cfg(test)]
mod test {
    use super::super::error::ErrorKind;
    use super::*;

    fn values(results: Vec<Result<Outcome, Error>>) -> Vec<f64> {
        results
            .into_iter()
            .filter_map(|r| match r {
                Ok(Outcome::TopLevel { value, .. }) => value,
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_outcomes() {
        let mut driver = Driver::new(Options::default()).unwrap();
        let results = driver.run_source("extern sin(x); def one() 1; one() + 1");
        assert_eq!(results.len(), 3);
        match &results[0] {
            Ok(Outcome::Extern { name, ir }) => {
                assert_eq!(name, "sin");
                assert_eq!(ir.as_deref(), Some("declare %sin(f64) -> f64\n"));
            }
            r => panic!("unexpected {:?}", r),
        }
        match &results[1] {
            Ok(Outcome::Definition { name, ir }) => {
                assert_eq!(name, "one");
                assert!(ir.as_deref().unwrap().starts_with("function %one() -> f64"));
            }
            r => panic!("unexpected {:?}", r),
        }
        match &results[2] {
            Ok(Outcome::TopLevel { value, .. }) => assert_eq!(*value, Some(2.0)),
            r => panic!("unexpected {:?}", r),
        }
        assert!(driver.session().module().get_function(ANON_EXPR).is_none());
    }

    #[test]
    fn test_recovers_after_syntax_error() {
        let mut driver = Driver::new(Options::default()).unwrap();
        let results = driver.run_source("def (x) 1; 4 * 2");
        assert!(results.iter().any(|r| match r {
            Err(e) => {
                e.kind() == &ErrorKind::Syntax("Expected function name in prototype".to_owned())
            }
            _ => false,
        }));
        assert_eq!(values(results).last(), Some(&8.0));
    }

    #[test]
    fn test_no_eval() {
        let mut driver = Driver::new(Options {
            print_ir: false,
            evaluate: false,
        })
        .unwrap();
        let results = driver.run_source("1 + 2; 3");
        assert_eq!(
            results.into_iter().map(|r| r.unwrap()).collect::<Vec<_>>(),
            vec![
                Outcome::TopLevel { value: None, ir: None },
                Outcome::TopLevel { value: None, ir: None },
            ]
        );
    }
}
