//! This lexer tokenizes piled source.
use regex::Regex;
use thiserror::Error;

use super::ast::{Immediate, Location, Opcode};

lazy_static! {
    static ref LITERAL: Regex = Regex::new(r"^[+-]?[0-9]+$").expect("literal pattern is valid");
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum TokenKind {
    Keyword(Opcode),
    Literal(Immediate),
}

/// A classified lexeme and the position of its first character.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub loc:  Location,
}

#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum LexError {
    #[error("unrecognized token `{text}` at {loc}")]
    UnrecognizedToken { text: String, loc: Location },
    #[error("integer literal `{text}` does not fit in 64 bits at {loc}")]
    LiteralOutOfRange { text: String, loc: Location },
}

impl LexError {
    pub fn loc(&self) -> Location {
        match self {
            LexError::UnrecognizedToken { loc, .. } |
            LexError::LiteralOutOfRange { loc, .. } => *loc,
        }
    }
}

/// Tokens never span lines, so each line is tokenized on its own and the
/// results are concatenated. Stops at the first bad token.
pub fn tokenize<'a, I>(lines: I) -> Result<Vec<Token>, LexError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut tokens: Vec<Token> = Vec::with_capacity(256);

    for (index, line) in lines.into_iter().enumerate() {
        let mut toks = tokenize_line(line, index + 1)?;
        trace!("line {}: {} token(s)", index + 1, toks.len());
        tokens.append(&mut toks);
    }

    Ok(tokens)
}

pub fn tokenize_line(line: &str, row: usize) -> Result<Vec<Token>, LexError> {
    let mut out: Vec<Token> = Vec::new();

    let mut sb = String::new();
    let mut start_col = 0;
    for (index, c) in line.chars().enumerate() {
        if c.is_whitespace() {
            // Whitespace bounds tokens, so flush whatever is buffered.
            if let Some(tok) = process_token(&sb, Location::new(row, start_col))? {
                out.push(tok);
            }
            sb.clear();
        } else {
            if sb.is_empty() {
                start_col = index + 1;
            }
            sb.push(c);
        }
    }
    // Process any final token that may be in the buffer.
    if let Some(tok) = process_token(&sb, Location::new(row, start_col))? {
        out.push(tok);
    }

    Ok(out)
}

fn process_token(sb: &str, loc: Location) -> Result<Option<Token>, LexError> {
    // Short-circuit if there's nothing to process.
    if sb.is_empty() {
        return Ok(None);
    }

    // Keywords win over literals, so a lone `-` is subtraction.
    if let Some(tok) = tokenize_op(sb, loc) {
        return Ok(Some(tok));
    }

    if let Some(tok) = tokenize_const(sb, loc)? {
        return Ok(Some(tok));
    }

    Err(LexError::UnrecognizedToken { text: sb.to_owned(), loc })
}

fn tokenize_op(sb: &str, loc: Location) -> Option<Token> {
    Opcode::from_word(sb).map(|op| Token {
        kind: TokenKind::Keyword(op),
        text: sb.to_owned(),
        loc,
    })
}

fn tokenize_const(sb: &str, loc: Location) -> Result<Option<Token>, LexError> {
    if !LITERAL.is_match(sb) {
        return Ok(None);
    }

    match sb.parse::<Immediate>() {
        Ok(val) => Ok(Some(Token {
            kind: TokenKind::Literal(val),
            text: sb.to_owned(),
            loc,
        })),
        Err(_) => Err(LexError::LiteralOutOfRange { text: sb.to_owned(), loc }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_tokenize_op() {
        for op in Opcode::ALL.iter() {
            let tok = tokenize_op(op.word(), Location::new(1, 1)).unwrap();
            assert_eq!(tok.kind, TokenKind::Keyword(*op));
            assert_eq!(tok.text, op.word());
        }

        assert_eq!(tokenize_op("PRINT", Location::new(1, 1)), None);
        assert_eq!(tokenize_op(" print ", Location::new(1, 1)), None);
        assert_eq!(tokenize_op("++", Location::new(1, 1)), None);
    }

    #[test]
    fn test_tokenize_const() {
        let loc = Location::new(1, 1);
        for i in -300..=300 {
            let tok = tokenize_const(&i.to_string(), loc).unwrap().unwrap();
            assert_eq!(tok.kind, TokenKind::Literal(i));
        }

        assert_eq!(tokenize_const("+42", loc).unwrap().unwrap().kind, TokenKind::Literal(42));
        assert_eq!(tokenize_const("007", loc).unwrap().unwrap().kind, TokenKind::Literal(7));
        assert_eq!(
            tokenize_const(&i64::MIN.to_string(), loc).unwrap().unwrap().kind,
            TokenKind::Literal(i64::MIN)
        );
        assert_eq!(tokenize_const("0x10", loc), Ok(None));
        assert_eq!(tokenize_const("1.5", loc), Ok(None));
        assert_eq!(tokenize_const("-", loc), Ok(None));
        assert_eq!(tokenize_const("--1", loc), Ok(None));
        assert_eq!(
            tokenize_const("9223372036854775808", loc),
            Err(LexError::LiteralOutOfRange { text: "9223372036854775808".to_owned(), loc })
        );
    }

    #[test]
    fn test_process_token() {
        let loc = Location::new(3, 4);
        assert_eq!(process_token("", loc), Ok(None));
        assert_eq!(process_token("-", loc).unwrap().unwrap().kind, TokenKind::Keyword(Opcode::Sub));
        assert_eq!(process_token("-5", loc).unwrap().unwrap().kind, TokenKind::Literal(-5));
        assert_eq!(
            process_token("push3", loc),
            Err(LexError::UnrecognizedToken { text: "push3".to_owned(), loc })
        );
    }

    #[test]
    fn test_tokenize_line() {
        let toks = tokenize_line("push 3 push 4 + print", 1).unwrap();
        assert_eq!(kinds(&toks), vec![
            TokenKind::Keyword(Opcode::Push),
            TokenKind::Literal(3),
            TokenKind::Keyword(Opcode::Push),
            TokenKind::Literal(4),
            TokenKind::Keyword(Opcode::Add),
            TokenKind::Keyword(Opcode::Print),
        ]);
        let cols: Vec<usize> = toks.iter().map(|t| t.loc.col).collect();
        assert_eq!(cols, vec![1, 6, 8, 13, 15, 17]);

        let toks = tokenize_line("  \t push\t\t-12   ", 7).unwrap();
        assert_eq!(toks, vec![
            Token { kind: TokenKind::Keyword(Opcode::Push), text: "push".to_owned(), loc: Location::new(7, 5) },
            Token { kind: TokenKind::Literal(-12), text: "-12".to_owned(), loc: Location::new(7, 11) },
        ]);

        assert_eq!(tokenize_line("", 1), Ok(vec![]));
        assert_eq!(tokenize_line(" \t ", 1), Ok(vec![]));

        // Invalid configurations of valid tokens are allowed - that's
        // the parser's job, not the lexer's.
        assert_eq!(kinds(&tokenize_line("5 5 print print", 1).unwrap()).len(), 4);
    }

    #[test]
    fn test_tokenize_line_columns_count_chars() {
        let err = tokenize_line("push 1 é", 1).unwrap_err();
        assert_eq!(err, LexError::UnrecognizedToken { text: "é".to_owned(), loc: Location::new(1, 8) });

        let toks = tokenize_line("push 1 print", 1).unwrap();
        for tok in toks.iter() {
            let text: String = "push 1 print".chars().skip(tok.loc.col - 1).take(tok.text.chars().count()).collect();
            assert_eq!(text, tok.text);
        }
    }

    #[test]
    fn test_tokenize() {
        let src = "push 5 print\n\n  push 6\nprint";
        let toks = tokenize(src.lines()).unwrap();
        let locs: Vec<(usize, usize)> = toks.iter().map(|t| (t.loc.row, t.loc.col)).collect();
        assert_eq!(locs, vec![(1, 1), (1, 6), (1, 8), (3, 3), (3, 8), (4, 1)]);

        // Deterministic.
        assert_eq!(tokenize(src.lines()), tokenize(src.lines()));
        assert_eq!(tokenize(std::iter::empty::<&str>()), Ok(vec![]));
    }

    #[test]
    fn test_tokenize_stops_at_first_error() {
        let src = "push 1\n@@@ print\n$$$";
        assert_eq!(
            tokenize(src.lines()),
            Err(LexError::UnrecognizedToken { text: "@@@".to_owned(), loc: Location::new(2, 1) })
        );
    }

    #[test]
    fn test_locations_are_monotonic() {
        let src = "push 1 push 2 +\n dup print drop\n\npush -9 push 3 % print swap over = *";
        let toks = tokenize(src.lines()).unwrap();
        for pair in toks.windows(2) {
            let (a, b) = (pair[0].loc, pair[1].loc);
            assert!(a.row <= b.row);
            if a.row == b.row {
                assert!(a.col < b.col);
            }
        }
    }
}
