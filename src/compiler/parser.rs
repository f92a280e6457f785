//! The Parser module takes a token stream from the lexer and resolves it
//! into a flat list of instructions.
use std::collections::VecDeque;
use thiserror::Error;

use super::ast::*;
use super::lexer::{Token, TokenKind};

#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum ParseError {
    #[error("literal `{value}` does not belong to any instruction at {loc}")]
    DanglingLiteral { value: Immediate, loc: Location },
    #[error("`{opcode}` expects an integer operand at {loc}")]
    MissingOperand { opcode: Opcode, loc: Location },
    #[error("`{opcode}` needs {needed} value(s) but the stack holds {depth} at {loc}")]
    StackUnderflow { opcode: Opcode, needed: usize, depth: usize, loc: Location },
}

impl ParseError {
    pub fn loc(&self) -> Location {
        match self {
            ParseError::DanglingLiteral { loc, .. } |
            ParseError::MissingOperand { loc, .. } |
            ParseError::StackUnderflow { loc, .. } => *loc,
        }
    }
}

pub struct Parser {
    tokens:  VecDeque<Token>,
    program: Program,
}

impl Parser {
    pub fn new<T: Into<VecDeque<Token>>>(tokens: T) -> Self {
        let tokens = tokens.into();
        let capacity = tokens.len();
        Parser { tokens, program: Program::with_capacity(capacity) }
    }

    /// Run the parser, consuming itself and returning the program.
    /// Stops at the first error.
    pub fn run(mut self) -> Result<Program, ParseError> {
        while let Some(ins) = self.instruction()? {
            self.program.push(ins);
        }
        Ok(self.program)
    }

    /// Consumes one opcode and, when it takes one, its operand.
    fn instruction(&mut self) -> Result<Option<Instruction>, ParseError> {
        let cur_tok = self.consume();

        match cur_tok {
            Some(Token { kind: TokenKind::Keyword(opcode), loc, .. }) => {
                if opcode.takes_operand() {
                    let value = self.immediate(opcode, loc)?;
                    Ok(Some(Instruction::push(value, loc)))
                } else {
                    Ok(Some(Instruction::new(opcode, loc)))
                }
            },
            Some(Token { kind: TokenKind::Literal(value), loc, .. }) => {
                Err(ParseError::DanglingLiteral { value, loc })
            },
            // No tokens left to parse means we're out of instructions.
            None => Ok(None),
        }
    }

    /// Takes the operand of `opcode`. The next token is only consumed if it
    /// is a literal.
    fn immediate(&mut self, opcode: Opcode, loc: Location) -> Result<Immediate, ParseError> {
        match self.peek() {
            Some(Token { kind: TokenKind::Literal(value), .. }) => {
                let value = *value;
                self.consume();
                Ok(value)
            },
            _ => Err(ParseError::MissingOperand { opcode, loc }),
        }
    }

    #[inline]
    fn peek(&self) -> Option<&Token> {
        self.tokens.front()
    }

    /// Pops a token off the input stream and returns it.
    /// Returns None if no tokens are left.
    #[inline]
    fn consume(&mut self) -> Option<Token> {
        self.tokens.pop_front()
    }
}

/// Walks the program with each opcode's stack effect. piled has no branches,
/// so this finds every underflow before the program runs. Returns the number
/// of values left on the stack at exit.
pub fn check_stack(program: &[Instruction]) -> Result<usize, ParseError> {
    let mut depth: usize = 0;
    for ins in program.iter() {
        let (pops, pushes) = ins.opcode.arity();
        if depth < pops {
            return Err(ParseError::StackUnderflow {
                opcode: ins.opcode,
                needed: pops,
                depth,
                loc: ins.loc,
            });
        }
        depth = depth - pops + pushes;
    }
    Ok(depth)
}
