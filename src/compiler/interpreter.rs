//! Executes a resolved program directly, with the same arithmetic and output
//! behaviour as the generated assembly.
use std::io::{self, Write};
use thiserror::Error;

use super::ast::*;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("`{opcode}` popped an empty stack at {loc}")]
    StackUnderflow { opcode: Opcode, loc: Location },
    #[error("division by zero at {loc}")]
    DivisionByZero { loc: Location },
    #[error("`{opcode}` is not a binary operator at {loc}")]
    NotBinary { opcode: Opcode, loc: Location },
    #[error("`push` has no operand at {loc}")]
    MissingOperand { loc: Location },
    #[error("unable to write output: {0}")]
    Io(#[from] io::Error),
}

#[derive(Default)]
pub struct Machine {
    stack: Vec<Immediate>,
}

impl Machine {
    pub fn new() -> Self {
        Machine::default()
    }

    /// Values left on the stack, bottom first.
    pub fn stack(&self) -> &[Immediate] {
        &self.stack
    }

    /// Runs `program` to completion, writing one line per `print` to `out`.
    pub fn run<W: Write>(&mut self, program: &[Instruction], out: &mut W) -> Result<(), RuntimeError> {
        for ins in program.iter() {
            self.step(ins, out)?;
        }
        out.flush()?;
        Ok(())
    }

    fn step<W: Write>(&mut self, ins: &Instruction, out: &mut W) -> Result<(), RuntimeError> {
        use Opcode::*;
        match ins.opcode {
            Push => {
                let value = ins.operand.ok_or(RuntimeError::MissingOperand { loc: ins.loc })?;
                self.stack.push(value);
            },
            Drop => {
                self.pop(ins)?;
            },
            Dup => {
                let a = self.pop(ins)?;
                self.stack.push(a);
                self.stack.push(a);
            },
            Swap => {
                let b = self.pop(ins)?;
                let a = self.pop(ins)?;
                self.stack.push(b);
                self.stack.push(a);
            },
            Over => {
                let b = self.pop(ins)?;
                let a = self.pop(ins)?;
                self.stack.push(a);
                self.stack.push(b);
                self.stack.push(a);
            },
            Add | Sub | Mul | Div | Mod | Equal => {
                let b = self.pop(ins)?;
                let a = self.pop(ins)?;
                let result = ins.opcode.apply(a, b).map_err(|fault| match fault {
                    Fault::DivisionByZero => RuntimeError::DivisionByZero { loc: ins.loc },
                    Fault::NotBinary => RuntimeError::NotBinary { opcode: ins.opcode, loc: ins.loc },
                })?;
                self.stack.push(result);
            },
            Print => {
                let a = self.pop(ins)?;
                writeln!(out, "{}", a)?;
            },
        }
        Ok(())
    }

    fn pop(&mut self, ins: &Instruction) -> Result<Immediate, RuntimeError> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow { opcode: ins.opcode, loc: ins.loc })
    }
}
