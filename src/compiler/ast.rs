//! This AST describes a resolved piled program.
//!
//! piled has no nested expressions, so a program is a flat list of
//! instructions executed top to bottom against a single evaluation stack.
//! Tokens are separated by whitespace; line breaks carry no meaning.
//!
//! Supported words:
//!
//! ```text
//! push N  ; -- N
//! drop    ; a --
//! dup     ; a -- a a
//! swap    ; a b -- b a
//! over    ; a b -- a b a
//! +       ; a b -- a+b      (wrapping)
//! -       ; a b -- a-b      (wrapping)
//! *       ; a b -- a*b      (wrapping)
//! /       ; a b -- a/b      (truncating, traps on zero)
//! %       ; a b -- a%b      (sign of a, traps on zero)
//! =       ; a b -- 1 if a == b, else 0
//! print   ; a --            (writes a and a newline to stdout)
//! ```
//!
//! There are no comments. Example source file, printing `7` then `-2`:
//!
//! ```text
//! push 3 push 4 +
//! print
//! push -12 push 5 % print
//! ```

use std::fmt;

/// Source position of a token, both fields 1-based.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct Location {
    pub row: usize,
    pub col: usize,
}

impl Location {
    pub fn new(row: usize, col: usize) -> Self {
        Location { row, col }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "line {}, column {}", self.row, self.col)
    }
}

pub type Immediate = i64;

/// Why `Opcode::apply` produced no value.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Fault {
    DivisionByZero,
    /// The opcode does not take two operands.
    NotBinary,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Opcode {
    Push,
    Drop,
    Dup,
    Swap,
    Over,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Equal,
    Print,
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.word())
    }
}

impl Opcode {
    pub const ALL: [Opcode; 12] = [
        Opcode::Push,
        Opcode::Drop,
        Opcode::Dup,
        Opcode::Swap,
        Opcode::Over,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Mod,
        Opcode::Equal,
        Opcode::Print,
    ];

    /// Looks up the opcode for a reserved word. Words are case-sensitive.
    pub fn from_word(word: &str) -> Option<Opcode> {
        Opcode::ALL.iter().copied().find(|op| op.word() == word)
    }

    /// The reserved word spelling this opcode.
    pub fn word(&self) -> &'static str {
        use Opcode::*;
        match self {
            Push  => "push",
            Drop  => "drop",
            Dup   => "dup",
            Swap  => "swap",
            Over  => "over",
            Add   => "+",
            Sub   => "-",
            Mul   => "*",
            Div   => "/",
            Mod   => "%",
            Equal => "=",
            Print => "print",
        }
    }

    pub fn takes_operand(&self) -> bool {
        matches!(self, Opcode::Push)
    }

    /// Stack effect as (values popped, values pushed).
    pub fn arity(&self) -> (usize, usize) {
        use Opcode::*;
        match self {
            Push  => (0, 1),
            Drop  => (1, 0),
            Dup   => (1, 2),
            Swap  => (2, 2),
            Over  => (2, 3),
            Add | Sub | Mul |
            Div | Mod | Equal => (2, 1),
            Print => (1, 0),
        }
    }

    /// Applies a binary arithmetic opcode using the wrapping semantics of the
    /// generated code.
    pub fn apply(&self, a: Immediate, b: Immediate) -> Result<Immediate, Fault> {
        use Opcode::*;
        match self {
            Add   => Ok(a.wrapping_add(b)),
            Sub   => Ok(a.wrapping_sub(b)),
            Mul   => Ok(a.wrapping_mul(b)),
            Div | Mod if b == 0 => Err(Fault::DivisionByZero),
            Div   => Ok(a.wrapping_div(b)),
            Mod   => Ok(a.wrapping_rem(b)),
            Equal => Ok((a == b) as Immediate),
            Push | Drop | Dup | Swap | Over | Print => Err(Fault::NotBinary),
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod | Opcode::Equal)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Instruction {
    pub opcode:  Opcode,
    pub operand: Option<Immediate>,
    pub loc:     Location,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.operand {
            Some(value) => write!(f, "{} {}", self.opcode, value),
            None => write!(f, "{}", self.opcode),
        }
    }
}

impl Instruction {
    pub fn new(opcode: Opcode, loc: Location) -> Self {
        Instruction { opcode, operand: None, loc }
    }

    pub fn push(value: Immediate, loc: Location) -> Self {
        Instruction { opcode: Opcode::Push, operand: Some(value), loc }
    }
}

pub type Program = Vec<Instruction>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_bijection() {
        for op in Opcode::ALL.iter() {
            assert_eq!(Opcode::from_word(op.word()), Some(*op));
        }
        assert_eq!(Opcode::from_word("PUSH"), None);
        assert_eq!(Opcode::from_word("add"), None);
        assert_eq!(Opcode::from_word(""), None);
    }

    #[test]
    fn test_only_push_takes_operand() {
        for op in Opcode::ALL.iter() {
            assert_eq!(op.takes_operand(), *op == Opcode::Push);
        }
    }

    #[test]
    fn test_apply_wraps() {
        assert_eq!(Opcode::Add.apply(i64::MAX, 1), Ok(i64::MIN));
        assert_eq!(Opcode::Sub.apply(i64::MIN, 1), Ok(i64::MAX));
        assert_eq!(Opcode::Mul.apply(i64::MAX, 2), Ok(-2));
        assert_eq!(Opcode::Div.apply(i64::MIN, -1), Ok(i64::MIN));
        assert_eq!(Opcode::Mod.apply(i64::MIN, -1), Ok(0));
    }

    #[test]
    fn test_apply_truncates() {
        assert_eq!(Opcode::Div.apply(-7, 2), Ok(-3));
        assert_eq!(Opcode::Mod.apply(-7, 2), Ok(-1));
        assert_eq!(Opcode::Mod.apply(7, -2), Ok(1));
        assert_eq!(Opcode::Div.apply(1, 0), Err(Fault::DivisionByZero));
        assert_eq!(Opcode::Mod.apply(1, 0), Err(Fault::DivisionByZero));
    }

    #[test]
    fn test_apply_rejects_non_binary() {
        for op in Opcode::ALL.iter() {
            assert_eq!(op.apply(6, 3).is_ok(), op.is_binary());
            if !op.is_binary() {
                assert_eq!(op.apply(6, 3), Err(Fault::NotBinary));
            }
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(Instruction::push(-3, Location::new(1, 1)).to_string(), "push -3");
        assert_eq!(Instruction::new(Opcode::Add, Location::new(1, 8)).to_string(), "+");
        assert_eq!(Location::new(2, 1).to_string(), "line 2, column 1");
    }
}
