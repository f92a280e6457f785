//! Lowers a resolved program into x86-64 assembly for `fasm`.
//!
//! The output is a static ELF64 executable. Every piled value is a 64-bit
//! slot on the machine stack: instructions pop their operands with `pop`
//! and push the result back. `print` hands the top of stack to `dump`, which
//! writes it in decimal to stdout with `write(2)`.
//!
//! Runs of literals are folded at compile time. A division whose operands
//! are both known here fails the compilation when the divisor is zero; any
//! other division checks the divisor at run time and exits through
//! `div_by_zero`.

use std::convert::TryFrom;
use std::fmt::Write;
use thiserror::Error;

use super::ast::*;

#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum CodegenError {
    #[error("division by zero at {loc}")]
    DivisionByZero { loc: Location },
    #[error("internal error: {0}")]
    Internal(String),
}

impl CodegenError {
    pub fn loc(&self) -> Option<Location> {
        match self {
            CodegenError::DivisionByZero { loc } => Some(*loc),
            CodegenError::Internal(_) => None,
        }
    }
}

const HEADER: &str = "\
format ELF64 executable 3
entry _start

segment readable executable

";

/// Prints `rdi` as a signed decimal followed by a newline.
/// Clobbers rax, rcx, rdx, rsi, rdi, r8, r9 and r11.
const DUMP: &str = "\
dump:
    mov     r9, rdi
    mov     rax, rdi
    test    rax, rax
    jns     .digits
    neg     rax
.digits:
    mov     r8, -3689348814741910323
    sub     rsp, 40
    mov     BYTE [rsp+31], 10
    lea     rcx, [rsp+30]
.next:
    mov     rdi, rax
    mul     r8
    shr     rdx, 3
    lea     rsi, [rdx+rdx*4]
    add     rsi, rsi
    mov     rax, rdi
    sub     rax, rsi
    add     eax, 48
    mov     BYTE [rcx], al
    sub     rcx, 1
    mov     rax, rdx
    test    rax, rax
    jnz     .next
    test    r9, r9
    jns     .write
    mov     BYTE [rcx], 45
    sub     rcx, 1
.write:
    lea     rsi, [rcx+1]
    lea     rdx, [rsp+32]
    sub     rdx, rsi
    mov     edi, 1
    mov     eax, 1
    syscall
    add     rsp, 40
    ret

";

const DIV_BY_ZERO: &str = "\
div_by_zero:
    mov     eax, 1
    mov     edi, 2
    mov     rsi, div_by_zero_msg
    mov     edx, div_by_zero_msg_len
    syscall
    mov     eax, 60
    mov     edi, 1
    syscall

";

const DIV_BY_ZERO_DATA: &str = "
segment readable

div_by_zero_msg db \"runtime error: division by zero\", 10
div_by_zero_msg_len = $ - div_by_zero_msg
";

/// Generates the complete assembly unit for `program`.
pub fn generate(program: &[Instruction]) -> Result<String, CodegenError> {
    let mut gen = Generator::default();
    for ins in program.iter() {
        gen.instruction(ins)?;
    }
    gen.flush();
    Ok(gen.finish())
}

#[derive(Default)]
struct Generator {
    body:        String,
    /// Values known at compile time that sit on top of the stack but have
    /// not been pushed yet. The last element is the top.
    pending:     Vec<Immediate>,
    labels:      usize,
    uses_divide: bool,
}

impl Generator {
    fn instruction(&mut self, ins: &Instruction) -> Result<(), CodegenError> {
        use Opcode::*;
        if self.fold(ins)? {
            return Ok(());
        }
        self.flush();

        match ins.opcode {
            Push => {
                return Err(CodegenError::Internal(format!(
                    "`push` without operand reached the generator at {}", ins.loc
                )));
            },
            Drop => {
                self.emit("pop rax");
            },
            Dup => {
                self.emit("push qword [rsp]");
            },
            Swap => {
                self.emit("pop rax");
                self.emit("pop rbx");
                self.emit("push rax");
                self.emit("push rbx");
            },
            Over => {
                self.emit("push qword [rsp+8]");
            },
            Add => {
                self.emit("pop rax");
                self.emit("pop rbx");
                self.emit("add rax, rbx");
                self.emit("push rax");
            },
            Sub => {
                self.emit("pop rax");
                self.emit("pop rbx");
                self.emit("sub rbx, rax");
                self.emit("push rbx");
            },
            Mul => {
                self.emit("pop rax");
                self.emit("pop rbx");
                self.emit("imul rax, rbx");
                self.emit("push rax");
            },
            Div | Mod => self.divide(ins.opcode == Div),
            Equal => {
                self.emit("mov rcx, 0");
                self.emit("mov rdx, 1");
                self.emit("pop rax");
                self.emit("pop rbx");
                self.emit("cmp rax, rbx");
                self.emit("cmove rcx, rdx");
                self.emit("push rcx");
            },
            Print => {
                self.emit("pop rdi");
                self.emit("call dump");
            },
        }
        Ok(())
    }

    /// Evaluates `ins` against the pending constants. Returns false when not
    /// enough of its operands are known, leaving everything untouched.
    fn fold(&mut self, ins: &Instruction) -> Result<bool, CodegenError> {
        use Opcode::*;
        let n = self.pending.len();
        match ins.opcode {
            Push => match ins.operand {
                Some(value) => self.pending.push(value),
                None => return Ok(false),
            },
            Drop if n >= 1 => {
                self.pending.pop();
            },
            Dup if n >= 1 => {
                let top = self.pending[n - 1];
                self.pending.push(top);
            },
            Swap if n >= 2 => self.pending.swap(n - 1, n - 2),
            Over if n >= 2 => {
                let second = self.pending[n - 2];
                self.pending.push(second);
            },
            op if op.is_binary() && n >= 2 => {
                let b = self.pending[n - 1];
                let a = self.pending[n - 2];
                let result = op.apply(a, b).map_err(|fault| match fault {
                    Fault::DivisionByZero => CodegenError::DivisionByZero { loc: ins.loc },
                    Fault::NotBinary => CodegenError::Internal(format!(
                        "`{}` folded as a binary operator at {}", op, ins.loc
                    )),
                })?;
                self.pending.truncate(n - 2);
                self.pending.push(result);
            },
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Pushes every pending constant, bottom first.
    fn flush(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        for value in pending {
            if i32::try_from(value).is_ok() {
                self.emit(&format!("push {}", value));
            } else {
                self.emit(&format!("mov rax, 0x{:X}", value as u64));
                self.emit("push rax");
            }
        }
    }

    /// `idiv` faults on a zero divisor and on `MIN / -1`. The first exits
    /// through `div_by_zero`, the second wraps like `i64::wrapping_div`.
    fn divide(&mut self, quotient: bool) {
        self.uses_divide = true;
        self.labels += 1;
        let label = format!(".div{}", self.labels);

        self.emit("pop rbx");
        self.emit("pop rax");
        self.emit("test rbx, rbx");
        self.emit("jz div_by_zero");
        self.emit("cmp rbx, -1");
        self.emit(&format!("jne {}", label));
        self.emit("neg rax");
        self.emit("xor edx, edx");
        self.emit(&format!("jmp {}_done", label));
        self.label(&label);
        self.emit("cqo");
        self.emit("idiv rbx");
        self.label(&format!("{}_done", label));
        self.emit(if quotient { "push rax" } else { "push rdx" });
    }

    fn emit(&mut self, line: &str) {
        // Writing to a String cannot fail.
        let _ = writeln!(self.body, "    {}", line);
    }

    fn label(&mut self, name: &str) {
        let _ = writeln!(self.body, "{}:", name);
    }

    fn finish(self) -> String {
        let mut out = String::with_capacity(HEADER.len() + DUMP.len() + self.body.len() + 256);
        out.push_str(HEADER);
        out.push_str(DUMP);
        if self.uses_divide {
            out.push_str(DIV_BY_ZERO);
        }
        out.push_str("_start:\n");
        out.push_str(&self.body);
        out.push_str("    mov rax, 60\n");
        out.push_str("    mov rdi, 0\n");
        out.push_str("    syscall\n");
        if self.uses_divide {
            out.push_str(DIV_BY_ZERO_DATA);
        }
        out
    }
}
