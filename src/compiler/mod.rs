//! The compiler module takes a piled source file and produces x86-64
//! assembly text for `fasm`.
//!
//! It runs a whitespace tokenizer, a single-lookahead instruction resolver
//! and a stack-machine code generator, in that order. The first error from
//! any stage stops the compilation.

pub mod ast;
pub mod codegen;
pub mod fixture;
pub mod interpreter;
pub mod lexer;
pub mod parser;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use self::ast::{Location, Program};
use self::codegen::CodegenError;
use self::lexer::LexError;
use self::parser::{ParseError, Parser};

/// One failure, tagged with the stage that produced it. `Display` gives the
/// diagnostic line, e.g. `lexer: unrecognized token `@@@` at line 2, column 1`.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("lexer: {0}")]
    Lex(#[from] LexError),
    #[error("parser: {0}")]
    Parse(#[from] ParseError),
    #[error("codegen: {0}")]
    Codegen(#[from] CodegenError),
    #[error("io: unable to read `{}`: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("io: unable to write `{}`: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
}

impl CompileError {
    pub fn stage(&self) -> &'static str {
        match self {
            CompileError::Lex(_) => "lexer",
            CompileError::Parse(_) => "parser",
            CompileError::Codegen(_) => "codegen",
            CompileError::Read { .. } | CompileError::Write { .. } => "io",
        }
    }

    pub fn loc(&self) -> Option<Location> {
        match self {
            CompileError::Lex(e) => Some(e.loc()),
            CompileError::Parse(e) => Some(e.loc()),
            CompileError::Codegen(e) => e.loc(),
            CompileError::Read { .. } | CompileError::Write { .. } => None,
        }
    }
}

/// A generated assembly file.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AssemblyUnit {
    pub path:         PathBuf,
    pub text:         String,
    pub instructions: usize,
}

pub fn read_source(path: &Path) -> Result<String, CompileError> {
    fs::read_to_string(path).map_err(|source| CompileError::Read { path: path.to_path_buf(), source })
}

/// Tokenizes and resolves `source`, then checks that no instruction pops an
/// empty stack.
pub fn resolve_source(source: &str) -> Result<Program, CompileError> {
    let tokens = lexer::tokenize(source.lines())?;
    for tok in tokens.iter() {
        trace!("{}:{}: `{}` -> {:?}", tok.loc.row, tok.loc.col, tok.text, tok.kind);
    }

    let program = Parser::new(tokens).run()?;
    let depth = parser::check_stack(&program)?;
    debug!("resolved {} instruction(s), {} value(s) left on the stack at exit", program.len(), depth);

    Ok(program)
}

/// Runs the whole pipeline in memory, returning the assembly text.
pub fn compile_source(source: &str) -> Result<String, CompileError> {
    lower(source).map(|(_, text)| text)
}

/// Runs every stage over `source`, including the generator's constant
/// folding, and returns the program without its assembly. Anything the
/// compiler rejects is rejected here with the same error.
pub fn check_source(source: &str) -> Result<Program, CompileError> {
    let program = resolve_source(source)?;
    codegen::generate(&program)?;
    Ok(program)
}

/// Returns the instruction count alongside the assembly; the program itself
/// is dropped once the generator is done with it.
fn lower(source: &str) -> Result<(usize, String), CompileError> {
    let program = resolve_source(source)?;
    info!("generating assembly ...");
    let text = codegen::generate(&program)?;
    Ok((program.len(), text))
}

/// The sibling of `input` with the `.asm` extension.
pub fn default_output(input: &Path) -> PathBuf {
    input.with_extension("asm")
}

/// Compiles the file at `input` and writes the assembly to `output`, or next
/// to the input when no output is given. Nothing is written on failure.
pub fn compile(input: &Path, output: Option<&Path>) -> Result<AssemblyUnit, CompileError> {
    info!("compiling `{}`", input.display());
    let source = read_source(input)?;
    let (instructions, text) = lower(&source)?;

    let path = output.map(Path::to_path_buf).unwrap_or_else(|| default_output(input));
    fs::write(&path, &text).map_err(|source| CompileError::Write { path: path.clone(), source })?;
    info!("wrote `{}`", path.display());

    Ok(AssemblyUnit { path, text, instructions })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A scratch directory under the system temp dir, removed on drop.
    struct Scratch(PathBuf);

    impl Scratch {
        fn new(name: &str) -> Self {
            let dir = std::env::temp_dir().join(format!("piled-{}-{}", name, std::process::id()));
            fs::create_dir_all(&dir).unwrap();
            Scratch(dir)
        }
    }

    impl Drop for Scratch {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn test_compile_writes_sibling() {
        let scratch = Scratch::new("sibling");
        let input = scratch.0.join("add.piled");
        fs::write(&input, "push 3 push 4 +\nprint\n").unwrap();

        let unit = compile(&input, None).unwrap();
        assert_eq!(unit.path, scratch.0.join("add.asm"));
        assert_eq!(unit.instructions, 4);
        assert_eq!(fs::read_to_string(&unit.path).unwrap(), unit.text);
        assert!(unit.text.contains("call dump"));
    }

    #[test]
    fn test_compile_explicit_output() {
        let scratch = Scratch::new("explicit");
        let input = scratch.0.join("prog.piled");
        let output = scratch.0.join("out.s");
        fs::write(&input, "push 5 print push 6 print").unwrap();

        let unit = compile(&input, Some(&output)).unwrap();
        assert_eq!(unit.path, output);
        assert!(output.exists());
        assert!(!scratch.0.join("prog.asm").exists());
    }

    #[test]
    fn test_unrecognized_token_writes_nothing() {
        let scratch = Scratch::new("unrecognized");
        let input = scratch.0.join("bad.piled");
        fs::write(&input, "push 1 print\n@@@\n").unwrap();

        let err = compile(&input, None).unwrap_err();
        assert!(matches!(err, CompileError::Lex(LexError::UnrecognizedToken { .. })));
        assert_eq!(err.stage(), "lexer");
        assert_eq!(err.loc(), Some(Location::new(2, 1)));
        assert_eq!(err.to_string(), "lexer: unrecognized token `@@@` at line 2, column 1");
        assert!(!scratch.0.join("bad.asm").exists());
    }

    #[test]
    fn test_missing_input() {
        let scratch = Scratch::new("missing");
        let err = compile(&scratch.0.join("nope.piled"), None).unwrap_err();
        assert_eq!(err.stage(), "io");
        assert_eq!(err.loc(), None);
        assert!(err.to_string().starts_with("io: unable to read"));
    }

    #[test]
    fn test_stage_of_each_error() {
        let err = compile_source("print 3").unwrap_err();
        assert_eq!(err.stage(), "parser");
        assert_eq!(err.to_string(), "parser: literal `3` does not belong to any instruction at line 1, column 7");

        let err = compile_source("push 1 print print").unwrap_err();
        assert_eq!(err.stage(), "parser");
        assert_eq!(err.loc(), Some(Location::new(1, 14)));

        let err = compile_source("push 1\npush 0\n/").unwrap_err();
        assert_eq!(err.stage(), "codegen");
        assert_eq!(err.to_string(), "codegen: division by zero at line 3, column 1");
    }

    #[test]
    fn test_check_source_matches_compiler() {
        let src = "push 5 print push 1 push 0 /";
        let compiled = compile_source(src).unwrap_err();
        let checked = check_source(src).unwrap_err();
        assert_eq!(checked.stage(), "codegen");
        assert_eq!(checked.to_string(), "codegen: division by zero at line 1, column 28");
        assert_eq!(checked.to_string(), compiled.to_string());

        let program = check_source("push 1 push 0 push 5 print /").unwrap();
        assert_eq!(program.len(), 5);
        assert!(compile_source("push 1 push 0 push 5 print /").is_ok());
    }

    #[test]
    fn test_compile_source_is_deterministic() {
        let src = "push 2 push 3 * print push 10 dup / print";
        assert_eq!(compile_source(src).unwrap(), compile_source(src).unwrap());
    }
}
