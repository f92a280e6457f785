//! Expected-output fixtures.
//!
//! A fixture sits next to a `.piled` program with the `.expected` extension
//! and lists the values the program must print, one per line:
//!
//! ```text
//! :int 7
//! :int -2
//! ```
//!
//! Lines that are not exactly two space-separated words, or that do not
//! start with `:`, are ignored.
use thiserror::Error;

use super::ast::Immediate;

#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum FixtureError {
    #[error("unsupported value type `{tag}` on line {row}")]
    UnsupportedType { tag: String, row: usize },
    #[error("`{value}` is not a valid {tag} on line {row}")]
    InvalidValue { tag: String, value: String, row: usize },
}

#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum Mismatch {
    #[error("length of output is not equal: expected {} line(s) {:?}, got {} line(s) {:?}",
        .expected.len(), .expected, .actual.len(), .actual)]
    Length { expected: Vec<String>, actual: Vec<String> },
    #[error("element {} is not valid: expected `{}`, got `{}`", .index + 1, .expected, .actual)]
    Value  { index: usize, expected: String, actual: String },
}

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Expected {
    pub values: Vec<Immediate>,
}

impl Expected {
    pub fn parse(text: &str) -> Result<Expected, FixtureError> {
        let mut values = Vec::new();

        for (index, line) in text.lines().enumerate() {
            let words: Vec<&str> = line.split(' ').collect();
            if words.len() != 2 || !words[0].starts_with(':') {
                continue;
            }

            let tag = &words[0][1..];
            match tag {
                "int" => match words[1].parse::<Immediate>() {
                    Ok(value) => values.push(value),
                    Err(_) => return Err(FixtureError::InvalidValue {
                        tag: tag.to_owned(),
                        value: words[1].to_owned(),
                        row: index + 1,
                    }),
                },
                _ => return Err(FixtureError::UnsupportedType { tag: tag.to_owned(), row: index + 1 }),
            }
        }

        Ok(Expected { values })
    }

    /// Compares program output against the expected values. Empty output
    /// lines are skipped.
    pub fn verify(&self, stdout: &str) -> Result<(), Mismatch> {
        let actual: Vec<String> = stdout.lines().filter(|l| !l.is_empty()).map(str::to_owned).collect();
        let expected: Vec<String> = self.values.iter().map(|v| v.to_string()).collect();

        if actual.len() != expected.len() {
            return Err(Mismatch::Length { expected, actual });
        }

        for (index, (want, got)) in expected.iter().zip(actual.iter()).enumerate() {
            if want != got {
                return Err(Mismatch::Value { index, expected: want.clone(), actual: got.clone() });
            }
        }

        Ok(())
    }
}
