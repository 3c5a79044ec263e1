//! The program parser.
//!
//! Line-oriented DSL:
//!
//! ```text
//! particle q1;          // declare a resource
//! hadamard q1;
//! x q1;  z q1;
//! cnot q1, q2;
//! measure q1 -> b0;
//! ```
//!
//! Parsing is permissive and never fails. Comments, blank lines, unknown
//! opcodes and lines missing operands all drop out of the sequence.

use serde::{Deserialize, Serialize};

const COMMENT_MARKER: &str = "//";
const ARROW: &str = "->";

/// Instruction opcodes understood by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Opcode {
    Particle,
    Hadamard,
    X,
    Z,
    Cnot,
    Measure,
}

impl Opcode {
    /// Maps a source token to an opcode. Case-sensitive.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "particle" => Some(Self::Particle),
            "hadamard" => Some(Self::Hadamard),
            "x" => Some(Self::X),
            "z" => Some(Self::Z),
            "cnot" => Some(Self::Cnot),
            "measure" => Some(Self::Measure),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Particle => "particle",
            Self::Hadamard => "hadamard",
            Self::X => "x",
            Self::Z => "z",
            Self::Cnot => "cnot",
            Self::Measure => "measure",
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Particle { name: String },
    Hadamard { target: String },
    X { target: String },
    Z { target: String },
    Cnot { control: String, target: String },
    Measure { target: String, bit: Option<String> },
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Particle { .. } => Opcode::Particle,
            Self::Hadamard { .. } => Opcode::Hadamard,
            Self::X { .. } => Opcode::X,
            Self::Z { .. } => Opcode::Z,
            Self::Cnot { .. } => Opcode::Cnot,
            Self::Measure { .. } => Opcode::Measure,
        }
    }

    /// Builds an instruction from an opcode and its operand tokens.
    ///
    /// Returns `None` when required operands are missing.
    fn build(opcode: Opcode, operands: &[&str]) -> Option<Self> {
        let first = operands.first().map(|s| s.to_string());
        match opcode {
            Opcode::Particle => Some(Self::Particle { name: first? }),
            Opcode::Hadamard => Some(Self::Hadamard { target: first? }),
            Opcode::X => Some(Self::X { target: first? }),
            Opcode::Z => Some(Self::Z { target: first? }),
            Opcode::Cnot => Some(Self::Cnot {
                control: first?,
                target: operands.get(1)?.to_string(),
            }),
            Opcode::Measure => {
                let target = first?;
                let bit = operands
                    .iter()
                    .position(|t| *t == ARROW)
                    .and_then(|i| operands.get(i + 1))
                    .map(|b| b.to_string());
                Some(Self::Measure { target, bit })
            }
        }
    }
}

/// A parsed program: instructions in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    pub instructions: Vec<Instruction>,
}

impl Program {
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter()
    }
}

/// Result of classifying a single source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    Instruction(Instruction),
    /// Known opcode without enough operands
    Incomplete(Opcode),
    /// Opcode this service does not know
    Unknown(String),
    /// Blank or comment-only
    Empty,
}

/// Parses program text into an ordered instruction sequence.
pub fn parse_program(source: &str) -> Program {
    let instructions = source
        .lines()
        .filter_map(|line| match parse_line(line) {
            ParsedLine::Instruction(instruction) => Some(instruction),
            ParsedLine::Unknown(opcode) => {
                tracing::debug!(opcode = %opcode, "skipping unknown opcode");
                None
            }
            ParsedLine::Incomplete(opcode) => {
                tracing::debug!(opcode = %opcode, "skipping instruction with missing operands");
                None
            }
            ParsedLine::Empty => None,
        })
        .collect();

    Program { instructions }
}

/// Classifies one line of program text.
pub fn parse_line(line: &str) -> ParsedLine {
    let code = match line.find(COMMENT_MARKER) {
        Some(at) => &line[..at],
        None => line,
    };

    let spaced = code.replace(ARROW, " -> ");
    let tokens = tokenize(&spaced);
    let Some((head, operands)) = tokens.split_first() else {
        return ParsedLine::Empty;
    };

    match Opcode::from_token(head) {
        Some(opcode) => match Instruction::build(opcode, operands) {
            Some(instruction) => ParsedLine::Instruction(instruction),
            None => ParsedLine::Incomplete(opcode),
        },
        None => ParsedLine::Unknown(head.to_string()),
    }
}

/// Splits on whitespace and commas, stripping trailing `;` and `,`.
fn tokenize(code: &str) -> Vec<&str> {
    code.split(|c: char| c.is_whitespace() || c == ',')
        .map(|t| t.trim_end_matches([';', ',']))
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn particle(name: &str) -> Instruction {
        Instruction::Particle { name: name.into() }
    }

    #[test]
    fn test_parse_full_program() {
        let program = parse_program(
            "particle q1;\nparticle q2;\nhadamard q1;\ncnot q1, q2;\nmeasure q1 -> b;",
        );

        assert_eq!(
            program.instructions,
            vec![
                particle("q1"),
                particle("q2"),
                Instruction::Hadamard { target: "q1".into() },
                Instruction::Cnot { control: "q1".into(), target: "q2".into() },
                Instruction::Measure { target: "q1".into(), bit: Some("b".into()) },
            ]
        );
    }

    #[test]
    fn test_comments_and_blank_lines_vanish() {
        let program = parse_program("// header\n\n   \nparticle a; // trailing note\n//x a;");
        assert_eq!(program.instructions, vec![particle("a")]);
    }

    #[test]
    fn test_unknown_opcode_is_skipped() {
        assert!(parse_program("teleport q1;").is_empty());
        assert_eq!(parse_line("teleport q1;"), ParsedLine::Unknown("teleport".into()));
        assert_eq!(
            parse_program("teleport q1;\nz q1;").instructions,
            vec![Instruction::Z { target: "q1".into() }]
        );
    }

    #[test]
    fn test_missing_operands_drop_line() {
        assert_eq!(parse_line("cnot q1;"), ParsedLine::Incomplete(Opcode::Cnot));
        assert_eq!(parse_line("particle ;"), ParsedLine::Incomplete(Opcode::Particle));
        assert!(parse_program("cnot q1;\nmeasure;").is_empty());
    }

    #[test]
    fn test_comma_spacing_is_irrelevant() {
        let tight = parse_program("cnot a,b;");
        let loose = parse_program("cnot   a ,  b ;");
        assert_eq!(tight, loose);
        assert_eq!(tight.len(), 1);
    }

    #[test]
    fn test_measure_bit_forms() {
        assert_eq!(
            parse_line("measure q1->c0;"),
            ParsedLine::Instruction(Instruction::Measure {
                target: "q1".into(),
                bit: Some("c0".into()),
            })
        );
        assert_eq!(
            parse_line("measure q1;"),
            ParsedLine::Instruction(Instruction::Measure { target: "q1".into(), bit: None })
        );
    }

    #[test]
    fn test_opcodes_are_case_sensitive() {
        assert_eq!(parse_line("PARTICLE q;"), ParsedLine::Unknown("PARTICLE".into()));
    }

    #[test]
    fn test_extra_operands_ignored() {
        assert_eq!(
            parse_line("x q1 q2 q3;"),
            ParsedLine::Instruction(Instruction::X { target: "q1".into() })
        );
    }

    proptest! {
        #[test]
        fn prop_parse_never_exceeds_line_count(source in "[a-z0-9 ;,>/\\-\n]{0,200}") {
            let program = parse_program(&source);
            prop_assert!(program.len() <= source.lines().count());
        }

        #[test]
        fn prop_commented_lines_produce_nothing(body in "[a-z0-9 ;,]{0,40}") {
            let source = format!("// {}", body);
            prop_assert!(parse_program(&source).is_empty());
        }

        #[test]
        fn prop_declared_names_survive(name in "[a-z][a-z0-9_]{0,12}") {
            let program = parse_program(&format!("particle {};", name));
            prop_assert_eq!(program.instructions, vec![particle(&name)]);
        }
    }
}
