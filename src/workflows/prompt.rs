use std::io::{self, BufRead, Write};

/// Yes/no confirmation gate.
pub trait Confirm {
    /// Ask `question`; `true` when the operator agrees.
    fn confirm(&self, question: &str) -> io::Result<bool>;
}

/// Asks on stderr and reads the answer from stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, question: &str) -> io::Result<bool> {
        let mut stderr = io::stderr();
        write!(stderr, "{question} [y/N] ")?;
        stderr.flush()?;

        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        Ok(parse_answer(&answer))
    }
}

/// Always gives the same answer, for `--yes` style flags.
#[derive(Debug, Clone, Copy)]
pub struct FixedConfirm(pub bool);

impl Confirm for FixedConfirm {
    fn confirm(&self, question: &str) -> io::Result<bool> {
        tracing::info!(question, answer = self.0, "Confirmation answered automatically");
        Ok(self.0)
    }
}

pub fn parse_answer(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer() {
        assert!(parse_answer("y\n"));
        assert!(parse_answer("  YES "));
        assert!(!parse_answer("\n"));
        assert!(!parse_answer("nope"));
    }

    #[test]
    fn test_fixed_confirm() {
        assert!(FixedConfirm(true).confirm("Continue?").unwrap());
        assert!(!FixedConfirm(false).confirm("Continue?").unwrap());
    }
}
