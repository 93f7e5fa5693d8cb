//! Operator confirmation prompts.

use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Stderr, Stdin, Write};

/// Asks the operator a yes/no question and blocks until answered.
pub trait Confirm {
  fn confirm(&mut self, prompt: &str) -> io::Result<bool>;
}

/// Returns true for `y` or `yes`, ignoring case and surrounding whitespace.
pub fn is_affirmative(answer: &str) -> bool {
  matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Line-based prompt over any reader/writer pair.
pub struct PromptConfirm<R, W> {
  input: R,
  output: W,
}

impl<R: BufRead, W: Write> PromptConfirm<R, W> {
  pub fn new(input: R, output: W) -> Self {
    Self { input, output }
  }
}

impl PromptConfirm<BufReader<Stdin>, Stderr> {
  /// Prompts on stderr and reads answers from stdin.
  pub fn stdio() -> Self {
    Self::new(BufReader::new(io::stdin()), io::stderr())
  }
}

impl<R: BufRead, W: Write> Confirm for PromptConfirm<R, W> {
  fn confirm(&mut self, prompt: &str) -> io::Result<bool> {
    write!(self.output, "{} [y/N] ", prompt)?;
    self.output.flush()?;

    let mut answer = Vec::new();
    // EOF leaves the answer empty, which reads as a rejection.
    self.input.read_until(b'\n', &mut answer)?;

    Ok(is_affirmative(&String::from_utf8_lossy(&answer)))
  }
}

/// Answers prompts from a fixed script. Unscripted prompts are rejected.
#[derive(Debug, Default)]
pub struct ScriptedConfirm {
  answers: VecDeque<bool>,
  prompts: Vec<String>,
}

impl ScriptedConfirm {
  pub fn new<I: IntoIterator<Item = bool>>(answers: I) -> Self {
    Self {
      answers: answers.into_iter().collect(),
      prompts: Vec::new(),
    }
  }

  /// Prompts shown so far, in order.
  pub fn prompts(&self) -> &[String] {
    &self.prompts
  }
}

impl Confirm for ScriptedConfirm {
  fn confirm(&mut self, prompt: &str) -> io::Result<bool> {
    self.prompts.push(prompt.to_string());
    Ok(self.answers.pop_front().unwrap_or(false))
  }
}
