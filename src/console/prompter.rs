//! Line-oriented terminal input and output.
use std::borrow::Cow;
use std::collections::VecDeque;

use rustyline::config::Configurer as _;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::history::DefaultHistory;
use rustyline::{ColorMode, Completer, Editor, Helper, Hinter, Validator};

/// Where the console reads answers and writes messages.
pub trait Prompter {
    /// Show `prompt` and read one line. `None` at end of input.
    ///
    /// # Errors
    /// Errors if the terminal cannot be read.
    fn read_line(&mut self, prompt: &str) -> anyhow::Result<Option<String>>;

    /// Like [`Prompter::read_line`], without echoing what is typed.
    ///
    /// # Errors
    /// Errors if the terminal cannot be read.
    fn read_secret(&mut self, prompt: &str) -> anyhow::Result<Option<String>>;

    /// Show a message.
    fn say(&mut self, text: &str);
}

/// Echoes `*` instead of the typed characters while masking.
#[derive(Completer, Helper, Hinter, Validator, Default)]
struct MaskingHelper {
    /// Whether input is currently hidden.
    masking: bool,
}

impl Highlighter for MaskingHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if self.masking {
            Cow::Owned("*".repeat(line.chars().count()))
        } else {
            Cow::Borrowed(line)
        }
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        self.masking
    }
}

/// Interactive terminal.
pub struct TerminalPrompter {
    /// Line editor.
    editor: Editor<MaskingHelper, DefaultHistory>,
}

impl std::fmt::Debug for TerminalPrompter {
    fn fmt(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.debug_struct("TerminalPrompter").finish_non_exhaustive()
    }
}

impl TerminalPrompter {
    /// Prompter on the controlling terminal.
    ///
    /// # Errors
    /// Errors if the terminal cannot be set up.
    pub fn new() -> anyhow::Result<Self> {
        let mut editor = Editor::new()?;
        editor.set_helper(Some(MaskingHelper::default()));
        editor.set_auto_add_history(true);
        Ok(Self { editor })
    }

    /// Read a line, mapping end of input and interrupts to `None`.
    fn read(&mut self, prompt: &str) -> anyhow::Result<Option<String>> {
        match self.editor.readline(prompt) {
            Ok(line) => Ok(Some(line)),
            Err(ReadlineError::Eof | ReadlineError::Interrupted) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Toggle masking of typed characters.
    fn mask(&mut self, masking: bool) {
        if let Some(helper) = self.editor.helper_mut() {
            helper.masking = masking;
        }
        self.editor.set_auto_add_history(!masking);
        self.editor.set_color_mode(if masking {
            ColorMode::Forced
        } else {
            ColorMode::Enabled
        });
    }
}

impl Prompter for TerminalPrompter {
    fn read_line(&mut self, prompt: &str) -> anyhow::Result<Option<String>> {
        // Prompts may open with blank lines, which the line editor would swallow.
        let prompt = match prompt.rsplit_once('\n') {
            Some((before, last)) => {
                self.say(before);
                last
            }
            None => prompt,
        };
        self.read(prompt)
    }

    fn read_secret(&mut self, prompt: &str) -> anyhow::Result<Option<String>> {
        self.mask(true);
        let secret = self.read(prompt);
        self.mask(false);
        secret
    }

    #[expect(clippy::print_stdout, reason = "The console talks to the operator on stdout")]
    fn say(&mut self, text: &str) {
        println!("{text}");
    }
}

/// Plays back prepared answers and records everything shown.
#[derive(Debug, Default, Clone)]
pub struct ScriptedPrompter {
    /// Answers to `read_line`.
    lines: VecDeque<String>,
    /// Answers to `read_secret`.
    secrets: VecDeque<String>,
    /// Prompts and messages, in order.
    transcript: Vec<String>,
}

impl ScriptedPrompter {
    /// Prompter answering `read_line` with `lines`, in order.
    #[must_use]
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Answer `read_secret` with `secrets`, in order.
    #[must_use]
    pub fn with_secrets<I, S>(mut self, secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.secrets = secrets.into_iter().map(Into::into).collect();
        self
    }

    /// Everything shown so far, one prompt or message per line.
    #[must_use]
    pub fn output(&self) -> String {
        self.transcript.join("\n")
    }

    /// Answers not consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.lines.len() + self.secrets.len()
    }
}

impl Prompter for ScriptedPrompter {
    fn read_line(&mut self, prompt: &str) -> anyhow::Result<Option<String>> {
        self.transcript.push(prompt.to_owned());
        Ok(self.lines.pop_front())
    }

    fn read_secret(&mut self, prompt: &str) -> anyhow::Result<Option<String>> {
        self.transcript.push(prompt.to_owned());
        Ok(self.secrets.pop_front())
    }

    fn say(&mut self, text: &str) {
        self.transcript.push(text.to_owned());
    }
}
