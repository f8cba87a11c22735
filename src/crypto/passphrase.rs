//! Passphrase resolution: environment variable first, then a hidden prompt.

use std::fmt;
use std::io::{self, IsTerminal, Write};

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::ImportError;

pub const DEFAULT_PASSPHRASE_ENV: &str = "FOLIO_DB_PASSPHRASE";

const PROMPT: &str = "Enter local DB passphrase (leave blank to skip DB): ";

/// Operator passphrase, held only in memory and wiped on drop.
#[derive(Clone)]
pub struct Passphrase(Zeroizing<String>);

impl Passphrase {
    /// Returns `None` for an empty passphrase; empty means "no encryption".
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value: Zeroizing<String> = Zeroizing::new(value.into());
        if value.is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(***)")
    }
}

/// Resolve the passphrase for this run.
///
/// Order: the named environment variable, then an interactive prompt when
/// stdin is a terminal. `Ok(None)` means the run proceeds without the archive
/// database; cancelling the prompt is an error so the run stops untouched.
pub fn resolve_passphrase(env_var: &str) -> Result<Option<Passphrase>> {
    if let Some(pass) = passphrase_from_env(env_var) {
        return Ok(Some(pass));
    }

    if !io::stdin().is_terminal() {
        debug!("${} not set and stdin is not a terminal", env_var);
        return Ok(None);
    }

    prompt_hidden(PROMPT)
}

/// Passphrase from the environment only; never prompts.
pub fn passphrase_from_env(env_var: &str) -> Option<Passphrase> {
    let pass = std::env::var(env_var).ok().and_then(Passphrase::new)?;
    debug!("Using passphrase from ${}", env_var);
    Some(pass)
}

struct RawModeGuard;

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// What one key press does to the prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptStep {
    Continue,
    Submit,
    Cancel,
}

/// Apply a key press to the hidden input buffer.
///
/// Raw mode swallows SIGINT, so Ctrl-C has to be turned into a cancel here.
fn apply_key(buf: &mut String, key: &KeyEvent) -> PromptStep {
    if key.kind != KeyEventKind::Press {
        return PromptStep::Continue;
    }
    match key.code {
        KeyCode::Enter => PromptStep::Submit,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => PromptStep::Cancel,
        KeyCode::Esc => PromptStep::Cancel,
        KeyCode::Backspace => {
            buf.pop();
            PromptStep::Continue
        }
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            buf.push(c);
            PromptStep::Continue
        }
        _ => PromptStep::Continue,
    }
}

fn prompt_hidden(prompt: &str) -> Result<Option<Passphrase>> {
    let mut stderr = io::stderr();
    write!(stderr, "{}", prompt)?;
    stderr.flush()?;

    let mut buf = Zeroizing::new(String::new());
    let step = {
        terminal::enable_raw_mode()?;
        let _guard = RawModeGuard;

        loop {
            let Event::Key(key) = event::read()? else {
                continue;
            };
            match apply_key(&mut buf, &key) {
                PromptStep::Continue => {}
                step => break step,
            }
        }
    };
    writeln!(stderr)?;

    if step == PromptStep::Cancel {
        return Err(ImportError::PromptCancelled.into());
    }
    Ok(Passphrase::new(std::mem::take(&mut *buf)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_passphrase_is_none() {
        assert!(Passphrase::new("").is_none());
        assert!(Passphrase::new(String::new()).is_none());
    }

    #[test]
    fn test_debug_never_prints_secret() {
        let pass = Passphrase::new("hunter2").unwrap();
        let shown = format!("{:?}", pass);
        assert!(!shown.contains("hunter2"));
        assert_eq!(pass.expose(), "hunter2");
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_keys(keys: &[KeyEvent]) -> (String, PromptStep) {
        let mut buf = String::new();
        for key in keys {
            match apply_key(&mut buf, key) {
                PromptStep::Continue => {}
                step => return (buf, step),
            }
        }
        (buf, PromptStep::Continue)
    }

    #[test]
    fn test_enter_submits_typed_passphrase() {
        let (buf, step) = type_keys(&[
            press(KeyCode::Char('p')),
            press(KeyCode::Char('w')),
            press(KeyCode::Enter),
        ]);
        assert_eq!(step, PromptStep::Submit);
        assert_eq!(buf, "pw");
    }

    #[test]
    fn test_blank_enter_skips_database() {
        let (buf, step) = type_keys(&[press(KeyCode::Enter)]);
        assert_eq!(step, PromptStep::Submit);
        assert!(Passphrase::new(buf).is_none());
    }

    #[test]
    fn test_backspace_removes_last_char() {
        let (buf, step) = type_keys(&[
            press(KeyCode::Char('a')),
            press(KeyCode::Char('b')),
            press(KeyCode::Backspace),
            press(KeyCode::Char('c')),
            press(KeyCode::Enter),
        ]);
        assert_eq!(step, PromptStep::Submit);
        assert_eq!(buf, "ac");

        let (buf, _) = type_keys(&[press(KeyCode::Backspace), press(KeyCode::Enter)]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_ctrl_c_and_esc_cancel() {
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        let (_, step) = type_keys(&[press(KeyCode::Char('x')), ctrl_c]);
        assert_eq!(step, PromptStep::Cancel);

        let (_, step) = type_keys(&[press(KeyCode::Esc)]);
        assert_eq!(step, PromptStep::Cancel);
    }

    #[test]
    fn test_key_releases_are_ignored() {
        let mut release = press(KeyCode::Enter);
        release.kind = KeyEventKind::Release;
        let mut buf = String::new();
        assert_eq!(apply_key(&mut buf, &release), PromptStep::Continue);
    }

    #[test]
    fn test_env_variable_takes_precedence() {
        let var = "FOLIO_TEST_PASSPHRASE_RESOLVE";
        std::env::set_var(var, "from-env");
        let pass = resolve_passphrase(var).unwrap().unwrap();
        assert_eq!(pass.expose(), "from-env");
        std::env::remove_var(var);
    }
}
