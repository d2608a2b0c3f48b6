use anyhow::{anyhow, Result};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::{
    cursor::MoveTo,
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, Clear, ClearType},
};
use std::io::{stdin, stdout, Write};

mod masked;
#[cfg(test)]
pub mod script;

pub use masked::read_masked;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Backspace,
    Enter,
    /// Ctrl+C while the terminal is in raw mode.
    Interrupt,
    Other,
}

/// Line and key oriented terminal access used by every interactive flow.
pub trait Console {
    /// Returns `None` once input is closed.
    fn read_line(&mut self) -> Result<Option<String>>;
    fn read_key(&mut self) -> Result<Key>;
    fn write(&mut self, text: &str) -> Result<()>;
    fn clear(&mut self) -> Result<()>;

    fn set_raw(&mut self, enabled: bool) -> Result<()> {
        let _ = enabled;
        Ok(())
    }

    fn say(&mut self, line: &str) -> Result<()> {
        self.write(line)?;
        self.write("\n")
    }
}

/// Reads a line where one is mandatory; closed input ends the current cycle.
pub fn require_line(console: &mut dyn Console) -> Result<String> {
    console.read_line()?.ok_or_else(|| anyhow!("input closed"))
}

struct RawGuard;

impl RawGuard {
    fn enable() -> Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// stdin/stdout console; single keys come from crossterm in raw mode.
#[derive(Default)]
pub struct StdConsole {
    raw: Option<RawGuard>,
}

fn key_from(code: KeyCode, mods: KeyModifiers) -> Key {
    match code {
        KeyCode::Enter => Key::Enter,
        KeyCode::Backspace => Key::Backspace,
        KeyCode::Char('c') if mods.contains(KeyModifiers::CONTROL) => Key::Interrupt,
        KeyCode::Char(ch) => Key::Char(ch),
        _ => Key::Other,
    }
}

impl Console for StdConsole {
    fn read_line(&mut self) -> Result<Option<String>> {
        let mut buf = String::new();
        if stdin().read_line(&mut buf)? == 0 {
            return Ok(None);
        }
        while buf.ends_with('\n') || buf.ends_with('\r') {
            buf.pop();
        }
        Ok(Some(buf))
    }

    fn read_key(&mut self) -> Result<Key> {
        let _guard = if self.raw.is_none() { Some(RawGuard::enable()?) } else { None };

        loop {
            if let Event::Key(k) = event::read()? {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                return Ok(key_from(k.code, k.modifiers));
            }
        }
    }

    fn write(&mut self, text: &str) -> Result<()> {
        let mut out = stdout();
        out.write_all(text.as_bytes())?;
        out.flush()?;
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        execute!(stdout(), Clear(ClearType::All), MoveTo(0, 0))?;
        Ok(())
    }

    fn set_raw(&mut self, enabled: bool) -> Result<()> {
        match (enabled, self.raw.is_some()) {
            (true, false) => self.raw = Some(RawGuard::enable()?),
            (false, true) => self.raw = None,
            _ => {}
        }
        Ok(())
    }
}
