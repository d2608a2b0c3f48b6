use anyhow::{bail, Result};
use std::collections::VecDeque;

use super::{Console, Key};

/// Console fed from queued lines and keys, capturing everything written.
#[derive(Default)]
pub struct ScriptedConsole {
    lines: VecDeque<String>,
    keys: VecDeque<Key>,
    pub output: String,
    pub clears: usize,
    pub raw: bool,
}

impl ScriptedConsole {
    pub fn new<'a>(
        lines: impl IntoIterator<Item = &'a str>,
        keys: impl IntoIterator<Item = Key>,
    ) -> Self {
        Self {
            lines: lines.into_iter().map(str::to_string).collect(),
            keys: keys.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn typed(text: &str) -> impl Iterator<Item = Key> + '_ {
        text.chars().map(Key::Char)
    }

    pub fn count(&self, needle: &str) -> usize {
        self.output.matches(needle).count()
    }
}

impl Console for ScriptedConsole {
    fn read_line(&mut self) -> Result<Option<String>> {
        Ok(self.lines.pop_front())
    }

    fn read_key(&mut self) -> Result<Key> {
        match self.keys.pop_front() {
            Some(key) => Ok(key),
            None => bail!("key script exhausted"),
        }
    }

    fn write(&mut self, text: &str) -> Result<()> {
        self.output.push_str(text);
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.clears += 1;
        Ok(())
    }

    fn set_raw(&mut self, enabled: bool) -> Result<()> {
        self.raw = enabled;
        Ok(())
    }
}
