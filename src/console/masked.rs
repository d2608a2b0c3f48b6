use anyhow::{bail, Result};

use super::{Console, Key};

const MASK: &str = "*";
const ERASE: &str = "\u{8} \u{8}";

/// Reads a secret until Enter, echoing `*` per character. Backspace drops the
/// last character and erases one mask from the screen.
pub fn read_masked(console: &mut dyn Console) -> Result<String> {
    console.set_raw(true)?;
    let secret = collect(console);
    console.set_raw(false)?;
    console.write("\n")?;
    secret
}

fn collect(console: &mut dyn Console) -> Result<String> {
    let mut secret = String::new();

    loop {
        match console.read_key()? {
            Key::Enter => return Ok(secret),
            Key::Backspace => {
                if secret.pop().is_some() {
                    console.write(ERASE)?;
                }
            }
            Key::Char(ch) => {
                secret.push(ch);
                console.write(MASK)?;
            }
            Key::Interrupt => bail!("interrupted"),
            Key::Other => {}
        }
    }
}
