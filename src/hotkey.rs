use std::fmt;
use std::str::FromStr;

use anyhow::{Error, Result, bail};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

const TRACKED_MODIFIERS: KeyModifiers = KeyModifiers::CONTROL
    .union(KeyModifiers::ALT)
    .union(KeyModifiers::SHIFT)
    .union(KeyModifiers::SUPER);

/// A global key combination such as `ctrl+p`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hotkey {
    code: KeyCode,
    modifiers: KeyModifiers,
}

impl Hotkey {
    pub fn new(code: KeyCode, modifiers: KeyModifiers) -> Self {
        let (code, modifiers) = normalize(code, modifiers);
        Self { code, modifiers }
    }

    pub fn matches(&self, key: &KeyEvent) -> bool {
        let (code, modifiers) = normalize(key.code, key.modifiers);
        code == self.code && modifiers == self.modifiers
    }
}

impl Default for Hotkey {
    fn default() -> Self {
        Self::new(KeyCode::Char('p'), KeyModifiers::CONTROL)
    }
}

// Terminals report `ctrl+shift+p` as either `P` or `p` + SHIFT; fold both into the latter.
fn normalize(code: KeyCode, modifiers: KeyModifiers) -> (KeyCode, KeyModifiers) {
    let mut modifiers = modifiers & TRACKED_MODIFIERS;
    let code = match code {
        KeyCode::Char(ch) if ch.is_uppercase() => {
            modifiers |= KeyModifiers::SHIFT;
            KeyCode::Char(ch.to_lowercase().next().unwrap_or(ch))
        }
        KeyCode::BackTab => {
            modifiers |= KeyModifiers::SHIFT;
            KeyCode::Tab
        }
        other => other,
    };
    (code, modifiers)
}

impl FromStr for Hotkey {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        let mut modifiers = KeyModifiers::NONE;
        let mut code = None;

        for token in raw.split('+').map(str::trim) {
            if token.is_empty() {
                bail!("invalid hotkey '{raw}': empty key");
            }
            let lower = token.to_ascii_lowercase();
            match lower.as_str() {
                "ctrl" | "control" => modifiers |= KeyModifiers::CONTROL,
                "alt" | "option" => modifiers |= KeyModifiers::ALT,
                "shift" => modifiers |= KeyModifiers::SHIFT,
                "super" | "cmd" => modifiers |= KeyModifiers::SUPER,
                _ => {
                    if code.is_some() {
                        bail!("invalid hotkey '{raw}': more than one key");
                    }
                    code = Some(parse_key_code(&lower, raw)?);
                }
            }
        }

        let Some(code) = code else {
            bail!("invalid hotkey '{raw}': missing key");
        };
        let hotkey = Self::new(code, modifiers);
        if hotkey.is_editing_key() {
            bail!("invalid hotkey '{raw}': the query editor uses this key; add ctrl, alt or super");
        }
        Ok(hotkey)
    }
}

impl Hotkey {
    // Keys the open palette types or navigates with. Shift alone still types.
    fn is_editing_key(&self) -> bool {
        let chorded = self
            .modifiers
            .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER);
        !chorded
            && matches!(
                self.code,
                KeyCode::Char(_)
                    | KeyCode::Enter
                    | KeyCode::Tab
                    | KeyCode::Backspace
                    | KeyCode::Delete
                    | KeyCode::Home
                    | KeyCode::End
                    | KeyCode::Up
                    | KeyCode::Down
                    | KeyCode::Left
                    | KeyCode::Right
            )
    }
}

fn parse_key_code(token: &str, raw: &str) -> Result<KeyCode> {
    let code = match token {
        "space" => KeyCode::Char(' '),
        "enter" | "return" => KeyCode::Enter,
        "esc" | "escape" => KeyCode::Esc,
        "tab" => KeyCode::Tab,
        "backspace" => KeyCode::Backspace,
        "delete" | "del" => KeyCode::Delete,
        "insert" => KeyCode::Insert,
        "home" => KeyCode::Home,
        "end" => KeyCode::End,
        "pageup" => KeyCode::PageUp,
        "pagedown" => KeyCode::PageDown,
        "up" => KeyCode::Up,
        "down" => KeyCode::Down,
        "left" => KeyCode::Left,
        "right" => KeyCode::Right,
        _ => {
            let mut chars = token.chars();
            match (chars.next(), chars.next()) {
                (Some(ch), None) => KeyCode::Char(ch),
                (Some('f'), Some(_)) => match token[1..].parse::<u8>() {
                    Ok(n) if (1..=24).contains(&n) => KeyCode::F(n),
                    _ => bail!("invalid hotkey '{raw}': unknown key '{token}'"),
                },
                _ => bail!("invalid hotkey '{raw}': unknown key '{token}'"),
            }
        }
    };
    Ok(code)
}

impl fmt::Display for Hotkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (flag, label) in [
            (KeyModifiers::CONTROL, "ctrl"),
            (KeyModifiers::ALT, "alt"),
            (KeyModifiers::SHIFT, "shift"),
            (KeyModifiers::SUPER, "super"),
        ] {
            if self.modifiers.contains(flag) {
                write!(f, "{label}+")?;
            }
        }

        match self.code {
            KeyCode::Char(' ') => f.write_str("space"),
            KeyCode::Char(ch) => write!(f, "{ch}"),
            KeyCode::F(n) => write!(f, "f{n}"),
            KeyCode::Enter => f.write_str("enter"),
            KeyCode::Esc => f.write_str("esc"),
            KeyCode::Tab => f.write_str("tab"),
            KeyCode::Backspace => f.write_str("backspace"),
            KeyCode::Delete => f.write_str("delete"),
            KeyCode::Insert => f.write_str("insert"),
            KeyCode::Home => f.write_str("home"),
            KeyCode::End => f.write_str("end"),
            KeyCode::PageUp => f.write_str("pageup"),
            KeyCode::PageDown => f.write_str("pagedown"),
            KeyCode::Up => f.write_str("up"),
            KeyCode::Down => f.write_str("down"),
            KeyCode::Left => f.write_str("left"),
            KeyCode::Right => f.write_str("right"),
            other => write!(f, "{other:?}"),
        }
    }
}
