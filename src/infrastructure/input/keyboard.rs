use evdev::Key;
use serde::{Deserialize, Serialize};

/// Keys the virtual keyboard can press
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyCode {
    Num0,
    Num1,
    Num2,
    Num3,
    Num4,
    Num5,
    Num6,
    Num7,
    Num8,
    Num9,
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
    K,
    L,
    M,
    N,
    O,
    P,
    Q,
    R,
    S,
    T,
    U,
    V,
    W,
    X,
    Y,
    Z,
    Space,
    Enter,
    Escape,
    Backspace,
    Tab,
    Minus,
    Equal,
    Comma,
    Dot,
    Slash,
    Semicolon,
    Apostrophe,
    LeftShift,
    LeftCtrl,
    LeftAlt,
    Back,
    Home,
    Other(u16),
}

impl KeyCode {
    /// Linux input key
    pub fn key(&self) -> Key {
        match self {
            Self::Num0 => Key::KEY_0,
            Self::Num1 => Key::KEY_1,
            Self::Num2 => Key::KEY_2,
            Self::Num3 => Key::KEY_3,
            Self::Num4 => Key::KEY_4,
            Self::Num5 => Key::KEY_5,
            Self::Num6 => Key::KEY_6,
            Self::Num7 => Key::KEY_7,
            Self::Num8 => Key::KEY_8,
            Self::Num9 => Key::KEY_9,
            Self::A => Key::KEY_A,
            Self::B => Key::KEY_B,
            Self::C => Key::KEY_C,
            Self::D => Key::KEY_D,
            Self::E => Key::KEY_E,
            Self::F => Key::KEY_F,
            Self::G => Key::KEY_G,
            Self::H => Key::KEY_H,
            Self::I => Key::KEY_I,
            Self::J => Key::KEY_J,
            Self::K => Key::KEY_K,
            Self::L => Key::KEY_L,
            Self::M => Key::KEY_M,
            Self::N => Key::KEY_N,
            Self::O => Key::KEY_O,
            Self::P => Key::KEY_P,
            Self::Q => Key::KEY_Q,
            Self::R => Key::KEY_R,
            Self::S => Key::KEY_S,
            Self::T => Key::KEY_T,
            Self::U => Key::KEY_U,
            Self::V => Key::KEY_V,
            Self::W => Key::KEY_W,
            Self::X => Key::KEY_X,
            Self::Y => Key::KEY_Y,
            Self::Z => Key::KEY_Z,
            Self::Space => Key::KEY_SPACE,
            Self::Enter => Key::KEY_ENTER,
            Self::Escape => Key::KEY_ESC,
            Self::Backspace => Key::KEY_BACKSPACE,
            Self::Tab => Key::KEY_TAB,
            Self::Minus => Key::KEY_MINUS,
            Self::Equal => Key::KEY_EQUAL,
            Self::Comma => Key::KEY_COMMA,
            Self::Dot => Key::KEY_DOT,
            Self::Slash => Key::KEY_SLASH,
            Self::Semicolon => Key::KEY_SEMICOLON,
            Self::Apostrophe => Key::KEY_APOSTROPHE,
            Self::LeftShift => Key::KEY_LEFTSHIFT,
            Self::LeftCtrl => Key::KEY_LEFTCTRL,
            Self::LeftAlt => Key::KEY_LEFTALT,
            Self::Back => Key::KEY_BACK,
            Self::Home => Key::KEY_HOMEPAGE,
            Self::Other(code) => Key::new(*code),
        }
    }

    pub fn evdev_code(&self) -> u16 {
        self.key().code()
    }

    /// Key and shift state needed to type `c`, if it is typeable.
    pub fn from_char(c: char) -> Option<(KeyCode, bool)> {
        const LETTERS: [KeyCode; 26] = [
            KeyCode::A,
            KeyCode::B,
            KeyCode::C,
            KeyCode::D,
            KeyCode::E,
            KeyCode::F,
            KeyCode::G,
            KeyCode::H,
            KeyCode::I,
            KeyCode::J,
            KeyCode::K,
            KeyCode::L,
            KeyCode::M,
            KeyCode::N,
            KeyCode::O,
            KeyCode::P,
            KeyCode::Q,
            KeyCode::R,
            KeyCode::S,
            KeyCode::T,
            KeyCode::U,
            KeyCode::V,
            KeyCode::W,
            KeyCode::X,
            KeyCode::Y,
            KeyCode::Z,
        ];
        const DIGITS: [KeyCode; 10] = [
            KeyCode::Num0,
            KeyCode::Num1,
            KeyCode::Num2,
            KeyCode::Num3,
            KeyCode::Num4,
            KeyCode::Num5,
            KeyCode::Num6,
            KeyCode::Num7,
            KeyCode::Num8,
            KeyCode::Num9,
        ];

        let key = match c {
            'a'..='z' => (LETTERS[(c as u8 - b'a') as usize], false),
            'A'..='Z' => (LETTERS[(c as u8 - b'A') as usize], true),
            '0'..='9' => (DIGITS[(c as u8 - b'0') as usize], false),
            ' ' => (KeyCode::Space, false),
            '\n' => (KeyCode::Enter, false),
            '\t' => (KeyCode::Tab, false),
            '-' => (KeyCode::Minus, false),
            '_' => (KeyCode::Minus, true),
            '=' => (KeyCode::Equal, false),
            '+' => (KeyCode::Equal, true),
            ',' => (KeyCode::Comma, false),
            '.' => (KeyCode::Dot, false),
            '/' => (KeyCode::Slash, false),
            '?' => (KeyCode::Slash, true),
            ';' => (KeyCode::Semicolon, false),
            ':' => (KeyCode::Semicolon, true),
            '\'' => (KeyCode::Apostrophe, false),
            '"' => (KeyCode::Apostrophe, true),
            '!' => (KeyCode::Num1, true),
            '@' => (KeyCode::Num2, true),
            '#' => (KeyCode::Num3, true),
            _ => return None,
        };
        Some(key)
    }
}
