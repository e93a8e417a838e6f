//! Key symbol table: conversion between key tokens and device key codes.
//!
//! Bytes in the printable ASCII range stand for themselves. Everything else
//! the keypad understands is a named key with a reserved code. The table uses
//! `0x20` for `SPACE`; the older `0x32` value is not recognised.

use std::{collections::HashMap, fmt::Display, str::FromStr};

use lazy_static::lazy_static;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use thiserror::Error;

pub const PRINTABLE_FIRST: u8 = 33;
pub const PRINTABLE_LAST: u8 = 126;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u8)]
pub enum KeyName {
    LeftCtrl = 0x80,
    LeftShift = 0x81,
    LeftAlt = 0x82,
    LeftGui = 0x83,
    RightCtrl = 0x84,
    RightShift = 0x85,
    RightAlt = 0x86,
    RightGui = 0x87,
    UpArrow = 0xDA,
    DownArrow = 0xD9,
    LeftArrow = 0xD8,
    RightArrow = 0xD7,
    Backspace = 0xB2,
    Tab = 0xB3,
    Return = 0xB0,
    Esc = 0xB1,
    Insert = 0xD1,
    Delete = 0xD4,
    PageUp = 0xD3,
    PageDown = 0xD6,
    Home = 0xD2,
    End = 0xD5,
    CapsLock = 0xC1,
    F1 = 0xC2,
    F2 = 0xC3,
    F3 = 0xC4,
    F4 = 0xC5,
    F5 = 0xC6,
    F6 = 0xC7,
    F7 = 0xC8,
    F8 = 0xC9,
    F9 = 0xCA,
    F10 = 0xCB,
    F11 = 0xCC,
    F12 = 0xCD,
    Space = 0x20,
}

impl KeyName {
    pub const ALL: [KeyName; 36] = [
        KeyName::LeftCtrl,
        KeyName::LeftShift,
        KeyName::LeftAlt,
        KeyName::LeftGui,
        KeyName::RightCtrl,
        KeyName::RightShift,
        KeyName::RightAlt,
        KeyName::RightGui,
        KeyName::UpArrow,
        KeyName::DownArrow,
        KeyName::LeftArrow,
        KeyName::RightArrow,
        KeyName::Backspace,
        KeyName::Tab,
        KeyName::Return,
        KeyName::Esc,
        KeyName::Insert,
        KeyName::Delete,
        KeyName::PageUp,
        KeyName::PageDown,
        KeyName::Home,
        KeyName::End,
        KeyName::CapsLock,
        KeyName::F1,
        KeyName::F2,
        KeyName::F3,
        KeyName::F4,
        KeyName::F5,
        KeyName::F6,
        KeyName::F7,
        KeyName::F8,
        KeyName::F9,
        KeyName::F10,
        KeyName::F11,
        KeyName::F12,
        KeyName::Space,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyName::LeftCtrl => "LEFT_CTRL",
            KeyName::LeftShift => "LEFT_SHIFT",
            KeyName::LeftAlt => "LEFT_ALT",
            KeyName::LeftGui => "LEFT_GUI",
            KeyName::RightCtrl => "RIGHT_CTRL",
            KeyName::RightShift => "RIGHT_SHIFT",
            KeyName::RightAlt => "RIGHT_ALT",
            KeyName::RightGui => "RIGHT_GUI",
            KeyName::UpArrow => "UP_ARROW",
            KeyName::DownArrow => "DOWN_ARROW",
            KeyName::LeftArrow => "LEFT_ARROW",
            KeyName::RightArrow => "RIGHT_ARROW",
            KeyName::Backspace => "BACKSPACE",
            KeyName::Tab => "TAB",
            KeyName::Return => "RETURN",
            KeyName::Esc => "ESC",
            KeyName::Insert => "INSERT",
            KeyName::Delete => "DELETE",
            KeyName::PageUp => "PAGE_UP",
            KeyName::PageDown => "PAGE_DOWN",
            KeyName::Home => "HOME",
            KeyName::End => "END",
            KeyName::CapsLock => "CAPS_LOCK",
            KeyName::F1 => "F1",
            KeyName::F2 => "F2",
            KeyName::F3 => "F3",
            KeyName::F4 => "F4",
            KeyName::F5 => "F5",
            KeyName::F6 => "F6",
            KeyName::F7 => "F7",
            KeyName::F8 => "F8",
            KeyName::F9 => "F9",
            KeyName::F10 => "F10",
            KeyName::F11 => "F11",
            KeyName::F12 => "F12",
            KeyName::Space => "SPACE",
        }
    }
}

impl Display for KeyName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_str().fmt(f)
    }
}

lazy_static! {
    static ref NAMES: HashMap<&'static str, KeyName> =
        KeyName::ALL.iter().map(|&name| (name.as_str(), name)).collect();
}

#[derive(Error, Debug, PartialEq)]
pub enum KeyError {
    #[error("unknown key name '{0}'")]
    UnknownName(String),
}

impl FromStr for KeyName {
    type Err = KeyError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        NAMES
            .get(input)
            .copied()
            .ok_or_else(|| KeyError::UnknownName(input.to_string()))
    }
}

/// One key fired by a switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySymbol {
    Printable(char),
    Named(KeyName),
}

impl Display for KeySymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySymbol::Printable(c) => c.fmt(f),
            KeySymbol::Named(name) => name.fmt(f),
        }
    }
}

pub fn is_printable(code: u8) -> bool {
    (PRINTABLE_FIRST..=PRINTABLE_LAST).contains(&code)
}

pub fn name_to_code(name: KeyName) -> u8 {
    name as u8
}

/// Printable bytes decode to themselves, other bytes through the named-key
/// table. Unknown bytes yield `None` and are dropped by callers.
pub fn code_to_symbol(code: u8) -> Option<KeySymbol> {
    if is_printable(code) {
        Some(KeySymbol::Printable(code as char))
    } else {
        KeyName::from_u8(code).map(KeySymbol::Named)
    }
}

pub fn char_to_code(c: char) -> Option<u8> {
    u8::try_from(c).ok().filter(|&code| is_printable(code))
}

pub fn code_to_char(code: u8) -> Option<char> {
    if is_printable(code) {
        Some(code as char)
    } else {
        None
    }
}

/// Resolves one whitespace-separated token the way the keypad editor does:
/// multi-character tokens are key names, single characters must be printable.
pub fn token_to_code(token: &str) -> Option<u8> {
    let mut chars = token.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => char_to_code(c),
        (Some(_), Some(_)) => token.parse::<KeyName>().ok().map(name_to_code),
        (None, _) => None,
    }
}
