//! 8.3 short-name codec.

use heapless::String as HString;

use crate::error::{FsError, FsResult};

pub const SHORT_NAME_LEN: usize = 11;
pub const DOT_NAME: [u8; SHORT_NAME_LEN] = *b".          ";
pub const DOTDOT_NAME: [u8; SHORT_NAME_LEN] = *b"..         ";

/// First name byte of a deleted entry.
pub const NAME_DELETED: u8 = 0xE5;
/// First name byte of a never-used entry; nothing follows it.
pub const NAME_FREE: u8 = 0x00;
/// Stored in place of a real leading 0xE5.
pub const NAME_E5_ESCAPE: u8 = 0x05;

const NT_LOWER_BASE: u8 = 0x08;
const NT_LOWER_EXT: u8 = 0x10;

/// Longest display form: eight, a dot, three.
pub type DisplayName = HString<12>;

fn is_short_name_char(ch: char) -> bool {
    if ch.is_ascii_alphanumeric() {
        return true;
    }
    matches!(
        ch,
        '!' | '#' | '$' | '%' | '&' | '\'' | '(' | ')' | '-' | '@' | '^' | '_' | '`' | '{' | '}' | '~'
    )
}

/// Encodes one path segment into its space-padded, upper-cased on-disk
/// form.
pub fn encode_short_name(name: &str) -> FsResult<[u8; SHORT_NAME_LEN]> {
    match name {
        "." => return Ok(DOT_NAME),
        ".." => return Ok(DOTDOT_NAME),
        _ => {}
    }

    let (base, ext) = match name.rfind('.') {
        Some(idx) => (&name[..idx], &name[idx + 1..]),
        None => (name, ""),
    };
    if base.is_empty() || base.len() > 8 || ext.len() > 3 {
        return Err(FsError::InvalidName);
    }
    if name.ends_with('.') {
        return Err(FsError::InvalidName);
    }

    let mut out = [b' '; SHORT_NAME_LEN];
    for (i, ch) in base.chars().enumerate() {
        if !is_short_name_char(ch) {
            return Err(FsError::InvalidName);
        }
        out[i] = ch.to_ascii_uppercase() as u8;
    }
    for (i, ch) in ext.chars().enumerate() {
        if !is_short_name_char(ch) {
            return Err(FsError::InvalidName);
        }
        out[8 + i] = ch.to_ascii_uppercase() as u8;
    }
    Ok(out)
}

pub fn decode_short_name(raw: &[u8; SHORT_NAME_LEN], nt_res: u8) -> DisplayName {
    let mut name = DisplayName::new();
    if *raw == DOT_NAME || *raw == DOTDOT_NAME {
        let dots = if *raw == DOT_NAME { "." } else { ".." };
        let _ = name.push_str(dots);
        return name;
    }

    let push = |name: &mut DisplayName, bytes: &[u8], lower: bool| {
        for (i, &b) in bytes.iter().enumerate() {
            if b == b' ' {
                break;
            }
            let b = if i == 0 && b == NAME_E5_ESCAPE && bytes.len() == 8 { NAME_DELETED } else { b };
            let ch = if b.is_ascii() { b as char } else { '?' };
            let ch = if lower { ch.to_ascii_lowercase() } else { ch };
            let _ = name.push(ch);
        }
    };

    push(&mut name, &raw[0..8], nt_res & NT_LOWER_BASE != 0);
    if raw[8] != b' ' {
        let _ = name.push('.');
        push(&mut name, &raw[8..11], nt_res & NT_LOWER_EXT != 0);
    }
    name
}
