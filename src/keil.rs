//! Keil C51 chip definition files.
//!
//! The parameters a dump needs (flash size, family) are in the `*.opt` / `*.gpt` files shipped
//! in the `UV4` folder of Keil C51.  Those files are lightly scrambled: after a fixed version
//! header every byte has a key subtracted and is then xored with a second key, and both keys are
//! spelled as hex digits at the end of the file name.
use alloc::vec::Vec;

const HEADER: &[u8] = b"[Version]\r\n3.00\r\n";

/// Decrypt a definition file.  `file_name` must end with the four character extension, e.g.
/// `SH68F88A7z.opt`.  Returns `None` if the data isn't a scrambled definition file.
pub fn decrypt_definition(file_name: &str, data: &[u8]) -> Option<Vec<u8>> {
    let body = data.strip_prefix(HEADER)?;

    let name = file_name.as_bytes();
    let key1 = parse_key(name, 6);
    let key2 = parse_key(name, 8);

    let plain: Vec<u8> = body.iter().map(|c| c.wrapping_sub(key1) ^ key2).collect();
    if plain.starts_with(b"[ChipName]") || plain.starts_with(b"[Version]") {
        Some(plain)
    } else {
        None
    }
}

// Two characters ending `from_end - 2` bytes before the end of the name, as hex.  Trailing
// letters past 'f' are ignored and anything unparseable is zero.
fn parse_key(name: &[u8], from_end: usize) -> u8 {
    let end = name.len().saturating_sub(from_end - 2);
    let start = name.len().saturating_sub(from_end);
    let mut digits = &name[start..end];
    while let [rest @ .., last] = digits {
        if last.is_ascii_alphabetic() && !last.is_ascii_hexdigit() {
            digits = rest;
        } else {
            break;
        }
    }

    if digits.is_empty() {
        return 0;
    }
    digits.iter().try_fold(0u8, |acc, d| {
        let v = (*d as char).to_digit(16)?;
        Some(acc << 4 | v as u8)
    }).unwrap_or(0)
}

/// Look up `key` in `[section]` of a decrypted definition
pub fn lookup<'a>(text: &'a str, section: &str, key: &str) -> Option<&'a str> {
    let mut current = "";
    for line in text.lines() {
        let line = line.trim();
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            current = name;
        } else if current == section {
            if let Some((k, v)) = line.split_once('=') {
                if k.trim() == key {
                    return Some(v.trim());
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scramble(plain: &[u8], key1: u8, key2: u8) -> Vec<u8> {
        let mut out = HEADER.to_vec();
        out.extend(plain.iter().map(|c| (c ^ key2).wrapping_add(key1)));
        out
    }

    #[test]
    fn keys_from_name() {
        assert_eq!(parse_key(b"SH79F1612A5C.opt", 6), 0x5C);
        assert_eq!(parse_key(b"SH79F1612A5C.opt", 8), 0x2A);
        // 'z' is stripped
        assert_eq!(parse_key(b"CHIP7z.gpt", 6), 0x07);
        // not hex at all
        assert_eq!(parse_key(b"CHIPzq.gpt", 6), 0x00);
        assert_eq!(parse_key(b".opt", 8), 0x00);
    }

    #[test]
    fn decrypts() {
        let plain = b"[ChipName]\r\nName=SH68F881\r\n";
        let data = scramble(plain, 0x5C, 0x2A);
        assert_eq!(decrypt_definition("SH79F1612A5C.opt", &data).as_deref(), Some(&plain[..]));
    }

    #[test]
    fn wrong_keys_are_rejected() {
        let data = scramble(b"[ChipName]\r\n", 0x5C, 0x2A);
        assert_eq!(decrypt_definition("SH79F16100.opt", &data), None);
    }

    #[test]
    fn plain_files_are_rejected() {
        assert_eq!(decrypt_definition("X.opt", b"[ChipName]\r\n"), None);
    }

    #[test]
    fn lookup_in_section() {
        let text = "[ChipName]\r\nName=SH68F881\r\n[Memory]\r\nName = code\r\nSize=0x8000\r\n";
        assert_eq!(lookup(text, "Memory", "Size"), Some("0x8000"));
        assert_eq!(lookup(text, "Memory", "Name"), Some("code"));
        assert_eq!(lookup(text, "ChipName", "Name"), Some("SH68F881"));
        assert_eq!(lookup(text, "ChipName", "Size"), None);
    }
}
