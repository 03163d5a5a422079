// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// ASCII armor (RFC 4880 §6.2 layout) for signatures and key material.
//
//   -----BEGIN <LABEL>-----
//   Key: Value            (optional armor headers)
//                         (blank line)
//   <base64, wrapped>
//   =<base64 CRC-24>
//   -----END <LABEL>-----

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use mailseal_core::error::{MailsealError, Result};

/// Base64 body line width.
pub const LINE_WIDTH: usize = 75;

const CRC24_INIT: u32 = 0x00B7_04CE;
const CRC24_POLY: u32 = 0x0186_4CFB;

/// Decoded armor block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Armored {
    pub label: String,
    pub headers: Vec<(String, String)>,
    pub data: Vec<u8>,
}

impl Armored {
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// Armor `data` under `label` with optional headers.
pub fn enarmor(data: &[u8], label: &str, headers: &[(&str, &str)]) -> String {
    let encoded = STANDARD.encode(data);
    let mut out = format!("-----BEGIN {label}-----\n");
    for (key, value) in headers {
        out.push_str(key);
        out.push_str(": ");
        out.push_str(value);
        out.push('\n');
    }
    out.push('\n');

    let bytes = encoded.as_bytes();
    for line in bytes.chunks(LINE_WIDTH) {
        // base64 output is ASCII, so every chunk boundary is a char boundary.
        out.push_str(std::str::from_utf8(line).unwrap_or_default());
        out.push('\n');
    }

    let crc = crc24(data).to_be_bytes();
    out.push('=');
    out.push_str(&STANDARD.encode(&crc[1..]));
    out.push('\n');
    out.push_str(&format!("-----END {label}-----\n"));
    out
}

/// Parse the first armor block found in `text`.
pub fn dearmor(text: &str) -> Result<Armored> {
    let mut lines = text.lines().map(|l| l.trim_end_matches('\r'));

    let label = lines
        .by_ref()
        .find_map(|l| {
            l.trim()
                .strip_prefix("-----BEGIN ")
                .and_then(|rest| rest.strip_suffix("-----"))
        })
        .ok_or_else(|| MailsealError::Armor("no BEGIN line".into()))?
        .to_owned();

    let mut headers = Vec::new();
    let mut body = String::new();
    let mut checksum: Option<String> = None;
    let mut in_headers = true;
    let mut ended = false;

    for line in lines {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("-----END ") {
            if rest.strip_suffix("-----") != Some(label.as_str()) {
                return Err(MailsealError::Armor(format!("END line does not match {label}")));
            }
            ended = true;
            break;
        }
        if in_headers {
            if line.is_empty() {
                in_headers = false;
                continue;
            }
            if let Some((key, value)) = line.split_once(": ") {
                headers.push((key.to_owned(), value.to_owned()));
                continue;
            }
            // No header section: this is already body.
            in_headers = false;
        }
        // A wrapped body can leave bare padding ("=", "==") on its own line;
        // only "=" plus four characters is the checksum.
        if let Some(crc) = line.strip_prefix('=').filter(|crc| crc.len() == 4) {
            checksum = Some(crc.to_owned());
        } else {
            body.push_str(line);
        }
    }

    if !ended {
        return Err(MailsealError::Armor(format!("missing END line for {label}")));
    }

    let data = STANDARD
        .decode(body.as_bytes())
        .map_err(|e| MailsealError::Armor(format!("base64: {e}")))?;

    if let Some(crc) = checksum {
        let expected = STANDARD
            .decode(crc.as_bytes())
            .map_err(|e| MailsealError::Armor(format!("checksum base64: {e}")))?;
        let actual = crc24(&data).to_be_bytes();
        if expected.as_slice() != &actual[1..] {
            return Err(MailsealError::Armor("CRC-24 mismatch".into()));
        }
    }

    Ok(Armored {
        label,
        headers,
        data,
    })
}

/// Whether `text` starts with an armored encrypted-message block.
pub fn is_armored_message(text: &str) -> bool {
    let Some(first) = text.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return false;
    };
    let Some(label) = first
        .strip_prefix("-----BEGIN ")
        .and_then(|rest| rest.strip_suffix("-----"))
    else {
        return false;
    };
    !label.contains("SIGNED") && (label.contains("MESSAGE") || label.contains("ENCRYPTED"))
}

/// OpenPGP CRC-24.
pub fn crc24(data: &[u8]) -> u32 {
    let mut crc = CRC24_INIT;
    for &byte in data {
        crc ^= u32::from(byte) << 16;
        for _ in 0..8 {
            crc <<= 1;
            if crc & 0x0100_0000 != 0 {
                crc ^= CRC24_POLY;
            }
        }
    }
    crc & 0x00FF_FFFF
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc24_of_empty_is_init() {
        assert_eq!(crc24(b""), CRC24_INIT);
    }

    #[test]
    fn enarmor_layout() {
        let text = enarmor(&[0u8; 120], "PGP SIGNATURE", &[("Version", "mailseal")]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "-----BEGIN PGP SIGNATURE-----");
        assert_eq!(lines[1], "Version: mailseal");
        assert_eq!(lines[2], "");
        assert!(lines.iter().all(|l| l.len() <= LINE_WIDTH));
        assert!(lines[lines.len() - 2].starts_with('='));
        assert_eq!(lines[lines.len() - 1], "-----END PGP SIGNATURE-----");
    }

    #[test]
    fn dearmor_recovers_data_and_headers() {
        let data: Vec<u8> = (0..=255).collect();
        let text = enarmor(&data, "SIGNING PRIVATE KEY", &[("Identity", "Site <site@example.org>")]);
        let parsed = dearmor(&format!("leading noise\n{text}trailing")).unwrap();

        assert_eq!(parsed.label, "SIGNING PRIVATE KEY");
        assert_eq!(parsed.header("identity"), Some("Site <site@example.org>"));
        assert_eq!(parsed.data, data);
    }

    #[test]
    fn padding_on_its_own_line_survives() {
        // 56 bytes encode to 76 base64 characters, the last being '='.
        let data = [7u8; 56];
        let text = enarmor(&data, "PGP SIGNATURE", &[]);
        assert!(text.lines().any(|l| l == "="));
        assert_eq!(dearmor(&text).unwrap().data, data);
    }

    #[test]
    fn dearmor_detects_corruption() {
        let text = enarmor(b"hello world", "PGP SIGNATURE", &[]);
        let tampered = text.replacen("aGVsbG8", "aGVsbG9", 1);
        assert!(matches!(dearmor(&tampered), Err(MailsealError::Armor(_))));
    }

    #[test]
    fn dearmor_requires_matching_end() {
        let text = "-----BEGIN A-----\n\nAAAA\n-----END B-----\n";
        assert!(dearmor(text).is_err());
        assert!(dearmor("no armor here").is_err());
    }

    #[test]
    fn detects_encrypted_blocks_only() {
        assert!(is_armored_message("-----BEGIN PGP MESSAGE-----\n\nAAAA"));
        assert!(is_armored_message("\n-----BEGIN AGE ENCRYPTED FILE-----\n"));
        assert!(!is_armored_message("-----BEGIN PGP SIGNED MESSAGE-----\nHash: SHA256"));
        assert!(!is_armored_message("Hello"));
        assert!(!is_armored_message(""));
    }
}
