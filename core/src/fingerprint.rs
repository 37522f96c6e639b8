//! Failure fingerprints: a stable digest of (exit code, stderr tail) that is
//! insensitive to run-specific noise such as timestamps, ids and paths.

use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};

/// Number of trailing non-empty stderr lines that participate.
pub const TAIL_LINES: usize = 50;

lazy_static! {
    static ref ISO_TIMESTAMP: Regex = Regex::new(
        r"\[?\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}(?::\d{2})?(?:[.,]\d+)?(?:Z|[+-]\d{2}:?\d{2})?\]?"
    )
    .expect("ISO_TIMESTAMP is valid");
    static ref BRACKETED_TIMESTAMP: Regex =
        Regex::new(r"\[\d{1,4}[-/.]\d{1,2}[-/.]\d{1,4}[^\]]*\]")
            .expect("BRACKETED_TIMESTAMP is valid");
    static ref CLOCK_TIME: Regex =
        Regex::new(r"\b\d{1,2}:\d{2}:\d{2}(?:[.,]\d+)?\b").expect("CLOCK_TIME is valid");
    static ref GUID: Regex = Regex::new(
        r"(?i)\{?\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b\}?"
    )
    .expect("GUID is valid");
    static ref HEX_ADDRESS: Regex =
        Regex::new(r"(?i)\b0x[0-9a-f]{6,16}\b").expect("HEX_ADDRESS is valid");
    static ref WINDOWS_HOME: Regex =
        Regex::new(r"(?i)\b[a-z]:\\(?:users|documents and settings)\\[^\\\s]+")
            .expect("WINDOWS_HOME is valid");
    static ref UNIX_HOME: Regex =
        Regex::new(r"(?:/home|/Users)/[^/\s]+|/root\b").expect("UNIX_HOME is valid");
    // `:<line>[:<col>]` only directly after a file extension, e.g. `main.rs:88:13`.
    static ref LINE_COLUMN: Regex =
        Regex::new(r"(\.[A-Za-z0-9]+):\d+(?::\d+)?\b").expect("LINE_COLUMN is valid");
    static ref LINE_WORD: Regex = Regex::new(r"(?i)\bline \d+\b").expect("LINE_WORD is valid");
    static ref PROCESS_ID: Regex =
        Regex::new(r"(?i)\bpid[\s:=#]*\d+").expect("PROCESS_ID is valid");
    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("WHITESPACE is valid");
}

/// Lowercase hex SHA-256 of `exit:<code or -1>\n` followed by the normalized
/// stderr tail.
pub fn fingerprint(exit_code: Option<i32>, stderr: &str) -> String {
    let mut material = format!("exit:{}\n", exit_code.unwrap_or(-1));
    material.push_str(&normalize_stderr(stderr));
    format!("{:x}", Sha256::digest(material.as_bytes()))
}

/// Last [`TAIL_LINES`] non-empty lines, each normalized, joined with `\n`.
pub fn normalize_stderr(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(TAIL_LINES);
    lines[start..]
        .iter()
        .map(|l| normalize_line(l))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn normalize_line(line: &str) -> String {
    let s = ISO_TIMESTAMP.replace_all(line, "<TS>");
    let s = BRACKETED_TIMESTAMP.replace_all(&s, "<TS>");
    let s = CLOCK_TIME.replace_all(&s, "<TS>");
    let s = GUID.replace_all(&s, "<GUID>");
    let s = HEX_ADDRESS.replace_all(&s, "<ADDR>");
    let s = WINDOWS_HOME.replace_all(&s, "<HOME>");
    let s = UNIX_HOME.replace_all(&s, "<HOME>");
    let s = LINE_COLUMN.replace_all(&s, "${1}:<N>");
    let s = LINE_WORD.replace_all(&s, "line <N>");
    let s = PROCESS_ID.replace_all(&s, "pid <PID>");
    let s = WHITESPACE.replace_all(&s, " ");
    s.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const RUN_ONE: &str = "\
2024-01-05T10:22:33.123Z ERROR [pid 4412] failed to open /home/alice/app/config.yaml
  at 0x7ffde4a1b2c0 in loader
  File \"/home/alice/app/main.py\", line 42, in <module>
  request 3f2b8c1e-9a0d-4e6f-8b7a-1c2d3e4f5a6b rejected at main.rs:88:13
";

    const RUN_TWO: &str = "\
2025-03-01 08:00:01 ERROR [pid 99] failed to open /home/bob/app/config.yaml

  at 0x00007ffde4a1ffff in loader
  File \"/home/bob/app/main.py\", line 97, in <module>
  request 0A1B2C3D-4E5F-6A7B-8C9D-0E1F2A3B4C5D rejected at main.rs:120:4
";

    #[test]
    fn same_failure_with_different_noise_matches() {
        assert_eq!(fingerprint(Some(1), RUN_ONE), fingerprint(Some(1), RUN_TWO));
    }

    #[test]
    fn exit_code_participates() {
        assert_ne!(fingerprint(Some(0), RUN_ONE), fingerprint(Some(2), RUN_ONE));
        assert_ne!(fingerprint(None, RUN_ONE), fingerprint(Some(1), RUN_ONE));
        assert_eq!(fingerprint(None, RUN_ONE), fingerprint(Some(-1), RUN_ONE));
    }

    #[test]
    fn different_messages_differ() {
        assert_ne!(
            fingerprint(Some(1), "error: disk full"),
            fingerprint(Some(1), "error: permission denied")
        );
    }

    #[test]
    fn digest_is_lowercase_hex_sha256() {
        let fp = fingerprint(Some(3), "boom");
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        // sha256("exit:3\nboom")
        assert_eq!(
            fp,
            format!("{:x}", Sha256::digest(b"exit:3\nboom"))
        );
    }

    #[test]
    fn normalizes_each_noise_class() {
        assert_eq!(
            normalize_line("[2024-01-05 10:22:33,001] warn   took 12:01:02.5"),
            "<TS> warn took <TS>"
        );
        assert_eq!(
            normalize_line("C:\\Users\\alice\\src\\lib.rs:10:2 PID=77"),
            "<HOME>\\src\\lib.rs:<N> pid <PID>"
        );
        assert_eq!(normalize_line("  at 0xDEADBEEF  "), "at <ADDR>");
    }

    #[test]
    fn only_tail_lines_participate() {
        let mut head = String::from("unique head line that scrolls away\n");
        let mut other = String::from("a completely different head\n");
        for i in 0..TAIL_LINES {
            let line = format!("frame {i} ok\n");
            head.push_str(&line);
            other.push_str(&line);
        }
        assert_eq!(fingerprint(Some(1), &head), fingerprint(Some(1), &other));
    }

    #[test]
    fn blank_lines_are_ignored() {
        assert_eq!(
            fingerprint(Some(1), "a\n\n   \nb\n"),
            fingerprint(Some(1), "a\nb")
        );
    }

    #[test]
    fn numbers_after_a_colon_outside_file_positions_are_kept() {
        assert_ne!(
            fingerprint(Some(1), "request failed status:404"),
            fingerprint(Some(1), "request failed status:500")
        );
        assert_ne!(
            fingerprint(Some(1), "cannot bind port :8080"),
            fingerprint(Some(1), "cannot bind port :9090")
        );
        assert_eq!(normalize_line("status:404 at api.py:17"), "status:404 at api.py:<N>");
    }
}
