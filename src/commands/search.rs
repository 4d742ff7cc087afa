//! Search commands (KEYS)

use super::{Command, CommandContext, CommandError};
use crate::protocol::RespValue;
use bytes::Bytes;

/// KEYS command - Find all keys matching a pattern
///
/// Syntax: KEYS pattern
///
/// Supported patterns:
/// - `*` matches any sequence, `?` any single byte
/// - `[abc]`, `[a-z]` and `[^a]` match byte classes
/// - `\` escapes the next byte
pub struct KeysCommand;

impl Command for KeysCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let pattern = &args[0];
        let matching = ctx
            .db()
            .keys()
            .into_iter()
            .filter(|key| glob_match(pattern, key));
        Ok(RespValue::bulk_array(matching))
    }

    fn name(&self) -> &'static str {
        "KEYS"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
}

/// Glob-style match of a whole byte string
pub fn glob_match(pattern: &[u8], string: &[u8]) -> bool {
    let (mut p, mut s) = (0, 0);
    while p < pattern.len() {
        match pattern[p] {
            b'*' => {
                while p + 1 < pattern.len() && pattern[p + 1] == b'*' {
                    p += 1;
                }
                if p + 1 == pattern.len() {
                    return true;
                }
                return (s..=string.len()).any(|start| glob_match(&pattern[p + 1..], &string[start..]));
            }
            b'?' => {
                if s >= string.len() {
                    return false;
                }
                s += 1;
            }
            b'[' => {
                let byte = match string.get(s) {
                    Some(b) => *b,
                    None => return false,
                };
                let (matched, next) = match_class(pattern, p + 1, byte);
                if !matched {
                    return false;
                }
                p = next;
                s += 1;
            }
            b'\\' if p + 1 < pattern.len() => {
                p += 1;
                if string.get(s) != Some(&pattern[p]) {
                    return false;
                }
                s += 1;
            }
            literal => {
                if string.get(s) != Some(&literal) {
                    return false;
                }
                s += 1;
            }
        }
        p += 1;
    }
    s == string.len()
}

/// Match `byte` against the class starting at `p` (just after `[`).
///
/// Returns whether it matched and the index of the closing `]` (or the last
/// pattern byte when the class is unterminated).
fn match_class(pattern: &[u8], mut p: usize, byte: u8) -> (bool, usize) {
    let negate = pattern.get(p) == Some(&b'^');
    if negate {
        p += 1;
    }

    let mut matched = false;
    while p < pattern.len() && pattern[p] != b']' {
        if pattern[p] == b'\\' && p + 1 < pattern.len() {
            p += 1;
            matched |= pattern[p] == byte;
        } else if p + 2 < pattern.len() && pattern[p + 1] == b'-' && pattern[p + 2] != b']' {
            let (lo, hi) = (pattern[p].min(pattern[p + 2]), pattern[p].max(pattern[p + 2]));
            matched |= (lo..=hi).contains(&byte);
            p += 2;
        } else {
            matched |= pattern[p] == byte;
        }
        p += 1;
    }

    let end = p.min(pattern.len().saturating_sub(1));
    (matched != negate, end)
}
