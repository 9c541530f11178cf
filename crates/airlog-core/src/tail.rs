//! Bounded-memory extraction of the most recent lines of a large log
//!
//! The reader walks the file backwards in fixed-size blocks and never holds
//! more than one block plus the lines it is about to return, so serving the
//! last few hundred readings of a multi-gigabyte log costs the same as
//! serving them from a small one.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use log::debug;

use crate::error::{Error, Result};

/// Default block size for backward scans (32 KiB)
pub const DEFAULT_BLOCK_SIZE: usize = 32 * 1024;

const NEW_LINE: u8 = b'\n';

/// Read the last `limit` non-empty lines of the file at `path`, oldest first.
///
/// The file handle is dropped on every exit path, including read errors.
pub fn read_last_lines(path: impl AsRef<Path>, limit: usize) -> Result<Vec<String>> {
    read_last_lines_with_block(path, limit, DEFAULT_BLOCK_SIZE)
}

/// Same as [`read_last_lines`] with an explicit block size
pub fn read_last_lines_with_block(
    path: impl AsRef<Path>,
    limit: usize,
    block_size: usize,
) -> Result<Vec<String>> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(Error::io(path))?;
    let lines = tail_lines(&mut file, limit, block_size).map_err(Error::io(path))?;

    debug!("Read {} tail lines from {}", lines.len(), path.display());
    Ok(lines)
}

/// Extract the last `limit` non-empty lines from any seekable source.
///
/// Lines are returned in their original order without separators. A trailing
/// `\r` is stripped, blank lines are skipped and a final line without a
/// trailing newline still counts.
pub fn tail_lines<R: Read + Seek>(
    reader: &mut R,
    limit: usize,
    block_size: usize,
) -> io::Result<Vec<String>> {
    let mut lines = Vec::new();
    if limit == 0 {
        return Ok(lines);
    }

    let block_size = block_size.max(1);
    let mut pos = reader.seek(SeekFrom::End(0))?;
    let mut block = vec![0u8; block_size.min(pos as usize).max(1)];

    // Bytes of the line currently being assembled, left of which no
    // separator has been seen yet.
    let mut fragment: Vec<u8> = Vec::new();

    while pos > 0 && lines.len() < limit {
        let start = pos.saturating_sub(block_size as u64);
        let len = (pos - start) as usize;

        reader.seek(SeekFrom::Start(start))?;
        let chunk = &mut block[..len];
        reader.read_exact(chunk)?;

        let mut end = len;
        for i in (0..len).rev() {
            if chunk[i] != NEW_LINE {
                continue;
            }

            push_line(&mut lines, &chunk[i + 1..end], &mut fragment);
            end = i;

            if lines.len() >= limit {
                break;
            }
        }

        if lines.len() >= limit {
            break;
        }

        // Carry the unterminated head of this block into the next one.
        let mut carried = Vec::with_capacity(end + fragment.len());
        carried.extend_from_slice(&chunk[..end]);
        carried.append(&mut fragment);
        fragment = carried;

        pos = start;
    }

    // Start of the resource reached: the first line has no separator before it.
    if lines.len() < limit && !fragment.is_empty() {
        push_line(&mut lines, &[], &mut fragment);
    }

    lines.reverse();
    Ok(lines)
}

/// Join `head` with the carried fragment and record it if non-empty.
fn push_line(lines: &mut Vec<String>, head: &[u8], fragment: &mut Vec<u8>) {
    let mut bytes = Vec::with_capacity(head.len() + fragment.len());
    bytes.extend_from_slice(head);
    bytes.append(fragment);

    if bytes.last() == Some(&b'\r') {
        bytes.pop();
    }

    if !bytes.is_empty() {
        lines.push(String::from_utf8_lossy(&bytes).into_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    fn tail(text: &str, limit: usize, block_size: usize) -> Vec<String> {
        tail_lines(&mut Cursor::new(text.as_bytes()), limit, block_size).unwrap()
    }

    #[test]
    fn test_three_lines_limit_two() {
        let text = "line 1\nline 2\nline 3\n";
        assert_eq!(tail(text, 2, DEFAULT_BLOCK_SIZE), vec!["line 2", "line 3"]);
    }

    #[test]
    fn test_limit_beyond_line_count_returns_all() {
        let text = "a\nb\nc\n";
        assert_eq!(tail(text, 10, 4), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_missing_trailing_separator() {
        assert_eq!(tail("a\nb\nc", 2, 3), vec!["b", "c"]);
        assert_eq!(tail("only", 5, 2), vec!["only"]);
    }

    #[test]
    fn test_empty_source() {
        assert!(tail("", 5, 8).is_empty());
        assert!(tail("\n\n", 5, 8).is_empty());
        assert!(tail("a\nb\n", 0, 8).is_empty());
    }

    #[test]
    fn test_lines_spanning_many_blocks() {
        let long = "x".repeat(100);
        let text = format!("first\n{long}\nlast\n");

        for block_size in [1, 2, 7, 64, 1024] {
            assert_eq!(
                tail(&text, 3, block_size),
                vec!["first".to_string(), long.clone(), "last".to_string()],
                "block size {block_size}"
            );
        }
    }

    #[test]
    fn test_crlf_and_blank_lines() {
        let text = "a\r\n\r\nb\r\n\n\nc\r\n";
        assert_eq!(tail(text, 3, 4), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_multibyte_split_across_blocks() {
        let text = "t1 TEMP 20°C\nt2 TEMP 21°C\n";
        for block_size in 1..8 {
            assert_eq!(tail(text, 2, block_size), vec!["t1 TEMP 20°C", "t2 TEMP 21°C"]);
        }
    }

    #[test]
    fn test_tail_matches_final_lines() {
        let all: Vec<String> = (0..500).map(|i| format!("2024-01-01T00:00:{i:03} TEMP {i}")).collect();
        let text = all.join("\n") + "\n";

        for k in [1, 17, 499, 500, 800] {
            let got = tail(&text, k, 256);
            let expected = &all[all.len().saturating_sub(k)..];
            assert_eq!(got, expected, "k = {k}");
        }
    }

    #[test]
    fn test_read_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "one\ntwo\nthree\n").unwrap();

        let lines = read_last_lines(file.path(), 2).unwrap();
        assert_eq!(lines, vec!["two", "three"]);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_last_lines(dir.path().join("absent.log"), 2).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
