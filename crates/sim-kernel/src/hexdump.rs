//! Offset / hex / ASCII rendering of byte buffers.
//!
//! ```text
//! 00000000  48 0f 0e 0d 0a 02 48 0f  0e 0d 0a 02 08 00 45 00  |H.....H.......E.|
//! ```

use core::fmt::{self, Write};

pub const BYTES_PER_ROW: usize = 16;

/// Writes one row per 16 bytes, each prefixed with `prefix`.
pub fn write_hex_dump(mut w: impl Write, prefix: &str, data: &[u8]) -> fmt::Result {
    for (row, chunk) in data.chunks(BYTES_PER_ROW).enumerate() {
        write!(w, "{prefix}{:08x} ", row * BYTES_PER_ROW)?;
        for i in 0..BYTES_PER_ROW {
            if i == BYTES_PER_ROW / 2 {
                w.write_char(' ')?;
            }
            match chunk.get(i) {
                Some(b) => write!(w, " {b:02x}")?,
                None => w.write_str("   ")?,
            }
        }
        w.write_str("  |")?;
        for b in chunk {
            let c = if b.is_ascii_graphic() || *b == b' ' {
                *b as char
            } else {
                '.'
            };
            w.write_char(c)?;
        }
        w.write_str("|\n")?;
    }
    Ok(())
}

pub fn hex_dump_lines(prefix: &str, data: &[u8]) -> Vec<String> {
    let mut s = String::new();
    // writing into a String does not fail
    let _ = write_hex_dump(&mut s, prefix, data);
    s.lines().map(str::to_string).collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_hex_dump_format() {
        let data: Vec<u8> = b"\x48\x0f\x0e\x0d\x0a\x02hey, veth, wassup".to_vec();
        let lines = hex_dump_lines("", &data);
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "00000000  48 0f 0e 0d 0a 02 68 65  79 2c 20 76 65 74 68 2c  |H.....hey, veth,|"
        );
        assert!(lines[1].starts_with("00000010  20 77 61 73 73 75 70"));
        assert!(lines[1].ends_with("| wassup|"));
    }

    #[test]
    fn test_empty() {
        assert!(hex_dump_lines("tx ", &[]).is_empty());
    }
}
