use std::fmt;

const BYTES_PER_ROW: usize = 4;

/// Hex rendering of raw packet bytes, four bytes per line.
///
/// ```text
/// 0x49 0x53 0x43 0x50
/// 0x00 0x00 0x00 0x10
/// ...
/// ```
/// The alternate form (`{:#}`) keeps everything on one line with rows
/// separated by ` | `, which reads better inside structured log fields.
pub struct PacketDump<'a>(pub &'a [u8]);

impl fmt::Display for PacketDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let separator = if f.alternate() { " | " } else { "\n" };
        for (row_index, row) in self.0.chunks(BYTES_PER_ROW).enumerate() {
            if row_index > 0 {
                f.write_str(separator)?;
            }
            for (i, byte) in row.iter().enumerate() {
                if i > 0 {
                    f.write_str(" ")?;
                }
                write!(f, "{byte:#04x}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for PacketDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:#}")
    }
}

/// Multi-line hex dump of `bytes`.
pub fn hex_dump(bytes: &[u8]) -> String {
    PacketDump(bytes).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::packet::{encode_packet, new_packet, END_OF_PACKET_TX};

    #[test]
    fn rows_of_four() {
        let dump = hex_dump(&[0x49, 0x53, 0x43, 0x50, 0x00, 0x10]);
        assert_eq!(dump, "0x49 0x53 0x43 0x50\n0x00 0x10");
    }

    #[test]
    fn alternate_form_is_single_line() {
        let dump = format!("{:#}", PacketDump(&[0x01, 0x02, 0x03, 0x04, 0x05]));
        assert_eq!(dump, "0x01 0x02 0x03 0x04 | 0x05");
    }

    #[test]
    fn full_packet_dump_has_eight_rows() {
        let mut packet = new_packet();
        encode_packet(&Message::parse("PWR01").unwrap(), END_OF_PACKET_TX, &mut packet).unwrap();

        let dump = hex_dump(&packet);
        let rows: Vec<&str> = dump.lines().collect();
        assert_eq!(rows.len(), 8);
        assert_eq!(rows[0], "0x49 0x53 0x43 0x50");
        assert_eq!(rows[5], "0x52 0x30 0x31 0x0a");
    }

    #[test]
    fn empty_input_is_empty() {
        assert_eq!(hex_dump(&[]), "");
    }
}
