//! Variable-length integers used in pack record headers.

use std::io::{Read, Write};

const CONTINUE: u8 = 0x80;
const LOW_SEVEN: u64 = 0x7f;
const LOW_FOUR: u64 = 0x0f;

/// Write a record header: `type` in bits 4-6 of the first byte, then `size`
/// as 4 bits followed by 7-bit groups, least significant first.
pub fn write_record_header(writer: &mut impl Write, type_code: u8, size: u64) -> std::io::Result<()> {
    let mut byte = ((type_code & 0x7) << 4) | (size & LOW_FOUR) as u8;
    let mut rest = size >> 4;

    while rest > 0 {
        writer.write_all(&[byte | CONTINUE])?;
        byte = (rest & LOW_SEVEN) as u8;
        rest >>= 7;
    }

    writer.write_all(&[byte])
}

pub fn read_record_header(reader: &mut impl Read) -> std::io::Result<(u8, u64)> {
    let mut byte = read_byte(reader)?;
    let type_code = (byte >> 4) & 0x7;
    let mut size = (byte as u64) & LOW_FOUR;
    let mut shift = 4;

    while byte & CONTINUE != 0 {
        if shift >= 64 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "record size overflows 64 bits",
            ));
        }
        byte = read_byte(reader)?;
        size |= ((byte as u64) & LOW_SEVEN) << shift;
        shift += 7;
    }

    Ok((type_code, size))
}

/// Read the distance back to an offset delta's base: big-endian 7-bit groups
/// where every continuation adds one before shifting.
pub fn read_offset(reader: &mut impl Read) -> std::io::Result<u64> {
    let mut byte = read_byte(reader)?;
    let mut offset = (byte as u64) & LOW_SEVEN;

    while byte & CONTINUE != 0 {
        if offset > u64::MAX >> 7 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "delta base offset overflows 64 bits",
            ));
        }
        byte = read_byte(reader)?;
        offset = ((offset + 1) << 7) | ((byte as u64) & LOW_SEVEN);
    }

    Ok(offset)
}

/// Read a little-endian 7-bit group size, as found at the start of delta data.
pub fn read_size(reader: &mut impl Read) -> std::io::Result<u64> {
    let mut size = 0;
    let mut shift = 0;

    loop {
        if shift >= 64 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "delta size overflows 64 bits",
            ));
        }
        let byte = read_byte(reader)?;
        size |= ((byte as u64) & LOW_SEVEN) << shift;
        shift += 7;

        if byte & CONTINUE == 0 {
            return Ok(size);
        }
    }
}

fn read_byte(reader: &mut impl Read) -> std::io::Result<u8> {
    let mut buffer = [0u8; 1];
    reader.read_exact(&mut buffer)?;
    Ok(buffer[0])
}
