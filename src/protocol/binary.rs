// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::io::{self, ErrorKind};

use bytes::{Buf, BufMut};
use integer_encoding::VarInt;

use crate::{AppError, AppResult};

/// Longest encoding of a 64-bit varint.
pub const MAX_VARINT_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    #[default]
    BigEndian,
    LittleEndian,
}

///
/// Fixed width readers, each checks the remaining length before consuming.
///
macro_rules! read_fixed {
    ($name:ident, $type:ty, $be:ident, $le:ident) => {
        pub fn $name(&mut self) -> AppResult<$type> {
            self.ensure(std::mem::size_of::<$type>(), stringify!($type))?;
            Ok(match self.order {
                ByteOrder::BigEndian => self.buf.$be(),
                ByteOrder::LittleEndian => self.buf.$le(),
            })
        }
    };
}

macro_rules! write_fixed {
    ($name:ident, $type:ty, $be:ident, $le:ident) => {
        pub fn $name(&mut self, value: $type) -> AppResult<()> {
            self.ensure(std::mem::size_of::<$type>(), stringify!($type))?;
            match self.order {
                ByteOrder::BigEndian => self.buf.$be(value),
                ByteOrder::LittleEndian => self.buf.$le(value),
            }
            Ok(())
        }
    };
}

/// Decodes fixed width and varint values from a [`Buf`].
#[derive(Debug)]
pub struct BinaryReader<B> {
    order: ByteOrder,
    buf: B,
}

impl<B: Buf> BinaryReader<B> {
    pub fn new(order: ByteOrder, buf: B) -> Self {
        BinaryReader { order, buf }
    }

    pub fn big_endian(buf: B) -> Self {
        Self::new(ByteOrder::BigEndian, buf)
    }

    pub fn little_endian(buf: B) -> Self {
        Self::new(ByteOrder::LittleEndian, buf)
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn get_ref(&self) -> &B {
        &self.buf
    }

    pub fn into_inner(self) -> B {
        self.buf
    }

    fn ensure(&self, size: usize, what: &str) -> AppResult<()> {
        if self.buf.remaining() < size {
            return Err(AppError::Incomplete(format!(
                "can not read a {}, {} bytes left",
                what,
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    read_fixed!(read_u8, u8, get_u8, get_u8);
    read_fixed!(read_i8, i8, get_i8, get_i8);
    read_fixed!(read_u16, u16, get_u16, get_u16_le);
    read_fixed!(read_i16, i16, get_i16, get_i16_le);
    read_fixed!(read_u32, u32, get_u32, get_u32_le);
    read_fixed!(read_i32, i32, get_i32, get_i32_le);
    read_fixed!(read_u64, u64, get_u64, get_u64_le);
    read_fixed!(read_i64, i64, get_i64, get_i64_le);
    read_fixed!(read_f32, f32, get_f32, get_f32_le);
    read_fixed!(read_f64, f64, get_f64, get_f64_le);

    /// Copies exactly `dst.len()` bytes.
    pub fn read_exact(&mut self, dst: &mut [u8]) -> AppResult<()> {
        self.ensure(dst.len(), "byte slice")?;
        self.buf.copy_to_slice(dst);
        Ok(())
    }

    // Pulls the raw bytes of one varint, consuming them even on error.
    fn read_varint_bytes(&mut self) -> AppResult<([u8; MAX_VARINT_LEN], usize)> {
        let mut raw = [0u8; MAX_VARINT_LEN];
        let mut len = 0;
        for (i, slot) in raw.iter_mut().enumerate() {
            if !self.buf.has_remaining() {
                return Err(AppError::Incomplete("can not read a varint".to_string()));
            }
            let byte = self.buf.get_u8();
            *slot = byte;
            if byte < 0x80 {
                if i == MAX_VARINT_LEN - 1 && byte > 1 {
                    return Err(AppError::VarintOverflow);
                }
                len = i + 1;
                break;
            }
        }
        // ten continuation bytes in a row
        if len == 0 {
            return Err(AppError::VarintOverflow);
        }
        Ok((raw, len))
    }

    pub fn read_uvarint(&mut self) -> AppResult<u64> {
        let (raw, len) = self.read_varint_bytes()?;
        u64::decode_var(&raw[..len])
            .map(|(value, _)| value)
            .ok_or(AppError::VarintOverflow)
    }

    /// Zig-zag encoded signed varint.
    pub fn read_varint(&mut self) -> AppResult<i64> {
        let (raw, len) = self.read_varint_bytes()?;
        i64::decode_var(&raw[..len])
            .map(|(value, _)| value)
            .ok_or(AppError::VarintOverflow)
    }
}

/// Encodes fixed width and varint values into a [`BufMut`].
#[derive(Debug)]
pub struct BinaryWriter<B> {
    order: ByteOrder,
    buf: B,
}

impl<B: BufMut> BinaryWriter<B> {
    pub fn new(order: ByteOrder, buf: B) -> Self {
        BinaryWriter { order, buf }
    }

    pub fn big_endian(buf: B) -> Self {
        Self::new(ByteOrder::BigEndian, buf)
    }

    pub fn little_endian(buf: B) -> Self {
        Self::new(ByteOrder::LittleEndian, buf)
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    pub fn get_ref(&self) -> &B {
        &self.buf
    }

    pub fn into_inner(self) -> B {
        self.buf
    }

    fn ensure(&self, size: usize, what: &str) -> AppResult<()> {
        if self.buf.remaining_mut() < size {
            return Err(io::Error::new(
                ErrorKind::WriteZero,
                format!("no room to write a {}", what),
            )
            .into());
        }
        Ok(())
    }

    write_fixed!(write_u8, u8, put_u8, put_u8);
    write_fixed!(write_i8, i8, put_i8, put_i8);
    write_fixed!(write_u16, u16, put_u16, put_u16_le);
    write_fixed!(write_i16, i16, put_i16, put_i16_le);
    write_fixed!(write_u32, u32, put_u32, put_u32_le);
    write_fixed!(write_i32, i32, put_i32, put_i32_le);
    write_fixed!(write_u64, u64, put_u64, put_u64_le);
    write_fixed!(write_i64, i64, put_i64, put_i64_le);
    write_fixed!(write_f32, f32, put_f32, put_f32_le);
    write_fixed!(write_f64, f64, put_f64, put_f64_le);

    pub fn write_slice(&mut self, src: &[u8]) -> AppResult<()> {
        self.ensure(src.len(), "byte slice")?;
        self.buf.put_slice(src);
        Ok(())
    }

    pub fn write_uvarint(&mut self, value: u64) -> AppResult<()> {
        let mut raw = [0u8; MAX_VARINT_LEN];
        let len = value.encode_var(&mut raw);
        self.write_slice(&raw[..len])
    }

    /// Zig-zag encoded signed varint.
    pub fn write_varint(&mut self, value: i64) -> AppResult<()> {
        let mut raw = [0u8; MAX_VARINT_LEN];
        let len = value.encode_var(&mut raw);
        self.write_slice(&raw[..len])
    }
}

#[cfg(test)]
mod tests {
    use bytes::{Bytes, BytesMut};
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(ByteOrder::BigEndian, [0x01, 0x02, 0x03, 0x04])]
    #[case(ByteOrder::LittleEndian, [0x04, 0x03, 0x02, 0x01])]
    fn test_u32_layout(#[case] order: ByteOrder, #[case] expected: [u8; 4]) {
        let mut writer = BinaryWriter::new(order, BytesMut::new());
        writer.write_u32(0x0102_0304).unwrap();
        assert_eq!(&writer.get_ref()[..], &expected);

        let mut reader = BinaryReader::new(order, Bytes::copy_from_slice(&expected));
        assert_eq!(reader.read_u32().unwrap(), 0x0102_0304);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_mixed_message() {
        let mut writer = BinaryWriter::little_endian(BytesMut::new());
        writer.write_i8(-3).unwrap();
        writer.write_i16(-300).unwrap();
        writer.write_f32(1.5).unwrap();
        writer.write_f64(-0.25).unwrap();
        writer.write_i64(i64::MIN).unwrap();
        writer.write_slice(b"tail").unwrap();

        let mut reader = BinaryReader::little_endian(writer.into_inner().freeze());
        assert_eq!(reader.read_i8().unwrap(), -3);
        assert_eq!(reader.read_i16().unwrap(), -300);
        assert_eq!(reader.read_f32().unwrap(), 1.5);
        assert_eq!(reader.read_f64().unwrap(), -0.25);
        assert_eq!(reader.read_i64().unwrap(), i64::MIN);
        let mut tail = [0u8; 4];
        reader.read_exact(&mut tail).unwrap();
        assert_eq!(&tail, b"tail");
    }

    #[test]
    fn test_float_bits_big_endian() {
        let mut writer = BinaryWriter::big_endian(BytesMut::new());
        writer.write_f32(1.5).unwrap();
        assert_eq!(&writer.get_ref()[..], &[0x3f, 0xc0, 0x00, 0x00]);
    }

    #[rstest]
    #[case(0, &[0x00])]
    #[case(-1, &[0x01])]
    #[case(1, &[0x02])]
    #[case(-64, &[0x7f])]
    #[case(64, &[0x80, 0x01])]
    fn test_zigzag_varint(#[case] value: i64, #[case] encoded: &[u8]) {
        let mut writer = BinaryWriter::big_endian(BytesMut::new());
        writer.write_varint(value).unwrap();
        assert_eq!(&writer.get_ref()[..], encoded);

        let mut reader = BinaryReader::big_endian(Bytes::copy_from_slice(encoded));
        assert_eq!(reader.read_varint().unwrap(), value);
    }

    #[test]
    fn test_uvarint() {
        let mut writer = BinaryWriter::big_endian(BytesMut::new());
        writer.write_uvarint(300).unwrap();
        writer.write_uvarint(u64::MAX).unwrap();
        assert_eq!(&writer.get_ref()[..2], &[0xac, 0x02]);
        assert_eq!(writer.get_ref().len(), 2 + MAX_VARINT_LEN);

        let mut reader = BinaryReader::big_endian(writer.into_inner().freeze());
        assert_eq!(reader.read_uvarint().unwrap(), 300);
        assert_eq!(reader.read_uvarint().unwrap(), u64::MAX);
    }

    #[test]
    fn test_short_input() {
        let mut reader = BinaryReader::big_endian(Bytes::from_static(&[0x01, 0x02]));
        assert!(matches!(reader.read_u32(), Err(AppError::Incomplete(_))));
        // nothing was consumed by the failed read
        assert_eq!(reader.read_u16().unwrap(), 0x0102);

        let mut reader = BinaryReader::big_endian(Bytes::from_static(&[0x80, 0x80]));
        assert!(matches!(reader.read_uvarint(), Err(AppError::Incomplete(_))));
    }

    #[test]
    fn test_varint_overflow() {
        let mut reader = BinaryReader::big_endian(Bytes::from_static(&[0xff; 11]));
        assert!(matches!(reader.read_uvarint(), Err(AppError::VarintOverflow)));

        let mut too_wide = [0xffu8; MAX_VARINT_LEN];
        too_wide[MAX_VARINT_LEN - 1] = 0x02;
        let mut reader = BinaryReader::big_endian(Bytes::copy_from_slice(&too_wide));
        assert!(matches!(reader.read_varint(), Err(AppError::VarintOverflow)));
    }

    #[test]
    fn test_writer_out_of_room() {
        let mut storage = [0u8; 3];
        let mut writer = BinaryWriter::big_endian(&mut storage[..]);
        writer.write_u16(7).unwrap();
        let err = writer.write_u16(8).unwrap_err();
        assert!(matches!(err, AppError::IoError(ref e) if e.kind() == ErrorKind::WriteZero));
    }
}
