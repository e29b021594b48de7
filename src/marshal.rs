use std::{
    fmt::{Debug, Formatter},
    io::{Seek, SeekFrom, Write},
    str::FromStr,
};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use fixed::types::{U16F16, U2F30, U8F8};
use fixed_macro::types::{U16F16, U2F30};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error")]
    Io(#[from] std::io::Error),

    #[error("Invalid {r#type} box quantity: {quantity}, expected: {expected}")]
    InvalidBoxQuantity {
        r#type: &'static str,
        quantity: usize,
        expected: usize,
    },

    #[error("Box {r#type:?} with size {size} exceeds its parent extent")]
    BoxOverrun { r#type: FourCC, size: u32 },

    #[error("Invalid {r#type} box version: {version}")]
    InvalidBoxVersion { r#type: &'static str, version: u8 },

    #[error("Cannot generate sample entry (unsupported code type {0:?})")]
    UnsupportedCodeType(FourCC),

    #[error("Not able to open bit stream file '{0}'")]
    BitstreamOpen(String),

    #[error("Failed to parse access unit from '{0}'")]
    BitstreamParse(String),

    #[error("Bit stream ended in the middle of a value")]
    BitstreamOverrun,

    #[error("Invalid parameter set: {0}")]
    ParameterSet(&'static str),

    #[error("Internal invariant violated: {0}")]
    StructuralInconsistency(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

pub trait Encode {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()>;
}

pub trait Decode: Sized {
    fn decode(input: &mut &[u8]) -> Result<Self>;
}

impl Encode for u16 {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        output.write_u16::<BigEndian>(*self)?;
        Ok(())
    }
}

impl Decode for u16 {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        Ok(input.read_u16::<BigEndian>()?)
    }
}

impl Encode for u32 {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        output.write_u32::<BigEndian>(*self)?;
        Ok(())
    }
}

impl Decode for u32 {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        Ok(input.read_u32::<BigEndian>()?)
    }
}

impl Encode for i32 {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        output.write_i32::<BigEndian>(*self)?;
        Ok(())
    }
}

impl Decode for i32 {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        Ok(input.read_i32::<BigEndian>()?)
    }
}

impl Encode for u64 {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        output.write_u64::<BigEndian>(*self)?;
        Ok(())
    }
}

impl Decode for u64 {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        Ok(input.read_u64::<BigEndian>()?)
    }
}

impl Encode for i64 {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        output.write_i64::<BigEndian>(*self)?;
        Ok(())
    }
}

impl Decode for i64 {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        Ok(input.read_i64::<BigEndian>()?)
    }
}

impl Encode for U8F8 {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        output.write_u16::<BigEndian>(self.to_bits())?;
        Ok(())
    }
}

impl Decode for U8F8 {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        Ok(Self::from_bits(input.read_u16::<BigEndian>()?))
    }
}

impl Encode for U16F16 {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        output.write_u32::<BigEndian>(self.to_bits())?;
        Ok(())
    }
}

impl Decode for U16F16 {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        Ok(Self::from_bits(input.read_u32::<BigEndian>()?))
    }
}

impl Encode for U2F30 {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        output.write_u32::<BigEndian>(self.to_bits())?;
        Ok(())
    }
}

impl Decode for U2F30 {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        Ok(Self::from_bits(input.read_u32::<BigEndian>()?))
    }
}

impl Encode for String {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        if !self.is_empty() {
            output.write_all(self.as_bytes())?;
            output.write_u8(0)?;
        }
        Ok(())
    }
}

impl Decode for String {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        let length = input.iter().position(|&c| c == 0).unwrap_or(0);
        let (data, remaining_data) = input.split_at(length);
        *input = remaining_data;
        Ok(String::from_utf8_lossy(data).into_owned())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub u32);

impl FourCC {
    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl From<u32> for FourCC {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl Debug for FourCC {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(std::str::from_utf8(&self.0.to_be_bytes()).unwrap_or("????"))
    }
}

impl FromStr for FourCC {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(u32::from_be_bytes(
            s.as_bytes().try_into().map_err(|_| ())?,
        )))
    }
}

impl Encode for FourCC {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        self.0.encode(output)
    }
}

impl Decode for FourCC {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        Ok(Self(Decode::decode(input)?))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Language(pub u16);

impl Debug for Language {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let bytes = self.0.to_be_bytes();
        let c0 = (bytes[0] >> 2 & 0x1F) + 0x60;
        let c1 = (((bytes[0] & 0x3) << 3) | (bytes[1] >> 5)) + 0x60;
        let c2 = (bytes[1] & 0x1F) + 0x60;
        f.write_str(std::str::from_utf8(&[c0, c1, c2]).unwrap_or("und"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    pub a: U16F16,
    pub b: U16F16,
    pub u: U2F30,
    pub c: U16F16,
    pub d: U16F16,
    pub v: U2F30,
    pub x: U16F16,
    pub y: U16F16,
    pub w: U2F30,
}

impl Matrix {
    pub fn identity() -> Self {
        Self {
            a: U16F16!(1),
            b: U16F16!(0),
            u: U2F30!(0),
            c: U16F16!(0),
            d: U16F16!(1),
            v: U2F30!(0),
            x: U16F16!(0),
            y: U16F16!(0),
            w: U2F30!(1),
        }
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Self::identity()
    }
}

impl Encode for Matrix {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        self.a.encode(output)?;
        self.b.encode(output)?;
        self.u.encode(output)?;
        self.c.encode(output)?;
        self.d.encode(output)?;
        self.v.encode(output)?;
        self.x.encode(output)?;
        self.y.encode(output)?;
        self.w.encode(output)
    }
}

impl Decode for Matrix {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            a: Decode::decode(input)?,
            b: Decode::decode(input)?,
            u: Decode::decode(input)?,
            c: Decode::decode(input)?,
            d: Decode::decode(input)?,
            v: Decode::decode(input)?,
            x: Decode::decode(input)?,
            y: Decode::decode(input)?,
            w: Decode::decode(input)?,
        })
    }
}

pub fn encode_box_header(output: &mut (impl Write + Seek), r#type: [u8; 4]) -> Result<u64> {
    let begin = output.stream_position()?;
    0u32.encode(output)?; // size
    output.write_all(&r#type)?;
    Ok(begin)
}

pub fn update_box_header(output: &mut (impl Write + Seek), begin: u64) -> Result<()> {
    let end = output.stream_position()?;
    let size = end - begin;
    output.seek(SeekFrom::Start(begin))?;
    (size as u32).encode(output)?;
    output.seek(SeekFrom::Start(end))?;
    Ok(())
}

// Reads size and type of every child box in the current extent and dispatches
// on the type code. A child whose declared size runs past the extent is
// malformed input, not a panic.
macro_rules! decode_boxes {(
    $input:ident,
    $(
        $quantifier:ident $type:ident $name:ident
    ),* $(,)?
) => (
     while !$input.is_empty() {
        let size = u32::decode($input)?;
        let r#type: [u8; 4] = u32::decode($input)?.to_be_bytes();

        if size < 4 + 4 || (size - 4 - 4) as usize > $input.len() {
            return Err($crate::marshal::Error::BoxOverrun {
                r#type: u32::from_be_bytes(r#type).into(),
                size,
            });
        }
        let (mut data, remaining_data) = $input.split_at((size - 4 - 4) as usize);
        match &r#type {
            $(
                bstringify!($type) => decode_box!(data $quantifier $type $name),
            )*
                _ => {}
        }
        *$input = remaining_data;
    }

    $(unwrap_box!($quantifier $type $name);)*
)}

macro_rules! decode_box {
    ($input:ident optional $type:ident $name:ident) => {{
        if $name.is_some() {
            return Err($crate::marshal::Error::InvalidBoxQuantity {
                r#type: stringify!($type),
                quantity: 2,
                expected: 1,
            });
        }
        $name = Some(Decode::decode(&mut $input)?);
    }};

    ($input:ident required $type:ident $name:ident) => {{
        if $name.is_some() {
            return Err($crate::marshal::Error::InvalidBoxQuantity {
                r#type: stringify!($type),
                quantity: 2,
                expected: 1,
            });
        }
        $name = Some(Decode::decode(&mut $input)?);
    }};

    ($input:ident multiple $type:ident $name:ident) => {
        $name.push(Decode::decode(&mut $input)?)
    };
}

macro_rules! unwrap_box {
    (optional $type:ident $name:ident) => {};

    (required $type:ident $name:ident) => {
        let $name = $name.ok_or($crate::marshal::Error::InvalidBoxQuantity {
            r#type: stringify!($type),
            quantity: 0,
            expected: 1,
        })?;
    };

    (multiple $type:ident $name:ident) => {};
}

pub mod avc;
pub mod hevc;
pub mod iso;
pub mod meta;

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn box_header_is_backpatched() {
        let mut output = Cursor::new(Vec::new());
        let begin = encode_box_header(&mut output, *b"free").unwrap();
        42u32.encode(&mut output).unwrap();
        update_box_header(&mut output, begin).unwrap();

        let data = output.into_inner();
        assert_eq!(u32::from_be_bytes(data[..4].try_into().unwrap()), 12);
        assert_eq!(&data[4..8], b"free");
        assert_eq!(data.len(), 12);
    }

    #[test]
    fn fourcc_from_str_round_trips() {
        let cc: FourCC = "avc1".parse().unwrap();
        assert_eq!(cc.to_bytes(), *b"avc1");
        assert_eq!(format!("{:?}", cc), "avc1");
        assert!("avc".parse::<FourCC>().is_err());
    }

    #[test]
    fn language_debug_unpacks_iso639() {
        let lang = Language((21 << 10) | (14 << 5) | 4); // "und"
        assert_eq!(format!("{:?}", lang), "und");
    }

    #[test]
    fn empty_string_encodes_to_nothing() {
        let mut output = Cursor::new(Vec::new());
        String::new().encode(&mut output).unwrap();
        assert!(output.into_inner().is_empty());

        let mut output = Cursor::new(Vec::new());
        "vide".to_string().encode(&mut output).unwrap();
        assert_eq!(output.into_inner(), b"vide\0");
    }
}
