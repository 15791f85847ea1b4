use std::io::{Cursor, Error, ErrorKind, Read, Seek, SeekFrom};

/// Deserializes a fixed-width value out of a little-endian byte cursor.
///
/// Mirrors the teacher's `FromByteStream`: every metadata primitive from a
/// single `u8` up to a whole table row implements it, so the table-derive
/// macro and the opcode reader can both drive the same cursor uniformly.
pub trait FromByteStream: Sized {
	type Deps;
	fn read(stream: &mut Cursor<&[u8]>, deps: &Self::Deps) -> std::io::Result<Self>;
}

macro_rules! impl_from_le_byte_stream {
	($($ty: ty),*) => {$(
		impl FromByteStream for $ty {
			type Deps = ();
			#[inline]
			fn read(stream: &mut Cursor<&[u8]>, _: &()) -> std::io::Result<Self> {
				let mut bytes = [0u8; std::mem::size_of::<$ty>()];
				stream.read_exact(&mut bytes)?;
				Ok(<$ty>::from_le_bytes(bytes))
			}
		}
	)*};
}

impl FromByteStream for u8 {
	type Deps = ();
	#[inline]
	fn read(stream: &mut Cursor<&[u8]>, _: &()) -> std::io::Result<Self> {
		let mut byte = 0u8;
		stream.read_exact(std::slice::from_mut(&mut byte))?;
		Ok(byte)
	}
}

impl FromByteStream for i8 {
	type Deps = ();
	#[inline]
	fn read(stream: &mut Cursor<&[u8]>, _: &()) -> std::io::Result<Self> {
		Ok(u8::read(stream, &())? as i8)
	}
}

impl_from_le_byte_stream!(u16, u32, u64, i16, i32, i64, f32, f64);

#[inline]
pub(crate) fn read_bytes_slice<'l>(stream: &mut Cursor<&'l [u8]>, count: usize) -> std::io::Result<&'l [u8]> {
	let start = stream.position() as usize;
	let data = stream.get_ref();
	let end = start.checked_add(count).filter(|end| *end <= data.len())
		.ok_or_else(|| Error::from(ErrorKind::UnexpectedEof))?;
	stream.set_position(end as u64);
	Ok(&data[start..end])
}

/// Reads an ECMA-335 compressed unsigned integer (§II.23.2 blob encoding).
pub fn read_compressed_u32(stream: &mut Cursor<&[u8]>) -> std::io::Result<u32> {
	let first = u8::read(stream, &())?;
	if first & 0x80 == 0 {
		return Ok(first as u32);
	}
	if first & 0xC0 == 0x80 {
		let second = u8::read(stream, &())?;
		return Ok((((first & 0x3F) as u32) << 8) | second as u32);
	}
	let mut rest = [0u8; 3];
	stream.read_exact(&mut rest)?;
	Ok((((first & 0x1F) as u32) << 24) | ((rest[0] as u32) << 16) | ((rest[1] as u32) << 8) | rest[2] as u32)
}

/// Reads a NUL-terminated, ASCII-ish string from a fixed-size field, rounded
/// up to `ROUND` bytes (used for the `#~`/`#Strings`/... stream-header names).
pub(crate) fn read_fixed_string<const ROUND: usize>(stream: &mut Cursor<&[u8]>, buffer: &mut [u8]) -> std::io::Result<String> {
	let position = stream.position();
	let read = stream.read(buffer)?;
	let end = buffer[..read].iter().position(|b| *b == 0).unwrap_or(read);
	let s = std::str::from_utf8(&buffer[..end]).map_err(|_| Error::from(ErrorKind::InvalidData))?.to_string();
	let advance = round_to_multiple_of::<ROUND>(end + 1) as u64;
	stream.seek(SeekFrom::Start(position + advance))?;
	Ok(s)
}

#[inline]
pub(crate) const fn round_to_multiple_of<const MULTIPLE: usize>(value: usize) -> usize {
	((value + (MULTIPLE - 1)) / MULTIPLE) * MULTIPLE
}

pub(crate) fn enumerate_set_bits(mut value: u64) -> impl Iterator<Item = usize> {
	std::iter::from_fn(move || {
		if value == 0 {
			return None;
		}
		let idx = value.trailing_zeros() as usize;
		value &= !(1u64 << idx);
		Some(idx)
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn compressed_u32_round_trips_single_byte() {
		let bytes = [0x03u8];
		let mut cursor = Cursor::new(bytes.as_slice());
		assert_eq!(read_compressed_u32(&mut cursor).unwrap(), 3);
	}

	#[test]
	fn compressed_u32_round_trips_two_byte() {
		let bytes = [0x80u8, 0x80];
		let mut cursor = Cursor::new(bytes.as_slice());
		assert_eq!(read_compressed_u32(&mut cursor).unwrap(), 0x80);
	}

	#[test]
	fn enumerate_set_bits_yields_ascending_indices() {
		let bits: Vec<_> = enumerate_set_bits(0b1011).collect();
		assert_eq!(bits, vec![0, 1, 3]);
	}
}
