use std::fmt::{Debug, Formatter};
use std::io::{Cursor, ErrorKind};

use crate::utilities::FromByteStream;

macro_rules! define_metadata_token {
	($($id: ident = $discriminant: literal),* $(,)?) => {
		#[repr(u32)]
		#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
		pub enum MetadataTokenKind {
			$($id = $discriminant),*
		}

		#[derive(Copy, Clone, Eq, PartialEq, Hash)]
		pub struct MetadataToken(u32);

		impl MetadataToken {
			pub fn kind(&self) -> MetadataTokenKind {
				let discriminant = (self.0 & 0xFF00_0000) >> 24;
				match discriminant {
					$($discriminant => MetadataTokenKind::$id,)*
					_ => unreachable!("invalid metadata token discriminant {discriminant:#X}"),
				}
			}

			/// 1-based row index within the table named by `kind()`.
			pub fn index(&self) -> usize {
				(self.0 & 0x00FF_FFFF) as usize
			}

			pub fn raw(&self) -> u32 {
				self.0
			}
		}

		impl TryFrom<u32> for MetadataToken {
			type Error = ();
			fn try_from(value: u32) -> Result<Self, Self::Error> {
				let discriminant = (value & 0xFF00_0000) >> 24;
				match discriminant {
					$($discriminant => Ok(Self(value)),)*
					_ => Err(()),
				}
			}
		}

		impl FromByteStream for MetadataToken {
			type Deps = ();
			fn read(stream: &mut Cursor<&[u8]>, _: &()) -> std::io::Result<Self> {
				let value = u32::read(stream, &())?;
				MetadataToken::try_from(value).map_err(|_| ErrorKind::InvalidData.into())
			}
		}
	};
}

define_metadata_token! {
	Module = 0x00,
	TypeRef = 0x01,
	TypeDef = 0x02,
	Field = 0x04,
	MethodDef = 0x06,
	Param = 0x08,
	InterfaceImpl = 0x09,
	MemberRef = 0x0A,
	Constant = 0x0B,
	CustomAttribute = 0x0C,
	StandAloneSig = 0x11,
	Event = 0x14,
	Property = 0x17,
	ModuleRef = 0x1A,
	TypeSpec = 0x1B,
	Assembly = 0x20,
	AssemblyRef = 0x23,
	File = 0x26,
	ExportedType = 0x27,
	ManifestResource = 0x28,
	NestedClass = 0x29,
	GenericParam = 0x2A,
	MethodSpec = 0x2B,
	GenericParamConstraint = 0x2C,
	String = 0x70,
}

impl Debug for MetadataToken {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "MetadataToken::{:?}({})", self.kind(), self.index())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trips_kind_and_index() {
		let token = MetadataToken::try_from(0x0200_0007).unwrap();
		assert_eq!(token.kind(), MetadataTokenKind::TypeDef);
		assert_eq!(token.index(), 7);
	}

	#[test]
	fn rejects_unknown_discriminant() {
		assert!(MetadataToken::try_from(0xFF00_0001).is_err());
	}
}
