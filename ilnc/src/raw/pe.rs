//! The PE container and CLI header wrapping the metadata root
//! (ECMA-335 §II.25). Just enough of the PE format to find the `.cor20`
//! header and resolve RVAs into file offsets — this is not a general PE
//! parser.

use std::io::{Cursor, Error, ErrorKind};

use crate::raw::heaps::MetadataHeaps;
use crate::raw::tables::TableHeap;
use crate::utilities::{read_fixed_string, FromByteStream};

#[derive(Debug, Clone, Copy)]
struct SectionHeader {
    virtual_address: u32,
    virtual_size: u32,
    raw_data_pointer: u32,
}

impl SectionHeader {
    fn contains(&self, rva: u32) -> bool {
        rva >= self.virtual_address && rva < self.virtual_address + self.virtual_size
    }

    fn to_file_offset(&self, rva: u32) -> u32 {
        rva - self.virtual_address + self.raw_data_pointer
    }
}

/// Resolves an RVA to a file offset using the section table, the same
/// indirection every field in the CLI header and metadata root goes
/// through before its bytes can be sliced out of the mapped file.
struct SectionTable {
    sections: Vec<SectionHeader>,
}

impl SectionTable {
    fn rva_to_offset(&self, rva: u32) -> std::io::Result<u32> {
        self.sections
            .iter()
            .find(|s| s.contains(rva))
            .map(|s| s.to_file_offset(rva))
            .ok_or_else(|| Error::new(ErrorKind::InvalidData, format!("RVA {rva:#x} not in any section")))
    }
}

const PE_SIGNATURE_OFFSET_POINTER: u64 = 0x3C;
const PE_SIGNATURE: u32 = 0x0000_4550; // "PE\0\0"
const OPTIONAL_HEADER_MAGIC_PE32: u16 = 0x10B;
const OPTIONAL_HEADER_MAGIC_PE32_PLUS: u16 = 0x20B;

/// The 16 data directories trailing the optional header; index 14 is the
/// CLI header (ECMA-335 §II.25.2.3.3).
const CLI_HEADER_DIRECTORY_INDEX: usize = 14;

fn read_section_table(file: &[u8]) -> std::io::Result<SectionTable> {
    let mut cursor = Cursor::new(file);
    cursor.set_position(PE_SIGNATURE_OFFSET_POINTER);
    let pe_header_offset = u32::read(&mut cursor, &())?;
    cursor.set_position(pe_header_offset as u64);

    let signature = u32::read(&mut cursor, &())?;
    if signature != PE_SIGNATURE {
        return Err(Error::new(ErrorKind::InvalidData, "missing PE signature"));
    }

    let _machine = u16::read(&mut cursor, &())?;
    let number_of_sections = u16::read(&mut cursor, &())?;
    let _timestamp = u32::read(&mut cursor, &())?;
    let _symbol_table_pointer = u32::read(&mut cursor, &())?;
    let _number_of_symbols = u32::read(&mut cursor, &())?;
    let optional_header_size = u16::read(&mut cursor, &())?;
    let _characteristics = u16::read(&mut cursor, &())?;

    let optional_header_start = cursor.position();
    cursor.set_position(optional_header_start + optional_header_size as u64);
    let section_headers_start = cursor.position();

    let mut sections = Vec::with_capacity(number_of_sections as usize);
    for i in 0..number_of_sections {
        cursor.set_position(section_headers_start + i as u64 * 40);
        let mut name = [0u8; 8];
        std::io::Read::read_exact(&mut cursor, &mut name)?;
        let virtual_size = u32::read(&mut cursor, &())?;
        let virtual_address = u32::read(&mut cursor, &())?;
        let _size_of_raw_data_field = u32::read(&mut cursor, &())?;
        let raw_data_pointer = u32::read(&mut cursor, &())?;
        sections.push(SectionHeader { virtual_address, virtual_size, raw_data_pointer });
    }

    Ok(SectionTable { sections })
}

fn read_cli_header_directory_rva(file: &[u8]) -> std::io::Result<(u32, u32)> {
    let mut cursor = Cursor::new(file);
    cursor.set_position(PE_SIGNATURE_OFFSET_POINTER);
    let pe_header_offset = u32::read(&mut cursor, &())? as u64;
    cursor.set_position(pe_header_offset + 4 + 20);

    let magic = u16::read(&mut cursor, &())?;
    let data_directory_start = match magic {
        OPTIONAL_HEADER_MAGIC_PE32 => pe_header_offset + 4 + 20 + 96,
        OPTIONAL_HEADER_MAGIC_PE32_PLUS => pe_header_offset + 4 + 20 + 112,
        other => return Err(Error::new(ErrorKind::InvalidData, format!("unknown optional header magic {other:#x}"))),
    };

    cursor.set_position(data_directory_start + CLI_HEADER_DIRECTORY_INDEX as u64 * 8);
    let rva = u32::read(&mut cursor, &())?;
    let size = u32::read(&mut cursor, &())?;
    Ok((rva, size))
}

/// The CLI header (ECMA-335 §II.25.3.3): runtime version and the RVA of
/// the metadata root every other heap/table is reached through.
#[derive(Debug, Clone)]
pub struct CliHeader {
    pub major_runtime_version: u16,
    pub minor_runtime_version: u16,
    pub metadata_rva: u32,
    pub metadata_size: u32,
    pub flags: u32,
    pub entry_point_token: Option<crate::metadata_token::MetadataToken>,
}

impl CliHeader {
    fn read(file: &[u8], sections: &SectionTable) -> std::io::Result<Self> {
        let (directory_rva, _directory_size) = read_cli_header_directory_rva(file)?;
        let offset = sections.rva_to_offset(directory_rva)?;
        let mut cursor = Cursor::new(file);
        cursor.set_position(offset as u64);

        let _size = u32::read(&mut cursor, &())?;
        let major_runtime_version = u16::read(&mut cursor, &())?;
        let minor_runtime_version = u16::read(&mut cursor, &())?;
        let metadata_rva = u32::read(&mut cursor, &())?;
        let metadata_size = u32::read(&mut cursor, &())?;
        let flags = u32::read(&mut cursor, &())?;
        let entry_point_token_raw = u32::read(&mut cursor, &())?;
        let entry_point_token = crate::metadata_token::MetadataToken::try_from(entry_point_token_raw).ok();

        Ok(Self { major_runtime_version, minor_runtime_version, metadata_rva, metadata_size, flags, entry_point_token })
    }
}

struct StreamHeader {
    offset: u32,
    size: u32,
    name: String,
}

/// The metadata root (ECMA-335 §II.24.2.1): a signature, version string,
/// and a directory of named streams (`#~`, `#Strings`, `#US`, `#GUID`,
/// `#Blob`).
pub struct MetadataRoot<'l> {
    pub version: String,
    pub tables: TableHeap,
    pub heaps: MetadataHeaps<'l>,
}

const METADATA_SIGNATURE: u32 = 0x424A_5342; // "BSJB"

impl<'l> MetadataRoot<'l> {
    fn read_streams(root_bytes: &'l [u8]) -> std::io::Result<Vec<StreamHeader>> {
        let mut cursor = Cursor::new(root_bytes);
        let signature = u32::read(&mut cursor, &())?;
        if signature != METADATA_SIGNATURE {
            return Err(Error::new(ErrorKind::InvalidData, "missing metadata root signature"));
        }
        let _major = u16::read(&mut cursor, &())?;
        let _minor = u16::read(&mut cursor, &())?;
        let _reserved = u32::read(&mut cursor, &())?;
        let version_length = u32::read(&mut cursor, &())?;
        let mut version_buffer = vec![0u8; version_length as usize];
        let _version = read_fixed_string::<4>(&mut cursor, &mut version_buffer)?;
        let _flags = u16::read(&mut cursor, &())?;
        let stream_count = u16::read(&mut cursor, &())?;

        let mut streams = Vec::with_capacity(stream_count as usize);
        for _ in 0..stream_count {
            let offset = u32::read(&mut cursor, &())?;
            let size = u32::read(&mut cursor, &())?;
            let mut name_buffer = [0u8; 32];
            let name = read_fixed_string::<4>(&mut cursor, &mut name_buffer)?;
            streams.push(StreamHeader { offset, size, name });
        }
        Ok(streams)
    }

    pub fn read(file: &'l [u8], cli_header: &CliHeader, sections: &SectionTable) -> std::io::Result<Self> {
        let root_offset = sections.rva_to_offset(cli_header.metadata_rva)? as usize;
        let root_bytes = file
            .get(root_offset..root_offset + cli_header.metadata_size as usize)
            .ok_or_else(|| Error::from(ErrorKind::UnexpectedEof))?;

        let mut version_cursor = Cursor::new(root_bytes);
        let _signature = u32::read(&mut version_cursor, &())?;
        let _major = u16::read(&mut version_cursor, &())?;
        let _minor = u16::read(&mut version_cursor, &())?;
        let _reserved = u32::read(&mut version_cursor, &())?;
        let version_length = u32::read(&mut version_cursor, &())?;
        let version_start = version_cursor.position() as usize;
        let version = std::str::from_utf8(&root_bytes[version_start..version_start + version_length as usize])
            .map_err(|_| Error::from(ErrorKind::InvalidData))?
            .trim_end_matches('\0')
            .to_string();

        let streams = Self::read_streams(root_bytes)?;
        let slice_for = |name: &str| -> &'l [u8] {
            streams
                .iter()
                .find(|s| s.name == name)
                .map(|s| &root_bytes[s.offset as usize..(s.offset + s.size) as usize])
                .unwrap_or(&[])
        };

        let strings = slice_for("#Strings");
        let us = slice_for("#US");
        let guid = slice_for("#GUID");
        let blob = slice_for("#Blob");
        let heaps = MetadataHeaps::new(strings, us, guid, blob);

        let table_stream = slice_for("#~");
        let mut table_cursor = Cursor::new(table_stream);
        let tables = TableHeap::read(&mut table_cursor)?;

        Ok(Self { version, tables, heaps })
    }
}

/// Top-level entry point: parses the PE container, CLI header and
/// metadata root out of a whole assembly file's bytes.
pub struct Assembly<'l> {
    pub cli_header: CliHeader,
    pub metadata: MetadataRoot<'l>,
    sections: SectionTable,
}

impl<'l> Assembly<'l> {
    pub fn read(file: &'l [u8]) -> std::io::Result<Self> {
        let sections = read_section_table(file)?;
        let cli_header = CliHeader::read(file, &sections)?;
        let metadata = MetadataRoot::read(file, &cli_header, &sections)?;
        Ok(Self { cli_header, metadata, sections })
    }

    /// Slices a method body's bytes starting at its RVA (ECMA-335
    /// §II.25.4.1 puts method bodies in `.text` alongside the metadata
    /// root). The returned slice runs to the end of the file rather than
    /// some precomputed length — the body reader only consumes as many
    /// bytes as its own header says it needs.
    pub fn resolve_rva<'f>(&self, file: &'f [u8], rva: u32) -> std::io::Result<&'f [u8]> {
        let offset = self.sections.rva_to_offset(rva)? as usize;
        file.get(offset..).ok_or_else(|| Error::from(ErrorKind::UnexpectedEof))
    }
}
