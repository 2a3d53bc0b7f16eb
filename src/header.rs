//! The fixed, 100-byte database header that opens every file: magic string,
//! page size, page count, and the root page id.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use crate::error::{Error, Result};
use crate::writer::FixedSizeWriter;

/// On-disk size of the header, including its reserved padding.
pub const DB_HEADER_SIZE: usize = 100;

/// Magic string every valid database file begins with.
pub const MAGIC: &[u8; 5] = b"my db";

/// Page body size used for freshly-initialized databases.
pub const DEFAULT_PAGE_SIZE: u32 = 4096;

/// The database header. Rewritten and fsynced whenever the page count or
/// root page id changes, so a crash never leaves the tree pointing at a
/// page that wasn't fully written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseHeader {
    pub page_size: u32,
    pub page_count: u32,
    pub root_page_id: u32,
}

impl DatabaseHeader {
    pub fn new_default() -> Self {
        DatabaseHeader {
            page_size: DEFAULT_PAGE_SIZE,
            page_count: 0,
            root_page_id: 0,
        }
    }

    pub fn encode(&self) -> Result<[u8; DB_HEADER_SIZE]> {
        let mut buf = [0u8; DB_HEADER_SIZE];
        {
            let mut writer = FixedSizeWriter::new(&mut buf);
            writer.write_all(MAGIC)?;
            writer.write_u32::<LittleEndian>(self.page_size)?;
            writer.write_u32::<LittleEndian>(self.page_count)?;
            writer.write_u32::<LittleEndian>(self.root_page_id)?;
        }
        Ok(buf)
    }

    pub fn decode(buf: &[u8; DB_HEADER_SIZE]) -> Result<Self> {
        let mut cursor = std::io::Cursor::new(&buf[..]);
        let mut magic = [0u8; 5];
        cursor.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(Error::Format(format!(
                "bad magic string: expected {:?}, found {:?}",
                MAGIC, magic
            )));
        }
        let page_size = cursor.read_u32::<LittleEndian>()?;
        let page_count = cursor.read_u32::<LittleEndian>()?;
        let root_page_id = cursor.read_u32::<LittleEndian>()?;
        Ok(DatabaseHeader {
            page_size,
            page_count,
            root_page_id,
        })
    }

    /// True iff at least one page has been allocated and the root id refers
    /// to an allocated page.
    pub fn root_initialized(&self) -> bool {
        self.page_count >= 1 && self.root_page_id < self.page_count
    }
}
