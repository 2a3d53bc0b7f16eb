//! The page manager: owns the file handle, the cached database header, and
//! fixed-stride page I/O. Every mutation that changes the page count or the
//! root page id rewrites and fsyncs the header before returning, so a crash
//! mid-insert leaves the tree pointing at either the old root or the new
//! one, never something in between.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::header::{DatabaseHeader, DB_HEADER_SIZE};
use crate::node::{Node, PagedNode};

pub struct Pager {
    file: File,
    header: DatabaseHeader,
}

impl Pager {
    /// Opens an existing database file, or creates one with a fresh header
    /// if it doesn't exist yet.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let is_new = !path.exists();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let header = if is_new {
            let header = DatabaseHeader::new_default();
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&header.encode()?)?;
            file.sync_all()?;
            header
        } else {
            file.seek(SeekFrom::Start(0))?;
            let mut buf = [0u8; DB_HEADER_SIZE];
            file.read_exact(&mut buf)?;
            DatabaseHeader::decode(&buf)?
        };

        Ok(Pager { file, header })
    }

    pub fn page_size(&self) -> u32 {
        self.header.page_size
    }

    pub fn page_count(&self) -> u32 {
        self.header.page_count
    }

    pub fn root_page_id(&self) -> u32 {
        self.header.root_page_id
    }

    pub fn root_initialized(&self) -> bool {
        self.header.root_initialized()
    }

    fn page_file_offset(&self, page_id: u32) -> u64 {
        DB_HEADER_SIZE as u64 + page_id as u64 * self.header.page_size as u64
    }

    fn flush_header(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&self.header.encode()?)?;
        self.file.sync_all()?;
        Ok(())
    }

    fn read_page(&mut self, page_id: u32) -> Result<Vec<u8>> {
        let offset = self.page_file_offset(page_id);
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; self.header.page_size as usize];
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn write_page(&mut self, page_id: u32, data: &[u8]) -> Result<()> {
        if data.len() != self.header.page_size as usize {
            return Err(Error::Invariant(format!(
                "page write size mismatch: expected {}, got {}",
                self.header.page_size,
                data.len()
            )));
        }
        let offset = self.page_file_offset(page_id);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        Ok(())
    }

    /// Writes `data` to a newly allocated page and commits the new page
    /// count. Does not touch the root page id.
    pub fn allocate_and_write(&mut self, data: &[u8]) -> Result<u32> {
        let page_id = self.header.page_count;
        self.write_page(page_id, data)?;
        self.header.page_count += 1;
        self.flush_header()?;
        Ok(page_id)
    }

    /// Allocates a page for `node` and makes it the new root, in one
    /// durable step: the page is written first, then the header is
    /// rewritten with both the new page count and the new root id.
    pub fn write_new_root(&mut self, node: &Node) -> Result<u32> {
        let page_id = self.header.page_count;
        self.write_page(page_id, &node.encode()?)?;
        self.header.page_count += 1;
        self.header.root_page_id = page_id;
        self.flush_header()?;
        Ok(page_id)
    }

    pub fn read_paged_node(&mut self, page_id: u32) -> Result<PagedNode> {
        let buf = self.read_page(page_id)?;
        let node = Node::decode(&buf)?;
        Ok(PagedNode { page_id, node })
    }

    pub fn write_paged_node(&mut self, paged: &PagedNode) -> Result<()> {
        self.write_page(paged.page_id, &paged.node.encode()?)
    }

    /// Flushes and releases the file handle.
    pub fn close(mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}
