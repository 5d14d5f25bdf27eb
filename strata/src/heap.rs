//! The heap manager: threads pages into per-table chains, assigns record
//! identifiers from per-page id ranges, and fronts disk with a write-back
//! page cache.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use crate::catalog::{clamp_name, Catalog, ColumnSchema, TableMetadata};
use crate::errors::StorageError;
use crate::page::Page;
use crate::row;
use crate::scan::{self, Row, ScanOptions};
use crate::strata_debug_log;
use crate::{
    PageId, RecordId, CATALOG_PAGE_ID, FIRST_RECORD_ID, IDS_PER_PAGE, INVALID_PAGE_ID,
    MAX_COLUMNS, PAGE_SIZE,
};

pub const PAGE_FILE_PREFIX: &str = "page_";
pub const PAGE_FILE_EXTENSION: &str = ".dat";

/// A single-process store rooted at one directory. Each page is a file
/// `page_<id>.dat`; page 0 holds the catalog. The cache is unbounded and is
/// the source of truth between flushes.
pub struct HeapStore {
    open: bool,
    root: PathBuf,
    catalog: Catalog,
    pages: HashMap<PageId, Page>,
    tables: HashMap<String, TableMetadata>,
}

impl HeapStore {
    /// Opens (or initializes) a store. The directory is created if absent;
    /// page 0 is loaded if present, otherwise a fresh catalog is used.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let root = path.as_ref().to_path_buf();
        strata_debug_log!("[HeapStore::open] opening store at {}", root.display());
        if !root.exists() {
            fs::create_dir_all(&root)?;
        }
        let catalog_path = page_path(&root, CATALOG_PAGE_ID);
        let catalog = if catalog_path.exists() {
            let buf = read_page_file(&catalog_path)?;
            Catalog::deserialize(&buf)?
        } else {
            strata_debug_log!("[HeapStore::open] no catalog page, starting empty");
            Catalog::new()
        };
        Ok(HeapStore {
            open: true,
            root,
            catalog,
            pages: HashMap::new(),
            tables: HashMap::new(),
        })
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Flushes and marks the store closed. Idempotent.
    pub fn close(&mut self) -> Result<(), StorageError> {
        if !self.open {
            return Ok(());
        }
        self.flush()?;
        self.open = false;
        Ok(())
    }

    /// Writes every dirty cached page, then the catalog if dirty. On return,
    /// on-disk state reflects all committed operations.
    pub fn flush(&mut self) -> Result<(), StorageError> {
        if !self.open {
            return Ok(());
        }
        for page in self.pages.values_mut() {
            if page.is_dirty() {
                strata_debug_log!("[HeapStore::flush] writing page {}", page.page_id());
                let buf = page.serialize();
                write_page_file(&page_path(&self.root, page.page_id()), &buf)?;
                page.mark_clean();
            }
        }
        if self.catalog.is_dirty() {
            strata_debug_log!("[HeapStore::flush] writing catalog");
            let buf = self.catalog.serialize();
            write_page_file(&page_path(&self.root, CATALOG_PAGE_ID), &buf)?;
            self.catalog.mark_clean();
        }
        Ok(())
    }

    /// Registers a new table. Pages are created lazily on first insert.
    pub fn create(&mut self, table: &str, schema: &[ColumnSchema]) -> Result<(), StorageError> {
        self.ensure_open()?;
        if schema.is_empty() {
            return Err(StorageError::InvalidArgument(
                "a table needs at least one column".to_string(),
            ));
        }
        if schema.len() > MAX_COLUMNS {
            return Err(StorageError::InvalidArgument(format!(
                "a table may have at most {MAX_COLUMNS} columns"
            )));
        }
        self.catalog.add_table(table)?;
        let metadata = TableMetadata::new(table, schema.to_vec());
        self.catalog.update_table(&metadata);
        self.tables.insert(metadata.name.clone(), metadata);
        Ok(())
    }

    /// Inserts a row, reusing the lowest free identifier on the first page in
    /// the chain that takes it, else growing the chain with a fresh id block.
    pub fn insert(&mut self, table: &str, values: &[String]) -> Result<RecordId, StorageError> {
        self.ensure_open()?;
        let mut metadata = self.table_metadata(table)?.clone();
        let record = row::encode_row(&metadata.columns, values)?;

        let mut current = metadata.first_data_page;
        while current != INVALID_PAGE_ID {
            let (inserted, next) = {
                let page = self.page_mut(current)?;
                let mut inserted = None;
                if let Some(bit) = page.first_free_id() {
                    let record_id = page.id_range_start() + bit as u32;
                    if page.insert(record_id, &record).is_some() {
                        page.claim_id(bit);
                        inserted = Some(record_id);
                    }
                }
                (inserted, page.next_page_id())
            };
            if let Some(record_id) = inserted {
                metadata.record_count += 1;
                self.store_metadata(metadata);
                return Ok(record_id);
            }
            current = next;
        }

        // No page in the chain accepted the row: allocate a new tail page
        // with the table's next 1024-wide id range.
        let new_page_id = self.catalog.allocate_page();
        let id_range_start = if metadata.next_id_block == 0 {
            FIRST_RECORD_ID
        } else {
            metadata.next_id_block * IDS_PER_PAGE as u32 + 1
        };
        strata_debug_log!(
            "[HeapStore::insert] new page {} for '{}', ids [{}, {})",
            new_page_id,
            metadata.name,
            id_range_start,
            id_range_start + IDS_PER_PAGE as u32
        );
        let mut page = Page::new(new_page_id, id_range_start);
        let record_id = id_range_start;
        if page.insert(record_id, &record).is_none() {
            return Err(StorageError::NoSpace(format!(
                "record of {} bytes does not fit in an empty page",
                record.len()
            )));
        }
        page.claim_id(0);

        if metadata.last_data_page == INVALID_PAGE_ID {
            metadata.first_data_page = new_page_id;
        } else {
            let previous_tail = self.page_mut(metadata.last_data_page)?;
            previous_tail.set_next_page_id(new_page_id);
        }
        metadata.last_data_page = new_page_id;
        metadata.record_count += 1;
        metadata.next_id_block += 1;
        self.pages.insert(new_page_id, page);
        self.store_metadata(metadata);
        Ok(record_id)
    }

    /// Walks the chain and returns the decoded row of the first hit.
    pub fn get(&mut self, table: &str, record_id: RecordId) -> Result<Vec<String>, StorageError> {
        self.ensure_open()?;
        let metadata = self.table_metadata(table)?.clone();
        let mut current = metadata.first_data_page;
        while current != INVALID_PAGE_ID {
            let page = self.page_mut(current)?;
            if let Some(payload) = page.get(record_id) {
                return row::decode_row(&metadata.columns, payload);
            }
            current = page.next_page_id();
        }
        Err(StorageError::NotFound(format!(
            "record {} not found in table '{}'",
            record_id, metadata.name
        )))
    }

    /// Re-encodes the row and updates it in place on its hosting page.
    /// Updates never relocate rows across pages.
    pub fn update(
        &mut self,
        table: &str,
        record_id: RecordId,
        values: &[String],
    ) -> Result<(), StorageError> {
        self.ensure_open()?;
        let metadata = self.table_metadata(table)?.clone();
        let record = row::encode_row(&metadata.columns, values)?;
        let mut current = metadata.first_data_page;
        while current != INVALID_PAGE_ID {
            let page = self.page_mut(current)?;
            if page.update(record_id, &record) {
                return Ok(());
            }
            current = page.next_page_id();
        }
        Err(StorageError::NotFound(format!(
            "record {} not found for update in table '{}'",
            record_id, metadata.name
        )))
    }

    /// Tombstones the record on the page whose id range contains it and
    /// clears the corresponding bitmap bit, releasing the id for reuse.
    pub fn delete(&mut self, table: &str, record_id: RecordId) -> Result<(), StorageError> {
        self.ensure_open()?;
        let mut metadata = self.table_metadata(table)?.clone();
        let mut current = metadata.first_data_page;
        while current != INVALID_PAGE_ID {
            let (deleted, next) = {
                let page = self.page_mut(current)?;
                if record_id >= page.id_range_start() && record_id < page.id_range_end() {
                    if !page.delete(record_id) {
                        return Err(StorageError::NotFound(format!(
                            "record {} not found or already deleted in table '{}'",
                            record_id, metadata.name
                        )));
                    }
                    page.release_id((record_id - page.id_range_start()) as usize);
                    (true, INVALID_PAGE_ID)
                } else {
                    (false, page.next_page_id())
                }
            };
            if deleted {
                metadata.record_count = metadata.record_count.saturating_sub(1);
                self.store_metadata(metadata);
                return Ok(());
            }
            current = next;
        }
        Err(StorageError::NotFound(format!(
            "record {} not found for deletion in table '{}'",
            record_id, metadata.name
        )))
    }

    /// Runs the scan pipeline over the table.
    pub fn scan(&mut self, table: &str, options: &ScanOptions) -> Result<Vec<Row>, StorageError> {
        self.ensure_open()?;
        let rows = self
            .materialize(table)?
            .into_iter()
            .map(|(_, row)| row)
            .collect();
        scan::run_pipeline(rows, options)
    }

    /// Full materialization with record identifiers, for callers that need to
    /// address the rows they read (e.g. DELETE ... WHERE).
    pub fn scan_with_ids(&mut self, table: &str) -> Result<Vec<(RecordId, Row)>, StorageError> {
        self.ensure_open()?;
        self.materialize(table)
    }

    pub fn get_column_names(&mut self, table: &str) -> Result<Vec<String>, StorageError> {
        self.ensure_open()?;
        let metadata = self.table_metadata(table)?;
        Ok(metadata
            .columns
            .iter()
            .map(|column| column.name.clone())
            .collect())
    }

    fn materialize(&mut self, table: &str) -> Result<Vec<(RecordId, Row)>, StorageError> {
        let metadata = self.table_metadata(table)?.clone();
        let mut rows = Vec::new();
        let mut current = metadata.first_data_page;
        while current != INVALID_PAGE_ID {
            let page = self.page_mut(current)?;
            for slot in page.slots() {
                if !slot.is_occupied() {
                    continue;
                }
                // Rows that fail to decode are dropped from the scan.
                if let Ok(row) = row::decode_row(&metadata.columns, page.payload(slot)) {
                    rows.push((slot.record_id, row));
                }
            }
            current = page.next_page_id();
        }
        Ok(rows)
    }

    fn ensure_open(&self) -> Result<(), StorageError> {
        if self.open {
            Ok(())
        } else {
            Err(StorageError::NotOpen)
        }
    }

    /// Load-on-miss lookup in the write-back cache.
    fn page_mut(&mut self, page_id: PageId) -> Result<&mut Page, StorageError> {
        let path = page_path(&self.root, page_id);
        match self.pages.entry(page_id) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                strata_debug_log!("[HeapStore::page_mut] cache miss, loading page {}", page_id);
                let buf = read_page_file(&path)?;
                let page = Page::deserialize(&buf)?;
                Ok(entry.insert(page))
            }
        }
    }

    fn table_metadata(&mut self, table: &str) -> Result<&TableMetadata, StorageError> {
        let key = clamp_name(table);
        match self.tables.entry(key) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let metadata = self.catalog.get_table(table).cloned().ok_or_else(|| {
                    StorageError::NotFound(format!("table '{table}' does not exist"))
                })?;
                Ok(entry.insert(metadata))
            }
        }
    }

    /// Writes updated metadata through to the catalog and the table cache.
    fn store_metadata(&mut self, metadata: TableMetadata) {
        self.catalog.update_table(&metadata);
        self.tables.insert(metadata.name.clone(), metadata);
    }
}

impl Drop for HeapStore {
    fn drop(&mut self) {
        if self.open {
            let _ = self.close();
        }
    }
}

fn page_path(root: &Path, page_id: PageId) -> PathBuf {
    root.join(format!("{PAGE_FILE_PREFIX}{page_id}{PAGE_FILE_EXTENSION}"))
}

fn read_page_file(path: &Path) -> Result<[u8; PAGE_SIZE], StorageError> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(StorageError::NotFound(format!(
                "page file {} is missing",
                path.display()
            )));
        }
        Err(err) => return Err(err.into()),
    };
    let mut buf = [0u8; PAGE_SIZE];
    file.read_exact(&mut buf).map_err(|err| {
        if err.kind() == ErrorKind::UnexpectedEof {
            StorageError::Corruption(format!("page file {} is truncated", path.display()))
        } else {
            StorageError::Io(err)
        }
    })?;
    Ok(buf)
}

fn write_page_file(path: &Path, buf: &[u8; PAGE_SIZE]) -> Result<(), StorageError> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(buf)?;
    file.sync_all()?;
    Ok(())
}
