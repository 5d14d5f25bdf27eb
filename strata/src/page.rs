use bytes::{Buf, BufMut};

use crate::errors::StorageError;
use crate::{PageId, RecordId, IDS_PER_PAGE, INVALID_PAGE_ID, PAGE_SIZE};

/// Packed size of [`PageHeader`] on disk.
pub const PAGE_HEADER_SIZE: usize = 27;

/// Packed size of a [`Slot`] directory entry on disk.
pub const SLOT_SIZE: usize = 9;

/// The free-id bitmap occupies the last 128 bytes of every page.
pub const BITMAP_BYTES: usize = IDS_PER_PAGE / 8;

/// First byte past the usable payload area; the bitmap lives beyond it.
pub const PAGE_DATA_END: usize = PAGE_SIZE - BITMAP_BYTES;

pub const PAGE_CLEAN: u8 = 0x00;
pub const PAGE_DIRTY: u8 = 0x01;
/// Reserved for overflow chaining, never set by the current code.
pub const PAGE_OVERFLOW: u8 = 0x02;

pub const SLOT_OCCUPIED: u8 = 0x01;
pub const SLOT_DELETED: u8 = 0x02;

#[derive(Debug, Clone, Copy)]
pub struct PageHeader {
    pub page_id: PageId,
    pub slot_count: u16,
    pub free_space: u16,
    pub free_space_offset: u16,
    pub next_page_id: PageId,
    pub flags: u8,
    pub lsn: u32,
    pub id_range_start: RecordId,
    pub id_range_end: RecordId,
}

impl PageHeader {
    fn encode(&self, mut buf: &mut [u8]) {
        buf.put_u32_le(self.page_id);
        buf.put_u16_le(self.slot_count);
        buf.put_u16_le(self.free_space);
        buf.put_u16_le(self.free_space_offset);
        buf.put_u32_le(self.next_page_id);
        buf.put_u8(self.flags);
        buf.put_u32_le(self.lsn);
        buf.put_u32_le(self.id_range_start);
        buf.put_u32_le(self.id_range_end);
    }

    fn decode(mut buf: &[u8]) -> PageHeader {
        PageHeader {
            page_id: buf.get_u32_le(),
            slot_count: buf.get_u16_le(),
            free_space: buf.get_u16_le(),
            free_space_offset: buf.get_u16_le(),
            next_page_id: buf.get_u32_le(),
            flags: buf.get_u8(),
            lsn: buf.get_u32_le(),
            id_range_start: buf.get_u32_le(),
            id_range_end: buf.get_u32_le(),
        }
    }
}

/// A slot directory entry describing one record within the page.
#[derive(Debug, Clone, Copy)]
pub struct Slot {
    pub offset: u16,
    pub length: u16,
    pub flags: u8,
    pub record_id: RecordId,
}

impl Slot {
    pub fn is_occupied(&self) -> bool {
        self.flags & SLOT_OCCUPIED != 0
    }

    pub fn is_deleted(&self) -> bool {
        self.flags & SLOT_DELETED != 0
    }

    fn encode(&self, mut buf: &mut [u8]) {
        buf.put_u16_le(self.offset);
        buf.put_u16_le(self.length);
        buf.put_u8(self.flags);
        buf.put_u32_le(self.record_id);
    }

    fn decode(mut buf: &[u8]) -> Slot {
        Slot {
            offset: buf.get_u16_le(),
            length: buf.get_u16_le(),
            flags: buf.get_u8(),
            record_id: buf.get_u32_le(),
        }
    }
}

/// 1024 bits at the tail of the page. Bit `i` set means identifier
/// `id_range_start + i` is currently live on this page.
#[derive(Debug, Clone)]
pub struct FreeIdBitmap {
    bits: [u8; BITMAP_BYTES],
}

impl FreeIdBitmap {
    fn new() -> Self {
        FreeIdBitmap {
            bits: [0; BITMAP_BYTES],
        }
    }

    pub fn test(&self, index: usize) -> bool {
        self.bits[index / 8] & (1 << (index % 8)) != 0
    }

    pub fn set(&mut self, index: usize) {
        self.bits[index / 8] |= 1 << (index % 8);
    }

    pub fn clear(&mut self, index: usize) {
        self.bits[index / 8] &= !(1 << (index % 8));
    }

    /// Lowest clear bit, if any identifier in the range is still free.
    pub fn first_clear(&self) -> Option<usize> {
        for (byte_index, byte) in self.bits.iter().enumerate() {
            if *byte != 0xff {
                return Some(byte_index * 8 + byte.trailing_ones() as usize);
            }
        }
        None
    }
}

/// An in-memory slotted page. The payload arena uses absolute page offsets;
/// the slot directory and header are kept parsed and are materialized next to
/// the payloads by [`Page::serialize`].
#[derive(Debug, Clone)]
pub struct Page {
    header: PageHeader,
    slots: Vec<Slot>,
    data: Box<[u8; PAGE_SIZE]>,
    free_ids: FreeIdBitmap,
}

impl Page {
    pub fn new(page_id: PageId, id_range_start: RecordId) -> Self {
        Page {
            header: PageHeader {
                page_id,
                slot_count: 0,
                free_space: (PAGE_DATA_END - PAGE_HEADER_SIZE) as u16,
                free_space_offset: PAGE_HEADER_SIZE as u16,
                next_page_id: INVALID_PAGE_ID,
                flags: PAGE_CLEAN,
                lsn: 0,
                id_range_start,
                id_range_end: id_range_start + IDS_PER_PAGE as u32,
            },
            slots: Vec::new(),
            data: Box::new([0; PAGE_SIZE]),
            free_ids: FreeIdBitmap::new(),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.header.page_id
    }

    pub fn next_page_id(&self) -> PageId {
        self.header.next_page_id
    }

    pub fn set_next_page_id(&mut self, next_page_id: PageId) {
        self.header.next_page_id = next_page_id;
        self.header.flags |= PAGE_DIRTY;
    }

    pub fn id_range_start(&self) -> RecordId {
        self.header.id_range_start
    }

    pub fn id_range_end(&self) -> RecordId {
        self.header.id_range_end
    }

    pub fn slot_count(&self) -> u16 {
        self.header.slot_count
    }

    pub fn free_space(&self) -> u16 {
        self.header.free_space
    }

    pub fn is_dirty(&self) -> bool {
        self.header.flags & PAGE_DIRTY != 0
    }

    pub(crate) fn mark_clean(&mut self) {
        self.header.flags &= !PAGE_DIRTY;
    }

    pub fn has_space(&self, required: usize) -> bool {
        self.header.free_space as usize >= required
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn payload(&self, slot: &Slot) -> &[u8] {
        &self.data[slot.offset as usize..slot.offset as usize + slot.length as usize]
    }

    /// Lowest free identifier index on this page, if any.
    pub fn first_free_id(&self) -> Option<usize> {
        self.free_ids.first_clear()
    }

    pub fn id_is_live(&self, index: usize) -> bool {
        self.free_ids.test(index)
    }

    pub fn claim_id(&mut self, index: usize) {
        self.free_ids.set(index);
        self.header.flags |= PAGE_DIRTY;
    }

    pub fn release_id(&mut self, index: usize) {
        self.free_ids.clear(index);
        self.header.flags |= PAGE_DIRTY;
    }

    /// Appends a new occupied slot and copies the payload into the heap area.
    /// Returns the slot's directory index, or `None` if the record cannot fit
    /// even after compaction.
    pub fn insert(&mut self, record_id: RecordId, payload: &[u8]) -> Option<u16> {
        let required = SLOT_SIZE + payload.len();
        if !self.has_space(required) {
            self.compact();
            if !self.has_space(required) {
                return None;
            }
        }
        if self.header.free_space_offset as usize + payload.len() > PAGE_DATA_END {
            // Logically there is room, but the tail is fragmented.
            self.compact();
        }

        let slot = Slot {
            offset: self.header.free_space_offset,
            length: payload.len() as u16,
            flags: SLOT_OCCUPIED,
            record_id,
        };
        let start = slot.offset as usize;
        self.data[start..start + payload.len()].copy_from_slice(payload);
        self.slots.push(slot);

        self.header.free_space -= required as u16;
        self.header.free_space_offset += payload.len() as u16;
        self.header.slot_count += 1;
        self.header.flags |= PAGE_DIRTY;
        Some(self.header.slot_count - 1)
    }

    /// Linear scan of the directory. Tombstones are skipped, so a re-inserted
    /// identifier always resolves to its fresh slot.
    pub fn get(&self, record_id: RecordId) -> Option<&[u8]> {
        self.slots
            .iter()
            .find(|slot| slot.record_id == record_id && slot.is_occupied())
            .map(|slot| self.payload(slot))
    }

    /// In-place overwrite when shrinking; compact-and-relocate when growing
    /// within the page's free space; `false` when the record is absent or the
    /// new payload cannot fit (there are no overflow pages).
    pub fn update(&mut self, record_id: RecordId, new_payload: &[u8]) -> bool {
        let Some(index) = self
            .slots
            .iter()
            .position(|slot| slot.record_id == record_id && slot.is_occupied())
        else {
            return false;
        };
        let old_length = self.slots[index].length as usize;
        let new_length = new_payload.len();

        if new_length <= old_length {
            let start = self.slots[index].offset as usize;
            self.data[start..start + new_length].copy_from_slice(new_payload);
            // The reclaimed delta must be computed before the slot length is
            // overwritten.
            self.header.free_space += (old_length - new_length) as u16;
            self.slots[index].length = new_length as u16;
            self.header.flags |= PAGE_DIRTY;
            return true;
        }

        if new_length <= old_length + self.header.free_space as usize {
            // Drop the stale copy before compacting so the reclaimed tail
            // covers old_length + free_space.
            self.slots[index].length = 0;
            self.compact();
            let start = self.header.free_space_offset as usize;
            self.data[start..start + new_length].copy_from_slice(new_payload);
            self.slots[index].offset = self.header.free_space_offset;
            self.slots[index].length = new_length as u16;
            self.header.free_space_offset += new_length as u16;
            self.header.free_space -= new_length as u16;
            self.header.flags |= PAGE_DIRTY;
            return true;
        }
        false
    }

    /// Tombstones the slot. The payload bytes stay behind until the next
    /// compaction, but their space is already credited back to `free_space`.
    pub fn delete(&mut self, record_id: RecordId) -> bool {
        for slot in self.slots.iter_mut() {
            if slot.record_id == record_id && slot.is_occupied() {
                slot.flags = SLOT_DELETED;
                self.header.free_space += slot.length;
                self.header.flags |= PAGE_DIRTY;
                return true;
            }
        }
        false
    }

    /// Rebuilds the heap area: occupied payloads are copied tightly after the
    /// slot directory, tombstones keep their directory entries (with stale
    /// offsets) and are never revisited.
    pub fn compact(&mut self) {
        let mut new_data = Box::new([0u8; PAGE_SIZE]);
        let mut current_offset = PAGE_HEADER_SIZE + SLOT_SIZE * self.slots.len();
        for slot in self.slots.iter_mut() {
            if !slot.is_occupied() {
                continue;
            }
            let start = slot.offset as usize;
            let length = slot.length as usize;
            new_data[current_offset..current_offset + length]
                .copy_from_slice(&self.data[start..start + length]);
            slot.offset = current_offset as u16;
            current_offset += length;
        }
        self.data = new_data;
        self.header.free_space_offset = current_offset as u16;
        self.header.free_space = (PAGE_DATA_END - current_offset) as u16;
        self.header.flags |= PAGE_DIRTY;
    }

    /// Assembles the page-sized buffer
    /// `[header | slot directory | payloads | free-id bitmap]`.
    /// Compacts first so payloads sit tightly after the directory.
    pub fn serialize(&mut self) -> [u8; PAGE_SIZE] {
        self.compact();
        let mut buf = [0u8; PAGE_SIZE];

        let mut on_disk = self.header;
        on_disk.flags &= !PAGE_DIRTY;
        on_disk.encode(&mut buf[..PAGE_HEADER_SIZE]);

        for (index, slot) in self.slots.iter().enumerate() {
            let start = PAGE_HEADER_SIZE + index * SLOT_SIZE;
            slot.encode(&mut buf[start..start + SLOT_SIZE]);
        }

        let directory_end = PAGE_HEADER_SIZE + SLOT_SIZE * self.slots.len();
        let payload_end = self.header.free_space_offset as usize;
        buf[directory_end..payload_end].copy_from_slice(&self.data[directory_end..payload_end]);

        buf[PAGE_DATA_END..].copy_from_slice(&self.free_ids.bits);
        buf
    }

    /// Parses and validates a page buffer. Any integrity violation is a fatal
    /// corruption error.
    pub fn deserialize(buf: &[u8]) -> Result<Page, StorageError> {
        if buf.len() < PAGE_SIZE {
            return Err(StorageError::Corruption(format!(
                "page buffer is {} bytes, expected {}",
                buf.len(),
                PAGE_SIZE
            )));
        }
        let header = PageHeader::decode(&buf[..PAGE_HEADER_SIZE]);
        if header.slot_count as usize > IDS_PER_PAGE {
            return Err(StorageError::Corruption(format!(
                "page {}: slot count {} exceeds the per-page limit",
                header.page_id, header.slot_count
            )));
        }
        let free_space_offset = header.free_space_offset as usize;
        let directory_end = PAGE_HEADER_SIZE + SLOT_SIZE * header.slot_count as usize;
        if free_space_offset < directory_end || free_space_offset > PAGE_DATA_END {
            return Err(StorageError::Corruption(format!(
                "page {}: free space offset {} is out of bounds",
                header.page_id, header.free_space_offset
            )));
        }

        let mut slots = Vec::with_capacity(header.slot_count as usize);
        for index in 0..header.slot_count as usize {
            let start = PAGE_HEADER_SIZE + index * SLOT_SIZE;
            let slot = Slot::decode(&buf[start..start + SLOT_SIZE]);
            let end = slot.offset as usize + slot.length as usize;
            if (slot.offset as usize) < PAGE_HEADER_SIZE || end > PAGE_DATA_END {
                return Err(StorageError::Corruption(format!(
                    "page {}: slot {} points outside the payload area",
                    header.page_id, index
                )));
            }
            if slot.is_occupied() == slot.is_deleted() {
                return Err(StorageError::Corruption(format!(
                    "page {}: slot {} flags are inconsistent",
                    header.page_id, index
                )));
            }
            slots.push(slot);
        }

        let mut data = Box::new([0u8; PAGE_SIZE]);
        data.copy_from_slice(&buf[..PAGE_SIZE]);
        let mut bits = [0u8; BITMAP_BYTES];
        bits.copy_from_slice(&buf[PAGE_DATA_END..PAGE_SIZE]);

        Ok(Page {
            header,
            slots,
            data,
            free_ids: FreeIdBitmap { bits },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn occupied_bytes(page: &Page) -> usize {
        page.slots()
            .iter()
            .filter(|slot| slot.is_occupied())
            .map(|slot| slot.length as usize)
            .sum()
    }

    fn assert_conserved(page: &Page) {
        let directory = PAGE_HEADER_SIZE + SLOT_SIZE * page.slots().len();
        assert_eq!(
            page.free_space() as usize + directory + occupied_bytes(page),
            PAGE_DATA_END
        );
    }

    #[test]
    fn insert_and_get_round_trip() {
        let mut page = Page::new(2, 1);
        assert_eq!(page.insert(1, b"hello"), Some(0));
        assert_eq!(page.insert(2, b"world!"), Some(1));
        assert_eq!(page.get(1), Some(&b"hello"[..]));
        assert_eq!(page.get(2), Some(&b"world!"[..]));
        assert_eq!(page.get(3), None);
        assert_conserved(&page);
    }

    #[test]
    fn delete_leaves_a_tombstone_and_reinsert_wins() {
        let mut page = Page::new(2, 1);
        page.insert(1, b"old").expect("insert");
        assert!(page.delete(1));
        assert_eq!(page.get(1), None);
        assert!(!page.delete(1), "a tombstone cannot be deleted twice");

        // A fresh slot with the same record id shadows the tombstone.
        page.insert(1, b"new").expect("reinsert");
        assert_eq!(page.get(1), Some(&b"new"[..]));
        assert_eq!(page.slot_count(), 2);
        assert_conserved(&page);
    }

    #[test]
    fn shrinking_update_reclaims_the_delta() {
        let mut page = Page::new(2, 1);
        page.insert(1, b"0123456789").expect("insert");
        let before = page.free_space();
        assert!(page.update(1, b"0123"));
        assert_eq!(page.free_space(), before + 6);
        assert_eq!(page.get(1), Some(&b"0123"[..]));
        assert_conserved(&page);
    }

    #[test]
    fn growing_update_relocates_within_the_page() {
        let mut page = Page::new(2, 1);
        page.insert(1, b"aa").expect("insert");
        page.insert(2, b"bb").expect("insert");
        assert!(page.update(1, b"a longer payload than before"));
        assert_eq!(page.get(1), Some(&b"a longer payload than before"[..]));
        assert_eq!(page.get(2), Some(&b"bb"[..]));
        assert_conserved(&page);
    }

    #[test]
    fn growing_update_fits_up_to_old_length_plus_free_space() {
        let mut page = Page::new(2, 1);
        page.insert(1, &vec![b'a'; 7000]).expect("insert");
        page.insert(2, &vec![b'b'; 100]).expect("insert");
        let free_space = page.free_space() as usize;

        // The new payload exceeds the free space alone but fits once the
        // old copy is reclaimed.
        let grown = vec![b'c'; 1000];
        assert!(free_space < grown.len());
        assert!(grown.len() <= 100 + free_space);
        assert!(page.update(2, &grown));
        assert_eq!(page.get(2), Some(&grown[..]));
        assert_eq!(page.get(1), Some(&vec![b'a'; 7000][..]));
        assert_conserved(&page);

        // One byte past old_length + free_space still fails.
        let too_big = vec![b'd'; 1000 + page.free_space() as usize + 1];
        assert!(!page.update(2, &too_big));
        assert_eq!(page.get(2), Some(&grown[..]));
        assert_conserved(&page);
    }

    #[test]
    fn oversized_update_fails_without_touching_the_record() {
        let mut page = Page::new(2, 1);
        page.insert(1, b"tiny").expect("insert");
        let huge = vec![b'x'; PAGE_SIZE];
        assert!(!page.update(1, &huge));
        assert_eq!(page.get(1), Some(&b"tiny"[..]));
    }

    #[test]
    fn insert_fails_when_the_page_is_full() {
        let mut page = Page::new(2, 1);
        let payload = vec![b'p'; 1000];
        let mut inserted = 0;
        while page.insert(inserted + 1, &payload).is_some() {
            inserted += 1;
        }
        assert!(inserted > 0);
        assert_conserved(&page);

        // Tombstoning one record frees enough space for another.
        assert!(page.delete(1));
        assert!(page.insert(inserted + 1, &payload).is_some());
    }

    #[test]
    fn serialize_round_trips_records_and_bitmap() {
        let mut page = Page::new(7, 1025);
        for i in 0..20u32 {
            let payload = format!("record-{i}");
            page.insert(1025 + i, payload.as_bytes()).expect("insert");
            page.claim_id(i as usize);
        }
        page.delete(1030);
        page.release_id(5);

        let buf = page.serialize();
        let restored = Page::deserialize(&buf).expect("deserialize");
        assert_eq!(restored.page_id(), 7);
        assert_eq!(restored.id_range_start(), 1025);
        assert_eq!(restored.id_range_end(), 1025 + IDS_PER_PAGE as u32);
        for i in 0..20u32 {
            let record_id = 1025 + i;
            if record_id == 1030 {
                assert_eq!(restored.get(record_id), None);
                assert!(!restored.id_is_live(5));
            } else {
                let expected = format!("record-{i}");
                assert_eq!(restored.get(record_id), Some(expected.as_bytes()));
                assert!(restored.id_is_live(i as usize));
            }
        }
        assert_conserved(&restored);
    }

    #[test]
    fn deserialize_rejects_an_absurd_slot_count() {
        let mut page = Page::new(3, 1);
        page.insert(1, b"x").expect("insert");
        let mut buf = page.serialize();
        buf[4] = 0xff;
        buf[5] = 0xff;
        let err = Page::deserialize(&buf).expect_err("corrupt page must not parse");
        assert!(matches!(err, StorageError::Corruption(_)));
    }

    #[test]
    fn deserialize_rejects_out_of_bounds_free_space_offset() {
        let mut page = Page::new(3, 1);
        page.insert(1, b"x").expect("insert");
        let mut buf = page.serialize();
        buf[8] = 0xff;
        buf[9] = 0xff;
        let err = Page::deserialize(&buf).expect_err("corrupt page must not parse");
        assert!(matches!(err, StorageError::Corruption(_)));
    }

    #[test]
    fn bitmap_tracks_the_lowest_clear_bit() {
        let mut bitmap = FreeIdBitmap::new();
        assert_eq!(bitmap.first_clear(), Some(0));
        bitmap.set(0);
        bitmap.set(1);
        assert_eq!(bitmap.first_clear(), Some(2));
        bitmap.clear(0);
        assert_eq!(bitmap.first_clear(), Some(0));
        for i in 0..IDS_PER_PAGE {
            bitmap.set(i);
        }
        assert_eq!(bitmap.first_clear(), None);
    }
}
