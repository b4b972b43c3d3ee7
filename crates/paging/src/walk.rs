//! Software walk of guest page tables through the provider's host view.
//!
//! Used to check freshly built address spaces and to copy bytes in and out
//! of guest virtual memory before the vCPU ever runs.

use gvm_utils::{PAGE_SIZE, split_address};

use crate::addr::{Gpa, Gva, TableIndex};
use crate::entry::{PageTableEntry, PageTableFlags};
use crate::error::PagingError;
use crate::page::PhysPage;
use crate::traits::GuestMemoryProvider;

/// Result of translating one guest virtual address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Translation {
    /// Backing GPA, including the offset of the translated address.
    pub gpa: Gpa,
    /// The PTE that mapped the page.
    pub leaf: PageTableEntry,
    /// Access granted by the whole walk: writable and user only if every
    /// level allows it, no-execute if any level forbids execution.
    pub effective: PageTableFlags,
}

fn table_page<M>(memory: &M, table: Gpa) -> Result<&PhysPage, PagingError>
where
    M: GuestMemoryProvider + ?Sized,
{
    memory
        .host_for(table)
        .and_then(|host| memory.page(host))
        .ok_or(PagingError::HostPageUnavailable)
}

fn read_entry<M>(memory: &M, table: Gpa, index: TableIndex) -> Result<PageTableEntry, PagingError>
where
    M: GuestMemoryProvider + ?Sized,
{
    Ok(table_page(memory, table)?.entry(index))
}

/// Translate `gva` using the address space rooted at `root`.
///
/// Returns `Ok(None)` when any level is not present. Large pages are not
/// produced by the builder and are not followed.
pub fn translate<M>(memory: &M, root: Gpa, gva: Gva) -> Result<Option<Translation>, PagingError>
where
    M: GuestMemoryProvider + ?Sized,
{
    let (page, offset) = gva.split();
    let indices = page.indices();

    let mut effective = PageTableFlags::PRESENT
        | PageTableFlags::WRITABLE
        | PageTableFlags::USER_ACCESSIBLE;
    let mut table = root;
    let mut leaf = PageTableEntry::empty();

    for index in [indices.pml4, indices.pdpt, indices.pd, indices.pt] {
        let entry = read_entry(memory, table, index)?;
        if !entry.is_present() {
            return Ok(None);
        }
        let flags = entry.flags();
        effective &= flags | PageTableFlags::NO_EXECUTE;
        effective |= flags & PageTableFlags::NO_EXECUTE;
        table = entry.address();
        leaf = entry;
    }

    Ok(Some(Translation {
        gpa: Gpa(leaf.address().0 | offset),
        leaf,
        effective,
    }))
}

/// Copy guest virtual memory at `gva` into `buf`, crossing pages as needed.
pub fn read_virt<M>(memory: &M, root: Gpa, gva: Gva, buf: &mut [u8]) -> Result<(), PagingError>
where
    M: GuestMemoryProvider + ?Sized,
{
    let mut done = 0;
    while done < buf.len() {
        let (gpa, offset, chunk) = next_chunk(memory, root, gva, done, buf.len())?;
        let bytes = table_page(memory, gpa)?.as_bytes();
        buf[done..done + chunk].copy_from_slice(&bytes[offset..offset + chunk]);
        done += chunk;
    }
    Ok(())
}

/// Copy `data` into guest virtual memory at `gva`.
///
/// This is a host-side write: page protections are not enforced.
pub fn write_virt<M>(memory: &mut M, root: Gpa, gva: Gva, data: &[u8]) -> Result<(), PagingError>
where
    M: GuestMemoryProvider + ?Sized,
{
    let mut done = 0;
    while done < data.len() {
        let (gpa, offset, chunk) = next_chunk(memory, root, gva, done, data.len())?;
        let host = memory.host_for(gpa).ok_or(PagingError::HostPageUnavailable)?;
        let page = memory.page_mut(host).ok_or(PagingError::HostPageUnavailable)?;
        page.as_bytes_mut()[offset..offset + chunk].copy_from_slice(&data[done..done + chunk]);
        done += chunk;
    }
    Ok(())
}

/// Page GPA, in-page offset and byte count for the next piece of an access.
fn next_chunk<M>(
    memory: &M,
    root: Gpa,
    gva: Gva,
    done: usize,
    total: usize,
) -> Result<(Gpa, usize, usize), PagingError>
where
    M: GuestMemoryProvider + ?Sized,
{
    let cur = gva
        .0
        .checked_add(done as u64)
        .ok_or(PagingError::InvalidArgument)?;
    let translation = translate(memory, root, Gva(cur))?.ok_or_else(|| {
        log::error!("[PAGING] GVA {:#x} is not mapped", cur);
        PagingError::InvalidArgument
    })?;
    let (page, offset) = split_address(translation.gpa.0);
    let offset = offset as usize;
    let chunk = (PAGE_SIZE as usize - offset).min(total - done);
    Ok((Gpa(page), offset, chunk))
}
