//! Distributing image copies across sheet slots
//!
//! Two halves of one policy: [`initial_counts`] decides how many slots each
//! newly selected image should claim, and [`slot_indices`] fills the slots
//! from those counts at render time. Over-allocation is not an error: copies
//! that do not fit are dropped from the end.

use crate::images::{ImageItem, ItemId};

/// How many slots each of `num_items` freshly selected images starts with.
///
/// A single image starts with one copy. Several images split the sheet
/// evenly with the last one taking the remainder. With more images than
/// slots every image gets one copy, so the total can exceed `total_slots`.
pub fn initial_counts(total_slots: usize, num_items: usize) -> Vec<u32> {
    match num_items {
        0 => Vec::new(),
        1 => vec![1],
        n => {
            let base = total_slots / n;
            if base == 0 {
                return vec![1; n];
            }
            let last = total_slots - base * (n - 1);
            let mut counts = vec![to_count(base); n];
            counts[n - 1] = to_count(last);
            counts
        }
    }
}

fn to_count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX).max(1)
}

/// Fill `total_slots` slots from per-item copy counts, in item order.
///
/// Slot `i` gets the index of the item whose cumulative range covers `i`;
/// slots past the summed counts stay `None`.
pub fn slot_indices<I>(total_slots: usize, counts: I) -> Vec<Option<usize>>
where
    I: IntoIterator<Item = u32>,
{
    let mut slots = Vec::with_capacity(total_slots);
    for (item, count) in counts.into_iter().enumerate() {
        let room = total_slots - slots.len();
        if room == 0 {
            break;
        }
        let take = (count as usize).min(room);
        slots.extend(std::iter::repeat_n(Some(item), take));
    }
    slots.resize(total_slots, None);
    slots
}

/// Slot-to-item mapping for one sheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotAssignment {
    /// Item placed in each slot, in slot order
    pub slots: Vec<Option<ItemId>>,
    /// Requested copies that did not fit on the sheet
    pub dropped_copies: u64,
}

impl SlotAssignment {
    pub fn placed_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn empty_count(&self) -> usize {
        self.slots.len() - self.placed_count()
    }

    pub fn item_at(&self, slot: usize) -> Option<ItemId> {
        self.slots.get(slot).copied().flatten()
    }
}

/// Assign `items` to `total_slots` slots.
pub fn assign_slots(total_slots: usize, items: &[ImageItem]) -> SlotAssignment {
    let indices = slot_indices(total_slots, items.iter().map(|item| item.count));
    let slots: Vec<Option<ItemId>> = indices
        .into_iter()
        .map(|idx| idx.map(|i| items[i].id))
        .collect();
    let requested: u64 = items.iter().map(|item| u64::from(item.count)).sum();
    let placed = slots.iter().filter(|s| s.is_some()).count() as u64;

    SlotAssignment {
        slots,
        dropped_copies: requested - placed,
    }
}

/// Why a count edit was refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CountError {
    #[error("an image must fill at least one slot")]
    Zero,
    #[error("no selected image with id {0}")]
    UnknownItem(ItemId),
}

/// Explicit count edit for one item
pub fn set_count(items: &mut [ImageItem], id: ItemId, count: u32) -> Result<(), CountError> {
    if count == 0 {
        return Err(CountError::Zero);
    }
    let item = items
        .iter_mut()
        .find(|item| item.id == id)
        .ok_or(CountError::UnknownItem(id))?;
    item.count = count;
    Ok(())
}
