//! Seat registry: the latest seat snapshot plus the user's local selection.

use crate::types::{Seat, SeatId, SeatStatus};
use std::collections::BTreeSet;

/// One row of the seat map as the view renders it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeatView {
    /// Seat identity
    pub id: SeatId,
    /// Display label
    pub name: String,
    /// Status from the latest snapshot
    pub status: SeatStatus,
    /// Whether the user has selected the seat
    pub selected: bool,
}

/// Current seat states and the selection made from them
///
/// Seat states only change by whole snapshots from the booking backend. The selection is
/// local and can only ever contain seats that are present and selectable.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeatRegistry {
    seats: Vec<Seat>,
    selected: BTreeSet<SeatId>,
}

impl SeatRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every seat with `seats`
    ///
    /// Selected seats that are missing from the snapshot, or no longer selectable, are
    /// dropped from the selection. Returns how many were dropped.
    pub fn replace_all(&mut self, seats: Vec<Seat>) -> usize {
        self.seats = seats;

        let before = self.selected.len();
        let seats = &self.seats;
        self.selected.retain(|id| {
            seats
                .iter()
                .any(|seat| seat.id == *id && seat.status.is_selectable())
        });
        let pruned = before - self.selected.len();

        if pruned > 0 {
            tracing::debug!(pruned, "Snapshot removed selected seats from the selection");
        }
        pruned
    }

    /// Flip the selection of a seat
    ///
    /// Unknown or unselectable seats are ignored. Returns whether anything changed.
    pub fn toggle_selection(&mut self, seat_id: SeatId) -> bool {
        let selectable = self
            .get(seat_id)
            .is_some_and(|seat| seat.status.is_selectable());
        if !selectable {
            return false;
        }

        if !self.selected.remove(&seat_id) {
            self.selected.insert(seat_id);
        }
        true
    }

    /// Drop the whole selection
    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    /// Selected seat ids, ascending
    #[must_use]
    pub fn selected_ids(&self) -> Vec<SeatId> {
        self.selected.iter().copied().collect()
    }

    /// Whether a seat is selected
    #[must_use]
    pub fn is_selected(&self, seat_id: SeatId) -> bool {
        self.selected.contains(&seat_id)
    }

    /// Look up a seat in the current snapshot
    #[must_use]
    pub fn get(&self, seat_id: SeatId) -> Option<&Seat> {
        self.seats.iter().find(|seat| seat.id == seat_id)
    }

    /// Seats in the current snapshot, in snapshot order
    #[must_use]
    pub fn seats(&self) -> &[Seat] {
        &self.seats
    }

    /// Rows for the seat map, in snapshot order
    #[must_use]
    pub fn view(&self) -> Vec<SeatView> {
        self.seats
            .iter()
            .map(|seat| SeatView {
                id: seat.id,
                name: seat.name.clone(),
                status: seat.status,
                selected: self.selected.contains(&seat.id),
            })
            .collect()
    }
}
