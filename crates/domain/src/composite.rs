//! Composite sub-entity stores
//!
//! Rooms, specials and refund tiers are multi-row sub-forms kept next to the
//! answer map rather than inside it. Every operation returns a new list.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::DomainError;
use crate::ids::EntryId;
use crate::options::CompositeKind;

/// Accept strings, numbers or null for user-entered fields.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

// =============================================================================
// Entries
// =============================================================================

/// One seasonal price grid with four day buckets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceGrid {
    #[serde(default, deserialize_with = "lenient_string")]
    pub weekday: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub fri: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub sat: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub sun: String,
}

impl PriceGrid {
    pub fn is_complete(&self) -> bool {
        [&self.weekday, &self.fri, &self.sat, &self.sun]
            .iter()
            .all(|v| !is_blank(v))
    }

    pub fn is_blank(&self) -> bool {
        [&self.weekday, &self.fri, &self.sat, &self.sun]
            .iter()
            .all(|v| is_blank(v))
    }

    fn bucket_mut(&mut self, day: DayBucket) -> &mut String {
        match day {
            DayBucket::Weekday => &mut self.weekday,
            DayBucket::Fri => &mut self.fri,
            DayBucket::Sat => &mut self.sat,
            DayBucket::Sun => &mut self.sun,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Season {
    Low,
    Mid,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayBucket {
    Weekday,
    Fri,
    Sat,
    Sun,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomEntry {
    #[serde(skip)]
    pub id: EntryId,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub desc: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub standard_occupancy: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub max_occupancy: String,
    /// Free-text bed/room configuration
    #[serde(default, rename = "type", deserialize_with = "lenient_string")]
    pub room_type: String,
    #[serde(default)]
    pub price_low: PriceGrid,
    #[serde(default)]
    pub price_mid: PriceGrid,
    #[serde(default)]
    pub price_high: PriceGrid,
}

impl RoomEntry {
    pub fn blank() -> Self {
        Self {
            id: EntryId::new(),
            name: String::new(),
            desc: String::new(),
            standard_occupancy: String::new(),
            max_occupancy: String::new(),
            room_type: String::new(),
            price_low: PriceGrid::default(),
            price_mid: PriceGrid::default(),
            price_high: PriceGrid::default(),
        }
    }

    pub fn price(&self, season: Season) -> &PriceGrid {
        match season {
            Season::Low => &self.price_low,
            Season::Mid => &self.price_mid,
            Season::High => &self.price_high,
        }
    }

    /// Every text field and all twelve price buckets are filled.
    pub fn is_complete(&self) -> bool {
        [
            &self.name,
            &self.desc,
            &self.standard_occupancy,
            &self.max_occupancy,
            &self.room_type,
        ]
        .iter()
        .all(|v| !is_blank(v))
            && [Season::Low, Season::Mid, Season::High]
                .iter()
                .all(|s| self.price(*s).is_complete())
    }

    pub fn is_blank(&self) -> bool {
        [
            &self.name,
            &self.desc,
            &self.standard_occupancy,
            &self.max_occupancy,
            &self.room_type,
        ]
        .iter()
        .all(|v| is_blank(v))
            && [Season::Low, Season::Mid, Season::High]
                .iter()
                .all(|s| self.price(*s).is_blank())
    }

    fn apply(&mut self, patch: RoomPatch) {
        match patch {
            RoomPatch::Name(v) => self.name = v,
            RoomPatch::Desc(v) => self.desc = v,
            RoomPatch::StandardOccupancy(v) => self.standard_occupancy = v,
            RoomPatch::MaxOccupancy(v) => self.max_occupancy = v,
            RoomPatch::RoomType(v) => self.room_type = v,
            RoomPatch::Price { season, day, value } => {
                let grid = match season {
                    Season::Low => &mut self.price_low,
                    Season::Mid => &mut self.price_mid,
                    Season::High => &mut self.price_high,
                };
                *grid.bucket_mut(day) = value;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomPatch {
    Name(String),
    Desc(String),
    StandardOccupancy(String),
    MaxOccupancy(String),
    RoomType(String),
    Price {
        season: Season,
        day: DayBucket,
        value: String,
    },
}

/// Promotional item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialEntry {
    #[serde(skip)]
    pub id: EntryId,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub desc: String,
}

impl SpecialEntry {
    pub fn blank() -> Self {
        Self {
            id: EntryId::new(),
            name: String::new(),
            desc: String::new(),
        }
    }

    pub fn is_blank(&self) -> bool {
        is_blank(&self.name) && is_blank(&self.desc)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialPatch {
    Name(String),
    Desc(String),
}

/// Cancellation-fee tier.
///
/// Position matters: index 0 is the optional base fee, index 1 the same-day
/// fee, and later tiers are day offsets before the visit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundTier {
    #[serde(skip)]
    pub id: EntryId,
    #[serde(default, deserialize_with = "lenient_string")]
    pub day: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub percent: String,
}

impl RefundTier {
    pub fn blank() -> Self {
        Self {
            id: EntryId::new(),
            day: String::new(),
            percent: String::new(),
        }
    }

    pub fn is_blank(&self) -> bool {
        is_blank(&self.day) && is_blank(&self.percent)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundPatch {
    Day(String),
    Percent(String),
}

/// Number of leading refund tiers that can never be removed.
pub const FIXED_REFUND_TIERS: usize = 2;

// =============================================================================
// Lists
// =============================================================================

pub trait CompositeEntry: Clone {
    fn id(&self) -> EntryId;
}

impl CompositeEntry for RoomEntry {
    fn id(&self) -> EntryId {
        self.id
    }
}

impl CompositeEntry for SpecialEntry {
    fn id(&self) -> EntryId {
        self.id
    }
}

impl CompositeEntry for RefundTier {
    fn id(&self) -> EntryId {
        self.id
    }
}

/// Asked before a room or special is removed.
pub trait RemovalConfirmer {
    fn confirm_removal(&self, kind: CompositeKind, index: usize) -> bool;
}

impl<F> RemovalConfirmer for F
where
    F: Fn(CompositeKind, usize) -> bool,
{
    fn confirm_removal(&self, kind: CompositeKind, index: usize) -> bool {
        self(kind, index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome<L> {
    Removed(L),
    /// The confirmation hook declined; the list is unchanged
    Declined,
}

/// Ordered list of composite entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryList<T> {
    entries: Vec<T>,
}

pub type RoomList = EntryList<RoomEntry>;
pub type SpecialList = EntryList<SpecialEntry>;
pub type RefundSchedule = EntryList<RefundTier>;

impl<T: CompositeEntry> EntryList<T> {
    pub fn from_entries(entries: Vec<T>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[T] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn position(&self, id: EntryId) -> Option<usize> {
        self.entries.iter().position(|e| e.id() == id)
    }

    fn pushed(&self, entry: T) -> Self {
        let mut entries = self.entries.clone();
        entries.push(entry);
        Self { entries }
    }

    fn without(&self, index: usize) -> Self {
        let mut entries = self.entries.clone();
        entries.remove(index);
        Self { entries }
    }

    fn updated(
        &self,
        id: EntryId,
        kind: &'static str,
        f: impl FnOnce(&mut T),
    ) -> Result<Self, DomainError> {
        let index = self
            .position(id)
            .ok_or_else(|| DomainError::not_found(kind, id.to_string()))?;
        let mut entries = self.entries.clone();
        f(&mut entries[index]);
        Ok(Self { entries })
    }

    /// Removal shared by rooms and specials: at least one entry must remain,
    /// and the confirmer has the final say.
    fn remove_confirmed(
        &self,
        id: EntryId,
        kind: CompositeKind,
        entity: &'static str,
        confirmer: &dyn RemovalConfirmer,
    ) -> Result<RemoveOutcome<Self>, DomainError> {
        let index = self
            .position(id)
            .ok_or_else(|| DomainError::not_found(entity, id.to_string()))?;
        if self.entries.len() <= 1 {
            return Err(DomainError::constraint(format!(
                "at least one {} must remain",
                entity.to_lowercase()
            )));
        }
        if !confirmer.confirm_removal(kind, index) {
            return Ok(RemoveOutcome::Declined);
        }
        Ok(RemoveOutcome::Removed(self.without(index)))
    }
}

impl<T: CompositeEntry> Default for EntryList<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl RoomList {
    /// Append a room seeded with the last room's values, or a blank one.
    pub fn add(&self) -> Self {
        let entry = match self.entries.last() {
            Some(last) => RoomEntry {
                id: EntryId::new(),
                ..last.clone()
            },
            None => RoomEntry::blank(),
        };
        self.pushed(entry)
    }

    pub fn remove(
        &self,
        id: EntryId,
        confirmer: &dyn RemovalConfirmer,
    ) -> Result<RemoveOutcome<Self>, DomainError> {
        self.remove_confirmed(id, CompositeKind::Rooms, "Room", confirmer)
    }

    pub fn update(&self, id: EntryId, patch: RoomPatch) -> Result<Self, DomainError> {
        self.updated(id, "Room", |room| room.apply(patch))
    }
}

impl SpecialList {
    pub fn add(&self) -> Self {
        self.pushed(SpecialEntry::blank())
    }

    pub fn remove(
        &self,
        id: EntryId,
        confirmer: &dyn RemovalConfirmer,
    ) -> Result<RemoveOutcome<Self>, DomainError> {
        self.remove_confirmed(id, CompositeKind::Specials, "Special", confirmer)
    }

    pub fn update(&self, id: EntryId, patch: SpecialPatch) -> Result<Self, DomainError> {
        self.updated(id, "Special", |special| match patch {
            SpecialPatch::Name(v) => special.name = v,
            SpecialPatch::Desc(v) => special.desc = v,
        })
    }
}

impl RefundSchedule {
    /// The two fixed tiers, both blank.
    pub fn seeded() -> Self {
        Self {
            entries: (0..FIXED_REFUND_TIERS).map(|_| RefundTier::blank()).collect(),
        }
    }

    pub fn add(&self) -> Self {
        self.pushed(RefundTier::blank())
    }

    /// Remove a user-added tier. The fixed leading tiers are refused.
    pub fn remove(&self, id: EntryId) -> Result<Self, DomainError> {
        let index = self
            .position(id)
            .ok_or_else(|| DomainError::not_found("RefundTier", id.to_string()))?;
        if index < FIXED_REFUND_TIERS {
            return Err(DomainError::constraint(format!(
                "refund tier {index} is fixed and cannot be removed"
            )));
        }
        Ok(self.without(index))
    }

    pub fn update(&self, id: EntryId, patch: RefundPatch) -> Result<Self, DomainError> {
        self.updated(id, "RefundTier", |tier| match patch {
            RefundPatch::Day(v) => tier.day = v,
            RefundPatch::Percent(v) => tier.percent = v,
        })
    }
}

// =============================================================================
// Stores
// =============================================================================

/// The three composite lists of one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeStores {
    pub rooms: RoomList,
    pub specials: SpecialList,
    pub refunds: RefundSchedule,
}

impl Default for CompositeStores {
    fn default() -> Self {
        Self {
            rooms: RoomList::from_entries(vec![RoomEntry::blank()]),
            specials: SpecialList::from_entries(vec![SpecialEntry::blank()]),
            refunds: RefundSchedule::seeded(),
        }
    }
}

impl CompositeStores {
    /// Rebuild stores from saved lists, falling back to the seeded defaults
    /// for empty lists and padding refunds up to the fixed tiers.
    pub fn restore(
        rooms: Vec<RoomEntry>,
        specials: Vec<SpecialEntry>,
        mut refunds: Vec<RefundTier>,
    ) -> Self {
        let defaults = Self::default();
        while !refunds.is_empty() && refunds.len() < FIXED_REFUND_TIERS {
            refunds.push(RefundTier::blank());
        }
        Self {
            rooms: if rooms.is_empty() {
                defaults.rooms
            } else {
                RoomList::from_entries(rooms)
            },
            specials: if specials.is_empty() {
                defaults.specials
            } else {
                SpecialList::from_entries(specials)
            },
            refunds: if refunds.is_empty() {
                defaults.refunds
            } else {
                RefundSchedule::from_entries(refunds)
            },
        }
    }
}
