//! The calendar: a timestamp-ordered, doubly linked list of notices.
//!
//! Each [`Notice`] is one scheduled occurrence of an event. Nodes live in an
//! arena and link to each other by [`NoticeId`], so the whole structure
//! serializes to a flat blob and back without losing its shape.
//!
//! ```text
//!  head
//!   │
//!   ▼
//! ┌─────┐  following  ┌─────┐  following  ┌─────┐
//! │ t=0 │────────────▶│ t=2 │────────────▶│ t=7 │──▶ None
//! │     │◀────────────│     │◀────────────│     │
//! └─────┘  previous   └─────┘  previous   └─────┘
//! ```
//!
//! Traversal along `following` yields non-decreasing timestamps. Notices with
//! equal timestamps keep insertion order reversed: a new notice is spliced in
//! front of the first node it does not exceed.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{GensimError, Result};
use crate::types::EventId;

// ---------------------------------------------------------------------------
// Notices
// ---------------------------------------------------------------------------

/// Handle to a node of a [`Calendar`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoticeId(u32);

impl fmt::Display for NoticeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl NoticeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// One scheduled occurrence of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    /// The event due at `timestamp`.
    pub event_id: EventId,
    /// Absolute Unix seconds.
    pub timestamp: i64,
}

impl Notice {
    /// Create a notice.
    #[must_use]
    pub fn new(event_id: EventId, timestamp: i64) -> Self {
        Self { event_id, timestamp }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Node {
    notice: Notice,
    previous: Option<NoticeId>,
    following: Option<NoticeId>,
}

/// Result of [`Calendar::ids_in_range`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeScan {
    /// Events of the notices with `start < timestamp <= end`, in order.
    pub event_ids: Vec<EventId>,
    /// Where the next scan should resume; `None` once the list is exhausted.
    pub cursor: Option<NoticeId>,
}

// ---------------------------------------------------------------------------
// Calendar
// ---------------------------------------------------------------------------

/// Arena-backed doubly linked list of notices with a retained head.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calendar {
    nodes: Vec<Option<Node>>,
    free: Vec<NoticeId>,
    head: Option<NoticeId>,
}

impl Calendar {
    /// An empty calendar.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A calendar holding a single notice.
    #[must_use]
    pub fn starting_with(notice: Notice) -> (Self, NoticeId) {
        let id = NoticeId(0);
        let calendar = Self {
            nodes: vec![Some(Node {
                notice,
                previous: None,
                following: None,
            })],
            free: Vec::new(),
            head: Some(id),
        };
        (calendar, id)
    }

    /// The retained head, normally the earliest notice.
    #[must_use]
    pub fn head(&self) -> Option<NoticeId> {
        self.head
    }

    /// Number of live notices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    /// Whether the calendar holds no notices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// The notice stored at `id`.
    #[must_use]
    pub fn notice(&self, id: NoticeId) -> Option<&Notice> {
        self.node(id).map(|n| &n.notice)
    }

    /// The node before `id`.
    #[must_use]
    pub fn previous(&self, id: NoticeId) -> Option<NoticeId> {
        self.node(id).and_then(|n| n.previous)
    }

    /// The node after `id`.
    #[must_use]
    pub fn following(&self, id: NoticeId) -> Option<NoticeId> {
        self.node(id).and_then(|n| n.following)
    }

    fn node(&self, id: NoticeId) -> Option<&Node> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: NoticeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index()).and_then(Option::as_mut)
    }

    fn live(&self, id: NoticeId) -> Result<&Node> {
        self.node(id).ok_or(GensimError::NoticeNotFound(id))
    }

    fn alloc(&mut self, notice: Notice) -> Result<NoticeId> {
        let node = Node {
            notice,
            previous: None,
            following: None,
        };
        if let Some(id) = self.free.pop() {
            self.nodes[id.index()] = Some(node);
            return Ok(id);
        }
        let id = slot_for(self.nodes.len())?;
        self.nodes.push(Some(node));
        Ok(id)
    }

    fn set_following(&mut self, id: Option<NoticeId>, following: Option<NoticeId>) {
        if let Some(node) = id.and_then(|id| self.node_mut(id)) {
            node.following = following;
        }
    }

    fn set_previous(&mut self, id: Option<NoticeId>, previous: Option<NoticeId>) {
        if let Some(node) = id.and_then(|id| self.node_mut(id)) {
            node.previous = previous;
        }
    }

    // -----------------------------------------------------------------------
    // Insertion
    // -----------------------------------------------------------------------

    /// Insert `notice` starting the search at `from`, which may be any node.
    ///
    /// Later notices walk along `following` until they meet a node they do
    /// not exceed (or the end); earlier or equal ones walk back along
    /// `previous` while the predecessor is not earlier. The new node is
    /// spliced in front of where the walk stops.
    ///
    /// # Errors
    /// Returns [`GensimError::NoticeNotFound`] if `from` is not a live node
    /// and [`GensimError::Capacity`] once every handle is taken.
    pub fn insert_at(&mut self, from: NoticeId, notice: Notice) -> Result<NoticeId> {
        let ts = notice.timestamp;
        let mut current = from;
        let mut node = self.live(current)?;

        if ts > node.notice.timestamp {
            loop {
                let following = node.following;
                match following {
                    Some(next) => {
                        current = next;
                        node = self.live(current)?;
                        if ts <= node.notice.timestamp {
                            break;
                        }
                    }
                    None => {
                        let id = self.alloc(notice)?;
                        self.set_following(Some(current), Some(id));
                        self.set_previous(Some(id), Some(current));
                        return Ok(id);
                    }
                }
            }
        } else {
            while let Some(prev) = node.previous {
                let prev_node = self.live(prev)?;
                if ts > prev_node.notice.timestamp {
                    break;
                }
                current = prev;
                node = prev_node;
            }
        }

        // splice in front of `current`
        let before = node.previous;
        let id = self.alloc(notice)?;
        self.set_following(before, Some(id));
        self.set_previous(Some(id), before);
        self.set_following(Some(id), Some(current));
        self.set_previous(Some(current), Some(id));
        if self.head == Some(current) && before.is_none() {
            self.head = Some(id);
        }
        Ok(id)
    }

    /// Insert `notice` from the head and re-anchor the head to the earliest
    /// node. An empty calendar simply adopts the notice as its head.
    ///
    /// # Errors
    /// Returns [`GensimError::NoticeNotFound`] if the head link is stale and
    /// [`GensimError::Capacity`] once every handle is taken.
    pub fn schedule(&mut self, notice: Notice) -> Result<NoticeId> {
        let Some(head) = self.head else {
            let id = self.alloc(notice)?;
            self.head = Some(id);
            return Ok(id);
        };
        let id = self.insert_at(head, notice)?;
        self.head = Some(self.earliest(id)?);
        Ok(id)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Walk `previous` links from `from` to the earliest node.
    ///
    /// # Errors
    /// Returns [`GensimError::NoticeNotFound`] if `from` is not a live node.
    pub fn earliest(&self, from: NoticeId) -> Result<NoticeId> {
        let mut current = from;
        let mut node = self.live(current)?;
        while let Some(prev) = node.previous {
            current = prev;
            node = self.live(current)?;
        }
        Ok(current)
    }

    /// Detach and discard `id`, returning the node that followed it.
    ///
    /// When `id` is the earliest node, its successor loses its `previous`
    /// link and becomes the new head. Returns `Ok(None)` when nothing
    /// follows.
    ///
    /// # Errors
    /// Returns [`GensimError::NoticeNotFound`] if `id` is not a live node.
    pub fn pop(&mut self, id: NoticeId) -> Result<Option<NoticeId>> {
        let node = self.live(id)?.clone();
        self.set_following(node.previous, node.following);
        self.set_previous(node.following, node.previous);
        self.nodes[id.index()] = None;
        self.free.push(id);
        if self.head == Some(id) {
            self.head = node.following;
        }
        Ok(node.following)
    }

    /// First node at or after `from` whose timestamp equals `timestamp`.
    #[must_use]
    pub fn find(&self, from: NoticeId, timestamp: i64) -> Option<NoticeId> {
        let mut cursor = Some(from);
        while let Some(id) = cursor {
            let node = self.node(id)?;
            if node.notice.timestamp == timestamp {
                return Some(id);
            }
            cursor = node.following;
        }
        None
    }

    /// Collect the events due in `(start, end]`, scanning from `from`.
    ///
    /// The cursor is the last node inspected that was in range, or the node
    /// following the last skipped one; it is `None` when the scan ran off the
    /// end of the list, meaning nothing is left to resume from.
    ///
    /// # Errors
    /// Returns [`GensimError::NoticeNotFound`] if a link points at a dead node.
    pub fn ids_in_range(&self, from: NoticeId, start: i64, end: i64) -> Result<RangeScan> {
        let mut event_ids = Vec::new();
        let mut notice = Some(from);
        let mut cursor = Some(from);

        while let Some(id) = notice {
            let node = self.live(id)?;
            if node.notice.timestamp > end {
                break;
            }
            if node.notice.timestamp <= start {
                notice = node.following;
                cursor = notice;
                continue;
            }
            event_ids.push(node.notice.event_id);
            cursor = notice;
            notice = node.following;
        }

        Ok(RangeScan { event_ids, cursor })
    }

    /// Iterate notices in order, starting at `from`.
    pub fn iter_from(&self, from: NoticeId) -> impl Iterator<Item = (NoticeId, &Notice)> + '_ {
        let mut cursor = Some(from);
        std::iter::from_fn(move || {
            let id = cursor?;
            let node = self.node(id)?;
            cursor = node.following;
            Some((id, &node.notice))
        })
    }

    /// Iterate notices in order, starting at the head.
    pub fn iter(&self) -> impl Iterator<Item = (NoticeId, &Notice)> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let id = cursor?;
            let node = self.node(id)?;
            cursor = node.following;
            Some((id, &node.notice))
        })
    }

    /// All timestamps from `from` onwards.
    #[must_use]
    pub fn timestamps_from(&self, from: NoticeId) -> Vec<i64> {
        self.iter_from(from).map(|(_, n)| n.timestamp).collect()
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Serialize to an opaque blob.
    ///
    /// # Errors
    /// Returns [`GensimError::Serialization`] if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| GensimError::Serialization(e.to_string()))
    }

    /// Restore a calendar from [`Calendar::to_bytes`] output.
    ///
    /// # Errors
    /// Returns [`GensimError::Serialization`] if the blob is malformed.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| GensimError::Serialization(e.to_string()))
    }
}

/// Handle for the arena slot at `index`.
fn slot_for(index: usize) -> Result<NoticeId> {
    u32::try_from(index)
        .map(NoticeId)
        .map_err(|_| GensimError::Capacity(format!("calendar is full at {index} notices")))
}
