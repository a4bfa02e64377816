//! QUERY / QUERY_CONT enumeration
//!
//! Collections are keyed by a monotonically increasing insertion sequence,
//! so walking the map in key order yields records oldest first. The cursor
//! remembers the last key handed out rather than an index, which keeps the
//! walk stable when records are removed mid-iteration.
//!
//! There is one cursor per resource type and it is not bound to a client.
//! Two clients enumerating the same resource type at the same time advance
//! the same cursor; callers that need a consistent listing must not
//! interleave enumerations of one resource type.

use crate::protocol::Status;
use std::collections::BTreeMap;
use std::ops::Bound;

/// Insertion sequence number
pub type Seq = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorState {
    #[default]
    Idle,
    Iterating {
        last: Seq,
    },
}

/// Iteration position over one resource collection
#[derive(Debug, Default)]
pub struct QueryCursor {
    state: CursorState,
}

impl QueryCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn is_iterating(&self) -> bool {
        matches!(self.state, CursorState::Iterating { .. })
    }

    /// QUERY: restart at the oldest record
    pub fn first<'a, V>(&mut self, map: &'a BTreeMap<Seq, V>) -> Result<&'a V, Status> {
        self.settle(map.iter().next())
    }

    /// QUERY_CONT: advance past the last record returned.
    ///
    /// Called while idle this behaves as an exhausted collection.
    pub fn next<'a, V>(&mut self, map: &'a BTreeMap<Seq, V>) -> Result<&'a V, Status> {
        let CursorState::Iterating { last } = self.state else {
            return Err(Status::EntryNotFound);
        };
        self.settle(map.range((Bound::Excluded(last), Bound::Unbounded)).next())
    }

    pub fn reset(&mut self) {
        self.state = CursorState::Idle;
    }

    fn settle<'a, V>(&mut self, entry: Option<(&Seq, &'a V)>) -> Result<&'a V, Status> {
        match entry {
            Some((seq, value)) => {
                self.state = CursorState::Iterating { last: *seq };
                Ok(value)
            }
            None => {
                self.state = CursorState::Idle;
                Err(Status::EntryNotFound)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection(n: u64) -> BTreeMap<Seq, u64> {
        (1..=n).map(|i| (i, i * 10)).collect()
    }

    #[test]
    fn test_empty_collection() {
        let map: BTreeMap<Seq, u64> = BTreeMap::new();
        let mut cursor = QueryCursor::new();

        assert_eq!(cursor.first(&map), Err(Status::EntryNotFound));
        assert_eq!(cursor.state(), CursorState::Idle);
        assert_eq!(cursor.next(&map), Err(Status::EntryNotFound));
    }

    #[test]
    fn test_n_records_then_not_found() {
        let map = collection(5);
        let mut cursor = QueryCursor::new();

        let mut seen = vec![*cursor.first(&map).unwrap()];
        loop {
            match cursor.next(&map) {
                Ok(v) => seen.push(*v),
                Err(status) => {
                    assert_eq!(status, Status::EntryNotFound);
                    break;
                }
            }
        }

        assert_eq!(seen, vec![10, 20, 30, 40, 50]);
        assert!(!cursor.is_iterating());
    }

    #[test]
    fn test_next_while_idle() {
        let map = collection(3);
        let mut cursor = QueryCursor::new();
        assert_eq!(cursor.next(&map), Err(Status::EntryNotFound));
        assert_eq!(cursor.state(), CursorState::Idle);
    }

    #[test]
    fn test_query_restarts_iteration() {
        let map = collection(3);
        let mut cursor = QueryCursor::new();
        cursor.first(&map).unwrap();
        cursor.next(&map).unwrap();
        assert_eq!(cursor.first(&map), Ok(&10));
    }

    #[test]
    fn test_removal_during_iteration_is_skipped() {
        let mut map = collection(4);
        let mut cursor = QueryCursor::new();

        assert_eq!(cursor.first(&map), Ok(&10));
        map.remove(&2);
        assert_eq!(cursor.next(&map), Ok(&30));
        map.remove(&3);
        assert_eq!(cursor.next(&map), Ok(&40));
    }

    #[test]
    fn test_shared_cursor_interleaves() {
        // Two callers sharing one cursor see each other's progress
        let map = collection(4);
        let mut cursor = QueryCursor::new();

        assert_eq!(cursor.first(&map), Ok(&10));
        assert_eq!(cursor.next(&map), Ok(&20));
        assert_eq!(cursor.first(&map), Ok(&10));
        assert_eq!(cursor.next(&map), Ok(&20));
        assert_eq!(cursor.next(&map), Ok(&30));
    }
}
