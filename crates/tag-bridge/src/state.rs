//! Per-request routing state saved while a request is in flight.

use std::collections::HashMap;

use crate::{BridgeError, PortId, TransactionId};

/// Routing identity saved when a request that expects a response is
/// forwarded, restored on the matching response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestState {
    /// Source identity of the request before any downstream rewriting.
    pub orig_src: PortId,
}

/// Side table of [`RequestState`] keyed by transaction identity.
///
/// Each bridge owns its own table, so chained bridges never share entries.
#[derive(Debug, Default)]
pub struct RequestStateTable {
    entries: HashMap<TransactionId, RequestState>,
}

impl RequestStateTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Saves the state for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::DuplicateRequestState`] if `id` already has an
    /// entry; the existing entry is kept.
    pub fn insert(&mut self, id: TransactionId, state: RequestState) -> Result<(), BridgeError> {
        if self.entries.contains_key(&id) {
            return Err(BridgeError::DuplicateRequestState { id });
        }
        self.entries.insert(id, state);
        Ok(())
    }

    /// Removes and returns the state saved for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::MissingRequestState`] when nothing was saved.
    pub fn take(&mut self, id: TransactionId) -> Result<RequestState, BridgeError> {
        self.entries
            .remove(&id)
            .ok_or(BridgeError::MissingRequestState { id })
    }

    /// Returns `true` when state is saved for `id`.
    #[must_use]
    pub fn contains(&self, id: TransactionId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of requests awaiting their response.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no request is awaiting a response.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{RequestState, RequestStateTable};
    use crate::{BridgeError, PortId, TransactionId};

    #[test]
    fn state_is_consumed_exactly_once() {
        let mut table = RequestStateTable::new();
        let state = RequestState {
            orig_src: PortId(3),
        };
        table.insert(TransactionId(1), state).expect("fresh id");
        assert!(table.contains(TransactionId(1)));
        assert_eq!(table.take(TransactionId(1)), Ok(state));
        assert!(table.is_empty());
        assert_eq!(
            table.take(TransactionId(1)),
            Err(BridgeError::MissingRequestState {
                id: TransactionId(1)
            })
        );
    }

    #[test]
    fn duplicate_insert_keeps_original_entry() {
        let mut table = RequestStateTable::new();
        table
            .insert(
                TransactionId(4),
                RequestState {
                    orig_src: PortId(1),
                },
            )
            .expect("fresh id");
        assert_eq!(
            table.insert(
                TransactionId(4),
                RequestState {
                    orig_src: PortId(2)
                }
            ),
            Err(BridgeError::DuplicateRequestState {
                id: TransactionId(4)
            })
        );
        assert_eq!(
            table.take(TransactionId(4)).map(|state| state.orig_src),
            Ok(PortId(1))
        );
        assert_eq!(table.len(), 0);
    }
}
