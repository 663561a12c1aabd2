use crate::websocket::ConnectionId;

/// Connection id -> display name for everyone currently in the room.
///
/// Entries keep the order in which their connection first registered.
/// Re-registering renames in place; a connection that leaves and comes
/// back is appended at the end. Display names are not unique.
#[derive(Debug, Default)]
pub struct PresenceTable {
    entries: Vec<(ConnectionId, String)>,
}

impl PresenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite. Returns the previous name, if any.
    pub fn register(&mut self, id: ConnectionId, display_name: String) -> Option<String> {
        match self.entries.iter_mut().find(|(entry_id, _)| *entry_id == id) {
            Some((_, name)) => Some(std::mem::replace(name, display_name)),
            None => {
                self.entries.push((id, display_name));
                None
            }
        }
    }

    /// Idempotent; removing an absent connection is a no-op.
    pub fn remove(&mut self, id: &ConnectionId) -> Option<String> {
        let position = self.entries.iter().position(|(entry_id, _)| entry_id == id)?;
        Some(self.entries.remove(position).1)
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.entries.iter().map(|(_, name)| name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
