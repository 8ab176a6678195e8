//! Where each player currently is on the proxy.
//!
//! Sub-server membership is left to the proxy itself; only player locations
//! are needed to tell a join from a switch.

use std::collections::HashMap;

/// Outcome of a player finishing a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presence {
    /// First sub-server since joining the proxy.
    Joined,
    /// Moved from another sub-server.
    Switched { from: String },
    /// Already on this sub-server.
    Unchanged,
}

#[derive(Debug, Default)]
pub struct ProxyState {
    players: HashMap<String, String>,
}

impl ProxyState {
    pub fn connected(&mut self, player: &str, server: &str) -> Presence {
        match self.players.insert(player.to_string(), server.to_string()) {
            None => Presence::Joined,
            Some(prev) if prev == server => Presence::Unchanged,
            Some(prev) => Presence::Switched { from: prev },
        }
    }

    /// Forget a player. Returns the sub-server they were on.
    pub fn disconnect(&mut self, player: &str) -> Option<String> {
        self.players.remove(player)
    }

    /// Drop everything learned from a proxy session.
    pub fn clear(&mut self) {
        self.players.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_then_switch() {
        let mut state = ProxyState::default();

        assert_eq!(state.connected("Steve", "lobby"), Presence::Joined);
        assert_eq!(state.connected("Steve", "lobby"), Presence::Unchanged);
        assert_eq!(
            state.connected("Steve", "arena"),
            Presence::Switched {
                from: "lobby".to_string()
            }
        );
        assert_eq!(state.disconnect("Steve").as_deref(), Some("arena"));
        assert_eq!(state.connected("Steve", "arena"), Presence::Joined);
    }

    #[test]
    fn test_clear_forgets_players() {
        let mut state = ProxyState::default();
        state.connected("Steve", "lobby");
        state.clear();

        assert_eq!(state.disconnect("Steve"), None);
        assert_eq!(state.connected("Steve", "arena"), Presence::Joined);
    }
}
