//! Point-in-time fleet status, copied out under the collection lock and
//! rendered after it is released

use serde::Serialize;

use crate::fleet::bot::{BotStatusRow, ConnectionState};

/// Bot count per connection state. Every state is present, even at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateTotals {
    counts: [usize; ConnectionState::ALL.len()],
}

impl StateTotals {
    pub fn add(&mut self, state: ConnectionState) {
        self.counts[state.index()] += 1;
    }

    pub fn get(&self, state: ConnectionState) -> usize {
        self.counts[state.index()]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// `(state, count)` pairs in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (ConnectionState, usize)> + '_ {
        ConnectionState::ALL.iter().map(|s| (*s, self.get(*s)))
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FleetStatus {
    pub rows: Vec<BotStatusRow>,
    pub totals: StateTotals,
}

impl FleetStatus {
    /// Totals are computed from the rows themselves, so they always agree
    pub fn from_rows(rows: Vec<BotStatusRow>) -> Self {
        let mut totals = StateTotals::default();
        for row in &rows {
            totals.add(row.state);
        }
        Self { rows, totals }
    }

    pub fn bot_count(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, state: ConnectionState) -> BotStatusRow {
        BotStatusRow {
            name: name.to_string(),
            region: "none".to_string(),
            state,
            attempts: 1,
        }
    }

    #[test]
    fn test_empty_status_lists_every_state() {
        let status = FleetStatus::from_rows(Vec::new());

        let states: Vec<ConnectionState> = status.totals.iter().map(|(s, _)| s).collect();
        assert_eq!(states, ConnectionState::ALL.to_vec());
        assert!(status.totals.iter().all(|(_, n)| n == 0));
    }

    #[test]
    fn test_totals_sum_to_bot_count() {
        let status = FleetStatus::from_rows(vec![
            row("a", ConnectionState::Connected),
            row("b", ConnectionState::Connected),
            row("c", ConnectionState::Connecting),
            row("d", ConnectionState::Disconnected),
        ]);

        assert_eq!(status.totals.get(ConnectionState::Connected), 2);
        assert_eq!(status.totals.get(ConnectionState::Connecting), 1);
        assert_eq!(status.totals.get(ConnectionState::Disconnected), 1);
        assert_eq!(status.totals.total(), status.bot_count());
    }
}
