//! Leaderboard ordering

use serde::{Deserialize, Serialize};

use super::account::Account;
use super::progress::Progress;

/// One row of the leaderboard, derived on every query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub platform_id: String,
    pub display_name: Option<String>,
    pub total_earned: u64,
    pub total_taps: u64,
    /// 1-based, dense
    pub rank: u64,
}

/// Order accounts by total earned (descending), then creation time, then id.
///
/// The id tiebreak makes the order total even when two accounts share a
/// creation timestamp, so every account gets a distinct rank.
pub fn rank_standings(mut standings: Vec<(Account, Progress)>) -> Vec<RankingEntry> {
    standings.sort_by(|(a_acc, a_prog), (b_acc, b_prog)| {
        b_prog
            .total_earned
            .cmp(&a_prog.total_earned)
            .then_with(|| a_acc.created_at.cmp(&b_acc.created_at))
            .then_with(|| a_acc.id.cmp(&b_acc.id))
    });

    standings
        .into_iter()
        .enumerate()
        .map(|(i, (account, progress))| RankingEntry {
            display_name: account.display_name(),
            platform_id: account.platform_id,
            total_earned: progress.total_earned,
            total_taps: progress.total_taps,
            rank: i as u64 + 1,
        })
        .collect()
}
