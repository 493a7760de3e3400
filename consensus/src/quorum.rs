//! Quorum calculator: how many peer responses decide a voting phase.

/// Votes (accept or reject) required before a phase is decided, given the
/// number of currently connected peers.
///
/// - 0 peers → 0 (a solo node commits on its own).
/// - 1 peer → 1.
/// - otherwise → `floor(peers / 2)`.
///
/// Re-evaluated at the start of every voting phase; there is no fixed
/// membership list.
pub fn required_votes(connected_peers: usize) -> usize {
    match connected_peers {
        0 => 0,
        1 => 1,
        n => n / 2,
    }
}
