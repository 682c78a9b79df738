//! Persistence-rate table
//!
//! Fixed true-probability input derived offline from 5 years of BTC data
//! (137,206 15-minute windows): if BTC is above/below the strike at elapsed
//! minute X, the probability it is still on that side at close. Supplied as
//! data - this crate never fits or updates it.

/// One row per elapsed minute: (minutes left, persistence rate, historical
/// max consecutive losses at that minute).
const PERSISTENCE_BY_MINUTE: [(u32, f64, u32); 15] = [
    (14, 0.560, 15), // minute 0 - barely better than a coin flip
    (13, 0.626, 12),
    (12, 0.684, 10),
    (11, 0.732, 9),
    (10, 0.771, 8),
    (9, 0.804, 7),
    (8, 0.832, 6),
    (7, 0.856, 6),
    (6, 0.877, 5),
    (5, 0.895, 5),
    (4, 0.912, 4),
    (3, 0.927, 4),
    (2, 0.941, 3),
    (1, 0.954, 3),
    (0, 0.968, 2), // minute 14 - basically locked in
];

/// Persistence rate for an elapsed minute (0-14), `None` outside the table.
pub fn persistence_rate(minute: u32) -> Option<f64> {
    PERSISTENCE_BY_MINUTE
        .get(minute as usize)
        .map(|&(_, rate, _)| rate)
}

/// Minutes remaining in the window at a given elapsed minute.
pub fn mins_left_at(minute: u32) -> Option<u32> {
    PERSISTENCE_BY_MINUTE
        .get(minute as usize)
        .map(|&(left, _, _)| left)
}

/// Edge at a given minute for a market price in cents:
/// `true probability - implied probability`.
pub fn edge_at(minute: u32, price_cents: u32) -> Option<f64> {
    let rate = persistence_rate(minute)?;
    Some(rate - f64::from(price_cents) / 100.0)
}
