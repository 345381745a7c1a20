use rand::Rng;

use crate::store::BankAccount;

// ============================================================================
// Weighted Bank Account Selection
// ============================================================================
//
// Incoming transfers are spread across an event's bank accounts roughly in
// proportion to the configured percentages (e.g. a committee/school split).
// A uniform draw in [0, 100) walks the cumulative percentages in descending
// order; the first account whose running sum exceeds the draw wins. Floating
// point drift can leave the running sum just below 100, so a draw above it
// falls back to the first account. That fallback is part of the contract.
//
// ============================================================================

/// Pure selection step, separated from the RNG so it can be tested
/// exhaustively. `accounts` must be sorted by percentage descending, the
/// order the store returns them in.
pub fn select_weighted<'a>(accounts: &'a [BankAccount], draw: f64) -> Option<&'a BankAccount> {
    let mut cumulative = 0.0;
    for account in accounts {
        cumulative += account.percentage;
        if draw < cumulative {
            return Some(account);
        }
    }
    // Drift fallback: percentages summed to slightly less than 100.
    accounts.first()
}

/// Select an account for one payment request. A single-account event
/// bypasses randomization entirely.
pub fn pick_account<'a, R: Rng>(accounts: &'a [BankAccount], rng: &mut R) -> Option<&'a BankAccount> {
    match accounts {
        [] => None,
        [single] => Some(single),
        _ => select_weighted(accounts, rng.gen_range(0.0..100.0)),
    }
}
