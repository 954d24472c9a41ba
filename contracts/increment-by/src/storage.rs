use soroban_sdk::{symbol_short, Env, Symbol};

/// Persistent key of the counter. Relays declare it read-write in their
/// footprint, so it must stay a plain symbol.
pub const COUNTER: Symbol = symbol_short!("COUNTER");

/// Bump amount for the counter entry (roughly 30 days in ledgers).
const LEDGER_BUMP: u32 = 518_400;
/// Threshold for bumping (roughly 15 days).
const LEDGER_THRESHOLD: u32 = 259_200;

pub fn get_count(env: &Env) -> u64 {
    env.storage().persistent().get(&COUNTER).unwrap_or(0)
}

pub fn set_count(env: &Env, count: u64) {
    env.storage().persistent().set(&COUNTER, &count);
    env.storage()
        .persistent()
        .extend_ttl(&COUNTER, LEDGER_THRESHOLD, LEDGER_BUMP);
}
