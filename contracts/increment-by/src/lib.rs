#![no_std]

mod storage;


use soroban_sdk::{contract, contractimpl, log, Env};

#[contract]
pub struct IncrementContractBy;

#[contractimpl]
impl IncrementContractBy {
    /// Add `by` to the persistent counter and return the new total.
    ///
    /// An unset counter starts at zero. Overflow traps.
    pub fn increment(env: Env, by: u64) -> u64 {
        let count = storage::get_count(&env);
        log!(&env, "count: {}", count);

        let count = count.checked_add(by).expect("counter overflow");
        storage::set_count(&env, count);
        count
    }
}
