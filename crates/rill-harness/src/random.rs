//! Random protocol values for tests.
//!
//! All generators take the RNG explicitly so tests stay reproducible
//! from a seed.

use rand::Rng;
use rill_proto::{
    Allocation, Asset, ChannelId, ChannelSyncMsg, Encode, Phase, State, SubAlloc, Transaction,
};

use crate::sim_wallet::{SimAccount, SimAddress};

/// A random 20-byte address.
pub fn random_address<R: Rng>(rng: &mut R) -> SimAddress {
    let mut bytes = [0u8; 20];
    rng.fill(&mut bytes[..]);
    SimAddress(bytes)
}

/// An account at a random address.
pub fn random_account<R: Rng>(rng: &mut R) -> SimAccount {
    SimAccount::new(random_address(rng))
}

/// A random channel identifier.
pub fn random_channel_id<R: Rng>(rng: &mut R) -> ChannelId {
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes[..]);
    ChannelId(bytes)
}

/// A uniformly random lifecycle phase.
pub fn random_phase<R: Rng>(rng: &mut R) -> Phase {
    match rng.gen_range(0..4) {
        0 => Phase::Init,
        1 => Phase::Funding,
        2 => Phase::Acting,
        _ => Phase::Settled,
    }
}

/// A random asset identifier.
pub fn random_asset<R: Rng>(rng: &mut R) -> Asset {
    let mut bytes = vec![0u8; 32];
    rng.fill(&mut bytes[..]);
    Asset(bytes)
}

/// A random allocation over `num_parts` participants and `num_assets`
/// assets, with one locked sub-allocation.
pub fn random_allocation<R: Rng>(rng: &mut R, num_parts: usize, num_assets: usize) -> Allocation {
    let assets = (0..num_assets).map(|_| random_asset(rng)).collect();
    let balances = (0..num_parts)
        .map(|_| (0..num_assets).map(|_| u128::from(rng.gen::<u64>())).collect())
        .collect();
    let locked = vec![SubAlloc {
        id: random_channel_id(rng),
        bals: (0..num_assets).map(|_| u128::from(rng.gen::<u64>())).collect(),
    }];
    Allocation { assets, balances, locked }
}

/// A random channel state for `num_parts` participants.
pub fn random_state<R: Rng>(rng: &mut R, num_parts: usize) -> State {
    let num_assets = rng.gen_range(1..3);
    let mut data = vec![0u8; rng.gen_range(0..16)];
    rng.fill(&mut data[..]);
    State {
        id: random_channel_id(rng),
        version: rng.gen_range(0..1_000),
        allocation: random_allocation(rng, num_parts, num_assets),
        data,
        is_final: rng.gen_bool(0.1),
    }
}

/// A random signed transaction for `num_parts` participants, with one
/// simulated signature per participant.
pub fn random_transaction<R: Rng>(rng: &mut R, num_parts: usize) -> Transaction {
    let state = random_state(rng, num_parts);
    let encoded = state.encode_to_vec().unwrap_or_default();
    let sigs = (0..num_parts).map(|_| random_account(rng).sign(&encoded)).collect();
    Transaction { state, sigs }
}

/// A random channel synchronization message.
pub fn random_sync_msg<R: Rng>(rng: &mut R, num_parts: usize) -> ChannelSyncMsg {
    ChannelSyncMsg { phase: random_phase(rng), current_tx: random_transaction(rng, num_parts) }
}
