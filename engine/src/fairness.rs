//! Commit-reveal fairness scheme.
//!
//! Each round commits to a fresh 32-byte server seed by publishing its
//! SHA-256 hash before betting opens. The crash point is a pure function of
//! `(server_seed, client_seed, round_id)`: the seed is revealed after the
//! crash, and any third party can recompute the crash point and check the
//! commitment.
//!
//! Derivation: SHA-256 over `server_seed || client_seed || round_id` reduced
//! to a 52-bit uniform integer `h`, mapped through
//! `(1 - edge) * 2^52 / (2^52 - h)` in basis points with a 1.00x floor and a
//! configured ceiling. Values the edge pushes below 1.01x are instant
//! crashes, a legitimate outcome with probability approximately equal to the
//! house edge.

use commonware_cryptography::{Hasher, Sha256};
use commonware_utils::{from_hex, hex};
use rand::{CryptoRng, RngCore};
use updraft_types::multiplier::SCALE;
use updraft_types::{Multiplier, RoundHistoryEntry, RoundId, VerifyReport};

/// Length of a server seed in bytes.
pub const SERVER_SEED_LENGTH: usize = 32;

const TWO_52: u64 = 1 << 52;

/// A server seed and its published commitment.
///
/// The seed stays secret until the round crashes; only the hash leaves the
/// engine before that.
#[derive(Clone)]
pub struct SeedCommit {
    server_seed: [u8; SERVER_SEED_LENGTH],
    server_seed_hash: String,
}

impl SeedCommit {
    /// Generate a fresh seed from cryptographic entropy.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut server_seed = [0u8; SERVER_SEED_LENGTH];
        rng.fill_bytes(&mut server_seed);
        Self::from_seed(server_seed)
    }

    /// Wrap an existing seed (deterministic seed sources, replay).
    pub fn from_seed(server_seed: [u8; SERVER_SEED_LENGTH]) -> Self {
        let server_seed_hash = hash_seed(&server_seed);
        Self {
            server_seed,
            server_seed_hash,
        }
    }

    /// The published commitment.
    pub fn server_seed_hash(&self) -> &str {
        &self.server_seed_hash
    }

    pub fn server_seed(&self) -> &[u8; SERVER_SEED_LENGTH] {
        &self.server_seed
    }

    /// Hex encoding of the seed, for the post-crash reveal.
    pub fn reveal(&self) -> String {
        hex(&self.server_seed)
    }
}

/// Source of server seeds for new rounds.
pub trait SeedSource: Send + 'static {
    fn next_commit(&mut self) -> SeedCommit;
}

/// OS-entropy seed source used in production.
pub struct OsSeedSource;

impl SeedSource for OsSeedSource {
    fn next_commit(&mut self) -> SeedCommit {
        SeedCommit::generate(&mut rand::rngs::OsRng)
    }
}

/// SHA-256 commitment of a seed, hex-encoded.
pub fn hash_seed(seed: &[u8]) -> String {
    hex(&Sha256::hash(seed).0)
}

/// Check a revealed hex seed against a published commitment.
pub fn verify_commitment(server_seed_hex: &str, server_seed_hash: &str) -> bool {
    match from_hex(server_seed_hex) {
        Some(seed) => hash_seed(&seed) == server_seed_hash,
        None => false,
    }
}

/// Derive a round's crash point.
///
/// Pure function of its inputs; called exactly once per round, when the
/// client seed freezes at the end of the betting window.
pub fn compute_crash_point(
    server_seed: &[u8],
    client_seed: &str,
    round_id: RoundId,
    house_edge_bps: u64,
    max_crash_point: Multiplier,
) -> Multiplier {
    let mut hasher = Sha256::new();
    hasher.update(server_seed);
    hasher.update(client_seed.as_bytes());
    hasher.update(&round_id.to_be_bytes());
    let digest = hasher.finalize().0;

    // 52-bit uniform value from the first 8 bytes of the digest.
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let h = u64::from_be_bytes(prefix) >> 12;

    // crash_bps = (SCALE - edge) * 2^52 / (2^52 - h), h < 2^52 so the
    // denominator is never zero.
    let numerator = (SCALE.saturating_sub(house_edge_bps)) as u128 * TWO_52 as u128;
    let denominator = (TWO_52 - h) as u128;
    let crash_bps = (numerator / denominator).min(u64::MAX as u128) as u64;

    Multiplier::from_bps(crash_bps.max(Multiplier::ONE.bps()).min(max_crash_point.bps()))
}

/// Recompute a settled round's crash point from its revealed seed and check
/// both the commitment and the recorded outcome.
pub fn verify_round(
    entry: &RoundHistoryEntry,
    house_edge_bps: u64,
    max_crash_point: Multiplier,
) -> VerifyReport {
    let commitment_valid = verify_commitment(&entry.server_seed, &entry.server_seed_hash);
    let recomputed_crash_point = match from_hex(&entry.server_seed) {
        Some(seed) => compute_crash_point(
            &seed,
            &entry.client_seed,
            entry.round_id,
            house_edge_bps,
            max_crash_point,
        ),
        None => Multiplier::from_bps(0),
    };
    VerifyReport {
        round_id: entry.round_id,
        server_seed: entry.server_seed.clone(),
        server_seed_hash: entry.server_seed_hash.clone(),
        client_seed: entry.client_seed.clone(),
        commitment_valid,
        recorded_crash_point: entry.crash_point,
        recomputed_crash_point,
        crash_point_valid: recomputed_crash_point == entry.crash_point,
    }
}
