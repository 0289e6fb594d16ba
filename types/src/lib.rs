//! Shared types for the updraft crash-round engine.
//!
//! Everything that crosses a crate or wire boundary lives here: the
//! fixed-point multiplier, round and bet state, the live-feed events, and
//! the HTTP request/response bodies. The engine crate owns all mutation;
//! these types are plain data.

pub mod api;
pub mod bet;
pub mod multiplier;
pub mod round;

pub use api::{
    CashOutResponse, FeedEvent, PlaceBetRequest, PlaceBetResponse, Rejection, RejectionBody,
    RoundSnapshot, VerifyReport,
};
pub use bet::{AccountId, Bet, BetId, BetStatus, SlotIndex};
pub use multiplier::Multiplier;
pub use round::{RoundHistoryEntry, RoundId, RoundStatus};
