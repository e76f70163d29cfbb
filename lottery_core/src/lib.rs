//! Off-chain core of the lucky-sol lottery: PDA derivation, the account and
//! instruction wire format, ticket commitment trees, draws and the draw cycle.

pub mod codec;
pub mod constants;
pub mod cycle;
pub mod draw;
pub mod error;
pub mod instruction;
pub mod merkle;
pub mod pda;
pub mod state;
pub mod ticket;

pub use cycle::{CyclePhase, DrawCycle};
pub use draw::{DrawEngine, DrawResult, NumberSource, WinnerShare};
pub use error::{LotteryError, Result};
pub use merkle::{CommitmentTree, Hash, MerkleProof, MultiProof};
pub use pda::PoolStorageSeed;
pub use state::{DraftWinner, LotteryInstruction, PoolStorageData, TicketAccountData};
pub use ticket::{Ticket, TicketStatus};
