//! Wattgate RPC — clients for the two physical actuation surfaces: the
//! router firewall (network ACL) and the miner management API.

pub mod miner;
pub mod router;

pub use miner::{DragonMiner, MinerRpc, MinerSummary, MinerTarget};
pub use router::{AclEntry, Blocklist, MemoryRouter, RestRouter, RouterRpc};
