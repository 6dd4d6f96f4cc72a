pub mod abi;
pub mod decoder;
pub mod provider;

pub use abi::ERC20Votes;
pub use decoder::{DecodedLog, GovernanceEvent, decode_governance_log, event_signatures};
pub use provider::{ChainProvider, create_provider};
