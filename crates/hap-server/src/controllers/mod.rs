//! Request handlers behind the router.

pub mod accessories;
pub mod characteristics;
pub mod pairing;

pub use characteristics::{CharacteristicsController, DeviceWrite, ReadRequest, WriteOutcome};
pub use pairing::PairingReply;
