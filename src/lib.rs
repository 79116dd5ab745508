pub mod addressgen;
pub mod config;
pub mod error;
pub mod export;
pub mod flow;
pub mod layers;
pub mod meter;
pub mod packet;
pub mod profile;
pub mod random;
pub mod valuegen;

pub use addressgen::AddressGenerators;
pub use error::Error;
pub use flow::Flow;
pub use packet::{Direction, Packet};
pub use profile::FlowProfile;
pub use random::RandomGenerator;
