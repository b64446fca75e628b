//! Cast device support: mDNS discovery and the CASTV2 media transport

pub mod discovery;
pub mod transport;

pub use discovery::{DeviceDescriptor, DeviceRegistry};
pub use transport::{
    CastConnection, CastTransport, IdleReason, MdnsCastTransport, MediaStatus, PlayerState,
};
