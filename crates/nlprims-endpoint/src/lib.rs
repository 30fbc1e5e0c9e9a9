//! Netlink message endpoints.
//!
//! This is the layer callers use. Open an endpoint, bind it, optionally set
//! a default peer, then send and receive whole payloads. Generic endpoints
//! look their family id up once and reuse it for every frame.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod resolver;

#[cfg(test)]
mod testing;

pub use config::{EndpointConfig, GenericConfig, DEFAULT_FAMILY_NAME};
pub use endpoint::{Endpoint, EndpointState, Incoming, SendOptions, Variant};
pub use error::{EndpointError, Result};
pub use resolver::{
    resolve_family_id, CTRL_ATTR_FAMILY_ID, CTRL_ATTR_FAMILY_NAME, CTRL_CMD_GETFAMILY,
    CTRL_VERSION,
};
