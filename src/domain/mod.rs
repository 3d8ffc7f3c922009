//! Value types and the ports the storefront talks to.

pub mod balance;
pub mod interaction;
pub mod keys;
pub mod message;
pub mod ports;
pub mod product;
pub mod response;
pub mod transaction;
