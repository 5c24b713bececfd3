//! Client registry domain module (event-sourced).
//!
//! The buyers orders are placed for. Only active clients can be put on a new
//! order; deactivating a client leaves its existing orders untouched.

pub mod client;

pub use client::{
    Client, ClientActivated, ClientCommand, ClientDeactivated, ClientDetails, ClientDetailsUpdated,
    ClientEvent, ClientRegistered, ClientType, ContactInfo, RegisterClient, SetClientActive,
    UpdateClientDetails,
};
