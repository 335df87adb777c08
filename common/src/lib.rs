#![cfg_attr(not(feature = "std"), no_std)]

pub mod address;
pub mod packet;

pub use address::PeerAddress;
