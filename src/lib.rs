pub mod binding;
pub mod config;
pub mod input;
pub mod radio;
pub mod relay;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use common;

pub mod prelude {
    pub use crate::{binding::*, config::*, input::*, radio::*, relay::*, store::*};
    pub use common::packet::{InboundControl, Message, OutboundEvent};
    pub use common::PeerAddress;
}
