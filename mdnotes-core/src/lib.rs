pub mod environment;
pub mod events;
pub mod gatekeeper;
pub mod manager;
pub mod registry;
pub mod runtime;
pub mod session;
pub mod settings;

#[cfg(test)]
pub(crate) mod testing;
