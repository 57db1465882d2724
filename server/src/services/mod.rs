//! External service clients: the wallet provider and the AI verifier

pub mod rpc;
pub mod verifier;
pub mod wallet;
