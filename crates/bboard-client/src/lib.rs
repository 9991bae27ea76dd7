//! bboard-client: client for a ledger-backed bulletin board contract
//!
//! lets an operator deploy or join a board instance, submit state-changing
//! calls, and observe public ledger state and local private state converge
//! into a single derived view.
//!
//! ## usage
//!
//! ```rust,ignore
//! // deploy a fresh board and post to it
//! let session = Session::deploy(providers, "operator", DeployArgs::default(), &mut rng).await?;
//! session.dispatcher().call(BoardCommand::Post("hello".into())).await?;
//!
//! // attach to an existing board
//! let session = Session::join(providers, "operator", address, &mut rng).await?;
//! ```

pub mod config;
pub mod dispatch;
pub mod emulated;
pub mod error;
pub mod funding;
pub mod ledger;
pub mod pipeline;
pub mod private_state;
pub mod providers;
pub mod session;

pub use config::*;
pub use dispatch::*;
pub use emulated::*;
pub use error::*;
pub use funding::*;
pub use ledger::*;
pub use pipeline::*;
pub use private_state::*;
pub use providers::*;
pub use session::*;
