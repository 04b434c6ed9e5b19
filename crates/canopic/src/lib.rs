//! Display codecs and a typed call pipeline for Internet Computer clients.
//!
//! Canopic parses a canister's Candid interface, compiles every method's
//! argument and return types into bidirectional codecs between wire values
//! and display-shaped JSON, and executes calls through an injected transport
//! with certificate handling, polling and result unwrapping built in.
//!
//! ## Layering
//!
//! - `interface` parses `.did` sources into per-method descriptors.
//! - `codec` builds and runs the wire ↔ display transforms.
//! - `protocol` owns transports, certificates, request status and polling.
//! - `call` is the executor pipeline tying the layers together.
//! - `error` is the shared failure taxonomy callers branch on.
//!
//! The default flow is: interface → call → protocol, with codecs applied on
//! the way in and out. Interfaces hold reference-counted single-threaded
//! type data, so call futures are not `Send`; drive them on a current-thread
//! runtime.

pub mod call;
pub mod codec;
pub mod error;
pub mod interface;
pub mod protocol;

pub use call::{ArgValidator, CallExecutor, QueryCache, QueryOptions, QueryPlan, RequestKey};
pub use error::{CallFailure, CanisterError, ValidationError};
pub use interface::Interface;
pub use protocol::{PollingPolicy, Transport};

///
/// Crate Version
///

pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
