//! Websocket relay subsystem.
//!
//! # Data Flow
//! ```text
//! Upgrade request (pre-upgrade step):
//!     → session.rs reserve(request id)
//!     → backend.rs open backend socket, wait until ready
//!     → session.rs mark_open (pending backend connection)
//!
//! Client handshake complete:
//!     → session.rs take_for_pairing
//!     → frame.rs adapt both sockets to events and frames
//!     → pair.rs relay until the first terminating event
//!     → session.rs release
//! ```
//!
//! # Design Decisions
//! - The backend socket is open before the client handshake completes
//! - Pairing logic is transport-neutral and tested without sockets
//! - Unpaired sessions are bounded by a connect timeout and a TTL reaper

pub mod backend;
pub mod frame;
pub mod pair;
pub mod session;

pub use backend::connect_backend;
pub use frame::{BackendSocket, CloseInfo, Frame, SocketEvent};
pub use pair::{relay, PairingOutcome};
pub use session::{
    capture_head, run_reaper, PendingBackendConnection, Reservation, SessionError, SessionPhase, SessionTable,
};
