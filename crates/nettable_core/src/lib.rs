pub mod conversation;
pub mod domain;
pub mod error;
pub mod memory;
pub mod ports;
pub mod registry;

pub use conversation::{Event, FsmState, Outcome, Phase, Session, Step};
pub use domain::{Draft, Field, NewRow, Row, RowId, UserId, ABSENT};
pub use error::ConversationError;
pub use memory::InMemoryTableStore;
pub use ports::{PortError, PortResult, TableStore};
pub use registry::{SessionRegistry, TransitionResult};
