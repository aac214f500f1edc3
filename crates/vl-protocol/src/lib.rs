//! VoltLink protocol core — ISO-TP frame reassembly, the diagnostic
//! command catalog, field decoders, and the shared reading/status types
//! used across the workspace.

pub mod command;
pub mod decode;
pub mod error;
pub mod fields;
pub mod frame;
pub mod reading;
pub mod status;

pub use command::{CommandCatalog, CommandSpec};
pub use error::{ProtocolError, ProtocolResult};
pub use fields::{FieldMap, FieldValue};
pub use frame::{Frame, FrameKind, assemble};
pub use reading::{Reading, ReadingBatch};
pub use status::{AgentEvent, CollectionStatus, ConnectionState};
