//! Transferencia de filas entre recursos.

mod listener;
mod manager;
mod mapping;
mod pair;
mod properties;

pub use listener::{TransferListener, TransferReport, WriteStats};
pub use manager::TransferManager;
pub use mapping::{ColumnMapping, MappingMethod, ResolvedMapping};
pub use pair::TransferPair;
pub use properties::{default_mode, default_operation, SourceOperation, TargetOperation, TransferOperation, TransferOutput,
                     TransferProperties, TransferPropertiesBuilder};
