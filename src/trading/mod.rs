//! Order sizing, trade execution and position monitoring.

mod executor;
mod monitor;
pub mod sizer;

pub use executor::TradeExecutor;
pub use monitor::{ClosedPosition, MonitorEvent, PositionMonitor, PositionStatus, ProximityWarning};
pub use sizer::{ProtectiveLevels, SizingError};
