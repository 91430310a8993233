//! Inventory engine: the public contract over the ledger.
//!
//! [`InventoryEngine`] orchestrates every stock operation as
//! load → pure plan → atomic commit under the product's version token, with
//! bounded replanning when a commit loses the version race. Bulk updates and
//! valuation reports live in their own modules.

pub mod bulk;
pub mod engine;
pub mod report;

pub use bulk::{BulkAction, BulkOutcome, BulkReport, BulkStockItem};
pub use engine::{InventoryEngine, LotReceipt};
pub use report::{InventoryReport, ReportLine};
