pub mod barcode;
pub mod ingester;

pub use barcode::parse_barcode;
pub use ingester::{ScanDelivery, ScanIngester, ScanMessage};
