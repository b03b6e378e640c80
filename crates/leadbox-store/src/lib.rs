pub mod database;
pub mod error;
pub mod inquiries;
pub mod row_helpers;
pub mod schema;

pub use database::Database;
pub use error::StoreError;
pub use inquiries::{InquiryStore, NewInquiry};
