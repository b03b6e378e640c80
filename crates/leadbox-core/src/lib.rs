pub mod backend;
pub mod counts;
pub mod errors;
pub mod feed;
pub mod ids;
pub mod inquiry;

pub use backend::DataBackend;
pub use counts::StatusCounts;
pub use errors::BackendError;
pub use feed::{ChangeEvent, FeedMessage, FeedStream};
pub use ids::InquiryId;
pub use inquiry::{Inquiry, InquiryStatus, StatusFilter};
