pub mod filter;
pub mod period;

pub use filter::{exclude_excluded_workers, DateRange, MemberFilter};
pub use period::{Period, Span};
