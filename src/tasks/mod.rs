pub mod link;

pub use link::{link_stats_task, sbc_link_task};
