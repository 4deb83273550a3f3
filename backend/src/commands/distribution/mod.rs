pub mod allocation;
pub mod analysis;
pub mod catalog;
pub mod record;
pub mod report;
pub mod request;
