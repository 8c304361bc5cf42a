pub mod catalog;
pub mod reports;
pub mod tasks;
pub mod uploads;
