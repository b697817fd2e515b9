pub mod approval;
pub mod catalog;
pub mod cost;
pub mod selection;
