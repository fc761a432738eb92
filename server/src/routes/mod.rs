pub mod api;
pub mod photos;
pub mod visits;
