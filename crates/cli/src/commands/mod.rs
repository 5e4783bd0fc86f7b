pub mod extract;
pub mod providers;
