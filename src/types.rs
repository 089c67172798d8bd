pub mod habits;
pub mod push;
