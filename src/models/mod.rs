pub mod approval;
pub mod mail;
pub mod team;
