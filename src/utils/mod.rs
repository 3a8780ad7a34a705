pub mod command;
pub mod fastx;
pub mod file;
pub mod plotting;
pub mod sambam;
pub mod streams;
pub mod system;
