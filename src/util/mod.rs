pub mod io;
pub mod random;
