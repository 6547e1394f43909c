pub mod prelude;

pub mod reports;
