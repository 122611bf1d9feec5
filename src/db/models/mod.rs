pub mod family;
pub mod plant;
pub mod reward;
