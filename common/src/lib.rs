pub mod crop;
pub mod id;
pub mod identity;
pub mod interest;
