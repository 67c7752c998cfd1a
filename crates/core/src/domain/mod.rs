pub mod approval;
pub mod claim;
pub mod company;
pub mod sequence;
pub mod user;
